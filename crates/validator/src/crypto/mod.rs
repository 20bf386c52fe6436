pub mod keys;

use ring::signature;
use sha1::{Digest as Sha1Digest, Sha1};
use sha2::{Sha256, Sha384};

use vigil_dns_domain::{Name, ValidationError};

use crate::rdataset::Rdataset;
use crate::types::ds::{DIGEST_SHA1, DIGEST_SHA256, DIGEST_SHA384};
use crate::types::{DnskeyRecord, RrsigRecord};

/// Result of verifying one RRSIG over one RRset with one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Valid,
    /// The signature verified but covers a wildcard expansion; the carried
    /// name is the synthesizing wildcard.
    FromWildcard(Name),
    SigExpired,
    SigFuture,
    /// Any cryptographic or structural failure. Deliberately opaque.
    BadSig,
}

pub struct SignatureVerifier;

impl SignatureVerifier {
    /// Verify `siginfo` over `rdataset` with `key`, checking temporal
    /// validity against `now` (seconds since the epoch) unless
    /// `ignore_time` is set.
    pub fn verify_rrset(
        &self,
        owner: &Name,
        rdataset: &Rdataset,
        siginfo: &RrsigRecord,
        key: &DnskeyRecord,
        now: u64,
        ignore_time: bool,
    ) -> VerifyOutcome {
        if key.algorithm != siginfo.algorithm || key.key_tag() != siginfo.key_tag {
            return VerifyOutcome::BadSig;
        }

        if !ignore_time {
            let now = now as u32;
            if serial_lt(siginfo.signature_expiration, now) {
                return VerifyOutcome::SigExpired;
            }
            if serial_lt(now, siginfo.signature_inception) {
                return VerifyOutcome::SigFuture;
            }
        }

        let (data, wild) = match signed_data(owner, rdataset, siginfo) {
            Ok(built) => built,
            Err(_) => return VerifyOutcome::BadSig,
        };

        let good = match self.verify_raw(&data, &siginfo.signature, key) {
            Ok(good) => good,
            Err(_) => return VerifyOutcome::BadSig,
        };

        match (good, wild) {
            (true, Some(wild)) => VerifyOutcome::FromWildcard(wild),
            (true, None) => VerifyOutcome::Valid,
            (false, _) => VerifyOutcome::BadSig,
        }
    }

    fn verify_raw(
        &self,
        data: &[u8],
        sig: &[u8],
        dnskey: &DnskeyRecord,
    ) -> Result<bool, ValidationError> {
        match dnskey.algorithm {
            5 | 7 => self.verify_rsa(
                data,
                sig,
                dnskey,
                &signature::RSA_PKCS1_2048_8192_SHA1_FOR_LEGACY_USE_ONLY,
            ),
            8 => self.verify_rsa(data, sig, dnskey, &signature::RSA_PKCS1_2048_8192_SHA256),
            10 => self.verify_rsa(data, sig, dnskey, &signature::RSA_PKCS1_2048_8192_SHA512),
            13 => self.verify_ecdsa(data, sig, dnskey, &signature::ECDSA_P256_SHA256_FIXED, 64),
            14 => self.verify_ecdsa(data, sig, dnskey, &signature::ECDSA_P384_SHA384_FIXED, 96),
            15 => self.verify_ed25519(data, sig, dnskey),
            _ => Err(ValidationError::BadRecord(format!(
                "unsupported DNSSEC algorithm: {}",
                dnskey.algorithm
            ))),
        }
    }

    fn verify_rsa(
        &self,
        data: &[u8],
        sig: &[u8],
        dnskey: &DnskeyRecord,
        params: &'static signature::RsaParameters,
    ) -> Result<bool, ValidationError> {
        let (exponent, modulus) = parse_rsa_key(&dnskey.public_key)?;
        let public_key = signature::RsaPublicKeyComponents {
            n: &modulus,
            e: &exponent,
        };
        Ok(public_key.verify(params, data, sig).is_ok())
    }

    fn verify_ecdsa(
        &self,
        data: &[u8],
        sig: &[u8],
        dnskey: &DnskeyRecord,
        alg: &'static signature::EcdsaVerificationAlgorithm,
        point_len: usize,
    ) -> Result<bool, ValidationError> {
        if dnskey.public_key.len() != point_len {
            return Err(ValidationError::BadRecord(
                "invalid ECDSA public key length".into(),
            ));
        }
        if sig.len() != point_len {
            return Err(ValidationError::BadRecord(
                "invalid ECDSA signature length".into(),
            ));
        }

        // DNSKEY stores the bare curve point; ring wants the uncompressed form.
        let mut pk = Vec::with_capacity(point_len + 1);
        pk.push(0x04);
        pk.extend_from_slice(&dnskey.public_key);

        let public_key = signature::UnparsedPublicKey::new(alg, &pk);
        Ok(public_key.verify(data, sig).is_ok())
    }

    fn verify_ed25519(
        &self,
        data: &[u8],
        sig: &[u8],
        dnskey: &DnskeyRecord,
    ) -> Result<bool, ValidationError> {
        if dnskey.public_key.len() != 32 {
            return Err(ValidationError::BadRecord(
                "invalid Ed25519 public key length".into(),
            ));
        }
        if sig.len() != 64 {
            return Err(ValidationError::BadRecord(
                "invalid Ed25519 signature length".into(),
            ));
        }

        let public_key = signature::UnparsedPublicKey::new(&signature::ED25519, &dnskey.public_key);
        Ok(public_key.verify(data, sig).is_ok())
    }
}

/// RFC 4034 serial-number comparison: is `a` earlier than `b`?
fn serial_lt(a: u32, b: u32) -> bool {
    a != b && b.wrapping_sub(a) < 0x8000_0000
}

/// Build the buffer an RRSIG signature covers (RFC 4034 §3.1.8.1): the
/// RRSIG rdata minus the signature, followed by the canonically ordered
/// RRset with lowercased owner and the original TTL.
///
/// When the RRSIG's labels field is smaller than the owner's label count,
/// the RRset was synthesized from a wildcard; the buffer is built against
/// the wildcard owner, which is also returned so the caller can demand a
/// nonexistence proof for the query name.
pub fn signed_data(
    owner: &Name,
    rdataset: &Rdataset,
    siginfo: &RrsigRecord,
) -> Result<(Vec<u8>, Option<Name>), ValidationError> {
    let labels = siginfo.labels as usize;
    if labels > owner.num_labels() {
        return Err(ValidationError::BadRecord(
            "RRSIG labels exceed owner name".into(),
        ));
    }

    let (signing_name, wild) = if labels < owner.num_labels() {
        let wild = owner.suffix(labels).to_wildcard();
        (wild.clone(), Some(wild))
    } else {
        (owner.clone(), None)
    };

    let name_wire = signing_name.to_wire();
    let mut rdatas: Vec<&Vec<u8>> = rdataset.rdatas.iter().collect();
    rdatas.sort_unstable_by(|a, b| a.as_slice().cmp(b.as_slice()));

    let mut data = siginfo.to_prefix_wire();
    for rdata in rdatas {
        data.extend_from_slice(&name_wire);
        data.extend_from_slice(&rdataset.rtype.to_u16().to_be_bytes());
        data.extend_from_slice(&1u16.to_be_bytes()); // class IN
        data.extend_from_slice(&siginfo.original_ttl.to_be_bytes());
        data.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        data.extend_from_slice(rdata);
    }
    Ok((data, wild))
}

/// Digest of (owner wire form, DNSKEY rdata) as stored in a DS record.
/// `None` for digest types this build cannot compute.
pub fn build_ds_digest(owner: &Name, key: &DnskeyRecord, digest_type: u8) -> Option<Vec<u8>> {
    let mut data = owner.to_wire();
    data.extend_from_slice(&key.to_rdata());

    match digest_type {
        DIGEST_SHA1 => {
            let mut hasher = Sha1::new();
            hasher.update(&data);
            Some(hasher.finalize().to_vec())
        }
        DIGEST_SHA256 => {
            let mut hasher = Sha256::new();
            hasher.update(&data);
            Some(hasher.finalize().to_vec())
        }
        DIGEST_SHA384 => {
            let mut hasher = Sha384::new();
            hasher.update(&data);
            Some(hasher.finalize().to_vec())
        }
        _ => None,
    }
}

fn parse_rsa_key(key_data: &[u8]) -> Result<(Vec<u8>, Vec<u8>), ValidationError> {
    if key_data.is_empty() {
        return Err(ValidationError::BadRecord("empty RSA public key".into()));
    }

    let first_byte = key_data[0];

    let (exp_len, exp_start) = if first_byte == 0 {
        if key_data.len() < 3 {
            return Err(ValidationError::BadRecord(
                "RSA key too short for long form".into(),
            ));
        }
        let exp_len = u16::from_be_bytes([key_data[1], key_data[2]]) as usize;
        (exp_len, 3)
    } else {
        (first_byte as usize, 1)
    };

    let exp_end = exp_start + exp_len;
    if exp_end > key_data.len() {
        return Err(ValidationError::BadRecord(
            "RSA exponent extends beyond key data".into(),
        ));
    }

    let exponent = key_data[exp_start..exp_end].to_vec();
    let modulus = key_data[exp_end..].to_vec();

    if modulus.is_empty() {
        return Err(ValidationError::BadRecord("RSA modulus is empty".into()));
    }

    Ok((exponent, modulus))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ring::rand::SystemRandom;
    use ring::signature::{Ed25519KeyPair, KeyPair};
    use vigil_dns_domain::RecordType;

    fn test_key() -> (Ed25519KeyPair, DnskeyRecord) {
        let rng = SystemRandom::new();
        let pkcs8 = Ed25519KeyPair::generate_pkcs8(&rng).unwrap();
        let kp = Ed25519KeyPair::from_pkcs8(pkcs8.as_ref()).unwrap();
        let dnskey = DnskeyRecord {
            flags: 256,
            protocol: 3,
            algorithm: 15,
            public_key: kp.public_key().as_ref().to_vec(),
        };
        (kp, dnskey)
    }

    fn a_rrset(name: &str) -> Rdataset {
        Rdataset::new(
            name.parse().unwrap(),
            RecordType::A,
            300,
            vec![vec![192, 0, 2, 1]],
        )
    }

    fn siginfo_for(owner: &Name, key: &DnskeyRecord, labels: u8) -> RrsigRecord {
        RrsigRecord {
            type_covered: RecordType::A,
            algorithm: 15,
            labels,
            original_ttl: 300,
            signature_expiration: 2_000_000,
            signature_inception: 1_000_000,
            key_tag: key.key_tag(),
            signer: owner.suffix(labels.into()),
            signature: Vec::new(),
        }
    }

    fn sign(kp: &Ed25519KeyPair, owner: &Name, set: &Rdataset, mut sig: RrsigRecord) -> RrsigRecord {
        let (data, _) = signed_data(owner, set, &sig).unwrap();
        sig.signature = kp.sign(&data).as_ref().to_vec();
        sig
    }

    #[test]
    fn test_verify_valid_ed25519() {
        let (kp, dnskey) = test_key();
        let owner: Name = "host.example.".parse().unwrap();
        let set = a_rrset("host.example.");
        let sig = sign(&kp, &owner, &set, siginfo_for(&owner, &dnskey, 2));

        let outcome =
            SignatureVerifier.verify_rrset(&owner, &set, &sig, &dnskey, 1_500_000, false);
        assert_eq!(outcome, VerifyOutcome::Valid);
    }

    #[test]
    fn test_verify_flipped_signature_is_bad() {
        let (kp, dnskey) = test_key();
        let owner: Name = "host.example.".parse().unwrap();
        let set = a_rrset("host.example.");
        let mut sig = sign(&kp, &owner, &set, siginfo_for(&owner, &dnskey, 2));
        sig.signature[0] ^= 0xFF;

        let outcome =
            SignatureVerifier.verify_rrset(&owner, &set, &sig, &dnskey, 1_500_000, false);
        assert_eq!(outcome, VerifyOutcome::BadSig);
    }

    #[test]
    fn test_verify_reports_wildcard_owner() {
        let (kp, dnskey) = test_key();
        // Answer synthesized for nope.wild.example from *.wild.example: the
        // labels field counts the wildcard's parent.
        let owner: Name = "nope.wild.example.".parse().unwrap();
        let set = a_rrset("nope.wild.example.");
        let sig = sign(&kp, &owner, &set, siginfo_for(&owner, &dnskey, 2));

        let outcome =
            SignatureVerifier.verify_rrset(&owner, &set, &sig, &dnskey, 1_500_000, false);
        assert_eq!(
            outcome,
            VerifyOutcome::FromWildcard("*.wild.example.".parse().unwrap())
        );
    }

    #[test]
    fn test_verify_temporal_outcomes() {
        let (kp, dnskey) = test_key();
        let owner: Name = "host.example.".parse().unwrap();
        let set = a_rrset("host.example.");
        let sig = sign(&kp, &owner, &set, siginfo_for(&owner, &dnskey, 2));

        let expired =
            SignatureVerifier.verify_rrset(&owner, &set, &sig, &dnskey, 3_000_000, false);
        assert_eq!(expired, VerifyOutcome::SigExpired);

        let future = SignatureVerifier.verify_rrset(&owner, &set, &sig, &dnskey, 500_000, false);
        assert_eq!(future, VerifyOutcome::SigFuture);

        // ignore_time accepts the same signature regardless of clock.
        let ignored = SignatureVerifier.verify_rrset(&owner, &set, &sig, &dnskey, 3_000_000, true);
        assert_eq!(ignored, VerifyOutcome::Valid);
    }

    #[test]
    fn test_verify_wrong_key_is_bad() {
        let (kp, dnskey) = test_key();
        let (_, other) = test_key();
        let owner: Name = "host.example.".parse().unwrap();
        let set = a_rrset("host.example.");
        let sig = sign(&kp, &owner, &set, siginfo_for(&owner, &dnskey, 2));

        // Key tag differs, so the verifier rejects before any crypto.
        let outcome = SignatureVerifier.verify_rrset(&owner, &set, &sig, &other, 1_500_000, false);
        assert_eq!(outcome, VerifyOutcome::BadSig);
    }

    #[test]
    fn test_ds_digest_types() {
        let (_, dnskey) = test_key();
        let owner: Name = "example.".parse().unwrap();
        assert_eq!(build_ds_digest(&owner, &dnskey, DIGEST_SHA1).unwrap().len(), 20);
        assert_eq!(
            build_ds_digest(&owner, &dnskey, DIGEST_SHA256).unwrap().len(),
            32
        );
        assert_eq!(
            build_ds_digest(&owner, &dnskey, DIGEST_SHA384).unwrap().len(),
            48
        );
        assert!(build_ds_digest(&owner, &dnskey, 99).is_none());
    }

    #[test]
    fn test_serial_comparison_wraps() {
        assert!(serial_lt(1, 2));
        assert!(!serial_lt(2, 1));
        assert!(serial_lt(0xFFFF_FFF0, 0x0000_0010));
        assert!(!serial_lt(5, 5));
    }
}
