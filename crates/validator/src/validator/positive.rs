//! Positive response validation: chase each RRSIG to a usable DNSKEY and
//! verify, falling through to denial or insecurity proofs as required.

use tracing::{debug, info};

use vigil_dns_domain::{RecordType, ValidationError};

use crate::crypto::keys::next_zone_key;
use crate::crypto::{SignatureVerifier, VerifyOutcome};
use crate::rdataset::Rdataset;
use crate::resolver::FetchResult;
use crate::types::{DnskeyRecord, RrsigRecord};
use crate::validator::{Disposition, ValAttrs, Validation, ValidationOutcome};
use crate::view::ViewFind;

/// How the hunt for a signing key ended, short of a hard failure.
pub(crate) enum KeyAcquisition {
    /// No usable key for this signature; try the next RRSIG.
    Continue,
    /// A secure keyset and the first matching zone key within it.
    Keyset { keyset: Rdataset, key: DnskeyRecord },
}

impl Validation {
    /// Validate the answer RRset against its RRSIGs.
    pub(crate) async fn validate_answer(&mut self) -> Result<Disposition, ValidationError> {
        let sigset = self
            .sigrdataset()
            .cloned()
            .expect("positive validation requires a signature rdataset");

        for sig_rdata in &sigset.rdatas {
            let siginfo = RrsigRecord::parse(sig_rdata)?;

            if !self
                .resolver()
                .algorithm_supported(self.name(), siginfo.algorithm)
            {
                debug!(algorithm = siginfo.algorithm, "signature algorithm rejected by policy");
                continue;
            }

            let (keyset, first_key) = match self.get_key(&siginfo).await? {
                KeyAcquisition::Continue => continue,
                KeyAcquisition::Keyset { keyset, key } => (keyset, key),
            };

            // Walk matching keys until one verifies the signature.
            let mut current = Some(first_key);
            let mut verified = false;
            while let Some(key) = current {
                if self.verify_one(&key, &siginfo) {
                    verified = true;
                    break;
                }
                current = next_zone_key(&siginfo, &keyset, Some(&key));
            }
            if !verified {
                debug!("failed to verify rdataset");
            }

            if self.attrs.contains(ValAttrs::NEEDNOQNAME) {
                if self.message().is_none() {
                    debug!("no message available for noqname proof");
                    return Err(ValidationError::NoValidSig);
                }
                debug!("looking for noqname proof");
                return self.validate_nx().await;
            } else if verified {
                self.mark_secure();
                debug!("marking as secure, noqname proof not needed");
                return Ok(Disposition::Secure);
            }
            // Verification failed with every matching key; move on to the
            // next signature.
        }

        info!(name = %self.name(), "no valid signature found");
        Err(ValidationError::NoValidSig)
    }

    /// Resolve the DNSKEY that generated `siginfo`, suspending on the view,
    /// a sub-validator, or a fetch as needed.
    pub(crate) async fn get_key(
        &mut self,
        siginfo: &RrsigRecord,
    ) -> Result<KeyAcquisition, ValidationError> {
        let name = self.name().clone();
        let signer = siginfo.signer.clone();

        // The signer must be the owner name or closer to the root.
        if !name.is_subdomain_of(&signer) {
            return Ok(KeyAcquisition::Continue);
        }
        if name == signer {
            // A self-signed keyset is handled by the zone-key validator,
            // and parent-side types cannot be self-signed at all.
            if self.qtype() == RecordType::DNSKEY || self.qtype().is_at_parent() {
                return Ok(KeyAcquisition::Continue);
            }
        } else if matches!(self.qtype(), RecordType::SOA | RecordType::NS) {
            debug!(qtype = %self.qtype(), "signer mismatch");
            return Ok(KeyAcquisition::Continue);
        }

        let answer = self.view_find(&signer, RecordType::DNSKEY);
        match answer.result {
            ViewFind::Success => {
                let Some(keyset) = answer.rdataset else {
                    return Ok(KeyAcquisition::Continue);
                };
                let trust = keyset.trust;
                if (trust.is_pending() || trust.is_answer()) && answer.sigrdataset.is_some() {
                    // Known but not yet validated, or validated as answer
                    // while a DS may have appeared since: sub-validate.
                    let outcome = self
                        .subvalidate(
                            signer.clone(),
                            RecordType::DNSKEY,
                            Some(keyset),
                            answer.sigrdataset,
                            "get_key",
                        )
                        .await?;
                    self.key_from_validated_set(siginfo, outcome)
                } else if trust.is_pending() {
                    // A pending key with no signature means something is
                    // broken.
                    Ok(KeyAcquisition::Continue)
                } else if !trust.is_secure() {
                    // Legitimately insecure; no point attempting a verify.
                    debug!(trust = %trust, "keyset is not secure");
                    Ok(KeyAcquisition::Continue)
                } else {
                    debug!(trust = %trust, "keyset with trust");
                    match next_zone_key(siginfo, &keyset, None) {
                        Some(key) => Ok(KeyAcquisition::Keyset { keyset, key }),
                        None => Ok(KeyAcquisition::Continue),
                    }
                }
            }
            ViewFind::NotFound => {
                // We know nothing about this key; fetch it.
                let reply = self.fetch(&signer, RecordType::DNSKEY, "get_key").await?;
                match reply.result {
                    FetchResult::Success => {
                        let Some(keyset) = reply.rdataset else {
                            return Err(ValidationError::BrokenChain);
                        };
                        debug!(trust = %keyset.trust, "keyset with trust");
                        if keyset.trust.is_secure() {
                            if let Some(key) = next_zone_key(siginfo, &keyset, None) {
                                return Ok(KeyAcquisition::Keyset { keyset, key });
                            }
                        }
                        Ok(KeyAcquisition::Continue)
                    }
                    FetchResult::Canceled => Err(ValidationError::Canceled),
                    other => {
                        debug!(result = ?other, "dnskey fetch failed");
                        Err(ValidationError::BrokenChain)
                    }
                }
            }
            ViewFind::NcacheNxdomain
            | ViewFind::NcacheNxrrset
            | ViewFind::EmptyName
            | ViewFind::Nxdomain
            | ViewFind::Nxrrset
            | ViewFind::Cname => {
                // This key does not exist.
                Ok(KeyAcquisition::Continue)
            }
            ViewFind::BrokenChain => Err(ValidationError::BrokenChain),
        }
    }

    /// Resume key acquisition after a DNSKEY sub-validation completed.
    fn key_from_validated_set(
        &mut self,
        siginfo: &RrsigRecord,
        outcome: ValidationOutcome,
    ) -> Result<KeyAcquisition, ValidationError> {
        match outcome.result {
            Ok(()) => {
                let Some(keyset) = outcome.rdataset else {
                    return Ok(KeyAcquisition::Continue);
                };
                debug!(trust = %keyset.trust, "keyset with trust");
                if keyset.trust.is_secure() {
                    if let Some(key) = next_zone_key(siginfo, &keyset, None) {
                        return Ok(KeyAcquisition::Keyset { keyset, key });
                    }
                }
                Ok(KeyAcquisition::Continue)
            }
            Err(ValidationError::Canceled) => Err(ValidationError::Canceled),
            Err(error) => {
                debug!(%error, "keyvalidated");
                Err(ValidationError::BrokenChain)
            }
        }
    }

    /// Is the DNSKEY rdataset under validation signed by one of its own
    /// keys? Revoked keys that still verify retire their trust anchors.
    pub(crate) fn is_self_signed(&mut self) -> bool {
        let (Some(rdataset), Some(sigset)) =
            (self.rdataset().cloned(), self.sigrdataset().cloned())
        else {
            return false;
        };
        if rdataset.rtype != RecordType::DNSKEY {
            return false;
        }
        let name = self.name().clone();

        let mut answer = false;
        for rdata in &rdataset.rdatas {
            let Ok(key) = DnskeyRecord::parse(rdata) else {
                continue;
            };
            let key_tag = key.key_tag();
            for sig_rdata in &sigset.rdatas {
                let Ok(sig) = RrsigRecord::parse(sig_rdata) else {
                    continue;
                };
                if sig.algorithm != key.algorithm || sig.key_tag != key_tag || sig.signer != name {
                    continue;
                }
                // Time checks are deliberately skipped here: expiry is
                // judged later, against the key that actually anchors.
                let verify = SignatureVerifier.verify_rrset(
                    &name, &rdataset, &sig, &key, self.start, true,
                );
                if !matches!(verify, VerifyOutcome::Valid | VerifyOutcome::FromWildcard(_)) {
                    continue;
                }
                if !key.is_revoked() {
                    answer = true;
                } else {
                    debug!(name = %name, keyid = key_tag, "self-signed key is revoked, untrusting");
                    self.untrust_key(&name, key_tag);
                }
            }
        }
        answer
    }
}
