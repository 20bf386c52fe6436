use std::fmt;

use vigil_dns_domain::{Name, RecordType, ValidationError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RrsigRecord {
    pub type_covered: RecordType,
    pub algorithm: u8,
    pub labels: u8,
    pub original_ttl: u32,
    pub signature_expiration: u32,
    pub signature_inception: u32,
    pub key_tag: u16,
    pub signer: Name,
    pub signature: Vec<u8>,
}

impl RrsigRecord {
    pub fn parse(data: &[u8]) -> Result<Self, ValidationError> {
        if data.len() < 18 {
            return Err(ValidationError::BadRecord("RRSIG record too short".into()));
        }

        let covered = u16::from_be_bytes([data[0], data[1]]);
        let type_covered = RecordType::from_u16(covered).ok_or_else(|| {
            ValidationError::BadRecord(format!("RRSIG covers unknown type {covered}"))
        })?;
        let algorithm = data[2];
        let labels = data[3];
        let original_ttl = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let signature_expiration = u32::from_be_bytes([data[8], data[9], data[10], data[11]]);
        let signature_inception = u32::from_be_bytes([data[12], data[13], data[14], data[15]]);
        let key_tag = u16::from_be_bytes([data[16], data[17]]);

        let (signer, name_len) = Name::from_wire(&data[18..])?;
        let signature = data[18 + name_len..].to_vec();
        if signature.is_empty() {
            return Err(ValidationError::BadRecord("RRSIG without signature".into()));
        }

        Ok(Self {
            type_covered,
            algorithm,
            labels,
            original_ttl,
            signature_expiration,
            signature_inception,
            key_tag,
            signer,
            signature,
        })
    }

    /// The fixed-size prefix plus signer name, i.e. the rdata with the
    /// signature removed. This is what gets prepended to the canonical
    /// RRset when building the data a signature covers.
    pub fn to_prefix_wire(&self) -> Vec<u8> {
        let mut wire = Vec::with_capacity(18 + 64);
        wire.extend_from_slice(&self.type_covered.to_u16().to_be_bytes());
        wire.push(self.algorithm);
        wire.push(self.labels);
        wire.extend_from_slice(&self.original_ttl.to_be_bytes());
        wire.extend_from_slice(&self.signature_expiration.to_be_bytes());
        wire.extend_from_slice(&self.signature_inception.to_be_bytes());
        wire.extend_from_slice(&self.key_tag.to_be_bytes());
        wire.extend_from_slice(&self.signer.to_wire());
        wire
    }

    pub fn to_rdata(&self) -> Vec<u8> {
        let mut wire = self.to_prefix_wire();
        wire.extend_from_slice(&self.signature);
        wire
    }
}

impl fmt::Display for RrsigRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RRSIG({} keyid={} signer={} algo={})",
            self.type_covered, self.key_tag, self.signer, self.algorithm
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        let sig = RrsigRecord {
            type_covered: RecordType::A,
            algorithm: 15,
            labels: 2,
            original_ttl: 300,
            signature_expiration: 2_000_000,
            signature_inception: 1_000_000,
            key_tag: 12345,
            signer: "example.com.".parse().unwrap(),
            signature: vec![0x55; 64],
        };
        let parsed = RrsigRecord::parse(&sig.to_rdata()).unwrap();
        assert_eq!(parsed, sig);
    }

    #[test]
    fn test_parse_rejects_truncated() {
        assert!(RrsigRecord::parse(&[0; 10]).is_err());
        // Valid prefix, signer, but no signature bytes.
        let sig = RrsigRecord {
            type_covered: RecordType::A,
            algorithm: 15,
            labels: 1,
            original_ttl: 0,
            signature_expiration: 0,
            signature_inception: 0,
            key_tag: 0,
            signer: "example.".parse().unwrap(),
            signature: vec![],
        };
        assert!(RrsigRecord::parse(&sig.to_rdata()).is_err());
    }
}
