use std::fmt;

use vigil_dns_domain::ValidationError;

pub const DIGEST_SHA1: u8 = 1;
pub const DIGEST_SHA256: u8 = 2;
pub const DIGEST_SHA384: u8 = 4;

pub const SHA1_LEN: usize = 20;
pub const SHA256_LEN: usize = 32;
pub const SHA384_LEN: usize = 48;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DsRecord {
    pub key_tag: u16,
    pub algorithm: u8,
    pub digest_type: u8,
    pub digest: Vec<u8>,
}

impl DsRecord {
    pub fn parse(data: &[u8]) -> Result<Self, ValidationError> {
        if data.len() < 4 {
            return Err(ValidationError::BadRecord("DS record too short".into()));
        }

        let key_tag = u16::from_be_bytes([data[0], data[1]]);
        let algorithm = data[2];
        let digest_type = data[3];
        let digest = data[4..].to_vec();

        Self::validate_digest_length(digest_type, digest.len())?;

        Ok(Self {
            key_tag,
            algorithm,
            digest_type,
            digest,
        })
    }

    fn validate_digest_length(digest_type: u8, length: usize) -> Result<(), ValidationError> {
        let expected = match digest_type {
            DIGEST_SHA1 => SHA1_LEN,
            DIGEST_SHA256 => SHA256_LEN,
            DIGEST_SHA384 => SHA384_LEN,
            _ => return Ok(()),
        };

        if length != expected {
            return Err(ValidationError::BadRecord(format!(
                "invalid digest length for type {digest_type}: got {length}, expected {expected}"
            )));
        }

        Ok(())
    }

    /// Whether this DS carries a strong digest of the right length, which
    /// obliges a validator to ignore SHA-1 siblings.
    pub fn prefers_over_sha1(&self) -> bool {
        (self.digest_type == DIGEST_SHA256 && self.digest.len() == SHA256_LEN)
            || (self.digest_type == DIGEST_SHA384 && self.digest.len() == SHA384_LEN)
    }

    pub fn to_rdata(&self) -> Vec<u8> {
        let mut wire = Vec::with_capacity(4 + self.digest.len());
        wire.extend_from_slice(&self.key_tag.to_be_bytes());
        wire.push(self.algorithm);
        wire.push(self.digest_type);
        wire.extend_from_slice(&self.digest);
        wire
    }

    pub fn digest_type_name(&self) -> &'static str {
        match self.digest_type {
            DIGEST_SHA1 => "SHA-1",
            DIGEST_SHA256 => "SHA-256",
            DIGEST_SHA384 => "SHA-384",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for DsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DS(tag={}, algo={}, digest={})",
            self.key_tag,
            self.algorithm,
            self.digest_type_name()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        let rdata = [&[0x30, 0x39, 8, DIGEST_SHA256][..], &[0x11; 32][..]].concat();
        let ds = DsRecord::parse(&rdata).unwrap();
        assert_eq!(ds.key_tag, 12345);
        assert_eq!(ds.algorithm, 8);
        assert_eq!(ds.digest_type, DIGEST_SHA256);
        assert_eq!(ds.to_rdata(), rdata);
    }

    #[test]
    fn test_digest_length_check() {
        // SHA-256 digest must be 32 octets.
        let bad = [&[0, 1, 8, DIGEST_SHA256][..], &[0x11; 20][..]].concat();
        assert!(DsRecord::parse(&bad).is_err());
        // Unknown digest types pass through with any length.
        let unknown = [&[0, 1, 8, 250][..], &[0x11; 7][..]].concat();
        assert!(DsRecord::parse(&unknown).is_ok());
    }

    #[test]
    fn test_strong_digest_preference() {
        let sha1 = DsRecord {
            key_tag: 1,
            algorithm: 8,
            digest_type: DIGEST_SHA1,
            digest: vec![0; SHA1_LEN],
        };
        let sha256 = DsRecord {
            digest_type: DIGEST_SHA256,
            digest: vec![0; SHA256_LEN],
            ..sha1.clone()
        };
        assert!(!sha1.prefers_over_sha1());
        assert!(sha256.prefers_over_sha1());
    }
}
