use std::fmt;

use vigil_dns_domain::ValidationError;

const FLAG_ZONE: u16 = 0x0100;
const FLAG_REVOKE: u16 = 0x0080;
const FLAG_SEP: u16 = 0x0001;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnskeyRecord {
    pub flags: u16,
    pub protocol: u8,
    pub algorithm: u8,
    pub public_key: Vec<u8>,
}

impl DnskeyRecord {
    pub fn parse(data: &[u8]) -> Result<Self, ValidationError> {
        if data.len() < 4 {
            return Err(ValidationError::BadRecord("DNSKEY record too short".into()));
        }

        let flags = u16::from_be_bytes([data[0], data[1]]);
        let protocol = data[2];
        let algorithm = data[3];
        let public_key = data[4..].to_vec();

        if protocol != 3 {
            return Err(ValidationError::BadRecord(format!(
                "invalid DNSKEY protocol: {protocol} (expected 3)"
            )));
        }

        Ok(Self {
            flags,
            protocol,
            algorithm,
            public_key,
        })
    }

    pub fn is_zone_key(&self) -> bool {
        self.flags & FLAG_ZONE != 0
    }

    pub fn is_revoked(&self) -> bool {
        self.flags & FLAG_REVOKE != 0
    }

    pub fn is_sep(&self) -> bool {
        self.flags & FLAG_SEP != 0
    }

    /// Rebuild the rdata wire form (flags, protocol, algorithm, key).
    pub fn to_rdata(&self) -> Vec<u8> {
        let mut wire = Vec::with_capacity(4 + self.public_key.len());
        wire.extend_from_slice(&self.flags.to_be_bytes());
        wire.push(self.protocol);
        wire.push(self.algorithm);
        wire.extend_from_slice(&self.public_key);
        wire
    }

    /// RFC 4034 Appendix B key tag.
    pub fn key_tag(&self) -> u16 {
        let wire = self.to_rdata();
        let mut accumulator: u32 = 0;

        for chunk in wire.chunks(2) {
            if chunk.len() == 2 {
                accumulator += u32::from(u16::from_be_bytes([chunk[0], chunk[1]]));
            } else {
                accumulator += u32::from(chunk[0]) << 8;
            }
        }

        accumulator += accumulator >> 16;
        (accumulator & 0xFFFF) as u16
    }

    pub fn algorithm_name(&self) -> &'static str {
        match self.algorithm {
            5 => "RSA/SHA-1",
            7 => "RSASHA1-NSEC3-SHA1",
            8 => "RSA/SHA-256",
            10 => "RSA/SHA-512",
            13 => "ECDSA P-256/SHA-256",
            14 => "ECDSA P-384/SHA-384",
            15 => "Ed25519",
            16 => "Ed448",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for DnskeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DNSKEY(flags={}, algo={}, tag={}, {})",
            self.flags,
            self.algorithm_name(),
            self.key_tag(),
            if self.is_sep() { "KSK" } else { "ZSK" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        let rdata = [
            &[0x01, 0x01, 3, 15][..],
            &[0xAB; 32][..], // key material
        ]
        .concat();
        let key = DnskeyRecord::parse(&rdata).unwrap();
        assert_eq!(key.flags, 0x0101);
        assert!(key.is_zone_key());
        assert!(key.is_sep());
        assert!(!key.is_revoked());
        assert_eq!(key.algorithm, 15);
        assert_eq!(key.to_rdata(), rdata);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(DnskeyRecord::parse(&[1, 0]).is_err());
        // protocol must be 3
        assert!(DnskeyRecord::parse(&[1, 0, 2, 8, 0xFF]).is_err());
    }

    #[test]
    fn test_key_tag_is_stable() {
        let key = DnskeyRecord {
            flags: 256,
            protocol: 3,
            algorithm: 8,
            public_key: vec![1, 2, 3, 4, 5],
        };
        // The tag is a pure function of the rdata.
        assert_eq!(key.key_tag(), key.clone().key_tag());
        let other = DnskeyRecord {
            public_key: vec![1, 2, 3, 4, 6],
            ..key.clone()
        };
        assert_ne!(key.key_tag(), other.key_tag());
    }

    #[test]
    fn test_revoked_flag() {
        let key = DnskeyRecord {
            flags: 0x0180,
            protocol: 3,
            algorithm: 13,
            public_key: vec![0; 64],
        };
        assert!(key.is_zone_key());
        assert!(key.is_revoked());
    }
}
