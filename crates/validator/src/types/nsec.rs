use std::fmt;

use vigil_dns_domain::{Name, RecordType, ValidationError};

use super::{bitmap_contains, parse_type_bitmap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsecRecord {
    pub next: Name,
    pub type_bitmap: Vec<(u8, Vec<u8>)>,
}

impl NsecRecord {
    pub fn parse(data: &[u8]) -> Result<Self, ValidationError> {
        let (next, used) = Name::from_wire(data)?;
        let type_bitmap =
            parse_type_bitmap(&data[used..]).map_err(ValidationError::BadRecord)?;
        Ok(Self { next, type_bitmap })
    }

    pub fn type_present(&self, rtype: RecordType) -> bool {
        bitmap_contains(&self.type_bitmap, rtype)
    }

    pub fn to_rdata(&self) -> Vec<u8> {
        let mut wire = self.next.to_wire();
        for (window, bits) in &self.type_bitmap {
            wire.push(*window);
            wire.push(bits.len() as u8);
            wire.extend_from_slice(bits);
        }
        wire
    }
}

impl fmt::Display for NsecRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NSEC(next={})", self.next)
    }
}

/// Build a window-0 type bitmap holding the given types. Types above 255
/// do not occur in this validator's vocabulary.
pub fn build_type_bitmap(types: &[RecordType]) -> Vec<(u8, Vec<u8>)> {
    let mut bits = vec![0u8; 32];
    let mut max = 0usize;
    for t in types {
        let value = t.to_u16() as usize;
        debug_assert!(value < 256);
        bits[value >> 3] |= 0x80 >> (value & 7);
        max = max.max(value >> 3);
    }
    if types.is_empty() {
        return Vec::new();
    }
    bits.truncate(max + 1);
    vec![(0, bits)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmap_membership() {
        let nsec = NsecRecord {
            next: "b.example.".parse().unwrap(),
            type_bitmap: build_type_bitmap(&[RecordType::NS, RecordType::SOA, RecordType::NSEC]),
        };
        assert!(nsec.type_present(RecordType::NS));
        assert!(nsec.type_present(RecordType::SOA));
        assert!(nsec.type_present(RecordType::NSEC));
        assert!(!nsec.type_present(RecordType::A));
        assert!(!nsec.type_present(RecordType::DS));
    }

    #[test]
    fn test_parse_round_trip() {
        let nsec = NsecRecord {
            next: "alpha.example.".parse().unwrap(),
            type_bitmap: build_type_bitmap(&[RecordType::A, RecordType::RRSIG]),
        };
        let parsed = NsecRecord::parse(&nsec.to_rdata()).unwrap();
        assert_eq!(parsed, nsec);
    }

    #[test]
    fn test_parse_rejects_bad_bitmap() {
        let mut wire = Name::root().to_wire();
        wire.extend_from_slice(&[0, 0]); // zero-length window
        assert!(NsecRecord::parse(&wire).is_err());
    }
}
