use std::fmt;
use std::str::FromStr;

use crate::errors::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    DNAME,
    MX,
    TXT,
    PTR,
    SRV,
    SOA,
    NS,
    DS,
    DNSKEY,
    RRSIG,
    NSEC,
    NSEC3,
    NSEC3PARAM,
    CDS,
    CDNSKEY,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::CNAME => "CNAME",
            RecordType::DNAME => "DNAME",
            RecordType::MX => "MX",
            RecordType::TXT => "TXT",
            RecordType::PTR => "PTR",
            RecordType::SRV => "SRV",
            RecordType::SOA => "SOA",
            RecordType::NS => "NS",
            RecordType::DS => "DS",
            RecordType::DNSKEY => "DNSKEY",
            RecordType::RRSIG => "RRSIG",
            RecordType::NSEC => "NSEC",
            RecordType::NSEC3 => "NSEC3",
            RecordType::NSEC3PARAM => "NSEC3PARAM",
            RecordType::CDS => "CDS",
            RecordType::CDNSKEY => "CDNSKEY",
        }
    }

    pub fn to_u16(self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::NS => 2,
            RecordType::CNAME => 5,
            RecordType::SOA => 6,
            RecordType::PTR => 12,
            RecordType::MX => 15,
            RecordType::TXT => 16,
            RecordType::AAAA => 28,
            RecordType::SRV => 33,
            RecordType::DNAME => 39,
            RecordType::DS => 43,
            RecordType::RRSIG => 46,
            RecordType::NSEC => 47,
            RecordType::DNSKEY => 48,
            RecordType::NSEC3 => 50,
            RecordType::NSEC3PARAM => 51,
            RecordType::CDS => 59,
            RecordType::CDNSKEY => 60,
        }
    }

    pub fn from_u16(value: u16) -> Option<Self> {
        Some(match value {
            1 => RecordType::A,
            2 => RecordType::NS,
            5 => RecordType::CNAME,
            6 => RecordType::SOA,
            12 => RecordType::PTR,
            15 => RecordType::MX,
            16 => RecordType::TXT,
            28 => RecordType::AAAA,
            33 => RecordType::SRV,
            39 => RecordType::DNAME,
            43 => RecordType::DS,
            46 => RecordType::RRSIG,
            47 => RecordType::NSEC,
            48 => RecordType::DNSKEY,
            50 => RecordType::NSEC3,
            51 => RecordType::NSEC3PARAM,
            59 => RecordType::CDS,
            60 => RecordType::CDNSKEY,
            _ => return None,
        })
    }

    /// Types that live on the parent side of a zone cut and therefore can
    /// never be self-signed by the child zone.
    pub fn is_at_parent(self) -> bool {
        matches!(self, RecordType::DS | RecordType::CDS)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "A" => RecordType::A,
            "AAAA" => RecordType::AAAA,
            "CNAME" => RecordType::CNAME,
            "DNAME" => RecordType::DNAME,
            "MX" => RecordType::MX,
            "TXT" => RecordType::TXT,
            "PTR" => RecordType::PTR,
            "SRV" => RecordType::SRV,
            "SOA" => RecordType::SOA,
            "NS" => RecordType::NS,
            "DS" => RecordType::DS,
            "DNSKEY" => RecordType::DNSKEY,
            "RRSIG" => RecordType::RRSIG,
            "NSEC" => RecordType::NSEC,
            "NSEC3" => RecordType::NSEC3,
            "NSEC3PARAM" => RecordType::NSEC3PARAM,
            "CDS" => RecordType::CDS,
            "CDNSKEY" => RecordType::CDNSKEY,
            other => return Err(ValidationError::BadRecord(format!("unknown record type: {other}"))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u16_round_trip() {
        for rt in [
            RecordType::A,
            RecordType::NS,
            RecordType::SOA,
            RecordType::DS,
            RecordType::DNSKEY,
            RecordType::RRSIG,
            RecordType::NSEC,
            RecordType::NSEC3,
        ] {
            assert_eq!(RecordType::from_u16(rt.to_u16()), Some(rt));
        }
        assert_eq!(RecordType::from_u16(65280), None);
    }

    #[test]
    fn test_at_parent() {
        assert!(RecordType::DS.is_at_parent());
        assert!(!RecordType::DNSKEY.is_at_parent());
        assert!(!RecordType::NS.is_at_parent());
    }

    #[test]
    fn test_from_str_is_case_insensitive() {
        assert_eq!("dnskey".parse::<RecordType>().unwrap(), RecordType::DNSKEY);
        assert!("NOPE".parse::<RecordType>().is_err());
    }
}
