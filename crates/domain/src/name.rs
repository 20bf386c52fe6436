use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::errors::ValidationError;

const MAX_LABEL_LEN: usize = 63;
const MAX_WIRE_LEN: usize = 255;

/// An absolute DNS name, stored as lowercased labels in query order (leftmost
/// label first). The root name has zero labels.
///
/// `Ord` is the canonical DNS ordering of RFC 4034 §6.1 (labels compared
/// right to left, bytewise), which is what NSEC covering checks require.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name {
    labels: Vec<Vec<u8>>,
}

impl Name {
    pub fn root() -> Self {
        Name { labels: Vec::new() }
    }

    pub fn is_root(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of labels, excluding the root.
    pub fn num_labels(&self) -> usize {
        self.labels.len()
    }

    pub fn is_wildcard(&self) -> bool {
        self.labels.first().map(|l| l.as_slice()) == Some(b"*")
    }

    /// The name with its leftmost label removed; `None` at the root.
    pub fn parent(&self) -> Option<Name> {
        if self.labels.is_empty() {
            return None;
        }
        Some(Name {
            labels: self.labels[1..].to_vec(),
        })
    }

    /// The name consisting of the last `count` labels of this name.
    /// `count` of zero yields the root; counts past the end yield a clone.
    pub fn suffix(&self, count: usize) -> Name {
        if count >= self.labels.len() {
            return self.clone();
        }
        Name {
            labels: self.labels[self.labels.len() - count..].to_vec(),
        }
    }

    /// `*.` prepended to this name.
    pub fn to_wildcard(&self) -> Name {
        let mut labels = Vec::with_capacity(self.labels.len() + 1);
        labels.push(b"*".to_vec());
        labels.extend_from_slice(&self.labels);
        Name { labels }
    }

    /// True when `self` equals `other` or sits below it.
    pub fn is_subdomain_of(&self, other: &Name) -> bool {
        if other.labels.len() > self.labels.len() {
            return false;
        }
        let skip = self.labels.len() - other.labels.len();
        self.labels[skip..] == other.labels[..]
    }

    /// The deepest name that is an ancestor of (or equal to) both inputs.
    pub fn common_ancestor(&self, other: &Name) -> Name {
        let mut common = 0;
        let mut a = self.labels.iter().rev();
        let mut b = other.labels.iter().rev();
        while let (Some(x), Some(y)) = (a.next(), b.next()) {
            if x != y {
                break;
            }
            common += 1;
        }
        self.suffix(common)
    }

    /// Uncompressed wire form: length-prefixed labels, terminated by a zero
    /// octet. Labels are already lowercase, so this is the canonical form.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut wire = Vec::with_capacity(self.len_in_wire());
        for label in &self.labels {
            wire.push(label.len() as u8);
            wire.extend_from_slice(label);
        }
        wire.push(0);
        wire
    }

    fn len_in_wire(&self) -> usize {
        self.labels.iter().map(|l| l.len() + 1).sum::<usize>() + 1
    }

    /// Parse an uncompressed wire-format name starting at the beginning of
    /// `data`. Returns the name and the number of octets consumed.
    ///
    /// Compression pointers are not legal inside the rdata this validator
    /// parses, and bitstring labels (type 0x41) are a withdrawn experiment;
    /// both are rejected.
    pub fn from_wire(data: &[u8]) -> Result<(Name, usize), ValidationError> {
        let mut labels = Vec::new();
        let mut pos = 0usize;
        let mut total = 0usize;
        loop {
            let len = *data
                .get(pos)
                .ok_or_else(|| ValidationError::BadRecord("truncated name".into()))?
                as usize;
            pos += 1;
            if len == 0 {
                break;
            }
            if len & 0xC0 == 0xC0 {
                return Err(ValidationError::BadRecord(
                    "compression pointer in rdata name".into(),
                ));
            }
            if len & 0xC0 != 0 {
                // 0x41 "binary" labels and the reserved 0x80 type.
                return Err(ValidationError::BadLabelType);
            }
            let end = pos + len;
            if end > data.len() {
                return Err(ValidationError::BadRecord("truncated label".into()));
            }
            total += len + 1;
            if total + 1 > MAX_WIRE_LEN {
                return Err(ValidationError::InvalidName("name too long".into()));
            }
            labels.push(data[pos..end].to_ascii_lowercase());
            pos = end;
        }
        Ok((Name { labels }, pos))
    }

    fn canonical_cmp(&self, other: &Name) -> Ordering {
        let mut a = self.labels.iter().rev();
        let mut b = other.labels.iter().rev();
        loop {
            match (a.next(), b.next()) {
                (None, None) => return Ordering::Equal,
                (None, Some(_)) => return Ordering::Less,
                (Some(_), None) => return Ordering::Greater,
                (Some(x), Some(y)) => match x.as_slice().cmp(y.as_slice()) {
                    Ordering::Equal => continue,
                    ord => return ord,
                },
            }
        }
    }
}

impl Ord for Name {
    fn cmp(&self, other: &Self) -> Ordering {
        self.canonical_cmp(other)
    }
}

impl PartialOrd for Name {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Name {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_suffix('.').unwrap_or(s);
        if trimmed.is_empty() {
            return Ok(Name::root());
        }
        if trimmed.starts_with("\\[") {
            // Textual form of the withdrawn bitstring-label experiment.
            return Err(ValidationError::BadLabelType);
        }
        let mut labels = Vec::new();
        let mut total = 0usize;
        for label in trimmed.split('.') {
            if label.is_empty() {
                return Err(ValidationError::InvalidName(format!("empty label in '{s}'")));
            }
            if label.len() > MAX_LABEL_LEN {
                return Err(ValidationError::InvalidName(format!("label too long in '{s}'")));
            }
            total += label.len() + 1;
            if total + 1 > MAX_WIRE_LEN {
                return Err(ValidationError::InvalidName(format!("name too long: '{s}'")));
            }
            labels.push(label.as_bytes().to_ascii_lowercase());
        }
        Ok(Name { labels })
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.labels.is_empty() {
            return f.write_str(".");
        }
        for label in &self.labels {
            for &b in label {
                if b == b'.' || b == b'\\' {
                    write!(f, "\\{}", b as char)?;
                } else if b.is_ascii_graphic() {
                    write!(f, "{}", b as char)?;
                } else {
                    write!(f, "\\{:03}", b)?;
                }
            }
            f.write_str(".")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Name {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(name("Example.COM.").to_string(), "example.com.");
        assert_eq!(name(".").to_string(), ".");
        assert_eq!(name("").to_string(), ".");
        assert_eq!(name("a.b.c").num_labels(), 3);
        assert!(Name::root().is_root());
    }

    #[test]
    fn test_rejects_bad_labels() {
        assert!("a..b".parse::<Name>().is_err());
        assert!(matches!(
            "\\[b11010000/16].example".parse::<Name>(),
            Err(ValidationError::BadLabelType)
        ));
        let long = "a".repeat(64);
        assert!(long.parse::<Name>().is_err());
    }

    #[test]
    fn test_parent_and_suffix() {
        let n = name("a.b.example.com.");
        assert_eq!(n.parent().unwrap(), name("b.example.com."));
        assert_eq!(n.suffix(2), name("example.com."));
        assert_eq!(n.suffix(0), Name::root());
        assert!(Name::root().parent().is_none());
    }

    #[test]
    fn test_subdomain() {
        assert!(name("a.b.example.").is_subdomain_of(&name("example.")));
        assert!(name("example.").is_subdomain_of(&name("example.")));
        assert!(name("example.").is_subdomain_of(&Name::root()));
        assert!(!name("example.").is_subdomain_of(&name("a.example.")));
        assert!(!name("badexample.").is_subdomain_of(&name("example.")));
    }

    #[test]
    fn test_wildcard() {
        let w = name("wild.example.").to_wildcard();
        assert_eq!(w, name("*.wild.example."));
        assert!(w.is_wildcard());
        assert_eq!(w.parent().unwrap(), name("wild.example."));
    }

    #[test]
    fn test_canonical_ordering() {
        // Ordering examples from RFC 4034 §6.1.
        let ordered = [
            name("example."),
            name("a.example."),
            name("yljkjljk.a.example."),
            name("z.a.example."),
            name("zabc.a.example."),
            name("z.example."),
        ];
        for pair in ordered.windows(2) {
            assert!(pair[0] < pair[1], "{} !< {}", pair[0], pair[1]);
        }
        assert!(Name::root() < name("example."));
    }

    #[test]
    fn test_common_ancestor() {
        assert_eq!(
            name("a.x.example.").common_ancestor(&name("b.x.example.")),
            name("x.example.")
        );
        assert_eq!(
            name("a.example.").common_ancestor(&name("other.")),
            Name::root()
        );
    }

    #[test]
    fn test_wire_round_trip() {
        let n = name("www.Example.org.");
        let wire = n.to_wire();
        assert_eq!(wire, b"\x03www\x07example\x03org\x00".to_vec());
        let (parsed, used) = Name::from_wire(&wire).unwrap();
        assert_eq!(parsed, n);
        assert_eq!(used, wire.len());

        assert_eq!(Name::root().to_wire(), vec![0]);
    }

    #[test]
    fn test_wire_rejects_compression_and_bitstrings() {
        assert!(matches!(
            Name::from_wire(&[0xC0, 0x04]),
            Err(ValidationError::BadRecord(_))
        ));
        assert!(matches!(
            Name::from_wire(&[0x41, 0x01, 0x00]),
            Err(ValidationError::BadLabelType)
        ));
        assert!(Name::from_wire(&[5, b'a']).is_err());
    }
}
