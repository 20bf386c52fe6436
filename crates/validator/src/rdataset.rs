use vigil_dns_domain::{Name, RecordType, TrustLevel};

/// Response codes the validator distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rcode {
    NoError,
    NxDomain,
    ServFail,
}

/// A set of records sharing owner name and type, as handed over by the
/// resolver or the view, together with the trust it has earned so far.
///
/// A negative-cache rdataset (`negative == true`) carries no rdata of its
/// own; instead it holds the authority material that was cached alongside
/// the negative response, which the denial engine iterates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rdataset {
    pub name: Name,
    pub rtype: RecordType,
    pub ttl: u32,
    pub trust: TrustLevel,
    pub rdatas: Vec<Vec<u8>>,
    pub negative: bool,
    /// Rcode of the negative response this set caches, when `negative`.
    pub rcode: Option<Rcode>,
    /// Cached authority entries of a negative response, when `negative`.
    pub entries: Vec<NcacheEntry>,
}

impl Rdataset {
    pub fn new(name: Name, rtype: RecordType, ttl: u32, rdatas: Vec<Vec<u8>>) -> Self {
        Self {
            name,
            rtype,
            ttl,
            trust: TrustLevel::Pending,
            rdatas,
            negative: false,
            rcode: None,
            entries: Vec::new(),
        }
    }

    pub fn negative(name: Name, covers: RecordType, rcode: Rcode, entries: Vec<NcacheEntry>) -> Self {
        Self {
            name,
            rtype: covers,
            ttl: 0,
            trust: TrustLevel::Pending,
            rdatas: Vec::new(),
            negative: true,
            rcode: Some(rcode),
            entries,
        }
    }

    pub fn with_trust(mut self, trust: TrustLevel) -> Self {
        self.trust = trust;
        self
    }

    /// Raise trust; never lowers an already-higher level.
    pub fn promote(&mut self, trust: TrustLevel) {
        if trust > self.trust {
            self.trust = trust;
        }
    }
}

/// One (owner, rdataset, signatures) triple from a message authority
/// section or a negative-cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NcacheEntry {
    pub name: Name,
    pub rdataset: Rdataset,
    pub sigrdataset: Option<Rdataset>,
}

/// The authority section of the response under validation, used for
/// denial-of-existence reasoning and NOQNAME proofs of wildcard answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorityMessage {
    pub rcode: Rcode,
    pub authority: Vec<NcacheEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promote_never_lowers() {
        let mut set = Rdataset::new(
            "example.".parse().unwrap(),
            RecordType::A,
            300,
            vec![vec![192, 0, 2, 1]],
        );
        assert_eq!(set.trust, TrustLevel::Pending);
        set.promote(TrustLevel::Secure);
        assert_eq!(set.trust, TrustLevel::Secure);
        set.promote(TrustLevel::Answer);
        assert_eq!(set.trust, TrustLevel::Secure);
    }

    #[test]
    fn test_negative_shape() {
        let neg = Rdataset::negative(
            "missing.example.".parse().unwrap(),
            RecordType::A,
            Rcode::NxDomain,
            Vec::new(),
        );
        assert!(neg.negative);
        assert_eq!(neg.rcode, Some(Rcode::NxDomain));
        assert!(neg.rdatas.is_empty());
    }
}
