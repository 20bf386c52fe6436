use async_trait::async_trait;
use bitflags::bitflags;
use dashmap::DashMap;

use vigil_dns_domain::{Name, RecordType};

use crate::rdataset::Rdataset;

bitflags! {
    /// Options forwarded with every fetch the validator starts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FetchOptions: u32 {
        /// Do not suppress server-side validation on the wire.
        const NOCDFLAG = 0x0001;
        /// Bypass negative trust anchors.
        const NONTA = 0x0002;
    }
}

/// How a fetch concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchResult {
    Success,
    NxDomain,
    NcacheNxDomain,
    NxRrset,
    NcacheNxRrset,
    Cname,
    ServFail,
    Canceled,
    Failed,
}

/// A completed fetch: the classification, the rdatasets that were obtained
/// (with whatever trust the resolver assigned), and the name the data was
/// actually found at.
#[derive(Debug, Clone)]
pub struct FetchReply {
    pub result: FetchResult,
    pub rdataset: Option<Rdataset>,
    pub sigrdataset: Option<Rdataset>,
    pub found_name: Option<Name>,
}

impl FetchReply {
    pub fn failed(result: FetchResult) -> Self {
        Self {
            result,
            rdataset: None,
            sigrdataset: None,
            found_name: None,
        }
    }
}

/// The recursive resolver the validator suspends on. Fetch timeouts are the
/// resolver's responsibility; the validator has no timer of its own.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn fetch(&self, name: &Name, qtype: RecordType, options: FetchOptions) -> FetchReply;

    /// Resolver-level bad cache: names/types that recently failed
    /// validation and should not be retried now.
    fn bad_cache_hit(&self, _name: &Name, _qtype: RecordType) -> bool {
        false
    }

    /// Resolver-local algorithm policy for DNSSEC signing algorithms.
    fn algorithm_supported(&self, name: &Name, algorithm: u8) -> bool;

    /// Resolver-local policy for DS digest types.
    fn ds_digest_supported(&self, name: &Name, digest_type: u8) -> bool;
}

/// A scripted resolver for tests and offline validation: replies come from
/// a fixed table, policy from fixed sets.
#[derive(Default)]
pub struct StaticResolver {
    replies: DashMap<(Name, u16), FetchReply>,
    bad_cache: DashMap<(Name, u16), ()>,
    disabled_algorithms: DashMap<u8, ()>,
    disabled_digests: DashMap<u8, ()>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, name: Name, qtype: RecordType, reply: FetchReply) {
        self.replies.insert((name, qtype.to_u16()), reply);
    }

    pub fn poison(&self, name: Name, qtype: RecordType) {
        self.bad_cache.insert((name, qtype.to_u16()), ());
    }

    pub fn disable_algorithm(&self, algorithm: u8) {
        self.disabled_algorithms.insert(algorithm, ());
    }

    pub fn disable_digest(&self, digest_type: u8) {
        self.disabled_digests.insert(digest_type, ());
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn fetch(&self, name: &Name, qtype: RecordType, _options: FetchOptions) -> FetchReply {
        self.replies
            .get(&(name.clone(), qtype.to_u16()))
            .map(|r| r.value().clone())
            .unwrap_or_else(|| FetchReply::failed(FetchResult::ServFail))
    }

    fn bad_cache_hit(&self, name: &Name, qtype: RecordType) -> bool {
        self.bad_cache.contains_key(&(name.clone(), qtype.to_u16()))
    }

    fn algorithm_supported(&self, _name: &Name, algorithm: u8) -> bool {
        !self.disabled_algorithms.contains_key(&algorithm)
    }

    fn ds_digest_supported(&self, _name: &Name, digest_type: u8) -> bool {
        !self.disabled_digests.contains_key(&digest_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Name {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_static_resolver_scripts_replies() {
        let resolver = StaticResolver::new();
        let set = Rdataset::new(name("example."), RecordType::DS, 300, vec![vec![0; 4]]);
        resolver.script(
            name("example."),
            RecordType::DS,
            FetchReply {
                result: FetchResult::Success,
                rdataset: Some(set),
                sigrdataset: None,
                found_name: Some(name("example.")),
            },
        );

        let hit = resolver
            .fetch(&name("example."), RecordType::DS, FetchOptions::empty())
            .await;
        assert_eq!(hit.result, FetchResult::Success);

        let miss = resolver
            .fetch(&name("other."), RecordType::DS, FetchOptions::empty())
            .await;
        assert_eq!(miss.result, FetchResult::ServFail);
    }

    #[tokio::test]
    async fn test_policy_hooks() {
        let resolver = StaticResolver::new();
        assert!(resolver.algorithm_supported(&name("example."), 8));
        resolver.disable_algorithm(8);
        assert!(!resolver.algorithm_supported(&name("example."), 8));

        assert!(resolver.ds_digest_supported(&name("example."), 2));
        resolver.disable_digest(2);
        assert!(!resolver.ds_digest_supported(&name("example."), 2));

        assert!(!resolver.bad_cache_hit(&name("example."), RecordType::A));
        resolver.poison(name("example."), RecordType::A);
        assert!(resolver.bad_cache_hit(&name("example."), RecordType::A));
    }
}
