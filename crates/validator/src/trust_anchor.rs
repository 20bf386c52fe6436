use base64::{engine::general_purpose::STANDARD, Engine};

use vigil_dns_domain::Name;

use crate::types::DnskeyRecord;

/// A configured secure entry point: a DNSKEY trusted a priori for a name.
#[derive(Debug, Clone)]
pub struct TrustAnchor {
    pub name: Name,
    pub dnskey: DnskeyRecord,
}

impl TrustAnchor {
    pub fn new(name: Name, dnskey: DnskeyRecord) -> Self {
        Self { name, dnskey }
    }

    pub fn matches(&self, dnskey: &DnskeyRecord) -> bool {
        self.dnskey.key_tag() == dnskey.key_tag()
            && self.dnskey.algorithm == dnskey.algorithm
            && self.dnskey.public_key == dnskey.public_key
    }
}

/// The table of trust anchors the validator walks from.
///
/// Injected into every validator; tests supply synthetic tables, servers
/// share one snapshot across views.
#[derive(Debug, Clone)]
pub struct TrustAnchorStore {
    anchors: Vec<TrustAnchor>,
}

impl TrustAnchorStore {
    pub fn new() -> Self {
        Self {
            anchors: Self::default_root_anchors(),
        }
    }

    pub fn empty() -> Self {
        Self {
            anchors: Vec::new(),
        }
    }

    pub fn default_root_anchors() -> Vec<TrustAnchor> {
        vec![TrustAnchor::new(Name::root(), Self::root_ksk_20326())]
    }

    /// Root KSK-2017, key tag 20326.
    fn root_ksk_20326() -> DnskeyRecord {
        let public_key_b64 = concat!(
            "AwEAAaz/tAm8yTn4Mfeh5eyI96WSVexTBAvkMgJzkKTOiW1vkIbzxeF3",
            "+/4RgWOq7HrxRixHlFlExOLAJr5emLvN7SWXgnLh4+B5xQlNVz8Og8kv",
            "ArMtNROxVQuCaSnIDdD5LKyWbRd2n9WGe2R8PzgCmr3EgVLrjyBxWezF",
            "0jLHwVN8efS3rCj/EWgvIWgb9tarpVUDK/b58Da+sqqls3eNbuv7pr+e",
            "oZG+SrDK6nWeL3c6H5Apxz7LjVc1uTIdsIXxuOLYA4/ilBmSVIzuDWfd",
            "RUfhHdY6+cn8HFRm+2hM8AnXGXws9555KrUB5qihylGa8subX2Nn6UwN",
            "R1AkUTV74bU="
        );

        let public_key = STANDARD
            .decode(public_key_b64)
            .expect("root KSK public key decodes");

        DnskeyRecord {
            flags: 257,
            protocol: 3,
            algorithm: 8,
            public_key,
        }
    }

    pub fn add_anchor(&mut self, anchor: TrustAnchor) {
        self.anchors.push(anchor);
    }

    /// Retire anchors for a (name, key tag) pair, e.g. when a self-signed
    /// key shows up revoked. Returns how many were removed.
    pub fn remove(&mut self, name: &Name, key_tag: u16) -> usize {
        let before = self.anchors.len();
        self.anchors
            .retain(|a| !(a.name == *name && a.dnskey.key_tag() == key_tag));
        before - self.anchors.len()
    }

    /// All anchored keys at exactly `name` matching the given algorithm and
    /// key tag, in configuration order. The returned slice of keys is the
    /// resumable key-node iteration: callers walk it front to back.
    pub fn find_keys(&self, name: &Name, algorithm: u8, key_tag: u16) -> Vec<DnskeyRecord> {
        self.anchors
            .iter()
            .filter(|a| {
                a.name == *name
                    && a.dnskey.algorithm == algorithm
                    && a.dnskey.key_tag() == key_tag
            })
            .map(|a| a.dnskey.clone())
            .collect()
    }

    /// Is any key anchored at exactly `name`, regardless of algorithm or
    /// tag? True makes the name a secure entry point.
    pub fn has_anchor_at(&self, name: &Name) -> bool {
        self.anchors.iter().any(|a| a.name == *name)
    }

    /// The deepest anchor name at or above `name`, if any.
    pub fn deepest_match(&self, name: &Name) -> Option<Name> {
        self.anchors
            .iter()
            .filter(|a| name.is_subdomain_of(&a.name))
            .max_by_key(|a| a.name.num_labels())
            .map(|a| a.name.clone())
    }

    pub fn is_trusted(&self, name: &Name, dnskey: &DnskeyRecord) -> bool {
        self.anchors
            .iter()
            .any(|a| a.name == *name && a.matches(dnskey))
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

impl Default for TrustAnchorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anchor_key(seed: u8) -> DnskeyRecord {
        DnskeyRecord {
            flags: 257,
            protocol: 3,
            algorithm: 15,
            public_key: vec![seed; 32],
        }
    }

    #[test]
    fn test_default_store_has_root_ksk() {
        let store = TrustAnchorStore::new();
        assert_eq!(store.len(), 1);
        assert_eq!(store.deepest_match(&"example.com.".parse().unwrap()), Some(Name::root()));
        // Key tag 20326 is pinned by the published anchor.
        assert_eq!(TrustAnchorStore::default_root_anchors()[0].dnskey.key_tag(), 20326);
    }

    #[test]
    fn test_deepest_match_prefers_longest() {
        let mut store = TrustAnchorStore::empty();
        store.add_anchor(TrustAnchor::new(Name::root(), anchor_key(1)));
        store.add_anchor(TrustAnchor::new("example.".parse().unwrap(), anchor_key(2)));

        assert_eq!(
            store.deepest_match(&"a.example.".parse().unwrap()),
            Some("example.".parse().unwrap())
        );
        assert_eq!(store.deepest_match(&"other.".parse().unwrap()), Some(Name::root()));
        assert_eq!(TrustAnchorStore::empty().deepest_match(&Name::root()), None);
    }

    #[test]
    fn test_find_keys_filters_on_tag_and_algorithm() {
        let key = anchor_key(3);
        let name: Name = "example.".parse().unwrap();
        let mut store = TrustAnchorStore::empty();
        store.add_anchor(TrustAnchor::new(name.clone(), key.clone()));

        assert_eq!(store.find_keys(&name, key.algorithm, key.key_tag()), vec![key.clone()]);
        assert!(store.find_keys(&name, key.algorithm, key.key_tag().wrapping_add(1)).is_empty());
        assert!(store.find_keys(&Name::root(), key.algorithm, key.key_tag()).is_empty());
    }

    #[test]
    fn test_remove_retires_anchor() {
        let key = anchor_key(4);
        let name: Name = "example.".parse().unwrap();
        let mut store = TrustAnchorStore::empty();
        store.add_anchor(TrustAnchor::new(name.clone(), key.clone()));

        assert_eq!(store.remove(&name, key.key_tag()), 1);
        assert!(store.is_empty());
    }
}
