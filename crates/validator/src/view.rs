use dashmap::DashMap;
use std::sync::Mutex;
use tracing::trace;

use vigil_dns_domain::{Name, RecordType};

use crate::rdataset::Rdataset;

/// Outcome classes of a view (zone + cache) lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewFind {
    Success,
    NcacheNxdomain,
    NcacheNxrrset,
    Nxrrset,
    Nxdomain,
    EmptyName,
    NotFound,
    BrokenChain,
    Cname,
}

/// A view lookup result: the classification plus whatever rdatasets the
/// view could supply (e.g. the proving NSEC set for an NXRRSET).
#[derive(Debug, Clone)]
pub struct ViewAnswer {
    pub result: ViewFind,
    pub rdataset: Option<Rdataset>,
    pub sigrdataset: Option<Rdataset>,
}

impl ViewAnswer {
    pub fn not_found() -> Self {
        Self {
            result: ViewFind::NotFound,
            rdataset: None,
            sigrdataset: None,
        }
    }

    pub fn found(rdataset: Rdataset, sigrdataset: Option<Rdataset>) -> Self {
        Self {
            result: ViewFind::Success,
            rdataset: Some(rdataset),
            sigrdataset,
        }
    }
}

/// The view the validator consults before going to the resolver: cached
/// rdatasets, negative entries, and zone-cut knowledge. Implementations are
/// internally synchronized.
pub trait View: Send + Sync {
    fn find(&self, name: &Name, qtype: RecordType) -> ViewAnswer;

    /// The deepest known zone cut at or above `name`.
    fn find_zone_cut(&self, name: &Name) -> Option<Name>;

    /// Retire a compromised (revoked) trust anchor.
    fn untrust(&self, name: &Name, key_tag: u16);
}

/// A dashmap-backed view for tests and embedders bootstrapping a resolver:
/// exact (name, type) entries plus an explicit zone-cut list.
#[derive(Default)]
pub struct MemoryView {
    entries: DashMap<(Name, u16), ViewAnswer>,
    zone_cuts: Mutex<Vec<Name>>,
    untrusted: Mutex<Vec<(Name, u16)>>,
}

impl MemoryView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, name: Name, qtype: RecordType, answer: ViewAnswer) {
        trace!(name = %name, qtype = %qtype, result = ?answer.result, "view entry added");
        self.entries.insert((name, qtype.to_u16()), answer);
    }

    pub fn insert_zone_cut(&self, name: Name) {
        self.zone_cuts.lock().expect("zone cut lock").push(name);
    }

    /// Names and key tags retired through [`View::untrust`], in call order.
    pub fn untrusted(&self) -> Vec<(Name, u16)> {
        self.untrusted.lock().expect("untrust lock").clone()
    }
}

impl View for MemoryView {
    fn find(&self, name: &Name, qtype: RecordType) -> ViewAnswer {
        self.entries
            .get(&(name.clone(), qtype.to_u16()))
            .map(|entry| entry.value().clone())
            .unwrap_or_else(ViewAnswer::not_found)
    }

    fn find_zone_cut(&self, name: &Name) -> Option<Name> {
        self.zone_cuts
            .lock()
            .expect("zone cut lock")
            .iter()
            .filter(|cut| name.is_subdomain_of(cut))
            .max_by_key(|cut| cut.num_labels())
            .cloned()
    }

    fn untrust(&self, name: &Name, key_tag: u16) {
        self.untrusted
            .lock()
            .expect("untrust lock")
            .push((name.clone(), key_tag));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_dns_domain::TrustLevel;

    fn name(s: &str) -> Name {
        s.parse().unwrap()
    }

    #[test]
    fn test_memory_view_find() {
        let view = MemoryView::new();
        let set = Rdataset::new(name("a.example."), RecordType::A, 300, vec![vec![1, 2, 3, 4]])
            .with_trust(TrustLevel::Secure);
        view.insert(name("a.example."), RecordType::A, ViewAnswer::found(set, None));

        let hit = view.find(&name("a.example."), RecordType::A);
        assert_eq!(hit.result, ViewFind::Success);
        assert_eq!(hit.rdataset.unwrap().trust, TrustLevel::Secure);

        let miss = view.find(&name("a.example."), RecordType::AAAA);
        assert_eq!(miss.result, ViewFind::NotFound);
    }

    #[test]
    fn test_zone_cut_deepest_match() {
        let view = MemoryView::new();
        view.insert_zone_cut(name("example."));
        view.insert_zone_cut(name("sub.example."));

        assert_eq!(
            view.find_zone_cut(&name("host.sub.example.")),
            Some(name("sub.example."))
        );
        assert_eq!(view.find_zone_cut(&name("other.")), None);
    }

    #[test]
    fn test_untrust_records_calls() {
        let view = MemoryView::new();
        view.untrust(&name("example."), 20326);
        assert_eq!(view.untrusted(), vec![(name("example."), 20326)]);
    }
}
