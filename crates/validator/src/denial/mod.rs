//! Denial-of-existence reasoning over NSEC and NSEC3 records.
//!
//! Both entry points classify a single record against a query: either the
//! record is irrelevant (`None`), or it contributes facts — the query name
//! exists / does not exist, the type is present / absent, and for NSEC3 the
//! closest-encloser and next-closer discoveries the orchestrator folds into
//! its proof flags.

pub mod nsec;
pub mod nsec3;

pub use nsec::{nsec_noexist_nodata, NsecCover};
pub use nsec3::{iterated_hash, nsec3_noexist_nodata, Nsec3Cover};

/// Canonical-order covering check shared by NSEC (names) and NSEC3
/// (hashes): does `item` fall strictly between `owner` and `next`,
/// accounting for the chain wrapping at the end of the zone?
pub(crate) fn covers<T: Ord + ?Sized>(item: &T, owner: &T, next: &T) -> bool {
    if owner < next {
        owner < item && item < next
    } else {
        // Last record of the chain (or a single-record chain): everything
        // after the owner or before the next name is covered.
        item > owner || item < next
    }
}

#[cfg(test)]
mod tests {
    use super::covers;

    #[test]
    fn test_covers_plain_range() {
        assert!(covers(&5, &1, &9));
        assert!(!covers(&1, &1, &9));
        assert!(!covers(&9, &1, &9));
        assert!(!covers(&0, &1, &9));
    }

    #[test]
    fn test_covers_wrapping_range() {
        // owner > next: the range wraps past the zone apex.
        assert!(covers(&10, &8, &2));
        assert!(covers(&1, &8, &2));
        assert!(!covers(&5, &8, &2));
        // Single-record chain covers everything but the owner itself.
        assert!(covers(&3, &4, &4));
        assert!(!covers(&4, &4, &4));
    }
}
