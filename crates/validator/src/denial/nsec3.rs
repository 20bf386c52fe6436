use data_encoding::BASE32HEX_NOPAD;
use sha1::{Digest, Sha1};
use tracing::debug;

use vigil_dns_domain::{Name, RecordType};

use crate::types::nsec3::NSEC3_HASH_SHA1;
use crate::types::Nsec3Record;

use super::covers;

/// What one NSEC3 record contributes to a proof for a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Nsec3Cover {
    /// The query name's hash matched the record's owner hash.
    pub exists: bool,
    /// The query type is present (only meaningful with `exists`).
    pub data: bool,
    /// The record that covered the next-closer name carries the opt-out flag.
    pub optout: bool,
    /// The record declares a hash algorithm (or iteration count) this
    /// validator does not accept.
    pub unknown: bool,
    /// This record matched an ancestor of the query name: a closest-encloser
    /// candidate.
    pub set_closest: bool,
    /// This record covered a name on the query path: a next-closer candidate.
    pub set_nearest: bool,
    pub closest: Option<Name>,
    pub nearest: Option<Name>,
}

/// The RFC 5155 iterated hash: SHA-1 of the wire-form name and salt,
/// re-hashed with the salt `iterations` more times.
pub fn iterated_hash(salt: &[u8], iterations: u16, name_wire: &[u8]) -> Vec<u8> {
    let mut hasher = Sha1::new();
    hasher.update(name_wire);
    hasher.update(salt);
    let mut digest = hasher.finalize_reset().to_vec();
    for _ in 0..iterations {
        hasher.update(&digest);
        hasher.update(salt);
        digest = hasher.finalize_reset().to_vec();
    }
    digest
}

/// Decode the base32hex hash label an NSEC3 record is named by.
pub fn decode_hash_label(owner: &Name) -> Option<Vec<u8>> {
    let wire = owner.to_wire();
    let len = *wire.first()? as usize;
    if len == 0 || wire.len() < 1 + len {
        return None;
    }
    let label = wire[1..1 + len].to_ascii_uppercase();
    BASE32HEX_NOPAD.decode(&label).ok()
}

/// Classify `qname`/`qtype` against one NSEC3 record at `owner` within
/// `zonename`. Returns `None` when the record is foreign to the zone or
/// malformed.
///
/// `want_closest` suppresses closest-encloser discovery when the caller
/// already learned the encloser from a wildcard signature.
pub fn nsec3_noexist_nodata(
    qtype: RecordType,
    qname: &Name,
    owner: &Name,
    nsec3: &Nsec3Record,
    zonename: &Name,
    want_closest: bool,
    max_iterations: u16,
) -> Option<Nsec3Cover> {
    if nsec3.hash_algorithm != NSEC3_HASH_SHA1 {
        debug!(algorithm = nsec3.hash_algorithm, "unknown NSEC3 hash algorithm");
        return Some(Nsec3Cover {
            unknown: true,
            ..Default::default()
        });
    }
    if nsec3.iterations > max_iterations {
        debug!(
            iterations = nsec3.iterations,
            cap = max_iterations,
            "NSEC3 iteration count over the configured cap"
        );
        return Some(Nsec3Cover {
            unknown: true,
            ..Default::default()
        });
    }

    if !qname.is_subdomain_of(zonename) {
        return None;
    }
    if owner.parent().as_ref() != Some(zonename) {
        return None;
    }
    let owner_hash = decode_hash_label(owner)?;
    if owner_hash.len() != nsec3.next_hashed.len() {
        return None;
    }

    let mut cover = Nsec3Cover::default();

    // Hash every name on the path from the query name up to the zone apex;
    // a match is an existing ancestor, a covered hash a nonexistent one.
    let mut candidate = qname.clone();
    loop {
        let hash = iterated_hash(&nsec3.salt, nsec3.iterations, &candidate.to_wire());
        if hash == owner_hash {
            if candidate == *qname {
                cover.exists = true;
                cover.data = nsec3.type_present(qtype)
                    || (qtype != RecordType::CNAME && nsec3.type_present(RecordType::CNAME));
            } else if want_closest {
                cover.set_closest = true;
                cover.closest = Some(candidate.clone());
            }
        } else if covers(hash.as_slice(), owner_hash.as_slice(), nsec3.next_hashed.as_slice()) {
            // Track the covered name nearest the apex: that is the
            // next-closer candidate once a closest encloser is known.
            let replace = match &cover.nearest {
                Some(n) => candidate.num_labels() < n.num_labels(),
                None => true,
            };
            if replace {
                cover.set_nearest = true;
                cover.nearest = Some(candidate.clone());
                cover.optout = nsec3.opt_out();
            }
        }

        if candidate == *zonename {
            break;
        }
        match candidate.parent() {
            Some(parent) => candidate = parent,
            None => break,
        }
    }

    Some(cover)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::nsec::build_type_bitmap;
    use crate::types::nsec3::NSEC3_FLAG_OPTOUT;

    fn name(s: &str) -> Name {
        s.parse().unwrap()
    }

    fn hash_of(n: &Name) -> Vec<u8> {
        iterated_hash(&[0xAB], 5, &n.to_wire())
    }

    fn owner_for(hash: &[u8], zone: &Name) -> Name {
        format!("{}.{}", BASE32HEX_NOPAD.encode(hash).to_ascii_lowercase(), zone)
            .parse()
            .unwrap()
    }

    /// Byte-wise neighbors of a hash, for building tight covering ranges.
    fn dec(mut h: Vec<u8>) -> Vec<u8> {
        for byte in h.iter_mut().rev() {
            if *byte > 0 {
                *byte -= 1;
                break;
            }
            *byte = 0xFF;
        }
        h
    }

    fn inc(mut h: Vec<u8>) -> Vec<u8> {
        for byte in h.iter_mut().rev() {
            if *byte < 0xFF {
                *byte += 1;
                break;
            }
            *byte = 0;
        }
        h
    }

    fn record(flags: u8, next: Vec<u8>, types: &[RecordType]) -> Nsec3Record {
        Nsec3Record {
            hash_algorithm: NSEC3_HASH_SHA1,
            flags,
            iterations: 5,
            salt: vec![0xAB],
            next_hashed: next,
            type_bitmap: build_type_bitmap(types),
        }
    }

    #[test]
    fn test_iterated_hash_changes_with_iterations() {
        let wire = name("example.").to_wire();
        assert_ne!(iterated_hash(&[], 0, &wire), iterated_hash(&[], 1, &wire));
        assert_ne!(iterated_hash(&[1], 0, &wire), iterated_hash(&[2], 0, &wire));
        assert_eq!(iterated_hash(&[1], 3, &wire), iterated_hash(&[1], 3, &wire));
        assert_eq!(iterated_hash(&[], 0, &wire).len(), 20);
    }

    #[test]
    fn test_hash_label_round_trip() {
        let zone = name("example.");
        let hash = hash_of(&name("a.example."));
        let owner = owner_for(&hash, &zone);
        assert_eq!(decode_hash_label(&owner), Some(hash));
    }

    #[test]
    fn test_matching_record_reports_nodata() {
        let zone = name("example.");
        let qname = name("a.example.");
        let hash = hash_of(&qname);
        let owner = owner_for(&hash, &zone);
        let rec = record(0, inc(hash), &[RecordType::TXT]);

        let cover =
            nsec3_noexist_nodata(RecordType::A, &qname, &owner, &rec, &zone, true, 150).unwrap();
        assert!(cover.exists);
        assert!(!cover.data);

        let cover =
            nsec3_noexist_nodata(RecordType::TXT, &qname, &owner, &rec, &zone, true, 150).unwrap();
        assert!(cover.data);
    }

    #[test]
    fn test_covering_record_finds_next_closer() {
        let zone = name("example.");
        let qname = name("x.sub.example.");
        // The next closer of x.sub.example (with encloser example.) is
        // sub.example; cover its hash tightly.
        let h_sub = hash_of(&name("sub.example."));
        let owner = owner_for(&dec(h_sub.clone()), &zone);
        let rec = record(NSEC3_FLAG_OPTOUT, inc(h_sub), &[]);

        let cover =
            nsec3_noexist_nodata(RecordType::A, &qname, &owner, &rec, &zone, true, 150).unwrap();
        assert!(!cover.exists);
        assert!(cover.set_nearest);
        assert_eq!(cover.nearest, Some(name("sub.example.")));
        assert!(cover.optout);
    }

    #[test]
    fn test_closest_encloser_discovery() {
        let zone = name("example.");
        let qname = name("x.sub.example.");
        let h_sub = hash_of(&name("sub.example."));
        let owner = owner_for(&h_sub, &zone);
        let rec = record(0, inc(h_sub), &[]);

        let cover =
            nsec3_noexist_nodata(RecordType::A, &qname, &owner, &rec, &zone, true, 150).unwrap();
        assert!(cover.set_closest);
        assert_eq!(cover.closest, Some(name("sub.example.")));

        // Discovery suppressed when the encloser is already known.
        let cover =
            nsec3_noexist_nodata(RecordType::A, &qname, &owner, &rec, &zone, false, 150).unwrap();
        assert!(!cover.set_closest);
    }

    #[test]
    fn test_unknown_hash_and_iteration_cap() {
        let zone = name("example.");
        let qname = name("a.example.");
        let owner = owner_for(&hash_of(&qname), &zone);

        let mut rec = record(0, vec![0; 20], &[]);
        rec.hash_algorithm = 6;
        let cover =
            nsec3_noexist_nodata(RecordType::A, &qname, &owner, &rec, &zone, true, 150).unwrap();
        assert!(cover.unknown);

        let mut rec = record(0, vec![0; 20], &[]);
        rec.iterations = 151;
        let cover =
            nsec3_noexist_nodata(RecordType::A, &qname, &owner, &rec, &zone, true, 150).unwrap();
        assert!(cover.unknown);
    }

    #[test]
    fn test_foreign_records_ignored() {
        let zone = name("example.");
        let other = name("other.");
        let qname = name("a.example.");
        let rec = record(0, vec![0; 20], &[]);

        // Owner not directly under the zone name.
        let owner = owner_for(&hash_of(&qname), &other);
        assert!(nsec3_noexist_nodata(RecordType::A, &qname, &owner, &rec, &zone, true, 150)
            .is_none());

        // Query name outside the zone.
        let owner = owner_for(&hash_of(&qname), &zone);
        assert!(nsec3_noexist_nodata(RecordType::A, &name("a.other."), &owner, &rec, &zone, true, 150)
            .is_none());
    }
}
