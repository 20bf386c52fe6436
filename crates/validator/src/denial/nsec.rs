use tracing::debug;

use vigil_dns_domain::{Name, RecordType};

use crate::types::NsecRecord;

use super::covers;

/// What one NSEC record proves about a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsecCover {
    /// The query name exists (exactly or as an empty non-terminal).
    pub exists: bool,
    /// The query type is present at the name (only meaningful with `exists`).
    pub data: bool,
    /// The wildcard that could still synthesize an answer for the query
    /// name, derived from the NSEC pair's closest common ancestor.
    pub wild: Option<Name>,
}

/// Classical NSEC reasoning: decide whether `qname`/`qtype` exists given an
/// NSEC record at `owner`. Returns `None` when the record proves nothing
/// about the query.
pub fn nsec_noexist_nodata(
    qtype: RecordType,
    qname: &Name,
    owner: &Name,
    nsec: &NsecRecord,
) -> Option<NsecCover> {
    let next = &nsec.next;

    if qname == owner {
        // A parent-side NSEC (delegation: NS without SOA) can only speak
        // for the delegation's own DS.
        if qtype != RecordType::DS
            && nsec.type_present(RecordType::NS)
            && !nsec.type_present(RecordType::SOA)
        {
            debug!(name = %qname, "ignoring parent-side NSEC at delegation");
            return None;
        }
        let data = nsec.type_present(qtype)
            || (qtype != RecordType::CNAME && nsec.type_present(RecordType::CNAME));
        return Some(NsecCover {
            exists: true,
            data,
            wild: owner.is_wildcard().then(|| owner.clone()),
        });
    }

    if !covers(qname, owner, next) {
        return None;
    }

    // Names below a delegation NSEC are occluded; the parent cannot deny
    // them.
    if qname.is_subdomain_of(owner)
        && nsec.type_present(RecordType::NS)
        && !nsec.type_present(RecordType::SOA)
    {
        debug!(name = %qname, owner = %owner, "query name is below a delegation NSEC");
        return None;
    }

    // If the next name sits below the query name, the query name is an
    // empty non-terminal: it exists but holds no data.
    if next.is_subdomain_of(qname) {
        return Some(NsecCover {
            exists: true,
            data: false,
            wild: None,
        });
    }

    // The query name is covered, hence does not exist. The only wildcard
    // that could still match lives at the closest common ancestor of the
    // NSEC pair.
    let wild = owner.common_ancestor(next).to_wildcard();
    Some(NsecCover {
        exists: false,
        data: false,
        wild: Some(wild),
    })
}
