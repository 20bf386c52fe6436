//! Vigil DNS validator engine.
//!
//! The core of an iterative DNSSEC validator: given a candidate answer (a
//! positive RRset with signatures, a negative response, or an unsigned
//! response), decide whether it is cryptographically secure, provably
//! insecure, or bogus. Additional material (DNSKEY, DS, NSEC/NSEC3, CNAME)
//! is resolved on demand through the [`Resolver`] and [`View`] contracts
//! supplied by the embedder.

pub mod crypto;
pub mod denial;
pub mod rdataset;
pub mod resolver;
pub mod trust_anchor;
pub mod types;
pub mod validator;
pub mod view;

pub use rdataset::{AuthorityMessage, NcacheEntry, Rcode, Rdataset};
pub use resolver::{FetchOptions, FetchReply, FetchResult, Resolver, StaticResolver};
pub use trust_anchor::{TrustAnchor, TrustAnchorStore};
pub use types::{DnskeyRecord, DsRecord, Nsec3Record, NsecRecord, RrsigRecord};
pub use validator::{
    DnssecValidator, Proofs, ValidationOptions, ValidationOutcome, ValidationRequest,
    ValidatorHandle,
};
pub use view::{MemoryView, View, ViewAnswer, ViewFind};
