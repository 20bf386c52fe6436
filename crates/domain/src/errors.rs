use thiserror::Error;

/// Failure taxonomy delivered to validation callers.
///
/// A successful validation (secure or provably insecure) is the `Ok` arm of
/// the outcome; these are the ways it can go wrong.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no RRSIG of this answer verified")]
    NoValidSig,

    #[error("DNSKEY set exists but no key matches a trust anchor")]
    NoValidKey,

    #[error("no trust anchor found and no DS could be obtained")]
    NoValidDs,

    #[error("denial-of-existence proof required but absent or insufficient")]
    NoValidNsec,

    #[error("policy requires this name to be secure")]
    MustBeSecure,

    #[error("reached the query name without finding a break in the chain of trust")]
    NotInsecure,

    #[error("broken chain of trust")]
    BrokenChain,

    #[error("validation canceled")]
    Canceled,

    #[error("malformed record: {0}")]
    BadRecord(String),

    #[error("unsupported label type in name")]
    BadLabelType,

    #[error("invalid domain name: {0}")]
    InvalidName(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
