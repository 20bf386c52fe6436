//! The validator orchestrator: classifies a request, drives positive,
//! zone-key, denial and insecurity validation, and manages the lifecycle of
//! sub-validators and fetches.

mod insecurity;
mod negative;
mod positive;
mod zonekey;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bitflags::bitflags;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use vigil_dns_domain::{Name, RecordType, TrustLevel, ValidationError, ValidatorConfig};

use crate::crypto::{SignatureVerifier, VerifyOutcome};
use crate::rdataset::{AuthorityMessage, Rcode, Rdataset};
use crate::resolver::{FetchOptions, FetchReply, Resolver};
use crate::trust_anchor::TrustAnchorStore;
use crate::types::{DnskeyRecord, RrsigRecord};
use crate::view::{View, ViewAnswer, ViewFind};

bitflags! {
    /// Request options. `DEFER` parks a spawned validator until
    /// [`ValidatorHandle::start`]; the other two are forwarded to fetches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ValidationOptions: u32 {
        const DEFER = 0x0001;
        const NOCDFLAG = 0x0002;
        const NONTA = 0x0004;
    }
}

bitflags! {
    /// Validator state bits: one-shot latches plus the NEED/FOUND pairs of
    /// the denial-of-existence proof search. Shutdown and cancellation are
    /// not bits here; they live in the future's lifecycle and the
    /// cancellation token.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub(crate) struct ValAttrs: u32 {
        const TRIEDVERIFY = 0x0004;
        const INSECURITY = 0x0010;

        const NEEDNOQNAME = 0x0000_0100;
        const NEEDNOWILDCARD = 0x0000_0200;
        const NEEDNODATA = 0x0000_0400;

        const FOUNDNOQNAME = 0x0000_1000;
        const FOUNDNOWILDCARD = 0x0000_2000;
        const FOUNDNODATA = 0x0000_4000;
        const FOUNDCLOSEST = 0x0000_8000;
        const FOUNDOPTOUT = 0x0001_0000;
        const FOUNDUNKNOWN = 0x0002_0000;
    }
}

/// What a validator is asked to decide about.
///
/// The shape of the request selects the validation strategy:
/// - rdataset and signatures: positive validation;
/// - rdataset alone: insecurity proof for an unsigned answer;
/// - no rdataset (or a negative-cache rdataset): denial validation.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    pub name: Name,
    pub qtype: RecordType,
    pub rdataset: Option<Rdataset>,
    pub sigrdataset: Option<Rdataset>,
    pub message: Option<AuthorityMessage>,
    pub options: ValidationOptions,
    /// Signature temporal checks are made relative to this epoch second;
    /// defaults to the wall clock at validator creation.
    pub start_time: Option<u64>,
}

impl ValidationRequest {
    pub fn positive(name: Name, qtype: RecordType, rdataset: Rdataset, sigrdataset: Rdataset) -> Self {
        Self {
            name,
            qtype,
            rdataset: Some(rdataset),
            sigrdataset: Some(sigrdataset),
            message: None,
            options: ValidationOptions::empty(),
            start_time: None,
        }
    }

    pub fn unsigned(name: Name, qtype: RecordType, rdataset: Rdataset) -> Self {
        Self {
            name,
            qtype,
            rdataset: Some(rdataset),
            sigrdataset: None,
            message: None,
            options: ValidationOptions::empty(),
            start_time: None,
        }
    }

    pub fn negative(name: Name, qtype: RecordType, message: AuthorityMessage) -> Self {
        Self {
            name,
            qtype,
            rdataset: None,
            sigrdataset: None,
            message: Some(message),
            options: ValidationOptions::empty(),
            start_time: None,
        }
    }

    /// Validation of a negative-cache rdataset (its cached authority
    /// entries carry the denial material).
    pub fn ncache(name: Name, qtype: RecordType, rdataset: Rdataset) -> Self {
        Self {
            name,
            qtype,
            rdataset: Some(rdataset),
            sigrdataset: None,
            message: None,
            options: ValidationOptions::empty(),
            start_time: None,
        }
    }

    pub fn with_message(mut self, message: AuthorityMessage) -> Self {
        self.message = Some(message);
        self
    }

    pub fn with_options(mut self, options: ValidationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_start_time(mut self, start_time: u64) -> Self {
        self.start_time = Some(start_time);
        self
    }
}

/// Names of the records that constitute each denial proof returned to the
/// caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Proofs {
    pub nodata: Option<Name>,
    pub noqname: Option<Name>,
    pub nowildcard: Option<Name>,
    pub closest_encloser: Option<Name>,
}

impl Proofs {
    pub fn is_empty(&self) -> bool {
        self.nodata.is_none()
            && self.noqname.is_none()
            && self.nowildcard.is_none()
            && self.closest_encloser.is_none()
    }
}

/// The single completion event a validator delivers.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    /// `Ok` for both secure and provably insecure answers; the `secure`
    /// flag and the rdataset trust distinguish them.
    pub result: Result<(), ValidationError>,
    pub name: Name,
    pub qtype: RecordType,
    pub rdataset: Option<Rdataset>,
    pub sigrdataset: Option<Rdataset>,
    pub message: Option<AuthorityMessage>,
    pub proofs: Proofs,
    pub secure: bool,
    pub optout: bool,
}

impl ValidationOutcome {
    fn canceled(name: Name, qtype: RecordType) -> Self {
        Self {
            result: Err(ValidationError::Canceled),
            name,
            qtype,
            rdataset: None,
            sigrdataset: None,
            message: None,
            proofs: Proofs::default(),
            secure: false,
            optout: false,
        }
    }

    pub fn is_secure(&self) -> bool {
        self.result.is_ok() && self.secure
    }

    /// Validated as living below a proven break in the chain of trust.
    pub fn is_insecure(&self) -> bool {
        self.result.is_ok() && !self.secure
    }
}

/// Internal success classification; both arms surface as `Ok(())`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    Secure,
    Insecure,
}

#[derive(Clone)]
pub(crate) struct Deps {
    pub(crate) view: Arc<dyn View>,
    pub(crate) resolver: Arc<dyn Resolver>,
    pub(crate) anchors: Arc<TrustAnchorStore>,
    pub(crate) config: Arc<ValidatorConfig>,
}

/// One ancestor in the sub-validator chain, for deadlock detection.
#[derive(Debug, Clone)]
pub(crate) struct ChainLink {
    name: Name,
    qtype: RecordType,
    /// The ancestor is a pure negative validation (message only). NSEC3
    /// meta-data lookups are allowed to repeat such a (name, type) pair:
    /// proving an NSEC3 record sometimes requires asking about itself.
    message_only: bool,
}

/// A validation in flight. Owns all mutable state; the enclosing future is
/// the only code that touches it, which serializes every state transition.
pub(crate) struct Validation {
    deps: Deps,
    req: ValidationRequest,
    cancel: CancellationToken,
    depth: u8,
    chain: Vec<ChainLink>,

    pub(crate) attrs: ValAttrs,
    pub(crate) proofs: Proofs,
    pub(crate) secure: bool,
    pub(crate) optout: bool,
    pub(crate) start: u64,

    /// DS set driving zone-key validation, once obtained.
    pub(crate) dsset: Option<Rdataset>,
    /// Closest-encloser candidate learned from a wildcard signature.
    pub(crate) closest: Option<Name>,
    /// Wildcard that could still synthesize the query name.
    pub(crate) wild: Option<Name>,
    /// Label-depth cursor of the insecurity walk.
    pub(crate) labels: usize,
    pub(crate) authcount: u32,
    pub(crate) authfail: u32,
    mustbesecure: bool,
}

impl Validation {
    pub(crate) fn new(
        deps: Deps,
        req: ValidationRequest,
        cancel: CancellationToken,
        depth: u8,
        parent_chain: Vec<ChainLink>,
    ) -> Self {
        let start = req.start_time.unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0)
        });
        let mustbesecure = deps.config.name_must_be_secure(&req.name);
        let mut chain = parent_chain;
        chain.push(ChainLink {
            name: req.name.clone(),
            qtype: req.qtype,
            message_only: req.message.is_some()
                && req.rdataset.is_none()
                && req.sigrdataset.is_none(),
        });
        Self {
            deps,
            req,
            cancel,
            depth,
            chain,
            attrs: ValAttrs::empty(),
            proofs: Proofs::default(),
            secure: false,
            optout: false,
            start,
            dsset: None,
            closest: None,
            wild: None,
            labels: 0,
            authcount: 0,
            authfail: 0,
            mustbesecure,
        }
    }

    pub(crate) async fn run(mut self) -> ValidationOutcome {
        if self.cancel.is_cancelled() {
            return ValidationOutcome::canceled(self.req.name.clone(), self.req.qtype);
        }
        debug!(name = %self.req.name, qtype = %self.req.qtype, depth = self.depth, "starting");
        let result = self.dispatch().await;
        self.finish(result)
    }

    /// Classify the request by shape, per the basic processing sequences:
    /// positive validation (with an insecurity fallback), insecurity proof
    /// for unsigned data, or negative validation.
    async fn dispatch(&mut self) -> Result<Disposition, ValidationError> {
        let has_rdataset = self.req.rdataset.is_some();
        let has_sig = self.req.sigrdataset.is_some();
        let is_negative = self.req.rdataset.as_ref().map(|r| r.negative).unwrap_or(false);

        if has_rdataset && has_sig {
            debug!(depth = self.depth, "attempting positive response validation");
            let first = if self.req.qtype == RecordType::DNSKEY && self.is_self_signed() {
                self.validate_zone_key().await
            } else {
                self.validate_answer().await
            };
            return match first {
                Err(ValidationError::NoValidSig) if !self.attrs.contains(ValAttrs::TRIEDVERIFY) => {
                    debug!(depth = self.depth, "falling back to insecurity proof");
                    match self.prove_unsecure().await {
                        Err(ValidationError::NotInsecure) => Err(ValidationError::NoValidSig),
                        other => other,
                    }
                }
                other => other,
            };
        }

        if has_rdataset && !is_negative {
            // Unsigned data: an insecure subdomain, or a broken server.
            debug!(depth = self.depth, "attempting insecurity proof");
            let result = self.prove_unsecure().await;
            if matches!(result, Err(ValidationError::NotInsecure)) {
                info!(
                    name = %self.req.name,
                    "got insecure response; parent indicates it should be secure"
                );
            }
            return result;
        }

        if (!has_rdataset && !has_sig && self.req.message.is_some()) || is_negative {
            debug!(depth = self.depth, "attempting negative response validation");
            let rcode = self
                .req
                .message
                .as_ref()
                .map(|m| m.rcode)
                .or_else(|| self.req.rdataset.as_ref().and_then(|r| r.rcode))
                .unwrap_or(Rcode::NoError);
            if rcode == Rcode::NxDomain {
                self.attrs
                    .insert(ValAttrs::NEEDNOQNAME | ValAttrs::NEEDNOWILDCARD);
            } else {
                self.attrs.insert(ValAttrs::NEEDNODATA);
            }
            return self.validate_nx().await;
        }

        panic!("validation request has no usable shape");
    }

    fn finish(mut self, result: Result<Disposition, ValidationError>) -> ValidationOutcome {
        let result = match result {
            Ok(_) => Ok(()),
            Err(error) => {
                debug!(name = %self.req.name, depth = self.depth, %error, "validation failed");
                Err(error)
            }
        };
        debug!(
            name = %self.req.name,
            qtype = %self.req.qtype,
            depth = self.depth,
            secure = self.secure,
            ok = result.is_ok(),
            "validator done"
        );
        ValidationOutcome {
            result,
            name: self.req.name.clone(),
            qtype: self.req.qtype,
            rdataset: self.req.rdataset.take(),
            sigrdataset: self.req.sigrdataset.take(),
            message: self.req.message.take(),
            proofs: std::mem::take(&mut self.proofs),
            secure: self.secure,
            optout: self.optout,
        }
    }

    // ---------------------------------------------------------------------
    // accessors shared by the phase modules
    // ---------------------------------------------------------------------

    pub(crate) fn name(&self) -> &Name {
        &self.req.name
    }

    pub(crate) fn qtype(&self) -> RecordType {
        self.req.qtype
    }

    pub(crate) fn rdataset(&self) -> Option<&Rdataset> {
        self.req.rdataset.as_ref()
    }

    pub(crate) fn sigrdataset(&self) -> Option<&Rdataset> {
        self.req.sigrdataset.as_ref()
    }

    pub(crate) fn message(&self) -> Option<&AuthorityMessage> {
        self.req.message.as_ref()
    }

    pub(crate) fn config(&self) -> &ValidatorConfig {
        &self.deps.config
    }

    pub(crate) fn resolver(&self) -> &dyn Resolver {
        self.deps.resolver.as_ref()
    }

    pub(crate) fn anchors(&self) -> &TrustAnchorStore {
        &self.deps.anchors
    }

    pub(crate) fn untrust_key(&self, name: &Name, key_tag: u16) {
        self.deps.view.untrust(name, key_tag);
    }

    pub(crate) fn view_find_zone_cut(&self, name: &Name) -> Option<Name> {
        self.deps.view.find_zone_cut(name)
    }

    // ---------------------------------------------------------------------
    // trust marking
    // ---------------------------------------------------------------------

    /// Raise the request rdatasets to secure and flag the outcome.
    pub(crate) fn mark_secure(&mut self) {
        if let Some(rdataset) = &mut self.req.rdataset {
            rdataset.promote(TrustLevel::Secure);
        }
        if let Some(sigrdataset) = &mut self.req.sigrdataset {
            sigrdataset.promote(TrustLevel::Secure);
        }
        self.secure = true;
    }

    /// Settle the request rdatasets at answer trust: validated as insecure.
    ///
    /// When the name is configured must-be-secure and a reason is given,
    /// the downgrade is refused.
    pub(crate) fn mark_answer(
        &mut self,
        place: &str,
        mbstext: Option<&str>,
    ) -> Result<Disposition, ValidationError> {
        if self.mustbesecure {
            if let Some(text) = mbstext {
                warn!(name = %self.req.name, "must be secure failure, {}", text);
                return Err(ValidationError::MustBeSecure);
            }
        }
        debug!(name = %self.req.name, depth = self.depth, "marking as answer ({place})");
        if let Some(rdataset) = &mut self.req.rdataset {
            rdataset.promote(TrustLevel::Answer);
        }
        if let Some(sigrdataset) = &mut self.req.sigrdataset {
            sigrdataset.promote(TrustLevel::Answer);
        }
        Ok(Disposition::Insecure)
    }

    // ---------------------------------------------------------------------
    // suspension points: fetches and sub-validators
    // ---------------------------------------------------------------------

    /// Would validating (name, qtype) repeat an ancestor and stall forever?
    fn check_deadlock(
        &self,
        name: &Name,
        qtype: RecordType,
        has_rdataset: bool,
        has_sig: bool,
    ) -> bool {
        for link in &self.chain {
            if link.qtype == qtype && link.name == *name {
                let nsec3_exception = link.qtype == RecordType::NSEC3
                    && has_rdataset
                    && has_sig
                    && link.message_only;
                if !nsec3_exception {
                    debug!(
                        name = %name,
                        qtype = %qtype,
                        "continuing validation would lead to deadlock: aborting validation"
                    );
                    return true;
                }
            }
        }
        false
    }

    /// Start a resolver fetch and suspend on it.
    pub(crate) async fn fetch(
        &mut self,
        name: &Name,
        qtype: RecordType,
        caller: &str,
    ) -> Result<FetchReply, ValidationError> {
        if self.check_deadlock(name, qtype, false, false) {
            debug!("deadlock found (create fetch)");
            return Err(ValidationError::NoValidSig);
        }

        let mut options = FetchOptions::empty();
        if self.req.options.contains(ValidationOptions::NOCDFLAG) {
            options |= FetchOptions::NOCDFLAG;
        }
        if self.req.options.contains(ValidationOptions::NONTA) {
            options |= FetchOptions::NONTA;
        }

        trace!(name = %name, qtype = %qtype, caller, "creating fetch");
        let reply = tokio::select! {
            reply = self.deps.resolver.fetch(name, qtype, options) => reply,
            _ = self.cancel.cancelled() => return Err(ValidationError::Canceled),
        };
        if self.cancel.is_cancelled() {
            return Err(ValidationError::Canceled);
        }
        Ok(reply)
    }

    /// Start a sub-validator for auxiliary data and suspend on it.
    #[async_recursion::async_recursion]
    pub(crate) async fn subvalidate(
        &mut self,
        name: Name,
        qtype: RecordType,
        rdataset: Option<Rdataset>,
        sigrdataset: Option<Rdataset>,
        caller: &str,
    ) -> Result<ValidationOutcome, ValidationError> {
        if self.check_deadlock(&name, qtype, rdataset.is_some(), sigrdataset.is_some()) {
            debug!("deadlock found (create validator)");
            return Err(ValidationError::NoValidSig);
        }
        if self.depth >= self.deps.config.max_validation_depth {
            debug!(depth = self.depth, "validation depth limit reached");
            return Err(ValidationError::NoValidSig);
        }

        trace!(name = %name, qtype = %qtype, caller, "creating validator");
        let request = ValidationRequest {
            name,
            qtype,
            rdataset,
            sigrdataset,
            message: None,
            options: self.req.options
                & (ValidationOptions::NOCDFLAG | ValidationOptions::NONTA),
            start_time: Some(self.start),
        };
        let child = Validation::new(
            self.deps.clone(),
            request,
            self.cancel.clone(),
            self.depth + 1,
            self.chain.clone(),
        );
        let outcome = child.run().await;
        if self.cancel.is_cancelled() {
            return Err(ValidationError::Canceled);
        }
        Ok(outcome)
    }

    /// Consult the view, short-circuiting names the resolver has black-listed.
    pub(crate) fn view_find(&self, name: &Name, qtype: RecordType) -> ViewAnswer {
        if self.deps.resolver.bad_cache_hit(name, qtype) {
            info!(name = %name, qtype = %qtype, "bad cache hit");
            return ViewAnswer {
                result: ViewFind::BrokenChain,
                rdataset: None,
                sigrdataset: None,
            };
        }
        self.deps.view.find(name, qtype)
    }

    // ---------------------------------------------------------------------
    // signature verification
    // ---------------------------------------------------------------------

    /// Verify one RRSIG over the request rdataset with one key, retrying
    /// once with time checks disabled when the view accepts expired
    /// signatures. A verified wildcard synthesis for another name records
    /// the NOQNAME obligation and the closest-encloser candidate.
    pub(crate) fn verify_one(&mut self, key: &DnskeyRecord, siginfo: &RrsigRecord) -> bool {
        self.attrs.insert(ValAttrs::TRIEDVERIFY);
        let Some(rdataset) = self.req.rdataset.clone() else {
            return false;
        };

        let mut ignored_time = false;
        let outcome = loop {
            let outcome = SignatureVerifier.verify_rrset(
                &self.req.name,
                &rdataset,
                siginfo,
                key,
                self.start,
                ignored_time,
            );
            match outcome {
                VerifyOutcome::SigExpired | VerifyOutcome::SigFuture
                    if self.deps.config.accept_expired && !ignored_time =>
                {
                    ignored_time = true;
                }
                other => break other,
            }
        };

        match &outcome {
            VerifyOutcome::Valid | VerifyOutcome::FromWildcard(_) if ignored_time => {
                info!(keyid = siginfo.key_tag, "accepted expired RRSIG");
            }
            VerifyOutcome::SigExpired | VerifyOutcome::SigFuture => {
                info!(
                    keyid = siginfo.key_tag,
                    outcome = ?outcome,
                    "verify failed due to bad signature"
                );
            }
            _ => {
                debug!(keyid = siginfo.key_tag, outcome = ?outcome, "verify rdataset");
            }
        }

        match outcome {
            VerifyOutcome::Valid => true,
            VerifyOutcome::FromWildcard(wild) => {
                if wild != self.req.name {
                    // Remember the closest encloser in case the NSEC3
                    // NOQNAME proof needs it.
                    self.closest = wild.parent();
                    self.attrs.insert(ValAttrs::NEEDNOQNAME);
                }
                true
            }
            _ => false,
        }
    }
}

/// The embedder-facing validator factory: one per view, holding the shared
/// collaborators every validation runs against.
pub struct DnssecValidator {
    deps: Deps,
}

impl DnssecValidator {
    pub fn new(
        view: Arc<dyn View>,
        resolver: Arc<dyn Resolver>,
        anchors: Arc<TrustAnchorStore>,
        config: ValidatorConfig,
    ) -> Self {
        Self {
            deps: Deps {
                view,
                resolver,
                anchors,
                config: Arc::new(config),
            },
        }
    }

    /// Validate inline on the caller's task.
    pub async fn validate(&self, request: ValidationRequest) -> ValidationOutcome {
        Validation::new(
            self.deps.clone(),
            request,
            CancellationToken::new(),
            0,
            Vec::new(),
        )
        .run()
        .await
    }

    /// Run a validation on its own task, returning a handle that can cancel
    /// it and must be joined for the (exactly-once) completion event.
    ///
    /// With `ValidationOptions::DEFER` the validator is created parked and
    /// does not start until [`ValidatorHandle::start`].
    pub fn spawn(&self, request: ValidationRequest) -> ValidatorHandle {
        let deferred = request.options.contains(ValidationOptions::DEFER);
        let cancel = CancellationToken::new();
        let start = Arc::new(Notify::new());
        let name = request.name.clone();
        let qtype = request.qtype;

        let deps = self.deps.clone();
        let task_cancel = cancel.clone();
        let task_start = start.clone();
        let task = tokio::spawn(async move {
            if deferred {
                tokio::select! {
                    _ = task_start.notified() => {}
                    _ = task_cancel.cancelled() => {
                        debug!(name = %name, "canceled before start");
                        return ValidationOutcome::canceled(name, qtype);
                    }
                }
            }
            Validation::new(deps, request, task_cancel, 0, Vec::new())
                .run()
                .await
        });

        ValidatorHandle {
            cancel,
            start,
            task,
        }
    }
}

/// Handle to a spawned validation.
pub struct ValidatorHandle {
    cancel: CancellationToken,
    start: Arc<Notify>,
    task: JoinHandle<ValidationOutcome>,
}

impl ValidatorHandle {
    /// Release a validator spawned with `DEFER`. A no-op otherwise.
    pub fn start(&self) {
        self.start.notify_one();
    }

    /// Request cooperative cancellation; observed at the next suspension
    /// point, delivering `Canceled`. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Await the completion event. Consuming the handle enforces at-most-
    /// once delivery.
    pub async fn join(self) -> ValidationOutcome {
        self.task.await.expect("validator task panicked")
    }
}
