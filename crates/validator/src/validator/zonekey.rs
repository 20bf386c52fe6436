//! Zone-key validation: authenticate a DNSKEY RRset through a trust anchor
//! or through the parent zone's DS set.

use tracing::{debug, info, warn};

use vigil_dns_domain::{RecordType, ValidationError};

use crate::crypto::keys::key_from_ds;
use crate::resolver::FetchResult;
use crate::types::ds::DIGEST_SHA1;
use crate::types::{DnskeyRecord, DsRecord, RrsigRecord};
use crate::validator::{Disposition, ValAttrs, Validation};
use crate::view::ViewFind;

impl Validation {
    pub(crate) async fn validate_zone_key(&mut self) -> Result<Disposition, ValidationError> {
        if self.dsset.is_none() {
            if let Some(done) = self.try_trust_anchors()? {
                return done;
            }

            // No anchor matched. At the root there is no DS to chase.
            if self.name().is_root() {
                return if self.attrs.contains(ValAttrs::TRIEDVERIFY) {
                    debug!("root key failed to validate");
                    Err(ValidationError::NoValidSig)
                } else {
                    debug!("no trusted root key");
                    Err(ValidationError::NoValidDs)
                };
            }

            if let Some(done) = self.obtain_dsset().await? {
                return done;
            }
        }

        self.validate_against_dsset()
    }

    /// Check the RRset against the trust-anchor table. `Some` short-circuits
    /// the caller with a final result; `None` falls through to DS chasing.
    #[allow(clippy::type_complexity)]
    fn try_trust_anchors(
        &mut self,
    ) -> Result<Option<Result<Disposition, ValidationError>>, ValidationError> {
        let name = self.name().clone();
        let sigset = self
            .sigrdataset()
            .cloned()
            .expect("zone-key validation requires a signature rdataset");

        let mut at_sep = false;
        for sig_rdata in &sigset.rdatas {
            let Ok(sig) = RrsigRecord::parse(sig_rdata) else {
                continue;
            };
            if sig.signer != name {
                continue;
            }

            let anchored_here = self.anchors().has_anchor_at(&name);
            if !anchored_here && self.anchors().deepest_match(&name).is_none() {
                debug!("not beneath secure root");
                return Ok(Some(self.mark_answer(
                    "validate_zone_key (1)",
                    Some("not beneath secure root"),
                )));
            }
            if anchored_here {
                at_sep = true;
            }

            for key in self.anchors().find_keys(&name, sig.algorithm, sig.key_tag) {
                if self.verify_one(&key, &sig) {
                    self.mark_secure();
                    debug!("signed by trusted key; marking as secure");
                    return Ok(Some(Ok(Disposition::Secure)));
                }
            }
        }

        if at_sep {
            // A secure entry point whose DNSKEYs match no anchor is bogus.
            warn!(
                name = %name,
                "unable to find a DNSKEY which verifies the DNSKEY RRset and also matches a trusted key"
            );
            return Ok(Some(Err(ValidationError::NoValidKey)));
        }

        Ok(None)
    }

    /// Find a DS rdataset for the owner, through the view or a fetch,
    /// sub-validating it when its trust is not yet settled. `Some` carries
    /// a final result; `None` means `self.dsset` is now populated.
    #[allow(clippy::type_complexity)]
    async fn obtain_dsset(
        &mut self,
    ) -> Result<Option<Result<Disposition, ValidationError>>, ValidationError> {
        let name = self.name().clone();
        let answer = self.view_find(&name, RecordType::DS);
        match answer.result {
            ViewFind::Success => {
                let Some(dsset) = answer.rdataset else {
                    debug!("no DS record");
                    return Ok(Some(Err(ValidationError::NoValidSig)));
                };
                let trust = dsset.trust;
                if (trust.is_pending() || trust.is_answer()) && answer.sigrdataset.is_some() {
                    let outcome = self
                        .subvalidate(
                            name.clone(),
                            RecordType::DS,
                            Some(dsset),
                            answer.sigrdataset,
                            "validate_zone_key",
                        )
                        .await?;
                    match outcome.result {
                        Ok(()) => {
                            debug!("dsset revalidated");
                            self.dsset = outcome.rdataset;
                            Ok(None)
                        }
                        Err(ValidationError::Canceled) => Err(ValidationError::Canceled),
                        Err(error) => {
                            debug!(%error, "dsvalidated");
                            Err(ValidationError::BrokenChain)
                        }
                    }
                } else if trust.is_pending() {
                    // There should never be an unsigned DS.
                    debug!("unsigned DS record");
                    Ok(Some(Err(ValidationError::NoValidSig)))
                } else {
                    debug!(trust = %trust, "dsset with trust");
                    self.dsset = Some(dsset);
                    Ok(None)
                }
            }
            ViewFind::NotFound => {
                // We do not have the DS; find it.
                let reply = self.fetch(&name, RecordType::DS, "validate_zone_key").await?;
                match reply.result {
                    FetchResult::Success => {
                        let Some(dsset) = reply.rdataset else {
                            return Err(ValidationError::BrokenChain);
                        };
                        debug!(trust = %dsset.trust, "dsset with trust");
                        self.dsset = Some(dsset);
                        Ok(None)
                    }
                    FetchResult::Cname
                    | FetchResult::NxRrset
                    | FetchResult::NcacheNxRrset
                    | FetchResult::ServFail => {
                        // Failed to find a DS while following the chain of
                        // trust; now we need to prove insecurity.
                        debug!(result = ?reply.result, "falling back to insecurity proof");
                        Ok(Some(self.prove_unsecure().await))
                    }
                    FetchResult::Canceled => Err(ValidationError::Canceled),
                    other => {
                        debug!(result = ?other, "ds fetch failed");
                        Err(ValidationError::BrokenChain)
                    }
                }
            }
            ViewFind::NcacheNxdomain
            | ViewFind::NcacheNxrrset
            | ViewFind::EmptyName
            | ViewFind::Nxdomain
            | ViewFind::Nxrrset
            | ViewFind::Cname => {
                // The DS does not exist, yet we were asked to validate the
                // zone's DNSKEY.
                debug!("no DS record");
                Ok(Some(Err(ValidationError::NoValidSig)))
            }
            ViewFind::BrokenChain => Err(ValidationError::BrokenChain),
        }
    }

    /// With a DS set in hand, find the DNSKEYs it endorses and check that
    /// one of them signed the DNSKEY RRset.
    fn validate_against_dsset(&mut self) -> Result<Disposition, ValidationError> {
        let name = self.name().clone();
        let dsset = self.dsset.clone().expect("dsset populated by caller");

        if !dsset.trust.is_secure() {
            return self.mark_answer("validate_zone_key (2)", Some("insecure DS"));
        }

        let keyset = self
            .rdataset()
            .cloned()
            .expect("zone-key validation requires the DNSKEY rdataset");

        // A SHA-256 or SHA-384 DS obliges us to ignore SHA-1 siblings.
        let mut suppress_sha1 = false;
        for rdata in &dsset.rdatas {
            let Ok(ds) = DsRecord::parse(rdata) else {
                continue;
            };
            if !self.resolver().ds_digest_supported(&name, ds.digest_type)
                || !self.resolver().algorithm_supported(&name, ds.algorithm)
            {
                continue;
            }
            if ds.prefers_over_sha1() {
                suppress_sha1 = true;
                break;
            }
        }

        let mut supported_algorithm = false;
        let mut verified = false;
        for rdata in &dsset.rdatas {
            let Ok(ds) = DsRecord::parse(rdata) else {
                continue;
            };
            if suppress_sha1 && ds.digest_type == DIGEST_SHA1 {
                continue;
            }
            if !self.resolver().ds_digest_supported(&name, ds.digest_type)
                || !self.resolver().algorithm_supported(&name, ds.algorithm)
            {
                continue;
            }
            supported_algorithm = true;

            let Some(key) = key_from_ds(&keyset, &ds, &name) else {
                debug!(ds = %ds, "no DNSKEY matching DS");
                continue;
            };
            if self.check_key(&key, ds.key_tag, ds.algorithm) {
                verified = true;
                break;
            }
            debug!(ds = %ds, "no RRSIG matching DS key");
        }

        if verified {
            self.mark_secure();
            debug!("marking as secure (DS)");
            Ok(Disposition::Secure)
        } else if !supported_algorithm {
            debug!("no supported algorithm/digest (DS)");
            self.mark_answer(
                "validate_zone_key (3)",
                Some("no supported algorithm/digest (DS)"),
            )
        } else {
            info!(name = %name, "no valid signature found (DS)");
            Err(ValidationError::NoValidSig)
        }
    }

    /// Did this DNSKEY sign the DNSKEY RRset under validation?
    fn check_key(&mut self, key: &DnskeyRecord, keyid: u16, algorithm: u8) -> bool {
        let Some(sigset) = self.sigrdataset().cloned() else {
            return false;
        };
        for sig_rdata in &sigset.rdatas {
            let Ok(sig) = RrsigRecord::parse(sig_rdata) else {
                continue;
            };
            if sig.key_tag != keyid || sig.algorithm != algorithm {
                continue;
            }
            if self.verify_one(key, &sig) {
                return true;
            }
        }
        false
    }
}
