//! The insecurity prover: walk label by label from the deepest trust
//! anchor toward the query name, looking for the point where the chain of
//! trust demonstrably ends.

use tracing::{debug, warn};

use vigil_dns_domain::{Name, RecordType, TrustLevel, ValidationError};

use crate::denial::nsec3::decode_hash_label;
use crate::denial::{covers, iterated_hash};
use crate::rdataset::Rdataset;
use crate::resolver::FetchResult;
use crate::types::nsec3::NSEC3_HASH_SHA1;
use crate::types::{DsRecord, Nsec3Record, NsecRecord};
use crate::validator::{Disposition, ValAttrs, Validation};
use crate::view::ViewFind;

impl Validation {
    /// Attempt to prove the query name lies in an insecure zone. `Ok` with
    /// an insecure disposition means a break was found; `NotInsecure` means
    /// the walk reached the query name with the chain intact, so the
    /// response should have validated.
    pub(crate) async fn prove_unsecure(&mut self) -> Result<Disposition, ValidationError> {
        self.attrs.insert(ValAttrs::INSECURITY);

        // A DS query is answered by the parent zone; anchor the walk there.
        let mut secroot = self.name().clone();
        if self.qtype() == RecordType::DS && secroot.num_labels() > 1 {
            secroot = secroot.parent().expect("non-root name has a parent");
        }

        let Some(anchor) = self.anchors().deepest_match(&secroot) else {
            debug!(name = %secroot, "not beneath secure root");
            return self.mark_answer("prove_unsecure (1)", Some("not beneath secure root"));
        };

        // Breaks can only occur below the trust anchor; start one label
        // further down.
        self.labels = anchor.num_labels() + 1;

        while self.labels <= self.name().num_labels() {
            if let Some(disposition) = self.seek_ds().await? {
                return Ok(disposition);
            }
            self.labels += 1;
        }

        debug!("insecurity proof failed");
        Err(ValidationError::NotInsecure)
    }

    /// Look for a DS rrset at the label depth of the current walk cursor.
    /// `Some` ends the walk with a result; `None` continues one label down.
    async fn seek_ds(&mut self) -> Result<Option<Disposition>, ValidationError> {
        let tname = if self.labels >= self.name().num_labels() {
            self.name().clone()
        } else {
            self.name().suffix(self.labels)
        };
        debug!(name = %tname, "checking existence of DS");

        let answer = self.view_find(&tname, RecordType::DS);
        match answer.result {
            ViewFind::Nxrrset | ViewFind::NcacheNxrrset | ViewFind::EmptyName => {
                // There is no DS. If this is a delegation, we may be done.
                if let Some(found) = &answer.rdataset {
                    if found.trust.is_pending() || found.trust.is_answer() {
                        // The namespace may have switched from insecure to
                        // secure; the negative response needs validating.
                        return self
                            .revalidate_ds(&tname, found.clone(), answer.sigrdataset)
                            .await;
                    }
                }

                // NSEC3 zones return no NSEC rrset here, so a zone cut has
                // to be looked up explicitly.
                if answer.result == ViewFind::Nxrrset && answer.rdataset.is_none() {
                    if let Some(cut) = self.find_zone_cut(&tname) {
                        if cut == tname {
                            return self
                                .mark_answer("prove_unsecure (3)", Some("no DS at zone cut"))
                                .map(Some);
                        }
                    }
                }

                let trust = answer
                    .rdataset
                    .as_ref()
                    .map(|r| r.trust)
                    .unwrap_or(TrustLevel::None);
                if !trust.is_secure() {
                    // There is no way to validate existing negative
                    // response blobs; give up.
                    warn!("can't validate existing negative responses (no DS)");
                    return Err(ValidationError::MustBeSecure);
                }
                if self.is_delegation(&tname, answer.rdataset.as_ref(), answer.result) {
                    return self
                        .mark_answer("prove_unsecure (4)", Some("this is a delegation"))
                        .map(Some);
                }

                Ok(None)
            }

            ViewFind::Cname => {
                if let Some(found) = &answer.rdataset {
                    if found.trust.is_pending() || found.trust.is_answer() {
                        // CNAMEs interpose secure paths; validate it before
                        // walking past.
                        let outcome = self
                            .subvalidate(
                                tname.clone(),
                                RecordType::CNAME,
                                Some(found.clone()),
                                answer.sigrdataset,
                                "prove_unsecure (cname)",
                            )
                            .await?;
                        return match outcome.result {
                            Ok(()) => {
                                debug!(trust = ?outcome.rdataset.map(|r| r.trust), "cname validated");
                                Ok(None)
                            }
                            Err(ValidationError::Canceled) => Err(ValidationError::Canceled),
                            Err(error) => {
                                debug!(%error, "cnamevalidated");
                                Err(ValidationError::BrokenChain)
                            }
                        };
                    }
                }
                Ok(None)
            }

            ViewFind::Success => {
                let Some(dsset) = answer.rdataset else {
                    return Ok(None);
                };
                if dsset.trust.is_secure() {
                    // A DS here means we are still in a secure zone; make
                    // sure we could actually follow it.
                    if !self.check_ds_supported(&tname, &dsset) {
                        debug!(name = %tname, "no supported algorithm/digest (DS)");
                        return self
                            .mark_answer(
                                "prove_unsecure (5)",
                                Some("no supported algorithm/digest (DS)"),
                            )
                            .map(Some);
                    }
                    return Ok(None);
                }

                if answer.sigrdataset.is_none() {
                    debug!("DS is unsigned");
                    return Err(ValidationError::NoValidSig);
                }
                self.revalidate_ds(&tname, dsset, answer.sigrdataset).await
            }

            ViewFind::Nxdomain | ViewFind::NcacheNxdomain => {
                let Some(found) = answer.rdataset else {
                    // Still in a secure zone: an NSEC/NSEC3 had to be here.
                    return Err(ValidationError::NoValidNsec);
                };
                if found.trust.is_pending() || found.trust.is_answer() {
                    return self.revalidate_ds(&tname, found, answer.sigrdataset).await;
                }
                if !found.trust.is_secure() {
                    warn!("can't validate existing negative responses (not a zone cut)");
                    return Err(ValidationError::NoValidSig);
                }
                Ok(None)
            }

            ViewFind::NotFound => {
                // We know nothing about the DS here; fetch it.
                let reply = self.fetch(&tname, RecordType::DS, "prove_unsecure").await?;
                match reply.result {
                    FetchResult::Success | FetchResult::NxDomain | FetchResult::NcacheNxDomain => {
                        if reply.result == FetchResult::Success {
                            if let Some(dsset) = &reply.rdataset {
                                if let Some(done) = self.check_fetched_ds(&tname, dsset)? {
                                    return Ok(Some(done));
                                }
                            }
                        }
                        Ok(None)
                    }
                    FetchResult::Cname | FetchResult::NxRrset | FetchResult::NcacheNxRrset => {
                        let at = reply.found_name.clone().unwrap_or_else(|| tname.clone());
                        let view_result = match reply.result {
                            FetchResult::NcacheNxRrset => ViewFind::NcacheNxrrset,
                            _ => ViewFind::Nxrrset,
                        };
                        if reply.result != FetchResult::Cname
                            && self.is_delegation(&at, reply.rdataset.as_ref(), view_result)
                        {
                            // No DS at a zone cut: the delegation is
                            // insecure.
                            return self
                                .mark_answer("dsfetched", Some("no DS and this is a delegation"))
                                .map(Some);
                        }
                        Ok(None)
                    }
                    FetchResult::Canceled => Err(ValidationError::Canceled),
                    other => {
                        debug!(result = ?other, "ds fetch failed");
                        Err(ValidationError::BrokenChain)
                    }
                }
            }

            ViewFind::BrokenChain => Err(ValidationError::BrokenChain),
        }
    }

    /// Sub-validate a DS rrset (or its proven nonexistence) found with
    /// unsettled trust, then resume the walk.
    async fn revalidate_ds(
        &mut self,
        tname: &Name,
        rdataset: Rdataset,
        sigrdataset: Option<Rdataset>,
    ) -> Result<Option<Disposition>, ValidationError> {
        let outcome = self
            .subvalidate(
                tname.clone(),
                RecordType::DS,
                Some(rdataset),
                sigrdataset,
                "prove_unsecure",
            )
            .await?;
        match outcome.result {
            Ok(()) => {
                let Some(validated) = outcome.rdataset else {
                    return Ok(None);
                };
                debug!(
                    kind = if validated.negative { "ds non-existence" } else { "dsset" },
                    trust = %validated.trust,
                    "validated"
                );
                if validated.negative
                    && validated.rtype == RecordType::DS
                    && self.is_delegation(tname, Some(&validated), ViewFind::NcacheNxrrset)
                {
                    return self
                        .mark_answer("dsvalidated", Some("no DS and this is a delegation"))
                        .map(Some);
                }
                if let Some(done) = self.check_fetched_ds(tname, &validated)? {
                    return Ok(Some(done));
                }
                Ok(None)
            }
            Err(ValidationError::Canceled) => Err(ValidationError::Canceled),
            Err(error) => {
                debug!(%error, "dsvalidated");
                Err(ValidationError::BrokenChain)
            }
        }
    }

    /// A secure DS set on the walk must carry an algorithm/digest this
    /// resolver supports; otherwise the delegation is insecure for us.
    fn check_fetched_ds(
        &mut self,
        tname: &Name,
        dsset: &Rdataset,
    ) -> Result<Option<Disposition>, ValidationError> {
        if dsset.rtype == RecordType::DS
            && !dsset.negative
            && dsset.trust.is_secure()
            && !self.check_ds_supported(tname, dsset)
        {
            debug!(name = %tname, "no supported algorithm/digest (DS)");
            return self
                .mark_answer("prove_unsecure (2)", Some("no supported algorithm/digest (DS)"))
                .map(Some);
        }
        Ok(None)
    }

    fn check_ds_supported(&self, name: &Name, dsset: &Rdataset) -> bool {
        dsset.rdatas.iter().any(|rdata| {
            DsRecord::parse(rdata)
                .map(|ds| {
                    self.resolver().ds_digest_supported(name, ds.digest_type)
                        && self.resolver().algorithm_supported(name, ds.algorithm)
                })
                .unwrap_or(false)
        })
    }

    fn find_zone_cut(&self, name: &Name) -> Option<Name> {
        self.view_find_zone_cut(name)
    }

    /// Does the NSEC/NSEC3 material accompanying a negative DS answer show
    /// an NS rrset at `name`, i.e. a delegation point?
    pub(crate) fn is_delegation(
        &self,
        name: &Name,
        rdataset: Option<&Rdataset>,
        result: ViewFind,
    ) -> bool {
        let Some(set) = rdataset else {
            return false;
        };

        match result {
            ViewFind::Nxrrset => {
                // The view handed us the covering NSEC set directly.
                if set.rtype != RecordType::NSEC {
                    return false;
                }
                set.rdatas
                    .first()
                    .and_then(|rdata| NsecRecord::parse(rdata).ok())
                    .map(|nsec| nsec.type_present(RecordType::NS))
                    .unwrap_or(false)
            }
            ViewFind::NcacheNxrrset => {
                // Negative-cache entry: try its NSEC first, then the NSEC3
                // chain.
                for entry in &set.entries {
                    if entry.rdataset.rtype == RecordType::NSEC && entry.name == *name {
                        return entry
                            .rdataset
                            .rdatas
                            .first()
                            .and_then(|rdata| NsecRecord::parse(rdata).ok())
                            .map(|nsec| nsec.type_present(RecordType::NS))
                            .unwrap_or(false);
                    }
                }

                for entry in &set.entries {
                    if entry.rdataset.rtype != RecordType::NSEC3 {
                        continue;
                    }
                    let Some(owner_hash) = decode_hash_label(&entry.name) else {
                        continue;
                    };
                    for rdata in &entry.rdataset.rdatas {
                        let Ok(nsec3) = Nsec3Record::parse(rdata) else {
                            continue;
                        };
                        if nsec3.hash_algorithm != NSEC3_HASH_SHA1 {
                            continue;
                        }
                        let hash =
                            iterated_hash(&nsec3.salt, nsec3.iterations, &name.to_wire());
                        if hash.len() != owner_hash.len() {
                            continue;
                        }
                        if hash == owner_hash {
                            return nsec3.type_present(RecordType::NS);
                        }
                        if !nsec3.opt_out() {
                            continue;
                        }
                        // An opt-out span covering the name admits an
                        // unsigned delegation beneath it.
                        if covers(
                            hash.as_slice(),
                            owner_hash.as_slice(),
                            nsec3.next_hashed.as_slice(),
                        ) {
                            return true;
                        }
                    }
                }
                false
            }
            _ => false,
        }
    }
}
