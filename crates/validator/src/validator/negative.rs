//! Negative response validation: prove NODATA, NOQNAME and NOWILDCARD from
//! the (individually validated) NSEC/NSEC3 material in the authority
//! section or the negative cache.

use tracing::debug;

use vigil_dns_domain::{Name, RecordType, ValidationError};

use crate::denial::{nsec3_noexist_nodata, nsec_noexist_nodata};
use crate::rdataset::NcacheEntry;
use crate::types::{Nsec3Record, NsecRecord};
use crate::validator::{Disposition, ValAttrs, Validation};

impl Validation {
    /// Validate every authority rrset through a sub-validator, folding each
    /// completed one into the NEED/FOUND proof flags, then decide whether
    /// the union of proofs satisfies the request.
    pub(crate) async fn validate_nx(&mut self) -> Result<Disposition, ValidationError> {
        let mut sets: Vec<NcacheEntry> = match self.message() {
            Some(message) => message.authority.clone(),
            None => self
                .rdataset()
                .map(|r| r.entries.clone())
                .unwrap_or_default(),
        };

        for index in 0..sets.len() {
            let entry = sets[index].clone();
            if entry.rdataset.rtype == RecordType::RRSIG {
                continue;
            }

            // A signed zone that lost its zone key would deny the DNSKEY
            // with an NSEC at the same name, sending us in a circle of
            // DNSKEY queries. Skip that NSEC.
            if self.qtype() == RecordType::DNSKEY
                && entry.rdataset.rtype == RecordType::NSEC
                && entry.name == *self.name()
            {
                let soa_present = entry
                    .rdataset
                    .rdatas
                    .first()
                    .and_then(|rdata| NsecRecord::parse(rdata).ok())
                    .map(|nsec| nsec.type_present(RecordType::SOA))
                    .unwrap_or(false);
                if soa_present {
                    continue;
                }
            }

            let outcome = self
                .subvalidate(
                    entry.name.clone(),
                    entry.rdataset.rtype,
                    Some(entry.rdataset.clone()),
                    entry.sigrdataset.clone(),
                    "validate_neg_rrset",
                )
                .await?;
            self.authcount += 1;

            match outcome.result {
                Err(ValidationError::Canceled) => return Err(ValidationError::Canceled),
                Err(error) => {
                    debug!(%error, name = %entry.name, "authvalidated");
                    if error == ValidationError::BrokenChain {
                        self.authfail += 1;
                    }
                    // Keep going; other auxiliaries may still prove enough.
                }
                Ok(()) => {
                    // Store back the promoted rdatasets so the proof sweeps
                    // below see their earned trust.
                    if let Some(validated) = outcome.rdataset {
                        sets[index].rdataset = validated;
                    }
                    if let Some(validated_sig) = outcome.sigrdataset {
                        sets[index].sigrdataset = Some(validated_sig);
                    }
                    self.fold_nsec_facts(&sets[index].clone());
                }
            }
        }

        self.conclude_nx(&mut sets).await
    }

    /// NSEC reasoning applied as each auxiliary completes.
    fn fold_nsec_facts(&mut self, entry: &NcacheEntry) {
        if entry.rdataset.rtype != RecordType::NSEC || !entry.rdataset.trust.is_secure() {
            return;
        }
        let needs = self.attrs.contains(ValAttrs::NEEDNODATA)
            || self.attrs.contains(ValAttrs::NEEDNOQNAME);
        let found = self.attrs.contains(ValAttrs::FOUNDNODATA)
            || self.attrs.contains(ValAttrs::FOUNDNOQNAME);
        if !needs || found {
            return;
        }

        let qtype = self.qtype();
        let qname = self.name().clone();
        for rdata in &entry.rdataset.rdatas {
            let Ok(nsec) = NsecRecord::parse(rdata) else {
                continue;
            };
            let Some(cover) = nsec_noexist_nodata(qtype, &qname, &entry.name, &nsec) else {
                continue;
            };

            if cover.exists && !cover.data {
                self.attrs.insert(ValAttrs::FOUNDNODATA);
                if self.attrs.contains(ValAttrs::NEEDNODATA) {
                    self.proofs.nodata = Some(entry.name.clone());
                }
            }
            if !cover.exists {
                self.attrs.insert(ValAttrs::FOUNDNOQNAME);

                // When validating a wildcard response the closest encloser
                // is already known; the wildcard derived from the NSEC must
                // agree with it.
                let clabels = self.closest.as_ref().map_or(0, |c| c.num_labels());
                if clabels == 0
                    || cover.wild.as_ref().map(|w| w.num_labels()) == Some(clabels + 1)
                {
                    self.attrs.insert(ValAttrs::FOUNDCLOSEST);
                }
                if self.attrs.contains(ValAttrs::NEEDNOQNAME) {
                    // The NSEC noqname proof also carries the closest
                    // encloser.
                    self.proofs.noqname = Some(entry.name.clone());
                }
            }
            if let Some(wild) = cover.wild {
                self.wild = Some(wild);
            }
            break;
        }
    }

    /// After all auxiliaries resolved: search NSEC3 proofs, check the
    /// wildcard, and test whether the found proofs satisfy the needs.
    async fn conclude_nx(
        &mut self,
        sets: &mut [NcacheEntry],
    ) -> Result<Disposition, ValidationError> {
        let need_nodata = self.attrs.contains(ValAttrs::NEEDNODATA);
        let need_noqname = self.attrs.contains(ValAttrs::NEEDNOQNAME);
        let need_nowildcard = self.attrs.contains(ValAttrs::NEEDNOWILDCARD);

        // A secure wildcard answer only needs the NOQNAME proof.
        if !need_nodata && !need_nowildcard && need_noqname {
            if !self.attrs.contains(ValAttrs::FOUNDNOQNAME) {
                self.find_nsec3_proofs(sets);
            }

            if self.attrs.contains(ValAttrs::FOUNDNOQNAME)
                && self.attrs.contains(ValAttrs::FOUNDCLOSEST)
                && !self.attrs.contains(ValAttrs::FOUNDOPTOUT)
            {
                debug!("marking as secure, noqname proof found");
                self.mark_secure();
                return Ok(Disposition::Secure);
            } else if self.attrs.contains(ValAttrs::FOUNDOPTOUT) && self.wild.is_some() {
                debug!("optout proof found");
                self.optout = true;
                return self.mark_answer("validate_nx (1)", None);
            } else if self.attrs.contains(ValAttrs::FOUNDUNKNOWN) {
                debug!("unknown NSEC3 hash algorithm found");
                return self.mark_answer("validate_nx (2)", None);
            }

            debug!("noqname proof not found");
            return Err(ValidationError::NoValidNsec);
        }

        if !self.attrs.contains(ValAttrs::FOUNDNOQNAME)
            && !self.attrs.contains(ValAttrs::FOUNDNODATA)
        {
            self.find_nsec3_proofs(sets);
        }

        if self.attrs.contains(ValAttrs::FOUNDNOQNAME)
            && self.attrs.contains(ValAttrs::FOUNDCLOSEST)
            && ((need_nodata && !self.attrs.contains(ValAttrs::FOUNDNODATA)) || need_nowildcard)
        {
            self.check_wildcard(RecordType::NSEC, None, sets);
        }

        let nodata_satisfied = need_nodata
            && (self.attrs.contains(ValAttrs::FOUNDNODATA)
                || self.attrs.contains(ValAttrs::FOUNDOPTOUT));
        let noqname_satisfied = need_noqname
            && self.attrs.contains(ValAttrs::FOUNDNOQNAME)
            && need_nowildcard
            && self.attrs.contains(ValAttrs::FOUNDNOWILDCARD)
            && self.attrs.contains(ValAttrs::FOUNDCLOSEST);

        if nodata_satisfied || noqname_satisfied {
            if self.attrs.contains(ValAttrs::FOUNDOPTOUT) {
                self.optout = true;
            }
            debug!("nonexistence proof(s) found");
            if self.message().is_none() {
                self.mark_secure();
            } else {
                self.secure = true;
            }
            return Ok(Disposition::Secure);
        }

        if self.authfail != 0 && self.authcount == self.authfail {
            return Err(ValidationError::BrokenChain);
        }

        debug!("nonexistence proof(s) not found");
        self.prove_unsecure().await
    }

    /// Sweep the validated NSEC3 sets for the closest encloser, the
    /// next-closer covering record, and NODATA facts.
    pub(crate) fn find_nsec3_proofs(&mut self, sets: &[NcacheEntry]) {
        let qname = self.name().clone();
        let qtype = self.qtype();
        let max_iterations = self.config().max_nsec3_iterations;

        let Some(zonename) = sets.iter().find_map(|entry| {
            if entry.rdataset.rtype != RecordType::NSEC3 || !entry.rdataset.trust.is_secure() {
                return None;
            }
            let zone = entry.name.parent()?;
            qname.is_subdomain_of(&zone).then_some(zone)
        }) else {
            return;
        };

        // A closest encloser learned from the wildcard signature wins over
        // discovery.
        let discover = self.closest.is_none();
        if let Some(closest) = &self.closest {
            debug!(closest = %closest, "closest encloser from wildcard signature");
        }
        let mut closest = self.closest.clone();
        let mut nearest: Option<Name> = None;

        for entry in sets {
            if entry.rdataset.rtype != RecordType::NSEC3 || !entry.rdataset.trust.is_secure() {
                continue;
            }
            for rdata in &entry.rdataset.rdatas {
                let Ok(nsec3) = Nsec3Record::parse(rdata) else {
                    continue;
                };
                let Some(cover) = nsec3_noexist_nodata(
                    qtype,
                    &qname,
                    &entry.name,
                    &nsec3,
                    &zonename,
                    discover,
                    max_iterations,
                ) else {
                    continue;
                };

                if cover.unknown {
                    self.attrs.insert(ValAttrs::FOUNDUNKNOWN);
                    continue;
                }
                if cover.set_closest {
                    let deeper = match (&closest, &cover.closest) {
                        (Some(kept), Some(found)) => found.num_labels() > kept.num_labels(),
                        (None, Some(_)) => true,
                        _ => false,
                    };
                    if deeper {
                        closest = cover.closest.clone();
                    }
                    self.proofs.closest_encloser = Some(entry.name.clone());
                }
                if cover.exists && !cover.data && self.attrs.contains(ValAttrs::NEEDNODATA) {
                    self.attrs.insert(ValAttrs::FOUNDNODATA);
                    self.proofs.nodata = Some(entry.name.clone());
                }
                if !cover.exists && cover.set_nearest {
                    let shallower = match (&nearest, &cover.nearest) {
                        (Some(kept), Some(found)) => found.num_labels() < kept.num_labels(),
                        (None, Some(_)) => true,
                        _ => false,
                    };
                    if shallower {
                        nearest = cover.nearest.clone();
                    }
                    self.attrs.insert(ValAttrs::FOUNDNOQNAME);
                    self.proofs.noqname = Some(entry.name.clone());
                    if cover.optout {
                        self.attrs.insert(ValAttrs::FOUNDOPTOUT);
                    }
                }
            }
        }

        // A noqname or optout proof only counts with a consistent closest
        // encloser; otherwise those records came from somewhere else in the
        // zone.
        let consistent = match (&closest, &nearest) {
            (Some(closest), Some(nearest)) => {
                closest.num_labels() > 0
                    && nearest.num_labels() == closest.num_labels() + 1
                    && nearest.is_subdomain_of(closest)
            }
            _ => false,
        };
        if consistent {
            self.attrs.insert(ValAttrs::FOUNDCLOSEST);
            self.wild = closest.as_ref().map(|c| c.to_wildcard());
        } else {
            self.attrs
                .remove(ValAttrs::FOUNDNOQNAME | ValAttrs::FOUNDOPTOUT);
            self.proofs.noqname = None;
        }

        if self.attrs.contains(ValAttrs::FOUNDNOQNAME)
            && self.attrs.contains(ValAttrs::FOUNDCLOSEST)
            && ((self.attrs.contains(ValAttrs::NEEDNODATA)
                && !self.attrs.contains(ValAttrs::FOUNDNODATA))
                || self.attrs.contains(ValAttrs::NEEDNOWILDCARD))
        {
            self.check_wildcard(RecordType::NSEC3, Some(&zonename), sets);
        }
    }

    /// Look for NODATA-at-the-wildcard and NOWILDCARD proofs among the
    /// validated records. The proofs are mutually exclusive; the first
    /// applicable record settles it.
    pub(crate) fn check_wildcard(
        &mut self,
        rtype: RecordType,
        zonename: Option<&Name>,
        sets: &[NcacheEntry],
    ) {
        let Some(wild) = self.wild.clone() else {
            debug!("in checkwildcard: no wildcard to check");
            return;
        };
        debug!(wild = %wild, "in checkwildcard");

        let qtype = self.qtype();
        let max_iterations = self.config().max_nsec3_iterations;

        for entry in sets {
            if entry.rdataset.rtype != rtype || !entry.rdataset.trust.is_secure() {
                continue;
            }
            let still_needed = (self.attrs.contains(ValAttrs::NEEDNODATA)
                || self.attrs.contains(ValAttrs::NEEDNOWILDCARD))
                && !self.attrs.contains(ValAttrs::FOUNDNODATA)
                && !self.attrs.contains(ValAttrs::FOUNDNOWILDCARD);
            if !still_needed {
                return;
            }

            for rdata in &entry.rdataset.rdatas {
                let (exists, data) = match rtype {
                    RecordType::NSEC => {
                        let Ok(nsec) = NsecRecord::parse(rdata) else {
                            continue;
                        };
                        let Some(cover) = nsec_noexist_nodata(qtype, &wild, &entry.name, &nsec)
                        else {
                            continue;
                        };
                        (cover.exists, cover.data)
                    }
                    RecordType::NSEC3 => {
                        let Some(zone) = zonename else {
                            return;
                        };
                        let Ok(nsec3) = Nsec3Record::parse(rdata) else {
                            continue;
                        };
                        let Some(cover) = nsec3_noexist_nodata(
                            qtype,
                            &wild,
                            &entry.name,
                            &nsec3,
                            zone,
                            false,
                            max_iterations,
                        ) else {
                            continue;
                        };
                        if cover.unknown {
                            continue;
                        }
                        // Nonexistence of the wildcard requires its own
                        // hash to be covered, not just an ancestor's.
                        let wild_covered =
                            cover.set_nearest && cover.nearest.as_ref() == Some(&wild);
                        if !cover.exists && !wild_covered {
                            continue;
                        }
                        (cover.exists, cover.data)
                    }
                    _ => return,
                };

                if exists && !data {
                    self.attrs.insert(ValAttrs::FOUNDNODATA);
                    if self.attrs.contains(ValAttrs::NEEDNODATA) {
                        self.proofs.nodata = Some(entry.name.clone());
                    }
                }
                if !exists {
                    self.attrs.insert(ValAttrs::FOUNDNOWILDCARD);
                    if self.attrs.contains(ValAttrs::NEEDNOQNAME) {
                        self.proofs.nowildcard = Some(entry.name.clone());
                    }
                }
                return;
            }
        }
    }
}
