//! Link-State Database
//!
//! One database per area. Owns the aging engine, which doubles as the
//! identity index: every record lives in exactly one age bin and the
//! engine's locator finds it in O(1). All mutation goes through
//! `add_or_update`, `originate`, `tick` and `sweep_flushed`; readers get
//! copies (records, headers with their current age, or a header snapshot).

use crate::aging::{AgingAction, AgingEngine};
use crate::lsa::{
    compare, AgeLimits, BinSlot, Freshness, Lsa, LsaBody, LsaHeader, LsaIdentity, LsaRecord,
    PendingAction, INITIAL_SEQUENCE_NUMBER, MAX_SEQUENCE_NUMBER,
};
use crate::{AreaId, InterfaceId, RouterId};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

// ============================================================================
// Results
// ============================================================================

/// Outcome of offering a candidate instance to the database.
#[derive(Clone, Debug)]
pub enum AcceptanceResult {
    /// The candidate was installed.
    Accepted {
        record: LsaRecord,
        replaced: Option<LsaRecord>,
    },
    /// The candidate was not newer than the database copy.
    Rejected {
        freshness: Freshness,
        /// Fresh self-originated instance issued to squelch a stale copy.
        reoriginated: Option<LsaRecord>,
    },
}

impl AcceptanceResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AcceptanceResult::Accepted { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, AcceptanceResult::Rejected { .. })
    }
}

/// What the database did with an aging action.
#[derive(Clone, Debug)]
pub enum AgingOutcome {
    /// A self-originated LSA was re-issued and must be flooded.
    Refreshed(LsaRecord),
    /// An LSA reached MaxAge; the MaxAge instance must be flooded.
    Flushing(LsaRecord),
}

impl AgingOutcome {
    pub fn record(&self) -> &LsaRecord {
        match self {
            AgingOutcome::Refreshed(r) | AgingOutcome::Flushing(r) => r,
        }
    }
}

/// Records dropped by a flush sweep, plus any instances originated in their place.
#[derive(Clone, Debug, Default)]
pub struct SweepResult {
    pub removed: Vec<LsaRecord>,
    pub reoriginated: Vec<LsaRecord>,
}

// ============================================================================
// Header Snapshot
// ============================================================================

/// Immutable copy of database headers taken at one instant.
///
/// Cheap to clone; iteration can restart any number of times.
#[derive(Clone, Debug)]
pub struct HeaderSnapshot {
    version: u64,
    headers: Arc<[LsaHeader]>,
}

impl HeaderSnapshot {
    /// Database version the snapshot was taken at.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LsaHeader> {
        self.headers.iter()
    }

    pub fn as_slice(&self) -> &[LsaHeader] {
        &self.headers
    }
}

impl<'a> IntoIterator for &'a HeaderSnapshot {
    type Item = &'a LsaHeader;
    type IntoIter = std::slice::Iter<'a, LsaHeader>;

    fn into_iter(self) -> Self::IntoIter {
        self.headers.iter()
    }
}

// ============================================================================
// Database
// ============================================================================

/// Per-area link-state database.
#[derive(Clone, Debug)]
pub struct LinkStateDatabase {
    router_id: RouterId,
    area_id: AreaId,
    options: u8,
    aging: AgingEngine,
    /// Monotonic tick count; unlike the aging counter it never wraps.
    ticks: u64,
    /// Tick at which each identity's current instance was installed.
    installed_at: HashMap<LsaIdentity, u64>,
    /// Tick at which each MaxAge record started flushing.
    flush_started: HashMap<LsaIdentity, u64>,
    /// Instances waiting for their MaxSequenceNumber predecessor to flush.
    deferred: HashMap<LsaIdentity, Lsa>,
    version: u64,
}

impl LinkStateDatabase {
    pub fn new(router_id: RouterId, area_id: AreaId, options: u8, limits: AgeLimits) -> Self {
        Self {
            router_id,
            area_id,
            options,
            aging: AgingEngine::new(limits),
            ticks: 0,
            installed_at: HashMap::new(),
            flush_started: HashMap::new(),
            deferred: HashMap::new(),
            version: 0,
        }
    }

    // === Accessors ===

    pub fn router_id(&self) -> RouterId {
        self.router_id
    }

    pub fn area_id(&self) -> AreaId {
        self.area_id
    }

    pub fn options(&self) -> u8 {
        self.options
    }

    pub fn limits(&self) -> &AgeLimits {
        self.aging.limits()
    }

    pub fn aging(&self) -> &AgingEngine {
        &self.aging
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.aging.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aging.is_empty()
    }

    /// Total ticks processed since creation.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    // === Lookup ===

    pub fn lookup(&self, identity: &LsaIdentity) -> Option<&LsaRecord> {
        self.aging.get(identity)
    }

    pub fn current_age(&self, identity: &LsaIdentity) -> Option<u16> {
        self.aging.age_of(identity)
    }

    /// Header of the database copy, carrying its current age.
    pub fn lookup_header(&self, identity: &LsaIdentity) -> Option<LsaHeader> {
        let record = self.aging.get(identity)?;
        Some(record.header_with_age(self.aging.current_age(record)))
    }

    /// Database copy with its current age, ready to be sent.
    pub fn lookup_lsa(&self, identity: &LsaIdentity) -> Option<Lsa> {
        let record = self.aging.get(identity)?;
        Some(record.lsa_with_age(self.aging.current_age(record)))
    }

    /// Compare `candidate` against the database copy. `None` if absent.
    pub fn compare_with_database(&self, candidate: &LsaHeader) -> Option<Freshness> {
        let existing = self.lookup_header(&candidate.identity)?;
        Some(compare(candidate, &existing, self.aging.limits()))
    }

    /// Check if the database copy was installed less than `secs` ago.
    pub fn installed_within(&self, identity: &LsaIdentity, secs: u16) -> bool {
        self.installed_at
            .get(identity)
            .is_some_and(|at| self.ticks.saturating_sub(*at) < u64::from(secs))
    }

    pub fn is_max_age(&self, identity: &LsaIdentity) -> bool {
        self.aging
            .get(identity)
            .is_some_and(|r| r.bin() == BinSlot::MaxAge)
    }

    /// Identities currently in the MaxAge bin.
    pub fn max_age_identities(&self) -> Vec<LsaIdentity> {
        let mut ids: Vec<_> = self
            .aging
            .records()
            .filter(|r| r.bin() == BinSlot::MaxAge)
            .map(|r| *r.identity())
            .collect();
        ids.sort();
        ids
    }

    /// Snapshot of all headers, sorted by identity.
    pub fn all_headers(&self, exclude_max_age: bool, include_opaque: bool) -> HeaderSnapshot {
        let mut headers: Vec<LsaHeader> = self
            .aging
            .records()
            .filter(|r| !(exclude_max_age && r.bin() == BinSlot::MaxAge))
            .filter(|r| include_opaque || !r.identity().lsa_type.is_opaque())
            .map(|r| r.header_with_age(self.aging.current_age(r)))
            .collect();
        headers.sort_by_key(|h| h.identity);
        HeaderSnapshot {
            version: self.version,
            headers: headers.into(),
        }
    }

    // === Mutation ===

    /// Offer a candidate instance to the database.
    ///
    /// `source` is the interface it arrived on, `None` for local origination.
    pub fn add_or_update(
        &mut self,
        candidate: Lsa,
        source: Option<InterfaceId>,
        is_self_originated: bool,
    ) -> AcceptanceResult {
        let identity = *candidate.identity();

        let Some(existing) = self.lookup_header(&identity) else {
            let record = self.install(candidate, is_self_originated);
            debug!(
                lsa = %identity,
                seq = record.sequence_number(),
                source = ?source,
                "LSA installed"
            );
            return AcceptanceResult::Accepted {
                record,
                replaced: None,
            };
        };

        let freshness = compare(&candidate.header, &existing, self.aging.limits());
        if freshness.is_newer() {
            let replaced = self.aging.remove_record(&identity);
            self.flush_started.remove(&identity);
            let record = self.install(candidate, is_self_originated);
            debug!(
                lsa = %identity,
                old_seq = existing.sequence_number,
                new_seq = record.sequence_number(),
                source = ?source,
                "LSA replaced"
            );
            return AcceptanceResult::Accepted { record, replaced };
        }

        let reoriginated = if freshness.is_older()
            && source.is_some()
            && identity.advertising_router == self.router_id
            && !self.is_max_age(&identity)
        {
            debug!(lsa = %identity, "Stale copy of own LSA received, re-originating");
            self.reissue(&identity)
        } else {
            None
        };

        AcceptanceResult::Rejected {
            freshness,
            reoriginated,
        }
    }

    /// Originate (or re-originate) an LSA from this router.
    ///
    /// Uses the next sequence number for the identity. Returns `None` when
    /// the current instance is at MaxSequenceNumber: that instance is
    /// flushed first and the new one installed once it is gone.
    pub fn originate(&mut self, identity: LsaIdentity, body: LsaBody) -> Option<LsaRecord> {
        self.originate_with_sequence(identity, body, None)
    }

    /// Originate with a sequence number at least `floor + 1`.
    pub fn originate_with_sequence(
        &mut self,
        identity: LsaIdentity,
        body: LsaBody,
        floor: Option<i32>,
    ) -> Option<LsaRecord> {
        let current = self.lookup(&identity).map(LsaRecord::sequence_number);
        let highest = match (current, floor) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
        let options = self.options;

        match highest {
            Some(MAX_SEQUENCE_NUMBER) => {
                warn!(lsa = %identity, "Sequence number wrap, flushing before re-origination");
                let lsa = Lsa::new(identity, options, INITIAL_SEQUENCE_NUMBER, 0, body);
                self.deferred.insert(identity, lsa);
                self.flush(&identity);
                None
            }
            Some(seq) => {
                let lsa = Lsa::new(identity, options, seq + 1, 0, body);
                Some(self.replace_self_originated(lsa))
            }
            None => {
                let lsa = Lsa::new(identity, options, INITIAL_SEQUENCE_NUMBER, 0, body);
                Some(self.replace_self_originated(lsa))
            }
        }
    }

    /// Prematurely age an LSA to MaxAge so it is flushed from the domain.
    pub fn flush(&mut self, identity: &LsaIdentity) -> Option<LsaRecord> {
        if !self.aging.force_max_age(identity) {
            return None;
        }
        self.aging.clear_pending(identity);
        self.flush_started.insert(*identity, self.ticks);
        self.version += 1;
        info!(lsa = %identity, "LSA flushed");
        self.lookup(identity).cloned()
    }

    /// Advance aging by one second and act on everything that crossed a threshold.
    pub fn tick(&mut self) -> Vec<AgingOutcome> {
        self.ticks += 1;
        let actions = self.aging.tick();
        actions
            .into_iter()
            .filter_map(|action| self.process_aging_result(action))
            .collect()
    }

    /// Act on one aging action.
    pub fn process_aging_result(&mut self, action: AgingAction) -> Option<AgingOutcome> {
        let record = self.aging.get(&action.identity)?;
        if record.pending_action() != action.action {
            return None;
        }

        match action.action {
            PendingAction::None => None,
            PendingAction::Refresh => {
                let seq = record.sequence_number();
                let identity = action.identity;
                info!(lsa = %identity, seq = seq, "Refreshing self-originated LSA");
                self.reissue(&identity).map(AgingOutcome::Refreshed)
            }
            PendingAction::MaxAgeFlush => {
                let identity = action.identity;
                self.aging.clear_pending(&identity);
                self.flush_started.entry(identity).or_insert(self.ticks);
                self.version += 1;
                info!(lsa = %identity, "LSA reached MaxAge, flushing");
                self.lookup(&identity).cloned().map(AgingOutcome::Flushing)
            }
        }
    }

    /// Remove MaxAge records that no neighbor still needs, or whose grace
    /// period has run out.
    pub fn sweep_flushed<F>(&mut self, grace_secs: u64, still_needed: F) -> SweepResult
    where
        F: Fn(&LsaIdentity) -> bool,
    {
        let mut result = SweepResult::default();
        for identity in self.max_age_identities() {
            let started = *self.flush_started.entry(identity).or_insert(self.ticks);
            let expired = self.ticks.saturating_sub(started) >= grace_secs;
            if still_needed(&identity) && !expired {
                continue;
            }
            if expired && still_needed(&identity) {
                warn!(lsa = %identity, "MaxAge LSA removed after grace period");
            }
            if let Some(record) = self.remove(&identity) {
                debug!(lsa = %identity, "MaxAge LSA removed");
                result.removed.push(record);
            }
            if let Some(lsa) = self.deferred.remove(&identity) {
                let record = self.replace_self_originated(lsa);
                info!(lsa = %identity, "LSA re-originated after sequence wrap");
                result.reoriginated.push(record);
            }
        }
        result
    }

    /// Remove a record outright.
    pub fn remove(&mut self, identity: &LsaIdentity) -> Option<LsaRecord> {
        let record = self.aging.remove_record(identity)?;
        self.installed_at.remove(identity);
        self.flush_started.remove(identity);
        self.version += 1;
        Some(record)
    }

    /// Verify bin bookkeeping, repairing anything out of place.
    pub fn check_consistency(&mut self) -> usize {
        let repairs = self.aging.check_consistency();
        if repairs > 0 {
            warn!(area = %self.area_id, repairs = repairs, "Aging bins repaired");
            self.version += 1;
        }
        repairs
    }

    // === Internal ===

    fn install(&mut self, lsa: Lsa, self_originated: bool) -> LsaRecord {
        let identity = *lsa.identity();
        let mut record = LsaRecord::new(lsa, self_originated);
        let slot = self.aging.add_record(record.clone());
        if slot == BinSlot::MaxAge {
            self.flush_started.insert(identity, self.ticks);
        }
        self.installed_at.insert(identity, self.ticks);
        self.version += 1;
        record.set_bin(slot);
        self.aging.get(&identity).cloned().unwrap_or(record)
    }

    fn replace_self_originated(&mut self, lsa: Lsa) -> LsaRecord {
        let identity = *lsa.identity();
        self.aging.remove_record(&identity);
        self.flush_started.remove(&identity);
        self.install(lsa, true)
    }

    /// Re-issue a held instance with sequence + 1 and age 0.
    fn reissue(&mut self, identity: &LsaIdentity) -> Option<LsaRecord> {
        let record = self.aging.get(identity)?;
        let body = record.lsa().body.clone();
        self.originate(*identity, body)
    }
}
