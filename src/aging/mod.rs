//! LSA Aging Engine
//!
//! Ages every record in a database without touching each record every
//! second. Records are filed into one bin per second of age, keyed by the
//! counter value at which their age was zero (their birth tick). Each tick
//! advances a global counter and scans exactly two bins: the one whose
//! records just reached the refresh threshold and the one whose records
//! just reached MaxAge.
//!
//! The counter wraps modulo the number of bins, which equals MaxAge, so a
//! bin is revisited exactly when its records have aged one full MaxAge.

mod bin;

pub use bin::AgeBin;

use crate::lsa::{AgeLimits, BinSlot, LsaIdentity, LsaRecord, PendingAction};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Action handed to the owning database after a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AgingAction {
    pub identity: LsaIdentity,
    pub action: PendingAction,
}

/// Bin-based aging for one database.
#[derive(Clone, Debug)]
pub struct AgingEngine {
    limits: AgeLimits,
    num_bins: u32,
    age_counter: u32,
    bins: Vec<AgeBin>,
    max_age_bin: AgeBin,
    /// Which bin holds each identity.
    locator: HashMap<LsaIdentity, BinSlot>,
}

impl AgingEngine {
    pub fn new(limits: AgeLimits) -> Self {
        let num_bins = u32::from(limits.max_age.max(1));
        Self {
            limits,
            num_bins,
            age_counter: 0,
            bins: (0..num_bins).map(AgeBin::new).collect(),
            max_age_bin: AgeBin::max_age(),
            locator: HashMap::new(),
        }
    }

    pub fn limits(&self) -> &AgeLimits {
        &self.limits
    }

    pub fn age_counter(&self) -> u32 {
        self.age_counter
    }

    pub fn num_bins(&self) -> u32 {
        self.num_bins
    }

    /// Map a counter value to its bin index.
    pub fn age_to_bin(&self, x: i64) -> u32 {
        x.rem_euclid(i64::from(self.num_bins)) as u32
    }

    /// Total records held, MaxAge bin included.
    pub fn len(&self) -> usize {
        self.locator.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locator.is_empty()
    }

    /// Records in the regular bins.
    pub fn aging_len(&self) -> usize {
        self.bins.iter().map(AgeBin::len).sum()
    }

    /// Records in the MaxAge bin.
    pub fn max_age_len(&self) -> usize {
        self.max_age_bin.len()
    }

    pub fn contains(&self, identity: &LsaIdentity) -> bool {
        self.locator.contains_key(identity)
    }

    pub fn get(&self, identity: &LsaIdentity) -> Option<&LsaRecord> {
        let slot = self.locator.get(identity)?;
        self.bin(*slot)?.get(identity)
    }

    /// Current age of a held record.
    pub fn current_age(&self, record: &LsaRecord) -> u16 {
        record.current_age(self.age_counter, self.num_bins, self.limits.max_age)
    }

    /// Current age of the record for `identity`.
    pub fn age_of(&self, identity: &LsaIdentity) -> Option<u16> {
        self.get(identity).map(|r| self.current_age(r))
    }

    /// All held records, in no particular order.
    pub fn records(&self) -> impl Iterator<Item = &LsaRecord> {
        self.bins
            .iter()
            .flat_map(AgeBin::records)
            .chain(self.max_age_bin.records())
    }

    /// File a record by its current age, replacing any record with the
    /// same identity.
    ///
    /// Stamps the receipt counter; a record carrying an age at or beyond
    /// MaxAge goes straight to the MaxAge bin.
    pub fn add_record(&mut self, mut record: LsaRecord) -> BinSlot {
        let identity = *record.identity();
        self.remove_record(&identity);

        record.stamp_receipt(self.age_counter);
        let slot = if record.age_received() >= self.limits.max_age {
            BinSlot::MaxAge
        } else {
            let birth = i64::from(self.age_counter) - i64::from(record.age_received());
            BinSlot::Aging(self.age_to_bin(birth))
        };

        match self.bin_mut(slot) {
            Some(bin) => {
                bin.insert(record);
            }
            None => {
                warn!(lsa = %identity, slot = %slot, "No bin for record, force-flushing");
                record.set_pending_action(PendingAction::MaxAgeFlush);
                self.max_age_bin.insert(record);
                self.locator.insert(identity, BinSlot::MaxAge);
                return BinSlot::MaxAge;
            }
        }
        self.locator.insert(identity, slot);
        slot
    }

    /// Remove a record from whichever bin holds it.
    pub fn remove_record(&mut self, identity: &LsaIdentity) -> Option<LsaRecord> {
        let slot = self.locator.remove(identity)?;
        match self.bin_mut(slot).and_then(|bin| bin.remove(identity)) {
            Some(record) => Some(record),
            None => {
                warn!(lsa = %identity, slot = %slot, "Locator pointed at a bin without the record");
                self.sweep_for(identity)
            }
        }
    }

    /// Move a record into the MaxAge bin with a pending flush.
    pub fn force_max_age(&mut self, identity: &LsaIdentity) -> bool {
        let Some(mut record) = self.remove_record(identity) else {
            return false;
        };
        record.set_pending_action(PendingAction::MaxAgeFlush);
        self.max_age_bin.insert(record);
        self.locator.insert(*identity, BinSlot::MaxAge);
        true
    }

    /// Clear the pending action on a record once the database has acted on it.
    pub fn clear_pending(&mut self, identity: &LsaIdentity) {
        if let Some(slot) = self.locator.get(identity).copied()
            && let Some(record) = self.bin_mut(slot).and_then(|b| b.get_mut(identity))
        {
            record.set_pending_action(PendingAction::None);
        }
    }

    /// Records whose pending action is still set.
    pub fn pending(&self) -> Vec<AgingAction> {
        let mut out: Vec<AgingAction> = self
            .records()
            .filter(|r| r.pending_action() != PendingAction::None)
            .map(|r| AgingAction {
                identity: *r.identity(),
                action: r.pending_action(),
            })
            .collect();
        out.sort_by_key(|a| a.identity);
        out
    }

    /// Advance the counter by one second and return what crossed a threshold.
    ///
    /// Never fails: a record found out of place is logged and force-flushed.
    pub fn tick(&mut self) -> Vec<AgingAction> {
        self.age_counter = (self.age_counter + 1) % self.num_bins;
        let mut actions = Vec::new();

        // Records whose age is now LSRefreshTime
        if self.limits.ls_refresh_time > 0 && self.limits.ls_refresh_time < self.limits.max_age {
            let refresh_bin = self.age_to_bin(
                i64::from(self.age_counter) - i64::from(self.limits.ls_refresh_time),
            );
            for identity in self.bins[refresh_bin as usize].identities() {
                if !self.verify_slot(&identity, BinSlot::Aging(refresh_bin)) {
                    continue;
                }
                let Some(record) = self.bins[refresh_bin as usize].get(&identity) else {
                    continue;
                };
                if record.is_self_originated()
                    && self.current_age(record) >= self.limits.ls_refresh_time
                    && record.pending_action() == PendingAction::None
                {
                    if let Some(record) = self.bins[refresh_bin as usize].get_mut(&identity) {
                        record.set_pending_action(PendingAction::Refresh);
                    }
                    debug!(lsa = %identity, "LSA due for refresh");
                    actions.push(AgingAction {
                        identity,
                        action: PendingAction::Refresh,
                    });
                }
            }
        }

        // Records whose age is now MaxAge: born exactly num_bins ticks ago
        let expiry_bin = self.age_counter;
        for identity in self.bins[expiry_bin as usize].identities() {
            if !self.verify_slot(&identity, BinSlot::Aging(expiry_bin)) {
                continue;
            }
            let self_originated = self.bins[expiry_bin as usize]
                .get(&identity)
                .is_some_and(LsaRecord::is_self_originated);

            if self_originated {
                if let Some(record) = self.bins[expiry_bin as usize].get_mut(&identity) {
                    record.set_pending_action(PendingAction::Refresh);
                }
                debug!(lsa = %identity, "Self-originated LSA reached MaxAge without refresh");
                actions.push(AgingAction {
                    identity,
                    action: PendingAction::Refresh,
                });
            } else if let Some(mut record) = self.bins[expiry_bin as usize].remove(&identity) {
                record.set_pending_action(PendingAction::MaxAgeFlush);
                self.max_age_bin.insert(record);
                self.locator.insert(identity, BinSlot::MaxAge);
                debug!(lsa = %identity, "LSA reached MaxAge");
                actions.push(AgingAction {
                    identity,
                    action: PendingAction::MaxAgeFlush,
                });
            }
        }

        actions
    }

    /// Run `count` ticks back to back, collecting every action.
    pub fn tick_n(&mut self, count: u32) -> Vec<AgingAction> {
        let mut actions = Vec::new();
        for _ in 0..count {
            actions.extend(self.tick());
        }
        actions
    }

    /// Check that the locator and bins agree on every record, repairing
    /// disagreements by force-flushing. Returns the number of repairs.
    pub fn check_consistency(&mut self) -> usize {
        let mut misplaced = Vec::new();
        for bin in self.bins.iter().chain(std::iter::once(&self.max_age_bin)) {
            for record in bin.records() {
                let identity = *record.identity();
                if self.locator.get(&identity) != Some(&bin.slot()) || record.bin() != bin.slot() {
                    misplaced.push((identity, bin.slot()));
                }
            }
        }
        let mut repairs = misplaced.len();
        for (identity, slot) in misplaced {
            self.repair(&identity, slot);
        }

        let orphaned: Vec<LsaIdentity> = self
            .locator
            .iter()
            .filter(|(id, slot)| self.bin(**slot).is_none_or(|b| !b.contains(id)))
            .map(|(id, _)| *id)
            .collect();
        repairs += orphaned.len();
        for identity in orphaned {
            warn!(lsa = %identity, "Locator entry without record, dropping");
            self.locator.remove(&identity);
        }
        repairs
    }

    // === Internal ===

    fn bin(&self, slot: BinSlot) -> Option<&AgeBin> {
        match slot {
            BinSlot::Aging(n) => self.bins.get(n as usize),
            BinSlot::MaxAge => Some(&self.max_age_bin),
        }
    }

    fn bin_mut(&mut self, slot: BinSlot) -> Option<&mut AgeBin> {
        match slot {
            BinSlot::Aging(n) => self.bins.get_mut(n as usize),
            BinSlot::MaxAge => Some(&mut self.max_age_bin),
        }
    }

    /// True if `identity` is where the locator says. Otherwise repairs it.
    fn verify_slot(&mut self, identity: &LsaIdentity, found_in: BinSlot) -> bool {
        if self.locator.get(identity) == Some(&found_in) {
            return true;
        }
        self.repair(identity, found_in);
        false
    }

    /// Pull a misplaced record out of `found_in` and file it under MaxAge.
    fn repair(&mut self, identity: &LsaIdentity, found_in: BinSlot) {
        warn!(lsa = %identity, slot = %found_in, "Record out of place, force-flushing");
        let Some(mut record) = self.bin_mut(found_in).and_then(|b| b.remove(identity)) else {
            return;
        };
        if let Some(stale) = self.locator.get(identity).copied()
            && stale != found_in
            && let Some(duplicate) = self.bin_mut(stale).and_then(|b| b.remove(identity))
        {
            // Keep whichever copy is more recent
            if duplicate.sequence_number() > record.sequence_number() {
                record = duplicate;
            }
        }
        record.set_pending_action(PendingAction::MaxAgeFlush);
        self.max_age_bin.insert(record);
        self.locator.insert(*identity, BinSlot::MaxAge);
    }

    /// Search every bin for a record the locator lost track of.
    fn sweep_for(&mut self, identity: &LsaIdentity) -> Option<LsaRecord> {
        self.bins
            .iter_mut()
            .chain(std::iter::once(&mut self.max_age_bin))
            .find_map(|bin| bin.remove(identity))
    }
}
