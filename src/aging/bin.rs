//! A single age bin.

use crate::lsa::{BinSlot, LsaIdentity, LsaRecord};
use std::collections::HashMap;

/// Bucket of records that share a birth tick.
#[derive(Clone, Debug, Default)]
pub struct AgeBin {
    bin_number: Option<u32>,
    entries: HashMap<LsaIdentity, LsaRecord>,
}

impl AgeBin {
    /// A regular bin.
    pub fn new(bin_number: u32) -> Self {
        Self {
            bin_number: Some(bin_number),
            entries: HashMap::new(),
        }
    }

    /// The MaxAge bin.
    pub fn max_age() -> Self {
        Self {
            bin_number: None,
            entries: HashMap::new(),
        }
    }

    pub fn slot(&self) -> BinSlot {
        match self.bin_number {
            Some(n) => BinSlot::Aging(n),
            None => BinSlot::MaxAge,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, identity: &LsaIdentity) -> Option<&LsaRecord> {
        self.entries.get(identity)
    }

    pub fn get_mut(&mut self, identity: &LsaIdentity) -> Option<&mut LsaRecord> {
        self.entries.get_mut(identity)
    }

    pub fn contains(&self, identity: &LsaIdentity) -> bool {
        self.entries.contains_key(identity)
    }

    /// Insert a record, stamping this bin on it.
    pub fn insert(&mut self, mut record: LsaRecord) -> Option<LsaRecord> {
        record.set_bin(self.slot());
        self.entries.insert(*record.identity(), record)
    }

    pub fn remove(&mut self, identity: &LsaIdentity) -> Option<LsaRecord> {
        self.entries.remove(identity)
    }

    /// Identities currently in the bin, in stable order.
    pub fn identities(&self) -> Vec<LsaIdentity> {
        let mut ids: Vec<_> = self.entries.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn records(&self) -> impl Iterator<Item = &LsaRecord> {
        self.entries.values()
    }
}
