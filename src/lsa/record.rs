//! Database record: one LSA instance plus aging metadata.

use super::{Lsa, LsaHeader, LsaIdentity};
use std::fmt;

/// Bin a record currently lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinSlot {
    /// Regular bin, indexed by the counter value at which the record had age 0.
    Aging(u32),
    /// The MaxAge bin.
    MaxAge,
}

impl fmt::Display for BinSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinSlot::Aging(n) => write!(f, "bin:{}", n),
            BinSlot::MaxAge => write!(f, "bin:max_age"),
        }
    }
}

/// Action requested by the aging engine, consumed by the database.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PendingAction {
    #[default]
    None,
    /// Self-originated record due for re-origination.
    Refresh,
    /// Record reached MaxAge and must be flushed from the domain.
    MaxAgeFlush,
}

impl fmt::Display for PendingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PendingAction::None => "none",
            PendingAction::Refresh => "refresh",
            PendingAction::MaxAgeFlush => "max_age_flush",
        };
        write!(f, "{}", s)
    }
}

/// One LSA instance held by a database.
///
/// The age is never stored as a running value. It is derived from the
/// age the LSA carried at receipt plus the number of aging ticks since.
#[derive(Clone, Debug)]
pub struct LsaRecord {
    lsa: Lsa,
    age_received: u16,
    age_counter_at_receipt: u32,
    self_originated: bool,
    bin: BinSlot,
    pending_action: PendingAction,
}

impl LsaRecord {
    /// Wrap an instance. Bin assignment happens when the aging engine adopts it.
    pub fn new(lsa: Lsa, self_originated: bool) -> Self {
        let age_received = if self_originated { 0 } else { lsa.header.age };
        Self {
            lsa,
            age_received,
            age_counter_at_receipt: 0,
            self_originated,
            bin: BinSlot::Aging(0),
            pending_action: PendingAction::None,
        }
    }

    pub fn lsa(&self) -> &Lsa {
        &self.lsa
    }

    pub fn identity(&self) -> &LsaIdentity {
        &self.lsa.header.identity
    }

    pub fn sequence_number(&self) -> i32 {
        self.lsa.header.sequence_number
    }

    pub fn checksum(&self) -> u16 {
        self.lsa.header.checksum
    }

    pub fn age_received(&self) -> u16 {
        self.age_received
    }

    pub fn age_counter_at_receipt(&self) -> u32 {
        self.age_counter_at_receipt
    }

    pub fn is_self_originated(&self) -> bool {
        self.self_originated
    }

    pub fn bin(&self) -> BinSlot {
        self.bin
    }

    pub fn pending_action(&self) -> PendingAction {
        self.pending_action
    }

    /// Age at the given aging counter, clamped to `[0, max_age]`.
    pub fn current_age(&self, counter: u32, num_bins: u32, max_age: u16) -> u16 {
        if self.bin == BinSlot::MaxAge {
            return max_age;
        }
        let n = num_bins.max(1);
        let elapsed = (counter % n + n - self.age_counter_at_receipt % n) % n;
        let age = u32::from(self.age_received) + elapsed;
        u16::try_from(age).unwrap_or(u16::MAX).min(max_age)
    }

    /// Header with the age field set to `age`.
    pub fn header_with_age(&self, age: u16) -> LsaHeader {
        LsaHeader {
            age,
            ..self.lsa.header
        }
    }

    /// Full instance with the age field set to `age`.
    pub fn lsa_with_age(&self, age: u16) -> Lsa {
        let mut lsa = self.lsa.clone();
        lsa.header.age = age;
        lsa
    }

    pub(crate) fn stamp_receipt(&mut self, counter: u32) {
        self.age_counter_at_receipt = counter;
    }

    pub(crate) fn set_bin(&mut self, bin: BinSlot) {
        self.bin = bin;
    }

    pub(crate) fn set_pending_action(&mut self, action: PendingAction) {
        self.pending_action = action;
    }
}
