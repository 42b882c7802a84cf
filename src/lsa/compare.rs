//! Freshness comparison between two instances of the same LSA.

use super::{AgeLimits, LsaHeader};
use std::cmp::Ordering;
use std::fmt;

/// Result of comparing a candidate instance against an existing one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    /// The candidate is more recent.
    Newer,
    /// Both describe the same instance.
    Same,
    /// The existing instance is more recent.
    Older,
}

impl Freshness {
    pub fn is_newer(&self) -> bool {
        matches!(self, Freshness::Newer)
    }

    pub fn is_same(&self) -> bool {
        matches!(self, Freshness::Same)
    }

    pub fn is_older(&self) -> bool {
        matches!(self, Freshness::Older)
    }

    fn from_ordering(ordering: Ordering) -> Option<Self> {
        match ordering {
            Ordering::Greater => Some(Freshness::Newer),
            Ordering::Less => Some(Freshness::Older),
            Ordering::Equal => None,
        }
    }
}

impl fmt::Display for Freshness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Freshness::Newer => "newer",
            Freshness::Same => "same",
            Freshness::Older => "older",
        };
        write!(f, "{}", s)
    }
}

/// Compare `candidate` against `existing`. Both headers must carry their
/// current age.
///
/// Order of tests: sequence number, checksum, MaxAge, then an age
/// difference larger than `max_age_diff` (the younger instance wins).
pub fn compare(candidate: &LsaHeader, existing: &LsaHeader, limits: &AgeLimits) -> Freshness {
    if let Some(f) = Freshness::from_ordering(candidate.sequence_number.cmp(&existing.sequence_number)) {
        return f;
    }
    if let Some(f) = Freshness::from_ordering(candidate.checksum.cmp(&existing.checksum)) {
        return f;
    }

    let candidate_max = candidate.is_max_age(limits);
    let existing_max = existing.is_max_age(limits);
    match (candidate_max, existing_max) {
        (true, false) => return Freshness::Newer,
        (false, true) => return Freshness::Older,
        (true, true) => return Freshness::Same,
        (false, false) => {}
    }

    if candidate.age.abs_diff(existing.age) > limits.max_age_diff {
        if candidate.age < existing.age {
            Freshness::Newer
        } else {
            Freshness::Older
        }
    } else {
        Freshness::Same
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsa::{LsaIdentity, OPTION_E};
    use crate::RouterId;

    fn header(seq: i32, checksum: u16, age: u16) -> LsaHeader {
        LsaHeader {
            age,
            options: OPTION_E,
            identity: LsaIdentity::router(RouterId::from_octets(10, 0, 0, 1)),
            sequence_number: seq,
            checksum,
            length: 36,
        }
    }

    #[test]
    fn test_sequence_number_dominates() {
        let limits = AgeLimits::default();
        let a = header(6, 0x0001, 3000);
        let b = header(5, 0xffff, 0);
        assert_eq!(compare(&a, &b, &limits), Freshness::Newer);
        assert_eq!(compare(&b, &a, &limits), Freshness::Older);
    }

    #[test]
    fn test_negative_sequence_numbers_order_signed() {
        let limits = AgeLimits::default();
        let initial = header(crate::lsa::INITIAL_SEQUENCE_NUMBER, 1, 0);
        let later = header(1, 1, 0);
        assert_eq!(compare(&later, &initial, &limits), Freshness::Newer);
    }

    #[test]
    fn test_checksum_breaks_sequence_tie() {
        let limits = AgeLimits::default();
        let a = header(5, 0x2000, 10);
        let b = header(5, 0x1000, 10);
        assert_eq!(compare(&a, &b, &limits), Freshness::Newer);
    }

    #[test]
    fn test_max_age_wins_tie() {
        let limits = AgeLimits::default();
        let flushed = header(5, 0x1000, limits.max_age);
        let live = header(5, 0x1000, 10);
        assert_eq!(compare(&flushed, &live, &limits), Freshness::Newer);
        assert_eq!(compare(&live, &flushed, &limits), Freshness::Older);
        assert_eq!(compare(&flushed, &flushed, &limits), Freshness::Same);
    }

    #[test]
    fn test_large_age_difference_prefers_younger() {
        let limits = AgeLimits::default();
        let young = header(5, 0x1000, 10);
        let old = header(5, 0x1000, 10 + limits.max_age_diff + 1);
        assert_eq!(compare(&young, &old, &limits), Freshness::Newer);
        assert_eq!(compare(&old, &young, &limits), Freshness::Older);
    }

    #[test]
    fn test_small_age_difference_is_same() {
        let limits = AgeLimits::default();
        let a = header(5, 0x1000, 10);
        let b = header(5, 0x1000, 10 + limits.max_age_diff);
        assert_eq!(compare(&a, &b, &limits), Freshness::Same);
    }

    #[test]
    fn test_freshness_law_is_antisymmetric() {
        let limits = AgeLimits::default();
        let samples = [
            header(4, 1, 0),
            header(5, 1, 0),
            header(5, 2, 0),
            header(5, 2, 1000),
            header(5, 2, limits.max_age),
        ];
        for a in &samples {
            for b in &samples {
                let ab = compare(a, b, &limits);
                let ba = compare(b, a, &limits);
                match ab {
                    Freshness::Newer => assert_eq!(ba, Freshness::Older),
                    Freshness::Older => assert_eq!(ba, Freshness::Newer),
                    Freshness::Same => assert_eq!(ba, Freshness::Same),
                }
            }
        }
    }
}
