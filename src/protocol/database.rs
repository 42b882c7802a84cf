//! Database exchange packets: DD, LSR, LSU and LSAck.

use crate::lsa::{Lsa, LsaHeader, LsaIdentity, LSA_HEADER_LEN};
use std::fmt;

/// IP header + OSPF header + fixed DD fields.
pub const DD_PACKET_OVERHEAD: u16 = 52;

/// Number of LSA headers that fit in one DD packet for `mtu`.
pub fn max_dd_headers(mtu: u16) -> usize {
    usize::from(mtu.saturating_sub(DD_PACKET_OVERHEAD) / LSA_HEADER_LEN).max(1)
}

// ============================================================================
// Database Description
// ============================================================================

/// DD flag bits.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct DdFlags {
    /// I: first packet of the exchange.
    pub init: bool,
    /// M: more packets follow.
    pub more: bool,
    /// MS: sender claims master.
    pub master: bool,
}

impl DdFlags {
    /// I, M and MS all set, as sent while negotiating.
    pub const NEGOTIATE: DdFlags = DdFlags {
        init: true,
        more: true,
        master: true,
    };

    pub fn new(init: bool, more: bool, master: bool) -> Self {
        Self { init, more, master }
    }

    /// Encoded flag byte.
    pub fn bits(&self) -> u8 {
        (u8::from(self.init) << 2) | (u8::from(self.more) << 1) | u8::from(self.master)
    }

    pub fn from_bits(bits: u8) -> Self {
        Self {
            init: bits & 0x04 != 0,
            more: bits & 0x02 != 0,
            master: bits & 0x01 != 0,
        }
    }
}

impl fmt::Display for DdFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bit = |set: bool, c: char| if set { c } else { '-' };
        write!(
            f,
            "{}{}{}",
            bit(self.init, 'I'),
            bit(self.more, 'M'),
            bit(self.master, 'S')
        )
    }
}

/// Database Description packet body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseDescription {
    pub interface_mtu: u16,
    pub options: u8,
    pub flags: DdFlags,
    pub sequence_number: u32,
    pub headers: Vec<LsaHeader>,
}

impl DatabaseDescription {
    /// Check if `other` repeats this packet (same flags, options and sequence).
    pub fn is_duplicate_of(&self, other: &DatabaseDescription) -> bool {
        self.flags == other.flags
            && self.options == other.options
            && self.sequence_number == other.sequence_number
    }
}

// ============================================================================
// Link-State Request / Update / Ack
// ============================================================================

/// Link-State Request body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkStateRequest {
    pub identities: Vec<LsaIdentity>,
}

/// Link-State Update body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkStateUpdate {
    pub lsas: Vec<Lsa>,
}

/// Link-State Acknowledgement body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LinkStateAck {
    pub headers: Vec<LsaHeader>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_dd_headers_for_ethernet() {
        // (1500 - 52) / 20
        assert_eq!(max_dd_headers(1500), 72);
        assert_eq!(max_dd_headers(92), 2);
        assert_eq!(max_dd_headers(0), 1);
    }

    #[test]
    fn test_flag_bits() {
        assert_eq!(DdFlags::NEGOTIATE.bits(), 0x07);
        assert_eq!(DdFlags::new(false, true, false).bits(), 0x02);
        assert_eq!(DdFlags::from_bits(0x05), DdFlags::new(true, false, true));
        assert_eq!(DdFlags::NEGOTIATE.to_string(), "IMS");
        assert_eq!(DdFlags::default().to_string(), "---");
    }

    #[test]
    fn test_duplicate_detection_ignores_headers() {
        let a = DatabaseDescription {
            interface_mtu: 1500,
            options: 0x02,
            flags: DdFlags::new(false, true, true),
            sequence_number: 7,
            headers: Vec::new(),
        };
        let mut b = a.clone();
        assert!(a.is_duplicate_of(&b));
        b.sequence_number = 8;
        assert!(!a.is_duplicate_of(&b));
    }
}
