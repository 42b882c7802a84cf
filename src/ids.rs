//! Router, area and interface identifiers.
//!
//! Router and area identifiers are dotted-quad 32-bit values. Ordering
//! follows the numeric value, which is what master/slave negotiation
//! compares.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// 32-bit router identifier, written as a dotted quad.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouterId(Ipv4Addr);

impl RouterId {
    /// Create a router ID from its dotted-quad form.
    pub const fn new(addr: Ipv4Addr) -> Self {
        Self(addr)
    }

    /// Create a router ID from its four octets.
    pub const fn from_octets(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self(Ipv4Addr::new(a, b, c, d))
    }

    /// The identifier as an IPv4 address.
    pub fn addr(&self) -> Ipv4Addr {
        self.0
    }

    /// The identifier as a host-order integer.
    pub fn as_u32(&self) -> u32 {
        u32::from(self.0)
    }
}

impl From<Ipv4Addr> for RouterId {
    fn from(addr: Ipv4Addr) -> Self {
        Self(addr)
    }
}

impl FromStr for RouterId {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl fmt::Debug for RouterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RouterId({})", self.0)
    }
}

impl fmt::Display for RouterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 32-bit area identifier. Area 0.0.0.0 is the backbone.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AreaId(Ipv4Addr);

impl AreaId {
    /// The backbone area.
    pub const BACKBONE: AreaId = AreaId(Ipv4Addr::UNSPECIFIED);

    /// Create an area ID from its dotted-quad form.
    pub const fn new(addr: Ipv4Addr) -> Self {
        Self(addr)
    }

    /// Create an area ID from its four octets.
    pub const fn from_octets(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self(Ipv4Addr::new(a, b, c, d))
    }

    /// Check if this is the backbone area.
    pub fn is_backbone(&self) -> bool {
        *self == Self::BACKBONE
    }
}

impl FromStr for AreaId {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl fmt::Debug for AreaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AreaId({})", self.0)
    }
}

impl fmt::Display for AreaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of an interface within its area.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterfaceId(u32);

impl InterfaceId {
    /// Create a new interface ID.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw ID value.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "if:{}", self.0)
    }
}
