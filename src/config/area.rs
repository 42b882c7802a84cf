//! Area and interface configuration (`areas[]`).

use crate::AreaId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Network type of an interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterfaceKind {
    #[default]
    PointToPoint,
    Broadcast,
    VirtualLink,
    Nbma,
}

impl InterfaceKind {
    /// Point-to-point and virtual links always form adjacencies.
    pub fn is_point_to_point(&self) -> bool {
        matches!(self, InterfaceKind::PointToPoint | InterfaceKind::VirtualLink)
    }
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InterfaceKind::PointToPoint => "point_to_point",
            InterfaceKind::Broadcast => "broadcast",
            InterfaceKind::VirtualLink => "virtual_link",
            InterfaceKind::Nbma => "nbma",
        };
        write!(f, "{}", s)
    }
}

/// One interface within an area (`areas[].interfaces[]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceConfig {
    pub name: String,
    pub address: Ipv4Addr,
    #[serde(default = "InterfaceConfig::default_mask")]
    pub mask: Ipv4Addr,
    #[serde(default)]
    pub kind: InterfaceKind,
    #[serde(default = "InterfaceConfig::default_mtu")]
    pub mtu: u16,
    /// Output cost advertised in the Router LSA.
    #[serde(default = "InterfaceConfig::default_cost")]
    pub cost: u16,
    #[serde(default = "InterfaceConfig::default_priority")]
    pub priority: u8,
    #[serde(default = "InterfaceConfig::default_hello_interval_secs")]
    pub hello_interval_secs: u16,
    #[serde(default = "InterfaceConfig::default_router_dead_interval_secs")]
    pub router_dead_interval_secs: u32,
    #[serde(default = "InterfaceConfig::default_retransmit_interval_secs")]
    pub retransmit_interval_secs: u16,
    /// Neighbors polled on NBMA networks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub static_neighbors: Vec<Ipv4Addr>,
}

impl InterfaceConfig {
    fn default_mask() -> Ipv4Addr { Ipv4Addr::new(255, 255, 255, 0) }
    fn default_mtu() -> u16 { 1500 }
    fn default_cost() -> u16 { 10 }
    fn default_priority() -> u8 { 1 }
    fn default_hello_interval_secs() -> u16 { 10 }
    fn default_router_dead_interval_secs() -> u32 { 40 }
    fn default_retransmit_interval_secs() -> u16 { 5 }

    /// Interface with every optional field at its default.
    pub fn new(name: impl Into<String>, address: Ipv4Addr, kind: InterfaceKind) -> Self {
        Self {
            name: name.into(),
            address,
            mask: Self::default_mask(),
            kind,
            mtu: Self::default_mtu(),
            cost: Self::default_cost(),
            priority: Self::default_priority(),
            hello_interval_secs: Self::default_hello_interval_secs(),
            router_dead_interval_secs: Self::default_router_dead_interval_secs(),
            retransmit_interval_secs: Self::default_retransmit_interval_secs(),
            static_neighbors: Vec::new(),
        }
    }
}

/// One area (`areas[]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaConfig {
    pub area_id: AreaId,
    /// Whether AS-external LSAs are carried in this area.
    #[serde(default = "AreaConfig::default_external_routing_capability")]
    pub external_routing_capability: bool,
    /// Whether opaque LSAs are carried in this area.
    #[serde(default)]
    pub opaque_capable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<InterfaceConfig>,
}

impl AreaConfig {
    fn default_external_routing_capability() -> bool { true }

    pub fn new(area_id: AreaId) -> Self {
        Self {
            area_id,
            external_routing_capability: true,
            opaque_capable: false,
            interfaces: Vec::new(),
        }
    }

    /// Options byte advertised in Hellos, DDs and originated LSAs.
    pub fn options(&self) -> u8 {
        let mut options = 0;
        if self.external_routing_capability {
            options |= crate::lsa::OPTION_E;
        }
        if self.opaque_capable {
            options |= crate::lsa::OPTION_O;
        }
        options
    }
}
