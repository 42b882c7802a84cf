//! Protocol Messages
//!
//! Already-decoded packet shapes consumed and produced by the engine. The
//! transport layer owns encoding and sockets; the engine only ever sees
//! and builds these values.
//!
//! ## Packet types
//!
//! Hello (1) discovers neighbors and keeps them alive. Database Description
//! (2) summarises database headers during adjacency bring-up. Link-State
//! Request (3), Update (4) and Acknowledgement (5) move and confirm
//! individual LSAs.

mod database;
mod hello;

pub use database::{
    DatabaseDescription, DdFlags, LinkStateAck, LinkStateRequest, LinkStateUpdate,
    DD_PACKET_OVERHEAD, max_dd_headers,
};
pub use hello::Hello;

use crate::{AreaId, InterfaceId, RouterId};
use std::fmt;
use std::net::Ipv4Addr;

/// Protocol version carried in every packet.
pub const PROTOCOL_VERSION: u8 = 2;

/// AllSPFRouters multicast group.
pub const ALL_SPF_ROUTERS: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 5);

/// AllDRouters multicast group.
pub const ALL_D_ROUTERS: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 6);

// ============================================================================
// Packet Type
// ============================================================================

/// Packet type identifiers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PacketType {
    Hello = 1,
    DatabaseDescription = 2,
    LinkStateRequest = 3,
    LinkStateUpdate = 4,
    LinkStateAck = 5,
}

impl PacketType {
    /// Try to convert from a byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(PacketType::Hello),
            2 => Some(PacketType::DatabaseDescription),
            3 => Some(PacketType::LinkStateRequest),
            4 => Some(PacketType::LinkStateUpdate),
            5 => Some(PacketType::LinkStateAck),
            _ => None,
        }
    }

    /// Convert to a byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PacketType::Hello => "Hello",
            PacketType::DatabaseDescription => "DatabaseDescription",
            PacketType::LinkStateRequest => "LinkStateRequest",
            PacketType::LinkStateUpdate => "LinkStateUpdate",
            PacketType::LinkStateAck => "LinkStateAck",
        };
        write!(f, "{}", name)
    }
}

// ============================================================================
// Packet
// ============================================================================

/// Packet body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PacketBody {
    Hello(Hello),
    DatabaseDescription(DatabaseDescription),
    LinkStateRequest(LinkStateRequest),
    LinkStateUpdate(LinkStateUpdate),
    LinkStateAck(LinkStateAck),
}

impl PacketBody {
    pub fn packet_type(&self) -> PacketType {
        match self {
            PacketBody::Hello(_) => PacketType::Hello,
            PacketBody::DatabaseDescription(_) => PacketType::DatabaseDescription,
            PacketBody::LinkStateRequest(_) => PacketType::LinkStateRequest,
            PacketBody::LinkStateUpdate(_) => PacketType::LinkStateUpdate,
            PacketBody::LinkStateAck(_) => PacketType::LinkStateAck,
        }
    }
}

/// A decoded packet: common header fields plus body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Packet {
    pub router_id: RouterId,
    pub area_id: AreaId,
    pub body: PacketBody,
}

impl Packet {
    pub fn new(router_id: RouterId, area_id: AreaId, body: PacketBody) -> Self {
        Self {
            router_id,
            area_id,
            body,
        }
    }

    pub fn packet_type(&self) -> PacketType {
        self.body.packet_type()
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// Where an outbound packet goes on its interface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Destination {
    AllSpfRouters,
    AllDRouters,
    Neighbor(Ipv4Addr),
}

impl Destination {
    /// IPv4 destination address.
    pub fn addr(&self) -> Ipv4Addr {
        match self {
            Destination::AllSpfRouters => ALL_SPF_ROUTERS,
            Destination::AllDRouters => ALL_D_ROUTERS,
            Destination::Neighbor(addr) => *addr,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr())
    }
}

/// A packet ready for the transport layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundPacket {
    pub interface: InterfaceId,
    pub destination: Destination,
    pub packet: Packet,
}

impl OutboundPacket {
    pub fn packet_type(&self) -> PacketType {
        self.packet.packet_type()
    }
}
