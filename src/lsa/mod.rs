//! Link-State Advertisements
//!
//! The already-parsed form of an LSA as the engine sees it: a header that
//! identifies the instance, plus a body. Wire encoding lives outside this
//! crate; the body is kept only as far as the engine needs it (router
//! links for topology notifications, opaque bytes for everything else).

mod compare;
mod record;

pub use compare::{compare, Freshness};
pub use record::{BinSlot, LsaRecord, PendingAction};

use crate::RouterId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

// ============================================================================
// Architectural Constants
// ============================================================================

/// Age at which an LSA is expired and must be flushed (seconds).
pub const MAX_AGE: u16 = 3600;

/// Age at which a self-originated LSA is re-originated (seconds).
pub const LS_REFRESH_TIME: u16 = 1800;

/// Age difference beyond which two otherwise identical instances differ.
pub const MAX_AGE_DIFF: u16 = 900;

/// Minimum interval between accepting instances of the same LSA.
pub const MIN_LS_ARRIVAL: u16 = 1;

/// Age added to an LSA each time it is transmitted.
pub const INF_TRANS_DELAY: u16 = 1;

/// First sequence number used for a new LSA instance.
pub const INITIAL_SEQUENCE_NUMBER: i32 = 0x8000_0001_u32 as i32;

/// Largest sequence number an instance may carry.
pub const MAX_SEQUENCE_NUMBER: i32 = 0x7fff_ffff;

/// Size of an LSA header on the wire.
pub const LSA_HEADER_LEN: u16 = 20;

/// Options bit: AS-external routing capability.
pub const OPTION_E: u8 = 0x02;

/// Options bit: opaque LSA capability.
pub const OPTION_O: u8 = 0x40;

/// Age thresholds used by the aging engine and freshness comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AgeLimits {
    pub max_age: u16,
    pub ls_refresh_time: u16,
    pub max_age_diff: u16,
}

impl Default for AgeLimits {
    fn default() -> Self {
        Self {
            max_age: MAX_AGE,
            ls_refresh_time: LS_REFRESH_TIME,
            max_age_diff: MAX_AGE_DIFF,
        }
    }
}

// ============================================================================
// LSA Type & Identity
// ============================================================================

/// LSA type code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LsaType {
    Router = 1,
    Network = 2,
    SummaryNetwork = 3,
    SummaryAsbr = 4,
    AsExternal = 5,
    OpaqueLink = 9,
    OpaqueArea = 10,
    OpaqueAs = 11,
}

impl LsaType {
    /// Convert from the wire type code.
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            1 => Some(LsaType::Router),
            2 => Some(LsaType::Network),
            3 => Some(LsaType::SummaryNetwork),
            4 => Some(LsaType::SummaryAsbr),
            5 => Some(LsaType::AsExternal),
            9 => Some(LsaType::OpaqueLink),
            10 => Some(LsaType::OpaqueArea),
            11 => Some(LsaType::OpaqueAs),
            _ => None,
        }
    }

    /// The wire type code.
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Check if this is one of the opaque types.
    pub fn is_opaque(&self) -> bool {
        matches!(
            self,
            LsaType::OpaqueLink | LsaType::OpaqueArea | LsaType::OpaqueAs
        )
    }
}

impl fmt::Display for LsaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LsaType::Router => "router",
            LsaType::Network => "network",
            LsaType::SummaryNetwork => "summary-network",
            LsaType::SummaryAsbr => "summary-asbr",
            LsaType::AsExternal => "as-external",
            LsaType::OpaqueLink => "opaque-link",
            LsaType::OpaqueArea => "opaque-area",
            LsaType::OpaqueAs => "opaque-as",
        };
        write!(f, "{}", s)
    }
}

/// Database key of an LSA: `(type, link-state id, advertising router)`.
///
/// Exactly one instance per identity exists in an area database.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LsaIdentity {
    pub lsa_type: LsaType,
    pub link_state_id: Ipv4Addr,
    pub advertising_router: RouterId,
}

impl LsaIdentity {
    pub fn new(lsa_type: LsaType, link_state_id: Ipv4Addr, advertising_router: RouterId) -> Self {
        Self {
            lsa_type,
            link_state_id,
            advertising_router,
        }
    }

    /// Identity of the Router LSA originated by `router`.
    pub fn router(router: RouterId) -> Self {
        Self::new(LsaType::Router, router.addr(), router)
    }
}

impl fmt::Display for LsaIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.lsa_type, self.link_state_id, self.advertising_router
        )
    }
}

// ============================================================================
// Header
// ============================================================================

/// LSA header as carried in DD, LSU and LSAck packets.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LsaHeader {
    pub age: u16,
    pub options: u8,
    pub identity: LsaIdentity,
    pub sequence_number: i32,
    pub checksum: u16,
    pub length: u16,
}

impl LsaHeader {
    /// Check if the header carries MaxAge under the given limits.
    pub fn is_max_age(&self, limits: &AgeLimits) -> bool {
        self.age >= limits.max_age
    }
}

// ============================================================================
// Body
// ============================================================================

/// Kind of a link described in a Router LSA.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RouterLinkKind {
    PointToPoint = 1,
    Transit = 2,
    Stub = 3,
    Virtual = 4,
}

/// One link entry of a Router LSA.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouterLink {
    pub kind: RouterLinkKind,
    /// Neighbor router ID (p2p, virtual), DR address (transit) or network (stub).
    pub link_id: Ipv4Addr,
    /// Local interface address, or network mask for stub links.
    pub link_data: Ipv4Addr,
    pub metric: u16,
}

/// Router LSA body.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouterLsa {
    pub flags: u8,
    pub links: Vec<RouterLink>,
}

/// Network LSA body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkLsa {
    pub mask: Ipv4Addr,
    pub attached_routers: Vec<RouterId>,
}

/// LSA body. Traffic-engineering TLVs stay opaque.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LsaBody {
    Router(RouterLsa),
    Network(NetworkLsa),
    Opaque(Vec<u8>),
    Raw(Vec<u8>),
}

impl LsaBody {
    /// Canonical bytes of the body, fed to the checksum.
    fn checksum_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        match self {
            LsaBody::Router(router) => {
                out.push(router.flags);
                for link in &router.links {
                    out.extend_from_slice(&link.link_id.octets());
                    out.extend_from_slice(&link.link_data.octets());
                    out.push(link.kind as u8);
                    out.extend_from_slice(&link.metric.to_be_bytes());
                }
            }
            LsaBody::Network(network) => {
                out.extend_from_slice(&network.mask.octets());
                for router in &network.attached_routers {
                    out.extend_from_slice(&router.addr().octets());
                }
            }
            LsaBody::Opaque(bytes) | LsaBody::Raw(bytes) => out.extend_from_slice(bytes),
        }
        out
    }

    /// Approximate encoded body length.
    fn encoded_len(&self) -> u16 {
        let len = match self {
            LsaBody::Router(router) => 4 + 12 * router.links.len(),
            LsaBody::Network(network) => 4 + 4 * network.attached_routers.len(),
            LsaBody::Opaque(bytes) | LsaBody::Raw(bytes) => bytes.len(),
        };
        u16::try_from(len).unwrap_or(u16::MAX)
    }
}

/// A complete LSA instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lsa {
    pub header: LsaHeader,
    pub body: LsaBody,
}

impl Lsa {
    /// Build an instance, filling in length and checksum.
    pub fn new(
        identity: LsaIdentity,
        options: u8,
        sequence_number: i32,
        age: u16,
        body: LsaBody,
    ) -> Self {
        let checksum = fletcher_checksum(&identity, sequence_number, &body);
        let length = LSA_HEADER_LEN.saturating_add(body.encoded_len());
        Self {
            header: LsaHeader {
                age,
                options,
                identity,
                sequence_number,
                checksum,
                length,
            },
            body,
        }
    }

    pub fn identity(&self) -> &LsaIdentity {
        &self.header.identity
    }

    /// Copy of this instance with a new sequence number and age, checksum recomputed.
    pub fn reissue(&self, sequence_number: i32, age: u16) -> Self {
        Self::new(
            self.header.identity,
            self.header.options,
            sequence_number,
            age,
            self.body.clone(),
        )
    }

    /// Check the carried checksum against the content.
    pub fn verify_checksum(&self) -> bool {
        fletcher_checksum(&self.header.identity, self.header.sequence_number, &self.body)
            == self.header.checksum
    }

    /// Router LSA body, if this is one.
    pub fn as_router(&self) -> Option<&RouterLsa> {
        match &self.body {
            LsaBody::Router(router) => Some(router),
            _ => None,
        }
    }
}

/// Fletcher-16 over the age-independent LSA content.
fn fletcher_checksum(identity: &LsaIdentity, sequence_number: i32, body: &LsaBody) -> u16 {
    let mut data = Vec::with_capacity(16);
    data.push(identity.lsa_type.to_u8());
    data.extend_from_slice(&identity.link_state_id.octets());
    data.extend_from_slice(&identity.advertising_router.addr().octets());
    data.extend_from_slice(&sequence_number.to_be_bytes());
    data.extend_from_slice(&body.checksum_bytes());

    let mut c0: u32 = 0;
    let mut c1: u32 = 0;
    for byte in data {
        c0 = (c0 + u32::from(byte)) % 255;
        c1 = (c1 + c0) % 255;
    }
    ((c1 << 8) | c0) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_router_lsa(seq: i32) -> Lsa {
        let router = RouterId::from_octets(10, 0, 0, 1);
        Lsa::new(
            LsaIdentity::router(router),
            OPTION_E,
            seq,
            0,
            LsaBody::Router(RouterLsa {
                flags: 0,
                links: vec![RouterLink {
                    kind: RouterLinkKind::PointToPoint,
                    link_id: Ipv4Addr::new(10, 0, 0, 2),
                    link_data: Ipv4Addr::new(192, 168, 1, 1),
                    metric: 10,
                }],
            }),
        )
    }

    #[test]
    fn test_checksum_verifies_and_tracks_content() {
        let lsa = sample_router_lsa(5);
        assert!(lsa.verify_checksum());

        let mut tampered = lsa.clone();
        tampered.header.sequence_number = 6;
        assert!(!tampered.verify_checksum());
    }

    #[test]
    fn test_checksum_ignores_age() {
        let young = sample_router_lsa(5);
        let old = young.reissue(5, 1200);
        assert_eq!(young.header.checksum, old.header.checksum);
        assert_eq!(old.header.age, 1200);
    }

    #[test]
    fn test_reissue_changes_checksum_with_sequence() {
        let lsa = sample_router_lsa(5);
        let next = lsa.reissue(6, 0);
        assert_eq!(next.header.sequence_number, 6);
        assert!(next.verify_checksum());
        assert_ne!(next.header.checksum, lsa.header.checksum);
    }

    #[test]
    fn test_lsa_type_codes() {
        for code in [1u8, 2, 3, 4, 5, 9, 10, 11] {
            let ty = LsaType::from_u8(code).unwrap();
            assert_eq!(ty.to_u8(), code);
        }
        assert!(LsaType::from_u8(6).is_none());
        assert!(LsaType::OpaqueArea.is_opaque());
        assert!(!LsaType::Router.is_opaque());
    }

    #[test]
    fn test_identity_display() {
        let identity = LsaIdentity::router(RouterId::from_octets(10, 0, 0, 1));
        assert_eq!(identity.to_string(), "router/10.0.0.1/10.0.0.1");
    }

    #[test]
    fn test_initial_sequence_number_is_most_negative_plus_one() {
        assert_eq!(INITIAL_SEQUENCE_NUMBER, i32::MIN + 1);
        assert!(INITIAL_SEQUENCE_NUMBER < MAX_SEQUENCE_NUMBER);
    }
}
