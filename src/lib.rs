//! ospf-engine: link-state database aging and neighbor adjacency engine
//!
//! The core of an OSPF-style link-state router. Each area keeps a
//! continuously aging database of LSAs and runs one adjacency state
//! machine per neighbor, synchronising databases and flooding changes so
//! every router in the area converges on the same view. Packet encoding
//! and sockets live outside this crate; the engine consumes and produces
//! already-decoded messages.

pub mod aging;
pub mod area;
pub mod config;
pub mod ids;
pub mod interface;
pub mod lsa;
pub mod lsdb;
pub mod neighbor;
pub mod protocol;
pub mod runtime;
pub mod topology;

// Re-export identifier types
pub use ids::{AreaId, InterfaceId, RouterId};

// Re-export config types
pub use config::{AreaConfig, Config, ConfigError, InterfaceConfig, InterfaceKind, RouterConfig};

// Re-export database types
pub use aging::{AgingAction, AgingEngine};
pub use lsa::{Lsa, LsaBody, LsaHeader, LsaIdentity, LsaRecord, LsaType};
pub use lsdb::{AcceptanceResult, LinkStateDatabase};

// Re-export adjacency types
pub use interface::Interface;
pub use neighbor::{Neighbor, NeighborEvent, NeighborState};

// Re-export area and runtime types
pub use area::{Area, AreaError, AreaSummary};
pub use runtime::{AreaHandle, Instance, RuntimeError};
pub use topology::{LoggingListener, TopologyEvent, TopologyListener};
