//! Neighbor Adjacency State Machine
//!
//! One `Neighbor` per router heard on an interface. It walks
//! `Down → Attempt → Init → TwoWay → ExStart → Exchange → Loading → Full`
//! and falls back to `Down` on inactivity or teardown. Every transition
//! goes through `set_state`, which records it for the owning area.
//!
//! The neighbor never mutates the database. It reads it (through
//! `LinkContext`) to build DD summaries and request lists, and queues
//! packets for itself in a FIFO outbox the area drains after every call.

mod exchange;
mod timer;

pub(crate) use exchange::aged_for_transmit;
pub use timer::{NeighborTimers, Timer, TimerKind};

use crate::lsa::{LsaHeader, LsaIdentity, LsaRecord};
use crate::lsdb::{HeaderSnapshot, LinkStateDatabase};
use crate::protocol::{DatabaseDescription, PacketBody};
use crate::{InterfaceId, RouterId};
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use tracing::{debug, info, warn};

// ============================================================================
// State & Events
// ============================================================================

/// Adjacency state. Ordered by progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum NeighborState {
    #[default]
    Down,
    Attempt,
    Init,
    TwoWay,
    ExStart,
    Exchange,
    Loading,
    Full,
}

impl NeighborState {
    pub fn is_down(&self) -> bool {
        matches!(self, NeighborState::Down)
    }

    pub fn is_full(&self) -> bool {
        matches!(self, NeighborState::Full)
    }

    /// Bidirectional communication established.
    pub fn is_two_way_or_above(&self) -> bool {
        *self >= NeighborState::TwoWay
    }

    /// Database exchange under way or complete; flooding applies.
    pub fn is_exchanging_or_above(&self) -> bool {
        *self >= NeighborState::Exchange
    }

    /// Exchange or Loading: the databases are not yet synchronized.
    pub fn is_synchronizing(&self) -> bool {
        matches!(self, NeighborState::Exchange | NeighborState::Loading)
    }
}

impl fmt::Display for NeighborState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NeighborState::Down => "down",
            NeighborState::Attempt => "attempt",
            NeighborState::Init => "init",
            NeighborState::TwoWay => "two_way",
            NeighborState::ExStart => "ex_start",
            NeighborState::Exchange => "exchange",
            NeighborState::Loading => "loading",
            NeighborState::Full => "full",
        };
        write!(f, "{}", s)
    }
}

/// Events driving the state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NeighborEvent {
    HelloReceived,
    Start,
    TwoWayReceived,
    NegotiationDone,
    ExchangeDone,
    BadLsReq,
    LoadingDone,
    AdjOk,
    SeqNumberMismatch,
    OneWayReceived,
    KillNbr,
    InactivityTimer,
    LlDown,
}

impl fmt::Display for NeighborEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NeighborEvent::HelloReceived => "hello_received",
            NeighborEvent::Start => "start",
            NeighborEvent::TwoWayReceived => "two_way_received",
            NeighborEvent::NegotiationDone => "negotiation_done",
            NeighborEvent::ExchangeDone => "exchange_done",
            NeighborEvent::BadLsReq => "bad_ls_req",
            NeighborEvent::LoadingDone => "loading_done",
            NeighborEvent::AdjOk => "adj_ok",
            NeighborEvent::SeqNumberMismatch => "seq_number_mismatch",
            NeighborEvent::OneWayReceived => "one_way_received",
            NeighborEvent::KillNbr => "kill_nbr",
            NeighborEvent::InactivityTimer => "inactivity_timer",
            NeighborEvent::LlDown => "ll_down",
        };
        write!(f, "{}", s)
    }
}

/// A recorded state change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub from: NeighborState,
    pub to: NeighborState,
    pub event: NeighborEvent,
}

// ============================================================================
// Context
// ============================================================================

/// Read-only view of the local side handed to every exchange operation.
#[derive(Clone, Copy)]
pub struct LinkContext<'a> {
    pub router_id: RouterId,
    pub interface_mtu: u16,
    pub options: u8,
    pub opaque_capable: bool,
    pub external_routing: bool,
    pub max_exchange_restarts: u32,
    pub lsdb: &'a LinkStateDatabase,
    pub now_ms: u64,
}

// ============================================================================
// Neighbor
// ============================================================================

/// Adjacency with one neighboring router.
#[derive(Debug)]
pub struct Neighbor {
    router_id: RouterId,
    address: Ipv4Addr,
    interface: InterfaceId,
    priority: u8,
    options: u8,
    designated_router: Ipv4Addr,
    backup_designated_router: Ipv4Addr,

    state: NeighborState,
    is_master: bool,
    dd_sequence_number: u32,
    /// Whether a DD sequence number has been chosen for this neighbor.
    dd_sequence_seeded: bool,
    last_received_dd: Option<DatabaseDescription>,
    last_sent_dd: Option<DatabaseDescription>,
    /// Database summary frozen at negotiation, described in DD chunks.
    dd_summary: Option<HeaderSnapshot>,
    dd_cursor: usize,

    ls_request_list: BTreeMap<LsaIdentity, LsaHeader>,
    /// Identities carried by the last Link-State Request sent.
    outstanding_requests: Vec<LsaIdentity>,
    retransmit_list: BTreeMap<LsaIdentity, LsaRecord>,
    timers: NeighborTimers,
    exchange_restarts: u32,

    outbox: Vec<PacketBody>,
    transitions: Vec<Transition>,
}

impl Neighbor {
    pub fn new(
        router_id: RouterId,
        address: Ipv4Addr,
        interface: InterfaceId,
        priority: u8,
        dead_interval_ms: u64,
        retransmit_interval_ms: u64,
    ) -> Self {
        Self {
            router_id,
            address,
            interface,
            priority,
            options: 0,
            designated_router: Ipv4Addr::UNSPECIFIED,
            backup_designated_router: Ipv4Addr::UNSPECIFIED,
            state: NeighborState::Down,
            is_master: false,
            dd_sequence_number: 0,
            dd_sequence_seeded: false,
            last_received_dd: None,
            last_sent_dd: None,
            dd_summary: None,
            dd_cursor: 0,
            ls_request_list: BTreeMap::new(),
            outstanding_requests: Vec::new(),
            retransmit_list: BTreeMap::new(),
            timers: NeighborTimers::new(dead_interval_ms, retransmit_interval_ms),
            exchange_restarts: 0,
            outbox: Vec::new(),
            transitions: Vec::new(),
        }
    }

    // === Accessors ===

    pub fn router_id(&self) -> RouterId {
        self.router_id
    }

    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    pub fn interface(&self) -> InterfaceId {
        self.interface
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn options(&self) -> u8 {
        self.options
    }

    pub fn designated_router(&self) -> Ipv4Addr {
        self.designated_router
    }

    pub fn backup_designated_router(&self) -> Ipv4Addr {
        self.backup_designated_router
    }

    pub fn state(&self) -> NeighborState {
        self.state
    }

    pub fn is_master(&self) -> bool {
        self.is_master
    }

    pub fn dd_sequence_number(&self) -> u32 {
        self.dd_sequence_number
    }

    pub fn exchange_restarts(&self) -> u32 {
        self.exchange_restarts
    }

    pub fn timers(&self) -> &NeighborTimers {
        &self.timers
    }

    pub fn ls_request_list(&self) -> &BTreeMap<LsaIdentity, LsaHeader> {
        &self.ls_request_list
    }

    pub fn retransmit_list(&self) -> &BTreeMap<LsaIdentity, LsaRecord> {
        &self.retransmit_list
    }

    pub fn is_opaque_capable(&self) -> bool {
        self.options & crate::lsa::OPTION_O != 0
    }

    /// Drain queued packets in the order they were produced.
    pub fn take_outbox(&mut self) -> Vec<PacketBody> {
        std::mem::take(&mut self.outbox)
    }

    /// Drain recorded state changes.
    pub fn take_transitions(&mut self) -> Vec<Transition> {
        std::mem::take(&mut self.transitions)
    }

    /// Refresh the Hello-derived attributes.
    pub fn update_from_hello(
        &mut self,
        address: Ipv4Addr,
        priority: u8,
        options: u8,
        designated_router: Ipv4Addr,
        backup_designated_router: Ipv4Addr,
    ) {
        self.address = address;
        self.priority = priority;
        if self.state < NeighborState::ExStart {
            self.options = options;
        }
        self.designated_router = designated_router;
        self.backup_designated_router = backup_designated_router;
    }

    // === Hello-driven events ===

    /// HelloReceived: (re)start the inactivity timer; Down/Attempt → Init.
    pub fn hello_received(&mut self, now_ms: u64) {
        self.timers.inactivity.start(now_ms);
        if matches!(self.state, NeighborState::Down | NeighborState::Attempt) {
            self.set_state(NeighborState::Init, NeighborEvent::HelloReceived);
        }
    }

    /// Start: an NBMA neighbor moves Down → Attempt.
    pub fn start(&mut self, now_ms: u64) {
        if self.state.is_down() {
            self.timers.inactivity.start(now_ms);
            self.set_state(NeighborState::Attempt, NeighborEvent::Start);
        }
    }

    /// TwoWayReceived: Init → TwoWay, or straight on to ExStart when an
    /// adjacency should form.
    pub fn two_way_received(&mut self, ctx: &LinkContext<'_>, form_adjacency: bool) {
        if self.state != NeighborState::Init {
            return;
        }
        if form_adjacency {
            self.set_state(NeighborState::TwoWay, NeighborEvent::TwoWayReceived);
            self.enter_exstart(ctx, NeighborEvent::TwoWayReceived);
        } else {
            self.set_state(NeighborState::TwoWay, NeighborEvent::TwoWayReceived);
        }
    }

    /// OneWayReceived: the neighbor no longer lists us.
    pub fn one_way_received(&mut self) {
        if self.state.is_two_way_or_above() {
            self.reset_exchange();
            self.set_state(NeighborState::Init, NeighborEvent::OneWayReceived);
        }
    }

    /// AdjOk?: re-evaluate whether an adjacency should exist.
    pub fn adj_ok(&mut self, ctx: &LinkContext<'_>, form_adjacency: bool) {
        match self.state {
            NeighborState::TwoWay if form_adjacency => {
                self.enter_exstart(ctx, NeighborEvent::AdjOk);
            }
            s if s >= NeighborState::ExStart && !form_adjacency => {
                self.reset_exchange();
                self.set_state(NeighborState::TwoWay, NeighborEvent::AdjOk);
            }
            _ => {}
        }
    }

    /// KillNbr / InactivityTimer / LlDown: tear everything down.
    pub fn kill(&mut self, event: NeighborEvent) {
        self.timers.stop_all();
        self.reset_exchange();
        self.exchange_restarts = 0;
        if !self.state.is_down() {
            match event {
                NeighborEvent::InactivityTimer => {
                    info!(neighbor = %self.router_id, state = %self.state, "Neighbor inactive");
                }
                _ => debug!(neighbor = %self.router_id, event = %event, "Neighbor killed"),
            }
            self.set_state(NeighborState::Down, event);
        }
    }

    // === Retransmit list ===

    /// Queue an LSA for reliable delivery to this neighbor.
    pub fn add_to_retransmit(&mut self, record: LsaRecord, now_ms: u64) {
        self.retransmit_list.insert(*record.identity(), record);
        self.timers.flood_retransmit.ensure_started(now_ms);
    }

    pub fn remove_from_retransmit(&mut self, identity: &LsaIdentity) -> Option<LsaRecord> {
        let removed = self.retransmit_list.remove(identity);
        if self.retransmit_list.is_empty() {
            self.timers.flood_retransmit.stop();
        }
        removed
    }

    pub fn retransmit_contains(&self, identity: &LsaIdentity) -> bool {
        self.retransmit_list.contains_key(identity)
    }

    /// Drop a request-list entry satisfied by flooding from elsewhere.
    pub fn prune_request(&mut self, identity: &LsaIdentity) -> bool {
        self.ls_request_list.remove(identity).is_some()
    }

    pub fn request_contains(&self, identity: &LsaIdentity) -> bool {
        self.ls_request_list.contains_key(identity)
    }

    // === Timers ===

    pub fn expired_timers(&self, now_ms: u64) -> Vec<TimerKind> {
        self.timers.expired(now_ms)
    }

    // === Internal ===

    fn set_state(&mut self, to: NeighborState, event: NeighborEvent) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        if to.is_full() || to.is_down() {
            info!(
                neighbor = %self.router_id,
                interface = %self.interface,
                from = %from,
                to = %to,
                event = %event,
                "Adjacency state change"
            );
        } else {
            debug!(
                neighbor = %self.router_id,
                from = %from,
                to = %to,
                event = %event,
                "Neighbor state change"
            );
        }
        self.transitions.push(Transition { from, to, event });
    }

    /// Clear every list and exchange-related timer, keeping inactivity.
    fn reset_exchange(&mut self) {
        self.timers.stop_exchange();
        self.ls_request_list.clear();
        self.outstanding_requests.clear();
        self.retransmit_list.clear();
        self.dd_summary = None;
        self.dd_cursor = 0;
        self.last_received_dd = None;
        self.last_sent_dd = None;
    }

    fn queue(&mut self, body: PacketBody) {
        self.outbox.push(body);
    }

    fn warn_budget_exhausted(&self, event: NeighborEvent, budget: u32) {
        warn!(
            neighbor = %self.router_id,
            event = %event,
            restarts = self.exchange_restarts,
            budget = budget,
            "Exchange restart budget exhausted, tearing down adjacency"
        );
    }
}
