//! Async runtime
//!
//! Each area runs in its own tokio task. The task owns the `Area` outright
//! and is the only code that ever touches it: inbound packets, queries,
//! local origination and shutdown arrive over an mpsc command queue and
//! are handled one at a time, interleaved with the aging tick. Outbound
//! packets leave through an mpsc sender supplied by the caller.

use crate::area::{Area, AreaError, AreaSummary};
use crate::config::{Config, ConfigError};
use crate::lsa::{LsaBody, LsaIdentity, LsaRecord};
use crate::protocol::{OutboundPacket, Packet};
use crate::topology::{LoggingListener, TopologyEvent, TopologyLink, TopologyListener};
use crate::{AreaId, InterfaceId, RouterId};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Capacity of each area's command queue.
const COMMAND_CHANNEL_SIZE: usize = 256;

/// Capacity of the shared outbound packet queue.
const OUTBOUND_CHANNEL_SIZE: usize = 1024;

/// Errors from the runtime layer.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("area {0} task is no longer running")]
    AreaClosed(AreaId),

    #[error("unknown area: {0}")]
    UnknownArea(AreaId),

    #[error(transparent)]
    Area(#[from] AreaError),
}

// ============================================================================
// Area task
// ============================================================================

/// Work handed to an area task.
#[derive(Debug)]
pub enum AreaCommand {
    /// A packet received on one of the area's interfaces.
    Packet {
        interface: InterfaceId,
        source: Ipv4Addr,
        packet: Packet,
        reply: Option<oneshot::Sender<Result<(), AreaError>>>,
    },
    /// Originate (or replace) one of this router's LSAs.
    Originate {
        identity: LsaIdentity,
        body: LsaBody,
        reply: oneshot::Sender<Option<LsaRecord>>,
    },
    /// Flush one of this router's LSAs.
    Flush {
        identity: LsaIdentity,
        reply: oneshot::Sender<bool>,
    },
    Query(oneshot::Sender<AreaSummary>),
    Shutdown,
}

/// Cloneable handle to a running area task.
#[derive(Clone, Debug)]
pub struct AreaHandle {
    area_id: AreaId,
    commands: mpsc::Sender<AreaCommand>,
}

impl AreaHandle {
    /// Start `area` on a new task.
    ///
    /// `tick` is the aging period. Missed ticks are delivered in a burst
    /// so a stalled task catches up on aging instead of skipping it.
    pub fn spawn(
        area: Area,
        tick: Duration,
        outbound: mpsc::Sender<OutboundPacket>,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_SIZE);
        let handle = Self {
            area_id: area.area_id(),
            commands: tx,
        };
        let task = tokio::spawn(run_area(area, tick, rx, outbound));
        (handle, task)
    }

    pub fn area_id(&self) -> AreaId {
        self.area_id
    }

    /// Queue a received packet without waiting for it to be processed.
    pub async fn deliver(
        &self,
        interface: InterfaceId,
        source: Ipv4Addr,
        packet: Packet,
    ) -> Result<(), RuntimeError> {
        self.send(AreaCommand::Packet {
            interface,
            source,
            packet,
            reply: None,
        })
        .await
    }

    /// Deliver a packet and wait for the area's verdict on it.
    pub async fn process(
        &self,
        interface: InterfaceId,
        source: Ipv4Addr,
        packet: Packet,
    ) -> Result<(), RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.send(AreaCommand::Packet {
            interface,
            source,
            packet,
            reply: Some(reply),
        })
        .await?;
        let result = rx.await.map_err(|_| RuntimeError::AreaClosed(self.area_id))?;
        Ok(result?)
    }

    pub async fn originate(
        &self,
        identity: LsaIdentity,
        body: LsaBody,
    ) -> Result<Option<LsaRecord>, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.send(AreaCommand::Originate {
            identity,
            body,
            reply,
        })
        .await?;
        rx.await.map_err(|_| RuntimeError::AreaClosed(self.area_id))
    }

    pub async fn flush(&self, identity: LsaIdentity) -> Result<bool, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.send(AreaCommand::Flush { identity, reply }).await?;
        rx.await.map_err(|_| RuntimeError::AreaClosed(self.area_id))
    }

    pub async fn summary(&self) -> Result<AreaSummary, RuntimeError> {
        let (reply, rx) = oneshot::channel();
        self.send(AreaCommand::Query(reply)).await?;
        rx.await.map_err(|_| RuntimeError::AreaClosed(self.area_id))
    }

    /// Ask the task to stop. Returns once the request is queued.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.send(AreaCommand::Shutdown).await
    }

    async fn send(&self, command: AreaCommand) -> Result<(), RuntimeError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| RuntimeError::AreaClosed(self.area_id))
    }
}

/// Area task body: commands and ticks, one at a time, until shutdown.
async fn run_area(
    mut area: Area,
    period: Duration,
    mut commands: mpsc::Receiver<AreaCommand>,
    outbound: mpsc::Sender<OutboundPacket>,
) {
    let area_id = area.area_id();
    let epoch = Instant::now();
    let now_ms = || epoch.elapsed().as_millis() as u64;

    area.start(now_ms());
    let mut tick = tokio::time::interval_at(epoch + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Burst);

    info!(area = %area_id, tick_ms = period.as_millis() as u64, "Area task started");

    loop {
        if !forward(&mut area, &outbound).await {
            warn!(area = %area_id, "Outbound channel closed, stopping area");
            break;
        }
        tokio::select! {
            // Overdue ticks drain before any queued command
            biased;

            _ = tick.tick() => {
                area.tick(now_ms());
            }
            command = commands.recv() => {
                match command {
                    Some(AreaCommand::Packet { interface, source, packet, reply }) => {
                        let result = area.handle_packet(interface, source, packet, now_ms());
                        if let Err(e) = &result {
                            debug!(area = %area_id, error = %e, "Packet rejected");
                        }
                        if let Some(reply) = reply {
                            let _ = reply.send(result);
                        }
                    }
                    Some(AreaCommand::Originate { identity, body, reply }) => {
                        let _ = reply.send(area.originate_lsa(identity, body, now_ms()));
                    }
                    Some(AreaCommand::Flush { identity, reply }) => {
                        let _ = reply.send(area.flush_lsa(&identity, now_ms()));
                    }
                    Some(AreaCommand::Query(reply)) => {
                        let _ = reply.send(area.summary());
                    }
                    Some(AreaCommand::Shutdown) | None => break,
                }
            }
        }
    }

    area.shutdown();
    let _ = forward(&mut area, &outbound).await;
    info!(area = %area_id, lsas = area.lsdb().len(), "Area task stopped");
}

/// Push everything the area queued to the outbound channel.
///
/// Returns false once the receiver is gone.
async fn forward(area: &mut Area, outbound: &mpsc::Sender<OutboundPacket>) -> bool {
    for packet in area.take_outbound() {
        if outbound.send(packet).await.is_err() {
            return false;
        }
    }
    true
}

// ============================================================================
// Topology event channel
// ============================================================================

/// Listener forwarding every topology change onto an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: mpsc::UnboundedSender<(AreaId, TopologyEvent)>,
}

impl ChannelListener {
    pub fn new(tx: mpsc::UnboundedSender<(AreaId, TopologyEvent)>) -> Self {
        Self { tx }
    }

    fn emit(&self, area: AreaId, event: TopologyEvent) {
        // Receiver dropped: nobody is interested any more
        let _ = self.tx.send((area, event));
    }
}

impl TopologyListener for ChannelListener {
    fn router_added(&self, area: AreaId, router: RouterId) {
        self.emit(area, TopologyEvent::RouterAdded(router));
    }

    fn router_removed(&self, area: AreaId, router: RouterId) {
        self.emit(area, TopologyEvent::RouterRemoved(router));
    }

    fn router_changed(&self, area: AreaId, router: RouterId) {
        self.emit(area, TopologyEvent::RouterChanged(router));
    }

    fn link_added(&self, area: AreaId, link: TopologyLink) {
        self.emit(area, TopologyEvent::LinkAdded(link));
    }

    fn link_removed(&self, area: AreaId, link: TopologyLink) {
        self.emit(area, TopologyEvent::LinkRemoved(link));
    }
}

// ============================================================================
// Instance
// ============================================================================

/// A running router: one task per configured area.
pub struct Instance {
    router_id: RouterId,
    areas: BTreeMap<AreaId, AreaHandle>,
    tasks: Vec<(AreaId, JoinHandle<()>)>,
    outbound_rx: Option<mpsc::Receiver<OutboundPacket>>,
    events_rx: Option<mpsc::UnboundedReceiver<(AreaId, TopologyEvent)>>,
}

impl Instance {
    /// Validate `config` and spawn every area. Must be called from
    /// within a tokio runtime.
    pub fn start(config: &Config) -> Result<Self, RuntimeError> {
        config.validate()?;
        let router_id = config.router_id()?;
        let tick = Duration::from_millis(config.router.timers.tick_interval_ms);

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CHANNEL_SIZE);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let logging = Arc::new(LoggingListener);

        let mut areas = BTreeMap::new();
        let mut tasks = Vec::new();
        for area_config in &config.areas {
            let mut area = Area::new(router_id, &config.router, area_config);
            area.add_listener(logging.clone());
            area.add_listener(Arc::new(ChannelListener::new(events_tx.clone())));
            let (handle, task) = AreaHandle::spawn(area, tick, outbound_tx.clone());
            tasks.push((area_config.area_id, task));
            areas.insert(area_config.area_id, handle);
        }

        info!(router_id = %router_id, areas = areas.len(), "Instance started");
        Ok(Self {
            router_id,
            areas,
            tasks,
            outbound_rx: Some(outbound_rx),
            events_rx: Some(events_rx),
        })
    }

    pub fn router_id(&self) -> RouterId {
        self.router_id
    }

    pub fn area_ids(&self) -> impl Iterator<Item = AreaId> + '_ {
        self.areas.keys().copied()
    }

    pub fn area(&self, area_id: AreaId) -> Result<&AreaHandle, RuntimeError> {
        self.areas
            .get(&area_id)
            .ok_or(RuntimeError::UnknownArea(area_id))
    }

    /// Take the receiver carrying every packet the areas want sent.
    ///
    /// Areas stall once it fills, so whoever takes it must keep draining.
    pub fn take_outbound(&mut self) -> Option<mpsc::Receiver<OutboundPacket>> {
        self.outbound_rx.take()
    }

    /// Take the receiver of topology events. The channel is unbounded;
    /// the taker must keep draining it.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<(AreaId, TopologyEvent)>> {
        self.events_rx.take()
    }

    /// Route a received packet to the area named in its header.
    pub async fn deliver(
        &self,
        interface: InterfaceId,
        source: Ipv4Addr,
        packet: Packet,
    ) -> Result<(), RuntimeError> {
        self.area(packet.area_id)?
            .deliver(interface, source, packet)
            .await
    }

    pub async fn summary(&self, area_id: AreaId) -> Result<AreaSummary, RuntimeError> {
        self.area(area_id)?.summary().await
    }

    /// Stop every area in turn, waiting for each task to finish before
    /// moving to the next.
    pub async fn shutdown(mut self) {
        // Drop the outbound receiver last so final packets can still drain
        let outbound_rx = self.outbound_rx.take();
        for (area_id, task) in self.tasks.drain(..) {
            if let Some(handle) = self.areas.get(&area_id) {
                let _ = handle.shutdown().await;
            }
            if let Err(e) = task.await {
                warn!(area = %area_id, error = %e, "Area task ended abnormally");
            }
        }
        drop(outbound_rx);
        info!(router_id = %self.router_id, "Instance stopped");
    }
}
