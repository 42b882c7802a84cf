//! Cancellable per-neighbor timers.
//!
//! Timers are plain deadlines polled by the owning area's tick; nothing
//! runs on its own. Stopping a timer is just clearing its deadline, so a
//! state transition that stops timers cancels them in the same step.

use std::fmt;

/// Identifies one of a neighbor's timers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// RouterDeadInterval without a Hello.
    Inactivity,
    /// Master retransmits its last DD packet.
    DdRetransmit,
    /// Outstanding Link-State Requests are re-sent.
    LsrRetransmit,
    /// Unacknowledged flooded LSAs are re-sent.
    FloodRetransmit,
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimerKind::Inactivity => "inactivity",
            TimerKind::DdRetransmit => "dd_retransmit",
            TimerKind::LsrRetransmit => "lsr_retransmit",
            TimerKind::FloodRetransmit => "flood_retransmit",
        };
        write!(f, "{}", s)
    }
}

/// A single deadline timer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timer {
    interval_ms: u64,
    deadline_ms: Option<u64>,
}

impl Timer {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            deadline_ms: None,
        }
    }

    /// (Re)arm the timer one interval from `now_ms`.
    pub fn start(&mut self, now_ms: u64) {
        self.deadline_ms = Some(now_ms.saturating_add(self.interval_ms));
    }

    /// Arm only if not already running.
    pub fn ensure_started(&mut self, now_ms: u64) {
        if self.deadline_ms.is_none() {
            self.start(now_ms);
        }
    }

    pub fn stop(&mut self) {
        self.deadline_ms = None;
    }

    pub fn is_running(&self) -> bool {
        self.deadline_ms.is_some()
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.deadline_ms.is_some_and(|d| now_ms >= d)
    }

    pub fn deadline_ms(&self) -> Option<u64> {
        self.deadline_ms
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }
}

/// The four timers every neighbor owns.
#[derive(Clone, Debug)]
pub struct NeighborTimers {
    pub inactivity: Timer,
    pub dd_retransmit: Timer,
    pub lsr_retransmit: Timer,
    pub flood_retransmit: Timer,
}

impl NeighborTimers {
    pub fn new(dead_interval_ms: u64, retransmit_interval_ms: u64) -> Self {
        Self {
            inactivity: Timer::new(dead_interval_ms),
            dd_retransmit: Timer::new(retransmit_interval_ms),
            lsr_retransmit: Timer::new(retransmit_interval_ms),
            flood_retransmit: Timer::new(retransmit_interval_ms),
        }
    }

    pub fn get(&self, kind: TimerKind) -> &Timer {
        match kind {
            TimerKind::Inactivity => &self.inactivity,
            TimerKind::DdRetransmit => &self.dd_retransmit,
            TimerKind::LsrRetransmit => &self.lsr_retransmit,
            TimerKind::FloodRetransmit => &self.flood_retransmit,
        }
    }

    pub fn get_mut(&mut self, kind: TimerKind) -> &mut Timer {
        match kind {
            TimerKind::Inactivity => &mut self.inactivity,
            TimerKind::DdRetransmit => &mut self.dd_retransmit,
            TimerKind::LsrRetransmit => &mut self.lsr_retransmit,
            TimerKind::FloodRetransmit => &mut self.flood_retransmit,
        }
    }

    /// Stop the exchange-related timers, leaving inactivity running.
    pub fn stop_exchange(&mut self) {
        self.dd_retransmit.stop();
        self.lsr_retransmit.stop();
        self.flood_retransmit.stop();
    }

    pub fn stop_all(&mut self) {
        self.inactivity.stop();
        self.stop_exchange();
    }

    /// Timers whose deadline has passed, inactivity first.
    pub fn expired(&self, now_ms: u64) -> Vec<TimerKind> {
        [
            TimerKind::Inactivity,
            TimerKind::DdRetransmit,
            TimerKind::LsrRetransmit,
            TimerKind::FloodRetransmit,
        ]
        .into_iter()
        .filter(|kind| self.get(*kind).is_expired(now_ms))
        .collect()
    }
}
