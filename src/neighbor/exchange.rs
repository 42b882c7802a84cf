//! Database exchange: master/slave negotiation, DD processing, requests,
//! acknowledgements and retransmission.

use super::{LinkContext, Neighbor, NeighborEvent, NeighborState, TimerKind};
use crate::lsa::{compare, Lsa, LsaHeader, LsaIdentity, LsaType, INF_TRANS_DELAY};
use crate::protocol::{
    max_dd_headers, DatabaseDescription, DdFlags, LinkStateRequest, LinkStateUpdate, PacketBody,
};
use tracing::{debug, warn};

/// IP header + OSPF header; each request entry is 12 bytes.
const LSR_PACKET_OVERHEAD: u16 = 44;
const LSR_ENTRY_LEN: u16 = 12;

impl Neighbor {
    // === ExStart ===

    /// Enter ExStart: pick a DD sequence number, claim master and start
    /// sending empty I/M/MS packets until the neighbor answers.
    pub(crate) fn enter_exstart(&mut self, ctx: &LinkContext<'_>, event: NeighborEvent) {
        self.reset_exchange();
        if self.dd_sequence_seeded {
            self.dd_sequence_number = self.dd_sequence_number.wrapping_add(1);
        } else {
            self.dd_sequence_number = rand::random();
            self.dd_sequence_seeded = true;
        }
        self.is_master = true;
        self.set_state(NeighborState::ExStart, event);
        self.send_dd(ctx, DdFlags::NEGOTIATE, Vec::new());
        self.timers.dd_retransmit.start(ctx.now_ms);
    }

    // === Database Description ===

    /// Handle a received Database Description packet.
    pub fn dd_received(&mut self, ctx: &LinkContext<'_>, dd: DatabaseDescription) {
        if dd.interface_mtu > ctx.interface_mtu {
            debug!(
                neighbor = %self.router_id,
                their_mtu = dd.interface_mtu,
                our_mtu = ctx.interface_mtu,
                "DD MTU larger than interface MTU, dropping"
            );
            return;
        }

        match self.state {
            NeighborState::Down
            | NeighborState::Attempt
            | NeighborState::Init
            | NeighborState::TwoWay => {
                debug!(neighbor = %self.router_id, state = %self.state, "DD ignored in state");
            }
            NeighborState::ExStart => self.negotiate(ctx, dd),
            NeighborState::Exchange => self.exchange_dd(ctx, dd),
            NeighborState::Loading | NeighborState::Full => {
                if self.is_duplicate_dd(&dd) {
                    self.answer_duplicate_dd();
                } else {
                    self.seq_number_mismatch(ctx, "unexpected DD after exchange");
                }
            }
        }
    }

    fn negotiate(&mut self, ctx: &LinkContext<'_>, dd: DatabaseDescription) {
        let claims_master = dd.flags == DdFlags::NEGOTIATE && dd.headers.is_empty();

        if claims_master && self.router_id > ctx.router_id {
            // Neighbor has the higher ID: we are slave and adopt its sequence
            self.is_master = false;
            self.options = dd.options;
            self.negotiation_done(ctx);
            self.accept_as_slave(ctx, dd);
        } else if !dd.flags.init
            && !dd.flags.master
            && dd.sequence_number == self.dd_sequence_number
            && self.router_id < ctx.router_id
        {
            self.is_master = true;
            self.options = dd.options;
            self.negotiation_done(ctx);
            self.accept_as_master(ctx, dd);
        } else {
            debug!(
                neighbor = %self.router_id,
                flags = %dd.flags,
                seq = dd.sequence_number,
                "DD does not settle negotiation, ignoring"
            );
        }
    }

    fn negotiation_done(&mut self, ctx: &LinkContext<'_>) {
        self.set_state(NeighborState::Exchange, NeighborEvent::NegotiationDone);
        let include_opaque = ctx.opaque_capable && self.is_opaque_capable();
        self.dd_summary = Some(ctx.lsdb.all_headers(true, include_opaque));
        self.dd_cursor = 0;
        if !self.is_master {
            self.timers.dd_retransmit.stop();
        }
        debug!(
            neighbor = %self.router_id,
            master = self.is_master,
            seq = self.dd_sequence_number,
            "DD negotiation done"
        );
    }

    fn exchange_dd(&mut self, ctx: &LinkContext<'_>, dd: DatabaseDescription) {
        if self.is_duplicate_dd(&dd) {
            self.answer_duplicate_dd();
            return;
        }
        if dd.flags.master == self.is_master {
            self.seq_number_mismatch(ctx, "master/slave bit mismatch");
            return;
        }
        if dd.flags.init {
            self.seq_number_mismatch(ctx, "init bit set during exchange");
            return;
        }
        if dd.options != self.options {
            self.seq_number_mismatch(ctx, "options changed during exchange");
            return;
        }

        if self.is_master {
            if dd.sequence_number != self.dd_sequence_number {
                self.seq_number_mismatch(ctx, "DD sequence number mismatch");
                return;
            }
            self.accept_as_master(ctx, dd);
        } else {
            if dd.sequence_number != self.dd_sequence_number.wrapping_add(1) {
                self.seq_number_mismatch(ctx, "DD sequence number mismatch");
                return;
            }
            self.accept_as_slave(ctx, dd);
        }
    }

    /// Master side: the slave answered our last packet.
    fn accept_as_master(&mut self, ctx: &LinkContext<'_>, dd: DatabaseDescription) {
        if !self.collect_requests(ctx, &dd.headers) {
            return;
        }
        let slave_more = dd.flags.more;
        self.last_received_dd = Some(dd);

        let sent_all = self.last_sent_dd.as_ref().is_some_and(|d| !d.flags.more);
        if sent_all && !slave_more {
            self.timers.dd_retransmit.stop();
            self.exchange_done(ctx);
            return;
        }

        self.dd_sequence_number = self.dd_sequence_number.wrapping_add(1);
        let (headers, more) = self.next_summary_chunk(ctx);
        self.send_dd(ctx, DdFlags::new(false, more, true), headers);
        self.timers.dd_retransmit.start(ctx.now_ms);
    }

    /// Slave side: echo the master's sequence number with our next chunk.
    fn accept_as_slave(&mut self, ctx: &LinkContext<'_>, dd: DatabaseDescription) {
        if !self.collect_requests(ctx, &dd.headers) {
            return;
        }
        self.dd_sequence_number = dd.sequence_number;
        let master_more = dd.flags.more;
        self.last_received_dd = Some(dd);

        let (headers, more) = self.next_summary_chunk(ctx);
        self.send_dd(ctx, DdFlags::new(false, more, false), headers);
        if !master_more && !more {
            self.exchange_done(ctx);
        }
    }

    /// Add every described LSA we lack (or hold an older copy of) to the
    /// request list. False if the headers forced an exchange restart.
    fn collect_requests(&mut self, ctx: &LinkContext<'_>, headers: &[LsaHeader]) -> bool {
        for header in headers {
            let lsa_type = header.identity.lsa_type;
            if lsa_type == LsaType::AsExternal && !ctx.external_routing {
                self.seq_number_mismatch(ctx, "AS-external LSA described in stub area");
                return false;
            }
            if lsa_type.is_opaque() && !ctx.opaque_capable {
                continue;
            }
            let wanted = ctx
                .lsdb
                .compare_with_database(header)
                .is_none_or(|f| f.is_newer());
            if wanted {
                self.ls_request_list.insert(header.identity, *header);
            }
        }
        true
    }

    fn exchange_done(&mut self, ctx: &LinkContext<'_>) {
        self.dd_summary = None;
        if self.ls_request_list.is_empty() {
            self.enter_full(NeighborEvent::ExchangeDone);
        } else {
            self.set_state(NeighborState::Loading, NeighborEvent::ExchangeDone);
            self.send_ls_request(ctx);
        }
    }

    fn enter_full(&mut self, event: NeighborEvent) {
        self.timers.dd_retransmit.stop();
        self.timers.lsr_retransmit.stop();
        self.exchange_restarts = 0;
        self.set_state(NeighborState::Full, event);
    }

    fn is_duplicate_dd(&self, dd: &DatabaseDescription) -> bool {
        self.last_received_dd
            .as_ref()
            .is_some_and(|last| dd.is_duplicate_of(last))
    }

    /// The slave repeats its last packet; the master ignores duplicates.
    fn answer_duplicate_dd(&mut self) {
        if self.is_master {
            debug!(neighbor = %self.router_id, "Duplicate DD discarded");
            return;
        }
        if let Some(last) = self.last_sent_dd.clone() {
            debug!(neighbor = %self.router_id, seq = last.sequence_number, "Duplicate DD, resending");
            self.queue(PacketBody::DatabaseDescription(last));
        }
    }

    fn next_summary_chunk(&mut self, ctx: &LinkContext<'_>) -> (Vec<LsaHeader>, bool) {
        let Some(summary) = &self.dd_summary else {
            return (Vec::new(), false);
        };
        let limit = max_dd_headers(ctx.interface_mtu);
        let headers: Vec<LsaHeader> = summary
            .iter()
            .skip(self.dd_cursor)
            .take(limit)
            .copied()
            .collect();
        self.dd_cursor += headers.len();
        let more = self.dd_cursor < summary.len();
        (headers, more)
    }

    fn send_dd(&mut self, ctx: &LinkContext<'_>, flags: DdFlags, headers: Vec<LsaHeader>) {
        let dd = DatabaseDescription {
            interface_mtu: ctx.interface_mtu,
            options: ctx.options,
            flags,
            sequence_number: self.dd_sequence_number,
            headers,
        };
        self.last_sent_dd = Some(dd.clone());
        self.queue(PacketBody::DatabaseDescription(dd));
    }

    // === Exchange restarts ===

    /// SeqNumberMismatch: restart the exchange from ExStart.
    ///
    /// This is the DD-side abort. A bad Link-State Request raises
    /// `BadLsReq` instead; both land in ExStart with the DD retransmit
    /// timer restarted.
    pub fn seq_number_mismatch(&mut self, ctx: &LinkContext<'_>, reason: &str) {
        debug!(neighbor = %self.router_id, reason = reason, "Sequence number mismatch");
        self.restart_exchange(ctx, NeighborEvent::SeqNumberMismatch);
    }

    /// BadLSReq: the neighbor asked for something we do not have, or sent
    /// something it should not have.
    pub fn bad_ls_req(&mut self, ctx: &LinkContext<'_>) {
        debug!(neighbor = %self.router_id, "Bad link-state request");
        self.restart_exchange(ctx, NeighborEvent::BadLsReq);
    }

    fn restart_exchange(&mut self, ctx: &LinkContext<'_>, event: NeighborEvent) {
        if !self.state.is_exchanging_or_above() {
            return;
        }
        self.exchange_restarts += 1;
        if self.exchange_restarts > ctx.max_exchange_restarts {
            self.warn_budget_exhausted(event, ctx.max_exchange_restarts);
            self.kill(NeighborEvent::KillNbr);
            return;
        }
        warn!(
            neighbor = %self.router_id,
            event = %event,
            state = %self.state,
            restarts = self.exchange_restarts,
            "Restarting database exchange"
        );
        self.enter_exstart(ctx, event);
    }

    // === Link-State Request ===

    /// Answer a Link-State Request from the neighbor's side.
    pub fn ls_request_received(&mut self, ctx: &LinkContext<'_>, request: LinkStateRequest) {
        if !self.state.is_exchanging_or_above() {
            debug!(neighbor = %self.router_id, state = %self.state, "LSR ignored in state");
            return;
        }
        let mut lsas = Vec::with_capacity(request.identities.len());
        for identity in &request.identities {
            match ctx.lsdb.lookup_lsa(identity) {
                Some(lsa) => lsas.push(aged_for_transmit(lsa, ctx)),
                None => {
                    debug!(neighbor = %self.router_id, lsa = %identity, "Requested LSA not in database");
                    self.bad_ls_req(ctx);
                    return;
                }
            }
        }
        if !lsas.is_empty() {
            self.queue(PacketBody::LinkStateUpdate(LinkStateUpdate { lsas }));
        }
    }

    /// Send a request for the head of the request list.
    fn send_ls_request(&mut self, ctx: &LinkContext<'_>) {
        let limit = usize::from(ctx.interface_mtu.saturating_sub(LSR_PACKET_OVERHEAD) / LSR_ENTRY_LEN)
            .max(1);
        let identities: Vec<LsaIdentity> =
            self.ls_request_list.keys().take(limit).copied().collect();
        if identities.is_empty() {
            return;
        }
        self.outstanding_requests = identities.clone();
        self.queue(PacketBody::LinkStateRequest(LinkStateRequest { identities }));
        self.timers.lsr_retransmit.start(ctx.now_ms);
    }

    /// A requested instance (or a newer one) arrived from this neighbor.
    pub fn request_satisfied(&mut self, ctx: &LinkContext<'_>, identity: &LsaIdentity) {
        if self.ls_request_list.remove(identity).is_none() {
            return;
        }
        self.check_loading_done(ctx);
    }

    /// Move Loading → Full once nothing is outstanding, or ask for the next batch.
    pub fn check_loading_done(&mut self, ctx: &LinkContext<'_>) {
        if self.state != NeighborState::Loading {
            return;
        }
        if self.ls_request_list.is_empty() {
            self.enter_full(NeighborEvent::LoadingDone);
        } else if !self.awaiting_requested() {
            self.send_ls_request(ctx);
        }
    }

    /// True while any entry of the last request batch is still missing.
    fn awaiting_requested(&self) -> bool {
        self.outstanding_requests
            .iter()
            .any(|id| self.ls_request_list.contains_key(id))
    }

    // === Acknowledgements ===

    /// Handle one acknowledged header.
    pub fn ack_received(&mut self, ctx: &LinkContext<'_>, header: &LsaHeader) {
        if !self.state.is_exchanging_or_above() {
            return;
        }
        let Some(record) = self.retransmit_list.get(&header.identity) else {
            return;
        };
        if compare(header, &record.lsa().header, ctx.lsdb.limits()).is_same() {
            self.remove_from_retransmit(&header.identity);
        } else {
            debug!(neighbor = %self.router_id, lsa = %header.identity, "Ack for a different instance");
        }
    }

    // === Retransmission ===

    /// Run every expired timer. Returns the timers that fired.
    pub fn poll_timers(&mut self, ctx: &LinkContext<'_>) -> Vec<TimerKind> {
        let fired = self.expired_timers(ctx.now_ms);
        for kind in &fired {
            match kind {
                TimerKind::Inactivity => self.kill(NeighborEvent::InactivityTimer),
                TimerKind::DdRetransmit => self.retransmit_dd(ctx),
                TimerKind::LsrRetransmit => self.retransmit_lsr(ctx),
                TimerKind::FloodRetransmit => self.retransmit_flood(ctx),
            }
        }
        fired
    }

    fn retransmit_dd(&mut self, ctx: &LinkContext<'_>) {
        let active = self.is_master
            && matches!(self.state, NeighborState::ExStart | NeighborState::Exchange);
        match self.last_sent_dd.clone() {
            Some(last) if active => {
                debug!(neighbor = %self.router_id, seq = last.sequence_number, "Retransmitting DD");
                self.queue(PacketBody::DatabaseDescription(last));
                self.timers.dd_retransmit.start(ctx.now_ms);
            }
            _ => self.timers.dd_retransmit.stop(),
        }
    }

    fn retransmit_lsr(&mut self, ctx: &LinkContext<'_>) {
        if self.state.is_synchronizing() && !self.ls_request_list.is_empty() {
            debug!(
                neighbor = %self.router_id,
                outstanding = self.ls_request_list.len(),
                "Retransmitting LSR"
            );
            self.send_ls_request(ctx);
        } else {
            self.timers.lsr_retransmit.stop();
        }
    }

    fn retransmit_flood(&mut self, ctx: &LinkContext<'_>) {
        if self.retransmit_list.is_empty() || !self.state.is_exchanging_or_above() {
            self.timers.flood_retransmit.stop();
            return;
        }
        let lsas: Vec<Lsa> = self
            .retransmit_list
            .values()
            .map(|record| {
                let lsa = match ctx.lsdb.lookup_header(record.identity()) {
                    Some(current)
                        if current.sequence_number == record.sequence_number()
                            && current.checksum == record.checksum()
                            && current.age >= record.lsa().header.age =>
                    {
                        record.lsa_with_age(current.age)
                    }
                    _ => record.lsa().clone(),
                };
                aged_for_transmit(lsa, ctx)
            })
            .collect();
        debug!(neighbor = %self.router_id, count = lsas.len(), "Retransmitting flooded LSAs");
        self.queue(PacketBody::LinkStateUpdate(LinkStateUpdate { lsas }));
        self.timers.flood_retransmit.start(ctx.now_ms);
    }
}

/// Add InfTransDelay to an outgoing copy, capped at MaxAge.
pub(crate) fn aged_for_transmit(mut lsa: Lsa, ctx: &LinkContext<'_>) -> Lsa {
    let max_age = ctx.lsdb.limits().max_age;
    lsa.header.age = lsa.header.age.saturating_add(INF_TRANS_DELAY).min(max_age);
    lsa
}
