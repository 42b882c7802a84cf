//! Link-State Acknowledgement handling.

use crate::area::{Area, AreaError};
use crate::protocol::LinkStateAck;
use crate::{InterfaceId, RouterId};

impl Area {
    pub(in crate::area) fn handle_ls_ack(
        &mut self,
        interface: InterfaceId,
        from: RouterId,
        ack: LinkStateAck,
        now_ms: u64,
    ) -> Result<(), AreaError> {
        self.with_neighbor(interface, from, now_ms, |neighbor, ctx| {
            for header in &ack.headers {
                neighbor.ack_received(ctx, header);
            }
        })
    }
}
