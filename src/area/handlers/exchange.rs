//! Database Description and Link-State Request handling.

use crate::area::{Area, AreaError};
use crate::protocol::{DatabaseDescription, LinkStateRequest};
use crate::{InterfaceId, RouterId};

impl Area {
    pub(in crate::area) fn handle_dd(
        &mut self,
        interface: InterfaceId,
        from: RouterId,
        dd: DatabaseDescription,
        now_ms: u64,
    ) -> Result<(), AreaError> {
        self.with_neighbor(interface, from, now_ms, |neighbor, ctx| {
            neighbor.dd_received(ctx, dd)
        })
    }

    pub(in crate::area) fn handle_ls_request(
        &mut self,
        interface: InterfaceId,
        from: RouterId,
        request: LinkStateRequest,
        now_ms: u64,
    ) -> Result<(), AreaError> {
        self.with_neighbor(interface, from, now_ms, |neighbor, ctx| {
            neighbor.ls_request_received(ctx, request)
        })
    }
}
