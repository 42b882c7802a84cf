//! Hello handling.

use crate::area::{Area, AreaError};
use crate::lsa::OPTION_E;
use crate::protocol::Hello;
use crate::{InterfaceId, RouterId};
use std::net::Ipv4Addr;
use tracing::debug;

impl Area {
    /// Validate a Hello, create or refresh the neighbor and drive the
    /// two-way/one-way events.
    pub(in crate::area) fn handle_hello(
        &mut self,
        interface: InterfaceId,
        source: Ipv4Addr,
        from: RouterId,
        hello: Hello,
        now_ms: u64,
    ) -> Result<(), AreaError> {
        let params = self.params;
        let iface = self
            .interfaces
            .get_mut(&interface)
            .ok_or(AreaError::UnknownInterface(interface))?;

        if let Err(mismatch) = iface.validate_hello(&hello) {
            debug!(
                interface = %iface.name(),
                neighbor = %from,
                reason = %mismatch,
                "Hello rejected"
            );
            return Ok(());
        }
        if (hello.options & OPTION_E != 0) != params.external_routing {
            debug!(
                interface = %iface.name(),
                neighbor = %from,
                options = hello.options,
                "Hello E-bit does not match area, rejected"
            );
            return Ok(());
        }

        iface.hello_from(from, source, &hello, now_ms);
        let form_adjacency = iface.should_form_adjacency(&from);
        let ctx = params.link_context(&self.lsdb, iface.mtu(), now_ms);
        let Some(neighbor) = iface.neighbor_mut(&from) else {
            return Ok(());
        };

        if hello.lists(params.router_id) {
            if neighbor.state().is_two_way_or_above() {
                neighbor.adj_ok(&ctx, form_adjacency);
            } else {
                neighbor.two_way_received(&ctx, form_adjacency);
            }
        } else {
            neighbor.one_way_received();
        }
        Ok(())
    }
}
