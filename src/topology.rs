//! Topology notifications.
//!
//! The tracker remembers the last Router-LSA content seen for every
//! router in an area and turns each accepted, flushed or removed Router
//! LSA into router- and link-level events for registered listeners.

use crate::lsa::{Lsa, LsaType, RouterLink, RouterLinkKind, RouterLsa};
use crate::{AreaId, RouterId};
use std::collections::BTreeMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;
use tracing::info;

/// A directed link advertised in a Router LSA.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopologyLink {
    pub from: RouterId,
    pub link_id: Ipv4Addr,
    pub link_data: Ipv4Addr,
    pub kind: u8,
    pub metric: u16,
}

impl TopologyLink {
    fn from_router_link(from: RouterId, link: &RouterLink) -> Self {
        Self {
            from,
            link_id: link.link_id,
            link_data: link.link_data,
            kind: link.kind as u8,
            metric: link.metric,
        }
    }

    /// Whether the link points at another router rather than a network.
    pub fn is_router_link(&self) -> bool {
        self.kind == RouterLinkKind::PointToPoint as u8 || self.kind == RouterLinkKind::Virtual as u8
    }
}

impl fmt::Display for TopologyLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{} ({}) metric {}", self.from, self.link_id, self.link_data, self.metric)
    }
}

/// A change in the area's router or link set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TopologyEvent {
    RouterAdded(RouterId),
    RouterRemoved(RouterId),
    RouterChanged(RouterId),
    LinkAdded(TopologyLink),
    LinkRemoved(TopologyLink),
}

impl TopologyEvent {
    /// Hand this event to the matching listener callback.
    pub fn notify(&self, area: AreaId, listener: &dyn TopologyListener) {
        match self {
            TopologyEvent::RouterAdded(r) => listener.router_added(area, *r),
            TopologyEvent::RouterRemoved(r) => listener.router_removed(area, *r),
            TopologyEvent::RouterChanged(r) => listener.router_changed(area, *r),
            TopologyEvent::LinkAdded(l) => listener.link_added(area, *l),
            TopologyEvent::LinkRemoved(l) => listener.link_removed(area, *l),
        }
    }
}

impl fmt::Display for TopologyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopologyEvent::RouterAdded(r) => write!(f, "router added {}", r),
            TopologyEvent::RouterRemoved(r) => write!(f, "router removed {}", r),
            TopologyEvent::RouterChanged(r) => write!(f, "router changed {}", r),
            TopologyEvent::LinkAdded(l) => write!(f, "link added {}", l),
            TopologyEvent::LinkRemoved(l) => write!(f, "link removed {}", l),
        }
    }
}

/// Receiver of topology changes.
///
/// Called from the area task; implementations must not block.
pub trait TopologyListener: Send + Sync + 'static {
    fn router_added(&self, area: AreaId, router: RouterId);

    fn router_removed(&self, area: AreaId, router: RouterId);

    /// The router's LSA changed without adding or removing links.
    fn router_changed(&self, _area: AreaId, _router: RouterId) {}

    fn link_added(&self, area: AreaId, link: TopologyLink);

    fn link_removed(&self, area: AreaId, link: TopologyLink);
}

impl<T: TopologyListener> TopologyListener for Arc<T> {
    fn router_added(&self, area: AreaId, router: RouterId) {
        (**self).router_added(area, router)
    }

    fn router_removed(&self, area: AreaId, router: RouterId) {
        (**self).router_removed(area, router)
    }

    fn router_changed(&self, area: AreaId, router: RouterId) {
        (**self).router_changed(area, router)
    }

    fn link_added(&self, area: AreaId, link: TopologyLink) {
        (**self).link_added(area, link)
    }

    fn link_removed(&self, area: AreaId, link: TopologyLink) {
        (**self).link_removed(area, link)
    }
}

/// Listener that logs every change.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingListener;

impl TopologyListener for LoggingListener {
    fn router_added(&self, area: AreaId, router: RouterId) {
        info!(area = %area, router = %router, "Router added");
    }

    fn router_removed(&self, area: AreaId, router: RouterId) {
        info!(area = %area, router = %router, "Router removed");
    }

    fn router_changed(&self, area: AreaId, router: RouterId) {
        info!(area = %area, router = %router, "Router changed");
    }

    fn link_added(&self, area: AreaId, link: TopologyLink) {
        info!(area = %area, link = %link, "Link added");
    }

    fn link_removed(&self, area: AreaId, link: TopologyLink) {
        info!(area = %area, link = %link, "Link removed");
    }
}

// ============================================================================
// Tracker
// ============================================================================

/// Last known Router-LSA content per router.
#[derive(Debug, Default)]
pub struct TopologyTracker {
    routers: BTreeMap<RouterId, RouterLsa>,
}

impl TopologyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn router_count(&self) -> usize {
        self.routers.len()
    }

    pub fn contains(&self, router: &RouterId) -> bool {
        self.routers.contains_key(router)
    }

    /// Record an installed instance. MaxAge instances withdraw the router.
    pub fn lsa_installed(&mut self, lsa: &Lsa, is_max_age: bool) -> Vec<TopologyEvent> {
        if lsa.header.identity.lsa_type != LsaType::Router {
            return Vec::new();
        }
        let router = lsa.header.identity.advertising_router;
        if is_max_age {
            return self.router_withdrawn(router);
        }
        let Some(body) = lsa.as_router() else {
            return Vec::new();
        };

        let mut events = Vec::new();
        match self.routers.insert(router, body.clone()) {
            None => {
                events.push(TopologyEvent::RouterAdded(router));
                events.extend(links_of(router, body).map(TopologyEvent::LinkAdded));
            }
            Some(previous) if previous != *body => {
                let old: Vec<_> = links_of(router, &previous).collect();
                let new: Vec<_> = links_of(router, body).collect();
                let removed: Vec<_> = old.iter().filter(|l| !new.contains(l)).copied().collect();
                let added: Vec<_> = new.iter().filter(|l| !old.contains(l)).copied().collect();
                if removed.is_empty() && added.is_empty() {
                    events.push(TopologyEvent::RouterChanged(router));
                }
                events.extend(removed.into_iter().map(TopologyEvent::LinkRemoved));
                events.extend(added.into_iter().map(TopologyEvent::LinkAdded));
            }
            Some(_) => {}
        }
        events
    }

    /// Record that an LSA left the database.
    pub fn lsa_removed(&mut self, lsa: &Lsa) -> Vec<TopologyEvent> {
        if lsa.header.identity.lsa_type != LsaType::Router {
            return Vec::new();
        }
        self.router_withdrawn(lsa.header.identity.advertising_router)
    }

    fn router_withdrawn(&mut self, router: RouterId) -> Vec<TopologyEvent> {
        let Some(previous) = self.routers.remove(&router) else {
            return Vec::new();
        };
        let mut events: Vec<_> = links_of(router, &previous)
            .map(TopologyEvent::LinkRemoved)
            .collect();
        events.push(TopologyEvent::RouterRemoved(router));
        events
    }
}

fn links_of(router: RouterId, body: &RouterLsa) -> impl Iterator<Item = TopologyLink> + '_ {
    body.links
        .iter()
        .map(move |link| TopologyLink::from_router_link(router, link))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsa::{LsaBody, LsaIdentity, INITIAL_SEQUENCE_NUMBER};
    use std::sync::Mutex;

    fn rid(n: u8) -> RouterId {
        RouterId::from_octets(n, n, n, n)
    }

    fn p2p(to: u8, metric: u16) -> RouterLink {
        RouterLink {
            kind: RouterLinkKind::PointToPoint,
            link_id: rid(to).addr(),
            link_data: Ipv4Addr::new(10, 0, 0, 1),
            metric,
        }
    }

    fn router_lsa(router: u8, flags: u8, links: Vec<RouterLink>) -> Lsa {
        Lsa::new(
            LsaIdentity::router(rid(router)),
            0x02,
            INITIAL_SEQUENCE_NUMBER,
            0,
            LsaBody::Router(RouterLsa { flags, links }),
        )
    }

    #[test]
    fn test_new_router_adds_router_and_links() {
        let mut tracker = TopologyTracker::new();
        let events = tracker.lsa_installed(&router_lsa(1, 0, vec![p2p(2, 10)]), false);

        assert_eq!(events[0], TopologyEvent::RouterAdded(rid(1)));
        assert!(matches!(events[1], TopologyEvent::LinkAdded(l) if l.link_id == rid(2).addr()));
        assert_eq!(events.len(), 2);
        assert!(tracker.contains(&rid(1)));
    }

    #[test]
    fn test_link_diff() {
        let mut tracker = TopologyTracker::new();
        tracker.lsa_installed(&router_lsa(1, 0, vec![p2p(2, 10)]), false);

        let events = tracker.lsa_installed(&router_lsa(1, 0, vec![p2p(3, 10)]), false);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], TopologyEvent::LinkRemoved(l) if l.link_id == rid(2).addr()));
        assert!(matches!(events[1], TopologyEvent::LinkAdded(l) if l.link_id == rid(3).addr()));
    }

    #[test]
    fn test_flag_change_is_router_changed() {
        let mut tracker = TopologyTracker::new();
        tracker.lsa_installed(&router_lsa(1, 0, vec![p2p(2, 10)]), false);
        let events = tracker.lsa_installed(&router_lsa(1, 0x01, vec![p2p(2, 10)]), false);
        assert_eq!(events, vec![TopologyEvent::RouterChanged(rid(1))]);
    }

    #[test]
    fn test_identical_content_is_silent() {
        let mut tracker = TopologyTracker::new();
        let lsa = router_lsa(1, 0, vec![p2p(2, 10)]);
        tracker.lsa_installed(&lsa, false);
        assert!(tracker.lsa_installed(&lsa, false).is_empty());
    }

    #[test]
    fn test_max_age_withdraws_router() {
        let mut tracker = TopologyTracker::new();
        let lsa = router_lsa(1, 0, vec![p2p(2, 10)]);
        tracker.lsa_installed(&lsa, false);

        let events = tracker.lsa_installed(&lsa, true);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], TopologyEvent::RouterRemoved(rid(1)));
        assert!(!tracker.contains(&rid(1)));

        // Removal after the flush reports nothing new
        assert!(tracker.lsa_removed(&lsa).is_empty());
    }

    #[test]
    fn test_non_router_lsas_ignored() {
        let mut tracker = TopologyTracker::new();
        let lsa = Lsa::new(
            LsaIdentity::new(LsaType::SummaryNetwork, Ipv4Addr::new(10, 1, 0, 0), rid(1)),
            0x02,
            INITIAL_SEQUENCE_NUMBER,
            0,
            LsaBody::Raw(vec![0, 0, 0, 0]),
        );
        assert!(tracker.lsa_installed(&lsa, false).is_empty());
        assert_eq!(tracker.router_count(), 0);
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl TopologyListener for Recorder {
        fn router_added(&self, _area: AreaId, router: RouterId) {
            self.0.lock().unwrap().push(format!("+{}", router));
        }
        fn router_removed(&self, _area: AreaId, router: RouterId) {
            self.0.lock().unwrap().push(format!("-{}", router));
        }
        fn link_added(&self, _area: AreaId, link: TopologyLink) {
            self.0.lock().unwrap().push(format!("+{}", link.link_id));
        }
        fn link_removed(&self, _area: AreaId, link: TopologyLink) {
            self.0.lock().unwrap().push(format!("-{}", link.link_id));
        }
    }

    #[test]
    fn test_notify_dispatches_through_arc() {
        let recorder = Arc::new(Recorder::default());
        let listener: Arc<dyn TopologyListener> = Arc::new(recorder.clone());

        let mut tracker = TopologyTracker::new();
        for event in tracker.lsa_installed(&router_lsa(1, 0, vec![p2p(2, 10)]), false) {
            event.notify(AreaId::BACKBONE, listener.as_ref());
        }
        assert_eq!(*recorder.0.lock().unwrap(), vec!["+1.1.1.1", "+2.2.2.2"]);
    }
}
