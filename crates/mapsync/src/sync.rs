//! The viewport marker synchronizer.
//!
//! Owns the live marker set and the ordering bookkeeping. IO stays outside:
//! an accepted refresh returns the [`ClusterQuery`] to send, and the caller
//! feeds the eventual response back through [`MarkerSynchronizer::apply_response`]
//! together with the query that produced it. Overlapping requests are never
//! cancelled; wasted work is suppressed before the call by deduplication and
//! after it by the newest-wins stamp check.

use std::collections::BTreeMap;
use std::rc::Rc;

use foundation::{Clock, GeoBounds, LatLng, Timestamp};
use state::GalleryState;

use crate::dedup::{LastRequest, should_skip};
use crate::query::{ClusterQuery, MarkerCluster};
use crate::viewport::{Popup, PopupAction, Viewport, ViewportEvent};

/// A popup interaction, forwarded to the registered handler.
#[derive(Debug, Clone, PartialEq)]
pub struct PopupEvent {
    /// Cluster content-hash key or persisted pin id.
    pub key: String,
    pub action: PopupAction,
}

/// Keeps the on-screen markers synchronized with the clustering endpoint and
/// with the ad-hoc pin store.
pub struct MarkerSynchronizer<V: Viewport> {
    viewport: V,
    clock: Rc<dyn Clock>,
    filter: Option<GalleryState>,
    last_request: Option<LastRequest>,
    last_applied: Option<Timestamp>,
    /// Cluster markers, keyed by the cluster's content hash.
    clusters: BTreeMap<String, V::Handle>,
    /// Ad-hoc pins, keyed by persisted-item id. Never touched by cluster
    /// reconciliation.
    pins: BTreeMap<String, V::Handle>,
    on_action: Option<Box<dyn FnMut(PopupEvent)>>,
}

impl<V: Viewport> MarkerSynchronizer<V> {
    pub fn new(viewport: V, clock: Rc<dyn Clock>) -> Self {
        Self {
            viewport,
            clock,
            filter: None,
            last_request: None,
            last_applied: None,
            clusters: BTreeMap::new(),
            pins: BTreeMap::new(),
            on_action: None,
        }
    }

    pub fn viewport(&self) -> &V {
        &self.viewport
    }

    pub fn viewport_mut(&mut self) -> &mut V {
        &mut self.viewport
    }

    /// Register the handler popup interactions are forwarded to.
    pub fn set_action_handler(&mut self, handler: impl FnMut(PopupEvent) + 'static) {
        self.on_action = Some(Box::new(handler));
    }

    /// Called by the viewport glue when a popup button is pressed.
    pub fn popup_action(&mut self, key: &str, action: PopupAction) {
        if let Some(handler) = self.on_action.as_mut() {
            handler(PopupEvent {
                key: key.to_string(),
                action,
            });
        }
    }

    /// External state changed: force a re-query even if the viewport did not
    /// move, and ask for the view to follow the results.
    pub fn set_filter(&mut self, filter: Option<GalleryState>) -> Option<ClusterQuery> {
        self.filter = filter;
        self.refresh(true)
    }

    /// A native viewport change. Events caused by this synchronizer's own
    /// fly-to animation are ignored to avoid a feedback loop.
    pub fn viewport_event(&mut self, event: ViewportEvent) -> Option<ClusterQuery> {
        if event.from_animation {
            tracing::debug!(kind = ?event.kind, "ignoring self-caused viewport event");
            return None;
        }
        self.refresh(false)
    }

    /// Build the query for the current viewport and filter; returns `None`
    /// when the request is suppressed as redundant.
    pub fn refresh(&mut self, change_view: bool) -> Option<ClusterQuery> {
        let query = ClusterQuery::build(
            self.viewport.bounds(),
            self.viewport.pixel_size(),
            self.filter.as_ref(),
            change_view,
            self.clock.now(),
        );
        if let Some(last) = &self.last_request {
            if should_skip(last, &query) {
                tracing::debug!(stamp = query.stamp.0, "suppressing redundant viewport query");
                return None;
            }
        }
        // The accepted request becomes "last" immediately, before its
        // response arrives; a burst of events during the round trip must not
        // each pass the skip check.
        self.last_request = Some(LastRequest::of(&query));
        Some(query)
    }

    /// Apply a clustering response, given the query that produced it.
    ///
    /// A response whose stamp is older than the newest applied one lost the
    /// race and is dropped; marker state ends up as if it never arrived.
    pub fn apply_response(&mut self, query: &ClusterQuery, clusters: Vec<MarkerCluster>) {
        if let Some(applied) = self.last_applied {
            if query.stamp < applied {
                tracing::debug!(
                    stamp = query.stamp.0,
                    newest = applied.0,
                    "dropping stale clustering response"
                );
                return;
            }
        }
        self.last_applied = Some(query.stamp);

        if query.change_view {
            if let Some(region) = GeoBounds::envelope(clusters.iter().map(|c| c.position)) {
                self.viewport.fly_to(region);
            }
        }

        self.reconcile(clusters);
    }

    /// A failed round trip: log it and leave the marker state untouched.
    /// There is no automatic retry.
    pub fn apply_error(&mut self, query: &ClusterQuery, message: &str) {
        tracing::warn!(stamp = query.stamp.0, "clustering query failed: {message}");
    }

    /// Diff the response into the live marker set.
    ///
    /// Markers whose cluster is still present are moved into the next
    /// generation untouched, so their popup state survives. Recreating every
    /// marker per update flickers visibly and closes any open popup on every
    /// pan. Only genuinely new clusters create markers and only vanished
    /// ones are removed.
    fn reconcile(&mut self, clusters: Vec<MarkerCluster>) {
        let mut previous = std::mem::take(&mut self.clusters);
        let mut next: BTreeMap<String, V::Handle> = BTreeMap::new();

        for cluster in clusters {
            if next.contains_key(&cluster.key) {
                // A duplicated key in the response would orphan a marker.
                continue;
            }
            if let Some(existing) = previous.remove(&cluster.key) {
                next.insert(cluster.key, existing);
            } else {
                let handle = self
                    .viewport
                    .add_marker(cluster.position, cluster_popup(&cluster));
                next.insert(cluster.key, handle);
            }
        }

        for (_, handle) in previous {
            self.viewport.remove_marker(handle);
        }
        self.clusters = next;
    }

    /// Render an ad-hoc pin. Driven by the persisted store's `Added` events.
    pub fn add_pin(&mut self, id: &str, at: LatLng, label: &str) {
        if self.pins.contains_key(id) {
            return;
        }
        let handle = self.viewport.add_marker(at, pin_popup(label));
        self.pins.insert(id.to_string(), handle);
    }

    /// Remove an ad-hoc pin. Driven by the persisted store's `Removed`
    /// events; unknown ids are a no-op.
    pub fn remove_pin(&mut self, id: &str) {
        if let Some(handle) = self.pins.remove(id) {
            self.viewport.remove_marker(handle);
        }
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    pub fn cluster_keys(&self) -> impl Iterator<Item = &str> {
        self.clusters.keys().map(String::as_str)
    }

    pub fn pin_count(&self) -> usize {
        self.pins.len()
    }
}

fn cluster_popup(cluster: &MarkerCluster) -> Popup {
    let title = cluster
        .label
        .clone()
        .unwrap_or_else(|| format!("{} photos", cluster.count));
    Popup {
        title,
        detail: cluster.preview_url.clone(),
        actions: vec![(PopupAction::OpenGallery, "Show photos")],
    }
}

fn pin_popup(label: &str) -> Popup {
    Popup {
        title: label.to_string(),
        detail: None,
        actions: vec![(PopupAction::RemovePin, "Remove pin")],
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::BTreeSet;
    use std::rc::Rc;

    use foundation::{GeoBounds, LatLng, ManualClock, PixelSize};
    use pretty_assertions::assert_eq;
    use state::GalleryState;

    use super::{MarkerSynchronizer, PopupEvent};
    use crate::dedup::DEDUP_WINDOW_MS;
    use crate::query::MarkerCluster;
    use crate::viewport::{Popup, PopupAction, Viewport, ViewportEvent, ViewportEventKind};

    struct FakeViewport {
        bounds: GeoBounds,
        size: PixelSize,
        next_handle: u64,
        live: BTreeSet<u64>,
        created: Vec<(u64, String)>,
        flights: Vec<GeoBounds>,
    }

    impl FakeViewport {
        fn new() -> Self {
            Self {
                bounds: GeoBounds::new(LatLng::new(10.0, 10.0), LatLng::new(0.0, 0.0)),
                size: PixelSize::new(1000.0, 500.0),
                next_handle: 0,
                live: BTreeSet::new(),
                created: Vec::new(),
                flights: Vec::new(),
            }
        }

        fn set_bounds(&mut self, nw: (f64, f64), se: (f64, f64)) {
            self.bounds = GeoBounds::new(LatLng::new(nw.0, nw.1), LatLng::new(se.0, se.1));
        }
    }

    impl Viewport for FakeViewport {
        type Handle = u64;

        fn bounds(&self) -> GeoBounds {
            self.bounds
        }

        fn pixel_size(&self) -> PixelSize {
            self.size
        }

        fn fly_to(&mut self, target: GeoBounds) {
            self.flights.push(target);
        }

        fn add_marker(&mut self, _at: LatLng, popup: Popup) -> u64 {
            self.next_handle += 1;
            self.live.insert(self.next_handle);
            self.created.push((self.next_handle, popup.title));
            self.next_handle
        }

        fn remove_marker(&mut self, handle: u64) {
            assert!(self.live.remove(&handle), "marker removed twice");
        }
    }

    fn synchronizer() -> (MarkerSynchronizer<FakeViewport>, Rc<ManualClock>) {
        let clock = Rc::new(ManualClock::new(1_000));
        let sync = MarkerSynchronizer::new(FakeViewport::new(), clock.clone());
        (sync, clock)
    }

    fn cluster(key: &str, lat: f64, lng: f64) -> MarkerCluster {
        MarkerCluster {
            key: key.to_string(),
            position: LatLng::new(lat, lng),
            count: 3,
            preview_url: None,
            label: None,
        }
    }

    fn pan(sync: &mut MarkerSynchronizer<FakeViewport>, nw: (f64, f64), se: (f64, f64)) {
        sync.viewport_mut().set_bounds(nw, se);
    }

    #[test]
    fn hairline_pan_inside_the_window_issues_one_request() {
        let (mut sync, clock) = synchronizer();
        assert!(sync.refresh(false).is_some());

        clock.advance(500);
        pan(&mut sync, (10.0001, 10.0001), (0.0001, 0.0001));
        assert!(
            sync.viewport_event(ViewportEvent::user(ViewportEventKind::Pan))
                .is_none()
        );
    }

    #[test]
    fn large_pan_issues_a_second_request() {
        let (mut sync, clock) = synchronizer();
        assert!(sync.refresh(false).is_some());

        clock.advance(500);
        pan(&mut sync, (12.0, 12.0), (2.0, 2.0));
        assert!(
            sync.viewport_event(ViewportEvent::user(ViewportEventKind::Pan))
                .is_some()
        );
    }

    #[test]
    fn identical_view_requeries_after_the_window() {
        let (mut sync, clock) = synchronizer();
        assert!(sync.refresh(false).is_some());

        clock.advance(DEDUP_WINDOW_MS - 1);
        assert!(
            sync.viewport_event(ViewportEvent::user(ViewportEventKind::Pan))
                .is_none()
        );

        clock.advance(1);
        assert!(
            sync.viewport_event(ViewportEvent::user(ViewportEventKind::Pan))
                .is_some()
        );
    }

    #[test]
    fn events_from_own_animation_are_ignored() {
        let (mut sync, _clock) = synchronizer();
        assert!(
            sync.viewport_event(ViewportEvent::animated(ViewportEventKind::Programmatic))
                .is_none()
        );
        // And they do not update the dedup state either.
        assert!(sync.refresh(false).is_some());
    }

    #[test]
    fn filter_change_forces_a_requery_without_viewport_motion() {
        let (mut sync, clock) = synchronizer();
        assert!(sync.refresh(false).is_some());

        clock.advance(10);
        let query = sync
            .set_filter(Some(GalleryState {
                q: Some("boat".into()),
                ..Default::default()
            }))
            .expect("filter edits must re-query");
        assert!(query.change_view);
        assert_eq!(query.body.filter.as_ref().unwrap().q.as_deref(), Some("boat"));
    }

    #[test]
    fn burst_during_round_trip_is_suppressed_by_the_accepted_request() {
        let (mut sync, clock) = synchronizer();
        // Request accepted, response still in flight.
        assert!(sync.refresh(false).is_some());

        for _ in 0..5 {
            clock.advance(100);
            assert!(
                sync.viewport_event(ViewportEvent::user(ViewportEventKind::Pan))
                    .is_none()
            );
        }
    }

    #[test]
    fn stale_response_is_discarded() {
        let (mut sync, clock) = synchronizer();
        let first = sync.refresh(false).unwrap();

        clock.advance(50);
        pan(&mut sync, (12.0, 12.0), (2.0, 2.0));
        let second = sync
            .viewport_event(ViewportEvent::user(ViewportEventKind::Pan))
            .unwrap();

        // Second response wins the race and lands first.
        sync.apply_response(&second, vec![cluster("b", 5.0, 5.0)]);
        // The earlier request resolves late and must lose.
        sync.apply_response(&first, vec![cluster("a", 1.0, 1.0)]);

        assert_eq!(sync.cluster_keys().collect::<Vec<_>>(), ["b"]);
    }

    #[test]
    fn reconciliation_preserves_surviving_marker_identity() {
        let (mut sync, clock) = synchronizer();
        let q1 = sync.refresh(false).unwrap();
        sync.apply_response(&q1, vec![cluster("keep", 1.0, 1.0), cluster("drop", 2.0, 2.0)]);
        let created_before = sync.viewport().created.len();

        clock.advance(DEDUP_WINDOW_MS);
        let q2 = sync.refresh(false).unwrap();
        sync.apply_response(&q2, vec![cluster("keep", 1.0, 1.0), cluster("new", 3.0, 3.0)]);

        // "keep" was moved, not re-created: exactly one new marker exists.
        assert_eq!(sync.viewport().created.len(), created_before + 1);
        assert_eq!(sync.cluster_keys().collect::<Vec<_>>(), ["keep", "new"]);
        // "drop" is gone from the surface.
        assert_eq!(sync.viewport().live.len(), 2);
    }

    #[test]
    fn applying_the_same_clusters_twice_changes_nothing() {
        let (mut sync, _clock) = synchronizer();
        let q = sync.refresh(false).unwrap();
        let list = vec![cluster("a", 1.0, 1.0), cluster("b", 2.0, 2.0)];

        sync.apply_response(&q, list.clone());
        let created = sync.viewport().created.clone();
        sync.apply_response(&q, list);

        assert_eq!(sync.viewport().created, created);
        assert_eq!(sync.cluster_keys().collect::<Vec<_>>(), ["a", "b"]);
    }

    #[test]
    fn change_view_response_flies_to_the_result_envelope() {
        let (mut sync, _clock) = synchronizer();
        let q = sync.set_filter(Some(GalleryState::default())).unwrap();
        sync.apply_response(&q, vec![cluster("a", 4.0, -3.0), cluster("b", -1.0, 6.0)]);

        let flights = &sync.viewport().flights;
        assert_eq!(flights.len(), 1);
        assert_eq!(flights[0].nw.lat, 4.0);
        assert_eq!(flights[0].nw.lng, -3.0);
        assert_eq!(flights[0].se.lat, -1.0);
        assert_eq!(flights[0].se.lng, 6.0);
    }

    #[test]
    fn empty_change_view_response_does_not_fly() {
        let (mut sync, _clock) = synchronizer();
        let q = sync.set_filter(Some(GalleryState::default())).unwrap();
        sync.apply_response(&q, Vec::new());
        assert!(sync.viewport().flights.is_empty());
    }

    #[test]
    fn pins_are_independent_of_cluster_reconciliation() {
        let (mut sync, _clock) = synchronizer();
        sync.add_pin("pin-1", LatLng::new(9.0, 9.0), "parking spot");
        assert_eq!(sync.pin_count(), 1);

        let q = sync.refresh(false).unwrap();
        sync.apply_response(&q, vec![cluster("a", 1.0, 1.0)]);
        // A later empty response clears clusters but not pins.
        sync.apply_response(&q, Vec::new());

        assert_eq!(sync.cluster_count(), 0);
        assert_eq!(sync.pin_count(), 1);
        assert_eq!(sync.viewport().live.len(), 1);

        sync.remove_pin("pin-1");
        assert_eq!(sync.pin_count(), 0);
        assert!(sync.viewport().live.is_empty());
        // Unknown ids are tolerated.
        sync.remove_pin("pin-1");
    }

    #[test]
    fn duplicate_pin_ids_do_not_create_duplicate_markers() {
        let (mut sync, _clock) = synchronizer();
        sync.add_pin("p", LatLng::new(1.0, 1.0), "a");
        sync.add_pin("p", LatLng::new(2.0, 2.0), "b");
        assert_eq!(sync.pin_count(), 1);
        assert_eq!(sync.viewport().live.len(), 1);
    }

    #[test]
    fn popup_actions_reach_the_registered_handler() {
        let (mut sync, _clock) = synchronizer();
        let seen: Rc<RefCell<Vec<PopupEvent>>> = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        sync.set_action_handler(move |e| sink.borrow_mut().push(e));

        sync.popup_action("pin-1", PopupAction::RemovePin);
        assert_eq!(
            seen.borrow().as_slice(),
            [PopupEvent {
                key: "pin-1".into(),
                action: PopupAction::RemovePin
            }]
        );
    }
}
