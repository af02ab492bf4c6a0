//! Wiring: browser URL, localStorage, fetch transport, and the JS map glue.
//!
//! All lifecycles are owned here and passed down explicitly; the library
//! crates never reach for globals. The real map widget lives on the JS side
//! and talks to this module through plain callbacks and exported methods.

use std::cell::RefCell;
use std::rc::Rc;

use gloo_net::http::Request;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::spawn_local;

use foundation::{GeoBounds, LatLng, PixelSize, SystemClock};
use mapsync::{
    ClusterQuery, FilterBounds, MarkerCluster, MarkerSynchronizer, Popup, PopupAction, Viewport,
    ViewportEvent, ViewportEventKind,
};
use persist::{LocalStorageSlot, MultiTabStore, StoreEvent};
use state::{
    FILTER_FIELDS, Field, GalleryState, GalleryStatePatch, ObservableState, PAGE_FIELDS,
    SORT_FIELDS, UrlFieldBinding, UrlQuery,
};

use crate::pin::MapPin;

/// localStorage key of the pin snapshot, shared by every tab of the origin.
const PINS_SLOT_KEY: &str = "gallery.map_pins.v1";

type Synchronizer = MarkerSynchronizer<JsViewport>;
type PinStore = MultiTabStore<MapPin, LocalStorageSlot>;

fn console_warn(message: &str) {
    web_sys::console::warn_1(&JsValue::from_str(message));
}

fn to_js(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// `UrlQuery` over the page URL. Writes go through `history.replaceState`,
/// in place, so a push never creates a navigation history entry.
struct BrowserUrl;

impl BrowserUrl {
    fn params() -> Option<web_sys::UrlSearchParams> {
        let search = web_sys::window()?.location().search().ok()?;
        let trimmed = search.strip_prefix('?').unwrap_or(&search);
        web_sys::UrlSearchParams::new_with_str(trimmed).ok()
    }
}

impl UrlQuery for BrowserUrl {
    fn get(&self, key: &str) -> Option<String> {
        Self::params()?.get(key)
    }

    fn set(&mut self, key: &str, value: Option<&str>) {
        let Some(params) = Self::params() else {
            return;
        };
        match value {
            Some(v) => params.set(key, v),
            None => params.delete(key),
        }

        let Some(window) = web_sys::window() else {
            return;
        };
        let pathname = window.location().pathname().unwrap_or_default();
        let query = String::from(params.to_string());
        let url = if query.is_empty() {
            pathname
        } else {
            format!("{pathname}?{query}")
        };
        if let Ok(history) = window.history() {
            let _ = history.replace_state_with_url(&JsValue::NULL, "", Some(&url));
        }
    }
}

fn action_name(action: PopupAction) -> &'static str {
    match action {
        PopupAction::OpenGallery => "open_gallery",
        PopupAction::RemovePin => "remove_pin",
    }
}

fn parse_action(name: &str) -> Option<PopupAction> {
    match name {
        "open_gallery" => Some(PopupAction::OpenGallery),
        "remove_pin" => Some(PopupAction::RemovePin),
        _ => None,
    }
}

fn popup_json(popup: &Popup) -> String {
    let actions: Vec<serde_json::Value> = popup
        .actions
        .iter()
        .map(|(action, label)| {
            serde_json::json!({ "action": action_name(*action), "label": label })
        })
        .collect();
    serde_json::json!({
        "title": popup.title,
        "detail": popup.detail,
        "actions": actions,
    })
    .to_string()
}

fn parse_event_kind(kind: &str) -> ViewportEventKind {
    match kind {
        "pan" => ViewportEventKind::Pan,
        "zoom" => ViewportEventKind::Zoom,
        "resize" => ViewportEventKind::Resize,
        _ => ViewportEventKind::Programmatic,
    }
}

/// Bridges the `Viewport` trait to the JS map widget.
///
/// The widget reports its current view through
/// [`GalleryMapApp::viewport_changed`]; commands flow out through the three
/// callbacks. Marker handles are opaque integers minted here and echoed back
/// to JS for removal.
struct JsViewport {
    bounds: GeoBounds,
    size: PixelSize,
    next_handle: u64,
    fly_to_cb: js_sys::Function,
    add_marker_cb: js_sys::Function,
    remove_marker_cb: js_sys::Function,
}

impl JsViewport {
    fn new(
        fly_to_cb: js_sys::Function,
        add_marker_cb: js_sys::Function,
        remove_marker_cb: js_sys::Function,
    ) -> Self {
        Self {
            bounds: GeoBounds::new(LatLng::new(0.0, 0.0), LatLng::new(0.0, 0.0)),
            size: PixelSize::new(0.0, 0.0),
            next_handle: 0,
            fly_to_cb,
            add_marker_cb,
            remove_marker_cb,
        }
    }

    fn update_view(&mut self, bounds: GeoBounds, size: PixelSize) {
        self.bounds = bounds;
        self.size = size;
    }
}

impl Viewport for JsViewport {
    type Handle = u64;

    fn bounds(&self) -> GeoBounds {
        self.bounds
    }

    fn pixel_size(&self) -> PixelSize {
        self.size
    }

    fn fly_to(&mut self, target: GeoBounds) {
        let args = js_sys::Array::of4(
            &JsValue::from_f64(target.nw.lat),
            &JsValue::from_f64(target.nw.lng),
            &JsValue::from_f64(target.se.lat),
            &JsValue::from_f64(target.se.lng),
        );
        if self.fly_to_cb.apply(&JsValue::NULL, &args).is_err() {
            console_warn("fly-to callback threw");
        }
    }

    fn add_marker(&mut self, at: LatLng, popup: Popup) -> u64 {
        self.next_handle += 1;
        let args = js_sys::Array::of4(
            &JsValue::from_f64(self.next_handle as f64),
            &JsValue::from_f64(at.lat),
            &JsValue::from_f64(at.lng),
            &JsValue::from_str(&popup_json(&popup)),
        );
        if self.add_marker_cb.apply(&JsValue::NULL, &args).is_err() {
            console_warn("add-marker callback threw");
        }
        self.next_handle
    }

    fn remove_marker(&mut self, handle: u64) {
        let _ = self
            .remove_marker_cb
            .call1(&JsValue::NULL, &JsValue::from_f64(handle as f64));
    }
}

fn dispatch_cluster_query(sync: Rc<RefCell<Synchronizer>>, endpoint: String, query: ClusterQuery) {
    spawn_local(async move {
        let payload = match serde_json::to_string(&query) {
            Ok(p) => p,
            Err(e) => {
                console_warn(&format!("failed to encode clustering query: {e}"));
                return;
            }
        };
        match fetch_clusters(&endpoint, payload).await {
            Ok(clusters) => sync.borrow_mut().apply_response(&query, clusters),
            Err(message) => sync.borrow_mut().apply_error(&query, &message),
        }
    });
}

async fn fetch_clusters(endpoint: &str, payload: String) -> Result<Vec<MarkerCluster>, String> {
    let request = Request::post(endpoint)
        .header("content-type", "application/json")
        .body(payload)
        .map_err(|e| e.to_string())?;
    let response = request.send().await.map_err(|e| e.to_string())?;
    if !response.ok() {
        return Err(format!("clustering endpoint returned {}", response.status()));
    }
    response
        .json::<Vec<MarkerCluster>>()
        .await
        .map_err(|e| e.to_string())
}

fn dispatch_bounds_query(sync: Rc<RefCell<Synchronizer>>, endpoint: String, payload: String) {
    spawn_local(async move {
        match fetch_bounds(&endpoint, payload).await {
            Ok(FilterBounds::Region { bounds }) => {
                sync.borrow_mut().viewport_mut().fly_to(bounds);
            }
            Ok(FilterBounds::Empty) => {}
            Err(message) => console_warn(&format!("bounds query failed: {message}")),
        }
    });
}

async fn fetch_bounds(endpoint: &str, payload: String) -> Result<FilterBounds, String> {
    let request = Request::post(endpoint)
        .header("content-type", "application/json")
        .body(payload)
        .map_err(|e| e.to_string())?;
    let response = request.send().await.map_err(|e| e.to_string())?;
    if !response.ok() {
        return Err(format!("bounds endpoint returned {}", response.status()));
    }
    response.json::<FilterBounds>().await.map_err(|e| e.to_string())
}

/// The application root: owns the state slices, the URL bindings, the pin
/// store, and the marker synchronizer.
#[wasm_bindgen]
pub struct GalleryMapApp {
    gallery: ObservableState<GalleryState>,
    sync: Rc<RefCell<Synchronizer>>,
    store: Rc<RefCell<PinStore>>,
    cluster_endpoint: String,
}

#[wasm_bindgen]
impl GalleryMapApp {
    /// Build and wire the whole core.
    ///
    /// The JS side supplies the map commands: `fly_to(nw_lat, nw_lng,
    /// se_lat, se_lng)`, `add_marker(handle, lat, lng, popup_json)`,
    /// `remove_marker(handle)`, and `open_gallery(cluster_key)`. Move events
    /// caused by `fly_to` must be reported back with `from_animation` set.
    #[wasm_bindgen(constructor)]
    pub fn new(
        cluster_endpoint: String,
        bounds_endpoint: String,
        fly_to: js_sys::Function,
        add_marker: js_sys::Function,
        remove_marker: js_sys::Function,
        open_gallery: js_sys::Function,
    ) -> Result<GalleryMapApp, JsValue> {
        console_error_panic_hook::set_once();

        let viewport = JsViewport::new(fly_to, add_marker, remove_marker);
        let sync = Rc::new(RefCell::new(MarkerSynchronizer::new(
            viewport,
            Rc::new(SystemClock),
        )));

        let slot = LocalStorageSlot::new(PINS_SLOT_KEY).map_err(to_js)?;
        let sync_for_store = Rc::clone(&sync);
        let store = MultiTabStore::new(slot, move |event: StoreEvent<MapPin>| match event {
            StoreEvent::Added { id, item } => sync_for_store.borrow_mut().add_pin(
                &id,
                LatLng::new(item.lat, item.lng),
                &item.label,
            ),
            StoreEvent::Removed { id } => sync_for_store.borrow_mut().remove_pin(&id),
        })
        .map_err(to_js)?;
        let store = Rc::new(RefCell::new(store));

        let store_for_actions = Rc::clone(&store);
        sync.borrow_mut()
            .set_action_handler(move |event| match event.action {
                PopupAction::OpenGallery => {
                    let _ = open_gallery.call1(&JsValue::NULL, &JsValue::from_str(&event.key));
                }
                PopupAction::RemovePin => {
                    // Deferred: the synchronizer is borrowed while this
                    // handler runs, and removing the pin re-enters it
                    // through the store's events.
                    let store = Rc::clone(&store_for_actions);
                    spawn_local(async move {
                        if let Err(e) = store.borrow_mut().remove(&event.key) {
                            console_warn(&format!("failed to remove pin: {e}"));
                        }
                    });
                }
            });

        // Cross-tab pin changes: the storage event carries both full
        // payloads; the store diffs them and replays the result.
        let store_for_events = Rc::clone(&store);
        let listener = Closure::<dyn FnMut(web_sys::StorageEvent)>::new(
            move |event: web_sys::StorageEvent| {
                if event.key().as_deref() != Some(PINS_SLOT_KEY) {
                    return;
                }
                let old = event.old_value();
                let new = event.new_value();
                if let Err(e) = store_for_events
                    .borrow_mut()
                    .external_change(old.as_deref(), new.as_deref())
                {
                    console_warn(&format!("failed to apply cross-tab pin change: {e}"));
                }
            },
        );
        if let Some(window) = web_sys::window() {
            let _ = window
                .add_event_listener_with_callback("storage", listener.as_ref().unchecked_ref());
        }
        listener.forget();

        // Seed state from the current URL before anyone subscribes, so the
        // replay does not fire queries against the not-yet-reported viewport.
        let gallery = ObservableState::new(GalleryState::default());
        let mut url = BrowserUrl;
        gallery.update(&UrlFieldBinding::<GalleryState>::new(FILTER_FIELDS).pull(&url));
        gallery.update(&UrlFieldBinding::<GalleryState>::new(PAGE_FIELDS).pull(&url));
        gallery.update(&UrlFieldBinding::<GalleryState>::new(SORT_FIELDS).pull(&url));
        // Re-canonicalize the address bar (drops malformed parameters).
        let seeded = gallery.get();
        UrlFieldBinding::<GalleryState>::new(FILTER_FIELDS).push(&seeded, &mut url);
        UrlFieldBinding::<GalleryState>::new(PAGE_FIELDS).push(&seeded, &mut url);
        UrlFieldBinding::<GalleryState>::new(SORT_FIELDS).push(&seeded, &mut url);

        let sync_for_state = Rc::clone(&sync);
        let cluster_for_state = cluster_endpoint.clone();
        let last_bounds_payload: RefCell<Option<String>> = RefCell::new(None);
        gallery.register(move |value: &GalleryState| {
            let mut url = BrowserUrl;
            UrlFieldBinding::<GalleryState>::new(FILTER_FIELDS).push(value, &mut url);
            UrlFieldBinding::<GalleryState>::new(PAGE_FIELDS).push(value, &mut url);
            UrlFieldBinding::<GalleryState>::new(SORT_FIELDS).push(value, &mut url);

            if let Some(query) = sync_for_state.borrow_mut().set_filter(Some(value.clone())) {
                dispatch_cluster_query(
                    Rc::clone(&sync_for_state),
                    cluster_for_state.clone(),
                    query,
                );
            }

            // Ask the bounds endpoint where the results live, but only when
            // the spatial filter actually changed; paging and sort edits
            // reuse the previous answer.
            let payload = match serde_json::to_string(&value.for_bounds_query()) {
                Ok(p) => p,
                Err(_) => return,
            };
            if last_bounds_payload.borrow().as_deref() == Some(payload.as_str()) {
                return;
            }
            *last_bounds_payload.borrow_mut() = Some(payload.clone());
            dispatch_bounds_query(
                Rc::clone(&sync_for_state),
                bounds_endpoint.clone(),
                payload,
            );
        });

        Ok(GalleryMapApp {
            gallery,
            sync,
            store,
            cluster_endpoint,
        })
    }

    /// Called by the map glue after every move, zoom, or resize.
    ///
    /// `kind` is `"pan"`, `"zoom"`, `"resize"`, or anything else for a
    /// programmatic move; `from_animation` must be true when the motion was
    /// caused by a fly-to this app issued.
    #[allow(clippy::too_many_arguments)]
    pub fn viewport_changed(
        &mut self,
        nw_lat: f64,
        nw_lng: f64,
        se_lat: f64,
        se_lng: f64,
        width: f64,
        height: f64,
        kind: String,
        from_animation: bool,
    ) {
        let bounds = GeoBounds::new(LatLng::new(nw_lat, nw_lng), LatLng::new(se_lat, se_lng));
        let event = ViewportEvent {
            kind: parse_event_kind(&kind),
            from_animation,
        };
        let query = {
            let mut sync = self.sync.borrow_mut();
            sync.viewport_mut()
                .update_view(bounds, PixelSize::new(width, height));
            sync.viewport_event(event)
        };
        if let Some(query) = query {
            dispatch_cluster_query(
                Rc::clone(&self.sync),
                self.cluster_endpoint.clone(),
                query,
            );
        }
    }

    /// Re-query the current viewport without a motion event. Deduplication
    /// still applies.
    pub fn refresh_map(&mut self) {
        let query = self.sync.borrow_mut().refresh(false);
        if let Some(query) = query {
            dispatch_cluster_query(
                Rc::clone(&self.sync),
                self.cluster_endpoint.clone(),
                query,
            );
        }
    }

    /// Re-read the URL after a history navigation (popstate).
    pub fn url_changed(&mut self) {
        let url = BrowserUrl;
        self.gallery
            .update(&UrlFieldBinding::<GalleryState>::new(FILTER_FIELDS).pull(&url));
        self.gallery
            .update(&UrlFieldBinding::<GalleryState>::new(PAGE_FIELDS).pull(&url));
        self.gallery
            .update(&UrlFieldBinding::<GalleryState>::new(SORT_FIELDS).pull(&url));
    }

    pub fn set_search_text(&mut self, text: Option<String>) {
        self.gallery.update(&GalleryStatePatch {
            q: opt_field(text),
            // A new search starts over on page one.
            page: Field::Clear,
            ..Default::default()
        });
    }

    pub fn set_person(&mut self, person: Option<String>) {
        self.gallery.update(&GalleryStatePatch {
            person: opt_field(person),
            page: Field::Clear,
            ..Default::default()
        });
    }

    pub fn set_favorite_only(&mut self, favorite: Option<bool>) {
        self.gallery.update(&GalleryStatePatch {
            favorite: opt_field(favorite),
            page: Field::Clear,
            ..Default::default()
        });
    }

    pub fn set_page(&mut self, page: Option<f64>) {
        self.gallery.update(&GalleryStatePatch {
            page: opt_field(page),
            ..Default::default()
        });
    }

    pub fn set_sort(&mut self, sort: Option<String>, descending: Option<bool>) {
        self.gallery.update(&GalleryStatePatch {
            sort: opt_field(sort),
            descending: opt_field(descending),
            ..Default::default()
        });
    }

    /// Current state slice as JSON, for the surrounding views.
    pub fn state_json(&self) -> String {
        serde_json::to_string(&self.gallery.get()).unwrap_or_else(|_| "{}".to_string())
    }

    /// Drop an ad-hoc pin, typically from the map's context gesture.
    /// Returns the persisted id.
    pub fn drop_pin(&mut self, lat: f64, lng: f64, label: String) -> Option<String> {
        match self.store.borrow_mut().add(MapPin::new(lat, lng, label)) {
            Ok(id) => Some(id),
            Err(e) => {
                console_warn(&format!("failed to persist pin: {e}"));
                None
            }
        }
    }

    pub fn remove_pin(&mut self, id: String) {
        if let Err(e) = self.store.borrow_mut().remove(&id) {
            console_warn(&format!("failed to remove pin: {e}"));
        }
    }

    /// Called by the map glue when a popup button is pressed.
    pub fn popup_action(&mut self, key: String, action: String) {
        if let Some(action) = parse_action(&action) {
            self.sync.borrow_mut().popup_action(&key, action);
        }
    }
}

fn opt_field<T>(value: Option<T>) -> Field<T> {
    match value {
        Some(v) => Field::Set(v),
        None => Field::Clear,
    }
}
