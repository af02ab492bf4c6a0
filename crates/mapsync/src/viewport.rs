//! The viewport seam: the map surface this crate drives.

use foundation::{GeoBounds, LatLng, PixelSize};

/// Why the viewport moved.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ViewportEventKind {
    Pan,
    Zoom,
    Resize,
    Programmatic,
}

/// A native viewport change notification.
///
/// `from_animation` marks moves that are the result of a caller-issued
/// fly-to; reacting to those would re-trigger the fetch that caused them.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ViewportEvent {
    pub kind: ViewportEventKind,
    pub from_animation: bool,
}

impl ViewportEvent {
    pub fn user(kind: ViewportEventKind) -> Self {
        Self {
            kind,
            from_animation: false,
        }
    }

    pub fn animated(kind: ViewportEventKind) -> Self {
        Self {
            kind,
            from_animation: true,
        }
    }
}

/// Action ids a marker popup can emit.
///
/// Popups communicate only through these opaque ids and never hold a
/// reference back into the synchronizer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PopupAction {
    /// Open the gallery filtered to this cluster's contents.
    OpenGallery,
    /// Delete the ad-hoc pin this popup belongs to.
    RemovePin,
}

/// Content of a marker popup, rendered by the viewport implementation.
#[derive(Debug, Clone, PartialEq)]
pub struct Popup {
    pub title: String,
    pub detail: Option<String>,
    /// Action id plus its button label.
    pub actions: Vec<(PopupAction, &'static str)>,
}

/// The map surface. Implementations wrap a concrete map widget; tests use an
/// in-memory fake.
pub trait Viewport {
    /// Opaque marker handle. The reconciler moves surviving handles between
    /// marker generations without touching them, which is what keeps open
    /// popups alive across updates.
    type Handle;

    fn bounds(&self) -> GeoBounds;
    fn pixel_size(&self) -> PixelSize;

    /// Animated move/fit to `target`. Move events caused by this animation
    /// must be reported with `from_animation` set.
    fn fly_to(&mut self, target: GeoBounds);

    fn add_marker(&mut self, at: LatLng, popup: Popup) -> Self::Handle;
    fn remove_marker(&mut self, handle: Self::Handle);
}
