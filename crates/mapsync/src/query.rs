//! Query and response shapes for the clustering and bounds endpoints.

use foundation::{GeoBounds, LatLng, PixelSize, Timestamp};
use serde::{Deserialize, Serialize};
use state::GalleryState;

/// Pixel edge of one clustering cell; the resolution hint is the viewport
/// size divided by this, per axis.
pub const CLUSTER_CELL_PX: f64 = 10.0;

/// How much extra data to request beyond the visible region, so small pans
/// can be served from what is already on screen.
pub const OVERFETCH_FACTOR: f64 = 1.5;

/// Requested clustering resolution, cells per axis.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridResolution {
    pub x: f64,
    pub y: f64,
}

/// Everything about a clustering query except where it looks.
///
/// Two bodies that serialize identically are the same query as far as
/// deduplication is concerned; the serialized form is canonical because
/// unset filter fields are omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryBody {
    pub resolution: GridResolution,
    pub overfetch: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<GalleryState>,
}

/// One outgoing clustering request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterQuery {
    /// Ordering stamp; responses are applied newest-wins by this value.
    pub stamp: Timestamp,
    pub bounds: GeoBounds,
    pub body: QueryBody,
    /// Move the viewport to the results when they arrive.
    pub change_view: bool,
}

impl ClusterQuery {
    pub fn build(
        bounds: GeoBounds,
        size: PixelSize,
        filter: Option<&GalleryState>,
        change_view: bool,
        now: Timestamp,
    ) -> Self {
        let body = QueryBody {
            resolution: GridResolution {
                x: size.width / CLUSTER_CELL_PX,
                y: size.height / CLUSTER_CELL_PX,
            },
            overfetch: OVERFETCH_FACTOR,
            // Pagination is irrelevant to a spatial query and must not cause
            // spurious re-queries.
            filter: filter.map(GalleryState::without_paging),
        };
        Self {
            stamp: now,
            bounds,
            body,
            change_view,
        }
    }

    /// Canonical serialization of the non-bounds portion, the identity used
    /// by deduplication.
    pub fn body_key(&self) -> String {
        serde_json::to_string(&self.body).unwrap_or_default()
    }
}

/// Server-returned aggregate of photos in one clustering cell.
///
/// `key` is the stable content hash of the cluster's example item; on-screen
/// markers are keyed by it so marker identity is preserved whenever the same
/// cluster reappears in a later response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerCluster {
    pub key: String,
    pub position: LatLng,
    pub count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Bounds endpoint response: the region covering everything the filter
/// matches, or an explicit "no matching data".
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterBounds {
    Region { bounds: GeoBounds },
    Empty,
}
