//! Pre-request deduplication.
//!
//! Continuous pan/zoom streams fire far more events than the clustering
//! endpoint should see. A query is suppressed when, versus the last accepted
//! request, nothing meaningful changed: same non-bounds body, bounds within
//! a viewport-scaled tolerance, same view-change intent, and the suppression
//! window has not yet elapsed.

use foundation::{GeoBounds, Timestamp};

use crate::query::ClusterQuery;

/// Fraction of the previous bounds' span, per axis, that a corner may move
/// and still count as "the same view".
pub const BOUNDS_TOLERANCE_FACTOR: f64 = 0.1;

/// Suppression window for structurally similar queries, in milliseconds of
/// the request stamps (ten seconds).
pub const DEDUP_WINDOW_MS: u64 = 10_000;

/// The last request that went out.
///
/// Recorded the moment the request is accepted, before its response arrives,
/// so a burst of events during the network round trip cannot each pass the
/// skip check.
#[derive(Debug, Clone)]
pub struct LastRequest {
    pub stamp: Timestamp,
    pub bounds: GeoBounds,
    pub body_key: String,
    pub change_view: bool,
}

impl LastRequest {
    pub fn of(query: &ClusterQuery) -> Self {
        Self {
            stamp: query.stamp,
            bounds: query.bounds,
            body_key: query.body_key(),
            change_view: query.change_view,
        }
    }
}

/// Viewport-scaled bounds similarity.
///
/// Each of the four corner-coordinate deltas must be strictly below `factor`
/// of the previous span on its axis. The tolerance shrinks with the viewport,
/// so fine panning at high zoom is not over-suppressed.
pub fn bounds_similar(old: &GeoBounds, new: &GeoBounds, factor: f64) -> bool {
    let lat_tol = old.span_lat() * factor;
    let lng_tol = old.span_lng() * factor;
    (old.nw.lat - new.nw.lat).abs() < lat_tol
        && (old.nw.lng - new.nw.lng).abs() < lng_tol
        && (old.se.lat - new.se.lat).abs() < lat_tol
        && (old.se.lng - new.se.lng).abs() < lng_tol
}

/// Whether `next` should be dropped without a network call.
pub fn should_skip(last: &LastRequest, next: &ClusterQuery) -> bool {
    next.body_key() == last.body_key
        && bounds_similar(&last.bounds, &next.bounds, BOUNDS_TOLERANCE_FACTOR)
        && next.change_view == last.change_view
        && next.stamp.saturating_elapsed_since(last.stamp) < DEDUP_WINDOW_MS
}
