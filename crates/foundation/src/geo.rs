use serde::{Deserialize, Serialize};

/// Geographic point in WGS84 degrees.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Viewport-shaped region described by its northwest and southeast corners.
///
/// Corner order is the map convention: `nw.lat >= se.lat`, `nw.lng <= se.lng`
/// for regions that do not cross the antimeridian. Nothing here normalizes
/// wrapped longitudes; callers pass corners exactly as the viewport reports
/// them so that tolerance comparisons see the same numbers the map produced.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub nw: LatLng,
    pub se: LatLng,
}

impl GeoBounds {
    pub fn new(nw: LatLng, se: LatLng) -> Self {
        Self { nw, se }
    }

    pub fn span_lat(&self) -> f64 {
        (self.nw.lat - self.se.lat).abs()
    }

    pub fn span_lng(&self) -> f64 {
        (self.nw.lng - self.se.lng).abs()
    }

    /// Grow the region so it also covers `p`.
    pub fn extend(&mut self, p: LatLng) {
        self.nw.lat = self.nw.lat.max(p.lat);
        self.nw.lng = self.nw.lng.min(p.lng);
        self.se.lat = self.se.lat.min(p.lat);
        self.se.lng = self.se.lng.max(p.lng);
    }

    /// Smallest region covering every point, or `None` for an empty set.
    pub fn envelope(points: impl IntoIterator<Item = LatLng>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut out = Self::new(first, first);
        for p in iter {
            out.extend(p);
        }
        Some(out)
    }
}

/// Viewport size in CSS pixels.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct PixelSize {
    pub width: f64,
    pub height: f64,
}

impl PixelSize {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}
