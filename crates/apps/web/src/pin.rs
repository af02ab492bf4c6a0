//! The ad-hoc map pin, the item type persisted across tabs.

use serde::{Deserialize, Serialize};

/// A user-dropped map pin, created through the map's context gesture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapPin {
    pub lat: f64,
    pub lng: f64,
    pub label: String,
}

impl MapPin {
    pub fn new(lat: f64, lng: f64, label: impl Into<String>) -> Self {
        Self {
            lat,
            lng,
            label: label.into(),
        }
    }
}
