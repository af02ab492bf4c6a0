//! Browser composition point for the gallery map.
//!
//! The deterministic core lives in the library crates and is exercised
//! natively by their tests; everything in here talks to the browser and is
//! compiled for wasm only.

#[cfg(target_arch = "wasm32")]
mod app;

#[cfg(target_arch = "wasm32")]
pub use app::*;

pub mod pin;

pub use pin::MapPin;
