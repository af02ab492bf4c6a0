pub mod geo;
pub mod time;

// Foundation crate: small value types and the clock seam only, no IO.
pub use geo::*;
pub use time::*;
