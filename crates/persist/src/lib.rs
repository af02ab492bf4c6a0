pub mod slot;
pub mod snapshot;
pub mod store;

pub use slot::*;
pub use snapshot::*;
pub use store::*;

/// Storage-layer failure.
///
/// Corrupt payloads are never an error (they decode to an empty snapshot),
/// so this only covers the medium itself being broken or absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    StorageUnavailable,
    Io(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::StorageUnavailable => write!(f, "persistent storage unavailable"),
            StoreError::Io(msg) => write!(f, "storage error: {msg}"),
        }
    }
}

impl std::error::Error for StoreError {}
