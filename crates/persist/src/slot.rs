//! Storage slots: one serialized string per origin.

use std::cell::RefCell;
use std::rc::Rc;

use crate::StoreError;

/// A single persistent key-value slot shared by all tabs of one origin.
pub trait StorageSlot {
    fn read(&self) -> Result<Option<String>, StoreError>;
    fn write(&self, raw: &str) -> Result<(), StoreError>;
}

/// Shared in-memory slot.
///
/// Clones share the underlying cell, so two stores over clones of one slot
/// behave like two tabs over one origin, minus the change notifications,
/// which tests deliver by hand.
#[derive(Debug, Default, Clone)]
pub struct MemorySlot {
    cell: Rc<RefCell<Option<String>>>,
}

impl MemorySlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Option<String> {
        self.cell.borrow().clone()
    }
}

impl StorageSlot for MemorySlot {
    fn read(&self) -> Result<Option<String>, StoreError> {
        Ok(self.cell.borrow().clone())
    }

    fn write(&self, raw: &str) -> Result<(), StoreError> {
        *self.cell.borrow_mut() = Some(raw.to_string());
        Ok(())
    }
}

#[cfg(target_arch = "wasm32")]
mod local_storage {
    use crate::StoreError;

    use super::StorageSlot;

    /// `localStorage`-backed slot under one fixed key.
    #[derive(Debug)]
    pub struct LocalStorageSlot {
        key: String,
    }

    impl LocalStorageSlot {
        pub fn new(key: impl Into<String>) -> Result<Self, StoreError> {
            // Probe availability up front so construction fails loudly
            // instead of every later read.
            window_local_storage()?;
            Ok(Self { key: key.into() })
        }
    }

    impl StorageSlot for LocalStorageSlot {
        fn read(&self) -> Result<Option<String>, StoreError> {
            let storage = window_local_storage()?;
            storage
                .get_item(&self.key)
                .map_err(|e| StoreError::Io(format!("get_item failed: {:?}", e)))
        }

        fn write(&self, raw: &str) -> Result<(), StoreError> {
            let storage = window_local_storage()?;
            storage
                .set_item(&self.key, raw)
                .map_err(|e| StoreError::Io(format!("set_item failed: {:?}", e)))
        }
    }

    fn window_local_storage() -> Result<web_sys::Storage, StoreError> {
        let win = web_sys::window().ok_or(StoreError::StorageUnavailable)?;
        win.local_storage()
            .map_err(|e| StoreError::Io(format!("localStorage error: {:?}", e)))?
            .ok_or(StoreError::StorageUnavailable)
    }
}

#[cfg(target_arch = "wasm32")]
pub use local_storage::LocalStorageSlot;

#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug)]
pub struct LocalStorageSlot;

#[cfg(not(target_arch = "wasm32"))]
impl LocalStorageSlot {
    pub fn new(_key: impl Into<String>) -> Result<Self, StoreError> {
        Err(StoreError::StorageUnavailable)
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl StorageSlot for LocalStorageSlot {
    fn read(&self) -> Result<Option<String>, StoreError> {
        Err(StoreError::StorageUnavailable)
    }

    fn write(&self, _raw: &str) -> Result<(), StoreError> {
        Err(StoreError::StorageUnavailable)
    }
}
