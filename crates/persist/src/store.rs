//! Keyed item collection backed by one snapshot blob, shared across tabs.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::slot::StorageSlot;
use crate::snapshot::{Snapshot, StoreEvent, decode_snapshot, diff_snapshots, encode_snapshot};
use crate::StoreError;

/// Keyed collection of items persisted as a single snapshot.
///
/// Local mutations fire the event handler synchronously; mutations observed
/// from other tabs arrive through [`MultiTabStore::external_change`] as a pair
/// of full payloads and are replayed through the same handler. There is no
/// lock around the snapshot: concurrent tabs race read-modify-write and the
/// last writer wins at snapshot level, each tab reconverging through its own
/// diff-and-replay.
pub struct MultiTabStore<T, S: StorageSlot> {
    slot: S,
    snapshot: Snapshot<T>,
    on_event: Box<dyn FnMut(StoreEvent<T>)>,
}

impl<T, S> MultiTabStore<T, S>
where
    T: Serialize + DeserializeOwned + Clone,
    S: StorageSlot,
{
    /// Reads the slot once and synchronously replays every live entry as
    /// `Added`, re-populating a freshly created view from persisted state.
    pub fn new(slot: S, on_event: impl FnMut(StoreEvent<T>) + 'static) -> Result<Self, StoreError> {
        let snapshot = decode_snapshot(slot.read()?.as_deref());
        let mut store = Self {
            slot,
            snapshot,
            on_event: Box::new(on_event),
        };
        let replay: Vec<(String, T)> = store
            .snapshot
            .iter()
            .filter_map(|(id, v)| v.clone().map(|item| (id.clone(), item)))
            .collect();
        for (id, item) in replay {
            (store.on_event)(StoreEvent::Added { id, item });
        }
        Ok(store)
    }

    /// Live (non-tombstoned) item count.
    pub fn len(&self) -> usize {
        self.snapshot.values().filter(|v| v.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.snapshot.get(id).and_then(|v| v.as_ref())
    }

    /// Mint a fresh id, rewrite the snapshot, then fire `Added` locally
    /// before returning.
    pub fn add(&mut self, item: T) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.snapshot.insert(id.clone(), Some(item.clone()));
        self.persist()?;
        (self.on_event)(StoreEvent::Added {
            id: id.clone(),
            item,
        });
        Ok(id)
    }

    /// Tombstone, not physical deletion: the key stays present so another
    /// tab can distinguish "deleted" from "never existed".
    pub fn remove(&mut self, id: &str) -> Result<(), StoreError> {
        self.snapshot.insert(id.to_string(), None);
        self.persist()?;
        (self.on_event)(StoreEvent::Removed { id: id.to_string() });
        Ok(())
    }

    /// Apply a change observed from another tab.
    ///
    /// The medium delivers the previous and new full payloads; the diff is
    /// computed here, replayed through the event handler, and the new
    /// snapshot is merged over the in-memory one (new wins per key, including
    /// tombstones) and persisted, so this tab's subsequent reads match what
    /// it just observed.
    pub fn external_change(
        &mut self,
        old_raw: Option<&str>,
        new_raw: Option<&str>,
    ) -> Result<(), StoreError> {
        let old = decode_snapshot::<T>(old_raw);
        let new = decode_snapshot::<T>(new_raw);
        for event in diff_snapshots(&old, &new) {
            (self.on_event)(event);
        }
        for (id, value) in new {
            self.snapshot.insert(id, value);
        }
        self.persist()
    }

    fn persist(&mut self) -> Result<(), StoreError> {
        let raw = encode_snapshot(&self.snapshot)?;
        self.slot.write(&raw)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use pretty_assertions::assert_eq;
    use serde::{Deserialize, Serialize};

    use super::{MultiTabStore, StoreEvent};
    use crate::slot::MemorySlot;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Pin {
        label: String,
    }

    fn pin(label: &str) -> Pin {
        Pin {
            label: label.into(),
        }
    }

    type EventLog = Rc<RefCell<Vec<StoreEvent<Pin>>>>;

    fn store_with_log(slot: MemorySlot) -> (MultiTabStore<Pin, MemorySlot>, EventLog) {
        let log: EventLog = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        let store = MultiTabStore::new(slot, move |e| sink.borrow_mut().push(e)).unwrap();
        (store, log)
    }

    #[test]
    fn add_fires_added_synchronously_with_the_new_id() {
        let (mut store, log) = store_with_log(MemorySlot::new());
        let id = store.add(pin("home")).unwrap();
        assert_eq!(
            log.borrow().as_slice(),
            [StoreEvent::Added {
                id,
                item: pin("home")
            }]
        );
    }

    #[test]
    fn fresh_store_replays_persisted_items_exactly_once() {
        let slot = MemorySlot::new();
        let (mut store, _) = store_with_log(slot.clone());
        let id = store.add(pin("home")).unwrap();
        drop(store);

        let (_store, log) = store_with_log(slot);
        assert_eq!(
            log.borrow().as_slice(),
            [StoreEvent::Added {
                id,
                item: pin("home")
            }]
        );
    }

    #[test]
    fn removed_items_do_not_replay_but_keep_their_key() {
        let slot = MemorySlot::new();
        let (mut store, _) = store_with_log(slot.clone());
        let id = store.add(pin("home")).unwrap();
        store.remove(&id).unwrap();
        drop(store);

        // The tombstone survives in the blob.
        assert!(slot.contents().unwrap().contains(&format!(r#""{id}":null"#)));

        let (store, log) = store_with_log(slot);
        assert!(log.borrow().is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn external_change_replays_the_diff_and_persists_the_merge() {
        let slot = MemorySlot::new();
        let (mut store, log) = store_with_log(slot.clone());
        let kept = store.add(pin("kept")).unwrap();
        log.borrow_mut().clear();

        // Another tab added "remote" and tombstoned nothing.
        let old_raw = slot.contents();
        let new_raw = format!(
            r#"{{"{kept}":{{"label":"kept"}},"remote-1":{{"label":"remote"}}}}"#
        );
        store
            .external_change(old_raw.as_deref(), Some(&new_raw))
            .unwrap();

        assert_eq!(
            log.borrow().as_slice(),
            [StoreEvent::Added {
                id: "remote-1".into(),
                item: pin("remote")
            }]
        );
        assert_eq!(store.get("remote-1"), Some(&pin("remote")));
        assert!(slot.contents().unwrap().contains("remote-1"));
    }

    #[test]
    fn external_tombstone_removes_a_local_item() {
        let slot = MemorySlot::new();
        let (mut store, log) = store_with_log(slot.clone());
        let id = store.add(pin("shared")).unwrap();
        log.borrow_mut().clear();

        let old_raw = slot.contents();
        let new_raw = format!(r#"{{"{id}":null}}"#);
        store
            .external_change(old_raw.as_deref(), Some(&new_raw))
            .unwrap();

        assert_eq!(
            log.borrow().as_slice(),
            [StoreEvent::Removed { id: id.clone() }]
        );
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn corrupt_external_payload_is_treated_as_empty() {
        let slot = MemorySlot::new();
        let (mut store, log) = store_with_log(slot.clone());
        let id = store.add(pin("kept")).unwrap();
        log.borrow_mut().clear();

        // Both payloads empty-decode; the only observable diff is the removal
        // of nothing and no additions.
        store.external_change(Some("{broken"), Some("also broken")).unwrap();
        assert!(log.borrow().is_empty());
        // In-memory state is untouched by the no-op merge.
        assert_eq!(store.get(&id), Some(&pin("kept")));
    }
}
