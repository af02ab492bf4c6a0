//! Snapshot codec and diffing.
//!
//! The persistence medium holds one serialized blob per origin and offers no
//! partial writes, so every mutation rewrites the whole snapshot, and change
//! notifications deliver two full payloads that must be diffed here.

use std::collections::BTreeMap;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::StoreError;

/// Full contents of the storage slot at one point in time.
///
/// `None` is a tombstone: the key stays present after deletion so an observer
/// can tell "deleted" apart from "never existed". Tombstones round-trip as
/// JSON `null`.
pub type Snapshot<T> = BTreeMap<String, Option<T>>;

/// Per-item change, both the output of [`diff_snapshots`] and the store's
/// notification payload.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent<T> {
    Added { id: String, item: T },
    Removed { id: String },
}

/// Decode a raw slot payload.
///
/// Malformed JSON resets to an empty snapshot rather than propagating: a
/// corrupted slot must not permanently break the feature. Legacy producers
/// stored a bare list; that shape is normalized to an id-keyed map with
/// stringified indices so the diff always operates on a flat map.
pub fn decode_snapshot<T: DeserializeOwned>(raw: Option<&str>) -> Snapshot<T> {
    let Some(raw) = raw else {
        return Snapshot::new();
    };
    if raw.trim().is_empty() {
        return Snapshot::new();
    }

    let value: serde_json::Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("discarding corrupt snapshot: {e}");
            return Snapshot::new();
        }
    };

    let entries: Vec<(String, serde_json::Value)> = match value {
        serde_json::Value::Object(map) => map.into_iter().collect(),
        serde_json::Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, v)| (i.to_string(), v))
            .collect(),
        _ => {
            tracing::warn!("discarding snapshot with unexpected shape");
            return Snapshot::new();
        }
    };

    let mut out = Snapshot::new();
    for (id, v) in entries {
        if v.is_null() {
            out.insert(id, None);
            continue;
        }
        match serde_json::from_value::<T>(v) {
            Ok(item) => {
                out.insert(id, Some(item));
            }
            Err(e) => tracing::warn!(id = %id, "skipping undecodable snapshot entry: {e}"),
        }
    }
    out
}

pub fn encode_snapshot<T: Serialize>(snapshot: &Snapshot<T>) -> Result<String, StoreError> {
    serde_json::to_string(snapshot).map_err(|e| StoreError::Io(e.to_string()))
}

/// Diff two snapshots into per-item events.
///
/// - id live in `new`, absent or tombstoned in `old` ⇒ `Added`;
/// - id live in `old`, absent or tombstoned in `new` ⇒ `Removed`;
/// - anything else is unchanged and produces no event.
///
/// A tombstone appearing for a previously unknown id produces nothing.
pub fn diff_snapshots<T: Clone>(old: &Snapshot<T>, new: &Snapshot<T>) -> Vec<StoreEvent<T>> {
    let mut out = Vec::new();
    for (id, value) in new {
        let Some(item) = value else {
            continue;
        };
        let was_live = matches!(old.get(id), Some(Some(_)));
        if !was_live {
            out.push(StoreEvent::Added {
                id: id.clone(),
                item: item.clone(),
            });
        }
    }
    for (id, value) in old {
        if value.is_none() {
            continue;
        }
        let still_live = matches!(new.get(id), Some(Some(_)));
        if !still_live {
            out.push(StoreEvent::Removed { id: id.clone() });
        }
    }
    out
}
