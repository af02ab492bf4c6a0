//! Bidirectional state ↔ URL query-string synchronization.
//!
//! Several independent slices share one URL, so every binding is constructed
//! with an explicit allow-list of the parameters it owns and never touches
//! anything outside that list. Writes happen in place (`history.replaceState`
//! in the browser implementation); a push must not create a history entry.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use crate::fields::{FieldKind, FieldSpec, FieldValue, encode_field, parse_field};
use crate::observable::Patchable;

/// Read/write access to the page URL's query parameters.
pub trait UrlQuery {
    fn get(&self, key: &str) -> Option<String>;

    /// `None` removes the parameter. Implementations rewrite the URL in
    /// place, never pushing a navigation history entry.
    fn set(&mut self, key: &str, value: Option<&str>);
}

/// In-memory `UrlQuery` used by tests and native builds.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MemoryUrlQuery {
    params: BTreeMap<String, String>,
}

impl MemoryUrlQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }
}

impl UrlQuery for MemoryUrlQuery {
    fn get(&self, key: &str) -> Option<String> {
        self.params.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Option<&str>) {
        match value {
            Some(v) => {
                self.params.insert(key.to_string(), v.to_string());
            }
            None => {
                self.params.remove(key);
            }
        }
    }
}

/// A slice whose fields can be mapped to URL query parameters by name.
pub trait UrlSlice: Patchable + Clone + Default {
    /// Every URL-mappable field with its codec.
    const FIELDS: &'static [FieldSpec];

    fn field(&self, name: &str) -> Option<FieldValue>;

    /// Record `value` for `name` in the patch; `None` clears the field.
    fn set_patch_field(patch: &mut Self::Patch, name: &str, value: Option<FieldValue>);
}

/// Serializes a fixed, named subset of a slice's fields to and from the URL.
pub struct UrlFieldBinding<S: UrlSlice> {
    owned: &'static [&'static str],
    _slice: PhantomData<S>,
}

impl<S: UrlSlice> UrlFieldBinding<S> {
    /// `owned` is the binding's allow-list. Field ownership is explicit so
    /// that bindings with disjoint sets can push independently without one
    /// erasing another's parameters.
    pub fn new(owned: &'static [&'static str]) -> Self {
        debug_assert!(
            owned
                .iter()
                .all(|n| S::FIELDS.iter().any(|f| f.name == *n)),
            "binding owns a field the slice does not declare"
        );
        Self {
            owned,
            _slice: PhantomData,
        }
    }

    pub fn owned_fields(&self) -> &'static [&'static str] {
        self.owned
    }

    /// Read the owned parameters into a patch. A parameter that is missing or
    /// fails to parse clears its field: the URL is authoritative for owned
    /// fields, and a malformed value degrades to "unset" rather than an
    /// error. Fields outside the allow-list are kept untouched.
    pub fn pull(&self, url: &impl UrlQuery) -> S::Patch {
        let mut patch = S::Patch::default();
        for name in self.owned {
            let parsed = self
                .kind_of(name)
                .and_then(|kind| url.get(name).and_then(|raw| parse_field(kind, &raw)));
            S::set_patch_field(&mut patch, name, parsed);
        }
        patch
    }

    /// Write the owned fields of `value` into the URL, removing the parameter
    /// for every unset field.
    pub fn push(&self, value: &S, url: &mut impl UrlQuery) {
        for name in self.owned {
            match value.field(name) {
                Some(v) => url.set(name, Some(&encode_field(&v))),
                None => url.set(name, None),
            }
        }
    }

    fn kind_of(&self, name: &str) -> Option<FieldKind> {
        S::FIELDS
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.kind)
    }
}
