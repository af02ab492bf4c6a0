//! The gallery's state slice: search filter, paging, and sort.
//!
//! One record backs the whole screen; three disjoint URL bindings
//! ([`FILTER_FIELDS`], [`PAGE_FIELDS`], [`SORT_FIELDS`]) keep their own
//! subsets of it synchronized with the address bar.

use serde::{Deserialize, Serialize};

use crate::fields::{Field, FieldKind, FieldSpec, FieldValue};
use crate::observable::Patchable;
use crate::url::UrlSlice;

/// Search filter, paging, and sort for the gallery views.
///
/// Absent fields are unset; the serialized form omits them entirely, which
/// also makes the JSON rendering canonical for equality comparisons.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GalleryState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favorite: Option<bool>,
    /// Lower bound on capture time, epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_after_ms: Option<f64>,
    /// Upper bound on capture time, epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_before_ms: Option<f64>,
    /// Exclude results that have no geographic position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_geo: Option<bool>,
    /// Exclude results that carry annotations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_notes: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descending: Option<bool>,
}

/// Canonical disjoint field sets for the shared URL.
pub const FILTER_FIELDS: &[&str] = &["q", "person", "favorite", "from", "to"];
pub const PAGE_FIELDS: &[&str] = &["page", "page_size"];
pub const SORT_FIELDS: &[&str] = &["sort", "desc"];

impl GalleryState {
    /// The filter as used by spatial queries: pagination is irrelevant to a
    /// viewport-shaped request and must not cause spurious re-queries.
    pub fn without_paging(&self) -> Self {
        Self {
            page: None,
            page_size: None,
            ..self.clone()
        }
    }

    /// Payload shape for the bounds endpoint: paging stripped and both skip
    /// flags forced off, so the returned region covers everything the filter
    /// matches.
    pub fn for_bounds_query(&self) -> Self {
        Self {
            skip_geo: Some(false),
            skip_notes: Some(false),
            ..self.without_paging()
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GalleryStatePatch {
    pub q: Field<String>,
    pub person: Field<String>,
    pub favorite: Field<bool>,
    pub taken_after_ms: Field<f64>,
    pub taken_before_ms: Field<f64>,
    pub skip_geo: Field<bool>,
    pub skip_notes: Field<bool>,
    pub page: Field<f64>,
    pub page_size: Field<f64>,
    pub sort: Field<String>,
    pub descending: Field<bool>,
}

impl Patchable for GalleryState {
    type Patch = GalleryStatePatch;

    fn apply_patch(&mut self, patch: &GalleryStatePatch) {
        patch.q.apply_to(&mut self.q);
        patch.person.apply_to(&mut self.person);
        patch.favorite.apply_to(&mut self.favorite);
        patch.taken_after_ms.apply_to(&mut self.taken_after_ms);
        patch.taken_before_ms.apply_to(&mut self.taken_before_ms);
        patch.skip_geo.apply_to(&mut self.skip_geo);
        patch.skip_notes.apply_to(&mut self.skip_notes);
        patch.page.apply_to(&mut self.page);
        patch.page_size.apply_to(&mut self.page_size);
        patch.sort.apply_to(&mut self.sort);
        patch.descending.apply_to(&mut self.descending);
    }
}

fn text_field(value: Option<FieldValue>) -> Field<String> {
    match value {
        Some(FieldValue::Text(s)) => Field::Set(s),
        _ => Field::Clear,
    }
}

fn float_field(value: Option<FieldValue>) -> Field<f64> {
    match value {
        Some(FieldValue::Float(v)) => Field::Set(v),
        _ => Field::Clear,
    }
}

fn flag_field(value: Option<FieldValue>) -> Field<bool> {
    match value {
        Some(FieldValue::Flag(b)) => Field::Set(b),
        _ => Field::Clear,
    }
}

impl UrlSlice for GalleryState {
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::new("q", FieldKind::Text),
        FieldSpec::new("person", FieldKind::Text),
        FieldSpec::new("favorite", FieldKind::Flag),
        FieldSpec::new("from", FieldKind::Float),
        FieldSpec::new("to", FieldKind::Float),
        FieldSpec::new("skip_geo", FieldKind::Flag),
        FieldSpec::new("skip_notes", FieldKind::Flag),
        FieldSpec::new("page", FieldKind::Float),
        FieldSpec::new("page_size", FieldKind::Float),
        FieldSpec::new("sort", FieldKind::Text),
        FieldSpec::new("desc", FieldKind::Flag),
    ];

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "q" => self.q.clone().map(FieldValue::Text),
            "person" => self.person.clone().map(FieldValue::Text),
            "favorite" => self.favorite.map(FieldValue::Flag),
            "from" => self.taken_after_ms.map(FieldValue::Float),
            "to" => self.taken_before_ms.map(FieldValue::Float),
            "skip_geo" => self.skip_geo.map(FieldValue::Flag),
            "skip_notes" => self.skip_notes.map(FieldValue::Flag),
            "page" => self.page.map(FieldValue::Float),
            "page_size" => self.page_size.map(FieldValue::Float),
            "sort" => self.sort.clone().map(FieldValue::Text),
            "desc" => self.descending.map(FieldValue::Flag),
            _ => None,
        }
    }

    fn set_patch_field(patch: &mut GalleryStatePatch, name: &str, value: Option<FieldValue>) {
        match name {
            "q" => patch.q = text_field(value),
            "person" => patch.person = text_field(value),
            "favorite" => patch.favorite = flag_field(value),
            "from" => patch.taken_after_ms = float_field(value),
            "to" => patch.taken_before_ms = float_field(value),
            "skip_geo" => patch.skip_geo = flag_field(value),
            "skip_notes" => patch.skip_notes = flag_field(value),
            "page" => patch.page = float_field(value),
            "page_size" => patch.page_size = float_field(value),
            "sort" => patch.sort = text_field(value),
            "desc" => patch.descending = flag_field(value),
            _ => {}
        }
    }
}
