//! The closed patch algebra and per-field URL codecs.
//!
//! A merge-update never stores "null" in place of an absent value; `Clear`
//! removes the field outright. Codecs are enumerated per field kind rather
//! than dispatched over loosely typed maps.

/// One field of a merge-update patch.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Field<T> {
    #[default]
    Keep,
    Clear,
    Set(T),
}

impl<T: Clone> Field<T> {
    pub fn apply_to(&self, slot: &mut Option<T>) {
        match self {
            Field::Keep => {}
            Field::Clear => *slot = None,
            Field::Set(v) => *slot = Some(v.clone()),
        }
    }
}

/// Value of a single URL-mapped field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Float(f64),
    Flag(bool),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Float,
    Flag,
}

/// Name and codec of one URL-mappable slice field.
#[derive(Debug, Copy, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind }
    }
}

/// Parse one query parameter value.
///
/// Anything unparseable is absent, never an error: a malformed parameter must
/// not block the rest of the slice from loading.
pub fn parse_field(kind: FieldKind, raw: &str) -> Option<FieldValue> {
    match kind {
        FieldKind::Text => Some(FieldValue::Text(raw.to_string())),
        FieldKind::Float => raw
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(FieldValue::Float),
        FieldKind::Flag => match raw {
            "true" | "1" => Some(FieldValue::Flag(true)),
            "false" | "0" => Some(FieldValue::Flag(false)),
            _ => None,
        },
    }
}

pub fn encode_field(value: &FieldValue) -> String {
    match value {
        FieldValue::Text(s) => s.clone(),
        FieldValue::Float(v) => v.to_string(),
        FieldValue::Flag(b) => if *b { "true" } else { "false" }.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{Field, FieldKind, FieldValue, encode_field, parse_field};

    #[test]
    fn clear_removes_the_value() {
        let mut slot = Some(3.5f64);
        Field::<f64>::Clear.apply_to(&mut slot);
        assert_eq!(slot, None);
    }

    #[test]
    fn keep_leaves_the_value() {
        let mut slot = Some("x".to_string());
        Field::<String>::Keep.apply_to(&mut slot);
        assert_eq!(slot.as_deref(), Some("x"));
    }

    #[test]
    fn float_parse_rejects_nan_and_garbage() {
        assert_eq!(parse_field(FieldKind::Float, "NaN"), None);
        assert_eq!(parse_field(FieldKind::Float, "inf"), None);
        assert_eq!(parse_field(FieldKind::Float, "12abc"), None);
        assert_eq!(
            parse_field(FieldKind::Float, "12.5"),
            Some(FieldValue::Float(12.5))
        );
    }

    #[test]
    fn flag_parse_accepts_both_spellings() {
        assert_eq!(parse_field(FieldKind::Flag, "1"), Some(FieldValue::Flag(true)));
        assert_eq!(
            parse_field(FieldKind::Flag, "false"),
            Some(FieldValue::Flag(false))
        );
        assert_eq!(parse_field(FieldKind::Flag, "yes"), None);
    }

    #[test]
    fn float_round_trips_through_encode() {
        let v = FieldValue::Float(42.0);
        assert_eq!(
            parse_field(FieldKind::Float, &encode_field(&v)),
            Some(FieldValue::Float(42.0))
        );
    }
}
