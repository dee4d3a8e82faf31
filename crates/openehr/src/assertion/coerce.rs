//! Operand coercions.
//!
//! Operands are coerced through their textual form. A value that does not parse as the
//! requested kind is an error, never a silent default.

use super::evaluator::EvalValue;
use crate::data_types::{Iso8601DateTime, Iso8601Duration, Iso8601Time};
use crate::rm::{RmItem, RmValue};
use crate::{OpenEhrError, OpenEhrResult};

/// The coercion selected by an expression's type name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeFamily {
    String,
    Integer,
    Real,
    Boolean,
    DateTime,
    Duration,
    Time,
    /// Any other type; compared by text for equality only.
    Other,
}

impl TypeFamily {
    pub fn of(type_name: &str) -> Self {
        match type_name.trim().to_ascii_lowercase().as_str() {
            "string" => TypeFamily::String,
            "integer" | "integer64" => TypeFamily::Integer,
            "double" | "real" | "float" => TypeFamily::Real,
            "boolean" => TypeFamily::Boolean,
            "dv_date_time" | "date_time" | "iso8601_date_time" | "dv_date" | "date"
            | "iso8601_date" => TypeFamily::DateTime,
            "dv_duration" | "duration" | "iso8601_duration" => TypeFamily::Duration,
            "dv_time" | "time" | "iso8601_time" => TypeFamily::Time,
            _ => TypeFamily::Other,
        }
    }
}

/// The temporal family a string literal looks like, if any.
pub(crate) fn sniff_temporal(text: &str) -> Option<TypeFamily> {
    let text = text.trim();
    if text.trim_start_matches('-').starts_with('P') && Iso8601Duration::parse(text).is_ok() {
        Some(TypeFamily::Duration)
    } else if text.contains('-') && Iso8601DateTime::parse(text).is_ok() {
        Some(TypeFamily::DateTime)
    } else if text.contains(':') && Iso8601Time::parse(text).is_ok() {
        Some(TypeFamily::Time)
    } else {
        None
    }
}

fn value_text(value: &RmValue) -> Option<String> {
    match value {
        RmValue::Boolean(b) => Some(b.to_string()),
        RmValue::Integer(i) => Some(i.to_string()),
        RmValue::Real(r) => Some(r.to_string()),
        RmValue::String(s) => Some(s.clone()),
        RmValue::CodePhrase(code) => Some(code.code_string.clone()),
        RmValue::ObjectId { value, .. } => Some(value.clone()),
        RmValue::Data(data) => Some(data.canonical_text()),
        RmValue::Party(party) => party.name.clone(),
        RmValue::Context(_) | RmValue::IsmTransition(_) | RmValue::Archetyped(_) => None,
    }
}

/// The textual form of an operand; `None` for absent operands and nodes.
pub(crate) fn text_of(value: &EvalValue) -> Option<String> {
    match value {
        EvalValue::Absent => None,
        EvalValue::Boolean(b) => Some(b.to_string()),
        EvalValue::Integer(i) => Some(i.to_string()),
        EvalValue::Real(r) => Some(r.to_string()),
        EvalValue::Text(text) => Some(text.clone()),
        EvalValue::Item(RmItem::Value(value)) => value_text(value),
        EvalValue::Item(RmItem::Node(_)) => None,
        EvalValue::List(items) => match items.as_slice() {
            [only] => text_of(only),
            _ => None,
        },
    }
}

fn required_text(value: &EvalValue, kind: &str) -> OpenEhrResult<String> {
    text_of(value).ok_or_else(|| OpenEhrError::invalid_value(kind, format!("{value:?}")))
}

pub(crate) fn to_int(value: &EvalValue) -> OpenEhrResult<i64> {
    const KIND: &str = "integer";
    if let EvalValue::Integer(i) = value {
        return Ok(*i);
    }
    let text = required_text(value, KIND)?;
    text.trim()
        .parse::<i64>()
        .map_err(|_| OpenEhrError::invalid_value(KIND, text))
}

pub(crate) fn to_double(value: &EvalValue) -> OpenEhrResult<f64> {
    const KIND: &str = "double";
    match value {
        EvalValue::Real(r) => return Ok(*r),
        EvalValue::Integer(i) => return Ok(*i as f64),
        _ => {}
    }
    let text = required_text(value, KIND)?;
    text.trim()
        .parse::<f64>()
        .map_err(|_| OpenEhrError::invalid_value(KIND, text))
}

/// Absent operands are `false`.
pub(crate) fn to_boolean(value: &EvalValue) -> OpenEhrResult<bool> {
    const KIND: &str = "boolean";
    match value {
        EvalValue::Absent => return Ok(false),
        EvalValue::Boolean(b) => return Ok(*b),
        _ => {}
    }
    let text = required_text(value, KIND)?;
    match text.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(OpenEhrError::invalid_value(KIND, text)),
    }
}

pub(crate) fn to_date_time(value: &EvalValue) -> OpenEhrResult<Iso8601DateTime> {
    Iso8601DateTime::parse(&required_text(value, "ISO8601 date-time")?)
}

pub(crate) fn to_duration(value: &EvalValue) -> OpenEhrResult<Iso8601Duration> {
    Iso8601Duration::parse(&required_text(value, "ISO8601 duration")?)
}

pub(crate) fn to_time(value: &EvalValue) -> OpenEhrResult<Iso8601Time> {
    Iso8601Time::parse(&required_text(value, "ISO8601 time")?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::{DataValue, DvCount};

    #[test]
    fn type_names_map_to_families() {
        assert_eq!(TypeFamily::of("String"), TypeFamily::String);
        assert_eq!(TypeFamily::of("DV_DATE_TIME"), TypeFamily::DateTime);
        assert_eq!(TypeFamily::of("iso8601_duration"), TypeFamily::Duration);
        assert_eq!(TypeFamily::of("Float"), TypeFamily::Real);
        assert_eq!(TypeFamily::of("DV_QUANTITY"), TypeFamily::Other);
    }

    #[test]
    fn coercions_parse_text_and_reject_garbage() {
        let count = EvalValue::Item(RmItem::Value(RmValue::Data(DataValue::Count(DvCount {
            magnitude: 3,
        }))));
        assert_eq!(to_int(&count).unwrap(), 3);
        assert_eq!(to_double(&EvalValue::Text("2.5".into())).unwrap(), 2.5);
        assert!(to_boolean(&EvalValue::Text("TRUE".into())).unwrap());
        assert!(!to_boolean(&EvalValue::Absent).unwrap());

        assert!(matches!(
            to_int(&EvalValue::Text("three".into())),
            Err(OpenEhrError::InvalidValue { kind, .. }) if kind == "integer"
        ));
        assert!(matches!(
            to_boolean(&EvalValue::Integer(1)),
            Err(OpenEhrError::InvalidValue { .. })
        ));
    }

    #[test]
    fn sniffs_temporal_literals() {
        assert_eq!(sniff_temporal("2024-03-01T10:00:00Z"), Some(TypeFamily::DateTime));
        assert_eq!(sniff_temporal("PT15M"), Some(TypeFamily::Duration));
        assert_eq!(sniff_temporal("10:30"), Some(TypeFamily::Time));
        assert_eq!(sniff_temporal("apple"), None);
    }
}
