//! Constraints on primitive values: booleans, numbers, strings and ISO 8601 temporals.

use crate::data_types::{
    DataValue, Iso8601Date, Iso8601DateTime, Iso8601Duration, Iso8601Time,
};
use super::validate::{ValidationContext, ValidationErrorKind};
use crate::rm::RmValue;
use openehr_types::Interval;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Display;

/// Why a primitive value was rejected.
#[derive(Clone, Debug, PartialEq)]
pub enum PrimitiveFailure {
    /// The value is not of the constrained kind at all.
    Kind { expected: &'static str, actual: String },
    /// The value is of the right kind but outside the constraint.
    Value(String),
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CBoolean {
    #[serde(default = "yes")]
    pub true_valid: bool,
    #[serde(default = "yes")]
    pub false_valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assumed_value: Option<bool>,
}

fn yes() -> bool {
    true
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CInteger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<Vec<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Interval<i64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assumed_value: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CReal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Interval<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assumed_value: Option<f64>,
}

/// String constraint: an explicit list, or a regular expression the whole value must match.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CString {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assumed_value: Option<String>,
}

impl CString {
    fn regex(&self) -> Option<Result<Regex, regex::Error>> {
        self.pattern
            .as_ref()
            .map(|pattern| Regex::new(&format!("^(?:{pattern})$")))
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(
    deny_unknown_fields,
    bound(
        serialize = "T: Serialize + Clone",
        deserialize = "T: Deserialize<'de> + PartialOrd"
    )
)]
pub struct CTemporal<T: PartialOrd> {
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub range: Option<Interval<T>>,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub assumed_value: Option<T>,
}

pub type CDate = CTemporal<Iso8601Date>;
pub type CTime = CTemporal<Iso8601Time>;
pub type CDateTime = CTemporal<Iso8601DateTime>;
pub type CDuration = CTemporal<Iso8601Duration>;

/// A primitive constraint, tagged by its AOM class name on the wire.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "_type")]
pub enum CPrimitive {
    #[serde(rename = "C_BOOLEAN")]
    Boolean(CBoolean),
    #[serde(rename = "C_INTEGER")]
    Integer(CInteger),
    #[serde(rename = "C_REAL")]
    Real(CReal),
    #[serde(rename = "C_STRING")]
    String(CString),
    #[serde(rename = "C_DATE")]
    Date(CDate),
    #[serde(rename = "C_TIME")]
    Time(CTime),
    #[serde(rename = "C_DATE_TIME")]
    DateTime(CDateTime),
    #[serde(rename = "C_DURATION")]
    Duration(CDuration),
}

fn list_ok<T>(list: &Option<Vec<T>>) -> bool {
    list.as_ref().map_or(true, |items| !items.is_empty())
}

fn in_list_and_range<T: PartialOrd + Display>(
    value: &T,
    list: &Option<Vec<T>>,
    range: &Option<Interval<T>>,
) -> Result<(), PrimitiveFailure> {
    if let Some(list) = list {
        if !list.iter().any(|item| item == value) {
            return Err(PrimitiveFailure::Value(format!("{value} is not in the allowed list")));
        }
    }
    if let Some(range) = range {
        if !range.has(value) {
            return Err(PrimitiveFailure::Value(format!("{value} is outside {range}")));
        }
    }
    Ok(())
}

fn temporal_in_range<T: PartialOrd + Display>(
    value: &T,
    constraint: &CTemporal<T>,
) -> Result<(), PrimitiveFailure> {
    in_list_and_range(value, &None, &constraint.range)
}

/// The text of a value that can stand for a primitive.
fn text_of(value: &RmValue) -> Option<&str> {
    match value {
        RmValue::String(text) => Some(text),
        RmValue::ObjectId { value, .. } => Some(value),
        _ => None,
    }
}

impl CPrimitive {
    /// The RM type a conforming value has.
    pub fn rm_type_name(&self) -> &'static str {
        match self {
            CPrimitive::Boolean(_) => "BOOLEAN",
            CPrimitive::Integer(_) => "INTEGER",
            CPrimitive::Real(_) => "REAL",
            CPrimitive::String(_) => "STRING",
            CPrimitive::Date(_) => "ISO8601_DATE",
            CPrimitive::Time(_) => "ISO8601_TIME",
            CPrimitive::DateTime(_) => "ISO8601_DATE_TIME",
            CPrimitive::Duration(_) => "ISO8601_DURATION",
        }
    }

    pub fn is_valid(&self) -> bool {
        let structure = match self {
            CPrimitive::Boolean(c) => c.true_valid || c.false_valid,
            CPrimitive::Integer(c) => list_ok(&c.list),
            CPrimitive::Real(c) => list_ok(&c.list),
            CPrimitive::String(c) => {
                list_ok(&c.list)
                    && !(c.list.is_some() && c.pattern.is_some())
                    && c.regex().map_or(true, |r| r.is_ok())
            }
            CPrimitive::Date(_)
            | CPrimitive::Time(_)
            | CPrimitive::DateTime(_)
            | CPrimitive::Duration(_) => true,
        };
        structure && self.assumed_is_allowed()
    }

    fn assumed_is_allowed(&self) -> bool {
        match self.assumed_value() {
            Some(value) => self.check(&value).is_ok(),
            None => true,
        }
    }

    pub fn any_allowed(&self) -> bool {
        match self {
            CPrimitive::Boolean(c) => c.true_valid && c.false_valid,
            CPrimitive::Integer(c) => c.list.is_none() && c.range.is_none(),
            CPrimitive::Real(c) => c.list.is_none() && c.range.is_none(),
            CPrimitive::String(c) => c.list.is_none() && c.pattern.is_none(),
            CPrimitive::Date(c) => c.range.is_none(),
            CPrimitive::Time(c) => c.range.is_none(),
            CPrimitive::DateTime(c) => c.range.is_none(),
            CPrimitive::Duration(c) => c.range.is_none(),
        }
    }

    fn assumed_value(&self) -> Option<RmValue> {
        match self {
            CPrimitive::Boolean(c) => c.assumed_value.map(RmValue::Boolean),
            CPrimitive::Integer(c) => c.assumed_value.map(RmValue::Integer),
            CPrimitive::Real(c) => c.assumed_value.map(RmValue::Real),
            CPrimitive::String(c) => c.assumed_value.clone().map(RmValue::String),
            CPrimitive::Date(c) => c.assumed_value.as_ref().map(|v| RmValue::String(v.to_string())),
            CPrimitive::Time(c) => c.assumed_value.as_ref().map(|v| RmValue::String(v.to_string())),
            CPrimitive::DateTime(c) => {
                c.assumed_value.as_ref().map(|v| RmValue::String(v.to_string()))
            }
            CPrimitive::Duration(c) => {
                c.assumed_value.as_ref().map(|v| RmValue::String(v.to_string()))
            }
        }
    }

    /// Checks a value against the constraint.
    pub fn check(&self, value: &RmValue) -> Result<(), PrimitiveFailure> {
        let kind_error = || PrimitiveFailure::Kind {
            expected: self.rm_type_name(),
            actual: value.rm_type_name().to_string(),
        };

        match self {
            CPrimitive::Boolean(c) => {
                let b = match value {
                    RmValue::Boolean(b) => *b,
                    RmValue::Data(DataValue::Boolean(b)) => b.value,
                    _ => return Err(kind_error()),
                };
                if (b && !c.true_valid) || (!b && !c.false_valid) {
                    return Err(PrimitiveFailure::Value(format!("{b} is not allowed")));
                }
                Ok(())
            }
            CPrimitive::Integer(c) => {
                let RmValue::Integer(i) = value else {
                    return Err(kind_error());
                };
                in_list_and_range(i, &c.list, &c.range)
            }
            CPrimitive::Real(c) => {
                let r = match value {
                    RmValue::Real(r) => *r,
                    RmValue::Integer(i) => *i as f64,
                    _ => return Err(kind_error()),
                };
                in_list_and_range(&r, &c.list, &c.range)
            }
            CPrimitive::String(c) => {
                let text = text_of(value).ok_or_else(kind_error)?;
                if let Some(list) = &c.list {
                    if !list.iter().any(|item| item == text) {
                        return Err(PrimitiveFailure::Value(format!(
                            "'{text}' is not in the allowed list"
                        )));
                    }
                }
                match c.regex() {
                    Some(Ok(regex)) if !regex.is_match(text) => Err(PrimitiveFailure::Value(
                        format!("'{text}' does not match the pattern"),
                    )),
                    _ => Ok(()),
                }
            }
            CPrimitive::Date(c) => {
                let date = match value {
                    RmValue::Data(DataValue::Date(d)) => d.value.clone(),
                    _ => text_of(value)
                        .and_then(|t| Iso8601Date::parse(t).ok())
                        .ok_or_else(kind_error)?,
                };
                temporal_in_range(&date, c)
            }
            CPrimitive::Time(c) => {
                let time = match value {
                    RmValue::Data(DataValue::Time(t)) => t.value.clone(),
                    _ => text_of(value)
                        .and_then(|t| Iso8601Time::parse(t).ok())
                        .ok_or_else(kind_error)?,
                };
                temporal_in_range(&time, c)
            }
            CPrimitive::DateTime(c) => {
                let date_time = match value {
                    RmValue::Data(DataValue::DateTime(dt)) => dt.value.clone(),
                    _ => text_of(value)
                        .and_then(|t| Iso8601DateTime::parse(t).ok())
                        .ok_or_else(kind_error)?,
                };
                temporal_in_range(&date_time, c)
            }
            CPrimitive::Duration(c) => {
                let duration = match value {
                    RmValue::Data(DataValue::Duration(d)) => d.value.clone(),
                    _ => text_of(value)
                        .and_then(|t| Iso8601Duration::parse(t).ok())
                        .ok_or_else(kind_error)?,
                };
                temporal_in_range(&duration, c)
            }
        }
    }

    /// A value satisfying the constraint: the assumed value, else the first list member, else
    /// the lower bound of the range, else the kind's zero (or the current date/time).
    pub fn default_value(&self) -> RmValue {
        if let Some(assumed) = self.assumed_value() {
            return assumed;
        }
        let lower_text =
            |text: Option<String>, now: fn() -> String| RmValue::String(text.unwrap_or_else(now));

        match self {
            CPrimitive::Boolean(c) => RmValue::Boolean(!c.false_valid),
            CPrimitive::Integer(c) => RmValue::Integer(
                c.list
                    .as_ref()
                    .and_then(|l| l.first().copied())
                    .or_else(|| c.range.as_ref().and_then(|r| r.lower().copied()))
                    .unwrap_or(0),
            ),
            CPrimitive::Real(c) => RmValue::Real(
                c.list
                    .as_ref()
                    .and_then(|l| l.first().copied())
                    .or_else(|| c.range.as_ref().and_then(|r| r.lower().copied()))
                    .unwrap_or(0.0),
            ),
            CPrimitive::String(c) => RmValue::String(
                c.list
                    .as_ref()
                    .and_then(|l| l.first().cloned())
                    .unwrap_or_default(),
            ),
            CPrimitive::Date(c) => lower_text(lower_bound(c), || Iso8601Date::today().to_string()),
            CPrimitive::Time(c) => lower_text(lower_bound(c), || Iso8601Time::now().to_string()),
            CPrimitive::DateTime(c) => {
                lower_text(lower_bound(c), || Iso8601DateTime::now().to_string())
            }
            CPrimitive::Duration(c) => {
                lower_text(lower_bound(c), || Iso8601Duration::zero().to_string())
            }
        }
    }
}

fn lower_bound<T: PartialOrd + Display>(constraint: &CTemporal<T>) -> Option<String> {
    constraint
        .range
        .as_ref()
        .and_then(|r| r.lower())
        .map(ToString::to_string)
}

/// A primitive constraint standing as an object in the constraint tree.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CPrimitiveObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrences: Option<Interval<u32>>,
    pub item: CPrimitive,
}

impl CPrimitiveObject {
    pub fn new(item: CPrimitive) -> Self {
        Self {
            node_id: None,
            occurrences: None,
            item,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.item.is_valid()
    }

    pub fn any_allowed(&self) -> bool {
        self.item.any_allowed()
    }

    pub fn valid_value(&self, ctx: &mut ValidationContext<'_>, value: &RmValue, path: &str) -> bool {
        match self.item.check(value) {
            Ok(()) => true,
            Err(PrimitiveFailure::Kind { expected, actual }) => {
                ctx.record(
                    ValidationErrorKind::TypeMismatch,
                    path,
                    format!("expected {expected}, found {actual}"),
                );
                false
            }
            Err(PrimitiveFailure::Value(message)) => {
                ctx.record(ValidationErrorKind::PrimitiveValue, path, message);
                false
            }
        }
    }

    pub fn default_value(&self) -> RmValue {
        self.item.default_value()
    }
}
