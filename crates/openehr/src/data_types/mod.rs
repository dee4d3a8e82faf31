//! openEHR RM data types.
//!
//! Reference-model values that appear as leaves of an instance tree (`ELEMENT.value`,
//! `COMPOSITION.category`, `HISTORY.origin`, ...) and as operands of assertions. Every value
//! kind has a canonical textual form, which is what assertion coercions parse.
//!
//! Key types:
//! - [`DataValue`]: the closed set of `DV_*` kinds, tagged with `_type` on the wire.
//! - [`TextValue`]: a node name, plain or coded.
//! - [`ArchetypeId`] and [`HierObjectId`]: identifiers.
//! - [`Iso8601DateTime`], [`Iso8601Duration`] and friends: comparable temporal values.

mod identifiers;
mod quantity;
mod temporal;
mod text;

pub use identifiers::{ArchetypeId, HierObjectId};
pub use quantity::{DvCount, DvOrdinal, DvQuantity};
pub use temporal::{Iso8601Date, Iso8601DateTime, Iso8601Duration, Iso8601Time};
pub use text::{CodePhrase, DvCodedText, DvText, TerminologyId, TextValue};

use serde::{Deserialize, Serialize};

/// RM `DV_BOOLEAN`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct DvBoolean {
    pub value: bool,
}

/// RM `DV_IDENTIFIER`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct DvIdentifier {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigner: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_: Option<String>,
}

/// RM `DV_URI`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct DvUri {
    pub value: String,
}

/// RM `DV_STATE`: a coded state in a state machine, possibly terminal.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct DvState {
    pub value: DvCodedText,
    #[serde(default)]
    pub is_terminal: bool,
}

/// RM `DV_DATE`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct DvDate {
    pub value: Iso8601Date,
}

/// RM `DV_TIME`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct DvTime {
    pub value: Iso8601Time,
}

/// RM `DV_DATE_TIME`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct DvDateTime {
    pub value: Iso8601DateTime,
}

impl DvDateTime {
    pub fn now() -> Self {
        Self {
            value: Iso8601DateTime::now(),
        }
    }
}

/// RM `DV_DURATION`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct DvDuration {
    pub value: Iso8601Duration,
}

/// The closed set of data value kinds carried by an instance tree.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(tag = "_type")]
pub enum DataValue {
    #[serde(rename = "DV_BOOLEAN")]
    Boolean(DvBoolean),
    #[serde(rename = "DV_TEXT")]
    Text(DvText),
    #[serde(rename = "DV_CODED_TEXT")]
    CodedText(DvCodedText),
    #[serde(rename = "DV_QUANTITY")]
    Quantity(DvQuantity),
    #[serde(rename = "DV_COUNT")]
    Count(DvCount),
    #[serde(rename = "DV_ORDINAL")]
    Ordinal(DvOrdinal),
    #[serde(rename = "DV_DATE")]
    Date(DvDate),
    #[serde(rename = "DV_TIME")]
    Time(DvTime),
    #[serde(rename = "DV_DATE_TIME")]
    DateTime(DvDateTime),
    #[serde(rename = "DV_DURATION")]
    Duration(DvDuration),
    #[serde(rename = "DV_IDENTIFIER")]
    Identifier(DvIdentifier),
    #[serde(rename = "DV_URI")]
    Uri(DvUri),
    #[serde(rename = "DV_STATE")]
    State(DvState),
}

impl DataValue {
    pub fn rm_type_name(&self) -> &'static str {
        match self {
            DataValue::Boolean(_) => "DV_BOOLEAN",
            DataValue::Text(_) => "DV_TEXT",
            DataValue::CodedText(_) => "DV_CODED_TEXT",
            DataValue::Quantity(_) => "DV_QUANTITY",
            DataValue::Count(_) => "DV_COUNT",
            DataValue::Ordinal(_) => "DV_ORDINAL",
            DataValue::Date(_) => "DV_DATE",
            DataValue::Time(_) => "DV_TIME",
            DataValue::DateTime(_) => "DV_DATE_TIME",
            DataValue::Duration(_) => "DV_DURATION",
            DataValue::Identifier(_) => "DV_IDENTIFIER",
            DataValue::Uri(_) => "DV_URI",
            DataValue::State(_) => "DV_STATE",
        }
    }

    /// The canonical textual form of the value, as used by assertion coercions.
    pub fn canonical_text(&self) -> String {
        match self {
            DataValue::Boolean(b) => b.value.to_string(),
            DataValue::Text(t) => t.value.clone(),
            DataValue::CodedText(c) => c.value.clone(),
            DataValue::Quantity(q) => q.magnitude.to_string(),
            DataValue::Count(c) => c.magnitude.to_string(),
            DataValue::Ordinal(o) => o.value.to_string(),
            DataValue::Date(d) => d.value.to_string(),
            DataValue::Time(t) => t.value.to_string(),
            DataValue::DateTime(dt) => dt.value.to_string(),
            DataValue::Duration(d) => d.value.to_string(),
            DataValue::Identifier(i) => i.id.clone(),
            DataValue::Uri(u) => u.value.clone(),
            DataValue::State(s) => s.value.value.clone(),
        }
    }
}

impl From<TextValue> for DataValue {
    fn from(value: TextValue) -> Self {
        match value {
            TextValue::Plain(text) => DataValue::Text(text),
            TextValue::Coded(coded) => DataValue::CodedText(coded),
        }
    }
}
