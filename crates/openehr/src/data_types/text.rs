//! Text-like data values: `DV_TEXT`, `DV_CODED_TEXT` and `CODE_PHRASE`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// RM `TERMINOLOGY_ID` (simplified to its `value`).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(deny_unknown_fields)]
pub struct TerminologyId {
    pub value: String,
}

impl TerminologyId {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// RM `CODE_PHRASE`: a code string qualified by the terminology it belongs to.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(deny_unknown_fields)]
pub struct CodePhrase {
    pub terminology_id: TerminologyId,
    pub code_string: String,
}

impl CodePhrase {
    pub fn new(terminology_id: impl Into<String>, code_string: impl Into<String>) -> Self {
        Self {
            terminology_id: TerminologyId::new(terminology_id),
            code_string: code_string.into(),
        }
    }
}

impl fmt::Display for CodePhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.terminology_id.value, self.code_string)
    }
}

/// Simplified representation of the openEHR `DV_TEXT` data type.
///
/// Only the `value` field is implemented; language, encoding, hyperlink, mappings and
/// formatting are not carried.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct DvText {
    /// The plain text content.
    pub value: String,
}

impl DvText {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

/// RM `DV_CODED_TEXT`: text whose meaning is fixed by a terminology code.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct DvCodedText {
    pub value: String,
    pub defining_code: CodePhrase,
}

impl DvCodedText {
    pub fn new(value: impl Into<String>, defining_code: CodePhrase) -> Self {
        Self {
            value: value.into(),
            defining_code,
        }
    }
}

/// A node name: either plain or coded text.
///
/// On the wire a coded name is recognised by the presence of `defining_code`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum TextValue {
    Coded(DvCodedText),
    Plain(DvText),
}

impl TextValue {
    pub fn plain(value: impl Into<String>) -> Self {
        TextValue::Plain(DvText::new(value))
    }

    pub fn coded(value: impl Into<String>, defining_code: CodePhrase) -> Self {
        TextValue::Coded(DvCodedText::new(value, defining_code))
    }

    /// The human-readable text, whether plain or coded.
    pub fn value(&self) -> &str {
        match self {
            TextValue::Plain(text) => &text.value,
            TextValue::Coded(coded) => &coded.value,
        }
    }

    pub fn defining_code(&self) -> Option<&CodePhrase> {
        match self {
            TextValue::Plain(_) => None,
            TextValue::Coded(coded) => Some(&coded.defining_code),
        }
    }

    pub fn rm_type_name(&self) -> &'static str {
        match self {
            TextValue::Plain(_) => "DV_TEXT",
            TextValue::Coded(_) => "DV_CODED_TEXT",
        }
    }
}

impl fmt::Display for TextValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}

impl From<&str> for TextValue {
    fn from(value: &str) -> Self {
        TextValue::plain(value)
    }
}

impl From<String> for TextValue {
    fn from(value: String) -> Self {
        TextValue::plain(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coded_names_are_recognised_on_the_wire() {
        let yaml = "value: Systolic\ndefining_code:\n  terminology_id:\n    value: local\n  code_string: at0004\n";
        let name: TextValue = serde_yaml::from_str(yaml).expect("parse coded name");
        assert_eq!(name.value(), "Systolic");
        assert_eq!(name.rm_type_name(), "DV_CODED_TEXT");
        assert_eq!(
            name.defining_code().map(ToString::to_string).as_deref(),
            Some("local::at0004")
        );

        let plain: TextValue = serde_yaml::from_str("value: Vitals\n").expect("parse plain name");
        assert_eq!(plain, TextValue::plain("Vitals"));
    }
}
