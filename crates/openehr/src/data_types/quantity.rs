//! Quantified data values: `DV_QUANTITY`, `DV_COUNT` and `DV_ORDINAL`.

use super::text::DvCodedText;
use serde::{Deserialize, Serialize};

/// RM `DV_QUANTITY`: a magnitude in UCUM units.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct DvQuantity {
    pub magnitude: f64,
    pub units: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<i64>,
}

impl DvQuantity {
    pub fn new(magnitude: f64, units: impl Into<String>) -> Self {
        Self {
            magnitude,
            units: units.into(),
            precision: None,
        }
    }

    /// Number of decimal places actually used by the magnitude.
    pub fn decimal_places(&self) -> i64 {
        let text = self.magnitude.to_string();
        text.split_once('.')
            .map(|(_, fraction)| fraction.len() as i64)
            .unwrap_or(0)
    }
}

/// RM `DV_COUNT`: a whole-number count.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct DvCount {
    pub magnitude: i64,
}

/// RM `DV_ORDINAL`: a coded symbol with an ordinal rank.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct DvOrdinal {
    pub value: i64,
    pub symbol: DvCodedText,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_decimal_places_of_magnitude() {
        assert_eq!(DvQuantity::new(120.0, "mm[Hg]").decimal_places(), 0);
        assert_eq!(DvQuantity::new(36.65, "Cel").decimal_places(), 2);
    }
}
