//! Domain-type constraints: coded phrases, ordinals, quantities and states.

use super::validate::{ValidationContext, ValidationErrorKind};
use crate::data_types::{CodePhrase, DataValue, DvCodedText, DvOrdinal, DvQuantity, DvState};
use crate::rm::RmValue;
use crate::{OpenEhrError, OpenEhrResult};
use openehr_types::Interval;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Constraint on a `CODE_PHRASE`.
///
/// `any_allowed` is stored rather than derived so that a definition claiming "any code" while
/// also naming a terminology is representable, and rejected by [`CCodePhrase::is_valid`].
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CCodePhrase {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrences: Option<Interval<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terminology_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_list: Option<Vec<String>>,
    #[serde(default)]
    pub any_allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assumed_value: Option<CodePhrase>,
}

impl CCodePhrase {
    /// A constraint admitting every code of every terminology.
    pub fn any() -> Self {
        Self {
            node_id: None,
            occurrences: None,
            terminology_id: None,
            code_list: None,
            any_allowed: true,
            assumed_value: None,
        }
    }

    /// A constraint admitting the listed codes of one terminology.
    pub fn codes<I, S>(terminology_id: impl Into<String>, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            terminology_id: Some(terminology_id.into()),
            code_list: Some(codes.into_iter().map(Into::into).collect()),
            any_allowed: false,
            ..Self::any()
        }
    }

    pub fn is_valid(&self) -> bool {
        let unset = self.terminology_id.is_none() && self.code_list.is_none();
        if self.any_allowed != unset {
            return false;
        }
        if self.code_list.as_ref().is_some_and(|codes| codes.is_empty()) {
            return false;
        }
        self.assumed_value
            .as_ref()
            .map_or(true, |code| self.admits(code).is_ok())
    }

    pub fn any_allowed(&self) -> bool {
        self.any_allowed
    }

    fn admits(&self, code: &CodePhrase) -> Result<(), (ValidationErrorKind, String)> {
        if self.any_allowed {
            return Ok(());
        }
        if let Some(terminology) = &self.terminology_id {
            if &code.terminology_id.value != terminology {
                return Err((
                    ValidationErrorKind::TerminologyMismatch,
                    format!(
                        "terminology '{}' is not '{}'",
                        code.terminology_id.value, terminology
                    ),
                ));
            }
        }
        if let Some(codes) = &self.code_list {
            if !codes.iter().any(|c| c == &code.code_string) {
                return Err((
                    ValidationErrorKind::CodeNotInList,
                    format!("code '{}' is not in [{}]", code, codes.join(", ")),
                ));
            }
        }
        Ok(())
    }

    /// Checks a code phrase, or the defining code of a coded text.
    pub fn valid_value(&self, ctx: &mut ValidationContext<'_>, value: &RmValue, path: &str) -> bool {
        let code = match value {
            RmValue::CodePhrase(code) => code,
            RmValue::Data(DataValue::CodedText(coded)) => &coded.defining_code,
            other => {
                ctx.record(
                    ValidationErrorKind::TypeMismatch,
                    path,
                    format!("expected CODE_PHRASE, found {}", other.rm_type_name()),
                );
                return false;
            }
        };
        match self.admits(code) {
            Ok(()) => true,
            Err((kind, message)) => {
                ctx.record(kind, path, message);
                false
            }
        }
    }

    pub fn default_value(&self) -> OpenEhrResult<RmValue> {
        if let Some(assumed) = &self.assumed_value {
            return Ok(RmValue::CodePhrase(assumed.clone()));
        }
        let first = self.code_list.as_ref().and_then(|codes| codes.first());
        match first {
            Some(code) => Ok(RmValue::CodePhrase(CodePhrase::new(
                self.terminology_id.as_deref().unwrap_or("local"),
                code.as_str(),
            ))),
            None => Err(OpenEhrError::NoDefaultValue(
                "C_CODE_PHRASE without codes".into(),
            )),
        }
    }
}

/// Constraint on a `DV_ORDINAL`: the allowed (rank, symbol) pairs.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CDvOrdinal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrences: Option<Interval<u32>>,
    pub list: Vec<DvOrdinal>,
}

impl CDvOrdinal {
    pub fn is_valid(&self) -> bool {
        let mut ranks = HashSet::new();
        !self.list.is_empty() && self.list.iter().all(|o| ranks.insert(o.value))
    }

    pub fn valid_value(&self, ctx: &mut ValidationContext<'_>, value: &RmValue, path: &str) -> bool {
        let RmValue::Data(DataValue::Ordinal(ordinal)) = value else {
            ctx.record(
                ValidationErrorKind::TypeMismatch,
                path,
                format!("expected DV_ORDINAL, found {}", value.rm_type_name()),
            );
            return false;
        };
        let listed = self.list.iter().any(|allowed| {
            allowed.value == ordinal.value
                && allowed.symbol.defining_code == ordinal.symbol.defining_code
        });
        if !listed {
            ctx.record(
                ValidationErrorKind::OrdinalNotInList,
                path,
                format!(
                    "{}|{}| is not an allowed ordinal",
                    ordinal.value, ordinal.symbol.defining_code
                ),
            );
        }
        listed
    }

    pub fn default_value(&self) -> OpenEhrResult<RmValue> {
        self.list
            .first()
            .map(|o| RmValue::Data(DataValue::Ordinal(o.clone())))
            .ok_or_else(|| OpenEhrError::NoDefaultValue("C_DV_ORDINAL without items".into()))
    }
}

/// One admissible unit of a quantity, with optional magnitude and precision bounds.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CQuantityItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub magnitude: Option<Interval<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<Interval<i64>>,
    pub units: String,
}

impl CQuantityItem {
    fn admits(&self, quantity: &DvQuantity) -> bool {
        self.units == quantity.units
            && self
                .magnitude
                .as_ref()
                .map_or(true, |m| m.has(&quantity.magnitude))
            && self.precision.as_ref().map_or(true, |p| {
                p.has(&quantity.precision.unwrap_or_else(|| quantity.decimal_places()))
            })
    }
}

/// Constraint on a `DV_QUANTITY`: an optional property and a list of unit alternatives.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CDvQuantity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrences: Option<Interval<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<CodePhrase>,
    #[serde(default)]
    pub list: Vec<CQuantityItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assumed_value: Option<DvQuantity>,
}

impl CDvQuantity {
    pub fn is_valid(&self) -> bool {
        self.list.iter().all(|item| !item.units.trim().is_empty())
            && self
                .assumed_value
                .as_ref()
                .map_or(true, |q| self.list.is_empty() || self.list.iter().any(|i| i.admits(q)))
    }

    pub fn any_allowed(&self) -> bool {
        self.property.is_none() && self.list.is_empty()
    }

    pub fn valid_value(&self, ctx: &mut ValidationContext<'_>, value: &RmValue, path: &str) -> bool {
        let RmValue::Data(DataValue::Quantity(quantity)) = value else {
            ctx.record(
                ValidationErrorKind::TypeMismatch,
                path,
                format!("expected DV_QUANTITY, found {}", value.rm_type_name()),
            );
            return false;
        };
        if self.list.is_empty() || self.list.iter().any(|item| item.admits(quantity)) {
            return true;
        }
        ctx.record(
            ValidationErrorKind::QuantityMismatch,
            path,
            format!(
                "{} {} matches none of the allowed units and ranges",
                quantity.magnitude, quantity.units
            ),
        );
        false
    }

    pub fn default_value(&self) -> OpenEhrResult<RmValue> {
        if let Some(assumed) = &self.assumed_value {
            return Ok(RmValue::Data(DataValue::Quantity(assumed.clone())));
        }
        let quantity = match self.list.first() {
            Some(item) => {
                let magnitude = item
                    .magnitude
                    .as_ref()
                    .and_then(|m| m.lower().copied())
                    .unwrap_or(0.0);
                DvQuantity::new(magnitude, item.units.clone())
            }
            None => DvQuantity::new(0.0, ""),
        };
        Ok(RmValue::Data(DataValue::Quantity(quantity)))
    }
}

/// One state a `DV_STATE` may take.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CState {
    pub value: DvCodedText,
    #[serde(default)]
    pub is_terminal: bool,
}

/// Constraint on a `DV_STATE`: the states of a simple state machine.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CDvState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrences: Option<Interval<u32>>,
    pub states: Vec<CState>,
}

impl CDvState {
    pub fn is_valid(&self) -> bool {
        !self.states.is_empty()
    }

    pub fn valid_value(&self, ctx: &mut ValidationContext<'_>, value: &RmValue, path: &str) -> bool {
        let RmValue::Data(DataValue::State(state)) = value else {
            ctx.record(
                ValidationErrorKind::TypeMismatch,
                path,
                format!("expected DV_STATE, found {}", value.rm_type_name()),
            );
            return false;
        };
        let allowed = self.states.iter().any(|s| {
            s.value.defining_code == state.value.defining_code && s.is_terminal == state.is_terminal
        });
        if !allowed {
            ctx.record(
                ValidationErrorKind::StateNotAllowed,
                path,
                format!("state {} is not allowed", state.value.defining_code),
            );
        }
        allowed
    }

    pub fn default_value(&self) -> OpenEhrResult<RmValue> {
        self.states
            .first()
            .map(|s| {
                RmValue::Data(DataValue::State(DvState {
                    value: s.value.clone(),
                    is_terminal: s.is_terminal,
                }))
            })
            .ok_or_else(|| OpenEhrError::NoDefaultValue("C_DV_STATE without states".into()))
    }
}

/// A constraint on one of the domain types.
#[derive(Clone, Debug, PartialEq)]
pub enum CDomainObject {
    CodePhrase(CCodePhrase),
    Ordinal(CDvOrdinal),
    Quantity(CDvQuantity),
    State(CDvState),
}

impl CDomainObject {
    pub fn rm_type_name(&self) -> &'static str {
        match self {
            CDomainObject::CodePhrase(_) => "CODE_PHRASE",
            CDomainObject::Ordinal(_) => "DV_ORDINAL",
            CDomainObject::Quantity(_) => "DV_QUANTITY",
            CDomainObject::State(_) => "DV_STATE",
        }
    }

    pub fn node_id(&self) -> Option<&str> {
        match self {
            CDomainObject::CodePhrase(c) => c.node_id.as_deref(),
            CDomainObject::Ordinal(c) => c.node_id.as_deref(),
            CDomainObject::Quantity(c) => c.node_id.as_deref(),
            CDomainObject::State(c) => c.node_id.as_deref(),
        }
    }

    pub fn occurrences(&self) -> Option<&Interval<u32>> {
        match self {
            CDomainObject::CodePhrase(c) => c.occurrences.as_ref(),
            CDomainObject::Ordinal(c) => c.occurrences.as_ref(),
            CDomainObject::Quantity(c) => c.occurrences.as_ref(),
            CDomainObject::State(c) => c.occurrences.as_ref(),
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            CDomainObject::CodePhrase(c) => c.is_valid(),
            CDomainObject::Ordinal(c) => c.is_valid(),
            CDomainObject::Quantity(c) => c.is_valid(),
            CDomainObject::State(c) => c.is_valid(),
        }
    }

    pub fn any_allowed(&self) -> bool {
        match self {
            CDomainObject::CodePhrase(c) => c.any_allowed(),
            CDomainObject::Quantity(c) => c.any_allowed(),
            CDomainObject::Ordinal(_) | CDomainObject::State(_) => false,
        }
    }

    pub fn valid_value(&self, ctx: &mut ValidationContext<'_>, value: &RmValue, path: &str) -> bool {
        match self {
            CDomainObject::CodePhrase(c) => c.valid_value(ctx, value, path),
            CDomainObject::Ordinal(c) => c.valid_value(ctx, value, path),
            CDomainObject::Quantity(c) => c.valid_value(ctx, value, path),
            CDomainObject::State(c) => c.valid_value(ctx, value, path),
        }
    }

    pub fn default_value(&self) -> OpenEhrResult<RmValue> {
        match self {
            CDomainObject::CodePhrase(c) => c.default_value(),
            CDomainObject::Ordinal(c) => c.default_value(),
            CDomainObject::Quantity(c) => c.default_value(),
            CDomainObject::State(c) => c.default_value(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rm::RmTree;

    #[test]
    fn any_allowed_excludes_a_terminology() {
        assert!(CCodePhrase::any().is_valid());
        assert!(CCodePhrase::codes("local", ["at0003"]).is_valid());

        let mut both = CCodePhrase::any();
        both.terminology_id = Some("SNOMED-CT".into());
        assert!(both.any_allowed());
        assert!(!both.is_valid());

        let mut neither = CCodePhrase::codes("local", ["at0003"]);
        neither.terminology_id = None;
        neither.code_list = None;
        assert!(!neither.is_valid());

        let empty = CCodePhrase::codes("local", Vec::<String>::new());
        assert!(!empty.is_valid());
    }

    #[test]
    fn code_phrases_are_checked_by_terminology_then_code() {
        let tree = RmTree::new();
        let mut ctx = ValidationContext::new(&tree);
        let constraint = CCodePhrase::codes("local", ["at0003", "at0004"]);

        assert!(constraint.valid_value(
            &mut ctx,
            &RmValue::CodePhrase(CodePhrase::new("local", "at0004")),
            "/defining_code"
        ));
        let coded = DvCodedText::new("Sitting", CodePhrase::new("SNOMED-CT", "33586001"));
        assert!(!constraint.valid_value(
            &mut ctx,
            &RmValue::Data(DataValue::CodedText(coded)),
            "/defining_code"
        ));
        assert!(!constraint.valid_value(
            &mut ctx,
            &RmValue::CodePhrase(CodePhrase::new("local", "at0009")),
            "/defining_code"
        ));

        let report = ctx.into_report();
        assert_eq!(report.len(), 2);
        assert_eq!(report.errors()[0].kind, ValidationErrorKind::TerminologyMismatch);
        assert_eq!(report.errors()[1].kind, ValidationErrorKind::CodeNotInList);
    }

    #[test]
    fn quantities_match_any_unit_alternative() {
        let tree = RmTree::new();
        let mut ctx = ValidationContext::new(&tree);
        let constraint = CDvQuantity {
            node_id: None,
            occurrences: None,
            property: Some(CodePhrase::new("openehr", "125")),
            list: vec![
                CQuantityItem {
                    magnitude: Some(Interval::closed(0.0, 1000.0).unwrap()),
                    precision: Some(Interval::closed(0, 0).unwrap()),
                    units: "mm[Hg]".into(),
                },
                CQuantityItem {
                    magnitude: None,
                    precision: None,
                    units: "kPa".into(),
                },
            ],
            assumed_value: None,
        };
        assert!(constraint.is_valid());
        let quantity = |m: f64, u: &str| RmValue::Data(DataValue::Quantity(DvQuantity::new(m, u)));

        assert!(constraint.valid_value(&mut ctx, &quantity(120.0, "mm[Hg]"), "/value"));
        assert!(constraint.valid_value(&mut ctx, &quantity(16.1, "kPa"), "/value"));
        assert!(!constraint.valid_value(&mut ctx, &quantity(120.5, "mm[Hg]"), "/value"));
        assert!(!constraint.valid_value(&mut ctx, &quantity(120.0, "Cel"), "/value"));
        assert_eq!(ctx.error_count(), 2);
        assert_eq!(
            constraint.default_value().unwrap(),
            quantity(0.0, "mm[Hg]")
        );
    }

    #[test]
    fn ordinals_and_states_come_from_their_lists() {
        let tree = RmTree::new();
        let mut ctx = ValidationContext::new(&tree);
        let mild = DvOrdinal {
            value: 1,
            symbol: DvCodedText::new("Mild", CodePhrase::new("local", "at0010")),
        };
        let ordinals = CDomainObject::Ordinal(CDvOrdinal {
            node_id: None,
            occurrences: None,
            list: vec![mild.clone()],
        });
        assert!(ordinals.is_valid());
        assert!(ordinals.valid_value(
            &mut ctx,
            &RmValue::Data(DataValue::Ordinal(mild.clone())),
            "/value"
        ));
        let severe = DvOrdinal {
            value: 3,
            symbol: DvCodedText::new("Severe", CodePhrase::new("local", "at0012")),
        };
        assert!(!ordinals.valid_value(&mut ctx, &RmValue::Data(DataValue::Ordinal(severe)), "/value"));
        assert_eq!(
            ordinals.default_value().unwrap(),
            RmValue::Data(DataValue::Ordinal(mild))
        );

        let states = CDomainObject::State(CDvState {
            node_id: None,
            occurrences: None,
            states: Vec::new(),
        });
        assert!(!states.is_valid());
        assert!(matches!(
            states.default_value(),
            Err(OpenEhrError::NoDefaultValue(_))
        ));
        assert_eq!(ctx.errors()[0].kind, ValidationErrorKind::OrdinalNotInList);
    }
}
