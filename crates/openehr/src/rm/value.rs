//! Items reachable in a tree: nodes and reference-model values.

use super::support::{Archetyped, EventContext, IsmTransition, PartyProxy};
use super::tree::NodeHandle;
use crate::data_types::{
    ArchetypeId, CodePhrase, DataValue, DvCodedText, DvDateTime, DvDuration, DvText,
    Iso8601Date, Iso8601DateTime, Iso8601Duration, Iso8601Time, TerminologyId, TextValue,
};
use crate::{OpenEhrError, OpenEhrResult};

/// Anything a path can resolve to.
#[derive(Clone, Debug, PartialEq)]
pub enum RmItem {
    Node(NodeHandle),
    Value(RmValue),
}

impl RmItem {
    pub fn as_node(&self) -> Option<NodeHandle> {
        match self {
            RmItem::Node(handle) => Some(*handle),
            RmItem::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&RmValue> {
        match self {
            RmItem::Node(_) => None,
            RmItem::Value(value) => Some(value),
        }
    }
}

impl From<NodeHandle> for RmItem {
    fn from(handle: NodeHandle) -> Self {
        RmItem::Node(handle)
    }
}

impl From<RmValue> for RmItem {
    fn from(value: RmValue) -> Self {
        RmItem::Value(value)
    }
}

/// A non-locatable RM value: a primitive, a data value or a support structure.
#[derive(Clone, Debug, PartialEq)]
pub enum RmValue {
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(String),
    CodePhrase(CodePhrase),
    /// An `OBJECT_ID` descendant (`TERMINOLOGY_ID`, `ARCHETYPE_ID`, `HIER_OBJECT_ID`, ...).
    ObjectId {
        rm_type: &'static str,
        value: String,
    },
    Data(DataValue),
    Party(PartyProxy),
    Context(EventContext),
    IsmTransition(IsmTransition),
    Archetyped(Archetyped),
}

impl From<DataValue> for RmValue {
    fn from(value: DataValue) -> Self {
        RmValue::Data(value)
    }
}

impl RmValue {
    pub fn rm_type_name(&self) -> &'static str {
        match self {
            RmValue::Boolean(_) => "BOOLEAN",
            RmValue::Integer(_) => "INTEGER",
            RmValue::Real(_) => "REAL",
            RmValue::String(_) => "STRING",
            RmValue::CodePhrase(_) => "CODE_PHRASE",
            RmValue::ObjectId { rm_type, .. } => *rm_type,
            RmValue::Data(value) => value.rm_type_name(),
            RmValue::Party(party) => party.rm_type_name(),
            RmValue::Context(_) => "EVENT_CONTEXT",
            RmValue::IsmTransition(_) => "ISM_TRANSITION",
            RmValue::Archetyped(_) => "ARCHETYPED",
        }
    }

    pub fn as_data(&self) -> Option<&DataValue> {
        match self {
            RmValue::Data(value) => Some(value),
            _ => None,
        }
    }

    /// Reads a named attribute of the value.
    pub fn attribute(&self, name: &str) -> Option<RmItem> {
        let string = |s: &str| Some(RmItem::Value(RmValue::String(s.to_string())));
        let data = |v: DataValue| Some(RmItem::Value(RmValue::Data(v)));
        let coded = |v: &DvCodedText| data(DataValue::CodedText(v.clone()));

        match (self, name) {
            (RmValue::ObjectId { value, .. }, "value") => string(value),
            (RmValue::CodePhrase(code), "terminology_id") => {
                Some(RmItem::Value(RmValue::ObjectId {
                    rm_type: "TERMINOLOGY_ID",
                    value: code.terminology_id.value.clone(),
                }))
            }
            (RmValue::CodePhrase(code), "code_string") => string(&code.code_string),
            (RmValue::Party(party), "name") => party.name.as_deref().and_then(string),
            (RmValue::Party(party), "external_ref") => party.external_ref.as_ref().map(|id| {
                RmItem::Value(RmValue::ObjectId {
                    rm_type: "HIER_OBJECT_ID",
                    value: id.value.clone(),
                })
            }),
            (RmValue::Context(context), "start_time") => {
                data(DataValue::DateTime(context.start_time.clone()))
            }
            (RmValue::Context(context), "end_time") => context
                .end_time
                .clone()
                .and_then(|t| data(DataValue::DateTime(t))),
            (RmValue::Context(context), "location") => context.location.as_deref().and_then(string),
            (RmValue::Context(context), "setting") => coded(&context.setting),
            (RmValue::Context(context), "health_care_facility") => context
                .health_care_facility
                .clone()
                .map(|party| RmItem::Value(RmValue::Party(party))),
            (RmValue::Context(context), "other_context") => context.other_context.map(RmItem::Node),
            (RmValue::IsmTransition(ism), "current_state") => coded(&ism.current_state),
            (RmValue::IsmTransition(ism), "transition") => ism.transition.as_ref().and_then(coded),
            (RmValue::IsmTransition(ism), "careflow_step") => {
                ism.careflow_step.as_ref().and_then(coded)
            }
            (RmValue::Archetyped(details), "archetype_id") => {
                Some(RmItem::Value(RmValue::ObjectId {
                    rm_type: "ARCHETYPE_ID",
                    value: details.archetype_id.to_string(),
                }))
            }
            (RmValue::Archetyped(details), "template_id") => {
                details.template_id.as_ref().map(|id| {
                    RmItem::Value(RmValue::ObjectId {
                        rm_type: "TEMPLATE_ID",
                        value: id.clone(),
                    })
                })
            }
            (RmValue::Archetyped(details), "rm_version") => string(&details.rm_version),
            (RmValue::Data(value), _) => data_attribute(value, name),
            _ => None,
        }
    }

    /// Writes a named attribute of the value.
    ///
    /// # Errors
    ///
    /// - [`OpenEhrError::UnknownAttribute`] if the value kind has no such settable attribute.
    /// - [`OpenEhrError::InvalidAttributeValue`] if `value` has the wrong kind, or does not
    ///   parse into the attribute's type.
    pub fn set_attribute(&mut self, name: &str, value: RmValue) -> OpenEhrResult<()> {
        let rm_type = self.rm_type_name();
        let actual = value.rm_type_name();
        let mismatch = |expected: &str| OpenEhrError::InvalidAttributeValue {
            rm_type: rm_type.to_string(),
            attribute: name.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        };

        match (self, name) {
            (RmValue::ObjectId { value: slot, .. }, "value") => {
                *slot = value.into_string().ok_or_else(|| mismatch("STRING"))?;
            }
            (RmValue::CodePhrase(code), "terminology_id") => {
                let id = match value {
                    RmValue::ObjectId { value, .. } | RmValue::String(value) => value,
                    _ => return Err(mismatch("TERMINOLOGY_ID")),
                };
                code.terminology_id = TerminologyId::new(id);
            }
            (RmValue::CodePhrase(code), "code_string") => {
                code.code_string = value.into_string().ok_or_else(|| mismatch("STRING"))?;
            }
            (RmValue::Party(party), "name") => {
                party.name = Some(value.into_string().ok_or_else(|| mismatch("STRING"))?);
            }
            (RmValue::Context(context), "start_time") => {
                context.start_time = value.into_date_time().ok_or_else(|| mismatch("DV_DATE_TIME"))?;
            }
            (RmValue::Context(context), "end_time") => {
                context.end_time =
                    Some(value.into_date_time().ok_or_else(|| mismatch("DV_DATE_TIME"))?);
            }
            (RmValue::Context(context), "location") => {
                context.location = Some(value.into_string().ok_or_else(|| mismatch("STRING"))?);
            }
            (RmValue::Context(context), "setting") => {
                context.setting = value.into_coded_text().ok_or_else(|| mismatch("DV_CODED_TEXT"))?;
            }
            (RmValue::IsmTransition(ism), "current_state") => {
                ism.current_state = value.into_coded_text().ok_or_else(|| mismatch("DV_CODED_TEXT"))?;
            }
            (RmValue::IsmTransition(ism), "transition") => {
                ism.transition =
                    Some(value.into_coded_text().ok_or_else(|| mismatch("DV_CODED_TEXT"))?);
            }
            (RmValue::Data(data), _) => set_data_attribute(data, name, value, mismatch)?,
            (_, _) => {
                return Err(OpenEhrError::UnknownAttribute {
                    rm_type: rm_type.to_string(),
                    attribute: name.to_string(),
                })
            }
        }
        Ok(())
    }

    pub(crate) fn into_string(self) -> Option<String> {
        match self {
            RmValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn into_integer(self) -> Option<i64> {
        match self {
            RmValue::Integer(i) => Some(i),
            _ => None,
        }
    }

    pub(crate) fn into_code_phrase(self) -> Option<CodePhrase> {
        match self {
            RmValue::CodePhrase(code) => Some(code),
            _ => None,
        }
    }

    pub(crate) fn into_party(self) -> Option<PartyProxy> {
        match self {
            RmValue::Party(party) => Some(party),
            _ => None,
        }
    }

    pub(crate) fn into_context(self) -> Option<EventContext> {
        match self {
            RmValue::Context(context) => Some(context),
            _ => None,
        }
    }

    pub(crate) fn into_ism_transition(self) -> Option<IsmTransition> {
        match self {
            RmValue::IsmTransition(ism) => Some(ism),
            _ => None,
        }
    }

    pub(crate) fn into_data(self) -> Option<DataValue> {
        match self {
            RmValue::Data(data) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn into_coded_text(self) -> Option<DvCodedText> {
        match self {
            RmValue::Data(DataValue::CodedText(coded)) => Some(coded),
            _ => None,
        }
    }

    /// Plain or coded text; a bare string becomes plain text.
    pub(crate) fn into_text(self) -> Option<TextValue> {
        match self {
            RmValue::Data(DataValue::Text(text)) => Some(TextValue::Plain(text)),
            RmValue::Data(DataValue::CodedText(coded)) => Some(TextValue::Coded(coded)),
            RmValue::String(s) => Some(TextValue::Plain(DvText::new(s))),
            _ => None,
        }
    }

    pub(crate) fn into_date_time(self) -> Option<DvDateTime> {
        match self {
            RmValue::Data(DataValue::DateTime(dt)) => Some(dt),
            RmValue::String(s) => Iso8601DateTime::parse(&s)
                .ok()
                .map(|value| DvDateTime { value }),
            _ => None,
        }
    }

    pub(crate) fn into_duration(self) -> Option<DvDuration> {
        match self {
            RmValue::Data(DataValue::Duration(d)) => Some(d),
            RmValue::String(s) => Iso8601Duration::parse(&s)
                .ok()
                .map(|value| DvDuration { value }),
            _ => None,
        }
    }

    /// An archetype id carried as an object id or a plain string.
    pub(crate) fn as_archetype_id(&self) -> Option<ArchetypeId> {
        match self {
            RmValue::ObjectId { value, .. } | RmValue::String(value) => {
                ArchetypeId::parse(value).ok()
            }
            _ => None,
        }
    }
}

fn data_attribute(value: &DataValue, name: &str) -> Option<RmItem> {
    let item = |v: RmValue| Some(RmItem::Value(v));
    let string = |s: &str| item(RmValue::String(s.to_string()));

    match (value, name) {
        (DataValue::Boolean(b), "value") => item(RmValue::Boolean(b.value)),
        (DataValue::Text(t), "value") => string(&t.value),
        (DataValue::CodedText(c), "value") => string(&c.value),
        (DataValue::CodedText(c), "defining_code") => {
            item(RmValue::CodePhrase(c.defining_code.clone()))
        }
        (DataValue::Quantity(q), "magnitude") => item(RmValue::Real(q.magnitude)),
        (DataValue::Quantity(q), "units") => string(&q.units),
        (DataValue::Quantity(q), "precision") => q.precision.and_then(|p| item(RmValue::Integer(p))),
        (DataValue::Count(c), "magnitude") => item(RmValue::Integer(c.magnitude)),
        (DataValue::Ordinal(o), "value") => item(RmValue::Integer(o.value)),
        (DataValue::Ordinal(o), "symbol") => {
            item(RmValue::Data(DataValue::CodedText(o.symbol.clone())))
        }
        (DataValue::Date(_), "value")
        | (DataValue::Time(_), "value")
        | (DataValue::DateTime(_), "value")
        | (DataValue::Duration(_), "value") => string(&value.canonical_text()),
        (DataValue::Identifier(i), "id") => string(&i.id),
        (DataValue::Identifier(i), "issuer") => i.issuer.as_deref().and_then(string),
        (DataValue::Identifier(i), "assigner") => i.assigner.as_deref().and_then(string),
        (DataValue::Identifier(i), "type") => i.type_.as_deref().and_then(string),
        (DataValue::Uri(u), "value") => string(&u.value),
        (DataValue::State(s), "value") => item(RmValue::Data(DataValue::CodedText(s.value.clone()))),
        (DataValue::State(s), "is_terminal") => item(RmValue::Boolean(s.is_terminal)),
        _ => None,
    }
}

fn set_data_attribute(
    data: &mut DataValue,
    name: &str,
    value: RmValue,
    mismatch: impl Fn(&str) -> OpenEhrError,
) -> OpenEhrResult<()> {
    let rm_type = data.rm_type_name();
    let text = |value: RmValue| value.into_string().ok_or_else(|| mismatch("STRING"));

    match (data, name) {
        (DataValue::Boolean(b), "value") => match value {
            RmValue::Boolean(v) => b.value = v,
            _ => return Err(mismatch("BOOLEAN")),
        },
        (DataValue::Text(t), "value") => t.value = text(value)?,
        (DataValue::CodedText(c), "value") => c.value = text(value)?,
        (DataValue::CodedText(c), "defining_code") => {
            c.defining_code = value
                .into_code_phrase()
                .ok_or_else(|| mismatch("CODE_PHRASE"))?
        }
        (DataValue::Quantity(q), "magnitude") => {
            q.magnitude = match value {
                RmValue::Real(r) => r,
                RmValue::Integer(i) => i as f64,
                _ => return Err(mismatch("REAL")),
            }
        }
        (DataValue::Quantity(q), "units") => q.units = text(value)?,
        (DataValue::Quantity(q), "precision") => {
            q.precision = Some(value.into_integer().ok_or_else(|| mismatch("INTEGER"))?)
        }
        (DataValue::Count(c), "magnitude") => {
            c.magnitude = value.into_integer().ok_or_else(|| mismatch("INTEGER"))?
        }
        (DataValue::Ordinal(o), "value") => {
            o.value = value.into_integer().ok_or_else(|| mismatch("INTEGER"))?
        }
        (DataValue::Ordinal(o), "symbol") => {
            o.symbol = value
                .into_coded_text()
                .ok_or_else(|| mismatch("DV_CODED_TEXT"))?
        }
        (DataValue::Date(d), "value") => {
            d.value = Iso8601Date::parse(&text(value)?).map_err(|_| mismatch("ISO8601 date"))?
        }
        (DataValue::Time(t), "value") => {
            t.value = Iso8601Time::parse(&text(value)?).map_err(|_| mismatch("ISO8601 time"))?
        }
        (DataValue::DateTime(dt), "value") => {
            dt.value = Iso8601DateTime::parse(&text(value)?)
                .map_err(|_| mismatch("ISO8601 date-time"))?
        }
        (DataValue::Duration(d), "value") => {
            d.value = Iso8601Duration::parse(&text(value)?)
                .map_err(|_| mismatch("ISO8601 duration"))?
        }
        (DataValue::Identifier(i), "id") => i.id = text(value)?,
        (DataValue::Identifier(i), "issuer") => i.issuer = Some(text(value)?),
        (DataValue::Identifier(i), "assigner") => i.assigner = Some(text(value)?),
        (DataValue::Identifier(i), "type") => i.type_ = Some(text(value)?),
        (DataValue::Uri(u), "value") => u.value = text(value)?,
        (DataValue::State(s), "value") => {
            s.value = value
                .into_coded_text()
                .ok_or_else(|| mismatch("DV_CODED_TEXT"))?
        }
        (DataValue::State(s), "is_terminal") => match value {
            RmValue::Boolean(v) => s.is_terminal = v,
            _ => return Err(mismatch("BOOLEAN")),
        },
        _ => {
            return Err(OpenEhrError::UnknownAttribute {
                rm_type: rm_type.to_string(),
                attribute: name.to_string(),
            })
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::DvQuantity;

    #[test]
    fn navigates_into_coded_text() {
        let coded = RmValue::Data(DataValue::CodedText(DvCodedText::new(
            "event",
            CodePhrase::new("openehr", "433"),
        )));
        let code = coded.attribute("defining_code").expect("defining code");
        let RmItem::Value(code) = code else {
            panic!("expected a value");
        };
        assert_eq!(
            code.attribute("code_string"),
            Some(RmItem::Value(RmValue::String("433".into())))
        );
        assert_eq!(
            code.attribute("terminology_id")
                .and_then(|t| t.as_value().and_then(|t| t.attribute("value"))),
            Some(RmItem::Value(RmValue::String("openehr".into())))
        );
        assert!(coded.attribute("magnitude").is_none());
    }

    #[test]
    fn sets_quantity_attributes_with_kind_checks() {
        let mut quantity = RmValue::Data(DataValue::Quantity(DvQuantity::new(0.0, "1")));
        quantity
            .set_attribute("magnitude", RmValue::Integer(120))
            .unwrap();
        quantity
            .set_attribute("units", RmValue::String("mm[Hg]".into()))
            .unwrap();
        assert_eq!(
            quantity.attribute("magnitude"),
            Some(RmItem::Value(RmValue::Real(120.0)))
        );

        assert!(matches!(
            quantity.set_attribute("units", RmValue::Integer(1)),
            Err(OpenEhrError::InvalidAttributeValue { .. })
        ));
        assert!(matches!(
            quantity.set_attribute("colour", RmValue::Integer(1)),
            Err(OpenEhrError::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn temporal_values_are_set_from_text() {
        let mut duration = RmValue::Data(DataValue::Duration(DvDuration {
            value: Iso8601Duration::zero(),
        }));
        duration
            .set_attribute("value", RmValue::String("PT15M".into()))
            .unwrap();
        assert_eq!(
            duration.attribute("value"),
            Some(RmItem::Value(RmValue::String("PT15M".into())))
        );
        assert!(duration
            .set_attribute("value", RmValue::String("soon".into()))
            .is_err());
    }
}
