//! Type-name factory for reference-model nodes and values.
//!
//! Archetype definitions and wire documents name RM types as strings (`"ELEMENT"`,
//! `"DV_QUANTITY"`, ...). This module is the single place where such a name becomes a concrete
//! node kind or a blank value. Constraint and expression kinds are not built here: their wire
//! form carries a `_type` tag that selects the variant during deserialization.

use crate::data_types::{
    CodePhrase, DataValue, DvBoolean, DvCodedText, DvCount, DvDate, DvDateTime, DvDuration,
    DvIdentifier, DvOrdinal, DvQuantity, DvState, DvText, DvTime, DvUri, HierObjectId,
    Iso8601Date, Iso8601Duration, Iso8601Time, TextValue,
};
use crate::rm::{
    archetyped_for, AttributeKind, EventContext, IsmTransition, Locatable, NodeHandle,
    PartyProxy, RmAttribute, RmTree, RmType, RmValue,
};
use crate::{OpenEhrError, OpenEhrResult};

/// Default language of synthesised entries and compositions.
pub const DEFAULT_LANGUAGE: (&str, &str) = ("ISO_639-1", "en");

/// Default territory of synthesised compositions.
pub const DEFAULT_TERRITORY: (&str, &str) = ("ISO_3166-1", "GB");

/// Default character encoding of synthesised entries.
pub const DEFAULT_ENCODING: (&str, &str) = ("IANA_character-sets", "UTF-8");

/// What a type name stands for.
#[derive(Clone, Debug, PartialEq)]
pub enum Constructed {
    Node(RmType),
    Value(RmValue),
}

/// Resolves a type name to a node kind, or to a blank value of that type.
///
/// # Errors
///
/// - [`OpenEhrError::UnknownRmType`] if the name is neither a node kind nor a value type.
/// - [`OpenEhrError::NoDefaultValue`] if the value type has no blank form.
pub fn construct(type_name: &str) -> OpenEhrResult<Constructed> {
    match type_name.parse::<RmType>() {
        Ok(rm_type) => Ok(Constructed::Node(rm_type)),
        Err(_) => construct_value(type_name).map(Constructed::Value),
    }
}

fn blank_coded() -> DvCodedText {
    DvCodedText::new("", CodePhrase::new("local", ""))
}

/// A blank value of an RM value type.
///
/// Temporal types default to the current date/time; everything else to its zero form.
///
/// # Errors
///
/// - [`OpenEhrError::UnknownRmType`] for names that are not RM value types.
/// - [`OpenEhrError::NoDefaultValue`] for value types without a meaningful blank form.
pub fn construct_value(type_name: &str) -> OpenEhrResult<RmValue> {
    let name = type_name.trim().to_ascii_uppercase();
    let data = |value: DataValue| -> OpenEhrResult<RmValue> { Ok(RmValue::Data(value)) };

    match name.as_str() {
        "BOOLEAN" => Ok(RmValue::Boolean(false)),
        "INTEGER" | "INTEGER64" => Ok(RmValue::Integer(0)),
        "REAL" | "DOUBLE" | "FLOAT" => Ok(RmValue::Real(0.0)),
        "STRING" => Ok(RmValue::String(String::new())),
        "DV_BOOLEAN" => data(DataValue::Boolean(DvBoolean { value: false })),
        "DV_TEXT" => data(DataValue::Text(DvText::new(""))),
        "DV_CODED_TEXT" => data(DataValue::CodedText(blank_coded())),
        "DV_QUANTITY" => data(DataValue::Quantity(DvQuantity::new(0.0, ""))),
        "DV_COUNT" => data(DataValue::Count(DvCount { magnitude: 0 })),
        "DV_ORDINAL" => data(DataValue::Ordinal(DvOrdinal {
            value: 0,
            symbol: blank_coded(),
        })),
        "DV_DATE" => data(DataValue::Date(DvDate {
            value: Iso8601Date::today(),
        })),
        "DV_TIME" => data(DataValue::Time(DvTime {
            value: Iso8601Time::now(),
        })),
        "DV_DATE_TIME" => data(DataValue::DateTime(DvDateTime::now())),
        "DV_DURATION" => data(DataValue::Duration(DvDuration {
            value: Iso8601Duration::zero(),
        })),
        "DV_IDENTIFIER" => data(DataValue::Identifier(DvIdentifier {
            id: String::new(),
            issuer: None,
            assigner: None,
            type_: None,
        })),
        "DV_URI" => data(DataValue::Uri(DvUri {
            value: String::new(),
        })),
        "DV_STATE" => data(DataValue::State(DvState {
            value: blank_coded(),
            is_terminal: false,
        })),
        "CODE_PHRASE" => Ok(RmValue::CodePhrase(CodePhrase::new("local", ""))),
        "TERMINOLOGY_ID" => Ok(RmValue::ObjectId {
            rm_type: "TERMINOLOGY_ID",
            value: "local".into(),
        }),
        "HIER_OBJECT_ID" => Ok(RmValue::ObjectId {
            rm_type: "HIER_OBJECT_ID",
            value: HierObjectId::generate().value,
        }),
        "PARTY_PROXY" | "PARTY_SELF" => Ok(RmValue::Party(PartyProxy::default())),
        "EVENT_CONTEXT" => Ok(RmValue::Context(EventContext::starting_now())),
        "ISM_TRANSITION" => Ok(RmValue::IsmTransition(IsmTransition {
            current_state: DvCodedText::new("completed", CodePhrase::new("openehr", "532")),
            transition: None,
            careflow_step: None,
        })),
        "ARCHETYPE_ID" | "TEMPLATE_ID" | "PARTY_IDENTIFIED" | "ARCHETYPED" | "DATA_VALUE" => {
            Err(OpenEhrError::NoDefaultValue(name))
        }
        _ => Err(OpenEhrError::UnknownRmType(type_name.to_string())),
    }
}

/// The value a mandatory attribute receives when a node is synthesised.
///
/// Attribute-specific codes take precedence over the blank value of the declared type.
pub fn attribute_default(rm_type: RmType, attribute: RmAttribute) -> OpenEhrResult<RmValue> {
    let code = |(terminology, code): (&str, &str)| -> OpenEhrResult<RmValue> {
        Ok(RmValue::CodePhrase(CodePhrase::new(terminology, code)))
    };
    let coded = |text: &str, code: &str| -> OpenEhrResult<RmValue> {
        Ok(RmValue::Data(DataValue::CodedText(DvCodedText::new(
            text,
            CodePhrase::new("openehr", code),
        ))))
    };

    match attribute {
        RmAttribute::Language => code(DEFAULT_LANGUAGE),
        RmAttribute::Territory => code(DEFAULT_TERRITORY),
        RmAttribute::Encoding => code(DEFAULT_ENCODING),
        RmAttribute::Category => coded("event", "433"),
        RmAttribute::MathFunction => coded("actual", "146"),
        _ => {
            let spec = rm_type
                .attribute_spec(attribute)
                .ok_or_else(|| OpenEhrError::UnknownAttribute {
                    rm_type: rm_type.to_string(),
                    attribute: attribute.to_string(),
                })?;
            construct_value(spec.rm_type)
        }
    }
}

/// Inserts a new detached node of the named kind.
///
/// Archetype roots (a node id that parses as an archetype id) receive `archetype_details`
/// stamped with `rm_version`. When `fill_required` is set, every mandatory value attribute is
/// populated with [`attribute_default`].
///
/// # Errors
///
/// - [`OpenEhrError::UnknownRmType`] if `type_name` is not a node kind.
/// - Errors from [`Locatable::new`] for a blank node id or name.
pub fn construct_node(
    tree: &mut RmTree,
    type_name: &str,
    node_id: &str,
    name: impl Into<TextValue>,
    fill_required: bool,
) -> OpenEhrResult<NodeHandle> {
    let rm_type: RmType = type_name.parse()?;
    let rm_version = tree.config().rm_version();
    let mut node = Locatable::new(rm_type, node_id, name)?;
    if let Some(details) = archetyped_for(node_id, rm_version.as_str()) {
        node = node.with_archetype_details(details);
    }
    let handle = tree.insert(node);

    if fill_required {
        for spec in rm_type.attributes() {
            if !spec.required || spec.kind != AttributeKind::Value {
                continue;
            }
            match attribute_default(rm_type, spec.attribute) {
                Ok(value) => tree.set_value(handle, spec.attribute, value)?,
                Err(OpenEhrError::NoDefaultValue(_)) => {
                    tracing::debug!(
                        "no default for required {}.{}, left unset",
                        rm_type,
                        spec.attribute
                    );
                }
                Err(err) => return Err(err),
            }
        }
    }

    tracing::debug!("constructed {} '{}' as {}", rm_type, node_id, handle);
    Ok(handle)
}
