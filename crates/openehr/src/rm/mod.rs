//! The openEHR Reference Model node tree.
//!
//! Instance data is a tree of `LOCATABLE` nodes held in an [`RmTree`] arena. Each node kind
//! ([`RmType`]) declares a fixed table of attributes ([`AttributeSpec`]); node-valued
//! attributes hold child handles (single) or a [`LocatableCollection`] (multiple), value
//! attributes hold reference-model data values. Generic, name-based access used by paths and
//! archetype validation goes through a compile-time dispatch over [`RmAttribute`] rather than
//! any runtime reflection.

mod collection;
mod locatable;
mod support;
mod tree;
mod value;

pub use collection::{LocatableCollection, Member, NameKey, NameQuery};
pub use locatable::{AttributeRef, Locatable};
pub(crate) use support::archetyped_for;
pub use support::{Archetyped, EventContext, FeederAudit, IsmTransition, Link, PartyProxy};
pub use tree::{Navigated, NodeHandle, RmTree};
pub use value::{RmItem, RmValue};

use crate::OpenEhrError;
use std::fmt;
use std::str::FromStr;

/// The locatable node kinds supported by the tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RmType {
    Composition,
    Section,
    Observation,
    Evaluation,
    Instruction,
    Activity,
    Action,
    AdminEntry,
    History,
    PointEvent,
    IntervalEvent,
    ItemTree,
    ItemList,
    ItemSingle,
    ItemTable,
    Cluster,
    Element,
}

impl RmType {
    pub const ALL: [RmType; 17] = [
        RmType::Composition,
        RmType::Section,
        RmType::Observation,
        RmType::Evaluation,
        RmType::Instruction,
        RmType::Activity,
        RmType::Action,
        RmType::AdminEntry,
        RmType::History,
        RmType::PointEvent,
        RmType::IntervalEvent,
        RmType::ItemTree,
        RmType::ItemList,
        RmType::ItemSingle,
        RmType::ItemTable,
        RmType::Cluster,
        RmType::Element,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RmType::Composition => "COMPOSITION",
            RmType::Section => "SECTION",
            RmType::Observation => "OBSERVATION",
            RmType::Evaluation => "EVALUATION",
            RmType::Instruction => "INSTRUCTION",
            RmType::Activity => "ACTIVITY",
            RmType::Action => "ACTION",
            RmType::AdminEntry => "ADMIN_ENTRY",
            RmType::History => "HISTORY",
            RmType::PointEvent => "POINT_EVENT",
            RmType::IntervalEvent => "INTERVAL_EVENT",
            RmType::ItemTree => "ITEM_TREE",
            RmType::ItemList => "ITEM_LIST",
            RmType::ItemSingle => "ITEM_SINGLE",
            RmType::ItemTable => "ITEM_TABLE",
            RmType::Cluster => "CLUSTER",
            RmType::Element => "ELEMENT",
        }
    }

    /// The attribute table of this kind, common `LOCATABLE` attributes excluded.
    pub fn attributes(self) -> &'static [AttributeSpec] {
        match self {
            RmType::Composition => COMPOSITION_ATTRIBUTES,
            RmType::Section => SECTION_ATTRIBUTES,
            RmType::Observation => OBSERVATION_ATTRIBUTES,
            RmType::Evaluation => EVALUATION_ATTRIBUTES,
            RmType::Instruction => INSTRUCTION_ATTRIBUTES,
            RmType::Activity => ACTIVITY_ATTRIBUTES,
            RmType::Action => ACTION_ATTRIBUTES,
            RmType::AdminEntry => ADMIN_ENTRY_ATTRIBUTES,
            RmType::History => HISTORY_ATTRIBUTES,
            RmType::PointEvent => POINT_EVENT_ATTRIBUTES,
            RmType::IntervalEvent => INTERVAL_EVENT_ATTRIBUTES,
            RmType::ItemTree => ITEM_TREE_ATTRIBUTES,
            RmType::ItemList => ITEM_LIST_ATTRIBUTES,
            RmType::ItemSingle => ITEM_SINGLE_ATTRIBUTES,
            RmType::ItemTable => ITEM_TABLE_ATTRIBUTES,
            RmType::Cluster => CLUSTER_ATTRIBUTES,
            RmType::Element => ELEMENT_ATTRIBUTES,
        }
    }

    pub fn attribute_spec(self, attribute: RmAttribute) -> Option<&'static AttributeSpec> {
        self.attributes().iter().find(|s| s.attribute == attribute)
    }

    pub fn is_event(self) -> bool {
        matches!(self, RmType::PointEvent | RmType::IntervalEvent)
    }
}

impl fmt::Display for RmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RmType {
    type Err = OpenEhrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        RmType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| OpenEhrError::UnknownRmType(s.to_string()))
    }
}

/// Every attribute name a locatable node can carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RmAttribute {
    Name,
    ArchetypeNodeId,
    Uid,
    ArchetypeDetails,
    ArchetypeId,
    Language,
    Territory,
    Category,
    Composer,
    Context,
    OtherContext,
    Content,
    Encoding,
    Subject,
    Protocol,
    Data,
    State,
    Narrative,
    ExpiryTime,
    Activities,
    Description,
    Timing,
    ActionArchetypeId,
    Time,
    IsmTransition,
    Items,
    Origin,
    Period,
    Duration,
    Summary,
    Events,
    Offset,
    Width,
    MathFunction,
    SampleCount,
    Item,
    Rows,
    Value,
    NullFlavour,
}

impl RmAttribute {
    const ALL: [RmAttribute; 39] = [
        RmAttribute::Name,
        RmAttribute::ArchetypeNodeId,
        RmAttribute::Uid,
        RmAttribute::ArchetypeDetails,
        RmAttribute::ArchetypeId,
        RmAttribute::Language,
        RmAttribute::Territory,
        RmAttribute::Category,
        RmAttribute::Composer,
        RmAttribute::Context,
        RmAttribute::OtherContext,
        RmAttribute::Content,
        RmAttribute::Encoding,
        RmAttribute::Subject,
        RmAttribute::Protocol,
        RmAttribute::Data,
        RmAttribute::State,
        RmAttribute::Narrative,
        RmAttribute::ExpiryTime,
        RmAttribute::Activities,
        RmAttribute::Description,
        RmAttribute::Timing,
        RmAttribute::ActionArchetypeId,
        RmAttribute::Time,
        RmAttribute::IsmTransition,
        RmAttribute::Items,
        RmAttribute::Origin,
        RmAttribute::Period,
        RmAttribute::Duration,
        RmAttribute::Summary,
        RmAttribute::Events,
        RmAttribute::Offset,
        RmAttribute::Width,
        RmAttribute::MathFunction,
        RmAttribute::SampleCount,
        RmAttribute::Item,
        RmAttribute::Rows,
        RmAttribute::Value,
        RmAttribute::NullFlavour,
    ];

    /// The attribute's path form. `OtherContext` lives inside the composition's context.
    pub fn as_path(self) -> &'static str {
        match self {
            RmAttribute::Name => "name",
            RmAttribute::ArchetypeNodeId => "archetype_node_id",
            RmAttribute::Uid => "uid",
            RmAttribute::ArchetypeDetails => "archetype_details",
            RmAttribute::ArchetypeId => "archetype_id",
            RmAttribute::Language => "language",
            RmAttribute::Territory => "territory",
            RmAttribute::Category => "category",
            RmAttribute::Composer => "composer",
            RmAttribute::Context => "context",
            RmAttribute::OtherContext => "context/other_context",
            RmAttribute::Content => "content",
            RmAttribute::Encoding => "encoding",
            RmAttribute::Subject => "subject",
            RmAttribute::Protocol => "protocol",
            RmAttribute::Data => "data",
            RmAttribute::State => "state",
            RmAttribute::Narrative => "narrative",
            RmAttribute::ExpiryTime => "expiry_time",
            RmAttribute::Activities => "activities",
            RmAttribute::Description => "description",
            RmAttribute::Timing => "timing",
            RmAttribute::ActionArchetypeId => "action_archetype_id",
            RmAttribute::Time => "time",
            RmAttribute::IsmTransition => "ism_transition",
            RmAttribute::Items => "items",
            RmAttribute::Origin => "origin",
            RmAttribute::Period => "period",
            RmAttribute::Duration => "duration",
            RmAttribute::Summary => "summary",
            RmAttribute::Events => "events",
            RmAttribute::Offset => "offset",
            RmAttribute::Width => "width",
            RmAttribute::MathFunction => "math_function",
            RmAttribute::SampleCount => "sample_count",
            RmAttribute::Item => "item",
            RmAttribute::Rows => "rows",
            RmAttribute::Value => "value",
            RmAttribute::NullFlavour => "null_flavour",
        }
    }
}

impl fmt::Display for RmAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_path())
    }
}

impl FromStr for RmAttribute {
    type Err = OpenEhrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RmAttribute::ALL
            .into_iter()
            .find(|a| a.as_path() == s)
            .ok_or_else(|| OpenEhrError::UnknownAttribute {
                rm_type: "LOCATABLE".into(),
                attribute: s.to_string(),
            })
    }
}

/// What an attribute holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeKind {
    /// A single child node.
    Node,
    /// An ordered, indexed collection of child nodes.
    Nodes,
    /// A reference-model value.
    Value,
}

/// One row of a node kind's attribute table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttributeSpec {
    pub attribute: RmAttribute,
    pub kind: AttributeKind,
    /// The declared RM type; children and values must conform to it.
    pub rm_type: &'static str,
    /// Mandatory in the reference model.
    pub required: bool,
}

const fn spec(
    attribute: RmAttribute,
    kind: AttributeKind,
    rm_type: &'static str,
    required: bool,
) -> AttributeSpec {
    AttributeSpec {
        attribute,
        kind,
        rm_type,
        required,
    }
}

use AttributeKind::{Node as N, Nodes as M, Value as V};
use RmAttribute as A;

static COMPOSITION_ATTRIBUTES: &[AttributeSpec] = &[
    spec(A::Language, V, "CODE_PHRASE", true),
    spec(A::Territory, V, "CODE_PHRASE", true),
    spec(A::Category, V, "DV_CODED_TEXT", true),
    spec(A::Composer, V, "PARTY_PROXY", true),
    spec(A::Context, V, "EVENT_CONTEXT", false),
    spec(A::OtherContext, N, "ITEM_STRUCTURE", false),
    spec(A::Content, M, "CONTENT_ITEM", false),
];

static SECTION_ATTRIBUTES: &[AttributeSpec] = &[spec(A::Items, M, "CONTENT_ITEM", false)];

static OBSERVATION_ATTRIBUTES: &[AttributeSpec] = &[
    spec(A::Language, V, "CODE_PHRASE", true),
    spec(A::Encoding, V, "CODE_PHRASE", true),
    spec(A::Subject, V, "PARTY_PROXY", true),
    spec(A::Protocol, N, "ITEM_STRUCTURE", false),
    spec(A::Data, N, "HISTORY", true),
    spec(A::State, N, "HISTORY", false),
];

static EVALUATION_ATTRIBUTES: &[AttributeSpec] = &[
    spec(A::Language, V, "CODE_PHRASE", true),
    spec(A::Encoding, V, "CODE_PHRASE", true),
    spec(A::Subject, V, "PARTY_PROXY", true),
    spec(A::Protocol, N, "ITEM_STRUCTURE", false),
    spec(A::Data, N, "ITEM_STRUCTURE", true),
];

static INSTRUCTION_ATTRIBUTES: &[AttributeSpec] = &[
    spec(A::Language, V, "CODE_PHRASE", true),
    spec(A::Encoding, V, "CODE_PHRASE", true),
    spec(A::Subject, V, "PARTY_PROXY", true),
    spec(A::Protocol, N, "ITEM_STRUCTURE", false),
    spec(A::Narrative, V, "DV_TEXT", true),
    spec(A::ExpiryTime, V, "DV_DATE_TIME", false),
    spec(A::Activities, M, "ACTIVITY", false),
];

static ACTIVITY_ATTRIBUTES: &[AttributeSpec] = &[
    spec(A::Description, N, "ITEM_STRUCTURE", true),
    spec(A::Timing, V, "DV_TEXT", false),
    spec(A::ActionArchetypeId, V, "STRING", true),
];

static ACTION_ATTRIBUTES: &[AttributeSpec] = &[
    spec(A::Language, V, "CODE_PHRASE", true),
    spec(A::Encoding, V, "CODE_PHRASE", true),
    spec(A::Subject, V, "PARTY_PROXY", true),
    spec(A::Protocol, N, "ITEM_STRUCTURE", false),
    spec(A::Time, V, "DV_DATE_TIME", true),
    spec(A::Description, N, "ITEM_STRUCTURE", true),
    spec(A::IsmTransition, V, "ISM_TRANSITION", true),
];

static ADMIN_ENTRY_ATTRIBUTES: &[AttributeSpec] = &[
    spec(A::Language, V, "CODE_PHRASE", true),
    spec(A::Encoding, V, "CODE_PHRASE", true),
    spec(A::Subject, V, "PARTY_PROXY", true),
    spec(A::Data, N, "ITEM_STRUCTURE", true),
];

static HISTORY_ATTRIBUTES: &[AttributeSpec] = &[
    spec(A::Origin, V, "DV_DATE_TIME", true),
    spec(A::Period, V, "DV_DURATION", false),
    spec(A::Duration, V, "DV_DURATION", false),
    spec(A::Summary, N, "ITEM_STRUCTURE", false),
    spec(A::Events, M, "EVENT", false),
];

static POINT_EVENT_ATTRIBUTES: &[AttributeSpec] = &[
    spec(A::Time, V, "DV_DATE_TIME", true),
    spec(A::Offset, V, "DV_DURATION", false),
    spec(A::Data, N, "ITEM_STRUCTURE", true),
    spec(A::State, N, "ITEM_STRUCTURE", false),
];

static INTERVAL_EVENT_ATTRIBUTES: &[AttributeSpec] = &[
    spec(A::Time, V, "DV_DATE_TIME", true),
    spec(A::Offset, V, "DV_DURATION", false),
    spec(A::Data, N, "ITEM_STRUCTURE", true),
    spec(A::State, N, "ITEM_STRUCTURE", false),
    spec(A::Width, V, "DV_DURATION", true),
    spec(A::MathFunction, V, "DV_CODED_TEXT", true),
    spec(A::SampleCount, V, "INTEGER", false),
];

static ITEM_TREE_ATTRIBUTES: &[AttributeSpec] = &[spec(A::Items, M, "ITEM", false)];

static ITEM_LIST_ATTRIBUTES: &[AttributeSpec] = &[spec(A::Items, M, "ELEMENT", false)];

static ITEM_SINGLE_ATTRIBUTES: &[AttributeSpec] = &[spec(A::Item, N, "ELEMENT", true)];

static ITEM_TABLE_ATTRIBUTES: &[AttributeSpec] = &[spec(A::Rows, M, "CLUSTER", false)];

static CLUSTER_ATTRIBUTES: &[AttributeSpec] = &[spec(A::Items, M, "ITEM", true)];

static ELEMENT_ATTRIBUTES: &[AttributeSpec] = &[
    spec(A::Value, V, "DATA_VALUE", false),
    spec(A::NullFlavour, V, "DV_CODED_TEXT", false),
];

fn rm_supertype(name: &str) -> Option<&'static str> {
    let parent = match name {
        "DV_CODED_TEXT" => "DV_TEXT",
        "DV_TEXT" | "DV_BOOLEAN" | "DV_IDENTIFIER" | "DV_URI" | "DV_STATE" => "DATA_VALUE",
        "DV_QUANTITY" | "DV_COUNT" | "DV_DURATION" => "DV_AMOUNT",
        "DV_DATE" | "DV_TIME" | "DV_DATE_TIME" => "DV_TEMPORAL",
        "DV_TEMPORAL" => "DV_ABSOLUTE_QUANTITY",
        "DV_AMOUNT" | "DV_ABSOLUTE_QUANTITY" => "DV_QUANTIFIED",
        "DV_QUANTIFIED" | "DV_ORDINAL" => "DV_ORDERED",
        "DV_ORDERED" => "DATA_VALUE",
        "POINT_EVENT" | "INTERVAL_EVENT" => "EVENT",
        "ITEM_TREE" | "ITEM_LIST" | "ITEM_SINGLE" | "ITEM_TABLE" => "ITEM_STRUCTURE",
        "ITEM_STRUCTURE" | "HISTORY" => "DATA_STRUCTURE",
        "CLUSTER" | "ELEMENT" => "ITEM",
        "OBSERVATION" | "EVALUATION" | "INSTRUCTION" | "ACTION" => "CARE_ENTRY",
        "CARE_ENTRY" | "ADMIN_ENTRY" => "ENTRY",
        "ENTRY" | "SECTION" => "CONTENT_ITEM",
        "PARTY_SELF" | "PARTY_IDENTIFIED" => "PARTY_PROXY",
        "EVENT" | "DATA_STRUCTURE" | "ITEM" | "CONTENT_ITEM" | "COMPOSITION" | "ACTIVITY" => {
            "LOCATABLE"
        }
        _ => return None,
    };
    Some(parent)
}

fn normalise_type_name(name: &str) -> String {
    // Generic parameters (e.g. `DV_INTERVAL<DV_QUANTITY>`) do not take part in conformance.
    let base = name.split('<').next().unwrap_or(name).trim();
    match base.to_ascii_uppercase().as_str() {
        "DOUBLE" | "FLOAT" => "REAL".to_string(),
        "INTEGER64" => "INTEGER".to_string(),
        other => other.to_string(),
    }
}

/// Returns `true` if RM type `actual` is `expected` or one of its descendants.
pub fn rm_type_conforms(actual: &str, expected: &str) -> bool {
    let expected = normalise_type_name(expected);
    let mut current = normalise_type_name(actual);
    loop {
        if current == expected {
            return true;
        }
        match rm_supertype(&current) {
            Some(parent) => current = parent.to_string(),
            None => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_round_trip() {
        for rm_type in RmType::ALL {
            assert_eq!(rm_type.as_str().parse::<RmType>().expect("known"), rm_type);
        }
        assert!(matches!(
            "BANANA".parse::<RmType>(),
            Err(OpenEhrError::UnknownRmType(_))
        ));
    }

    #[test]
    fn attribute_names_round_trip() {
        for attribute in RmAttribute::ALL {
            assert_eq!(
                attribute.as_path().parse::<RmAttribute>().expect("known"),
                attribute
            );
        }
    }

    #[test]
    fn conformance_follows_the_rm_hierarchy() {
        assert!(rm_type_conforms("DV_CODED_TEXT", "DV_TEXT"));
        assert!(rm_type_conforms("DV_QUANTITY", "DATA_VALUE"));
        assert!(rm_type_conforms("POINT_EVENT", "EVENT"));
        assert!(rm_type_conforms("OBSERVATION", "CONTENT_ITEM"));
        assert!(rm_type_conforms("ELEMENT", "LOCATABLE"));
        assert!(rm_type_conforms("Double", "REAL"));
        assert!(!rm_type_conforms("DV_TEXT", "DV_CODED_TEXT"));
        assert!(!rm_type_conforms("CLUSTER", "ELEMENT"));
    }

    #[test]
    fn attribute_tables_match_the_rm() {
        let data = RmType::Observation
            .attribute_spec(RmAttribute::Data)
            .expect("observation has data");
        assert_eq!(data.kind, AttributeKind::Node);
        assert_eq!(data.rm_type, "HISTORY");
        assert!(RmType::PointEvent
            .attribute_spec(RmAttribute::Width)
            .is_none());
        assert!(RmType::ItemList
            .attribute_spec(RmAttribute::Items)
            .is_some_and(|s| s.kind == AttributeKind::Nodes && s.rm_type == "ELEMENT"));
    }
}
