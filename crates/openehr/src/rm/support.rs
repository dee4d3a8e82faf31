//! Non-locatable RM structures carried by nodes.

use super::tree::NodeHandle;
use crate::data_types::{ArchetypeId, CodePhrase, DvCodedText, DvDateTime, DvText, HierObjectId};
use serde::{Deserialize, Serialize};

/// RM `ARCHETYPED`: archetype and template details of an archetype root node.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Archetyped {
    pub archetype_id: ArchetypeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    pub rm_version: String,
}

impl Archetyped {
    pub fn new(archetype_id: ArchetypeId, rm_version: impl Into<String>) -> Self {
        Self {
            archetype_id,
            template_id: None,
            rm_version: rm_version.into(),
        }
    }
}

/// RM `LINK`: a typed reference from one node to another resource.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Link {
    pub meaning: DvText,
    #[serde(rename = "type")]
    pub type_: DvText,
    pub target: String,
}

/// RM `FEEDER_AUDIT`, reduced to the originating system and its identifiers.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FeederAudit {
    pub system_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub originating_system_item_ids: Vec<String>,
}

/// RM `PARTY_PROXY`: the subject or composer of a record.
///
/// A proxy without a name stands for `PARTY_SELF`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PartyProxy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<HierObjectId>,
}

impl PartyProxy {
    pub fn identified(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            external_ref: None,
        }
    }

    pub fn rm_type_name(&self) -> &'static str {
        if self.name.is_some() {
            "PARTY_IDENTIFIED"
        } else {
            "PARTY_SELF"
        }
    }
}

/// RM `ISM_TRANSITION`: the care-flow state reached by an `ACTION`.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct IsmTransition {
    pub current_state: DvCodedText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<DvCodedText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub careflow_step: Option<DvCodedText>,
}

/// RM `EVENT_CONTEXT`: the clinical session a composition was recorded in.
///
/// `other_context` is a locatable subtree and therefore lives in the arena; the context holds
/// only its handle.
#[derive(Clone, Debug, PartialEq)]
pub struct EventContext {
    pub start_time: DvDateTime,
    pub end_time: Option<DvDateTime>,
    pub location: Option<String>,
    pub setting: DvCodedText,
    pub health_care_facility: Option<PartyProxy>,
    pub other_context: Option<NodeHandle>,
}

impl EventContext {
    pub fn new(start_time: DvDateTime, setting: DvCodedText) -> Self {
        Self {
            start_time,
            end_time: None,
            location: None,
            setting,
            health_care_facility: None,
            other_context: None,
        }
    }

    /// A context starting now in the openEHR "other care" setting.
    pub fn starting_now() -> Self {
        Self::new(
            DvDateTime::now(),
            DvCodedText::new("other care", CodePhrase::new("openehr", "238")),
        )
    }
}

/// Builds the `ARCHETYPED` block for a node whose node id is an archetype id.
pub(crate) fn archetyped_for(node_id: &str, rm_version: &str) -> Option<Archetyped> {
    ArchetypeId::parse(node_id)
        .ok()
        .map(|id| Archetyped::new(id, rm_version))
}
