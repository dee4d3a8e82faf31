//! Locatable nodes and their per-kind attribute storage.

use super::collection::LocatableCollection;
use super::support::{Archetyped, EventContext, FeederAudit, IsmTransition, Link, PartyProxy};
use super::tree::NodeHandle;
use super::value::RmValue;
use super::{RmAttribute, RmType};
use crate::data_types::{
    ArchetypeId, CodePhrase, DataValue, DvCodedText, DvDateTime, DvDuration, HierObjectId,
    TextValue,
};
use crate::{OpenEhrError, OpenEhrResult};
use openehr_types::NonEmptyText;

/// An attribute read from a node.
#[derive(Clone, Debug)]
pub enum AttributeRef<'a> {
    Node(NodeHandle),
    Nodes(&'a LocatableCollection),
    Value(RmValue),
}

/// A `LOCATABLE` node: the common identity attributes plus a kind-specific body.
///
/// Nodes are created detached and become part of a tree through
/// [`RmTree::attach`](super::RmTree::attach); the parent link is managed by the tree.
#[derive(Clone, Debug)]
pub struct Locatable {
    archetype_node_id: NonEmptyText,
    name: TextValue,
    uid: Option<HierObjectId>,
    archetype_details: Option<Archetyped>,
    links: Option<Vec<Link>>,
    feeder_audit: Option<FeederAudit>,
    parent: Option<NodeHandle>,
    parent_attribute: Option<RmAttribute>,
    pub(crate) body: NodeBody,
}

impl Locatable {
    /// Creates a detached node of the given kind with all kind-specific attributes unset.
    ///
    /// # Errors
    ///
    /// - [`OpenEhrError::Text`] if `archetype_node_id` is blank.
    /// - [`OpenEhrError::EmptyName`] if the name text is blank.
    pub fn new(
        rm_type: RmType,
        archetype_node_id: &str,
        name: impl Into<TextValue>,
    ) -> OpenEhrResult<Self> {
        let name = name.into();
        if name.value().trim().is_empty() {
            return Err(OpenEhrError::EmptyName);
        }
        Ok(Self {
            archetype_node_id: NonEmptyText::new(archetype_node_id)?,
            name,
            uid: None,
            archetype_details: None,
            links: None,
            feeder_audit: None,
            parent: None,
            parent_attribute: None,
            body: NodeBody::new(rm_type),
        })
    }

    pub fn with_uid(mut self, uid: HierObjectId) -> Self {
        self.uid = Some(uid);
        self
    }

    pub fn with_archetype_details(mut self, details: Archetyped) -> Self {
        self.archetype_details = Some(details);
        self
    }

    pub fn with_feeder_audit(mut self, audit: FeederAudit) -> Self {
        self.feeder_audit = Some(audit);
        self
    }

    /// # Errors
    ///
    /// Returns [`OpenEhrError::InvalidInput`] if `links` is empty; absent links are `None`.
    pub fn with_links(mut self, links: Vec<Link>) -> OpenEhrResult<Self> {
        if links.is_empty() {
            return Err(OpenEhrError::InvalidInput(
                "links must not be empty when present".into(),
            ));
        }
        self.links = Some(links);
        Ok(self)
    }

    pub fn rm_type(&self) -> RmType {
        self.body.rm_type()
    }

    pub fn archetype_node_id(&self) -> &str {
        self.archetype_node_id.as_str()
    }

    pub fn name(&self) -> &TextValue {
        &self.name
    }

    pub fn uid(&self) -> Option<&HierObjectId> {
        self.uid.as_ref()
    }

    pub fn archetype_details(&self) -> Option<&Archetyped> {
        self.archetype_details.as_ref()
    }

    pub fn links(&self) -> Option<&[Link]> {
        self.links.as_deref()
    }

    pub fn feeder_audit(&self) -> Option<&FeederAudit> {
        self.feeder_audit.as_ref()
    }

    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    /// The attribute of the parent this node is attached under.
    pub fn parent_attribute(&self) -> Option<RmAttribute> {
        self.parent_attribute
    }

    /// The archetype this node is a root of, from its details or its node id.
    pub fn archetype_id(&self) -> Option<ArchetypeId> {
        match &self.archetype_details {
            Some(details) => Some(details.archetype_id.clone()),
            None => ArchetypeId::parse(self.archetype_node_id()).ok(),
        }
    }

    pub fn is_archetype_root(&self) -> bool {
        self.archetype_details.is_some() || ArchetypeId::is_archetype_id(self.archetype_node_id())
    }

    /// Reads an attribute by name; `None` if the kind lacks it or it is unset.
    pub fn attribute(&self, attribute: RmAttribute) -> Option<AttributeRef<'_>> {
        match attribute {
            RmAttribute::Name => Some(AttributeRef::Value(RmValue::Data(self.name.clone().into()))),
            RmAttribute::ArchetypeNodeId => Some(AttributeRef::Value(RmValue::String(
                self.archetype_node_id().to_string(),
            ))),
            RmAttribute::Uid => self.uid.as_ref().map(|uid| {
                AttributeRef::Value(RmValue::ObjectId {
                    rm_type: "HIER_OBJECT_ID",
                    value: uid.value.clone(),
                })
            }),
            RmAttribute::ArchetypeDetails => self
                .archetype_details
                .clone()
                .map(|details| AttributeRef::Value(RmValue::Archetyped(details))),
            RmAttribute::ArchetypeId => self.archetype_id().map(|id| {
                AttributeRef::Value(RmValue::ObjectId {
                    rm_type: "ARCHETYPE_ID",
                    value: id.to_string(),
                })
            }),
            _ => {
                self.rm_type().attribute_spec(attribute)?;
                match self.body.slot(attribute) {
                    Some(SlotRef::Single(child)) => child.map(AttributeRef::Node),
                    Some(SlotRef::Multiple(children)) => Some(AttributeRef::Nodes(children)),
                    None => self.body.value(attribute).map(AttributeRef::Value),
                }
            }
        }
    }

    /// The collection behind a multiple-valued attribute.
    pub fn collection(&self, attribute: RmAttribute) -> Option<&LocatableCollection> {
        match self.body.slot(attribute)? {
            SlotRef::Multiple(children) => Some(children),
            SlotRef::Single(_) => None,
        }
    }

    /// Every attached child, attribute by attribute in table order.
    pub fn children(&self) -> Vec<(RmAttribute, NodeHandle)> {
        let mut children = Vec::new();
        for spec in self.rm_type().attributes() {
            match self.body.slot(spec.attribute) {
                Some(SlotRef::Single(Some(child))) => children.push((spec.attribute, child)),
                Some(SlotRef::Multiple(members)) => {
                    children.extend(members.iter().map(|child| (spec.attribute, child)))
                }
                _ => {}
            }
        }
        children
    }

    pub(crate) fn set_parent(&mut self, parent: Option<(NodeHandle, RmAttribute)>) {
        self.parent = parent.map(|(handle, _)| handle);
        self.parent_attribute = parent.map(|(_, attribute)| attribute);
    }

    pub(crate) fn set_name(&mut self, name: TextValue) {
        self.name = name;
    }

    pub(crate) fn set_uid(&mut self, uid: Option<HierObjectId>) {
        self.uid = uid;
    }

    pub(crate) fn set_archetype_details(&mut self, details: Option<Archetyped>) {
        self.archetype_details = details;
    }

    pub(crate) fn set_links(&mut self, links: Option<Vec<Link>>) -> OpenEhrResult<()> {
        if links.as_ref().is_some_and(Vec::is_empty) {
            return Err(OpenEhrError::InvalidInput(
                "links must not be empty when present".into(),
            ));
        }
        self.links = links;
        Ok(())
    }

    pub(crate) fn set_feeder_audit(&mut self, audit: Option<FeederAudit>) {
        self.feeder_audit = audit;
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct EntryCommon {
    pub(crate) language: Option<CodePhrase>,
    pub(crate) encoding: Option<CodePhrase>,
    pub(crate) subject: Option<PartyProxy>,
    pub(crate) protocol: Option<NodeHandle>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Composition {
    pub(crate) language: Option<CodePhrase>,
    pub(crate) territory: Option<CodePhrase>,
    pub(crate) category: Option<DvCodedText>,
    pub(crate) composer: Option<PartyProxy>,
    pub(crate) context: Option<EventContext>,
    pub(crate) content: LocatableCollection,
}

/// Body of the kinds whose only node attribute is one collection.
#[derive(Clone, Debug, Default)]
pub(crate) struct Items {
    pub(crate) items: LocatableCollection,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Observation {
    pub(crate) entry: EntryCommon,
    pub(crate) data: Option<NodeHandle>,
    pub(crate) state: Option<NodeHandle>,
}

/// Body of `EVALUATION` and `ADMIN_ENTRY`.
#[derive(Clone, Debug, Default)]
pub(crate) struct DataEntry {
    pub(crate) entry: EntryCommon,
    pub(crate) data: Option<NodeHandle>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Instruction {
    pub(crate) entry: EntryCommon,
    pub(crate) narrative: Option<TextValue>,
    pub(crate) expiry_time: Option<DvDateTime>,
    pub(crate) activities: LocatableCollection,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Activity {
    pub(crate) description: Option<NodeHandle>,
    pub(crate) timing: Option<TextValue>,
    pub(crate) action_archetype_id: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Action {
    pub(crate) entry: EntryCommon,
    pub(crate) time: Option<DvDateTime>,
    pub(crate) description: Option<NodeHandle>,
    pub(crate) ism_transition: Option<IsmTransition>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct History {
    pub(crate) origin: Option<DvDateTime>,
    pub(crate) period: Option<DvDuration>,
    pub(crate) duration: Option<DvDuration>,
    pub(crate) summary: Option<NodeHandle>,
    pub(crate) events: LocatableCollection,
}

/// Body of `POINT_EVENT` and `INTERVAL_EVENT`; the interval fields stay unset on point events.
#[derive(Clone, Debug, Default)]
pub(crate) struct Event {
    pub(crate) time: Option<DvDateTime>,
    pub(crate) offset: Option<DvDuration>,
    pub(crate) data: Option<NodeHandle>,
    pub(crate) state: Option<NodeHandle>,
    pub(crate) width: Option<DvDuration>,
    pub(crate) math_function: Option<DvCodedText>,
    pub(crate) sample_count: Option<i64>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct ItemSingle {
    pub(crate) item: Option<NodeHandle>,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Element {
    pub(crate) value: Option<DataValue>,
    pub(crate) null_flavour: Option<DvCodedText>,
}

/// Kind-specific attribute storage of a node.
#[derive(Clone, Debug)]
pub(crate) enum NodeBody {
    Composition(Composition),
    Section(Items),
    Observation(Observation),
    Evaluation(DataEntry),
    Instruction(Instruction),
    Activity(Activity),
    Action(Action),
    AdminEntry(DataEntry),
    History(History),
    PointEvent(Event),
    IntervalEvent(Event),
    ItemTree(Items),
    ItemList(Items),
    ItemSingle(ItemSingle),
    ItemTable(Items),
    Cluster(Items),
    Element(Element),
}

pub(crate) enum SlotRef<'a> {
    Single(Option<NodeHandle>),
    Multiple(&'a LocatableCollection),
}

pub(crate) enum SlotMut<'a> {
    Single(&'a mut Option<NodeHandle>),
    Multiple(&'a mut LocatableCollection),
}

impl NodeBody {
    pub(crate) fn new(rm_type: RmType) -> Self {
        match rm_type {
            RmType::Composition => NodeBody::Composition(Composition::default()),
            RmType::Section => NodeBody::Section(Items::default()),
            RmType::Observation => NodeBody::Observation(Observation::default()),
            RmType::Evaluation => NodeBody::Evaluation(DataEntry::default()),
            RmType::Instruction => NodeBody::Instruction(Instruction::default()),
            RmType::Activity => NodeBody::Activity(Activity::default()),
            RmType::Action => NodeBody::Action(Action::default()),
            RmType::AdminEntry => NodeBody::AdminEntry(DataEntry::default()),
            RmType::History => NodeBody::History(History::default()),
            RmType::PointEvent => NodeBody::PointEvent(Event::default()),
            RmType::IntervalEvent => NodeBody::IntervalEvent(Event::default()),
            RmType::ItemTree => NodeBody::ItemTree(Items::default()),
            RmType::ItemList => NodeBody::ItemList(Items::default()),
            RmType::ItemSingle => NodeBody::ItemSingle(ItemSingle::default()),
            RmType::ItemTable => NodeBody::ItemTable(Items::default()),
            RmType::Cluster => NodeBody::Cluster(Items::default()),
            RmType::Element => NodeBody::Element(Element::default()),
        }
    }

    pub(crate) fn rm_type(&self) -> RmType {
        match self {
            NodeBody::Composition(_) => RmType::Composition,
            NodeBody::Section(_) => RmType::Section,
            NodeBody::Observation(_) => RmType::Observation,
            NodeBody::Evaluation(_) => RmType::Evaluation,
            NodeBody::Instruction(_) => RmType::Instruction,
            NodeBody::Activity(_) => RmType::Activity,
            NodeBody::Action(_) => RmType::Action,
            NodeBody::AdminEntry(_) => RmType::AdminEntry,
            NodeBody::History(_) => RmType::History,
            NodeBody::PointEvent(_) => RmType::PointEvent,
            NodeBody::IntervalEvent(_) => RmType::IntervalEvent,
            NodeBody::ItemTree(_) => RmType::ItemTree,
            NodeBody::ItemList(_) => RmType::ItemList,
            NodeBody::ItemSingle(_) => RmType::ItemSingle,
            NodeBody::ItemTable(_) => RmType::ItemTable,
            NodeBody::Cluster(_) => RmType::Cluster,
            NodeBody::Element(_) => RmType::Element,
        }
    }

    fn entry(&self) -> Option<&EntryCommon> {
        match self {
            NodeBody::Observation(Observation { entry, .. })
            | NodeBody::Evaluation(DataEntry { entry, .. })
            | NodeBody::AdminEntry(DataEntry { entry, .. })
            | NodeBody::Instruction(Instruction { entry, .. })
            | NodeBody::Action(Action { entry, .. }) => Some(entry),
            _ => None,
        }
    }

    fn entry_mut(&mut self) -> Option<&mut EntryCommon> {
        match self {
            NodeBody::Observation(Observation { entry, .. })
            | NodeBody::Evaluation(DataEntry { entry, .. })
            | NodeBody::AdminEntry(DataEntry { entry, .. })
            | NodeBody::Instruction(Instruction { entry, .. })
            | NodeBody::Action(Action { entry, .. }) => Some(entry),
            _ => None,
        }
    }

    /// The node-valued storage behind an attribute.
    pub(crate) fn slot(&self, attribute: RmAttribute) -> Option<SlotRef<'_>> {
        use RmAttribute as A;
        let slot = match (self, attribute) {
            (NodeBody::Composition(c), A::Content) => SlotRef::Multiple(&c.content),
            (NodeBody::Composition(c), A::OtherContext) => {
                SlotRef::Single(c.context.as_ref()?.other_context)
            }
            (NodeBody::Section(s), A::Items)
            | (NodeBody::ItemTree(s), A::Items)
            | (NodeBody::ItemList(s), A::Items)
            | (NodeBody::Cluster(s), A::Items)
            | (NodeBody::ItemTable(s), A::Rows) => SlotRef::Multiple(&s.items),
            (
                NodeBody::Observation(_)
                | NodeBody::Evaluation(_)
                | NodeBody::Instruction(_)
                | NodeBody::Action(_),
                A::Protocol,
            ) => SlotRef::Single(self.entry()?.protocol),
            (NodeBody::Observation(o), A::Data) => SlotRef::Single(o.data),
            (NodeBody::Observation(o), A::State) => SlotRef::Single(o.state),
            (NodeBody::Evaluation(e) | NodeBody::AdminEntry(e), A::Data) => {
                SlotRef::Single(e.data)
            }
            (NodeBody::Instruction(i), A::Activities) => SlotRef::Multiple(&i.activities),
            (NodeBody::Activity(a), A::Description) => SlotRef::Single(a.description),
            (NodeBody::Action(a), A::Description) => SlotRef::Single(a.description),
            (NodeBody::History(h), A::Summary) => SlotRef::Single(h.summary),
            (NodeBody::History(h), A::Events) => SlotRef::Multiple(&h.events),
            (NodeBody::PointEvent(e) | NodeBody::IntervalEvent(e), A::Data) => {
                SlotRef::Single(e.data)
            }
            (NodeBody::PointEvent(e) | NodeBody::IntervalEvent(e), A::State) => {
                SlotRef::Single(e.state)
            }
            (NodeBody::ItemSingle(s), A::Item) => SlotRef::Single(s.item),
            _ => return None,
        };
        Some(slot)
    }

    pub(crate) fn slot_mut(&mut self, attribute: RmAttribute) -> Option<SlotMut<'_>> {
        use RmAttribute as A;
        if attribute == A::Protocol
            && matches!(
                self,
                NodeBody::Observation(_)
                    | NodeBody::Evaluation(_)
                    | NodeBody::Instruction(_)
                    | NodeBody::Action(_)
            )
        {
            return self
                .entry_mut()
                .map(|entry| SlotMut::Single(&mut entry.protocol));
        }
        let slot = match (self, attribute) {
            (NodeBody::Composition(c), A::Content) => SlotMut::Multiple(&mut c.content),
            (NodeBody::Composition(c), A::OtherContext) => {
                SlotMut::Single(&mut c.context.as_mut()?.other_context)
            }
            (NodeBody::Section(s), A::Items)
            | (NodeBody::ItemTree(s), A::Items)
            | (NodeBody::ItemList(s), A::Items)
            | (NodeBody::Cluster(s), A::Items)
            | (NodeBody::ItemTable(s), A::Rows) => SlotMut::Multiple(&mut s.items),
            (NodeBody::Observation(o), A::Data) => SlotMut::Single(&mut o.data),
            (NodeBody::Observation(o), A::State) => SlotMut::Single(&mut o.state),
            (NodeBody::Evaluation(e) | NodeBody::AdminEntry(e), A::Data) => {
                SlotMut::Single(&mut e.data)
            }
            (NodeBody::Instruction(i), A::Activities) => SlotMut::Multiple(&mut i.activities),
            (NodeBody::Activity(a), A::Description) => SlotMut::Single(&mut a.description),
            (NodeBody::Action(a), A::Description) => SlotMut::Single(&mut a.description),
            (NodeBody::History(h), A::Summary) => SlotMut::Single(&mut h.summary),
            (NodeBody::History(h), A::Events) => SlotMut::Multiple(&mut h.events),
            (NodeBody::PointEvent(e) | NodeBody::IntervalEvent(e), A::Data) => {
                SlotMut::Single(&mut e.data)
            }
            (NodeBody::PointEvent(e) | NodeBody::IntervalEvent(e), A::State) => {
                SlotMut::Single(&mut e.state)
            }
            (NodeBody::ItemSingle(s), A::Item) => SlotMut::Single(&mut s.item),
            _ => return None,
        };
        Some(slot)
    }

    /// The value stored behind a value attribute.
    pub(crate) fn value(&self, attribute: RmAttribute) -> Option<RmValue> {
        use RmAttribute as A;
        let date_time = |v: &Option<DvDateTime>| v.clone().map(|v| RmValue::Data(DataValue::DateTime(v)));
        let duration = |v: &Option<DvDuration>| v.clone().map(|v| RmValue::Data(DataValue::Duration(v)));
        let coded = |v: &Option<DvCodedText>| v.clone().map(|v| RmValue::Data(DataValue::CodedText(v)));
        let text = |v: &Option<TextValue>| v.clone().map(|v| RmValue::Data(v.into()));

        if let Some(entry) = self.entry() {
            match attribute {
                A::Language => return entry.language.clone().map(RmValue::CodePhrase),
                A::Encoding => return entry.encoding.clone().map(RmValue::CodePhrase),
                A::Subject => return entry.subject.clone().map(RmValue::Party),
                _ => {}
            }
        }

        match (self, attribute) {
            (NodeBody::Composition(c), A::Language) => c.language.clone().map(RmValue::CodePhrase),
            (NodeBody::Composition(c), A::Territory) => {
                c.territory.clone().map(RmValue::CodePhrase)
            }
            (NodeBody::Composition(c), A::Category) => coded(&c.category),
            (NodeBody::Composition(c), A::Composer) => c.composer.clone().map(RmValue::Party),
            (NodeBody::Composition(c), A::Context) => c.context.clone().map(RmValue::Context),
            (NodeBody::Instruction(i), A::Narrative) => text(&i.narrative),
            (NodeBody::Instruction(i), A::ExpiryTime) => date_time(&i.expiry_time),
            (NodeBody::Activity(a), A::Timing) => text(&a.timing),
            (NodeBody::Activity(a), A::ActionArchetypeId) => {
                a.action_archetype_id.clone().map(RmValue::String)
            }
            (NodeBody::Action(a), A::Time) => date_time(&a.time),
            (NodeBody::Action(a), A::IsmTransition) => {
                a.ism_transition.clone().map(RmValue::IsmTransition)
            }
            (NodeBody::History(h), A::Origin) => date_time(&h.origin),
            (NodeBody::History(h), A::Period) => duration(&h.period),
            (NodeBody::History(h), A::Duration) => duration(&h.duration),
            (NodeBody::PointEvent(e) | NodeBody::IntervalEvent(e), A::Time) => date_time(&e.time),
            (NodeBody::PointEvent(e) | NodeBody::IntervalEvent(e), A::Offset) => {
                duration(&e.offset)
            }
            (NodeBody::IntervalEvent(e), A::Width) => duration(&e.width),
            (NodeBody::IntervalEvent(e), A::MathFunction) => coded(&e.math_function),
            (NodeBody::IntervalEvent(e), A::SampleCount) => e.sample_count.map(RmValue::Integer),
            (NodeBody::Element(e), A::Value) => e.value.clone().map(RmValue::Data),
            (NodeBody::Element(e), A::NullFlavour) => coded(&e.null_flavour),
            _ => None,
        }
    }

    /// Stores a value; returns `false` if the value has the wrong kind for the attribute.
    pub(crate) fn set_value(&mut self, attribute: RmAttribute, value: RmValue) -> bool {
        use RmAttribute as A;

        if let Some(entry) = self.entry_mut() {
            match attribute {
                A::Language => return store(&mut entry.language, value.into_code_phrase()),
                A::Encoding => return store(&mut entry.encoding, value.into_code_phrase()),
                A::Subject => return store(&mut entry.subject, value.into_party()),
                _ => {}
            }
        }

        match (self, attribute) {
            (NodeBody::Composition(c), A::Language) => {
                store(&mut c.language, value.into_code_phrase())
            }
            (NodeBody::Composition(c), A::Territory) => {
                store(&mut c.territory, value.into_code_phrase())
            }
            (NodeBody::Composition(c), A::Category) => {
                store(&mut c.category, value.into_coded_text())
            }
            (NodeBody::Composition(c), A::Composer) => store(&mut c.composer, value.into_party()),
            (NodeBody::Composition(c), A::Context) => match value.into_context() {
                Some(mut context) => {
                    // The other_context subtree is managed through attach/detach only.
                    context.other_context = c.context.as_ref().and_then(|old| old.other_context);
                    c.context = Some(context);
                    true
                }
                None => false,
            },
            (NodeBody::Instruction(i), A::Narrative) => store(&mut i.narrative, value.into_text()),
            (NodeBody::Instruction(i), A::ExpiryTime) => {
                store(&mut i.expiry_time, value.into_date_time())
            }
            (NodeBody::Activity(a), A::Timing) => store(&mut a.timing, value.into_text()),
            (NodeBody::Activity(a), A::ActionArchetypeId) => {
                store(&mut a.action_archetype_id, value.into_string())
            }
            (NodeBody::Action(a), A::Time) => store(&mut a.time, value.into_date_time()),
            (NodeBody::Action(a), A::IsmTransition) => {
                store(&mut a.ism_transition, value.into_ism_transition())
            }
            (NodeBody::History(h), A::Origin) => store(&mut h.origin, value.into_date_time()),
            (NodeBody::History(h), A::Period) => store(&mut h.period, value.into_duration()),
            (NodeBody::History(h), A::Duration) => store(&mut h.duration, value.into_duration()),
            (NodeBody::PointEvent(e) | NodeBody::IntervalEvent(e), A::Time) => {
                store(&mut e.time, value.into_date_time())
            }
            (NodeBody::PointEvent(e) | NodeBody::IntervalEvent(e), A::Offset) => {
                store(&mut e.offset, value.into_duration())
            }
            (NodeBody::IntervalEvent(e), A::Width) => store(&mut e.width, value.into_duration()),
            (NodeBody::IntervalEvent(e), A::MathFunction) => {
                store(&mut e.math_function, value.into_coded_text())
            }
            (NodeBody::IntervalEvent(e), A::SampleCount) => {
                store(&mut e.sample_count, value.into_integer())
            }
            (NodeBody::Element(e), A::Value) => store(&mut e.value, value.into_data()),
            (NodeBody::Element(e), A::NullFlavour) => {
                store(&mut e.null_flavour, value.into_coded_text())
            }
            _ => false,
        }
    }

    /// Unsets a value attribute; returns `false` if the kind has no such value attribute.
    pub(crate) fn clear_value(&mut self, attribute: RmAttribute) -> bool {
        use RmAttribute as A;

        if let Some(entry) = self.entry_mut() {
            match attribute {
                A::Language => return take(&mut entry.language),
                A::Encoding => return take(&mut entry.encoding),
                A::Subject => return take(&mut entry.subject),
                _ => {}
            }
        }

        match (self, attribute) {
            (NodeBody::Composition(c), A::Language) => take(&mut c.language),
            (NodeBody::Composition(c), A::Territory) => take(&mut c.territory),
            (NodeBody::Composition(c), A::Category) => take(&mut c.category),
            (NodeBody::Composition(c), A::Composer) => take(&mut c.composer),
            (NodeBody::Instruction(i), A::Narrative) => take(&mut i.narrative),
            (NodeBody::Instruction(i), A::ExpiryTime) => take(&mut i.expiry_time),
            (NodeBody::Activity(a), A::Timing) => take(&mut a.timing),
            (NodeBody::Activity(a), A::ActionArchetypeId) => take(&mut a.action_archetype_id),
            (NodeBody::Action(a), A::Time) => take(&mut a.time),
            (NodeBody::Action(a), A::IsmTransition) => take(&mut a.ism_transition),
            (NodeBody::History(h), A::Origin) => take(&mut h.origin),
            (NodeBody::History(h), A::Period) => take(&mut h.period),
            (NodeBody::History(h), A::Duration) => take(&mut h.duration),
            (NodeBody::PointEvent(e) | NodeBody::IntervalEvent(e), A::Time) => take(&mut e.time),
            (NodeBody::PointEvent(e) | NodeBody::IntervalEvent(e), A::Offset) => {
                take(&mut e.offset)
            }
            (NodeBody::IntervalEvent(e), A::Width) => take(&mut e.width),
            (NodeBody::IntervalEvent(e), A::MathFunction) => take(&mut e.math_function),
            (NodeBody::IntervalEvent(e), A::SampleCount) => take(&mut e.sample_count),
            (NodeBody::Element(e), A::Value) => take(&mut e.value),
            (NodeBody::Element(e), A::NullFlavour) => take(&mut e.null_flavour),
            _ => false,
        }
    }

    /// The origin of a `HISTORY` body.
    pub(crate) fn history_origin(&self) -> Option<&DvDateTime> {
        match self {
            NodeBody::History(h) => h.origin.as_ref(),
            _ => None,
        }
    }

    /// The time of an event body.
    pub(crate) fn event_time(&self) -> Option<&DvDateTime> {
        match self {
            NodeBody::PointEvent(e) | NodeBody::IntervalEvent(e) => e.time.as_ref(),
            _ => None,
        }
    }
}

fn store<T>(slot: &mut Option<T>, value: Option<T>) -> bool {
    match value {
        Some(value) => {
            *slot = Some(value);
            true
        }
        None => false,
    }
}

fn take<T>(slot: &mut Option<T>) -> bool {
    *slot = None;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_nodes_reject_blank_names_and_node_ids() {
        assert!(matches!(
            Locatable::new(RmType::Element, "at0004", "  "),
            Err(OpenEhrError::EmptyName)
        ));
        assert!(matches!(
            Locatable::new(RmType::Element, "", "Systolic"),
            Err(OpenEhrError::Text(_))
        ));
    }

    #[test]
    fn archetype_roots_are_recognised_by_node_id() {
        let root = Locatable::new(
            RmType::Observation,
            "openEHR-EHR-OBSERVATION.blood_pressure.v1",
            "Blood pressure",
        )
        .unwrap();
        assert!(root.is_archetype_root());
        assert_eq!(
            root.archetype_id().map(|id| id.concept),
            Some("blood_pressure".to_string())
        );

        let inner = Locatable::new(RmType::Element, "at0004", "Systolic").unwrap();
        assert!(!inner.is_archetype_root());
    }

    #[test]
    fn value_attributes_check_the_value_kind() {
        let mut element = Locatable::new(RmType::Element, "at0004", "Systolic").unwrap();
        let quantity = RmValue::Data(DataValue::Quantity(crate::data_types::DvQuantity::new(
            120.0, "mm[Hg]",
        )));
        assert!(element.body.set_value(RmAttribute::Value, quantity.clone()));
        assert!(!element
            .body
            .set_value(RmAttribute::NullFlavour, RmValue::Integer(3)));
        assert!(matches!(
            element.attribute(RmAttribute::Value),
            Some(AttributeRef::Value(v)) if v == quantity
        ));
    }

    #[test]
    fn entries_share_language_subject_and_protocol_storage() {
        let mut evaluation = Locatable::new(RmType::Evaluation, "at0000", "Risk").unwrap();
        assert!(evaluation.body.set_value(
            RmAttribute::Language,
            RmValue::CodePhrase(CodePhrase::new("ISO_639-1", "en"))
        ));
        assert!(matches!(
            evaluation.attribute(RmAttribute::Language),
            Some(AttributeRef::Value(RmValue::CodePhrase(code))) if code.code_string == "en"
        ));
        assert!(matches!(
            evaluation.body.slot_mut(RmAttribute::Protocol),
            Some(SlotMut::Single(_))
        ));
        // ADMIN_ENTRY carries no protocol.
        let mut admin = Locatable::new(RmType::AdminEntry, "at0000", "Admin").unwrap();
        assert!(admin.body.slot_mut(RmAttribute::Protocol).is_none());
        assert!(admin.attribute(RmAttribute::Protocol).is_none());
    }
}
