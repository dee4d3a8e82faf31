//! The node arena.
//!
//! [`RmTree`] owns every node; nodes refer to their parent and children by [`NodeHandle`].
//! All structural and value mutations go through the tree so that collection indexes, parent
//! links and the path cache stay consistent.

use super::collection::{LocatableCollection, Member};
use super::locatable::{AttributeRef, Locatable, SlotMut};
use super::support::{Archetyped, FeederAudit, Link};
use super::value::{RmItem, RmValue};
use super::{rm_type_conforms, AttributeKind, RmAttribute};
use crate::config::CoreConfig;
use crate::data_types::{DataValue, DvDuration, HierObjectId, TextValue};
use crate::path::PathCache;
use crate::{OpenEhrError, OpenEhrResult};
use std::fmt;

/// A copyable reference to a node in an [`RmTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(usize);

impl NodeHandle {
    pub const fn from_index(index: usize) -> Self {
        NodeHandle(index)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// The result of reading an attribute during navigation.
#[derive(Clone, Debug)]
pub enum Navigated<'a> {
    Single(RmItem),
    Multiple(&'a LocatableCollection),
}

/// An arena of locatable nodes forming one or more trees.
#[derive(Debug)]
pub struct RmTree {
    nodes: Vec<Option<Locatable>>,
    config: CoreConfig,
    pub(crate) cache: PathCache,
}

impl Default for RmTree {
    fn default() -> Self {
        Self::with_config(CoreConfig::default())
    }
}

impl Clone for RmTree {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone(),
            config: self.config.clone(),
            cache: PathCache::new(self.config.path_cache_enabled()),
        }
    }
}

impl RmTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty tree whose path cache and evaluator follow `config`.
    pub fn with_config(config: CoreConfig) -> Self {
        Self {
            nodes: Vec::new(),
            cache: PathCache::new(config.path_cache_enabled()),
            config,
        }
    }

    /// The configuration the tree was created with.
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Adds a detached node and returns its handle.
    pub fn insert(&mut self, mut node: Locatable) -> NodeHandle {
        node.set_parent(None);
        let handle = NodeHandle(self.nodes.len());
        self.nodes.push(Some(node));
        handle
    }

    /// # Errors
    ///
    /// Returns [`OpenEhrError::UnknownNode`] if the handle was never issued or was removed.
    pub fn get(&self, handle: NodeHandle) -> OpenEhrResult<&Locatable> {
        self.nodes
            .get(handle.0)
            .and_then(Option::as_ref)
            .ok_or(OpenEhrError::UnknownNode(handle))
    }

    fn get_mut(&mut self, handle: NodeHandle) -> OpenEhrResult<&mut Locatable> {
        self.nodes
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or(OpenEhrError::UnknownNode(handle))
    }

    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.get(handle).is_ok()
    }

    /// Live nodes in handle order.
    pub fn handles(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.is_some())
            .map(|(index, _)| NodeHandle(index))
    }

    /// Number of live nodes, attached or not.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|node| node.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The node's parent, or `None` for a root, a detached node or an unknown handle.
    pub fn parent(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.get(handle).ok().and_then(Locatable::parent)
    }

    /// The top of the tree containing `handle`.
    pub fn root_of(&self, handle: NodeHandle) -> NodeHandle {
        let mut current = handle;
        while let Some(parent) = self.parent(current) {
            current = parent;
        }
        current
    }

    /// Returns `true` if `ancestor` is a strict ancestor of `node`.
    pub fn is_ancestor(&self, ancestor: NodeHandle, node: NodeHandle) -> bool {
        let mut current = self.parent(node);
        while let Some(handle) = current {
            if handle == ancestor {
                return true;
            }
            current = self.parent(handle);
        }
        false
    }

    /// Every attached child of a node, attribute by attribute.
    pub fn children(&self, handle: NodeHandle) -> OpenEhrResult<Vec<(RmAttribute, NodeHandle)>> {
        Ok(self.get(handle)?.children())
    }

    /// The collection behind a multiple-valued attribute of a node.
    pub fn collection(
        &self,
        handle: NodeHandle,
        attribute: RmAttribute,
    ) -> Option<&LocatableCollection> {
        self.get(handle).ok()?.collection(attribute)
    }

    /// Attaches a detached node under `parent.attribute`.
    ///
    /// A single-valued attribute replaces and detaches its previous child; a multiple-valued
    /// attribute appends to its collection.
    ///
    /// # Errors
    ///
    /// - [`OpenEhrError::UnknownAttribute`] if the parent kind has no such node attribute.
    /// - [`OpenEhrError::IncompatibleChild`] if the child's type does not conform.
    /// - [`OpenEhrError::CyclicAttachment`] if the child is the parent or one of its ancestors.
    /// - [`OpenEhrError::ParentConflict`] if the child is already attached somewhere.
    /// - [`OpenEhrError::DuplicateName`] if a sibling with the same node id and name exists.
    pub fn attach(
        &mut self,
        parent: NodeHandle,
        attribute: RmAttribute,
        child: NodeHandle,
    ) -> OpenEhrResult<()> {
        let child_node = self.get(child)?;
        let child_type = child_node.rm_type();
        let child_parent = child_node.parent();
        let node_id = child_node.archetype_node_id().to_string();
        let name = child_node.name().clone();

        let parent_type = self.get(parent)?.rm_type();
        let spec = parent_type
            .attribute_spec(attribute)
            .filter(|spec| spec.kind != AttributeKind::Value)
            .ok_or_else(|| OpenEhrError::UnknownAttribute {
                rm_type: parent_type.to_string(),
                attribute: attribute.to_string(),
            })?;
        if !rm_type_conforms(child_type.as_str(), spec.rm_type) {
            return Err(OpenEhrError::IncompatibleChild {
                parent: parent_type.to_string(),
                attribute: attribute.to_string(),
                expected: spec.rm_type.to_string(),
                child: child_type.to_string(),
            });
        }
        if child == parent || self.is_ancestor(child, parent) {
            return Err(OpenEhrError::CyclicAttachment(child));
        }
        if child_parent.is_some() {
            return Err(OpenEhrError::ParentConflict(child));
        }

        let displaced = match self.get_mut(parent)?.body.slot_mut(attribute) {
            Some(SlotMut::Single(slot)) => slot.replace(child),
            Some(SlotMut::Multiple(children)) => {
                children.insert(
                    parent,
                    Member {
                        handle: child,
                        archetype_node_id: &node_id,
                        name: &name,
                        parent: child_parent,
                    },
                )?;
                None
            }
            None => {
                return Err(OpenEhrError::InvalidInput(format!(
                    "{}.{} cannot hold children until its owner is set",
                    parent_type, attribute
                )))
            }
        };

        if let Some(old) = displaced {
            self.get_mut(old)?.set_parent(None);
        }
        self.get_mut(child)?.set_parent(Some((parent, attribute)));
        tracing::debug!("attached {} under {}.{}", child, parent, attribute);
        self.invalidate();
        Ok(())
    }

    /// Detaches a node from its parent; a detached node is left unchanged.
    ///
    /// The node keeps its subtree and can be attached again elsewhere. Its name stops counting
    /// against its former siblings.
    ///
    /// # Errors
    ///
    /// Returns [`OpenEhrError::UnknownNode`] if the handle is not live.
    pub fn detach(&mut self, child: NodeHandle) -> OpenEhrResult<()> {
        let node = self.get(child)?;
        let (Some(parent), Some(attribute)) = (node.parent(), node.parent_attribute()) else {
            return Ok(());
        };

        match self.get_mut(parent)?.body.slot_mut(attribute) {
            Some(SlotMut::Single(slot)) => {
                if *slot == Some(child) {
                    *slot = None;
                }
            }
            Some(SlotMut::Multiple(children)) => children.remove(child)?,
            None => {}
        }
        self.get_mut(child)?.set_parent(None);
        self.invalidate();
        Ok(())
    }

    /// Detaches a node and drops it together with its whole subtree.
    ///
    /// # Arguments
    ///
    /// * `handle` - The root of the subtree to drop. Handles of dropped nodes are never reused.
    ///
    /// # Errors
    ///
    /// Returns [`OpenEhrError::UnknownNode`] if the handle is not live.
    pub fn remove(&mut self, handle: NodeHandle) -> OpenEhrResult<()> {
        self.detach(handle)?;
        let mut pending = vec![handle];
        while let Some(current) = pending.pop() {
            pending.extend(self.get(current)?.children().into_iter().map(|(_, c)| c));
            self.nodes[current.0] = None;
        }
        self.invalidate();
        Ok(())
    }

    /// Renames a node, re-indexing it in its parent's collection.
    ///
    /// # Errors
    ///
    /// - [`OpenEhrError::EmptyName`] if the text is blank.
    /// - [`OpenEhrError::DuplicateName`] if a sibling already carries the name.
    pub fn set_name(&mut self, handle: NodeHandle, name: TextValue) -> OpenEhrResult<()> {
        if name.value().trim().is_empty() {
            return Err(OpenEhrError::EmptyName);
        }
        let node = self.get(handle)?;
        if let (Some(parent), Some(attribute)) = (node.parent(), node.parent_attribute()) {
            if let Some(SlotMut::Multiple(children)) = self.get_mut(parent)?.body.slot_mut(attribute)
            {
                children.rename(handle, &name)?;
            }
        }
        self.get_mut(handle)?.set_name(name);
        self.invalidate();
        Ok(())
    }

    pub fn set_uid(&mut self, handle: NodeHandle, uid: Option<HierObjectId>) -> OpenEhrResult<()> {
        self.get_mut(handle)?.set_uid(uid);
        self.invalidate();
        Ok(())
    }

    pub fn set_archetype_details(
        &mut self,
        handle: NodeHandle,
        details: Option<Archetyped>,
    ) -> OpenEhrResult<()> {
        self.get_mut(handle)?.set_archetype_details(details);
        self.invalidate();
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`OpenEhrError::InvalidInput`] for `Some` of an empty list.
    pub fn set_links(&mut self, handle: NodeHandle, links: Option<Vec<Link>>) -> OpenEhrResult<()> {
        self.get_mut(handle)?.set_links(links)?;
        self.invalidate();
        Ok(())
    }

    pub fn set_feeder_audit(
        &mut self,
        handle: NodeHandle,
        audit: Option<FeederAudit>,
    ) -> OpenEhrResult<()> {
        self.get_mut(handle)?.set_feeder_audit(audit);
        self.invalidate();
        Ok(())
    }

    /// Sets a value attribute of a node.
    ///
    /// `name`, `uid` and `archetype_details` are routed to their dedicated setters; node
    /// attributes must be changed with [`attach`](Self::attach).
    ///
    /// # Errors
    ///
    /// - [`OpenEhrError::UnknownAttribute`] if the node kind has no such attribute.
    /// - [`OpenEhrError::ReadOnlyAttribute`] for `archetype_node_id` and `archetype_id`.
    /// - [`OpenEhrError::InvalidAttributeValue`] if the value has the wrong kind.
    pub fn set_value(
        &mut self,
        handle: NodeHandle,
        attribute: RmAttribute,
        value: RmValue,
    ) -> OpenEhrResult<()> {
        let rm_type = self.get(handle)?.rm_type();
        let actual = value.rm_type_name();
        let invalid = |expected: &str| OpenEhrError::InvalidAttributeValue {
            rm_type: rm_type.to_string(),
            attribute: attribute.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        };

        match attribute {
            RmAttribute::Name => {
                let name = value.into_text().ok_or_else(|| invalid("DV_TEXT"))?;
                return self.set_name(handle, name);
            }
            RmAttribute::Uid => {
                let uid = match value {
                    RmValue::ObjectId { value, .. } | RmValue::String(value) => {
                        HierObjectId::parse(&value)?
                    }
                    _ => return Err(invalid("HIER_OBJECT_ID")),
                };
                return self.set_uid(handle, Some(uid));
            }
            RmAttribute::ArchetypeDetails => {
                let RmValue::Archetyped(details) = value else {
                    return Err(invalid("ARCHETYPED"));
                };
                return self.set_archetype_details(handle, Some(details));
            }
            RmAttribute::ArchetypeNodeId | RmAttribute::ArchetypeId => {
                return Err(OpenEhrError::ReadOnlyAttribute {
                    rm_type: rm_type.to_string(),
                    attribute: attribute.to_string(),
                })
            }
            _ => {}
        }

        let spec = rm_type
            .attribute_spec(attribute)
            .ok_or_else(|| OpenEhrError::UnknownAttribute {
                rm_type: rm_type.to_string(),
                attribute: attribute.to_string(),
            })?;
        if spec.kind != AttributeKind::Value {
            return Err(invalid(spec.rm_type));
        }
        if !self.get_mut(handle)?.body.set_value(attribute, value) {
            return Err(invalid(spec.rm_type));
        }
        self.invalidate();
        Ok(())
    }

    /// Unsets a value attribute of a node.
    pub fn clear_value(&mut self, handle: NodeHandle, attribute: RmAttribute) -> OpenEhrResult<()> {
        let rm_type = self.get(handle)?.rm_type();
        let cleared = rm_type
            .attribute_spec(attribute)
            .is_some_and(|spec| spec.kind == AttributeKind::Value)
            && self.get_mut(handle)?.body.clear_value(attribute);
        if !cleared {
            return Err(OpenEhrError::UnknownAttribute {
                rm_type: rm_type.to_string(),
                attribute: attribute.to_string(),
            });
        }
        self.invalidate();
        Ok(())
    }

    /// Reads an attribute of a node or value by its path name.
    ///
    /// Unknown or unset attributes read as `None`. An event's `offset` falls back to the time
    /// elapsed since its history's origin.
    pub fn attribute(&self, item: &RmItem, name: &str) -> Option<Navigated<'_>> {
        match item {
            RmItem::Value(value) => value.attribute(name).map(Navigated::Single),
            RmItem::Node(handle) => {
                let node = self.get(*handle).ok()?;
                let attribute: RmAttribute = name.parse().ok()?;
                if attribute == RmAttribute::OtherContext {
                    return None;
                }
                match node.attribute(attribute) {
                    Some(AttributeRef::Node(child)) => Some(Navigated::Single(RmItem::Node(child))),
                    Some(AttributeRef::Nodes(children)) => Some(Navigated::Multiple(children)),
                    Some(AttributeRef::Value(value)) => {
                        Some(Navigated::Single(RmItem::Value(value)))
                    }
                    None if attribute == RmAttribute::Offset && node.rm_type().is_event() => self
                        .computed_offset(*handle)
                        .map(|offset| Navigated::Single(RmItem::Value(offset))),
                    None => None,
                }
            }
        }
    }

    fn computed_offset(&self, event: NodeHandle) -> Option<RmValue> {
        let node = self.get(event).ok()?;
        let time = node.body.event_time()?;
        let history = self.get(node.parent()?).ok()?;
        let origin = history.body.history_origin()?;
        Some(RmValue::Data(DataValue::Duration(DvDuration {
            value: time.value.since(&origin.value),
        })))
    }

    /// The RM type name of a node or value.
    pub fn rm_type_name(&self, item: &RmItem) -> Option<&'static str> {
        match item {
            RmItem::Node(handle) => self.get(*handle).ok().map(|n| n.rm_type().as_str()),
            RmItem::Value(value) => Some(value.rm_type_name()),
        }
    }

    fn invalidate(&mut self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::{CodePhrase, DvDateTime, DvQuantity, Iso8601DateTime};
    use crate::rm::{NameQuery, RmType};

    fn node(tree: &mut RmTree, rm_type: RmType, node_id: &str, name: &str) -> NodeHandle {
        tree.insert(Locatable::new(rm_type, node_id, name).unwrap())
    }

    #[test]
    fn attach_links_parent_and_indexes_collections() {
        let mut tree = RmTree::new();
        let cluster = node(&mut tree, RmType::Cluster, "at0001", "Device");
        let element = node(&mut tree, RmType::Element, "at0002", "Serial");

        tree.attach(cluster, RmAttribute::Items, element).unwrap();

        assert_eq!(tree.parent(element), Some(cluster));
        assert_eq!(
            tree.get(element).unwrap().parent_attribute(),
            Some(RmAttribute::Items)
        );
        let items = tree.collection(cluster, RmAttribute::Items).unwrap();
        assert_eq!(
            items.lookup("at0002", &NameQuery::Text("Serial".into())),
            Some(element)
        );
    }

    #[test]
    fn attach_rejects_incompatible_children() {
        let mut tree = RmTree::new();
        let list = node(&mut tree, RmType::ItemList, "at0001", "List");
        let cluster = node(&mut tree, RmType::Cluster, "at0002", "Nested");

        let err = tree.attach(list, RmAttribute::Items, cluster).unwrap_err();
        assert!(matches!(err, OpenEhrError::IncompatibleChild { .. }));
        assert!(matches!(
            tree.attach(list, RmAttribute::Value, cluster),
            Err(OpenEhrError::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn attach_rejects_cycles_and_second_parents() {
        let mut tree = RmTree::new();
        let outer = node(&mut tree, RmType::Cluster, "at0001", "Outer");
        let inner = node(&mut tree, RmType::Cluster, "at0002", "Inner");
        let other = node(&mut tree, RmType::Cluster, "at0003", "Other");
        tree.attach(outer, RmAttribute::Items, inner).unwrap();

        assert!(matches!(
            tree.attach(inner, RmAttribute::Items, outer),
            Err(OpenEhrError::ParentConflict(_)) | Err(OpenEhrError::CyclicAttachment(_))
        ));
        assert!(matches!(
            tree.attach(outer, RmAttribute::Items, outer),
            Err(OpenEhrError::CyclicAttachment(_))
        ));
        assert!(matches!(
            tree.attach(other, RmAttribute::Items, inner),
            Err(OpenEhrError::ParentConflict(_))
        ));
    }

    #[test]
    fn single_slots_replace_and_detach_the_previous_child() {
        let mut tree = RmTree::new();
        let single = node(&mut tree, RmType::ItemSingle, "at0001", "Single");
        let first = node(&mut tree, RmType::Element, "at0002", "First");
        let second = node(&mut tree, RmType::Element, "at0003", "Second");

        tree.attach(single, RmAttribute::Item, first).unwrap();
        tree.attach(single, RmAttribute::Item, second).unwrap();

        assert_eq!(tree.parent(first), None);
        assert_eq!(tree.children(single).unwrap(), vec![(RmAttribute::Item, second)]);
    }

    #[test]
    fn remove_drops_the_whole_subtree() {
        let mut tree = RmTree::new();
        let tree_node = node(&mut tree, RmType::ItemTree, "at0001", "Tree");
        let cluster = node(&mut tree, RmType::Cluster, "at0002", "Cluster");
        let element = node(&mut tree, RmType::Element, "at0003", "Element");
        tree.attach(tree_node, RmAttribute::Items, cluster).unwrap();
        tree.attach(cluster, RmAttribute::Items, element).unwrap();

        tree.remove(cluster).unwrap();

        assert!(!tree.contains(cluster));
        assert!(!tree.contains(element));
        assert!(tree
            .collection(tree_node, RmAttribute::Items)
            .unwrap()
            .is_empty());
        assert!(matches!(
            tree.get(element),
            Err(OpenEhrError::UnknownNode(_))
        ));
    }

    #[test]
    fn detached_siblings_release_their_names() {
        let mut tree = RmTree::new();
        let cluster = node(&mut tree, RmType::Cluster, "at0001", "Cluster");
        let first = node(&mut tree, RmType::Element, "at0002", "Reading");
        let second = node(&mut tree, RmType::Element, "at0002", "Reading");
        tree.attach(cluster, RmAttribute::Items, first).unwrap();

        assert!(matches!(
            tree.attach(cluster, RmAttribute::Items, second),
            Err(OpenEhrError::DuplicateName { .. })
        ));
        assert_eq!(tree.parent(second), None);

        tree.detach(first).unwrap();
        tree.attach(cluster, RmAttribute::Items, second).unwrap();
        assert_eq!(tree.parent(second), Some(cluster));
        assert!(matches!(
            tree.attach(cluster, RmAttribute::Items, first),
            Err(OpenEhrError::DuplicateName { .. })
        ));

        tree.remove(second).unwrap();
        tree.attach(cluster, RmAttribute::Items, first).unwrap();
        assert_eq!(tree.collection(cluster, RmAttribute::Items).unwrap().len(), 1);
    }

    #[test]
    fn renaming_keeps_sibling_names_unique() {
        let mut tree = RmTree::new();
        let cluster = node(&mut tree, RmType::Cluster, "at0001", "Cluster");
        let a = node(&mut tree, RmType::Element, "at0002", "A");
        let b = node(&mut tree, RmType::Element, "at0002", "B");
        tree.attach(cluster, RmAttribute::Items, a).unwrap();
        tree.attach(cluster, RmAttribute::Items, b).unwrap();

        assert!(matches!(
            tree.set_name(b, TextValue::plain("A")),
            Err(OpenEhrError::DuplicateName { .. })
        ));
        assert!(matches!(
            tree.set_name(b, TextValue::plain(" ")),
            Err(OpenEhrError::EmptyName)
        ));
        tree.set_name(b, TextValue::plain("C")).unwrap();
        assert_eq!(tree.get(b).unwrap().name().value(), "C");
    }

    #[test]
    fn set_value_checks_kinds_and_read_only_attributes() {
        let mut tree = RmTree::new();
        let element = node(&mut tree, RmType::Element, "at0004", "Systolic");

        tree.set_value(
            element,
            RmAttribute::Value,
            RmValue::Data(DataValue::Quantity(DvQuantity::new(120.0, "mm[Hg]"))),
        )
        .unwrap();
        assert!(matches!(
            tree.set_value(element, RmAttribute::Value, RmValue::Integer(1)),
            Err(OpenEhrError::InvalidAttributeValue { .. })
        ));
        assert!(matches!(
            tree.set_value(element, RmAttribute::ArchetypeNodeId, RmValue::String("x".into())),
            Err(OpenEhrError::ReadOnlyAttribute { .. })
        ));
        assert!(matches!(
            tree.set_value(
                element,
                RmAttribute::Language,
                RmValue::CodePhrase(CodePhrase::new("ISO_639-1", "en"))
            ),
            Err(OpenEhrError::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn event_offset_defaults_to_time_since_origin() {
        let mut tree = RmTree::new();
        let history = node(&mut tree, RmType::History, "at0002", "History");
        let event = node(&mut tree, RmType::PointEvent, "at0003", "Any event");
        let at = |raw: &str| {
            RmValue::Data(DataValue::DateTime(DvDateTime {
                value: Iso8601DateTime::parse(raw).unwrap(),
            }))
        };
        tree.set_value(history, RmAttribute::Origin, at("2024-03-01T10:00:00Z"))
            .unwrap();
        tree.set_value(event, RmAttribute::Time, at("2024-03-01T10:15:00Z"))
            .unwrap();
        tree.attach(history, RmAttribute::Events, event).unwrap();

        let offset = tree.attribute(&RmItem::Node(event), "offset");
        let Some(Navigated::Single(RmItem::Value(RmValue::Data(DataValue::Duration(d))))) = offset
        else {
            panic!("expected a computed offset");
        };
        assert_eq!(d.value.total_seconds(), 900.0);
    }
}
