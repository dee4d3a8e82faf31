//! Ordered child collections with node-id and name indexes.
//!
//! A [`LocatableCollection`] backs every multiple-valued node attribute (`content`, `items`,
//! `events`, ...). Members keep insertion order and are additionally indexed by archetype node
//! id and, within a node id, by name. The pair `(node id, name)` is unique inside a
//! collection; this is what lets a path segment such as `items[at0004 and name/value='Systolic']`
//! identify exactly one member.

use super::tree::NodeHandle;
use crate::data_types::TextValue;
use crate::{OpenEhrError, OpenEhrResult};
use std::collections::HashMap;

/// The identity of a name inside one node-id group.
///
/// Plain names are keyed by their text, coded names by terminology and code, so a coded name
/// and a plain name with the same text can coexist.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum NameKey {
    Text(String),
    Coded { terminology_id: String, code: String },
}

impl NameKey {
    pub fn of(name: &TextValue) -> Self {
        match name.defining_code() {
            Some(code) => NameKey::Coded {
                terminology_id: code.terminology_id.value.clone(),
                code: code.code_string.clone(),
            },
            None => NameKey::Text(name.value().to_string()),
        }
    }
}

/// A name lookup as written in a path predicate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NameQuery {
    /// Matches on `name/value`.
    Text(String),
    /// Matches on the defining code; a missing terminology matches any terminology.
    Code {
        terminology_id: Option<String>,
        code: String,
    },
}

impl NameQuery {
    pub fn matches(&self, name: &TextValue) -> bool {
        match self {
            NameQuery::Text(text) => name.value() == text,
            NameQuery::Code {
                terminology_id,
                code,
            } => name.defining_code().is_some_and(|defining| {
                defining.code_string == *code
                    && terminology_id
                        .as_ref()
                        .map_or(true, |t| defining.terminology_id.value == *t)
            }),
        }
    }
}

/// What the collection needs to know about a node it indexes.
#[derive(Clone, Copy, Debug)]
pub struct Member<'a> {
    pub handle: NodeHandle,
    pub archetype_node_id: &'a str,
    pub name: &'a TextValue,
    /// The node's current parent, if it has one.
    pub parent: Option<NodeHandle>,
}

#[derive(Clone, Debug, Default)]
struct NodeIdGroup {
    members: Vec<NodeHandle>,
    by_name: HashMap<NameKey, NodeHandle>,
    by_text: HashMap<String, Vec<NodeHandle>>,
    names: HashMap<NodeHandle, TextValue>,
}

impl NodeIdGroup {
    fn add(&mut self, handle: NodeHandle, name: &TextValue) {
        self.members.push(handle);
        self.by_name.insert(NameKey::of(name), handle);
        self.by_text
            .entry(name.value().to_string())
            .or_default()
            .push(handle);
        self.names.insert(handle, name.clone());
    }

    fn drop_member(&mut self, handle: NodeHandle) -> Option<TextValue> {
        let name = self.names.remove(&handle)?;
        self.members.retain(|m| *m != handle);
        self.by_name.remove(&NameKey::of(&name));
        if let Some(same_text) = self.by_text.get_mut(name.value()) {
            same_text.retain(|m| *m != handle);
            if same_text.is_empty() {
                self.by_text.remove(name.value());
            }
        }
        Some(name)
    }

    fn lookup(&self, query: &NameQuery) -> Option<NodeHandle> {
        match query {
            NameQuery::Text(text) => self
                .by_name
                .get(&NameKey::Text(text.clone()))
                .or_else(|| self.by_text.get(text).and_then(|all| all.first()))
                .copied(),
            NameQuery::Code {
                terminology_id: Some(terminology_id),
                code,
            } => self
                .by_name
                .get(&NameKey::Coded {
                    terminology_id: terminology_id.clone(),
                    code: code.clone(),
                })
                .copied(),
            NameQuery::Code { .. } => self
                .members
                .iter()
                .find(|m| self.names.get(m).is_some_and(|name| query.matches(name)))
                .copied(),
        }
    }
}

/// An ordered collection of child nodes, indexed by archetype node id and name.
#[derive(Clone, Debug, Default)]
pub struct LocatableCollection {
    parent: Option<NodeHandle>,
    members: Vec<NodeHandle>,
    groups: HashMap<String, NodeIdGroup>,
    node_ids: HashMap<NodeHandle, String>,
}

impl LocatableCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// The node owning this collection, established by the first insert.
    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    /// Appends a member on behalf of `owner`.
    ///
    /// # Errors
    ///
    /// - [`OpenEhrError::ParentConflict`] if the member already has a different parent, or
    ///   `owner` differs from the collection's established parent.
    /// - [`OpenEhrError::DuplicateName`] if a member with the same node id and name exists.
    pub fn insert(&mut self, owner: NodeHandle, member: Member<'_>) -> OpenEhrResult<()> {
        let parent = self.parent.unwrap_or(owner);
        if owner != parent || member.parent.is_some_and(|p| p != parent) {
            return Err(OpenEhrError::ParentConflict(member.handle));
        }
        if self.node_ids.contains_key(&member.handle) {
            return Err(self.duplicate(member.archetype_node_id, member.name));
        }
        if self
            .groups
            .get(member.archetype_node_id)
            .is_some_and(|group| group.by_name.contains_key(&NameKey::of(member.name)))
        {
            return Err(self.duplicate(member.archetype_node_id, member.name));
        }

        self.groups
            .entry(member.archetype_node_id.to_string())
            .or_default()
            .add(member.handle, member.name);
        self.node_ids
            .insert(member.handle, member.archetype_node_id.to_string());
        self.members.push(member.handle);
        self.parent = Some(parent);
        Ok(())
    }

    fn duplicate(&self, node_id: &str, name: &TextValue) -> OpenEhrError {
        OpenEhrError::DuplicateName {
            node_id: node_id.to_string(),
            name: name.value().to_string(),
        }
    }

    /// Removes a member; its node-id group disappears when it becomes empty.
    ///
    /// # Errors
    ///
    /// Returns [`OpenEhrError::NotACollectionMember`] if `handle` is not in the collection.
    pub fn remove(&mut self, handle: NodeHandle) -> OpenEhrResult<()> {
        let node_id = self
            .node_ids
            .remove(&handle)
            .ok_or(OpenEhrError::NotACollectionMember(handle))?;
        if let Some(group) = self.groups.get_mut(&node_id) {
            group.drop_member(handle);
            if group.members.is_empty() {
                self.groups.remove(&node_id);
            }
        }
        self.members.retain(|m| *m != handle);
        Ok(())
    }

    /// Re-indexes a member under a new name.
    ///
    /// # Errors
    ///
    /// - [`OpenEhrError::NotACollectionMember`] if `handle` is not in the collection.
    /// - [`OpenEhrError::DuplicateName`] if another member of the same node id has that name.
    pub fn rename(&mut self, handle: NodeHandle, name: &TextValue) -> OpenEhrResult<()> {
        let node_id = self
            .node_ids
            .get(&handle)
            .ok_or(OpenEhrError::NotACollectionMember(handle))?
            .clone();
        let group = self
            .groups
            .get_mut(&node_id)
            .ok_or(OpenEhrError::NotACollectionMember(handle))?;

        if group
            .by_name
            .get(&NameKey::of(name))
            .is_some_and(|existing| *existing != handle)
        {
            return Err(OpenEhrError::DuplicateName {
                node_id,
                name: name.value().to_string(),
            });
        }

        // Keep the member's position in its group and in the collection.
        let position = group.members.iter().position(|m| *m == handle);
        group.drop_member(handle);
        group.add(handle, name);
        if let Some(position) = position {
            if let Some(moved) = group.members.pop() {
                group.members.insert(position, moved);
            }
        }
        Ok(())
    }

    /// Removes every member and index entry.
    pub fn clear(&mut self) {
        self.members.clear();
        self.groups.clear();
        self.node_ids.clear();
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Returns `true` if the node is a member of this collection.
    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.node_ids.contains_key(&handle)
    }

    /// Members in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        self.members.iter().copied()
    }

    pub fn contains_node_id(&self, node_id: &str) -> bool {
        self.groups.contains_key(node_id)
    }

    /// Members with the given node id, in insertion order.
    pub fn with_node_id(&self, node_id: &str) -> &[NodeHandle] {
        self.groups
            .get(node_id)
            .map(|group| group.members.as_slice())
            .unwrap_or(&[])
    }

    /// Returns `true` if a member with this node id answers to the name.
    pub fn contains_name(&self, node_id: &str, name: &NameQuery) -> bool {
        self.lookup(node_id, name).is_some()
    }

    /// The member with the given node id and name.
    ///
    /// A text query prefers a plain name with that exact text over a coded name whose text
    /// matches.
    pub fn lookup(&self, node_id: &str, name: &NameQuery) -> Option<NodeHandle> {
        self.groups.get(node_id)?.lookup(name)
    }

    /// Members of any node id whose name matches, in insertion order.
    pub fn with_name(&self, name: &NameQuery) -> Vec<NodeHandle> {
        self.members
            .iter()
            .filter(|m| self.name_of(**m).is_some_and(|n| name.matches(n)))
            .copied()
            .collect()
    }

    /// The node id a member was indexed under, or `None` for a non-member.
    pub fn node_id_of(&self, handle: NodeHandle) -> Option<&str> {
        self.node_ids.get(&handle).map(String::as_str)
    }

    /// The name a member was indexed under.
    ///
    /// This is the name recorded at insert or rename time, not a fresh read of the node.
    pub fn name_of(&self, handle: NodeHandle) -> Option<&TextValue> {
        let node_id = self.node_ids.get(&handle)?;
        self.groups.get(node_id)?.names.get(&handle)
    }

    /// Returns `true` if another member of the same node id shares this member's name text.
    pub fn has_same_text_sibling(&self, handle: NodeHandle) -> bool {
        let Some(node_id) = self.node_ids.get(&handle) else {
            return false;
        };
        let Some(group) = self.groups.get(node_id) else {
            return false;
        };
        group
            .names
            .get(&handle)
            .and_then(|name| group.by_text.get(name.value()))
            .is_some_and(|same_text| same_text.len() > 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::CodePhrase;

    fn member<'a>(handle: usize, node_id: &'a str, name: &'a TextValue) -> Member<'a> {
        Member {
            handle: NodeHandle::from_index(handle),
            archetype_node_id: node_id,
            name,
            parent: None,
        }
    }

    const OWNER: NodeHandle = NodeHandle::from_index(0);

    #[test]
    fn looks_up_members_by_node_id_and_name() {
        let systolic = TextValue::plain("Systolic");
        let diastolic = TextValue::plain("Diastolic");
        let mut items = LocatableCollection::new();
        items.insert(OWNER, member(1, "at0004", &systolic)).unwrap();
        items.insert(OWNER, member(2, "at0004", &diastolic)).unwrap();

        assert_eq!(items.len(), 2);
        assert_eq!(items.with_node_id("at0004").len(), 2);
        assert_eq!(
            items.lookup("at0004", &NameQuery::Text("Diastolic".into())),
            Some(NodeHandle::from_index(2))
        );
        assert!(!items.contains_name("at0005", &NameQuery::Text("Systolic".into())));
        assert_eq!(items.parent(), Some(OWNER));
    }

    #[test]
    fn rejects_duplicate_node_id_and_name() {
        let name = TextValue::plain("Systolic");
        let mut items = LocatableCollection::new();
        items.insert(OWNER, member(1, "at0004", &name)).unwrap();

        let err = items.insert(OWNER, member(2, "at0004", &name)).unwrap_err();
        assert!(matches!(err, OpenEhrError::DuplicateName { .. }));
        // Same name under a different node id is fine.
        items.insert(OWNER, member(3, "at0005", &name)).unwrap();
        assert_eq!(items.len(), 2);

        // Once the holder is gone the (node id, name) pair is free again.
        items.remove(NodeHandle::from_index(1)).unwrap();
        items.insert(OWNER, member(4, "at0004", &name)).unwrap();
        assert_eq!(items.len(), 2);
        assert!(items.contains(NodeHandle::from_index(4)));
    }

    #[test]
    fn rejects_members_owned_by_another_parent() {
        let name = TextValue::plain("Pulse");
        let mut items = LocatableCollection::new();
        let mut adopted = member(1, "at0001", &name);
        adopted.parent = Some(NodeHandle::from_index(9));

        assert!(matches!(
            items.insert(OWNER, adopted),
            Err(OpenEhrError::ParentConflict(_))
        ));

        items.insert(OWNER, member(2, "at0002", &name)).unwrap();
        assert!(matches!(
            items.insert(NodeHandle::from_index(7), member(3, "at0003", &name)),
            Err(OpenEhrError::ParentConflict(_))
        ));
    }

    #[test]
    fn removing_the_last_member_drops_the_group() {
        let name = TextValue::plain("Systolic");
        let mut items = LocatableCollection::new();
        items.insert(OWNER, member(1, "at0004", &name)).unwrap();
        items.remove(NodeHandle::from_index(1)).unwrap();

        assert!(items.is_empty());
        assert!(!items.contains_node_id("at0004"));
        assert!(matches!(
            items.remove(NodeHandle::from_index(1)),
            Err(OpenEhrError::NotACollectionMember(_))
        ));
    }

    #[test]
    fn index_agrees_with_members_after_mixed_operations() {
        let names: Vec<TextValue> = (0..6)
            .map(|i| TextValue::plain(format!("Reading {}", i % 3)))
            .collect();
        let mut items = LocatableCollection::new();
        for (i, name) in names.iter().enumerate() {
            let node_id = if i < 3 { "at0001" } else { "at0002" };
            items.insert(OWNER, member(i + 1, node_id, name)).unwrap();
        }
        items.remove(NodeHandle::from_index(2)).unwrap();
        items.remove(NodeHandle::from_index(5)).unwrap();

        for handle in items.iter() {
            let node_id = items.node_id_of(handle).unwrap();
            let name = items.name_of(handle).unwrap();
            assert_eq!(
                items.lookup(node_id, &NameQuery::Text(name.value().into())),
                Some(handle)
            );
        }
        let indexed: usize = ["at0001", "at0002"]
            .iter()
            .map(|id| items.with_node_id(id).len())
            .sum();
        assert_eq!(indexed, items.len());
    }

    #[test]
    fn coded_names_match_by_code_with_optional_terminology() {
        let coded = TextValue::coded("Standing", CodePhrase::new("local", "at1001"));
        let plain = TextValue::plain("Standing");
        let mut items = LocatableCollection::new();
        items.insert(OWNER, member(1, "at0008", &coded)).unwrap();
        items.insert(OWNER, member(2, "at0008", &plain)).unwrap();

        let wildcard = NameQuery::Code {
            terminology_id: None,
            code: "at1001".into(),
        };
        assert_eq!(items.lookup("at0008", &wildcard), Some(NodeHandle::from_index(1)));
        assert_eq!(
            items.lookup("at0008", &NameQuery::Text("Standing".into())),
            Some(NodeHandle::from_index(2))
        );
        assert!(items.has_same_text_sibling(NodeHandle::from_index(1)));
    }

    #[test]
    fn rename_keeps_position_and_checks_uniqueness() {
        let first = TextValue::plain("First");
        let second = TextValue::plain("Second");
        let mut items = LocatableCollection::new();
        items.insert(OWNER, member(1, "at0001", &first)).unwrap();
        items.insert(OWNER, member(2, "at0001", &second)).unwrap();

        assert!(matches!(
            items.rename(NodeHandle::from_index(2), &first),
            Err(OpenEhrError::DuplicateName { .. })
        ));
        items
            .rename(NodeHandle::from_index(1), &TextValue::plain("Renamed"))
            .unwrap();
        assert_eq!(
            items.with_node_id("at0001").first(),
            Some(&NodeHandle::from_index(1))
        );
        assert!(items.lookup("at0001", &NameQuery::Text("First".into())).is_none());
    }

    #[test]
    fn clear_drops_members_and_indexes() {
        let name = TextValue::plain("Pulse");
        let mut items = LocatableCollection::new();
        items.insert(OWNER, member(1, "at0001", &name)).unwrap();
        items.clear();
        assert!(items.is_empty());
        assert!(!items.contains_node_id("at0001"));
        items.insert(OWNER, member(1, "at0001", &name)).unwrap();
    }
}
