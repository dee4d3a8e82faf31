//! Path resolution over an [`RmTree`].

use super::parser::{parse_path, ParsedPath, PathSegment, Predicate};
use super::PathResult;
use crate::rm::{
    LocatableCollection, Navigated, NameQuery, NodeHandle, RmItem, RmTree,
};
use crate::{OpenEhrError, OpenEhrResult};

impl RmTree {
    /// Resolves a path starting at `start`.
    ///
    /// An absolute path starts at the root of the tree containing `start`; a relative path at
    /// `start` itself. Paths that lead nowhere resolve to [`PathResult::Nothing`].
    ///
    /// # Errors
    ///
    /// - [`OpenEhrError::PathSyntax`] if the path does not parse.
    /// - [`OpenEhrError::UnknownNode`] if `start` is a removed node.
    pub fn resolve(&self, start: impl Into<RmItem>, path: &str) -> OpenEhrResult<PathResult> {
        let start = start.into();
        let parsed = parse_path(path)?;

        let Some(handle) = start.as_node() else {
            return Ok(self.walk(start, &parsed));
        };
        self.get(handle)?;
        if let Some(cached) = self.cache.get(handle, path) {
            return Ok(cached);
        }

        let origin = if parsed.absolute {
            self.root_of(handle)
        } else {
            handle
        };
        let result = self.walk(RmItem::Node(origin), &parsed);
        self.cache.put(handle, path, &result);
        Ok(result)
    }

    fn walk(&self, origin: RmItem, path: &ParsedPath) -> PathResult {
        let mut current = vec![origin];
        let mut many = false;

        for segment in &path.segments {
            if current.len() > 1 {
                many = true;
            }
            let mut next = Vec::new();
            for item in &current {
                match self.attribute(item, &segment.attribute) {
                    None => {}
                    Some(Navigated::Single(child)) => {
                        let keep = segment
                            .predicate
                            .as_ref()
                            .map_or(true, |predicate| self.matches(&child, predicate));
                        if keep {
                            next.push(child);
                        }
                    }
                    Some(Navigated::Multiple(children)) => {
                        let (members, selected) = select(children, segment);
                        many |= !selected;
                        next.extend(members.into_iter().map(RmItem::Node));
                    }
                }
            }
            current = next;
            if current.is_empty() {
                return PathResult::Nothing;
            }
        }

        match current.len() {
            0 => PathResult::Nothing,
            1 if !many => current.pop().map_or(PathResult::Nothing, PathResult::One),
            _ => PathResult::Many(current),
        }
    }

    fn matches(&self, item: &RmItem, predicate: &Predicate) -> bool {
        let Some(node) = item.as_node().and_then(|h| self.get(h).ok()) else {
            return false;
        };
        predicate
            .node_id
            .as_ref()
            .map_or(true, |id| node.archetype_node_id() == id)
            && predicate
                .name
                .as_ref()
                .map_or(true, |name| name.matches(node.name()))
    }

    /// Returns `true` if the path resolves to at least one item.
    pub fn path_exists(&self, start: impl Into<RmItem>, path: &str) -> OpenEhrResult<bool> {
        Ok(!self.resolve(start, path)?.is_nothing())
    }

    /// Returns `true` if the path resolves to exactly one item.
    pub fn path_unique(&self, start: impl Into<RmItem>, path: &str) -> OpenEhrResult<bool> {
        Ok(self.resolve(start, path)?.len() == 1)
    }

    /// The single item at a path.
    ///
    /// # Errors
    ///
    /// - [`OpenEhrError::PathNotExist`] if nothing is there.
    /// - [`OpenEhrError::PathNotUnique`] if several items are.
    pub fn item_at_path(&self, start: impl Into<RmItem>, path: &str) -> OpenEhrResult<RmItem> {
        match self.resolve(start, path)? {
            PathResult::Nothing => Err(OpenEhrError::PathNotExist(path.to_string())),
            PathResult::One(item) => Ok(item),
            PathResult::Many(mut items) if items.len() == 1 => items
                .pop()
                .ok_or_else(|| OpenEhrError::PathNotExist(path.to_string())),
            PathResult::Many(_) => Err(OpenEhrError::PathNotUnique(path.to_string())),
        }
    }

    /// Every item at a path.
    ///
    /// # Errors
    ///
    /// Returns [`OpenEhrError::PathNotExist`] if nothing is there.
    pub fn items_at_path(
        &self,
        start: impl Into<RmItem>,
        path: &str,
    ) -> OpenEhrResult<Vec<RmItem>> {
        match self.resolve(start, path)? {
            PathResult::Nothing => Err(OpenEhrError::PathNotExist(path.to_string())),
            result => Ok(result.into_items()),
        }
    }

    /// The path from `root` to `node`.
    ///
    /// Collection members are always identified by node id and name (coded shorthand when a
    /// sibling shares the name text); single attributes by node id. The path is absolute when
    /// `root` has no parent and relative otherwise; `node == root` gives `/` or the empty path.
    ///
    /// # Errors
    ///
    /// - [`OpenEhrError::UnknownNode`] if either handle is stale.
    /// - [`OpenEhrError::NotADescendant`] if `node` is not in `root`'s subtree.
    pub fn path_of(&self, root: NodeHandle, node: NodeHandle) -> OpenEhrResult<String> {
        self.get(root)?;
        let mut segments = Vec::new();
        let mut current = node;

        while current != root {
            let locatable = self.get(current)?;
            let (Some(parent), Some(attribute)) =
                (locatable.parent(), locatable.parent_attribute())
            else {
                return Err(OpenEhrError::NotADescendant(node));
            };

            let name = match self.collection(parent, attribute) {
                Some(children) => Some(member_name(children, current)),
                None => None,
            };
            // Composite attributes such as `context/other_context` become plain leading steps.
            let mut steps = attribute.as_path().rsplit('/');
            if let Some(last) = steps.next() {
                segments.push(PathSegment {
                    attribute: last.to_string(),
                    predicate: Some(Predicate {
                        node_id: Some(locatable.archetype_node_id().to_string()),
                        name,
                    }),
                });
            }
            segments.extend(steps.map(|step| PathSegment {
                attribute: step.to_string(),
                predicate: None,
            }));
            current = parent;
        }

        segments.reverse();
        let path = ParsedPath {
            absolute: self.parent(root).is_none(),
            segments,
        };
        Ok(path.to_string())
    }
}

/// Members selected by a segment, and whether the predicate picked out one member by name.
fn select(children: &LocatableCollection, segment: &PathSegment) -> (Vec<NodeHandle>, bool) {
    let Some(predicate) = &segment.predicate else {
        return (children.iter().collect(), false);
    };
    match (&predicate.node_id, &predicate.name) {
        (Some(node_id), Some(name)) => (children.lookup(node_id, name).into_iter().collect(), true),
        (Some(node_id), None) => (children.with_node_id(node_id).to_vec(), false),
        (None, Some(name)) => (children.with_name(name), false),
        (None, None) => (children.iter().collect(), false),
    }
}

fn member_name(children: &LocatableCollection, member: NodeHandle) -> NameQuery {
    match children.name_of(member) {
        Some(name) => match name.defining_code() {
            Some(code) if children.has_same_text_sibling(member) => NameQuery::Code {
                terminology_id: Some(code.terminology_id.value.clone()),
                code: code.code_string.clone(),
            },
            _ => NameQuery::Text(name.value().to_string()),
        },
        None => NameQuery::Text(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoreConfig;
    use crate::data_types::{CodePhrase, DataValue, DvQuantity, TextValue};
    use crate::rm::{Locatable, RmAttribute, RmType, RmValue};

    struct Vitals {
        tree: RmTree,
        composition: NodeHandle,
        section: NodeHandle,
        systolic: NodeHandle,
        diastolic: NodeHandle,
    }

    fn add(
        tree: &mut RmTree,
        parent: NodeHandle,
        attribute: RmAttribute,
        rm_type: RmType,
        node_id: &str,
        name: impl Into<TextValue>,
    ) -> NodeHandle {
        let child = tree.insert(Locatable::new(rm_type, node_id, name).unwrap());
        tree.attach(parent, attribute, child).unwrap();
        child
    }

    fn vitals(config: CoreConfig) -> Vitals {
        let mut tree = RmTree::with_config(config);
        let composition = tree.insert(
            Locatable::new(
                RmType::Composition,
                "openEHR-EHR-COMPOSITION.encounter.v1",
                "Encounter",
            )
            .unwrap(),
        );
        let section = add(
            &mut tree,
            composition,
            RmAttribute::Content,
            RmType::Section,
            "at0001",
            "Vitals",
        );
        let list = add(
            &mut tree,
            section,
            RmAttribute::Items,
            RmType::AdminEntry,
            "openEHR-EHR-ADMIN_ENTRY.readings.v1",
            "Readings",
        );
        let data = add(&mut tree, list, RmAttribute::Data, RmType::ItemList, "at0002", "List");
        let systolic = add(&mut tree, data, RmAttribute::Items, RmType::Element, "at0004", "Systolic");
        let diastolic =
            add(&mut tree, data, RmAttribute::Items, RmType::Element, "at0004", "Diastolic");
        tree.set_value(
            systolic,
            RmAttribute::Value,
            RmValue::Data(DataValue::Quantity(DvQuantity::new(120.0, "mm[Hg]"))),
        )
        .unwrap();
        Vitals {
            tree,
            composition,
            section,
            systolic,
            diastolic,
        }
    }

    const DATA: &str =
        "/content[at0001]/items[openEHR-EHR-ADMIN_ENTRY.readings.v1]/data[at0002]";

    #[test]
    fn section_path_is_absolute_and_named() {
        let v = vitals(CoreConfig::default());
        assert_eq!(
            v.tree.path_of(v.composition, v.section).unwrap(),
            "/content[at0001 and name/value='Vitals']"
        );
        assert_eq!(v.tree.path_of(v.composition, v.composition).unwrap(), "/");
        assert_eq!(v.tree.path_of(v.section, v.section).unwrap(), "");
    }

    #[test]
    fn node_id_predicates_over_collections_are_many() {
        let v = vitals(CoreConfig::default());
        let result = v.tree.resolve(v.composition, &format!("{DATA}/items[at0004]")).unwrap();
        assert_eq!(
            result,
            PathResult::Many(vec![RmItem::Node(v.systolic), RmItem::Node(v.diastolic)])
        );
        assert!(!v.tree.path_unique(v.composition, &format!("{DATA}/items[at0004]")).unwrap());
        assert!(matches!(
            v.tree.item_at_path(v.composition, &format!("{DATA}/items[at0004]")),
            Err(OpenEhrError::PathNotUnique(_))
        ));
    }

    #[test]
    fn named_predicates_select_one_member() {
        let v = vitals(CoreConfig::default());
        let path = format!("{DATA}/items[at0004 and name/value='Systolic']/value/magnitude");
        assert_eq!(
            v.tree.item_at_path(v.composition, &path).unwrap(),
            RmItem::Value(RmValue::Real(120.0))
        );
        assert_eq!(
            v.tree.resolve(v.composition, &format!("{DATA}/items[at0004, 'Diastolic']")).unwrap(),
            PathResult::One(RmItem::Node(v.diastolic))
        );
    }

    #[test]
    fn single_match_through_a_collection_is_still_unique() {
        let v = vitals(CoreConfig::default());
        let path = "/content[at0001]";
        assert_eq!(
            v.tree.resolve(v.composition, path).unwrap(),
            PathResult::Many(vec![RmItem::Node(v.section)])
        );
        assert!(v.tree.path_unique(v.composition, path).unwrap());
        assert_eq!(
            v.tree.item_at_path(v.composition, path).unwrap(),
            RmItem::Node(v.section)
        );
        assert_eq!(
            v.tree.items_at_path(v.composition, path).unwrap(),
            vec![RmItem::Node(v.section)]
        );
    }

    #[test]
    fn missing_paths_resolve_to_nothing() {
        let v = vitals(CoreConfig::default());
        for path in ["/content[at9999]", "/context/start_time", "/nonsense", "/content/items[at0000]"] {
            assert!(!v.tree.path_exists(v.composition, path).unwrap(), "{path}");
        }
        assert!(matches!(
            v.tree.item_at_path(v.composition, "/content[at9999]"),
            Err(OpenEhrError::PathNotExist(_))
        ));
        assert!(matches!(
            v.tree.resolve(v.composition, "/content[at0001"),
            Err(OpenEhrError::PathSyntax { .. })
        ));
    }

    #[test]
    fn absolute_paths_start_at_the_root() {
        let v = vitals(CoreConfig::default());
        assert_eq!(
            v.tree.item_at_path(v.systolic, "/content[at0001, 'Vitals']").unwrap(),
            RmItem::Node(v.section)
        );
        assert_eq!(
            v.tree.item_at_path(v.systolic, "name/value").unwrap(),
            RmItem::Value(RmValue::String("Systolic".into()))
        );
        assert_eq!(v.tree.item_at_path(v.systolic, "").unwrap(), RmItem::Node(v.systolic));
    }

    #[test]
    fn path_of_round_trips_through_resolve() {
        for config in [
            CoreConfig::default(),
            CoreConfig::new(crate::config::LATEST_RM, false, true),
        ] {
            let v = vitals(config);
            for node in [v.section, v.systolic, v.diastolic] {
                let path = v.tree.path_of(v.composition, node).unwrap();
                assert_eq!(
                    v.tree.item_at_path(v.composition, &path).unwrap(),
                    RmItem::Node(node),
                    "{path}"
                );
            }
            let relative = v.tree.path_of(v.section, v.systolic).unwrap();
            assert!(!relative.starts_with('/'));
            assert_eq!(
                v.tree.item_at_path(v.section, &relative).unwrap(),
                RmItem::Node(v.systolic)
            );
        }
    }

    #[test]
    fn coded_names_sharing_text_use_the_code_shorthand() {
        let mut v = vitals(CoreConfig::default());
        let data = v
            .tree
            .item_at_path(v.composition, DATA)
            .unwrap()
            .as_node()
            .unwrap();
        let coded = add(
            &mut v.tree,
            data,
            RmAttribute::Items,
            RmType::Element,
            "at0004",
            TextValue::coded("Systolic", CodePhrase::new("local", "at1001")),
        );

        let path = v.tree.path_of(v.composition, coded).unwrap();
        assert!(path.ends_with("items[at0004, local::at1001]"), "{path}");
        assert_eq!(v.tree.item_at_path(v.composition, &path).unwrap(), RmItem::Node(coded));
        let plain = v.tree.path_of(v.composition, v.systolic).unwrap();
        assert_eq!(
            v.tree.item_at_path(v.composition, &plain).unwrap(),
            RmItem::Node(v.systolic)
        );
    }

    #[test]
    fn path_of_rejects_unrelated_nodes() {
        let mut v = vitals(CoreConfig::default());
        let stray = v
            .tree
            .insert(Locatable::new(RmType::Element, "at0009", "Stray").unwrap());
        assert!(matches!(
            v.tree.path_of(v.composition, stray),
            Err(OpenEhrError::NotADescendant(_))
        ));
        assert!(matches!(
            v.tree.path_of(v.systolic, v.section),
            Err(OpenEhrError::NotADescendant(_))
        ));
    }

    #[test]
    fn mutations_invalidate_cached_results() {
        let mut v = vitals(CoreConfig::default());
        let path = format!("{DATA}/items[at0004, 'Systolic']");
        assert!(v.tree.path_exists(v.composition, &path).unwrap());
        assert!(v.tree.cache.len() > 0);

        v.tree
            .set_name(v.systolic, TextValue::plain("Systolic (cuff)"))
            .unwrap();
        assert_eq!(v.tree.cache.len(), 0);
        assert!(!v.tree.path_exists(v.composition, &path).unwrap());

        v.tree.remove(v.diastolic).unwrap();
        assert!(!v
            .tree
            .path_exists(v.composition, &format!("{DATA}/items[at0004, 'Diastolic']"))
            .unwrap());
    }
}
