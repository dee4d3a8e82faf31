//! Synthesis of instances that satisfy a constraint.

use super::archetype::Archetype;
use super::c_object::{CAttribute, CAttributeKind, CComplexObject, CObject};
use crate::data_types::DataValue;
use crate::factory::{construct_node, construct_value};
use crate::rm::{NodeHandle, RmAttribute, RmItem, RmTree, RmType, RmValue};
use crate::{OpenEhrError, OpenEhrResult};

fn is_mandatory(child: &CObject) -> bool {
    child
        .occurrences()
        .and_then(|o| o.lower())
        .is_some_and(|lower| *lower >= 1)
}

impl CAttribute {
    /// The children a synthesised owner receives for this attribute.
    ///
    /// A multiple-valued attribute gets every mandatory child, a single-valued one its first
    /// mandatory child. When nothing is mandatory but the attribute itself is required, the
    /// first child stands in.
    fn default_children(&self) -> Vec<&CObject> {
        let mandatory: Vec<&CObject> = self.children.iter().filter(|c| is_mandatory(c)).collect();
        let mut chosen = match self.kind {
            CAttributeKind::Multiple(_) => mandatory,
            CAttributeKind::Single => mandatory.into_iter().take(1).collect(),
        };
        if chosen.is_empty() && self.is_required() {
            chosen.extend(self.children.first());
        }
        chosen
    }
}

impl CObject {
    /// Builds a fresh instance satisfying the constraint.
    ///
    /// Node-producing constraints insert into `tree`; the result is then detached.
    /// `archetype` supplies term texts for node names and targets for internal references.
    ///
    /// # Arguments
    ///
    /// * `tree` - Tree the synthesised nodes are inserted into.
    /// * `archetype` - Archetype the constraint belongs to, if any.
    ///
    /// # Returns
    ///
    /// Returns the new node, or the new value for data constraints.
    ///
    /// # Errors
    ///
    /// Returns [`OpenEhrError`] if:
    /// - the constraint is a slot, a constraint reference, or a kind that cannot produce a
    ///   value ([`OpenEhrError::NoDefaultValue`]),
    /// - a mandatory internal reference leads back to a constraint it is already being
    ///   expanded for ([`OpenEhrError::InvalidConstraint`]).
    ///
    /// Nothing synthesised for a failed call is left in `tree`.
    pub fn default_value(
        &self,
        tree: &mut RmTree,
        archetype: Option<&Archetype>,
    ) -> OpenEhrResult<RmItem> {
        self.synthesise(tree, archetype, &mut Vec::new())
    }

    /// `following` holds the targets of the internal references being expanded.
    fn synthesise(
        &self,
        tree: &mut RmTree,
        archetype: Option<&Archetype>,
        following: &mut Vec<String>,
    ) -> OpenEhrResult<RmItem> {
        match self {
            CObject::Complex(complex) => complex.synthesise(tree, archetype, None, following),
            CObject::Primitive(primitive) => Ok(RmItem::Value(primitive.default_value())),
            CObject::Domain(domain) => domain.default_value().map(RmItem::Value),
            CObject::Slot(slot) => Err(OpenEhrError::NoDefaultValue(format!(
                "archetype slot for {}",
                slot.rm_type_name
            ))),
            CObject::ConstraintRef(reference) => Err(OpenEhrError::NoDefaultValue(format!(
                "constraint reference {}",
                reference.reference
            ))),
            CObject::InternalRef(reference) => {
                let archetype = archetype.ok_or_else(|| {
                    OpenEhrError::NoDefaultValue(format!(
                        "internal reference to {} outside an archetype",
                        reference.target_path
                    ))
                })?;
                if following.contains(&reference.target_path) {
                    return Err(OpenEhrError::InvalidConstraint(format!(
                        "internal reference cycle through {}",
                        reference.target_path
                    )));
                }
                let target = archetype.constraint_at_path(&reference.target_path)?;
                following.push(reference.target_path.clone());
                let result = target.synthesise(tree, Some(archetype), following);
                following.pop();
                result
            }
        }
    }
}

impl CComplexObject {
    pub(crate) fn default_item(
        &self,
        tree: &mut RmTree,
        archetype: Option<&Archetype>,
        root_node_id: Option<&str>,
    ) -> OpenEhrResult<RmItem> {
        self.synthesise(tree, archetype, root_node_id, &mut Vec::new())
    }

    fn synthesise(
        &self,
        tree: &mut RmTree,
        archetype: Option<&Archetype>,
        root_node_id: Option<&str>,
        following: &mut Vec<String>,
    ) -> OpenEhrResult<RmItem> {
        if self.rm_type_name.parse::<RmType>().is_ok() {
            self.default_node(tree, archetype, root_node_id, following)
        } else {
            self.default_data(tree, archetype, following)
                .map(RmItem::Value)
        }
    }

    fn default_node(
        &self,
        tree: &mut RmTree,
        archetype: Option<&Archetype>,
        root_node_id: Option<&str>,
        following: &mut Vec<String>,
    ) -> OpenEhrResult<RmItem> {
        let node_id = root_node_id
            .or(self.node_id.as_deref())
            .ok_or_else(|| {
                OpenEhrError::NoDefaultValue(format!("{} without node id", self.rm_type_name))
            })?;
        let name = self
            .node_id
            .as_deref()
            .and_then(|id| archetype.and_then(|a| a.term_text(id)))
            .unwrap_or(node_id)
            .to_string();
        let handle = construct_node(tree, &self.rm_type_name, node_id, name, true)?;

        if let Err(err) = self.fill_node(tree, handle, archetype, following) {
            if let Err(cleanup) = tree.remove(handle) {
                tracing::warn!("could not discard partial {}: {}", handle, cleanup);
            }
            return Err(err);
        }
        tracing::debug!("synthesised {} '{}' as {}", self.rm_type_name, node_id, handle);
        Ok(RmItem::Node(handle))
    }

    fn fill_node(
        &self,
        tree: &mut RmTree,
        handle: NodeHandle,
        archetype: Option<&Archetype>,
        following: &mut Vec<String>,
    ) -> OpenEhrResult<()> {
        for attribute in self.attributes() {
            let children = attribute.default_children();
            if children.is_empty() {
                continue;
            }
            let rm_attribute: RmAttribute = attribute.rm_attribute_name.parse()?;
            for child in children {
                match child.synthesise(tree, archetype, following)? {
                    RmItem::Node(node) => {
                        if let Err(err) = tree.attach(handle, rm_attribute, node) {
                            tree.remove(node)?;
                            return Err(err);
                        }
                    }
                    RmItem::Value(value) => tree.set_value(handle, rm_attribute, value)?,
                }
            }
        }
        Ok(())
    }

    fn default_data(
        &self,
        tree: &mut RmTree,
        archetype: Option<&Archetype>,
        following: &mut Vec<String>,
    ) -> OpenEhrResult<RmValue> {
        let mut value = construct_value(&self.rm_type_name)?;
        for attribute in self.attributes() {
            for child in attribute.default_children() {
                match child.synthesise(tree, archetype, following)? {
                    RmItem::Value(part) => value.set_attribute(&attribute.rm_attribute_name, part)?,
                    RmItem::Node(node) => {
                        tree.remove(node)?;
                        return Err(OpenEhrError::InvalidConstraint(format!(
                            "{}.{} cannot hold a locatable",
                            self.rm_type_name, attribute.rm_attribute_name
                        )));
                    }
                }
            }
        }
        name_local_code(&mut value, archetype);
        Ok(value)
    }
}

/// Gives a synthesised coded text the archetype's text for its local code.
fn name_local_code(value: &mut RmValue, archetype: Option<&Archetype>) {
    let RmValue::Data(DataValue::CodedText(coded)) = value else {
        return;
    };
    if !coded.value.is_empty() || coded.defining_code.terminology_id.value != "local" {
        return;
    }
    if let Some(text) = archetype.and_then(|a| a.term_text(&coded.defining_code.code_string)) {
        coded.value = text.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::am::{
        ArchetypeInternalRef, ArchetypeSlot, CCodePhrase, CDomainObject, CPrimitive,
        CPrimitiveObject, CString, Cardinality,
    };
    use crate::data_types::{ArchetypeId, CodePhrase};
    use openehr_types::Interval;

    fn coded_text(codes: &[&str]) -> CObject {
        CObject::Complex(
            CComplexObject::new("DV_CODED_TEXT", None)
                .with_attribute(
                    CAttribute::single(
                        "defining_code",
                        vec![CObject::Domain(CDomainObject::CodePhrase(CCodePhrase::codes(
                            "local",
                            codes.iter().copied(),
                        )))],
                    )
                    .with_existence(Interval::closed(1, 1).unwrap()),
                )
                .unwrap(),
        )
    }

    #[test]
    fn coded_values_take_their_first_code_and_its_text() {
        let archetype = Archetype::new(
            ArchetypeId::parse("openEHR-EHR-ELEMENT.position.v1").unwrap(),
            "at0000",
            CComplexObject::new("ELEMENT", Some("at0000".into())),
        )
        .with_term("at1001", "Sitting");
        let mut tree = RmTree::new();

        let value = coded_text(&["at1001", "at1002"])
            .default_value(&mut tree, Some(&archetype))
            .unwrap();
        let Some(RmValue::Data(DataValue::CodedText(coded))) = value.as_value() else {
            panic!("expected a coded text, got {value:?}");
        };
        assert_eq!(coded.value, "Sitting");
        assert_eq!(coded.defining_code, CodePhrase::new("local", "at1001"));
    }

    #[test]
    fn only_mandatory_children_are_synthesised() {
        let text = |node_id: &str, lower: u32| {
            CObject::Complex(
                CComplexObject::new("ELEMENT", Some(node_id.into()))
                    .with_occurrences(Interval::new(Some(lower), Some(1), true, true).unwrap())
                    .with_attribute(CAttribute::single(
                        "value",
                        vec![CObject::Primitive(CPrimitiveObject::new(CPrimitive::String(
                            CString {
                                list: Some(vec!["none".into()]),
                                pattern: None,
                                assumed_value: None,
                            },
                        )))],
                    ))
                    .unwrap(),
            )
        };
        let cluster = CObject::Complex(
            CComplexObject::new("CLUSTER", Some("at0000".into()))
                .with_attribute(CAttribute::multiple(
                    "items",
                    Cardinality::new(Interval::unbounded()),
                    vec![text("at0001", 1), text("at0002", 0), text("at0003", 1)],
                ))
                .unwrap(),
        );

        let mut tree = RmTree::new();
        let root = cluster.default_value(&mut tree, None).unwrap().as_node().unwrap();
        let ids: Vec<String> = tree
            .children(root)
            .unwrap()
            .into_iter()
            .map(|(_, child)| tree.get(child).unwrap().archetype_node_id().to_string())
            .collect();
        assert_eq!(ids, vec!["at0001", "at0003"]);
        // Names fall back to the node id without an archetype.
        assert_eq!(tree.get(root).unwrap().name().value(), "at0000");
    }

    #[test]
    fn slots_have_no_default() {
        let slot = CObject::Slot(ArchetypeSlot {
            rm_type_name: "CLUSTER".into(),
            node_id: Some("at0010".into()),
            occurrences: None,
            includes: Vec::new(),
            excludes: Vec::new(),
        });
        let mut tree = RmTree::new();
        assert!(matches!(
            slot.default_value(&mut tree, None),
            Err(OpenEhrError::NoDefaultValue(_))
        ));
    }

    fn mandatory() -> Interval<u32> {
        Interval::closed(1, 1).unwrap()
    }

    #[test]
    fn failed_synthesis_leaves_nothing_behind() {
        let element = CObject::Complex(
            CComplexObject::new("ELEMENT", Some("at0001".into())).with_occurrences(mandatory()),
        );
        let slot = CObject::Slot(ArchetypeSlot {
            rm_type_name: "CLUSTER".into(),
            node_id: Some("at0002".into()),
            occurrences: Some(mandatory()),
            includes: Vec::new(),
            excludes: Vec::new(),
        });
        let cluster = CObject::Complex(
            CComplexObject::new("CLUSTER", Some("at0000".into()))
                .with_attribute(CAttribute::multiple(
                    "items",
                    Cardinality::new(Interval::unbounded()),
                    vec![element, slot],
                ))
                .unwrap(),
        );

        let mut tree = RmTree::new();
        assert!(matches!(
            cluster.default_value(&mut tree, None),
            Err(OpenEhrError::NoDefaultValue(_))
        ));
        assert!(tree.is_empty());
    }

    #[test]
    fn mandatory_recursion_through_internal_references_is_refused() {
        let inner = CObject::InternalRef(ArchetypeInternalRef {
            rm_type_name: "CLUSTER".into(),
            node_id: Some("at0002".into()),
            occurrences: Some(mandatory()),
            target_path: "/items[at0001]".into(),
        });
        let nested = CObject::Complex(
            CComplexObject::new("CLUSTER", Some("at0001".into()))
                .with_occurrences(mandatory())
                .with_attribute(CAttribute::multiple(
                    "items",
                    Cardinality::new(Interval::unbounded()),
                    vec![inner],
                ))
                .unwrap(),
        );
        let definition = CComplexObject::new("CLUSTER", Some("at0000".into()))
            .with_attribute(CAttribute::multiple(
                "items",
                Cardinality::new(Interval::unbounded()),
                vec![nested],
            ))
            .unwrap();
        let archetype = Archetype::new(
            ArchetypeId::parse("openEHR-EHR-CLUSTER.nested.v1").unwrap(),
            "at0000",
            definition,
        );
        assert!(archetype.is_valid());

        let mut tree = RmTree::new();
        assert!(matches!(
            archetype.default_value(&mut tree),
            Err(OpenEhrError::InvalidConstraint(_))
        ));
        assert!(tree.is_empty());
    }
}
