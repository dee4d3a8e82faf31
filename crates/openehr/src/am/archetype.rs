//! Archetypes: a definition tree with its terminology and invariants.

use super::c_object::{ArchetypeInternalRef, CComplexObject, CObject};
use super::validate::{ValidationContext, ValidationErrorKind, ValidationReport};
use crate::assertion::Assertion;
use crate::data_types::ArchetypeId;
use crate::path::parse_path;
use crate::rm::{NodeHandle, RmItem, RmTree};
use crate::{OpenEhrError, OpenEhrResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A term of the archetype's local terminology.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ArchetypeTerm {
    pub text: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// A parsed archetype. Nothing is checked at construction; see [`Archetype::is_valid`].
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Archetype {
    pub archetype_id: ArchetypeId,
    /// The at-code naming the concept of the archetype.
    pub concept: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub term_definitions: BTreeMap<String, ArchetypeTerm>,
    pub definition: CComplexObject,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub invariants: Vec<Assertion>,
}

impl Archetype {
    pub fn new(
        archetype_id: ArchetypeId,
        concept: impl Into<String>,
        definition: CComplexObject,
    ) -> Self {
        Self {
            archetype_id,
            concept: concept.into(),
            term_definitions: BTreeMap::new(),
            definition,
            invariants: Vec::new(),
        }
    }

    pub fn with_term(mut self, code: impl Into<String>, text: impl Into<String>) -> Self {
        self.term_definitions.insert(
            code.into(),
            ArchetypeTerm {
                text: text.into(),
                description: String::new(),
            },
        );
        self
    }

    /// The text of a local term.
    pub fn term_text(&self, code: &str) -> Option<&str> {
        self.term_definitions.get(code).map(|term| term.text.as_str())
    }

    /// Whether the definition is well formed and constrains the RM class the id names.
    ///
    /// Every internal reference must resolve to a constraint that is neither itself nor another
    /// internal reference.
    pub fn is_valid(&self) -> bool {
        self.definition
            .rm_type_name
            .eq_ignore_ascii_case(&self.archetype_id.rm_class)
            && self.definition.is_valid()
            && self.internal_refs_resolve()
    }

    fn internal_refs_resolve(&self) -> bool {
        let mut refs = Vec::new();
        collect_internal_refs(&self.definition, &mut Vec::new(), &mut refs);
        refs.into_iter().all(|(location, reference)| {
            let Ok(target_path) = parse_path(&reference.target_path) else {
                return false;
            };
            let target: Vec<Step> = target_path
                .segments
                .iter()
                .map(|s| {
                    let node_id = s.predicate.as_ref().and_then(|p| p.node_id.clone());
                    (s.attribute.clone(), node_id)
                })
                .collect();
            target != location
                && matches!(
                    self.constraint_at_path(&reference.target_path),
                    Ok(found) if !matches!(found, CObject::InternalRef(_))
                )
        })
    }

    /// Validates the subtree rooted at `node`.
    ///
    /// The root's node id may be either the archetype id or the definition's node id.
    ///
    /// # Errors
    ///
    /// - [`OpenEhrError::InvalidConstraint`] if the archetype is not [valid](Self::is_valid).
    /// - [`OpenEhrError::UnknownNode`] if `node` is not in `tree`.
    /// - Evaluation errors raised by invariants or slot assertions.
    pub fn validate(&self, tree: &RmTree, node: NodeHandle) -> OpenEhrResult<ValidationReport> {
        if !self.is_valid() {
            return Err(OpenEhrError::InvalidConstraint(format!(
                "archetype {} is malformed",
                self.archetype_id
            )));
        }
        let root = tree.get(node)?;
        let mut ctx = ValidationContext::for_archetype(tree, self);
        let item = RmItem::Node(node);

        ctx.scoped(Some(node), |ctx| -> OpenEhrResult<()> {
            let found = root.rm_type();
            if !crate::rm::rm_type_conforms(found.as_str(), &self.definition.rm_type_name) {
                ctx.record(
                    ValidationErrorKind::TypeMismatch,
                    "/",
                    format!("expected {}, found {}", self.definition.rm_type_name, found),
                );
                return Ok(());
            }
            let node_id = root.archetype_node_id();
            let archetype_id = self.archetype_id.to_string();
            if node_id != archetype_id && self.definition.node_id.as_deref() != Some(node_id) {
                ctx.record(
                    ValidationErrorKind::NodeIdMismatch,
                    "/",
                    format!("'{node_id}' is not a root of {archetype_id}"),
                );
                return Ok(());
            }

            self.definition.validate_body(ctx, &item, "/")?;
            for invariant in &self.invariants {
                if !invariant.evaluate(tree, node)? {
                    ctx.record(
                        ValidationErrorKind::AssertionFailed,
                        "/",
                        format!(
                            "archetype invariant '{}' does not hold",
                            invariant.tag().unwrap_or("unnamed")
                        ),
                    );
                }
            }
            Ok(())
        })?;

        let report = ctx.into_report();
        tracing::debug!(
            "validated {} against {}: {} error(s)",
            node,
            self.archetype_id,
            report.len()
        );
        Ok(report)
    }

    /// Builds a fresh instance satisfying the definition and returns its root.
    ///
    /// # Arguments
    ///
    /// * `tree` - The tree the new nodes are inserted into, detached from anything already there.
    ///
    /// # Returns
    ///
    /// The handle of the new root, named after the archetype's concept term.
    ///
    /// # Errors
    ///
    /// - [`OpenEhrError::NoDefaultValue`] if a required part of the definition has no default.
    /// - [`OpenEhrError::InvalidConstraint`] if the definition does not describe a node, or a
    ///   mandatory part can only be built by following internal references forever.
    ///
    /// On error no node built for this call is left in `tree`.
    pub fn default_value(&self, tree: &mut RmTree) -> OpenEhrResult<NodeHandle> {
        let root = self
            .definition
            .default_item(tree, Some(self), Some(&self.archetype_id.to_string()))?;
        root.as_node().ok_or_else(|| {
            OpenEhrError::InvalidConstraint(format!(
                "definition of {} is not a locatable",
                self.archetype_id
            ))
        })
    }

    /// The constraint object a path addresses within the definition.
    ///
    /// Each segment selects an attribute constraint, then a child by node id. A segment
    /// without a node id needs the attribute to have exactly one child.
    ///
    /// # Errors
    ///
    /// - [`OpenEhrError::PathSyntax`] for malformed paths.
    /// - [`OpenEhrError::PathNotExist`] if a segment matches nothing, or the path is empty.
    /// - [`OpenEhrError::PathNotUnique`] if a segment without node id matches several children.
    pub fn constraint_at_path(&self, path: &str) -> OpenEhrResult<&CObject> {
        let parsed = parse_path(path)?;
        let not_exist = || OpenEhrError::PathNotExist(path.to_string());

        let mut owner = &self.definition;
        let mut found: Option<&CObject> = None;
        for segment in &parsed.segments {
            if let Some(previous) = found {
                owner = match previous {
                    CObject::Complex(complex) => complex,
                    _ => return Err(not_exist()),
                };
            }
            let attribute = owner.attribute(&segment.attribute).ok_or_else(not_exist)?;
            let node_id = segment.predicate.as_ref().and_then(|p| p.node_id.as_deref());
            found = Some(match node_id {
                Some(node_id) => attribute.child(node_id).ok_or_else(not_exist)?,
                None => match attribute.children.as_slice() {
                    [only] => only,
                    [] => return Err(not_exist()),
                    _ => return Err(OpenEhrError::PathNotUnique(path.to_string())),
                },
            });
        }
        found.ok_or_else(not_exist)
    }
}

/// One step of a constraint path: attribute name and child node id.
type Step = (String, Option<String>);

fn collect_internal_refs<'a>(
    object: &'a CComplexObject,
    location: &mut Vec<Step>,
    found: &mut Vec<(Vec<Step>, &'a ArchetypeInternalRef)>,
) {
    for attribute in object.attributes() {
        for child in &attribute.children {
            location.push((
                attribute.rm_attribute_name.clone(),
                child.node_id().map(str::to_string),
            ));
            match child {
                CObject::Complex(complex) => collect_internal_refs(complex, location, found),
                CObject::InternalRef(reference) => found.push((location.clone(), reference)),
                _ => {}
            }
            location.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::am::{
        CAttribute, CCodePhrase, CDomainObject, CDvQuantity, CQuantityItem, Cardinality,
    };
    use crate::data_types::{DataValue, DvQuantity};
    use crate::rm::{Locatable, RmAttribute, RmType, RmValue};
    use openehr_types::Interval;

    fn quantity_element(node_id: &str, units: &str, upper: f64) -> CObject {
        let value = CObject::Domain(CDomainObject::Quantity(CDvQuantity {
            node_id: None,
            occurrences: None,
            property: None,
            list: vec![CQuantityItem {
                magnitude: Some(Interval::closed(0.0, upper).unwrap()),
                precision: None,
                units: units.into(),
            }],
            assumed_value: None,
        }));
        CObject::Complex(
            CComplexObject::new("ELEMENT", Some(node_id.into()))
                .with_occurrences(Interval::closed(1, 1).unwrap())
                .with_attribute(
                    CAttribute::single("value", vec![value])
                        .with_existence(Interval::closed(1, 1).unwrap()),
                )
                .unwrap(),
        )
    }

    fn pulse_archetype() -> Archetype {
        let definition = CComplexObject::new("CLUSTER", Some("at0000".into()))
            .with_attribute(CAttribute::multiple(
                "items",
                Cardinality::new(Interval::at_least(1)),
                vec![
                    quantity_element("at0004", "/min", 1000.0),
                    quantity_element("at0005", "Cel", 50.0),
                ],
            ))
            .unwrap();
        Archetype::new(
            ArchetypeId::parse("openEHR-EHR-CLUSTER.vitals.v1").unwrap(),
            "at0000",
            definition,
        )
        .with_term("at0000", "Vitals")
        .with_term("at0004", "Rate")
        .with_term("at0005", "Temperature")
    }

    fn element(tree: &mut RmTree, parent: NodeHandle, node_id: &str, name: &str, q: DvQuantity) {
        let element = tree.insert(Locatable::new(RmType::Element, node_id, name).unwrap());
        tree.set_value(element, RmAttribute::Value, RmValue::Data(DataValue::Quantity(q)))
            .unwrap();
        tree.attach(parent, RmAttribute::Items, element).unwrap();
    }

    #[test]
    fn every_violation_is_reported() {
        let archetype = pulse_archetype();
        assert!(archetype.is_valid());

        let mut tree = RmTree::new();
        let root = tree.insert(
            Locatable::new(RmType::Cluster, "openEHR-EHR-CLUSTER.vitals.v1", "Vitals").unwrap(),
        );
        element(&mut tree, root, "at0004", "Rate", DvQuantity::new(2000.0, "/min"));
        element(&mut tree, root, "at0005", "Temperature", DvQuantity::new(37.0, "[degF]"));

        let report = archetype.validate(&tree, root).expect("validation runs");
        assert_eq!(report.len(), 2, "{report}");
        assert!(report
            .errors()
            .iter()
            .all(|e| e.kind == ValidationErrorKind::QuantityMismatch));
        assert_eq!(report.errors()[0].path, "/items[at0004]/value");
        assert!(report.errors()[0].node.is_some());
    }

    #[test]
    fn missing_mandatory_children_break_occurrences() {
        let archetype = pulse_archetype();
        let mut tree = RmTree::new();
        let root = tree.insert(Locatable::new(RmType::Cluster, "at0000", "Vitals").unwrap());
        element(&mut tree, root, "at0004", "Rate", DvQuantity::new(72.0, "/min"));

        let report = archetype.validate(&tree, root).unwrap();
        let kinds: Vec<_> = report.errors().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![ValidationErrorKind::Occurrences]);
        assert_eq!(report.errors()[0].path, "/items[at0005]");
    }

    #[test]
    fn foreign_roots_are_rejected_up_front() {
        let archetype = pulse_archetype();
        let mut tree = RmTree::new();
        let root = tree.insert(Locatable::new(RmType::Cluster, "at0099", "Other").unwrap());
        let report = archetype.validate(&tree, root).unwrap();
        assert_eq!(report.errors()[0].kind, ValidationErrorKind::NodeIdMismatch);

        let element = tree.insert(Locatable::new(RmType::Element, "at0000", "Vitals").unwrap());
        let report = archetype.validate(&tree, element).unwrap();
        assert_eq!(report.errors()[0].kind, ValidationErrorKind::TypeMismatch);
    }

    #[test]
    fn defaults_satisfy_the_definition() {
        let archetype = pulse_archetype();
        let mut tree = RmTree::new();
        let root = archetype.default_value(&mut tree).expect("default instance");

        let node = tree.get(root).unwrap();
        assert_eq!(node.archetype_node_id(), "openEHR-EHR-CLUSTER.vitals.v1");
        assert_eq!(node.name().value(), "Vitals");
        assert!(node.archetype_details().is_some());
        assert_eq!(tree.children(root).unwrap().len(), 2);
        assert!(tree.path_exists(root, "/items[at0005]/value/magnitude").unwrap());

        let report = archetype.validate(&tree, root).unwrap();
        assert!(report.is_valid(), "{report}");
    }

    #[test]
    fn constraint_paths_walk_the_definition() {
        let archetype = pulse_archetype();
        let element = archetype.constraint_at_path("/items[at0005]").unwrap();
        assert_eq!(element.rm_type_name(), "ELEMENT");
        let value = archetype.constraint_at_path("/items[at0005]/value").unwrap();
        assert_eq!(value.rm_type_name(), "DV_QUANTITY");

        assert!(matches!(
            archetype.constraint_at_path("/items"),
            Err(OpenEhrError::PathNotUnique(_))
        ));
        assert!(matches!(
            archetype.constraint_at_path("/items[at0009]"),
            Err(OpenEhrError::PathNotExist(_))
        ));
        assert!(matches!(
            archetype.constraint_at_path("/"),
            Err(OpenEhrError::PathNotExist(_))
        ));
    }

    #[test]
    fn malformed_archetypes_refuse_to_validate() {
        let mut archetype = pulse_archetype();
        let mut code = CCodePhrase::any();
        code.terminology_id = Some("local".into());
        archetype
            .definition
            .add_attribute(CAttribute::single(
                "name",
                vec![CObject::Domain(CDomainObject::CodePhrase(code))],
            ))
            .unwrap();
        assert!(!archetype.is_valid());

        let mut tree = RmTree::new();
        let root = tree.insert(Locatable::new(RmType::Cluster, "at0000", "Vitals").unwrap());
        assert!(matches!(
            archetype.validate(&tree, root),
            Err(OpenEhrError::InvalidConstraint(_))
        ));
        assert!(matches!(
            archetype.definition.add_attribute(CAttribute::single("name", Vec::new())),
            Err(OpenEhrError::DuplicateAttributeConstraint(_))
        ));
    }

    #[test]
    fn self_referencing_internal_refs_make_the_archetype_invalid() {
        let reference = |target: &str| {
            CObject::InternalRef(ArchetypeInternalRef {
                rm_type_name: "CLUSTER".into(),
                node_id: Some("at0001".into()),
                occurrences: None,
                target_path: target.into(),
            })
        };
        let archetype_with = |child: CObject| {
            let definition = CComplexObject::new("CLUSTER", Some("at0000".into()))
                .with_attribute(CAttribute::multiple(
                    "items",
                    Cardinality::new(Interval::unbounded()),
                    vec![child],
                ))
                .unwrap();
            Archetype::new(
                ArchetypeId::parse("openEHR-EHR-CLUSTER.loop.v1").unwrap(),
                "at0000",
                definition,
            )
        };

        let looping = archetype_with(reference("/items[at0001]"));
        assert!(!looping.is_valid());
        // Without a node id the lone child is found, which is the reference itself.
        assert!(!archetype_with(reference("/items")).is_valid());

        let mut tree = RmTree::new();
        let root = tree.insert(Locatable::new(RmType::Cluster, "at0000", "Loop").unwrap());
        let child = tree.insert(Locatable::new(RmType::Cluster, "at0001", "Inner").unwrap());
        tree.attach(root, RmAttribute::Items, child).unwrap();
        assert!(matches!(
            looping.validate(&tree, root),
            Err(OpenEhrError::InvalidConstraint(_))
        ));
    }
}
