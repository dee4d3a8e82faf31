//! RM 1.1.0 instance trees as YAML.
//!
//! Every locatable is a mapping tagged with `_type` (the RM class name). Identity attributes
//! (`archetype_node_id`, `name`, `uid`, `archetype_details`, `links`, `feeder_audit`) are
//! fixed keys; every other key must be an attribute of the node kind, holding a nested node,
//! a sequence of nodes, or a value in the wire form of the attribute's declared type.
//!
//! ```yaml
//! _type: CLUSTER
//! archetype_node_id: openEHR-EHR-CLUSTER.vitals.v1
//! name:
//!   value: Vitals
//! items:
//!   - _type: ELEMENT
//!     archetype_node_id: at0004
//!     name:
//!       value: Rate
//!     value:
//!       _type: DV_QUANTITY
//!       magnitude: 72.0
//!       units: /min
//! ```
//!
//! `COMPOSITION.context` carries its `other_context` subtree inline.

use crate::data_types::{CodePhrase, DataValue, DvCodedText, DvDateTime, HierObjectId, TextValue};
use crate::factory::construct_node;
use crate::rm::{
    Archetyped, AttributeKind, AttributeRef, EventContext, FeederAudit, IsmTransition, Link,
    NodeHandle, PartyProxy, RmAttribute, RmTree, RmType, RmValue,
};
use crate::{CoreConfig, OpenEhrError, OpenEhrResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Deserialize, Serialize)]
struct NodeWire {
    #[serde(rename = "_type")]
    rm_type: String,
    archetype_node_id: String,
    name: TextValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    uid: Option<HierObjectId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    archetype_details: Option<Archetyped>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    links: Option<Vec<Link>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    feeder_audit: Option<FeederAudit>,
    /// Kind-specific attributes, checked against the kind's attribute table when applied.
    #[serde(flatten)]
    attributes: BTreeMap<String, Value>,
}

#[derive(Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct EventContextWire {
    start_time: DvDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end_time: Option<DvDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<String>,
    setting: DvCodedText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    health_care_facility: Option<PartyProxy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    other_context: Option<Value>,
}

fn join(at: &str, key: &str) -> String {
    if at.is_empty() {
        key.to_string()
    } else {
        format!("{at}.{key}")
    }
}

/// Deserialises `value`, reporting the failing field relative to `at`.
fn decode<T: DeserializeOwned>(what: &str, at: &str, value: Value) -> OpenEhrResult<T> {
    serde_path_to_error::deserialize(value).map_err(|err| {
        let inner = err.path().to_string();
        let path = match (at.is_empty(), inner == ".") {
            (true, true) => "<root>".to_string(),
            (false, true) => at.to_string(),
            (true, false) => inner,
            (false, false) => join(at, &inner),
        };
        OpenEhrError::Translation(format!(
            "{what} schema mismatch at {path}: {}",
            err.into_inner()
        ))
    })
}

fn encode<T: Serialize>(value: &T) -> OpenEhrResult<Value> {
    Ok(serde_yaml::to_value(value)?)
}

/// Read an instance tree from YAML into a fresh [`RmTree`].
///
/// # Returns
///
/// Returns the tree and the handle of its root node.
///
/// # Errors
///
/// Returns [`OpenEhrError`] if:
/// - the YAML is invalid or a field does not match its wire form ([`OpenEhrError::Translation`]),
/// - a node kind or attribute is unknown, or a child does not fit its attribute,
/// - sibling names collide within a collection.
pub fn read_yaml(yaml: &str) -> OpenEhrResult<(RmTree, NodeHandle)> {
    read_yaml_with_config(yaml, CoreConfig::default())
}

/// Like [`read_yaml`], building the tree with `config`.
///
/// # Arguments
///
/// * `yaml` - A single `_type`-tagged node document.
/// * `config` - Settings for the new tree, such as its path cache.
pub fn read_yaml_with_config(
    yaml: &str,
    config: CoreConfig,
) -> OpenEhrResult<(RmTree, NodeHandle)> {
    let document: Value = serde_yaml::from_str(yaml)?;
    let mut tree = RmTree::with_config(config);
    let root = build_node(&mut tree, document, "")?;
    tracing::info!(
        "loaded {} instance with {} node(s)",
        tree.get(root)?.rm_type(),
        tree.len()
    );
    Ok((tree, root))
}

/// Read an instance tree from a YAML file.
///
/// # Errors
///
/// Returns [`OpenEhrError::Io`] if the file cannot be read, else as [`read_yaml`].
pub fn read_file(path: impl AsRef<Path>) -> OpenEhrResult<(RmTree, NodeHandle)> {
    let text = fs::read_to_string(path.as_ref())?;
    read_yaml(&text)
}

fn build_node(tree: &mut RmTree, document: Value, at: &str) -> OpenEhrResult<NodeHandle> {
    let wire: NodeWire = decode("LOCATABLE", at, document)?;
    let rm_type: RmType = wire.rm_type.parse()?;
    let handle = construct_node(tree, &wire.rm_type, &wire.archetype_node_id, wire.name, false)?;
    tree.set_archetype_details(handle, wire.archetype_details)?;
    tree.set_uid(handle, wire.uid)?;
    tree.set_links(handle, wire.links)?;
    tree.set_feeder_audit(handle, wire.feeder_audit)?;

    for (key, value) in wire.attributes {
        let field = join(at, &key);
        let attribute: RmAttribute = key.parse()?;
        let spec = rm_type
            .attribute_spec(attribute)
            .filter(|_| attribute != RmAttribute::OtherContext)
            .ok_or_else(|| OpenEhrError::UnknownAttribute {
                rm_type: rm_type.to_string(),
                attribute: key.clone(),
            })?;

        match spec.kind {
            AttributeKind::Node => {
                let child = build_node(tree, value, &field)?;
                tree.attach(handle, attribute, child)?;
            }
            AttributeKind::Nodes => {
                let members: Vec<Value> = decode("LOCATABLE", &field, value)?;
                for (i, member) in members.into_iter().enumerate() {
                    let child = build_node(tree, member, &format!("{field}[{i}]"))?;
                    tree.attach(handle, attribute, child)?;
                }
            }
            AttributeKind::Value if spec.rm_type == "EVENT_CONTEXT" => {
                let wire: EventContextWire = decode("EVENT_CONTEXT", &field, value)?;
                let mut context = EventContext::new(wire.start_time, wire.setting);
                context.end_time = wire.end_time;
                context.location = wire.location;
                context.health_care_facility = wire.health_care_facility;
                tree.set_value(handle, attribute, RmValue::Context(context))?;
                if let Some(other) = wire.other_context {
                    let child = build_node(tree, other, &join(&field, "other_context"))?;
                    tree.attach(handle, RmAttribute::OtherContext, child)?;
                }
            }
            AttributeKind::Value => {
                let value = decode_value(spec.rm_type, &field, value)?;
                tree.set_value(handle, attribute, value)?;
            }
        }
    }
    Ok(handle)
}

fn decode_value(rm_type: &str, at: &str, value: Value) -> OpenEhrResult<RmValue> {
    match rm_type {
        "STRING" => decode(rm_type, at, value).map(RmValue::String),
        "INTEGER" => decode(rm_type, at, value).map(RmValue::Integer),
        "REAL" => decode(rm_type, at, value).map(RmValue::Real),
        "BOOLEAN" => decode(rm_type, at, value).map(RmValue::Boolean),
        "CODE_PHRASE" => decode::<CodePhrase>(rm_type, at, value).map(RmValue::CodePhrase),
        "PARTY_PROXY" => decode::<PartyProxy>(rm_type, at, value).map(RmValue::Party),
        "ISM_TRANSITION" => {
            decode::<IsmTransition>(rm_type, at, value).map(RmValue::IsmTransition)
        }
        name if name == "DATA_VALUE" || name.starts_with("DV_") => {
            decode::<DataValue>(rm_type, at, value).map(RmValue::Data)
        }
        other => Err(OpenEhrError::Translation(format!(
            "no wire form for {other} at {at}"
        ))),
    }
}

/// Write the subtree rooted at `node` to YAML.
///
/// Computed attributes (such as an event offset derived from its history) are not written.
///
/// # Errors
///
/// Returns [`OpenEhrError`] if `node` is not in `tree` or serialisation fails.
pub fn write_yaml(tree: &RmTree, node: NodeHandle) -> OpenEhrResult<String> {
    let wire = node_wire(tree, node)?;
    Ok(serde_yaml::to_string(&wire)?)
}

fn node_wire(tree: &RmTree, handle: NodeHandle) -> OpenEhrResult<NodeWire> {
    let node = tree.get(handle)?;
    let mut attributes = BTreeMap::new();

    for spec in node.rm_type().attributes() {
        if spec.attribute == RmAttribute::OtherContext {
            continue;
        }
        let encoded = match node.attribute(spec.attribute) {
            None => continue,
            Some(AttributeRef::Node(child)) => encode(&node_wire(tree, child)?)?,
            Some(AttributeRef::Nodes(children)) => {
                let members = children
                    .iter()
                    .map(|child| node_wire(tree, child))
                    .collect::<OpenEhrResult<Vec<_>>>()?;
                if members.is_empty() {
                    continue;
                }
                encode(&members)?
            }
            Some(AttributeRef::Value(value)) => encode_value(tree, &value)?,
        };
        attributes.insert(spec.attribute.as_path().to_string(), encoded);
    }

    Ok(NodeWire {
        rm_type: node.rm_type().as_str().to_string(),
        archetype_node_id: node.archetype_node_id().to_string(),
        name: node.name().clone(),
        uid: node.uid().cloned(),
        archetype_details: node.archetype_details().cloned(),
        links: node.links().map(<[Link]>::to_vec),
        feeder_audit: node.feeder_audit().cloned(),
        attributes,
    })
}

fn encode_value(tree: &RmTree, value: &RmValue) -> OpenEhrResult<Value> {
    match value {
        RmValue::Boolean(b) => Ok(Value::Bool(*b)),
        RmValue::Integer(i) => Ok(Value::Number((*i).into())),
        RmValue::Real(r) => Ok(Value::Number((*r).into())),
        RmValue::String(s) => Ok(Value::String(s.clone())),
        RmValue::CodePhrase(code) => encode(code),
        RmValue::ObjectId { value, .. } => {
            let mut mapping = Mapping::new();
            mapping.insert(Value::from("value"), Value::from(value.as_str()));
            Ok(Value::Mapping(mapping))
        }
        RmValue::Data(data) => encode(data),
        RmValue::Party(party) => encode(party),
        RmValue::IsmTransition(ism) => encode(ism),
        RmValue::Archetyped(details) => encode(details),
        RmValue::Context(context) => {
            let other_context = match context.other_context {
                Some(child) => Some(encode(&node_wire(tree, child)?)?),
                None => None,
            };
            encode(&EventContextWire {
                start_time: context.start_time.clone(),
                end_time: context.end_time.clone(),
                location: context.location.clone(),
                setting: context.setting.clone(),
                health_care_facility: context.health_care_facility.clone(),
                other_context,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::DvQuantity;
    use crate::rm::RmItem;

    const VITALS: &str = r#"_type: CLUSTER
archetype_node_id: openEHR-EHR-CLUSTER.vitals.v1
name:
  value: Vitals
items:
  - _type: ELEMENT
    archetype_node_id: at0004
    name:
      value: Rate
    value:
      _type: DV_QUANTITY
      magnitude: 72.0
      units: /min
  - _type: ELEMENT
    archetype_node_id: at0005
    name:
      value: Position
      defining_code:
        terminology_id:
          value: local
        code_string: at1001
    value:
      _type: DV_TEXT
      value: sitting
"#;

    #[test]
    fn reads_nested_nodes_and_values() {
        let (tree, root) = read_yaml(VITALS).expect("read instance");
        assert_eq!(tree.len(), 3);
        assert!(tree.get(root).unwrap().archetype_details().is_none());

        let rate = tree
            .item_at_path(root, "/items[at0004]/value")
            .expect("rate value");
        assert_eq!(
            rate,
            RmItem::Value(RmValue::Data(DataValue::Quantity(DvQuantity::new(72.0, "/min"))))
        );
        assert!(tree
            .path_exists(root, "/items[at0005, local::at1001]")
            .unwrap());
    }

    #[test]
    fn written_trees_read_back_the_same() {
        let (tree, root) = read_yaml(VITALS).unwrap();
        let yaml = write_yaml(&tree, root).expect("write instance");
        let (again, again_root) = read_yaml(&yaml).expect("reread instance");
        assert_eq!(write_yaml(&again, again_root).unwrap(), yaml);
        assert_eq!(again.len(), tree.len());
    }

    #[test]
    fn unknown_attributes_are_rejected() {
        let yaml = "_type: ELEMENT\narchetype_node_id: at0001\nname:\n  value: X\ncontent: []\n";
        assert!(matches!(
            read_yaml(yaml),
            Err(OpenEhrError::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn mismatches_name_the_failing_field() {
        let yaml = VITALS.replace("magnitude: 72.0", "magnitude: fast");
        let err = read_yaml(&yaml).expect_err("bad magnitude");
        match err {
            OpenEhrError::Translation(msg) => {
                assert!(msg.contains("items[0].value"), "{msg}");
                assert!(msg.contains("schema mismatch"), "{msg}");
            }
            other => panic!("expected Translation error, got {other:?}"),
        }
    }

    #[test]
    fn compositions_carry_their_context_subtree() {
        let yaml = r#"_type: COMPOSITION
archetype_node_id: openEHR-EHR-COMPOSITION.encounter.v1
name:
  value: Encounter
language:
  terminology_id:
    value: ISO_639-1
  code_string: en
context:
  start_time:
    value: "2024-03-01T10:00:00Z"
  setting:
    value: other care
    defining_code:
      terminology_id:
        value: openehr
      code_string: "238"
  other_context:
    _type: ITEM_TREE
    archetype_node_id: at0001
    name:
      value: Tree
"#;
        let (tree, root) = read_yaml(yaml).expect("read composition");
        assert!(tree.path_exists(root, "/context/other_context[at0001]").unwrap());
        let written = write_yaml(&tree, root).unwrap();
        assert!(written.contains("other_context:"), "{written}");
        assert!(!written.contains("\nother_context"), "{written}");
    }

    #[test]
    fn reads_files() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("vitals.yaml");
        fs::write(&path, VITALS).unwrap();
        let (tree, _) = read_file(&path).expect("read file");
        assert_eq!(tree.len(), 3);
        assert!(matches!(
            read_file(dir.path().join("missing.yaml")),
            Err(OpenEhrError::Io(_))
        ));
    }
}
