//! Tree-walking interpreter for expression trees.

use super::coerce::{
    sniff_temporal, text_of, to_boolean, to_date_time, to_double, to_duration, to_int, to_time,
    TypeFamily,
};
use super::{ExprBinary, ExprItem, ExprLeaf, LeafItem, OperatorKind, ReferenceType};
use crate::path::{parse_path, ParsedPath, PathResult};
use crate::rm::{RmAttribute, RmItem, RmTree, RmValue};
use crate::{OpenEhrError, OpenEhrResult};
use regex::Regex;
use std::cmp::Ordering;

/// The result of evaluating an expression node.
#[derive(Clone, Debug, PartialEq)]
pub enum EvalValue {
    /// An attribute the owner declares but does not currently hold.
    Absent,
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Item(RmItem),
    List(Vec<EvalValue>),
}

impl From<&LeafItem> for EvalValue {
    fn from(item: &LeafItem) -> Self {
        match item {
            LeafItem::Boolean(b) => EvalValue::Boolean(*b),
            LeafItem::Integer(i) => EvalValue::Integer(*i),
            LeafItem::Real(r) => EvalValue::Real(*r),
            LeafItem::Text(text) => EvalValue::Text(text.clone()),
            LeafItem::List(items) => EvalValue::List(items.iter().map(EvalValue::from).collect()),
        }
    }
}

/// The datum under test and the object enclosing it.
#[derive(Clone, Debug)]
pub struct EvalContext {
    pub value: RmItem,
    pub enclosing: Option<RmItem>,
}

impl EvalContext {
    pub fn new(value: RmItem) -> Self {
        Self {
            value,
            enclosing: None,
        }
    }

    pub fn within(value: RmItem, enclosing: RmItem) -> Self {
        Self {
            value,
            enclosing: Some(enclosing),
        }
    }

    /// Where path leaves start: primitives cannot be navigated, so their enclosing object is
    /// used instead.
    fn path_origin(&self) -> RmItem {
        let primitive = matches!(
            self.value,
            RmItem::Value(
                RmValue::Boolean(_) | RmValue::Integer(_) | RmValue::Real(_) | RmValue::String(_)
            )
        );
        match (&self.enclosing, primitive) {
            (Some(enclosing), true) => enclosing.clone(),
            _ => self.value.clone(),
        }
    }
}

/// Evaluates expressions against items of one tree.
pub struct Evaluator<'a> {
    tree: &'a RmTree,
}

impl<'a> Evaluator<'a> {
    pub fn new(tree: &'a RmTree) -> Self {
        Self { tree }
    }

    /// Evaluates `expr` with `raw` as the datum under test.
    ///
    /// A single-element list result is unwrapped to its element.
    pub fn evaluate_value(&self, expr: &ExprItem, raw: impl Into<RmItem>) -> OpenEhrResult<EvalValue> {
        let result = self.evaluate(expr, &EvalContext::new(raw.into()))?;
        Ok(match result {
            EvalValue::List(mut items) if items.len() == 1 => items.remove(0),
            other => other,
        })
    }

    /// # Errors
    ///
    /// - [`OpenEhrError::Unsupported`] for unary operators, operators other than equality,
    ///   ordering, `matches`, `and` and `or`, and `matches` against anything but a pattern.
    /// - [`OpenEhrError::MissingOperand`] if `and`/`or` needs a right operand that is absent.
    /// - [`OpenEhrError::InvalidValue`] if an operand does not coerce to the comparison type.
    /// - [`OpenEhrError::OperatorInvalidForType`] for orderings over non-ordered types, and
    ///   equality between operands of different kinds.
    /// - [`OpenEhrError::PathNotExist`] or [`OpenEhrError::PathNotUnique`] from path leaves that
    ///   do not address one item, unless the path stops at a declared but unset attribute.
    pub fn evaluate(&self, expr: &ExprItem, context: &EvalContext) -> OpenEhrResult<EvalValue> {
        match expr {
            ExprItem::Leaf(leaf) => self.leaf(leaf, context),
            ExprItem::Unary(unary) => Err(OpenEhrError::Unsupported(format!(
                "unary operator '{}'",
                unary.operator
            ))),
            ExprItem::Binary(binary) => self.binary(binary, context),
        }
    }

    fn leaf(&self, leaf: &ExprLeaf, context: &EvalContext) -> OpenEhrResult<EvalValue> {
        match leaf.reference_type {
            ReferenceType::Constant | ReferenceType::Constraint | ReferenceType::Pattern => {
                Ok(EvalValue::from(&leaf.item))
            }
            ReferenceType::Path => {
                let path = leaf.item.as_text().ok_or_else(|| {
                    OpenEhrError::InvalidAssertion("path leaf does not hold a path".into())
                })?;
                self.resolve_leaf(context.path_origin(), path)
            }
            ReferenceType::Attribute | ReferenceType::Function => Err(OpenEhrError::Unsupported(
                format!("{:?} leaves", leaf.reference_type).to_lowercase(),
            )),
        }
    }

    /// Resolves a path leaf to the single item it addresses.
    ///
    /// A path that stops at an attribute its owner declares but leaves unset is
    /// [`EvalValue::Absent`]; any other miss is an error.
    fn resolve_leaf(&self, origin: RmItem, path: &str) -> OpenEhrResult<EvalValue> {
        match self.tree.item_at_path(origin.clone(), path) {
            Ok(item) => Ok(EvalValue::Item(item)),
            Err(OpenEhrError::PathNotExist(missing)) => {
                if self.stops_at_unset_attribute(origin, &parse_path(path)?)? {
                    tracing::debug!("path leaf {} reads an unset attribute", path);
                    Ok(EvalValue::Absent)
                } else {
                    Err(OpenEhrError::PathNotExist(missing))
                }
            }
            Err(err) => Err(err),
        }
    }

    fn stops_at_unset_attribute(&self, origin: RmItem, path: &ParsedPath) -> OpenEhrResult<bool> {
        for (i, segment) in path.segments.iter().enumerate() {
            let through = ParsedPath {
                absolute: path.absolute,
                segments: path.segments[..=i].to_vec(),
            };
            if self.tree.path_exists(origin.clone(), &through.to_string())? {
                continue;
            }
            let owner = if i == 0 && !path.absolute {
                origin
            } else {
                let prefix = ParsedPath {
                    absolute: path.absolute,
                    segments: path.segments[..i].to_vec(),
                };
                match self.tree.resolve(origin, &prefix.to_string())? {
                    PathResult::One(item) => item,
                    _ => return Ok(false),
                }
            };
            let Some(handle) = owner.as_node() else {
                return Ok(false);
            };
            let Ok(attribute) = segment.attribute.parse::<RmAttribute>() else {
                return Ok(false);
            };
            let declared = matches!(
                attribute,
                RmAttribute::Uid | RmAttribute::ArchetypeDetails | RmAttribute::ArchetypeId
            ) || self.tree.get(handle)?.rm_type().attribute_spec(attribute).is_some();
            return Ok(segment.predicate.is_none() && declared);
        }
        Ok(false)
    }

    fn binary(&self, binary: &ExprBinary, context: &EvalContext) -> OpenEhrResult<EvalValue> {
        match binary.operator {
            OperatorKind::And => {
                let left = self.evaluate(&binary.left, context)?;
                if !to_boolean(&left)? {
                    return Ok(EvalValue::Boolean(false));
                }
                self.strict_right(binary, context)
            }
            OperatorKind::Or => {
                let left = self.evaluate(&binary.left, context)?;
                if to_boolean(&left)? {
                    return Ok(EvalValue::Boolean(true));
                }
                self.strict_right(binary, context)
            }
            OperatorKind::Matches => self.matches(binary, context),
            op if op.is_relational() => self.compare(binary, context),
            op => Err(OpenEhrError::Unsupported(format!("binary operator '{op}'"))),
        }
    }

    fn strict_right(&self, binary: &ExprBinary, context: &EvalContext) -> OpenEhrResult<EvalValue> {
        let right = self.evaluate(&binary.right, context)?;
        if right == EvalValue::Absent {
            return Err(OpenEhrError::MissingOperand(format!(
                "right operand of '{}'",
                binary.operator
            )));
        }
        Ok(EvalValue::Boolean(to_boolean(&right)?))
    }

    fn matches(&self, binary: &ExprBinary, context: &EvalContext) -> OpenEhrResult<EvalValue> {
        let ExprItem::Leaf(ExprLeaf {
            reference_type: ReferenceType::Pattern,
            item,
            ..
        }) = binary.right.as_ref()
        else {
            return Err(OpenEhrError::Unsupported(
                "'matches' against a list or interval".into(),
            ));
        };
        let pattern = item.as_text().ok_or_else(|| {
            OpenEhrError::InvalidAssertion("pattern leaf does not hold text".into())
        })?;

        let left = single(self.evaluate(&binary.left, context)?)?;
        let Some(text) = text_of(&left) else {
            return Ok(EvalValue::Boolean(false));
        };
        let regex = Regex::new(&format!("(?s)^(?:{pattern})$")).map_err(|source| {
            OpenEhrError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            }
        })?;
        Ok(EvalValue::Boolean(regex.is_match(&text)))
    }

    fn compare(&self, binary: &ExprBinary, context: &EvalContext) -> OpenEhrResult<EvalValue> {
        let op = binary.operator;
        let type_name = comparison_type(binary);

        let left = single(self.evaluate(&binary.left, context)?)?;
        if left == EvalValue::Absent {
            return Ok(EvalValue::Boolean(false));
        }
        let right = single(self.evaluate(&binary.right, context)?)?;
        if right == EvalValue::Absent {
            return Ok(EvalValue::Boolean(false));
        }

        let invalid = || OpenEhrError::OperatorInvalidForType {
            operator: op.to_string(),
            type_name: type_name.clone(),
        };
        let equality = matches!(op, OperatorKind::Eq | OperatorKind::Ne);

        let mut family = TypeFamily::of(&type_name);
        if family == TypeFamily::String && !equality {
            if !self.tree.config().temporal_string_fallback() {
                return Err(invalid());
            }
            family = text_of(&right)
                .as_deref()
                .and_then(sniff_temporal)
                .ok_or_else(invalid)?;
        }

        let ordering = match family {
            TypeFamily::String | TypeFamily::Other => {
                if !equality {
                    return Err(invalid());
                }
                match (&left, &right) {
                    (EvalValue::Item(RmItem::Node(a)), EvalValue::Item(RmItem::Node(b))) => {
                        (a == b).then_some(Ordering::Equal)
                    }
                    _ => match (text_of(&left), text_of(&right)) {
                        (Some(a), Some(b)) => Some(a.cmp(&b)),
                        _ => match (&left, &right) {
                            (EvalValue::Item(RmItem::Value(a)), EvalValue::Item(RmItem::Value(b))) => {
                                (a == b).then_some(Ordering::Equal)
                            }
                            _ => return Err(invalid()),
                        },
                    },
                }
            }
            TypeFamily::Boolean => {
                if !equality {
                    return Err(invalid());
                }
                Some(to_boolean(&left)?.cmp(&to_boolean(&right)?))
            }
            TypeFamily::Integer => Some(to_int(&left)?.cmp(&to_int(&right)?)),
            TypeFamily::Real => to_double(&left)?.partial_cmp(&to_double(&right)?),
            TypeFamily::DateTime => to_date_time(&left)?.partial_cmp(&to_date_time(&right)?),
            TypeFamily::Duration => to_duration(&left)?.partial_cmp(&to_duration(&right)?),
            TypeFamily::Time => to_time(&left)?.partial_cmp(&to_time(&right)?),
        };

        let result = match op {
            OperatorKind::Eq => ordering == Some(Ordering::Equal),
            OperatorKind::Ne => ordering != Some(Ordering::Equal),
            OperatorKind::Lt => ordering == Some(Ordering::Less),
            OperatorKind::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            OperatorKind::Gt => ordering == Some(Ordering::Greater),
            OperatorKind::Ge => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            _ => return Err(invalid()),
        };
        Ok(EvalValue::Boolean(result))
    }
}

/// The declared type of the left operand, else of the right one, in lower case.
fn comparison_type(binary: &ExprBinary) -> String {
    let left = binary.left.type_name().trim();
    let chosen = if left.is_empty() {
        binary.right.type_name().trim()
    } else {
        left
    };
    chosen.to_ascii_lowercase()
}

/// Collapses a one-element list; several values cannot be compared as one.
fn single(value: EvalValue) -> OpenEhrResult<EvalValue> {
    match value {
        EvalValue::List(mut items) => match items.len() {
            0 => Ok(EvalValue::Absent),
            1 => Ok(items.remove(0)),
            n => Err(OpenEhrError::Unsupported(format!(
                "comparison over {n} values"
            ))),
        },
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CoreConfig, LATEST_RM};
    use crate::data_types::{DataValue, DvDateTime, DvQuantity, DvText, Iso8601DateTime};
    use crate::assertion::{Assertion, ExprUnary};
    use crate::rm::{Locatable, NodeHandle, RmAttribute, RmType};

    fn element_tree(config: CoreConfig) -> (RmTree, NodeHandle) {
        let mut tree = RmTree::with_config(config);
        let element = tree.insert(Locatable::new(RmType::Element, "at0004", "Systolic").unwrap());
        tree.set_value(
            element,
            RmAttribute::Value,
            RmValue::Data(DataValue::Quantity(DvQuantity::new(120.0, "mm[Hg]"))),
        )
        .unwrap();
        (tree, element)
    }

    fn constant_eq(type_name: &str, left: LeafItem, right: LeafItem) -> ExprItem {
        ExprItem::binary(
            "Boolean",
            OperatorKind::Eq,
            ExprItem::constant(type_name, left),
            ExprItem::constant(type_name, right),
        )
    }

    #[test]
    fn integer_equality_coerces_through_text() {
        let (tree, element) = element_tree(CoreConfig::default());
        let evaluator = Evaluator::new(&tree);
        let expr = constant_eq("Integer", LeafItem::Integer(5), LeafItem::Text("5".into()));
        assert_eq!(
            evaluator.evaluate_value(&expr, element).unwrap(),
            EvalValue::Boolean(true)
        );

        let bad = constant_eq("Integer", LeafItem::Integer(5), LeafItem::Text("five".into()));
        assert!(matches!(
            evaluator.evaluate_value(&bad, element),
            Err(OpenEhrError::InvalidValue { .. })
        ));
    }

    #[test]
    fn string_equality_compares_raw_text() {
        let (tree, element) = element_tree(CoreConfig::default());
        let evaluator = Evaluator::new(&tree);
        let expr = constant_eq("String", LeafItem::Text("abc".into()), LeafItem::Text("abc".into()));
        assert_eq!(
            evaluator.evaluate_value(&expr, element).unwrap(),
            EvalValue::Boolean(true)
        );
        let expr = constant_eq("String", LeafItem::Text("abc".into()), LeafItem::Text("ABC".into()));
        assert_eq!(
            evaluator.evaluate_value(&expr, element).unwrap(),
            EvalValue::Boolean(false)
        );
    }

    #[test]
    fn path_leaves_resolve_against_the_datum() {
        let (tree, element) = element_tree(CoreConfig::default());
        let expr = ExprItem::binary(
            "Boolean",
            OperatorKind::Ge,
            ExprItem::path("Real", "value/magnitude"),
            ExprItem::constant("Real", LeafItem::Real(100.0)),
        );
        let assertion = Assertion::new(None, expr, None, Vec::new()).unwrap();
        assert!(assertion.evaluate(&tree, element).unwrap());

        // An unset attribute makes a comparison false.
        let absent = ExprItem::binary(
            "Boolean",
            OperatorKind::Eq,
            ExprItem::path("String", "null_flavour"),
            ExprItem::constant("String", LeafItem::Text("unknown".into())),
        );
        let evaluator = Evaluator::new(&tree);
        assert_eq!(
            evaluator.evaluate_value(&absent, element).unwrap(),
            EvalValue::Boolean(false)
        );

        // A path that leads nowhere is an error, not a false comparison.
        let nowhere = ExprItem::binary(
            "Boolean",
            OperatorKind::Eq,
            ExprItem::path("String", "no_such/thing"),
            ExprItem::constant("String", LeafItem::Text("x".into())),
        );
        assert!(matches!(
            evaluator.evaluate_value(&nowhere, element),
            Err(OpenEhrError::PathNotExist(_))
        ));
        // Reading through an unset attribute is as absent as reading the attribute itself.
        let below_unset = ExprItem::binary(
            "Boolean",
            OperatorKind::Eq,
            ExprItem::path("String", "null_flavour/value"),
            ExprItem::constant("String", LeafItem::Text("unknown".into())),
        );
        assert_eq!(
            evaluator.evaluate_value(&below_unset, element).unwrap(),
            EvalValue::Boolean(false)
        );
    }

    #[test]
    fn path_leaves_must_address_one_item() {
        let mut tree = RmTree::new();
        let cluster = tree.insert(Locatable::new(RmType::Cluster, "at0001", "Readings").unwrap());
        for name in ["First", "Second"] {
            let element = tree.insert(Locatable::new(RmType::Element, "at0002", name).unwrap());
            tree.attach(cluster, RmAttribute::Items, element).unwrap();
        }
        let expr = ExprItem::binary(
            "Boolean",
            OperatorKind::Eq,
            ExprItem::path("String", "items[at0002]/name/value"),
            ExprItem::constant("String", LeafItem::Text("First".into())),
        );
        assert!(matches!(
            Evaluator::new(&tree).evaluate_value(&expr, cluster),
            Err(OpenEhrError::PathNotUnique(_))
        ));
    }

    #[test]
    fn node_operands_are_equal_only_to_themselves() {
        let mut tree = RmTree::new();
        let cluster = tree.insert(Locatable::new(RmType::Cluster, "at0001", "Readings").unwrap());
        for (node_id, name) in [("at0002", "Systolic"), ("at0003", "Diastolic")] {
            let element = tree.insert(Locatable::new(RmType::Element, node_id, name).unwrap());
            tree.attach(cluster, RmAttribute::Items, element).unwrap();
        }
        let evaluator = Evaluator::new(&tree);
        let compare = |op: OperatorKind, left: &str, right: &str| {
            ExprItem::binary(
                "Boolean",
                op,
                ExprItem::path("ELEMENT", left),
                ExprItem::path("ELEMENT", right),
            )
        };

        let distinct = compare(OperatorKind::Eq, "items[at0002]", "items[at0003]");
        assert_eq!(
            evaluator.evaluate_value(&distinct, cluster).unwrap(),
            EvalValue::Boolean(false)
        );
        let differ = compare(OperatorKind::Ne, "items[at0002]", "items[at0003]");
        assert_eq!(
            evaluator.evaluate_value(&differ, cluster).unwrap(),
            EvalValue::Boolean(true)
        );
        let same = compare(OperatorKind::Eq, "items[at0002]", "items[at0002]");
        assert_eq!(
            evaluator.evaluate_value(&same, cluster).unwrap(),
            EvalValue::Boolean(true)
        );

        let against_text = ExprItem::binary(
            "Boolean",
            OperatorKind::Eq,
            ExprItem::path("ELEMENT", "items[at0002]"),
            ExprItem::constant("ELEMENT", LeafItem::Text("Systolic".into())),
        );
        assert!(matches!(
            evaluator.evaluate_value(&against_text, cluster),
            Err(OpenEhrError::OperatorInvalidForType { .. })
        ));
    }

    #[test]
    fn and_short_circuits_before_the_right_operand() {
        let (tree, element) = element_tree(CoreConfig::default());
        let evaluator = Evaluator::new(&tree);
        let unsupported = ExprItem::Unary(ExprUnary {
            type_name: "Boolean".into(),
            operator: OperatorKind::Not,
            operand: Box::new(ExprItem::constant("Boolean", LeafItem::Boolean(true))),
            precedence_overridden: false,
        });
        let missing = ExprItem::path("Boolean", "no/such/path");
        let combine = |op: OperatorKind, left: bool, right: ExprItem| {
            ExprItem::binary(
                "Boolean",
                op,
                ExprItem::constant("Boolean", LeafItem::Boolean(left)),
                right,
            )
        };

        for right in [unsupported.clone(), missing.clone()] {
            assert_eq!(
                evaluator
                    .evaluate_value(&combine(OperatorKind::And, false, right.clone()), element)
                    .unwrap(),
                EvalValue::Boolean(false)
            );
            assert_eq!(
                evaluator
                    .evaluate_value(&combine(OperatorKind::Or, true, right), element)
                    .unwrap(),
                EvalValue::Boolean(true)
            );
        }

        assert!(matches!(
            evaluator.evaluate_value(&combine(OperatorKind::Or, false, unsupported), element),
            Err(OpenEhrError::Unsupported(_))
        ));
        assert!(matches!(
            evaluator.evaluate_value(&combine(OperatorKind::Or, false, missing.clone()), element),
            Err(OpenEhrError::PathNotExist(_))
        ));
        assert!(matches!(
            evaluator.evaluate_value(&combine(OperatorKind::And, true, missing), element),
            Err(OpenEhrError::PathNotExist(_))
        ));
    }

    #[test]
    fn strict_operands_reject_absent_right_sides() {
        let (tree, element) = element_tree(CoreConfig::default());
        let or = ExprItem::binary(
            "Boolean",
            OperatorKind::Or,
            ExprItem::constant("Boolean", LeafItem::Boolean(false)),
            ExprItem::path("Boolean", "null_flavour"),
        );
        assert!(matches!(
            Evaluator::new(&tree).evaluate_value(&or, element),
            Err(OpenEhrError::MissingOperand(_))
        ));
    }

    #[test]
    fn matches_requires_a_pattern_leaf() {
        let (tree, element) = element_tree(CoreConfig::default());
        let evaluator = Evaluator::new(&tree);
        let units = |right: ExprItem| {
            ExprItem::binary(
                "Boolean",
                OperatorKind::Matches,
                ExprItem::path("String", "value/units"),
                right,
            )
        };

        assert_eq!(
            evaluator
                .evaluate_value(&units(ExprItem::pattern(r"mm\[Hg\]")), element)
                .unwrap(),
            EvalValue::Boolean(true)
        );
        assert_eq!(
            evaluator
                .evaluate_value(&units(ExprItem::pattern("cm")), element)
                .unwrap(),
            EvalValue::Boolean(false)
        );
        let list = ExprItem::leaf(
            "String",
            LeafItem::List(vec![LeafItem::Text("mm[Hg]".into())]),
            ReferenceType::Constraint,
        );
        assert!(matches!(
            evaluator.evaluate_value(&units(list), element),
            Err(OpenEhrError::Unsupported(_))
        ));
    }

    #[test]
    fn string_ordering_falls_back_to_temporal_literals() {
        let mut tree = RmTree::with_config(CoreConfig::default());
        let element = tree.insert(Locatable::new(RmType::Element, "at0010", "Recorded").unwrap());
        tree.set_value(
            element,
            RmAttribute::Value,
            RmValue::Data(DataValue::DateTime(DvDateTime {
                value: Iso8601DateTime::parse("2024-03-01T10:00:00Z").unwrap(),
            })),
        )
        .unwrap();
        let later_than = |literal: &str| {
            ExprItem::binary(
                "Boolean",
                OperatorKind::Gt,
                ExprItem::path("String", "value/value"),
                ExprItem::constant("String", LeafItem::Text(literal.into())),
            )
        };

        let evaluator = Evaluator::new(&tree);
        assert_eq!(
            evaluator
                .evaluate_value(&later_than("2024-01-01T00:00:00Z"), element)
                .unwrap(),
            EvalValue::Boolean(true)
        );
        assert!(matches!(
            evaluator.evaluate_value(&later_than("banana"), element),
            Err(OpenEhrError::OperatorInvalidForType { .. })
        ));

        let mut strict = RmTree::with_config(CoreConfig::new(LATEST_RM, true, false));
        let text = strict.insert(Locatable::new(RmType::Element, "at0011", "Note").unwrap());
        strict
            .set_value(
                text,
                RmAttribute::Value,
                RmValue::Data(DataValue::Text(DvText::new("2024-03-01"))),
            )
            .unwrap();
        assert!(matches!(
            Evaluator::new(&strict).evaluate_value(&later_than("2024-01-01"), text),
            Err(OpenEhrError::OperatorInvalidForType { .. })
        ));
    }

    #[test]
    fn unimplemented_operators_fail_clearly() {
        let (tree, element) = element_tree(CoreConfig::default());
        let xor = ExprItem::binary(
            "Boolean",
            OperatorKind::Xor,
            ExprItem::constant("Boolean", LeafItem::Boolean(true)),
            ExprItem::constant("Boolean", LeafItem::Boolean(false)),
        );
        assert!(matches!(
            Evaluator::new(&tree).evaluate_value(&xor, element),
            Err(OpenEhrError::Unsupported(_))
        ));
    }
}
