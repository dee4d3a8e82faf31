//! Assertions: boolean expression trees over instance data.
//!
//! Archetypes use assertions for invariants (`/data/events/time > /data/origin`) and slot
//! rules (`archetype_id/value matches {/openEHR-EHR-CLUSTER\.device\.v1/}`). An expression is a
//! closed tree of [`ExprItem`]s; leaves are constants, patterns or paths resolved against the
//! instance being checked.

mod coerce;
mod evaluator;

pub use coerce::TypeFamily;
pub use evaluator::{EvalContext, EvalValue, Evaluator};

use crate::rm::{RmItem, RmTree};
use crate::{OpenEhrError, OpenEhrResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// openEHR `OPERATOR_KIND`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum OperatorKind {
    Eq,
    Ne,
    Le,
    Lt,
    Ge,
    Gt,
    Matches,
    Not,
    And,
    Or,
    Xor,
    Implies,
    ForAll,
    Exists,
    Plus,
    Minus,
    Multiply,
    Divide,
    Exp,
}

impl OperatorKind {
    const ALL: [OperatorKind; 19] = [
        OperatorKind::Eq,
        OperatorKind::Ne,
        OperatorKind::Le,
        OperatorKind::Lt,
        OperatorKind::Ge,
        OperatorKind::Gt,
        OperatorKind::Matches,
        OperatorKind::Not,
        OperatorKind::And,
        OperatorKind::Or,
        OperatorKind::Xor,
        OperatorKind::Implies,
        OperatorKind::ForAll,
        OperatorKind::Exists,
        OperatorKind::Plus,
        OperatorKind::Minus,
        OperatorKind::Multiply,
        OperatorKind::Divide,
        OperatorKind::Exp,
    ];

    pub fn code(self) -> u32 {
        match self {
            OperatorKind::Eq => 2001,
            OperatorKind::Ne => 2002,
            OperatorKind::Le => 2003,
            OperatorKind::Lt => 2004,
            OperatorKind::Ge => 2005,
            OperatorKind::Gt => 2006,
            OperatorKind::Matches => 2007,
            OperatorKind::Not => 2010,
            OperatorKind::And => 2011,
            OperatorKind::Or => 2012,
            OperatorKind::Xor => 2013,
            OperatorKind::Implies => 2014,
            OperatorKind::ForAll => 2015,
            OperatorKind::Exists => 2016,
            OperatorKind::Plus => 2020,
            OperatorKind::Minus => 2021,
            OperatorKind::Multiply => 2022,
            OperatorKind::Divide => 2023,
            OperatorKind::Exp => 2024,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            OperatorKind::Eq => "=",
            OperatorKind::Ne => "!=",
            OperatorKind::Le => "<=",
            OperatorKind::Lt => "<",
            OperatorKind::Ge => ">=",
            OperatorKind::Gt => ">",
            OperatorKind::Matches => "matches",
            OperatorKind::Not => "not",
            OperatorKind::And => "and",
            OperatorKind::Or => "or",
            OperatorKind::Xor => "xor",
            OperatorKind::Implies => "implies",
            OperatorKind::ForAll => "for_all",
            OperatorKind::Exists => "exists",
            OperatorKind::Plus => "+",
            OperatorKind::Minus => "-",
            OperatorKind::Multiply => "*",
            OperatorKind::Divide => "/",
            OperatorKind::Exp => "^",
        }
    }

    /// # Errors
    ///
    /// Returns [`OpenEhrError::InvalidOperator`] for codes outside `OPERATOR_KIND`.
    pub fn from_code(code: u32) -> OpenEhrResult<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.code() == code)
            .ok_or_else(|| OpenEhrError::InvalidOperator(code.to_string()))
    }

    /// Accepts the operator symbol (`=`, `matches`, ...) case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`OpenEhrError::InvalidOperator`] for unknown symbols.
    pub fn from_symbol(symbol: &str) -> OpenEhrResult<Self> {
        let wanted = symbol.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|op| op.symbol() == wanted)
            .ok_or_else(|| OpenEhrError::InvalidOperator(symbol.to_string()))
    }

    pub fn is_relational(self) -> bool {
        matches!(
            self,
            OperatorKind::Eq
                | OperatorKind::Ne
                | OperatorKind::Le
                | OperatorKind::Lt
                | OperatorKind::Ge
                | OperatorKind::Gt
        )
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl TryFrom<String> for OperatorKind {
    type Error = OpenEhrError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_symbol(&value)
    }
}

impl From<OperatorKind> for String {
    fn from(op: OperatorKind) -> Self {
        op.symbol().to_string()
    }
}

/// How a leaf's `item` is to be interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceType {
    Constant,
    Path,
    Constraint,
    Pattern,
    Attribute,
    Function,
}

/// The literal carried by a leaf.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum LeafItem {
    Boolean(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    List(Vec<LeafItem>),
}

impl LeafItem {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            LeafItem::Text(text) => Some(text),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExprLeaf {
    #[serde(rename = "type")]
    pub type_name: String,
    pub item: LeafItem,
    pub reference_type: ReferenceType,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExprUnary {
    #[serde(rename = "type")]
    pub type_name: String,
    pub operator: OperatorKind,
    pub operand: Box<ExprItem>,
    #[serde(default)]
    pub precedence_overridden: bool,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExprBinary {
    #[serde(rename = "type")]
    pub type_name: String,
    pub operator: OperatorKind,
    pub left: Box<ExprItem>,
    pub right: Box<ExprItem>,
    /// Serialization hint only.
    #[serde(default)]
    pub precedence_overridden: bool,
}

/// A node of an expression tree.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "_type")]
pub enum ExprItem {
    #[serde(rename = "EXPR_LEAF")]
    Leaf(ExprLeaf),
    #[serde(rename = "EXPR_UNARY_OPERATOR")]
    Unary(ExprUnary),
    #[serde(rename = "EXPR_BINARY_OPERATOR")]
    Binary(ExprBinary),
}

impl ExprItem {
    pub fn constant(type_name: &str, item: LeafItem) -> Self {
        Self::leaf(type_name, item, ReferenceType::Constant)
    }

    pub fn path(type_name: &str, path: &str) -> Self {
        Self::leaf(type_name, LeafItem::Text(path.to_string()), ReferenceType::Path)
    }

    pub fn pattern(pattern: &str) -> Self {
        Self::leaf("String", LeafItem::Text(pattern.to_string()), ReferenceType::Pattern)
    }

    pub fn leaf(type_name: &str, item: LeafItem, reference_type: ReferenceType) -> Self {
        ExprItem::Leaf(ExprLeaf {
            type_name: type_name.to_string(),
            item,
            reference_type,
        })
    }

    pub fn binary(type_name: &str, operator: OperatorKind, left: ExprItem, right: ExprItem) -> Self {
        ExprItem::Binary(ExprBinary {
            type_name: type_name.to_string(),
            operator,
            left: Box::new(left),
            right: Box::new(right),
            precedence_overridden: false,
        })
    }

    pub fn type_name(&self) -> &str {
        match self {
            ExprItem::Leaf(leaf) => &leaf.type_name,
            ExprItem::Unary(unary) => &unary.type_name,
            ExprItem::Binary(binary) => &binary.type_name,
        }
    }

    /// Checks that every operator node declares its type.
    pub fn check(&self) -> OpenEhrResult<()> {
        match self {
            ExprItem::Leaf(_) => Ok(()),
            ExprItem::Unary(unary) => {
                if unary.type_name.trim().is_empty() {
                    return Err(OpenEhrError::InvalidAssertion(format!(
                        "operator '{}' has no type",
                        unary.operator
                    )));
                }
                unary.operand.check()
            }
            ExprItem::Binary(binary) => {
                if binary.type_name.trim().is_empty() {
                    return Err(OpenEhrError::InvalidAssertion(format!(
                        "operator '{}' has no type",
                        binary.operator
                    )));
                }
                binary.left.check()?;
                binary.right.check()
            }
        }
    }
}

/// A named variable an assertion may refer to.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AssertionVariable {
    pub name: String,
    pub definition: String,
}

/// A tagged boolean expression.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Assertion {
    #[serde(skip_serializing_if = "Option::is_none")]
    tag: Option<String>,
    expression: ExprItem,
    #[serde(skip_serializing_if = "Option::is_none")]
    string_expression: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    variables: Vec<AssertionVariable>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct AssertionDef {
    #[serde(default)]
    tag: Option<String>,
    expression: ExprItem,
    #[serde(default)]
    string_expression: Option<String>,
    #[serde(default)]
    variables: Vec<AssertionVariable>,
}

impl<'de> Deserialize<'de> for Assertion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let def = AssertionDef::deserialize(deserializer)?;
        Assertion::new(def.tag, def.expression, def.string_expression, def.variables)
            .map_err(serde::de::Error::custom)
    }
}

impl Assertion {
    /// # Errors
    ///
    /// Returns [`OpenEhrError::InvalidAssertion`] unless the root expression is of type
    /// `BOOLEAN` (any case) and every operator node is typed.
    pub fn new(
        tag: Option<String>,
        expression: ExprItem,
        string_expression: Option<String>,
        variables: Vec<AssertionVariable>,
    ) -> OpenEhrResult<Self> {
        if !expression.type_name().eq_ignore_ascii_case("boolean") {
            return Err(OpenEhrError::InvalidAssertion(format!(
                "root expression must be BOOLEAN, found '{}'",
                expression.type_name()
            )));
        }
        expression.check()?;
        Ok(Self {
            tag,
            expression,
            string_expression,
            variables,
        })
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn expression(&self) -> &ExprItem {
        &self.expression
    }

    pub fn string_expression(&self) -> Option<&str> {
        self.string_expression.as_deref()
    }

    pub fn variables(&self) -> &[AssertionVariable] {
        &self.variables
    }

    /// Evaluates the assertion against `item` of `tree`.
    ///
    /// An expression that yields nothing counts as `false`.
    ///
    /// # Arguments
    ///
    /// * `tree` - The tree path leaves are resolved in.
    /// * `item` - The node or value relative paths start from.
    ///
    /// # Errors
    ///
    /// - [`OpenEhrError::PathNotExist`] if a path leaf leads nowhere. A path that stops at an
    ///   attribute its owner declares but does not hold reads as absent instead.
    /// - [`OpenEhrError::PathNotUnique`] if a path leaf addresses several items.
    /// - [`OpenEhrError::OperatorInvalidForType`] if operands cannot be compared.
    /// - [`OpenEhrError::MissingOperand`] if `and`/`or` needs a right operand that is absent.
    pub fn evaluate(&self, tree: &RmTree, item: impl Into<RmItem>) -> OpenEhrResult<bool> {
        let evaluator = Evaluator::new(tree);
        let context = EvalContext::new(item.into());
        let result = evaluator.evaluate(&self.expression, &context)?;
        coerce::to_boolean(&result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_codes_and_symbols_round_trip() {
        for op in OperatorKind::ALL {
            assert_eq!(OperatorKind::from_code(op.code()).unwrap(), op);
            assert_eq!(OperatorKind::from_symbol(op.symbol()).unwrap(), op);
        }
        assert!(matches!(
            OperatorKind::from_code(2008),
            Err(OpenEhrError::InvalidOperator(_))
        ));
        assert!(matches!(
            OperatorKind::from_symbol("~="),
            Err(OpenEhrError::InvalidOperator(_))
        ));
    }

    #[test]
    fn assertion_root_must_be_boolean() {
        let comparison = ExprItem::binary(
            "Boolean",
            OperatorKind::Eq,
            ExprItem::path("Integer", "/value/magnitude"),
            ExprItem::constant("Integer", LeafItem::Integer(1)),
        );
        assert!(Assertion::new(None, comparison, None, Vec::new()).is_ok());

        let not_boolean = ExprItem::constant("Integer", LeafItem::Integer(1));
        assert!(matches!(
            Assertion::new(None, not_boolean, None, Vec::new()),
            Err(OpenEhrError::InvalidAssertion(_))
        ));

        let untyped = ExprItem::binary(
            "BOOLEAN",
            OperatorKind::And,
            ExprItem::binary(
                "",
                OperatorKind::Eq,
                ExprItem::constant("Integer", LeafItem::Integer(1)),
                ExprItem::constant("Integer", LeafItem::Integer(1)),
            ),
            ExprItem::constant("Boolean", LeafItem::Boolean(true)),
        );
        assert!(Assertion::new(None, untyped, None, Vec::new()).is_err());
    }

    #[test]
    fn assertions_load_from_tagged_yaml() {
        let yaml = r#"
tag: device
expression:
  _type: EXPR_BINARY_OPERATOR
  type: Boolean
  operator: matches
  left:
    _type: EXPR_LEAF
    type: String
    item: archetype_id/value
    reference_type: path
  right:
    _type: EXPR_LEAF
    type: String
    item: 'openEHR-EHR-CLUSTER\.device\.v1'
    reference_type: pattern
"#;
        let assertion: Assertion = serde_yaml::from_str(yaml).expect("parse assertion");
        assert_eq!(assertion.tag(), Some("device"));
        assert!(matches!(
            assertion.expression(),
            ExprItem::Binary(ExprBinary {
                operator: OperatorKind::Matches,
                ..
            })
        ));

        let bad = yaml.replace("operator: matches", "operator: resembles");
        assert!(serde_yaml::from_str::<Assertion>(&bad).is_err());
    }
}
