//! Validation errors and the context they accumulate in.
//!
//! Constraint checks never fail with `Err` for a domain mismatch. They record a
//! [`ValidationError`] in the [`ValidationContext`] and carry on, so one run reports every
//! violation in the instance.

use super::Archetype;
use crate::rm::{NodeHandle, RmItem, RmTree};
use crate::{OpenEhrError, OpenEhrResult};
use std::fmt;

/// What kind of rule an instance broke.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValidationErrorKind {
    TypeMismatch,
    NodeIdMismatch,
    Existence,
    Cardinality,
    Occurrences,
    NoMatchingConstraint,
    PrimitiveValue,
    CodeNotInList,
    TerminologyMismatch,
    OrdinalNotInList,
    QuantityMismatch,
    StateNotAllowed,
    SlotNotAllowed,
    AssertionFailed,
}

impl fmt::Display for ValidationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ValidationErrorKind::TypeMismatch => "type mismatch",
            ValidationErrorKind::NodeIdMismatch => "node id mismatch",
            ValidationErrorKind::Existence => "existence",
            ValidationErrorKind::Cardinality => "cardinality",
            ValidationErrorKind::Occurrences => "occurrences",
            ValidationErrorKind::NoMatchingConstraint => "no matching constraint",
            ValidationErrorKind::PrimitiveValue => "primitive value",
            ValidationErrorKind::CodeNotInList => "code not in list",
            ValidationErrorKind::TerminologyMismatch => "terminology mismatch",
            ValidationErrorKind::OrdinalNotInList => "ordinal not in list",
            ValidationErrorKind::QuantityMismatch => "quantity mismatch",
            ValidationErrorKind::StateNotAllowed => "state not allowed",
            ValidationErrorKind::SlotNotAllowed => "slot not allowed",
            ValidationErrorKind::AssertionFailed => "assertion failed",
        };
        f.write_str(text)
    }
}

/// One recorded violation.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    /// The nearest instance node to the offending value.
    pub node: Option<NodeHandle>,
    /// Constraint path of the rule that failed.
    pub path: String,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}: {}", self.kind, self.path, self.message)
    }
}

/// The ambient state of one validation run.
pub struct ValidationContext<'a> {
    tree: &'a RmTree,
    archetype: Option<&'a Archetype>,
    node: Option<NodeHandle>,
    errors: Vec<ValidationError>,
    /// Internal references being followed, with the item each was entered for.
    following: Vec<(String, RmItem)>,
}

impl<'a> ValidationContext<'a> {
    pub fn new(tree: &'a RmTree) -> Self {
        Self {
            tree,
            archetype: None,
            node: None,
            errors: Vec::new(),
            following: Vec::new(),
        }
    }

    /// A context that can follow internal references into `archetype`.
    pub fn for_archetype(tree: &'a RmTree, archetype: &'a Archetype) -> Self {
        Self {
            archetype: Some(archetype),
            ..Self::new(tree)
        }
    }

    pub fn tree(&self) -> &'a RmTree {
        self.tree
    }

    pub fn archetype(&self) -> Option<&'a Archetype> {
        self.archetype
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn record(
        &mut self,
        kind: ValidationErrorKind,
        path: &str,
        message: impl Into<String>,
    ) {
        let error = ValidationError {
            kind,
            node: self.node,
            path: path.to_string(),
            message: message.into(),
        };
        tracing::debug!("validation error: {}", error);
        self.errors.push(error);
    }

    /// Runs `f` with `node` as the node errors are attributed to.
    pub(crate) fn scoped<R>(
        &mut self,
        node: Option<NodeHandle>,
        f: impl FnOnce(&mut Self) -> R,
    ) -> R {
        let previous = self.node;
        if node.is_some() {
            self.node = node;
        }
        let result = f(self);
        self.node = previous;
        result
    }

    /// An empty context over the same tree, for trying alternatives.
    pub(crate) fn fork(&self) -> Self {
        Self {
            tree: self.tree,
            archetype: self.archetype,
            node: self.node,
            errors: Vec::new(),
            following: self.following.clone(),
        }
    }

    /// Follows the internal reference to `target` for `item` while `f` runs.
    ///
    /// # Errors
    ///
    /// Returns [`OpenEhrError::InvalidConstraint`] if `target` is already being followed for
    /// the same item, which would never terminate.
    pub(crate) fn following<R>(
        &mut self,
        target: &str,
        item: &RmItem,
        f: impl FnOnce(&mut Self) -> OpenEhrResult<R>,
    ) -> OpenEhrResult<R> {
        if self
            .following
            .iter()
            .any(|(path, entered)| path == target && entered == item)
        {
            return Err(OpenEhrError::InvalidConstraint(format!(
                "internal reference cycle through {target}"
            )));
        }
        self.following.push((target.to_string(), item.clone()));
        let result = f(self);
        self.following.pop();
        result
    }

    pub(crate) fn absorb(&mut self, other: ValidationContext<'_>) {
        self.errors.extend(other.errors);
    }

    pub fn into_report(self) -> ValidationReport {
        ValidationReport {
            errors: self.errors,
        }
    }
}

/// Every violation found by a validation run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ValidationReport {
    errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// The errors of one kind.
    pub fn of_kind(&self, kind: ValidationErrorKind) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter().filter(move |e| e.kind == kind)
    }

    pub fn into_errors(self) -> Vec<ValidationError> {
        self.errors
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.errors.is_empty() {
            return f.write_str("valid");
        }
        for (i, error) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

/// Joins a constraint path and an attribute name.
pub(crate) fn attribute_path(path: &str, attribute: &str) -> String {
    format!("{}/{}", path.trim_end_matches('/'), attribute)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_are_attributed_to_the_scoped_node() {
        let tree = RmTree::new();
        let mut ctx = ValidationContext::new(&tree);
        let node = NodeHandle::from_index(3);

        ctx.scoped(Some(node), |ctx| {
            ctx.record(ValidationErrorKind::Existence, "/data", "missing");
        });
        ctx.record(ValidationErrorKind::Cardinality, "/items", "too many");

        let report = ctx.into_report();
        assert_eq!(report.len(), 2);
        assert_eq!(report.errors()[0].node, Some(node));
        assert_eq!(report.errors()[1].node, None);
        assert_eq!(
            report.to_string(),
            "existence at /data: missing\ncardinality at /items: too many"
        );
    }

    #[test]
    fn forks_collect_separately() {
        let tree = RmTree::new();
        let mut ctx = ValidationContext::new(&tree);
        let mut fork = ctx.fork();
        fork.record(ValidationErrorKind::TypeMismatch, "/value", "expected DV_TEXT");
        assert_eq!(ctx.error_count(), 0);
        ctx.absorb(fork);
        assert_eq!(ctx.error_count(), 1);
    }

    #[test]
    fn following_the_same_reference_for_the_same_item_is_a_cycle() {
        let tree = RmTree::new();
        let mut ctx = ValidationContext::new(&tree);
        let item = RmItem::Node(NodeHandle::from_index(0));
        let other = RmItem::Node(NodeHandle::from_index(1));

        let nested = ctx.following("/items[at0001]", &item, |ctx| {
            ctx.following("/items[at0001]", &other, |_| Ok(()))
        });
        assert!(nested.is_ok());

        let cycle = ctx.following("/items[at0001]", &item, |ctx| {
            ctx.following("/items[at0001]", &item, |_| Ok(()))
        });
        assert!(matches!(cycle, Err(OpenEhrError::InvalidConstraint(_))));
        // The guard is released once the reference has been followed.
        assert!(ctx.following("/items[at0001]", &item, |_| Ok(())).is_ok());
    }

    #[test]
    fn attribute_paths_join_without_double_slashes() {
        assert_eq!(attribute_path("/", "content"), "/content");
        assert_eq!(attribute_path("/content[at0001]", "items"), "/content[at0001]/items");
    }
}
