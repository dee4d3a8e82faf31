//! The constraint tree: object and attribute constraints.

use super::domain::{CCodePhrase, CDomainObject, CDvOrdinal, CDvQuantity, CDvState};
use super::primitive::CPrimitiveObject;
use super::validate::{attribute_path, ValidationContext, ValidationErrorKind};
use crate::assertion::Assertion;
use crate::data_types::DataValue;
use crate::rm::{rm_type_conforms, Navigated, RmItem, RmValue};
use crate::{OpenEhrError, OpenEhrResult};
use openehr_types::Interval;
use serde::{Deserialize, Serialize};

/// Cardinality of a multiple-valued attribute.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Cardinality {
    pub interval: Interval<u32>,
    #[serde(default = "ordered_default")]
    pub is_ordered: bool,
    #[serde(default)]
    pub is_unique: bool,
}

fn ordered_default() -> bool {
    true
}

impl Cardinality {
    pub fn new(interval: Interval<u32>) -> Self {
        Self {
            interval,
            is_ordered: true,
            is_unique: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CAttributeKind {
    Single,
    Multiple(Cardinality),
}

/// Constraint on one attribute of a complex object.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(from = "CAttributeWire", into = "CAttributeWire")]
pub struct CAttribute {
    pub rm_attribute_name: String,
    /// How many values may be present (0 or 1); `None` leaves the attribute optional.
    pub existence: Option<Interval<u32>>,
    pub kind: CAttributeKind,
    pub children: Vec<CObject>,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct CAttributeWire {
    rm_attribute_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    existence: Option<Interval<u32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    cardinality: Option<Cardinality>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<CObject>,
}

impl From<CAttributeWire> for CAttribute {
    fn from(wire: CAttributeWire) -> Self {
        Self {
            rm_attribute_name: wire.rm_attribute_name,
            existence: wire.existence,
            kind: match wire.cardinality {
                Some(cardinality) => CAttributeKind::Multiple(cardinality),
                None => CAttributeKind::Single,
            },
            children: wire.children,
        }
    }
}

impl From<CAttribute> for CAttributeWire {
    fn from(attribute: CAttribute) -> Self {
        Self {
            rm_attribute_name: attribute.rm_attribute_name,
            existence: attribute.existence,
            cardinality: match attribute.kind {
                CAttributeKind::Multiple(cardinality) => Some(cardinality),
                CAttributeKind::Single => None,
            },
            children: attribute.children,
        }
    }
}

impl CAttribute {
    pub fn single(name: impl Into<String>, children: Vec<CObject>) -> Self {
        Self {
            rm_attribute_name: name.into(),
            existence: None,
            kind: CAttributeKind::Single,
            children,
        }
    }

    pub fn multiple(name: impl Into<String>, cardinality: Cardinality, children: Vec<CObject>) -> Self {
        Self {
            rm_attribute_name: name.into(),
            existence: None,
            kind: CAttributeKind::Multiple(cardinality),
            children,
        }
    }

    pub fn with_existence(mut self, existence: Interval<u32>) -> Self {
        self.existence = Some(existence);
        self
    }

    pub fn is_required(&self) -> bool {
        self.existence
            .as_ref()
            .and_then(|e| e.lower())
            .is_some_and(|lower| *lower >= 1)
    }

    pub fn is_valid(&self) -> bool {
        let existence_ok = self
            .existence
            .as_ref()
            .map_or(true, |e| e.upper().map_or(true, |u| *u <= 1));
        let single_ok = match &self.kind {
            CAttributeKind::Single => true,
            CAttributeKind::Multiple(c) => c.interval.upper().map_or(true, |u| *u > 0),
        };
        existence_ok && single_ok && self.children.iter().all(CObject::is_valid)
    }

    /// The child constraint with `node_id`.
    pub fn child(&self, node_id: &str) -> Option<&CObject> {
        self.children.iter().find(|c| c.node_id() == Some(node_id))
    }

    /// Checks the attribute of `owner` against this constraint, recording every violation.
    pub fn valid_value(
        &self,
        ctx: &mut ValidationContext<'_>,
        owner: &RmItem,
        owner_path: &str,
    ) -> OpenEhrResult<bool> {
        let path = attribute_path(owner_path, &self.rm_attribute_name);
        let members: Vec<RmItem> = match ctx.tree().attribute(owner, &self.rm_attribute_name) {
            None => Vec::new(),
            Some(Navigated::Single(item)) => vec![item],
            Some(Navigated::Multiple(collection)) => collection.iter().map(RmItem::Node).collect(),
        };

        let present = u32::from(!members.is_empty());
        if let Some(existence) = &self.existence {
            if !existence.has(&present) {
                ctx.record(
                    ValidationErrorKind::Existence,
                    &path,
                    format!("existence {existence} not satisfied"),
                );
                return Ok(false);
            }
        }
        if members.is_empty() {
            return Ok(true);
        }

        let mut ok = true;
        if let CAttributeKind::Multiple(cardinality) = &self.kind {
            let count = u32::try_from(members.len()).unwrap_or(u32::MAX);
            if !cardinality.interval.has(&count) {
                ctx.record(
                    ValidationErrorKind::Cardinality,
                    &path,
                    format!("{count} members outside cardinality {}", cardinality.interval),
                );
                ok = false;
            }
        }

        let mut matched = vec![0u32; self.children.len()];
        for member in &members {
            match self.validate_member(ctx, member, &path)? {
                MemberOutcome::Matched(index, valid) => {
                    matched[index] += 1;
                    ok &= valid;
                }
                MemberOutcome::Unconstrained => {}
                MemberOutcome::Unmatched => ok = false,
            }
        }

        for (child, count) in self.children.iter().zip(matched) {
            if let Some(occurrences) = child.occurrences() {
                if !occurrences.has(&count) {
                    ctx.record(
                        ValidationErrorKind::Occurrences,
                        &child_path(&path, child),
                        format!("{count} occurrences outside {occurrences}"),
                    );
                    ok = false;
                }
            }
        }
        Ok(ok)
    }

    fn candidates(&self, ctx: &ValidationContext<'_>, member: &RmItem) -> Vec<usize> {
        let tree = ctx.tree();
        let actual = tree.rm_type_name(member).unwrap_or_default();
        let node_id = member
            .as_node()
            .and_then(|h| tree.get(h).ok())
            .map(|n| n.archetype_node_id().to_string());

        let by_id: Vec<usize> = match &node_id {
            Some(id) => self
                .children
                .iter()
                .enumerate()
                .filter(|(_, c)| c.node_id() == Some(id.as_str()))
                .map(|(i, _)| i)
                .collect(),
            None => Vec::new(),
        };
        if !by_id.is_empty() {
            return by_id;
        }
        self.children
            .iter()
            .enumerate()
            .filter(|(_, c)| match c {
                CObject::Slot(_) => node_id.is_some() && rm_type_conforms(actual, c.rm_type_name()),
                _ => (node_id.is_none() || c.node_id().is_none()) && accepts_type(c, actual),
            })
            .map(|(i, _)| i)
            .collect()
    }

    fn validate_member(
        &self,
        ctx: &mut ValidationContext<'_>,
        member: &RmItem,
        path: &str,
    ) -> OpenEhrResult<MemberOutcome> {
        let mut candidates = self.candidates(ctx, member);
        if candidates.is_empty() && self.children.len() == 1 {
            candidates.push(0);
        }

        match candidates.as_slice() {
            [] if self.children.is_empty() => Ok(MemberOutcome::Unconstrained),
            [] => {
                let described = describe(ctx, member);
                ctx.scoped(member.as_node(), |ctx| {
                    ctx.record(
                        ValidationErrorKind::NoMatchingConstraint,
                        path,
                        format!("no constraint matches {described}"),
                    )
                });
                Ok(MemberOutcome::Unmatched)
            }
            [only] => {
                let child = &self.children[*only];
                let valid = ctx.scoped(member.as_node(), |ctx| {
                    child.valid_value(ctx, member, &child_path(path, child))
                })?;
                Ok(MemberOutcome::Matched(*only, valid))
            }
            several => {
                let mut best: Option<(usize, ValidationContext<'_>)> = None;
                for &index in several {
                    let child = &self.children[index];
                    let mut fork = ctx.fork();
                    let valid = fork.scoped(member.as_node(), |fork| {
                        child.valid_value(fork, member, &child_path(path, child))
                    })?;
                    if valid {
                        return Ok(MemberOutcome::Matched(index, true));
                    }
                    let fewer = best
                        .as_ref()
                        .map_or(true, |(_, b)| fork.error_count() < b.error_count());
                    if fewer {
                        best = Some((index, fork));
                    }
                }
                match best {
                    Some((index, fork)) => {
                        ctx.absorb(fork);
                        Ok(MemberOutcome::Matched(index, false))
                    }
                    None => Ok(MemberOutcome::Unmatched),
                }
            }
        }
    }
}

enum MemberOutcome {
    Matched(usize, bool),
    Unconstrained,
    Unmatched,
}

fn accepts_type(child: &CObject, actual: &str) -> bool {
    match child {
        CObject::Domain(CDomainObject::CodePhrase(_)) | CObject::ConstraintRef(_) => {
            actual == "CODE_PHRASE" || rm_type_conforms(actual, "DV_TEXT")
        }
        _ => rm_type_conforms(actual, child.rm_type_name()),
    }
}

fn child_path(attribute_path: &str, child: &CObject) -> String {
    match child.node_id() {
        Some(node_id) => format!("{attribute_path}[{node_id}]"),
        None => attribute_path.to_string(),
    }
}

fn describe(ctx: &ValidationContext<'_>, item: &RmItem) -> String {
    let tree = ctx.tree();
    let type_name = tree.rm_type_name(item).unwrap_or("unknown");
    match item.as_node().and_then(|h| tree.get(h).ok()) {
        Some(node) => format!("{} '{}'", type_name, node.archetype_node_id()),
        None => type_name.to_string(),
    }
}

/// Constraint on a complex RM object: a node, or a structured value such as `DV_CODED_TEXT`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(try_from = "CComplexObjectWire", into = "CComplexObjectWire")]
pub struct CComplexObject {
    pub rm_type_name: String,
    pub node_id: Option<String>,
    pub occurrences: Option<Interval<u32>>,
    attributes: Vec<CAttribute>,
    pub invariants: Vec<Assertion>,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct CComplexObjectWire {
    rm_type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    occurrences: Option<Interval<u32>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    attributes: Vec<CAttribute>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    invariants: Vec<Assertion>,
}

impl TryFrom<CComplexObjectWire> for CComplexObject {
    type Error = OpenEhrError;

    fn try_from(wire: CComplexObjectWire) -> Result<Self, Self::Error> {
        let mut object = CComplexObject::new(wire.rm_type_name, wire.node_id);
        object.occurrences = wire.occurrences;
        object.invariants = wire.invariants;
        for attribute in wire.attributes {
            object.add_attribute(attribute)?;
        }
        Ok(object)
    }
}

impl From<CComplexObject> for CComplexObjectWire {
    fn from(object: CComplexObject) -> Self {
        Self {
            rm_type_name: object.rm_type_name,
            node_id: object.node_id,
            occurrences: object.occurrences,
            attributes: object.attributes,
            invariants: object.invariants,
        }
    }
}

impl CComplexObject {
    pub fn new(rm_type_name: impl Into<String>, node_id: Option<String>) -> Self {
        Self {
            rm_type_name: rm_type_name.into(),
            node_id,
            occurrences: None,
            attributes: Vec::new(),
            invariants: Vec::new(),
        }
    }

    pub fn with_occurrences(mut self, occurrences: Interval<u32>) -> Self {
        self.occurrences = Some(occurrences);
        self
    }

    /// Adds an attribute constraint, builder style.
    ///
    /// # Errors
    ///
    /// Returns [`OpenEhrError::DuplicateAttributeConstraint`] if the attribute is already
    /// constrained.
    pub fn with_attribute(mut self, attribute: CAttribute) -> OpenEhrResult<Self> {
        self.add_attribute(attribute)?;
        Ok(self)
    }

    /// # Errors
    ///
    /// Returns [`OpenEhrError::DuplicateAttributeConstraint`] if the attribute is already
    /// constrained.
    pub fn add_attribute(&mut self, attribute: CAttribute) -> OpenEhrResult<()> {
        if self.attribute(&attribute.rm_attribute_name).is_some() {
            return Err(OpenEhrError::DuplicateAttributeConstraint(
                attribute.rm_attribute_name,
            ));
        }
        self.attributes.push(attribute);
        Ok(())
    }

    pub fn attributes(&self) -> &[CAttribute] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&CAttribute> {
        self.attributes.iter().find(|a| a.rm_attribute_name == name)
    }

    pub fn is_valid(&self) -> bool {
        !self.rm_type_name.trim().is_empty() && self.attributes.iter().all(CAttribute::is_valid)
    }

    pub fn any_allowed(&self) -> bool {
        self.attributes.is_empty() && self.invariants.is_empty()
    }

    fn valid_value(
        &self,
        ctx: &mut ValidationContext<'_>,
        item: &RmItem,
        path: &str,
    ) -> OpenEhrResult<bool> {
        let tree = ctx.tree();
        let actual = match item {
            RmItem::Node(handle) => tree.get(*handle)?.rm_type().as_str(),
            RmItem::Value(value) => value.rm_type_name(),
        };
        if !rm_type_conforms(actual, &self.rm_type_name) {
            ctx.record(
                ValidationErrorKind::TypeMismatch,
                path,
                format!("expected {}, found {}", self.rm_type_name, actual),
            );
            return Ok(false);
        }
        if let (Some(expected), Some(handle)) = (&self.node_id, item.as_node()) {
            let found = tree.get(handle)?.archetype_node_id();
            if found != expected {
                ctx.record(
                    ValidationErrorKind::NodeIdMismatch,
                    path,
                    format!("expected node id '{expected}', found '{found}'"),
                );
                return Ok(false);
            }
        }

        self.validate_body(ctx, item, path)
    }

    /// Checks attributes and invariants, without the type and node id checks.
    pub(crate) fn validate_body(
        &self,
        ctx: &mut ValidationContext<'_>,
        item: &RmItem,
        path: &str,
    ) -> OpenEhrResult<bool> {
        ctx.scoped(item.as_node(), |ctx| -> OpenEhrResult<bool> {
            let mut ok = true;
            for attribute in &self.attributes {
                ok &= attribute.valid_value(ctx, item, path)?;
            }
            for invariant in &self.invariants {
                if !invariant.evaluate(ctx.tree(), item.clone())? {
                    ctx.record(
                        ValidationErrorKind::AssertionFailed,
                        path,
                        format!(
                            "invariant '{}' does not hold",
                            invariant
                                .tag()
                                .or(invariant.string_expression())
                                .unwrap_or("unnamed")
                        ),
                    );
                    ok = false;
                }
            }
            Ok(ok)
        })
    }
}

/// A point where another archetype may be plugged in.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ArchetypeSlot {
    pub rm_type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrences: Option<Interval<u32>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub includes: Vec<Assertion>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<Assertion>,
}

impl ArchetypeSlot {
    fn valid_value(
        &self,
        ctx: &mut ValidationContext<'_>,
        item: &RmItem,
        path: &str,
    ) -> OpenEhrResult<bool> {
        let tree = ctx.tree();
        let Some(handle) = item.as_node() else {
            ctx.record(
                ValidationErrorKind::TypeMismatch,
                path,
                format!(
                    "slot expects a {} node, found {}",
                    self.rm_type_name,
                    tree.rm_type_name(item).unwrap_or("unknown")
                ),
            );
            return Ok(false);
        };
        let node = tree.get(handle)?;
        if !rm_type_conforms(node.rm_type().as_str(), &self.rm_type_name) {
            ctx.record(
                ValidationErrorKind::TypeMismatch,
                path,
                format!("expected {}, found {}", self.rm_type_name, node.rm_type()),
            );
            return Ok(false);
        }

        let filler = node.archetype_node_id().to_string();
        for exclude in &self.excludes {
            if exclude.evaluate(tree, handle)? {
                ctx.record(
                    ValidationErrorKind::SlotNotAllowed,
                    path,
                    format!("'{filler}' is excluded from the slot"),
                );
                return Ok(false);
            }
        }
        if self.includes.is_empty() {
            return Ok(true);
        }
        for include in &self.includes {
            if include.evaluate(tree, handle)? {
                return Ok(true);
            }
        }
        ctx.record(
            ValidationErrorKind::SlotNotAllowed,
            path,
            format!("'{filler}' is not included by the slot"),
        );
        Ok(false)
    }
}

/// A reuse of a constraint defined elsewhere in the same archetype.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ArchetypeInternalRef {
    pub rm_type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrences: Option<Interval<u32>>,
    pub target_path: String,
}

/// A coded value bound to an external terminology query.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConstraintRef {
    pub rm_type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub occurrences: Option<Interval<u32>>,
    /// The `acNNNN` code of the query.
    pub reference: String,
}

/// Any node of the constraint tree.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(from = "CObjectWire", into = "CObjectWire")]
pub enum CObject {
    Complex(CComplexObject),
    Primitive(CPrimitiveObject),
    Domain(CDomainObject),
    Slot(ArchetypeSlot),
    InternalRef(ArchetypeInternalRef),
    ConstraintRef(ConstraintRef),
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(tag = "_type")]
enum CObjectWire {
    #[serde(rename = "C_COMPLEX_OBJECT")]
    Complex(CComplexObject),
    #[serde(rename = "C_PRIMITIVE_OBJECT")]
    Primitive(CPrimitiveObject),
    #[serde(rename = "C_CODE_PHRASE")]
    CodePhrase(CCodePhrase),
    #[serde(rename = "C_DV_ORDINAL")]
    Ordinal(CDvOrdinal),
    #[serde(rename = "C_DV_QUANTITY")]
    Quantity(CDvQuantity),
    #[serde(rename = "C_DV_STATE")]
    State(CDvState),
    #[serde(rename = "ARCHETYPE_SLOT")]
    Slot(ArchetypeSlot),
    #[serde(rename = "ARCHETYPE_INTERNAL_REF")]
    InternalRef(ArchetypeInternalRef),
    #[serde(rename = "CONSTRAINT_REF")]
    ConstraintRef(ConstraintRef),
}

impl From<CObjectWire> for CObject {
    fn from(wire: CObjectWire) -> Self {
        match wire {
            CObjectWire::Complex(c) => CObject::Complex(c),
            CObjectWire::Primitive(c) => CObject::Primitive(c),
            CObjectWire::CodePhrase(c) => CObject::Domain(CDomainObject::CodePhrase(c)),
            CObjectWire::Ordinal(c) => CObject::Domain(CDomainObject::Ordinal(c)),
            CObjectWire::Quantity(c) => CObject::Domain(CDomainObject::Quantity(c)),
            CObjectWire::State(c) => CObject::Domain(CDomainObject::State(c)),
            CObjectWire::Slot(c) => CObject::Slot(c),
            CObjectWire::InternalRef(c) => CObject::InternalRef(c),
            CObjectWire::ConstraintRef(c) => CObject::ConstraintRef(c),
        }
    }
}

impl From<CObject> for CObjectWire {
    fn from(object: CObject) -> Self {
        match object {
            CObject::Complex(c) => CObjectWire::Complex(c),
            CObject::Primitive(c) => CObjectWire::Primitive(c),
            CObject::Domain(CDomainObject::CodePhrase(c)) => CObjectWire::CodePhrase(c),
            CObject::Domain(CDomainObject::Ordinal(c)) => CObjectWire::Ordinal(c),
            CObject::Domain(CDomainObject::Quantity(c)) => CObjectWire::Quantity(c),
            CObject::Domain(CDomainObject::State(c)) => CObjectWire::State(c),
            CObject::Slot(c) => CObjectWire::Slot(c),
            CObject::InternalRef(c) => CObjectWire::InternalRef(c),
            CObject::ConstraintRef(c) => CObjectWire::ConstraintRef(c),
        }
    }
}

impl CObject {
    pub fn rm_type_name(&self) -> &str {
        match self {
            CObject::Complex(c) => &c.rm_type_name,
            CObject::Primitive(c) => c.item.rm_type_name(),
            CObject::Domain(c) => c.rm_type_name(),
            CObject::Slot(c) => &c.rm_type_name,
            CObject::InternalRef(c) => &c.rm_type_name,
            CObject::ConstraintRef(c) => &c.rm_type_name,
        }
    }

    pub fn node_id(&self) -> Option<&str> {
        match self {
            CObject::Complex(c) => c.node_id.as_deref(),
            CObject::Primitive(c) => c.node_id.as_deref(),
            CObject::Domain(c) => c.node_id(),
            CObject::Slot(c) => c.node_id.as_deref(),
            CObject::InternalRef(c) => c.node_id.as_deref(),
            CObject::ConstraintRef(c) => c.node_id.as_deref(),
        }
    }

    pub fn occurrences(&self) -> Option<&Interval<u32>> {
        match self {
            CObject::Complex(c) => c.occurrences.as_ref(),
            CObject::Primitive(c) => c.occurrences.as_ref(),
            CObject::Domain(c) => c.occurrences(),
            CObject::Slot(c) => c.occurrences.as_ref(),
            CObject::InternalRef(c) => c.occurrences.as_ref(),
            CObject::ConstraintRef(c) => c.occurrences.as_ref(),
        }
    }

    /// Structural self-check of this constraint and everything below it.
    pub fn is_valid(&self) -> bool {
        match self {
            CObject::Complex(c) => c.is_valid(),
            CObject::Primitive(c) => c.is_valid(),
            CObject::Domain(c) => c.is_valid(),
            CObject::Slot(c) => !c.rm_type_name.trim().is_empty(),
            CObject::InternalRef(c) => {
                !c.rm_type_name.trim().is_empty() && c.target_path.starts_with('/')
            }
            CObject::ConstraintRef(c) => !c.reference.trim().is_empty(),
        }
    }

    /// `true` if the constraint admits every instance of its RM type.
    pub fn any_allowed(&self) -> bool {
        match self {
            CObject::Complex(c) => c.any_allowed(),
            CObject::Primitive(c) => c.any_allowed(),
            CObject::Domain(c) => c.any_allowed(),
            CObject::Slot(c) => c.includes.is_empty() && c.excludes.is_empty(),
            CObject::InternalRef(_) => false,
            CObject::ConstraintRef(_) => true,
        }
    }

    /// Checks `item` against the constraint.
    ///
    /// Mismatches are recorded in `ctx` and yield `Ok(false)`.
    ///
    /// # Errors
    ///
    /// - [`OpenEhrError::InvalidConstraint`] if the constraint fails its own
    ///   [`is_valid`](Self::is_valid) check, or an internal reference cannot be followed.
    /// - [`OpenEhrError::UnknownNode`] if `item` is a dangling handle.
    /// - Evaluation errors raised by invariants or slot assertions.
    pub fn valid_value(
        &self,
        ctx: &mut ValidationContext<'_>,
        item: &RmItem,
        path: &str,
    ) -> OpenEhrResult<bool> {
        if !self.is_valid() {
            return Err(OpenEhrError::InvalidConstraint(format!(
                "{} constraint at {} is malformed",
                self.rm_type_name(),
                path
            )));
        }

        match self {
            CObject::Complex(c) => c.valid_value(ctx, item, path),
            CObject::Primitive(c) => Ok(match value_of(ctx, item, c.item.rm_type_name(), path) {
                Some(value) => c.valid_value(ctx, value, path),
                None => false,
            }),
            CObject::Domain(d) => Ok(match value_of(ctx, item, d.rm_type_name(), path) {
                Some(value) => d.valid_value(ctx, value, path),
                None => false,
            }),
            CObject::Slot(slot) => slot.valid_value(ctx, item, path),
            CObject::InternalRef(reference) => {
                let archetype = ctx.archetype().ok_or_else(|| {
                    OpenEhrError::InvalidConstraint(format!(
                        "internal reference to {} needs an archetype",
                        reference.target_path
                    ))
                })?;
                let target = archetype
                    .constraint_at_path(&reference.target_path)
                    .map_err(|err| {
                        OpenEhrError::InvalidConstraint(format!(
                            "internal reference to {}: {}",
                            reference.target_path, err
                        ))
                    })?;
                tracing::debug!("following internal reference to {}", reference.target_path);
                ctx.following(&reference.target_path, item, |ctx| {
                    target.valid_value(ctx, item, path)
                })
            }
            CObject::ConstraintRef(c) => {
                let coded = matches!(
                    item.as_value(),
                    Some(RmValue::CodePhrase(_)) | Some(RmValue::Data(DataValue::CodedText(_)))
                );
                if !coded {
                    let found = ctx.tree().rm_type_name(item).unwrap_or("unknown");
                    ctx.record(
                        ValidationErrorKind::TypeMismatch,
                        path,
                        format!("{} expects a coded value, found {}", c.reference, found),
                    );
                }
                Ok(coded)
            }
        }
    }
}

fn value_of<'i>(
    ctx: &mut ValidationContext<'_>,
    item: &'i RmItem,
    expected: &str,
    path: &str,
) -> Option<&'i RmValue> {
    match item {
        RmItem::Value(value) => Some(value),
        RmItem::Node(_) => {
            let found = ctx.tree().rm_type_name(item).unwrap_or("unknown");
            ctx.record(
                ValidationErrorKind::TypeMismatch,
                path,
                format!("expected {expected}, found {found}"),
            );
            None
        }
    }
}
