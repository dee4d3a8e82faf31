//! Foundation types shared by the openEHR crates.
//!
//! These are the small, validated building blocks that the reference model and the archetype
//! constraint model are both expressed in:
//! - [`NonEmptyText`]: trimmed text that is guaranteed to contain at least one character, used
//!   for node identifiers and other tokens that must always be set.
//! - [`Interval`]: an optionally bounded interval over an ordered type, used for occurrences,
//!   existence, cardinality and value ranges.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error)]
pub enum TextError {
    /// The input text was empty or contained only whitespace
    #[error("Text cannot be empty")]
    Empty,
}

/// Errors that can occur when creating an [`Interval`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum IntervalError {
    /// The lower bound is greater than the upper bound.
    #[error("interval lower bound must not exceed upper bound")]
    LowerExceedsUpper,

    /// An unbounded side was marked as included.
    #[error("an unbounded side of an interval cannot be included")]
    UnboundedIncluded,
}

/// A string type that guarantees non-empty content.
///
/// This type wraps a `String` and ensures it contains at least one non-whitespace character.
/// The input is automatically trimmed of leading and trailing whitespace during construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Creates a new `NonEmptyText` from the given input.
    ///
    /// The input is trimmed of leading and trailing whitespace. If the trimmed
    /// result is empty, an error is returned.
    ///
    /// # Errors
    ///
    /// Returns `Err(TextError::Empty)` if the input is empty or contains only whitespace.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    /// Returns the inner string as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the wrapper and returns the inner string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for NonEmptyText {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for NonEmptyText {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl std::str::FromStr for NonEmptyText {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

/// An interval over an ordered type, optionally unbounded on either side.
///
/// Mirrors the openEHR foundation `Interval<T>`: a missing bound means "unbounded" on that
/// side, and each present bound may be inclusive or exclusive. Archetypes use `Interval<u32>`
/// for occurrences, existence and cardinality, and `Interval<i64>`/`Interval<f64>` for value
/// ranges on primitive constraints.
#[derive(Clone, Debug, PartialEq)]
pub struct Interval<T> {
    lower: Option<T>,
    upper: Option<T>,
    lower_included: bool,
    upper_included: bool,
}

impl<T: PartialOrd> Interval<T> {
    /// Creates an interval, validating that the bounds are ordered.
    ///
    /// # Errors
    ///
    /// Returns [`IntervalError::LowerExceedsUpper`] if both bounds are present and out of order,
    /// and [`IntervalError::UnboundedIncluded`] if an absent bound is flagged as included.
    pub fn new(
        lower: Option<T>,
        upper: Option<T>,
        lower_included: bool,
        upper_included: bool,
    ) -> Result<Self, IntervalError> {
        if let (Some(l), Some(u)) = (&lower, &upper) {
            if l > u {
                return Err(IntervalError::LowerExceedsUpper);
            }
        }
        if (lower.is_none() && lower_included) || (upper.is_none() && upper_included) {
            return Err(IntervalError::UnboundedIncluded);
        }
        Ok(Self {
            lower,
            upper,
            lower_included,
            upper_included,
        })
    }

    /// Closed interval `[lower, upper]`.
    ///
    /// # Errors
    ///
    /// Returns [`IntervalError::LowerExceedsUpper`] if `lower > upper`.
    pub fn closed(lower: T, upper: T) -> Result<Self, IntervalError> {
        Self::new(Some(lower), Some(upper), true, true)
    }

    /// Interval `[lower, *)` with no upper bound.
    pub fn at_least(lower: T) -> Self {
        Self {
            lower: Some(lower),
            upper: None,
            lower_included: true,
            upper_included: false,
        }
    }

    /// Interval `(*, upper]` with no lower bound.
    pub fn at_most(upper: T) -> Self {
        Self {
            lower: None,
            upper: Some(upper),
            lower_included: false,
            upper_included: true,
        }
    }

    /// Interval with no bounds at all.
    pub fn unbounded() -> Self {
        Self {
            lower: None,
            upper: None,
            lower_included: false,
            upper_included: false,
        }
    }

    pub fn lower(&self) -> Option<&T> {
        self.lower.as_ref()
    }

    pub fn upper(&self) -> Option<&T> {
        self.upper.as_ref()
    }

    pub fn lower_included(&self) -> bool {
        self.lower_included
    }

    pub fn upper_included(&self) -> bool {
        self.upper_included
    }

    pub fn is_upper_unbounded(&self) -> bool {
        self.upper.is_none()
    }

    /// Returns `true` if `value` lies inside the interval.
    pub fn has(&self, value: &T) -> bool {
        let above_lower = match &self.lower {
            None => true,
            Some(l) if self.lower_included => value >= l,
            Some(l) => value > l,
        };
        let below_upper = match &self.upper {
            None => true,
            Some(u) if self.upper_included => value <= u,
            Some(u) => value < u,
        };
        above_lower && below_upper
    }
}

impl<T: PartialOrd + Clone> Interval<T> {
    /// Degenerate interval `[value, value]`.
    pub fn point(value: T) -> Self {
        Self {
            lower: Some(value.clone()),
            upper: Some(value),
            lower_included: true,
            upper_included: true,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Interval<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.lower {
            Some(l) if !self.lower_included => write!(f, ">{l}")?,
            Some(l) => write!(f, "{l}")?,
            None => write!(f, "*")?,
        }
        write!(f, "..")?;
        match &self.upper {
            Some(u) if !self.upper_included => write!(f, "<{u}"),
            Some(u) => write!(f, "{u}"),
            None => write!(f, "*"),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
struct IntervalWire<T> {
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    lower: Option<T>,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    upper: Option<T>,
    #[serde(default = "default_true")]
    lower_included: bool,
    #[serde(default = "default_true")]
    upper_included: bool,
}

impl<T: Serialize + Clone> Serialize for Interval<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        IntervalWire {
            lower: self.lower.clone(),
            upper: self.upper.clone(),
            lower_included: self.lower_included,
            upper_included: self.upper_included,
        }
        .serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Interval<T>
where
    T: Deserialize<'de> + PartialOrd,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let wire = IntervalWire::<T>::deserialize(deserializer)?;
        // Inclusion flags default to true on the wire; an absent bound is never included.
        let lower_included = wire.lower.is_some() && wire.lower_included;
        let upper_included = wire.upper.is_some() && wire.upper_included;
        Interval::new(wire.lower, wire.upper, lower_included, upper_included)
            .map_err(serde::de::Error::custom)
    }
}
