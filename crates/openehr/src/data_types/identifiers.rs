//! Identifier types: archetype identifiers and object identifiers.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::OpenEhrError;

/// Parsed and validated representation of an openEHR archetype identifier.
///
/// # Canonical Form
///
/// `<authority>-<rm_package>-<rm_class>.<concept>[-<specialisation>...].v<version>`
///
/// Example: `openEHR-EHR-OBSERVATION.blood_pressure.v1`
///
/// Archetype IDs identify the root node of an archetyped subtree: the `archetype_node_id` of
/// that root carries the full identifier, while nodes below it use local `atNNNN` codes.
///
/// # Examples
///
/// ```rust
/// # use openehr::data_types::ArchetypeId;
/// let id = ArchetypeId::parse("openEHR-EHR-COMPOSITION.encounter.v1")?;
/// assert_eq!(id.rm_class, "COMPOSITION");
/// assert_eq!(id.to_string(), "openEHR-EHR-COMPOSITION.encounter.v1");
/// # Ok::<(), openehr::OpenEhrError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchetypeId {
    /// Archetype authority (e.g. "openEHR")
    pub authority: String,

    /// Reference Model package (e.g. "EHR")
    pub rm_package: String,

    /// Reference Model class (e.g. "COMPOSITION", "OBSERVATION")
    pub rm_class: String,

    /// Archetype concept, including any specialisation suffixes (e.g. "blood_pressure-home")
    pub concept: String,

    /// Archetype version number (e.g. 1)
    pub version: u32,
}

impl ArchetypeId {
    /// Validates archetype ID components.
    ///
    /// Authority, package and class are identifier tokens (ASCII alphanumerics and `_`); the
    /// concept additionally allows `-` to separate specialisations.
    fn validate_components(
        authority: &str,
        rm_package: &str,
        rm_class: &str,
        concept: &str,
    ) -> Result<(), OpenEhrError> {
        fn is_token(s: &str, extra: &[u8]) -> bool {
            !s.is_empty()
                && s
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || b == b'_' || extra.contains(&b))
        }

        if !is_token(authority, &[]) {
            return Err(OpenEhrError::InvalidArchetypeId(format!(
                "authority must be an identifier, got '{}'",
                authority
            )));
        }

        if !is_token(rm_package, &[]) {
            return Err(OpenEhrError::InvalidArchetypeId(format!(
                "rm_package must be an identifier, got '{}'",
                rm_package
            )));
        }

        if !is_token(rm_class, &[]) {
            return Err(OpenEhrError::InvalidArchetypeId(format!(
                "rm_class must be an identifier, got '{}'",
                rm_class
            )));
        }

        if !is_token(concept, b"-") || concept.starts_with('-') || concept.ends_with('-') {
            return Err(OpenEhrError::InvalidArchetypeId(format!(
                "concept must be an identifier with optional '-' specialisations, got '{}'",
                concept
            )));
        }

        Ok(())
    }

    /// Creates a new `ArchetypeId` from individual components with validation.
    ///
    /// # Errors
    ///
    /// Returns [`OpenEhrError::InvalidArchetypeId`] if any component is malformed.
    pub fn new(
        authority: &str,
        rm_package: &str,
        rm_class: &str,
        concept: &str,
        version: u32,
    ) -> Result<Self, OpenEhrError> {
        Self::validate_components(authority, rm_package, rm_class, concept)?;

        Ok(Self {
            authority: authority.to_string(),
            rm_package: rm_package.to_string(),
            rm_class: rm_class.to_string(),
            concept: concept.to_string(),
            version,
        })
    }

    /// Parses and validates an archetype identifier string.
    ///
    /// # Errors
    ///
    /// Returns [`OpenEhrError::InvalidArchetypeId`] if the string is not in canonical form.
    pub fn parse(raw: &str) -> Result<Self, OpenEhrError> {
        let (authority, rest) = raw
            .split_once('-')
            .ok_or_else(|| OpenEhrError::InvalidArchetypeId(raw.to_string()))?;

        let (rm_package, remainder) = rest
            .split_once('-')
            .ok_or_else(|| OpenEhrError::InvalidArchetypeId(raw.to_string()))?;

        let (rm_class, remainder) = remainder
            .split_once('.')
            .ok_or_else(|| OpenEhrError::InvalidArchetypeId(raw.to_string()))?;

        let (concept, version_part) = remainder
            .rsplit_once(".v")
            .ok_or_else(|| OpenEhrError::InvalidArchetypeId(raw.to_string()))?;

        let version = version_part
            .parse::<u32>()
            .map_err(|_| OpenEhrError::InvalidArchetypeId(raw.to_string()))?;

        Self::new(authority, rm_package, rm_class, concept, version)
    }

    /// Returns `true` if `raw` parses as an archetype identifier.
    pub fn is_archetype_id(raw: &str) -> bool {
        Self::parse(raw).is_ok()
    }
}

impl fmt::Display for ArchetypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}.{}.v{}",
            self.authority, self.rm_package, self.rm_class, self.concept, self.version
        )
    }
}

impl Serialize for ArchetypeId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ArchetypeId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// RM `HIER_OBJECT_ID`: the globally unique identifier carried by version-root nodes.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(deny_unknown_fields)]
pub struct HierObjectId {
    pub value: String,
}

impl HierObjectId {
    /// Parses an identifier, rejecting blank values.
    ///
    /// # Errors
    ///
    /// Returns [`OpenEhrError::InvalidInput`] if `value` is empty or whitespace.
    pub fn parse(value: &str) -> Result<Self, OpenEhrError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(OpenEhrError::InvalidInput("uid cannot be empty".into()));
        }
        Ok(Self {
            value: value.to_string(),
        })
    }

    /// Generates a fresh UUID-based identifier.
    pub fn generate() -> Self {
        Self {
            value: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl fmt::Display for HierObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_specialised_archetype_id() {
        let id = ArchetypeId::parse("openEHR-EHR-OBSERVATION.blood_pressure-home.v2")
            .expect("valid archetype id");
        assert_eq!(id.authority, "openEHR");
        assert_eq!(id.rm_class, "OBSERVATION");
        assert_eq!(id.concept, "blood_pressure-home");
        assert_eq!(id.version, 2);
        assert_eq!(
            id.to_string(),
            "openEHR-EHR-OBSERVATION.blood_pressure-home.v2"
        );
    }

    #[test]
    fn rejects_local_node_codes() {
        assert!(!ArchetypeId::is_archetype_id("at0001"));
        assert!(ArchetypeId::parse("openEHR-EHR-OBSERVATION.bp.vX").is_err());
        assert!(ArchetypeId::parse("openEHR-EHR-OBSERVATION.bad concept.v1").is_err());
    }

    #[test]
    fn generated_uids_are_distinct() {
        let a = HierObjectId::generate();
        let b = HierObjectId::generate();
        assert_ne!(a, b);
        assert!(HierObjectId::parse("   ").is_err());
    }
}
