//! Archetypes as YAML.
//!
//! The document is the serde form of [`Archetype`]: constraint objects are tagged with `_type`
//! (`C_COMPLEX_OBJECT`, `C_PRIMITIVE_OBJECT`, `C_DV_QUANTITY`, ...) and intervals are written
//! as `{lower, upper, lower_included, upper_included}`.

use crate::am::Archetype;
use crate::{OpenEhrError, OpenEhrResult};
use std::fs;
use std::path::Path;

/// Read an archetype from YAML.
///
/// A well-formed document that describes an inconsistent archetype is still returned; callers
/// see [`Archetype::is_valid`] fail and validation refuse it.
///
/// # Errors
///
/// Returns [`OpenEhrError::Translation`] naming the first field that does not match the
/// archetype schema.
pub fn read_yaml(yaml: &str) -> OpenEhrResult<Archetype> {
    let deserializer = serde_yaml::Deserializer::from_str(yaml);
    let archetype: Archetype = serde_path_to_error::deserialize(deserializer).map_err(|err| {
        let path = err.path().to_string();
        let path = if path == "." { "<root>".to_string() } else { path };
        OpenEhrError::Translation(format!(
            "ARCHETYPE schema mismatch at {path}: {}",
            err.into_inner()
        ))
    })?;

    if archetype.is_valid() {
        tracing::info!("loaded archetype {}", archetype.archetype_id);
    } else {
        tracing::warn!(
            "archetype {} is not consistent with its definition",
            archetype.archetype_id
        );
    }
    Ok(archetype)
}

/// Write an archetype to YAML.
///
/// # Errors
///
/// Returns [`OpenEhrError::InvalidYaml`] if serialisation fails.
pub fn write_yaml(archetype: &Archetype) -> OpenEhrResult<String> {
    Ok(serde_yaml::to_string(archetype)?)
}

/// Read an archetype from a YAML file.
///
/// # Errors
///
/// Returns [`OpenEhrError::Io`] if the file cannot be read, else as [`read_yaml`].
pub fn read_file(path: impl AsRef<Path>) -> OpenEhrResult<Archetype> {
    let text = fs::read_to_string(path.as_ref())?;
    read_yaml(&text)
}
