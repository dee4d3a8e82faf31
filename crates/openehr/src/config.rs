//! Core runtime configuration.
//!
//! Configuration is resolved once (typically at process startup) and then handed to an
//! [`RmTree`](crate::rm::RmTree), which owns it for its lifetime. Path resolution, assertion
//! evaluation and default-value synthesis read their settings from the tree they operate on,
//! so nothing in this crate reads environment variables while working.

use crate::{OpenEhrError, OpenEhrResult};
use std::fmt;
use std::str::FromStr;

/// Reference Model release a tree or archetype is aligned to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RmVersion {
    Rm1_0_2,
    Rm1_1_0,
}

/// The most recent RM release supported by this crate.
pub const LATEST_RM: RmVersion = RmVersion::Rm1_1_0;

impl RmVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            RmVersion::Rm1_0_2 => "1.0.2",
            RmVersion::Rm1_1_0 => "1.1.0",
        }
    }
}

impl fmt::Display for RmVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RmVersion {
    type Err = OpenEhrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1.0.2" => Ok(RmVersion::Rm1_0_2),
            "1.1.0" => Ok(RmVersion::Rm1_1_0),
            other => Err(OpenEhrError::InvalidInput(format!(
                "unsupported RM version '{other}' (expected 1.0.2 or 1.1.0)"
            ))),
        }
    }
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoreConfig {
    rm_version: RmVersion,
    path_cache_enabled: bool,
    temporal_string_fallback: bool,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            rm_version: LATEST_RM,
            path_cache_enabled: true,
            temporal_string_fallback: true,
        }
    }
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    pub fn new(
        rm_version: RmVersion,
        path_cache_enabled: bool,
        temporal_string_fallback: bool,
    ) -> Self {
        Self {
            rm_version,
            path_cache_enabled,
            temporal_string_fallback,
        }
    }

    /// Build a configuration from optional raw string values (for example read from the
    /// environment by a binary at startup).
    ///
    /// Missing, empty or whitespace-only values select the default for that setting.
    ///
    /// # Errors
    ///
    /// Returns [`OpenEhrError::InvalidInput`] if a value is present but malformed.
    pub fn from_env_values(
        rm_version: Option<String>,
        path_cache: Option<String>,
        temporal_fallback: Option<String>,
    ) -> OpenEhrResult<Self> {
        let defaults = Self::default();

        let rm_version = non_blank(rm_version)
            .map(|v| v.parse::<RmVersion>())
            .transpose()?
            .unwrap_or(defaults.rm_version);
        let path_cache_enabled = non_blank(path_cache)
            .map(|v| parse_flag("path cache", &v))
            .transpose()?
            .unwrap_or(defaults.path_cache_enabled);
        let temporal_string_fallback = non_blank(temporal_fallback)
            .map(|v| parse_flag("temporal string fallback", &v))
            .transpose()?
            .unwrap_or(defaults.temporal_string_fallback);

        Ok(Self {
            rm_version,
            path_cache_enabled,
            temporal_string_fallback,
        })
    }

    pub fn rm_version(&self) -> RmVersion {
        self.rm_version
    }

    pub fn path_cache_enabled(&self) -> bool {
        self.path_cache_enabled
    }

    pub fn temporal_string_fallback(&self) -> bool {
        self.temporal_string_fallback
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_flag(setting: &str, value: &str) -> OpenEhrResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(OpenEhrError::InvalidInput(format!(
            "{setting} must be a boolean flag, got '{other}'"
        ))),
    }
}
