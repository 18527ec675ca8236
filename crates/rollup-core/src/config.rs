//! Engine configuration.
//!
//! The original system read the completion mode from ambient settings; here
//! it is an explicit value handed to the engine. Configuration is a plain
//! TOML document:
//!
//! ```toml
//! [progress]
//! mode = "status-based"
//!
//! [limits]
//! max_ancestor_depth = 1000
//! ```
//!
//! Every section and field is optional; missing pieces fall back to
//! defaults (field-based mode, depth bound 1000).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ProgressMode
// ---------------------------------------------------------------------------

/// How a node's effective completion is determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressMode {
    /// Completion comes from the status (`status_default_done_ratio`, with
    /// closed/open fallbacks). The stored `done_ratio` field is not read.
    StatusBased,
    /// Completion comes from the item's own `done_ratio` field; closed
    /// items count as 100% regardless of the stored value.
    #[default]
    FieldBased,
}

impl ProgressMode {
    /// Return the mode name as its config string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StatusBased => "status-based",
            Self::FieldBased => "field-based",
        }
    }
}

// ---------------------------------------------------------------------------
// Config sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressConfig {
    #[serde(default)]
    pub mode: ProgressMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Hard bound on ancestor-chain length. Walks past this bound are
    /// reported as cycles.
    #[serde(default = "default_max_ancestor_depth")]
    pub max_ancestor_depth: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_ancestor_depth: default_max_ancestor_depth(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollupConfig {
    #[serde(default)]
    pub progress: ProgressConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl RollupConfig {
    /// Parse a configuration document from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error when the document is not valid TOML or a field has
    /// the wrong type.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse rollup config")
    }

    /// Load configuration from a file, falling back to defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error when the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

const fn default_max_ancestor_depth() -> usize {
    1000
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
