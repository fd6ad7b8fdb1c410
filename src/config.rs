//! Policy configuration
//!
//! Field-level knobs of the packer, comparer and recorder, loadable from a
//! TOML document. Every field has a default, so a partial (or empty) file is
//! valid.
//!
//! ```toml
//! [packer]
//! big-endian = false
//! use-metadata = true
//!
//! [comparer]
//! show-max = 10
//! verbosity = "high"
//!
//! [recording]
//! file-name = "run/tr_db.log"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::policy::{Radix, RecursionPolicy};
use crate::report::{Severity, Verbosity};

/// Packer knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PackerConfig {
    /// Reverse field bit order on the wire
    pub big_endian: bool,
    /// Emit object null markers and string terminators
    pub use_metadata: bool,
    pub physical: bool,
    #[serde(rename = "abstract")]
    pub abstract_: bool,
    pub policy: RecursionPolicy,
}

impl Default for PackerConfig {
    fn default() -> Self {
        Self {
            big_endian: true,
            use_metadata: false,
            physical: true,
            abstract_: false,
            policy: RecursionPolicy::Deep,
        }
    }
}

/// Comparer knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ComparerConfig {
    pub policy: RecursionPolicy,
    /// Miscompare when object type names differ
    pub check_type: bool,
    /// Maximum number of miscompares reported individually
    pub show_max: usize,
    pub severity: Severity,
    pub verbosity: Verbosity,
    pub physical: bool,
    #[serde(rename = "abstract")]
    pub abstract_: bool,
}

impl Default for ComparerConfig {
    fn default() -> Self {
        Self {
            policy: RecursionPolicy::Deep,
            check_type: true,
            show_max: 1,
            severity: Severity::Info,
            verbosity: Verbosity::Low,
            physical: true,
            abstract_: false,
        }
    }
}

/// Recorder knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RecorderConfig {
    pub policy: RecursionPolicy,
    /// Record sub-object instance ids
    pub identifier: bool,
    /// Radix substituted for `Radix::NoRadix`
    pub default_radix: Radix,
    pub physical: bool,
    #[serde(rename = "abstract")]
    pub abstract_: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            policy: RecursionPolicy::Deep,
            identifier: true,
            default_radix: Radix::Hex,
            physical: true,
            abstract_: true,
        }
    }
}

/// Diagnostics filtering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ReportConfig {
    pub max_verbosity: Verbosity,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            max_verbosity: Verbosity::Medium,
        }
    }
}

/// Text recording database settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RecordingConfig {
    pub file_name: PathBuf,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            file_name: PathBuf::from("tr_db.log"),
        }
    }
}

/// Top-level configuration document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PolicyConfig {
    pub packer: PackerConfig,
    pub comparer: ComparerConfig,
    pub recorder: RecorderConfig,
    pub report: ReportConfig,
    pub recording: RecordingConfig,
}

impl PolicyConfig {
    /// Parse a TOML document
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|error| ConfigError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        Self::from_toml_str(&text)
    }
}
