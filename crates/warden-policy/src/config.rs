//! TOML policy configuration.
//!
//! A `PolicyConfig` describes a fresh policy: the three presets, the sites
//! initially trusted or untrusted, and the global flags. Every field has a
//! default, so an empty document yields the factory policy.
//!
//! Example:
//! ```toml
//! enforced = true
//! auto_allow_top = false
//! only_secure = false
//!
//! [presets.default]
//! capabilities = ["frame", "fetch", "noscript", "other"]
//!
//! [presets.untrusted]
//! capabilities = []
//!
//! [sites]
//! trusted = ["§:mozilla.org", "https://example.com"]
//! untrusted = ["ads.example.net"]
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use warden_contracts::{
    Capability, DriedPermissions, DriedPolicy, DriedSiteLists, WardenError, WardenResult,
};

/// Capabilities of one preset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetConfig {
    pub capabilities: Vec<String>,
}

impl PresetConfig {
    fn with_capabilities(capabilities: &[&str]) -> Self {
        Self {
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn to_dried(&self) -> DriedPermissions {
        DriedPermissions::from_capabilities(self.capabilities.iter().map(|c| Capability::new(c.as_str())))
    }
}

/// The three presets. Missing tables take the factory values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresetsConfig {
    pub default: PresetConfig,
    pub trusted: PresetConfig,
    pub untrusted: PresetConfig,
}

impl Default for PresetsConfig {
    fn default() -> Self {
        Self {
            default: PresetConfig::with_capabilities(&DriedPolicy::DEFAULT_CAPABILITIES),
            trusted: PresetConfig::with_capabilities(&Capability::ALL),
            untrusted: PresetConfig::default(),
        }
    }
}

/// Sites assigned to a preset at construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SitesConfig {
    pub trusted: Vec<String>,
    pub untrusted: Vec<String>,
}

/// The top-level structure deserialized from a TOML policy file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub enforced: bool,
    pub auto_allow_top: bool,

    /// Skip site matching for URLs reached over insecure schemes.
    pub only_secure: bool,

    pub presets: PresetsConfig,
    pub sites: SitesConfig,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enforced: true,
            auto_allow_top: false,
            only_secure: false,
            presets: PresetsConfig::default(),
            sites: SitesConfig::default(),
        }
    }
}

impl PolicyConfig {
    /// Parse `s` as TOML.
    ///
    /// Returns `WardenError::ConfigError` if the TOML is malformed or does
    /// not match the `PolicyConfig` schema.
    pub fn from_toml_str(s: &str) -> WardenResult<Self> {
        toml::from_str(s).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to parse policy TOML: {}", e),
        })
    }

    /// Read the file at `path` and parse it as TOML policy configuration.
    pub fn from_file(path: &Path) -> WardenResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| WardenError::ConfigError {
            reason: format!("failed to read policy file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    /// The dried policy this configuration describes.
    pub fn to_dried(&self) -> DriedPolicy {
        DriedPolicy {
            default: self.presets.default.to_dried(),
            trusted: self.presets.trusted.to_dried(),
            untrusted: self.presets.untrusted.to_dried(),
            sites: DriedSiteLists {
                trusted: self.sites.trusted.clone(),
                untrusted: self.sites.untrusted.clone(),
                ..DriedSiteLists::default()
            },
            enforced: self.enforced,
            auto_allow_top: self.auto_allow_top,
        }
    }
}
