//! Preset names, site grants and the immutable filters.
//!
//! Preset membership is an explicit tag rather than object identity: a site
//! entry either names one of the policy's presets or owns a custom
//! capability set.

use std::fmt;
use std::str::FromStr;

use warden_contracts::{Capability, WardenError};

use crate::permissions::Permissions;

/// Capabilities `UNTRUSTED` may never carry.
pub const UNTRUSTED_IMMUTABLE: &[(&str, bool)] = &[
    (Capability::SCRIPT, false),
    (Capability::OBJECT, false),
    (Capability::WEBGL, false),
];

/// Capabilities `TRUSTED` always carries.
pub const TRUSTED_IMMUTABLE: &[(&str, bool)] = &[(Capability::SCRIPT, true)];

/// The named capability sets of a policy, plus `Custom` for enumeration of
/// per-site sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresetName {
    Default,
    Trusted,
    Untrusted,
    Custom,
}

impl PresetName {
    /// Every name, i.e. the `"*"` selection.
    pub const ALL: [PresetName; 4] = [
        PresetName::Default,
        PresetName::Trusted,
        PresetName::Untrusted,
        PresetName::Custom,
    ];

    /// The fixed capability values re-applied to this preset at every
    /// checkpoint. Empty for presets without a filter.
    pub fn immutable_filter(self) -> &'static [(&'static str, bool)] {
        match self {
            PresetName::Trusted => TRUSTED_IMMUTABLE,
            PresetName::Untrusted => UNTRUSTED_IMMUTABLE,
            PresetName::Default | PresetName::Custom => &[],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PresetName::Default => "DEFAULT",
            PresetName::Trusted => "TRUSTED",
            PresetName::Untrusted => "UNTRUSTED",
            PresetName::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for PresetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresetName {
    type Err = WardenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEFAULT" => Ok(PresetName::Default),
            "TRUSTED" => Ok(PresetName::Trusted),
            "UNTRUSTED" => Ok(PresetName::Untrusted),
            "CUSTOM" => Ok(PresetName::Custom),
            _ => Err(WardenError::ConfigError {
                reason: format!("unknown preset name '{}'", s),
            }),
        }
    }
}

/// What a site key points at.
///
/// `Default` is never stored: assigning it removes the site's entry so the
/// site falls back to the `DEFAULT` preset.
#[derive(Debug, Clone, PartialEq)]
pub enum SiteGrant {
    Default,
    Trusted,
    /// The temporary twin of `TRUSTED` (session-only trust).
    TempTrusted,
    Untrusted,
    Custom(Permissions),
}

impl SiteGrant {
    /// The preset this grant names, `Custom` for owned sets. `TempTrusted`
    /// reports `Trusted`.
    pub fn preset_name(&self) -> PresetName {
        match self {
            SiteGrant::Default => PresetName::Default,
            SiteGrant::Trusted | SiteGrant::TempTrusted => PresetName::Trusted,
            SiteGrant::Untrusted => PresetName::Untrusted,
            SiteGrant::Custom(_) => PresetName::Custom,
        }
    }

    /// True for grants that `Policy::dry(false)` leaves out.
    pub fn is_temp(&self) -> bool {
        match self {
            SiteGrant::TempTrusted => true,
            SiteGrant::Custom(perms) => perms.temp,
            _ => false,
        }
    }
}

impl From<Permissions> for SiteGrant {
    fn from(perms: Permissions) -> Self {
        SiteGrant::Custom(perms)
    }
}
