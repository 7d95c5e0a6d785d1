//! Dried (persisted) shapes.
//!
//! These are the plain JSON-compatible values a policy is serialized to for
//! storage, transmission and snapshot comparison. Every field carries a
//! default so that hydrating a stale or partially written snapshot never
//! fails: missing data degrades to the empty or default equivalent, and
//! unknown capability strings are kept verbatim.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::capability::Capability;

/// A dried Site Key Space: site key → dried capability set.
pub type DriedSites = BTreeMap<String, DriedPermissions>;

/// A dried capability set.
///
/// ```json
/// { "capabilities": ["script", "fetch"], "contextual": { "§:example.com": { ... } }, "temp": false }
/// ```
///
/// `contextual` is omitted when the nested Site Key Space is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriedPermissions {
    pub capabilities: Vec<Capability>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub contextual: Option<DriedSites>,

    pub temp: bool,
}

impl DriedPermissions {
    /// A non-temporary dried set holding exactly `capabilities`.
    pub fn from_capabilities<I, C>(capabilities: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Capability>,
    {
        Self {
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            contextual: None,
            temp: false,
        }
    }
}

/// The compact site listing of a dried policy.
///
/// Sites pointing at a preset are stored by key only; everything else is
/// stored in `custom`. Sites pointing at `DEFAULT` are never listed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriedSiteLists {
    pub trusted: Vec<String>,
    pub untrusted: Vec<String>,
    pub custom: DriedSites,

    /// Sites pointing at the temporary twin of `TRUSTED`. Present only when
    /// the policy was dried with temporary grants included.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temp: Option<Vec<String>>,
}

/// A dried policy.
///
/// Missing fields take the values of [`DriedPolicy::default`], which are the
/// factory presets: `DEFAULT = {frame, fetch, noscript, other}`,
/// `TRUSTED = every known capability`, `UNTRUSTED = {}`, enforced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriedPolicy {
    #[serde(rename = "DEFAULT")]
    pub default: DriedPermissions,

    #[serde(rename = "TRUSTED")]
    pub trusted: DriedPermissions,

    #[serde(rename = "UNTRUSTED")]
    pub untrusted: DriedPermissions,

    pub sites: DriedSiteLists,

    pub enforced: bool,

    #[serde(rename = "autoAllowTop")]
    pub auto_allow_top: bool,
}

impl DriedPolicy {
    /// Capabilities of the factory `DEFAULT` preset.
    pub const DEFAULT_CAPABILITIES: [&'static str; 4] = [
        Capability::FRAME,
        Capability::FETCH,
        Capability::NOSCRIPT,
        Capability::OTHER,
    ];
}

impl Default for DriedPolicy {
    fn default() -> Self {
        Self {
            default: DriedPermissions::from_capabilities(Self::DEFAULT_CAPABILITIES),
            trusted: DriedPermissions::from_capabilities(Capability::ALL),
            untrusted: DriedPermissions::default(),
            sites: DriedSiteLists::default(),
            enforced: true,
            auto_allow_top: false,
        }
    }
}
