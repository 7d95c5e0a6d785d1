//! The capability vocabulary.
//!
//! A capability is a named permission bit granted or denied per site. The
//! vocabulary is fixed and only grows by adding constants here; callers are
//! still allowed to store tags outside of it so that policies written by a
//! newer release survive a round trip through an older one.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An opaque capability tag.
///
/// Sub-typed capabilities use a `name:type` form, e.g. `"object:pdf"`; see
/// [`Capability::typed`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(pub String);

impl Capability {
    pub const SCRIPT: &'static str = "script";
    pub const OBJECT: &'static str = "object";
    pub const MEDIA: &'static str = "media";
    pub const FRAME: &'static str = "frame";
    pub const FONT: &'static str = "font";
    pub const WEBGL: &'static str = "webgl";
    pub const FETCH: &'static str = "fetch";
    pub const PING: &'static str = "ping";
    pub const OTHER: &'static str = "other";
    pub const NOSCRIPT: &'static str = "noscript";
    pub const UNCHECKED_CSS: &'static str = "unchecked_css";
    pub const LAN: &'static str = "lan";

    /// Every capability in the fixed vocabulary, in display order.
    pub const ALL: [&'static str; 12] = [
        Self::SCRIPT,
        Self::OBJECT,
        Self::MEDIA,
        Self::FRAME,
        Self::FONT,
        Self::WEBGL,
        Self::FETCH,
        Self::PING,
        Self::OTHER,
        Self::NOSCRIPT,
        Self::UNCHECKED_CSS,
        Self::LAN,
    ];

    /// Construct a capability from any string-like value.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Return true if the tag belongs to the fixed vocabulary.
    pub fn is_known(&self) -> bool {
        Self::ALL.contains(&self.0.as_str())
    }

    /// Build a namespaced sub-type tag: `"{name}:{type}"`, where `name` is
    /// the part of `capability` before its first `:`.
    ///
    /// `typed("object", "pdf")` and `typed("object:flash", "pdf")` both
    /// yield `"object:pdf"`.
    pub fn typed(capability: &str, kind: &str) -> String {
        let name = capability.split(':').next().unwrap_or(capability);
        format!("{}:{}", name, kind)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Capability {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Capability {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for Capability {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for Capability {
    fn borrow(&self) -> &str {
        &self.0
    }
}
