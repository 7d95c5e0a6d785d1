//! Request keys: an opaque correlation token for a (resource, type,
//! document) triple, e.g. `script@https://example.com<https://example.com`.
//!
//! Opaque URLs (`data:text/html,<b>…`) may contain the `<` separator, so
//! `%` and `<` are percent-escaped in both the site and the document part.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use warden_contracts::{WardenError, WardenResult};
use warden_sites::key;

static REQUEST_KEY_RX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\w+)@([^<]+)<([^<]*)$").expect("valid request key pattern"));

static ESCAPED_RX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%(?:25|3C)").expect("valid escape pattern"));

/// The decoded parts of a request key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplodedKey {
    pub url: String,
    pub request_type: String,
    pub document_url: String,
}

/// Encode `"{type}@{site}<{document origin}"`.
///
/// `site` is the origin of `url`, or its full site key (origin + path) when
/// `include_path` is set.
pub fn request_key(url: &str, request_type: &str, document_url: &str, include_path: bool) -> String {
    let site = if include_path {
        key::parse(url).site_key
    } else {
        key::origin(url)
    };
    format!(
        "{}@{}<{}",
        request_type,
        escape(&site),
        escape(&key::origin(document_url))
    )
}

/// Decode a key produced by [`request_key`].
///
/// Fails with `MalformedRequestKey` for anything else, including types
/// outside `\w+`.
pub fn explode_key(request_key: &str) -> WardenResult<ExplodedKey> {
    let caps = REQUEST_KEY_RX
        .captures(request_key)
        .ok_or_else(|| WardenError::MalformedRequestKey {
            key: request_key.to_string(),
        })?;
    Ok(ExplodedKey {
        request_type: caps[1].to_string(),
        url: unescape(&caps[2]),
        document_url: unescape(&caps[3]),
    })
}

fn escape(part: &str) -> String {
    part.replace('%', "%25").replace('<', "%3C")
}

fn unescape(part: &str) -> String {
    ESCAPED_RX
        .replace_all(part, |caps: &Captures| if &caps[0] == "%25" { "%" } else { "<" })
        .into_owned()
}
