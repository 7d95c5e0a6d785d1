//! Site key normalization.
//!
//! A site key is one of:
//!
//! - a bare domain, e.g. `example.com` (matches any scheme, and subdomains)
//! - a secure domain key, e.g. `§:example.com` (matches `https` only)
//! - an origin, e.g. `https://example.com:8443`
//! - an origin with a path, e.g. `https://example.com/app` ("narrow" key)
//! - a bare protocol, e.g. `https:`
//!
//! The functions here never fail: input that does not parse as a URL is
//! kept verbatim and treated as a bare key.

use once_cell::sync::Lazy;
use regex::Regex;
use url::{Host, Url};

/// Prefix marking a domain key that only applies to secure (`https`) URLs.
pub const SECURE_DOMAIN_PREFIX: &str = "§:";

static SCHEME_PREFIX_RX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[§\w]+:").expect("valid scheme prefix pattern"));

static DOMAIN_RX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\w+://|§:)?([^/]*)").expect("valid domain pattern"));

static IPV4_RX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d+\.){1,3}\d+").expect("valid IPv4 pattern"));

static BARE_HOST_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[\w\x{0100}-\x{f000}][\w\x{0100}-\x{f000}.-]*$").expect("valid host pattern")
});

static VALID_SITE_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^(?:(?:(?:(?:http|ftp|ws)s?|file):)",
        r"(?://[\w\x{0100}-\x{f000}][\w\x{0100}-\x{f000}.-]*[\w\x{0100}-\x{f000}.](?:$|/))?",
        r"|[\w\x{0100}-\x{f000}][\w\x{0100}-\x{f000}.-]*[\w\x{0100}-\x{f000}]$)",
    ))
    .expect("valid site pattern")
});

static INTERNAL_SITE_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?:about|chrome|resource|(?:moz|chrome)-.*):|\[System)")
        .expect("valid internal site pattern")
});

/// The result of [`parse`]: a canonical site key and, when the input was an
/// absolute URL, the parsed URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSite {
    pub url: Option<Url>,
    pub site_key: String,
}

/// Split `site` into its canonical site key and parsed URL.
///
/// - absolute URL with a tuple origin → the origin, plus the path when the
///   path is not `/`
/// - absolute URL with an opaque origin (`file:`, `data:`, …) → the input up
///   to the first `?` or `#`
/// - anything else → the input verbatim, with no URL
pub fn parse(site: &str) -> ParsedSite {
    let Ok(url) = Url::parse(site) else {
        return ParsedSite {
            url: None,
            site_key: site.to_string(),
        };
    };

    let origin = url.origin();
    let site_key = if origin.is_tuple() {
        let mut key = origin.ascii_serialization();
        if url.path() != "/" {
            key.push_str(url.path());
        }
        key
    } else {
        site.split(['?', '#']).next().unwrap_or(site).to_string()
    };

    ParsedSite {
        url: Some(url),
        site_key,
    }
}

/// Scheme + host (+ port) canonicalization of `site`.
///
/// Opaque origins fall back to [`clean_url`]; unparseable input is returned
/// unchanged.
pub fn origin(site: &str) -> String {
    if site.is_empty() {
        return String::new();
    }
    if site.starts_with("chrome:") {
        return "chrome:".to_string();
    }
    match Url::parse(site) {
        Ok(url) => {
            let origin = url.origin();
            if origin.is_tuple() {
                origin.ascii_serialization()
            } else {
                clean_url(&url)
            }
        }
        Err(_) => site.to_string(),
    }
}

/// `url` without port, query and fragment.
pub fn clean_url(url: &Url) -> String {
    let mut url = url.clone();
    // Cannot-be-a-base URLs have no port to remove.
    let _ = url.set_port(None);
    url.set_query(None);
    url.set_fragment(None);
    url.into()
}

/// The `§:`-qualified form of `domain`. Keys that already carry a scheme or
/// the secure prefix are returned unchanged.
pub fn secure_domain_key(domain: &str) -> String {
    if SCHEME_PREFIX_RX.is_match(domain) {
        domain.to_string()
    } else {
        format!("{}{}", SECURE_DOMAIN_PREFIX, domain)
    }
}

pub fn is_secure_domain_key(key: &str) -> bool {
    key.starts_with(SECURE_DOMAIN_PREFIX)
}

/// Produce the secure (`secure = true`) or scheme-agnostic variant of `key`.
pub fn toggle_secure_domain_key(key: &str, secure: bool) -> String {
    if secure {
        secure_domain_key(key)
    } else {
        key.strip_prefix(SECURE_DOMAIN_PREFIX).unwrap_or(key).to_string()
    }
}

/// Return true if `site` looks like something a user may add as a site key:
/// an http(s)/ftp(s)/ws(s)/file URL or a bare hostname.
pub fn is_valid(site: &str) -> bool {
    VALID_SITE_RX.is_match(site)
}

/// Return true for browser-internal sites that policies never apply to.
pub fn is_internal(site: &str) -> bool {
    INTERNAL_SITE_RX.is_match(site)
}

/// True if the origin (or origin + path) key `origin_key` covers `site`.
pub fn origin_implies(origin_key: &str, site: &str) -> bool {
    site == origin_key
        || site
            .strip_prefix(origin_key)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// True if the domain key `domain_key` covers `site`: same host or a
/// subdomain of it. A secure domain key only covers `https` URLs and other
/// secure domain keys.
pub fn domain_implies(domain_key: &str, site: &str) -> bool {
    let secure = is_secure_domain_key(domain_key);
    let domain = normalize_host(toggle_secure_domain_key(domain_key, false).as_str());
    if domain.is_empty() {
        return false;
    }

    let Some((host, scheme)) = key_host(site) else {
        return false;
    };
    let scheme_ok = match scheme.as_deref() {
        Some("https") => true,
        Some("http") => !secure,
        Some(_) => false,
        None => !secure,
    };
    if !scheme_ok {
        return false;
    }

    if IPV4_RX.is_match(&domain) && IPV4_RX.is_match(&host) {
        return host == domain || host.starts_with(&format!("{}.", domain));
    }
    host == domain || host.ends_with(&format!(".{}", domain))
}

/// True if the key `by_key` covers `site`, dispatching on the key's form.
pub fn is_implied(site: &str, by_key: &str) -> bool {
    if by_key.contains("://") {
        origin_implies(by_key, site)
    } else {
        domain_implies(by_key, site)
    }
}

/// Lowercase `host` and strip a trailing dot.
pub fn normalize_host(host: &str) -> String {
    host.trim_end_matches('.').to_ascii_lowercase()
}

/// True for hosts matched by IPv4 subnet walking rather than by domain.
pub fn is_ipv4(host: &str) -> bool {
    IPV4_RX.is_match(host)
}

/// True for bare hostnames such as `a.b.example.com` (no scheme, no path).
pub fn is_bare_host(candidate: &str) -> bool {
    BARE_HOST_RX.is_match(candidate)
}

/// Rewrite the host portion of `key` to its ASCII (punycode) form.
///
/// Keys with an ASCII host are returned unchanged, as are keys whose host
/// cannot be converted.
pub fn to_ascii_key(key: &str) -> String {
    let Some(domain) = DOMAIN_RX.captures(key).and_then(|c| c.get(1)) else {
        return key.to_string();
    };
    let domain = domain.as_str();
    if domain.is_ascii() {
        return key.to_string();
    }

    let (host, port) = match domain.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (domain, None),
    };
    let ascii = match Host::parse(host) {
        Ok(Host::Domain(ascii)) => ascii,
        _ => return key.to_string(),
    };
    let replacement = match port {
        Some(port) => format!("{}:{}", ascii, port),
        None => ascii,
    };
    key.replacen(domain, &replacement, 1)
}

/// Host and scheme of a site key, if it has a host.
///
/// `§:host` reports scheme `https`; bare hosts report no scheme.
fn key_host(key: &str) -> Option<(String, Option<String>)> {
    if let Some(host) = key.strip_prefix(SECURE_DOMAIN_PREFIX) {
        return Some((normalize_host(host), Some("https".to_string())));
    }
    if let Ok(url) = Url::parse(key) {
        return url
            .host_str()
            .map(|host| (normalize_host(host), Some(url.scheme().to_string())));
    }
    if is_bare_host(key) {
        return Some((normalize_host(key), None));
    }
    None
}
