//! The Site Key Space: an insertion-ordered map from site keys to values
//! with hierarchical (most-specific-wins) lookup.
//!
//! Matching precedence for a candidate site:
//!
//! 1. the candidate verbatim
//! 2. its parsed site key (origin + path)
//! 3. its origin, when a path was present
//! 4. its host, then each parent domain (at every level the bare domain
//!    key beats the `§:` secure key, which is only tried for `https`)
//! 5. its bare protocol key, e.g. `https:`
//!
//! The first hit wins. Two keys of equal specificity for the same logical
//! site cannot both exist: `Policy::set` removes the wide/narrow twin before
//! inserting.

use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use crate::key::{self, ParsedSite, SECURE_DOMAIN_PREFIX};

/// An insertion-ordered map from normalized site keys to `V`.
#[derive(Debug, Clone)]
pub struct Sites<V> {
    entries: Vec<(String, V)>,
    index: HashMap<String, usize>,
}

impl<V> Default for Sites<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<V: PartialEq> PartialEq for Sites<V> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<V> Sites<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.index.get(key).map(|&i| &self.entries[i].1)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut V> {
        match self.index.get(key) {
            Some(&i) => Some(&mut self.entries[i].1),
            None => None,
        }
    }

    /// Insert or replace the value for `key`.
    ///
    /// Empty keys and the bare `§:` prefix are rejected (returns false).
    /// Internationalized hosts are stored in their ASCII form. Replacing an
    /// existing key keeps its position in iteration order.
    pub fn set(&mut self, site_key: &str, value: V) -> bool {
        if site_key.is_empty() || site_key == SECURE_DOMAIN_PREFIX {
            warn!(key = %site_key, "ignoring empty site key");
            return false;
        }
        let key = key::to_ascii_key(site_key);
        match self.index.get(&key) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
            }
        }
        true
    }

    /// Remove `key`, returning its value if it was present.
    pub fn delete(&mut self, site_key: &str) -> Option<V> {
        let i = self.index.remove(site_key)?;
        let (_, value) = self.entries.remove(i);
        for (k, _) in &self.entries[i..] {
            if let Some(pos) = self.index.get_mut(k) {
                *pos -= 1;
            }
        }
        Some(value)
    }

    /// Iterate `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    /// The most specific stored key covering `site`, or `None`.
    pub fn match_site(&self, site: &str) -> Option<&str> {
        if site.is_empty() || self.is_empty() {
            return None;
        }
        if let Some(k) = self.stored_key(&key::to_ascii_key(site)) {
            return Some(k);
        }

        let ParsedSite { url, site_key } = key::parse(site);
        if site_key != site {
            if let Some(k) = self.stored_key(&key::to_ascii_key(&site_key)) {
                return Some(k);
            }
        }

        match url {
            Some(url) => {
                let origin = url.origin();
                if origin.is_tuple() {
                    let origin = origin.ascii_serialization();
                    if origin != site_key {
                        if let Some(k) = self.stored_key(&origin) {
                            return Some(k);
                        }
                    }
                }
                if let Some(host) = url.host_str() {
                    if let Some(k) = self.domain_match(host, url.scheme() == "https") {
                        return Some(k);
                    }
                }
                self.stored_key(&format!("{}:", url.scheme()))
            }
            None => {
                let (bare, secure) = match site_key.strip_prefix(SECURE_DOMAIN_PREFIX) {
                    Some(rest) => (rest, true),
                    None => (site_key.as_str(), false),
                };
                if key::is_bare_host(bare) {
                    self.domain_match(bare, secure)
                } else {
                    None
                }
            }
        }
    }

    /// Walk from `host` up through its parent domains (or, for IPv4 hosts,
    /// its subnets down to two octets) and return the first stored key.
    ///
    /// Internationalized hosts are walked in their ASCII form, the form
    /// `set` stores them in.
    pub fn domain_match(&self, host: &str, secure: bool) -> Option<&str> {
        let host = key::normalize_host(&key::to_ascii_key(host));
        if host.is_empty() {
            return None;
        }
        let ipv4 = key::is_ipv4(&host);
        let mut domain = host.as_str();
        loop {
            if let Some(k) = self.stored_key(domain) {
                return Some(k);
            }
            if secure {
                if let Some(k) = self.stored_key(&key::secure_domain_key(domain)) {
                    return Some(k);
                }
            }

            if ipv4 {
                let dot = domain.rfind('.')?;
                if dot <= 3 && domain.find('.') == Some(dot) {
                    break;
                }
                domain = &domain[..dot];
            } else {
                let dot = domain.find('.')?;
                domain = &domain[dot + 1..];
                if domain.is_empty() {
                    break;
                }
            }
        }
        None
    }

    /// Every stored key covered by `by_key` (itself included), in insertion
    /// order.
    pub fn implied_by(&self, by_key: &str) -> Vec<String> {
        self.keys()
            .filter(|k| key::is_implied(k, by_key))
            .map(str::to_string)
            .collect()
    }

    /// Dry every entry with `f` into a plain key → value map.
    pub fn dry_with<D>(&self, f: impl Fn(&V) -> D) -> BTreeMap<String, D> {
        self.iter().map(|(k, v)| (k.to_string(), f(v))).collect()
    }

    /// Build a Site Key Space from a dried map, converting values with `f`.
    pub fn hydrate_with<D>(dry: &BTreeMap<String, D>, f: impl Fn(&D) -> V) -> Self {
        let mut sites = Self::new();
        for (k, d) in dry {
            sites.set(k, f(d));
        }
        sites
    }

    fn stored_key(&self, site_key: &str) -> Option<&str> {
        self.index.get(site_key).map(|&i| self.entries[i].0.as_str())
    }
}

impl<V> FromIterator<(String, V)> for Sites<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        let mut sites = Self::new();
        for (k, v) in iter {
            sites.set(&k, v);
        }
        sites
    }
}
