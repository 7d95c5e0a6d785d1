//! # warden-sites
//!
//! Site key normalization and the hierarchical Site Key Space used by the
//! warden policy engine.
//!
//! ## Overview
//!
//! [`key`] turns URLs and user-entered site strings into canonical site
//! keys (`example.com`, `§:example.com`, `https://example.com/app`, …).
//! [`Sites`] stores values under those keys and resolves a candidate URL to
//! the most specific stored key covering it, falling back through parent
//! domains.
//!
//! ```rust,ignore
//! use warden_sites::Sites;
//!
//! let mut sites = Sites::new();
//! sites.set("example.com", "grant");
//! assert_eq!(sites.match_site("https://a.b.example.com/x"), Some("example.com"));
//! ```

pub mod key;
pub mod sites;

pub use key::{
    is_implied, is_internal, is_secure_domain_key, is_valid, origin, parse,
    secure_domain_key, toggle_secure_domain_key, ParsedSite, SECURE_DOMAIN_PREFIX,
};
pub use sites::Sites;

// ── Tests ─────────────────────────────────────────────────────────────────────
