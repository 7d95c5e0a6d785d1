//! # warden-policy
//!
//! A site-scoped capability policy engine.
//!
//! ## Overview
//!
//! A [`Policy`] decides whether a resource hosted by one site, embedded by
//! another, may use a capability (`script`, `media`, `frame`, …). Sites are
//! granted one of three presets (`DEFAULT`, `TRUSTED`, `UNTRUSTED`) or a
//! custom [`Permissions`] set, optionally with contextual overrides keyed by
//! the embedding site.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use warden_policy::{Policy, SiteGrant};
//!
//! let mut policy = Policy::new();
//! policy.set("example.com", SiteGrant::Trusted, true);
//! assert!(policy.can("https://cdn.example.com/app.js", "script", None));
//! ```
//!
//! ## Persistence
//!
//! [`Policy::dry`] produces the persisted shape ([`DriedPolicy`]);
//! [`Policy::hydrate`] and [`Policy::hydrate_into`] read it back. The
//! `TRUSTED`/`UNTRUSTED` immutable filters are re-applied on hydration,
//! when a [`PresetMut`] guard is dropped, and in every dried output.
//!
//! [`DriedPolicy`]: warden_contracts::DriedPolicy

pub mod config;
pub mod permissions;
pub mod policy;
pub mod preset;
pub mod request;
pub mod shared;
pub mod store;

pub use config::{PolicyConfig, PresetConfig, PresetsConfig, SitesConfig};
pub use permissions::Permissions;
pub use policy::{Policy, PresetMut, Resolution, SetOutcome};
pub use preset::{PresetName, SiteGrant, TRUSTED_IMMUTABLE, UNTRUSTED_IMMUTABLE};
pub use request::{explode_key, request_key, ExplodedKey};
pub use shared::SharedPolicy;
pub use store::InMemoryPolicyStore;

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::borrow::Cow;
    use std::sync::Arc;

    use warden_contracts::{CapabilityGate, DriedPolicy, PolicyStore, WardenError};
    use warden_sites::Sites;

    use crate::{
        InMemoryPolicyStore, Permissions, Policy, PolicyConfig, PresetName, SharedPolicy,
        SiteGrant,
    };

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn perms(capabilities: &[&str]) -> Permissions {
        Permissions::new(capabilities.iter().copied(), false)
    }

    /// A custom set for `thirdparty.com` that gains `script` when embedded
    /// by `firstparty.com`.
    fn contextual_grant() -> Permissions {
        let mut contextual = Sites::new();
        contextual.set("firstparty.com", perms(&["script", "fetch"]));
        Permissions::with_contextual(["fetch", "media"], false, contextual)
    }

    // ── 1. Permissions ────────────────────────────────────────────────────────

    #[test]
    fn test_permissions_set_and_allowing() {
        let mut p = perms(&[]);
        assert!(!p.allowing("script"));
        assert!(p.set("script", true));
        assert!(p.allowing("script"));
        assert!(!p.set("script", false));
        assert!(!p.allowing("script"));

        // Unknown tags are stored verbatim.
        p.set("teleport", true);
        assert!(p.allowing("teleport"));
    }

    #[test]
    fn test_permissions_same_as_ignores_order_temp_and_contextual() {
        let a = Permissions::new(["media", "script"], false);
        let b = Permissions::with_contextual(["script", "media"], true, {
            let mut s = Sites::new();
            s.set("x.com", perms(&["font"]));
            s
        });
        assert!(a.same_as(&b));
        assert_eq!(a, b);
        assert!(!a.same_as(&perms(&["media"])));
    }

    #[test]
    fn test_permissions_clone_shares_contextual_until_written() {
        let original = contextual_grant();
        let mut copy = original.clone();
        assert!(copy.shares_contextual(&original));

        copy.contextual_mut().set("other.com", perms(&["font"]));
        assert!(!copy.shares_contextual(&original));
        assert!(original.contextual().get("other.com").is_none());
        assert_eq!(copy.contextual().len(), 2);
    }

    #[test]
    fn test_temp_twin_is_memoized_and_invalidated() {
        let mut p = perms(&["script"]);
        let first: *const Permissions = p.temp_twin();
        let second: *const Permissions = p.temp_twin();
        assert!(std::ptr::eq(first, second), "twin must be identity-stable");
        assert!(p.temp_twin().temp);
        assert!(!p.temp);
        assert!(p.temp_twin().shares_contextual(&p));

        p.set("media", true);
        assert!(p.temp_twin().allowing("media"), "twin must reflect later mutations");
    }

    #[test]
    fn test_permissions_typed() {
        assert_eq!(Permissions::typed("object", "application/pdf"), "object:application/pdf");
    }

    #[test]
    fn test_permissions_dry_and_hydrate_into() {
        let original = contextual_grant();
        let dry = original.dry();
        assert_eq!(dry.capabilities.len(), 2);
        assert!(dry.contextual.as_ref().unwrap().contains_key("firstparty.com"));

        let mut target = perms(&["script"]);
        let _ = target.temp_twin();
        target.hydrate_into(&dry);
        assert!(target.same_as(&original));
        assert!(target.temp_twin().allowing("media"));
        assert!(!target.temp_twin().allowing("script"));
        assert_eq!(target.dry(), dry);
    }

    // ── 2. Default fallback ───────────────────────────────────────────────────

    #[test]
    fn test_default_fallback() {
        let policy = Policy::new();
        assert!(!policy.can("https://unknown.example/", "script", None));
        assert!(policy.can("https://unknown.example/", "fetch", None));

        let resolved = policy.get("https://unknown.example/", None);
        assert!(resolved.site_match.is_none());
        assert!(std::ptr::eq(resolved.perms, policy.default_preset()));
    }

    #[test]
    fn test_not_enforced_allows_everything() {
        let mut policy = Policy::new();
        policy.set("evil.test", SiteGrant::Untrusted, false);
        policy.enforced = false;
        assert!(policy.can("https://evil.test/", "script", None));
        assert!(policy.can("garbage ::: input", "webgl", None));
    }

    #[test]
    fn test_malformed_site_falls_back_to_default() {
        let mut policy = Policy::new();
        policy.set("example.com", SiteGrant::Trusted, false);
        let resolved = policy.get("http://[broken", None);
        assert!(resolved.site_match.is_none());
        assert!(!policy.can("", "script", None));
    }

    // ── 3. set ────────────────────────────────────────────────────────────────

    #[test]
    fn test_trust_applies_to_subdomains() {
        let mut policy = Policy::new();
        let outcome = policy.set("example.com", SiteGrant::Trusted, false);
        assert_eq!(outcome.site_key, "example.com");
        assert!(outcome.perms.allowing("script"));

        assert!(policy.can("https://example.com/", "script", None));
        assert!(policy.can("http://cdn.example.com/lib.js", "script", None));
        assert!(!policy.can("https://example.org/", "script", None));
    }

    #[test]
    fn test_unicode_site_reachable_by_its_own_name() {
        let mut policy = Policy::new();
        let outcome = policy.set("bücher.de", SiteGrant::Trusted, false);
        assert_eq!(outcome.site_key, "xn--bcher-kva.de");

        assert_eq!(policy.get("bücher.de", None).site_match, Some("xn--bcher-kva.de"));
        assert_eq!(policy.get("sub.bücher.de", None).site_match, Some("xn--bcher-kva.de"));
        assert!(policy.can("https://bücher.de/", "script", None));
    }

    #[test]
    fn test_cascade_trust_clears_descendants() {
        let mut policy = Policy::new();
        policy.set("sub.example.com", SiteGrant::Custom(perms(&["media"])), false);
        policy.set("§:deep.example.com", SiteGrant::Untrusted, false);
        policy.set("example.org", SiteGrant::Custom(perms(&["font"])), false);

        policy.set("example.com", SiteGrant::Trusted, true);

        let keys: Vec<&str> = policy.sites().keys().collect();
        assert_eq!(keys, vec!["example.org", "example.com"]);
        assert!(policy.can("https://sub.example.com/", "script", None));
    }

    #[test]
    fn test_without_cascade_descendants_survive() {
        let mut policy = Policy::new();
        policy.set("sub.example.com", SiteGrant::Custom(perms(&["media"])), false);
        policy.set("example.com", SiteGrant::Trusted, false);

        assert!(policy.sites().contains_key("sub.example.com"));
        assert!(!policy.can("https://sub.example.com/", "script", None));
        assert!(policy.can("https://sub.example.com/", "media", None));
    }

    #[test]
    fn test_untrusted_is_widened_and_cascades() {
        let mut policy = Policy::new();
        policy.set("§:a.tracker.test", SiteGrant::Trusted, false);

        let outcome = policy.set("§:tracker.test", SiteGrant::Untrusted, false);
        assert_eq!(outcome.site_key, "tracker.test");
        assert!(!policy.sites().contains_key("§:a.tracker.test"));
        assert!(!policy.can("http://a.tracker.test/", "script", None));
        assert!(!policy.can("https://a.tracker.test/", "frame", None));
    }

    #[test]
    fn test_set_removes_wide_twin() {
        let mut policy = Policy::new();
        policy.set("example.com", SiteGrant::Untrusted, false);
        policy.set("§:example.com", SiteGrant::Trusted, false);

        let keys: Vec<&str> = policy.sites().keys().collect();
        assert_eq!(keys, vec!["§:example.com"]);
        assert!(policy.can("https://example.com/", "script", None));
        assert!(!policy.can("http://example.com/", "script", None));
    }

    #[test]
    fn test_set_default_unsets_site() {
        let mut policy = Policy::new();
        policy.set("example.com", SiteGrant::Trusted, false);
        let outcome = policy.set("example.com", SiteGrant::Default, false);

        assert!(policy.sites().is_empty());
        assert!(outcome.perms.same_as(policy.default_preset()));
    }

    #[test]
    fn test_set_url_does_not_cascade() {
        let mut policy = Policy::new();
        policy.set("https://example.com/app", SiteGrant::Custom(perms(&["media"])), false);
        policy.set("https://example.com", SiteGrant::Trusted, true);

        assert_eq!(policy.sites().len(), 2);
        assert!(!policy.can("https://example.com/app", "script", None));
        assert!(policy.can("https://example.com/other", "script", None));
    }

    // ── 4. Contextual overrides ───────────────────────────────────────────────

    #[test]
    fn test_contextual_override() {
        let mut policy = Policy::new();
        policy.set("thirdparty.com", SiteGrant::Custom(contextual_grant()), false);

        let in_context = policy.get("thirdparty.com", Some("firstparty.com"));
        assert!(in_context.perms.allowing("script"));
        assert!(!in_context.perms.allowing("media"), "override replaces, never merges");
        assert_eq!(in_context.context_match, Some("firstparty.com"));

        let elsewhere = policy.get("thirdparty.com", Some("other.com"));
        assert!(!elsewhere.perms.allowing("script"));
        assert!(elsewhere.perms.same_as(&contextual_grant()));
        assert!(elsewhere.context_match.is_none());

        assert!(policy.can(
            "https://cdn.thirdparty.com/x.js",
            "script",
            Some("https://www.firstparty.com/")
        ));
        assert!(!policy.can("https://cdn.thirdparty.com/x.js", "script", None));
    }

    // ── 5. only_secure ────────────────────────────────────────────────────────

    #[test]
    fn test_only_secure_skips_insecure_sites() {
        let mut policy = Policy::new();
        policy.set("example.com", SiteGrant::Trusted, false);
        policy.set_only_secure(true);

        assert!(policy.can("https://example.com/", "script", None));
        assert!(!policy.can("http://example.com/", "script", None));
        assert!(!policy.can("ftp://example.com/", "script", None));
        assert!(policy.get("HTTP://example.com/", None).site_match.is_none());
    }

    // ── 6. cascade_restrictions ───────────────────────────────────────────────

    #[test]
    fn test_cascade_restrictions_intersects_with_top_document() {
        let mut policy = Policy::new();
        policy.set("top.com", SiteGrant::Custom(perms(&["script", "frame"])), false);
        policy.set("widget.com", SiteGrant::Trusted, false);

        let widget = policy.get("https://widget.com/", None).perms;
        let restricted = policy.cascade_restrictions(widget, "https://top.com/");
        assert!(matches!(restricted, Cow::Owned(_)));
        let caps: Vec<&str> = restricted.capabilities().iter().map(|c| c.as_str()).collect();
        assert_eq!(caps, vec!["frame", "script"]);

        // Inputs untouched.
        assert!(policy.trusted().allowing("media"));
    }

    #[test]
    fn test_cascade_restrictions_same_instance_is_borrowed() {
        let mut policy = Policy::new();
        policy.set("site.com", SiteGrant::Trusted, false);
        let perms = policy.get("https://site.com/", None).perms;
        let restricted = policy.cascade_restrictions(perms, "https://site.com/");
        assert!(matches!(restricted, Cow::Borrowed(p) if std::ptr::eq(p, perms)));
    }

    #[test]
    fn test_cascade_restrictions_keeps_temp_and_contextual() {
        let policy = Policy::new();
        let mut nested = contextual_grant();
        nested.temp = true;
        let restricted = policy.cascade_restrictions(&nested, "https://plain.test/");
        assert!(restricted.temp);
        assert!(restricted.shares_contextual(&nested));
        // DEFAULT has fetch but not media.
        assert!(restricted.allowing("fetch"));
        assert!(!restricted.allowing("media"));
    }

    // ── 7. Immutable filters ──────────────────────────────────────────────────

    #[test]
    fn test_preset_guard_restores_immutable_capabilities() {
        let mut policy = Policy::new();
        {
            let mut untrusted = policy.preset_mut(PresetName::Untrusted).unwrap();
            untrusted.set("script", true);
            untrusted.set("media", true);
            assert!(untrusted.allowing("script"));
        }
        assert!(!policy.untrusted().allowing("script"));
        assert!(policy.untrusted().allowing("media"));

        {
            let mut trusted = policy.preset_mut(PresetName::Trusted).unwrap();
            trusted.set("script", false);
        }
        assert!(policy.trusted().allowing("script"));
        assert!(policy.preset_mut(PresetName::Custom).is_none());
    }

    #[test]
    fn test_hydration_enforces_immutable_filters() {
        let json = r#"{
            "TRUSTED": { "capabilities": ["media"] },
            "UNTRUSTED": { "capabilities": ["script", "object", "font"] }
        }"#;
        let policy = Policy::from_json(json).unwrap();
        assert!(policy.trusted().allowing("script"));
        assert!(!policy.untrusted().allowing("script"));
        assert!(!policy.untrusted().allowing("object"));
        assert!(policy.untrusted().allowing("font"));
    }

    // ── 8. dry / hydrate ──────────────────────────────────────────────────────

    #[test]
    fn test_dry_shape() {
        let mut policy = Policy::new();
        policy.set("§:good.com", SiteGrant::Trusted, false);
        policy.set("bad.com", SiteGrant::Untrusted, false);
        policy.set("session.com", SiteGrant::TempTrusted, false);
        policy.set("custom.com", SiteGrant::Custom(perms(&["media"])), false);

        let dry = policy.dry(false);
        assert_eq!(dry.sites.trusted, vec!["§:good.com".to_string()]);
        assert_eq!(dry.sites.untrusted, vec!["bad.com".to_string()]);
        assert!(dry.sites.custom.contains_key("custom.com"));
        assert!(dry.sites.temp.is_none());

        let with_temp = policy.dry(true);
        assert_eq!(with_temp.sites.temp, Some(vec!["session.com".to_string()]));
    }

    #[test]
    fn test_temp_custom_grants_skipped_unless_requested() {
        let mut policy = Policy::new();
        let mut temp = perms(&["media"]);
        temp.temp = true;
        policy.set("session.com", SiteGrant::Custom(temp), false);

        assert!(policy.dry(false).sites.custom.is_empty());
        assert!(policy.dry(true).sites.custom["session.com"].temp);
    }

    #[test]
    fn test_hydrate_into_keeps_preset_instances() {
        let mut policy = Policy::new();
        policy.set("session.com", SiteGrant::TempTrusted, false);
        let trusted_before: *const Permissions = policy.trusted();
        let twin_caps_before = policy.trusted().temp_twin().capabilities().len();

        let mut dry = policy.dry(true);
        dry.trusted.capabilities.truncate(1);
        policy.hydrate_into(&dry);

        assert!(std::ptr::eq(trusted_before, policy.trusted()));
        let twin = policy.get("https://session.com/", None).perms;
        assert!(twin.temp);
        assert!(std::ptr::eq(twin, policy.trusted().temp_twin()));
        assert!(twin.capabilities().len() < twin_caps_before, "stale twin was not discarded");
        assert!(twin.allowing("script"));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut policy = Policy::new();
        policy.set("§:good.com", SiteGrant::Trusted, false);
        policy.set("bad.com", SiteGrant::Untrusted, false);
        policy.set("session.com", SiteGrant::TempTrusted, false);
        policy.set("thirdparty.com", SiteGrant::Custom(contextual_grant()), false);
        policy.auto_allow_top = true;

        let rebuilt = Policy::hydrate(&policy.dry(true));
        assert_eq!(rebuilt.snapshot().unwrap(), policy.snapshot().unwrap());
        assert!(rebuilt.equals(&policy));
        assert_eq!(rebuilt, policy);

        let persisted = Policy::hydrate(&policy.dry(false));
        assert!(!persisted.equals(&policy), "temporary grants must not persist");
    }

    #[test]
    fn test_hydrate_partial_snapshot_defaults() {
        let policy = Policy::from_json(r#"{ "sites": { "trusted": ["example.com"] } }"#).unwrap();
        assert!(policy.enforced);
        assert!(policy.can("https://example.com/", "script", None));
        assert!(policy.can("https://other.test/", "frame", None));
    }

    #[test]
    fn test_hydrate_invalid_json_is_error() {
        match Policy::from_json("{ not json") {
            Err(WardenError::Serialization { reason }) => {
                assert!(reason.contains("failed to parse dried policy"), "got: {reason}");
            }
            other => panic!("expected Serialization error, got {:?}", other),
        }
    }

    #[test]
    fn test_untrusted_keys_widened_on_hydrate() {
        let mut dry = DriedPolicy::default();
        dry.sites.untrusted.push("§:bad.com".to_string());
        let policy = Policy::hydrate(&dry);
        assert!(policy.sites().contains_key("bad.com"));
        assert!(!policy.sites().contains_key("§:bad.com"));
    }

    // ── 9. get_presets ────────────────────────────────────────────────────────

    #[test]
    fn test_get_presets() {
        let mut policy = Policy::new();
        policy.set("a.com", SiteGrant::Custom(perms(&["media"])), false);
        policy.set("b.com", SiteGrant::Trusted, false);
        policy.set("c.com", SiteGrant::Custom(perms(&["font"])), false);

        let all = policy.get_presets(&PresetName::ALL);
        assert_eq!(all.len(), 5);
        assert!(std::ptr::eq(all[0], policy.default_preset()));
        assert!(std::ptr::eq(all[1], policy.trusted()));
        assert!(std::ptr::eq(all[2], policy.untrusted()));
        assert!(all[3].allowing("media"));
        assert!(all[4].allowing("font"));

        assert_eq!(policy.get_presets(&[PresetName::Custom]).len(), 2);
        assert_eq!("untrusted".parse::<PresetName>().unwrap(), PresetName::Untrusted);
        assert!("bogus".parse::<PresetName>().is_err());
    }

    // ── 10. Request keys ──────────────────────────────────────────────────────

    #[test]
    fn test_request_key_round_trip() {
        let key = Policy::request_key(
            "https://example.com/page?x=1",
            "script",
            "https://example.com/index.html",
            false,
        );
        assert_eq!(key, "script@https://example.com<https://example.com");

        let exploded = Policy::explode_key(&key).unwrap();
        assert_eq!(exploded.request_type, "script");
        assert_eq!(exploded.url, "https://example.com");
        assert_eq!(exploded.document_url, "https://example.com");
    }

    #[test]
    fn test_request_key_with_path() {
        let key = Policy::request_key("https://example.com/page?x=1", "media", "https://doc.test/", true);
        assert_eq!(key, "media@https://example.com/page<https://doc.test");
    }

    #[test]
    fn test_request_key_opaque_url_with_separator() {
        let url = "data:text/html,<b>hi</b>%3C";
        let key = Policy::request_key(url, "frame", "https://doc.test/", false);
        assert_eq!(key, "frame@data:text/html,%3Cb>hi%3C/b>%253C<https://doc.test");

        let exploded = Policy::explode_key(&key).unwrap();
        assert_eq!(exploded.request_type, "frame");
        assert_eq!(exploded.url, url);
        assert_eq!(exploded.document_url, "https://doc.test");

        let key = Policy::request_key("https://a.test/", "script", "data:text/html,<p>", false);
        assert_eq!(Policy::explode_key(&key).unwrap().document_url, "data:text/html,<p>");
    }

    #[test]
    fn test_explode_malformed_key_fails() {
        for bad in ["", "script https://x<y", "scr-ipt@https://x<y", "script@<y"] {
            match Policy::explode_key(bad) {
                Err(WardenError::MalformedRequestKey { key }) => assert_eq!(key, bad),
                other => panic!("expected MalformedRequestKey for {bad:?}, got {:?}", other),
            }
        }
    }

    // ── 11. Config ────────────────────────────────────────────────────────────

    #[test]
    fn test_config_from_toml() {
        let toml = r#"
            only_secure = true

            [presets.default]
            capabilities = ["frame"]

            [sites]
            trusted = ["§:good.com"]
            untrusted = ["bad.com"]
        "#;
        let config = PolicyConfig::from_toml_str(toml).unwrap();
        assert!(config.enforced);
        assert_eq!(config.presets.trusted.capabilities.len(), 12);

        let policy = Policy::from_config(&config);
        assert!(policy.only_secure());
        assert!(policy.can("https://www.good.com/", "script", None));
        assert!(!policy.can("https://bad.com/", "frame", None));
        assert!(policy.can("https://neutral.test/", "frame", None));
        assert!(!policy.can("https://neutral.test/", "fetch", None));
    }

    #[test]
    fn test_config_parse_error() {
        match PolicyConfig::from_toml_str("this is not valid toml ][[[") {
            Err(WardenError::ConfigError { reason }) => {
                assert!(reason.contains("failed to parse policy TOML"), "got: {reason}");
            }
            other => panic!("expected ConfigError, got {:?}", other),
        }
    }

    #[test]
    fn test_config_empty_document_is_factory_policy() {
        let config = PolicyConfig::from_toml_str("").unwrap();
        assert!(Policy::from_config(&config).equals(&Policy::new()));
    }

    // ── 12. Shared policy and store ───────────────────────────────────────────

    #[test]
    fn test_shared_policy_across_threads() {
        let shared = Arc::new(SharedPolicy::new(Policy::new()));
        shared.set("example.com", SiteGrant::Trusted, false).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let shared = Arc::clone(&shared);
                std::thread::spawn(move || shared.can("https://a.example.com/", "script", None))
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }

    #[test]
    fn test_store_save_and_load() {
        let store = InMemoryPolicyStore::new();
        assert!(store.load().unwrap().is_none());

        let shared = SharedPolicy::new(Policy::new());
        shared.set("example.com", SiteGrant::Trusted, false).unwrap();
        shared.set("session.com", SiteGrant::TempTrusted, false).unwrap();
        shared.save_to(&store).unwrap();
        assert_eq!(store.save_count(), 1);

        let restored = SharedPolicy::default();
        assert!(restored.load_from(&store).unwrap());
        let policy = restored.into_inner().unwrap();
        assert!(policy.can("https://example.com/", "script", None));
        assert!(!policy.can("https://session.com/", "script", None));
    }
}
