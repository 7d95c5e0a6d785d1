//! The site policy.
//!
//! A `Policy` owns three presets (`DEFAULT`, `TRUSTED`, `UNTRUSTED`), a Site
//! Key Space of per-site grants and two global flags. Decision algorithm
//! for `can(url, capability, ctx)`:
//!
//! 1. If the policy is not enforced → allowed.
//! 2. Match `url` against the Site Key Space (skipped for insecure URLs in
//!    `only_secure` mode). No match → the `DEFAULT` preset.
//! 3. On a match with an embedding context `ctx`, a matching entry in the
//!    grant's contextual space replaces the grant entirely.
//! 4. Allowed iff the resulting set grants `capability`.

use std::borrow::Cow;
use std::ops::{Deref, DerefMut};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use warden_contracts::{
    CapabilityGate, DriedPermissions, DriedPolicy, DriedSiteLists, WardenError, WardenResult,
};
use warden_sites::{key, ParsedSite, Sites};

use crate::{
    config::PolicyConfig,
    permissions::Permissions,
    preset::{PresetName, SiteGrant},
    request::{self, ExplodedKey},
};

static INSECURE_SCHEME_RX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\w+tp:").expect("valid insecure scheme pattern"));

/// The effective capability set for a site, with the keys that produced it.
#[derive(Debug, Clone, Copy)]
pub struct Resolution<'a> {
    pub perms: &'a Permissions,
    /// The Site Key Space key that matched, `None` when `DEFAULT` applied.
    pub site_match: Option<&'a str>,
    /// The contextual key that matched, if a contextual override applied.
    pub context_match: Option<&'a str>,
}

/// What `Policy::set` did: the normalized key and the resulting capability
/// set (`DEFAULT` when the site was unset).
#[derive(Debug, Clone, PartialEq)]
pub struct SetOutcome {
    pub site_key: String,
    pub perms: Permissions,
}

/// A site-scoped capability policy.
#[derive(Debug)]
pub struct Policy {
    default: Permissions,
    trusted: Permissions,
    untrusted: Permissions,
    sites: Sites<SiteGrant>,

    /// When false, every `can` query is allowed.
    pub enforced: bool,

    /// Consumed by enforcement layers; not interpreted here.
    pub auto_allow_top: bool,

    only_secure: bool,
}

impl Policy {
    /// A policy with the factory presets and no site grants.
    pub fn new() -> Self {
        Self::hydrate(&DriedPolicy::default())
    }

    /// Build a policy from a TOML-derived configuration.
    pub fn from_config(config: &PolicyConfig) -> Self {
        let mut policy = Self::hydrate(&config.to_dried());
        policy.only_secure = config.only_secure;
        policy
    }

    /// Reconstruct a policy from its dried form.
    pub fn hydrate(dry: &DriedPolicy) -> Self {
        let mut policy = Self {
            default: Permissions::empty(),
            trusted: Permissions::empty(),
            untrusted: Permissions::empty(),
            sites: Sites::new(),
            enforced: true,
            auto_allow_top: false,
            only_secure: false,
        };
        policy.hydrate_into(dry);
        policy
    }

    /// Overwrite this policy from `dry` in place.
    ///
    /// The three preset instances are kept (their contents are replaced) and
    /// their temporary twins are rebuilt on next access. `only_secure` is a
    /// runtime option and is left untouched.
    pub fn hydrate_into(&mut self, dry: &DriedPolicy) {
        self.default.hydrate_into(&dry.default);
        self.trusted.hydrate_into(&dry.trusted);
        self.untrusted.hydrate_into(&dry.untrusted);
        for preset in [&mut self.default, &mut self.trusted, &mut self.untrusted] {
            preset.temp = false;
        }

        let lists = &dry.sites;
        let mut sites = Sites::hydrate_with(&lists.custom, |d| {
            SiteGrant::Custom(Permissions::hydrate(d))
        });
        for site_key in &lists.trusted {
            sites.set(site_key, SiteGrant::Trusted);
        }
        for site_key in &lists.untrusted {
            sites.set(&key::toggle_secure_domain_key(site_key, false), SiteGrant::Untrusted);
        }
        if let Some(temp) = &lists.temp {
            for site_key in temp {
                sites.set(site_key, SiteGrant::TempTrusted);
            }
        }
        self.sites = sites;
        self.enforced = dry.enforced;
        self.auto_allow_top = dry.auto_allow_top;

        self.enforce_immutable();

        info!(
            sites = self.sites.len(),
            enforced = self.enforced,
            "policy hydrated"
        );
    }

    /// Parse a dried policy from JSON and hydrate it.
    pub fn from_json(json: &str) -> WardenResult<Self> {
        let dry: DriedPolicy =
            serde_json::from_str(json).map_err(|e| WardenError::Serialization {
                reason: format!("failed to parse dried policy: {}", e),
            })?;
        Ok(Self::hydrate(&dry))
    }

    /// Dry the policy and encode it as JSON.
    pub fn to_json(&self, include_temp: bool) -> WardenResult<String> {
        serde_json::to_string(&self.dry(include_temp)).map_err(|e| WardenError::Serialization {
            reason: format!("failed to encode dried policy: {}", e),
        })
    }

    // ── Presets ──────────────────────────────────────────────────────────────

    /// The preset instance for `name`; `None` for `PresetName::Custom`.
    pub fn preset(&self, name: PresetName) -> Option<&Permissions> {
        match name {
            PresetName::Default => Some(&self.default),
            PresetName::Trusted => Some(&self.trusted),
            PresetName::Untrusted => Some(&self.untrusted),
            PresetName::Custom => None,
        }
    }

    /// Mutable access to a preset. The preset's immutable filter is
    /// re-applied when the returned guard is dropped.
    pub fn preset_mut(&mut self, name: PresetName) -> Option<PresetMut<'_>> {
        let perms = match name {
            PresetName::Default => &mut self.default,
            PresetName::Trusted => &mut self.trusted,
            PresetName::Untrusted => &mut self.untrusted,
            PresetName::Custom => return None,
        };
        Some(PresetMut { name, perms })
    }

    pub fn default_preset(&self) -> &Permissions {
        &self.default
    }

    pub fn trusted(&self) -> &Permissions {
        &self.trusted
    }

    pub fn untrusted(&self) -> &Permissions {
        &self.untrusted
    }

    /// Preset instances by name. `Custom` expands to every per-site
    /// capability set in insertion order.
    pub fn get_presets(&self, names: &[PresetName]) -> Vec<&Permissions> {
        let mut presets = Vec::new();
        for &name in names {
            match self.preset(name) {
                Some(perms) => presets.push(perms),
                None => presets.extend(self.sites.values().filter_map(|grant| match grant {
                    SiteGrant::Custom(perms) => Some(perms),
                    _ => None,
                })),
            }
        }
        presets
    }

    /// Re-apply the `TRUSTED` and `UNTRUSTED` immutable filters.
    pub fn enforce_immutable(&mut self) {
        for name in [PresetName::Trusted, PresetName::Untrusted] {
            if let Some(mut preset) = self.preset_mut(name) {
                preset.enforce();
            }
        }
    }

    // ── Flags ────────────────────────────────────────────────────────────────

    pub fn only_secure(&self) -> bool {
        self.only_secure
    }

    /// When on, sites reached over insecure schemes (`http:`, `ftp:`) never
    /// match a grant and get `DEFAULT`.
    pub fn set_only_secure(&mut self, only_secure: bool) {
        self.only_secure = only_secure;
    }

    pub fn sites(&self) -> &Sites<SiteGrant> {
        &self.sites
    }

    /// The capability set a grant stands for.
    pub fn resolve<'a>(&'a self, grant: &'a SiteGrant) -> &'a Permissions {
        match grant {
            SiteGrant::Default => &self.default,
            SiteGrant::Trusted => &self.trusted,
            SiteGrant::TempTrusted => self.trusted.temp_twin(),
            SiteGrant::Untrusted => &self.untrusted,
            SiteGrant::Custom(perms) => perms,
        }
    }

    // ── Mutation ─────────────────────────────────────────────────────────────

    /// Assign `grant` to `site`.
    ///
    /// The site's key and its scheme-agnostic twin are removed first.
    /// `Untrusted` always cascades and is stored under the scheme-agnostic
    /// key. When cascading a bare key (not a URL), every existing key it
    /// covers is removed. `SiteGrant::Default` leaves the site unset.
    pub fn set(&mut self, site: &str, grant: SiteGrant, cascade: bool) -> SetOutcome {
        let ParsedSite { url, site_key } = key::parse(site);
        let mut site_key = key::to_ascii_key(&site_key);
        let mut cascade = cascade;

        self.sites.delete(&site_key);
        let wide_key = key::toggle_secure_domain_key(&site_key, false);
        if matches!(grant, SiteGrant::Untrusted) {
            cascade = true;
            site_key = wide_key;
        } else if wide_key != site_key {
            self.sites.delete(&wide_key);
        }

        if cascade && url.is_none() {
            for covered in self.sites.implied_by(&site_key) {
                debug!(site_key = %site_key, removed = %covered, "cascade removed covered site");
                self.sites.delete(&covered);
            }
        }

        let perms = self.resolve(&grant).clone();
        if matches!(grant, SiteGrant::Default) {
            debug!(site_key = %site_key, "site reset to DEFAULT");
        } else {
            debug!(site_key = %site_key, preset = %grant.preset_name(), "site grant set");
            self.sites.set(&site_key, grant);
        }

        SetOutcome { site_key, perms }
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    /// Resolve the effective capability set for `site`, optionally embedded
    /// in the document at `ctx`.
    pub fn get(&self, site: &str, ctx: Option<&str>) -> Resolution<'_> {
        let skip = self.only_secure && INSECURE_SCHEME_RX.is_match(site);
        let matched = if skip {
            debug!(site = %site, "insecure site skipped in only-secure mode");
            None
        } else {
            self.sites
                .match_site(site)
                .and_then(|k| self.sites.get(k).map(|grant| (k, grant)))
        };

        let Some((site_match, grant)) = matched else {
            return Resolution {
                perms: &self.default,
                site_match: None,
                context_match: None,
            };
        };

        let mut perms = self.resolve(grant);
        let mut context_match = None;
        if let Some(ctx) = ctx {
            let contextual = perms.contextual();
            if let Some(k) = contextual.match_site(ctx) {
                if let Some(contextual_perms) = contextual.get(k) {
                    perms = contextual_perms;
                    context_match = Some(k);
                }
            }
        }

        debug!(
            site = %site,
            site_match = %site_match,
            context_match = ?context_match,
            "site resolved"
        );

        Resolution {
            perms,
            site_match: Some(site_match),
            context_match,
        }
    }

    /// The single decision primitive: may `url` use `capability` when
    /// embedded in `ctx`?
    pub fn can(&self, url: &str, capability: &str, ctx: Option<&str>) -> bool {
        !self.enforced || self.get(url, ctx).perms.allowing(capability)
    }

    /// Narrow `perms` so it never exceeds what the top-level document at
    /// `top_url` is granted.
    ///
    /// Returns `perms` itself when the top document resolves to the very
    /// same instance, otherwise a new set holding the intersection. Neither
    /// input is modified.
    pub fn cascade_restrictions<'a>(
        &'a self,
        perms: &'a Permissions,
        top_url: &str,
    ) -> Cow<'a, Permissions> {
        let top = self.get(top_url, Some(top_url)).perms;
        if std::ptr::eq(top, perms) {
            Cow::Borrowed(perms)
        } else {
            Cow::Owned(perms.restricted_to(top))
        }
    }

    // ── Serialization ────────────────────────────────────────────────────────

    /// The canonical dried form.
    ///
    /// Temporary grants are included only when `include_temp` is set. The
    /// dried presets always satisfy their immutable filters, even if an
    /// in-memory preset was left in an illegal state.
    pub fn dry(&self, include_temp: bool) -> DriedPolicy {
        let mut lists = DriedSiteLists::default();
        let mut temp = Vec::new();

        for (site_key, grant) in self.sites.iter() {
            if !include_temp && grant.is_temp() {
                continue;
            }
            match grant {
                SiteGrant::Trusted => lists.trusted.push(site_key.to_string()),
                SiteGrant::TempTrusted => temp.push(site_key.to_string()),
                SiteGrant::Untrusted => lists.untrusted.push(site_key.to_string()),
                SiteGrant::Default => {}
                SiteGrant::Custom(perms) => {
                    lists.custom.insert(site_key.to_string(), perms.dry());
                }
            }
        }
        if include_temp {
            lists.temp = Some(temp);
        }

        DriedPolicy {
            default: self.default.dry(),
            trusted: dry_filtered(&self.trusted, PresetName::Trusted),
            untrusted: dry_filtered(&self.untrusted, PresetName::Untrusted),
            sites: lists,
            enforced: self.enforced,
            auto_allow_top: self.auto_allow_top,
        }
    }

    /// Apply the immutable filters, then dry. The in-memory presets are
    /// corrected as well as the output.
    pub fn dry_enforced(&mut self, include_temp: bool) -> DriedPolicy {
        self.enforce_immutable();
        self.dry(include_temp)
    }

    /// JSON encoding of `dry(true)`, used for snapshot comparison.
    pub fn snapshot(&self) -> WardenResult<String> {
        self.to_json(true)
    }

    /// True if both policies have the same snapshot.
    pub fn equals(&self, other: &Policy) -> bool {
        match (self.snapshot(), other.snapshot()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    // ── Request keys ─────────────────────────────────────────────────────────

    /// See [`request::request_key`].
    pub fn request_key(url: &str, request_type: &str, document_url: &str, include_path: bool) -> String {
        request::request_key(url, request_type, document_url, include_path)
    }

    /// See [`request::explode_key`].
    pub fn explode_key(request_key: &str) -> WardenResult<ExplodedKey> {
        request::explode_key(request_key)
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Policy {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl CapabilityGate for Policy {
    fn can(&self, url: &str, capability: &str, ctx: Option<&str>) -> bool {
        Policy::can(self, url, capability, ctx)
    }
}

fn dry_filtered(preset: &Permissions, name: PresetName) -> DriedPermissions {
    let filter = name.immutable_filter();
    if filter
        .iter()
        .all(|&(capability, value)| preset.allowing(capability) == value)
    {
        return preset.dry();
    }
    let mut corrected = preset.clone();
    corrected.enforce(filter);
    corrected.dry()
}

// ── Preset guard ──────────────────────────────────────────────────────────────

/// Mutable handle to a preset returned by [`Policy::preset_mut`].
///
/// Dropping the guard is a checkpoint: the preset's immutable filter is
/// re-applied and any correction is logged.
pub struct PresetMut<'a> {
    name: PresetName,
    perms: &'a mut Permissions,
}

impl PresetMut<'_> {
    fn enforce(&mut self) {
        let corrected = self.perms.enforce(self.name.immutable_filter());
        if !corrected.is_empty() {
            warn!(
                preset = %self.name,
                capabilities = ?corrected,
                "immutable preset capabilities restored"
            );
        }
    }
}

impl Deref for PresetMut<'_> {
    type Target = Permissions;

    fn deref(&self) -> &Permissions {
        self.perms
    }
}

impl DerefMut for PresetMut<'_> {
    fn deref_mut(&mut self) -> &mut Permissions {
        self.perms
    }
}

impl Drop for PresetMut<'_> {
    fn drop(&mut self) {
        self.enforce();
    }
}
