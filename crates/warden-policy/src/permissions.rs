//! Capability sets.
//!
//! A `Permissions` value bundles the capabilities granted to a site with a
//! `temp` flag (session-only grants) and a nested Site Key Space of
//! contextual overrides, consulted when the resource is embedded by a
//! matching parent site.
//!
//! The contextual space is shared between a value and its clones through an
//! `Arc`. Writes go through [`Permissions::contextual_mut`], which copies on
//! write, so a clone never observes edits made to another copy.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use warden_contracts::{Capability, DriedPermissions};
use warden_sites::Sites;

/// The set of capabilities granted to a site.
pub struct Permissions {
    capabilities: BTreeSet<Capability>,

    /// Session-only grant; skipped by `Policy::dry(false)`.
    pub temp: bool,

    contextual: Arc<Sites<Permissions>>,

    /// Lazily built temporary twin. Cleared by every mutation.
    temp_twin: OnceCell<Box<Permissions>>,
}

impl Permissions {
    /// A capability set holding `capabilities`, with no contextual overrides.
    pub fn new<I, C>(capabilities: I, temp: bool) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Capability>,
    {
        Self::with_contextual(capabilities, temp, Sites::new())
    }

    pub fn with_contextual<I, C>(capabilities: I, temp: bool, contextual: Sites<Permissions>) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Capability>,
    {
        Self {
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            temp,
            contextual: Arc::new(contextual),
            temp_twin: OnceCell::new(),
        }
    }

    /// An empty, non-temporary capability set.
    pub fn empty() -> Self {
        Self::new(std::iter::empty::<Capability>(), false)
    }

    /// Return true if `capability` is granted.
    pub fn allowing(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }

    /// Grant (`enabled = true`) or revoke `capability` in place and return
    /// the resulting state.
    ///
    /// Tags outside the known vocabulary are stored verbatim.
    pub fn set(&mut self, capability: impl Into<Capability>, enabled: bool) -> bool {
        let capability = capability.into();
        if enabled {
            self.capabilities.insert(capability);
        } else {
            self.capabilities.remove(&capability);
        }
        self.temp_twin.take();
        enabled
    }

    pub fn capabilities(&self) -> &BTreeSet<Capability> {
        &self.capabilities
    }

    /// True if both sets grant exactly the same capabilities. `temp` and
    /// `contextual` are not compared.
    pub fn same_as(&self, other: &Permissions) -> bool {
        self.capabilities == other.capabilities
    }

    pub fn contextual(&self) -> &Sites<Permissions> {
        &self.contextual
    }

    /// Mutable access to the contextual overrides. Copies the space first
    /// if it is shared with a clone.
    pub fn contextual_mut(&mut self) -> &mut Sites<Permissions> {
        self.temp_twin.take();
        Arc::make_mut(&mut self.contextual)
    }

    /// True if `other` shares this value's contextual space.
    pub fn shares_contextual(&self, other: &Permissions) -> bool {
        Arc::ptr_eq(&self.contextual, &other.contextual)
    }

    /// The temporary twin: same capabilities and contextual space, with
    /// `temp = true`.
    ///
    /// Built on first access and then returned by reference until `self` is
    /// mutated, so repeated calls yield the same instance.
    pub fn temp_twin(&self) -> &Permissions {
        self.temp_twin.get_or_init(|| {
            Box::new(Permissions {
                capabilities: self.capabilities.clone(),
                temp: true,
                contextual: Arc::clone(&self.contextual),
                temp_twin: OnceCell::new(),
            })
        })
    }

    /// A new set granting only the capabilities present in both `self` and
    /// `ceiling`. Keeps `self.temp` and shares `self`'s contextual space.
    pub fn restricted_to(&self, ceiling: &Permissions) -> Permissions {
        Permissions {
            capabilities: self
                .capabilities
                .intersection(&ceiling.capabilities)
                .cloned()
                .collect(),
            temp: self.temp,
            contextual: Arc::clone(&self.contextual),
            temp_twin: OnceCell::new(),
        }
    }

    /// Force each capability in `filter` to its fixed value. Returns the
    /// capabilities whose state had to be corrected.
    pub fn enforce(&mut self, filter: &[(&str, bool)]) -> Vec<String> {
        let mut corrected = Vec::new();
        for &(capability, value) in filter {
            if self.allowing(capability) != value {
                self.set(capability, value);
                corrected.push(capability.to_string());
            }
        }
        corrected
    }

    /// Builds a namespaced sub-type tag; see [`Capability::typed`].
    pub fn typed(capability: &str, kind: &str) -> String {
        Capability::typed(capability, kind)
    }

    pub fn dry(&self) -> DriedPermissions {
        let contextual = if self.contextual.is_empty() {
            None
        } else {
            Some(self.contextual.dry_with(Permissions::dry))
        };
        DriedPermissions {
            capabilities: self.capabilities.iter().cloned().collect(),
            contextual,
            temp: self.temp,
        }
    }

    pub fn hydrate(dry: &DriedPermissions) -> Self {
        Self {
            capabilities: dry.capabilities.iter().cloned().collect(),
            temp: dry.temp,
            contextual: Arc::new(Self::hydrate_contextual(dry)),
            temp_twin: OnceCell::new(),
        }
    }

    /// Overwrite `self` from `dry`, keeping the instance itself. The cached
    /// temporary twin is discarded.
    pub fn hydrate_into(&mut self, dry: &DriedPermissions) {
        self.capabilities = dry.capabilities.iter().cloned().collect();
        self.temp = dry.temp;
        self.contextual = Arc::new(Self::hydrate_contextual(dry));
        self.temp_twin.take();
    }

    fn hydrate_contextual(dry: &DriedPermissions) -> Sites<Permissions> {
        match &dry.contextual {
            Some(contextual) => Sites::hydrate_with(contextual, Permissions::hydrate),
            None => Sites::new(),
        }
    }
}

/// A new instance with a copy of the capabilities, the same `temp` flag and
/// the same (shared) contextual space. The twin cache is not carried over.
impl Clone for Permissions {
    fn clone(&self) -> Self {
        Self {
            capabilities: self.capabilities.clone(),
            temp: self.temp,
            contextual: Arc::clone(&self.contextual),
            temp_twin: OnceCell::new(),
        }
    }
}

/// Equality is capability membership only, as [`Permissions::same_as`].
impl PartialEq for Permissions {
    fn eq(&self, other: &Self) -> bool {
        self.same_as(other)
    }
}

impl Default for Permissions {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Permissions")
            .field("capabilities", &self.capabilities)
            .field("temp", &self.temp)
            .field("contextual", &self.contextual)
            .finish()
    }
}
