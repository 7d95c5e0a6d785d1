//! A lock-guarded policy for multi-threaded hosts.
//!
//! `Policy::set` performs several dependent writes (twin-key removal,
//! cascade removal, insertion) that must appear atomic. `SharedPolicy`
//! serializes every mutation behind the write half of an `RwLock`; queries
//! share the read half and may run concurrently with each other.

use std::sync::RwLock;

use tracing::error;

use warden_contracts::{
    CapabilityGate, DriedPolicy, PolicyStore, WardenError, WardenResult,
};

use crate::{
    policy::{Policy, SetOutcome},
    preset::SiteGrant,
};

#[derive(Debug, Default)]
pub struct SharedPolicy {
    inner: RwLock<Policy>,
}

impl SharedPolicy {
    pub fn new(policy: Policy) -> Self {
        Self {
            inner: RwLock::new(policy),
        }
    }

    /// Run `f` with shared access to the policy.
    pub fn with_policy<R>(&self, f: impl FnOnce(&Policy) -> R) -> WardenResult<R> {
        let policy = self.inner.read().map_err(|e| WardenError::LockPoisoned {
            reason: e.to_string(),
        })?;
        Ok(f(&policy))
    }

    /// Run `f` with exclusive access to the policy.
    pub fn with_policy_mut<R>(&self, f: impl FnOnce(&mut Policy) -> R) -> WardenResult<R> {
        let mut policy = self.inner.write().map_err(|e| WardenError::LockPoisoned {
            reason: e.to_string(),
        })?;
        Ok(f(&mut policy))
    }

    /// [`Policy::set`] under the write lock.
    pub fn set(&self, site: &str, grant: SiteGrant, cascade: bool) -> WardenResult<SetOutcome> {
        self.with_policy_mut(|policy| policy.set(site, grant, cascade))
    }

    /// [`Policy::hydrate_into`] under the write lock.
    pub fn hydrate(&self, dry: &DriedPolicy) -> WardenResult<()> {
        self.with_policy_mut(|policy| policy.hydrate_into(dry))
    }

    pub fn dry(&self, include_temp: bool) -> WardenResult<DriedPolicy> {
        self.with_policy(|policy| policy.dry(include_temp))
    }

    /// Replace the policy with the one saved in `store`, if any. Returns
    /// whether anything was loaded.
    pub fn load_from(&self, store: &dyn PolicyStore) -> WardenResult<bool> {
        match store.load()? {
            Some(dry) => {
                self.hydrate(&dry)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Save the persistent part of the policy (temporary grants excluded).
    pub fn save_to(&self, store: &dyn PolicyStore) -> WardenResult<()> {
        let dry = self.with_policy_mut(|policy| policy.dry_enforced(false))?;
        store.save(&dry)
    }

    pub fn into_inner(self) -> WardenResult<Policy> {
        self.inner.into_inner().map_err(|e| WardenError::LockPoisoned {
            reason: e.to_string(),
        })
    }
}

impl CapabilityGate for SharedPolicy {
    /// Blocks when the lock is poisoned.
    fn can(&self, url: &str, capability: &str, ctx: Option<&str>) -> bool {
        match self.with_policy(|policy| policy.can(url, capability, ctx)) {
            Ok(allowed) => allowed,
            Err(e) => {
                error!(url = %url, capability = %capability, "shared policy unavailable: {e}");
                false
            }
        }
    }
}
