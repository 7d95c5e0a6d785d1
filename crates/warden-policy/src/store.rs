//! In-memory implementation of `PolicyStore`.
//!
//! `InMemoryPolicyStore` keeps the last saved dried policy behind a
//! `Mutex`. Hosts with real storage implement `PolicyStore` themselves; this
//! one backs tests and single-process tools.

use std::sync::Mutex;

use tracing::info;

use warden_contracts::{DriedPolicy, PolicyStore, WardenError, WardenResult};

#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    state: Mutex<StoreState>,
}

#[derive(Debug, Default)]
struct StoreState {
    saved: Option<DriedPolicy>,
    saves: u64,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `policy`.
    pub fn with_policy(policy: DriedPolicy) -> Self {
        Self {
            state: Mutex::new(StoreState {
                saved: Some(policy),
                saves: 0,
            }),
        }
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> u64 {
        self.state.lock().map(|s| s.saves).unwrap_or_default()
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn load(&self) -> WardenResult<Option<DriedPolicy>> {
        let state = self.state.lock().map_err(|e| WardenError::StoreError {
            reason: format!("store state lock poisoned: {}", e),
        })?;
        Ok(state.saved.clone())
    }

    fn save(&self, policy: &DriedPolicy) -> WardenResult<()> {
        let mut state = self.state.lock().map_err(|e| WardenError::StoreError {
            reason: format!("store state lock poisoned: {}", e),
        })?;
        state.saved = Some(policy.clone());
        state.saves += 1;

        info!(
            saves = state.saves,
            sites = policy.sites.trusted.len()
                + policy.sites.untrusted.len()
                + policy.sites.custom.len(),
            "policy saved"
        );
        Ok(())
    }
}
