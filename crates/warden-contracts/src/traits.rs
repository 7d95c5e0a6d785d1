//! Collaborator contracts.
//!
//! - `CapabilityGate`: the single decision primitive enforcement layers
//!   consume (network interception, DOM filtering, …)
//! - `PolicyStore`: the persistence collaborator that loads and saves
//!   dried policies
//!
//! Neither enforcement nor storage I/O lives in the core; these traits are
//! the seam through which a host plugs them in.

use crate::{dried::DriedPolicy, error::WardenResult};

/// Answers "may `url` use `capability` when embedded in `ctx`?".
///
/// Implementations must be cheap and must not fail: anything that cannot be
/// matched degrades to the policy's fallback preset.
pub trait CapabilityGate: Send + Sync {
    /// Return true if the resource at `url` is permitted `capability`.
    ///
    /// `ctx` is the site of the embedding document, used to apply
    /// contextual overrides.
    fn can(&self, url: &str, capability: &str, ctx: Option<&str>) -> bool;
}

/// Loads and saves dried policies.
///
/// A load may observe a stale or partially written value; hydration of the
/// returned `DriedPolicy` tolerates missing fields.
pub trait PolicyStore: Send + Sync {
    /// Return the last saved policy, or `None` if nothing was saved yet.
    fn load(&self) -> WardenResult<Option<DriedPolicy>>;

    /// Persist `policy`, replacing any previously saved value.
    fn save(&self, policy: &DriedPolicy) -> WardenResult<()>;
}
