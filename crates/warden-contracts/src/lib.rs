//! # warden-contracts
//!
//! Shared types, dried shapes, and collaborator contracts for the warden
//! site policy engine.
//!
//! All crates in the workspace import from here. No decision logic lives in
//! this crate, only data definitions, error types and traits.

pub mod capability;
pub mod dried;
pub mod error;
pub mod traits;

pub use capability::Capability;
pub use dried::{DriedPermissions, DriedPolicy, DriedSiteLists, DriedSites};
pub use error::{WardenError, WardenResult};
pub use traits::{CapabilityGate, PolicyStore};
