//! entwine Storage Layer
//!
//! Persisted data model and storage seams for the reconciliation engine.
//!
//! The engine never talks to a database directly; it drives the four traits
//! in [`traits`]. A relational implementation lives outside this workspace.
//! [`MemoryStore`] is the in-process reference implementation used by tests
//! and by embedders that do not need durable storage.
//!
//! # Modules
//!
//! - [`model`] - Persisted types (`Entity`, `Identity`, `Attribute`, ...)
//! - [`traits`] - Storage collaborator contracts
//! - [`error`] - `StoreError` taxonomy
//! - [`memory`] - In-memory reference implementation

pub mod error;
pub mod memory;
pub mod model;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use model::{
    Attribute, AttributeClass, AttributeVisibility, CredentialRequirement, Entity, EntityState,
    GroupMembership, Identity, IdentityKey, ScheduledOperation, StoredAttribute,
};
pub use traits::{AttributeClassRegistry, AttributeStore, EntityStore, GroupStore};
