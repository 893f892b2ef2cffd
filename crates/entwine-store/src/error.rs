//! Storage Error Taxonomy
//!
//! Failures surfaced by the storage seams. Existence probes are not errors:
//! `EntityStore::find_by_identity` returns `Ok(None)` for an unknown
//! identity. The distinguished variants here are the ones the engine
//! branches on (`GroupMissing`, `NotMemberOfParent`); everything else aborts
//! the enclosing reconciliation and rolls back the ambient transaction.

use entwine_core::{EntityId, GroupPath};
use thiserror::Error;

/// Errors raised by storage collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity does not exist.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Group does not exist.
    ///
    /// The hierarchy reconciler matches on this to apply the per-group
    /// missing-group policy (create / require / ignore).
    #[error("Group does not exist: {0}")]
    GroupMissing(GroupPath),

    /// Membership add rejected because the entity is not a member of the
    /// group's immediate parent.
    #[error("Entity {entity} is not a member of the parent of {group}")]
    NotMemberOfParent {
        /// Group whose membership was requested.
        group: GroupPath,
        /// Entity that lacks parent membership.
        entity: EntityId,
    },

    /// An identity value is already bound to some entity.
    #[error("Identity already exists: {type_id}:{value}")]
    IdentityExists {
        /// Identity type name.
        type_id: String,
        /// Identity value.
        value: String,
    },

    /// Identity does not exist.
    #[error("Identity not found: {type_id}:{value}")]
    IdentityNotFound {
        /// Identity type name.
        type_id: String,
        /// Identity value.
        value: String,
    },

    /// Attribute does not exist.
    #[error("Attribute not found: {name} in {group}")]
    AttributeNotFound {
        /// Attribute name.
        name: String,
        /// Owning group.
        group: GroupPath,
    },

    /// Attribute class referenced but not defined in the registry.
    #[error("Unknown attribute class: {0}")]
    UnknownClass(String),

    /// Backend failure (connection, constraint, serialization).
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;
