//! Reconciliation Error Taxonomy
//!
//! Every variant except the storage passthrough is a mapping abort: the
//! enclosing `process`/`merge_with_existing` call stops at the first one and
//! the ambient transaction is expected to roll back. Stale-cleanup removal
//! failures never surface here; they are logged at the point of occurrence
//! and reconciliation continues.

use entwine_core::{EntityId, GroupPath};
use entwine_store::StoreError;
use thiserror::Error;

/// Errors that abort a reconciliation run.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Two mapped identities resolved to different existing entities.
    #[error("Mapped identities resolve to different entities: {first} and {second}")]
    AmbiguousIdentity {
        /// Entity the earlier identity resolved to.
        first: EntityId,
        /// Entity the conflicting identity resolved to.
        second: EntityId,
    },

    /// An identity with mode `RequireMatch` was not found.
    #[error("Required identity match failed: {type_id}:{value}")]
    RequireMatchViolated {
        /// Identity type name.
        type_id: String,
        /// Identity value.
        value: String,
    },

    /// Identities were mapped, but none matched and none may be created.
    #[error("No identity of the mapping could be matched or created")]
    NoIdentities,

    /// `merge_with_existing` was given a mapping with nothing to attach.
    #[error("Mapping contains no new identities to merge")]
    NothingToMerge,

    /// A group with mode `RequireExistingGroup` does not exist.
    #[error("Required group does not exist: {0}")]
    GroupRequired(GroupPath),

    /// A mapped attribute is not admitted by the attribute classes in force.
    #[error("Attribute {name} is not allowed in group {group}")]
    AttributeNotAllowed {
        /// Attribute name.
        name: String,
        /// Group the attribute targeted.
        group: GroupPath,
    },

    /// Attribute-class parent references form a cycle.
    #[error("Attribute class parent cycle involving: {0}")]
    ClassCycle(String),

    /// Storage collaborator failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for reconciliation operations.
pub type ReconcileResult<T> = Result<T, ReconcileError>;
