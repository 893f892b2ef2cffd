//! Storage Collaborator Contracts
//!
//! The seams the reconciliation engine drives. Implementations are expected
//! to run inside one ambient transaction per engine invocation; the engine
//! assumes writes either succeed or raise a [`StoreError`] and performs no
//! retries of its own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entwine_core::{EntityId, GroupPath, Provenance};
use std::collections::HashMap;

use crate::error::StoreResult;
use crate::model::{
    Attribute, AttributeClass, CredentialRequirement, EntityState, GroupMembership, Identity,
    ScheduledOperation, StoredAttribute,
};

/// Storage of entities and their identities.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Look up the entity a given identity value is bound to.
    ///
    /// Returns `Ok(None)` when the identity is unknown; that is a normal
    /// branch for existence probing, not a failure.
    async fn find_by_identity(&self, type_id: &str, value: &str)
        -> StoreResult<Option<EntityId>>;

    /// Create a new entity from its first identity.
    ///
    /// The store assigns the id, binds `identity`, applies `root_attributes`
    /// at the root group, and establishes root-group membership.
    async fn create_entity(
        &self,
        identity: &Identity,
        credential_requirement: &CredentialRequirement,
        initial_state: EntityState,
        root_attributes: &[Attribute],
    ) -> StoreResult<EntityId>;

    /// Bind an additional identity to an existing entity.
    async fn add_identity(&self, entity: EntityId, identity: &Identity) -> StoreResult<()>;

    /// Unbind an identity from its entity.
    async fn remove_identity(&self, entity: EntityId, type_id: &str, value: &str)
        -> StoreResult<()>;

    /// All identities currently bound to an entity, with provenance.
    async fn identities_of(&self, entity: EntityId) -> StoreResult<Vec<Identity>>;

    /// Set or clear a scheduled lifecycle operation.
    ///
    /// `None` clears any pending schedule.
    async fn schedule_change(
        &self,
        entity: EntityId,
        time: DateTime<Utc>,
        operation: Option<ScheduledOperation>,
    ) -> StoreResult<()>;
}

/// Storage of groups and group memberships.
#[async_trait]
pub trait GroupStore: Send + Sync {
    /// All memberships of an entity, with provenance.
    async fn memberships_of(&self, entity: EntityId) -> StoreResult<Vec<GroupMembership>>;

    /// Add a membership, requiring membership in the group's immediate
    /// parent, and attach `attributes` scoped to that group.
    ///
    /// # Errors
    ///
    /// - [`StoreError::GroupMissing`] when `group` does not exist
    /// - [`StoreError::NotMemberOfParent`] when the entity is not a member
    ///   of the group's parent
    ///
    /// [`StoreError::GroupMissing`]: crate::error::StoreError::GroupMissing
    /// [`StoreError::NotMemberOfParent`]: crate::error::StoreError::NotMemberOfParent
    async fn add_membership_from_parent(
        &self,
        group: &GroupPath,
        entity: EntityId,
        attributes: &[Attribute],
        provenance: Option<&Provenance>,
    ) -> StoreResult<()>;

    /// Create a group. The parent must already exist.
    async fn create_group(&self, group: &GroupPath) -> StoreResult<()>;

    /// Remove an entity's membership in a group.
    async fn remove_membership(&self, group: &GroupPath, entity: EntityId) -> StoreResult<()>;
}

/// Storage of entity attributes.
#[async_trait]
pub trait AttributeStore: Send + Sync {
    /// All attributes of an entity, with provenance, keyed by
    /// `(group, name)`.
    async fn attributes_of(&self, entity: EntityId) -> StoreResult<Vec<StoredAttribute>>;

    /// Write an attribute.
    ///
    /// With `allow_update` false the write fails if an attribute with the
    /// same `(group, name)` key already exists.
    async fn upsert(
        &self,
        entity: EntityId,
        attribute: &Attribute,
        provenance: Option<&Provenance>,
        allow_update: bool,
    ) -> StoreResult<()>;

    /// Remove an attribute by its `(group, name)` key.
    async fn remove(&self, entity: EntityId, group: &GroupPath, name: &str) -> StoreResult<()>;

    /// Names of the attribute classes in force for an entity in a group
    /// (union of group-level and entity-level assignment).
    async fn assigned_classes(&self, entity: EntityId, group: &GroupPath)
        -> StoreResult<Vec<String>>;
}

/// Registry of attribute-class definitions.
#[async_trait]
pub trait AttributeClassRegistry: Send + Sync {
    /// Resolve the named classes plus their transitive parents.
    ///
    /// The returned map must contain every class reachable through parent
    /// links from `names`; a dangling parent reference is a
    /// [`StoreError::UnknownClass`] failure.
    ///
    /// [`StoreError::UnknownClass`]: crate::error::StoreError::UnknownClass
    async fn resolve(&self, names: &[String]) -> StoreResult<HashMap<String, AttributeClass>>;
}
