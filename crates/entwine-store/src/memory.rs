//! In-Memory Store
//!
//! Reference implementation of the storage seams over `RwLock`-guarded maps.
//! Used by the engine's integration tests and by embedders that do not need
//! durable storage. Presents the same failure surface a relational
//! implementation would: missing groups, parent-membership checks, unique
//! identity binding.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use entwine_core::{EntityId, GroupPath, Provenance};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

use crate::error::{StoreError, StoreResult};
use crate::model::{
    Attribute, AttributeClass, CredentialRequirement, Entity, EntityState, GroupMembership,
    Identity, IdentityKey, ScheduledOperation, StoredAttribute,
};
use crate::traits::{AttributeClassRegistry, AttributeStore, EntityStore, GroupStore};

#[derive(Default)]
struct Inner {
    next_id: i64,
    entities: HashMap<EntityId, Entity>,
    identities: HashMap<IdentityKey, (EntityId, Identity)>,
    groups: BTreeSet<GroupPath>,
    memberships: HashMap<EntityId, Vec<GroupMembership>>,
    attributes: HashMap<(EntityId, GroupPath, String), StoredAttribute>,
    group_classes: HashMap<GroupPath, Vec<String>>,
    entity_classes: HashMap<(EntityId, GroupPath), Vec<String>>,
    classes: HashMap<String, AttributeClass>,
}

/// In-memory implementation of all four storage seams.
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Creates an empty store containing only the root group.
    #[must_use]
    pub fn new() -> Self {
        let mut inner = Inner {
            next_id: 1,
            ..Inner::default()
        };
        inner.groups.insert(GroupPath::root());
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Registers an attribute-class definition.
    pub async fn define_class(&self, class: AttributeClass) {
        let mut inner = self.inner.write().await;
        inner.classes.insert(class.name.clone(), class);
    }

    /// Assigns attribute classes at group level.
    pub async fn set_group_classes<I, S>(&self, group: &GroupPath, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut inner = self.inner.write().await;
        inner
            .group_classes
            .insert(group.clone(), names.into_iter().map(Into::into).collect());
    }

    /// Assigns attribute classes to one entity in one group.
    pub async fn set_entity_classes<I, S>(&self, entity: EntityId, group: &GroupPath, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut inner = self.inner.write().await;
        inner.entity_classes.insert(
            (entity, group.clone()),
            names.into_iter().map(Into::into).collect(),
        );
    }

    /// Snapshot of a stored entity, for assertions and diagnostics.
    pub async fn entity_snapshot(&self, entity: EntityId) -> Option<Entity> {
        self.inner.read().await.entities.get(&entity).cloned()
    }

    /// Whether a group exists.
    pub async fn group_exists(&self, group: &GroupPath) -> bool {
        self.inner.read().await.groups.contains(group)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn require_entity(&self, entity: EntityId) -> StoreResult<()> {
        if self.entities.contains_key(&entity) {
            Ok(())
        } else {
            Err(StoreError::EntityNotFound(entity))
        }
    }

    fn is_member(&self, entity: EntityId, group: &GroupPath) -> bool {
        self.memberships
            .get(&entity)
            .is_some_and(|ms| ms.iter().any(|m| &m.group == group))
    }

    fn grant_membership(
        &mut self,
        entity: EntityId,
        group: &GroupPath,
        provenance: Option<&Provenance>,
    ) {
        self.memberships
            .entry(entity)
            .or_default()
            .push(GroupMembership {
                group: group.clone(),
                entity,
                provenance: provenance.cloned(),
                created_at: Utc::now(),
            });
    }

    fn write_attribute(
        &mut self,
        entity: EntityId,
        attribute: &Attribute,
        provenance: Option<&Provenance>,
    ) {
        self.attributes.insert(
            (entity, attribute.group.clone(), attribute.name.clone()),
            StoredAttribute {
                attribute: attribute.clone(),
                provenance: provenance.cloned(),
            },
        );
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn find_by_identity(
        &self,
        type_id: &str,
        value: &str,
    ) -> StoreResult<Option<EntityId>> {
        let inner = self.inner.read().await;
        let key = IdentityKey {
            type_id: type_id.to_string(),
            value: value.to_string(),
        };
        Ok(inner.identities.get(&key).map(|(id, _)| *id))
    }

    async fn create_entity(
        &self,
        identity: &Identity,
        credential_requirement: &CredentialRequirement,
        initial_state: EntityState,
        root_attributes: &[Attribute],
    ) -> StoreResult<EntityId> {
        let mut inner = self.inner.write().await;
        let key = identity.key();
        if inner.identities.contains_key(&key) {
            return Err(StoreError::IdentityExists {
                type_id: key.type_id,
                value: key.value,
            });
        }

        let id = EntityId::from_raw(inner.next_id);
        inner.next_id += 1;
        inner.entities.insert(
            id,
            Entity {
                id,
                state: initial_state,
                credential_requirement: credential_requirement.clone(),
                scheduled_change: None,
            },
        );
        inner.identities.insert(key, (id, identity.clone()));

        // Every entity is a member of the root group from birth.
        inner.grant_membership(id, &GroupPath::root(), None);
        for attribute in root_attributes {
            inner.write_attribute(id, attribute, identity.provenance.as_ref());
        }

        Ok(id)
    }

    async fn add_identity(&self, entity: EntityId, identity: &Identity) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.require_entity(entity)?;
        let key = identity.key();
        if inner.identities.contains_key(&key) {
            return Err(StoreError::IdentityExists {
                type_id: key.type_id,
                value: key.value,
            });
        }
        inner.identities.insert(key, (entity, identity.clone()));
        Ok(())
    }

    async fn remove_identity(
        &self,
        entity: EntityId,
        type_id: &str,
        value: &str,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let key = IdentityKey {
            type_id: type_id.to_string(),
            value: value.to_string(),
        };
        let owner = inner.identities.get(&key).map(|(owner, _)| *owner);
        match owner {
            Some(owner) if owner == entity => {
                inner.identities.remove(&key);
                Ok(())
            }
            _ => Err(StoreError::IdentityNotFound {
                type_id: key.type_id,
                value: key.value,
            }),
        }
    }

    async fn identities_of(&self, entity: EntityId) -> StoreResult<Vec<Identity>> {
        let inner = self.inner.read().await;
        inner.require_entity(entity)?;
        Ok(inner
            .identities
            .values()
            .filter(|(owner, _)| *owner == entity)
            .map(|(_, identity)| identity.clone())
            .collect())
    }

    async fn schedule_change(
        &self,
        entity: EntityId,
        time: DateTime<Utc>,
        operation: Option<ScheduledOperation>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner
            .entities
            .get_mut(&entity)
            .ok_or(StoreError::EntityNotFound(entity))?;
        record.scheduled_change = operation.map(|op| (time, op));
        Ok(())
    }
}

#[async_trait]
impl GroupStore for MemoryStore {
    async fn memberships_of(&self, entity: EntityId) -> StoreResult<Vec<GroupMembership>> {
        let inner = self.inner.read().await;
        inner.require_entity(entity)?;
        Ok(inner.memberships.get(&entity).cloned().unwrap_or_default())
    }

    async fn add_membership_from_parent(
        &self,
        group: &GroupPath,
        entity: EntityId,
        attributes: &[Attribute],
        provenance: Option<&Provenance>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.require_entity(entity)?;
        if !inner.groups.contains(group) {
            return Err(StoreError::GroupMissing(group.clone()));
        }
        if let Some(parent) = group.parent() {
            if !inner.is_member(entity, &parent) {
                return Err(StoreError::NotMemberOfParent {
                    group: group.clone(),
                    entity,
                });
            }
        }
        if !inner.is_member(entity, group) {
            inner.grant_membership(entity, group, provenance);
        }
        for attribute in attributes {
            inner.write_attribute(entity, attribute, provenance);
        }
        Ok(())
    }

    async fn create_group(&self, group: &GroupPath) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if let Some(parent) = group.parent() {
            if !inner.groups.contains(&parent) {
                return Err(StoreError::GroupMissing(parent));
            }
        }
        inner.groups.insert(group.clone());
        Ok(())
    }

    async fn remove_membership(&self, group: &GroupPath, entity: EntityId) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.require_entity(entity)?;
        if let Some(ms) = inner.memberships.get_mut(&entity) {
            ms.retain(|m| &m.group != group);
        }
        Ok(())
    }
}

#[async_trait]
impl AttributeStore for MemoryStore {
    async fn attributes_of(&self, entity: EntityId) -> StoreResult<Vec<StoredAttribute>> {
        let inner = self.inner.read().await;
        inner.require_entity(entity)?;
        Ok(inner
            .attributes
            .iter()
            .filter(|((owner, _, _), _)| *owner == entity)
            .map(|(_, stored)| stored.clone())
            .collect())
    }

    async fn upsert(
        &self,
        entity: EntityId,
        attribute: &Attribute,
        provenance: Option<&Provenance>,
        allow_update: bool,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.require_entity(entity)?;
        let key = (entity, attribute.group.clone(), attribute.name.clone());
        if !allow_update && inner.attributes.contains_key(&key) {
            return Err(StoreError::Backend(format!(
                "attribute already exists: {} in {}",
                attribute.name, attribute.group
            )));
        }
        inner.write_attribute(entity, attribute, provenance);
        Ok(())
    }

    async fn remove(&self, entity: EntityId, group: &GroupPath, name: &str) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        inner.require_entity(entity)?;
        let key = (entity, group.clone(), name.to_string());
        if inner.attributes.remove(&key).is_none() {
            return Err(StoreError::AttributeNotFound {
                name: name.to_string(),
                group: group.clone(),
            });
        }
        Ok(())
    }

    async fn assigned_classes(
        &self,
        entity: EntityId,
        group: &GroupPath,
    ) -> StoreResult<Vec<String>> {
        let inner = self.inner.read().await;
        let mut names: Vec<String> = inner.group_classes.get(group).cloned().unwrap_or_default();
        if let Some(extra) = inner.entity_classes.get(&(entity, group.clone())) {
            for name in extra {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
        }
        Ok(names)
    }
}

#[async_trait]
impl AttributeClassRegistry for MemoryStore {
    async fn resolve(&self, names: &[String]) -> StoreResult<HashMap<String, AttributeClass>> {
        let inner = self.inner.read().await;
        let mut resolved: HashMap<String, AttributeClass> = HashMap::new();
        let mut queue: Vec<String> = names.to_vec();
        while let Some(name) = queue.pop() {
            if resolved.contains_key(&name) {
                continue;
            }
            let class = inner
                .classes
                .get(&name)
                .ok_or_else(|| StoreError::UnknownClass(name.clone()))?;
            queue.extend(class.parents.iter().cloned());
            resolved.insert(name, class.clone());
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(value: &str) -> Identity {
        Identity::federated("email", value, Provenance::new("idpX", "profileX"))
    }

    async fn store_with_entity() -> (MemoryStore, EntityId) {
        let store = MemoryStore::new();
        let id = store
            .create_entity(
                &email("a@x.org"),
                &CredentialRequirement::new("password"),
                EntityState::Valid,
                &[],
            )
            .await
            .unwrap();
        (store, id)
    }

    #[tokio::test]
    async fn test_create_entity_binds_identity_and_root_membership() {
        let (store, id) = store_with_entity().await;

        let found = store.find_by_identity("email", "a@x.org").await.unwrap();
        assert_eq!(found, Some(id));

        let memberships = store.memberships_of(id).await.unwrap();
        assert_eq!(memberships.len(), 1);
        assert!(memberships[0].group.is_root());
    }

    #[tokio::test]
    async fn test_find_unknown_identity_is_none_not_error() {
        let store = MemoryStore::new();
        let found = store.find_by_identity("email", "nobody@x.org").await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_identity_rejected() {
        let (store, id) = store_with_entity().await;
        let err = store.add_identity(id, &email("a@x.org")).await.unwrap_err();
        assert!(matches!(err, StoreError::IdentityExists { .. }));
    }

    #[tokio::test]
    async fn test_membership_requires_existing_group() {
        let (store, id) = store_with_entity().await;
        let staff: GroupPath = "/staff".parse().unwrap();
        let err = store
            .add_membership_from_parent(&staff, id, &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::GroupMissing(_)));
    }

    #[tokio::test]
    async fn test_membership_requires_parent_membership() {
        let (store, id) = store_with_entity().await;
        let staff: GroupPath = "/staff".parse().unwrap();
        let admins: GroupPath = "/staff/admins".parse().unwrap();
        store.create_group(&staff).await.unwrap();
        store.create_group(&admins).await.unwrap();

        let err = store
            .add_membership_from_parent(&admins, id, &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotMemberOfParent { .. }));

        store
            .add_membership_from_parent(&staff, id, &[], None)
            .await
            .unwrap();
        store
            .add_membership_from_parent(&admins, id, &[], None)
            .await
            .unwrap();
        assert_eq!(store.memberships_of(id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_create_group_requires_parent() {
        let store = MemoryStore::new();
        let deep: GroupPath = "/a/b".parse().unwrap();
        let err = store.create_group(&deep).await.unwrap_err();
        assert!(matches!(err, StoreError::GroupMissing(_)));
    }

    #[tokio::test]
    async fn test_upsert_without_allow_update_rejects_existing() {
        let (store, id) = store_with_entity().await;
        let attr = Attribute::new(
            "givenName",
            GroupPath::root(),
            vec![serde_json::json!("Ann")],
        );
        store.upsert(id, &attr, None, false).await.unwrap();
        let err = store.upsert(id, &attr, None, false).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        store.upsert(id, &attr, None, true).await.unwrap();
    }

    #[tokio::test]
    async fn test_schedule_change_set_and_clear() {
        let (store, id) = store_with_entity().await;
        let when = Utc::now();
        store
            .schedule_change(id, when, Some(ScheduledOperation::Remove))
            .await
            .unwrap();
        let entity = store.entity_snapshot(id).await.unwrap();
        assert_eq!(entity.scheduled_change, Some((when, ScheduledOperation::Remove)));

        store.schedule_change(id, when, None).await.unwrap();
        let entity = store.entity_snapshot(id).await.unwrap();
        assert!(entity.scheduled_change.is_none());
    }

    #[tokio::test]
    async fn test_resolve_follows_parents_and_rejects_unknown() {
        let store = MemoryStore::new();
        store
            .define_class(AttributeClass::new("base").with_allowed(["cn"]))
            .await;
        store
            .define_class(AttributeClass::new("staff").with_parents(["base"]))
            .await;

        let resolved = store.resolve(&["staff".to_string()]).await.unwrap();
        assert_eq!(resolved.len(), 2);
        assert!(resolved.contains_key("base"));

        let err = store.resolve(&["ghost".to_string()]).await.unwrap_err();
        assert!(matches!(err, StoreError::UnknownClass(_)));
    }
}
