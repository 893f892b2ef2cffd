//! Reconciliation Engine Tests
//!
//! End-to-end coverage of `ReconciliationEngine` over the in-memory store:
//! - First-login provisioning (identity + root attribute + group)
//! - Idempotence of repeated processing
//! - Ambiguous-principal abort
//! - Attribute effect modes (`create_only`, `create_or_update`, `update_only`)
//! - Hierarchical group creation and the missing-group policies
//! - Provenance-scoped stale cleanup for identities, memberships, attributes
//! - Merge-with-existing never deletes

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::json;

use entwine_core::{EntityId, GroupPath, Provenance};
use entwine_reconcile::{
    AttributeEffectMode, GroupEffectMode, IdentityEffectMode, MappedAttribute, MappedGroup,
    MappedIdentity, MappingResult, ReconcileError, ReconciliationEngine,
};
use entwine_store::model::{Attribute, AttributeClass, CredentialRequirement, Identity};
use entwine_store::{AttributeStore, EntityStore, GroupStore, MemoryStore};

// =============================================================================
// Helpers
// =============================================================================

fn source_x() -> Provenance {
    Provenance::new("idpX", "profileX")
}

fn source_y() -> Provenance {
    Provenance::new("idpY", "profileY")
}

fn engine_over(store: &Arc<MemoryStore>) -> ReconciliationEngine {
    ReconciliationEngine::new(store.clone(), store.clone(), store.clone(), store.clone())
}

fn email(value: &str, provenance: &Provenance) -> MappedIdentity {
    MappedIdentity::new(
        Identity::federated("email", value, provenance.clone()),
        CredentialRequirement::new("password"),
    )
}

fn attribute(name: &str, group: &str, value: &str, provenance: &Provenance) -> MappedAttribute {
    MappedAttribute::new(
        Attribute::new(name, group.parse().unwrap(), vec![json!(value)]),
        Some(provenance.clone()),
    )
}

fn group(path: &str, provenance: &Provenance) -> MappedGroup {
    MappedGroup::new(path.parse().unwrap(), Some(provenance.clone()))
}

fn path(s: &str) -> GroupPath {
    s.parse().unwrap()
}

async fn membership_paths(store: &MemoryStore, entity: EntityId) -> BTreeSet<String> {
    store
        .memberships_of(entity)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.group.as_str().to_string())
        .collect()
}

async fn attribute_values(
    store: &MemoryStore,
    entity: EntityId,
    group: &str,
    name: &str,
) -> Option<Vec<serde_json::Value>> {
    store
        .attributes_of(entity)
        .await
        .unwrap()
        .into_iter()
        .find(|s| s.attribute.group.as_str() == group && s.attribute.name == name)
        .map(|s| s.attribute.values)
}

// =============================================================================
// First login and idempotence
// =============================================================================

#[tokio::test]
async fn test_first_login_creates_entity_attribute_and_group() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);

    let mut result = MappingResult::new()
        .with_identity(email("a@x.org", &source_x()))
        .with_attribute(attribute("givenName", "/", "Ann", &source_x()))
        .with_group(group("/staff", &source_x()).with_mode(GroupEffectMode::CreateGroupIfMissing));

    engine.process(&mut result).await.unwrap();
    let entity = result.mapped_at_existing_entity.expect("entity created");

    assert_eq!(
        store.find_by_identity("email", "a@x.org").await.unwrap(),
        Some(entity)
    );
    assert_eq!(
        attribute_values(&store, entity, "/", "givenName").await,
        Some(vec![json!("Ann")])
    );
    assert!(store.group_exists(&path("/staff")).await);
    assert!(membership_paths(&store, entity).await.contains("/staff"));
}

#[tokio::test]
async fn test_processing_twice_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);

    let mapping = || {
        MappingResult::new()
            .with_identity(email("a@x.org", &source_x()))
            .with_attribute(attribute("givenName", "/", "Ann", &source_x()))
            .with_group(
                group("/staff", &source_x()).with_mode(GroupEffectMode::CreateGroupIfMissing),
            )
    };

    let mut first = mapping();
    engine.process(&mut first).await.unwrap();
    let entity = first.mapped_at_existing_entity.unwrap();

    let identities_before = store.identities_of(entity).await.unwrap().len();
    let memberships_before = membership_paths(&store, entity).await;
    let attributes_before = store.attributes_of(entity).await.unwrap().len();

    let mut second = mapping();
    engine.process(&mut second).await.unwrap();

    assert_eq!(second.mapped_at_existing_entity, Some(entity));
    assert_eq!(
        store.identities_of(entity).await.unwrap().len(),
        identities_before
    );
    assert_eq!(membership_paths(&store, entity).await, memberships_before);
    assert_eq!(
        store.attributes_of(entity).await.unwrap().len(),
        attributes_before
    );
}

#[tokio::test]
async fn test_second_login_records_authenticated_with() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);

    let mut first = MappingResult::new().with_identity(email("a@x.org", &source_x()));
    engine.process(&mut first).await.unwrap();

    let mut second = MappingResult::new().with_identity(email("a@x.org", &source_x()));
    engine.process(&mut second).await.unwrap();
    assert!(second.authenticated_with.contains("a@x.org"));
}

// =============================================================================
// Ambiguity
// =============================================================================

#[tokio::test]
async fn test_ambiguous_identities_abort_with_zero_writes() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);

    let mut seed_a = MappingResult::new().with_identity(email("a@x.org", &source_x()));
    engine.process(&mut seed_a).await.unwrap();
    let entity_a = seed_a.mapped_at_existing_entity.unwrap();
    let mut seed_b = MappingResult::new().with_identity(email("b@x.org", &source_x()));
    engine.process(&mut seed_b).await.unwrap();
    let entity_b = seed_b.mapped_at_existing_entity.unwrap();

    let mut ambiguous = MappingResult::new()
        .with_identity(email("a@x.org", &source_x()))
        .with_identity(email("b@x.org", &source_x()))
        .with_identity(email("c@x.org", &source_x()));
    let err = engine.process(&mut ambiguous).await.unwrap_err();
    assert!(matches!(err, ReconcileError::AmbiguousIdentity { .. }));

    // Nothing was attached or created.
    assert!(store
        .find_by_identity("email", "c@x.org")
        .await
        .unwrap()
        .is_none());
    assert_eq!(store.identities_of(entity_a).await.unwrap().len(), 1);
    assert_eq!(store.identities_of(entity_b).await.unwrap().len(), 1);
}

// =============================================================================
// Attribute effect modes
// =============================================================================

#[tokio::test]
async fn test_create_only_never_overwrites() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);

    let mut seed = MappingResult::new()
        .with_identity(email("a@x.org", &source_x()))
        .with_attribute(attribute("givenName", "/", "Ann", &source_x()));
    engine.process(&mut seed).await.unwrap();
    let entity = seed.mapped_at_existing_entity.unwrap();

    let mut overwrite = MappingResult::new()
        .with_identity(email("a@x.org", &source_x()))
        .with_attribute(
            attribute("givenName", "/", "Bob", &source_x())
                .with_mode(AttributeEffectMode::CreateOnly),
        );
    engine.process(&mut overwrite).await.unwrap();

    assert_eq!(
        attribute_values(&store, entity, "/", "givenName").await,
        Some(vec![json!("Ann")])
    );
}

#[tokio::test]
async fn test_create_only_writes_when_absent() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);

    let mut result = MappingResult::new()
        .with_identity(email("a@x.org", &source_x()))
        .with_attribute(
            attribute("givenName", "/", "Ann", &source_x())
                .with_mode(AttributeEffectMode::CreateOnly),
        );
    engine.process(&mut result).await.unwrap();
    let entity = result.mapped_at_existing_entity.unwrap();

    assert_eq!(
        attribute_values(&store, entity, "/", "givenName").await,
        Some(vec![json!("Ann")])
    );
}

#[tokio::test]
async fn test_update_only_never_creates() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);

    let mut result = MappingResult::new()
        .with_identity(email("a@x.org", &source_x()))
        .with_attribute(
            attribute("nickname", "/", "annie", &source_x())
                .with_mode(AttributeEffectMode::UpdateOnly),
        );
    engine.process(&mut result).await.unwrap();
    let entity = result.mapped_at_existing_entity.unwrap();

    assert_eq!(attribute_values(&store, entity, "/", "nickname").await, None);
}

#[tokio::test]
async fn test_update_only_updates_existing() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);

    let mut seed = MappingResult::new()
        .with_identity(email("a@x.org", &source_x()))
        .with_attribute(attribute("givenName", "/", "Ann", &source_x()));
    engine.process(&mut seed).await.unwrap();
    let entity = seed.mapped_at_existing_entity.unwrap();

    let mut update = MappingResult::new()
        .with_identity(email("a@x.org", &source_x()))
        .with_attribute(
            attribute("givenName", "/", "Anna", &source_x())
                .with_mode(AttributeEffectMode::UpdateOnly),
        );
    engine.process(&mut update).await.unwrap();

    assert_eq!(
        attribute_values(&store, entity, "/", "givenName").await,
        Some(vec![json!("Anna")])
    );
}

#[tokio::test]
async fn test_create_or_update_always_stores_mapped_value() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);

    let mut seed = MappingResult::new()
        .with_identity(email("a@x.org", &source_x()))
        .with_attribute(attribute("givenName", "/", "Ann", &source_x()));
    engine.process(&mut seed).await.unwrap();
    let entity = seed.mapped_at_existing_entity.unwrap();

    let mut update = MappingResult::new()
        .with_identity(email("a@x.org", &source_x()))
        .with_attribute(attribute("givenName", "/", "Anna", &source_x()));
    engine.process(&mut update).await.unwrap();

    assert_eq!(
        attribute_values(&store, entity, "/", "givenName").await,
        Some(vec![json!("Anna")])
    );
}

// =============================================================================
// Group hierarchy
// =============================================================================

#[tokio::test]
async fn test_deep_chain_created_parent_to_child() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);

    let mut result = MappingResult::new()
        .with_identity(email("a@x.org", &source_x()))
        .with_group(group("/A/B/C", &source_x()).with_mode(GroupEffectMode::CreateGroupIfMissing));
    engine.process(&mut result).await.unwrap();
    let entity = result.mapped_at_existing_entity.unwrap();

    for p in ["/A", "/A/B", "/A/B/C"] {
        assert!(store.group_exists(&path(p)).await, "group {p} missing");
    }
    let memberships = membership_paths(&store, entity).await;
    assert!(memberships.contains("/A"));
    assert!(memberships.contains("/A/B"));
    assert!(memberships.contains("/A/B/C"));
}

#[tokio::test]
async fn test_require_existing_group_aborts() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);

    let mut result = MappingResult::new()
        .with_identity(email("a@x.org", &source_x()))
        .with_group(group("/ghosts", &source_x()).with_mode(GroupEffectMode::RequireExistingGroup));
    let err = engine.process(&mut result).await.unwrap_err();
    assert!(matches!(err, ReconcileError::GroupRequired(_)));
}

#[tokio::test]
async fn test_ignore_mode_keeps_granted_ancestors() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);
    store.create_group(&path("/A")).await.unwrap();

    let mut result = MappingResult::new()
        .with_identity(email("a@x.org", &source_x()))
        .with_group(group("/A/B", &source_x()));
    engine.process(&mut result).await.unwrap();
    let entity = result.mapped_at_existing_entity.unwrap();

    let memberships = membership_paths(&store, entity).await;
    assert!(memberships.contains("/A"));
    assert!(!memberships.contains("/A/B"));
    assert!(!store.group_exists(&path("/A/B")).await);
}

#[tokio::test]
async fn test_granted_ancestors_survive_cleanup_across_runs() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);
    store.create_group(&path("/A")).await.unwrap();

    // /A/B stays missing: ignore mode grants /A and stops there. The /A
    // membership is implied by the mapped target, so repeated runs with
    // cleanup enabled must leave it alone.
    let mapping = || {
        MappingResult::new()
            .with_identity(email("a@x.org", &source_x()))
            .with_group(group("/A/B", &source_x()))
    };

    let mut first = mapping();
    engine.process(&mut first).await.unwrap();
    let entity = first.mapped_at_existing_entity.unwrap();
    assert!(membership_paths(&store, entity).await.contains("/A"));

    let mut second = mapping();
    engine.process(&mut second).await.unwrap();
    assert!(membership_paths(&store, entity).await.contains("/A"));
}

#[tokio::test]
async fn test_attributes_attached_at_joined_group() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);

    let mut result = MappingResult::new()
        .with_identity(email("a@x.org", &source_x()))
        .with_attribute(attribute("role", "/staff", "engineer", &source_x()))
        .with_group(group("/staff", &source_x()).with_mode(GroupEffectMode::CreateGroupIfMissing));
    engine.process(&mut result).await.unwrap();
    let entity = result.mapped_at_existing_entity.unwrap();

    assert_eq!(
        attribute_values(&store, entity, "/staff", "role").await,
        Some(vec![json!("engineer")])
    );
}

// =============================================================================
// Attribute classes
// =============================================================================

#[tokio::test]
async fn test_disallowed_attribute_aborts_process() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);
    store.create_group(&path("/staff")).await.unwrap();
    store
        .define_class(AttributeClass::new("person").with_allowed(["givenName"]))
        .await;
    store.set_group_classes(&path("/staff"), ["person"]).await;

    let mut result = MappingResult::new()
        .with_identity(email("a@x.org", &source_x()))
        .with_attribute(attribute("salary", "/staff", "1", &source_x()))
        .with_group(group("/staff", &source_x()));
    let err = engine.process(&mut result).await.unwrap_err();
    assert!(matches!(err, ReconcileError::AttributeNotAllowed { .. }));
}

#[tokio::test]
async fn test_allowed_attribute_passes_class_check() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);
    store.create_group(&path("/staff")).await.unwrap();
    store
        .define_class(AttributeClass::new("person").with_allowed(["givenName", "role"]))
        .await;
    store.set_group_classes(&path("/staff"), ["person"]).await;

    let mut result = MappingResult::new()
        .with_identity(email("a@x.org", &source_x()))
        .with_attribute(attribute("role", "/staff", "engineer", &source_x()))
        .with_group(group("/staff", &source_x()));
    engine.process(&mut result).await.unwrap();
    let entity = result.mapped_at_existing_entity.unwrap();

    assert_eq!(
        attribute_values(&store, entity, "/staff", "role").await,
        Some(vec![json!("engineer")])
    );
}

// =============================================================================
// Stale cleanup scoping
// =============================================================================

#[tokio::test]
async fn test_stale_items_of_same_source_are_removed() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);

    let mut seed = MappingResult::new()
        .with_identity(email("a@x.org", &source_x()))
        .with_identity(email("old@x.org", &source_x()))
        .with_attribute(attribute("dept", "/", "sales", &source_x()))
        .with_group(group("/staff", &source_x()).with_mode(GroupEffectMode::CreateGroupIfMissing));
    engine.process(&mut seed).await.unwrap();
    let entity = seed.mapped_at_existing_entity.unwrap();

    // Same source, shrunken mapping: the extras must go away.
    let mut current = MappingResult::new().with_identity(email("a@x.org", &source_x()));
    engine.process(&mut current).await.unwrap();

    assert!(store
        .find_by_identity("email", "old@x.org")
        .await
        .unwrap()
        .is_none());
    assert!(!membership_paths(&store, entity).await.contains("/staff"));
    assert_eq!(attribute_values(&store, entity, "/", "dept").await, None);
}

#[tokio::test]
async fn test_items_of_other_sources_survive_cleanup() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);

    let mut seed = MappingResult::new()
        .with_identity(email("a@x.org", &source_x()))
        .with_attribute(attribute("dept", "/", "sales", &source_x()))
        .with_group(group("/staff", &source_x()).with_mode(GroupEffectMode::CreateGroupIfMissing));
    engine.process(&mut seed).await.unwrap();
    let entity = seed.mapped_at_existing_entity.unwrap();

    // Different source maps the same matched identity, none of the extras.
    let mut other = MappingResult::new().with_identity(email("a@x.org", &source_y()));
    engine.process(&mut other).await.unwrap();

    assert!(membership_paths(&store, entity).await.contains("/staff"));
    assert_eq!(
        attribute_values(&store, entity, "/", "dept").await,
        Some(vec![json!("sales")])
    );
}

#[tokio::test]
async fn test_locally_created_items_survive_cleanup() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);

    let mut seed = MappingResult::new().with_identity(email("a@x.org", &source_x()));
    engine.process(&mut seed).await.unwrap();
    let entity = seed.mapped_at_existing_entity.unwrap();

    // Administrator adds an identity and an attribute by hand.
    store
        .add_identity(entity, &Identity::local("userName", "ann"))
        .await
        .unwrap();
    store
        .upsert(
            entity,
            &Attribute::new("note", path("/"), vec![json!("vip")]),
            None,
            true,
        )
        .await
        .unwrap();

    let mut current = MappingResult::new().with_identity(email("a@x.org", &source_x()));
    engine.process(&mut current).await.unwrap();

    assert_eq!(
        store.find_by_identity("userName", "ann").await.unwrap(),
        Some(entity)
    );
    assert_eq!(
        attribute_values(&store, entity, "/", "note").await,
        Some(vec![json!("vip")])
    );
}

#[tokio::test]
async fn test_cleanup_disabled_keeps_everything() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);

    let mut seed = MappingResult::new()
        .with_identity(email("a@x.org", &source_x()))
        .with_identity(email("old@x.org", &source_x()));
    engine.process(&mut seed).await.unwrap();

    let mut current = MappingResult::new()
        .with_identity(email("a@x.org", &source_x()))
        .with_clean_stale(false);
    engine.process(&mut current).await.unwrap();

    assert!(store
        .find_by_identity("email", "old@x.org")
        .await
        .unwrap()
        .is_some());
}

// =============================================================================
// Merge with existing
// =============================================================================

#[tokio::test]
async fn test_merge_attaches_and_never_deletes() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);

    let mut seed = MappingResult::new()
        .with_identity(email("a@x.org", &source_x()))
        .with_identity(email("old@x.org", &source_x()))
        .with_attribute(attribute("dept", "/", "sales", &source_x()))
        .with_group(group("/staff", &source_x()).with_mode(GroupEffectMode::CreateGroupIfMissing));
    engine.process(&mut seed).await.unwrap();
    let base = seed.mapped_at_existing_entity.unwrap();

    // Cleanup flags deliberately left on; the merge must force them off.
    let mut merge = MappingResult::new().with_identity(email("b@x.org", &source_x()));
    engine.merge_with_existing(&mut merge, base).await.unwrap();

    assert_eq!(merge.mapped_at_existing_entity, Some(base));
    assert!(!merge.clean_stale_identities);
    assert_eq!(
        store.find_by_identity("email", "b@x.org").await.unwrap(),
        Some(base)
    );
    // Everything the seed wrote is still there.
    assert!(store
        .find_by_identity("email", "old@x.org")
        .await
        .unwrap()
        .is_some());
    assert!(membership_paths(&store, base).await.contains("/staff"));
    assert_eq!(
        attribute_values(&store, base, "/", "dept").await,
        Some(vec![json!("sales")])
    );
}

#[tokio::test]
async fn test_merge_without_new_identities_is_an_error() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);

    let mut seed = MappingResult::new().with_identity(email("a@x.org", &source_x()));
    engine.process(&mut seed).await.unwrap();
    let base = seed.mapped_at_existing_entity.unwrap();

    let mut merge = MappingResult::new().with_identity(email("a@x.org", &source_x()));
    let err = engine.merge_with_existing(&mut merge, base).await.unwrap_err();
    assert!(matches!(err, ReconcileError::NothingToMerge));
}

// =============================================================================
// Identity effect modes at the engine level
// =============================================================================

#[tokio::test]
async fn test_require_match_aborts_whole_run() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);

    let mut result = MappingResult::new()
        .with_identity(
            email("ghost@x.org", &source_x()).with_mode(IdentityEffectMode::RequireMatch),
        )
        .with_group(group("/staff", &source_x()).with_mode(GroupEffectMode::CreateGroupIfMissing));
    let err = engine.process(&mut result).await.unwrap_err();
    assert!(matches!(err, ReconcileError::RequireMatchViolated { .. }));
    assert!(!store.group_exists(&path("/staff")).await);
}

#[tokio::test]
async fn test_create_or_match_attaches_to_matched_entity() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine_over(&store);

    let mut seed = MappingResult::new().with_identity(email("a@x.org", &source_x()));
    engine.process(&mut seed).await.unwrap();
    let entity = seed.mapped_at_existing_entity.unwrap();

    let mut result = MappingResult::new()
        .with_identity(email("a@x.org", &source_x()))
        .with_identity(
            email("alias@x.org", &source_x()).with_mode(IdentityEffectMode::CreateOrMatch),
        );
    engine.process(&mut result).await.unwrap();

    assert_eq!(
        store.find_by_identity("email", "alias@x.org").await.unwrap(),
        Some(entity)
    );
}
