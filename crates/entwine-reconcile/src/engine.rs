//! Reconciliation engine orchestrator.
//!
//! Main entry point for applying a mapping result to storage.

use entwine_core::EntityId;
use entwine_store::model::EntityState;
use entwine_store::{AttributeClassRegistry, AttributeStore, EntityStore, GroupStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::attributes::AttributeReconciler;
use crate::error::ReconcileResult;
use crate::groups::GroupHierarchyReconciler;
use crate::identity::IdentityReconciler;
use crate::types::MappingResult;

/// Configuration for the reconciliation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Lifecycle state assigned to entities created from a mapping.
    #[serde(default = "default_initial_state")]
    pub initial_entity_state: EntityState,
}

fn default_initial_state() -> EntityState {
    EntityState::Valid
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_entity_state: default_initial_state(),
        }
    }
}

/// Applies mapping results to the identity graph.
///
/// One invocation of [`process`] or [`merge_with_existing`] runs to
/// completion (or first error) inside the ambient transaction supplied by
/// the caller; the engine holds no state of its own between invocations.
///
/// [`process`]: ReconciliationEngine::process
/// [`merge_with_existing`]: ReconciliationEngine::merge_with_existing
pub struct ReconciliationEngine {
    entities: Arc<dyn EntityStore>,
    identities: IdentityReconciler,
    groups: GroupHierarchyReconciler,
    attributes: AttributeReconciler,
    config: EngineConfig,
}

impl ReconciliationEngine {
    /// Creates an engine with default configuration.
    #[must_use]
    pub fn new(
        entities: Arc<dyn EntityStore>,
        groups: Arc<dyn GroupStore>,
        attributes: Arc<dyn AttributeStore>,
        registry: Arc<dyn AttributeClassRegistry>,
    ) -> Self {
        Self::with_config(entities, groups, attributes, registry, EngineConfig::default())
    }

    /// Creates an engine with custom configuration.
    #[must_use]
    pub fn with_config(
        entities: Arc<dyn EntityStore>,
        groups: Arc<dyn GroupStore>,
        attributes: Arc<dyn AttributeStore>,
        registry: Arc<dyn AttributeClassRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            identities: IdentityReconciler::new(entities.clone(), config.initial_entity_state),
            groups: GroupHierarchyReconciler::new(groups, attributes.clone(), registry.clone()),
            attributes: AttributeReconciler::new(attributes, registry),
            entities,
            config,
        }
    }

    /// Apply a mapping for a freshly authenticated or registered principal.
    ///
    /// Resolves the mapped identities to a target entity (creating one when
    /// the effect modes dictate), then reconciles group memberships,
    /// attributes, and scheduled entity changes, in that order — groups
    /// before attributes, because membership decides which attribute classes
    /// apply in a group.
    ///
    /// A mapping that resolves no entity returns `Ok` without touching
    /// groups or attributes; the caller surfaces it to interactive
    /// registration.
    #[instrument(skip(self, result), fields(op_id = %Uuid::new_v4()))]
    pub async fn process(&self, result: &mut MappingResult) -> ReconcileResult<()> {
        let target = self.identities.resolve(result).await?;
        result.mapped_at_existing_entity = target;
        let Some(entity) = target else {
            info!("Mapping resolved no entity, leaving principal to registration");
            return Ok(());
        };

        if result.clean_stale_identities {
            self.identities.clean_stale(result, entity).await?;
        }

        self.groups.reconcile(result, entity).await?;
        if result.clean_stale_groups {
            self.groups.clean_stale(result, entity).await?;
        }

        self.attributes.reconcile(result, entity).await?;
        if result.clean_stale_attributes {
            self.attributes.clean_stale(result, entity).await?;
        }

        self.apply_entity_changes(result, entity).await?;

        info!(entity_id = %entity, "Reconciled mapping result");
        Ok(())
    }

    /// Apply a mapping against a pre-chosen entity (account linking).
    ///
    /// Never deletes: all three clean-stale flags are forced off before any
    /// phase runs. Missing identities are attached to `base` directly;
    /// entity-resolution search is skipped.
    #[instrument(skip(self, result), fields(op_id = %Uuid::new_v4()))]
    pub async fn merge_with_existing(
        &self,
        result: &mut MappingResult,
        base: EntityId,
    ) -> ReconcileResult<()> {
        result.clean_stale_identities = false;
        result.clean_stale_attributes = false;
        result.clean_stale_groups = false;

        self.identities.attach_for_merge(result, base).await?;
        result.mapped_at_existing_entity = Some(base);

        self.groups.reconcile(result, base).await?;
        self.attributes.reconcile(result, base).await?;
        self.apply_entity_changes(result, base).await?;

        info!(entity_id = %base, "Merged mapping result into entity");
        Ok(())
    }

    /// Get configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Pass the mapped entity changes through to the entity store.
    async fn apply_entity_changes(
        &self,
        result: &MappingResult,
        entity: EntityId,
    ) -> ReconcileResult<()> {
        for change in &result.entity_changes {
            self.entities
                .schedule_change(entity, change.time, change.operation)
                .await?;
            match change.operation {
                Some(op) => info!(
                    entity_id = %entity,
                    operation = op.as_str(),
                    time = %change.time,
                    "Scheduled entity change"
                ),
                None => info!(entity_id = %entity, "Cleared scheduled entity change"),
            }
        }
        Ok(())
    }
}
