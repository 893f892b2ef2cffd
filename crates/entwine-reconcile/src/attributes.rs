//! Attribute Reconciliation
//!
//! Applies mapped attributes to an entity's stored attribute set, keyed by
//! `(group, name)`, under the per-attribute effect mode. Every write is
//! re-validated against the attribute classes in force for the owning group;
//! here a violation is a hard abort, because the mapping explicitly targeted
//! the attribute.

use entwine_core::{EntityId, GroupPath};
use entwine_store::model::StoredAttribute;
use entwine_store::{AttributeClassRegistry, AttributeStore};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::classes::{resolve_effective, EffectiveClasses};
use crate::error::{ReconcileError, ReconcileResult};
use crate::types::{AttributeEffectMode, MappingResult};

/// Reconciles mapped attributes against the attribute store.
pub struct AttributeReconciler {
    attributes: Arc<dyn AttributeStore>,
    registry: Arc<dyn AttributeClassRegistry>,
}

impl AttributeReconciler {
    /// Creates a reconciler.
    #[must_use]
    pub fn new(
        attributes: Arc<dyn AttributeStore>,
        registry: Arc<dyn AttributeClassRegistry>,
    ) -> Self {
        Self {
            attributes,
            registry,
        }
    }

    /// Apply the mapped attributes under their effect modes.
    ///
    /// Unchanged values are not rewritten, so a repeated run with the same
    /// mapping performs no writes.
    pub async fn reconcile(
        &self,
        result: &MappingResult,
        entity: EntityId,
    ) -> ReconcileResult<()> {
        let existing: HashMap<(GroupPath, String), StoredAttribute> = self
            .attributes
            .attributes_of(entity)
            .await?
            .into_iter()
            .map(|s| ((s.attribute.group.clone(), s.attribute.name.clone()), s))
            .collect();

        // Effective class constraints, resolved once per group.
        let mut guards: HashMap<GroupPath, Option<EffectiveClasses>> = HashMap::new();

        for mapped in &result.attributes {
            let attr = &mapped.attribute;

            let guard = match guards.get(&attr.group) {
                Some(cached) => cached.clone(),
                None => {
                    let resolved = self.class_guard(entity, &attr.group).await?;
                    guards.insert(attr.group.clone(), resolved.clone());
                    resolved
                }
            };
            if let Some(effective) = &guard {
                if !effective.is_allowed(&attr.name) {
                    return Err(ReconcileError::AttributeNotAllowed {
                        name: attr.name.clone(),
                        group: attr.group.clone(),
                    });
                }
            }

            let key = (attr.group.clone(), attr.name.clone());
            let current = existing.get(&key);
            // A write is skipped as unchanged only when the provenance also
            // matches; a new source taking over an attribute must re-stamp it.
            let unchanged =
                current.is_some_and(|s| s.attribute == *attr && s.provenance == mapped.provenance);
            match mapped.mode {
                AttributeEffectMode::CreateOnly => {
                    if current.is_some() {
                        debug!(
                            entity_id = %entity,
                            attribute = %attr.name,
                            group = %attr.group,
                            "Attribute exists, create_only mapping skipped"
                        );
                    } else {
                        self.attributes
                            .upsert(entity, attr, mapped.provenance.as_ref(), false)
                            .await?;
                        info!(
                            entity_id = %entity,
                            attribute = %attr.name,
                            group = %attr.group,
                            "Created attribute"
                        );
                    }
                }
                AttributeEffectMode::CreateOrUpdate => {
                    if unchanged {
                        debug!(
                            entity_id = %entity,
                            attribute = %attr.name,
                            group = %attr.group,
                            "Attribute unchanged"
                        );
                    } else {
                        self.attributes
                            .upsert(entity, attr, mapped.provenance.as_ref(), true)
                            .await?;
                        info!(
                            entity_id = %entity,
                            attribute = %attr.name,
                            group = %attr.group,
                            "Stored attribute"
                        );
                    }
                }
                AttributeEffectMode::UpdateOnly => match current {
                    None => debug!(
                        entity_id = %entity,
                        attribute = %attr.name,
                        group = %attr.group,
                        "Attribute absent, update_only mapping skipped"
                    ),
                    Some(_) if unchanged => debug!(
                        entity_id = %entity,
                        attribute = %attr.name,
                        group = %attr.group,
                        "Attribute unchanged"
                    ),
                    Some(_) => {
                        self.attributes
                            .upsert(entity, attr, mapped.provenance.as_ref(), true)
                            .await?;
                        info!(
                            entity_id = %entity,
                            attribute = %attr.name,
                            group = %attr.group,
                            "Updated attribute"
                        );
                    }
                },
            }
        }
        Ok(())
    }

    /// Remove stored attributes this source no longer maps.
    ///
    /// Removal failures are logged and skipped, never propagated.
    pub async fn clean_stale(
        &self,
        result: &MappingResult,
        entity: EntityId,
    ) -> ReconcileResult<()> {
        let Some(key) = result.provenance_key() else {
            return Ok(());
        };
        let mapped_keys: std::collections::BTreeSet<(GroupPath, String)> = result
            .attributes
            .iter()
            .map(|m| (m.attribute.group.clone(), m.attribute.name.clone()))
            .collect();

        for stored in self.attributes.attributes_of(entity).await? {
            let attr_key = (
                stored.attribute.group.clone(),
                stored.attribute.name.clone(),
            );
            if stored.provenance.as_ref() != Some(key) || mapped_keys.contains(&attr_key) {
                continue;
            }
            match self
                .attributes
                .remove(entity, &stored.attribute.group, &stored.attribute.name)
                .await
            {
                Ok(()) => info!(
                    entity_id = %entity,
                    attribute = %stored.attribute.name,
                    group = %stored.attribute.group,
                    source = %key,
                    "Removed stale attribute"
                ),
                Err(error) => warn!(
                    entity_id = %entity,
                    attribute = %stored.attribute.name,
                    group = %stored.attribute.group,
                    error = %error,
                    "Failed to remove stale attribute, skipping"
                ),
            }
        }
        Ok(())
    }

    /// The effective class constraint for the entity in `group`, or `None`
    /// when no classes are assigned there.
    async fn class_guard(
        &self,
        entity: EntityId,
        group: &GroupPath,
    ) -> ReconcileResult<Option<EffectiveClasses>> {
        let names = self.attributes.assigned_classes(entity, group).await?;
        if names.is_empty() {
            return Ok(None);
        }
        let definitions = self.registry.resolve(&names).await?;
        Ok(Some(resolve_effective(&names, &definitions)?))
    }
}
