//! Identity Reconciliation
//!
//! Resolves the mapped identities of one translation result against the
//! entity store: matches existing identities, detects ambiguous principals,
//! decides between attaching to a matched entity and creating a new one, and
//! removes stale identities previously written by the same source.

use entwine_core::EntityId;
use entwine_store::model::EntityState;
use entwine_store::EntityStore;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{ReconcileError, ReconcileResult};
use crate::types::{IdentityEffectMode, MappingResult};

/// Outcome of the lookup pass: the matched entity (if any) and the missing
/// identities bucketed by effect mode, as indexes into the mapped list so
/// profile evaluation order is preserved.
struct Classified {
    resolved: Option<EntityId>,
    /// `CreateOrMatch`: attach when some entity matched.
    attach_if_entity: Vec<usize>,
    /// `Match`: create only when no entity matched.
    create_if_none: Vec<usize>,
    /// `CreateOrUpdate`: applies either way.
    always: Vec<usize>,
}

/// Reconciles mapped identities against the entity store.
pub struct IdentityReconciler {
    entities: Arc<dyn EntityStore>,
    initial_state: EntityState,
}

impl IdentityReconciler {
    /// Creates a reconciler; `initial_state` is assigned to entities created
    /// from a mapping.
    #[must_use]
    pub fn new(entities: Arc<dyn EntityStore>, initial_state: EntityState) -> Self {
        Self {
            entities,
            initial_state,
        }
    }

    /// Resolve the mapping to a target entity, creating or attaching
    /// identities as the effect modes dictate.
    ///
    /// Returns `Ok(None)` when the mapping contains no identities at all:
    /// the caller surfaces the unresolved mapping to an interactive
    /// registration flow. A mapping whose identities all fail to match with
    /// nothing creatable is an error instead.
    pub async fn resolve(&self, result: &mut MappingResult) -> ReconcileResult<Option<EntityId>> {
        if result.identities.is_empty() {
            debug!("Mapping carries no identities; leaving principal unresolved");
            return Ok(None);
        }

        let classified = self.classify(result).await?;
        match classified.resolved {
            Some(entity) => {
                let to_attach =
                    merge_ordered(&classified.attach_if_entity, &classified.always);
                for idx in to_attach {
                    let mapped = &result.identities[idx];
                    self.entities.add_identity(entity, &mapped.identity).await?;
                    info!(
                        entity_id = %entity,
                        identity_type = %mapped.identity.type_id,
                        "Attached mapped identity to matched entity"
                    );
                }
                Ok(Some(entity))
            }
            None => {
                let to_create = merge_ordered(&classified.create_if_none, &classified.always);
                let Some((&first, rest)) = to_create.split_first() else {
                    return Err(ReconcileError::NoIdentities);
                };

                let creator = &result.identities[first];
                let root_attributes = result.root_attributes();
                let entity = self
                    .entities
                    .create_entity(
                        &creator.identity,
                        &creator.credential_requirement,
                        self.initial_state,
                        &root_attributes,
                    )
                    .await?;
                info!(
                    entity_id = %entity,
                    identity_type = %creator.identity.type_id,
                    root_attributes = root_attributes.len(),
                    "Created entity from mapped identity"
                );

                for &idx in rest {
                    let mapped = &result.identities[idx];
                    self.entities.add_identity(entity, &mapped.identity).await?;
                    info!(
                        entity_id = %entity,
                        identity_type = %mapped.identity.type_id,
                        "Attached mapped identity to created entity"
                    );
                }
                Ok(Some(entity))
            }
        }
    }

    /// Attach the mapping's missing identities to a pre-chosen entity
    /// (account linking). Same lookup pass as [`resolve`], but every missing
    /// identity is attached to `base` regardless of bucket, and a mapping
    /// with nothing left to attach is an error.
    ///
    /// [`resolve`]: IdentityReconciler::resolve
    pub async fn attach_for_merge(
        &self,
        result: &mut MappingResult,
        base: EntityId,
    ) -> ReconcileResult<()> {
        let classified = self.classify(result).await?;
        if let Some(found) = classified.resolved {
            if found != base {
                return Err(ReconcileError::AmbiguousIdentity {
                    first: base,
                    second: found,
                });
            }
        }

        let to_attach = merge_ordered(
            &merge_ordered(&classified.attach_if_entity, &classified.create_if_none),
            &classified.always,
        );
        if to_attach.is_empty() {
            return Err(ReconcileError::NothingToMerge);
        }

        for idx in to_attach {
            let mapped = &result.identities[idx];
            self.entities.add_identity(base, &mapped.identity).await?;
            info!(
                entity_id = %base,
                identity_type = %mapped.identity.type_id,
                "Attached mapped identity to merge base"
            );
        }
        Ok(())
    }

    /// Remove stored identities this source no longer maps.
    ///
    /// Scoped by the mapping's provenance key; removal failures are logged
    /// and skipped, never propagated.
    pub async fn clean_stale(
        &self,
        result: &MappingResult,
        entity: EntityId,
    ) -> ReconcileResult<()> {
        let Some(key) = result.provenance_key() else {
            return Ok(());
        };
        let mapped_keys = result.identity_keys();

        for stored in self.entities.identities_of(entity).await? {
            if stored.provenance.as_ref() != Some(key) || mapped_keys.contains(&stored.key()) {
                continue;
            }
            match self
                .entities
                .remove_identity(entity, &stored.type_id, &stored.value)
                .await
            {
                Ok(()) => info!(
                    entity_id = %entity,
                    identity_type = %stored.type_id,
                    source = %key,
                    "Removed stale identity"
                ),
                Err(error) => warn!(
                    entity_id = %entity,
                    identity_type = %stored.type_id,
                    error = %error,
                    "Failed to remove stale identity, skipping"
                ),
            }
        }
        Ok(())
    }

    /// Look up every mapped identity and bucket the missing ones.
    async fn classify(&self, result: &mut MappingResult) -> ReconcileResult<Classified> {
        let mut classified = Classified {
            resolved: None,
            attach_if_entity: Vec::new(),
            create_if_none: Vec::new(),
            always: Vec::new(),
        };
        let mut matched_values = Vec::new();

        for (idx, mapped) in result.identities.iter().enumerate() {
            let found = self
                .entities
                .find_by_identity(&mapped.identity.type_id, &mapped.identity.value)
                .await?;

            match found {
                Some(entity) => {
                    if let Some(previous) = classified.resolved {
                        if previous != entity {
                            return Err(ReconcileError::AmbiguousIdentity {
                                first: previous,
                                second: entity,
                            });
                        }
                    }
                    classified.resolved = Some(entity);
                    matched_values.push(mapped.identity.value.clone());
                }
                None => match mapped.mode {
                    IdentityEffectMode::RequireMatch => {
                        return Err(ReconcileError::RequireMatchViolated {
                            type_id: mapped.identity.type_id.clone(),
                            value: mapped.identity.value.clone(),
                        });
                    }
                    IdentityEffectMode::CreateOrMatch => classified.attach_if_entity.push(idx),
                    IdentityEffectMode::Match => classified.create_if_none.push(idx),
                    IdentityEffectMode::CreateOrUpdate => classified.always.push(idx),
                },
            }
        }

        result.authenticated_with.extend(matched_values);
        Ok(classified)
    }
}

/// Merge two ascending index lists into one ascending list.
fn merge_ordered(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] < b[j] {
            out.push(a[i]);
            i += 1;
        } else {
            out.push(b[j]);
            j += 1;
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}
