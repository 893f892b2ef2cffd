//! Group Hierarchy Reconciliation
//!
//! Membership in a group requires membership in its parent, so reaching a
//! mapped target path means walking the chain of missing ancestors from the
//! entity's nearest already-joined ancestor down to the target. The chain is
//! precomputed and processed as a plain loop, shallowest segment first; the
//! per-group effect mode decides what happens when a segment's group does
//! not exist.

use entwine_core::{EntityId, GroupPath};
use entwine_store::model::Attribute;
use entwine_store::{AttributeClassRegistry, AttributeStore, GroupStore, StoreError};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::classes::resolve_effective;
use crate::error::{ReconcileError, ReconcileResult};
use crate::types::{GroupEffectMode, MappingResult};

/// Reconciles mapped group memberships against the group store.
pub struct GroupHierarchyReconciler {
    groups: Arc<dyn GroupStore>,
    attributes: Arc<dyn AttributeStore>,
    registry: Arc<dyn AttributeClassRegistry>,
}

impl GroupHierarchyReconciler {
    /// Creates a reconciler.
    #[must_use]
    pub fn new(
        groups: Arc<dyn GroupStore>,
        attributes: Arc<dyn AttributeStore>,
        registry: Arc<dyn AttributeClassRegistry>,
    ) -> Self {
        Self {
            groups,
            attributes,
            registry,
        }
    }

    /// Grant the mapped memberships the entity does not have yet, walking
    /// missing ancestors top-down and attaching the attributes mapped at
    /// each joined group.
    pub async fn reconcile(
        &self,
        result: &MappingResult,
        entity: EntityId,
    ) -> ReconcileResult<()> {
        let mut current: BTreeSet<GroupPath> = self
            .groups
            .memberships_of(entity)
            .await?
            .into_iter()
            .map(|m| m.group)
            .collect();
        current.insert(GroupPath::root());

        let attrs_by_group = result.attributes_by_group();

        for mapped in &result.groups {
            if current.contains(&mapped.group) {
                debug!(entity_id = %entity, group = %mapped.group, "Already a member");
                continue;
            }

            let chain = missing_chain(&mapped.group, &current);
            'chain: for segment in chain {
                let attrs = self
                    .admitted_attributes(entity, &segment, attrs_by_group.get(&segment))
                    .await?;
                let mut outcome = self
                    .groups
                    .add_membership_from_parent(
                        &segment,
                        entity,
                        &attrs,
                        mapped.provenance.as_ref(),
                    )
                    .await;

                if matches!(
                    outcome,
                    Err(StoreError::GroupMissing(_) | StoreError::NotMemberOfParent { .. })
                ) {
                    match mapped.mode {
                        GroupEffectMode::CreateGroupIfMissing => {
                            self.groups.create_group(&segment).await?;
                            info!(group = %segment, "Created missing group");
                            outcome = self
                                .groups
                                .add_membership_from_parent(
                                    &segment,
                                    entity,
                                    &attrs,
                                    mapped.provenance.as_ref(),
                                )
                                .await;
                        }
                        GroupEffectMode::RequireExistingGroup => {
                            return Err(ReconcileError::GroupRequired(segment));
                        }
                        GroupEffectMode::IgnoreIfMissing => {
                            debug!(
                                entity_id = %entity,
                                group = %segment,
                                target = %mapped.group,
                                "Group missing, skipping rest of the target chain"
                            );
                            break 'chain;
                        }
                    }
                }
                outcome?;

                info!(entity_id = %entity, group = %segment, "Granted group membership");
                current.insert(segment);
            }
        }
        Ok(())
    }

    /// Remove stored memberships this source no longer maps.
    ///
    /// The comparison set is the hierarchical closure of the mapped paths:
    /// membership in a target implies membership in its ancestors, so an
    /// ancestor of a mapped path is never stale. Root membership is
    /// structural and never removed. Removal failures are logged and
    /// skipped, never propagated.
    pub async fn clean_stale(
        &self,
        result: &MappingResult,
        entity: EntityId,
    ) -> ReconcileResult<()> {
        let Some(key) = result.provenance_key() else {
            return Ok(());
        };
        let mut mapped_paths = result.group_paths();
        for target in result.group_paths() {
            mapped_paths.extend(target.ancestors());
        }

        for membership in self.groups.memberships_of(entity).await? {
            if membership.group.is_root()
                || membership.provenance.as_ref() != Some(key)
                || mapped_paths.contains(&membership.group)
            {
                continue;
            }
            match self.groups.remove_membership(&membership.group, entity).await {
                Ok(()) => info!(
                    entity_id = %entity,
                    group = %membership.group,
                    source = %key,
                    "Removed stale group membership"
                ),
                Err(error) => warn!(
                    entity_id = %entity,
                    group = %membership.group,
                    error = %error,
                    "Failed to remove stale membership, skipping"
                ),
            }
        }
        Ok(())
    }

    /// The attributes to attach when joining `group`, after checking them
    /// against the attribute classes in force there.
    ///
    /// A class violation skips this group's attribute attachment (the
    /// membership itself is still granted); class-resolution failures
    /// propagate.
    async fn admitted_attributes(
        &self,
        entity: EntityId,
        group: &GroupPath,
        attrs: Option<&Vec<Attribute>>,
    ) -> ReconcileResult<Vec<Attribute>> {
        let Some(attrs) = attrs else {
            return Ok(Vec::new());
        };

        let names = self.attributes.assigned_classes(entity, group).await?;
        if names.is_empty() {
            return Ok(attrs.clone());
        }
        let definitions = self.registry.resolve(&names).await?;
        let effective = resolve_effective(&names, &definitions)?;

        for attr in attrs {
            if !effective.is_allowed(&attr.name) {
                warn!(
                    entity_id = %entity,
                    group = %group,
                    attribute = %attr.name,
                    "Attribute not admitted by class constraints, skipping attribute attachment for group"
                );
                return Ok(Vec::new());
            }
        }
        Ok(attrs.clone())
    }
}

/// The ordered chain of paths to join, from the shallowest segment below the
/// entity's nearest already-joined ancestor down to `target`.
fn missing_chain(target: &GroupPath, current: &BTreeSet<GroupPath>) -> Vec<GroupPath> {
    let mut chain = vec![target.clone()];
    let mut cursor = target.parent();
    while let Some(path) = cursor {
        if path.is_root() || current.contains(&path) {
            break;
        }
        cursor = path.parent();
        chain.push(path);
    }
    chain.reverse();
    chain
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> GroupPath {
        s.parse().unwrap()
    }

    fn set(paths: &[&str]) -> BTreeSet<GroupPath> {
        paths.iter().map(|p| path(p)).collect()
    }

    #[test]
    fn test_missing_chain_from_root() {
        let chain = missing_chain(&path("/a/b/c"), &set(&["/"]));
        let chain: Vec<&str> = chain.iter().map(GroupPath::as_str).collect();
        assert_eq!(chain, vec!["/a", "/a/b", "/a/b/c"]);
    }

    #[test]
    fn test_missing_chain_from_joined_ancestor() {
        let chain = missing_chain(&path("/a/b/c"), &set(&["/", "/a"]));
        let chain: Vec<&str> = chain.iter().map(GroupPath::as_str).collect();
        assert_eq!(chain, vec!["/a/b", "/a/b/c"]);
    }

    #[test]
    fn test_missing_chain_starts_below_deepest_joined_ancestor() {
        let chain = missing_chain(&path("/a/b/c"), &set(&["/", "/a/b"]));
        let chain: Vec<&str> = chain.iter().map(GroupPath::as_str).collect();
        assert_eq!(chain, vec!["/a/b/c"]);
    }

    #[test]
    fn test_missing_chain_for_top_level_target() {
        let chain = missing_chain(&path("/a"), &set(&["/"]));
        let chain: Vec<&str> = chain.iter().map(GroupPath::as_str).collect();
        assert_eq!(chain, vec!["/a"]);
    }
}
