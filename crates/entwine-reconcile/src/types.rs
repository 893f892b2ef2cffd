//! Mapping Result Types
//!
//! The normalized output of one translation-profile evaluation, consumed
//! exactly once by the reconciliation engine. Each mapped item carries an
//! effect mode controlling its create/update/match behavior, and enough
//! provenance to scope stale cleanup to data this source manages.

use chrono::{DateTime, Utc};
use entwine_core::{EntityId, GroupPath, Provenance};
use entwine_store::model::{
    Attribute, CredentialRequirement, Identity, IdentityKey, ScheduledOperation,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// How a mapped identity interacts with the identity graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityEffectMode {
    /// Match an existing identity; if missing, create an entity from it only
    /// when no other identity resolved an entity.
    Match,

    /// Match an existing identity; abort the mapping when missing.
    RequireMatch,

    /// Match an existing identity; if missing, attach it to the resolved
    /// entity as a new identity.
    CreateOrMatch,

    /// Match, attach, or create, whichever applies.
    #[default]
    CreateOrUpdate,
}

impl IdentityEffectMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityEffectMode::Match => "match",
            IdentityEffectMode::RequireMatch => "require_match",
            IdentityEffectMode::CreateOrMatch => "create_or_match",
            IdentityEffectMode::CreateOrUpdate => "create_or_update",
        }
    }
}

/// How a mapped attribute interacts with the stored attribute set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeEffectMode {
    /// Write only if no attribute with the same `(group, name)` key exists.
    CreateOnly,

    /// Always write.
    #[default]
    CreateOrUpdate,

    /// Write only if an attribute with the same key already exists.
    UpdateOnly,
}

impl AttributeEffectMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeEffectMode::CreateOnly => "create_only",
            AttributeEffectMode::CreateOrUpdate => "create_or_update",
            AttributeEffectMode::UpdateOnly => "update_only",
        }
    }
}

/// How a mapped group reacts to groups missing from the group tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupEffectMode {
    /// Silently stop processing this group when a segment is missing;
    /// already-granted ancestor memberships are kept.
    #[default]
    IgnoreIfMissing,

    /// Create missing groups on the way to the target.
    CreateGroupIfMissing,

    /// Abort the mapping when a segment is missing.
    RequireExistingGroup,
}

impl GroupEffectMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupEffectMode::IgnoreIfMissing => "ignore_if_missing",
            GroupEffectMode::CreateGroupIfMissing => "create_group_if_missing",
            GroupEffectMode::RequireExistingGroup => "require_existing_group",
        }
    }
}

/// One identity produced by profile evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappedIdentity {
    /// The identity, tagged with the source that mapped it.
    pub identity: Identity,
    /// Credential set to require if this identity ends up creating an entity.
    pub credential_requirement: CredentialRequirement,
    /// Effect mode.
    pub mode: IdentityEffectMode,
}

impl MappedIdentity {
    /// Creates a mapped identity with the default effect mode.
    #[must_use]
    pub fn new(identity: Identity, credential_requirement: CredentialRequirement) -> Self {
        Self {
            identity,
            credential_requirement,
            mode: IdentityEffectMode::default(),
        }
    }

    /// Sets the effect mode.
    #[must_use]
    pub fn with_mode(mut self, mode: IdentityEffectMode) -> Self {
        self.mode = mode;
        self
    }
}

/// One attribute produced by profile evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappedAttribute {
    /// The attribute payload (name, group, visibility, values).
    pub attribute: Attribute,
    /// Source that mapped it; recorded on the stored attribute.
    pub provenance: Option<Provenance>,
    /// Effect mode.
    pub mode: AttributeEffectMode,
}

impl MappedAttribute {
    /// Creates a mapped attribute with the default effect mode.
    #[must_use]
    pub fn new(attribute: Attribute, provenance: Option<Provenance>) -> Self {
        Self {
            attribute,
            provenance,
            mode: AttributeEffectMode::default(),
        }
    }

    /// Sets the effect mode.
    #[must_use]
    pub fn with_mode(mut self, mode: AttributeEffectMode) -> Self {
        self.mode = mode;
        self
    }
}

/// One group membership produced by profile evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappedGroup {
    /// Target group path.
    pub group: GroupPath,
    /// Source that mapped it; recorded on the membership.
    pub provenance: Option<Provenance>,
    /// Effect mode, applied to every missing segment on the way to the
    /// target.
    pub mode: GroupEffectMode,
}

impl MappedGroup {
    /// Creates a mapped group with the default effect mode.
    #[must_use]
    pub fn new(group: GroupPath, provenance: Option<Provenance>) -> Self {
        Self {
            group,
            provenance,
            mode: GroupEffectMode::default(),
        }
    }

    /// Sets the effect mode.
    #[must_use]
    pub fn with_mode(mut self, mode: GroupEffectMode) -> Self {
        self.mode = mode;
        self
    }
}

/// A scheduled entity-lifecycle change produced by profile evaluation.
///
/// A `None` operation clears any pending schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityChange {
    /// Operation to schedule, or `None` to clear.
    pub operation: Option<ScheduledOperation>,
    /// When the operation takes effect.
    pub time: DateTime<Utc>,
}

/// The output of one translation-profile evaluation.
///
/// Created per authentication or registration event, consumed exactly once
/// by [`ReconciliationEngine`], then discarded. The engine fills in
/// [`mapped_at_existing_entity`] and [`authenticated_with`] while
/// processing.
///
/// [`ReconciliationEngine`]: crate::engine::ReconciliationEngine
/// [`mapped_at_existing_entity`]: MappingResult::mapped_at_existing_entity
/// [`authenticated_with`]: MappingResult::authenticated_with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingResult {
    /// Mapped identities, in profile evaluation order.
    pub identities: Vec<MappedIdentity>,
    /// Mapped attributes, in profile evaluation order.
    pub attributes: Vec<MappedAttribute>,
    /// Mapped group memberships, in profile evaluation order.
    pub groups: Vec<MappedGroup>,
    /// Scheduled entity-lifecycle changes.
    pub entity_changes: Vec<EntityChange>,
    /// Remove stored identities this source no longer maps.
    pub clean_stale_identities: bool,
    /// Remove stored attributes this source no longer maps.
    pub clean_stale_attributes: bool,
    /// Remove stored memberships this source no longer maps.
    pub clean_stale_groups: bool,
    /// Entity the mapping resolved to; filled in by the engine.
    pub mapped_at_existing_entity: Option<EntityId>,
    /// Identity values that matched during processing.
    pub authenticated_with: BTreeSet<String>,
}

impl MappingResult {
    /// Creates an empty result with stale cleanup enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            identities: Vec::new(),
            attributes: Vec::new(),
            groups: Vec::new(),
            entity_changes: Vec::new(),
            clean_stale_identities: true,
            clean_stale_attributes: true,
            clean_stale_groups: true,
            mapped_at_existing_entity: None,
            authenticated_with: BTreeSet::new(),
        }
    }

    /// Appends a mapped identity.
    #[must_use]
    pub fn with_identity(mut self, identity: MappedIdentity) -> Self {
        self.identities.push(identity);
        self
    }

    /// Appends a mapped attribute.
    #[must_use]
    pub fn with_attribute(mut self, attribute: MappedAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Appends a mapped group.
    #[must_use]
    pub fn with_group(mut self, group: MappedGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Appends an entity change.
    #[must_use]
    pub fn with_entity_change(mut self, change: EntityChange) -> Self {
        self.entity_changes.push(change);
        self
    }

    /// Sets all three clean-stale flags at once.
    #[must_use]
    pub fn with_clean_stale(mut self, enabled: bool) -> Self {
        self.clean_stale_identities = enabled;
        self.clean_stale_attributes = enabled;
        self.clean_stale_groups = enabled;
        self
    }

    /// The stale-cleanup scoping key: the provenance of the first mapped
    /// identity. `None` disables cleanup for this run.
    #[must_use]
    pub fn provenance_key(&self) -> Option<&Provenance> {
        self.identities
            .first()
            .and_then(|m| m.identity.provenance.as_ref())
    }

    /// Keys of every mapped identity.
    #[must_use]
    pub fn identity_keys(&self) -> BTreeSet<IdentityKey> {
        self.identities.iter().map(|m| m.identity.key()).collect()
    }

    /// Mapped attributes grouped by target group path.
    #[must_use]
    pub fn attributes_by_group(&self) -> HashMap<GroupPath, Vec<Attribute>> {
        let mut by_group: HashMap<GroupPath, Vec<Attribute>> = HashMap::new();
        for mapped in &self.attributes {
            by_group
                .entry(mapped.attribute.group.clone())
                .or_default()
                .push(mapped.attribute.clone());
        }
        by_group
    }

    /// Mapped attributes scoped to the root group, used when an entity is
    /// created from this mapping.
    #[must_use]
    pub fn root_attributes(&self) -> Vec<Attribute> {
        self.attributes
            .iter()
            .filter(|m| m.attribute.group.is_root())
            .map(|m| m.attribute.clone())
            .collect()
    }

    /// Paths of every mapped group.
    #[must_use]
    pub fn group_paths(&self) -> BTreeSet<GroupPath> {
        self.groups.iter().map(|g| g.group.clone()).collect()
    }
}

impl Default for MappingResult {
    fn default() -> Self {
        Self::new()
    }
}
