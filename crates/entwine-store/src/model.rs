//! Persisted Data Model
//!
//! The types the storage layer holds on behalf of the reconciliation engine:
//! entities, their identities, attributes, group memberships, and the named
//! attribute classes constraining which attributes a group admits.

use chrono::{DateTime, Utc};
use entwine_core::{EntityId, GroupPath, Provenance};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Entity lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityState {
    /// Entity is fully operational.
    Valid,

    /// Entity is administratively disabled.
    Disabled,

    /// Entity exists but may not authenticate.
    AuthenticationDisabled,

    /// Entity may only log in; all other operations are blocked.
    OnlyLoginPermitted,
}

impl EntityState {
    /// String representation used in storage and logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityState::Valid => "valid",
            EntityState::Disabled => "disabled",
            EntityState::AuthenticationDisabled => "authentication_disabled",
            EntityState::OnlyLoginPermitted => "only_login_permitted",
        }
    }
}

impl std::str::FromStr for EntityState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "valid" => Ok(EntityState::Valid),
            "disabled" => Ok(EntityState::Disabled),
            "authentication_disabled" => Ok(EntityState::AuthenticationDisabled),
            "only_login_permitted" => Ok(EntityState::OnlyLoginPermitted),
            _ => Err(format!("Unknown entity state: {s}")),
        }
    }
}

/// Lifecycle operation that can be scheduled for a future time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledOperation {
    /// Remove the entity and everything attached to it.
    Remove,

    /// Move the entity to the disabled state.
    Disable,
}

impl ScheduledOperation {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduledOperation::Remove => "remove",
            ScheduledOperation::Disable => "disable",
        }
    }
}

/// Name of the credential set a newly created entity must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialRequirement(String);

impl CredentialRequirement {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Visibility of an attribute outside the local system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeVisibility {
    /// Visible everywhere, including outbound federation.
    Full,

    /// Visible only to the local system.
    Local,
}

/// A typed identity value bound (or bindable) to an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Identity type name (e.g. `userName`, `email`, `x500Name`).
    pub type_id: String,
    /// The identity value.
    pub value: String,
    /// Source that produced this identity; `None` for locally-created.
    pub provenance: Option<Provenance>,
}

impl Identity {
    /// Creates an identity without provenance (locally created).
    #[must_use]
    pub fn local(type_id: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            type_id: type_id.into(),
            value: value.into(),
            provenance: None,
        }
    }

    /// Creates an identity tagged with a federation source.
    #[must_use]
    pub fn federated(
        type_id: impl Into<String>,
        value: impl Into<String>,
        provenance: Provenance,
    ) -> Self {
        Self {
            type_id: type_id.into(),
            value: value.into(),
            provenance: Some(provenance),
        }
    }

    /// The comparison key identifying this identity regardless of provenance.
    #[must_use]
    pub fn key(&self) -> IdentityKey {
        IdentityKey {
            type_id: self.type_id.clone(),
            value: self.value.clone(),
        }
    }
}

/// `(type, value)` pair identifying an identity independent of where it
/// came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey {
    /// Identity type name.
    pub type_id: String,
    /// The identity value.
    pub value: String,
}

/// A persisted entity: the subject a set of identities refer to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Stable store-assigned id.
    pub id: EntityId,
    /// Lifecycle state.
    pub state: EntityState,
    /// Credential set this entity must satisfy.
    pub credential_requirement: CredentialRequirement,
    /// Pending scheduled lifecycle change, if any.
    pub scheduled_change: Option<(DateTime<Utc>, ScheduledOperation)>,
}

/// An attribute as mapped or written: name, owning group, visibility and a
/// typed value list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// Attribute name.
    pub name: String,
    /// Group the attribute is scoped to (`/` for root attributes).
    pub group: GroupPath,
    /// Visibility outside the local system.
    pub visibility: AttributeVisibility,
    /// Ordered values.
    pub values: Vec<serde_json::Value>,
}

impl Attribute {
    /// Creates a fully-visible attribute.
    #[must_use]
    pub fn new(name: impl Into<String>, group: GroupPath, values: Vec<serde_json::Value>) -> Self {
        Self {
            name: name.into(),
            group,
            visibility: AttributeVisibility::Full,
            values,
        }
    }
}

/// An attribute as stored, with the provenance recorded at write time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredAttribute {
    /// The attribute payload.
    pub attribute: Attribute,
    /// Source that wrote it; `None` for locally-created.
    pub provenance: Option<Provenance>,
}

/// Membership of an entity in one group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMembership {
    /// The group.
    pub group: GroupPath,
    /// The member entity.
    pub entity: EntityId,
    /// Source that granted the membership; `None` for locally-granted.
    pub provenance: Option<Provenance>,
    /// When the membership was granted.
    pub created_at: DateTime<Utc>,
}

/// A named, composable constraint on the attributes admitted in a group.
///
/// Effective allowed/mandatory sets are the union across a class and all its
/// transitive parents; `allow_arbitrary` opens the allowed set entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeClass {
    /// Class name, unique in the registry.
    pub name: String,
    /// Attribute names this class admits.
    pub allowed: BTreeSet<String>,
    /// Attribute names this class requires.
    pub mandatory: BTreeSet<String>,
    /// Whether any attribute name is admitted regardless of `allowed`.
    pub allow_arbitrary: bool,
    /// Parent class names this class composes with.
    pub parents: BTreeSet<String>,
}

impl AttributeClass {
    /// Creates an empty class with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            allowed: BTreeSet::new(),
            mandatory: BTreeSet::new(),
            allow_arbitrary: false,
            parents: BTreeSet::new(),
        }
    }

    /// Adds allowed attribute names.
    #[must_use]
    pub fn with_allowed<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed.extend(names.into_iter().map(Into::into));
        self
    }

    /// Adds mandatory attribute names. Mandatory names are implicitly allowed.
    #[must_use]
    pub fn with_mandatory<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            self.allowed.insert(name.clone());
            self.mandatory.insert(name);
        }
        self
    }

    /// Opens the allowed set entirely.
    #[must_use]
    pub fn with_arbitrary(mut self) -> Self {
        self.allow_arbitrary = true;
        self
    }

    /// Adds parent class names.
    #[must_use]
    pub fn with_parents<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parents.extend(names.into_iter().map(Into::into));
        self
    }
}
