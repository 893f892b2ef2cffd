//! # Reconciliation Engine
//!
//! Input translation and identity reconciliation for entwine.
//!
//! This crate takes the normalized output of a translation-profile
//! evaluation (a [`MappingResult`]) and applies it to the identity graph
//! under strict effect-mode semantics:
//!
//! ```text
//! ┌──────────────────┐      ┌────────────────┐      ┌────────────────────────┐
//! │  Remote input    │─────►│  Translation   │─────►│  ReconciliationEngine  │
//! │  (SAML/OIDC/...) │      │  profile       │      │                        │
//! └──────────────────┘      └────────────────┘      └───────────┬────────────┘
//!                                                               │
//!                      ┌───────────────────┬────────────────────┼────────────────────┐
//!                      ▼                   ▼                    ▼                    ▼
//!               ┌────────────┐    ┌─────────────────┐    ┌─────────────┐    ┌──────────────┐
//!               │  Identity  │    │ Group hierarchy │    │  Attribute  │    │ Entity-change│
//!               │ reconciler │    │   reconciler    │    │  reconciler │    │  scheduling  │
//!               └────────────┘    └─────────────────┘    └─────────────┘    └──────────────┘
//! ```
//!
//! ## Semantics
//!
//! - **Effect modes** control create/update/match behavior per mapped item.
//! - **Partial failure**: ambiguous identity resolution, violated required
//!   matches, missing required groups and class violations abort the whole
//!   invocation so the ambient transaction rolls back; stale-cleanup removal
//!   failures are logged and skipped.
//! - **Provenance scoping**: stale cleanup only ever removes items written
//!   by the same (remote IdP, translation profile) source as the current
//!   mapping; locally-created data is never touched.
//! - **Hierarchy**: missing ancestor groups are joined top-down, honoring
//!   the per-group missing-group policy.
//!
//! ## Example
//!
//! ```ignore
//! use entwine_reconcile::{MappingResult, MappedIdentity, ReconciliationEngine};
//!
//! let engine = ReconciliationEngine::new(entities, groups, attributes, registry);
//! let mut result = MappingResult::new()
//!     .with_identity(MappedIdentity::new(identity, credential_requirement));
//!
//! engine.process(&mut result).await?;
//! match result.mapped_at_existing_entity {
//!     Some(entity) => println!("principal is entity {entity}"),
//!     None => println!("unresolved, continue with registration"),
//! }
//! ```

pub mod attributes;
pub mod classes;
pub mod engine;
pub mod error;
pub mod groups;
pub mod identity;
pub mod types;

// Re-exports for convenience
pub use attributes::AttributeReconciler;
pub use classes::{is_restricting_change, resolve_effective, EffectiveClasses};
pub use engine::{EngineConfig, ReconciliationEngine};
pub use error::{ReconcileError, ReconcileResult};
pub use groups::GroupHierarchyReconciler;
pub use identity::IdentityReconciler;
pub use types::{
    AttributeEffectMode, EntityChange, GroupEffectMode, IdentityEffectMode, MappedAttribute,
    MappedGroup, MappedIdentity, MappingResult,
};
