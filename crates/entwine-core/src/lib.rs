//! entwine Core Library
//!
//! Shared leaf types for the entwine identity-federation core.
//!
//! # Modules
//!
//! - [`ids`] - Strongly typed identifiers (`EntityId`)
//! - [`path`] - Hierarchical group paths (`GroupPath`)
//! - [`provenance`] - Federation source tags (`Provenance`)
//!
//! # Example
//!
//! ```
//! use entwine_core::{EntityId, GroupPath, Provenance};
//!
//! let entity = EntityId::from_raw(42);
//! let group: GroupPath = "/staff/admins".parse().unwrap();
//! assert_eq!(group.parent().unwrap().as_str(), "/staff");
//!
//! let source = Provenance::new("saml-corp", "corp-profile");
//! assert_eq!(source.idp, "saml-corp");
//! ```

pub mod ids;
pub mod path;
pub mod provenance;

// Re-export main types for convenient access
pub use ids::EntityId;
pub use path::{GroupPath, GroupPathError};
pub use provenance::Provenance;
