//! Strongly Typed Identifiers
//!
//! Newtype identifiers for entwine. The underlying representation is the
//! stable numeric id assigned by the entity store, but the newtype prevents
//! accidental mixing with other numeric values at compile time.
//!
//! # Example
//!
//! ```
//! use entwine_core::EntityId;
//!
//! let id = EntityId::from_raw(7);
//!
//! fn requires_entity(id: EntityId) -> String {
//!     id.to_string()
//! }
//!
//! assert_eq!(requires_entity(id), "7");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Strongly typed identifier for entities.
///
/// An entity is the persisted subject a set of identities refer to. Ids are
/// assigned by the entity store and are stable for the entity's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(i64);

impl EntityId {
    /// Creates an id from a raw store-assigned value.
    #[must_use]
    pub fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    /// Returns the underlying numeric value.
    #[must_use]
    pub fn as_raw(&self) -> i64 {
        self.0
    }
}

impl Display for EntityId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(Self)
    }
}
