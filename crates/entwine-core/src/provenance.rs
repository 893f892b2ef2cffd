//! Federation Source Tags
//!
//! Every identity, attribute, and group membership written by the
//! reconciliation engine records which remote IdP and translation profile
//! produced it. Stale cleanup is scoped by this tag: an item is only
//! cleanup-eligible when its tag equals the current mapping's tag, so
//! locally-created data (no tag) is never touched.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// The (remote IdP, translation profile) pair identifying the external
/// source that produced a stored item.
///
/// Items created by administrators or interactive flows carry no provenance
/// (`Option<Provenance>` is `None`) and are invisible to stale cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Provenance {
    /// Name of the remote identity provider.
    pub idp: String,
    /// Name of the translation profile that evaluated the input.
    pub profile: String,
}

impl Provenance {
    /// Creates a provenance tag.
    #[must_use]
    pub fn new(idp: impl Into<String>, profile: impl Into<String>) -> Self {
        Self {
            idp: idp.into(),
            profile: profile.into(),
        }
    }
}

impl Display for Provenance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.idp, self.profile)
    }
}
