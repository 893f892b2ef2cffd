//! Attribute-Class Consistency
//!
//! Attribute classes compose through parent links: the effective allowed and
//! mandatory sets for an entity in a group are the union across every
//! assigned class and all of its transitive parents. Parent graphs are a DAG
//! by convention; resolution here detects cycles explicitly instead of
//! trusting the convention.

use entwine_store::model::AttributeClass;
use entwine_store::StoreError;
use std::collections::{BTreeSet, HashMap};

use crate::error::{ReconcileError, ReconcileResult};

/// The composed constraint of a set of attribute classes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveClasses {
    /// Union of allowed attribute names.
    pub allowed: BTreeSet<String>,
    /// Union of mandatory attribute names.
    pub mandatory: BTreeSet<String>,
    /// Whether any class in the closure opens the allowed set entirely.
    pub allow_arbitrary: bool,
}

impl EffectiveClasses {
    /// Whether an attribute name is admitted.
    #[must_use]
    pub fn is_allowed(&self, name: &str) -> bool {
        self.allow_arbitrary || self.allowed.contains(name)
    }

    /// Whether an attribute name is required.
    #[must_use]
    pub fn is_mandatory(&self, name: &str) -> bool {
        self.mandatory.contains(name)
    }
}

/// Whether replacing `original` with `updated` removes permissions or adds
/// requirements.
///
/// Used by the class-definition update path to decide whether usage-impact
/// checks must run before an update is accepted. True when the updated
/// effective allowed set is a strict subset of the original (including
/// losing `allow_arbitrary`), or the updated mandatory set is a strict
/// superset of the original.
#[must_use]
pub fn is_restricting_change(updated: &EffectiveClasses, original: &EffectiveClasses) -> bool {
    let allowed_restricted = if original.allow_arbitrary {
        !updated.allow_arbitrary
    } else if updated.allow_arbitrary {
        false
    } else {
        updated.allowed.is_subset(&original.allowed) && updated.allowed != original.allowed
    };

    let mandatory_expanded =
        updated.mandatory.is_superset(&original.mandatory) && updated.mandatory != original.mandatory;

    allowed_restricted || mandatory_expanded
}

/// Resolution state per class during the parent walk.
#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

/// Compose the effective constraint of `names` over a resolved definition
/// map (the named classes plus their transitive parents).
///
/// # Errors
///
/// - [`ReconcileError::ClassCycle`] when parent links form a cycle
/// - [`ReconcileError::Store`] with `UnknownClass` when a parent reference
///   is missing from `definitions`
pub fn resolve_effective(
    names: &[String],
    definitions: &HashMap<String, AttributeClass>,
) -> ReconcileResult<EffectiveClasses> {
    let mut effective = EffectiveClasses {
        allowed: BTreeSet::new(),
        mandatory: BTreeSet::new(),
        allow_arbitrary: false,
    };
    let mut marks: HashMap<&str, Mark> = HashMap::new();

    for name in names {
        visit(name, definitions, &mut marks, &mut effective)?;
    }
    Ok(effective)
}

fn visit<'a>(
    name: &'a str,
    definitions: &'a HashMap<String, AttributeClass>,
    marks: &mut HashMap<&'a str, Mark>,
    effective: &mut EffectiveClasses,
) -> ReconcileResult<()> {
    match marks.get(name) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => return Err(ReconcileError::ClassCycle(name.to_string())),
        None => {}
    }

    let class = definitions
        .get(name)
        .ok_or_else(|| ReconcileError::Store(StoreError::UnknownClass(name.to_string())))?;

    marks.insert(&class.name, Mark::Visiting);
    for parent in &class.parents {
        visit(parent, definitions, marks, effective)?;
    }
    marks.insert(&class.name, Mark::Done);

    effective.allowed.extend(class.allowed.iter().cloned());
    effective.mandatory.extend(class.mandatory.iter().cloned());
    effective.allow_arbitrary |= class.allow_arbitrary;
    Ok(())
}
