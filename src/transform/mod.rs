//! Directive transformers.
//!
//! The classify phase turns every validated directive into a [`Plan`]: the directive with all
//! symbolic names resolved, bound to the name of the unit it edits. [`apply`] executes one
//! plan through a single `match` over [`Action`], dispatching to one module per directive kind.
//!
//! Plans run in [`Phase`] order across the whole artifact, so that a transformer can assume
//! every member an earlier phase adds is already present: shadow bindings and injected fields
//! come first, then copied routines and callbacks, then body rewrites, and finally the edits
//! that weave code into existing bodies.
//!
//! # Key Components
//!
//! - [`crate::transform::Remapper`] - Patch-side to target-side name translation
//! - [`crate::transform::Plan`] - A resolved directive and the unit it applies to
//! - [`crate::transform::TransformContext`] - Remapper, hierarchy and statistics of one run

mod class_mod;
mod code;
mod construct;
mod disable;
mod field_hook;
mod hook;
mod inject;
mod insert;
mod remap;
mod replace;
mod shadow;

pub use remap::Remapper;

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    mapping::MemberTarget,
    patch::{At, ClassMod, DirectiveKind, PatchMember, PatchUnit, SiteRef},
    unit::{ClassHierarchy, CodeUnit},
    Error, Result,
};

/// Global ordering of plans within the transform phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    /// Shadow binding and field injection
    Bind,
    /// Routine injection, including callbacks
    Copy,
    /// Replace, Disable, Hook and Construct
    Rewrite,
    /// Insert, FieldHook and ClassMod
    Weave,
}

/// A directive with resolved names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Verify that a shadowed member exists
    Shadow {
        /// The bound member
        target: MemberTarget,
        /// The member is a field
        field: bool,
    },
    /// Copy a patch field
    InjectField,
    /// Copy a patch routine
    InjectRoutine,
    /// Copy a patch routine that other plans call
    Callback {
        /// Force the copy to be public, for calls from other units
        public: bool,
    },
    /// Replace a routine body
    Replace {
        /// The routine
        target: MemberTarget,
    },
    /// Make a routine return its default value
    Disable {
        /// The routine
        target: MemberTarget,
    },
    /// Call the callback at `at`
    Hook {
        /// The hooked routine
        target: MemberTarget,
        /// [`At::Head`] or [`At::Return`]
        at: At,
    },
    /// Call the callback at the end of root constructors
    Construct,
    /// Inline the patch routine
    Insert {
        /// The routine to insert into
        target: MemberTarget,
        /// Insertion point
        at: At,
        /// Resolved call or field site
        site: Option<SiteRef>,
        /// Occurrence, `-1` for all
        ordinal: i32,
    },
    /// Call the callback after writes of `field`
    FieldHook {
        /// The hooked field
        field: MemberTarget,
        /// Units whose pools reference the field
        sites: Vec<String>,
    },
    /// Unit-level modifications, interfaces already remapped
    ClassMod(ClassMod),
}

/// One resolved directive, applied to one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Name of the unit the plan edits
    pub target: String,
    /// Index of the patch unit
    pub patch: usize,
    /// Index into the patch unit's members, `None` for unit-level plans
    pub member: Option<usize>,
    /// What to do
    pub action: Action,
}

impl Plan {
    /// The phase this plan runs in.
    #[must_use]
    pub fn phase(&self) -> Phase {
        match self.action {
            Action::Shadow { .. } | Action::InjectField => Phase::Bind,
            Action::InjectRoutine | Action::Callback { .. } => Phase::Copy,
            Action::Replace { .. }
            | Action::Disable { .. }
            | Action::Hook { .. }
            | Action::Construct => Phase::Rewrite,
            Action::Insert { .. } | Action::FieldHook { .. } | Action::ClassMod(_) => Phase::Weave,
        }
    }

    /// The directive kind this plan is counted under.
    #[must_use]
    pub fn kind(&self) -> DirectiveKind {
        match self.action {
            Action::Shadow { .. } => DirectiveKind::Shadow,
            Action::InjectField | Action::InjectRoutine | Action::Callback { .. } => {
                DirectiveKind::Inject
            }
            Action::Replace { .. } => DirectiveKind::Replace,
            Action::Disable { .. } => DirectiveKind::Disable,
            Action::Hook { .. } => DirectiveKind::Hook,
            Action::Construct => DirectiveKind::Construct,
            Action::Insert { .. } => DirectiveKind::Insert,
            Action::FieldHook { .. } => DirectiveKind::FieldHook,
            Action::ClassMod(_) => DirectiveKind::ClassMod,
        }
    }
}

/// Counters collected while transforming.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformStats {
    /// Applied plans per directive kind
    pub applied: BTreeMap<DirectiveKind, usize>,
    /// Field writes inside constructors that were not hooked
    pub skipped_sites: usize,
    /// Units at least one plan changed
    pub touched: BTreeSet<String>,
}

impl TransformStats {
    fn record(&mut self, kind: DirectiveKind, unit: &str) {
        *self.applied.entry(kind).or_default() += 1;
        self.touched.insert(unit.to_string());
    }

    /// Sum of applied plans over all kinds.
    #[must_use]
    pub fn total(&self) -> usize {
        self.applied.values().sum()
    }
}

/// State shared by all transformers of one run.
pub struct TransformContext<'a> {
    /// Patch to target name translation
    pub remapper: &'a Remapper,
    /// Class hierarchy of the artifact
    pub hierarchy: &'a ClassHierarchy,
    /// Counters
    pub stats: &'a mut TransformStats,
}

fn patch_member<'p>(patch: &'p PatchUnit, plan: &Plan) -> Result<&'p PatchMember> {
    plan.member
        .and_then(|index| patch.members.get(index))
        .ok_or_else(|| transform_error!(plan.target, "plan of {} has no member", patch.name()))
}

/// Applies one plan.
///
/// # Errors
/// Returns [`Error::Transform`] if the target unit or member is missing, was not decoded in
/// full, or does not fit the directive, and [`Error::Malformed`] if constants cannot be
/// imported.
pub fn apply(
    plan: &Plan,
    units: &mut BTreeMap<String, CodeUnit>,
    patches: &[PatchUnit],
    ctx: &mut TransformContext,
) -> Result<()> {
    let Some(patch) = patches.get(plan.patch) else {
        return Err(transform_error!(plan.target, "unknown patch unit {}", plan.patch));
    };

    if let Action::FieldHook { field, sites } = &plan.action {
        let member = patch_member(patch, plan)?;
        let changed = field_hook::apply(units, patch, member, field, sites, ctx)?;
        if !changed.is_empty() {
            ctx.stats.record(plan.kind(), &plan.target);
            ctx.stats.touched.extend(changed);
        }
        return Ok(());
    }

    let Some(target) = units.get_mut(&plan.target) else {
        return Err(transform_error!(plan.target, "target unit is not part of the artifact"));
    };

    let applied = match &plan.action {
        Action::Shadow { target: member, field } => {
            shadow::verify(target, member, *field)?;
            false
        }
        Action::InjectField => inject::field(target, patch, patch_member(patch, plan)?, ctx)?,
        Action::InjectRoutine => {
            inject::routine(target, patch, patch_member(patch, plan)?, false, ctx)?
        }
        Action::Callback { public } => {
            inject::routine(target, patch, patch_member(patch, plan)?, *public, ctx)?
        }
        Action::Replace { target: member } => {
            replace::apply(target, patch, patch_member(patch, plan)?, member, ctx)?
        }
        Action::Disable { target: member } => disable::apply(target, member)?,
        Action::Hook { target: member, at } => {
            hook::apply(target, patch, patch_member(patch, plan)?, member, *at, ctx)?
        }
        Action::Construct => construct::apply(target, patch, patch_member(patch, plan)?, ctx)?,
        Action::Insert {
            target: member,
            at,
            site,
            ordinal,
        } => insert::apply(
            target,
            patch,
            patch_member(patch, plan)?,
            &insert::InsertPoint {
                routine: member,
                at: *at,
                site: site.as_ref(),
                ordinal: *ordinal,
            },
            ctx,
        )?,
        Action::ClassMod(class_mod) => class_mod::apply(target, class_mod)?,
        Action::FieldHook { .. } => false,
    };

    if applied {
        ctx.stats.record(plan.kind(), &plan.target);
    }
    Ok(())
}

/// Applies plans in phase order, keeping the given order within a phase.
///
/// # Errors
/// Stops at the first failing plan, see [`apply`].
pub fn apply_all(
    plans: &[Plan],
    units: &mut BTreeMap<String, CodeUnit>,
    patches: &[PatchUnit],
    ctx: &mut TransformContext,
) -> Result<()> {
    let mut ordered: Vec<&Plan> = plans.iter().collect();
    ordered.sort_by_key(|plan| plan.phase());
    for plan in ordered {
        log::debug!("{:?} {} on {}", plan.phase(), plan.kind(), plan.target);
        apply(plan, units, patches, ctx).map_err(|error| match error {
            error @ (Error::Transform { .. } | Error::Directive { .. }) => error,
            other => transform_error!(plan.target, "{} failed: {}", plan.kind(), other),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(action: Action) -> Plan {
        Plan {
            target: "a7".into(),
            patch: 0,
            member: Some(0),
            action,
        }
    }

    #[test]
    fn phases_are_ordered() {
        let target = MemberTarget {
            owner: "a7".into(),
            name: "c".into(),
            descriptor: "()V".into(),
        };
        let insert = plan(Action::Insert {
            target: target.clone(),
            at: At::Head,
            site: None,
            ordinal: -1,
        });
        let replace = plan(Action::Replace { target });
        let inject = plan(Action::InjectRoutine);
        let field = plan(Action::InjectField);

        let mut plans = vec![&insert, &replace, &inject, &field];
        plans.sort_by_key(|plan| plan.phase());
        assert_eq!(
            plans.iter().map(|plan| plan.kind()).collect::<Vec<_>>(),
            vec![
                DirectiveKind::Inject,
                DirectiveKind::Inject,
                DirectiveKind::Replace,
                DirectiveKind::Insert
            ]
        );
        assert_eq!(plans[0].phase(), Phase::Bind);
    }

    #[test]
    fn stats_count_per_kind() {
        let mut stats = TransformStats::default();
        stats.record(DirectiveKind::Inject, "a7");
        stats.record(DirectiveKind::Inject, "a7");
        stats.record(DirectiveKind::Hook, "k");
        assert_eq!(stats.total(), 3);
        assert_eq!(stats.applied[&DirectiveKind::Inject], 2);
        assert_eq!(stats.touched.len(), 2);
    }
}
