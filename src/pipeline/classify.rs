//! The classify phase: resolution, conflict detection and decode modes.
//!
//! Classification looks at patches and probes only. It resolves every target and every
//! symbolic member reference of the patch units, binds them in the
//! [`crate::transform::Remapper`], turns every directive into a [`Plan`] and decides which
//! artifact units need a full decode. Any resolution failure aborts the run here, before a
//! single unit is modified.

use std::collections::{BTreeMap, BTreeSet};

use crate::{
    mapping::{InterfaceIndex, MappingTable, MemberTarget, ResolvedClass, SymbolResolver},
    patch::{At, ClassMod, Directive, DirectiveKind, MemberKind, PatchMember, PatchUnit, SiteRef},
    pipeline::arena::WorkingSet,
    transform::{Action, Plan, Remapper},
    unit::{constant::Constant, decode, DecodeMode, FieldKey, SymbolMap},
    Error, Result,
};

/// Outcome of classification.
#[derive(Debug, Default)]
pub struct Classification {
    /// Plans in patch order
    pub plans: Vec<Plan>,
    /// Patch to target name translation
    pub remapper: Remapper,
    /// Units to decode in full
    pub full: BTreeSet<String>,
}

struct Claim {
    kind: DirectiveKind,
    at: Option<At>,
    source: String,
}

impl Claim {
    fn conflicts(&self, other: &Claim) -> bool {
        let exclusive = |kind| matches!(kind, DirectiveKind::Replace | DirectiveKind::Disable);
        exclusive(self.kind)
            || exclusive(other.kind)
            || (self.kind == DirectiveKind::Hook && other.kind == DirectiveKind::Hook && self.at == other.at)
    }
}

struct Classifier<'s, 'a> {
    set: &'s WorkingSet<'a>,
    resolver: SymbolResolver<'s>,
    out: Classification,
    claims: BTreeMap<MemberTarget, Vec<Claim>>,
}

/// Classifies the patches of `set` against `table`.
///
/// # Errors
/// Returns [`Error::Resolution`] for unresolvable targets and members,
/// [`Error::TransformConflict`] for incompatible directives on one member, and
/// [`Error::Decode`] if a target unit needed for field resolution fails to decode.
pub fn classify(set: &WorkingSet, table: &MappingTable) -> Result<Classification> {
    let mut classifier = Classifier {
        set,
        resolver: SymbolResolver::new(table, InterfaceIndex::from_probes(set.probes.values())),
        out: Classification::default(),
        claims: BTreeMap::new(),
    };

    for (symbolic, class) in &table.classes {
        classifier.out.remapper.bind_class(symbolic, &class.name);
    }

    let mut targets = Vec::with_capacity(set.patches.len());
    for patch in &set.patches {
        let class = classifier.target_of(patch)?;
        classifier.out.remapper.bind_class(patch.name(), &class.name);
        classifier.out.full.insert(class.name.clone());
        targets.push(class);
    }

    for (index, (patch, class)) in set.patches.iter().zip(&targets).enumerate() {
        classifier.bind_references(patch)?;
        for (position, member) in patch.members.iter().enumerate() {
            classifier.member(index, patch, class, position, member)?;
        }
        if let Some(class_mod) = &patch.class_mod {
            let remapper = &classifier.out.remapper;
            let remapped = ClassMod {
                interfaces: class_mod
                    .interfaces
                    .iter()
                    .map(|name| remapper.class(name))
                    .collect(),
                ..class_mod.clone()
            };
            classifier.out.plans.push(Plan {
                target: class.name.clone(),
                patch: index,
                member: None,
                action: Action::ClassMod(remapped),
            });
        }
    }

    log::debug!(
        "classified {} plans, {} units in full, {} class and {} member bindings",
        classifier.out.plans.len(),
        classifier.out.full.len(),
        classifier.out.remapper.class_count(),
        classifier.out.remapper.member_count()
    );
    Ok(classifier.out)
}

impl Classifier<'_, '_> {
    fn target_of(&self, patch: &PatchUnit) -> Result<ResolvedClass> {
        let class = self.resolver.resolve_target(
            patch.target.symbolic.as_deref(),
            patch.target.implementing.as_deref(),
        )?;
        if !self.set.probes.contains_key(&class.name) {
            return Err(Error::Resolution {
                symbol: class.symbolic,
                context: format!("target unit {} is not part of the {} artifact", class.name, self.set.kind),
            });
        }
        Ok(class)
    }

    /// Binds member references of a patch pool that point into mapped classes.
    fn bind_references(&mut self, patch: &PatchUnit) -> Result<()> {
        for (index, constant) in patch.unit.pool.iter() {
            if !matches!(
                constant,
                Constant::Fieldref { .. } | Constant::Methodref { .. } | Constant::InterfaceMethodref { .. }
            ) {
                continue;
            }
            let reference = patch.unit.pool.member_ref(index)?;
            if !self.resolver.is_mapped(reference.owner) {
                continue;
            }
            let class = ResolvedClass {
                symbolic: reference.owner.to_string(),
                name: self.resolver.resolve_class(reference.owner)?,
                via_interface: false,
            };
            let descriptor = self.out.remapper.descriptor(reference.descriptor);
            let target = match reference.kind {
                crate::unit::RefKind::Field => self.resolver.resolve_field(&class, reference.name, &descriptor),
                _ => self.resolver.resolve_method(&class, reference.name, &descriptor),
            }
            .map_err(|error| match error {
                Error::Resolution { symbol, .. } => Error::Resolution {
                    symbol,
                    context: format!("referenced from {}", patch.name()),
                },
                other => other,
            })?;
            self.out
                .remapper
                .bind_member(reference.owner, reference.name, reference.descriptor, &target);
        }
        Ok(())
    }

    fn claim(&mut self, target: &MemberTarget, claim: Claim) -> Result<()> {
        let claims = self.claims.entry(target.clone()).or_default();
        if let Some(first) = claims.iter().find(|existing| existing.conflicts(&claim)) {
            return Err(Error::TransformConflict {
                target: target.owner.clone(),
                member: format!("{}{}", target.name, target.descriptor),
                first: format!("{} from {}", first.kind, first.source),
                second: format!("{} from {}", claim.kind, claim.source),
            });
        }
        claims.push(claim);
        Ok(())
    }

    fn plan(&mut self, target: &str, patch: usize, member: usize, action: Action) {
        self.out.plans.push(Plan {
            target: target.to_string(),
            patch,
            member: Some(member),
            action,
        });
    }

    /// The descriptor of a passthrough field, looked up in the target unit.
    fn field_descriptor(&self, unit: &str, name: &str) -> Result<String> {
        let Some(bytes) = self.set.originals.get(unit) else {
            return Err(Error::Resolution {
                symbol: format!("{unit}.{name}"),
                context: "owner is not loaded".to_string(),
            });
        };
        let decoded = decode(bytes, DecodeMode::Minimal, &self.set.symbols).map_err(|error| error.in_unit(unit))?;
        let mut candidates = decoded.fields.iter().filter(|field| &*field.name == name);
        match (candidates.next(), candidates.next()) {
            (Some(field), None) => Ok(field.descriptor.to_string()),
            (None, _) => Err(Error::Resolution {
                symbol: format!("{unit}.{name}"),
                context: "field does not exist".to_string(),
            }),
            (Some(_), Some(_)) => Err(Error::Resolution {
                symbol: format!("{unit}.{name}"),
                context: "field name is ambiguous".to_string(),
            }),
        }
    }

    fn resolve_site(&self, site: &SiteRef, field: bool) -> Result<SiteRef> {
        if !self.resolver.is_mapped(&site.owner) {
            return Ok(SiteRef {
                owner: self.out.remapper.class(&site.owner),
                name: site.name.clone(),
                descriptor: site
                    .descriptor
                    .as_deref()
                    .map(|descriptor| self.out.remapper.descriptor(descriptor)),
            });
        }
        let class = ResolvedClass {
            symbolic: site.owner.clone(),
            name: self.resolver.resolve_class(&site.owner)?,
            via_interface: false,
        };
        let descriptor = site
            .descriptor
            .as_deref()
            .map(|descriptor| self.out.remapper.descriptor(descriptor))
            .unwrap_or_default();
        let target = if field {
            self.resolver.resolve_field(&class, &site.name, &descriptor)?
        } else {
            self.resolver.resolve_method(&class, &site.name, &descriptor)?
        };
        Ok(SiteRef {
            owner: target.owner,
            name: target.name,
            descriptor: site.descriptor.as_ref().map(|_| target.descriptor),
        })
    }

    fn member(
        &mut self,
        index: usize,
        patch: &PatchUnit,
        class: &ResolvedClass,
        position: usize,
        member: &PatchMember,
    ) -> Result<()> {
        let source = format!("{}.{}", patch.name(), member);
        let descriptor = self.out.remapper.descriptor(&member.descriptor);
        let resolve_method = |this: &Self, name: &str| this.resolver.resolve_method(class, name, &descriptor);

        match &member.directive {
            Directive::Inject => {
                let action = match member.kind {
                    MemberKind::Field => Action::InjectField,
                    MemberKind::Routine => Action::InjectRoutine,
                };
                self.plan(&class.name, index, position, action);
            }
            Directive::Shadow { name } => {
                let field = member.kind == MemberKind::Field;
                let target = if field {
                    self.resolver.resolve_field(class, name, &descriptor)?
                } else {
                    resolve_method(self, name)?
                };
                self.out
                    .remapper
                    .bind_member(patch.name(), &member.name, &member.descriptor, &target);
                self.plan(&class.name, index, position, Action::Shadow { target, field });
            }
            Directive::Replace { name } | Directive::Disable { name } => {
                let target = resolve_method(self, name)?;
                let kind = member.directive.kind();
                self.claim(&target, Claim { kind, at: None, source })?;
                let action = if kind == DirectiveKind::Replace {
                    Action::Replace { target }
                } else {
                    Action::Disable { target }
                };
                self.plan(&class.name, index, position, action);
            }
            Directive::Hook { name, at } => {
                let target = resolve_method(self, name)?;
                self.claim(
                    &target,
                    Claim {
                        kind: DirectiveKind::Hook,
                        at: Some(*at),
                        source,
                    },
                )?;
                self.plan(&class.name, index, position, Action::Callback { public: false });
                self.plan(&class.name, index, position, Action::Hook { target, at: *at });
            }
            Directive::Insert {
                name,
                at,
                site,
                ordinal,
            } => {
                let target = resolve_method(self, name)?;
                self.claim(
                    &target,
                    Claim {
                        kind: DirectiveKind::Insert,
                        at: Some(*at),
                        source,
                    },
                )?;
                let site = site
                    .as_ref()
                    .map(|site| self.resolve_site(site, *at == At::Field))
                    .transpose()?;
                self.plan(
                    &class.name,
                    index,
                    position,
                    Action::Insert {
                        target,
                        at: *at,
                        site,
                        ordinal: *ordinal,
                    },
                );
            }
            Directive::Construct => {
                self.plan(&class.name, index, position, Action::Callback { public: false });
                self.plan(&class.name, index, position, Action::Construct);
            }
            Directive::FieldHook { name } => {
                let mut field = self.resolver.resolve_field(class, name, "")?;
                if field.descriptor.is_empty() {
                    field.descriptor = self.field_descriptor(&class.name, &field.name)?;
                }
                let key = FieldKey::new(&field.owner, &field.name, &field.descriptor);
                let sites: Vec<String> = self
                    .set
                    .probes
                    .values()
                    .filter(|probe| probe.references(&key))
                    .map(|probe| probe.name.clone())
                    .collect();
                self.out.full.extend(sites.iter().cloned());
                self.plan(&class.name, index, position, Action::Callback { public: true });
                self.plan(&class.name, index, position, Action::FieldHook { field, sites });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        file::{Artifact, ArtifactKind},
        test::factories::{alpha_artifact, alpha_mapping, alpha_patches, directive},
        unit::{annotation::ElementValue, opcodes::*, AccessFlags, UnitBuilder},
    };

    fn patches_of(units: Vec<UnitBuilder>) -> Artifact {
        let mut patches = Artifact::new(ArtifactKind::Target);
        for (position, builder) in units.into_iter().enumerate() {
            patches.insert(format!("p/Patch{position}"), builder.bytes().unwrap());
        }
        patches
    }

    fn patch_unit(name: &str) -> UnitBuilder {
        UnitBuilder::new(name)
            .annotation(directive("Patch").with("value", ElementValue::String("Alpha".into())))
    }

    #[test]
    fn alpha_plans_and_bindings() {
        let artifact = alpha_artifact();
        let patches = alpha_patches();
        let set = WorkingSet::load(&artifact, &patches).unwrap();
        let table = alpha_mapping();
        let classified = classify(&set, &table).unwrap();

        assert_eq!(classified.full, BTreeSet::from(["a7".to_string()]));
        let kinds: Vec<_> = classified.plans.iter().map(Plan::kind).collect();
        assert_eq!(
            kinds,
            vec![
                DirectiveKind::Shadow,
                DirectiveKind::Inject,
                DirectiveKind::Inject,
                DirectiveKind::Inject,
                DirectiveKind::Hook
            ]
        );

        let remapper = &classified.remapper;
        assert_eq!(remapper.class("patches/AlphaPatch"), "a7");
        assert_eq!(remapper.class("Alpha"), "a7");
        assert_eq!(
            remapper.member_binding("patches/AlphaPatch", "counter", "I"),
            Some(("b", "I"))
        );
        let hook = classified.plans.last().unwrap();
        assert_eq!(
            hook.action,
            Action::Hook {
                target: MemberTarget {
                    owner: "a7".into(),
                    name: "c".into(),
                    descriptor: "()V".into()
                },
                at: At::Head
            }
        );
    }

    #[test]
    fn replace_conflicts_with_hook() {
        let hook = directive("Hook")
            .with("value", ElementValue::String("tick".into()))
            .with(
                "at",
                ElementValue::Enum {
                    type_name: "Lclassweave/api/At;".into(),
                    name: "RETURN".into(),
                },
            );
        let patches = patches_of(vec![
            patch_unit("p/Patch0").annotated_routine(
                AccessFlags::PUBLIC,
                "tick",
                "()V",
                &[directive("Replace")],
                |code| {
                    code.op(RETURN);
                },
            ),
            patch_unit("p/Patch1").annotated_routine(AccessFlags::PUBLIC, "after", "()V", &[hook], |code| {
                code.op(RETURN);
            }),
        ]);
        let artifact = alpha_artifact();
        let set = WorkingSet::load(&artifact, &patches).unwrap();
        let table = alpha_mapping();
        assert!(matches!(
            classify(&set, &table),
            Err(Error::TransformConflict { ref target, .. }) if target == "a7"
        ));
    }

    #[test]
    fn unmapped_member_fails_fast() {
        let patches = patches_of(vec![patch_unit("p/Patch0").annotated_routine(
            AccessFlags::PUBLIC,
            "reset",
            "()V",
            &[directive("Replace")],
            |code| {
                code.op(RETURN);
            },
        )]);
        let artifact = alpha_artifact();
        let set = WorkingSet::load(&artifact, &patches).unwrap();
        let table = alpha_mapping();
        assert!(matches!(classify(&set, &table), Err(Error::Resolution { .. })));
    }

    #[test]
    fn field_hook_sites_are_decoded_in_full() {
        let patches = patches_of(vec![patch_unit("p/Patch0").annotated_routine(
            AccessFlags::PUBLIC,
            "changed",
            "()V",
            &[directive("FieldHook").with("value", ElementValue::String("counter".into()))],
            |code| {
                code.op(RETURN);
            },
        )]);
        let mut artifact = alpha_artifact();
        artifact.insert(
            "w",
            UnitBuilder::new("w")
                .routine(AccessFlags::PUBLIC | AccessFlags::STATIC, "z", "(La7;)V", |code| {
                    code.var(ALOAD, 0).int(0).field(PUTFIELD, "a7", "b", "I").op(RETURN);
                })
                .bytes()
                .unwrap(),
        );
        let set = WorkingSet::load(&artifact, &patches).unwrap();
        let table = alpha_mapping();
        let classified = classify(&set, &table).unwrap();
        assert_eq!(
            classified.full,
            BTreeSet::from(["a7".to_string(), "w".to_string()])
        );
        let Some(Plan {
            action: Action::FieldHook { field, sites },
            ..
        }) = classified.plans.last()
        else {
            panic!("no field hook planned");
        };
        assert_eq!(field.to_string(), "a7.b:I");
        assert_eq!(sites, &["a7".to_string(), "w".to_string()]);
    }
}
