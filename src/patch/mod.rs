//! Patch units and their directives.
//!
//! A patch unit is an ordinary compiled class whose annotations say what to do with it. The
//! class carries `@Patch` naming its target, optionally `@ClassMod`, and every member carries
//! one directive annotation from the `classweave/api/` package. [`PatchUnit::from_unit`]
//! turns those annotations into a typed [`Directive`] per member and rejects members whose
//! directives are missing, duplicated or malformed, so that everything after the load phase
//! can rely on "exactly one directive per member".
//!
//! # Directive vocabulary
//!
//! | Annotation   | Member  | Effect |
//! |--------------|---------|--------|
//! | `Inject`     | both    | copy the member into the target unless it already exists |
//! | `Shadow`     | both    | bind the member to an existing target member, nothing is copied |
//! | `Replace`    | routine | replace the body of a target routine |
//! | `Hook`       | routine | copy as callback, call it at `HEAD` or `RETURN` of a target routine |
//! | `Insert`     | routine | inline the body at `HEAD`, `RETURN`, `TAIL`, `INVOKE` or `FIELD` |
//! | `Construct`  | routine | copy as callback, call it at the end of every root constructor |
//! | `Disable`    | routine | make a target routine return its default value |
//! | `FieldHook`  | routine | copy as callback, call it after every write of a target field |
//! | `ClassMod`   | unit    | change access flags and add interfaces |
//!
//! Synthetic routines (lambda bodies) without directive are injected implicitly. Constructors
//! and static initializers of patch units are ignored.

mod directive;

pub use directive::{ClassMod, SiteRef};

use std::fmt;

use serde::Serialize;
use strum::{Display, EnumIter, EnumString};

use crate::{
    unit::{descriptor::MethodDescriptor, AccessFlags, CodeUnit, DecodeMode, FieldMember, RoutineMember},
    Error, Result,
};

/// Package of the directive annotations.
pub const API_PACKAGE: &str = "classweave/api/";

/// Insertion point of a [`Directive::Hook`] or [`Directive::Insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "UPPERCASE")]
pub enum At {
    /// Routine entry, after the delegating constructor call in `<init>`
    Head,
    /// Before every return
    Return,
    /// Before the last return
    Tail,
    /// Before calls to a given method
    Invoke,
    /// Before accesses of a given field
    Field,
}

/// Directive kinds, used for statistics and conflict messages.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, Serialize,
)]
pub enum DirectiveKind {
    /// [`Directive::Inject`]
    Inject,
    /// [`Directive::Shadow`]
    Shadow,
    /// [`Directive::Replace`]
    Replace,
    /// [`Directive::Hook`]
    Hook,
    /// [`Directive::Insert`]
    Insert,
    /// [`Directive::Construct`]
    Construct,
    /// [`Directive::Disable`]
    Disable,
    /// [`Directive::FieldHook`]
    FieldHook,
    /// A unit-level [`ClassMod`]
    ClassMod,
}

/// One member-level directive with its parameters.
///
/// Member names in parameters are symbolic. They are resolved during the classify phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Copy the member into the target
    Inject,
    /// Bind the member to target member `name`
    Shadow {
        /// Symbolic name of the existing member
        name: String,
    },
    /// Replace the body of target routine `name`
    Replace {
        /// Symbolic routine name
        name: String,
    },
    /// Call the member from target routine `name`
    Hook {
        /// Symbolic routine name
        name: String,
        /// [`At::Head`] or [`At::Return`]
        at: At,
    },
    /// Inline the member body into target routine `name`
    Insert {
        /// Symbolic routine name
        name: String,
        /// Insertion point
        at: At,
        /// Call or field site for [`At::Invoke`] and [`At::Field`]
        site: Option<SiteRef>,
        /// Occurrence to insert at, `-1` for all
        ordinal: i32,
    },
    /// Call the member at the end of every root constructor
    Construct,
    /// Make target routine `name` return its default value
    Disable {
        /// Symbolic routine name
        name: String,
    },
    /// Call the member after every write of target field `name`
    FieldHook {
        /// Symbolic field name
        name: String,
    },
}

impl Directive {
    /// The kind of this directive.
    #[must_use]
    pub fn kind(&self) -> DirectiveKind {
        match self {
            Directive::Inject => DirectiveKind::Inject,
            Directive::Shadow { .. } => DirectiveKind::Shadow,
            Directive::Replace { .. } => DirectiveKind::Replace,
            Directive::Hook { .. } => DirectiveKind::Hook,
            Directive::Insert { .. } => DirectiveKind::Insert,
            Directive::Construct => DirectiveKind::Construct,
            Directive::Disable { .. } => DirectiveKind::Disable,
            Directive::FieldHook { .. } => DirectiveKind::FieldHook,
        }
    }

    /// Returns `true` if the patch routine is copied into the target as a callback.
    #[must_use]
    pub fn copies_callback(&self) -> bool {
        matches!(
            self,
            Directive::Hook { .. } | Directive::Construct | Directive::FieldHook { .. }
        )
    }
}

/// Whether a patch member is a field or a routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// A field
    Field,
    /// A routine
    Routine,
}

/// A patch member with its directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchMember {
    /// Field or routine
    pub kind: MemberKind,
    /// Position in the unit's field or routine list
    pub index: usize,
    /// Member name in the patch unit
    pub name: String,
    /// Member descriptor in the patch unit
    pub descriptor: String,
    /// The directive
    pub directive: Directive,
    /// Synthetic routine injected without annotation
    pub implicit: bool,
}

impl fmt::Display for PatchMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MemberKind::Field => write!(f, "{}:{}", self.name, self.descriptor),
            MemberKind::Routine => write!(f, "{}{}", self.name, self.descriptor),
        }
    }
}

/// The unit a patch applies to.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PatchTarget {
    /// Symbolic class name
    pub symbolic: Option<String>,
    /// Interface whose unique implementor is the target, used when `symbolic` is unmapped
    pub implementing: Option<String>,
}

/// A decoded patch unit with validated directives.
#[derive(Debug, Clone)]
pub struct PatchUnit {
    /// The fully decoded unit
    pub unit: CodeUnit,
    /// Target reference
    pub target: PatchTarget,
    /// Unit-level modifications
    pub class_mod: Option<ClassMod>,
    /// Members with directives, fields first, each in declaration order
    pub members: Vec<PatchMember>,
}

impl PatchUnit {
    /// Extracts the directives of a fully decoded unit.
    ///
    /// # Errors
    /// Returns [`Error::Directive`] if the unit has no `@Patch`, a member has no directive
    /// or several, a directive is not allowed on the member, or a parameter is malformed.
    /// Returns [`Error::Transform`] if the unit was not decoded in full.
    pub fn from_unit(unit: CodeUnit) -> Result<PatchUnit> {
        if unit.mode() != DecodeMode::Full {
            return Err(transform_error!(unit.name(), "patch units must be decoded in full"));
        }

        let annotations = unit.annotations()?;
        let target = directive::patch_target(unit.name(), &annotations)?;
        let class_mod = directive::class_mod(unit.name(), &annotations)?;

        let mut members = Vec::new();
        for (index, field) in unit.fields.iter().enumerate() {
            if let Some(member) = field_member(&unit, index, field)? {
                members.push(member);
            }
        }
        for (index, routine) in unit.routines.iter().enumerate() {
            if let Some(member) = routine_member(&unit, index, routine)? {
                members.push(member);
            }
        }

        log::debug!(
            "patch {} targets {:?} with {} directives",
            unit.name(),
            target,
            members.len()
        );
        Ok(PatchUnit {
            unit,
            target,
            class_mod,
            members,
        })
    }

    /// Internal name of the patch unit.
    #[must_use]
    pub fn name(&self) -> &str {
        self.unit.name()
    }

    /// The field a member refers to.
    #[must_use]
    pub fn field(&self, member: &PatchMember) -> Option<&FieldMember> {
        match member.kind {
            MemberKind::Field => self.unit.fields.get(member.index),
            MemberKind::Routine => None,
        }
    }

    /// The routine a member refers to.
    #[must_use]
    pub fn routine(&self, member: &PatchMember) -> Option<&RoutineMember> {
        match member.kind {
            MemberKind::Routine => self.unit.routines.get(member.index),
            MemberKind::Field => None,
        }
    }
}

fn directive_error(unit: &CodeUnit, member: &str, message: impl Into<String>) -> Error {
    Error::Directive {
        unit: unit.name().to_string(),
        member: member.to_string(),
        message: message.into(),
    }
}

fn field_member(unit: &CodeUnit, index: usize, field: &FieldMember) -> Result<Option<PatchMember>> {
    let annotations = crate::unit::annotation::collect(&field.attributes, &unit.pool)?;
    let Some(directive) = directive::member_directive(unit, &field.name, &annotations)? else {
        return Err(directive_error(unit, &field.name, "field without directive"));
    };
    if !matches!(directive, Directive::Inject | Directive::Shadow { .. }) {
        return Err(directive_error(
            unit,
            &field.name,
            format!("{} is not allowed on fields", directive.kind()),
        ));
    }
    Ok(Some(PatchMember {
        kind: MemberKind::Field,
        index,
        name: field.name.to_string(),
        descriptor: field.descriptor.to_string(),
        directive,
        implicit: false,
    }))
}

fn routine_member(
    unit: &CodeUnit,
    index: usize,
    routine: &RoutineMember,
) -> Result<Option<PatchMember>> {
    let label = format!("{}{}", routine.name, routine.descriptor);
    let annotations = crate::unit::annotation::collect(&routine.attributes, &unit.pool)?;
    let directive = directive::member_directive(unit, &label, &annotations)?;

    let (directive, implicit) = match directive {
        Some(directive) => (directive, false),
        None if routine.name.starts_with('<') => return Ok(None),
        None if routine.access.contains(AccessFlags::SYNTHETIC) => (Directive::Inject, true),
        None => return Err(directive_error(unit, &label, "routine without directive")),
    };

    let needs_body = !matches!(directive, Directive::Shadow { .. } | Directive::Disable { .. });
    if needs_body && routine.code().is_none() {
        return Err(directive_error(
            unit,
            &label,
            format!("{} needs a routine with body", directive.kind()),
        ));
    }

    let parsed = MethodDescriptor::parse(&routine.descriptor)?;
    let void_only = matches!(
        directive,
        Directive::Hook { .. }
            | Directive::Insert { .. }
            | Directive::Construct
            | Directive::FieldHook { .. }
    );
    if void_only && !parsed.returns_void() {
        return Err(directive_error(
            unit,
            &label,
            format!("{} routines must return void", directive.kind()),
        ));
    }
    if matches!(directive, Directive::Construct | Directive::FieldHook { .. }) && !parsed.params.is_empty() {
        return Err(directive_error(
            unit,
            &label,
            format!("{} routines take no arguments", directive.kind()),
        ));
    }

    Ok(Some(PatchMember {
        kind: MemberKind::Routine,
        index,
        name: routine.name.to_string(),
        descriptor: routine.descriptor.to_string(),
        directive,
        implicit,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        test::factories::directive,
        unit::{annotation::ElementValue, opcodes::*, Annotation, UnitBuilder},
    };

    fn patch_annotation(target: &str) -> Annotation {
        directive("Patch").with("value", ElementValue::String(target.to_string()))
    }

    #[test]
    fn extracts_member_directives() {
        let unit = UnitBuilder::new("patches/AlphaPatch")
            .annotation(patch_annotation("Alpha"))
            .annotated_field(AccessFlags::PUBLIC, "counter", "I", &[directive("Inject")])
            .annotated_field(
                AccessFlags::PRIVATE,
                "shadowTicks",
                "J",
                &[directive("Shadow").with("value", ElementValue::String("ticks".into()))],
            )
            .routine(AccessFlags::PUBLIC, "<init>", "()V", |code| {
                code.var(ALOAD, 0)
                    .invoke(INVOKESPECIAL, "java/lang/Object", "<init>", "()V")
                    .op(RETURN);
            })
            .annotated_routine(
                AccessFlags::PUBLIC,
                "onTick",
                "()V",
                &[directive("Hook")
                    .with("value", ElementValue::String("tick".into()))
                    .with(
                        "at",
                        ElementValue::Enum {
                            type_name: "Lclassweave/api/At;".into(),
                            name: "RETURN".into(),
                        },
                    )],
                |code| {
                    code.op(RETURN);
                },
            )
            .routine(AccessFlags::PRIVATE | AccessFlags::SYNTHETIC, "lambda$0", "()V", |code| {
                code.op(RETURN);
            })
            .build()
            .unwrap();

        let patch = PatchUnit::from_unit(unit).unwrap();
        assert_eq!(patch.target.symbolic.as_deref(), Some("Alpha"));
        assert!(patch.class_mod.is_none());
        let directives: Vec<_> = patch.members.iter().map(|m| m.directive.clone()).collect();
        assert_eq!(
            directives,
            vec![
                Directive::Inject,
                Directive::Shadow {
                    name: "ticks".into()
                },
                Directive::Hook {
                    name: "tick".into(),
                    at: At::Return
                },
                Directive::Inject,
            ]
        );
        assert!(patch.members[3].implicit);
        assert_eq!(patch.members[1].to_string(), "shadowTicks:J");
        assert!(patch.field(&patch.members[0]).is_some());
        assert!(patch.routine(&patch.members[0]).is_none());
    }

    #[test]
    fn rejects_missing_and_duplicate_directives() {
        let missing = UnitBuilder::new("p/A")
            .annotation(patch_annotation("Alpha"))
            .routine(AccessFlags::PUBLIC, "helper", "()V", |code| {
                code.op(RETURN);
            })
            .build()
            .unwrap();
        assert!(matches!(
            PatchUnit::from_unit(missing),
            Err(Error::Directive { .. })
        ));

        let duplicate = UnitBuilder::new("p/A")
            .annotation(patch_annotation("Alpha"))
            .annotated_field(
                AccessFlags::PUBLIC,
                "x",
                "I",
                &[directive("Inject"), directive("Shadow")],
            )
            .build()
            .unwrap();
        assert!(matches!(
            PatchUnit::from_unit(duplicate),
            Err(Error::Directive { .. })
        ));

        let no_patch = UnitBuilder::new("p/A").build().unwrap();
        assert!(matches!(
            PatchUnit::from_unit(no_patch),
            Err(Error::Directive { .. })
        ));
    }

    #[test]
    fn rejects_misplaced_directives() {
        let replace_on_field = UnitBuilder::new("p/A")
            .annotation(patch_annotation("Alpha"))
            .annotated_field(
                AccessFlags::PUBLIC,
                "x",
                "I",
                &[directive("Replace").with("value", ElementValue::String("x".into()))],
            )
            .build()
            .unwrap();
        assert!(PatchUnit::from_unit(replace_on_field).is_err());

        let non_void_hook = UnitBuilder::new("p/A")
            .annotation(patch_annotation("Alpha"))
            .annotated_routine(
                AccessFlags::PUBLIC,
                "h",
                "()I",
                &[directive("Hook").with("value", ElementValue::String("tick".into())).with(
                    "at",
                    ElementValue::Enum {
                        type_name: "Lclassweave/api/At;".into(),
                        name: "HEAD".into(),
                    },
                )],
                |code| {
                    code.op(ICONST_0).op(IRETURN);
                },
            )
            .build()
            .unwrap();
        assert!(PatchUnit::from_unit(non_void_hook).is_err());
    }
}
