//! Annotation to directive translation.

use std::str::FromStr;

use crate::{
    patch::{At, Directive, PatchTarget, API_PACKAGE},
    unit::{annotation::ElementValue, AccessFlags, Annotation, CodeUnit},
    Error, Result,
};

/// Unit-level modifications requested with `@ClassMod`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMod {
    /// Access flags to set
    pub add: AccessFlags,
    /// Access flags to clear
    pub remove: AccessFlags,
    /// Interfaces to add, with patch-side names
    pub interfaces: Vec<String>,
}

/// A call or field site named by an `Insert` directive.
///
/// Written as `Owner.name(descriptor)` for routines and `Owner.name:descriptor` for fields.
/// The descriptor may be left out to match every overload. The owner is symbolic if the
/// mapping table knows it, and passes through unchanged otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteRef {
    /// Owner class
    pub owner: String,
    /// Member name
    pub name: String,
    /// Member descriptor, `None` matches any
    pub descriptor: Option<String>,
}

impl FromStr for SiteRef {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        let (path, descriptor) = match (value.find('('), value.find(':')) {
            (Some(paren), _) => (&value[..paren], Some(&value[paren..])),
            (None, Some(colon)) => (&value[..colon], Some(&value[colon + 1..])),
            (None, None) => (value, None),
        };
        let Some((owner, name)) = path.rsplit_once('.') else {
            return Err(malformed_error!("Site {} is not of the form Owner.member", value));
        };
        if owner.is_empty() || name.is_empty() || descriptor.is_some_and(str::is_empty) {
            return Err(malformed_error!("Site {} is incomplete", value));
        }
        Ok(SiteRef {
            owner: owner.to_string(),
            name: name.to_string(),
            descriptor: descriptor.map(str::to_string),
        })
    }
}

fn api_name(annotation: &Annotation) -> Option<&str> {
    annotation.type_name.strip_prefix(API_PACKAGE)
}

fn string_param(annotation: &Annotation, name: &str) -> Option<String> {
    annotation
        .get(name)
        .and_then(ElementValue::as_str)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Reads `@Patch`.
pub(super) fn patch_target(unit: &str, annotations: &[Annotation]) -> Result<PatchTarget> {
    let Some(patch) = annotations
        .iter()
        .find(|annotation| api_name(annotation) == Some("Patch"))
    else {
        return Err(Error::Directive {
            unit: unit.to_string(),
            member: "<unit>".to_string(),
            message: "missing @Patch".to_string(),
        });
    };

    let target = PatchTarget {
        symbolic: string_param(patch, "value"),
        implementing: string_param(patch, "implementing"),
    };
    if target.symbolic.is_none() && target.implementing.is_none() {
        return Err(Error::Directive {
            unit: unit.to_string(),
            member: "<unit>".to_string(),
            message: "@Patch names no target".to_string(),
        });
    }
    Ok(target)
}

/// Reads `@ClassMod`, if present.
pub(super) fn class_mod(unit: &str, annotations: &[Annotation]) -> Result<Option<ClassMod>> {
    let Some(annotation) = annotations
        .iter()
        .find(|annotation| api_name(annotation) == Some("ClassMod"))
    else {
        return Ok(None);
    };

    let flags = |name: &str| -> Result<AccessFlags> {
        match annotation.get(name) {
            None => Ok(AccessFlags::empty()),
            Some(value) => value
                .as_int()
                .and_then(|bits| u16::try_from(bits).ok())
                .map(AccessFlags::from_bits_retain)
                .ok_or_else(|| Error::Directive {
                    unit: unit.to_string(),
                    member: "<unit>".to_string(),
                    message: format!("@ClassMod {name} must be an int flag set"),
                }),
        }
    };

    let mut interfaces = Vec::new();
    if let Some(value) = annotation.get("interfaces") {
        let values = match value {
            ElementValue::Array(values) => values.as_slice(),
            single => std::slice::from_ref(single),
        };
        for value in values {
            match value.as_str() {
                Some(name) => interfaces.push(name.to_string()),
                None => {
                    return Err(Error::Directive {
                        unit: unit.to_string(),
                        member: "<unit>".to_string(),
                        message: "@ClassMod interfaces must be strings".to_string(),
                    })
                }
            }
        }
    }

    Ok(Some(ClassMod {
        add: flags("add")?,
        remove: flags("remove")?,
        interfaces,
    }))
}

fn at_param(annotation: &Annotation) -> Result<At> {
    let Some(value) = annotation.get("at") else {
        return Err(malformed_error!("missing at"));
    };
    let name = value
        .as_enum()
        .or_else(|| value.as_str())
        .ok_or_else(|| malformed_error!("at must be an At constant"))?;
    At::from_str(name).map_err(|_| malformed_error!("unknown insertion point {}", name))
}

fn parse_directive(annotation: &Annotation, kind: &str, member: &str) -> Result<Directive> {
    // symbolic names default to the patch member's own name
    let default_name = member.split('(').next().unwrap_or(member);
    let name = || string_param(annotation, "value").unwrap_or_else(|| default_name.to_string());

    Ok(match kind {
        "Inject" => Directive::Inject,
        "Shadow" => Directive::Shadow { name: name() },
        "Replace" => Directive::Replace { name: name() },
        "Disable" => Directive::Disable { name: name() },
        "Construct" => Directive::Construct,
        "Hook" => {
            let at = at_param(annotation)?;
            if !matches!(at, At::Head | At::Return) {
                return Err(malformed_error!("hooks only support HEAD and RETURN, not {}", at));
            }
            Directive::Hook { name: name(), at }
        }
        "Insert" => {
            let at = at_param(annotation)?;
            let site = string_param(annotation, "target")
                .map(|site| site.parse::<SiteRef>())
                .transpose()?;
            if matches!(at, At::Invoke | At::Field) && site.is_none() {
                return Err(malformed_error!("{} insertion needs a target", at));
            }
            let ordinal = match annotation.get("ordinal") {
                None => -1,
                Some(value) => value
                    .as_int()
                    .ok_or_else(|| malformed_error!("ordinal must be an int"))?,
            };
            if ordinal < -1 {
                return Err(malformed_error!("ordinal {} is negative", ordinal));
            }
            Directive::Insert {
                name: name(),
                at,
                site,
                ordinal,
            }
        }
        "FieldHook" => match string_param(annotation, "value") {
            Some(name) => Directive::FieldHook { name },
            None => return Err(malformed_error!("FieldHook needs a field name")),
        },
        other => return Err(malformed_error!("unknown directive {}", other)),
    })
}

/// Reads the directive of one member. `Patch` and `ClassMod` are unit-level and ignored here.
pub(super) fn member_directive(
    unit: &CodeUnit,
    member: &str,
    annotations: &[Annotation],
) -> Result<Option<Directive>> {
    let mut found: Option<Directive> = None;
    for annotation in annotations {
        let Some(kind) = api_name(annotation) else {
            continue;
        };
        if matches!(kind, "Patch" | "ClassMod") {
            continue;
        }

        let directive = parse_directive(annotation, kind, member).map_err(|error| {
            let message = match error {
                Error::Malformed { message, .. } => message,
                other => other.to_string(),
            };
            Error::Directive {
                unit: unit.name().to_string(),
                member: member.to_string(),
                message,
            }
        })?;

        if let Some(first) = &found {
            return Err(Error::Directive {
                unit: unit.name().to_string(),
                member: member.to_string(),
                message: format!("both {} and {}", first.kind(), directive.kind()),
            });
        }
        found = Some(directive);
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_refs() {
        let routine: SiteRef = "Beta.process(I)V".parse().unwrap();
        assert_eq!(routine.owner, "Beta");
        assert_eq!(routine.name, "process");
        assert_eq!(routine.descriptor.as_deref(), Some("(I)V"));

        let field: SiteRef = "java/lang/System.out:Ljava/io/PrintStream;".parse().unwrap();
        assert_eq!(field.owner, "java/lang/System");
        assert_eq!(field.name, "out");
        assert_eq!(field.descriptor.as_deref(), Some("Ljava/io/PrintStream;"));

        let any: SiteRef = "Beta.reset".parse().unwrap();
        assert!(any.descriptor.is_none());

        assert!("reset".parse::<SiteRef>().is_err());
        assert!("Beta.".parse::<SiteRef>().is_err());
        assert!("Beta.x:".parse::<SiteRef>().is_err());
    }

    #[test]
    fn insert_parameters() {
        let annotation = Annotation::new("classweave/api/Insert")
            .with("value", ElementValue::String("tick".into()))
            .with("at", ElementValue::Enum { type_name: "Lclassweave/api/At;".into(), name: "INVOKE".into() })
            .with("target", ElementValue::String("Beta.process(I)V".into()))
            .with("ordinal", ElementValue::Int { tag: b'I', value: 1 });
        let directive = parse_directive(&annotation, "Insert", "onTick()V").unwrap();
        assert_eq!(
            directive,
            Directive::Insert {
                name: "tick".into(),
                at: At::Invoke,
                site: Some("Beta.process(I)V".parse().unwrap()),
                ordinal: 1,
            }
        );

        let missing_site = Annotation::new("classweave/api/Insert")
            .with("at", ElementValue::Enum { type_name: "Lclassweave/api/At;".into(), name: "FIELD".into() });
        assert!(parse_directive(&missing_site, "Insert", "x()V").is_err());

        let defaulted = Annotation::new("classweave/api/Replace");
        assert_eq!(
            parse_directive(&defaulted, "Replace", "tick()V").unwrap(),
            Directive::Replace { name: "tick".into() }
        );
    }

    #[test]
    fn class_mod_flags_and_interfaces() {
        let annotation = Annotation::new("classweave/api/ClassMod")
            .with("add", ElementValue::Int { tag: b'I', value: 0x0001 })
            .with("remove", ElementValue::Int { tag: b'I', value: 0x0010 })
            .with(
                "interfaces",
                ElementValue::Array(vec![ElementValue::String("api/Client".into())]),
            );
        let parsed = class_mod("p/A", &[annotation]).unwrap().unwrap();
        assert_eq!(parsed.add, AccessFlags::PUBLIC);
        assert_eq!(parsed.remove, AccessFlags::FINAL);
        assert_eq!(parsed.interfaces, vec!["api/Client"]);
        assert!(class_mod("p/A", &[]).unwrap().is_none());
    }
}
