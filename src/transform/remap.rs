//! Translation of patch-side names into target names.

use rustc_hash::FxHashMap;

use crate::{mapping::MemberTarget, unit::SymbolMap};

type MemberKey = (String, String, String);

/// Maps the names a patch unit was compiled against onto the names of the artifact.
///
/// Class bindings cover patch units (a patch unit's own name stands for its target) and
/// every symbolic class of the mapping table. Member bindings cover shadowed members and
/// every member reference into a mapped class. Names without binding pass through.
#[derive(Debug, Clone, Default)]
pub struct Remapper {
    classes: FxHashMap<String, String>,
    members: FxHashMap<MemberKey, (String, String)>,
}

impl Remapper {
    /// A remapper without bindings.
    #[must_use]
    pub fn new() -> Self {
        Remapper::default()
    }

    /// Binds a patch-side class name.
    pub fn bind_class(&mut self, from: &str, to: &str) {
        if from != to {
            self.classes.insert(from.to_string(), to.to_string());
        }
    }

    /// Binds a patch-side member reference to a target member.
    ///
    /// `owner` and `descriptor` are as written in the patch unit, before any remapping.
    pub fn bind_member(&mut self, owner: &str, name: &str, descriptor: &str, target: &MemberTarget) {
        self.members.insert(
            (owner.to_string(), name.to_string(), descriptor.to_string()),
            (target.name.clone(), target.descriptor.clone()),
        );
    }

    /// The target `(name, descriptor)` a member reference is bound to.
    #[must_use]
    pub fn member_binding(&self, owner: &str, name: &str, descriptor: &str) -> Option<(&str, &str)> {
        self.members
            .get(&(owner.to_string(), name.to_string(), descriptor.to_string()))
            .map(|(name, descriptor)| (name.as_str(), descriptor.as_str()))
    }

    /// Number of class bindings.
    #[must_use]
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Number of member bindings.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }
}

impl SymbolMap for Remapper {
    fn class(&self, name: &str) -> String {
        self.classes
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }

    fn member(&self, owner: &str, name: &str, descriptor: &str, _is_field: bool) -> (String, String) {
        match self.member_binding(owner, name, descriptor) {
            Some((name, descriptor)) => (name.to_string(), descriptor.to_string()),
            None => (name.to_string(), self.descriptor(descriptor)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classes_and_descriptors() {
        let mut remapper = Remapper::new();
        remapper.bind_class("patches/AlphaPatch", "a7");
        remapper.bind_class("Beta", "k");
        remapper.bind_class("same", "same");
        assert_eq!(remapper.class_count(), 2);

        assert_eq!(remapper.class("patches/AlphaPatch"), "a7");
        assert_eq!(remapper.class("java/lang/String"), "java/lang/String");
        assert_eq!(
            remapper.descriptor("(LBeta;[LBeta;I)Lpatches/AlphaPatch;"),
            "(Lk;[Lk;I)La7;"
        );
        assert_eq!(remapper.class_constant("[LBeta;"), "[Lk;");
    }

    #[test]
    fn member_bindings_win() {
        let mut remapper = Remapper::new();
        remapper.bind_class("Beta", "k");
        remapper.bind_member(
            "Beta",
            "process",
            "(LBeta;)V",
            &MemberTarget {
                owner: "k".into(),
                name: "q".into(),
                descriptor: "(Lk;)V".into(),
            },
        );
        assert_eq!(
            remapper.member("Beta", "process", "(LBeta;)V", false),
            ("q".to_string(), "(Lk;)V".to_string())
        );
        assert_eq!(
            remapper.member("Beta", "other", "(LBeta;)V", false),
            ("other".to_string(), "(Lk;)V".to_string())
        );
        assert_eq!(remapper.member_count(), 1);
    }
}
