//! Field and method descriptors.
//!
//! Descriptors are kept as strings everywhere in the model. This module only slices them into
//! their component types, counts local slots and rewrites the class names embedded in them.

use crate::Result;

/// A method descriptor split into parameter types and return type.
///
/// Slices borrow from the descriptor string, nothing is allocated apart from the vector.
///
/// ```rust
/// use classweave::unit::descriptor::MethodDescriptor;
///
/// let desc = MethodDescriptor::parse("(IJ[Ljava/lang/String;)V")?;
/// assert_eq!(desc.params, vec!["I", "J", "[Ljava/lang/String;"]);
/// assert_eq!(desc.ret, "V");
/// assert_eq!(desc.arg_slots(), 4);
/// # Ok::<(), classweave::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDescriptor<'a> {
    /// Parameter field types in declaration order
    pub params: Vec<&'a str>,
    /// Return type, `V` for void
    pub ret: &'a str,
}

impl<'a> MethodDescriptor<'a> {
    /// Split a method descriptor.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the descriptor is not of the form `(params)ret`.
    pub fn parse(descriptor: &'a str) -> Result<Self> {
        let bytes = descriptor.as_bytes();
        if bytes.first() != Some(&b'(') {
            return Err(malformed_error!("Invalid method descriptor '{}'", descriptor));
        }

        let mut params = Vec::new();
        let mut pos = 1;
        while bytes.get(pos) != Some(&b')') {
            if pos >= bytes.len() {
                return Err(malformed_error!("Unterminated method descriptor '{}'", descriptor));
            }
            let end = field_type_end(bytes, pos)?;
            params.push(&descriptor[pos..end]);
            pos = end;
        }

        let ret = &descriptor[pos + 1..];
        if ret != "V" && field_type_end(bytes, pos + 1)? != bytes.len() {
            return Err(malformed_error!("Invalid return type in '{}'", descriptor));
        }

        Ok(MethodDescriptor { params, ret })
    }

    /// Number of local variable slots taken by the parameters, excluding `this`.
    #[must_use]
    pub fn arg_slots(&self) -> u16 {
        self.params.iter().map(|param| slot_size(param)).sum()
    }

    /// Returns `true` for a `V` return type.
    #[must_use]
    pub fn returns_void(&self) -> bool {
        self.ret == "V"
    }
}

fn field_type_end(bytes: &[u8], start: usize) -> Result<usize> {
    let mut pos = start;
    while bytes.get(pos) == Some(&b'[') {
        pos += 1;
    }
    match bytes.get(pos) {
        Some(b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z') => Ok(pos + 1),
        Some(b'L') => bytes[pos..]
            .iter()
            .position(|b| *b == b';')
            .map(|semi| pos + semi + 1)
            .ok_or_else(|| malformed_error!("Unterminated class type in descriptor")),
        _ => Err(malformed_error!("Invalid field type at descriptor position {}", start)),
    }
}

/// Local variable and operand stack slots taken by a value of this field type.
#[must_use]
pub fn slot_size(field_type: &str) -> u16 {
    match field_type.as_bytes().first() {
        Some(b'J' | b'D') => 2,
        Some(b'V') | None => 0,
        _ => 1,
    }
}

/// The internal class name of an object field type (`Lfoo/Bar;` to `foo/Bar`).
#[must_use]
pub fn class_of(field_type: &str) -> Option<&str> {
    field_type.strip_prefix('L')?.strip_suffix(';')
}

/// Rewrite every class name embedded in a field or method descriptor.
///
/// ```rust
/// use classweave::unit::descriptor::remap;
///
/// let out = remap("(LAlpha;I)[LBeta;", |name| match name {
///     "Alpha" => "a7".to_string(),
///     other => other.to_string(),
/// });
/// assert_eq!(out, "(La7;I)[LBeta;");
/// ```
pub fn remap(descriptor: &str, mut map: impl FnMut(&str) -> String) -> String {
    if !descriptor.contains('L') {
        return descriptor.to_string();
    }

    let mut out = String::with_capacity(descriptor.len());
    let mut rest = descriptor;
    while let Some(start) = rest.find('L') {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 1..];
        let Some(end) = tail.find(';') else {
            out.push_str(&rest[start..]);
            return out;
        };
        out.push('L');
        out.push_str(&map(&tail[..end]));
        out.push(';');
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_descriptors() {
        let desc = MethodDescriptor::parse("()V").unwrap();
        assert!(desc.params.is_empty());
        assert!(desc.returns_void());

        let desc = MethodDescriptor::parse("(D[[IZLfoo;)Ljava/lang/Object;").unwrap();
        assert_eq!(desc.params, vec!["D", "[[I", "Z", "Lfoo;"]);
        assert_eq!(desc.ret, "Ljava/lang/Object;");
        assert_eq!(desc.arg_slots(), 5);
    }

    #[test]
    fn reject_malformed() {
        assert!(MethodDescriptor::parse("V").is_err());
        assert!(MethodDescriptor::parse("(I").is_err());
        assert!(MethodDescriptor::parse("(Lfoo)V").is_err());
        assert!(MethodDescriptor::parse("(I)Q").is_err());
        assert!(MethodDescriptor::parse("(I)II").is_err());
    }

    #[test]
    fn remap_classes() {
        assert_eq!(remap("I", |_| unreachable!()), "I");
        assert_eq!(
            remap("(Lcom/Long;JLx;)V", |name| format!("{name}2")),
            "(Lcom/Long2;JLx2;)V"
        );
        assert_eq!(class_of("Lfoo/Bar;"), Some("foo/Bar"));
        assert_eq!(class_of("[Lfoo;"), None);
    }
}
