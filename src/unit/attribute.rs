//! Class, field and routine attributes that the model does not interpret.
//!
//! Everything except `Code` (owned by [`crate::unit::RoutineMember`]) and `BootstrapMethods`
//! (needed for `invokedynamic` import) is kept as an opaque byte blob. Since the constant pool
//! keeps its indices, such blobs stay valid as long as the pool only grows.

use crate::{
    file::{Parser, Writer},
    unit::ConstantPool,
    Result,
};

/// `Code`
pub const CODE: &str = "Code";
/// `BootstrapMethods`
pub const BOOTSTRAP_METHODS: &str = "BootstrapMethods";
/// `StackMapTable`
pub const STACK_MAP_TABLE: &str = "StackMapTable";
/// `LineNumberTable`
pub const LINE_NUMBER_TABLE: &str = "LineNumberTable";
/// `LocalVariableTable`
pub const LOCAL_VARIABLE_TABLE: &str = "LocalVariableTable";
/// `LocalVariableTypeTable`
pub const LOCAL_VARIABLE_TYPE_TABLE: &str = "LocalVariableTypeTable";
/// `SourceFile`
pub const SOURCE_FILE: &str = "SourceFile";
/// `SourceDebugExtension`
pub const SOURCE_DEBUG_EXTENSION: &str = "SourceDebugExtension";
/// `RuntimeInvisibleAnnotations`
pub const RUNTIME_INVISIBLE_ANNOTATIONS: &str = "RuntimeInvisibleAnnotations";
/// `RuntimeVisibleAnnotations`
pub const RUNTIME_VISIBLE_ANNOTATIONS: &str = "RuntimeVisibleAnnotations";

/// Attributes removed when debug stripping is enabled.
pub const DEBUG_ATTRIBUTES: &[&str] = &[
    SOURCE_FILE,
    SOURCE_DEBUG_EXTENSION,
    LINE_NUMBER_TABLE,
    LOCAL_VARIABLE_TABLE,
    LOCAL_VARIABLE_TYPE_TABLE,
];

/// Attributes removed when annotation stripping is enabled.
pub const ANNOTATION_ATTRIBUTES: &[&str] = &[
    RUNTIME_VISIBLE_ANNOTATIONS,
    RUNTIME_INVISIBLE_ANNOTATIONS,
    "RuntimeVisibleParameterAnnotations",
    "RuntimeInvisibleParameterAnnotations",
    "RuntimeVisibleTypeAnnotations",
    "RuntimeInvisibleTypeAnnotations",
];

/// One entry of the `BootstrapMethods` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapMethod {
    /// `CONSTANT_MethodHandle` of the bootstrap routine
    pub handle: u16,
    /// Static arguments, all loadable constants
    pub arguments: Vec<u16>,
}

/// A class, field or routine attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attribute {
    /// The class-level bootstrap method table
    BootstrapMethods {
        /// Pool index of the attribute name
        name: u16,
        /// The table entries
        methods: Vec<BootstrapMethod>,
    },
    /// Any other attribute, kept verbatim
    Raw {
        /// Pool index of the attribute name
        name: u16,
        /// The attribute payload
        data: Vec<u8>,
    },
}

impl Attribute {
    /// Pool index of the attribute name.
    #[must_use]
    pub fn name_index(&self) -> u16 {
        match self {
            Attribute::BootstrapMethods { name, .. } | Attribute::Raw { name, .. } => *name,
        }
    }

    /// The attribute name.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the name index is not a `CONSTANT_Utf8`.
    pub fn name<'a>(&self, pool: &'a ConstantPool) -> Result<&'a str> {
        pool.utf8(self.name_index())
    }

    /// Reads one attribute. `SourceDebugExtension` is returned too, dropping it is up to
    /// the caller.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] on truncation.
    pub fn parse(parser: &mut Parser, pool: &ConstantPool) -> Result<Attribute> {
        let name = parser.read_be::<u16>()?;
        let length = parser.read_be::<u32>()? as usize;
        let data = parser.read_bytes(length)?;

        if pool.utf8(name)? == BOOTSTRAP_METHODS {
            if let Some(methods) = parse_bootstrap_methods(data) {
                return Ok(Attribute::BootstrapMethods { name, methods });
            }
        }

        Ok(Attribute::Raw {
            name,
            data: data.to_vec(),
        })
    }

    /// Writes the attribute including its name and length header.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the payload exceeds the `u32` length field.
    pub fn write(&self, writer: &mut Writer) -> Result<()> {
        writer.write_be(self.name_index());
        let length_at = writer.reserve_u32();
        match self {
            Attribute::BootstrapMethods { methods, .. } => {
                write_count(writer, methods.len())?;
                for method in methods {
                    writer.write_be(method.handle);
                    write_count(writer, method.arguments.len())?;
                    for argument in &method.arguments {
                        writer.write_be(*argument);
                    }
                }
            }
            Attribute::Raw { data, .. } => writer.write_bytes(data),
        }
        writer.patch_length_u32(length_at)
    }
}

// Returns `None` if the payload is not exactly one well-formed table, in which case the
// attribute is kept raw.
fn parse_bootstrap_methods(data: &[u8]) -> Option<Vec<BootstrapMethod>> {
    let mut parser = Parser::new(data);
    let count = parser.read_be::<u16>().ok()?;
    let mut methods = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let handle = parser.read_be::<u16>().ok()?;
        let argc = parser.read_be::<u16>().ok()?;
        let mut arguments = Vec::with_capacity(usize::from(argc));
        for _ in 0..argc {
            arguments.push(parser.read_be::<u16>().ok()?);
        }
        methods.push(BootstrapMethod { handle, arguments });
    }
    if parser.has_more_data() {
        return None;
    }
    Some(methods)
}

/// Reads an attribute table (`u16` count followed by attributes).
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] on truncation.
pub fn parse_table(parser: &mut Parser, pool: &ConstantPool) -> Result<Vec<Attribute>> {
    let count = parser.read_be::<u16>()?;
    let mut attributes = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        attributes.push(Attribute::parse(parser, pool)?);
    }
    Ok(attributes)
}

/// Writes a `u16` element count.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if `count` exceeds `u16::MAX`.
pub fn write_count(writer: &mut Writer, count: usize) -> Result<()> {
    let count = u16::try_from(count)
        .map_err(|_| malformed_error!("Table of {} entries exceeds u16 count", count))?;
    writer.write_be(count);
    Ok(())
}

/// Returns `true` if the attribute should be dropped under the given strip settings.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the attribute name cannot be resolved.
pub fn is_stripped(
    attribute: &Attribute,
    pool: &ConstantPool,
    strip_debug: bool,
    strip_annotations: bool,
) -> Result<bool> {
    if !strip_debug && !strip_annotations {
        return Ok(false);
    }
    let name = attribute.name(pool)?;
    Ok((strip_debug && DEBUG_ATTRIBUTES.contains(&name))
        || (strip_annotations && ANNOTATION_ATTRIBUTES.contains(&name)))
}
