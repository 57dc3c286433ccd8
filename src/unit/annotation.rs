//! Runtime annotations.
//!
//! Patch units express their directives as annotations, so the annotation attributes of
//! fully decoded patch units are read into [`Annotation`] values. Target units keep their
//! annotation attributes as opaque blobs.

use crate::{
    file::{Parser, Writer},
    unit::{
        attribute::{write_count, Attribute, RUNTIME_INVISIBLE_ANNOTATIONS, RUNTIME_VISIBLE_ANNOTATIONS},
        constant::Constant,
        ConstantPool,
    },
    Result,
};

/// One annotation element value.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementValue {
    /// `byte`, `char`, `int`, `short` and `boolean` values, tagged with their descriptor char
    Int {
        /// One of `B`, `C`, `I`, `S`, `Z`
        tag: u8,
        /// The value
        value: i32,
    },
    /// `long`
    Long(i64),
    /// `float`, as raw bits
    Float(u32),
    /// `double`, as raw bits
    Double(u64),
    /// `String`
    String(String),
    /// An enum constant
    Enum {
        /// Field descriptor of the enum type
        type_name: String,
        /// Constant name
        name: String,
    },
    /// A class literal, as return descriptor
    Class(String),
    /// A nested annotation
    Annotation(Annotation),
    /// An array of values
    Array(Vec<ElementValue>),
}

impl ElementValue {
    /// The string value, if this is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ElementValue::String(value) => Some(value),
            _ => None,
        }
    }

    /// The integral value, if this is an `Int`.
    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            ElementValue::Int { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// The constant name, if this is an enum constant.
    #[must_use]
    pub fn as_enum(&self) -> Option<&str> {
        match self {
            ElementValue::Enum { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The elements, if this is an array.
    #[must_use]
    pub fn as_array(&self) -> Option<&[ElementValue]> {
        match self {
            ElementValue::Array(values) => Some(values),
            _ => None,
        }
    }
}

/// A decoded annotation.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    /// Internal name of the annotation type
    pub type_name: String,
    /// `(name, value)` pairs in declaration order
    pub elements: Vec<(String, ElementValue)>,
}

impl Annotation {
    /// An annotation without elements.
    #[must_use]
    pub fn new(type_name: &str) -> Self {
        Annotation {
            type_name: type_name.to_string(),
            elements: Vec::new(),
        }
    }

    /// Adds an element.
    #[must_use]
    pub fn with(mut self, name: &str, value: ElementValue) -> Self {
        self.elements.push((name.to_string(), value));
        self
    }

    /// The value of element `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ElementValue> {
        self.elements
            .iter()
            .find(|(element, _)| element == name)
            .map(|(_, value)| value)
    }
}

fn type_from_descriptor(descriptor: &str) -> Result<String> {
    descriptor
        .strip_prefix('L')
        .and_then(|rest| rest.strip_suffix(';'))
        .map(str::to_string)
        .ok_or_else(|| malformed_error!("Annotation type {} is not a class", descriptor))
}

fn parse_annotation(parser: &mut Parser, pool: &ConstantPool) -> Result<Annotation> {
    let type_name = type_from_descriptor(pool.utf8(parser.read_be::<u16>()?)?)?;
    let count = parser.read_be::<u16>()?;
    let mut elements = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let name = pool.utf8(parser.read_be::<u16>()?)?.to_string();
        elements.push((name, parse_value(parser, pool)?));
    }
    Ok(Annotation {
        type_name,
        elements,
    })
}

fn parse_value(parser: &mut Parser, pool: &ConstantPool) -> Result<ElementValue> {
    let tag = parser.read_be::<u8>()?;
    Ok(match tag {
        b'B' | b'C' | b'I' | b'S' | b'Z' => {
            let index = parser.read_be::<u16>()?;
            match pool.get(index)? {
                Constant::Integer(value) => ElementValue::Int { tag, value: *value },
                other => return Err(malformed_error!("Int element refers to tag {}", other.tag())),
            }
        }
        b'J' | b'F' | b'D' => {
            let index = parser.read_be::<u16>()?;
            match (tag, pool.get(index)?) {
                (b'J', Constant::Long(value)) => ElementValue::Long(*value),
                (b'F', Constant::Float(bits)) => ElementValue::Float(*bits),
                (b'D', Constant::Double(bits)) => ElementValue::Double(*bits),
                (_, other) => {
                    return Err(malformed_error!("Element {} refers to tag {}", tag as char, other.tag()))
                }
            }
        }
        b's' => ElementValue::String(pool.utf8(parser.read_be::<u16>()?)?.to_string()),
        b'e' => ElementValue::Enum {
            type_name: pool.utf8(parser.read_be::<u16>()?)?.to_string(),
            name: pool.utf8(parser.read_be::<u16>()?)?.to_string(),
        },
        b'c' => ElementValue::Class(pool.utf8(parser.read_be::<u16>()?)?.to_string()),
        b'@' => ElementValue::Annotation(parse_annotation(parser, pool)?),
        b'[' => {
            let count = parser.read_be::<u16>()?;
            let mut values = Vec::with_capacity(usize::from(count));
            for _ in 0..count {
                values.push(parse_value(parser, pool)?);
            }
            ElementValue::Array(values)
        }
        _ => return Err(malformed_error!("Unknown element value tag {}", tag)),
    })
}

/// Parses the payload of a `Runtime(In)VisibleAnnotations` attribute.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] on unknown tags or constant kinds, and
/// [`crate::Error::OutOfBounds`] on truncation.
pub fn parse_annotations(pool: &ConstantPool, data: &[u8]) -> Result<Vec<Annotation>> {
    let mut parser = Parser::new(data);
    let count = parser.read_be::<u16>()?;
    let mut annotations = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        annotations.push(parse_annotation(&mut parser, pool)?);
    }
    Ok(annotations)
}

fn write_annotation(writer: &mut Writer, pool: &mut ConstantPool, annotation: &Annotation) -> Result<()> {
    writer.write_be(pool.add_utf8(&format!("L{};", annotation.type_name))?);
    write_count(writer, annotation.elements.len())?;
    for (name, value) in &annotation.elements {
        writer.write_be(pool.add_utf8(name)?);
        write_value(writer, pool, value)?;
    }
    Ok(())
}

fn write_value(writer: &mut Writer, pool: &mut ConstantPool, value: &ElementValue) -> Result<()> {
    match value {
        ElementValue::Int { tag, value } => {
            writer.write_be(*tag);
            writer.write_be(pool.add_integer(*value)?);
        }
        ElementValue::Long(value) => {
            writer.write_be(b'J');
            writer.write_be(pool.add_long(*value)?);
        }
        ElementValue::Float(bits) => {
            writer.write_be(b'F');
            writer.write_be(pool.add(Constant::Float(*bits))?);
        }
        ElementValue::Double(bits) => {
            writer.write_be(b'D');
            writer.write_be(pool.add(Constant::Double(*bits))?);
        }
        ElementValue::String(value) => {
            writer.write_be(b's');
            writer.write_be(pool.add_utf8(value)?);
        }
        ElementValue::Enum { type_name, name } => {
            writer.write_be(b'e');
            writer.write_be(pool.add_utf8(type_name)?);
            writer.write_be(pool.add_utf8(name)?);
        }
        ElementValue::Class(descriptor) => {
            writer.write_be(b'c');
            writer.write_be(pool.add_utf8(descriptor)?);
        }
        ElementValue::Annotation(annotation) => {
            writer.write_be(b'@');
            write_annotation(writer, pool, annotation)?;
        }
        ElementValue::Array(values) => {
            writer.write_be(b'[');
            write_count(writer, values.len())?;
            for value in values {
                write_value(writer, pool, value)?;
            }
        }
    }
    Ok(())
}

/// Serializes annotations into an attribute payload, adding the constants they need.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the pool is full or a table is too long.
pub fn write_annotations(pool: &mut ConstantPool, annotations: &[Annotation]) -> Result<Vec<u8>> {
    let mut writer = Writer::new();
    write_count(&mut writer, annotations.len())?;
    for annotation in annotations {
        write_annotation(&mut writer, pool, annotation)?;
    }
    Ok(writer.into_inner())
}

/// Builds a `RuntimeInvisibleAnnotations` attribute.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the pool is full or a table is too long.
pub fn invisible_attribute(pool: &mut ConstantPool, annotations: &[Annotation]) -> Result<Attribute> {
    let data = write_annotations(pool, annotations)?;
    Ok(Attribute::Raw {
        name: pool.add_utf8(RUNTIME_INVISIBLE_ANNOTATIONS)?,
        data,
    })
}

/// All runtime annotations (visible and invisible) in an attribute list.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if an annotation attribute is damaged.
pub fn collect(attributes: &[Attribute], pool: &ConstantPool) -> Result<Vec<Annotation>> {
    let mut annotations = Vec::new();
    for attribute in attributes {
        let Attribute::Raw { data, .. } = attribute else {
            continue;
        };
        let name = attribute.name(pool)?;
        if name == RUNTIME_INVISIBLE_ANNOTATIONS || name == RUNTIME_VISIBLE_ANNOTATIONS {
            annotations.extend(parse_annotations(pool, data)?);
        }
    }
    Ok(annotations)
}
