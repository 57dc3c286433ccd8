//! `StackMapTable` reading and writing.
//!
//! On the wire, each frame is stored as a delta against the previous one, using the most
//! compact of the seven frame kinds. [`parse`] expands a table into absolute frames and
//! [`write`] picks the smallest kind for each frame again.

use crate::{
    file::{Parser, Writer},
    unit::{
        attribute::write_count,
        frames::{expand, Frame, VType},
        ConstantPool, Label,
    },
    Result,
};

const SAME_LOCALS_1: u8 = 64;
const SAME_LOCALS_1_EXTENDED: u8 = 247;
const CHOP: u8 = 251;
const SAME_EXTENDED: u8 = 251;
const FULL: u8 = 255;

/// Expands a `StackMapTable` payload into `(offset, frame)` pairs.
///
/// `Uninitialized` types carry the raw bytecode offset of their `new` as label number; the
/// decoder translates them into real labels once it has assigned those.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] on reserved frame types or invalid verification types.
pub fn parse(data: &[u8], pool: &ConstantPool, initial: &Frame) -> Result<Vec<(u32, Frame)>> {
    let mut parser = Parser::new(data);
    let count = parser.read_be::<u16>()?;
    let mut frames = Vec::with_capacity(usize::from(count));
    let mut locals = initial.compact_locals();
    let mut previous: Option<u32> = None;

    for _ in 0..count {
        let frame_type = parser.read_be::<u8>()?;
        let (delta, stack) = match frame_type {
            0..=63 => (u16::from(frame_type), Vec::new()),
            64..=127 => (
                u16::from(frame_type - SAME_LOCALS_1),
                vec![parse_type(&mut parser, pool)?],
            ),
            SAME_LOCALS_1_EXTENDED => {
                let delta = parser.read_be::<u16>()?;
                (delta, vec![parse_type(&mut parser, pool)?])
            }
            248..=250 => {
                let delta = parser.read_be::<u16>()?;
                let chop = usize::from(CHOP - frame_type);
                if chop > locals.len() {
                    return Err(malformed_error!("Chop frame removes {} of {} locals", chop, locals.len()));
                }
                locals.truncate(locals.len() - chop);
                (delta, Vec::new())
            }
            SAME_EXTENDED => (parser.read_be::<u16>()?, Vec::new()),
            252..=254 => {
                let delta = parser.read_be::<u16>()?;
                for _ in 0..(frame_type - SAME_EXTENDED) {
                    locals.push(parse_type(&mut parser, pool)?);
                }
                (delta, Vec::new())
            }
            FULL => {
                let delta = parser.read_be::<u16>()?;
                let local_count = parser.read_be::<u16>()?;
                locals = (0..local_count)
                    .map(|_| parse_type(&mut parser, pool))
                    .collect::<Result<_>>()?;
                let stack_count = parser.read_be::<u16>()?;
                let stack = (0..stack_count)
                    .map(|_| parse_type(&mut parser, pool))
                    .collect::<Result<_>>()?;
                (delta, stack)
            }
            _ => return Err(malformed_error!("Reserved stack map frame type {}", frame_type)),
        };

        let offset = match previous {
            None => u32::from(delta),
            Some(previous) => previous + u32::from(delta) + 1,
        };
        previous = Some(offset);
        frames.push((
            offset,
            Frame {
                locals: expand(&locals),
                stack: expand(&stack),
            },
        ));
    }

    Ok(frames)
}

fn parse_type(parser: &mut Parser, pool: &ConstantPool) -> Result<VType> {
    Ok(match parser.read_be::<u8>()? {
        0 => VType::Top,
        1 => VType::Integer,
        2 => VType::Float,
        3 => VType::Double,
        4 => VType::Long,
        5 => VType::Null,
        6 => VType::UninitializedThis,
        7 => VType::object(pool.class_name(parser.read_be::<u16>()?)?),
        8 => VType::Uninitialized(Label(u32::from(parser.read_be::<u16>()?))),
        tag => return Err(malformed_error!("Invalid verification type tag {}", tag)),
    })
}

fn write_type(
    writer: &mut Writer,
    vtype: &VType,
    pool: &mut ConstantPool,
    offset_of: &dyn Fn(Label) -> Result<u32>,
) -> Result<()> {
    match vtype {
        VType::Top => writer.write_be(0u8),
        VType::Integer => writer.write_be(1u8),
        VType::Float => writer.write_be(2u8),
        VType::Double => writer.write_be(3u8),
        VType::Long => writer.write_be(4u8),
        VType::Null => writer.write_be(5u8),
        VType::UninitializedThis => writer.write_be(6u8),
        VType::Object(name) => {
            writer.write_be(7u8);
            writer.write_be(pool.add_class(name)?);
        }
        VType::Uninitialized(label) => {
            writer.write_be(8u8);
            let offset = offset_of(*label)?;
            writer.write_be(
                u16::try_from(offset)
                    .map_err(|_| malformed_error!("new offset {} exceeds u16", offset))?,
            );
        }
    }
    Ok(())
}

fn write_types(
    writer: &mut Writer,
    types: &[VType],
    pool: &mut ConstantPool,
    offset_of: &dyn Fn(Label) -> Result<u32>,
) -> Result<()> {
    for vtype in types {
        write_type(writer, vtype, pool, offset_of)?;
    }
    Ok(())
}

/// Writes a `StackMapTable` payload for frames sorted by strictly increasing offset.
///
/// `offset_of` translates the labels of `Uninitialized` types into bytecode offsets.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if offsets are not strictly increasing, or if an
/// offset or count does not fit its field.
pub fn write(
    frames: &[(u32, Frame)],
    initial: &Frame,
    pool: &mut ConstantPool,
    offset_of: &dyn Fn(Label) -> Result<u32>,
) -> Result<Vec<u8>> {
    let mut writer = Writer::new();
    write_count(&mut writer, frames.len())?;

    let mut previous_locals = initial.compact_locals();
    let mut previous: Option<u32> = None;
    for (offset, frame) in frames {
        let delta = match previous {
            None => *offset,
            Some(previous) if *offset > previous => offset - previous - 1,
            Some(previous) => {
                return Err(malformed_error!(
                    "Stack map frame at {} does not follow frame at {}",
                    offset,
                    previous
                ))
            }
        };
        let delta = u16::try_from(delta)
            .map_err(|_| malformed_error!("Frame offset delta {} exceeds u16", delta))?;
        previous = Some(*offset);

        let locals = frame.compact_locals();
        let stack = frame.compact_stack();
        let same_locals = locals == previous_locals;

        if stack.is_empty() && same_locals {
            if delta < 64 {
                writer.write_be(delta as u8);
            } else {
                writer.write_be(SAME_EXTENDED);
                writer.write_be(delta);
            }
        } else if stack.len() == 1 && same_locals {
            if delta < 64 {
                writer.write_be(SAME_LOCALS_1 + delta as u8);
            } else {
                writer.write_be(SAME_LOCALS_1_EXTENDED);
                writer.write_be(delta);
            }
            write_types(&mut writer, &stack, pool, offset_of)?;
        } else if stack.is_empty()
            && locals.len() < previous_locals.len()
            && previous_locals.len() - locals.len() <= 3
            && previous_locals.starts_with(&locals)
        {
            writer.write_be(CHOP - (previous_locals.len() - locals.len()) as u8);
            writer.write_be(delta);
        } else if stack.is_empty()
            && locals.len() > previous_locals.len()
            && locals.len() - previous_locals.len() <= 3
            && locals.starts_with(&previous_locals)
        {
            writer.write_be(SAME_EXTENDED + (locals.len() - previous_locals.len()) as u8);
            writer.write_be(delta);
            write_types(&mut writer, &locals[previous_locals.len()..], pool, offset_of)?;
        } else {
            writer.write_be(FULL);
            writer.write_be(delta);
            write_count(&mut writer, locals.len())?;
            write_types(&mut writer, &locals, pool, offset_of)?;
            write_count(&mut writer, stack.len())?;
            write_types(&mut writer, &stack, pool, offset_of)?;
        }

        previous_locals = locals;
    }

    Ok(writer.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_labels(label: Label) -> Result<u32> {
        Ok(label.0)
    }

    #[test]
    fn picks_compact_kinds() {
        let initial = Frame {
            locals: vec![VType::Integer],
            stack: vec![],
        };
        let frames = vec![
            // same
            (5, initial.clone()),
            // same_locals_1_stack_item
            (
                9,
                Frame {
                    locals: vec![VType::Integer],
                    stack: vec![VType::Long, VType::Top],
                },
            ),
            // append 2
            (
                20,
                Frame {
                    locals: vec![VType::Integer, VType::Double, VType::Top, VType::Null],
                    stack: vec![],
                },
            ),
            // chop 2
            (300, initial.clone()),
            // full
            (
                301,
                Frame {
                    locals: vec![VType::Float],
                    stack: vec![VType::Integer, VType::Integer],
                },
            ),
        ];

        let mut pool = ConstantPool::new();
        let bytes = write(&frames, &initial, &mut pool, &no_labels).unwrap();
        assert_eq!(
            bytes,
            vec![
                0, 5, // count
                5, // same, delta 5
                64 + 3, 4, // same_locals_1, delta 3, long
                253, 0, 10, 3, 5, // append 2, delta 10, double, null
                249, 1, 23, // chop 2, delta 279
                255, 0, 0, 0, 1, 2, 0, 2, 1, 1, // full
            ]
        );

        let parsed = parse(&bytes, &pool, &initial).unwrap();
        assert_eq!(parsed, frames);
    }

    #[test]
    fn object_and_uninitialized_types() {
        let initial = Frame::default();
        let frames = vec![(
            7,
            Frame {
                locals: vec![VType::object("a7")],
                stack: vec![VType::Uninitialized(Label(3)), VType::UninitializedThis],
            },
        )];
        let mut pool = ConstantPool::new();
        let bytes = write(&frames, &initial, &mut pool, &no_labels).unwrap();
        assert_eq!(parse(&bytes, &pool, &initial).unwrap(), frames);
    }

    #[test]
    fn rejects_unordered_frames() {
        let frames = vec![(4, Frame::default()), (4, Frame::default())];
        let mut pool = ConstantPool::new();
        assert!(write(&frames, &Frame::default(), &mut pool, &no_labels).is_err());
    }
}
