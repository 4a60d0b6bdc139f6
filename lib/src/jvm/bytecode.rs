//! Encoding and decoding of individual instructions in a code array
//!
//! The representation is slightly more abstract than the raw bytes, to keep encoding choices in
//! one place:
//!
//!   - Loads and stores always use the general opcode. Encoding picks the compact `iload_0`-style
//!     opcode or a `wide` prefix depending on the slot.
//!
//!   - `ldc` and `ldc_w` are one instruction, with the width chosen from the constant index.
//!
//!   - `wide iinc` is merged into `iinc`
//!
//! Branch offsets are relative to the start of the instruction, as in the class file.

use crate::jvm::class_file::Serialize;
use crate::jvm::{Error, Opcode};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::convert::TryFrom;
use std::io::{Cursor, ErrorKind, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Insn {
    /// Instruction that has no operands
    Plain(Opcode),

    /// `bipush` or `sipush`
    Push(Opcode, i32),

    /// Load or store of a local (covers compact and `wide` forms, as well as `ret`)
    Local(Opcode, u16),

    /// Increment a local (covers `wide iinc`)
    Iinc(u16, i16),

    /// Instruction whose only operand is a constant pool index
    ///
    /// `Opcode::Ldc` covers both `ldc` and `ldc_w`.
    Constant(Opcode, u16),

    /// `invokeinterface` with its argument slot count
    InvokeInterface(u16, u8),

    InvokeDynamic(u16),

    /// Branch with a relative offset (`goto_w` and `jsr_w` use a 4 byte offset)
    Branch(Opcode, i32),

    TableSwitch {
        default: i32,
        low: i32,
        high: i32,
        offsets: Vec<i32>,
    },

    /// Key and relative offset pairs, which must be sorted by key
    LookupSwitch { default: i32, pairs: Vec<(i32, i32)> },

    /// `newarray` with its primitive type code
    NewArray(u8),

    MultiANewArray(u16, u8),
}

/// Padding needed after a switch opcode at `offset` to reach a 4-byte boundary
fn switch_padding(offset: usize) -> usize {
    (4 - (offset + 1) % 4) % 4
}

impl Insn {
    pub fn opcode(&self) -> Opcode {
        match self {
            Insn::Plain(op)
            | Insn::Push(op, _)
            | Insn::Local(op, _)
            | Insn::Constant(op, _)
            | Insn::Branch(op, _) => *op,
            Insn::Iinc(_, _) => Opcode::IInc,
            Insn::InvokeInterface(_, _) => Opcode::InvokeInterface,
            Insn::InvokeDynamic(_) => Opcode::InvokeDynamic,
            Insn::TableSwitch { .. } => Opcode::TableSwitch,
            Insn::LookupSwitch { .. } => Opcode::LookupSwitch,
            Insn::NewArray(_) => Opcode::NewArray,
            Insn::MultiANewArray(_, _) => Opcode::MultiANewArray,
        }
    }

    /// Number of bytes the instruction takes when placed at `offset`
    pub fn size(&self, offset: usize) -> usize {
        match self {
            Insn::Plain(_) => 1,
            Insn::Push(Opcode::BiPush, _) => 2,
            Insn::Push(_, _) => 3,
            Insn::Local(op, slot) => {
                if op.fold_local(*slot).is_some() {
                    1
                } else if *slot <= u8::MAX as u16 {
                    2
                } else {
                    4
                }
            }
            Insn::Iinc(slot, inc) => {
                if *slot <= u8::MAX as u16 && i8::try_from(*inc).is_ok() {
                    3
                } else {
                    6
                }
            }
            Insn::Constant(Opcode::Ldc, idx) if *idx <= u8::MAX as u16 => 2,
            Insn::Constant(_, _) => 3,
            Insn::InvokeInterface(_, _) | Insn::InvokeDynamic(_) => 5,
            Insn::Branch(Opcode::GotoW | Opcode::JsrW, _) => 5,
            Insn::Branch(_, _) => 3,
            Insn::TableSwitch { offsets, .. } => {
                1 + switch_padding(offset) + 12 + 4 * offsets.len()
            }
            Insn::LookupSwitch { pairs, .. } => 1 + switch_padding(offset) + 8 + 8 * pairs.len(),
            Insn::NewArray(_) => 2,
            Insn::MultiANewArray(_, _) => 4,
        }
    }

    /// Absolute targets of the instruction's branches (the default target comes first for switches)
    pub fn branch_targets(&self, offset: usize) -> Vec<i64> {
        let at = |rel: i32| offset as i64 + rel as i64;
        match self {
            Insn::Branch(_, rel) => vec![at(*rel)],
            Insn::TableSwitch {
                default, offsets, ..
            } => std::iter::once(*default)
                .chain(offsets.iter().copied())
                .map(at)
                .collect(),
            Insn::LookupSwitch { default, pairs } => std::iter::once(*default)
                .chain(pairs.iter().map(|(_, rel)| *rel))
                .map(at)
                .collect(),
            _ => vec![],
        }
    }

    /// Encode the instruction, as placed at `offset`
    pub fn encode<W: WriteBytesExt>(&self, offset: usize, writer: &mut W) -> Result<()> {
        match self {
            Insn::Plain(op) => op.value().serialize(writer)?,
            Insn::Push(op, value) => {
                op.value().serialize(writer)?;
                if *op == Opcode::BiPush {
                    narrow::<i8>(*value, "bipush operand")?.serialize(writer)?;
                } else {
                    narrow::<i16>(*value, "sipush operand")?.serialize(writer)?;
                }
            }

            /* The load/store instructions follow the same pattern:
             *
             *   - short form (0-3) have special bytes
             *   - normal form (0-255) use `iload` plus a byte operand
             *   - wide form (255-65535) use `wide iload` plus two byte operands
             */
            Insn::Local(op, slot) => match (op.fold_local(*slot), u8::try_from(*slot)) {
                (Some(short), _) => short.value().serialize(writer)?,
                (None, Ok(byte)) => {
                    op.value().serialize(writer)?;
                    byte.serialize(writer)?;
                }
                (None, Err(_)) => {
                    Opcode::Wide.value().serialize(writer)?;
                    op.value().serialize(writer)?;
                    slot.serialize(writer)?;
                }
            },
            Insn::Iinc(slot, inc) => match (u8::try_from(*slot), i8::try_from(*inc)) {
                (Ok(slot), Ok(inc)) => {
                    Opcode::IInc.value().serialize(writer)?;
                    slot.serialize(writer)?;
                    inc.serialize(writer)?;
                }
                _ => {
                    Opcode::Wide.value().serialize(writer)?;
                    Opcode::IInc.value().serialize(writer)?;
                    slot.serialize(writer)?;
                    inc.serialize(writer)?;
                }
            },
            Insn::Constant(Opcode::Ldc, idx) => match u8::try_from(*idx) {
                Ok(b) => {
                    Opcode::Ldc.value().serialize(writer)?;
                    b.serialize(writer)?;
                }
                Err(_) => {
                    Opcode::LdcW.value().serialize(writer)?;
                    idx.serialize(writer)?;
                }
            },
            Insn::Constant(op, idx) => {
                op.value().serialize(writer)?;
                idx.serialize(writer)?;
            }
            Insn::InvokeInterface(idx, count) => {
                Opcode::InvokeInterface.value().serialize(writer)?;
                idx.serialize(writer)?;
                count.serialize(writer)?;
                0u8.serialize(writer)?;
            }
            Insn::InvokeDynamic(idx) => {
                Opcode::InvokeDynamic.value().serialize(writer)?;
                idx.serialize(writer)?;
                0u16.serialize(writer)?;
            }
            Insn::Branch(op @ (Opcode::GotoW | Opcode::JsrW), rel) => {
                op.value().serialize(writer)?;
                rel.serialize(writer)?;
            }
            Insn::Branch(op, rel) => {
                op.value().serialize(writer)?;
                narrow::<i16>(*rel, "branch offset")?.serialize(writer)?;
            }
            Insn::TableSwitch {
                default,
                low,
                high,
                offsets,
            } => {
                Opcode::TableSwitch.value().serialize(writer)?;
                for _ in 0..switch_padding(offset) {
                    0x00u8.serialize(writer)?;
                }
                default.serialize(writer)?;
                low.serialize(writer)?;
                high.serialize(writer)?;
                for target in offsets {
                    target.serialize(writer)?;
                }
            }
            Insn::LookupSwitch { default, pairs } => {
                Opcode::LookupSwitch.value().serialize(writer)?;
                for _ in 0..switch_padding(offset) {
                    0x00u8.serialize(writer)?;
                }
                default.serialize(writer)?;
                (pairs.len() as i32).serialize(writer)?;
                for (key, target) in pairs {
                    key.serialize(writer)?;
                    target.serialize(writer)?;
                }
            }
            Insn::NewArray(code) => {
                Opcode::NewArray.value().serialize(writer)?;
                code.serialize(writer)?;
            }
            Insn::MultiANewArray(idx, dims) => {
                Opcode::MultiANewArray.value().serialize(writer)?;
                idx.serialize(writer)?;
                dims.serialize(writer)?;
            }
        }
        Ok(())
    }
}

fn narrow<T: TryFrom<i32>>(value: i32, what: &str) -> Result<T> {
    T::try_from(value).map_err(|_| {
        let msg = format!("{} {} is out of range", what, value);
        std::io::Error::new(ErrorKind::InvalidInput, msg)
    })
}

/// Decode a whole code array into instructions, each paired with its offset
pub fn decode_code(code: &[u8]) -> std::result::Result<Vec<(usize, Insn)>, Error> {
    let mut cursor = Cursor::new(code);
    let mut insns = vec![];
    while (cursor.position() as usize) < code.len() {
        let offset = cursor.position() as usize;
        let insn = decode_insn(&mut cursor, offset).map_err(|err| match err {
            DecodeError::Io(err) => Error::MalformedClass(format!(
                "truncated instruction at offset {}: {}",
                offset, err
            )),
            DecodeError::Jvm(err) => err,
        })?;
        insns.push((offset, insn));
    }
    Ok(insns)
}

enum DecodeError {
    Io(std::io::Error),
    Jvm(Error),
}

impl From<std::io::Error> for DecodeError {
    fn from(err: std::io::Error) -> DecodeError {
        DecodeError::Io(err)
    }
}

fn decode_insn(
    cursor: &mut Cursor<&[u8]>,
    offset: usize,
) -> std::result::Result<Insn, DecodeError> {
    let byte = cursor.read_u8()?;
    let opcode = Opcode::from_u8(byte).ok_or(DecodeError::Jvm(Error::UnknownOpcode {
        offset,
        opcode: byte,
    }))?;

    if let Some((general, slot)) = opcode.unfold_local() {
        return Ok(Insn::Local(general, slot));
    }

    let skip_padding = |cursor: &mut Cursor<&[u8]>| -> Result<()> {
        for _ in 0..switch_padding(offset) {
            cursor.read_u8()?;
        }
        Ok(())
    };

    let insn = match opcode {
        Opcode::BiPush => Insn::Push(opcode, cursor.read_i8()? as i32),
        Opcode::SiPush => Insn::Push(opcode, cursor.read_i16::<BigEndian>()? as i32),
        Opcode::Ldc => Insn::Constant(Opcode::Ldc, cursor.read_u8()? as u16),
        Opcode::LdcW => Insn::Constant(Opcode::Ldc, cursor.read_u16::<BigEndian>()?),
        Opcode::ILoad
        | Opcode::LLoad
        | Opcode::FLoad
        | Opcode::DLoad
        | Opcode::ALoad
        | Opcode::IStore
        | Opcode::LStore
        | Opcode::FStore
        | Opcode::DStore
        | Opcode::AStore
        | Opcode::Ret => Insn::Local(opcode, cursor.read_u8()? as u16),
        Opcode::IInc => {
            let slot = cursor.read_u8()? as u16;
            Insn::Iinc(slot, cursor.read_i8()? as i16)
        }
        Opcode::Wide => {
            let modified = cursor.read_u8()?;
            match Opcode::from_u8(modified) {
                Some(Opcode::IInc) => {
                    let slot = cursor.read_u16::<BigEndian>()?;
                    Insn::Iinc(slot, cursor.read_i16::<BigEndian>()?)
                }
                Some(op) if op.kind() == crate::jvm::OperandKind::Local || op == Opcode::Ret => {
                    Insn::Local(op, cursor.read_u16::<BigEndian>()?)
                }
                _ => {
                    let msg = format!("wide cannot modify 0x{:02x} at offset {}", modified, offset);
                    return Err(DecodeError::Jvm(Error::MalformedClass(msg)));
                }
            }
        }
        Opcode::Ldc2W
        | Opcode::GetStatic
        | Opcode::PutStatic
        | Opcode::GetField
        | Opcode::PutField
        | Opcode::InvokeVirtual
        | Opcode::InvokeSpecial
        | Opcode::InvokeStatic
        | Opcode::New
        | Opcode::ANewArray
        | Opcode::CheckCast
        | Opcode::InstanceOf => Insn::Constant(opcode, cursor.read_u16::<BigEndian>()?),
        Opcode::InvokeInterface => {
            let idx = cursor.read_u16::<BigEndian>()?;
            let count = cursor.read_u8()?;
            cursor.read_u8()?;
            Insn::InvokeInterface(idx, count)
        }
        Opcode::InvokeDynamic => {
            let idx = cursor.read_u16::<BigEndian>()?;
            cursor.read_u16::<BigEndian>()?;
            Insn::InvokeDynamic(idx)
        }
        Opcode::GotoW | Opcode::JsrW => Insn::Branch(opcode, cursor.read_i32::<BigEndian>()?),
        op if op.kind() == crate::jvm::OperandKind::Jump || op == Opcode::Jsr => {
            Insn::Branch(op, cursor.read_i16::<BigEndian>()? as i32)
        }
        Opcode::TableSwitch => {
            skip_padding(cursor)?;
            let default = cursor.read_i32::<BigEndian>()?;
            let low = cursor.read_i32::<BigEndian>()?;
            let high = cursor.read_i32::<BigEndian>()?;
            if high < low {
                let msg = format!("tableswitch at offset {} has high < low", offset);
                return Err(DecodeError::Jvm(Error::MalformedClass(msg)));
            }
            let count = (high as i64 - low as i64 + 1) as usize;
            let offsets = (0..count)
                .map(|_| cursor.read_i32::<BigEndian>())
                .collect::<Result<_>>()?;
            Insn::TableSwitch {
                default,
                low,
                high,
                offsets,
            }
        }
        Opcode::LookupSwitch => {
            skip_padding(cursor)?;
            let default = cursor.read_i32::<BigEndian>()?;
            let count = cursor.read_i32::<BigEndian>()?;
            if count < 0 {
                let msg = format!("lookupswitch at offset {} has negative size", offset);
                return Err(DecodeError::Jvm(Error::MalformedClass(msg)));
            }
            let pairs = (0..count)
                .map(|_| -> Result<(i32, i32)> {
                    let key = cursor.read_i32::<BigEndian>()?;
                    Ok((key, cursor.read_i32::<BigEndian>()?))
                })
                .collect::<Result<_>>()?;
            Insn::LookupSwitch { default, pairs }
        }
        Opcode::NewArray => Insn::NewArray(cursor.read_u8()?),
        Opcode::MultiANewArray => {
            let idx = cursor.read_u16::<BigEndian>()?;
            Insn::MultiANewArray(idx, cursor.read_u8()?)
        }
        plain => Insn::Plain(plain),
    };
    Ok(insn)
}

#[cfg(test)]
mod test {
    use super::*;

    fn encode_all(insns: &[Insn]) -> Vec<u8> {
        let mut bytes = vec![];
        for insn in insns {
            let offset = bytes.len();
            insn.encode(offset, &mut bytes).unwrap();
            assert_eq!(bytes.len() - offset, insn.size(offset), "size of {:?}", insn);
        }
        bytes
    }

    #[test]
    fn compact_and_wide_locals() {
        let bytes = encode_all(&[
            Insn::Local(Opcode::ALoad, 0),
            Insn::Local(Opcode::IStore, 7),
            Insn::Local(Opcode::DLoad, 300),
            Insn::Iinc(2, 1),
            Insn::Iinc(2, 1000),
        ]);
        assert_eq!(
            bytes,
            vec![0x2a, 0x36, 7, 0xc4, 0x18, 1, 44, 0x84, 2, 1, 0xc4, 0x84, 0, 2, 3, 232]
        );
        assert_eq!(
            decode_code(&bytes).unwrap(),
            vec![
                (0, Insn::Local(Opcode::ALoad, 0)),
                (1, Insn::Local(Opcode::IStore, 7)),
                (3, Insn::Local(Opcode::DLoad, 300)),
                (7, Insn::Iinc(2, 1)),
                (10, Insn::Iinc(2, 1000)),
            ]
        );
    }

    #[test]
    fn ldc_width_follows_index() {
        let bytes = encode_all(&[Insn::Constant(Opcode::Ldc, 3), Insn::Constant(Opcode::Ldc, 300)]);
        assert_eq!(bytes, vec![0x12, 3, 0x13, 1, 44]);
    }

    #[test]
    fn switch_padding_depends_on_offset() {
        let switch = Insn::TableSwitch {
            default: 20,
            low: 0,
            high: 1,
            offsets: vec![16, 18],
        };
        let bytes = encode_all(&[Insn::Plain(Opcode::ILoad0), switch.clone()]);
        assert_eq!(bytes.len(), 1 + 1 + 2 + 12 + 8);
        let decoded = decode_code(&bytes).unwrap();
        assert_eq!(decoded[1], (1, switch));
        assert_eq!(decoded[1].1.branch_targets(1), vec![21, 17, 19]);
    }

    #[test]
    fn narrow_branches_must_fit() {
        let mut bytes = vec![];
        assert!(Insn::Branch(Opcode::Goto, 40_000).encode(0, &mut bytes).is_err());
        assert!(Insn::Branch(Opcode::GotoW, 40_000).encode(0, &mut bytes).is_ok());
    }

    #[test]
    fn decoding_errors() {
        assert!(matches!(
            decode_code(&[0x00, 0xfe]),
            Err(Error::UnknownOpcode {
                offset: 1,
                opcode: 0xfe
            })
        ));
        match decode_code(&[0x00, 0x11, 0x00]) {
            Err(Error::MalformedClass(msg)) => {
                assert!(msg.starts_with("truncated instruction at offset 1: "), "{}", msg)
            }
            other => panic!("expected a truncated instruction, got {:?}", other),
        }
    }
}
