//! The `Code` attribute and the attributes nested inside it

use super::{read_bytes, AttributeLike, ClassConstantIndex, ConstantIndex, Deserialize, Serialize};
use super::{Attribute, Utf8ConstantIndex};
use crate::jvm::verifier::VerificationType;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io;

/// Method body ([JVMS 4.7.3][0])
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.3
#[derive(Debug)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_array: BytecodeArray,
    pub exception_table: Vec<ExceptionHandler>,

    /// `StackMapTable`, `LineNumberTable`, and `LocalVariableTable` go here
    pub attributes: Vec<Attribute>,
}

record!(Code {
    max_stack,
    max_locals,
    code_array,
    exception_table,
    attributes
});

impl AttributeLike for Code {
    const NAME: &'static str = "Code";
}

/// Entry in the exception table, covering `start_pc` up to (but excluding) `end_pc`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start_pc: BytecodeIndex,
    pub end_pc: BytecodeIndex,
    pub handler_pc: BytecodeIndex,

    /// `None` catches everything (encoded as index 0)
    pub catch_type: Option<ClassConstantIndex>,
}

record!(ExceptionHandler {
    start_pc,
    end_pc,
    handler_pc,
    catch_type
});

impl Serialize for Option<ClassConstantIndex> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            Some(class) => class.serialize(writer),
            None => 0u16.serialize(writer),
        }
    }
}

impl Deserialize for Option<ClassConstantIndex> {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> io::Result<Self> {
        match ConstantIndex::deserialize(reader)? {
            ConstantIndex(0) => Ok(None),
            index => Ok(Some(ClassConstantIndex(index))),
        }
    }
}

/// Encoded instructions, with a `u4` length prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytecodeArray(pub Vec<u8>);

impl Serialize for BytecodeArray {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        (self.0.len() as u32).serialize(writer)?;
        writer.write_all(&self.0)
    }
}

impl Deserialize for BytecodeArray {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> io::Result<Self> {
        let len = u32::deserialize(reader)? as usize;
        read_bytes(reader, len).map(BytecodeArray)
    }
}

/// Offset into a [`BytecodeArray`]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BytecodeIndex(pub u16);

impl Serialize for BytecodeIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for BytecodeIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> io::Result<Self> {
        u16::deserialize(reader).map(BytecodeIndex)
    }
}

/// [JVMS 4.7.4](https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.4)
#[derive(Debug)]
pub struct StackMapTable(pub Vec<StackMapFrame>);

impl AttributeLike for StackMapTable {
    const NAME: &'static str = "StackMapTable";
}

impl Serialize for StackMapTable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        self.0.serialize(writer)
    }
}

type StackMapValue = VerificationType<ClassConstantIndex, u16>;

/// One frame of a stack map table, described relative to the frame before it
///
/// `offset_delta` is the distance from the previous frame's offset, minus one (except for the
/// first frame, where it is the offset itself).
#[derive(Debug, PartialEq)]
pub enum StackMapFrame {
    /// Same locals, empty stack
    Same { offset_delta: u16 },

    /// Same locals, one value on the stack
    SameLocalsOneStack {
        offset_delta: u16,
        stack: StackMapValue,
    },

    /// The last 1 to 3 locals are gone, empty stack
    Chop { offset_delta: u16, chopped: u8 },

    /// 1 to 3 locals were added, empty stack
    Append {
        offset_delta: u16,
        locals: Vec<StackMapValue>,
    },

    Full {
        offset_delta: u16,
        locals: Vec<StackMapValue>,
        stack: Vec<StackMapValue>,
    },
}

impl StackMapFrame {
    fn invalid(msg: String) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidInput, msg)
    }
}

impl Serialize for StackMapFrame {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            StackMapFrame::Same { offset_delta } if *offset_delta < 64 => {
                (*offset_delta as u8).serialize(writer)
            }
            StackMapFrame::Same { offset_delta } => {
                251u8.serialize(writer)?;
                offset_delta.serialize(writer)
            }
            StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack,
            } => {
                if *offset_delta < 64 {
                    (64 + *offset_delta as u8).serialize(writer)?;
                } else {
                    247u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
                stack.serialize(writer)
            }
            StackMapFrame::Chop {
                offset_delta,
                chopped,
            } => {
                if !(1..=3).contains(chopped) {
                    return Err(Self::invalid(format!("cannot chop {} locals", chopped)));
                }
                (251 - chopped).serialize(writer)?;
                offset_delta.serialize(writer)
            }
            StackMapFrame::Append {
                offset_delta,
                locals,
            } => {
                if !(1..=3).contains(&locals.len()) {
                    return Err(Self::invalid(format!("cannot append {} locals", locals.len())));
                }
                (251 + locals.len() as u8).serialize(writer)?;
                offset_delta.serialize(writer)?;
                locals.iter().try_for_each(|local| local.serialize(writer))
            }
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => {
                255u8.serialize(writer)?;
                offset_delta.serialize(writer)?;
                locals.serialize(writer)?;
                stack.serialize(writer)
            }
        }
    }
}

/// [JVMS 4.7.12](https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.12)
#[derive(Debug)]
pub struct LineNumberTable(pub Vec<LineNumber>);

attribute_newtype!(LineNumberTable(Vec<LineNumber>) = "LineNumberTable");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: BytecodeIndex,
    pub line_number: u16,
}

record!(LineNumber {
    start_pc,
    line_number
});

/// [JVMS 4.7.13](https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.13)
#[derive(Debug)]
pub struct LocalVariableTable(pub Vec<LocalVariable>);

attribute_newtype!(LocalVariableTable(Vec<LocalVariable>) = "LocalVariableTable");

/// Name and type of the local in slot `index`, from `start_pc` for `length` bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: BytecodeIndex,
    pub length: u16,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub index: u16,
}

record!(LocalVariable {
    start_pc,
    length,
    name_index,
    descriptor_index,
    index
});
