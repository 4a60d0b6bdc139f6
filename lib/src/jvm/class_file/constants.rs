use super::{decode_modified_utf8, encode_modified_utf8, read_bytes, Deserialize, Serialize};
use crate::jvm::Error;
use crate::util::{Offset, OffsetVec, Width};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io;

/// Entry in the constant pool ([JVMS 4.4][0])
///
/// The assembler never creates `Dynamic`, `Module`, or `Package`, but they are kept when reading
/// class files so that pool indices stay right.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Class(Utf8ConstantIndex),
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// `Methodref` or `InterfaceMethodref`
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },
    String(Utf8ConstantIndex),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Stored in modified UTF-8 (see [`encode_modified_utf8`])
    Utf8(String),
    MethodHandle {
        handle_kind: HandleKind,

        /// Field reference for the field kinds, method reference for the rest
        member: ConstantIndex,
    },
    MethodType {
        descriptor: Utf8ConstantIndex,
    },
    Dynamic {
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        method_descriptor: NameAndTypeConstantIndex,
    },
    Module(Utf8ConstantIndex),
    Package(Utf8ConstantIndex),
}

impl Constant {
    fn tag(&self) -> u8 {
        match self {
            Constant::Utf8(_) => 1,
            Constant::Integer(_) => 3,
            Constant::Float(_) => 4,
            Constant::Long(_) => 5,
            Constant::Double(_) => 6,
            Constant::Class(_) => 7,
            Constant::String(_) => 8,
            Constant::FieldRef(..) => 9,
            Constant::MethodRef {
                is_interface: false,
                ..
            } => 10,
            Constant::MethodRef {
                is_interface: true, ..
            } => 11,
            Constant::NameAndType { .. } => 12,
            Constant::MethodHandle { .. } => 15,
            Constant::MethodType { .. } => 16,
            Constant::Dynamic { .. } => 17,
            Constant::InvokeDynamic { .. } => 18,
            Constant::Module(_) => 19,
            Constant::Package(_) => 20,
        }
    }
}

/// `long` and `double` take up two pool indices, the second of which is unusable
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        self.tag().serialize(writer)?;
        match self {
            Constant::Utf8(string) => {
                let bytes = encode_modified_utf8(string);
                (bytes.len() as u16).serialize(writer)?;
                writer.write_all(&bytes)
            }
            Constant::Integer(int) => int.serialize(writer),
            Constant::Float(float) => float.serialize(writer),
            Constant::Long(long) => long.serialize(writer),
            Constant::Double(double) => double.serialize(writer),
            Constant::Class(utf8)
            | Constant::String(utf8)
            | Constant::Module(utf8)
            | Constant::Package(utf8)
            | Constant::MethodType { descriptor: utf8 } => utf8.serialize(writer),
            Constant::FieldRef(class, name_and_type)
            | Constant::MethodRef {
                class,
                name_and_type,
                ..
            } => {
                class.serialize(writer)?;
                name_and_type.serialize(writer)
            }
            Constant::NameAndType { name, descriptor } => {
                name.serialize(writer)?;
                descriptor.serialize(writer)
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                handle_kind.serialize(writer)?;
                member.serialize(writer)
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            }
            | Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor: name_and_type,
            } => {
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)
            }
        }
    }
}

impl Deserialize for Constant {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> io::Result<Self> {
        let tag = u8::deserialize(reader)?;
        Ok(match tag {
            1 => {
                let len = u16::deserialize(reader)? as usize;
                Constant::Utf8(decode_modified_utf8(&read_bytes(reader, len)?))
            }
            3 => Constant::Integer(i32::deserialize(reader)?),
            4 => Constant::Float(f32::deserialize(reader)?),
            5 => Constant::Long(i64::deserialize(reader)?),
            6 => Constant::Double(f64::deserialize(reader)?),
            7 => Constant::Class(Utf8ConstantIndex::deserialize(reader)?),
            8 => Constant::String(Utf8ConstantIndex::deserialize(reader)?),
            9 => Constant::FieldRef(
                ClassConstantIndex::deserialize(reader)?,
                NameAndTypeConstantIndex::deserialize(reader)?,
            ),
            10 | 11 => Constant::MethodRef {
                class: ClassConstantIndex::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: Utf8ConstantIndex::deserialize(reader)?,
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            15 => Constant::MethodHandle {
                handle_kind: HandleKind::deserialize(reader)?,
                member: ConstantIndex::deserialize(reader)?,
            },
            16 => Constant::MethodType {
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            17 => Constant::Dynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: u16::deserialize(reader)?,
                method_descriptor: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            19 => Constant::Module(Utf8ConstantIndex::deserialize(reader)?),
            20 => Constant::Package(Utf8ConstantIndex::deserialize(reader)?),
            other => {
                let msg = format!("unknown constant pool tag {}", other);
                return Err(io::Error::new(io::ErrorKind::InvalidData, msg));
            }
        })
    }
}

/// Written as `constant_pool_count` (one past the last index) followed by the entries
impl Serialize for OffsetVec<Constant> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        (self.offset_len().0 as u16).serialize(writer)?;
        self.iter()
            .try_for_each(|(_, _, constant)| constant.serialize(writer))
    }
}

impl Deserialize for OffsetVec<Constant> {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> io::Result<Self> {
        let count = u16::deserialize(reader)? as usize;
        let mut constants = OffsetVec::new_starting_at(Offset(1));
        while constants.offset_len().0 < count {
            constants.push(Constant::deserialize(reader)?);
        }
        Ok(constants)
    }
}

/// Typed lookups into a constant pool that was read from a class file
pub trait ConstantLookup {
    fn constant(&self, index: u16) -> Result<&Constant, Error>;

    fn utf8(&self, index: Utf8ConstantIndex) -> Result<&str, Error> {
        match self.constant(index.0 .0)? {
            Constant::Utf8(string) => Ok(string),
            _ => Err(Error::BadConstantIndex(index.0 .0)),
        }
    }

    /// Name stored in a `CONSTANT_Class_info`
    fn class_name(&self, index: ClassConstantIndex) -> Result<&str, Error> {
        match self.constant(index.0 .0)? {
            Constant::Class(name) => self.utf8(*name),
            _ => Err(Error::BadConstantIndex(index.0 .0)),
        }
    }

    fn name_and_type(&self, index: NameAndTypeConstantIndex) -> Result<(&str, &str), Error> {
        match self.constant(index.0 .0)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(Error::BadConstantIndex(index.0 .0)),
        }
    }

    /// Resolve a field or method reference
    fn member_ref(&self, index: u16) -> Result<MemberRef<'_>, Error> {
        let (class, name_and_type, is_interface) = match self.constant(index)? {
            Constant::FieldRef(class, name_and_type) => (*class, *name_and_type, false),
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => (*class, *name_and_type, *is_interface),
            _ => return Err(Error::BadConstantIndex(index)),
        };
        let (name, descriptor) = self.name_and_type(name_and_type)?;
        Ok(MemberRef {
            owner: self.class_name(class)?,
            name,
            descriptor,
            is_interface,
        })
    }
}

impl ConstantLookup for OffsetVec<Constant> {
    fn constant(&self, index: u16) -> Result<&Constant, Error> {
        self.get_offset(Offset(index as usize))
            .ok()
            .ok_or(Error::BadConstantIndex(index))
    }
}

/// Field or method reference, resolved to strings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub owner: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
    pub is_interface: bool,
}

/// Untyped index into the constant pool
#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ConstantIndex(pub u16);

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for ConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> io::Result<Self> {
        u16::deserialize(reader).map(ConstantIndex)
    }
}

/// Declare indices that are known to point at one kind of constant
macro_rules! typed_indices {
    ($($(#[$doc:meta])* $index:ident;)*) => {
        $(
            $(#[$doc])*
            #[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
            pub struct $index(pub ConstantIndex);

            impl From<$index> for ConstantIndex {
                fn from(index: $index) -> ConstantIndex {
                    index.0
                }
            }

            impl Serialize for $index {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
                    self.0.serialize(writer)
                }
            }

            impl Deserialize for $index {
                fn deserialize<R: ReadBytesExt>(reader: &mut R) -> io::Result<Self> {
                    ConstantIndex::deserialize(reader).map($index)
                }
            }
        )*
    };
}

typed_indices! {
    Utf8ConstantIndex;
    StringConstantIndex;
    NameAndTypeConstantIndex;
    ClassConstantIndex;
    FieldRefConstantIndex;
    /// Either a `Methodref` or an `InterfaceMethodref`
    MethodRefConstantIndex;
    InvokeDynamicConstantIndex;
}

/// `reference_kind` of a method handle ([JVMS 5.4.3.5][0])
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-5.html#jvms-5.4.3.5
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl HandleKind {
    const ALL: [HandleKind; 9] = [
        HandleKind::GetField,
        HandleKind::GetStatic,
        HandleKind::PutField,
        HandleKind::PutStatic,
        HandleKind::InvokeVirtual,
        HandleKind::InvokeStatic,
        HandleKind::InvokeSpecial,
        HandleKind::NewInvokeSpecial,
        HandleKind::InvokeInterface,
    ];

    pub fn tag(&self) -> u8 {
        match self {
            HandleKind::GetField => 1,
            HandleKind::GetStatic => 2,
            HandleKind::PutField => 3,
            HandleKind::PutStatic => 4,
            HandleKind::InvokeVirtual => 5,
            HandleKind::InvokeStatic => 6,
            HandleKind::InvokeSpecial => 7,
            HandleKind::NewInvokeSpecial => 8,
            HandleKind::InvokeInterface => 9,
        }
    }

    pub fn from_tag(tag: u8) -> Option<HandleKind> {
        HandleKind::ALL.iter().copied().find(|kind| kind.tag() == tag)
    }

    /// Conventional `H_*` name of the handle kind
    pub fn mnemonic(&self) -> &'static str {
        match self {
            HandleKind::GetField => "H_GETFIELD",
            HandleKind::GetStatic => "H_GETSTATIC",
            HandleKind::PutField => "H_PUTFIELD",
            HandleKind::PutStatic => "H_PUTSTATIC",
            HandleKind::InvokeVirtual => "H_INVOKEVIRTUAL",
            HandleKind::InvokeStatic => "H_INVOKESTATIC",
            HandleKind::InvokeSpecial => "H_INVOKESPECIAL",
            HandleKind::NewInvokeSpecial => "H_NEWINVOKESPECIAL",
            HandleKind::InvokeInterface => "H_INVOKEINTERFACE",
        }
    }

    /// Case-insensitive inverse of [`HandleKind::mnemonic`]
    pub fn from_mnemonic(mnemonic: &str) -> Option<HandleKind> {
        HandleKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.mnemonic().eq_ignore_ascii_case(mnemonic))
    }

    /// Does the handle point at a field (as opposed to a method)?
    pub fn is_field(&self) -> bool {
        self.tag() <= 4
    }
}

impl Serialize for HandleKind {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        self.tag().serialize(writer)
    }
}

impl Deserialize for HandleKind {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> io::Result<Self> {
        let tag = u8::deserialize(reader)?;
        HandleKind::from_tag(tag).ok_or_else(|| {
            let msg = format!("invalid method handle kind {}", tag);
            io::Error::new(io::ErrorKind::InvalidData, msg)
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn encode(constant: &Constant) -> Vec<u8> {
        let mut bytes = vec![];
        constant.serialize(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn encodings() {
        assert_eq!(
            encode(&Constant::Utf8(String::from("a\0"))),
            vec![1, 0, 3, b'a', 0xC0, 0x80]
        );
        assert_eq!(encode(&Constant::Long(-1)), [&[5][..], &[0xFF; 8][..]].concat());
        let interface_method = Constant::MethodRef {
            class: ClassConstantIndex(ConstantIndex(1)),
            name_and_type: NameAndTypeConstantIndex(ConstantIndex(2)),
            is_interface: true,
        };
        assert_eq!(encode(&interface_method), vec![11, 0, 1, 0, 2]);
        let handle = Constant::MethodHandle {
            handle_kind: HandleKind::InvokeStatic,
            member: ConstantIndex(9),
        };
        assert_eq!(encode(&handle), vec![15, 6, 0, 9]);
    }

    #[test]
    fn decoding_rejects_unknown_tags() {
        let bytes = encode(&Constant::Dynamic {
            bootstrap_method: 3,
            name_and_type: NameAndTypeConstantIndex(ConstantIndex(4)),
        });
        let decoded = Constant::deserialize(&mut bytes.as_slice()).unwrap();
        assert!(matches!(decoded, Constant::Dynamic { bootstrap_method: 3, .. }));

        assert!(Constant::deserialize(&mut [2u8, 0, 0].as_slice()).is_err());
        assert!(Constant::deserialize(&mut [15u8, 10, 0, 1].as_slice()).is_err());
    }

    #[test]
    fn handle_kinds() {
        let static_call = HandleKind::from_mnemonic("h_invokestatic");
        assert_eq!(static_call, Some(HandleKind::InvokeStatic));
        assert_eq!(HandleKind::from_tag(4), Some(HandleKind::PutStatic));
        assert!(HandleKind::PutStatic.is_field());
        assert!(!HandleKind::NewInvokeSpecial.is_field());
        assert_eq!(HandleKind::from_tag(0), None);
    }
}
