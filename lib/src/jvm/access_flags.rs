use crate::jvm::class_file::{Deserialize, Serialize};
use bitflags::bitflags;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::Result;

bitflags! {
    /// `access_flags` of a class ([JVMS 4.1](https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.1))
    pub struct ClassAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
        const MODULE = 0x8000;
    }
}

bitflags! {
    /// `access_flags` of a method
    pub struct MethodAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const BRIDGE = 0x0040;
        const VARARGS = 0x0080;
        const NATIVE = 0x0100;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
    }
}

bitflags! {
    /// `access_flags` of a field
    pub struct FieldAccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const SYNTHETIC = 0x1000;
        const ENUM = 0x4000;
    }
}

/// Flags are stored as a plain `u16`, and unknown bits are dropped when reading
macro_rules! u16_flags {
    ($($flags:ident),*) => {
        $(
            impl Serialize for $flags {
                fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
                    self.bits().serialize(writer)
                }
            }

            impl Deserialize for $flags {
                fn deserialize<R: ReadBytesExt>(reader: &mut R) -> Result<Self> {
                    u16::deserialize(reader).map($flags::from_bits_truncate)
                }
            }
        )*
    };
}

u16_flags!(ClassAccessFlags, MethodAccessFlags, FieldAccessFlags);

/// Modifier keyword as written on a member definition
///
/// Several keywords share a bit in the class file (`volatile` and `bridge` are both `0x0040`), so
/// which keyword a bit maps to depends on whether the member is a method or a field.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Modifier {
    Public,
    Private,
    Protected,
    Static,
    Final,
    Synchronized,
    Volatile,
    Bridge,
    Transient,
    Varargs,
    Native,
    Abstract,
    Strict,
    Synthetic,
    Enum,
}

impl Modifier {
    const ALL: [Modifier; 15] = [
        Modifier::Public,
        Modifier::Private,
        Modifier::Protected,
        Modifier::Static,
        Modifier::Final,
        Modifier::Synchronized,
        Modifier::Volatile,
        Modifier::Bridge,
        Modifier::Transient,
        Modifier::Varargs,
        Modifier::Native,
        Modifier::Abstract,
        Modifier::Strict,
        Modifier::Synthetic,
        Modifier::Enum,
    ];

    pub fn keyword(&self) -> &'static str {
        match self {
            Modifier::Public => "public",
            Modifier::Private => "private",
            Modifier::Protected => "protected",
            Modifier::Static => "static",
            Modifier::Final => "final",
            Modifier::Synchronized => "synchronized",
            Modifier::Volatile => "volatile",
            Modifier::Bridge => "bridge",
            Modifier::Transient => "transient",
            Modifier::Varargs => "varargs",
            Modifier::Native => "native",
            Modifier::Abstract => "abstract",
            Modifier::Strict => "strictfp",
            Modifier::Synthetic => "synthetic",
            Modifier::Enum => "enum",
        }
    }

    /// Case-insensitive keyword lookup (`strict` is accepted as an alias of `strictfp`)
    pub fn from_keyword(keyword: &str) -> Option<Modifier> {
        let lowered = keyword.to_ascii_lowercase();
        if lowered == "strict" {
            return Some(Modifier::Strict);
        }
        Modifier::ALL
            .iter()
            .copied()
            .find(|modifier| modifier.keyword() == lowered)
    }

    pub fn method_flag(&self) -> Option<MethodAccessFlags> {
        let flag = match self {
            Modifier::Public => MethodAccessFlags::PUBLIC,
            Modifier::Private => MethodAccessFlags::PRIVATE,
            Modifier::Protected => MethodAccessFlags::PROTECTED,
            Modifier::Static => MethodAccessFlags::STATIC,
            Modifier::Final => MethodAccessFlags::FINAL,
            Modifier::Synchronized => MethodAccessFlags::SYNCHRONIZED,
            Modifier::Bridge => MethodAccessFlags::BRIDGE,
            Modifier::Varargs => MethodAccessFlags::VARARGS,
            Modifier::Native => MethodAccessFlags::NATIVE,
            Modifier::Abstract => MethodAccessFlags::ABSTRACT,
            Modifier::Strict => MethodAccessFlags::STRICT,
            Modifier::Synthetic => MethodAccessFlags::SYNTHETIC,
            Modifier::Volatile | Modifier::Transient | Modifier::Enum => return None,
        };
        Some(flag)
    }

    pub fn field_flag(&self) -> Option<FieldAccessFlags> {
        let flag = match self {
            Modifier::Public => FieldAccessFlags::PUBLIC,
            Modifier::Private => FieldAccessFlags::PRIVATE,
            Modifier::Protected => FieldAccessFlags::PROTECTED,
            Modifier::Static => FieldAccessFlags::STATIC,
            Modifier::Final => FieldAccessFlags::FINAL,
            Modifier::Volatile => FieldAccessFlags::VOLATILE,
            Modifier::Transient => FieldAccessFlags::TRANSIENT,
            Modifier::Synthetic => FieldAccessFlags::SYNTHETIC,
            Modifier::Enum => FieldAccessFlags::ENUM,
            Modifier::Synchronized
            | Modifier::Bridge
            | Modifier::Varargs
            | Modifier::Native
            | Modifier::Abstract
            | Modifier::Strict => return None,
        };
        Some(flag)
    }

    /// Combine modifiers into method flags, returning the first modifier that has no meaning on
    /// a method if there is one
    pub fn method_flags(
        modifiers: &[Modifier],
    ) -> std::result::Result<MethodAccessFlags, Modifier> {
        modifiers
            .iter()
            .try_fold(MethodAccessFlags::empty(), |flags, modifier| {
                modifier.method_flag().map(|flag| flags | flag).ok_or(*modifier)
            })
    }

    /// Combine modifiers into field flags, returning the first modifier that has no meaning on a
    /// field if there is one
    pub fn field_flags(modifiers: &[Modifier]) -> std::result::Result<FieldAccessFlags, Modifier> {
        modifiers
            .iter()
            .try_fold(FieldAccessFlags::empty(), |flags, modifier| {
                modifier.field_flag().map(|flag| flags | flag).ok_or(*modifier)
            })
    }

    /// Modifiers for method flags, in canonical order
    pub fn from_method_flags(flags: MethodAccessFlags) -> Vec<Modifier> {
        Modifier::ALL
            .iter()
            .copied()
            .filter(|m| m.method_flag().map_or(false, |flag| flags.contains(flag)))
            .collect()
    }

    /// Modifiers for field flags, in canonical order
    pub fn from_field_flags(flags: FieldAccessFlags) -> Vec<Modifier> {
        Modifier::ALL
            .iter()
            .copied()
            .filter(|m| m.field_flag().map_or(false, |flag| flags.contains(flag)))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn keywords() {
        assert_eq!(Modifier::from_keyword("STATIC"), Some(Modifier::Static));
        assert_eq!(Modifier::from_keyword("strict"), Some(Modifier::Strict));
        assert_eq!(Modifier::from_keyword("strictfp"), Some(Modifier::Strict));
        assert_eq!(Modifier::from_keyword("static;"), None);
    }

    #[test]
    fn shared_bits_depend_on_member_kind() {
        let method = MethodAccessFlags::from_bits_truncate(0x0049);
        assert_eq!(
            Modifier::from_method_flags(method),
            vec![Modifier::Public, Modifier::Static, Modifier::Bridge]
        );
        let field = FieldAccessFlags::from_bits_truncate(0x0049);
        assert_eq!(
            Modifier::from_field_flags(field),
            vec![Modifier::Public, Modifier::Static, Modifier::Volatile]
        );
    }

    #[test]
    fn combining_modifiers() {
        let flags = Modifier::method_flags(&[Modifier::Private, Modifier::Static]).unwrap();
        assert_eq!(flags, MethodAccessFlags::PRIVATE | MethodAccessFlags::STATIC);
        assert_eq!(
            Modifier::field_flags(&[Modifier::Static, Modifier::Abstract]),
            Err(Modifier::Abstract)
        );
    }
}
