//! Binary `class` file structures, along with their encoding and decoding

/// Encode and decode a struct as its fields, in declaration order
macro_rules! record {
    ($name:ident { $($field:ident),* $(,)? }) => {
        impl Serialize for $name {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                $(self.$field.serialize(writer)?;)*
                Ok(())
            }
        }

        impl Deserialize for $name {
            fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
                Ok($name {
                    $($field: Deserialize::deserialize(reader)?,)*
                })
            }
        }
    };
}

/// Attribute whose payload is exactly the encoding of its one field
macro_rules! attribute_newtype {
    ($attr:ident($inner:ty) = $name:literal) => {
        impl AttributeLike for $attr {
            const NAME: &'static str = $name;
        }

        impl Serialize for $attr {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                self.0.serialize(writer)
            }
        }

        impl Deserialize for $attr {
            fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
                <$inner>::deserialize(reader).map($attr)
            }
        }
    };
}

mod annotations;
mod attribute;
mod class;
mod code;
mod constants;
mod member;
mod mutf8;
mod pool;
mod serialize;
mod version;

pub use annotations::*;
pub use attribute::*;
pub use class::*;
pub use code::*;
pub use constants::*;
pub use member::*;
pub use mutf8::*;
pub use pool::*;
pub use serialize::*;
pub use version::*;
