//! `RuntimeVisibleAnnotations` and `RuntimeInvisibleAnnotations` ([JVMS 4.7.16][0])
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.16

use super::{AttributeLike, ConstantIndex, Deserialize, Serialize, Utf8ConstantIndex};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io;

#[derive(Debug)]
pub struct RuntimeVisibleAnnotations(pub Vec<Annotation>);

attribute_newtype!(RuntimeVisibleAnnotations(Vec<Annotation>) = "RuntimeVisibleAnnotations");

#[derive(Debug)]
pub struct RuntimeInvisibleAnnotations(pub Vec<Annotation>);

attribute_newtype!(RuntimeInvisibleAnnotations(Vec<Annotation>) = "RuntimeInvisibleAnnotations");

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Field descriptor of the annotation interface
    pub type_index: Utf8ConstantIndex,
    pub element_value_pairs: Vec<ElementValuePair>,
}

record!(Annotation {
    type_index,
    element_value_pairs
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementValuePair {
    pub name_index: Utf8ConstantIndex,
    pub value: ElementValue,
}

record!(ElementValuePair { name_index, value });

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ElementValue {
    /// Primitive or string constant, tagged with one of `BCDFIJSZs`
    Constant { tag: u8, value: ConstantIndex },
    Enum {
        type_name: Utf8ConstantIndex,
        const_name: Utf8ConstantIndex,
    },
    Class(Utf8ConstantIndex),
    Annotation(Box<Annotation>),
    Array(Vec<ElementValue>),
}

impl ElementValue {
    fn tag(&self) -> u8 {
        match self {
            ElementValue::Constant { tag, .. } => *tag,
            ElementValue::Enum { .. } => b'e',
            ElementValue::Class(_) => b'c',
            ElementValue::Annotation(_) => b'@',
            ElementValue::Array(_) => b'[',
        }
    }
}

impl Serialize for ElementValue {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        self.tag().serialize(writer)?;
        match self {
            ElementValue::Constant { value, .. } => value.serialize(writer),
            ElementValue::Enum {
                type_name,
                const_name,
            } => {
                type_name.serialize(writer)?;
                const_name.serialize(writer)
            }
            ElementValue::Class(class) => class.serialize(writer),
            ElementValue::Annotation(annotation) => annotation.serialize(writer),
            ElementValue::Array(values) => values.serialize(writer),
        }
    }
}

impl Deserialize for ElementValue {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> io::Result<Self> {
        let tag = u8::deserialize(reader)?;
        Ok(match tag {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => {
                ElementValue::Constant {
                    tag,
                    value: ConstantIndex::deserialize(reader)?,
                }
            }
            b'e' => ElementValue::Enum {
                type_name: Utf8ConstantIndex::deserialize(reader)?,
                const_name: Utf8ConstantIndex::deserialize(reader)?,
            },
            b'c' => ElementValue::Class(Utf8ConstantIndex::deserialize(reader)?),
            b'@' => ElementValue::Annotation(Box::new(Annotation::deserialize(reader)?)),
            b'[' => ElementValue::Array(Vec::deserialize(reader)?),
            other => {
                let msg = format!("unknown element value tag {:?}", other as char);
                return Err(io::Error::new(io::ErrorKind::InvalidData, msg));
            }
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn utf8(idx: u16) -> Utf8ConstantIndex {
        Utf8ConstantIndex(ConstantIndex(idx))
    }

    #[test]
    fn nested_values_read_back() {
        let annotation = Annotation {
            type_index: utf8(1),
            element_value_pairs: vec![ElementValuePair {
                name_index: utf8(2),
                value: ElementValue::Array(vec![
                    ElementValue::Constant {
                        tag: b'I',
                        value: ConstantIndex(3),
                    },
                    ElementValue::Enum {
                        type_name: utf8(4),
                        const_name: utf8(5),
                    },
                ]),
            }],
        };
        let mut bytes = vec![];
        annotation.serialize(&mut bytes).unwrap();
        assert_eq!(
            bytes,
            vec![0, 1, 0, 1, 0, 2, b'[', 0, 2, b'I', 0, 3, b'e', 0, 4, 0, 5]
        );
        assert_eq!(Annotation::deserialize(&mut bytes.as_slice()).unwrap(), annotation);
    }

    #[test]
    fn unknown_tag() {
        let err = ElementValue::deserialize(&mut [b'x', 0, 1].as_slice()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
