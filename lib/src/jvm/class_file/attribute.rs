use super::{
    read_bytes, ClassConstantIndex, Constant, ConstantIndex, ConstantLookup, Deserialize,
    Serialize, Utf8ConstantIndex,
};
use crate::jvm::Error;
use crate::util::OffsetVec;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io;

/// Attribute in its raw form: a name, and an opaque payload ([JVMS 4.7][0])
///
/// Typed attributes implement [`AttributeLike`] and get encoded into this with
/// [`super::ConstantsPool::get_attribute`], or decoded back with [`Attribute::find`].
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name_index: Utf8ConstantIndex,
    pub info: Vec<u8>,
}

impl Attribute {
    /// Decode the payload, which must be consumed exactly
    pub fn decode<A: AttributeLike + Deserialize>(&self) -> Result<A, Error> {
        let mut reader: &[u8] = &self.info;
        let decoded = A::deserialize(&mut reader)
            .map_err(|err| Error::MalformedClass(format!("{} attribute: {}", A::NAME, err)))?;
        match reader.len() {
            0 => Ok(decoded),
            extra => Err(Error::MalformedClass(format!(
                "{} attribute has {} trailing bytes",
                A::NAME,
                extra
            ))),
        }
    }

    /// Decode the first attribute named `A::NAME`, if there is one
    pub fn find<A: AttributeLike + Deserialize>(
        attributes: &[Attribute],
        constants: &OffsetVec<Constant>,
    ) -> Result<Option<A>, Error> {
        for attribute in attributes {
            if constants.utf8(attribute.name_index)? == A::NAME {
                return attribute.decode().map(Some);
            }
        }
        Ok(None)
    }
}

impl Serialize for Attribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        self.name_index.serialize(writer)?;
        (self.info.len() as u32).serialize(writer)?;
        writer.write_all(&self.info)
    }
}

impl Deserialize for Attribute {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> io::Result<Self> {
        let name_index = Utf8ConstantIndex::deserialize(reader)?;
        let len = u32::deserialize(reader)? as usize;
        let info = read_bytes(reader, len)?;
        Ok(Attribute { name_index, info })
    }
}

/// Typed attribute with a fixed name
pub trait AttributeLike: Serialize {
    const NAME: &'static str;
}

/// [JVMS 4.7.2](https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.2)
#[derive(Debug, PartialEq)]
pub struct ConstantValue(pub ConstantIndex);

attribute_newtype!(ConstantValue(ConstantIndex) = "ConstantValue");

/// Checked exceptions of a method
#[derive(Debug)]
pub struct Exceptions(pub Vec<ClassConstantIndex>);

attribute_newtype!(Exceptions(Vec<ClassConstantIndex>) = "Exceptions");

/// Generic signature of a field or method
#[derive(Debug)]
pub struct Signature(pub Utf8ConstantIndex);

attribute_newtype!(Signature(Utf8ConstantIndex) = "Signature");

/// Class-level table of the bootstrap methods `invokedynamic` call sites refer to
#[derive(Debug, Default)]
pub struct BootstrapMethods(pub Vec<BootstrapMethod>);

attribute_newtype!(BootstrapMethods(Vec<BootstrapMethod>) = "BootstrapMethods");

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BootstrapMethod {
    /// `CONSTANT_MethodHandle_info` to call
    pub bootstrap_method: ConstantIndex,

    /// Loadable constants passed as static arguments
    pub bootstrap_arguments: Vec<ConstantIndex>,
}

record!(BootstrapMethod {
    bootstrap_method,
    bootstrap_arguments
});

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::{ConstantsPool, LineNumberTable};

    #[test]
    fn finding_attributes() {
        let mut pool = ConstantsPool::new();
        let signature_utf8 = pool.get_utf8("Ljava/util/List<TT;>;").unwrap();
        let exception = pool.get_class("java/io/IOException").unwrap();
        let attributes = vec![
            pool.get_attribute(Exceptions(vec![exception])).unwrap(),
            pool.get_attribute(Signature(signature_utf8)).unwrap(),
        ];
        let constants = pool.into_offset_vec();

        let signature: Signature = Attribute::find(&attributes, &constants).unwrap().unwrap();
        assert_eq!(signature.0, signature_utf8);
        let exceptions: Exceptions = Attribute::find(&attributes, &constants).unwrap().unwrap();
        assert_eq!(exceptions.0, vec![exception]);
        let lines: Option<LineNumberTable> = Attribute::find(&attributes, &constants).unwrap();
        assert!(lines.is_none());
    }

    #[test]
    fn payload_must_be_consumed_exactly() {
        let truncated = Attribute {
            name_index: Utf8ConstantIndex(ConstantIndex(1)),
            info: vec![0, 1, 0],
        };
        assert!(matches!(
            truncated.decode::<LineNumberTable>(),
            Err(Error::MalformedClass(_))
        ));

        let padded = Attribute {
            name_index: Utf8ConstantIndex(ConstantIndex(1)),
            info: vec![0, 5, 0xFF],
        };
        match padded.decode::<ConstantValue>() {
            Err(Error::MalformedClass(msg)) => assert!(msg.contains("1 trailing"), "{}", msg),
            other => panic!("expected trailing bytes, got {:?}", other),
        }
    }
}
