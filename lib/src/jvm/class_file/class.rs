use super::{Attribute, ClassConstantIndex, Constant, Deserialize, Field, Method, Serialize};
use super::Version;
use crate::jvm::{ClassAccessFlags, Error};
use crate::util::OffsetVec;
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io;

/// Whole `class` file ([JVMS 4.1][0])
///
/// The assembler only ever writes classes holding a single member, but reading accepts anything
/// well-formed.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.1
#[derive(Debug)]
pub struct ClassFile {
    pub version: Version,
    pub constants: OffsetVec<Constant>,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassConstantIndex,
    pub super_class: ClassConstantIndex,
    pub interfaces: Vec<ClassConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    const MAGIC: u32 = 0xCAFE_BABE;

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut bytes = vec![];
        self.serialize(&mut bytes)?;
        Ok(bytes)
    }

    /// Read a class file, which must span all of `bytes`
    pub fn parse(bytes: &[u8]) -> Result<ClassFile, Error> {
        let mut reader = bytes;
        let class = ClassFile::deserialize(&mut reader).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                Error::MalformedClass(String::from("truncated"))
            } else {
                Error::MalformedClass(err.to_string())
            }
        })?;
        match reader.len() {
            0 => Ok(class),
            extra => Err(Error::MalformedClass(format!(
                "{} trailing bytes after class",
                extra
            ))),
        }
    }
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> io::Result<()> {
        ClassFile::MAGIC.serialize(writer)?;
        self.version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        self.super_class.serialize(writer)?;
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)
    }
}

impl Deserialize for ClassFile {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> io::Result<Self> {
        let magic = u32::deserialize(reader)?;
        if magic != ClassFile::MAGIC {
            let msg = format!("bad magic number 0x{:08X}", magic);
            return Err(io::Error::new(io::ErrorKind::InvalidData, msg));
        }
        Ok(ClassFile {
            version: Deserialize::deserialize(reader)?,
            constants: Deserialize::deserialize(reader)?,
            access_flags: Deserialize::deserialize(reader)?,
            this_class: Deserialize::deserialize(reader)?,
            super_class: Deserialize::deserialize(reader)?,
            interfaces: Deserialize::deserialize(reader)?,
            fields: Deserialize::deserialize(reader)?,
            methods: Deserialize::deserialize(reader)?,
            attributes: Deserialize::deserialize(reader)?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::ConstantsPool;
    use crate::jvm::MethodAccessFlags;

    #[test]
    fn write_then_read() {
        let mut pool = ConstantsPool::new();
        let this_class = pool.get_class("me/Example").unwrap();
        let super_class = pool.get_class("java/lang/Object").unwrap();
        let method = Method {
            access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
            name_index: pool.get_utf8("run").unwrap(),
            descriptor_index: pool.get_utf8("()V").unwrap(),
            attributes: vec![],
        };
        let class = ClassFile {
            version: Version::JAVA8,
            constants: pool.into_offset_vec(),
            access_flags: ClassAccessFlags::PUBLIC,
            this_class,
            super_class,
            interfaces: vec![],
            fields: vec![],
            methods: vec![method],
            attributes: vec![],
        };

        let bytes = class.to_bytes().unwrap();
        assert_eq!(&bytes[..8], &[0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52]);
        let read = ClassFile::parse(&bytes).unwrap();
        assert_eq!(read.version, Version::JAVA8);
        assert_eq!(read.constants, class.constants);
        assert_eq!(read.methods.len(), 1);
        assert_eq!(read.methods[0].descriptor_index, class.methods[0].descriptor_index);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            ClassFile::parse(&[0xCA, 0xFE]),
            Err(Error::MalformedClass(_))
        ));
        assert!(matches!(
            ClassFile::parse(&[0, 0, 0, 0, 0, 0, 0, 0]),
            Err(Error::MalformedClass(_))
        ));
    }
}
