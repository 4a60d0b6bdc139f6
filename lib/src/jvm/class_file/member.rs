use super::{Attribute, Deserialize, Serialize, Utf8ConstantIndex};
use crate::jvm::{FieldAccessFlags, MethodAccessFlags};
use byteorder::{ReadBytesExt, WriteBytesExt};

/// [JVMS 4.5](https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.5)
#[derive(Debug)]
pub struct Field {
    pub access_flags: FieldAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,

    /// `ConstantValue`, `Signature`, and annotations
    pub attributes: Vec<Attribute>,
}

record!(Field {
    access_flags,
    name_index,
    descriptor_index,
    attributes
});

/// [JVMS 4.6](https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.6)
#[derive(Debug)]
pub struct Method {
    pub access_flags: MethodAccessFlags,
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,

    /// `Code`, `Exceptions`, `Signature`, and annotations
    pub attributes: Vec<Attribute>,
}

record!(Method {
    access_flags,
    name_index,
    descriptor_index,
    attributes
});
