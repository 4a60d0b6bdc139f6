use crate::jvm::class_file::{ClassConstantIndex, Serialize};
use crate::jvm::{BaseType, FieldType};
use crate::util::Width;
use byteorder::WriteBytesExt;

/// Type of a local or stack slot, as the verifier sees it ([JVMS 4.10.1.2][0])
///
/// The analyzer works with `VerificationType<String, usize>` (class names, and the index of the
/// `new` instruction), while stack map tables are written with
/// `VerificationType<ClassConstantIndex, u16>` (pool entries, and bytecode offsets).
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType<Cls, U> {
    /// Nothing usable (unset local, merge conflict, or the upper half of a wide value)
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,

    /// `this` inside a constructor, before the super constructor runs
    UninitializedThis,

    Object(Cls),

    /// Result of a `new` whose constructor has not run yet
    Uninitialized(U),
}

impl<U> VerificationType<String, U> {
    /// Type of a value read from a field or local of the given type
    ///
    /// `boolean`, `byte`, `char`, and `short` all widen to `Integer`. Arrays use their descriptor
    /// as the class name.
    pub fn from_field_type(field_type: &FieldType) -> Self {
        match field_type {
            FieldType::Base(BaseType::Float) => VerificationType::Float,
            FieldType::Base(BaseType::Long) => VerificationType::Long,
            FieldType::Base(BaseType::Double) => VerificationType::Double,
            FieldType::Base(_) => VerificationType::Integer,
            FieldType::Ref(ref_type) => VerificationType::Object(ref_type.class_name()),
        }
    }
}

impl VerificationType<ClassConstantIndex, u16> {
    /// `tag` byte of the `verification_type_info` union
    fn tag(&self) -> u8 {
        match self {
            VerificationType::Top => 0,
            VerificationType::Integer => 1,
            VerificationType::Float => 2,
            VerificationType::Double => 3,
            VerificationType::Long => 4,
            VerificationType::Null => 5,
            VerificationType::UninitializedThis => 6,
            VerificationType::Object(_) => 7,
            VerificationType::Uninitialized(_) => 8,
        }
    }
}

impl Serialize for VerificationType<ClassConstantIndex, u16> {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.tag().serialize(writer)?;
        match self {
            VerificationType::Object(class) => class.serialize(writer),
            VerificationType::Uninitialized(offset) => offset.serialize(writer),
            _ => Ok(()),
        }
    }
}

impl<Cls, U> Width for VerificationType<Cls, U> {
    fn width(&self) -> usize {
        match self {
            VerificationType::Double | VerificationType::Long => 2,
            _ => 1,
        }
    }
}
