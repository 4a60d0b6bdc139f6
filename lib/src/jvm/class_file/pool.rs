use super::{
    Attribute, AttributeLike, ClassConstantIndex, Constant, ConstantIndex, FieldRefConstantIndex,
    HandleKind, InvokeDynamicConstantIndex, MethodRefConstantIndex, NameAndTypeConstantIndex,
    StringConstantIndex, Utf8ConstantIndex,
};
use crate::jvm::Error;
use crate::util::{Offset, OffsetVec, Width};
use std::borrow::Cow;
use std::collections::HashMap;

/// Append-only builder for a class file constant pool
///
/// Every `get_*` method returns the index of an equal constant if one was already added, and
/// otherwise appends a new one. Once every constant is in, [`ConstantsPool::into_offset_vec`]
/// hands the pool over to the class file.
#[derive(Debug)]
pub struct ConstantsPool {
    constants: OffsetVec<Constant>,
    interned: HashMap<PoolKey, ConstantIndex>,
}

/// Identity of a constant for deduplication
///
/// Floating point constants are compared by bit pattern, so every `NaN` payload and `-0.0` get
/// entries of their own.
#[derive(Debug, Hash, PartialEq, Eq)]
enum PoolKey {
    Utf8(String),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(Utf8ConstantIndex),
    String(Utf8ConstantIndex),
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),
    MethodRef(ClassConstantIndex, NameAndTypeConstantIndex, bool),
    NameAndType(Utf8ConstantIndex, Utf8ConstantIndex),
    MethodHandle(HandleKind, ConstantIndex),
    MethodType(Utf8ConstantIndex),
    InvokeDynamic(u16, NameAndTypeConstantIndex),
}

impl PoolKey {
    /// Key of a constant the builder can create (`None` for kinds only seen when reading)
    fn of(constant: &Constant) -> Option<PoolKey> {
        Some(match constant {
            Constant::Utf8(string) => PoolKey::Utf8(string.clone()),
            Constant::Integer(int) => PoolKey::Integer(*int),
            Constant::Float(float) => PoolKey::Float(float.to_bits()),
            Constant::Long(long) => PoolKey::Long(*long),
            Constant::Double(double) => PoolKey::Double(double.to_bits()),
            Constant::Class(name) => PoolKey::Class(*name),
            Constant::String(utf8) => PoolKey::String(*utf8),
            Constant::FieldRef(class, name_and_type) => PoolKey::FieldRef(*class, *name_and_type),
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => PoolKey::MethodRef(*class, *name_and_type, *is_interface),
            Constant::NameAndType { name, descriptor } => PoolKey::NameAndType(*name, *descriptor),
            Constant::MethodHandle {
                handle_kind,
                member,
            } => PoolKey::MethodHandle(*handle_kind, *member),
            Constant::MethodType { descriptor } => PoolKey::MethodType(*descriptor),
            Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            } => PoolKey::InvokeDynamic(*bootstrap_method, *method_descriptor),
            Constant::Dynamic { .. } | Constant::Module(_) | Constant::Package(_) => return None,
        })
    }
}

/// The pool ran out of indices while adding `constant`
#[derive(Debug)]
pub struct ConstantPoolOverflow {
    pub constant: Constant,
    pub offset: u16,
}

impl From<ConstantPoolOverflow> for Error {
    fn from(overflow: ConstantPoolOverflow) -> Error {
        Error::ConstantPoolOverflow {
            constant: overflow.constant,
            offset: overflow.offset,
        }
    }
}

type Result<T> = std::result::Result<T, ConstantPoolOverflow>;

impl ConstantsPool {
    pub fn new() -> ConstantsPool {
        ConstantsPool {
            constants: OffsetVec::new_starting_at(Offset(1)),
            interned: HashMap::new(),
        }
    }

    /// Constants added so far
    pub fn constants(&self) -> &OffsetVec<Constant> {
        &self.constants
    }

    pub fn into_offset_vec(self) -> OffsetVec<Constant> {
        self.constants
    }

    /// Find or append a constant
    fn intern(&mut self, constant: Constant) -> Result<ConstantIndex> {
        let key = PoolKey::of(&constant);
        if let Some(idx) = key.as_ref().and_then(|key| self.interned.get(key)) {
            return Ok(*idx);
        }

        // `constant_pool_count` is a `u16` one past the last index
        let offset = self.constants.offset_len().0;
        if offset + constant.width() > u16::MAX as usize {
            return Err(ConstantPoolOverflow {
                constant,
                offset: offset as u16,
            });
        }
        let idx = ConstantIndex(offset as u16);
        self.constants.push(constant);
        if let Some(key) = key {
            self.interned.insert(key, idx);
        }
        Ok(idx)
    }

    pub fn get_utf8<'a>(&mut self, utf8: impl Into<Cow<'a, str>>) -> Result<Utf8ConstantIndex> {
        let utf8 = utf8.into().into_owned();
        self.intern(Constant::Utf8(utf8)).map(Utf8ConstantIndex)
    }

    /// Class constant from an internal name (`java/lang/String`) or array descriptor (`[I`)
    pub fn get_class(&mut self, name: &str) -> Result<ClassConstantIndex> {
        let name = self.get_utf8(name)?;
        self.intern(Constant::Class(name)).map(ClassConstantIndex)
    }

    pub fn get_string(&mut self, utf8: Utf8ConstantIndex) -> Result<StringConstantIndex> {
        self.intern(Constant::String(utf8))
            .map(StringConstantIndex)
    }

    pub fn get_integer(&mut self, integer: i32) -> Result<ConstantIndex> {
        self.intern(Constant::Integer(integer))
    }

    pub fn get_float(&mut self, float: f32) -> Result<ConstantIndex> {
        self.intern(Constant::Float(float))
    }

    pub fn get_long(&mut self, long: i64) -> Result<ConstantIndex> {
        self.intern(Constant::Long(long))
    }

    pub fn get_double(&mut self, double: f64) -> Result<ConstantIndex> {
        self.intern(Constant::Double(double))
    }

    pub fn get_name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> Result<NameAndTypeConstantIndex> {
        let name = self.get_utf8(name)?;
        let descriptor = self.get_utf8(descriptor)?;
        self.intern(Constant::NameAndType { name, descriptor })
            .map(NameAndTypeConstantIndex)
    }

    pub fn get_field_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<FieldRefConstantIndex> {
        let class = self.get_class(owner)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        self.intern(Constant::FieldRef(class, name_and_type))
            .map(FieldRefConstantIndex)
    }

    /// `CONSTANT_Methodref_info`, or `CONSTANT_InterfaceMethodref_info` if `is_interface`
    pub fn get_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        is_interface: bool,
    ) -> Result<MethodRefConstantIndex> {
        let class = self.get_class(owner)?;
        let name_and_type = self.get_name_and_type(name, descriptor)?;
        let constant = Constant::MethodRef {
            class,
            name_and_type,
            is_interface,
        };
        self.intern(constant).map(MethodRefConstantIndex)
    }

    /// `member` must be a field reference for the field handle kinds, and a method reference
    /// otherwise
    pub fn get_method_handle(
        &mut self,
        handle_kind: HandleKind,
        member: ConstantIndex,
    ) -> Result<ConstantIndex> {
        self.intern(Constant::MethodHandle {
            handle_kind,
            member,
        })
    }

    pub fn get_method_type(&mut self, descriptor: &str) -> Result<ConstantIndex> {
        let descriptor = self.get_utf8(descriptor)?;
        self.intern(Constant::MethodType { descriptor })
    }

    /// Call site whose bootstrap method is at `bootstrap_method` in the `BootstrapMethods`
    /// attribute
    pub fn get_invoke_dynamic(
        &mut self,
        bootstrap_method: u16,
        name: &str,
        descriptor: &str,
    ) -> Result<InvokeDynamicConstantIndex> {
        let method_descriptor = self.get_name_and_type(name, descriptor)?;
        let constant = Constant::InvokeDynamic {
            bootstrap_method,
            method_descriptor,
        };
        self.intern(constant).map(InvokeDynamicConstantIndex)
    }

    /// Encode an attribute, adding its name to the pool
    pub fn get_attribute<A: AttributeLike>(
        &mut self,
        attribute: A,
    ) -> std::result::Result<Attribute, Error> {
        let name_index = self.get_utf8(A::NAME)?;
        let mut info = vec![];
        attribute.serialize(&mut info).map_err(Error::IoError)?;
        Ok(Attribute { name_index, info })
    }
}

impl Default for ConstantsPool {
    fn default() -> Self {
        ConstantsPool::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::{ConstantLookup, Deserialize, MemberRef, Serialize};

    #[test]
    fn equal_constants_share_an_index() {
        let mut pool = ConstantsPool::new();
        let a = pool.get_method_ref("java/lang/Object", "<init>", "()V", false).unwrap();
        let b = pool.get_method_ref("java/lang/Object", "<init>", "()V", false).unwrap();
        assert_eq!(a, b);
        let c = pool.get_method_ref("java/lang/Object", "<init>", "()V", true).unwrap();
        assert_ne!(a, c);

        assert_eq!(pool.get_float(f32::NAN).unwrap(), pool.get_float(f32::NAN).unwrap());
        assert_ne!(pool.get_float(0.0).unwrap(), pool.get_float(-0.0).unwrap());

        let class = pool.get_class("java/lang/Object").unwrap();
        let utf8 = pool.get_utf8("java/lang/Object").unwrap();
        assert_eq!(pool.constants().class_name(class).unwrap(), "java/lang/Object");
        assert_eq!(pool.constants().utf8(utf8).unwrap(), "java/lang/Object");
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut pool = ConstantsPool::new();
        assert_eq!(pool.get_long(1).unwrap(), ConstantIndex(1));
        assert_eq!(pool.get_integer(1).unwrap(), ConstantIndex(3));
        assert_eq!(pool.get_long(1).unwrap(), ConstantIndex(1));
        assert_eq!(pool.constants().offset_len(), Offset(4));
    }

    #[test]
    fn overflow_is_reported() {
        let mut pool = ConstantsPool::new();
        for int in 0..(u16::MAX as i32 - 1) {
            pool.get_integer(int).unwrap();
        }
        assert_eq!(pool.constants().offset_len(), Offset(u16::MAX as usize));
        let overflow = pool.get_integer(-1).unwrap_err();
        assert_eq!(overflow.offset, u16::MAX);
        assert!(matches!(overflow.constant, Constant::Integer(-1)));
    }

    #[test]
    fn lookups_after_reading_back() {
        let mut pool = ConstantsPool::new();
        let field = pool.get_field_ref("a/B", "count", "I").unwrap();
        pool.get_double(2.5).unwrap();
        let mut bytes = vec![];
        pool.constants().serialize(&mut bytes).unwrap();

        let read = OffsetVec::<Constant>::deserialize(&mut bytes.as_slice()).unwrap();
        assert_eq!(&read, pool.constants());
        let member = read.member_ref(field.0 .0).unwrap();
        assert_eq!(
            member,
            MemberRef {
                owner: "a/B",
                name: "count",
                descriptor: "I",
                is_interface: false,
            }
        );
        assert!(matches!(read.member_ref(1), Err(Error::BadConstantIndex(1))));
    }
}
