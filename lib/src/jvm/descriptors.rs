//! Field and method descriptors ([JVMS 4.3][0])
//!
//! Assembly text spells every type as a descriptor, so these are parsed far more often than they
//! are rendered. Parse errors carry the character position where the grammar broke down.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.3

use super::{BinaryName, Name};
use crate::util::Width;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DescriptorError {
    /// Character offset into the descriptor
    pub position: usize,
    pub message: String,
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (at position {})", self.message, self.position)
    }
}

impl std::error::Error for DescriptorError {}

type Result<T> = std::result::Result<T, DescriptorError>;

/// Position-tracking reader over a descriptor
pub struct DescriptorReader<'a> {
    source: &'a str,
    position: usize,
}

impl<'a> DescriptorReader<'a> {
    pub fn new(source: &'a str) -> DescriptorReader<'a> {
        DescriptorReader {
            source,
            position: 0,
        }
    }

    pub fn peek(&self) -> Option<char> {
        self.source[self.position..].chars().next()
    }

    pub fn next(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.position += c.len_utf8();
        Some(c)
    }

    /// Consume everything up to (and including) `terminator`, returning what came before it
    fn take_until(&mut self, terminator: char) -> Option<&'a str> {
        let rest = &self.source[self.position..];
        let end = rest.find(terminator)?;
        self.position += end + terminator.len_utf8();
        Some(&rest[..end])
    }

    fn error(&self, message: impl Into<String>) -> DescriptorError {
        DescriptorError {
            position: self.position,
            message: message.into(),
        }
    }

    fn unexpected(&self, expected: &str) -> DescriptorError {
        match self.peek() {
            Some(c) => self.error(format!("expected {}, found '{}'", expected, c)),
            None => self.error(format!("expected {}, found end of descriptor", expected)),
        }
    }
}

pub trait RenderDescriptor {
    fn render(&self) -> String {
        let mut rendered = String::new();
        self.render_to(&mut rendered);
        rendered
    }

    fn render_to(&self, out: &mut String);
}

pub trait ParseDescriptor: Sized {
    /// Parse a complete descriptor, rejecting trailing characters
    fn parse(source: &str) -> Result<Self> {
        let mut reader = DescriptorReader::new(source);
        let parsed = Self::read(&mut reader)?;
        match reader.peek() {
            None => Ok(parsed),
            Some(c) => Err(reader.error(format!("unexpected trailing '{}'", c))),
        }
    }

    fn read(reader: &mut DescriptorReader) -> Result<Self>;
}

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl Width for BaseType {
    fn width(&self) -> usize {
        match self {
            BaseType::Double | BaseType::Long => 2,
            _ => 1,
        }
    }
}

impl BaseType {
    pub const ALL: [BaseType; 8] = [
        BaseType::Byte,
        BaseType::Char,
        BaseType::Double,
        BaseType::Float,
        BaseType::Int,
        BaseType::Long,
        BaseType::Short,
        BaseType::Boolean,
    ];

    /// Descriptor letter
    pub fn letter(&self) -> char {
        match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        }
    }

    pub fn from_letter(letter: char) -> Option<BaseType> {
        BaseType::ALL
            .into_iter()
            .find(|base_type| base_type.letter() == letter)
    }

    /// Java keyword for the type, as used by `newarray` operands
    pub fn name(&self) -> &'static str {
        match self {
            BaseType::Byte => "byte",
            BaseType::Char => "char",
            BaseType::Double => "double",
            BaseType::Float => "float",
            BaseType::Int => "int",
            BaseType::Long => "long",
            BaseType::Short => "short",
            BaseType::Boolean => "boolean",
        }
    }

    /// Accept either the Java keyword or the descriptor letter
    pub fn from_name(name: &str) -> Option<BaseType> {
        let mut chars = name.chars();
        if let (Some(letter), None) = (chars.next(), chars.next()) {
            return BaseType::from_letter(letter);
        }
        BaseType::ALL
            .into_iter()
            .find(|base_type| base_type.name() == name)
    }

    /// `atype` operand of the `newarray` instruction
    pub fn array_type_code(&self) -> u8 {
        match self {
            BaseType::Boolean => 4,
            BaseType::Char => 5,
            BaseType::Float => 6,
            BaseType::Double => 7,
            BaseType::Byte => 8,
            BaseType::Short => 9,
            BaseType::Int => 10,
            BaseType::Long => 11,
        }
    }

    pub fn from_array_type_code(code: u8) -> Option<BaseType> {
        BaseType::ALL
            .into_iter()
            .find(|base_type| base_type.array_type_code() == code)
    }

    /// Is the type one the JVM represents as an `int` on the stack?
    pub fn is_int_like(&self) -> bool {
        !matches!(self, BaseType::Double | BaseType::Float | BaseType::Long)
    }
}

impl RenderDescriptor for BaseType {
    fn render_to(&self, out: &mut String) {
        out.push(self.letter());
    }
}

impl ParseDescriptor for BaseType {
    fn read(reader: &mut DescriptorReader) -> Result<Self> {
        match reader.peek().and_then(BaseType::from_letter) {
            Some(base_type) => {
                reader.next();
                Ok(base_type)
            }
            None => Err(reader.unexpected("a primitive type")),
        }
    }
}

impl RenderDescriptor for BinaryName {
    fn render_to(&self, out: &mut String) {
        out.push('L');
        out.push_str(self.as_str());
        out.push(';');
    }
}

impl ParseDescriptor for BinaryName {
    fn read(reader: &mut DescriptorReader) -> Result<Self> {
        if reader.peek() != Some('L') {
            return Err(reader.unexpected("'L'"));
        }
        reader.next();
        let start = reader.position;
        let name = reader
            .take_until(';')
            .ok_or_else(|| reader.error("class name is missing its ';'"))?;
        BinaryName::from_str(name).map_err(|message| DescriptorError {
            position: start,
            message,
        })
    }
}

/// Array type with `dimensions` levels of nesting around `element`
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ArrayType<T> {
    /// At least 1 (`[[I` has 2)
    pub dimensions: usize,
    pub element: T,
}

impl<T: RenderDescriptor> RenderDescriptor for ArrayType<T> {
    fn render_to(&self, out: &mut String) {
        for _ in 0..self.dimensions {
            out.push('[');
        }
        self.element.render_to(out);
    }
}

/// Reference type
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType {
    Object(BinaryName),
    ObjectArray(ArrayType<BinaryName>),
    PrimitiveArray(ArrayType<BaseType>),
}

/// Arrays may have at most this many dimensions
pub const MAX_ARRAY_DIMENSIONS: usize = 255;

impl RefType {
    /// Name as it appears in a `CONSTANT_Class_info`: the binary name for plain objects, and the
    /// full descriptor for arrays.
    pub fn class_name(&self) -> String {
        match self {
            RefType::Object(class) => String::from(class.as_str()),
            other => other.render(),
        }
    }

    /// Inverse of [`RefType::class_name`]
    pub fn from_class_name(name: &str) -> Result<RefType> {
        if name.starts_with('[') {
            RefType::parse(name)
        } else {
            BinaryName::from_str(name)
                .map(RefType::Object)
                .map_err(|message| DescriptorError {
                    position: 0,
                    message,
                })
        }
    }

    /// Number of array dimensions (0 for plain objects)
    pub fn dimensions(&self) -> usize {
        match self {
            RefType::Object(_) => 0,
            RefType::ObjectArray(array) => array.dimensions,
            RefType::PrimitiveArray(array) => array.dimensions,
        }
    }
}

impl RenderDescriptor for RefType {
    fn render_to(&self, out: &mut String) {
        match self {
            RefType::Object(class) => class.render_to(out),
            RefType::ObjectArray(array) => array.render_to(out),
            RefType::PrimitiveArray(array) => array.render_to(out),
        }
    }
}

impl ParseDescriptor for RefType {
    fn read(reader: &mut DescriptorReader) -> Result<Self> {
        let mut dimensions = 0;
        while reader.peek() == Some('[') {
            reader.next();
            dimensions += 1;
        }
        if dimensions > MAX_ARRAY_DIMENSIONS {
            return Err(reader.error(format!("{} array dimensions is too many", dimensions)));
        }
        if dimensions == 0 {
            return BinaryName::read(reader).map(RefType::Object);
        }
        match reader.peek() {
            Some('L') => Ok(RefType::ObjectArray(ArrayType {
                dimensions,
                element: BinaryName::read(reader)?,
            })),
            _ => Ok(RefType::PrimitiveArray(ArrayType {
                dimensions,
                element: BaseType::read(reader)?,
            })),
        }
    }
}

/// Type of a field, parameter, or local variable
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType {
    Base(BaseType),
    Ref(RefType),
}

impl Width for FieldType {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base_type) => base_type.width(),
            FieldType::Ref(_) => 1,
        }
    }
}

impl RenderDescriptor for FieldType {
    fn render_to(&self, out: &mut String) {
        match self {
            FieldType::Base(base_type) => base_type.render_to(out),
            FieldType::Ref(ref_type) => ref_type.render_to(out),
        }
    }
}

impl ParseDescriptor for FieldType {
    fn read(reader: &mut DescriptorReader) -> Result<Self> {
        match reader.peek() {
            Some('L' | '[') => RefType::read(reader).map(FieldType::Ref),
            Some(c) if BaseType::from_letter(c).is_some() => {
                BaseType::read(reader).map(FieldType::Base)
            }
            _ => Err(reader.unexpected("a field type")),
        }
    }
}

/// Parameter and return types of a method
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,

    /// `None` for `void`
    pub return_type: Option<FieldType>,
}

impl MethodDescriptor {
    /// Local slots taken up by the arguments, including `this` if there is one
    ///
    /// This must be at most 255 for the descriptor to be usable.
    pub fn argument_slots(&self, has_this: bool) -> usize {
        let this = usize::from(has_this);
        this + self.parameters.iter().map(Width::width).sum::<usize>()
    }
}

impl RenderDescriptor for MethodDescriptor {
    fn render_to(&self, out: &mut String) {
        out.push('(');
        for parameter in &self.parameters {
            parameter.render_to(out);
        }
        out.push(')');
        match &self.return_type {
            Some(return_type) => return_type.render_to(out),
            None => out.push('V'),
        }
    }
}

impl ParseDescriptor for MethodDescriptor {
    fn read(reader: &mut DescriptorReader) -> Result<Self> {
        if reader.next() != Some('(') {
            return Err(reader.error("method descriptor must start with '('"));
        }
        let mut parameters = vec![];
        loop {
            match reader.peek() {
                Some(')') => break,
                None => return Err(reader.unexpected("')'")),
                Some(_) => parameters.push(FieldType::read(reader)?),
            }
        }
        reader.next();

        let return_type = if reader.peek() == Some('V') {
            reader.next();
            None
        } else {
            Some(FieldType::read(reader)?)
        };
        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn object(name: &str) -> FieldType {
        FieldType::Ref(RefType::Object(BinaryName::from_str(name).unwrap()))
    }

    #[test]
    fn field_types() {
        assert_eq!(FieldType::parse("I").unwrap(), FieldType::Base(BaseType::Int));
        assert_eq!(
            FieldType::parse("Ljava/lang/String;").unwrap(),
            object("java/lang/String")
        );
        assert_eq!(FieldType::parse("LI;").unwrap(), object("I"));

        let matrix = FieldType::parse("[[D").unwrap();
        assert_eq!(
            matrix,
            FieldType::Ref(RefType::PrimitiveArray(ArrayType {
                dimensions: 2,
                element: BaseType::Double,
            }))
        );
        assert_eq!(matrix.render(), "[[D");
        assert_eq!(
            FieldType::parse("[Ljava/lang/Object;").unwrap().render(),
            "[Ljava/lang/Object;"
        );
    }

    #[test]
    fn method_descriptors() {
        let desc = MethodDescriptor::parse("(IDLjava/lang/String;)Ljava/lang/Object;").unwrap();
        assert_eq!(desc.parameters.len(), 3);
        assert_eq!(desc.return_type, Some(object("java/lang/Object")));
        assert_eq!(desc.argument_slots(false), 4);
        assert_eq!(desc.render(), "(IDLjava/lang/String;)Ljava/lang/Object;");

        let desc = MethodDescriptor::parse("()V").unwrap();
        assert!(desc.parameters.is_empty());
        assert_eq!(desc.return_type, None);
        assert_eq!(desc.argument_slots(true), 1);
    }

    #[test]
    fn errors_have_positions() {
        let position = |result: Result<FieldType>| result.unwrap_err().position;
        assert_eq!(position(FieldType::parse("")), 0);
        assert_eq!(position(FieldType::parse("Q")), 0);
        assert_eq!(position(FieldType::parse("II")), 1);
        assert_eq!(position(FieldType::parse("Ljava/lang/String")), 1);
        assert_eq!(position(FieldType::parse("Ljava//String;")), 1);
        assert_eq!(position(FieldType::parse("[[V")), 2);
        assert_eq!(position(FieldType::parse("V")), 0);

        assert!(MethodDescriptor::parse("(I").is_err());
        assert!(MethodDescriptor::parse("I)V").is_err());
        assert!(MethodDescriptor::parse("(V)V").is_err());
    }

    #[test]
    fn class_names() {
        let string = RefType::from_class_name("java/lang/String").unwrap();
        assert_eq!(string, RefType::Object(BinaryName::STRING));
        assert_eq!(string.class_name(), "java/lang/String");
        assert_eq!(string.dimensions(), 0);

        let ints = RefType::from_class_name("[I").unwrap();
        assert_eq!(ints.class_name(), "[I");
        assert_eq!(ints.dimensions(), 1);
        assert!(RefType::from_class_name("java.lang.String").is_err());
    }

    #[test]
    fn newarray_types() {
        for base in BaseType::ALL {
            assert_eq!(BaseType::from_name(base.name()), Some(base));
            assert_eq!(BaseType::from_letter(base.letter()), Some(base));
            assert_eq!(
                BaseType::from_array_type_code(base.array_type_code()),
                Some(base)
            );
        }
        assert_eq!(BaseType::from_name("J"), Some(BaseType::Long));
        assert_eq!(BaseType::from_name("string"), None);
        assert!(BaseType::Boolean.is_int_like());
        assert!(!BaseType::Float.is_int_like());
    }
}
