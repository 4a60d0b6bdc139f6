//! Read and write JVM class files
//!
//! This is the bytecode layer the assembler targets: descriptors and names, opcodes, the
//! instruction encoding, the constant pool, attributes, and whole class files.
//!
//! ### Simple example
//!
//! Building a class with a single abstract method, then reading it back:
//!
//! ```
//! use jvmasm::jvm::class_file::{ClassFile, ConstantLookup, ConstantsPool, Method, Version};
//! use jvmasm::jvm::*;
//!
//! # fn generate_class() -> Result<(), Error> {
//! let mut constants = ConstantsPool::new();
//! let this_class = constants.get_class("me/Shape")?;
//! let super_class = constants.get_class("java/lang/Object")?;
//! let area = Method {
//!     access_flags: MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
//!     name_index: constants.get_utf8("area")?,
//!     descriptor_index: constants.get_utf8("()D")?,
//!     attributes: vec![],
//! };
//!
//! let class = ClassFile {
//!     version: Version::JAVA8,
//!     constants: constants.into_offset_vec(),
//!     access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::ABSTRACT,
//!     this_class,
//!     super_class,
//!     interfaces: vec![],
//!     fields: vec![],
//!     methods: vec![area],
//!     attributes: vec![],
//! };
//!
//! let bytes = class.to_bytes()?;
//! let read = ClassFile::parse(&bytes)?;
//! assert_eq!(read.constants.class_name(read.this_class)?, "me/Shape");
//! # Ok(())
//! # }
//! # generate_class().unwrap();
//! ```

mod access_flags;
pub mod bytecode;
pub mod class_file;
mod descriptors;
mod errors;
mod names;
mod opcodes;
pub mod verifier;

pub use access_flags::*;
pub use class_file::{Constant, HandleKind};
pub use descriptors::*;
pub use errors::*;
pub use names::*;
pub use opcodes::*;
