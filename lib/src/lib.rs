//! Assembler, analyzer, and disassembler for single JVM class members
//!
//! A unit of assembly describes one method or field. The stages are:
//!
//!   - [`parse`] turns assembly text into an [`ast::Unit`], and [`print`] does the reverse
//!   - [`disassemble`] turns an existing class member into an [`ast::Unit`]
//!   - [`validate`] collects diagnostics about a unit, without ever failing
//!   - [`analysis`] splits method code into blocks and infers a type frame at every instruction
//!   - [`generate`] lowers a unit into class file structures in [`jvm`]
//!
//! [`pipeline`] sequences all of these and reports progress to listeners.

pub mod analysis;
pub mod ast;
pub mod disassemble;
pub mod generate;
pub mod jvm;
pub mod parse;
pub mod pipeline;
pub mod print;
pub mod util;
pub mod validate;
