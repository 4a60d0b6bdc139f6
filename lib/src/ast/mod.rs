//! Syntax tree for a single assembled class member
//!
//! A [`Unit`] holds exactly one [`Definition`]. Method units also hold a [`Code`] body, which is
//! a flat list of entries in source order. Entries refer to labels by name: nothing is resolved
//! to an offset until generation.
//!
//! Every node that came from a line of text remembers that 1-based line, so that later stages
//! can point back at the source.

mod code;
mod definition;
mod instruction;

pub use code::*;
pub use definition::*;
pub use instruction::*;

/// Root of the tree: one member definition, plus code for methods
#[derive(Clone, Debug, PartialEq)]
pub struct Unit {
    pub definition: Definition,
    pub code: Option<Code>,
}

impl Unit {
    pub fn method(&self) -> Option<&MethodDefinition> {
        match &self.definition {
            Definition::Method(method) => Some(method),
            Definition::Field(_) => None,
        }
    }

    pub fn field(&self) -> Option<&FieldDefinition> {
        match &self.definition {
            Definition::Field(field) => Some(field),
            Definition::Method(_) => None,
        }
    }

    pub fn is_method(&self) -> bool {
        self.method().is_some()
    }

    /// Does any code entry hold text that could not be parsed?
    pub fn has_unmatched(&self) -> bool {
        self.code.as_ref().map_or(false, |code| {
            code.entries
                .iter()
                .any(|entry| matches!(entry.item, CodeItem::Unmatched(_)))
        })
    }
}

/// Value tagged with the source line it came from
#[derive(Clone, Debug, PartialEq)]
pub struct Located<T> {
    pub value: T,
    pub line: usize,
}

impl<T> Located<T> {
    pub fn new(value: T, line: usize) -> Located<T> {
        Located { value, line }
    }
}
