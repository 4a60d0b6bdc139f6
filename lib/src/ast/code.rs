use super::{Instruction, LdcValue};
use std::collections::HashSet;

/// Body of a method
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Code {
    pub entries: Vec<CodeEntry>,
}

impl Code {
    pub fn new(entries: Vec<CodeEntry>) -> Code {
        Code { entries }
    }

    /// Names of all defined labels, in order of definition
    pub fn label_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|entry| match &entry.item {
            CodeItem::Label(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Position of the entry defining the label
    pub fn label_position(&self, label: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| matches!(&entry.item, CodeItem::Label(name) if name == label))
    }

    /// Labels that some jump, switch, or try-catch refers to
    pub fn referenced_labels(&self) -> HashSet<&str> {
        let mut labels = HashSet::new();
        for entry in &self.entries {
            labels.extend(entry.item.label_references());
        }
        labels
    }

    pub fn try_catches(&self) -> impl Iterator<Item = (usize, &TryCatch)> {
        self.entries.iter().filter_map(|entry| match &entry.item {
            CodeItem::TryCatch(try_catch) => Some((entry.line, try_catch)),
            _ => None,
        })
    }

    pub fn instructions(&self) -> impl Iterator<Item = (usize, &Instruction)> {
        self.entries.iter().filter_map(|entry| match &entry.item {
            CodeItem::Instruction(insn) => Some((entry.line, insn)),
            _ => None,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CodeEntry {
    pub line: usize,
    pub item: CodeItem,
}

impl CodeEntry {
    pub fn new(line: usize, item: CodeItem) -> CodeEntry {
        CodeEntry { line, item }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CodeItem {
    /// Label declaration (`name:`)
    Label(String),

    Instruction(Instruction),

    /// `LINE label number`
    LineNumber { label: String, number: u16 },

    TryCatch(TryCatch),

    /// Method annotation
    Annotation(Annotation),

    /// Inline source fragment, handed to an expression compiler at generation time
    Expression(String),

    /// Text that could not be parsed, kept verbatim
    Unmatched(String),
}

impl CodeItem {
    /// Does this entry take part in control flow? The rest is metadata.
    pub fn is_instruction_like(&self) -> bool {
        matches!(
            self,
            CodeItem::Label(_) | CodeItem::Instruction(_) | CodeItem::Expression(_)
        )
    }

    /// Labels this entry refers to (not the ones it defines)
    pub fn label_references(&self) -> Vec<&str> {
        match self {
            CodeItem::Instruction(insn) => insn.label_references(),
            CodeItem::LineNumber { label, .. } => vec![label.as_str()],
            CodeItem::TryCatch(try_catch) => vec![
                try_catch.start.as_str(),
                try_catch.end.as_str(),
                try_catch.handler.as_str(),
            ],
            _ => vec![],
        }
    }
}

/// `TRY start end CATCH(type) handler`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TryCatch {
    pub start: String,
    pub end: String,
    pub handler: String,

    /// Internal name of the caught type (`None` catches everything)
    pub catch_type: Option<String>,
}

/// `VISIBLE_ANNOTATION type(key=value, ...)`
#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub visible: bool,

    /// Internal name of the annotation type
    pub type_name: String,

    pub args: Vec<(String, AnnotationValue)>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum AnnotationValue {
    /// Number, string, or class literal (handles are not allowed)
    Literal(LdcValue),

    /// Enum constant `Lpkg/Enum;.NAME`
    Enum { type_desc: String, name: String },

    Array(Vec<AnnotationValue>),
}
