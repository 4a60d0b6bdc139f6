use super::{Annotation, LdcValue, Located};
use crate::jvm::Modifier;

#[derive(Clone, Debug, PartialEq)]
pub enum Definition {
    Method(MethodDefinition),
    Field(FieldDefinition),
}

impl Definition {
    pub fn name(&self) -> &str {
        match self {
            Definition::Method(method) => &method.name,
            Definition::Field(field) => &field.name,
        }
    }

    pub fn modifiers(&self) -> &[Modifier] {
        match self {
            Definition::Method(method) => &method.modifiers,
            Definition::Field(field) => &field.modifiers,
        }
    }

    /// Line of the definition header
    pub fn line(&self) -> usize {
        match self {
            Definition::Method(method) => method.line,
            Definition::Field(field) => field.line,
        }
    }

    /// Full JVM descriptor of the member
    pub fn descriptor(&self) -> String {
        match self {
            Definition::Method(method) => method.descriptor(),
            Definition::Field(field) => field.desc.clone(),
        }
    }

    pub fn is_static(&self) -> bool {
        self.modifiers().contains(&Modifier::Static)
    }

    pub fn signature(&self) -> Option<&Located<String>> {
        match self {
            Definition::Method(method) => method.signature.as_ref(),
            Definition::Field(field) => field.signature.as_ref(),
        }
    }
}

/// Method header: `<modifiers> name(desc1 name1, desc2 name2)ret`
#[derive(Clone, Debug, PartialEq)]
pub struct MethodDefinition {
    pub modifiers: Vec<Modifier>,
    pub name: String,
    pub parameters: Vec<MethodParameter>,

    /// Return descriptor (`V` for void)
    pub return_type: String,

    pub signature: Option<Located<String>>,

    /// Checked exception types, as internal names
    pub thrown: Vec<Located<String>>,

    /// Methods cannot have constant values, but the syntax allows writing one. It is kept here so
    /// validation can report it.
    pub const_value: Option<Located<LdcValue>>,

    pub line: usize,
}

impl MethodDefinition {
    pub fn descriptor(&self) -> String {
        let mut descriptor = String::from("(");
        for parameter in &self.parameters {
            descriptor.push_str(&parameter.desc);
        }
        descriptor.push(')');
        descriptor.push_str(&self.return_type);
        descriptor
    }

    pub fn is_static(&self) -> bool {
        self.modifiers.contains(&Modifier::Static)
    }

    /// Methods without a body in the class file
    pub fn is_abstract_or_native(&self) -> bool {
        self.modifiers
            .iter()
            .any(|modifier| matches!(modifier, Modifier::Abstract | Modifier::Native))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodParameter {
    pub desc: String,
    pub name: String,
}

/// Field header: `<modifiers> name desc`
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDefinition {
    pub modifiers: Vec<Modifier>,
    pub name: String,
    pub desc: String,
    pub signature: Option<Located<String>>,
    pub const_value: Option<Located<LdcValue>>,
    pub annotations: Vec<Located<Annotation>>,
    pub line: usize,
}
