//! Lower a [`Unit`] into class file structures
//!
//! Generating a method goes through these steps:
//!
//!   1. inline `EXPR` entries, using the [`ExpressionCompiler`] if there is one
//!   2. assign a local slot to every variable name (see [`Slots`])
//!   3. if frames are computed, analyze the body and drop unreachable instructions
//!   4. lower instructions, interning constants into a fresh [`ConstantsPool`]
//!   5. lay out the code, widening jumps that do not fit in 16 bits
//!   6. build the exception table, stack map frames, and debug tables
//!
//! The unit is never modified. The output is a [`GeneratedMember`], which holds the member along
//! with the constant pool and bootstrap methods it refers to, and can be wrapped into a class.

mod attributes;
mod frames;
mod layout;
mod lower;
mod slots;

pub use layout::SIGNED_16BIT_JUMP_RANGE;
pub use slots::{Slots, Variable};

use crate::analysis::{Analyzer, MergeMode};
use crate::ast::{Code, CodeEntry, CodeItem, Definition, FieldDefinition, MethodDefinition, Unit};
use crate::jvm::class_file::{
    self, BootstrapMethod, BootstrapMethods, BytecodeArray, BytecodeIndex, ClassFile,
    ConstantPoolOverflow, ConstantsPool, ExceptionHandler, Exceptions, Field, LineNumber,
    LineNumberTable, LocalVariable, LocalVariableTable, Method, Signature, Version,
};
use crate::jvm::{self, ClassAccessFlags, Modifier};
use layout::{lay_out, Pending, Placed};
use lower::Lowering;
use std::borrow::Cow;
use std::fmt;

/// `max_stack` used when frames are not computed
const CONSERVATIVE_MAX_STACK: u16 = 255;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GeneratorSettings {
    /// Analyze method bodies to emit a `StackMapTable` and an exact `max_stack`
    ///
    /// Without frames, the output only verifies on class file versions where the table is
    /// optional (see [`GeneratorSettings::class_version`]).
    pub compute_frames: bool,
}

impl GeneratorSettings {
    /// Class file version that suits the output
    pub fn class_version(&self) -> Version {
        if self.compute_frames {
            Version::JAVA8
        } else {
            Version::JAVA6
        }
    }
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        GeneratorSettings {
            compute_frames: true,
        }
    }
}

/// Compiler for `EXPR` source fragments
///
/// The returned entries are spliced into the body in place of the expression. They may use the
/// method's variables by name, and any labels they define must not clash with the method's.
pub trait ExpressionCompiler {
    fn compile(&self, source: &str, unit: &Unit) -> Result<Vec<CodeItem>, String>;
}

/// Failure to generate a member, pointing at the source line responsible
#[derive(Debug)]
pub struct CompileError {
    /// 1-based line of the offending node
    pub line: usize,
    pub kind: CompileErrorKind,
}

impl CompileError {
    pub fn new(line: usize, kind: CompileErrorKind) -> CompileError {
        CompileError { line, kind }
    }
}

#[derive(Debug)]
pub enum CompileErrorKind {
    UndefinedLabel(String),
    UndefinedVariable(String),
    IllegalDescriptor(String),
    IllegalOperand(String),
    IllegalModifier(Modifier),
    InvalidHandle(String),

    /// Expression that could not be compiled (the message says why)
    UnsupportedExpression(String),

    /// Variable used as a `long` or `double` but declared with a narrower type
    WideSlotCollision(String),

    /// Text that never parsed as an instruction
    UnmatchedText(String),

    /// Method that needs a body, but has no instructions
    MissingCode,

    /// Asked for a method but got a field, or the other way around
    WrongMemberKind { expected: &'static str },

    ClassFile(jvm::Error),
}

impl From<jvm::Error> for CompileErrorKind {
    fn from(err: jvm::Error) -> CompileErrorKind {
        CompileErrorKind::ClassFile(err)
    }
}

impl From<ConstantPoolOverflow> for CompileErrorKind {
    fn from(err: ConstantPoolOverflow) -> CompileErrorKind {
        CompileErrorKind::ClassFile(err.into())
    }
}

impl fmt::Display for CompileErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileErrorKind::UndefinedLabel(label) => {
                write!(f, "label '{}' is not defined", label)
            }
            CompileErrorKind::UndefinedVariable(name) => {
                write!(f, "variable '{}' is not defined", name)
            }
            CompileErrorKind::IllegalDescriptor(desc) => write!(f, "illegal descriptor {}", desc),
            CompileErrorKind::IllegalOperand(msg) => write!(f, "illegal operand: {}", msg),
            CompileErrorKind::IllegalModifier(modifier) => {
                write!(f, "'{}' is not allowed here", modifier.keyword())
            }
            CompileErrorKind::InvalidHandle(msg) => write!(f, "invalid handle {}", msg),
            CompileErrorKind::UnsupportedExpression(msg) => {
                write!(f, "cannot compile expression: {}", msg)
            }
            CompileErrorKind::WideSlotCollision(name) => write!(
                f,
                "variable '{}' is used as a long or double, but declared narrower",
                name
            ),
            CompileErrorKind::UnmatchedText(text) => write!(f, "unrecognized code: {}", text),
            CompileErrorKind::MissingCode => f.write_str("method has no instructions"),
            CompileErrorKind::WrongMemberKind { expected } => write!(f, "expected a {}", expected),
            CompileErrorKind::ClassFile(err) => write!(f, "{}", err),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind)
    }
}

impl std::error::Error for CompileError {}

#[derive(Debug)]
pub enum Member {
    Method(Method),
    Field(Field),
}

/// Generated member, with everything its indices point into
#[derive(Debug)]
pub struct GeneratedMember {
    pub member: Member,
    pub constants: ConstantsPool,
    pub bootstrap_methods: Vec<BootstrapMethod>,
}

impl GeneratedMember {
    /// Wrap the member in a public class extending `java/lang/Object`
    pub fn into_class_file(self, owner: &str, version: Version) -> Result<ClassFile, CompileError> {
        let GeneratedMember {
            member,
            mut constants,
            bootstrap_methods,
        } = self;
        let class_error = |err: jvm::Error| CompileError::new(0, err.into());

        let this_class = constants.get_class(owner).map_err(|e| class_error(e.into()))?;
        let super_class = constants
            .get_class("java/lang/Object")
            .map_err(|e| class_error(e.into()))?;

        let mut attributes = vec![];
        if !bootstrap_methods.is_empty() {
            let bootstrap_methods = BootstrapMethods(bootstrap_methods);
            attributes.push(constants.get_attribute(bootstrap_methods).map_err(class_error)?);
        }

        let (fields, methods) = match member {
            Member::Method(method) => (vec![], vec![method]),
            Member::Field(field) => (vec![field], vec![]),
        };

        Ok(ClassFile {
            version,
            constants: constants.into_offset_vec(),
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class,
            super_class,
            interfaces: vec![],
            fields,
            methods,
            attributes,
        })
    }
}

/// Generator for members of one class
pub struct Generator<'a> {
    /// Internal name of the class the member belongs to
    owner: &'a str,
    settings: GeneratorSettings,
    expressions: Option<&'a dyn ExpressionCompiler>,
}

impl<'a> Generator<'a> {
    pub fn new(owner: &'a str) -> Generator<'a> {
        Generator {
            owner,
            settings: GeneratorSettings::default(),
            expressions: None,
        }
    }

    pub fn settings(mut self, settings: GeneratorSettings) -> Generator<'a> {
        self.settings = settings;
        self
    }

    pub fn expression_compiler(mut self, compiler: &'a dyn ExpressionCompiler) -> Generator<'a> {
        self.expressions = Some(compiler);
        self
    }

    pub fn generate(&self, unit: &Unit) -> Result<GeneratedMember, CompileError> {
        match &unit.definition {
            Definition::Method(method) => self.method(unit, method),
            Definition::Field(field) => self.field(unit, field),
        }
    }

    pub fn generate_method(&self, unit: &Unit) -> Result<GeneratedMember, CompileError> {
        match &unit.definition {
            Definition::Method(method) => self.method(unit, method),
            Definition::Field(field) => Err(CompileError::new(
                field.line,
                CompileErrorKind::WrongMemberKind { expected: "method" },
            )),
        }
    }

    pub fn generate_field(&self, unit: &Unit) -> Result<GeneratedMember, CompileError> {
        match &unit.definition {
            Definition::Field(field) => self.field(unit, field),
            Definition::Method(method) => Err(CompileError::new(
                method.line,
                CompileErrorKind::WrongMemberKind { expected: "field" },
            )),
        }
    }

    /// Generate the member and wrap it in a class file, returning the class bytes
    pub fn generate_class(&self, unit: &Unit) -> Result<Vec<u8>, CompileError> {
        let line = unit.definition.line();
        let class = self
            .generate(unit)?
            .into_class_file(self.owner, self.settings.class_version())
            .map_err(|err| CompileError::new(line, err.kind))?;
        class
            .to_bytes()
            .map_err(|err| CompileError::new(line, err.into()))
    }

    fn field(&self, unit: &Unit, field: &FieldDefinition) -> Result<GeneratedMember, CompileError> {
        let at = |line: usize| move |kind: CompileErrorKind| CompileError::new(line, kind);
        let at_definition = at(field.line);

        let code_entry = unit
            .code
            .iter()
            .flat_map(|code| &code.entries)
            .find(|entry| entry.item.is_instruction_like());
        if let Some(entry) = code_entry {
            let msg = String::from("fields cannot have code");
            return Err(CompileError::new(entry.line, CompileErrorKind::IllegalOperand(msg)));
        }

        let access_flags = Modifier::field_flags(&field.modifiers)
            .map_err(|modifier| at_definition(CompileErrorKind::IllegalModifier(modifier)))?;
        lower::field_type(&field.desc).map_err(at_definition)?;

        let mut constants = ConstantsPool::new();
        let name_index = constants
            .get_utf8(field.name.as_str())
            .map_err(|e| at_definition(e.into()))?;
        let descriptor_index = constants
            .get_utf8(field.desc.as_str())
            .map_err(|e| at_definition(e.into()))?;

        let mut attributes = vec![];
        if let Some(value) = &field.const_value {
            let attribute = attributes::constant_value(&mut constants, &field.desc, &value.value)
                .map_err(at(value.line))?;
            attributes.push(attribute);
        }
        if let Some(signature) = &field.signature {
            let signature =
                signature_attribute(&mut constants, &signature.value).map_err(at(signature.line))?;
            attributes.push(signature);
        }
        attributes.extend(attributes::annotation_attributes(
            &mut constants,
            field.annotations.iter().map(|a| (a.line, &a.value)),
        )?);

        Ok(GeneratedMember {
            member: Member::Field(Field {
                access_flags,
                name_index,
                descriptor_index,
                attributes,
            }),
            constants,
            bootstrap_methods: vec![],
        })
    }

    fn method(
        &self,
        unit: &Unit,
        method: &MethodDefinition,
    ) -> Result<GeneratedMember, CompileError> {
        let at = |line: usize| move |kind: CompileErrorKind| CompileError::new(line, kind);
        let at_definition = at(method.line);

        let access_flags = Modifier::method_flags(&method.modifiers)
            .map_err(|modifier| at_definition(CompileErrorKind::IllegalModifier(modifier)))?;
        let descriptor = method.descriptor();
        lower::method_descriptor(&descriptor).map_err(at_definition)?;

        let unit = self.inline_expressions(unit)?;
        let empty = Code::default();
        let code = unit.code.as_ref().unwrap_or(&empty);

        let mut constants = ConstantsPool::new();
        let mut bootstrap_methods = vec![];
        let name_index = constants
            .get_utf8(method.name.as_str())
            .map_err(|e| at_definition(e.into()))?;
        let descriptor_index = constants
            .get_utf8(descriptor.as_str())
            .map_err(|e| at_definition(e.into()))?;

        let mut attributes = vec![];
        if method.is_abstract_or_native() {
            let instruction = code
                .entries
                .iter()
                .find(|entry| matches!(entry.item, CodeItem::Instruction(_)));
            if let Some(entry) = instruction {
                return Err(CompileError::new(
                    entry.line,
                    CompileErrorKind::IllegalOperand(String::from(
                        "abstract and native methods have no code",
                    )),
                ));
            }
        } else {
            let code_attribute =
                self.code(&unit, method, code, &mut constants, &mut bootstrap_methods)?;
            attributes.push(
                constants
                    .get_attribute(code_attribute)
                    .map_err(|e| at_definition(e.into()))?,
            );
        }

        if !method.thrown.is_empty() {
            let mut thrown = vec![];
            for exception in &method.thrown {
                let class = constants
                    .get_class(&exception.value)
                    .map_err(|e| at(exception.line)(e.into()))?;
                thrown.push(class);
            }
            attributes.push(
                constants
                    .get_attribute(Exceptions(thrown))
                    .map_err(|e| at_definition(e.into()))?,
            );
        }
        if let Some(signature) = &method.signature {
            let signature =
                signature_attribute(&mut constants, &signature.value).map_err(at(signature.line))?;
            attributes.push(signature);
        }
        let annotations = code.entries.iter().filter_map(|entry| match &entry.item {
            CodeItem::Annotation(annotation) => Some((entry.line, annotation)),
            _ => None,
        });
        attributes.extend(attributes::annotation_attributes(&mut constants, annotations)?);

        Ok(GeneratedMember {
            member: Member::Method(Method {
                access_flags,
                name_index,
                descriptor_index,
                attributes,
            }),
            constants,
            bootstrap_methods,
        })
    }

    /// Replace expressions by the code they compile to
    fn inline_expressions<'u>(&self, unit: &'u Unit) -> Result<Cow<'u, Unit>, CompileError> {
        let code = match &unit.code {
            Some(code) => code,
            None => return Ok(Cow::Borrowed(unit)),
        };
        let has_expressions = code
            .entries
            .iter()
            .any(|entry| matches!(entry.item, CodeItem::Expression(_)));
        if !has_expressions {
            return Ok(Cow::Borrowed(unit));
        }

        let mut entries = vec![];
        for entry in &code.entries {
            let source = match &entry.item {
                CodeItem::Expression(source) => source,
                _ => {
                    entries.push(entry.clone());
                    continue;
                }
            };
            let compiler = self.expressions.ok_or_else(|| {
                CompileError::new(
                    entry.line,
                    CompileErrorKind::UnsupportedExpression(String::from(
                        "no expression compiler is available",
                    )),
                )
            })?;
            let compiled = compiler.compile(source, unit).map_err(|msg| {
                CompileError::new(entry.line, CompileErrorKind::UnsupportedExpression(msg))
            })?;
            entries.extend(
                compiled
                    .into_iter()
                    .map(|item| CodeEntry::new(entry.line, item)),
            );
        }

        Ok(Cow::Owned(Unit {
            definition: unit.definition.clone(),
            code: Some(Code::new(entries)),
        }))
    }

    /// Build the `Code` attribute of a method with a body
    fn code(
        &self,
        unit: &Unit,
        method: &MethodDefinition,
        code: &Code,
        constants: &mut ConstantsPool,
        bootstrap_methods: &mut Vec<BootstrapMethod>,
    ) -> Result<class_file::Code, CompileError> {
        let at_definition = |kind: CompileErrorKind| CompileError::new(method.line, kind);

        if let Some(entry) = code
            .entries
            .iter()
            .find(|entry| matches!(entry.item, CodeItem::Unmatched(_)))
        {
            if let CodeItem::Unmatched(text) = &entry.item {
                let kind = CompileErrorKind::UnmatchedText(text.clone());
                return Err(CompileError::new(entry.line, kind));
            }
        }

        let slots = Slots::allocate(self.owner, method, Some(code))?;

        let analysis = if self.settings.compute_frames {
            let analysis = Analyzer::new(self.owner, unit)
                .merge_mode(MergeMode::Verifier)
                .analyze()
                .map_err(|_| at_definition(CompileErrorKind::MissingCode))?;
            Some(analysis)
        } else {
            None
        };
        let is_reachable = |entry: usize| match &analysis {
            Some(analysis) => analysis
                .instruction_index(entry)
                .map_or(true, |idx| analysis.frames[idx].is_some()),
            None => true,
        };

        // Lower everything that ends up in the code array
        let mut items: Vec<Placed> = vec![];
        let mut entry_items: Vec<Option<usize>> = vec![None; code.entries.len()];
        let mut item_entries: Vec<usize> = vec![];
        let mut lowering = Lowering {
            constants,
            bootstrap_methods,
            slots: &slots,
        };
        for (entry_idx, entry) in code.entries.iter().enumerate() {
            let pending = match &entry.item {
                CodeItem::Label(name) => Pending::Label(name.clone()),
                CodeItem::Instruction(insn) if is_reachable(entry_idx) => {
                    lowering.instruction(insn, entry.line)?
                }
                _ => continue,
            };
            entry_items[entry_idx] = Some(items.len());
            item_entries.push(entry_idx);
            items.push(Placed {
                pending,
                line: entry.line,
            });
        }
        let constants = lowering.constants;

        let layout = lay_out(&items, &SIGNED_16BIT_JUMP_RANGE)?;
        let code_length = layout.code.len();
        if code_length == 0 {
            return Err(at_definition(CompileErrorKind::MissingCode));
        }
        if code_length > u16::MAX as usize {
            return Err(at_definition(jvm::Error::CodeOverflow(code_length).into()));
        }

        // Exception handlers, in declaration order
        let mut exception_table = vec![];
        for (line, try_catch) in code.try_catches() {
            let start = layout.label(&try_catch.start, line)?;
            let end = layout.label(&try_catch.end, line)?;
            let handler = layout.label(&try_catch.handler, line)?;
            if start > end {
                let msg = format!("{} comes after {}", try_catch.start, try_catch.end);
                return Err(CompileError::new(line, CompileErrorKind::IllegalOperand(msg)));
            }
            if start == end || handler >= code_length {
                continue;
            }
            let catch_type = match &try_catch.catch_type {
                Some(catch_type) => Some(
                    constants
                        .get_class(catch_type)
                        .map_err(|e| CompileError::new(line, e.into()))?,
                ),
                None => None,
            };
            exception_table.push(ExceptionHandler {
                start_pc: BytecodeIndex(start as u16),
                end_pc: BytecodeIndex(end as u16),
                handler_pc: BytecodeIndex(handler as u16),
                catch_type,
            });
        }

        let mut code_attributes = vec![];
        let max_stack = match &analysis {
            Some(analysis) => {
                let frames = frames::FrameBuilder {
                    analysis,
                    slots: &slots,
                    layout: &layout,
                    entry_items: &entry_items,
                    item_entries: &item_entries,
                };
                if let Some(table) = frames.stack_map_table(constants).map_err(at_definition)? {
                    let attribute = constants
                        .get_attribute(table)
                        .map_err(|e| at_definition(e.into()))?;
                    code_attributes.push(attribute);
                }
                u16::try_from(analysis.max_stack()).map_err(|_| {
                    at_definition(CompileErrorKind::IllegalOperand(String::from(
                        "operand stack is too deep",
                    )))
                })?
            }
            None => CONSERVATIVE_MAX_STACK,
        };

        let mut line_numbers = vec![];
        for entry in &code.entries {
            if let CodeItem::LineNumber { label, number } = &entry.item {
                let start = layout.label(label, entry.line)?;
                if start < code_length {
                    line_numbers.push(LineNumber {
                        start_pc: BytecodeIndex(start as u16),
                        line_number: *number,
                    });
                }
            }
        }
        if !line_numbers.is_empty() {
            let table = LineNumberTable(line_numbers);
            code_attributes.push(
                constants
                    .get_attribute(table)
                    .map_err(|e| at_definition(e.into()))?,
            );
        }

        let mut local_variables = vec![];
        for variable in slots.variables() {
            if let Some(desc) = &variable.desc {
                local_variables.push(LocalVariable {
                    start_pc: BytecodeIndex(0),
                    length: code_length as u16,
                    name_index: constants
                        .get_utf8(variable.name.as_str())
                        .map_err(|e| at_definition(e.into()))?,
                    descriptor_index: constants
                        .get_utf8(desc.as_str())
                        .map_err(|e| at_definition(e.into()))?,
                    index: variable.slot,
                });
            }
        }
        if !local_variables.is_empty() {
            let table = LocalVariableTable(local_variables);
            code_attributes.push(
                constants
                    .get_attribute(table)
                    .map_err(|e| at_definition(e.into()))?,
            );
        }

        Ok(class_file::Code {
            max_stack,
            max_locals: slots.max_locals(),
            code_array: BytecodeArray(layout.code),
            exception_table,
            attributes: code_attributes,
        })
    }
}

fn signature_attribute(
    constants: &mut ConstantsPool,
    signature: &str,
) -> Result<class_file::Attribute, CompileErrorKind> {
    let utf8 = constants.get_utf8(signature)?;
    Ok(constants.get_attribute(Signature(utf8))?)
}
