//! Read a member of a class file back into a [`Unit`]
//!
//! Offsets become labels, named alphabetically in order of appearance (`A`, `B`, ..., `Z`, `AA`,
//! ...). There is always a label at the start of the code and one at its end. Local slots become
//! variable names:
//!
//!   - slot 0 of an instance method is `this`
//!   - a `LocalVariableTable` name, if it is a plain identifier and fits the way the slot is used
//!   - a short type name followed by the slot (`int1`, `string2`)
//!   - `v` followed by the slot
//!
//! A slot used with two different kinds (say, first as an `int` and later as a reference) gets a
//! separate name for each kind.
//!
//! Encodings the generator chooses by itself are folded back into their general form: compact
//! and `wide` locals, `ldc_w`, `goto_w`, and conditionals inverted around a `goto_w`. Subroutine
//! instructions have no place in the syntax tree, so they come out as unmatched text.

use crate::ast::{
    Annotation, AnnotationValue, Code, CodeEntry, CodeItem, Definition, FieldDefinition, Handle,
    Instruction, LdcValue, Located, MethodDefinition, MethodParameter, Unit,
};
use crate::jvm::bytecode::{decode_code, Insn};
use crate::jvm::class_file::{
    self, Attribute, BootstrapMethods, ClassFile, ConstantIndex, ConstantLookup, ConstantValue,
    ElementValue, Exceptions, Field, LineNumberTable, LocalVariableTable, Method,
    RuntimeInvisibleAnnotations, RuntimeVisibleAnnotations, Signature,
};
use crate::jvm::{
    self, BaseType, Constant, FieldType, HandleKind, MethodDescriptor, Modifier, Opcode,
    OperandKind, ParseDescriptor, RefType, RenderDescriptor,
};
use crate::parse::is_identifier;
use crate::print::renumber;
use crate::util::{EscapedStr, OffsetVec};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

#[derive(Debug)]
pub enum DisassembleError {
    /// Class bytes that could not be decoded
    ClassFile(jvm::Error),

    /// No member matches the selector
    MissingMember(String),

    /// More than one member matches the selector
    AmbiguousMember(String),

    /// Valid class file content that has no assembly form
    Unsupported(String),
}

impl From<jvm::Error> for DisassembleError {
    fn from(err: jvm::Error) -> DisassembleError {
        DisassembleError::ClassFile(err)
    }
}

impl fmt::Display for DisassembleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisassembleError::ClassFile(err) => write!(f, "{}", err),
            DisassembleError::MissingMember(selector) => {
                write!(f, "no member matches {}", selector)
            }
            DisassembleError::AmbiguousMember(selector) => write!(
                f,
                "several members match {} (add a descriptor to pick one)",
                selector
            ),
            DisassembleError::Unsupported(msg) => write!(f, "unsupported: {}", msg),
        }
    }
}

impl std::error::Error for DisassembleError {}

type Result<T> = std::result::Result<T, DisassembleError>;

/// Parse class bytes and disassemble the member picked by `selector`
///
/// See [`Disassembler::member`] for the selector syntax.
pub fn disassemble(bytes: &[u8], selector: &str) -> Result<Unit> {
    let class = ClassFile::parse(bytes)?;
    Disassembler::new(&class).member(selector)
}

pub struct Disassembler<'a> {
    class: &'a ClassFile,
    label_prefix: &'a str,
}

impl<'a> Disassembler<'a> {
    pub fn new(class: &'a ClassFile) -> Disassembler<'a> {
        Disassembler {
            class,
            label_prefix: "",
        }
    }

    /// Prefix every generated label (useful when splicing code into other code)
    pub fn label_prefix(mut self, prefix: &'a str) -> Disassembler<'a> {
        self.label_prefix = prefix;
        self
    }

    fn constants(&self) -> &'a OffsetVec<Constant> {
        &self.class.constants
    }

    /// Disassemble the member picked by `selector`
    ///
    /// The selector is a member name, optionally followed by its descriptor. Method descriptors
    /// may follow the name directly (`max(II)I`), field descriptors after a space (`LIMIT J`).
    pub fn member(&self, selector: &str) -> Result<Unit> {
        let selector = selector.trim();
        let (name, desc) = match selector.find(|c: char| c == '(' || c.is_whitespace()) {
            Some(idx) => (&selector[..idx], Some(selector[idx..].trim())),
            None => (selector, None),
        };
        let matches = |member_name: &str, member_desc: &str| {
            member_name == name && desc.map_or(true, |desc| desc == member_desc)
        };

        let mut methods = vec![];
        for method in &self.class.methods {
            let member_name = self.constants().utf8(method.name_index)?;
            let member_desc = self.constants().utf8(method.descriptor_index)?;
            if matches(member_name, member_desc) {
                methods.push(method);
            }
        }
        let mut fields = vec![];
        for field in &self.class.fields {
            let member_name = self.constants().utf8(field.name_index)?;
            let member_desc = self.constants().utf8(field.descriptor_index)?;
            if matches(member_name, member_desc) {
                fields.push(field);
            }
        }

        match (methods.as_slice(), fields.as_slice()) {
            ([method], []) => self.method(method),
            ([], [field]) => self.field(field),
            ([], []) => Err(DisassembleError::MissingMember(String::from(selector))),
            _ => Err(DisassembleError::AmbiguousMember(String::from(selector))),
        }
    }

    pub fn field(&self, field: &Field) -> Result<Unit> {
        let constants = self.constants();
        let desc = constants.utf8(field.descriptor_index)?;

        let const_value = match Attribute::find::<ConstantValue>(&field.attributes, constants)? {
            Some(ConstantValue(index)) => Some(Located::new(self.loadable(index.0)?, 0)),
            None => None,
        };
        let annotations = self
            .annotations(&field.attributes)?
            .into_iter()
            .map(|annotation| Located::new(annotation, 0))
            .collect();

        let mut unit = Unit {
            definition: Definition::Field(FieldDefinition {
                modifiers: Modifier::from_field_flags(field.access_flags),
                name: String::from(constants.utf8(field.name_index)?),
                desc: String::from(desc),
                signature: self.signature(&field.attributes)?,
                const_value,
                annotations,
                line: 0,
            }),
            code: None,
        };
        renumber(&mut unit);
        Ok(unit)
    }

    pub fn method(&self, method: &Method) -> Result<Unit> {
        let constants = self.constants();
        let name = constants.utf8(method.name_index)?;
        let desc = constants.utf8(method.descriptor_index)?;
        let descriptor = MethodDescriptor::parse(desc)
            .map_err(|_| malformed(format!("method descriptor {}", desc)))?;
        let modifiers = Modifier::from_method_flags(method.access_flags);
        let is_static = modifiers.contains(&Modifier::Static);

        let mut thrown = vec![];
        if let Some(Exceptions(classes)) = Attribute::find(&method.attributes, constants)? {
            for class in classes {
                thrown.push(Located::new(String::from(constants.class_name(class)?), 0));
            }
        }

        let mut entries: Vec<CodeEntry> = self
            .annotations(&method.attributes)?
            .into_iter()
            .map(|annotation| CodeEntry::new(0, CodeItem::Annotation(annotation)))
            .collect();

        let code: Option<class_file::Code> = Attribute::find(&method.attributes, constants)?;
        let variables = match &code {
            Some(code) => {
                let local_variables: Option<LocalVariableTable> =
                    Attribute::find(&code.attributes, constants)?;
                let named = match &local_variables {
                    Some(LocalVariableTable(local_variables)) => local_variables
                        .iter()
                        .map(|local| {
                            Ok(NamedSlot {
                                slot: local.index,
                                name: constants.utf8(local.name_index)?,
                                desc: constants.utf8(local.descriptor_index)?,
                            })
                        })
                        .collect::<Result<Vec<_>>>()?,
                    None => vec![],
                };
                let body = self.code(code, is_static, &descriptor, &named)?;
                entries.extend(body.entries);
                body.variables
            }
            None => Variables::new(is_static, &descriptor, &[], std::iter::empty()),
        };

        let mut parameters = vec![];
        let mut slot: u16 = if is_static { 0 } else { 1 };
        for parameter in &descriptor.parameters {
            let desc = parameter.render();
            let kind = Kind::of_descriptor(&desc);
            parameters.push(MethodParameter {
                name: variables.name(slot, kind),
                desc,
            });
            slot += kind.width();
        }

        let mut unit = Unit {
            definition: Definition::Method(MethodDefinition {
                modifiers,
                name: String::from(name),
                parameters,
                return_type: match &descriptor.return_type {
                    Some(return_type) => return_type.render(),
                    None => String::from("V"),
                },
                signature: self.signature(&method.attributes)?,
                thrown,
                const_value: None,
                line: 0,
            }),
            code: Some(Code::new(entries)),
        };
        renumber(&mut unit);
        Ok(unit)
    }

    fn code(
        &self,
        code: &class_file::Code,
        is_static: bool,
        descriptor: &MethodDescriptor,
        named: &[NamedSlot],
    ) -> Result<Body> {
        let constants = self.constants();
        let code_length = code.code_array.0.len();
        let insns = fold_widened_conditionals(decode_code(&code.code_array.0)?);

        let uses = insns.iter().filter_map(|(_, insn)| match insn {
            Insn::Local(opcode, slot) => Kind::of_opcode(*opcode).map(|kind| (*slot, kind)),
            Insn::Iinc(slot, _) => Some((*slot, Kind::Int)),
            _ => None,
        });
        let variables = Variables::new(is_static, descriptor, named, uses);

        let line_numbers: Option<LineNumberTable> = Attribute::find(&code.attributes, constants)?;
        let line_numbers = line_numbers.map_or(vec![], |table| table.0);

        // Every offset that needs a label
        let mut targets: BTreeSet<usize> = BTreeSet::new();
        targets.insert(0);
        targets.insert(code_length);
        for (offset, insn) in &insns {
            targets.extend(branch_targets(*offset, insn));
        }
        for handler in &code.exception_table {
            targets.insert(handler.start_pc.0 as usize);
            targets.insert(handler.end_pc.0 as usize);
            targets.insert(handler.handler_pc.0 as usize);
        }
        for line in &line_numbers {
            targets.insert(line.start_pc.0 as usize);
        }

        let boundaries: HashSet<usize> = insns.iter().map(|(offset, _)| *offset).collect();
        let mut labels: BTreeMap<usize, String> = BTreeMap::new();
        for offset in targets {
            if offset != code_length && !boundaries.contains(&offset) {
                return Err(malformed(format!("offset {} is not an instruction", offset)));
            }
            let name = self.label_name(labels.len());
            labels.insert(offset, name);
        }
        let label = |offset: usize| -> Result<String> {
            labels
                .get(&offset)
                .cloned()
                .ok_or_else(|| malformed(format!("no label at offset {}", offset)))
        };

        let mut entries = vec![];
        for handler in &code.exception_table {
            let catch_type = match handler.catch_type {
                Some(class) => Some(String::from(constants.class_name(class)?)),
                None => None,
            };
            let try_catch = crate::ast::TryCatch {
                start: label(handler.start_pc.0 as usize)?,
                end: label(handler.end_pc.0 as usize)?,
                handler: label(handler.handler_pc.0 as usize)?,
                catch_type,
            };
            entries.push(CodeEntry::new(0, CodeItem::TryCatch(try_catch)));
        }

        let push_label = |entries: &mut Vec<CodeEntry>, offset: usize| {
            if let Some(name) = labels.get(&offset) {
                entries.push(CodeEntry::new(0, CodeItem::Label(name.clone())));
                for line in line_numbers.iter().filter(|l| l.start_pc.0 as usize == offset) {
                    let item = CodeItem::LineNumber {
                        label: name.clone(),
                        number: line.line_number,
                    };
                    entries.push(CodeEntry::new(0, item));
                }
            }
        };

        for (offset, insn) in &insns {
            push_label(&mut entries, *offset);
            let item = self.instruction(*offset, insn, &variables, &label)?;
            entries.push(CodeEntry::new(0, item));
        }
        push_label(&mut entries, code_length);

        Ok(Body { entries, variables })
    }

    fn instruction(
        &self,
        offset: usize,
        insn: &Insn,
        variables: &Variables,
        label: &dyn Fn(usize) -> Result<String>,
    ) -> Result<CodeItem> {
        let constants = self.constants();
        let target = |relative: i32| label((offset as i64 + relative as i64) as usize);

        let instruction = match insn {
            Insn::Plain(opcode) => Instruction::Plain(*opcode),
            Insn::Push(opcode, value) => Instruction::Int {
                opcode: *opcode,
                value: *value,
            },
            Insn::Local(Opcode::Ret, slot) => {
                return Ok(CodeItem::Unmatched(format!("ret {}", slot)));
            }
            Insn::Local(opcode, slot) => Instruction::Var {
                opcode: *opcode,
                name: variables.name(*slot, Kind::of_opcode(*opcode).unwrap_or(Kind::Reference)),
            },
            Insn::Iinc(slot, increment) => Instruction::Iinc {
                name: variables.name(*slot, Kind::Int),
                increment: *increment as i32,
            },
            Insn::Constant(Opcode::Ldc | Opcode::Ldc2W, index) => {
                Instruction::Ldc(self.loadable(*index)?)
            }
            Insn::Constant(opcode, index) => match opcode.kind() {
                OperandKind::Field => {
                    let member = constants.member_ref(*index)?;
                    Instruction::Field {
                        opcode: *opcode,
                        owner: String::from(member.owner),
                        name: String::from(member.name),
                        desc: String::from(member.descriptor),
                    }
                }
                OperandKind::Method => {
                    let member = constants.member_ref(*index)?;
                    Instruction::Method {
                        opcode: *opcode,
                        owner: String::from(member.owner),
                        name: String::from(member.name),
                        desc: String::from(member.descriptor),
                        interface: member.is_interface,
                    }
                }
                OperandKind::Type => Instruction::Type {
                    opcode: *opcode,
                    type_name: String::from(self.class_name_at(*index)?),
                },
                _ => {
                    let msg = format!("{} with a constant operand", opcode.mnemonic());
                    return Err(DisassembleError::Unsupported(msg));
                }
            },
            Insn::InvokeInterface(index, _) => {
                let member = constants.member_ref(*index)?;
                Instruction::Method {
                    opcode: Opcode::InvokeInterface,
                    owner: String::from(member.owner),
                    name: String::from(member.name),
                    desc: String::from(member.descriptor),
                    interface: true,
                }
            }
            Insn::InvokeDynamic(index) => self.invoke_dynamic(*index)?,
            Insn::Branch(Opcode::Jsr | Opcode::JsrW, relative) => {
                return Ok(CodeItem::Unmatched(format!("jsr {}", target(*relative)?)));
            }
            Insn::Branch(opcode, relative) => Instruction::Jump {
                opcode: match opcode {
                    Opcode::GotoW => Opcode::Goto,
                    other => *other,
                },
                target: target(*relative)?,
            },
            Insn::TableSwitch {
                default,
                low,
                high,
                offsets,
            } => Instruction::TableSwitch {
                min: *low,
                max: *high,
                labels: offsets
                    .iter()
                    .map(|relative| target(*relative))
                    .collect::<Result<_>>()?,
                default: target(*default)?,
            },
            Insn::LookupSwitch { default, pairs } => Instruction::LookupSwitch {
                mapping: pairs
                    .iter()
                    .map(|(key, relative)| Ok((*key, target(*relative)?)))
                    .collect::<Result<_>>()?,
                default: target(*default)?,
            },
            Insn::NewArray(code) => match BaseType::from_array_type_code(*code) {
                Some(base_type) => Instruction::NewArray(base_type),
                None => return Err(malformed(format!("newarray type code {}", code))),
            },
            Insn::MultiANewArray(index, dimensions) => Instruction::MultiArray {
                desc: String::from(self.class_name_at(*index)?),
                dimensions: *dimensions as i32,
            },
        };
        Ok(CodeItem::Instruction(instruction))
    }

    fn invoke_dynamic(&self, index: u16) -> Result<Instruction> {
        let constants = self.constants();
        let (bootstrap_index, name_and_type) = match constants.constant(index)? {
            Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            } => (*bootstrap_method, *method_descriptor),
            _ => return Err(jvm::Error::BadConstantIndex(index).into()),
        };
        let (name, desc) = constants.name_and_type(name_and_type)?;

        let bootstrap_methods: BootstrapMethods =
            Attribute::find(&self.class.attributes, constants)?
                .ok_or_else(|| malformed(String::from("missing BootstrapMethods attribute")))?;
        let bootstrap = bootstrap_methods
            .0
            .get(bootstrap_index as usize)
            .ok_or_else(|| malformed(format!("missing bootstrap method {}", bootstrap_index)))?;

        let bootstrap_handle = match self.loadable(bootstrap.bootstrap_method.0)? {
            LdcValue::Handle(handle) => handle,
            _ => return Err(malformed(format!("bootstrap method {}", bootstrap_index))),
        };
        Ok(Instruction::Indy {
            name: String::from(name),
            desc: String::from(desc),
            bootstrap: bootstrap_handle,
            args: bootstrap
                .bootstrap_arguments
                .iter()
                .map(|arg| self.loadable(arg.0))
                .collect::<Result<_>>()?,
        })
    }

    /// Constant that `ldc` (or a bootstrap argument) can load
    fn loadable(&self, index: u16) -> Result<LdcValue> {
        let constants = self.constants();
        let value = match constants.constant(index)? {
            Constant::Integer(int) => LdcValue::Int(*int),
            Constant::Float(float) => LdcValue::Float(*float),
            Constant::Long(long) => LdcValue::Long(*long),
            Constant::Double(double) => LdcValue::Double(*double),
            Constant::String(utf8) => {
                LdcValue::String(EscapedStr(constants.utf8(*utf8)?).to_string())
            }
            Constant::Class(name) => {
                let name = constants.utf8(*name)?;
                if name.starts_with('[') {
                    LdcValue::Type(String::from(name))
                } else {
                    LdcValue::Type(format!("L{};", name))
                }
            }
            Constant::MethodType { descriptor } => {
                LdcValue::Type(String::from(constants.utf8(*descriptor)?))
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => LdcValue::Handle(self.handle(*handle_kind, *member)?),
            _ => {
                let msg = format!("constant #{} cannot be loaded", index);
                return Err(DisassembleError::Unsupported(msg));
            }
        };
        Ok(value)
    }

    fn handle(&self, kind: HandleKind, member: ConstantIndex) -> Result<Handle> {
        let member = self.constants().member_ref(member.0)?;
        Ok(Handle {
            kind,
            owner: String::from(member.owner),
            name: String::from(member.name),
            desc: String::from(member.descriptor),
        })
    }

    fn class_name_at(&self, index: u16) -> Result<&'a str> {
        let constants = self.constants();
        match constants.constant(index)? {
            Constant::Class(name) => Ok(constants.utf8(*name)?),
            _ => Err(jvm::Error::BadConstantIndex(index).into()),
        }
    }

    fn signature(&self, attributes: &[Attribute]) -> Result<Option<Located<String>>> {
        let constants = self.constants();
        match Attribute::find::<Signature>(attributes, constants)? {
            Some(Signature(utf8)) => Ok(Some(Located::new(
                String::from(constants.utf8(utf8)?),
                0,
            ))),
            None => Ok(None),
        }
    }

    /// Visible annotations, then invisible ones
    fn annotations(&self, attributes: &[Attribute]) -> Result<Vec<Annotation>> {
        let constants = self.constants();
        let mut annotations = vec![];
        if let Some(RuntimeVisibleAnnotations(visible)) = Attribute::find(attributes, constants)? {
            for annotation in &visible {
                annotations.push(self.annotation(annotation, true)?);
            }
        }
        if let Some(RuntimeInvisibleAnnotations(invisible)) =
            Attribute::find(attributes, constants)?
        {
            for annotation in &invisible {
                annotations.push(self.annotation(annotation, false)?);
            }
        }
        Ok(annotations)
    }

    fn annotation(&self, annotation: &class_file::Annotation, visible: bool) -> Result<Annotation> {
        let constants = self.constants();
        let type_desc = constants.utf8(annotation.type_index)?;
        let type_name = type_desc
            .strip_prefix('L')
            .and_then(|name| name.strip_suffix(';'))
            .ok_or_else(|| malformed(format!("annotation type {}", type_desc)))?;

        let args = annotation
            .element_value_pairs
            .iter()
            .map(|pair| {
                let name = String::from(constants.utf8(pair.name_index)?);
                Ok((name, self.element_value(&pair.value)?))
            })
            .collect::<Result<_>>()?;
        Ok(Annotation {
            visible,
            type_name: String::from(type_name),
            args,
        })
    }

    fn element_value(&self, value: &ElementValue) -> Result<AnnotationValue> {
        let constants = self.constants();
        let value = match value {
            ElementValue::Constant { tag: b's', value } => {
                let string = constants.utf8(class_file::Utf8ConstantIndex(*value))?;
                AnnotationValue::Literal(LdcValue::String(EscapedStr(string).to_string()))
            }
            // `B`, `C`, `S`, and `Z` are integer constants too
            ElementValue::Constant { value, .. } => {
                AnnotationValue::Literal(self.loadable(value.0)?)
            }
            ElementValue::Enum {
                type_name,
                const_name,
            } => AnnotationValue::Enum {
                type_desc: String::from(constants.utf8(*type_name)?),
                name: String::from(constants.utf8(*const_name)?),
            },
            ElementValue::Class(class) => {
                AnnotationValue::Literal(LdcValue::Type(String::from(constants.utf8(*class)?)))
            }
            ElementValue::Array(values) => AnnotationValue::Array(
                values
                    .iter()
                    .map(|value| self.element_value(value))
                    .collect::<Result<_>>()?,
            ),
            ElementValue::Annotation(_) => {
                let msg = String::from("nested annotation values");
                return Err(DisassembleError::Unsupported(msg));
            }
        };
        Ok(value)
    }

    fn label_name(&self, idx: usize) -> String {
        let mut letters = vec![];
        let mut n = idx + 1;
        while n > 0 {
            n -= 1;
            letters.push(b'A' + (n % 26) as u8);
            n /= 26;
        }
        letters.reverse();
        let mut name = String::from(self.label_prefix);
        name.extend(letters.into_iter().map(char::from));
        name
    }
}

fn malformed(msg: String) -> DisassembleError {
    DisassembleError::ClassFile(jvm::Error::MalformedClass(msg))
}

/// Entries and variable names of a method body
struct Body {
    entries: Vec<CodeEntry>,
    variables: Variables,
}

/// Entry of the `LocalVariableTable`
struct NamedSlot<'a> {
    slot: u16,
    name: &'a str,
    desc: &'a str,
}

/// Branch targets of an instruction, as absolute offsets
fn branch_targets(offset: usize, insn: &Insn) -> Vec<usize> {
    let absolute = |relative: &i32| (offset as i64 + *relative as i64) as usize;
    match insn {
        Insn::Branch(_, relative) => vec![absolute(relative)],
        Insn::TableSwitch {
            default, offsets, ..
        } => std::iter::once(default).chain(offsets).map(absolute).collect(),
        Insn::LookupSwitch { default, pairs } => std::iter::once(default)
            .chain(pairs.iter().map(|(_, relative)| relative))
            .map(absolute)
            .collect(),
        _ => vec![],
    }
}

/// Turn `ifnot* +8; goto_w L` back into `if* L`
///
/// The `goto_w` must not be a branch target itself, otherwise removing it would change what
/// jumping there does.
fn fold_widened_conditionals(insns: Vec<(usize, Insn)>) -> Vec<(usize, Insn)> {
    let targets: HashSet<usize> = insns
        .iter()
        .flat_map(|(offset, insn)| branch_targets(*offset, insn))
        .collect();

    let mut folded = Vec::with_capacity(insns.len());
    let mut insns = insns.into_iter().peekable();
    while let Some((offset, insn)) = insns.next() {
        if let Insn::Branch(opcode, 8) = insn {
            if let (Some(inverted), Some((goto_offset, Insn::Branch(Opcode::GotoW, relative)))) =
                (opcode.inverted_branch(), insns.peek())
            {
                if *goto_offset == offset + 3 && !targets.contains(goto_offset) {
                    let target = *goto_offset as i64 + *relative as i64;
                    let relative = (target - offset as i64) as i32;
                    insns.next();
                    folded.push((offset, Insn::Branch(inverted, relative)));
                    continue;
                }
            }
        }
        folded.push((offset, insn));
    }
    folded
}

/// Way a local slot is used
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
enum Kind {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl Kind {
    fn of_opcode(opcode: Opcode) -> Option<Kind> {
        let kind = match opcode {
            Opcode::ILoad | Opcode::IStore => Kind::Int,
            Opcode::LLoad | Opcode::LStore => Kind::Long,
            Opcode::FLoad | Opcode::FStore => Kind::Float,
            Opcode::DLoad | Opcode::DStore => Kind::Double,
            Opcode::ALoad | Opcode::AStore => Kind::Reference,
            _ => return None,
        };
        Some(kind)
    }

    fn of_descriptor(desc: &str) -> Kind {
        match desc.chars().next() {
            Some('Z' | 'B' | 'C' | 'S' | 'I') => Kind::Int,
            Some('J') => Kind::Long,
            Some('F') => Kind::Float,
            Some('D') => Kind::Double,
            _ => Kind::Reference,
        }
    }

    fn width(&self) -> u16 {
        match self {
            Kind::Long | Kind::Double => 2,
            _ => 1,
        }
    }

    fn short_name(&self) -> Option<&'static str> {
        match self {
            Kind::Int => Some("int"),
            Kind::Long => Some("long"),
            Kind::Float => Some("float"),
            Kind::Double => Some("double"),
            Kind::Reference => None,
        }
    }
}

/// Lowercased simple name of a type (`Ljava/util/Map$Entry;` is `entry`)
fn short_type_name(desc: &str) -> Option<String> {
    let name = match FieldType::parse(desc).ok()? {
        FieldType::Base(base_type) => String::from(base_type.name()),
        FieldType::Ref(RefType::Object(class)) => class.short_name().to_lowercase(),
        FieldType::Ref(_) => String::from("array"),
    };
    if is_sane(&name) {
        Some(name)
    } else {
        None
    }
}

/// Can the name be written as a variable in assembly?
fn is_sane(name: &str) -> bool {
    is_identifier(name) && !name.starts_with(|c: char| c.is_ascii_digit())
}

/// Names of local slots
struct Variables {
    names: HashMap<(u16, Kind), String>,
}

impl Variables {
    fn new(
        is_static: bool,
        descriptor: &MethodDescriptor,
        named: &[NamedSlot],
        uses: impl Iterator<Item = (u16, Kind)>,
    ) -> Variables {
        // Declared type of each parameter slot
        let mut declared: HashMap<u16, String> = HashMap::new();
        let mut slot: u16 = if is_static { 0 } else { 1 };
        for parameter in &descriptor.parameters {
            let desc = parameter.render();
            let kind = Kind::of_descriptor(&desc);
            declared.insert(slot, desc);
            slot += kind.width();
        }

        let mut keys: BTreeSet<(u16, Kind)> = uses.collect();
        keys.extend(
            declared
                .iter()
                .map(|(slot, desc)| (*slot, Kind::of_descriptor(desc))),
        );
        if !is_static {
            keys.insert((0, Kind::Reference));
        }

        let mut names = HashMap::new();
        let mut taken: HashSet<String> = HashSet::new();
        for (slot, kind) in keys {
            let mut name = if !is_static && (slot, kind) == (0, Kind::Reference) {
                String::from("this")
            } else {
                let fits = |local: &&NamedSlot| {
                    local.slot == slot && Kind::of_descriptor(local.desc) == kind
                };
                let from_table = named
                    .iter()
                    .filter(fits)
                    .map(|local| local.name)
                    .find(|name| is_sane(name) && *name != "this" && !taken.contains(*name));
                match from_table {
                    Some(name) => String::from(name),
                    None => {
                        let type_name = declared
                            .get(&slot)
                            .filter(|desc| Kind::of_descriptor(desc) == kind)
                            .and_then(|desc| short_type_name(desc))
                            .or_else(|| {
                                named
                                    .iter()
                                    .filter(fits)
                                    .find_map(|local| short_type_name(local.desc))
                            })
                            .or_else(|| kind.short_name().map(String::from));
                        match type_name {
                            Some(type_name) => format!("{}{}", type_name, slot),
                            None => format!("v{}", slot),
                        }
                    }
                }
            };
            while taken.contains(&name) {
                name.push('_');
            }
            taken.insert(name.clone());
            names.insert((slot, kind), name);
        }
        Variables { names }
    }

    fn name(&self, slot: u16, kind: Kind) -> String {
        self.names
            .get(&(slot, kind))
            .cloned()
            .unwrap_or_else(|| format!("v{}", slot))
    }
}
