use super::layout::Pending;
use super::slots::Slots;
use super::{CompileError, CompileErrorKind};
use crate::ast::{Handle, Instruction, LdcValue};
use crate::jvm::bytecode::Insn;
use crate::jvm::class_file::{BootstrapMethod, ConstantIndex, ConstantsPool};
use crate::jvm::{FieldType, HandleKind, MethodDescriptor, Opcode, ParseDescriptor, RefType};
use crate::util::unescape;

/// Turns symbolic instructions into encodable ones, adding whatever constants they need
pub struct Lowering<'a> {
    pub constants: &'a mut ConstantsPool,
    pub bootstrap_methods: &'a mut Vec<BootstrapMethod>,
    pub slots: &'a Slots,
}

type Result<T> = std::result::Result<T, CompileErrorKind>;

impl Lowering<'_> {
    /// Lower one instruction, attaching `line` to any error
    pub fn instruction(
        &mut self,
        insn: &Instruction,
        line: usize,
    ) -> std::result::Result<Pending, CompileError> {
        self.lower(insn).map_err(|kind| CompileError::new(line, kind))
    }

    fn lower(&mut self, insn: &Instruction) -> Result<Pending> {
        let ready = match insn {
            Instruction::Plain(opcode) => Insn::Plain(*opcode),

            Instruction::Int { opcode, value } => {
                let fits = match opcode {
                    Opcode::BiPush => i8::try_from(*value).is_ok(),
                    _ => i16::try_from(*value).is_ok(),
                };
                if !fits {
                    return Err(CompileErrorKind::IllegalOperand(format!(
                        "{} does not fit in {}",
                        value,
                        opcode.mnemonic()
                    )));
                }
                Insn::Push(*opcode, *value)
            }

            Instruction::Ldc(value) => {
                let opcode = if value.is_wide() {
                    Opcode::Ldc2W
                } else {
                    Opcode::Ldc
                };
                Insn::Constant(opcode, self.loadable(value)?.0)
            }

            Instruction::Var { opcode, name } => Insn::Local(*opcode, self.slot(name)?),

            Instruction::Iinc { name, increment } => {
                let increment = i16::try_from(*increment).map_err(|_| {
                    CompileErrorKind::IllegalOperand(format!("iinc by {} is too big", increment))
                })?;
                Insn::Iinc(self.slot(name)?, increment)
            }

            Instruction::Field {
                opcode,
                owner,
                name,
                desc,
            } => {
                field_type(desc)?;
                let owner = class_name(owner)?;
                let field = self.constants.get_field_ref(&owner, name, desc)?;
                Insn::Constant(*opcode, (field.0).0)
            }

            Instruction::Method {
                opcode,
                owner,
                name,
                desc,
                interface,
            } => {
                let descriptor = method_descriptor(desc)?;
                let owner = class_name(owner)?;
                let is_interface = *interface || *opcode == Opcode::InvokeInterface;
                let method = self
                    .constants
                    .get_method_ref(&owner, name, desc, is_interface)?;
                if *opcode == Opcode::InvokeInterface {
                    let count = u8::try_from(descriptor.argument_slots(true)).map_err(|_| {
                        let msg = format!("{} has too many arguments", desc);
                        CompileErrorKind::IllegalDescriptor(msg)
                    })?;
                    Insn::InvokeInterface((method.0).0, count)
                } else {
                    Insn::Constant(*opcode, (method.0).0)
                }
            }

            Instruction::Indy {
                name,
                desc,
                bootstrap,
                args,
            } => {
                method_descriptor(desc)?;
                let bootstrap_method = BootstrapMethod {
                    bootstrap_method: self.handle(bootstrap)?,
                    bootstrap_arguments: args
                        .iter()
                        .map(|arg| self.loadable(arg))
                        .collect::<Result<_>>()?,
                };
                let bootstrap_idx = match self
                    .bootstrap_methods
                    .iter()
                    .position(|existing| *existing == bootstrap_method)
                {
                    Some(idx) => idx,
                    None => {
                        self.bootstrap_methods.push(bootstrap_method);
                        self.bootstrap_methods.len() - 1
                    }
                };
                let bootstrap_idx = u16::try_from(bootstrap_idx).map_err(|_| {
                    CompileErrorKind::IllegalOperand(String::from("too many bootstrap methods"))
                })?;
                let indy = self
                    .constants
                    .get_invoke_dynamic(bootstrap_idx, name, desc)?;
                Insn::InvokeDynamic((indy.0).0)
            }

            Instruction::Jump { opcode, target } => {
                return Ok(Pending::Jump {
                    opcode: *opcode,
                    target: target.clone(),
                })
            }

            Instruction::TableSwitch {
                min,
                max,
                labels,
                default,
            } => {
                let expected = *max as i64 - *min as i64 + 1;
                if expected < 1 || expected != labels.len() as i64 {
                    return Err(CompileErrorKind::IllegalOperand(format!(
                        "range({}:{}) needs {} labels, found {}",
                        min,
                        max,
                        expected.max(0),
                        labels.len()
                    )));
                }
                return Ok(Pending::TableSwitch {
                    low: *min,
                    high: *max,
                    targets: labels.clone(),
                    default: default.clone(),
                });
            }

            Instruction::LookupSwitch { mapping, default } => {
                let mut pairs = mapping.clone();
                pairs.sort_by_key(|(key, _)| *key);
                if let Some(duplicate) = pairs.windows(2).find(|pair| pair[0].0 == pair[1].0) {
                    return Err(CompileErrorKind::IllegalOperand(format!(
                        "duplicate lookupswitch key {}",
                        duplicate[0].0
                    )));
                }
                return Ok(Pending::LookupSwitch {
                    pairs,
                    default: default.clone(),
                });
            }

            Instruction::Type { opcode, type_name } => {
                let class = class_name(type_name)?;
                if *opcode == Opcode::New && class.starts_with('[') {
                    return Err(CompileErrorKind::IllegalOperand(format!(
                        "cannot `new` the array type {}",
                        class
                    )));
                }
                Insn::Constant(*opcode, (self.constants.get_class(&class)?.0).0)
            }

            Instruction::MultiArray { desc, dimensions } => {
                let array_dimensions = match field_type(desc)? {
                    FieldType::Ref(RefType::ObjectArray(array)) => array.dimensions,
                    FieldType::Ref(RefType::PrimitiveArray(array)) => array.dimensions,
                    _ => 0,
                };
                let dimensions = u8::try_from(*dimensions)
                    .ok()
                    .filter(|dims| *dims >= 1 && *dims as usize <= array_dimensions)
                    .ok_or_else(|| {
                        CompileErrorKind::IllegalOperand(format!(
                            "{} dimensions do not fit {}",
                            dimensions, desc
                        ))
                    })?;
                Insn::MultiANewArray((self.constants.get_class(desc)?.0).0, dimensions)
            }

            Instruction::NewArray(base_type) => Insn::NewArray(base_type.array_type_code()),
        };
        Ok(Pending::Ready(ready))
    }

    fn slot(&self, name: &str) -> Result<u16> {
        self.slots
            .slot(name)
            .ok_or_else(|| CompileErrorKind::UndefinedVariable(String::from(name)))
    }

    /// Constant that `ldc` or a bootstrap method argument can load
    pub fn loadable(&mut self, value: &LdcValue) -> Result<ConstantIndex> {
        let idx = match value {
            LdcValue::Int(int) => self.constants.get_integer(*int)?,
            LdcValue::Long(long) => self.constants.get_long(*long)?,
            LdcValue::Float(float) => self.constants.get_float(*float)?,
            LdcValue::Double(double) => self.constants.get_double(*double)?,
            LdcValue::String(raw) => {
                let utf8 = self.constants.get_utf8(string_literal(raw)?)?;
                self.constants.get_string(utf8)?.0
            }
            LdcValue::Type(desc) if desc.starts_with('(') => {
                method_descriptor(desc)?;
                self.constants.get_method_type(desc)?
            }
            LdcValue::Type(desc) => match field_type(desc)? {
                FieldType::Ref(ref_type) => self.constants.get_class(&ref_type.class_name())?.0,
                FieldType::Base(_) => {
                    return Err(CompileErrorKind::IllegalOperand(format!(
                        "primitive type {} is not a loadable constant",
                        desc
                    )))
                }
            },
            LdcValue::Handle(handle) => self.handle(handle)?,
        };
        Ok(idx)
    }

    /// Method handle constant, checking that the handle kind matches the member
    pub fn handle(&mut self, handle: &Handle) -> Result<ConstantIndex> {
        let invalid = |why: &str| {
            CompileErrorKind::InvalidHandle(format!(
                "{} {}.{} {}: {}",
                handle.kind.mnemonic(),
                handle.owner,
                handle.name,
                handle.desc,
                why
            ))
        };

        let owner = class_name(&handle.owner)?;
        let member = if handle.kind.is_field() {
            if field_type(&handle.desc).is_err() {
                return Err(invalid("field handles need a field descriptor"));
            }
            self.constants
                .get_field_ref(&owner, &handle.name, &handle.desc)?
                .0
        } else {
            if method_descriptor(&handle.desc).is_err() {
                return Err(invalid("method handles need a method descriptor"));
            }
            let is_constructor = handle.name == "<init>";
            if is_constructor != (handle.kind == HandleKind::NewInvokeSpecial) {
                return Err(invalid("only H_NEWINVOKESPECIAL handles refer to constructors"));
            }
            let is_interface = handle.kind == HandleKind::InvokeInterface;
            self.constants
                .get_method_ref(&owner, &handle.name, &handle.desc, is_interface)?
                .0
        };
        Ok(self.constants.get_method_handle(handle.kind, member)?)
    }
}

/// Value of a string literal, with escapes evaluated
pub fn string_literal(raw: &str) -> Result<String> {
    unescape(raw).map_err(|msg| CompileErrorKind::IllegalOperand(format!("\"{}\": {}", raw, msg)))
}

pub fn field_type(desc: &str) -> Result<FieldType> {
    FieldType::parse(desc).map_err(|_| CompileErrorKind::IllegalDescriptor(String::from(desc)))
}

pub fn method_descriptor(desc: &str) -> Result<MethodDescriptor> {
    MethodDescriptor::parse(desc)
        .map_err(|_| CompileErrorKind::IllegalDescriptor(String::from(desc)))
}

/// Checked name for a class constant (internal name, or array descriptor)
fn class_name(name: &str) -> Result<String> {
    RefType::from_class_name(name)
        .map(|ref_type| ref_type.class_name())
        .map_err(|_| CompileErrorKind::IllegalDescriptor(String::from(name)))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::MethodDefinition;
    use crate::jvm::class_file::{Constant, ConstantLookup};
    use crate::parse::parse_instructions;

    struct Fixture {
        constants: ConstantsPool,
        bootstrap_methods: Vec<BootstrapMethod>,
        slots: Slots,
    }

    impl Fixture {
        fn new() -> Fixture {
            let method = MethodDefinition {
                modifiers: vec![],
                name: String::from("m"),
                parameters: vec![crate::ast::MethodParameter {
                    desc: String::from("J"),
                    name: String::from("big"),
                }],
                return_type: String::from("V"),
                signature: None,
                thrown: vec![],
                const_value: None,
                line: 1,
            };
            Fixture {
                constants: ConstantsPool::new(),
                bootstrap_methods: vec![],
                slots: Slots::allocate("Test", &method, None).unwrap(),
            }
        }

        fn lower(&mut self, text: &str) -> std::result::Result<Vec<Pending>, CompileError> {
            let mut lowering = Lowering {
                constants: &mut self.constants,
                bootstrap_methods: &mut self.bootstrap_methods,
                slots: &self.slots,
            };
            text.lines()
                .flat_map(|line| parse_instructions(line).unwrap())
                .map(|insn| lowering.instruction(&insn, 3))
                .collect()
        }
    }

    #[test]
    fn locals_and_constants() {
        let mut fixture = Fixture::new();
        let lowered = fixture
            .lower("aload this\nlload big\nldc 5L\nldc \"a\\tb\"\nldc [I\nldc ()V")
            .unwrap();
        assert_eq!(lowered[0], Pending::Ready(Insn::Local(Opcode::ALoad, 0)));
        assert_eq!(lowered[1], Pending::Ready(Insn::Local(Opcode::LLoad, 1)));
        assert!(matches!(lowered[2], Pending::Ready(Insn::Constant(Opcode::Ldc2W, _))));

        let constants = fixture.constants.constants();
        let string = match &lowered[3] {
            Pending::Ready(Insn::Constant(Opcode::Ldc, idx)) => constants.constant(*idx),
            other => panic!("unexpected {:?}", other),
        };
        match string.unwrap() {
            Constant::String(utf8) => assert_eq!(constants.utf8(*utf8).unwrap(), "a\tb"),
            other => panic!("unexpected {:?}", other),
        }
        match &lowered[4] {
            Pending::Ready(Insn::Constant(Opcode::Ldc, idx)) => assert!(matches!(
                constants.constant(*idx),
                Ok(Constant::Class(_))
            )),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn interface_calls_count_argument_slots() {
        let mut fixture = Fixture::new();
        let lowered = fixture
            .lower("invokeinterface java/util/Map.put(Ljava/lang/Object;JD)V")
            .unwrap();
        assert!(matches!(lowered[0], Pending::Ready(Insn::InvokeInterface(_, 6))));
    }

    #[test]
    fn bootstrap_methods_are_shared() {
        let mut fixture = Fixture::new();
        let indy = "invokedynamic run ()Ljava/lang/Runnable; \
                    handle[H_INVOKESTATIC java/lang/invoke/LambdaMetafactory.metafactory \
                    (Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;\
                    Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodType;\
                    Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)\
                    Ljava/lang/invoke/CallSite;] args[()V, handle[H_INVOKESTATIC Test.lambda ()V], ()V]";
        let lowered = fixture.lower(&format!("{}\n{}", indy, indy)).unwrap();
        assert_eq!(lowered[0], lowered[1]);
        assert_eq!(fixture.bootstrap_methods.len(), 1);
        assert_eq!(fixture.bootstrap_methods[0].bootstrap_arguments.len(), 3);
    }

    #[test]
    fn lookup_keys_are_sorted() {
        let mut fixture = Fixture::new();
        let lowered = fixture
            .lower("lookupswitch mapping(9=A, -1=B) default(C)")
            .unwrap();
        assert_eq!(
            lowered[0],
            Pending::LookupSwitch {
                pairs: vec![(-1, String::from("B")), (9, String::from("A"))],
                default: String::from("C"),
            }
        );

        let err = fixture
            .lower("lookupswitch mapping(1=A, 1=B) default(C)")
            .unwrap_err();
        assert_eq!(err.line, 3);
        assert!(matches!(err.kind, CompileErrorKind::IllegalOperand(_)));
    }

    #[test]
    fn bad_operands() {
        let mut fixture = Fixture::new();
        let bad = [
            "sipush 40000",
            "iinc big 100000",
            "getstatic a/B.c Q",
            "multianewarray [I 2",
            "new [I",
            "ldc [Q",
            "tableswitch range(1:3) offsets(A, B) default(C)",
        ];
        for text in bad {
            assert!(fixture.lower(text).is_err(), "{} should not lower", text);
        }
    }

    #[test]
    fn handles_must_match_their_member() {
        let mut fixture = Fixture::new();
        let err = fixture
            .lower("ldc handle[H_GETFIELD a/B.c ()V]")
            .unwrap_err();
        assert!(matches!(err.kind, CompileErrorKind::InvalidHandle(_)));
        let err = fixture
            .lower("ldc handle[H_INVOKEVIRTUAL a/B.<init> ()V]")
            .unwrap_err();
        assert!(matches!(err.kind, CompileErrorKind::InvalidHandle(_)));
        assert!(fixture
            .lower("ldc handle[H_NEWINVOKESPECIAL a/B.<init> ()V]")
            .is_ok());
    }
}
