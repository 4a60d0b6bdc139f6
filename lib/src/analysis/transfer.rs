use super::{Entry, Frame, Known, Value};
use crate::ast::{Instruction, LdcValue};
use crate::jvm::verifier::{replace_all, shuffle_depth, shuffle_stack, StackValue, VerificationType};
use crate::jvm::{FieldType, MethodDescriptor, Opcode, ParseDescriptor, RenderDescriptor};
use crate::util::unescape;
use VerificationType::*;

/// Longest array whose elements are tracked individually
const MAX_TRACKED_ELEMENTS: i32 = 1024;

impl Frame {
    /// Update the frame to reflect the effects of an instruction
    ///
    /// This never fails: values missing from the stack are `Top`, unknown variables load as
    /// `Top`, and descriptors that do not parse leave the stack alone. Each of those records a
    /// [`Frame::problem`]. `position` is the index of the instruction in the analysis (it
    /// identifies uninitialized objects from `new` and arrays), and `this_class` is what `this`
    /// becomes once a constructor calls its super constructor.
    pub fn execute(&mut self, insn: &Instruction, position: usize, this_class: &str) {
        match insn {
            Instruction::Plain(opcode) => self.execute_plain(*opcode),

            Instruction::Int { value, .. } => self.push(Entry::known(Integer, Known::Int(*value))),

            Instruction::Ldc(value) => {
                let entry = Entry {
                    value: constant_type(value),
                    known: constant_value(value),
                };
                self.push(entry);
            }

            Instruction::Var { opcode, name } => {
                let expected = match opcode {
                    Opcode::ILoad | Opcode::IStore => Some(Integer),
                    Opcode::LLoad | Opcode::LStore => Some(Long),
                    Opcode::FLoad | Opcode::FStore => Some(Float),
                    Opcode::DLoad | Opcode::DStore => Some(Double),
                    _ => None,
                };
                if opcode.is_load() {
                    let entry = match (self.locals.get(name).cloned(), expected) {
                        (None, expected) => {
                            self.note_problem(format!("variable `{}` is not defined", name));
                            Entry::new(expected.unwrap_or(Top))
                        }
                        (Some(entry), Some(expected)) if entry.value != expected => {
                            Entry::new(expected)
                        }
                        (Some(entry), _) => entry,
                    };
                    self.push(entry);
                } else {
                    let popped = self.pop(*opcode);
                    let stored = match expected {
                        Some(expected) if popped.value != expected => Entry::new(expected),
                        _ => popped,
                    };
                    self.locals.insert(name.clone(), stored);
                }
            }

            Instruction::Iinc { name, increment } => {
                let entry = self
                    .locals
                    .entry(name.clone())
                    .or_insert_with(|| Entry::new(Integer));
                entry.known = match entry.known {
                    Some(Known::Int(value)) => Some(Known::Int(value.wrapping_add(*increment))),
                    _ => None,
                };
            }

            Instruction::Field { opcode, desc, .. } => {
                let field_type = Entry::new(field_value(desc));
                match opcode {
                    Opcode::GetStatic => self.push(field_type),
                    Opcode::GetField => {
                        self.pop(*opcode);
                        self.push(field_type);
                    }
                    Opcode::PutStatic => {
                        self.pop(*opcode);
                    }
                    _ => {
                        self.pop(*opcode);
                        self.pop(*opcode);
                    }
                }
            }

            Instruction::Method {
                opcode,
                owner,
                name,
                desc,
                ..
            } => {
                let descriptor = match MethodDescriptor::parse(desc) {
                    Ok(descriptor) => descriptor,
                    Err(_) => {
                        self.note_problem(format!("invalid method descriptor `{}`", desc));
                        return;
                    }
                };
                for _ in &descriptor.parameters {
                    self.pop(*opcode);
                }

                if *opcode != Opcode::InvokeStatic {
                    let receiver = self.pop(*opcode);
                    let initializes = *opcode == Opcode::InvokeSpecial && name == "<init>";
                    let initialized_class = match receiver.value {
                        UninitializedThis => this_class,
                        _ => owner.as_str(),
                    };
                    if initializes && matches!(receiver.value, UninitializedThis | Uninitialized(_))
                    {
                        let initialized = || Entry::new(Object(String::from(initialized_class)));
                        replace_all(&mut self.stack, &receiver, &initialized);
                        for entry in self.locals.values_mut() {
                            if entry.value == receiver.value {
                                *entry = initialized();
                            }
                        }
                    }
                }

                if let Some(return_type) = &descriptor.return_type {
                    self.push(Entry::new(VerificationType::from_field_type(return_type)));
                }
            }

            Instruction::Indy { desc, .. } => match MethodDescriptor::parse(desc) {
                Ok(descriptor) => {
                    for _ in &descriptor.parameters {
                        self.pop(Opcode::InvokeDynamic);
                    }
                    if let Some(return_type) = &descriptor.return_type {
                        self.push(Entry::new(VerificationType::from_field_type(return_type)));
                    }
                }
                Err(_) => self.note_problem(format!("invalid method descriptor `{}`", desc)),
            },

            Instruction::Jump { opcode, .. } => match opcode {
                Opcode::Goto => (),
                Opcode::IfICmpEq
                | Opcode::IfICmpNe
                | Opcode::IfICmpLt
                | Opcode::IfICmpGe
                | Opcode::IfICmpGt
                | Opcode::IfICmpLe
                | Opcode::IfACmpEq
                | Opcode::IfACmpNe => {
                    self.pop(*opcode);
                    self.pop(*opcode);
                }
                _ => {
                    self.pop(*opcode);
                }
            },

            Instruction::TableSwitch { .. } | Instruction::LookupSwitch { .. } => {
                self.pop(insn.opcode());
            }

            Instruction::Type { opcode, type_name } => match opcode {
                Opcode::New => self.push(Entry::new(Uninitialized(position))),
                Opcode::ANewArray => {
                    let length = self.pop(*opcode);
                    self.push(new_array(array_of(type_name), &length, position));
                }
                Opcode::CheckCast => {
                    let cast = self.pop(*opcode);
                    self.push(Entry {
                        value: Object(type_name.clone()),
                        known: cast.known,
                    });
                }
                _ => {
                    self.pop(*opcode);
                    self.push(Entry::new(Integer));
                }
            },

            Instruction::MultiArray { desc, dimensions } => {
                for _ in 0..(*dimensions).clamp(0, u8::MAX as i32) {
                    self.pop(Opcode::MultiANewArray);
                }
                self.push(Entry::new(Object(desc.clone())));
            }

            Instruction::NewArray(base_type) => {
                let length = self.pop(Opcode::NewArray);
                let array = format!("[{}", base_type.render());
                self.push(new_array(array, &length, position));
            }
        }
    }

    fn push(&mut self, entry: Entry) {
        self.stack.push(entry);
    }

    /// Pop the top of the stack, noting a problem if there is nothing to pop
    fn pop(&mut self, opcode: Opcode) -> Entry {
        match self.stack.pop() {
            Some((_, _, entry)) => entry,
            None => {
                self.note_problem(format!("`{}` pops from an empty stack", opcode.mnemonic()));
                Entry::top()
            }
        }
    }

    /// Stack effect of an instruction without operands
    fn execute_plain(&mut self, opcode: Opcode) {
        use Opcode::*;

        if let Some(depth) = shuffle_depth(opcode) {
            if self.stack_depth() < depth {
                self.note_problem(format!(
                    "`{}` needs {} stack slots but only {} are there",
                    opcode.mnemonic(),
                    depth,
                    self.stack_depth()
                ));
            }
            shuffle_stack(&mut self.stack, opcode);
            return;
        }

        let known = |value: Value, known: Known| Entry::known(value, known);
        let pushed = match opcode {
            AConstNull => Entry::new(Null),
            IConstM1 => known(Integer, Known::Int(-1)),
            IConst0 => known(Integer, Known::Int(0)),
            IConst1 => known(Integer, Known::Int(1)),
            IConst2 => known(Integer, Known::Int(2)),
            IConst3 => known(Integer, Known::Int(3)),
            IConst4 => known(Integer, Known::Int(4)),
            IConst5 => known(Integer, Known::Int(5)),
            LConst0 => known(Long, Known::Long(0)),
            LConst1 => known(Long, Known::Long(1)),
            FConst0 => known(Float, Known::Float(0.0)),
            FConst1 => known(Float, Known::Float(1.0)),
            FConst2 => known(Float, Known::Float(2.0)),
            DConst0 => known(Double, Known::Double(0.0)),
            DConst1 => known(Double, Known::Double(1.0)),

            IALoad | BALoad | CALoad | SALoad | LALoad | FALoad | DALoad | AALoad => {
                let index = self.pop(opcode);
                let array = self.pop(opcode);
                let value = match opcode {
                    LALoad => Long,
                    FALoad => Float,
                    DALoad => Double,
                    AALoad => match &array.value {
                        Object(array) => element_of(array),
                        Null => Null,
                        _ => Top,
                    },
                    _ => Integer,
                };
                let element = match (&array.known, &index.known) {
                    (Some(Known::Array { elements, .. }), Some(Known::Int(index))) => {
                        usize::try_from(*index)
                            .ok()
                            .and_then(|index| elements.get(index).cloned().flatten())
                    }
                    _ => None,
                };
                Entry {
                    value,
                    known: element,
                }
            }
            IAStore | LAStore | FAStore | DAStore | AAStore | BAStore | CAStore | SAStore => {
                let stored = self.pop(opcode);
                let index = self.pop(opcode);
                let array = self.pop(opcode);
                if let Some(Known::Array { origin, .. }) = array.known {
                    let index = match index.known {
                        Some(Known::Int(index)) => usize::try_from(index).ok(),
                        _ => None,
                    };
                    let stored = stored.known.map(|known| narrow(opcode, &array.value, known));
                    self.store_element(origin, index, stored);
                }
                return;
            }

            IAdd | ISub | IMul | IDiv | IRem | IShl | IShr | IUShr | IAnd | IOr | IXor | LAdd
            | LSub | LMul | LDiv | LRem | LShl | LShr | LUShr | LAnd | LOr | LXor | FAdd | FSub
            | FMul | FDiv | FRem | DAdd | DSub | DMul | DDiv | DRem | LCmp | FCmpL | FCmpG
            | DCmpL | DCmpG => {
                let value2 = self.pop(opcode);
                let value1 = self.pop(opcode);
                let value = match opcode {
                    LAdd | LSub | LMul | LDiv | LRem | LShl | LShr | LUShr | LAnd | LOr | LXor => {
                        Long
                    }
                    FAdd | FSub | FMul | FDiv | FRem => Float,
                    DAdd | DSub | DMul | DDiv | DRem => Double,
                    _ => Integer,
                };
                let known = match (value1.known, value2.known) {
                    (Some(value1), Some(value2)) => fold_binary(opcode, value1, value2),
                    _ => None,
                };
                Entry { value, known }
            }

            INeg | L2I | F2I | D2I | I2B | I2C | I2S | LNeg | I2L | F2L | D2L | FNeg | I2F
            | L2F | D2F | DNeg | I2D | L2D | F2D => {
                let operand = self.pop(opcode);
                let value = match opcode {
                    LNeg | I2L | F2L | D2L => Long,
                    FNeg | I2F | L2F | D2F => Float,
                    DNeg | I2D | L2D | F2D => Double,
                    _ => Integer,
                };
                Entry {
                    value,
                    known: operand.known.and_then(|known| fold_unary(opcode, known)),
                }
            }

            ArrayLength => {
                let array = self.pop(opcode);
                let length = match array.known {
                    Some(Known::Array { elements, .. }) => Some(Known::Int(elements.len() as i32)),
                    _ => None,
                };
                Entry {
                    value: Integer,
                    known: length,
                }
            }

            IReturn | LReturn | FReturn | DReturn | AReturn | MonitorEnter | MonitorExit => {
                self.pop(opcode);
                return;
            }
            AThrow => {
                let thrown = self.pop(opcode);
                self.stack.clear();
                self.push(thrown);
                return;
            }

            _ => return,
        };
        self.push(pushed);
    }

    /// Record a store into every copy of the array created at `origin`
    ///
    /// An unknown index or value makes the affected elements unknown.
    fn store_element(&mut self, origin: usize, index: Option<usize>, stored: Option<Known>) {
        let update = |entry: &mut Entry| {
            if let Some(Known::Array {
                origin: entry_origin,
                elements,
            }) = &mut entry.known
            {
                if *entry_origin != origin {
                    return;
                }
                match index {
                    Some(index) => {
                        if let Some(element) = elements.get_mut(index) {
                            *element = stored.clone();
                        }
                    }
                    None => elements.iter_mut().for_each(|element| *element = None),
                }
            }
        };

        for entry in self.locals.values_mut() {
            update(entry);
        }
        self.stack = std::mem::take(&mut self.stack)
            .into_iter()
            .map(|(_, _, mut entry)| {
                update(&mut entry);
                entry
            })
            .collect();
    }
}

/// Entry for a freshly allocated array, tracking its elements if the length is known
fn new_array(array: String, length: &Entry, position: usize) -> Entry {
    let known = match length.known {
        Some(Known::Int(length)) if (0..=MAX_TRACKED_ELEMENTS).contains(&length) => {
            Some(Known::Array {
                origin: position,
                elements: vec![None; length as usize],
            })
        }
        _ => None,
    };
    Entry {
        value: Object(array),
        known,
    }
}

/// Value as it ends up in the array, after `bastore`, `castore`, and `sastore` truncate it
fn narrow(opcode: Opcode, array: &Value, known: Known) -> Known {
    let value = match known {
        Known::Int(value) => value,
        other => return other,
    };
    let narrowed = match opcode {
        Opcode::BAStore if *array == Object(String::from("[Z")) => value & 1,
        Opcode::BAStore => value as i8 as i32,
        Opcode::CAStore => value as u16 as i32,
        Opcode::SAStore => value as i16 as i32,
        _ => value,
    };
    Known::Int(narrowed)
}

/// Fold a binary operator over known operands (`None` if the operation would throw)
fn fold_binary(opcode: Opcode, value1: Known, value2: Known) -> Option<Known> {
    use Known::*;
    use Opcode::*;

    Some(match (value1, value2) {
        (Int(a), Int(b)) => Int(match opcode {
            IAdd => a.wrapping_add(b),
            ISub => a.wrapping_sub(b),
            IMul => a.wrapping_mul(b),
            IDiv if b != 0 => a.wrapping_div(b),
            IRem if b != 0 => a.wrapping_rem(b),
            IShl => a.wrapping_shl(b as u32),
            IShr => a.wrapping_shr(b as u32),
            IUShr => (a as u32).wrapping_shr(b as u32) as i32,
            IAnd => a & b,
            IOr => a | b,
            IXor => a ^ b,
            _ => return None,
        }),
        (Long(a), Int(b)) => Long(match opcode {
            LShl => a.wrapping_shl(b as u32),
            LShr => a.wrapping_shr(b as u32),
            LUShr => (a as u64).wrapping_shr(b as u32) as i64,
            _ => return None,
        }),
        (Long(a), Long(b)) => match opcode {
            LAdd => Long(a.wrapping_add(b)),
            LSub => Long(a.wrapping_sub(b)),
            LMul => Long(a.wrapping_mul(b)),
            LDiv if b != 0 => Long(a.wrapping_div(b)),
            LRem if b != 0 => Long(a.wrapping_rem(b)),
            LAnd => Long(a & b),
            LOr => Long(a | b),
            LXor => Long(a ^ b),
            LCmp => Int(a.cmp(&b) as i32),
            _ => return None,
        },
        (Float(a), Float(b)) => match opcode {
            FAdd => Float(a + b),
            FSub => Float(a - b),
            FMul => Float(a * b),
            FDiv => Float(a / b),
            FRem => Float(a % b),
            FCmpL | FCmpG => Int(compare_floats(opcode == FCmpG, a.partial_cmp(&b))),
            _ => return None,
        },
        (Double(a), Double(b)) => match opcode {
            DAdd => Double(a + b),
            DSub => Double(a - b),
            DMul => Double(a * b),
            DDiv => Double(a / b),
            DRem => Double(a % b),
            DCmpL | DCmpG => Int(compare_floats(opcode == DCmpG, a.partial_cmp(&b))),
            _ => return None,
        },
        _ => return None,
    })
}

/// Result of `fcmp`/`dcmp`, where the `g` variants treat `NaN` as greater
fn compare_floats(nan_is_greater: bool, ordering: Option<std::cmp::Ordering>) -> i32 {
    match ordering {
        Some(ordering) => ordering as i32,
        None if nan_is_greater => 1,
        None => -1,
    }
}

/// Fold a negation or conversion over a known operand
fn fold_unary(opcode: Opcode, operand: Known) -> Option<Known> {
    use Known::*;
    use Opcode::*;

    // `as` from floating point saturates and maps `NaN` to zero, like the JVM does
    Some(match (opcode, operand) {
        (INeg, Int(a)) => Int(a.wrapping_neg()),
        (I2L, Int(a)) => Long(a as i64),
        (I2F, Int(a)) => Float(a as f32),
        (I2D, Int(a)) => Double(a as f64),
        (I2B, Int(a)) => Int(a as i8 as i32),
        (I2C, Int(a)) => Int(a as u16 as i32),
        (I2S, Int(a)) => Int(a as i16 as i32),
        (LNeg, Long(a)) => Long(a.wrapping_neg()),
        (L2I, Long(a)) => Int(a as i32),
        (L2F, Long(a)) => Float(a as f32),
        (L2D, Long(a)) => Double(a as f64),
        (FNeg, Float(a)) => Float(-a),
        (F2I, Float(a)) => Int(a as i32),
        (F2L, Float(a)) => Long(a as i64),
        (F2D, Float(a)) => Double(a as f64),
        (DNeg, Double(a)) => Double(-a),
        (D2I, Double(a)) => Int(a as i32),
        (D2L, Double(a)) => Long(a as i64),
        (D2F, Double(a)) => Float(a as f32),
        _ => return None,
    })
}

/// Type pushed by `ldc`
pub fn constant_type(value: &LdcValue) -> Value {
    match value {
        LdcValue::Int(_) => Integer,
        LdcValue::Long(_) => Long,
        LdcValue::Float(_) => Float,
        LdcValue::Double(_) => Double,
        LdcValue::String(_) => Object(String::from("java/lang/String")),
        LdcValue::Type(desc) if desc.starts_with('(') => {
            Object(String::from("java/lang/invoke/MethodType"))
        }
        LdcValue::Type(_) => Object(String::from("java/lang/Class")),
        LdcValue::Handle(_) => Object(String::from("java/lang/invoke/MethodHandle")),
    }
}

/// Value pushed by `ldc`, for the constants that have one
pub fn constant_value(value: &LdcValue) -> Option<Known> {
    match value {
        LdcValue::Int(value) => Some(Known::Int(*value)),
        LdcValue::Long(value) => Some(Known::Long(*value)),
        LdcValue::Float(value) => Some(Known::Float(*value)),
        LdcValue::Double(value) => Some(Known::Double(*value)),
        LdcValue::String(raw) => unescape(raw).ok().map(Known::String),
        LdcValue::Type(_) | LdcValue::Handle(_) => None,
    }
}

/// Value of a variable or field with the given descriptor (`Top` if the descriptor is invalid)
pub fn field_value(desc: &str) -> Value {
    match FieldType::parse(desc) {
        Ok(field_type) => VerificationType::from_field_type(&field_type),
        Err(_) => Top,
    }
}

/// Class name of an array whose elements are of the given class
fn array_of(class_name: &str) -> String {
    if class_name.starts_with('[') {
        format!("[{}", class_name)
    } else {
        format!("[L{};", class_name)
    }
}

/// Value loaded out of an array of the given class
fn element_of(array: &str) -> Value {
    match array.strip_prefix('[') {
        Some(element) => field_value(element),
        None => Top,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::BaseType;
    use crate::parse::parse_instructions;

    fn run(frame: &mut Frame, text: &str) {
        for (position, insn) in parse_instructions(text).unwrap().iter().enumerate() {
            frame.execute(insn, position, "Test");
        }
    }

    fn stack(frame: &Frame) -> Vec<Value> {
        frame
            .stack
            .iter()
            .map(|(_, _, entry)| entry.value.clone())
            .collect()
    }

    fn known(frame: &Frame) -> Vec<Option<Known>> {
        frame
            .stack
            .iter()
            .map(|(_, _, entry)| entry.known.clone())
            .collect()
    }

    #[test]
    fn arithmetic_and_shuffles() {
        let mut frame = Frame::default();
        run(&mut frame, "iconst_1 i2f fconst_2 swap fdiv f2l lconst_1 ladd dup2");
        assert_eq!(stack(&frame), vec![Long, Long]);
        assert_eq!(frame.stack.offset_len().0, 4);
        assert_eq!(
            known(&frame),
            vec![Some(Known::Long(3)), Some(Known::Long(3))]
        );
        assert_eq!(frame.problem, None);
    }

    #[test]
    fn folding_follows_jvm_semantics() {
        let mut frame = Frame::default();
        run(&mut frame, "iconst_m1 iconst_1 iushr");
        assert_eq!(frame.peek_known(), Some(&Known::Int(i32::MAX)));

        let mut frame = Frame::default();
        run(&mut frame, "iconst_1 iconst_0 idiv");
        assert_eq!(stack(&frame), vec![Integer]);
        assert_eq!(frame.peek_known(), None);

        let mut frame = Frame::default();
        run(&mut frame, "fconst_0 fconst_0 fdiv dup fcmpg");
        assert_eq!(frame.peek_known(), Some(&Known::Int(1)));

        let mut frame = Frame::default();
        run(&mut frame, "fconst_0 fconst_0 fdiv f2i");
        assert_eq!(frame.peek_known(), Some(&Known::Int(0)));

        let mut frame = Frame::default();
        run(&mut frame, "lconst_1 iconst_m1 lshl l2i i2s");
        assert_eq!(frame.peek_known(), Some(&Known::Int(0)));

        let mut frame = Frame::default();
        run(&mut frame, "dconst_1 dneg dconst_0 dcmpl");
        assert_eq!(frame.peek_known(), Some(&Known::Int(-1)));
    }

    #[test]
    fn constructor_call_initializes_every_copy() {
        let mut frame = Frame::default();
        frame.execute(
            &Instruction::Type {
                opcode: Opcode::New,
                type_name: String::from("java/lang/StringBuilder"),
            },
            3,
            "Test",
        );
        run(&mut frame, "dup");
        frame.execute(
            &Instruction::Var {
                opcode: Opcode::AStore,
                name: String::from("sb"),
            },
            5,
            "Test",
        );
        assert_eq!(frame.local("sb"), Some(&Uninitialized(3)));
        frame.execute(
            &Instruction::Method {
                opcode: Opcode::InvokeSpecial,
                owner: String::from("java/lang/StringBuilder"),
                name: String::from("<init>"),
                desc: String::from("()V"),
                interface: false,
            },
            6,
            "Test",
        );
        assert!(frame.stack.is_empty());
        assert_eq!(
            frame.local("sb"),
            Some(&Object(String::from("java/lang/StringBuilder")))
        );
    }

    #[test]
    fn arrays() {
        let mut frame = Frame::default();
        frame.execute(&Instruction::NewArray(BaseType::Int), 0, "Test");
        assert_eq!(stack(&frame), vec![Object(String::from("[I"))]);

        let mut frame = Frame::default();
        frame.execute(
            &Instruction::MultiArray {
                desc: String::from("[[Ljava/lang/String;"),
                dimensions: 2,
            },
            0,
            "Test",
        );
        run(&mut frame, "iconst_0 aaload iconst_0 aaload");
        assert_eq!(stack(&frame), vec![Object(String::from("java/lang/String"))]);
    }

    #[test]
    fn array_stores_reach_every_copy() {
        let mut frame = Frame::default();
        run(&mut frame, "iconst_2");
        frame.execute(&Instruction::NewArray(BaseType::Char), 1, "Test");
        run(&mut frame, "dup dup iconst_1");
        frame.execute(
            &Instruction::Int {
                opcode: Opcode::SiPush,
                value: 0x10041,
            },
            5,
            "Test",
        );
        run(&mut frame, "castore iconst_1 caload");

        let array = Known::Array {
            origin: 1,
            elements: vec![None, Some(Known::Int(0x41))],
        };
        assert_eq!(known(&frame), vec![Some(array), Some(Known::Int(0x41))]);

        run(&mut frame, "pop arraylength");
        assert_eq!(frame.peek_known(), Some(&Known::Int(2)));
    }

    #[test]
    fn underflow_is_tolerated() {
        let mut frame = Frame::default();
        run(&mut frame, "iadd pop2 athrow");
        assert_eq!(stack(&frame), vec![Top]);
        assert_eq!(
            frame.problem.as_deref(),
            Some("`iadd` pops from an empty stack")
        );

        let mut frame = Frame::default();
        run(&mut frame, "iconst_1 dup_x1");
        assert_eq!(stack(&frame), vec![Integer, Top, Integer]);
        assert!(frame.problem.unwrap().contains("dup_x1"));
    }

    #[test]
    fn undefined_variables_are_problems() {
        let mut frame = Frame::default();
        frame.execute(
            &Instruction::Var {
                opcode: Opcode::ILoad,
                name: String::from("missing"),
            },
            0,
            "Test",
        );
        assert_eq!(stack(&frame), vec![Integer]);
        assert_eq!(
            frame.problem.as_deref(),
            Some("variable `missing` is not defined")
        );
    }
}
