use super::cursor::{is_identifier, split_top_level, Cursor};
use super::literal::{parse_handle, parse_int, parse_ldc_value, split_member};
use crate::ast::Instruction;
use crate::jvm::{BaseType, OperandKind, Opcode};

/// Parse the instruction part of a line
///
/// Several operand-less instructions may share a line, so this returns a list. `None` means the
/// text is not a well formed instruction (including trailing garbage after the operands).
pub fn parse_instructions(text: &str) -> Option<Vec<Instruction>> {
    let mut cursor = Cursor::new(text);
    let opcode = Opcode::from_mnemonic(cursor.word()?)?;

    if opcode.kind() == OperandKind::Plain {
        let mut instructions = vec![Instruction::Plain(opcode)];
        while let Some(word) = cursor.word() {
            match Opcode::from_mnemonic(word) {
                Some(next) if next.kind() == OperandKind::Plain => {
                    instructions.push(Instruction::Plain(next))
                }
                _ => return None,
            }
        }
        return Some(instructions);
    }

    let instruction = parse_operands(opcode, &mut cursor)?;
    if cursor.at_end() {
        Some(vec![instruction])
    } else {
        None
    }
}

fn parse_operands(opcode: Opcode, cursor: &mut Cursor) -> Option<Instruction> {
    let instruction = match opcode.kind() {
        OperandKind::Plain => Instruction::Plain(opcode),
        OperandKind::Push => Instruction::Int {
            opcode,
            value: parse_int(cursor.word()?)?,
        },
        OperandKind::Ldc => Instruction::Ldc(parse_ldc_value(cursor)?),
        OperandKind::Local => Instruction::Var {
            opcode,
            name: variable(cursor)?,
        },
        OperandKind::Iinc => Instruction::Iinc {
            name: variable(cursor)?,
            increment: parse_int(cursor.word()?)?,
        },
        OperandKind::Jump => Instruction::Jump {
            opcode,
            target: label(cursor)?,
        },
        OperandKind::TableSwitch => parse_table_switch(cursor)?,
        OperandKind::LookupSwitch => parse_lookup_switch(cursor)?,
        OperandKind::Field => {
            let (owner, name) = split_member(cursor.word()?)?;
            let desc = cursor.word()?;
            Instruction::Field {
                opcode,
                owner: String::from(owner),
                name: String::from(name),
                desc: String::from(desc),
            }
        }
        OperandKind::Method => {
            let member = cursor.take_while(|c| !c.is_whitespace() && c != '(')?;
            let (owner, name) = split_member(member)?;
            cursor.skip_whitespace();
            if cursor.peek() != Some('(') {
                return None;
            }
            let desc = cursor.word()?;
            let itf = cursor.keyword("itf");
            Instruction::Method {
                opcode,
                owner: String::from(owner),
                name: String::from(name),
                desc: String::from(desc),
                interface: itf || opcode == Opcode::InvokeInterface,
            }
        }
        OperandKind::Indy => {
            let name = cursor.word()?;
            let desc = cursor.word()?;
            if !desc.starts_with('(') || !cursor.keyword("handle") {
                return None;
            }
            let bootstrap = parse_handle(cursor)?;
            if !cursor.keyword("args") {
                return None;
            }
            let args = split_top_level(cursor.delimited('[', ']')?, ',')
                .into_iter()
                .map(|arg| parse_ldc_value(&mut Cursor::new(arg)))
                .collect::<Option<Vec<_>>>()?;
            Instruction::Indy {
                name: String::from(name),
                desc: String::from(desc),
                bootstrap,
                args,
            }
        }
        OperandKind::Type => Instruction::Type {
            opcode,
            type_name: String::from(cursor.word()?),
        },
        OperandKind::NewArray => Instruction::NewArray(BaseType::from_name(cursor.word()?)?),
        OperandKind::MultiArray => Instruction::MultiArray {
            desc: String::from(cursor.word()?),
            dimensions: parse_int(cursor.word()?)?,
        },
        OperandKind::Folded | OperandKind::Unsupported => return None,
    };
    Some(instruction)
}

fn variable(cursor: &mut Cursor) -> Option<String> {
    let name = cursor.word()?;
    if is_identifier(name) {
        Some(String::from(name))
    } else {
        None
    }
}

fn label(cursor: &mut Cursor) -> Option<String> {
    variable(cursor)
}

/// `range(min:max) offsets(l1, l2, ...) default(dl)`
fn parse_table_switch(cursor: &mut Cursor) -> Option<Instruction> {
    if !cursor.keyword("range") {
        return None;
    }
    let (min, max) = cursor.delimited('(', ')')?.split_once(':')?;
    let min = parse_int(min.trim())?;
    let max = parse_int(max.trim())?;
    if !cursor.keyword("offsets") {
        return None;
    }
    let labels = label_list(cursor.delimited('(', ')')?)?;
    let default = parse_default(cursor)?;
    Some(Instruction::TableSwitch {
        min,
        max,
        labels,
        default,
    })
}

/// `mapping(k1=l1, k2=l2, ...) default(dl)`
fn parse_lookup_switch(cursor: &mut Cursor) -> Option<Instruction> {
    if !cursor.keyword("mapping") {
        return None;
    }
    let mapping = split_top_level(cursor.delimited('(', ')')?, ',')
        .into_iter()
        .map(|pair| {
            let (key, label) = pair.split_once('=')?;
            let label = label.trim();
            if is_identifier(label) {
                Some((parse_int(key.trim())?, String::from(label)))
            } else {
                None
            }
        })
        .collect::<Option<Vec<_>>>()?;
    let default = parse_default(cursor)?;
    Some(Instruction::LookupSwitch { mapping, default })
}

fn parse_default(cursor: &mut Cursor) -> Option<String> {
    if !cursor.keyword("default") {
        return None;
    }
    let default = cursor.delimited('(', ')')?.trim();
    if is_identifier(default) {
        Some(String::from(default))
    } else {
        None
    }
}

fn label_list(text: &str) -> Option<Vec<String>> {
    split_top_level(text, ',')
        .into_iter()
        .map(|label| {
            if is_identifier(label) {
                Some(String::from(label))
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ast::{Handle, LdcValue};
    use crate::jvm::HandleKind;

    fn single(text: &str) -> Instruction {
        let mut parsed = parse_instructions(text).expect("instruction should parse");
        assert_eq!(parsed.len(), 1);
        parsed.remove(0)
    }

    #[test]
    fn plain_opcodes_share_a_line() {
        assert_eq!(
            parse_instructions("nop ICONST_1 pop"),
            Some(vec![
                Instruction::Plain(Opcode::Nop),
                Instruction::Plain(Opcode::IConst1),
                Instruction::Plain(Opcode::Pop),
            ])
        );
        assert_eq!(parse_instructions("nop iload x"), None);
    }

    #[test]
    fn folded_opcodes_are_rejected() {
        assert_eq!(parse_instructions("iload_0"), None);
        assert_eq!(parse_instructions("goto_w A"), None);
        assert_eq!(parse_instructions("jsr A"), None);
    }

    #[test]
    fn member_operands() {
        assert_eq!(
            single("getstatic java/lang/System.out Ljava/io/PrintStream;"),
            Instruction::Field {
                opcode: Opcode::GetStatic,
                owner: String::from("java/lang/System"),
                name: String::from("out"),
                desc: String::from("Ljava/io/PrintStream;"),
            }
        );
        let expected = Instruction::Method {
            opcode: Opcode::InvokeVirtual,
            owner: String::from("java/io/PrintStream"),
            name: String::from("println"),
            desc: String::from("(Ljava/lang/String;)V"),
            interface: false,
        };
        assert_eq!(
            single("invokevirtual java/io/PrintStream.println(Ljava/lang/String;)V"),
            expected
        );
        assert_eq!(
            single("invokevirtual java/io/PrintStream.println (Ljava/lang/String;)V"),
            expected
        );
        assert!(matches!(
            single("invokestatic a/I.m()V itf"),
            Instruction::Method { interface: true, .. }
        ));
        assert_eq!(parse_instructions("invokestatic m()V"), None);
    }

    #[test]
    fn class_named_like_a_primitive() {
        assert_eq!(
            single("getfield I.I I"),
            Instruction::Field {
                opcode: Opcode::GetField,
                owner: String::from("I"),
                name: String::from("I"),
                desc: String::from("I"),
            }
        );
    }

    #[test]
    fn switches() {
        assert_eq!(
            single("tableswitch range(0:2) offsets(A, B, C) default(D)"),
            Instruction::TableSwitch {
                min: 0,
                max: 2,
                labels: vec![String::from("A"), String::from("B"), String::from("C")],
                default: String::from("D"),
            }
        );
        assert_eq!(
            single("LOOKUPSWITCH mapping(-1=A, 0x10=B) default(C)"),
            Instruction::LookupSwitch {
                mapping: vec![(-1, String::from("A")), (16, String::from("B"))],
                default: String::from("C"),
            }
        );
        assert_eq!(
            single("lookupswitch mapping() default(C)"),
            Instruction::LookupSwitch {
                mapping: vec![],
                default: String::from("C"),
            }
        );
        assert_eq!(parse_instructions("tableswitch range(0:2) offsets(A) "), None);
    }

    #[test]
    fn invokedynamic() {
        let text = "invokedynamic run ()Ljava/lang/Runnable; \
            handle[H_INVOKESTATIC java/lang/invoke/LambdaMetafactory.metafactory \
            (Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;Ljava/lang/invoke/MethodType;\
            Ljava/lang/invoke/MethodType;Ljava/lang/invoke/MethodHandle;Ljava/lang/invoke/MethodType;)\
            Ljava/lang/invoke/CallSite;] args[()V, handle[H_INVOKESTATIC Foo.lambda$0 ()V], ()V]";
        match single(text) {
            Instruction::Indy {
                name,
                desc,
                bootstrap,
                args,
            } => {
                assert_eq!(name, "run");
                assert_eq!(desc, "()Ljava/lang/Runnable;");
                assert_eq!(bootstrap.name, "metafactory");
                assert_eq!(args.len(), 3);
                assert_eq!(
                    args[1],
                    LdcValue::Handle(Handle {
                        kind: HandleKind::InvokeStatic,
                        owner: String::from("Foo"),
                        name: String::from("lambda$0"),
                        desc: String::from("()V"),
                    })
                );
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn simple_operands() {
        assert_eq!(
            single("bipush -5"),
            Instruction::Int {
                opcode: Opcode::BiPush,
                value: -5
            }
        );
        assert_eq!(
            single("bipush 200"),
            Instruction::Int {
                opcode: Opcode::BiPush,
                value: 200
            }
        );
        assert_eq!(parse_instructions("bipush 5L"), None);
        assert_eq!(
            single("iinc counter -1"),
            Instruction::Iinc {
                name: String::from("counter"),
                increment: -1
            }
        );
        assert_eq!(single("newarray int"), Instruction::NewArray(BaseType::Int));
        assert_eq!(single("newarray J"), Instruction::NewArray(BaseType::Long));
        assert_eq!(
            single("multianewarray [[I 2"),
            Instruction::MultiArray {
                desc: String::from("[[I"),
                dimensions: 2
            }
        );
        assert_eq!(parse_instructions("aload"), None);
        assert_eq!(parse_instructions("ldc 1 2"), None);
        assert_eq!(parse_instructions("goto A B"), None);
    }
}
