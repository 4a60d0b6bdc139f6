//! Static checks over a [`Unit`]
//!
//! Validation never fails and never modifies the tree: it collects every problem it can find
//! into a list of [`ValidationMessage`]s, so that they can all be shown at once.
//!
//! Variable checks are a single linear pass in source order. The type of a variable is fixed by
//! its parameter declaration or by the first store to it, and later loads and stores must agree.
//! Branches are not taken into account, so a variable stored with different types on two
//! exclusive paths is still reported.

use crate::ast::*;
use crate::jvm::{FieldType, Opcode, ParseDescriptor};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Category of diagnostic
///
/// The string names and numeric codes are stable.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageKind {
    /// Jump, switch, try-catch, or line number refers to a label that is never defined
    LabelUndefined,

    /// Label is defined more than once
    LabelDuplicate,

    /// Variable is read before any store to it (and is not a parameter)
    VarUseBeforeDef,

    /// Variable is used with a type different from the one it was established with
    VarUseOfDiffType,

    /// Parameter descriptor is not a valid field descriptor
    VarIllegalDesc,

    /// Constant value on a field that is not static
    CvValOnNonStatic,

    /// Constant value on a method
    CvValOnMethod,

    /// Constant value does not fit in the field type
    CvValTooBig,

    /// Constant value has the wrong kind for the field type
    CvValWrongType,

    /// Immediate operand out of range for its instruction
    IntValTooBig,
}

impl MessageKind {
    pub const ALL: [MessageKind; 10] = [
        MessageKind::LabelUndefined,
        MessageKind::LabelDuplicate,
        MessageKind::VarUseBeforeDef,
        MessageKind::VarUseOfDiffType,
        MessageKind::VarIllegalDesc,
        MessageKind::CvValOnNonStatic,
        MessageKind::CvValOnMethod,
        MessageKind::CvValTooBig,
        MessageKind::CvValWrongType,
        MessageKind::IntValTooBig,
    ];

    pub fn code(&self) -> u16 {
        match self {
            MessageKind::LabelUndefined => 100,
            MessageKind::LabelDuplicate => 101,
            MessageKind::VarUseBeforeDef => 200,
            MessageKind::VarUseOfDiffType => 201,
            MessageKind::VarIllegalDesc => 202,
            MessageKind::CvValOnNonStatic => 300,
            MessageKind::CvValOnMethod => 301,
            MessageKind::CvValTooBig => 302,
            MessageKind::CvValWrongType => 303,
            MessageKind::IntValTooBig => 400,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::LabelUndefined => "LBL_UNDEFINED",
            MessageKind::LabelDuplicate => "LBL_DUPLICATE",
            MessageKind::VarUseBeforeDef => "VAR_USE_BEFORE_DEF",
            MessageKind::VarUseOfDiffType => "VAR_USE_OF_DIFF_TYPE",
            MessageKind::VarIllegalDesc => "VAR_ILLEGAL_DESC",
            MessageKind::CvValOnNonStatic => "CV_VAL_ON_NON_STATIC",
            MessageKind::CvValOnMethod => "CV_VAL_ON_METHOD",
            MessageKind::CvValTooBig => "CV_VAL_TOO_BIG",
            MessageKind::CvValWrongType => "CV_VAL_WRONG_TYPE",
            MessageKind::IntValTooBig => "INT_VAL_TOO_BIG",
        }
    }

    pub fn from_code(code: u16) -> Option<MessageKind> {
        MessageKind::ALL.iter().copied().find(|kind| kind.code() == code)
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationMessage {
    pub kind: MessageKind,
    pub message: String,

    /// 1-based source line
    pub line: usize,
}

impl fmt::Display for ValidationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: [{}] {}", self.line, self.kind, self.message)
    }
}

/// Check a unit, returning every problem found
pub fn validate(unit: &Unit) -> Vec<ValidationMessage> {
    let mut validator = Validator::default();
    validator.definition(&unit.definition);
    if let Some(code) = &unit.code {
        validator.labels(code);
        validator.variables(unit, code);
        validator.immediates(code);
    }
    validator.messages
}

/// How a local variable is represented, as far as loads and stores are concerned
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum VarKind {
    Int,
    Float,
    Long,
    Double,
    Reference,
}

impl VarKind {
    fn of_descriptor(desc: &str) -> Option<VarKind> {
        let kind = match desc.chars().next()? {
            'I' | 'Z' | 'B' | 'C' | 'S' => VarKind::Int,
            'F' => VarKind::Float,
            'J' => VarKind::Long,
            'D' => VarKind::Double,
            'L' | '[' => VarKind::Reference,
            _ => return None,
        };
        Some(kind)
    }

    fn of_opcode(opcode: Opcode) -> Option<VarKind> {
        let kind = match opcode {
            Opcode::ILoad | Opcode::IStore => VarKind::Int,
            Opcode::FLoad | Opcode::FStore => VarKind::Float,
            Opcode::LLoad | Opcode::LStore => VarKind::Long,
            Opcode::DLoad | Opcode::DStore => VarKind::Double,
            Opcode::ALoad | Opcode::AStore => VarKind::Reference,
            _ => return None,
        };
        Some(kind)
    }

    fn name(&self) -> &'static str {
        match self {
            VarKind::Int => "int",
            VarKind::Float => "float",
            VarKind::Long => "long",
            VarKind::Double => "double",
            VarKind::Reference => "reference",
        }
    }
}

#[derive(Default)]
struct Validator {
    messages: Vec<ValidationMessage>,
}

impl Validator {
    fn report(&mut self, kind: MessageKind, line: usize, message: String) {
        self.messages.push(ValidationMessage {
            kind,
            message,
            line,
        });
    }

    fn definition(&mut self, definition: &Definition) {
        match definition {
            Definition::Method(method) => {
                for parameter in &method.parameters {
                    if FieldType::parse(&parameter.desc).is_err() {
                        let msg = format!(
                            "Parameter '{}' has illegal descriptor '{}'",
                            parameter.name, parameter.desc
                        );
                        self.report(MessageKind::VarIllegalDesc, method.line, msg);
                    }
                }
                if let Some(value) = &method.const_value {
                    let msg = String::from("Methods cannot have constant values");
                    self.report(MessageKind::CvValOnMethod, value.line, msg);
                }
            }
            Definition::Field(field) => {
                if let Some(value) = &field.const_value {
                    if !definition.is_static() {
                        let msg = format!("Constant value on non-static field '{}'", field.name);
                        self.report(MessageKind::CvValOnNonStatic, value.line, msg);
                    }
                    self.constant_value(&field.desc, &value.value, value.line);
                }
            }
        }
    }

    fn constant_value(&mut self, desc: &str, value: &LdcValue, line: usize) {
        let range = match desc {
            "Z" => Some((0, 1)),
            "B" => Some((i8::MIN as i64, i8::MAX as i64)),
            "C" => Some((0, u16::MAX as i64)),
            "S" => Some((i16::MIN as i64, i16::MAX as i64)),
            _ => None,
        };
        let compatible = match (desc, value) {
            ("I" | "Z" | "B" | "C" | "S", LdcValue::Int(_)) => true,
            ("J", LdcValue::Int(_) | LdcValue::Long(_)) => true,
            ("F", LdcValue::Int(_) | LdcValue::Float(_)) => true,
            ("D", LdcValue::Int(_) | LdcValue::Long(_) | LdcValue::Float(_)) => true,
            ("D", LdcValue::Double(_)) => true,
            ("Ljava/lang/String;", LdcValue::String(_)) => true,
            _ => false,
        };

        if !compatible {
            let msg = format!(
                "A {} constant value is not allowed for a field of type '{}'",
                value.kind_name(),
                desc
            );
            self.report(MessageKind::CvValWrongType, line, msg);
        } else if let (Some((min, max)), LdcValue::Int(int)) = (range, value) {
            let int = *int as i64;
            if int < min || int > max {
                let msg = format!("Value {} does not fit in type '{}'", int, desc);
                self.report(MessageKind::CvValTooBig, line, msg);
            }
        }
    }

    fn labels(&mut self, code: &Code) {
        let mut defined = HashSet::new();
        for entry in &code.entries {
            if let CodeItem::Label(name) = &entry.item {
                if !defined.insert(name.as_str()) {
                    let msg = format!("Label '{}' is defined more than once", name);
                    self.report(MessageKind::LabelDuplicate, entry.line, msg);
                }
            }
        }
        for entry in &code.entries {
            for label in entry.item.label_references() {
                if !defined.contains(label) {
                    let msg = format!("Label '{}' is not defined", label);
                    self.report(MessageKind::LabelUndefined, entry.line, msg);
                }
            }
        }
    }

    fn variables(&mut self, unit: &Unit, code: &Code) {
        let mut known: HashMap<&str, VarKind> = HashMap::new();
        if let Some(method) = unit.method() {
            if !method.is_static() {
                known.insert("this", VarKind::Reference);
            }
            for parameter in &method.parameters {
                if let Some(kind) = VarKind::of_descriptor(&parameter.desc) {
                    known.insert(&parameter.name, kind);
                }
            }
        }

        for (line, insn) in code.instructions() {
            match insn {
                Instruction::Var { opcode, name } => {
                    let implied = match VarKind::of_opcode(*opcode) {
                        Some(kind) => kind,
                        None => continue,
                    };
                    match known.get(name.as_str()) {
                        None if opcode.is_load() => {
                            let msg = format!("Variable '{}' is used before it is defined", name);
                            self.report(MessageKind::VarUseBeforeDef, line, msg);
                        }
                        None => {
                            known.insert(name, implied);
                        }
                        Some(established) if *established != implied => {
                            let msg = format!(
                                "Variable '{}' is a {}, but '{}' uses it as a {}",
                                name,
                                established.name(),
                                opcode.mnemonic(),
                                implied.name()
                            );
                            self.report(MessageKind::VarUseOfDiffType, line, msg);
                        }
                        Some(_) => (),
                    }
                }
                Instruction::Iinc { name, .. } => match known.get(name.as_str()) {
                    None => {
                        let msg = format!("Variable '{}' is used before it is defined", name);
                        self.report(MessageKind::VarUseBeforeDef, line, msg);
                    }
                    Some(VarKind::Int) => (),
                    Some(established) => {
                        let msg = format!(
                            "Variable '{}' is a {}, but 'iinc' needs an int",
                            name,
                            established.name()
                        );
                        self.report(MessageKind::VarUseOfDiffType, line, msg);
                    }
                },
                _ => (),
            }
        }
    }

    fn immediates(&mut self, code: &Code) {
        for (line, insn) in code.instructions() {
            let problem = match insn {
                Instruction::Int {
                    opcode: Opcode::BiPush,
                    value,
                } if i8::try_from(*value).is_err() => {
                    Some(format!("bipush value {} does not fit in a byte", value))
                }
                Instruction::Int {
                    opcode: Opcode::SiPush,
                    value,
                } if i16::try_from(*value).is_err() => {
                    Some(format!("sipush value {} does not fit in a short", value))
                }
                Instruction::Iinc { increment, .. } if i16::try_from(*increment).is_err() => {
                    Some(format!("iinc increment {} does not fit in a short", increment))
                }
                Instruction::MultiArray { dimensions, .. } if !(1..=255).contains(dimensions) => {
                    Some(format!(
                        "multianewarray dimension count {} is not between 1 and 255",
                        dimensions
                    ))
                }
                _ => None,
            };
            if let Some(msg) = problem {
                self.report(MessageKind::IntValTooBig, line, msg);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parse::{parse_unit, Dialect};

    fn kinds(text: &str) -> Vec<(MessageKind, usize)> {
        let unit = parse_unit(text, Dialect::Bare).unwrap();
        validate(&unit)
            .into_iter()
            .map(|msg| (msg.kind, msg.line))
            .collect()
    }

    #[test]
    fn clean_method() {
        let text = "public static max(I a, I b)I\n\
                    iload a\n\
                    iload b\n\
                    if_icmpge B\n\
                    iload b\n\
                    ireturn\n\
                    B:\n\
                    iload a\n\
                    istore c\n\
                    iinc c 1\n\
                    iload c\n\
                    ireturn";
        assert_eq!(kinds(text), vec![]);
    }

    #[test]
    fn immediates_out_of_range() {
        assert_eq!(
            kinds("m()V\nbipush 200\nsipush 200\nsipush 40000\niinc this 70000"),
            vec![
                (MessageKind::VarUseOfDiffType, 5),
                (MessageKind::IntValTooBig, 2),
                (MessageKind::IntValTooBig, 4),
                (MessageKind::IntValTooBig, 5),
            ]
        );
        assert_eq!(
            kinds("static m()V\nmultianewarray [[I 0"),
            vec![(MessageKind::IntValTooBig, 2)]
        );
    }

    #[test]
    fn constant_values() {
        assert_eq!(
            kinds("field I\nCONST-VALUE 0"),
            vec![(MessageKind::CvValOnNonStatic, 2)]
        );
        assert_eq!(kinds("static field I\nCONST-VALUE 0"), vec![]);
        assert_eq!(
            kinds("static b B\nCONST-VALUE 200"),
            vec![(MessageKind::CvValTooBig, 2)]
        );
        assert_eq!(kinds("static c C\nCONST-VALUE 65535"), vec![]);
        assert_eq!(
            kinds("static c C\nCONST-VALUE -1"),
            vec![(MessageKind::CvValTooBig, 2)]
        );
        assert_eq!(kinds("static d D\nCONST-VALUE 1"), vec![]);
        assert_eq!(kinds("static j J\nCONST-VALUE 1L"), vec![]);
        assert_eq!(
            kinds("static i I\nCONST-VALUE 1L"),
            vec![(MessageKind::CvValWrongType, 2)]
        );
        assert_eq!(
            kinds("static s Ljava/lang/String;\nCONST-VALUE \"hi\""),
            vec![]
        );
        assert_eq!(
            kinds("static m()V\nCONST-VALUE 1\nreturn"),
            vec![(MessageKind::CvValOnMethod, 2)]
        );
    }

    #[test]
    fn labels() {
        assert_eq!(
            kinds("m()V\nTRY a b CATCH(*) c\nreturn"),
            vec![
                (MessageKind::LabelUndefined, 2),
                (MessageKind::LabelUndefined, 2),
                (MessageKind::LabelUndefined, 2),
            ]
        );
        assert_eq!(
            kinds("m()V\nA:\nA:\ngoto A\ntableswitch range(0:0) offsets(B) default(A)"),
            vec![
                (MessageKind::LabelDuplicate, 3),
                (MessageKind::LabelUndefined, 5)
            ]
        );
    }

    #[test]
    fn variables() {
        assert_eq!(
            kinds("static m()V\naload doesnotexist\nareturn"),
            vec![(MessageKind::VarUseBeforeDef, 2)]
        );
        assert_eq!(
            kinds("m(J x)V\naload this\nlload x\nistore x\nastore y\nfload y"),
            vec![
                (MessageKind::VarUseOfDiffType, 4),
                (MessageKind::VarUseOfDiffType, 6)
            ]
        );
        assert_eq!(
            kinds("static m(I[] bad, V void)V\nreturn"),
            vec![
                (MessageKind::VarIllegalDesc, 1),
                (MessageKind::VarIllegalDesc, 1)
            ]
        );
        assert_eq!(
            kinds("static m()V\niinc counter 1"),
            vec![(MessageKind::VarUseBeforeDef, 2)]
        );
    }

    #[test]
    fn validation_is_deterministic() {
        let unit = parse_unit(
            "m()V\nbipush 999\ngoto nowhere\naload nothing",
            Dialect::Bare,
        )
        .unwrap();
        assert_eq!(validate(&unit), validate(&unit));
    }

    #[test]
    fn stable_codes() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::from_code(kind.code()), Some(kind));
        }
        assert_eq!(MessageKind::LabelUndefined.to_string(), "LBL_UNDEFINED");
    }
}
