use crate::jvm::{BaseType, HandleKind, Opcode};

/// Instruction, with operands in their symbolic form
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    /// Opcode with no operands
    Plain(Opcode),

    /// `bipush` or `sipush`
    Int { opcode: Opcode, value: i32 },

    Ldc(LdcValue),

    /// Load or store of a named variable
    Var { opcode: Opcode, name: String },

    Iinc { name: String, increment: i32 },

    Field {
        opcode: Opcode,
        owner: String,
        name: String,
        desc: String,
    },

    Method {
        opcode: Opcode,
        owner: String,
        name: String,
        desc: String,

        /// Is the owner an interface? (`invokeinterface` implies it)
        interface: bool,
    },

    Indy {
        name: String,
        desc: String,
        bootstrap: Handle,
        args: Vec<LdcValue>,
    },

    Jump { opcode: Opcode, target: String },

    /// Labels for `min..=max` in order
    TableSwitch {
        min: i32,
        max: i32,
        labels: Vec<String>,
        default: String,
    },

    LookupSwitch {
        mapping: Vec<(i32, String)>,
        default: String,
    },

    /// `new`, `anewarray`, `checkcast`, or `instanceof` with a class name or array descriptor
    Type { opcode: Opcode, type_name: String },

    MultiArray { desc: String, dimensions: i32 },

    NewArray(BaseType),
}

impl Instruction {
    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Plain(opcode)
            | Instruction::Int { opcode, .. }
            | Instruction::Var { opcode, .. }
            | Instruction::Field { opcode, .. }
            | Instruction::Method { opcode, .. }
            | Instruction::Jump { opcode, .. }
            | Instruction::Type { opcode, .. } => *opcode,
            Instruction::Ldc(_) => Opcode::Ldc,
            Instruction::Iinc { .. } => Opcode::IInc,
            Instruction::Indy { .. } => Opcode::InvokeDynamic,
            Instruction::TableSwitch { .. } => Opcode::TableSwitch,
            Instruction::LookupSwitch { .. } => Opcode::LookupSwitch,
            Instruction::MultiArray { .. } => Opcode::MultiANewArray,
            Instruction::NewArray(_) => Opcode::NewArray,
        }
    }

    /// Branch targets, with the default first for switches
    pub fn label_references(&self) -> Vec<&str> {
        match self {
            Instruction::Jump { target, .. } => vec![target.as_str()],
            Instruction::TableSwitch {
                labels, default, ..
            } => std::iter::once(default.as_str())
                .chain(labels.iter().map(String::as_str))
                .collect(),
            Instruction::LookupSwitch { mapping, default } => std::iter::once(default.as_str())
                .chain(mapping.iter().map(|(_, label)| label.as_str()))
                .collect(),
            _ => vec![],
        }
    }

    /// Variable the instruction reads or writes
    pub fn variable(&self) -> Option<&str> {
        match self {
            Instruction::Var { name, .. } | Instruction::Iinc { name, .. } => Some(name),
            _ => None,
        }
    }
}

/// Loadable constant
#[derive(Clone, Debug, PartialEq)]
pub enum LdcValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),

    /// String contents, with escapes as written in the source
    String(String),

    /// Field descriptor for class literals, method descriptor for method types
    Type(String),

    Handle(Handle),
}

impl LdcValue {
    /// Does the constant take two stack slots?
    pub fn is_wide(&self) -> bool {
        matches!(self, LdcValue::Long(_) | LdcValue::Double(_))
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            LdcValue::Int(_) => "int",
            LdcValue::Long(_) => "long",
            LdcValue::Float(_) => "float",
            LdcValue::Double(_) => "double",
            LdcValue::String(_) => "string",
            LdcValue::Type(_) => "type",
            LdcValue::Handle(_) => "handle",
        }
    }
}

/// Method handle: `handle[H_INVOKESTATIC owner.name desc]`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Handle {
    pub kind: HandleKind,
    pub owner: String,
    pub name: String,
    pub desc: String,
}
