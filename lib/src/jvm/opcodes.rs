//! Table of JVM opcodes
//!
//! Each opcode is tagged with the [`OperandKind`] describing what follows it in assembly text.
//! Several encodings are "folded": they never appear in assembly, because they are just compact
//! or wide spellings of another instruction (`iload_2` is `iload 2`, `goto_w` is `goto`, and so
//! on). The generator picks those encodings itself and the disassembler folds them back.

/// Shape of the operands an opcode takes in assembly
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum OperandKind {
    /// No operands
    Plain,

    /// Immediate integer (`bipush`, `sipush`)
    Push,

    /// Loadable constant
    Ldc,

    /// Local variable
    Local,

    /// Local variable and increment
    Iinc,

    /// Branch with a single label
    Jump,

    TableSwitch,
    LookupSwitch,

    /// Field reference (`owner.name desc`)
    Field,

    /// Method reference (`owner.name(desc)`)
    Method,

    /// Dynamic call site (`name desc handle[...] args[...]`)
    Indy,

    /// Class or array type
    Type,

    /// Primitive array type
    NewArray,

    /// Array descriptor and dimension count
    MultiArray,

    /// Short or wide encoding of some other instruction
    Folded,

    /// Subroutine instructions, which cannot be verified in modern class files
    Unsupported,
}

macro_rules! opcodes {
    ($($name:ident = $value:literal, $mnemonic:literal, $kind:ident;)*) => {
        /// JVM instruction opcode
        #[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
        pub enum Opcode {
            $($name),*
        }

        impl Opcode {
            /// Byte value in the code array
            pub fn value(&self) -> u8 {
                match self {
                    $(Opcode::$name => $value),*
                }
            }

            /// Lowercase mnemonic, as in `javap` output
            pub fn mnemonic(&self) -> &'static str {
                match self {
                    $(Opcode::$name => $mnemonic),*
                }
            }

            pub fn kind(&self) -> OperandKind {
                match self {
                    $(Opcode::$name => OperandKind::$kind),*
                }
            }

            pub fn from_u8(value: u8) -> Option<Opcode> {
                match value {
                    $($value => Some(Opcode::$name),)*
                    _ => None,
                }
            }

            /// Case-insensitive lookup by mnemonic
            pub fn from_mnemonic(mnemonic: &str) -> Option<Opcode> {
                match mnemonic.to_ascii_lowercase().as_str() {
                    $($mnemonic => Some(Opcode::$name),)*
                    _ => None,
                }
            }
        }
    };
}

opcodes! {
    Nop = 0x00, "nop", Plain;
    AConstNull = 0x01, "aconst_null", Plain;
    IConstM1 = 0x02, "iconst_m1", Plain;
    IConst0 = 0x03, "iconst_0", Plain;
    IConst1 = 0x04, "iconst_1", Plain;
    IConst2 = 0x05, "iconst_2", Plain;
    IConst3 = 0x06, "iconst_3", Plain;
    IConst4 = 0x07, "iconst_4", Plain;
    IConst5 = 0x08, "iconst_5", Plain;
    LConst0 = 0x09, "lconst_0", Plain;
    LConst1 = 0x0a, "lconst_1", Plain;
    FConst0 = 0x0b, "fconst_0", Plain;
    FConst1 = 0x0c, "fconst_1", Plain;
    FConst2 = 0x0d, "fconst_2", Plain;
    DConst0 = 0x0e, "dconst_0", Plain;
    DConst1 = 0x0f, "dconst_1", Plain;
    BiPush = 0x10, "bipush", Push;
    SiPush = 0x11, "sipush", Push;
    Ldc = 0x12, "ldc", Ldc;
    LdcW = 0x13, "ldc_w", Folded;
    Ldc2W = 0x14, "ldc2_w", Folded;
    ILoad = 0x15, "iload", Local;
    LLoad = 0x16, "lload", Local;
    FLoad = 0x17, "fload", Local;
    DLoad = 0x18, "dload", Local;
    ALoad = 0x19, "aload", Local;
    ILoad0 = 0x1a, "iload_0", Folded;
    ILoad1 = 0x1b, "iload_1", Folded;
    ILoad2 = 0x1c, "iload_2", Folded;
    ILoad3 = 0x1d, "iload_3", Folded;
    LLoad0 = 0x1e, "lload_0", Folded;
    LLoad1 = 0x1f, "lload_1", Folded;
    LLoad2 = 0x20, "lload_2", Folded;
    LLoad3 = 0x21, "lload_3", Folded;
    FLoad0 = 0x22, "fload_0", Folded;
    FLoad1 = 0x23, "fload_1", Folded;
    FLoad2 = 0x24, "fload_2", Folded;
    FLoad3 = 0x25, "fload_3", Folded;
    DLoad0 = 0x26, "dload_0", Folded;
    DLoad1 = 0x27, "dload_1", Folded;
    DLoad2 = 0x28, "dload_2", Folded;
    DLoad3 = 0x29, "dload_3", Folded;
    ALoad0 = 0x2a, "aload_0", Folded;
    ALoad1 = 0x2b, "aload_1", Folded;
    ALoad2 = 0x2c, "aload_2", Folded;
    ALoad3 = 0x2d, "aload_3", Folded;
    IALoad = 0x2e, "iaload", Plain;
    LALoad = 0x2f, "laload", Plain;
    FALoad = 0x30, "faload", Plain;
    DALoad = 0x31, "daload", Plain;
    AALoad = 0x32, "aaload", Plain;
    BALoad = 0x33, "baload", Plain;
    CALoad = 0x34, "caload", Plain;
    SALoad = 0x35, "saload", Plain;
    IStore = 0x36, "istore", Local;
    LStore = 0x37, "lstore", Local;
    FStore = 0x38, "fstore", Local;
    DStore = 0x39, "dstore", Local;
    AStore = 0x3a, "astore", Local;
    IStore0 = 0x3b, "istore_0", Folded;
    IStore1 = 0x3c, "istore_1", Folded;
    IStore2 = 0x3d, "istore_2", Folded;
    IStore3 = 0x3e, "istore_3", Folded;
    LStore0 = 0x3f, "lstore_0", Folded;
    LStore1 = 0x40, "lstore_1", Folded;
    LStore2 = 0x41, "lstore_2", Folded;
    LStore3 = 0x42, "lstore_3", Folded;
    FStore0 = 0x43, "fstore_0", Folded;
    FStore1 = 0x44, "fstore_1", Folded;
    FStore2 = 0x45, "fstore_2", Folded;
    FStore3 = 0x46, "fstore_3", Folded;
    DStore0 = 0x47, "dstore_0", Folded;
    DStore1 = 0x48, "dstore_1", Folded;
    DStore2 = 0x49, "dstore_2", Folded;
    DStore3 = 0x4a, "dstore_3", Folded;
    AStore0 = 0x4b, "astore_0", Folded;
    AStore1 = 0x4c, "astore_1", Folded;
    AStore2 = 0x4d, "astore_2", Folded;
    AStore3 = 0x4e, "astore_3", Folded;
    IAStore = 0x4f, "iastore", Plain;
    LAStore = 0x50, "lastore", Plain;
    FAStore = 0x51, "fastore", Plain;
    DAStore = 0x52, "dastore", Plain;
    AAStore = 0x53, "aastore", Plain;
    BAStore = 0x54, "bastore", Plain;
    CAStore = 0x55, "castore", Plain;
    SAStore = 0x56, "sastore", Plain;
    Pop = 0x57, "pop", Plain;
    Pop2 = 0x58, "pop2", Plain;
    Dup = 0x59, "dup", Plain;
    DupX1 = 0x5a, "dup_x1", Plain;
    DupX2 = 0x5b, "dup_x2", Plain;
    Dup2 = 0x5c, "dup2", Plain;
    Dup2X1 = 0x5d, "dup2_x1", Plain;
    Dup2X2 = 0x5e, "dup2_x2", Plain;
    Swap = 0x5f, "swap", Plain;
    IAdd = 0x60, "iadd", Plain;
    LAdd = 0x61, "ladd", Plain;
    FAdd = 0x62, "fadd", Plain;
    DAdd = 0x63, "dadd", Plain;
    ISub = 0x64, "isub", Plain;
    LSub = 0x65, "lsub", Plain;
    FSub = 0x66, "fsub", Plain;
    DSub = 0x67, "dsub", Plain;
    IMul = 0x68, "imul", Plain;
    LMul = 0x69, "lmul", Plain;
    FMul = 0x6a, "fmul", Plain;
    DMul = 0x6b, "dmul", Plain;
    IDiv = 0x6c, "idiv", Plain;
    LDiv = 0x6d, "ldiv", Plain;
    FDiv = 0x6e, "fdiv", Plain;
    DDiv = 0x6f, "ddiv", Plain;
    IRem = 0x70, "irem", Plain;
    LRem = 0x71, "lrem", Plain;
    FRem = 0x72, "frem", Plain;
    DRem = 0x73, "drem", Plain;
    INeg = 0x74, "ineg", Plain;
    LNeg = 0x75, "lneg", Plain;
    FNeg = 0x76, "fneg", Plain;
    DNeg = 0x77, "dneg", Plain;
    IShl = 0x78, "ishl", Plain;
    LShl = 0x79, "lshl", Plain;
    IShr = 0x7a, "ishr", Plain;
    LShr = 0x7b, "lshr", Plain;
    IUShr = 0x7c, "iushr", Plain;
    LUShr = 0x7d, "lushr", Plain;
    IAnd = 0x7e, "iand", Plain;
    LAnd = 0x7f, "land", Plain;
    IOr = 0x80, "ior", Plain;
    LOr = 0x81, "lor", Plain;
    IXor = 0x82, "ixor", Plain;
    LXor = 0x83, "lxor", Plain;
    IInc = 0x84, "iinc", Iinc;
    I2L = 0x85, "i2l", Plain;
    I2F = 0x86, "i2f", Plain;
    I2D = 0x87, "i2d", Plain;
    L2I = 0x88, "l2i", Plain;
    L2F = 0x89, "l2f", Plain;
    L2D = 0x8a, "l2d", Plain;
    F2I = 0x8b, "f2i", Plain;
    F2L = 0x8c, "f2l", Plain;
    F2D = 0x8d, "f2d", Plain;
    D2I = 0x8e, "d2i", Plain;
    D2L = 0x8f, "d2l", Plain;
    D2F = 0x90, "d2f", Plain;
    I2B = 0x91, "i2b", Plain;
    I2C = 0x92, "i2c", Plain;
    I2S = 0x93, "i2s", Plain;
    LCmp = 0x94, "lcmp", Plain;
    FCmpL = 0x95, "fcmpl", Plain;
    FCmpG = 0x96, "fcmpg", Plain;
    DCmpL = 0x97, "dcmpl", Plain;
    DCmpG = 0x98, "dcmpg", Plain;
    IfEq = 0x99, "ifeq", Jump;
    IfNe = 0x9a, "ifne", Jump;
    IfLt = 0x9b, "iflt", Jump;
    IfGe = 0x9c, "ifge", Jump;
    IfGt = 0x9d, "ifgt", Jump;
    IfLe = 0x9e, "ifle", Jump;
    IfICmpEq = 0x9f, "if_icmpeq", Jump;
    IfICmpNe = 0xa0, "if_icmpne", Jump;
    IfICmpLt = 0xa1, "if_icmplt", Jump;
    IfICmpGe = 0xa2, "if_icmpge", Jump;
    IfICmpGt = 0xa3, "if_icmpgt", Jump;
    IfICmpLe = 0xa4, "if_icmple", Jump;
    IfACmpEq = 0xa5, "if_acmpeq", Jump;
    IfACmpNe = 0xa6, "if_acmpne", Jump;
    Goto = 0xa7, "goto", Jump;
    Jsr = 0xa8, "jsr", Unsupported;
    Ret = 0xa9, "ret", Unsupported;
    TableSwitch = 0xaa, "tableswitch", TableSwitch;
    LookupSwitch = 0xab, "lookupswitch", LookupSwitch;
    IReturn = 0xac, "ireturn", Plain;
    LReturn = 0xad, "lreturn", Plain;
    FReturn = 0xae, "freturn", Plain;
    DReturn = 0xaf, "dreturn", Plain;
    AReturn = 0xb0, "areturn", Plain;
    Return = 0xb1, "return", Plain;
    GetStatic = 0xb2, "getstatic", Field;
    PutStatic = 0xb3, "putstatic", Field;
    GetField = 0xb4, "getfield", Field;
    PutField = 0xb5, "putfield", Field;
    InvokeVirtual = 0xb6, "invokevirtual", Method;
    InvokeSpecial = 0xb7, "invokespecial", Method;
    InvokeStatic = 0xb8, "invokestatic", Method;
    InvokeInterface = 0xb9, "invokeinterface", Method;
    InvokeDynamic = 0xba, "invokedynamic", Indy;
    New = 0xbb, "new", Type;
    NewArray = 0xbc, "newarray", NewArray;
    ANewArray = 0xbd, "anewarray", Type;
    ArrayLength = 0xbe, "arraylength", Plain;
    AThrow = 0xbf, "athrow", Plain;
    CheckCast = 0xc0, "checkcast", Type;
    InstanceOf = 0xc1, "instanceof", Type;
    MonitorEnter = 0xc2, "monitorenter", Plain;
    MonitorExit = 0xc3, "monitorexit", Plain;
    Wide = 0xc4, "wide", Folded;
    MultiANewArray = 0xc5, "multianewarray", MultiArray;
    IfNull = 0xc6, "ifnull", Jump;
    IfNonNull = 0xc7, "ifnonnull", Jump;
    GotoW = 0xc8, "goto_w", Folded;
    JsrW = 0xc9, "jsr_w", Unsupported;
}

impl Opcode {
    /// Does control never continue to the next instruction?
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Opcode::Goto
                | Opcode::GotoW
                | Opcode::TableSwitch
                | Opcode::LookupSwitch
                | Opcode::IReturn
                | Opcode::LReturn
                | Opcode::FReturn
                | Opcode::DReturn
                | Opcode::AReturn
                | Opcode::Return
                | Opcode::AThrow
        )
    }

    /// Does the instruction transfer control somewhere other than the next instruction?
    ///
    /// This covers conditional branches, which may also fall through.
    pub fn is_control_transfer(&self) -> bool {
        self.is_terminal() || self.kind() == OperandKind::Jump
    }

    /// Is this a local variable load?
    pub fn is_load(&self) -> bool {
        matches!(
            self,
            Opcode::ILoad | Opcode::LLoad | Opcode::FLoad | Opcode::DLoad | Opcode::ALoad
        )
    }

    /// Conditional branch taken in exactly the cases this one is not
    pub fn inverted_branch(&self) -> Option<Opcode> {
        let inverted = match self {
            Opcode::IfEq => Opcode::IfNe,
            Opcode::IfNe => Opcode::IfEq,
            Opcode::IfLt => Opcode::IfGe,
            Opcode::IfGe => Opcode::IfLt,
            Opcode::IfGt => Opcode::IfLe,
            Opcode::IfLe => Opcode::IfGt,
            Opcode::IfICmpEq => Opcode::IfICmpNe,
            Opcode::IfICmpNe => Opcode::IfICmpEq,
            Opcode::IfICmpLt => Opcode::IfICmpGe,
            Opcode::IfICmpGe => Opcode::IfICmpLt,
            Opcode::IfICmpGt => Opcode::IfICmpLe,
            Opcode::IfICmpLe => Opcode::IfICmpGt,
            Opcode::IfACmpEq => Opcode::IfACmpNe,
            Opcode::IfACmpNe => Opcode::IfACmpEq,
            Opcode::IfNull => Opcode::IfNonNull,
            Opcode::IfNonNull => Opcode::IfNull,
            _ => return None,
        };
        Some(inverted)
    }

    /// For the compact local variable forms (`iload_0` through `astore_3`), the general opcode
    /// and the slot it implies
    pub fn unfold_local(&self) -> Option<(Opcode, u16)> {
        let value = self.value();
        let (general, first) = match value {
            0x1a..=0x1d => (Opcode::ILoad, 0x1a),
            0x1e..=0x21 => (Opcode::LLoad, 0x1e),
            0x22..=0x25 => (Opcode::FLoad, 0x22),
            0x26..=0x29 => (Opcode::DLoad, 0x26),
            0x2a..=0x2d => (Opcode::ALoad, 0x2a),
            0x3b..=0x3e => (Opcode::IStore, 0x3b),
            0x3f..=0x42 => (Opcode::LStore, 0x3f),
            0x43..=0x46 => (Opcode::FStore, 0x43),
            0x47..=0x4a => (Opcode::DStore, 0x47),
            0x4b..=0x4e => (Opcode::AStore, 0x4b),
            _ => return None,
        };
        Some((general, (value - first) as u16))
    }

    /// Inverse of [`Opcode::unfold_local`]
    pub fn fold_local(&self, slot: u16) -> Option<Opcode> {
        let first: u8 = match self {
            Opcode::ILoad => 0x1a,
            Opcode::LLoad => 0x1e,
            Opcode::FLoad => 0x22,
            Opcode::DLoad => 0x26,
            Opcode::ALoad => 0x2a,
            Opcode::IStore => 0x3b,
            Opcode::LStore => 0x3f,
            Opcode::FStore => 0x43,
            Opcode::DStore => 0x47,
            Opcode::AStore => 0x4b,
            _ => return None,
        };
        if slot < 4 {
            Opcode::from_u8(first + slot as u8)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn byte_values_round_trip() {
        for value in 0x00..=0xc9u8 {
            let opcode = Opcode::from_u8(value).unwrap();
            assert_eq!(opcode.value(), value);
            assert_eq!(Opcode::from_mnemonic(opcode.mnemonic()), Some(opcode));
        }
        assert_eq!(Opcode::from_u8(0xca), None);
    }

    #[test]
    fn mnemonics_are_case_insensitive() {
        assert_eq!(Opcode::from_mnemonic("INVOKESTATIC"), Some(Opcode::InvokeStatic));
        assert_eq!(Opcode::from_mnemonic("Goto"), Some(Opcode::Goto));
        assert_eq!(Opcode::from_mnemonic("gotox"), None);
    }

    #[test]
    fn folding_locals() {
        assert_eq!(Opcode::ALoad0.unfold_local(), Some((Opcode::ALoad, 0)));
        assert_eq!(Opcode::DStore3.unfold_local(), Some((Opcode::DStore, 3)));
        assert_eq!(Opcode::ILoad.fold_local(2), Some(Opcode::ILoad2));
        assert_eq!(Opcode::ILoad.fold_local(4), None);
        assert_eq!(Opcode::Nop.unfold_local(), None);
    }

    #[test]
    fn branches() {
        assert_eq!(Opcode::IfNull.inverted_branch(), Some(Opcode::IfNonNull));
        assert_eq!(Opcode::Goto.inverted_branch(), None);
        assert!(Opcode::IfEq.is_control_transfer());
        assert!(!Opcode::IfEq.is_terminal());
        assert!(Opcode::AThrow.is_terminal());
    }
}
