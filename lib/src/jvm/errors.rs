use super::Constant;
use std::fmt;

/// Failures in the class file layer
#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// The constant pool ran out of indices
    ConstantPoolOverflow {
        constant: Constant,
        offset: u16,
    },

    /// Class bytes that cannot be understood (bad magic, truncated attribute, etc.)
    MalformedClass(String),

    /// Byte in the code array that is not an opcode we can decode
    UnknownOpcode { offset: usize, opcode: u8 },

    /// Constant pool index which is out of bounds or points at the wrong kind of constant
    BadConstantIndex(u16),

    /// Method body is longer than the 65535 bytes the code attribute allows
    CodeOverflow(usize),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::ConstantPoolOverflow { constant, offset } => {
                write!(f, "constant pool overflow at {} inserting {:?}", offset, constant)
            }
            Error::MalformedClass(msg) => write!(f, "malformed class file: {}", msg),
            Error::UnknownOpcode { offset, opcode } => {
                write!(f, "unknown opcode 0x{:02x} at offset {}", opcode, offset)
            }
            Error::BadConstantIndex(idx) => write!(f, "bad constant pool index #{}", idx),
            Error::CodeOverflow(len) => write!(f, "method code is too long ({} bytes)", len),
        }
    }
}

impl std::error::Error for Error {}
