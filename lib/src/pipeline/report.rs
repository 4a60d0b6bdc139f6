//! Sanity checks on generated code
//!
//! These do not replace the JVM verifier. They re-read what the generator produced and catch
//! structural mistakes that would otherwise only show up when the class is loaded.

use crate::jvm::bytecode::{decode_code, Insn};
use crate::jvm::class_file::Code;
use crate::jvm::Opcode;
use std::collections::HashSet;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BytecodeProblem {
    /// Code that does not decode (the message says where)
    Undecodable(String),

    /// Branch to an offset that does not start an instruction
    BadBranchTarget { offset: usize, target: i64 },

    /// Exception range or handler that does not start an instruction
    BadExceptionRange { handler: usize },

    /// Local slot at or beyond `max_locals`
    LocalOutOfRange {
        offset: usize,
        slot: u16,
        max_locals: u16,
    },
}

impl fmt::Display for BytecodeProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BytecodeProblem::Undecodable(msg) => write!(f, "undecodable code: {}", msg),
            BytecodeProblem::BadBranchTarget { offset, target } => write!(
                f,
                "branch at offset {} targets {}, which is not an instruction",
                offset, target
            ),
            BytecodeProblem::BadExceptionRange { handler } => {
                write!(f, "exception handler #{} does not line up with instructions", handler)
            }
            BytecodeProblem::LocalOutOfRange {
                offset,
                slot,
                max_locals,
            } => write!(
                f,
                "instruction at offset {} uses local {}, but max_locals is {}",
                offset, slot, max_locals
            ),
        }
    }
}

/// Outcome of checking one generated member
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BytecodeReport {
    /// Name and descriptor of the member
    pub member: String,

    /// Length of the code array (0 for members without code)
    pub code_length: usize,

    pub problems: Vec<BytecodeProblem>,
}

impl BytecodeReport {
    pub fn is_ok(&self) -> bool {
        self.problems.is_empty()
    }

    /// Report for a member without code
    pub fn empty(member: String) -> BytecodeReport {
        BytecodeReport {
            member,
            code_length: 0,
            problems: vec![],
        }
    }

    /// Check a `Code` attribute
    pub fn check(member: String, code: &Code) -> BytecodeReport {
        let bytes = &code.code_array.0;
        let mut report = BytecodeReport::empty(member);
        report.code_length = bytes.len();

        let insns = match decode_code(bytes) {
            Ok(insns) => insns,
            Err(err) => {
                report.problems.push(BytecodeProblem::Undecodable(err.to_string()));
                return report;
            }
        };
        let boundaries: HashSet<usize> = insns.iter().map(|(offset, _)| *offset).collect();
        let is_boundary = |offset: i64| offset >= 0 && boundaries.contains(&(offset as usize));

        for (offset, insn) in &insns {
            let relatives: Vec<i32> = match insn {
                Insn::Branch(_, relative) => vec![*relative],
                Insn::TableSwitch {
                    default, offsets, ..
                } => std::iter::once(default).chain(offsets).copied().collect(),
                Insn::LookupSwitch { default, pairs } => std::iter::once(*default)
                    .chain(pairs.iter().map(|(_, relative)| *relative))
                    .collect(),
                _ => vec![],
            };
            for relative in relatives {
                let target = *offset as i64 + relative as i64;
                if !is_boundary(target) {
                    report.problems.push(BytecodeProblem::BadBranchTarget {
                        offset: *offset,
                        target,
                    });
                }
            }

            let local = match insn {
                Insn::Local(opcode, slot) => {
                    let width = match opcode {
                        Opcode::LLoad | Opcode::LStore | Opcode::DLoad | Opcode::DStore => 2,
                        _ => 1,
                    };
                    Some((*slot, width))
                }
                Insn::Iinc(slot, _) => Some((*slot, 1)),
                _ => None,
            };
            if let Some((slot, width)) = local {
                if slot as u32 + width > code.max_locals as u32 {
                    report.problems.push(BytecodeProblem::LocalOutOfRange {
                        offset: *offset,
                        slot,
                        max_locals: code.max_locals,
                    });
                }
            }
        }

        for (idx, handler) in code.exception_table.iter().enumerate() {
            let start = handler.start_pc.0 as i64;
            let end = handler.end_pc.0 as i64;
            let lines_up = is_boundary(start)
                && (is_boundary(end) || end as usize == bytes.len())
                && start < end
                && is_boundary(handler.handler_pc.0 as i64);
            if !lines_up {
                report
                    .problems
                    .push(BytecodeProblem::BadExceptionRange { handler: idx });
            }
        }

        report
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::{BytecodeArray, BytecodeIndex, ExceptionHandler};

    fn code(bytes: Vec<u8>, max_locals: u16) -> Code {
        Code {
            max_stack: 2,
            max_locals,
            code_array: BytecodeArray(bytes),
            exception_table: vec![],
            attributes: vec![],
        }
    }

    #[test]
    fn well_formed_code() {
        // iload_0; ifeq +6; iinc 0 1; return
        let code = code(vec![0x1a, 0x99, 0x00, 0x06, 0x84, 0x00, 0x01, 0xb1], 1);
        let report = BytecodeReport::check(String::from("m(I)V"), &code);
        assert!(report.is_ok(), "{:?}", report.problems);
        assert_eq!(report.code_length, 8);
    }

    #[test]
    fn problems_are_collected() {
        // lload_1; goto +2 (into the middle of itself); return
        let mut code = code(vec![0x1f, 0xa7, 0x00, 0x02, 0xb1], 2);
        code.exception_table.push(ExceptionHandler {
            start_pc: BytecodeIndex(1),
            end_pc: BytecodeIndex(1),
            handler_pc: BytecodeIndex(4),
            catch_type: None,
        });
        let report = BytecodeReport::check(String::from("m()V"), &code);
        assert_eq!(
            report.problems,
            vec![
                BytecodeProblem::LocalOutOfRange {
                    offset: 0,
                    slot: 1,
                    max_locals: 2
                },
                BytecodeProblem::BadBranchTarget {
                    offset: 1,
                    target: 3
                },
                BytecodeProblem::BadExceptionRange { handler: 0 },
            ]
        );

        let truncated = code_with(vec![0x10]);
        let report = BytecodeReport::check(String::from("m()V"), &truncated);
        assert!(matches!(report.problems[..], [BytecodeProblem::Undecodable(_)]));
    }

    fn code_with(bytes: Vec<u8>) -> Code {
        code(bytes, 0)
    }
}
