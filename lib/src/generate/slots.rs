use super::{CompileError, CompileErrorKind};
use crate::ast::{Code, Instruction, MethodDefinition};
use crate::jvm::{FieldType, Opcode, ParseDescriptor};
use crate::util::Width;
use std::collections::HashMap;

/// Named local variable, placed in a slot
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub slot: u16,

    /// Slots taken (2 for `long` and `double`)
    pub width: u16,

    /// Descriptor recorded in the local variable table (`None` for return addresses)
    pub desc: Option<String>,
}

/// Assignment of variable names to local slots
///
/// Slots go to `this`, then to parameters in declaration order, then to every other name in the
/// order of its first use. A name gets the widest width it is ever used with.
#[derive(Clone, Debug, Default)]
pub struct Slots {
    variables: Vec<Variable>,
    by_name: HashMap<String, usize>,
    max_locals: u16,
}

impl Slots {
    pub fn allocate(
        owner: &str,
        method: &MethodDefinition,
        code: Option<&Code>,
    ) -> Result<Slots, CompileError> {
        let mut slots = Slots::default();
        let mut next_slot: usize = 0;
        let mut place = |slots: &mut Slots,
                         name: &str,
                         width: u16,
                         desc: Option<String>,
                         line: usize|
         -> Result<(), CompileError> {
            let slot = u16::try_from(next_slot)
                .ok()
                .filter(|slot| slot.checked_add(width).is_some())
                .ok_or_else(|| {
                    CompileError::new(
                        line,
                        CompileErrorKind::IllegalOperand(String::from("too many local variables")),
                    )
                })?;
            next_slot += width as usize;
            slots.by_name.entry(String::from(name)).or_insert(slots.variables.len());
            slots.variables.push(Variable {
                name: String::from(name),
                slot,
                width,
                desc,
            });
            Ok(())
        };

        if !method.is_static() {
            place(&mut slots, "this", 1, Some(format!("L{};", owner)), method.line)?;
        }
        for parameter in &method.parameters {
            let field_type = FieldType::parse(&parameter.desc).map_err(|_| {
                CompileError::new(
                    method.line,
                    CompileErrorKind::IllegalDescriptor(parameter.desc.clone()),
                )
            })?;
            let width = field_type.width() as u16;
            place(
                &mut slots,
                &parameter.name,
                width,
                Some(parameter.desc.clone()),
                method.line,
            )?;
        }

        // Widest use of every other name, in order of first use
        let mut uses: Vec<(String, Use)> = vec![];
        let instructions = code.into_iter().flat_map(Code::instructions);
        for (line, insn) in instructions {
            let usage = match Use::of(insn, line) {
                Some(usage) => usage,
                None => continue,
            };
            let name = insn.variable().unwrap_or_default();

            if let Some(&idx) = slots.by_name.get(name) {
                if usage.width > slots.variables[idx].width {
                    return Err(CompileError::new(
                        line,
                        CompileErrorKind::WideSlotCollision(String::from(name)),
                    ));
                }
                continue;
            }
            match uses.iter_mut().find(|(seen, _)| seen == name) {
                Some((_, widest)) if usage.width > widest.width => *widest = usage,
                Some(_) => (),
                None => uses.push((String::from(name), usage)),
            }
        }
        for (name, usage) in uses {
            place(&mut slots, &name, usage.width, usage.desc, usage.line)?;
        }

        slots.max_locals = next_slot as u16;
        Ok(slots)
    }

    pub fn slot(&self, name: &str) -> Option<u16> {
        self.by_name
            .get(name)
            .map(|&idx| self.variables[idx].slot)
    }

    /// Variables in slot order
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Variable that starts at the given slot
    pub fn starting_at(&self, slot: u16) -> Option<&Variable> {
        self.variables
            .binary_search_by_key(&slot, |variable| variable.slot)
            .ok()
            .map(|idx| &self.variables[idx])
    }

    pub fn max_locals(&self) -> u16 {
        self.max_locals
    }
}

/// How an instruction uses a local
struct Use {
    width: u16,
    desc: Option<String>,
    line: usize,
}

impl Use {
    fn of(insn: &Instruction, line: usize) -> Option<Use> {
        let (width, desc) = match insn {
            Instruction::Iinc { .. } => (1, Some("I")),
            Instruction::Var { opcode, .. } => match opcode {
                Opcode::ILoad | Opcode::IStore => (1, Some("I")),
                Opcode::FLoad | Opcode::FStore => (1, Some("F")),
                Opcode::ALoad | Opcode::AStore => (1, Some("Ljava/lang/Object;")),
                Opcode::LLoad | Opcode::LStore => (2, Some("J")),
                Opcode::DLoad | Opcode::DStore => (2, Some("D")),
                _ => (1, None),
            },
            _ => return None,
        };
        Some(Use {
            width,
            desc: desc.map(String::from),
            line,
        })
    }
}
