use super::VerificationType;
use crate::jvm::class_file::{ClassConstantIndex, StackMapFrame};
use crate::jvm::Opcode;
use crate::util::{OffsetVec, Width};

/// Types of the locals and operand stack at one point in a method
///
/// Locals are laid out by slot, so a `long` or `double` local covers two offsets.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Frame<Cls, U> {
    pub locals: OffsetVec<VerificationType<Cls, U>>,
    pub stack: OffsetVec<VerificationType<Cls, U>>,
}

type ClassValue = VerificationType<ClassConstantIndex, u16>;

fn values(offset_vec: &OffsetVec<ClassValue>) -> Vec<ClassValue> {
    offset_vec.iter().map(|(_, _, value)| *value).collect()
}

impl Frame<ClassConstantIndex, u16> {
    /// Smallest stack map frame encoding this frame, given the frame before it
    pub fn stack_map_frame(&self, offset_delta: u16, previous: &Self) -> StackMapFrame {
        let locals = values(&self.locals);
        let previous_locals = values(&previous.locals);
        let common = locals.len().min(previous_locals.len());
        let same_prefix = locals[..common] == previous_locals[..common];

        match (self.stack.len(), same_prefix) {
            (0, true) if locals.len() == previous_locals.len() => {
                StackMapFrame::Same { offset_delta }
            }
            (0, true) if previous_locals.len() - common <= 3 && locals.len() == common => {
                StackMapFrame::Chop {
                    offset_delta,
                    chopped: (previous_locals.len() - common) as u8,
                }
            }
            (0, true) if locals.len() - common <= 3 && previous_locals.len() == common => {
                StackMapFrame::Append {
                    offset_delta,
                    locals: locals[common..].to_vec(),
                }
            }
            (1, true) if locals.len() == previous_locals.len() => {
                StackMapFrame::SameLocalsOneStack {
                    offset_delta,
                    stack: values(&self.stack)[0],
                }
            }
            _ => self.full_stack_map_frame(offset_delta),
        }
    }

    pub fn full_stack_map_frame(&self, offset_delta: u16) -> StackMapFrame {
        StackMapFrame::Full {
            offset_delta,
            locals: values(&self.locals),
            stack: values(&self.stack),
        }
    }
}

/// Operand stack entry with a placeholder for values that are not there
pub trait StackValue: Width + Clone {
    fn top() -> Self;
}

impl<C: Clone, U: Clone> StackValue for VerificationType<C, U> {
    fn top() -> Self {
        VerificationType::Top
    }
}

/// Pop the top of the stack, or produce `Top` if the stack is empty
pub fn pop_or_top<T: StackValue>(stack: &mut OffsetVec<T>) -> T {
    match stack.pop() {
        Some((_, _, value)) => value,
        None => T::top(),
    }
}

/// Pop values until at least `slots` slots worth have come off, returned bottom first
fn pop_slots<T: StackValue>(stack: &mut OffsetVec<T>, slots: usize) -> Vec<T> {
    let mut popped = vec![];
    let mut width = 0;
    while width < slots {
        let value = pop_or_top(stack);
        width += value.width();
        popped.push(value);
    }
    popped.reverse();
    popped
}

/// Slots an opcode needs on the stack, if it is a stack manipulation
pub fn shuffle_depth(opcode: Opcode) -> Option<usize> {
    match opcode {
        Opcode::Pop | Opcode::Dup => Some(1),
        Opcode::Pop2 | Opcode::Swap | Opcode::DupX1 | Opcode::Dup2 => Some(2),
        Opcode::DupX2 | Opcode::Dup2X1 => Some(3),
        Opcode::Dup2X2 => Some(4),
        _ => None,
    }
}

/// Apply one of the stack manipulation instructions (`pop` through `swap`)
///
/// All the `dup` variants copy the top `n` slots and tuck the copy under the `m` slots beneath
/// them, so which "form" applies falls out of the widths of the values popped. Underflow reads
/// as `Top`. Returns `false` if the opcode is not a stack manipulation.
pub fn shuffle_stack<T: StackValue>(stack: &mut OffsetVec<T>, opcode: Opcode) -> bool {
    let (copied_slots, skipped_slots) = match opcode {
        Opcode::Pop | Opcode::Pop2 => {
            pop_slots(stack, if opcode == Opcode::Pop { 1 } else { 2 });
            return true;
        }
        Opcode::Swap => {
            let top = pop_or_top(stack);
            let below = pop_or_top(stack);
            stack.push(top);
            stack.push(below);
            return true;
        }
        Opcode::Dup => (1, 0),
        Opcode::DupX1 => (1, 1),
        Opcode::DupX2 => (1, 2),
        Opcode::Dup2 => (2, 0),
        Opcode::Dup2X1 => (2, 1),
        Opcode::Dup2X2 => (2, 2),
        _ => return false,
    };

    let copied = pop_slots(stack, copied_slots);
    let skipped = pop_slots(stack, skipped_slots);
    stack.extend(copied.iter().cloned());
    stack.extend(skipped);
    stack.extend(copied);
    true
}

/// Replace every occurrence of a value (eg. once an uninitialized value is initialized)
pub fn replace_all<T: Width + PartialEq>(
    offset_vec: &mut OffsetVec<T>,
    original: &T,
    updated: impl Fn() -> T,
) {
    *offset_vec = std::mem::take(offset_vec)
        .into_iter()
        .map(|(_, _, value)| if value == *original { updated() } else { value })
        .collect();
}
