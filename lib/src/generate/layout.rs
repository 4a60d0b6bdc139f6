//! Place instructions at offsets, resolving labels and widening oversized jumps
//!
//! Most jumps have a signed 16-bit relative offset. Whether a jump fits is only known once every
//! instruction has an offset, but widening a jump moves everything after it. The layout is
//! therefore recomputed until no more jumps need widening:
//!
//!   - `goto` and `jsr` become `goto_w` and `jsr_w`
//!
//!   - a conditional jump becomes the inverted condition jumping over a `goto_w`
//!
//! ```text,ignore,no_run
//!                           ifnot* L1
//!     if* L2                goto_w L2
//! L1: ...         =>    L1: ...
//!     ...                   ...
//! L2: ...               L2: ...
//! ```
//!
//! This terminates because jumps are only ever widened, never narrowed, and the inverted
//! condition in a rewrite always jumps a fixed 8 bytes. Switch padding is recomputed on every
//! pass, so no `nop` padding is needed to keep switches aligned.

use super::{CompileError, CompileErrorKind};
use crate::jvm::bytecode::Insn;
use crate::jvm::{Error, Opcode};
use std::collections::HashMap;
use std::ops::RangeInclusive;

/// Range of relative offsets that `goto`, `jsr`, and `if*` can encode
pub const SIGNED_16BIT_JUMP_RANGE: RangeInclusive<i64> = i16::MIN as i64..=i16::MAX as i64;

/// Size of an `if*` over a `goto_w`
const WIDENED_CONDITIONAL_SIZE: usize = 8;

/// Instruction that may still refer to labels
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Pending {
    /// Definition of a label at the current position
    Label(String),

    /// Instruction with nothing left to resolve
    Ready(Insn),

    Jump {
        opcode: Opcode,
        target: String,
    },

    TableSwitch {
        low: i32,
        high: i32,
        targets: Vec<String>,
        default: String,
    },

    /// Pairs must already be sorted by key
    LookupSwitch {
        pairs: Vec<(i32, String)>,
        default: String,
    },
}

/// Pending instruction, with the source line it was lowered from
#[derive(Clone, Debug)]
pub struct Placed {
    pub pending: Pending,
    pub line: usize,
}

#[derive(Clone, Debug)]
pub struct Layout {
    /// Offset of each item
    pub offsets: Vec<usize>,

    /// Offset of each label (the first definition wins)
    pub labels: HashMap<String, usize>,

    /// Item index and end offset of each widened conditional jump
    ///
    /// The inverted conditional jumps to that end offset, so it is a branch target which did not
    /// exist in the source.
    pub widened_conditionals: Vec<(usize, usize)>,

    pub code: Vec<u8>,
}

impl Layout {
    pub fn label(&self, label: &str, line: usize) -> Result<usize, CompileError> {
        resolve(&self.labels, label, line)
    }
}

/// Lay out and encode the items
///
/// The `short_jump_range` parameter should always be [`SIGNED_16BIT_JUMP_RANGE`]. It is a
/// parameter only so that tests can force widening with small methods.
pub fn lay_out(
    items: &[Placed],
    short_jump_range: &RangeInclusive<i64>,
) -> Result<Layout, CompileError> {
    let mut wide = vec![false; items.len()];

    let (offsets, labels) = loop {
        let (offsets, labels) = place(items, &wide);

        let mut changed = false;
        for (idx, item) in items.iter().enumerate() {
            if let Pending::Jump { target, .. } = &item.pending {
                if wide[idx] {
                    continue;
                }
                let target = resolve(&labels, target, item.line)?;
                let relative = target as i64 - offsets[idx] as i64;
                if !short_jump_range.contains(&relative) {
                    wide[idx] = true;
                    changed = true;
                }
            }
        }

        if !changed {
            break (offsets, labels);
        }
    };

    let mut code = vec![];
    let mut widened_conditionals = vec![];
    for (idx, item) in items.iter().enumerate() {
        let offset = offsets[idx];
        let relative = |label: &str| -> Result<i32, CompileError> {
            let target = resolve(&labels, label, item.line)?;
            Ok((target as i64 - offset as i64) as i32)
        };

        let encoded = match &item.pending {
            Pending::Label(_) => continue,
            Pending::Ready(insn) => vec![insn.clone()],
            Pending::Jump { opcode, target } => {
                let rel = relative(target)?;
                match (wide[idx], opcode.inverted_branch()) {
                    (false, _) => vec![Insn::Branch(*opcode, rel)],
                    (true, Some(inverted)) => {
                        widened_conditionals.push((idx, offset + WIDENED_CONDITIONAL_SIZE));
                        vec![
                            Insn::Branch(inverted, WIDENED_CONDITIONAL_SIZE as i32),
                            Insn::Branch(Opcode::GotoW, rel - 3),
                        ]
                    }
                    (true, None) => vec![Insn::Branch(widened(*opcode), rel)],
                }
            }
            Pending::TableSwitch {
                low,
                high,
                targets,
                default,
            } => vec![Insn::TableSwitch {
                default: relative(default)?,
                low: *low,
                high: *high,
                offsets: targets
                    .iter()
                    .map(|target| relative(target))
                    .collect::<Result<_, _>>()?,
            }],
            Pending::LookupSwitch { pairs, default } => vec![Insn::LookupSwitch {
                default: relative(default)?,
                pairs: pairs
                    .iter()
                    .map(|(key, target)| Ok((*key, relative(target)?)))
                    .collect::<Result<_, CompileError>>()?,
            }],
        };

        for insn in encoded {
            let at = code.len();
            insn.encode(at, &mut code)
                .map_err(|err| CompileError::new(item.line, Error::IoError(err).into()))?;
        }
    }

    Ok(Layout {
        offsets,
        labels,
        widened_conditionals,
        code,
    })
}

/// Compute offsets of all items and labels, given which jumps are wide
fn place(items: &[Placed], wide: &[bool]) -> (Vec<usize>, HashMap<String, usize>) {
    let mut offsets = Vec::with_capacity(items.len());
    let mut labels = HashMap::new();
    let mut offset = 0;

    for (item, wide) in items.iter().zip(wide) {
        offsets.push(offset);
        offset += match &item.pending {
            Pending::Label(name) => {
                labels.entry(name.clone()).or_insert(offset);
                0
            }
            Pending::Ready(insn) => insn.size(offset),
            Pending::Jump { opcode, .. } => match (*wide, *opcode) {
                (_, Opcode::GotoW | Opcode::JsrW) => 5,
                (false, _) => 3,
                (true, Opcode::Goto | Opcode::Jsr) => 5,
                (true, _) => WIDENED_CONDITIONAL_SIZE,
            },
            Pending::TableSwitch { low, high, .. } => Insn::TableSwitch {
                default: 0,
                low: *low,
                high: *high,
                offsets: vec![0; (*high as i64 - *low as i64 + 1).max(0) as usize],
            }
            .size(offset),
            Pending::LookupSwitch { pairs, .. } => Insn::LookupSwitch {
                default: 0,
                pairs: vec![(0, 0); pairs.len()],
            }
            .size(offset),
        };
    }

    (offsets, labels)
}

fn resolve(
    labels: &HashMap<String, usize>,
    label: &str,
    line: usize,
) -> Result<usize, CompileError> {
    labels
        .get(label)
        .copied()
        .ok_or_else(|| CompileError::new(line, CompileErrorKind::UndefinedLabel(label.into())))
}

fn widened(opcode: Opcode) -> Opcode {
    match opcode {
        Opcode::Jsr | Opcode::JsrW => Opcode::JsrW,
        _ => Opcode::GotoW,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::bytecode::decode_code;

    fn at(line: usize, pending: Pending) -> Placed {
        Placed { pending, line }
    }

    fn label(name: &str) -> Pending {
        Pending::Label(String::from(name))
    }

    fn jump(opcode: Opcode, target: &str) -> Pending {
        Pending::Jump {
            opcode,
            target: String::from(target),
        }
    }

    fn nops(n: usize) -> Vec<Placed> {
        (0..n)
            .map(|_| at(0, Pending::Ready(Insn::Plain(Opcode::Nop))))
            .collect()
    }

    #[test]
    fn short_jumps_stay_short() {
        let mut items = vec![at(1, label("A")), at(2, jump(Opcode::IfEq, "B"))];
        items.extend(nops(10));
        items.push(at(3, label("B")));
        items.push(at(4, jump(Opcode::Goto, "A")));

        let layout = lay_out(&items, &SIGNED_16BIT_JUMP_RANGE).unwrap();
        assert_eq!(layout.labels["A"], 0);
        assert_eq!(layout.labels["B"], 13);
        assert_eq!(layout.code.len(), 16);
        assert!(layout.widened_conditionals.is_empty());

        let decoded = decode_code(&layout.code).unwrap();
        assert_eq!(decoded[0], (0, Insn::Branch(Opcode::IfEq, 13)));
        assert_eq!(decoded[11], (13, Insn::Branch(Opcode::Goto, -13)));
    }

    #[test]
    fn oversized_jumps_are_widened() {
        let mut items = vec![at(1, label("A")), at(2, jump(Opcode::IfNull, "B"))];
        items.extend(nops(20));
        items.push(at(3, label("B")));
        items.push(at(4, jump(Opcode::Goto, "A")));

        let layout = lay_out(&items, &(-16..=16)).unwrap();
        assert_eq!(layout.labels["B"], 28);
        assert_eq!(layout.widened_conditionals, vec![(1, 8)]);

        let decoded = decode_code(&layout.code).unwrap();
        assert_eq!(decoded[0], (0, Insn::Branch(Opcode::IfNonNull, 8)));
        assert_eq!(decoded[1], (3, Insn::Branch(Opcode::GotoW, 25)));
        assert_eq!(decoded[22], (28, Insn::Branch(Opcode::GotoW, -28)));
    }

    #[test]
    fn widening_can_cascade() {
        // `goto C` only becomes oversized once the conditional after it is widened
        let mut items = vec![at(1, jump(Opcode::Goto, "C")), at(2, jump(Opcode::IfEq, "B"))];
        items.extend(nops(10));
        items.push(at(3, label("C")));
        items.extend(nops(4));
        items.push(at(4, label("B")));
        items.push(at(5, Pending::Ready(Insn::Plain(Opcode::Return))));

        let layout = lay_out(&items, &(-16..=16)).unwrap();
        assert_eq!(layout.labels["C"], 23);
        assert_eq!(layout.labels["B"], 27);
        assert_eq!(layout.widened_conditionals, vec![(1, 13)]);

        let decoded = decode_code(&layout.code).unwrap();
        assert_eq!(decoded[0], (0, Insn::Branch(Opcode::GotoW, 23)));
    }

    #[test]
    fn switches_are_padded() {
        let items = vec![
            at(1, Pending::Ready(Insn::Plain(Opcode::IConst0))),
            at(
                2,
                Pending::TableSwitch {
                    low: 0,
                    high: 1,
                    targets: vec![String::from("A"), String::from("B")],
                    default: String::from("B"),
                },
            ),
            at(3, label("A")),
            at(4, Pending::Ready(Insn::Plain(Opcode::Return))),
            at(5, label("B")),
            at(6, Pending::Ready(Insn::Plain(Opcode::Return))),
        ];
        let layout = lay_out(&items, &SIGNED_16BIT_JUMP_RANGE).unwrap();
        assert_eq!(layout.labels["A"], 1 + 1 + 2 + 12 + 8);

        let decoded = decode_code(&layout.code).unwrap();
        assert_eq!(
            decoded[1],
            (
                1,
                Insn::TableSwitch {
                    default: 24,
                    low: 0,
                    high: 1,
                    offsets: vec![23, 24],
                }
            )
        );
    }

    #[test]
    fn undefined_labels_are_reported() {
        let items = vec![at(1, label("A")), at(7, jump(Opcode::Goto, "nowhere"))];
        let err = lay_out(&items, &SIGNED_16BIT_JUMP_RANGE).unwrap_err();
        assert_eq!(err.line, 7);
        assert!(matches!(err.kind, CompileErrorKind::UndefinedLabel(ref l) if l == "nowhere"));
    }
}
