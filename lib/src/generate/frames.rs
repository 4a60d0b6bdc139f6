//! Stack map frames from the frames the analyzer computes
//!
//! The analyzer keys locals by name and tags uninitialized objects with instruction indices.
//! Frames in the class file lay locals out by slot and tag uninitialized objects with the offset
//! of their `new`, so every frame is translated using the slot assignment and the final layout.

use super::layout::Layout;
use super::slots::Slots;
use super::CompileErrorKind;
use crate::analysis::{self, Analysis, Value};
use crate::jvm::class_file::{ClassConstantIndex, ConstantsPool, StackMapFrame, StackMapTable};
use crate::jvm::verifier::{Frame, VerificationType};
use crate::util::{OffsetVec, Width};
use std::collections::BTreeMap;

type ClassFrame = Frame<ClassConstantIndex, u16>;
type ClassValue = VerificationType<ClassConstantIndex, u16>;

pub struct FrameBuilder<'a> {
    pub analysis: &'a Analysis,
    pub slots: &'a Slots,
    pub layout: &'a Layout,

    /// Item index in the layout of each code entry that was kept
    pub entry_items: &'a [Option<usize>],

    /// Code entry of each item in the layout
    pub item_entries: &'a [usize],
}

impl FrameBuilder<'_> {
    /// Build the stack map table (`None` if no frames are needed)
    pub fn stack_map_table(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<Option<StackMapTable>, CompileErrorKind> {
        let code_length = self.layout.code.len();
        let mut frames: BTreeMap<usize, &analysis::Frame> = BTreeMap::new();

        // Targets of inverted conditionals introduced by jump widening
        for (item, offset) in &self.layout.widened_conditionals {
            let frame = self
                .analysis
                .instruction_index(self.item_entries[*item])
                .and_then(|idx| self.analysis.frames[idx].as_ref());
            if let Some(frame) = frame {
                frames.insert(*offset, frame);
            }
        }

        let targets_entry = self
            .analysis
            .blocks
            .iter()
            .any(|block| block.edges.iter().any(|edge| edge.to == 0));
        for (block_idx, block) in self.analysis.blocks.iter().enumerate() {
            let frame = match &block.entry_frame {
                Some(frame) => frame,
                None => continue,
            };
            if block_idx == 0 && !targets_entry {
                continue;
            }
            if let Some(offset) = self.instruction_offset(block.start()) {
                frames.insert(offset, frame);
            }
        }

        let initial = match self.analysis.blocks.first().and_then(|b| b.entry_frame.as_ref()) {
            Some(initial) => self.class_frame(initial, constants)?,
            None => return Ok(None),
        };

        let mut previous_frame = initial;
        let mut previous_offset: Option<usize> = None;
        let mut stack_map_frames: Vec<StackMapFrame> = vec![];
        for (offset, frame) in frames {
            if offset >= code_length {
                continue;
            }
            let offset_delta = match previous_offset {
                None => offset,
                Some(previous) => offset - previous - 1,
            };
            let frame = self.class_frame(frame, constants)?;
            stack_map_frames.push(frame.stack_map_frame(offset_delta as u16, &previous_frame));
            previous_frame = frame;
            previous_offset = Some(offset);
        }

        if stack_map_frames.is_empty() {
            Ok(None)
        } else {
            Ok(Some(StackMapTable(stack_map_frames)))
        }
    }

    /// Offset in the code of an instruction (`None` if it was dropped)
    fn instruction_offset(&self, instruction: usize) -> Option<usize> {
        let entry = *self.analysis.instructions.get(instruction)?;
        let item = self.entry_items[entry]?;
        Some(self.layout.offsets[item])
    }

    /// Translate a frame to the class file representation
    ///
    /// Locals without a usable type become `Top`, and trailing `Top`s are dropped.
    fn class_frame(
        &self,
        frame: &analysis::Frame,
        constants: &mut ConstantsPool,
    ) -> Result<ClassFrame, CompileErrorKind> {
        let mut locals = OffsetVec::new();
        let mut slot: usize = 0;
        while slot < self.slots.max_locals() as usize {
            let value = self
                .slots
                .starting_at(slot as u16)
                .and_then(|variable| frame.local(&variable.name))
                .filter(|value| **value != VerificationType::Top);
            match value {
                Some(value) => {
                    slot += value.width();
                    locals.push(self.class_value(value, constants)?);
                }
                None => {
                    slot += 1;
                    locals.push(VerificationType::Top);
                }
            }
        }
        while locals.last() == Some(&VerificationType::Top) {
            locals.pop();
        }

        let mut stack = OffsetVec::new();
        for (_, _, entry) in frame.stack.iter() {
            stack.push(self.class_value(&entry.value, constants)?);
        }

        Ok(Frame { locals, stack })
    }

    fn class_value(
        &self,
        value: &Value,
        constants: &mut ConstantsPool,
    ) -> Result<ClassValue, CompileErrorKind> {
        use VerificationType::*;
        Ok(match value {
            Object(class) => Object(constants.get_class(class)?),
            Uninitialized(instruction) => {
                let offset = self.instruction_offset(*instruction).ok_or_else(|| {
                    CompileErrorKind::IllegalOperand(String::from(
                        "uninitialized object created by unreachable code",
                    ))
                })?;
                Uninitialized(offset as u16)
            }
            Top => Top,
            Integer => Integer,
            Float => Float,
            Long => Long,
            Double => Double,
            Null => Null,
            UninitializedThis => UninitializedThis,
        })
    }
}
