//! Control flow analysis of a method body
//!
//! The analysis works over the _instructions_ of a [`Code`] body: labels, instructions, and
//! expressions. Everything else (line numbers, try-catch declarations, annotations, unparsed
//! text) is metadata and gets no frame.
//!
//! Instructions are split into basic blocks. A block starts at:
//!
//!   - the first instruction
//!   - a label that a jump or switch targets, or that handles exceptions
//!   - the instruction after a jump, switch, return, or `athrow`
//!
//! Blocks are connected with [`Edge`]s and then frames are propagated through the graph with a
//! worklist, so that every reachable instruction knows the types of the locals and of the stack
//! after it executes. Unreachable instructions get no frame.
//!
//! Alongside its type, each entry may carry a [`Known`] value: constants are folded through
//! arithmetic and conversions, and arrays of a known length remember the elements stored into
//! them. Merging paths that disagree forgets the value.
//!
//! Nothing here assumes the body is complete or correct: a method without a return, labels that
//! are never placed, and stack underflows all still produce a result. That makes the analysis
//! usable on code that is still being written. Frames where something did go wrong carry a
//! [`Frame::problem`] describing it.

mod transfer;

pub use transfer::{constant_type, constant_value, field_value};

use crate::ast::{Code, CodeItem, Instruction, TryCatch, Unit};
use crate::jvm::verifier::{StackValue, VerificationType};
use crate::util::{OffsetVec, Width};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Range;

/// Type of a value in a local or on the stack
///
/// Object types use the name that would go in a `CONSTANT_Class_info`. Uninitialized objects
/// are tagged with the index of the `new` instruction that created them.
pub type Value = VerificationType<String, usize>;

/// Value an entry is known to hold
///
/// Floating point values compare by their bits, so `NaN` is equal to itself.
#[derive(Clone, Debug)]
pub enum Known {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),

    /// Array created by the instruction at index `origin`
    ///
    /// The length is fixed at creation; elements are `None` until something known is stored.
    Array {
        origin: usize,
        elements: Vec<Option<Known>>,
    },
}

impl PartialEq for Known {
    fn eq(&self, other: &Known) -> bool {
        use Known::*;

        match (self, other) {
            (Int(a), Int(b)) => a == b,
            (Long(a), Long(b)) => a == b,
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Double(a), Double(b)) => a.to_bits() == b.to_bits(),
            (String(a), String(b)) => a == b,
            (
                Array {
                    origin: a,
                    elements: a_elements,
                },
                Array {
                    origin: b,
                    elements: b_elements,
                },
            ) => a == b && a_elements == b_elements,
            _ => false,
        }
    }
}

impl Eq for Known {}

/// Local variable or operand stack entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub value: Value,
    pub known: Option<Known>,
}

impl Entry {
    pub fn new(value: Value) -> Entry {
        Entry { value, known: None }
    }

    pub fn known(value: Value, known: Known) -> Entry {
        Entry {
            value,
            known: Some(known),
        }
    }
}

impl From<Value> for Entry {
    fn from(value: Value) -> Entry {
        Entry::new(value)
    }
}

impl Width for Entry {
    fn width(&self) -> usize {
        self.value.width()
    }
}

impl StackValue for Entry {
    fn top() -> Entry {
        Entry::new(VerificationType::Top)
    }
}

/// Locals (by variable name) and stack, after some instruction has executed
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct Frame {
    pub locals: BTreeMap<String, Entry>,
    pub stack: OffsetVec<Entry>,

    /// First thing that went wrong on the way to this frame (eg. a stack underflow)
    ///
    /// The types in a frame with a problem are a best guess.
    pub problem: Option<String>,
}

impl Frame {
    /// Type on top of the stack
    pub fn peek(&self) -> Option<&Value> {
        self.stack.last().map(|entry| &entry.value)
    }

    /// Known value on top of the stack
    pub fn peek_known(&self) -> Option<&Known> {
        self.stack.last().and_then(|entry| entry.known.as_ref())
    }

    /// Type of a local variable
    pub fn local(&self, name: &str) -> Option<&Value> {
        self.locals.get(name).map(|entry| &entry.value)
    }

    /// Known value of a local variable
    pub fn local_known(&self, name: &str) -> Option<&Known> {
        self.locals.get(name).and_then(|entry| entry.known.as_ref())
    }

    /// Record a problem, unless an earlier one is already recorded
    pub fn note_problem(&mut self, problem: impl Into<String>) {
        if self.problem.is_none() {
            self.problem = Some(problem.into());
        }
    }

    /// Stack depth in slots (`long` and `double` count twice)
    pub fn stack_depth(&self) -> usize {
        self.stack.offset_len().0
    }
}

/// How frames meeting at the start of a block are combined
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MergeMode {
    /// Best effort, as used while editing
    ///
    /// Locals are the union of all incoming bindings, with the first binding of a name winning.
    /// The first known stack wins.
    Union,

    /// Frames that hold at the start of the block regardless of the path taken
    ///
    /// Locals bound to different types on different paths become unusable (or
    /// `java/lang/Object`, if they are all references). This is what stack map frames need.
    Verifier,
}

impl Default for MergeMode {
    fn default() -> Self {
        MergeMode::Union
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    Fallthrough,
    Jump,
    SwitchCase,
    SwitchDefault,
    ExceptionHandler,
}

/// Control flow from the end of one block (or anywhere inside it, for handlers) to another
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Edge {
    /// Index of the source block
    pub from: usize,

    /// Index of the target block
    pub to: usize,

    pub kind: EdgeKind,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    /// Range of instruction indices in the block
    pub range: Range<usize>,

    /// Frame on entry to the block (`None` if the block is unreachable)
    pub entry_frame: Option<Frame>,

    /// Outgoing edges: exception handlers first, then branches, then fallthrough
    pub edges: Vec<Edge>,
}

impl Block {
    pub fn start(&self) -> usize {
        self.range.start
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    pub fn is_reachable(&self) -> bool {
        self.entry_frame.is_some()
    }
}

/// Result of analyzing a method body
#[derive(Clone, Debug, PartialEq)]
pub struct Analysis {
    /// For each instruction, the index of its entry in [`Code::entries`]
    pub instructions: Vec<usize>,

    /// For each instruction, the frame after it executes (`None` when unreachable)
    pub frames: Vec<Option<Frame>>,

    pub blocks: Vec<Block>,
}

impl Analysis {
    /// Index of the block containing an instruction
    pub fn block_index(&self, instruction: usize) -> Option<usize> {
        let idx = self
            .blocks
            .partition_point(|block| block.range.end <= instruction);
        if idx < self.blocks.len() && self.blocks[idx].range.contains(&instruction) {
            Some(idx)
        } else {
            None
        }
    }

    /// Block containing an instruction
    pub fn block(&self, instruction: usize) -> Option<&Block> {
        self.block_index(instruction).map(|idx| &self.blocks[idx])
    }

    /// Entry indices of the instructions in a block
    pub fn block_instructions(&self, block: &Block) -> &[usize] {
        &self.instructions[block.range.clone()]
    }

    /// Frames of the instructions in a block
    pub fn block_frames(&self, block: &Block) -> &[Option<Frame>] {
        &self.frames[block.range.clone()]
    }

    /// Instruction index of the entry (if the entry is an instruction)
    pub fn instruction_index(&self, entry: usize) -> Option<usize> {
        self.instructions.binary_search(&entry).ok()
    }

    /// Deepest the stack gets anywhere, in slots
    pub fn max_stack(&self) -> usize {
        let entries = self.blocks.iter().filter_map(|block| block.entry_frame.as_ref());
        entries
            .chain(self.frames.iter().flatten())
            .map(Frame::stack_depth)
            .max()
            .unwrap_or(0)
    }
}

/// Unit that cannot be analyzed at all
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// Fields have no code to analyze
    NotAMethod,

    /// Method unit without a code body
    MissingCode,
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisError::NotAMethod => f.write_str("only method definitions can be analyzed"),
            AnalysisError::MissingCode => f.write_str("method has no code to analyze"),
        }
    }
}

impl std::error::Error for AnalysisError {}

/// Control flow analyzer for one method unit
pub struct Analyzer<'a> {
    /// Internal name of the class declaring the method (the type of `this`)
    owner: &'a str,
    unit: &'a Unit,
    merge_mode: MergeMode,
}

impl<'a> Analyzer<'a> {
    pub fn new(owner: &'a str, unit: &'a Unit) -> Analyzer<'a> {
        Analyzer {
            owner,
            unit,
            merge_mode: MergeMode::default(),
        }
    }

    pub fn merge_mode(mut self, merge_mode: MergeMode) -> Analyzer<'a> {
        self.merge_mode = merge_mode;
        self
    }

    pub fn analyze(&self) -> Result<Analysis, AnalysisError> {
        let method = self.unit.method().ok_or(AnalysisError::NotAMethod)?;
        let code = self.unit.code.as_ref().ok_or(AnalysisError::MissingCode)?;

        let instructions: Vec<usize> = code
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.item.is_instruction_like())
            .map(|(idx, _)| idx)
            .collect();
        let graph = FlowGraph::new(code, &instructions);

        let mut initial = Frame::default();
        if !method.is_static() {
            let this = if method.name == "<init>" {
                VerificationType::UninitializedThis
            } else {
                VerificationType::Object(String::from(self.owner))
            };
            initial.locals.insert(String::from("this"), Entry::new(this));
        }
        for parameter in &method.parameters {
            initial
                .locals
                .insert(parameter.name.clone(), Entry::new(field_value(&parameter.desc)));
        }

        let mut blocks = graph.blocks;
        let mut frames: Vec<Option<Frame>> = vec![None; instructions.len()];
        if let Some(first) = blocks.first_mut() {
            first.entry_frame = Some(initial);
        }

        let mut worklist = if blocks.is_empty() { vec![] } else { vec![0] };
        while let Some(block_idx) = worklist.pop() {
            let block = &blocks[block_idx];
            let range = block.range.clone();
            let edges = block.edges.clone();
            let mut frame = match &block.entry_frame {
                Some(frame) => frame.clone(),
                None => continue,
            };

            // Frames before each instruction, which is what handlers covering it see
            let mut before = Vec::with_capacity(range.len());
            for idx in range.clone() {
                before.push(frame.clone());
                if let CodeItem::Instruction(insn) = &code.entries[instructions[idx]].item {
                    frame.execute(insn, idx, self.owner);
                }
                frames[idx] = Some(frame.clone());
            }

            for edge in edges {
                let incoming: Vec<Frame> = match edge.kind {
                    EdgeKind::ExceptionHandler => {
                        let handler = match graph.handlers.get(&(block_idx, edge.to)) {
                            Some(handler) => handler,
                            None => continue,
                        };
                        let caught = handler
                            .catch_type
                            .clone()
                            .unwrap_or_else(|| String::from("java/lang/Throwable"));
                        handler
                            .covered(&range)
                            .map(|idx| {
                                let covered = &before[idx - range.start];
                                let mut stack = OffsetVec::new();
                                stack.push(Entry::new(VerificationType::Object(caught.clone())));
                                Frame {
                                    locals: covered.locals.clone(),
                                    stack,
                                    problem: covered.problem.clone(),
                                }
                            })
                            .collect()
                    }
                    _ => vec![frame.clone()],
                };

                let mut changed = false;
                for incoming in incoming {
                    changed |=
                        merge_into(&mut blocks[edge.to].entry_frame, incoming, self.merge_mode);
                }
                if changed && !worklist.contains(&edge.to) {
                    worklist.push(edge.to);
                }
            }
        }

        Ok(Analysis {
            instructions,
            frames,
            blocks,
        })
    }
}

/// Blocks and edges, before any frames are known
struct FlowGraph {
    blocks: Vec<Block>,

    /// Details of each handler edge, keyed by source and target block
    handlers: HashMap<(usize, usize), HandlerEdge>,
}

/// Try ranges behind an exception handler edge
#[derive(Default)]
struct HandlerEdge {
    /// First caught type among the ranges (`None` if they all catch everything)
    catch_type: Option<String>,

    /// Instruction ranges covered by the handler
    ranges: Vec<Range<usize>>,
}

impl HandlerEdge {
    /// Instructions of a block that the handler covers
    fn covered<'a>(&'a self, block: &'a Range<usize>) -> impl Iterator<Item = usize> + 'a {
        self.ranges
            .iter()
            .flat_map(move |range| range.start.max(block.start)..range.end.min(block.end))
    }
}

impl FlowGraph {
    fn new(code: &Code, instructions: &[usize]) -> FlowGraph {
        let item = |idx: usize| &code.entries[instructions[idx]].item;

        let mut labels: HashMap<&str, usize> = HashMap::new();
        for idx in 0..instructions.len() {
            if let CodeItem::Label(name) = item(idx) {
                labels.entry(name.as_str()).or_insert(idx);
            }
        }
        let try_catches: Vec<&TryCatch> = code.try_catches().map(|(_, tc)| tc).collect();

        // Split into blocks
        let mut starts = vec![false; instructions.len()];
        if let Some(first) = starts.first_mut() {
            *first = true;
        }
        for idx in 0..instructions.len() {
            if let CodeItem::Instruction(insn) = item(idx) {
                for target in branch_targets(insn) {
                    if let Some(&target) = labels.get(target) {
                        starts[target] = true;
                    }
                }
                if ends_block(insn) && idx + 1 < instructions.len() {
                    starts[idx + 1] = true;
                }
            }
        }
        for try_catch in &try_catches {
            if let Some(&handler) = labels.get(try_catch.handler.as_str()) {
                starts[handler] = true;
            }
        }

        let mut blocks: Vec<Block> = vec![];
        for idx in 0..instructions.len() {
            if starts[idx] {
                blocks.push(Block {
                    range: idx..idx + 1,
                    entry_frame: None,
                    edges: vec![],
                });
            } else if let Some(block) = blocks.last_mut() {
                block.range.end = idx + 1;
            }
        }

        let block_starting_at = |instruction: usize| {
            blocks
                .iter()
                .position(|block| block.range.start == instruction)
        };

        // Connect blocks
        let mut handlers: HashMap<(usize, usize), HandlerEdge> = HashMap::new();
        let mut all_edges = vec![];
        for (block_idx, block) in blocks.iter().enumerate() {
            let mut edges: Vec<Edge> = vec![];
            let add_edge = |to: Option<usize>, kind: EdgeKind, edges: &mut Vec<Edge>| {
                if let Some(to) = to {
                    let edge = Edge {
                        from: block_idx,
                        to,
                        kind,
                    };
                    if !edges.contains(&edge) {
                        edges.push(edge);
                    }
                }
            };

            for try_catch in &try_catches {
                let range = match (
                    labels.get(try_catch.start.as_str()),
                    labels.get(try_catch.end.as_str()),
                ) {
                    (Some(&start), Some(&end)) => start..end,
                    _ => continue,
                };
                let covered = block.range.start < range.end && range.start < block.range.end;
                if !covered {
                    continue;
                }
                let handler = labels
                    .get(try_catch.handler.as_str())
                    .and_then(|&handler| block_starting_at(handler));
                if let Some(handler) = handler {
                    let details = handlers.entry((block_idx, handler)).or_default();
                    if details.catch_type.is_none() {
                        details.catch_type = try_catch.catch_type.clone();
                    }
                    details.ranges.push(range);
                    add_edge(Some(handler), EdgeKind::ExceptionHandler, &mut edges);
                }
            }

            let last = block.range.end - 1;
            let mut falls_through = true;
            if let CodeItem::Instruction(insn) = item(last) {
                let target = |label: &str| labels.get(label).and_then(|&t| block_starting_at(t));
                match insn {
                    Instruction::Jump { target: label, .. } => {
                        add_edge(target(label), EdgeKind::Jump, &mut edges);
                    }
                    Instruction::TableSwitch {
                        labels: cases,
                        default,
                        ..
                    } => {
                        for case in cases {
                            add_edge(target(case), EdgeKind::SwitchCase, &mut edges);
                        }
                        add_edge(target(default), EdgeKind::SwitchDefault, &mut edges);
                    }
                    Instruction::LookupSwitch { mapping, default } => {
                        for (_, case) in mapping {
                            add_edge(target(case), EdgeKind::SwitchCase, &mut edges);
                        }
                        add_edge(target(default), EdgeKind::SwitchDefault, &mut edges);
                    }
                    _ => (),
                }
                falls_through = !insn.opcode().is_terminal();
            }
            if falls_through && block_idx + 1 < blocks.len() {
                add_edge(Some(block_idx + 1), EdgeKind::Fallthrough, &mut edges);
            }
            all_edges.push(edges);
        }

        for (block, edges) in blocks.iter_mut().zip(all_edges) {
            block.edges = edges;
        }

        FlowGraph { blocks, handlers }
    }
}

fn branch_targets(insn: &Instruction) -> Vec<&str> {
    match insn {
        Instruction::Jump { .. }
        | Instruction::TableSwitch { .. }
        | Instruction::LookupSwitch { .. } => insn.label_references(),
        _ => vec![],
    }
}

fn ends_block(insn: &Instruction) -> bool {
    insn.opcode().is_control_transfer()
}

/// Merge an incoming frame into the entry frame of a block, returning whether it changed
fn merge_into(target: &mut Option<Frame>, incoming: Frame, mode: MergeMode) -> bool {
    let existing = match target {
        None => {
            *target = Some(incoming);
            return true;
        }
        Some(existing) => existing,
    };
    let before = existing.clone();

    if existing.problem.is_none() {
        existing.problem = incoming.problem.clone();
    }
    let heights = (existing.stack.len(), incoming.stack.len());
    if heights.0 != heights.1 {
        existing.note_problem(format!(
            "stack heights differ where paths meet ({} and {})",
            heights.0, heights.1
        ));
    }

    match mode {
        MergeMode::Union => {
            for (name, entry) in incoming.locals {
                match existing.locals.get_mut(&name) {
                    Some(ours) => ours.known = merge_known(&ours.known, &entry.known),
                    None => {
                        existing.locals.insert(name, entry);
                    }
                }
            }
            if heights.0 == heights.1 {
                existing.stack = existing
                    .stack
                    .iter()
                    .zip(incoming.stack.iter())
                    .map(|((_, _, ours), (_, _, theirs))| Entry {
                        value: ours.value.clone(),
                        known: merge_known(&ours.known, &theirs.known),
                    })
                    .collect();
            }
        }

        MergeMode::Verifier => {
            let mut merged_locals = BTreeMap::new();
            for (name, entry) in &existing.locals {
                if let Some(other) = incoming.locals.get(name) {
                    let merged = merge_entries(entry, other);
                    if merged.value != VerificationType::Top {
                        merged_locals.insert(name.clone(), merged);
                    }
                }
            }
            existing.locals = merged_locals;

            if heights.0 == heights.1 {
                existing.stack = existing
                    .stack
                    .iter()
                    .zip(incoming.stack.iter())
                    .map(|((_, _, ours), (_, _, theirs))| merge_entries(ours, theirs))
                    .collect();
            }
        }
    }

    *existing != before
}

fn merge_entries(ours: &Entry, theirs: &Entry) -> Entry {
    let value = merge_values(&ours.value, &theirs.value);
    let known = if value == ours.value {
        merge_known(&ours.known, &theirs.known)
    } else {
        None
    };
    Entry { value, known }
}

/// What is still known about a value reached by two paths
///
/// Arrays from the same allocation keep the elements both paths agree on.
fn merge_known(ours: &Option<Known>, theirs: &Option<Known>) -> Option<Known> {
    match (ours.as_ref()?, theirs.as_ref()?) {
        (
            Known::Array {
                origin,
                elements: ours,
            },
            Known::Array {
                origin: other_origin,
                elements: theirs,
            },
        ) if origin == other_origin && ours.len() == theirs.len() => Some(Known::Array {
            origin: *origin,
            elements: ours
                .iter()
                .zip(theirs)
                .map(|(ours, theirs)| merge_known(ours, theirs))
                .collect(),
        }),
        (ours, theirs) if ours == theirs => Some(ours.clone()),
        _ => None,
    }
}

/// Most specific value both inputs can be used as, without knowing the class hierarchy
fn merge_values(ours: &Value, theirs: &Value) -> Value {
    use VerificationType::*;

    match (ours, theirs) {
        _ if ours == theirs => ours.clone(),
        (Null, Object(_)) => theirs.clone(),
        (Object(_), Null) => ours.clone(),
        (Object(_), Object(_)) => Object(String::from("java/lang/Object")),
        _ => Top,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::parse::{parse_unit, Dialect};

    fn analyze(text: &str) -> Analysis {
        let unit = parse_unit(text, Dialect::Bare).unwrap();
        Analyzer::new("Test", &unit).analyze().unwrap()
    }

    fn frame_at(analysis: &Analysis, instruction: usize) -> &Frame {
        analysis.frames[instruction].as_ref().unwrap()
    }

    #[test]
    fn linear_code_is_one_block() {
        let analysis = analyze(
            "static linear()V\n\
             a:\n\
             getstatic java/lang/System.out Ljava/io/PrintStream;\n\
             ldc \"Hello\"\n\
             invokevirtual java/io/PrintStream.println(Ljava/lang/String;)V\n\
             b:",
        );
        assert_eq!(analysis.blocks.len(), 1);
        assert_eq!(analysis.frames.len(), 5);
        let block = analysis.block(0).unwrap();
        assert_eq!(analysis.block_frames(block).len(), 5);
        assert_eq!(analysis.block_instructions(block).len(), 5);
        assert!(block.edges.is_empty());
    }

    #[test]
    fn conditional_splits_into_three() {
        let analysis = analyze(
            "static ifCond(Z skip)V\n\
             a:\n\
             iload skip\n\
             ifne end\n\
             getstatic java/lang/System.out Ljava/io/PrintStream;\n\
             ldc \"Flag is true\"\n\
             invokevirtual java/io/PrintStream.println(Ljava/lang/String;)V\n\
             end:\n\
             nop",
        );
        assert_eq!(analysis.blocks.len(), 3);
        assert_eq!(analysis.block(0).unwrap().len(), 3);
        assert_eq!(analysis.block(3).unwrap().len(), 3);
        assert_eq!(analysis.block(6).unwrap().len(), 2);

        let first = analysis.block(0).unwrap();
        assert_eq!(
            first.edges,
            vec![
                Edge {
                    from: 0,
                    to: 2,
                    kind: EdgeKind::Jump
                },
                Edge {
                    from: 0,
                    to: 1,
                    kind: EdgeKind::Fallthrough
                },
            ]
        );
    }

    #[test]
    fn table_switch_blocks() {
        let analysis = analyze(
            "static switchMethod(I value)V\n\
             start:\n\
             \x20 iload value\n\
             \x20 tableswitch range(0:2) offsets(a, b, c) default(d)\n\
             a: return\n\
             b: return\n\
             c: return\n\
             d: return\n\
             end: nop nop nop",
        );
        assert_eq!(analysis.blocks.len(), 6);
        let sizes: Vec<usize> = analysis.blocks.iter().map(Block::len).collect();
        assert_eq!(sizes, vec![3, 2, 2, 2, 2, 4]);

        let kinds: Vec<EdgeKind> = analysis.blocks[0].edges.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                EdgeKind::SwitchCase,
                EdgeKind::SwitchCase,
                EdgeKind::SwitchCase,
                EdgeKind::SwitchDefault
            ]
        );

        // Nothing reaches the code after the last return
        assert!(!analysis.blocks[5].is_reachable());
        assert_eq!(analysis.frames[11], None);
    }

    #[test]
    fn try_catch_edges() {
        let analysis = analyze(
            "static tryCatch()V\n\
             TRY a b CATCH(*) c\n\
             a: nop nop nop\n\
             b: goto end\n\
             c: astore ex\n\
             end: return\n",
        );
        assert_eq!(analysis.blocks.len(), 3);
        assert_eq!(analysis.block(0).unwrap().len(), 6);
        assert_eq!(analysis.block(6).unwrap().len(), 2);
        assert_eq!(analysis.block(8).unwrap().len(), 2);

        let handler = analysis.block_index(6).unwrap();
        assert_eq!(analysis.block(0).unwrap().edges[0].to, handler);
        assert_eq!(
            analysis.block(0).unwrap().edges[0].kind,
            EdgeKind::ExceptionHandler
        );
        assert!(analysis.block(8).unwrap().edges.is_empty());

        // The caught exception is on the stack at the handler, then stored
        let handler_entry = analysis.block(6).unwrap().entry_frame.as_ref().unwrap();
        assert_eq!(
            handler_entry.peek(),
            Some(&VerificationType::Object(String::from("java/lang/Throwable")))
        );
        assert_eq!(
            frame_at(&analysis, 7).locals["ex"].value,
            VerificationType::Object(String::from("java/lang/Throwable"))
        );
    }

    #[test]
    fn every_block_inside_try_gets_a_handler_edge() {
        let analysis = analyze(
            "static tryCatch(Z flag)V\n\
             TRY tryStart tryEnd CATCH(java/io/IOException) tryHandler\n\
             tryStart:\n\
             \x20 iload flag\n\
             \x20 ifne skip\n\
             \x20   nop\n\
             \x20 skip:\n\
             tryEnd:\n\
             \x20 goto end\n\
             tryHandler:\n\
             \x20 astore ex\n\
             end:\n\
             \x20 return\n",
        );
        assert_eq!(analysis.blocks.len(), 5);
        let handler = analysis.block_index(7).unwrap();
        let handler_edges: Vec<&Edge> = analysis
            .blocks
            .iter()
            .flat_map(|block| &block.edges)
            .filter(|edge| edge.kind == EdgeKind::ExceptionHandler)
            .collect();
        assert_eq!(handler_edges.len(), 3);
        assert!(handler_edges.iter().all(|edge| edge.to == handler));
        for edge in handler_edges {
            assert_eq!(analysis.blocks[edge.from].edges[0], *edge);
        }
        assert_eq!(
            frame_at(&analysis, 8).locals["ex"].value,
            VerificationType::Object(String::from("java/io/IOException"))
        );
    }

    #[test]
    fn handlers_only_see_frames_inside_the_range() {
        let text = "static m()I\n\
             TRY A B CATCH(*) C\n\
             iconst_5\n\
             istore x\n\
             A: invokestatic java/lang/System.nanoTime()J\n\
             pop2\n\
             B: ldc \"after\"\n\
             astore y\n\
             fconst_0\n\
             fstore x\n\
             iconst_1\n\
             ireturn\n\
             C: pop\n\
             iload x\n\
             ireturn";
        let unit = parse_unit(text, Dialect::Bare).unwrap();
        let handler = 12;

        for mode in [MergeMode::Union, MergeMode::Verifier] {
            let analysis = Analyzer::new("Test", &unit)
                .merge_mode(mode)
                .analyze()
                .unwrap();
            assert_eq!(analysis.blocks.len(), 2);
            let entry = analysis.block(handler).unwrap().entry_frame.as_ref().unwrap();
            assert_eq!(entry.local("x"), Some(&VerificationType::Integer), "{:?}", mode);
            assert_eq!(entry.local_known("x"), Some(&Known::Int(5)), "{:?}", mode);
            assert_eq!(entry.local("y"), None, "{:?}", mode);
            assert_eq!(
                entry.peek(),
                Some(&VerificationType::Object(String::from("java/lang/Throwable")))
            );
            assert_eq!(frame_at(&analysis, 14).peek_known(), Some(&Known::Int(5)));
        }
    }

    #[test]
    fn frames_track_parameters_and_this() {
        let analysis = analyze(
            "<init>(J big, [I ints)V\n\
             A: aload this\n\
             invokespecial java/lang/Object.<init>()V\n\
             aload ints\n\
             arraylength\n\
             lload big\n\
             return",
        );
        let first = frame_at(&analysis, 0);
        assert_eq!(first.locals["this"].value, VerificationType::UninitializedThis);
        assert_eq!(first.locals["big"].value, VerificationType::Long);
        assert_eq!(first.locals["ints"].value, VerificationType::Object(String::from("[I")));
        assert_eq!(
            frame_at(&analysis, 2).locals["this"].value,
            VerificationType::Object(String::from("Test"))
        );
        assert_eq!(frame_at(&analysis, 5).stack_depth(), 3);
        assert_eq!(analysis.max_stack(), 3);
    }

    #[test]
    fn union_and_verifier_merges_differ() {
        let text = "static merge(Z flag)V\n\
             A: iload flag\n\
             ifeq B\n\
             ldc \"s\"\n\
             astore x\n\
             goto C\n\
             B: iconst_0\n\
             istore x\n\
             C: return";
        let unit = parse_unit(text, Dialect::Bare).unwrap();
        let join = 9;

        let union = Analyzer::new("Test", &unit).analyze().unwrap();
        let union_entry = union.block(join).unwrap().entry_frame.as_ref().unwrap();
        assert!(union_entry.locals.contains_key("x"));

        let verifier = Analyzer::new("Test", &unit)
            .merge_mode(MergeMode::Verifier)
            .analyze()
            .unwrap();
        let verifier_entry = verifier.block(join).unwrap().entry_frame.as_ref().unwrap();
        assert!(!verifier_entry.locals.contains_key("x"));
        assert!(verifier_entry.locals.contains_key("flag"));
    }

    #[test]
    fn expressions_and_metadata() {
        let analysis = analyze(
            "static m()V\n\
             A: EXPR System.out.println(1);\n\
             LINE A 4\n\
             return",
        );
        assert_eq!(analysis.instructions, vec![0, 1, 3]);
        assert_eq!(analysis.frames.len(), 3);
        assert_eq!(analysis.instruction_index(2), None);
    }

    #[test]
    fn constants_fold_through_math() {
        let analysis = analyze(
            "static math()V\n\
             a:\n\
             iconst_1\n\
             ldc 2\n\
             iadd\n\
             bipush 3\n\
             imul\n\
             i2f\n\
             fconst_2\n\
             fdiv\n\
             ldc 0.5f\n\
             fadd\n\
             f2i\n\
             iconst_1\n\
             ishl",
        );
        let last = analysis.frames.last().unwrap().as_ref().unwrap();
        assert_eq!(last.peek(), Some(&VerificationType::Integer));
        assert_eq!(last.peek_known(), Some(&Known::Int(10)));
        assert_eq!(last.problem, None);
        assert_eq!(
            frame_at(&analysis, 8).peek_known(),
            Some(&Known::Float(4.5))
        );
    }

    #[test]
    fn byte_array_contents() {
        let analysis = analyze(
            "static hello()V\n\
             a:\n\
             iconst_5\n\
             newarray B\n\
             astore array\n\
             aload array\n\
             bipush 0\n\
             bipush 0x48\n\
             bastore\n\
             aload array\n\
             bipush 1\n\
             bipush 0x65\n\
             bastore\n\
             aload array\n\
             bipush 2\n\
             bipush 0x6c\n\
             bastore\n\
             aload array\n\
             bipush 3\n\
             bipush 0x6c\n\
             bastore\n\
             aload array\n\
             bipush 2\n\
             bipush 0x6f\n\
             bastore\n\
             new java/lang/String\n\
             dup\n\
             invokespecial java/lang/String.<init>([B)V\n\
             astore text",
        );
        let last = analysis.frames.last().unwrap().as_ref().unwrap();
        assert_eq!(
            last.local("array"),
            Some(&VerificationType::Object(String::from("[B")))
        );
        let elements = match last.local_known("array") {
            Some(Known::Array { elements, .. }) => elements,
            other => panic!("expected a known array, got {:?}", other),
        };
        let bytes: Vec<Option<Known>> = [0x48, 0x65, 0x6f, 0x6c]
            .iter()
            .map(|byte| Some(Known::Int(*byte)))
            .chain(std::iter::once(None))
            .collect();
        assert_eq!(*elements, bytes);

        // The constructor consumed the array argument, so `astore` underflows
        assert!(last.problem.as_ref().unwrap().contains("astore"));
    }

    #[test]
    fn merges_forget_disagreeing_values() {
        let text = "static merge(Z flag)V\n\
             A: iload flag\n\
             ifeq B\n\
             iconst_1\n\
             istore x\n\
             iconst_2\n\
             istore y\n\
             goto C\n\
             B: iconst_1\n\
             istore x\n\
             iconst_3\n\
             istore y\n\
             iconst_0\n\
             C: return";
        let unit = parse_unit(text, Dialect::Bare).unwrap();
        let join = 14;

        for mode in [MergeMode::Union, MergeMode::Verifier] {
            let analysis = Analyzer::new("Test", &unit)
                .merge_mode(mode)
                .analyze()
                .unwrap();
            let entry = analysis.block(join).unwrap().entry_frame.as_ref().unwrap();
            assert_eq!(entry.local_known("x"), Some(&Known::Int(1)), "{:?}", mode);
            assert_eq!(entry.local("y"), Some(&VerificationType::Integer), "{:?}", mode);
            assert_eq!(entry.local_known("y"), None, "{:?}", mode);
            assert!(
                entry.problem.as_ref().unwrap().contains("stack heights differ"),
                "{:?}",
                mode
            );
        }
    }

    #[test]
    fn fields_are_rejected() {
        let unit = parse_unit("static f I", Dialect::Bare).unwrap();
        assert_eq!(
            Analyzer::new("Test", &unit).analyze(),
            Err(AnalysisError::NotAMethod)
        );
    }
}
