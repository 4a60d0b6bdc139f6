//! Run the stages over one unit and report progress to listeners
//!
//! An [`AssemblerPipeline`] holds the source of one member, either assembly text or a member of
//! an existing class, along with the result of the most recent run of each stage. Stages only
//! rerun when their input changed, so callers can invoke them eagerly (for example after every
//! edit).
//!
//! Stages never return errors across their boundary. Failures go to the registered
//! [`PipelineListener`]s and the stage returns `false`, which lets a batch of units carry on
//! past the ones that are broken. This is also the only part of the crate that logs.

mod report;

pub use report::{BytecodeProblem, BytecodeReport};

use crate::analysis::{Analysis, AnalysisError, Analyzer, MergeMode};
use crate::ast::Unit;
use crate::disassemble::{DisassembleError, Disassembler};
use crate::generate::{
    CompileError, ExpressionCompiler, GeneratedMember, Generator, GeneratorSettings, Member,
};
use crate::jvm::class_file::{Attribute, ClassFile, Code};
use crate::parse::{parse_unit, Dialect, ParseError};
use crate::print::print_unit;
use crate::validate::{validate, ValidationMessage};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineSettings {
    pub generator: GeneratorSettings,

    /// Whether modifiers and meta keywords carry a leading `.`
    ///
    /// Updated by every call to [`AssemblerPipeline::update_ast`].
    pub use_prefixed_keywords: bool,
}

/// Where the unit comes from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Source {
    Text(String),

    /// Member of a class file, picked by a selector (see [`Disassembler::member`])
    Bytecode { class: Vec<u8>, member: String },
}

/// Result of the most recent successful generation
#[derive(Debug)]
pub enum Output {
    Method(GeneratedMember),
    Field(GeneratedMember),
    Class(Vec<u8>),
}

impl Output {
    fn kind(&self) -> OutputKind {
        match self {
            Output::Method(_) => OutputKind::Method,
            Output::Field(_) => OutputKind::Field,
            Output::Class(_) => OutputKind::Class,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum OutputKind {
    Method,
    Field,
    Class,
}

/// Callbacks for the stages of a pipeline
///
/// Every method does nothing by default, so implementations only override what they care about.
#[allow(unused_variables)]
pub trait PipelineListener {
    /// The text could not be turned into a unit
    fn on_parse_fail(&mut self, text: &str, error: &ParseError) {}

    /// The requested member could not be disassembled
    fn on_disassemble_fail(&mut self, error: &DisassembleError) {}

    /// A new unit was built from the source
    fn on_ast_updated(&mut self, unit: &Unit) {}

    /// Validation ran, whether or not it found anything
    fn on_validation_complete(&mut self, unit: &Unit, messages: &[ValidationMessage]) {}

    /// Validation found problems (called after `on_validation_complete`)
    fn on_validation_fail(&mut self, unit: &Unit, messages: &[ValidationMessage]) {}

    fn on_analysis_fail(&mut self, unit: &Unit, error: &AnalysisError) {}

    /// The unit could not be lowered
    fn on_compile_fail(&mut self, unit: &Unit, error: &CompileError) {}

    /// The generated code passed its sanity checks
    fn on_bytecode_validated(&mut self, report: &BytecodeReport) {}

    /// The generated code failed its sanity checks, so the output was discarded
    fn on_bytecode_fail(&mut self, unit: &Unit, report: &BytecodeReport) {}

    /// A generation request finished with a new output
    fn on_completed_output(&mut self, output: &Output) {}
}

/// Handle for removing a listener
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(usize);

pub struct AssemblerPipeline {
    /// Internal name of the class declaring the member
    owner: String,
    settings: PipelineSettings,
    source: Option<Source>,

    /// Assembly text of the current unit (printed, when the source is bytecode)
    text: Option<String>,
    source_dirty: bool,
    output_outdated: bool,
    parsed_dialect: Option<Dialect>,

    unit: Option<Unit>,
    messages: Vec<ValidationMessage>,
    analysis: Option<Analysis>,
    report: Option<BytecodeReport>,
    output: Option<Output>,

    listeners: Vec<(ListenerId, Box<dyn PipelineListener>)>,
    next_listener: usize,
    expressions: Option<Box<dyn ExpressionCompiler>>,
}

impl AssemblerPipeline {
    pub fn new(owner: impl Into<String>) -> AssemblerPipeline {
        AssemblerPipeline {
            owner: owner.into(),
            settings: PipelineSettings::default(),
            source: None,
            text: None,
            source_dirty: true,
            output_outdated: true,
            parsed_dialect: None,
            unit: None,
            messages: vec![],
            analysis: None,
            report: None,
            output: None,
            listeners: vec![],
            next_listener: 0,
            expressions: None,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Change the class the member is declared in (this is the type of `this`)
    pub fn set_owner(&mut self, owner: impl Into<String>) {
        let owner = owner.into();
        if owner != self.owner {
            self.owner = owner;
            self.output_outdated = true;
        }
    }

    pub fn settings(&self) -> PipelineSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: PipelineSettings) {
        if settings.generator != self.settings.generator {
            self.output_outdated = true;
        }
        self.settings = settings;
    }

    pub fn set_expression_compiler(&mut self, compiler: Box<dyn ExpressionCompiler>) {
        self.expressions = Some(compiler);
        self.output_outdated = true;
    }

    /// Replace the source with assembly text (a no-op if the text is unchanged)
    pub fn set_text(&mut self, text: impl Into<String>) {
        let text = text.into();
        let unchanged = matches!(&self.source, Some(Source::Text(current)) if *current == text);
        if !unchanged {
            self.source = Some(Source::Text(text.clone()));
            self.text = Some(text);
            self.source_dirty = true;
            log::trace!("Assembly text updated");
        }
    }

    /// Replace the source with a member of a class file
    pub fn set_bytecode(&mut self, class: Vec<u8>, member: impl Into<String>) {
        let source = Source::Bytecode {
            class,
            member: member.into(),
        };
        if self.source.as_ref() != Some(&source) {
            self.source = Some(source);
            self.text = None;
            self.source_dirty = true;
            log::trace!("Bytecode source updated");
        }
    }

    pub fn source(&self) -> Option<&Source> {
        self.source.as_ref()
    }

    /// Assembly text of the current source
    ///
    /// For a bytecode source, this is only available once the member has been disassembled.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Whether the source changed since the unit was last built
    pub fn is_dirty(&self) -> bool {
        self.source_dirty
    }

    pub fn add_listener(&mut self, listener: Box<dyn PipelineListener>) -> ListenerId {
        let id = ListenerId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, listener));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> Option<Box<dyn PipelineListener>> {
        let idx = self.listeners.iter().position(|(other, _)| *other == id)?;
        Some(self.listeners.remove(idx).1)
    }

    pub fn last_unit(&self) -> Option<&Unit> {
        self.unit.as_ref()
    }

    pub fn last_messages(&self) -> &[ValidationMessage] {
        &self.messages
    }

    pub fn last_analysis(&self) -> Option<&Analysis> {
        self.analysis.as_ref()
    }

    pub fn last_report(&self) -> Option<&BytecodeReport> {
        self.report.as_ref()
    }

    pub fn last_output(&self) -> Option<&Output> {
        self.output.as_ref()
    }

    /// Take the most recent output, so the next generation request runs again
    pub fn take_output(&mut self) -> Option<Output> {
        self.output.take()
    }

    /// Rebuild the unit from the source
    ///
    /// Returns `true` if a new unit was attempted (even if it failed, in which case listeners
    /// have been told why), and `false` if there was nothing to do.
    pub fn update_ast(&mut self, use_prefixed_keywords: bool) -> bool {
        let dialect = Dialect::from_prefixed(use_prefixed_keywords);
        self.settings.use_prefixed_keywords = use_prefixed_keywords;
        if !self.source_dirty && self.parsed_dialect == Some(dialect) {
            return false;
        }
        let source = match &self.source {
            Some(source) => source,
            None => return false,
        };
        self.source_dirty = false;
        self.parsed_dialect = Some(dialect);
        self.unit = None;
        self.analysis = None;
        self.output_outdated = true;

        let unit = match source {
            Source::Text(text) => {
                log::trace!("Unit updating: parse");
                match parse_unit(text, dialect) {
                    Ok(unit) => unit,
                    Err(err) => {
                        log::debug!("Parse failed: {}", err);
                        for (_, listener) in &mut self.listeners {
                            listener.on_parse_fail(text, &err);
                        }
                        return true;
                    }
                }
            }
            Source::Bytecode { class, member } => {
                log::trace!("Unit updating: disassemble {}", member);
                let disassembled = ClassFile::parse(class)
                    .map_err(DisassembleError::from)
                    .and_then(|class| Disassembler::new(&class).member(member));
                match disassembled {
                    Ok(unit) => {
                        self.text = Some(print_unit(&unit, dialect));
                        unit
                    }
                    Err(err) => {
                        log::debug!("Disassembly failed: {}", err);
                        for (_, listener) in &mut self.listeners {
                            listener.on_disassemble_fail(&err);
                        }
                        return true;
                    }
                }
            }
        };

        for (_, listener) in &mut self.listeners {
            listener.on_ast_updated(&unit);
        }
        self.unit = Some(unit);
        log::trace!("Unit up to date");
        true
    }

    /// Validate the current unit
    ///
    /// Returns `true` when there is no unit or it has no problems.
    pub fn validate_ast(&mut self) -> bool {
        self.ensure_unit();
        let unit = match &self.unit {
            Some(unit) => unit,
            None => return true,
        };
        log::trace!("Validating unit");
        self.messages = validate(unit);
        for (_, listener) in &mut self.listeners {
            listener.on_validation_complete(unit, &self.messages);
        }
        if self.messages.is_empty() {
            return true;
        }
        for (_, listener) in &mut self.listeners {
            listener.on_validation_fail(unit, &self.messages);
        }
        false
    }

    /// Analyze the body of the current unit (see [`AssemblerPipeline::last_analysis`])
    pub fn analyze(&mut self) -> bool {
        self.ensure_unit();
        let unit = match &self.unit {
            Some(unit) => unit,
            None => return false,
        };
        log::trace!("Analyzing unit");
        match Analyzer::new(&self.owner, unit)
            .merge_mode(MergeMode::Verifier)
            .analyze()
        {
            Ok(analysis) => {
                self.analysis = Some(analysis);
                true
            }
            Err(err) => {
                self.analysis = None;
                for (_, listener) in &mut self.listeners {
                    listener.on_analysis_fail(unit, &err);
                }
                false
            }
        }
    }

    /// Generate the method described by the unit (see [`AssemblerPipeline::last_output`])
    pub fn generate_method(&mut self) -> bool {
        self.generate(OutputKind::Method)
    }

    pub fn generate_field(&mut self) -> bool {
        self.generate(OutputKind::Field)
    }

    /// Generate the member and wrap it in a class file named after the owner
    pub fn generate_class(&mut self) -> bool {
        self.generate(OutputKind::Class)
    }

    /// Parse the source if it changed since the unit was built
    fn ensure_unit(&mut self) {
        if self.source_dirty {
            self.update_ast(self.settings.use_prefixed_keywords);
        }
    }

    fn generate(&mut self, kind: OutputKind) -> bool {
        self.ensure_unit();
        if !self.output_outdated && self.output.as_ref().map(Output::kind) == Some(kind) {
            return true;
        }
        self.output = None;
        self.report = None;
        let unit = match &self.unit {
            Some(unit) => unit,
            None => return false,
        };

        log::trace!("Generating {:?} for {}", kind, self.owner);
        let mut generator = Generator::new(&self.owner).settings(self.settings.generator);
        if let Some(expressions) = self.expressions.as_deref() {
            generator = generator.expression_compiler(expressions);
        }
        let generated = match kind {
            OutputKind::Method => generator.generate_method(unit),
            OutputKind::Field => generator.generate_field(unit),
            OutputKind::Class => generator.generate(unit),
        };
        let generated = match generated {
            Ok(generated) => generated,
            Err(err) => {
                log::debug!("Generation failed: {}", err);
                for (_, listener) in &mut self.listeners {
                    listener.on_compile_fail(unit, &err);
                }
                return false;
            }
        };

        log::trace!("Checking generated bytecode");
        let member_name = format!("{}{}", unit.definition.name(), unit.definition.descriptor());
        let report = check_member(member_name, &generated);
        if !report.is_ok() {
            for (_, listener) in &mut self.listeners {
                listener.on_bytecode_fail(unit, &report);
            }
            self.report = Some(report);
            return false;
        }
        for (_, listener) in &mut self.listeners {
            listener.on_bytecode_validated(&report);
        }
        self.report = Some(report);

        let output = match kind {
            OutputKind::Method => Output::Method(generated),
            OutputKind::Field => Output::Field(generated),
            OutputKind::Class => {
                let version = self.settings.generator.class_version();
                let line = unit.definition.line();
                let class = generated.into_class_file(&self.owner, version).and_then(|class| {
                    class
                        .to_bytes()
                        .map_err(|err| CompileError::new(line, err.into()))
                });
                match class {
                    Ok(bytes) => Output::Class(bytes),
                    Err(err) => {
                        for (_, listener) in &mut self.listeners {
                            listener.on_compile_fail(unit, &err);
                        }
                        return false;
                    }
                }
            }
        };

        for (_, listener) in &mut self.listeners {
            listener.on_completed_output(&output);
        }
        self.output = Some(output);
        self.output_outdated = false;
        log::trace!("Output up to date");
        true
    }
}

/// Sanity check a generated member (fields and bodiless methods pass trivially)
fn check_member(member_name: String, generated: &GeneratedMember) -> BytecodeReport {
    let method = match &generated.member {
        Member::Method(method) => method,
        Member::Field(_) => return BytecodeReport::empty(member_name),
    };
    match Attribute::find::<Code>(&method.attributes, generated.constants.constants()) {
        Ok(Some(code)) => BytecodeReport::check(member_name, &code),
        Ok(None) => BytecodeReport::empty(member_name),
        Err(err) => {
            let mut report = BytecodeReport::empty(member_name);
            report
                .problems
                .push(BytecodeProblem::Undecodable(err.to_string()));
            report
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records the name of every callback
    #[derive(Default)]
    struct Recorder(Rc<RefCell<Vec<String>>>);

    impl PipelineListener for Recorder {
        fn on_parse_fail(&mut self, _: &str, error: &ParseError) {
            self.0.borrow_mut().push(format!("parse_fail {}", error.line));
        }
        fn on_ast_updated(&mut self, _: &Unit) {
            self.0.borrow_mut().push(String::from("ast"));
        }
        fn on_validation_complete(&mut self, _: &Unit, messages: &[ValidationMessage]) {
            self.0
                .borrow_mut()
                .push(format!("validated {}", messages.len()));
        }
        fn on_validation_fail(&mut self, _: &Unit, _: &[ValidationMessage]) {
            self.0.borrow_mut().push(String::from("invalid"));
        }
        fn on_compile_fail(&mut self, _: &Unit, error: &CompileError) {
            self.0
                .borrow_mut()
                .push(format!("compile_fail {}", error.line));
        }
        fn on_bytecode_validated(&mut self, report: &BytecodeReport) {
            self.0
                .borrow_mut()
                .push(format!("bytecode {}", report.member));
        }
        fn on_completed_output(&mut self, output: &Output) {
            self.0
                .borrow_mut()
                .push(format!("output {:?}", output.kind()));
        }
    }

    fn recorded_pipeline(text: &str) -> (AssemblerPipeline, Rc<RefCell<Vec<String>>>) {
        let events = Rc::new(RefCell::new(vec![]));
        let mut pipeline = AssemblerPipeline::new("demo/Owner");
        pipeline.add_listener(Box::new(Recorder(events.clone())));
        pipeline.set_text(text);
        (pipeline, events)
    }

    #[test]
    fn stages_run_once_per_change() {
        let text = "static twice(I x)I\n  iload x\n  iconst_2\n  imul\n  ireturn\n";
        let (mut pipeline, events) = recorded_pipeline(text);

        assert!(pipeline.update_ast(false));
        assert!(!pipeline.update_ast(false));
        assert!(pipeline.validate_ast());
        assert!(pipeline.generate_method());
        assert!(pipeline.generate_method());
        assert!(pipeline.analyze());
        assert_eq!(pipeline.last_analysis().map(|a| a.blocks.len()), Some(1));

        pipeline.set_text(text);
        assert!(!pipeline.is_dirty());

        assert_eq!(
            *events.borrow(),
            vec![
                "ast",
                "validated 0",
                "bytecode twice(I)I",
                "output Method",
            ]
        );
        assert!(matches!(pipeline.last_output(), Some(Output::Method(_))));
    }

    #[test]
    fn failures_reach_listeners() {
        let (mut pipeline, events) = recorded_pipeline("\n\n");
        assert!(pipeline.update_ast(false));
        assert!(pipeline.last_unit().is_none());
        assert!(!pipeline.generate_method());

        pipeline.set_text("m()V\n  bipush 200\n  goto nowhere\n");
        assert!(!pipeline.validate_ast());
        assert!(!pipeline.update_ast(false));
        assert!(!pipeline.generate_method());
        assert!(!pipeline.generate_field());

        assert_eq!(
            *events.borrow(),
            vec![
                "parse_fail 1",
                "ast",
                "validated 2",
                "invalid",
                "compile_fail 2",
                "compile_fail 1",
            ]
        );
    }

    #[test]
    fn generation_parses_stale_text() {
        let (mut pipeline, events) = recorded_pipeline("public static count I\nCONST-VALUE 3\n");
        assert!(pipeline.generate_class());
        match pipeline.last_output() {
            Some(Output::Class(bytes)) => {
                let class = ClassFile::parse(bytes).unwrap();
                assert_eq!(class.fields.len(), 1);
                assert!(class.methods.is_empty());
            }
            other => panic!("expected a class, got {:?}", other),
        }
        assert_eq!(
            *events.borrow(),
            vec!["ast", "bytecode countI", "output Class"]
        );
    }

    #[test]
    fn bytecode_source_is_printed() {
        let mut source = AssemblerPipeline::new("demo/Owner");
        source.set_text("public static id(J x)J\n  lload x\n  lreturn\n");
        assert!(source.generate_class());
        let class = match source.take_output() {
            Some(Output::Class(bytes)) => bytes,
            other => panic!("expected a class, got {:?}", other),
        };

        let mut pipeline = AssemblerPipeline::new("demo/Owner");
        pipeline.set_bytecode(class.clone(), "id");
        assert!(pipeline.update_ast(true));
        let text = pipeline.text().unwrap();
        assert!(text.starts_with(".public .static id(J x)J"), "{}", text);
        assert!(pipeline.generate_method());

        pipeline.set_bytecode(class, "missing");
        assert!(pipeline.update_ast(false));
        assert!(pipeline.last_unit().is_none());
        assert!(pipeline.text().is_none());
    }

    #[test]
    fn listeners_can_be_removed() {
        let events = Rc::new(RefCell::new(vec![]));
        let mut pipeline = AssemblerPipeline::new("demo/Owner");
        let id = pipeline.add_listener(Box::new(Recorder(events.clone())));
        assert!(pipeline.remove_listener(id).is_some());
        assert!(pipeline.remove_listener(id).is_none());

        pipeline.set_text("m()V\n  return\n");
        assert!(pipeline.generate_method());
        assert!(events.borrow().is_empty());
    }
}
