use jvmasm::analysis::AnalysisError;
use jvmasm::ast::Unit;
use jvmasm::disassemble::DisassembleError;
use jvmasm::generate::CompileError;
use jvmasm::parse::ParseError;
use jvmasm::pipeline::{BytecodeReport, PipelineListener};
use jvmasm::validate::ValidationMessage;
use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;
use termcolor::{Color, ColorSpec, WriteColor};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Severity {
    /// Validation finding (output can still be generated)
    Warning,

    /// Stage failure (no output)
    Error,
}

#[derive(Clone, Debug)]
pub struct Diagnostic {
    /// 1-based line, or 0 when the problem is not tied to a line
    pub line: usize,
    pub severity: Severity,
    pub message: String,
}

impl Diagnostic {
    fn error(line: usize, message: String) -> Diagnostic {
        Diagnostic {
            line,
            severity: Severity::Error,
            message,
        }
    }
}

/// Pipeline listener that gathers everything worth telling the user
#[derive(Clone, Default)]
pub struct Collector(Rc<RefCell<Vec<Diagnostic>>>);

impl Collector {
    /// Take the diagnostics gathered so far
    pub fn take(&self) -> Vec<Diagnostic> {
        self.0.take()
    }
}

impl PipelineListener for Collector {
    fn on_parse_fail(&mut self, _: &str, error: &ParseError) {
        let diagnostic = Diagnostic::error(error.line, error.message.clone());
        self.0.borrow_mut().push(diagnostic);
    }

    fn on_disassemble_fail(&mut self, error: &DisassembleError) {
        self.0.borrow_mut().push(Diagnostic::error(0, error.to_string()));
    }

    fn on_validation_fail(&mut self, _: &Unit, messages: &[ValidationMessage]) {
        self.0
            .borrow_mut()
            .extend(messages.iter().map(|message| Diagnostic {
                line: message.line,
                severity: Severity::Warning,
                message: format!("[{}] {}", message.kind, message.message),
            }));
    }

    fn on_analysis_fail(&mut self, unit: &Unit, error: &AnalysisError) {
        let diagnostic = Diagnostic::error(unit.definition.line(), error.to_string());
        self.0.borrow_mut().push(diagnostic);
    }

    fn on_compile_fail(&mut self, _: &Unit, error: &CompileError) {
        let diagnostic = Diagnostic::error(error.line, error.kind.to_string());
        self.0.borrow_mut().push(diagnostic);
    }

    fn on_bytecode_fail(&mut self, _: &Unit, report: &BytecodeReport) {
        self.0.borrow_mut().extend(
            report
                .problems
                .iter()
                .map(|problem| Diagnostic::error(0, format!("{}: {}", report.member, problem))),
        );
    }
}

/// Print diagnostics as `file:line: severity: message`
pub fn print<W: WriteColor>(out: &mut W, file: &str, diagnostics: &[Diagnostic]) -> io::Result<()> {
    for diagnostic in diagnostics {
        out.set_color(ColorSpec::new().set_bold(true))?;
        if diagnostic.line > 0 {
            write!(out, "{}:{}: ", file, diagnostic.line)?;
        } else {
            write!(out, "{}: ", file)?;
        }
        let (color, label) = match diagnostic.severity {
            Severity::Warning => (Color::Yellow, "warning"),
            Severity::Error => (Color::Red, "error"),
        };
        out.set_color(ColorSpec::new().set_bold(true).set_fg(Some(color)))?;
        write!(out, "{}", label)?;
        out.reset()?;
        writeln!(out, ": {}", diagnostic.message)?;
    }
    Ok(())
}
