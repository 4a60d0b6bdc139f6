use jvmasm::ast::{CodeItem, Instruction, Unit};
use jvmasm::generate::{CompileError, ExpressionCompiler};
use jvmasm::jvm::class_file::{Attribute, ClassFile, Code};
use jvmasm::jvm::Opcode;
use jvmasm::parse::ParseError;
use jvmasm::pipeline::{AssemblerPipeline, BytecodeReport, Output, PipelineListener};
use jvmasm::validate::ValidationMessage;
use std::cell::RefCell;
use std::rc::Rc;
use std::thread;

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Assembled,
    ParseFailed(usize),
    Invalid(usize),
    CompileFailed(usize),
}

#[derive(Clone, Default)]
struct Outcomes(Rc<RefCell<Vec<Outcome>>>);

impl PipelineListener for Outcomes {
    fn on_parse_fail(&mut self, _: &str, error: &ParseError) {
        self.0.borrow_mut().push(Outcome::ParseFailed(error.line));
    }

    fn on_validation_fail(&mut self, _: &Unit, messages: &[ValidationMessage]) {
        self.0.borrow_mut().push(Outcome::Invalid(messages.len()));
    }

    fn on_compile_fail(&mut self, _: &Unit, error: &CompileError) {
        self.0.borrow_mut().push(Outcome::CompileFailed(error.line));
    }

    fn on_bytecode_validated(&mut self, report: &BytecodeReport) {
        assert!(report.is_ok());
    }

    fn on_completed_output(&mut self, _: &Output) {
        self.0.borrow_mut().push(Outcome::Assembled);
    }
}

/// Run one unit through every stage, the way a batch tool would
fn run(text: &str) -> Vec<Outcome> {
    let outcomes = Outcomes::default();
    let mut pipeline = AssemblerPipeline::new("demo/Batch");
    pipeline.add_listener(Box::new(outcomes.clone()));
    pipeline.set_text(text);
    pipeline.update_ast(false);
    pipeline.validate_ast();
    pipeline.generate_class();
    outcomes.0.take()
}

#[test]
fn batch_continues_past_broken_units() {
    let texts = vec![
        "static ok()V\nreturn",
        "",
        "static bad()V\nsipush 40000\nreturn",
        "static dangling()V\ngoto nowhere",
        "public static counter J\nCONST-VALUE 10L",
    ];

    // Pipelines are independent, so each unit gets its own thread
    let results: Vec<Vec<Outcome>> = thread::scope(|scope| {
        let handles: Vec<_> = texts
            .iter()
            .map(|text| scope.spawn(move || run(text)))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    assert_eq!(
        results,
        vec![
            vec![Outcome::Assembled],
            vec![Outcome::ParseFailed(1)],
            vec![Outcome::Invalid(1), Outcome::CompileFailed(2)],
            vec![Outcome::Invalid(1), Outcome::CompileFailed(2)],
            vec![Outcome::Assembled],
        ]
    );
}

/// Compiles `EXPR <n>` into a push of `n`
struct Constants;

impl ExpressionCompiler for Constants {
    fn compile(&self, source: &str, _: &Unit) -> Result<Vec<CodeItem>, String> {
        let value: i32 = source
            .trim()
            .parse()
            .map_err(|_| format!("not a constant: {}", source))?;
        Ok(vec![CodeItem::Instruction(Instruction::Int {
            opcode: Opcode::BiPush,
            value,
        })])
    }
}

#[test]
fn expressions_need_a_compiler() {
    let text = "static seven()I\nEXPR 7\nireturn";
    assert_eq!(run(text), vec![Outcome::CompileFailed(2)]);

    let outcomes = Outcomes::default();
    let mut pipeline = AssemblerPipeline::new("demo/Batch");
    pipeline.add_listener(Box::new(outcomes.clone()));
    pipeline.set_expression_compiler(Box::new(Constants));
    pipeline.set_text(text);
    assert!(pipeline.generate_class());
    assert_eq!(outcomes.0.take(), vec![Outcome::Assembled]);

    let bytes = match pipeline.last_output() {
        Some(Output::Class(bytes)) => bytes,
        other => panic!("expected a class, got {:?}", other),
    };
    let class = ClassFile::parse(bytes).unwrap();
    let code: Code = Attribute::find(&class.methods[0].attributes, &class.constants)
        .unwrap()
        .unwrap();
    assert_eq!(code.code_array.0, vec![0x10, 0x07, 0xac]);
    assert_eq!(code.max_stack, 1);

    pipeline.set_text("static broken()I\nEXPR seven\nireturn");
    assert!(!pipeline.generate_class());
    assert_eq!(outcomes.0.take(), vec![Outcome::CompileFailed(2)]);
}

#[test]
fn disassembled_members_can_be_edited() {
    let mut source = AssemblerPipeline::new("demo/Batch");
    source.set_text("public static answer()I\nbipush 41\nireturn");
    assert!(source.generate_class());
    let class = match source.take_output() {
        Some(Output::Class(bytes)) => bytes,
        other => panic!("expected a class, got {:?}", other),
    };

    let mut pipeline = AssemblerPipeline::new("demo/Batch");
    pipeline.set_bytecode(class, "answer()I");
    assert!(pipeline.update_ast(false));
    let edited = pipeline.text().unwrap().replace("bipush 41", "bipush 42");
    pipeline.set_text(edited);
    assert!(pipeline.is_dirty());
    assert!(pipeline.validate_ast());
    assert!(pipeline.generate_method());
    assert!(matches!(pipeline.last_output(), Some(Output::Method(_))));
    assert_eq!(pipeline.last_report().map(|r| r.code_length), Some(3));
}
