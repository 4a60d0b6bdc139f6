//! Render a [`Unit`] back into assembly text
//!
//! Every node of the tree is printed on its own line, in a fixed order:
//!
//!   1. the definition
//!   2. definition metadata (signature, thrown types, constant value, field annotations)
//!   3. code entries, with labels flush left and everything else indented
//!
//! Parsing the output gives back the same tree, up to line numbers. [`renumber`] assigns the
//! line numbers the output will have, which is how units that did not come from text (eg.
//! disassembled ones) get meaningful lines.

use crate::ast::*;
use crate::jvm::{Modifier, Opcode};
use crate::parse::Dialect;
use std::fmt::Write;

const INDENT: &str = "    ";

pub fn print_unit(unit: &Unit, dialect: Dialect) -> String {
    let mut out = String::new();
    for line in unit_lines(unit, dialect) {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Set the line of every node to the line it has in [`print_unit`] output
pub fn renumber(unit: &mut Unit) {
    let mut line = 1;
    let mut next = || {
        let current = line;
        line += 1;
        current
    };

    match &mut unit.definition {
        Definition::Method(method) => {
            method.line = next();
            if let Some(signature) = &mut method.signature {
                signature.line = next();
            }
            for thrown in &mut method.thrown {
                thrown.line = next();
            }
            if let Some(value) = &mut method.const_value {
                value.line = next();
            }
        }
        Definition::Field(field) => {
            field.line = next();
            if let Some(signature) = &mut field.signature {
                signature.line = next();
            }
            if let Some(value) = &mut field.const_value {
                value.line = next();
            }
            for annotation in &mut field.annotations {
                annotation.line = next();
            }
        }
    }
    if let Some(code) = &mut unit.code {
        for entry in &mut code.entries {
            entry.line = next();
        }
    }
}

fn unit_lines(unit: &Unit, dialect: Dialect) -> Vec<String> {
    let mut lines = vec![];
    match &unit.definition {
        Definition::Method(method) => {
            let mut header = modifiers(&method.modifiers, dialect);
            header.push_str(&method.name);
            header.push('(');
            for (idx, parameter) in method.parameters.iter().enumerate() {
                if idx > 0 {
                    header.push_str(", ");
                }
                let _ = write!(header, "{} {}", parameter.desc, parameter.name);
            }
            header.push(')');
            header.push_str(&method.return_type);
            lines.push(header);

            if let Some(signature) = &method.signature {
                lines.push(format!("{} {}", dialect.directive("signature"), signature.value));
            }
            for thrown in &method.thrown {
                lines.push(format!("{} {}", dialect.directive("throws"), thrown.value));
            }
            if let Some(value) = &method.const_value {
                lines.push(format!(
                    "{} {}",
                    dialect.directive("const-value"),
                    ldc_value(&value.value)
                ));
            }
        }
        Definition::Field(field) => {
            let mut header = modifiers(&field.modifiers, dialect);
            let _ = write!(header, "{} {}", field.name, field.desc);
            lines.push(header);

            if let Some(signature) = &field.signature {
                lines.push(format!("{} {}", dialect.directive("signature"), signature.value));
            }
            if let Some(value) = &field.const_value {
                lines.push(format!(
                    "{} {}",
                    dialect.directive("const-value"),
                    ldc_value(&value.value)
                ));
            }
            for annotation in &field.annotations {
                lines.push(print_annotation(&annotation.value, dialect));
            }
        }
    }

    if let Some(code) = &unit.code {
        for entry in &code.entries {
            lines.push(match &entry.item {
                CodeItem::Label(name) => format!("{}:", name),
                item => format!("{}{}", INDENT, code_item(item, dialect)),
            });
        }
    }
    lines
}

fn modifiers(modifiers: &[Modifier], dialect: Dialect) -> String {
    let mut out = String::new();
    for modifier in modifiers {
        out.push_str(&dialect.modifier(*modifier));
        out.push(' ');
    }
    out
}

/// Render a single code entry (labels include their trailing `:`)
pub fn code_item(item: &CodeItem, dialect: Dialect) -> String {
    match item {
        CodeItem::Label(name) => format!("{}:", name),
        CodeItem::Instruction(insn) => instruction(insn),
        CodeItem::LineNumber { label, number } => {
            format!("{} {} {}", dialect.directive("line"), label, number)
        }
        CodeItem::TryCatch(try_catch) => format!(
            "{} {} {} {}({}) {}",
            dialect.directive("try"),
            try_catch.start,
            try_catch.end,
            dialect.directive("catch"),
            try_catch.catch_type.as_deref().unwrap_or("*"),
            try_catch.handler
        ),
        CodeItem::Annotation(annotation) => print_annotation(annotation, dialect),
        CodeItem::Expression(source) => format!("{} {}", dialect.directive("expr"), source),
        CodeItem::Unmatched(raw) => raw.clone(),
    }
}

pub fn instruction(insn: &Instruction) -> String {
    let mnemonic = insn.opcode().mnemonic();
    match insn {
        Instruction::Plain(_) => String::from(mnemonic),
        Instruction::Int { value, .. } => format!("{} {}", mnemonic, value),
        Instruction::Ldc(value) => format!("{} {}", mnemonic, ldc_value(value)),
        Instruction::Var { name, .. } => format!("{} {}", mnemonic, name),
        Instruction::Iinc { name, increment } => format!("{} {} {}", mnemonic, name, increment),
        Instruction::Field {
            owner, name, desc, ..
        } => format!("{} {}.{} {}", mnemonic, owner, name, desc),
        Instruction::Method {
            opcode,
            owner,
            name,
            desc,
            interface,
        } => {
            let itf = if *interface && *opcode != Opcode::InvokeInterface {
                " itf"
            } else {
                ""
            };
            format!("{} {}.{}{}{}", mnemonic, owner, name, desc, itf)
        }
        Instruction::Indy {
            name,
            desc,
            bootstrap,
            args,
        } => {
            let args: Vec<String> = args.iter().map(ldc_value).collect();
            format!(
                "{} {} {} {} args[{}]",
                mnemonic,
                name,
                desc,
                handle(bootstrap),
                args.join(", ")
            )
        }
        Instruction::Jump { target, .. } => format!("{} {}", mnemonic, target),
        Instruction::TableSwitch {
            min,
            max,
            labels,
            default,
        } => format!(
            "{} range({}:{}) offsets({}) default({})",
            mnemonic,
            min,
            max,
            labels.join(", "),
            default
        ),
        Instruction::LookupSwitch { mapping, default } => {
            let mapping: Vec<String> = mapping
                .iter()
                .map(|(key, label)| format!("{}={}", key, label))
                .collect();
            format!(
                "{} mapping({}) default({})",
                mnemonic,
                mapping.join(", "),
                default
            )
        }
        Instruction::Type { type_name, .. } => format!("{} {}", mnemonic, type_name),
        Instruction::MultiArray { desc, dimensions } => {
            format!("{} {} {}", mnemonic, desc, dimensions)
        }
        Instruction::NewArray(base_type) => format!("{} {}", mnemonic, base_type.name()),
    }
}

/// Render a constant so that it parses back to the same value
pub fn ldc_value(value: &LdcValue) -> String {
    match value {
        LdcValue::Int(int) => int.to_string(),
        LdcValue::Long(long) => format!("{}L", long),
        LdcValue::Float(float) if float.is_nan() => String::from("NaNF"),
        LdcValue::Float(float) if float.is_infinite() => {
            format!("{}InfinityF", if *float < 0.0 { "-" } else { "" })
        }
        LdcValue::Float(float) => format!("{:?}F", float),
        LdcValue::Double(double) if double.is_nan() => String::from("NaN"),
        LdcValue::Double(double) if double.is_infinite() => {
            format!("{}Infinity", if *double < 0.0 { "-" } else { "" })
        }
        LdcValue::Double(double) => format!("{:?}", double),
        LdcValue::String(raw) => format!("\"{}\"", raw),
        LdcValue::Type(desc) => desc.clone(),
        LdcValue::Handle(h) => handle(h),
    }
}

fn handle(handle: &Handle) -> String {
    format!(
        "handle[{} {}.{} {}]",
        handle.kind.mnemonic(),
        handle.owner,
        handle.name,
        handle.desc
    )
}

fn print_annotation(annotation: &Annotation, dialect: Dialect) -> String {
    let directive = if annotation.visible {
        "visible_annotation"
    } else {
        "invisible_annotation"
    };
    let args: Vec<String> = annotation
        .args
        .iter()
        .map(|(key, value)| format!("{}={}", key, annotation_value(value)))
        .collect();
    format!(
        "{} {}({})",
        dialect.directive(directive),
        annotation.type_name,
        args.join(", ")
    )
}

fn annotation_value(value: &AnnotationValue) -> String {
    match value {
        AnnotationValue::Literal(literal) => ldc_value(literal),
        AnnotationValue::Enum { type_desc, name } => format!("{}.{}", type_desc, name),
        AnnotationValue::Array(values) => {
            let values: Vec<String> = values.iter().map(annotation_value).collect();
            format!("{{{}}}", values.join(", "))
        }
    }
}
