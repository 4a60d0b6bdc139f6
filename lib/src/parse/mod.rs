//! Parse assembly text into a [`Unit`]
//!
//! The format is line oriented. The first non-blank line defines the member, and every following
//! line holds any number of `label:` declarations followed by either a meta directive or some
//! instructions:
//!
//! ```text
//! public static max(I a, I b)I
//! A:
//!     iload a
//!     iload b
//!     if_icmpge B
//!     iload b
//!     ireturn
//! B:  iload a
//!     ireturn
//! ```
//!
//! Parsing is tolerant: a method body line that cannot be understood is kept verbatim as
//! [`CodeItem::Unmatched`] so the rest of the unit is still usable. Only a malformed definition
//! line (or a field with a body) is a [`ParseError`].

mod cursor;
mod instruction;
mod literal;

pub use literal::parse_number;

use crate::ast::*;
use crate::jvm::Modifier;
pub(crate) use cursor::is_identifier;
use cursor::{is_identifier_char, split_top_level, strip_comment, Cursor};
pub use instruction::parse_instructions;
use literal::{parse_annotation_value, parse_ldc_value};
use std::fmt;

/// Spelling of modifiers and meta directives
///
/// The prefixed dialect writes them with a leading `.` (`.static`, `.signature`, `.catch`), in
/// which case the bare spellings are not recognized.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    Bare,
    Prefixed,
}

impl Dialect {
    pub fn from_prefixed(use_prefixed_keywords: bool) -> Dialect {
        if use_prefixed_keywords {
            Dialect::Prefixed
        } else {
            Dialect::Bare
        }
    }

    /// How a meta directive is written (eg. `SIGNATURE` or `.signature`)
    pub fn directive(&self, keyword: &str) -> String {
        match self {
            Dialect::Bare => keyword.to_ascii_uppercase(),
            Dialect::Prefixed => format!(".{}", keyword.to_ascii_lowercase()),
        }
    }

    /// How a modifier is written (eg. `static` or `.static`)
    pub fn modifier(&self, modifier: Modifier) -> String {
        match self {
            Dialect::Bare => String::from(modifier.keyword()),
            Dialect::Prefixed => format!(".{}", modifier.keyword()),
        }
    }

    fn parse_modifier(&self, word: &str) -> Option<Modifier> {
        match self {
            Dialect::Bare => Modifier::from_keyword(word),
            Dialect::Prefixed => Modifier::from_keyword(word.strip_prefix('.')?),
        }
    }
}

/// Failure to parse the definition of a unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// 1-based line
    pub line: usize,
    pub message: String,
}

impl ParseError {
    fn new(line: usize, message: impl Into<String>) -> ParseError {
        ParseError {
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ParseError {}

/// Parse a whole unit
pub fn parse_unit(text: &str, dialect: Dialect) -> Result<Unit, ParseError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, strip_comment(line).trim()))
        .filter(|(_, line)| !line.is_empty());

    let (header_line, header) = lines
        .next()
        .ok_or_else(|| ParseError::new(1, "missing member definition"))?;
    let mut builder = UnitBuilder {
        definition: parse_definition(header, header_line, dialect)?,
        entries: vec![],
        dialect,
    };
    for (line, text) in lines {
        builder.body_line(line, text)?;
    }
    Ok(builder.finish())
}

fn parse_definition(text: &str, line: usize, dialect: Dialect) -> Result<Definition, ParseError> {
    let mut cursor = Cursor::new(text);
    let mut modifiers = vec![];
    loop {
        let saved = cursor;
        match cursor.word().and_then(|word| dialect.parse_modifier(word)) {
            Some(modifier) => modifiers.push(modifier),
            None => {
                cursor = saved;
                break;
            }
        }
    }
    let rest = cursor.rest().trim();

    if let Some(open) = rest.find('(') {
        let name = rest[..open].trim();
        let close = rest[open..]
            .find(')')
            .map(|idx| idx + open)
            .ok_or_else(|| ParseError::new(line, "unclosed parameter list"))?;
        let return_type = rest[close + 1..].trim();
        check_name(name, line)?;
        if return_type.is_empty() || return_type.contains(char::is_whitespace) {
            return Err(ParseError::new(line, "expected a return type after parameters"));
        }

        let mut parameters = vec![];
        for parameter in split_top_level(&rest[open + 1..close], ',') {
            let mut parts = parameter.split_whitespace();
            match (parts.next(), parts.next(), parts.next()) {
                (Some(desc), Some(name), None) if is_identifier(name) => {
                    parameters.push(MethodParameter {
                        desc: String::from(desc),
                        name: String::from(name),
                    })
                }
                _ => {
                    let msg = format!(
                        "expected `descriptor name` parameter, found `{}`",
                        parameter
                    );
                    return Err(ParseError::new(line, msg));
                }
            }
        }

        Ok(Definition::Method(MethodDefinition {
            modifiers,
            name: String::from(name),
            parameters,
            return_type: String::from(return_type),
            signature: None,
            thrown: vec![],
            const_value: None,
            line,
        }))
    } else {
        let mut parts = rest.split_whitespace();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), Some(desc), None) => {
                check_name(name, line)?;
                Ok(Definition::Field(FieldDefinition {
                    modifiers,
                    name: String::from(name),
                    desc: String::from(desc),
                    signature: None,
                    const_value: None,
                    annotations: vec![],
                    line,
                }))
            }
            _ => Err(ParseError::new(
                line,
                "expected `name descriptor` for a field or `name(parameters)return` for a method",
            )),
        }
    }
}

fn check_name(name: &str, line: usize) -> Result<(), ParseError> {
    if name.is_empty() || name.contains(char::is_whitespace) || name.contains('.') {
        Err(ParseError::new(line, format!("invalid member name `{}`", name)))
    } else {
        Ok(())
    }
}

/// Directive or instructions following the labels on a body line
enum BodyItem {
    Signature(String),
    Throws(String),
    ConstValue(LdcValue),
    Annotation(Annotation),
    Code(Vec<CodeItem>),
}

struct UnitBuilder {
    definition: Definition,
    entries: Vec<CodeEntry>,
    dialect: Dialect,
}

impl UnitBuilder {
    fn body_line(&mut self, line: usize, text: &str) -> Result<(), ParseError> {
        let mut cursor = Cursor::new(text);

        // Leading `label:` declarations
        loop {
            let saved = cursor;
            match cursor.take_while(is_identifier_char) {
                Some(label) if cursor.peek() == Some(':') => {
                    cursor.eat(':');
                    self.push_code(line, CodeItem::Label(String::from(label)))?;
                }
                _ => {
                    cursor = saved;
                    break;
                }
            }
        }

        let rest = cursor.rest().trim();
        if rest.is_empty() {
            return Ok(());
        }
        let item = parse_body_item(rest, self.dialect, self.definition_is_method())
            .unwrap_or_else(|| BodyItem::Code(vec![CodeItem::Unmatched(String::from(rest))]));

        match item {
            BodyItem::Code(items) => {
                for item in items {
                    self.push_code(line, item)?;
                }
            }
            BodyItem::Annotation(annotation) => {
                if let Definition::Field(field) = &mut self.definition {
                    field.annotations.push(Located::new(annotation, line));
                } else {
                    self.push_code(line, CodeItem::Annotation(annotation))?;
                }
            }
            BodyItem::Signature(signature) => {
                let signature = Some(Located::new(signature, line));
                match &mut self.definition {
                    Definition::Method(method) => method.signature = signature,
                    Definition::Field(field) => field.signature = signature,
                }
            }
            BodyItem::ConstValue(value) => {
                let value = Some(Located::new(value, line));
                match &mut self.definition {
                    Definition::Method(method) => method.const_value = value,
                    Definition::Field(field) => field.const_value = value,
                }
            }
            BodyItem::Throws(thrown) => match &mut self.definition {
                Definition::Method(method) => method.thrown.push(Located::new(thrown, line)),
                Definition::Field(_) => {
                    return Err(ParseError::new(line, "fields cannot declare thrown exceptions"))
                }
            },
        }
        Ok(())
    }

    fn definition_is_method(&self) -> bool {
        matches!(self.definition, Definition::Method(_))
    }

    fn push_code(&mut self, line: usize, item: CodeItem) -> Result<(), ParseError> {
        if let Definition::Field(_) = self.definition {
            let msg = match item {
                CodeItem::Unmatched(raw) => format!("unrecognized field directive `{}`", raw),
                _ => String::from("fields cannot have code"),
            };
            return Err(ParseError::new(line, msg));
        }
        self.entries.push(CodeEntry::new(line, item));
        Ok(())
    }

    fn finish(self) -> Unit {
        let code = match self.definition {
            Definition::Method(_) => Some(Code::new(self.entries)),
            Definition::Field(_) => None,
        };
        Unit {
            definition: self.definition,
            code,
        }
    }
}

fn parse_body_item(text: &str, dialect: Dialect, is_method: bool) -> Option<BodyItem> {
    let mut cursor = Cursor::new(text);

    if cursor.dialect_keyword(dialect, "signature") {
        let signature = cursor.rest().trim();
        return if signature.is_empty() || signature.contains(char::is_whitespace) {
            None
        } else {
            Some(BodyItem::Signature(String::from(signature)))
        };
    }
    if cursor.dialect_keyword(dialect, "throws") {
        let thrown = cursor.word()?;
        return if cursor.at_end() {
            Some(BodyItem::Throws(String::from(thrown)))
        } else {
            None
        };
    }
    if cursor.dialect_keyword(dialect, "const-value") || cursor.dialect_keyword(dialect, "value")
    {
        return parse_ldc_value(&mut cursor).map(BodyItem::ConstValue);
    }
    if cursor.dialect_keyword(dialect, "visible_annotation") {
        return parse_annotation(&mut cursor, true).map(BodyItem::Annotation);
    }
    if cursor.dialect_keyword(dialect, "invisible_annotation") {
        return parse_annotation(&mut cursor, false).map(BodyItem::Annotation);
    }

    // Everything else is only meaningful in method code
    if !is_method {
        return None;
    }
    let item = if cursor.dialect_keyword(dialect, "try") {
        CodeItem::TryCatch(parse_try_catch(&mut cursor, dialect)?)
    } else if cursor.dialect_keyword(dialect, "line") {
        let label = cursor.identifier()?;
        let number = cursor.word()?.parse().ok()?;
        if !cursor.at_end() {
            return None;
        }
        CodeItem::LineNumber {
            label: String::from(label),
            number,
        }
    } else if cursor.dialect_keyword(dialect, "expr") {
        let source = cursor.rest().trim();
        if source.is_empty() {
            return None;
        }
        CodeItem::Expression(String::from(source))
    } else {
        return parse_instructions(text)
            .map(|insns| BodyItem::Code(insns.into_iter().map(CodeItem::Instruction).collect()));
    };
    Some(BodyItem::Code(vec![item]))
}

/// `start end CATCH(type) handler` (after the `TRY`)
fn parse_try_catch(cursor: &mut Cursor, dialect: Dialect) -> Option<TryCatch> {
    let start = cursor.identifier()?;
    let end = cursor.identifier()?;
    if !cursor.dialect_keyword(dialect, "catch") {
        return None;
    }
    let catch_type = match cursor.delimited('(', ')')?.trim() {
        "*" => None,
        "" => return None,
        typ if typ.contains(char::is_whitespace) => return None,
        typ => Some(String::from(typ)),
    };
    let handler = cursor.identifier()?;
    if !cursor.at_end() {
        return None;
    }
    Some(TryCatch {
        start: String::from(start),
        end: String::from(end),
        handler: String::from(handler),
        catch_type,
    })
}

/// `type(key=value, ...)` (after the annotation directive)
fn parse_annotation(cursor: &mut Cursor, visible: bool) -> Option<Annotation> {
    let type_name = cursor.take_while(|c| !c.is_whitespace() && c != '(')?;
    let args = split_top_level(cursor.delimited('(', ')')?, ',')
        .into_iter()
        .map(|arg| {
            let (key, value) = arg.split_once('=')?;
            let key = key.trim();
            if !is_identifier(key) {
                return None;
            }
            Some((String::from(key), parse_annotation_value(value)?))
        })
        .collect::<Option<Vec<_>>>()?;
    if !cursor.at_end() {
        return None;
    }
    Some(Annotation {
        visible,
        type_name: String::from(type_name),
        args,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::Opcode;

    fn parse(text: &str) -> Unit {
        parse_unit(text, Dialect::Bare).expect("unit should parse")
    }

    fn items(unit: &Unit) -> Vec<&CodeItem> {
        unit.code
            .as_ref()
            .expect("method code")
            .entries
            .iter()
            .map(|entry| &entry.item)
            .collect()
    }

    #[test]
    fn method_definition() {
        let unit = parse("public static max(I a, Ljava/lang/String; b)V\nreturn");
        let method = unit.method().unwrap();
        assert_eq!(method.modifiers, vec![Modifier::Public, Modifier::Static]);
        assert_eq!(method.name, "max");
        assert_eq!(method.descriptor(), "(ILjava/lang/String;)V");
        assert_eq!(method.parameters[1].name, "b");
        assert_eq!(method.line, 1);
    }

    #[test]
    fn method_with_space_before_parameters() {
        let unit = parse("private <init> ()V");
        assert_eq!(unit.method().unwrap().name, "<init>");
        assert_eq!(unit.code, Some(Code::default()));
    }

    #[test]
    fn field_definition_with_meta() {
        let unit = parse(
            "private static final field I\n\
             SIGNATURE TT;\n\
             CONST-VALUE 0x10\n\
             VISIBLE_ANNOTATION java/lang/Deprecated()",
        );
        let field = unit.field().unwrap();
        assert_eq!(field.desc, "I");
        assert_eq!(field.signature, Some(Located::new(String::from("TT;"), 2)));
        assert_eq!(field.const_value, Some(Located::new(LdcValue::Int(16), 3)));
        assert_eq!(field.annotations[0].value.type_name, "java/lang/Deprecated");
        assert_eq!(unit.code, None);
    }

    #[test]
    fn malformed_definitions() {
        assert_eq!(parse_unit("  \n// nothing", Dialect::Bare).unwrap_err().line, 1);
        assert_eq!(parse_unit("\n\nfoo(I)", Dialect::Bare).unwrap_err().line, 3);
        assert!(parse_unit("foo(I x y)V", Dialect::Bare).is_err());
        assert!(parse_unit("public static", Dialect::Bare).is_err());
        assert!(parse_unit("field I\nnop", Dialect::Bare).is_err());
    }

    #[test]
    fn labels_share_lines() {
        let unit = parse("m()V\nA: B: nop nop\nC:\nreturn");
        assert_eq!(
            items(&unit),
            vec![
                &CodeItem::Label(String::from("A")),
                &CodeItem::Label(String::from("B")),
                &CodeItem::Instruction(Instruction::Plain(Opcode::Nop)),
                &CodeItem::Instruction(Instruction::Plain(Opcode::Nop)),
                &CodeItem::Label(String::from("C")),
                &CodeItem::Instruction(Instruction::Plain(Opcode::Return)),
            ]
        );
        let lines: Vec<usize> = unit.code.unwrap().entries.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![2, 2, 2, 2, 3, 4]);
    }

    #[test]
    fn unrecognized_lines_are_kept() {
        let unit = parse("m()V\nA: frobnicate 1 2 // comment\niload_0\nreturn");
        assert_eq!(
            items(&unit),
            vec![
                &CodeItem::Label(String::from("A")),
                &CodeItem::Unmatched(String::from("frobnicate 1 2")),
                &CodeItem::Unmatched(String::from("iload_0")),
                &CodeItem::Instruction(Instruction::Plain(Opcode::Return)),
            ]
        );
        assert!(unit.has_unmatched());
    }

    #[test]
    fn meta_directives() {
        let unit = parse(
            "m()V\n\
             THROWS java/io/IOException\n\
             TRY a b CATCH(*) c\n\
             TRY a b CATCH( java/lang/Exception ) c\n\
             LINE a 12\n\
             EXPR System.out.println(\"hi\");\n\
             INVISIBLE_ANNOTATION a/B(value=1, names={\"x\", \"y\"})",
        );
        assert_eq!(unit.method().unwrap().thrown[0].value, "java/io/IOException");
        let items = items(&unit);
        assert_eq!(
            items[0],
            &CodeItem::TryCatch(TryCatch {
                start: String::from("a"),
                end: String::from("b"),
                handler: String::from("c"),
                catch_type: None,
            })
        );
        assert!(matches!(
            items[1],
            CodeItem::TryCatch(TryCatch { catch_type: Some(t), .. }) if t == "java/lang/Exception"
        ));
        assert_eq!(
            items[2],
            &CodeItem::LineNumber {
                label: String::from("a"),
                number: 12
            }
        );
        assert_eq!(
            items[3],
            &CodeItem::Expression(String::from("System.out.println(\"hi\");"))
        );
        match items[4] {
            CodeItem::Annotation(annotation) => {
                assert!(!annotation.visible);
                assert_eq!(annotation.args.len(), 2);
                assert_eq!(annotation.args[1].0, "names");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn prefixed_dialect() {
        let text = ".public .static m()V\n.signature ()V\nSIGNATURE ()V\n.try A B .catch(*) C";
        let unit = parse_unit(text, Dialect::Prefixed).unwrap();
        let method = unit.method().unwrap();
        assert_eq!(method.modifiers, vec![Modifier::Public, Modifier::Static]);
        assert_eq!(method.signature.as_ref().map(|s| s.line), Some(2));
        let items = items(&unit);
        assert_eq!(items[0], &CodeItem::Unmatched(String::from("SIGNATURE ()V")));
        assert!(matches!(items[1], CodeItem::TryCatch(_)));

        // Bare modifiers are not modifiers in the prefixed dialect
        assert!(parse_unit("public m()V", Dialect::Prefixed).is_err());
    }

    #[test]
    fn string_escapes_stay_raw() {
        let unit = parse("m()V\nldc \"a\\nb // not a comment\"");
        assert_eq!(
            items(&unit),
            vec![&CodeItem::Instruction(Instruction::Ldc(LdcValue::String(
                String::from("a\\nb // not a comment")
            )))]
        );
    }
}
