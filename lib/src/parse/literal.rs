//! Literal operands: numbers, strings, types, handles, and annotation values

use super::cursor::{split_top_level, Cursor};
use crate::ast::{AnnotationValue, Handle, LdcValue};
use crate::jvm::HandleKind;

/// Parse a numeric literal
///
/// Integral literals are `int` unless suffixed with `L`. Literals with a `.` or an exponent are
/// `double` unless suffixed with `F`. Hexadecimal literals may use every bit of their type, so
/// `0xFFFFFFFF` is `-1`. Out of range literals are rejected rather than truncated.
pub fn parse_number(token: &str) -> Option<LdcValue> {
    let (negative, unsigned) = match token.as_bytes().first()? {
        b'-' => (true, &token[1..]),
        b'+' => (false, &token[1..]),
        _ => (false, token),
    };

    if let Some(special) = parse_special_float(unsigned, negative) {
        return Some(special);
    }

    if let Some(hex) = unsigned
        .strip_prefix("0x")
        .or_else(|| unsigned.strip_prefix("0X"))
    {
        return parse_hex(hex, negative);
    }

    let (body, suffix) = match unsigned.char_indices().last()? {
        (idx, c @ ('L' | 'l' | 'F' | 'f' | 'D' | 'd')) => (&unsigned[..idx], Some(c)),
        _ => (unsigned, None),
    };
    if body.is_empty() || !body.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return None;
    }
    let signed = format!("{}{}", if negative { "-" } else { "" }, body);
    let is_decimal = body.contains(|c: char| matches!(c, '.' | 'e' | 'E'));
    if !body
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
    {
        return None;
    }

    match suffix {
        Some('L' | 'l') if !is_decimal => signed.parse().ok().map(LdcValue::Long),
        Some('F' | 'f') => signed.parse().ok().map(LdcValue::Float),
        Some('D' | 'd') => signed.parse().ok().map(LdcValue::Double),
        None if is_decimal => signed.parse().ok().map(LdcValue::Double),
        None => signed.parse().ok().map(LdcValue::Int),
        _ => None,
    }
}

fn parse_special_float(unsigned: &str, negative: bool) -> Option<LdcValue> {
    let (body, is_float) = match unsigned.strip_suffix(|c: char| matches!(c, 'F' | 'f')) {
        Some(body) => (body, true),
        None => (
            unsigned
                .strip_suffix(|c: char| matches!(c, 'D' | 'd'))
                .unwrap_or(unsigned),
            false,
        ),
    };
    let value = match body {
        "NaN" => f64::NAN,
        "Infinity" if negative => f64::NEG_INFINITY,
        "Infinity" => f64::INFINITY,
        _ => return None,
    };
    if is_float {
        Some(LdcValue::Float(value as f32))
    } else {
        Some(LdcValue::Double(value))
    }
}

fn parse_hex(hex: &str, negative: bool) -> Option<LdcValue> {
    let (digits, is_long) = match hex.strip_suffix(|c: char| matches!(c, 'L' | 'l')) {
        Some(digits) => (digits, true),
        None => (hex, false),
    };
    if digits.is_empty() {
        return None;
    }
    if is_long {
        let bits = u64::from_str_radix(digits, 16).ok()? as i64;
        Some(LdcValue::Long(if negative { bits.wrapping_neg() } else { bits }))
    } else {
        let bits = u32::from_str_radix(digits, 16).ok()? as i32;
        Some(LdcValue::Int(if negative { bits.wrapping_neg() } else { bits }))
    }
}

/// Parse a literal that must be a plain `int`
pub fn parse_int(token: &str) -> Option<i32> {
    match parse_number(token)? {
        LdcValue::Int(value) => Some(value),
        _ => None,
    }
}

/// Parse the operand of `ldc` (also used for bootstrap arguments)
///
/// The whole cursor must be consumed.
pub fn parse_ldc_value(cursor: &mut Cursor) -> Option<LdcValue> {
    cursor.skip_whitespace();
    let value = if cursor.peek() == Some('"') {
        LdcValue::String(String::from(cursor.string_literal()?))
    } else if cursor.keyword("handle") {
        LdcValue::Handle(parse_handle(cursor)?)
    } else {
        let token = cursor.word()?;
        parse_type_literal(token)
            .map(LdcValue::Type)
            .or_else(|| parse_number(token))?
    };
    if cursor.at_end() {
        Some(value)
    } else {
        None
    }
}

/// Class literals are written as reference descriptors, method types as method descriptors
fn parse_type_literal(token: &str) -> Option<String> {
    let is_type = (token.starts_with('L') && token.ends_with(';'))
        || token.starts_with('[')
        || token.starts_with('(');
    if is_type {
        Some(String::from(token))
    } else {
        None
    }
}

/// Parse `[H_KIND owner.name desc]` (after the `handle` keyword)
///
/// A method descriptor may also be attached directly to the name, as in `owner.name(I)V`.
pub fn parse_handle(cursor: &mut Cursor) -> Option<Handle> {
    let inner = cursor.delimited('[', ']')?;
    let mut inner = Cursor::new(inner);
    let kind = HandleKind::from_mnemonic(inner.word()?)?;
    inner.skip_whitespace();
    let member = inner.take_while(|c| !c.is_whitespace() && c != '(')?;
    let desc = inner.word()?;
    if !inner.at_end() {
        return None;
    }
    let (owner, name) = split_member(member)?;
    Some(Handle {
        kind,
        owner: String::from(owner),
        name: String::from(name),
        desc: String::from(desc),
    })
}

/// Split `owner.name` on the last `.`
pub fn split_member(member: &str) -> Option<(&str, &str)> {
    let (owner, name) = member.rsplit_once('.')?;
    if owner.is_empty() || name.is_empty() {
        None
    } else {
        Some((owner, name))
    }
}

/// Parse an annotation element value
pub fn parse_annotation_value(text: &str) -> Option<AnnotationValue> {
    let text = text.trim();
    if let Some(inner) = text.strip_prefix('{').and_then(|t| t.strip_suffix('}')) {
        return split_top_level(inner, ',')
            .into_iter()
            .map(parse_annotation_value)
            .collect::<Option<Vec<_>>>()
            .map(AnnotationValue::Array);
    }
    if text.starts_with('L') {
        if let Some((type_desc, name)) = text.split_once(";.") {
            return Some(AnnotationValue::Enum {
                type_desc: format!("{};", type_desc),
                name: String::from(name),
            });
        }
    }
    match parse_ldc_value(&mut Cursor::new(text))? {
        LdcValue::Handle(_) => None,
        literal => Some(AnnotationValue::Literal(literal)),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn integral_literals() {
        assert_eq!(parse_number("42"), Some(LdcValue::Int(42)));
        assert_eq!(parse_number("-42"), Some(LdcValue::Int(-42)));
        assert_eq!(parse_number("+7"), Some(LdcValue::Int(7)));
        assert_eq!(parse_number("42L"), Some(LdcValue::Long(42)));
        assert_eq!(parse_number("-2147483648"), Some(LdcValue::Int(i32::MIN)));
        assert_eq!(parse_number("2147483648"), None);
        assert_eq!(parse_number("2147483648L"), Some(LdcValue::Long(2147483648)));
        assert_eq!(parse_number("12x"), None);
        assert_eq!(parse_number("-"), None);
    }

    #[test]
    fn hex_literals() {
        assert_eq!(parse_number("0x10"), Some(LdcValue::Int(16)));
        assert_eq!(parse_number("0xFFFFFFFF"), Some(LdcValue::Int(-1)));
        assert_eq!(parse_number("-0x10"), Some(LdcValue::Int(-16)));
        assert_eq!(parse_number("0x1FFFFFFFF"), None);
        assert_eq!(
            parse_number("0xFFFFFFFFFFFFFFFFL"),
            Some(LdcValue::Long(-1))
        );
        assert_eq!(parse_number("0xL"), None);
    }

    #[test]
    fn floating_literals() {
        assert_eq!(parse_number("1.5"), Some(LdcValue::Double(1.5)));
        assert_eq!(parse_number("1.5F"), Some(LdcValue::Float(1.5)));
        assert_eq!(parse_number("2D"), Some(LdcValue::Double(2.0)));
        assert_eq!(parse_number("1e3"), Some(LdcValue::Double(1000.0)));
        assert_eq!(parse_number("-0.0"), Some(LdcValue::Double(-0.0)));
        assert_eq!(parse_number("1.5L"), None);
        assert_eq!(
            parse_number("-Infinity"),
            Some(LdcValue::Double(f64::NEG_INFINITY))
        );
        assert_eq!(parse_number("InfinityF"), Some(LdcValue::Float(f32::INFINITY)));
        assert!(matches!(parse_number("NaNF"), Some(LdcValue::Float(f)) if f.is_nan()));
        assert!(matches!(parse_number("NaN"), Some(LdcValue::Double(d)) if d.is_nan()));
    }

    #[test]
    fn ldc_operands() {
        let parse = |text| parse_ldc_value(&mut Cursor::new(text));
        assert_eq!(
            parse(r#""a\tb""#),
            Some(LdcValue::String(String::from(r"a\tb")))
        );
        assert_eq!(
            parse("Ljava/lang/String;"),
            Some(LdcValue::Type(String::from("Ljava/lang/String;")))
        );
        assert_eq!(parse("(I)V"), Some(LdcValue::Type(String::from("(I)V"))));
        assert_eq!(parse("5 6"), None);
        assert_eq!(parse("I"), None);
        assert_eq!(
            parse("handle[H_INVOKESTATIC a/B.c (I)V]"),
            Some(LdcValue::Handle(Handle {
                kind: HandleKind::InvokeStatic,
                owner: String::from("a/B"),
                name: String::from("c"),
                desc: String::from("(I)V"),
            }))
        );
        assert_eq!(
            parse("handle[H_GETSTATIC a/B.c(I)V]").map(|v| v.kind_name()),
            Some("handle")
        );
    }

    #[test]
    fn annotation_values() {
        assert_eq!(
            parse_annotation_value("{1, \"a,b\"}"),
            Some(AnnotationValue::Array(vec![
                AnnotationValue::Literal(LdcValue::Int(1)),
                AnnotationValue::Literal(LdcValue::String(String::from("a,b"))),
            ]))
        );
        assert_eq!(
            parse_annotation_value("Ljava/lang/annotation/RetentionPolicy;.RUNTIME"),
            Some(AnnotationValue::Enum {
                type_desc: String::from("Ljava/lang/annotation/RetentionPolicy;"),
                name: String::from("RUNTIME"),
            })
        );
        assert_eq!(parse_annotation_value("handle[H_INVOKESTATIC a.b ()V]"), None);
    }
}
