use std::fmt::{Display, Formatter, Result, Write};

/// Wrapper whose [`Display`] implementation renders the body of a quoted string literal
///
/// Only printable ASCII is written as-is. Everything else becomes a `\uXXXX` escape (supplementary
/// characters as a surrogate pair), so the output survives any text encoding.
pub struct EscapedStr<'a>(pub &'a str);

impl Display for EscapedStr<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let mut code_units = [0; 2];
        for c in self.0.chars() {
            match c {
                '\t' => f.write_str("\\t")?,
                '\r' => f.write_str("\\r")?,
                '\n' => f.write_str("\\n")?,
                '\u{8}' => f.write_str("\\b")?,
                '\u{c}' => f.write_str("\\f")?,
                '\\' | '"' => {
                    f.write_char('\\')?;
                    f.write_char(c)?;
                }
                '\x20'..='\x7e' => f.write_char(c)?,
                _ => {
                    for code_unit in c.encode_utf16(&mut code_units) {
                        f.write_fmt(format_args!("\\u{:04x}", code_unit))?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Evaluate the escapes in the body of a string literal
///
/// Accepts `\n`, `\t`, `\r`, `\b`, `\f`, `\0`, `\"`, `\'`, `\\`, and `\uXXXX`. Surrogate pairs
/// written as two consecutive `\u` escapes are combined; unpaired surrogates are rejected.
pub fn unescape(raw: &str) -> std::result::Result<String, String> {
    let mut output = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    let mut pending_high: Option<u16> = None;

    while let Some(c) = chars.next() {
        if c != '\\' {
            if pending_high.is_some() {
                return Err(String::from("Unpaired surrogate in string literal"));
            }
            output.push(c);
            continue;
        }

        let escaped = chars
            .next()
            .ok_or_else(|| String::from("Dangling '\\' at end of string literal"))?;
        let simple = match escaped {
            'n' => Some('\n'),
            't' => Some('\t'),
            'r' => Some('\r'),
            'b' => Some('\u{8}'),
            'f' => Some('\u{c}'),
            '0' => Some('\0'),
            '"' | '\'' | '\\' => Some(escaped),
            'u' => None,
            other => return Err(format!("Unknown escape '\\{}'", other)),
        };
        if let Some(simple) = simple {
            if pending_high.is_some() {
                return Err(String::from("Unpaired surrogate in string literal"));
            }
            output.push(simple);
            continue;
        }

        // `\u` may be followed by any number of extra `u`s, like in Java source
        let mut digits = String::with_capacity(4);
        for d in chars.by_ref() {
            if d == 'u' && digits.is_empty() {
                continue;
            }
            digits.push(d);
            if digits.len() == 4 {
                break;
            }
        }
        let code_unit = u16::from_str_radix(&digits, 16)
            .ok()
            .filter(|_| digits.len() == 4)
            .ok_or_else(|| format!("Invalid unicode escape '\\u{}'", digits))?;

        match (pending_high.take(), code_unit) {
            (None, 0xD800..=0xDBFF) => pending_high = Some(code_unit),
            (None, 0xDC00..=0xDFFF) => {
                return Err(String::from("Unpaired surrogate in string literal"))
            }
            (None, unit) => output.push(char::from_u32(unit as u32).unwrap_or('\u{FFFD}')),
            (Some(high), 0xDC00..=0xDFFF) => {
                let decoded = char::decode_utf16([high, code_unit])
                    .next()
                    .and_then(|r| r.ok())
                    .ok_or_else(|| String::from("Invalid surrogate pair"))?;
                output.push(decoded);
            }
            (Some(_), _) => return Err(String::from("Unpaired surrogate in string literal")),
        }
    }

    if pending_high.is_some() {
        return Err(String::from("Unpaired surrogate in string literal"));
    }
    Ok(output)
}
