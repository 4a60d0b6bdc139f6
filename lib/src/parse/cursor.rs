use super::Dialect;

/// Position inside a single line of assembly
///
/// Every accessor returns `None` instead of failing, and leaves the cursor where it was in that
/// case. Callers fall back to keeping the whole line as unmatched text.
#[derive(Clone, Copy)]
pub struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

/// Characters that may appear in label and variable names
pub fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

pub fn is_identifier(text: &str) -> bool {
    !text.is_empty() && text.chars().all(is_identifier_char)
}

impl<'a> Cursor<'a> {
    pub fn new(text: &'a str) -> Cursor<'a> {
        Cursor { text, pos: 0 }
    }

    /// Everything not yet consumed
    pub fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    pub fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    /// Is there nothing but whitespace left?
    pub fn at_end(&self) -> bool {
        self.rest().trim().is_empty()
    }

    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    /// Consume `c` if it comes next (after whitespace)
    pub fn eat(&mut self, c: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            true
        } else {
            false
        }
    }

    /// Consume the run of non-whitespace characters that comes next
    pub fn word(&mut self) -> Option<&'a str> {
        self.take_while(|c| !c.is_whitespace())
    }

    pub fn identifier(&mut self) -> Option<&'a str> {
        self.take_while(is_identifier_char)
    }

    /// Consume the (non-empty) run of characters matching the predicate, after whitespace
    pub fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> Option<&'a str> {
        self.skip_whitespace();
        let rest = self.rest();
        let len = rest
            .char_indices()
            .find(|(_, c)| !predicate(*c))
            .map_or(rest.len(), |(idx, _)| idx);
        if len == 0 {
            None
        } else {
            self.pos += len;
            Some(&rest[..len])
        }
    }

    /// Consume a case-insensitive keyword, which must not run into further identifier characters
    pub fn keyword(&mut self, keyword: &str) -> bool {
        self.skip_whitespace();
        let rest = self.rest();
        match rest.get(..keyword.len()) {
            Some(prefix) if prefix.eq_ignore_ascii_case(keyword) => {
                let boundary = rest[keyword.len()..]
                    .chars()
                    .next()
                    .map_or(true, |c| !is_identifier_char(c) && c != '-');
                if boundary {
                    self.pos += keyword.len();
                }
                boundary
            }
            _ => false,
        }
    }

    /// Consume a meta keyword, spelled the way the dialect wants
    pub fn dialect_keyword(&mut self, dialect: Dialect, keyword: &str) -> bool {
        let saved = *self;
        let ok = match dialect {
            Dialect::Bare => self.keyword(keyword),
            Dialect::Prefixed => self.eat('.') && self.keyword(keyword),
        };
        if !ok {
            *self = saved;
        }
        ok
    }

    /// Consume a quoted string, returning its raw body (escapes untouched)
    pub fn string_literal(&mut self) -> Option<&'a str> {
        self.skip_whitespace();
        let rest = self.rest();
        let mut chars = rest.char_indices();
        if !matches!(chars.next(), Some((_, '"'))) {
            return None;
        }
        let mut escaped = false;
        for (idx, c) in chars {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => {
                    self.pos += idx + 1;
                    return Some(&rest[1..idx]);
                }
                _ => (),
            }
        }
        None
    }

    /// Consume a bracketed group, returning the contents between `open` and the matching `close`
    ///
    /// Brackets inside string literals do not count.
    pub fn delimited(&mut self, open: char, close: char) -> Option<&'a str> {
        self.skip_whitespace();
        let rest = self.rest();
        if !rest.starts_with(open) {
            return None;
        }
        let mut depth = 0;
        let mut in_string = false;
        let mut escaped = false;
        for (idx, c) in rest.char_indices() {
            if in_string {
                match c {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => (),
                }
            } else if c == '"' {
                in_string = true;
            } else if c == open {
                depth += 1;
            } else if c == close {
                depth -= 1;
                if depth == 0 {
                    self.pos += idx + close.len_utf8();
                    return Some(&rest[open.len_utf8()..idx]);
                }
            }
        }
        None
    }
}

/// Split on `separator`, except inside strings or brackets
///
/// Pieces are trimmed, and an all-whitespace input yields no pieces.
pub fn split_top_level(text: &str, separator: char) -> Vec<&str> {
    if text.trim().is_empty() {
        return vec![];
    }
    let mut pieces = vec![];
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut start = 0;
    for (idx, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => (),
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ if c == separator && depth == 0 => {
                pieces.push(text[start..idx].trim());
                start = idx + c.len_utf8();
            }
            _ => (),
        }
    }
    pieces.push(text[start..].trim());
    pieces
}

/// Remove a `//` comment, unless it is inside a string literal
pub fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let mut escaped = false;
    let mut previous_slash = false;
    for (idx, c) in line.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => (),
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '/' if previous_slash => return &line[..idx - 1],
            _ => (),
        }
        previous_slash = c == '/';
    }
    line
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn words_and_keywords() {
        let mut cursor = Cursor::new("  TRY a b CATCH(*) c");
        assert!(cursor.keyword("try"));
        assert_eq!(cursor.identifier(), Some("a"));
        assert_eq!(cursor.word(), Some("b"));
        assert!(!cursor.keyword("catc"));
        assert!(cursor.keyword("catch"));
        assert_eq!(cursor.delimited('(', ')'), Some("*"));
        assert_eq!(cursor.identifier(), Some("c"));
        assert!(cursor.at_end());
        assert_eq!(cursor.word(), None);
    }

    #[test]
    fn prefixed_keywords() {
        let mut cursor = Cursor::new(".signature foo");
        assert!(!cursor.dialect_keyword(Dialect::Bare, "signature"));
        assert!(cursor.dialect_keyword(Dialect::Prefixed, "signature"));
        assert_eq!(cursor.rest(), " foo");
    }

    #[test]
    fn string_literals() {
        let mut cursor = Cursor::new(r#""a \"quoted\" word" rest"#);
        assert_eq!(cursor.string_literal(), Some(r#"a \"quoted\" word"#));
        assert_eq!(cursor.rest(), " rest");
        assert_eq!(Cursor::new(r#""unterminated"#).string_literal(), None);
    }

    #[test]
    fn nested_groups() {
        let mut cursor = Cursor::new(r#"(a=(1, 2), b=")") tail"#);
        assert_eq!(cursor.delimited('(', ')'), Some(r#"a=(1, 2), b=")""#));
        assert_eq!(
            split_top_level(r#"a=(1, 2), b=")""#, ','),
            vec!["a=(1, 2)", r#"b=")""#]
        );
        assert!(split_top_level("  ", ',').is_empty());
    }

    #[test]
    fn comments() {
        assert_eq!(strip_comment("nop // hello"), "nop ");
        assert_eq!(strip_comment(r#"ldc "http://x" // c"#), r#"ldc "http://x" "#);
        assert_eq!(strip_comment("// whole line"), "");
        assert_eq!(strip_comment("a / b"), "a / b");
    }
}
