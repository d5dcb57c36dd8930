/// Tokenizer for python source
///
/// Produces the logical-line token stream (NEWLINE / INDENT / DEDENT included) the
/// statement parser consumes. Replacement fields of f-strings are tokenized too, so
/// code hidden inside string interpolation is visible to the scanner.
use super::SyntaxError;
use unicode_normalization::UnicodeNormalization;

/// Bracket nesting ceiling, matching the interpreter's own parser limit
const MAX_BRACKET_DEPTH: usize = 200;
/// Indentation levels ceiling
const MAX_INDENT_DEPTH: usize = 100;
/// f-strings inside f-string replacement fields
const MAX_FSTRING_DEPTH: usize = 8;

const TAB_SIZE: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Name(String),
    Number,
    /// String literal; for f-strings, the token stream of each replacement field
    Str(Vec<Vec<Token>>),
    Op(&'static str),
    Newline,
    Indent,
    Dedent,
    End,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub line: u32,
}

// Longest operators first
const OPERATORS: &[&str] = &[
    "**=", "//=", ">>=", "<<=", "...", "!=", "**", "//", "<<", ">>", "<=", ">=", "==", "->",
    "+=", "-=", "*=", "/=", "%=", "&=", "|=", "^=", "@=", ":=", "+", "-", "*", "/", "%", "@",
    "&", "|", "^", "~", "<", ">", "(", ")", "[", "]", "{", "}", ",", ":", ".", ";", "=",
];

const STRING_PREFIXES: &[&str] = &["r", "u", "b", "f", "br", "rb", "fr", "rf"];

/// Tokenize a whole module.
pub fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    let source = source.strip_prefix('\u{feff}').unwrap_or(source);
    let mut lexer = Lexer::new(source, 1, 0);
    lexer.run()?;
    Ok(lexer.tokens)
}

struct Lexer<'s> {
    src: &'s [u8],
    pos: usize,
    line: u32,
    tokens: Vec<Token>,
    indents: Vec<usize>,
    /// Open brackets with the line they were opened on
    brackets: Vec<(u8, u32)>,
    at_line_start: bool,
    /// Expression mode: tokenizing an f-string replacement field
    expression: bool,
    fstring_depth: usize,
}

impl<'s> Lexer<'s> {
    fn new(src: &'s str, line: u32, fstring_depth: usize) -> Self {
        Self {
            src: src.as_bytes(),
            pos: 0,
            line,
            tokens: Vec::new(),
            indents: vec![0],
            brackets: Vec::new(),
            at_line_start: true,
            expression: false,
            fstring_depth,
        }
    }

    /// Lexer for one f-string replacement field
    fn for_field(src: &'s str, line: u32, fstring_depth: usize) -> Self {
        let mut lexer = Self::new(src, line, fstring_depth);
        lexer.expression = true;
        lexer.at_line_start = false;
        lexer
    }

    fn error(&self, message: impl Into<String>) -> SyntaxError {
        SyntaxError::new(self.line, message)
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.src.get(self.pos + offset).copied()
    }

    fn push(&mut self, tok: Tok, line: u32) {
        self.tokens.push(Token { tok, line });
    }

    fn nesting(&self) -> bool {
        self.expression || !self.brackets.is_empty()
    }

    fn run(&mut self) -> Result<(), SyntaxError> {
        while self.pos < self.src.len() {
            if self.at_line_start && !self.nesting() {
                self.indentation()?;
                continue;
            }

            let c = self.src[self.pos];
            match c {
                b' ' | b'\t' | 0x0c => self.pos += 1,
                b'#' => self.skip_comment(),
                b'\r' | b'\n' => self.newline(),
                b'\\' => self.continuation()?,
                b'"' | b'\'' => self.string("")?,
                b'0'..=b'9' => self.number(),
                b'.' if matches!(self.peek_at(1), Some(b'0'..=b'9')) => self.number(),
                c if c == b'_' || c.is_ascii_alphabetic() || c >= 0x80 => self.name()?,
                _ => self.operator()?,
            }
        }

        if let Some(&(open, line)) = self.brackets.last() {
            return Err(SyntaxError::new(
                line,
                format!("'{}' was never closed", open as char),
            ));
        }

        if !self.expression {
            if !matches!(
                self.tokens.last().map(|t| &t.tok),
                None | Some(Tok::Newline)
            ) {
                self.push(Tok::Newline, self.line);
            }
            while self.indents.len() > 1 {
                self.indents.pop();
                self.push(Tok::Dedent, self.line);
            }
        }
        self.push(Tok::End, self.line);
        Ok(())
    }

    /// Measure the indentation of a new line; blank and comment-only lines are skipped.
    fn indentation(&mut self) -> Result<(), SyntaxError> {
        let mut column = 0usize;
        while let Some(c) = self.peek() {
            match c {
                b' ' => column += 1,
                b'\t' => column = (column / TAB_SIZE + 1) * TAB_SIZE,
                0x0c => column = 0,
                _ => break,
            }
            self.pos += 1;
        }

        match self.peek() {
            None => return Ok(()),
            Some(b'#') => {
                self.skip_comment();
                return Ok(());
            }
            Some(b'\r') | Some(b'\n') => {
                self.consume_line_break();
                return Ok(());
            }
            Some(b'\\') if matches!(self.peek_at(1), Some(b'\n') | Some(b'\r')) => {
                self.pos += 1;
                self.consume_line_break();
                return Ok(());
            }
            _ => {}
        }

        self.at_line_start = false;
        let current = self.indents.last().copied().unwrap_or(0);

        if column > current {
            if self.indents.len() >= MAX_INDENT_DEPTH {
                return Err(self.error("too many levels of indentation"));
            }
            self.indents.push(column);
            self.push(Tok::Indent, self.line);
        } else if column < current {
            while self.indents.last().copied().unwrap_or(0) > column {
                self.indents.pop();
                self.push(Tok::Dedent, self.line);
            }
            if self.indents.last().copied().unwrap_or(0) != column {
                return Err(self.error("unindent does not match any outer indentation level"));
            }
        }
        Ok(())
    }

    fn consume_line_break(&mut self) {
        if self.peek() == Some(b'\r') {
            self.pos += 1;
        }
        if self.peek() == Some(b'\n') {
            self.pos += 1;
        }
        self.line += 1;
    }

    fn newline(&mut self) {
        let line = self.line;
        self.consume_line_break();
        if !self.nesting() {
            if !matches!(self.tokens.last().map(|t| &t.tok), None | Some(Tok::Newline)) {
                self.push(Tok::Newline, line);
            }
            self.at_line_start = true;
        }
    }

    fn skip_comment(&mut self) {
        while let Some(c) = self.peek() {
            if c == b'\n' || c == b'\r' {
                break;
            }
            self.pos += 1;
        }
    }

    fn continuation(&mut self) -> Result<(), SyntaxError> {
        self.pos += 1;
        match self.peek() {
            Some(b'\n') | Some(b'\r') => {
                self.consume_line_break();
                Ok(())
            }
            None => Err(self.error("unexpected EOF after line continuation character")),
            Some(_) => Err(self.error("unexpected character after line continuation character")),
        }
    }

    fn number(&mut self) {
        let line = self.line;
        let mut prev = 0u8;
        while let Some(c) = self.peek() {
            let exponent_sign = (c == b'+' || c == b'-') && (prev == b'e' || prev == b'E');
            if c.is_ascii_alphanumeric() || c == b'_' || c == b'.' || exponent_sign {
                prev = c;
                self.pos += 1;
            } else {
                break;
            }
        }
        self.push(Tok::Number, line);
    }

    fn name(&mut self) -> Result<(), SyntaxError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == b'_' || c.is_ascii_alphanumeric() || c >= 0x80 {
                self.pos += 1;
            } else {
                break;
            }
        }
        let text = self.text(start, self.pos);

        if matches!(self.peek(), Some(b'"') | Some(b'\'')) {
            let lower = text.to_ascii_lowercase();
            if STRING_PREFIXES.contains(&lower.as_str()) {
                return self.string(&lower);
            }
        }

        // The interpreter folds identifiers to NFKC, so `ｅｖａｌ` is `eval`
        let text = if text.is_ascii() {
            text
        } else {
            text.nfkc().collect()
        };
        self.push(Tok::Name(text), self.line);
        Ok(())
    }

    fn text(&self, start: usize, end: usize) -> String {
        String::from_utf8_lossy(&self.src[start..end]).into_owned()
    }

    fn operator(&mut self) -> Result<(), SyntaxError> {
        let rest = &self.src[self.pos..];
        let op = OPERATORS
            .iter()
            .copied()
            .find(|op| rest.starts_with(op.as_bytes()))
            .ok_or_else(|| {
                let shown = std::str::from_utf8(&rest[..1]).unwrap_or("?");
                self.error(format!("invalid character '{}'", shown))
            })?;

        let line = self.line;
        match op {
            "(" | "[" | "{" => {
                if self.brackets.len() >= MAX_BRACKET_DEPTH {
                    return Err(self.error("too many nested parentheses"));
                }
                self.brackets.push((op.as_bytes()[0], line));
            }
            ")" | "]" | "}" => {
                let expected = match op {
                    ")" => b'(',
                    "]" => b'[',
                    _ => b'{',
                };
                match self.brackets.pop() {
                    Some((open, _)) if open == expected => {}
                    Some((open, _)) => {
                        return Err(self.error(format!(
                            "closing parenthesis '{}' does not match opening parenthesis '{}'",
                            op, open as char
                        )))
                    }
                    None => return Err(self.error(format!("unmatched '{}'", op))),
                }
            }
            _ => {}
        }

        self.pos += op.len();
        self.push(Tok::Op(op), line);
        Ok(())
    }

    fn string(&mut self, prefix: &str) -> Result<(), SyntaxError> {
        let line = self.line;
        let formatted = prefix.contains('f');

        let quote = self.src[self.pos];
        let triple = self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote);
        self.pos += if triple { 3 } else { 1 };

        let mut fields = Vec::new();
        loop {
            let c = match self.peek() {
                Some(c) => c,
                None if triple => {
                    return Err(SyntaxError::new(line, "unterminated triple-quoted string literal"))
                }
                None => return Err(SyntaxError::new(line, "unterminated string literal")),
            };

            match c {
                b'\\' => {
                    self.pos += 1;
                    match self.peek() {
                        Some(b'\n') | Some(b'\r') => self.consume_line_break(),
                        Some(_) => self.pos += 1,
                        None => {}
                    }
                }
                b'\n' | b'\r' if !triple => {
                    return Err(SyntaxError::new(line, "unterminated string literal"))
                }
                b'\n' | b'\r' => self.consume_line_break(),
                c if c == quote => {
                    if !triple {
                        self.pos += 1;
                        break;
                    }
                    if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                        self.pos += 3;
                        break;
                    }
                    self.pos += 1;
                }
                b'{' if formatted => {
                    if self.peek_at(1) == Some(b'{') {
                        self.pos += 2;
                    } else {
                        self.replacement_field(quote, triple, &mut fields)?;
                    }
                }
                b'}' if formatted => {
                    if self.peek_at(1) == Some(b'}') {
                        self.pos += 2;
                    } else {
                        return Err(self.error("f-string: single '}' is not allowed"));
                    }
                }
                _ => self.pos += 1,
            }
        }

        self.push(Tok::Str(fields), line);
        Ok(())
    }

    /// Consume `{expr[!conv][:spec]}` starting at the opening brace.
    fn replacement_field(
        &mut self,
        quote: u8,
        triple: bool,
        fields: &mut Vec<Vec<Token>>,
    ) -> Result<(), SyntaxError> {
        let line = self.line;
        self.pos += 1;
        let start = self.pos;

        let mut depth = 0usize;
        let mut split: Option<usize> = None;
        loop {
            let c = self.peek().ok_or_else(|| SyntaxError::new(line, "f-string: expecting '}'"))?;
            match c {
                b'\n' | b'\r' if !triple => {
                    return Err(SyntaxError::new(line, "f-string: expecting '}'"))
                }
                b'\n' | b'\r' => self.consume_line_break(),
                c if c == quote
                    && (!triple
                        || (self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote))) =>
                {
                    return Err(SyntaxError::new(line, "f-string: expecting '}'"));
                }
                b'\'' | b'"' => self.skip_nested_quote(c, line)?,
                b'(' | b'[' | b'{' => {
                    depth += 1;
                    self.pos += 1;
                }
                b')' | b']' => {
                    depth = depth.saturating_sub(1);
                    self.pos += 1;
                }
                b'}' if depth > 0 => {
                    depth -= 1;
                    self.pos += 1;
                }
                b'}' => break,
                b'!' if depth == 0 && split.is_none() && self.peek_at(1) != Some(b'=') => {
                    split = Some(self.pos);
                    self.pos += 1;
                }
                b':' if depth == 0 && split.is_none() => {
                    split = Some(self.pos);
                    self.pos += 1;
                }
                _ => self.pos += 1,
            }
        }
        let end = self.pos;
        self.pos += 1;

        let expr_end = split.unwrap_or(end);
        let mut expr = self.text(start, expr_end);
        let trimmed = expr.trim_end();
        if trimmed.ends_with('=')
            && !trimmed.ends_with("==")
            && !trimmed.ends_with("!=")
            && !trimmed.ends_with("<=")
            && !trimmed.ends_with(">=")
        {
            expr = trimmed[..trimmed.len() - 1].to_string();
        }
        if expr.trim().is_empty() {
            return Err(SyntaxError::new(line, "f-string: empty expression not allowed"));
        }

        fields.push(self.lex_field(&expr, line)?);

        // Nested fields inside a format spec, e.g. f"{x:{width}}"
        if let Some(split) = split {
            let spec = self.text(split + 1, end);
            self.spec_fields(&spec, line, fields)?;
        }
        Ok(())
    }

    fn skip_nested_quote(&mut self, quote: u8, line: u32) -> Result<(), SyntaxError> {
        self.pos += 1;
        loop {
            match self.peek() {
                None | Some(b'\n') | Some(b'\r') => {
                    return Err(SyntaxError::new(line, "f-string: unterminated string"))
                }
                Some(b'\\') => self.pos += 2,
                Some(c) if c == quote => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(_) => self.pos += 1,
            }
        }
    }

    fn spec_fields(
        &self,
        spec: &str,
        line: u32,
        fields: &mut Vec<Vec<Token>>,
    ) -> Result<(), SyntaxError> {
        let bytes = spec.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'{' {
                let mut depth = 1;
                let mut j = i + 1;
                while j < bytes.len() && depth > 0 {
                    match bytes[j] {
                        b'{' => depth += 1,
                        b'}' => depth -= 1,
                        _ => {}
                    }
                    j += 1;
                }
                if depth != 0 {
                    return Err(SyntaxError::new(line, "f-string: expecting '}'"));
                }
                let inner = &spec[i + 1..j - 1];
                if inner.trim().is_empty() {
                    return Err(SyntaxError::new(line, "f-string: empty expression not allowed"));
                }
                fields.push(self.lex_field(inner, line)?);
                i = j;
            } else {
                i += 1;
            }
        }
        Ok(())
    }

    fn lex_field(&self, expr: &str, line: u32) -> Result<Vec<Token>, SyntaxError> {
        if self.fstring_depth + 1 > MAX_FSTRING_DEPTH {
            return Err(SyntaxError::new(line, "f-string: expressions nested too deeply"));
        }
        let mut sub = Lexer::for_field(expr, line, self.fstring_depth + 1);
        sub.run()?;
        Ok(sub.tokens)
    }
}
