/// Statement parser over the token stream.
///
/// Statement structure (blocks, imports, class and function headers) is parsed
/// exactly; expressions are parsed as operand sequences so that names, attribute
/// chains, calls and subscripts come out as nodes with their source line.
use super::ast::{
    ClassDef, Expr, ExprKind, FunctionDef, ImportName, Module, Param, ParamKind, Stmt, StmtKind,
};
use super::lexer::{Tok, Token};
use super::SyntaxError;

/// Tree depth ceiling for a single expression (brackets and trailers)
const MAX_EXPR_DEPTH: usize = 1000;

/// Keywords that join operands inside an expression
const KEYWORD_OPERATORS: &[&str] = &[
    "and", "or", "not", "in", "is", "if", "else", "for", "async", "await", "lambda", "yield",
    "from", "as",
];

const LITERAL_KEYWORDS: &[&str] = &["None", "True", "False"];

/// Keywords that can never appear inside an expression
const STATEMENT_KEYWORDS: &[&str] = &[
    "def", "class", "return", "pass", "break", "continue", "raise", "import", "global",
    "nonlocal", "del", "assert", "while", "try", "except", "finally", "with", "elif",
];

/// Keywords opening a simple statement, followed by an optional expression list
const SIMPLE_KEYWORDS: &[&str] = &[
    "return", "pass", "break", "continue", "raise", "global", "nonlocal", "del", "assert",
];

const BLOCK_KEYWORDS: &[&str] = &[
    "if", "elif", "else", "while", "for", "try", "except", "finally", "with",
];

/// Where an operand sequence ends
#[derive(Clone, Copy, Debug)]
enum Ctx {
    /// Simple statement: NEWLINE, `;` or end of input
    Line,
    /// Block header: top-level `:` not owned by a lambda
    Header,
    /// Parameter annotation or default: `,` `)` `=`
    Param,
    /// Inside brackets, up to the closer; `kwargs` skips `name=` prefixes
    Bracket { closer: &'static str, kwargs: bool },
}

enum Step {
    Stop,
    Separator,
    Operand,
    Invalid(&'static str),
}

/// What an operand sequence accepts next
#[derive(Clone, Copy, Debug, PartialEq)]
enum Slot {
    /// Start of the sequence or after a bare `yield`; may end here
    Open,
    /// After an operator; an operand must follow
    Required,
    /// After `,`; may end here, another `,` may not follow
    AfterComma,
    /// After a slice or dict `:`
    AfterColon,
    /// An operand was just parsed
    Filled,
}

/// Operators that may open an operand
const PREFIX_OPERATORS: &[&str] = &["-", "+", "~", "*", "**", "not", "await", "lambda"];

/// Operators that can never follow an operand
const PREFIX_ONLY: &[&str] = &["~", "not", "await", "lambda", "yield"];

pub fn parse_module(tokens: Vec<Token>) -> Result<Module, SyntaxError> {
    let mut parser = Parser::new(tokens);
    let mut body = Vec::new();
    loop {
        match parser.tok() {
            Tok::End => break,
            Tok::Newline => parser.bump(),
            _ => body.extend(parser.statement()?),
        }
    }
    Ok(Module { body })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn new(mut tokens: Vec<Token>) -> Self {
        if !matches!(tokens.last(), Some(Token { tok: Tok::End, .. })) {
            let line = tokens.last().map_or(1, |t| t.line);
            tokens.push(Token { tok: Tok::End, line });
        }
        Self {
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn token_at(&self, offset: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + offset).min(last)]
    }

    fn tok(&self) -> &Tok {
        &self.token_at(0).tok
    }

    fn line(&self) -> u32 {
        self.token_at(0).line
    }

    fn bump(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn is_op(&self, op: &str) -> bool {
        matches!(self.tok(), Tok::Op(o) if *o == op)
    }

    fn is_name(&self, name: &str) -> bool {
        matches!(self.tok(), Tok::Name(n) if n == name)
    }

    fn invalid(&self) -> SyntaxError {
        SyntaxError::new(self.line(), "invalid syntax")
    }

    fn expect_op(&mut self, op: &str) -> Result<(), SyntaxError> {
        if self.is_op(op) {
            self.bump();
            Ok(())
        } else {
            Err(SyntaxError::new(self.line(), format!("expected '{}'", op)))
        }
    }

    fn identifier(&mut self) -> Result<String, SyntaxError> {
        match self.tok() {
            Tok::Name(name)
                if !STATEMENT_KEYWORDS.contains(&name.as_str())
                    && !KEYWORD_OPERATORS.contains(&name.as_str())
                    && !LITERAL_KEYWORDS.contains(&name.as_str()) =>
            {
                let name = name.clone();
                self.bump();
                Ok(name)
            }
            _ => Err(self.invalid()),
        }
    }

    fn dotted_name(&mut self) -> Result<String, SyntaxError> {
        let mut path = self.identifier()?;
        while self.is_op(".") {
            self.bump();
            path.push('.');
            path.push_str(&self.identifier()?);
        }
        Ok(path)
    }

    fn statement(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        let line = self.line();
        let keyword = match self.tok() {
            Tok::Indent => return Err(SyntaxError::new(line, "unexpected indent")),
            Tok::Dedent => return Err(SyntaxError::new(line, "unexpected dedent")),
            Tok::Op("@") => return Ok(vec![self.decorated()?]),
            Tok::Name(name) => name.clone(),
            _ => return self.simple_line(),
        };

        let stmt = match keyword.as_str() {
            "def" => self.function(Vec::new(), false, line)?,
            "class" => self.class(Vec::new(), line)?,
            "async" => {
                self.bump();
                match self.tok() {
                    Tok::Name(n) if n == "def" => self.function(Vec::new(), true, line)?,
                    Tok::Name(n) if n == "for" || n == "with" => {
                        let inner = format!("async {}", n);
                        self.compound(inner, line)?
                    }
                    _ => return Err(self.invalid()),
                }
            }
            kw if BLOCK_KEYWORDS.contains(&kw) => self.compound(keyword.clone(), line)?,
            "match" | "case" if self.soft_block() => self.compound(keyword.clone(), line)?,
            _ => return self.simple_line(),
        };
        Ok(vec![stmt])
    }

    /// `match` / `case` open a block only when their logical line ends in `:` and
    /// an indented block follows.
    fn soft_block(&self) -> bool {
        let mut offset = 1;
        loop {
            match &self.token_at(offset).tok {
                Tok::Newline => break,
                Tok::End => return false,
                _ => offset += 1,
            }
        }
        matches!(self.token_at(offset - 1).tok, Tok::Op(":"))
            && matches!(self.token_at(offset + 1).tok, Tok::Indent)
    }

    fn compound(&mut self, keyword: String, line: u32) -> Result<Stmt, SyntaxError> {
        self.bump();
        let header = self.sequence(Ctx::Header)?;
        self.expect_op(":")?;
        let body = self.suite(&keyword, line)?;
        Ok(Stmt {
            line,
            kind: StmtKind::Compound {
                keyword,
                header,
                body,
            },
        })
    }

    fn suite(&mut self, keyword: &str, line: u32) -> Result<Vec<Stmt>, SyntaxError> {
        if !matches!(self.tok(), Tok::Newline) {
            return self.simple_line();
        }
        self.bump();
        if !matches!(self.tok(), Tok::Indent) {
            return Err(SyntaxError::new(
                self.line(),
                format!(
                    "expected an indented block after '{}' statement on line {}",
                    keyword, line
                ),
            ));
        }
        self.bump();

        let mut body = Vec::new();
        loop {
            match self.tok() {
                Tok::Dedent => {
                    self.bump();
                    break;
                }
                Tok::End => break,
                Tok::Newline => self.bump(),
                _ => body.extend(self.statement()?),
            }
        }
        Ok(body)
    }

    fn decorated(&mut self) -> Result<Stmt, SyntaxError> {
        let mut decorators = Vec::new();
        while self.is_op("@") {
            self.bump();
            decorators.extend(self.sequence(Ctx::Line)?);
            if !matches!(self.tok(), Tok::Newline) {
                return Err(self.invalid());
            }
            self.bump();
        }

        let line = self.line();
        if self.is_name("def") {
            self.function(decorators, false, line)
        } else if self.is_name("class") {
            self.class(decorators, line)
        } else if self.is_name("async") {
            self.bump();
            if !self.is_name("def") {
                return Err(self.invalid());
            }
            self.function(decorators, true, line)
        } else {
            Err(self.invalid())
        }
    }

    fn function(
        &mut self,
        decorators: Vec<Expr>,
        is_async: bool,
        line: u32,
    ) -> Result<Stmt, SyntaxError> {
        self.bump();
        let name = self.identifier()?;
        self.expect_op("(")?;
        let (params, mut header) = self.params()?;
        self.expect_op(")")?;
        if self.is_op("->") {
            self.bump();
            header.extend(self.sequence(Ctx::Header)?);
        }
        self.expect_op(":")?;
        let body = self.suite("def", line)?;

        Ok(Stmt {
            line,
            kind: StmtKind::FunctionDef(FunctionDef {
                name,
                is_async,
                decorators,
                params,
                header,
                body,
            }),
        })
    }

    fn params(&mut self) -> Result<(Vec<Param>, Vec<Expr>), SyntaxError> {
        let mut params: Vec<Param> = Vec::new();
        let mut header = Vec::new();
        let mut keyword_only = false;

        while !self.is_op(")") {
            if self.is_op("/") {
                self.bump();
                for param in params.iter_mut() {
                    if param.kind == ParamKind::Positional {
                        param.kind = ParamKind::PositionalOnly;
                    }
                }
            } else if self.is_op("**") {
                self.bump();
                let name = self.identifier()?;
                self.annotation(&mut header)?;
                params.push(Param {
                    name,
                    kind: ParamKind::VarKeywords,
                    has_default: false,
                });
            } else if self.is_op("*") {
                self.bump();
                keyword_only = true;
                if matches!(self.tok(), Tok::Name(_)) {
                    let name = self.identifier()?;
                    self.annotation(&mut header)?;
                    params.push(Param {
                        name,
                        kind: ParamKind::VarArgs,
                        has_default: false,
                    });
                }
            } else {
                let name = self.identifier()?;
                self.annotation(&mut header)?;
                let has_default = if self.is_op("=") {
                    self.bump();
                    header.extend(self.sequence(Ctx::Param)?);
                    true
                } else {
                    false
                };
                let kind = if keyword_only {
                    ParamKind::KeywordOnly
                } else {
                    ParamKind::Positional
                };
                params.push(Param {
                    name,
                    kind,
                    has_default,
                });
            }

            if self.is_op(",") {
                self.bump();
            } else if !self.is_op(")") {
                return Err(self.invalid());
            }
        }
        Ok((params, header))
    }

    fn annotation(&mut self, header: &mut Vec<Expr>) -> Result<(), SyntaxError> {
        if self.is_op(":") {
            self.bump();
            header.extend(self.sequence(Ctx::Param)?);
        }
        Ok(())
    }

    fn class(&mut self, decorators: Vec<Expr>, line: u32) -> Result<Stmt, SyntaxError> {
        self.bump();
        let name = self.identifier()?;
        let bases = if self.is_op("(") {
            self.bump();
            let bases = self.sequence(Ctx::Bracket {
                closer: ")",
                kwargs: true,
            })?;
            self.expect_op(")")?;
            bases
        } else {
            Vec::new()
        };
        self.expect_op(":")?;
        let body = self.suite("class", line)?;

        Ok(Stmt {
            line,
            kind: StmtKind::ClassDef(ClassDef {
                name,
                decorators,
                bases,
                body,
            }),
        })
    }

    fn simple_line(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        let mut stmts = Vec::new();
        loop {
            stmts.push(self.simple()?);
            if self.is_op(";") {
                self.bump();
                if matches!(self.tok(), Tok::Newline | Tok::End) {
                    if matches!(self.tok(), Tok::Newline) {
                        self.bump();
                    }
                    break;
                }
                continue;
            }
            match self.tok() {
                Tok::Newline => {
                    self.bump();
                    break;
                }
                Tok::End => break,
                _ => return Err(self.invalid()),
            }
        }
        Ok(stmts)
    }

    fn simple(&mut self) -> Result<Stmt, SyntaxError> {
        let line = self.line();
        if self.is_name("import") {
            return self.import(line);
        }
        if self.is_name("from") {
            return self.import_from(line);
        }

        let skip_keyword = match (self.tok(), &self.token_at(1).tok) {
            (Tok::Name(kw), _) if SIMPLE_KEYWORDS.contains(&kw.as_str()) => true,
            // soft keyword: `type Alias = ...`
            (Tok::Name(kw), Tok::Name(_)) if kw == "type" => true,
            _ => false,
        };
        if skip_keyword {
            self.bump();
        }

        let exprs = self.sequence(Ctx::Line)?;
        Ok(Stmt {
            line,
            kind: StmtKind::Simple(exprs),
        })
    }

    fn import(&mut self, line: u32) -> Result<Stmt, SyntaxError> {
        self.bump();
        let mut names = Vec::new();
        loop {
            let path = self.dotted_name()?;
            let alias = if self.is_name("as") {
                self.bump();
                Some(self.identifier()?)
            } else {
                None
            };
            names.push(ImportName { path, alias });
            if !self.is_op(",") {
                break;
            }
            self.bump();
        }
        Ok(Stmt {
            line,
            kind: StmtKind::Import(names),
        })
    }

    fn import_from(&mut self, line: u32) -> Result<Stmt, SyntaxError> {
        self.bump();
        let mut level = 0u32;
        loop {
            if self.is_op(".") {
                level += 1;
            } else if self.is_op("...") {
                level += 3;
            } else {
                break;
            }
            self.bump();
        }

        let module = if self.is_name("import") {
            None
        } else {
            Some(self.dotted_name()?)
        };
        if module.is_none() && level == 0 {
            return Err(self.invalid());
        }
        if !self.is_name("import") {
            return Err(self.invalid());
        }
        self.bump();

        let mut names = Vec::new();
        if self.is_op("*") {
            self.bump();
            names.push(ImportName {
                path: "*".to_string(),
                alias: None,
            });
        } else {
            let parenthesized = self.is_op("(");
            if parenthesized {
                self.bump();
            }
            loop {
                if parenthesized && self.is_op(")") {
                    break;
                }
                let path = self.identifier()?;
                let alias = if self.is_name("as") {
                    self.bump();
                    Some(self.identifier()?)
                } else {
                    None
                };
                names.push(ImportName { path, alias });
                if !self.is_op(",") {
                    break;
                }
                self.bump();
            }
            if parenthesized {
                self.expect_op(")")?;
            }
            if names.is_empty() {
                return Err(self.invalid());
            }
        }

        Ok(Stmt {
            line,
            kind: StmtKind::ImportFrom {
                module,
                level,
                names,
            },
        })
    }

    fn classify(&self, ctx: Ctx, lambdas: usize) -> Step {
        let tok = self.tok();
        match (ctx, tok) {
            (Ctx::Line, Tok::Newline | Tok::End | Tok::Op(";")) => return Step::Stop,
            (Ctx::Header, Tok::Op(":")) if lambdas == 0 => return Step::Stop,
            (Ctx::Header, Tok::Newline | Tok::End) => return Step::Invalid("expected ':'"),
            (Ctx::Param, Tok::Op(",") | Tok::Op("=")) if lambdas == 0 => return Step::Stop,
            (Ctx::Param, Tok::Op(")")) => return Step::Stop,
            (Ctx::Bracket { closer, .. }, Tok::Op(op)) if *op == closer => return Step::Stop,
            (_, Tok::End) => return Step::Stop,
            _ => {}
        }

        match tok {
            Tok::Name(name) if KEYWORD_OPERATORS.contains(&name.as_str()) => Step::Separator,
            Tok::Name(name) if STATEMENT_KEYWORDS.contains(&name.as_str()) => {
                Step::Invalid("invalid syntax")
            }
            Tok::Name(_) | Tok::Number | Tok::Str(_) => Step::Operand,
            Tok::Op("(") | Tok::Op("[") | Tok::Op("{") | Tok::Op("...") => Step::Operand,
            Tok::Op(")") | Tok::Op("]") | Tok::Op("}") | Tok::Op(";") => {
                Step::Invalid("invalid syntax")
            }
            Tok::Op(_) => Step::Separator,
            Tok::Newline | Tok::Indent | Tok::Dedent | Tok::End => Step::Invalid("invalid syntax"),
        }
    }

    /// Parse operands up to the context's terminator (not consumed).
    ///
    /// Operators are not built into nodes, but every operator must sit where the
    /// grammar allows one: `x = = 1`, `1 +` and `(1,,)` are rejected.
    fn sequence(&mut self, ctx: Ctx) -> Result<Vec<Expr>, SyntaxError> {
        let kwargs = matches!(ctx, Ctx::Bracket { kwargs: true, .. });
        let mut items = Vec::new();
        let mut slot = Slot::Open;
        let mut lambdas = 0usize;

        loop {
            match self.classify(ctx, lambdas) {
                Step::Stop if slot == Slot::Required => return Err(self.invalid()),
                Step::Stop => break,
                Step::Invalid(message) => return Err(SyntaxError::new(self.line(), message)),
                Step::Separator => slot = self.operator(slot, &mut lambdas)?,
                Step::Operand => {
                    if slot == Slot::Filled {
                        return Err(self.invalid());
                    }
                    let keyword_arg = kwargs
                        && matches!(self.tok(), Tok::Name(_))
                        && matches!(self.token_at(1).tok, Tok::Op("="));
                    if keyword_arg {
                        self.bump();
                        self.bump();
                        slot = Slot::Required;
                        continue;
                    }
                    items.push(self.primary()?);
                    slot = Slot::Filled;
                }
            }
        }
        Ok(items)
    }

    fn next_is_name(&self, name: &str) -> bool {
        matches!(&self.token_at(1).tok, Tok::Name(n) if n == name)
    }

    /// Consume one operator (two for `not in`, `async for`, `yield from`) and
    /// return the slot that follows it.
    fn operator(&mut self, slot: Slot, lambdas: &mut usize) -> Result<Slot, SyntaxError> {
        let op = match self.tok() {
            Tok::Name(name) => name.clone(),
            Tok::Op(op) => op.to_string(),
            _ => return Err(self.invalid()),
        };
        let filled = slot == Slot::Filled;

        let next = match op.as_str() {
            "yield" if !filled && self.next_is_name("from") => {
                self.bump();
                Slot::Required
            }
            "yield" if !filled => Slot::Open,
            "not" if filled && self.next_is_name("in") => {
                self.bump();
                Slot::Required
            }
            "async" if filled && self.next_is_name("for") => {
                self.bump();
                Slot::Required
            }
            "lambda" if !filled => {
                *lambdas += 1;
                Slot::Required
            }
            ":" if *lambdas > 0 => {
                *lambdas -= 1;
                Slot::Required
            }
            // lambda parameter lists allow `*,` and `/`
            "," if filled || slot == Slot::AfterColon || *lambdas > 0 => Slot::AfterComma,
            "/" if *lambdas > 0 && slot == Slot::AfterComma => Slot::Filled,
            ":" if slot != Slot::Required => Slot::AfterColon,
            // `a, = pair` and `for a, in pairs`
            "=" | "in" if slot == Slot::AfterComma => Slot::Required,
            op if !filled && PREFIX_OPERATORS.contains(&op) => Slot::Required,
            op if filled && !PREFIX_ONLY.contains(&op) => Slot::Required,
            _ => return Err(self.invalid()),
        };
        self.bump();
        Ok(next)
    }

    fn descend(&mut self) -> Result<(), SyntaxError> {
        self.depth += 1;
        if self.depth > MAX_EXPR_DEPTH {
            return Err(SyntaxError::new(self.line(), "expression too deeply nested"));
        }
        Ok(())
    }

    fn primary(&mut self) -> Result<Expr, SyntaxError> {
        let saved = self.depth;
        self.descend()?;
        let mut expr = self.atom()?;

        loop {
            let line = expr.line;
            if self.is_op(".") {
                self.bump();
                let attr = match self.tok() {
                    Tok::Name(name) => name.clone(),
                    _ => return Err(self.invalid()),
                };
                self.bump();
                expr = Expr {
                    line,
                    kind: ExprKind::Attribute {
                        value: Box::new(expr),
                        attr,
                    },
                };
            } else if self.is_op("(") {
                self.bump();
                let args = self.sequence(Ctx::Bracket {
                    closer: ")",
                    kwargs: true,
                })?;
                self.expect_op(")")?;
                expr = Expr {
                    line,
                    kind: ExprKind::Call {
                        func: Box::new(expr),
                        args,
                    },
                };
            } else if self.is_op("[") {
                self.bump();
                let index = self.sequence(Ctx::Bracket {
                    closer: "]",
                    kwargs: false,
                })?;
                self.expect_op("]")?;
                expr = Expr {
                    line,
                    kind: ExprKind::Subscript {
                        value: Box::new(expr),
                        index,
                    },
                };
            } else {
                break;
            }
            self.descend()?;
        }

        self.depth = saved;
        Ok(expr)
    }

    fn atom(&mut self) -> Result<Expr, SyntaxError> {
        let line = self.line();
        let kind = match self.tok() {
            Tok::Name(name) => {
                let kind = if LITERAL_KEYWORDS.contains(&name.as_str()) {
                    ExprKind::Literal
                } else {
                    ExprKind::Name(name.clone())
                };
                self.bump();
                kind
            }
            Tok::Number | Tok::Op("...") => {
                self.bump();
                ExprKind::Literal
            }
            Tok::Str(_) => self.strings()?,
            Tok::Op(open @ ("(" | "[" | "{")) => {
                let closer = match *open {
                    "(" => ")",
                    "[" => "]",
                    _ => "}",
                };
                self.bump();
                let items = self.sequence(Ctx::Bracket {
                    closer,
                    kwargs: false,
                })?;
                self.expect_op(closer)?;
                ExprKind::Group(items)
            }
            _ => return Err(self.invalid()),
        };
        Ok(Expr { line, kind })
    }

    /// Adjacent string literals; f-string replacement fields become a group.
    fn strings(&mut self) -> Result<ExprKind, SyntaxError> {
        let mut fields = Vec::new();
        while let Tok::Str(parts) = self.tok() {
            let parts = parts.clone();
            self.bump();
            for tokens in parts {
                fields.extend(self.field(tokens)?);
            }
        }
        if fields.is_empty() {
            Ok(ExprKind::Literal)
        } else {
            Ok(ExprKind::Group(fields))
        }
    }

    fn field(&self, tokens: Vec<Token>) -> Result<Vec<Expr>, SyntaxError> {
        let mut sub = Parser::new(tokens);
        sub.depth = self.depth;
        let exprs = sub.sequence(Ctx::Line)?;
        if !matches!(sub.tok(), Tok::End) {
            return Err(SyntaxError::new(sub.line(), "f-string: invalid syntax"));
        }
        Ok(exprs)
    }
}

#[cfg(test)]
mod tests {
    use super::super::parse;
    use super::*;

    fn body(src: &str) -> Vec<Stmt> {
        parse(src).unwrap().body
    }

    #[test]
    fn test_imports() {
        let stmts = body("import os.path as p, sys\nfrom ..pkg import (a, b as c,)\nfrom . import x\n");
        match &stmts[0].kind {
            StmtKind::Import(names) => {
                assert_eq!(names[0].path, "os.path");
                assert_eq!(names[0].root(), "os");
                assert_eq!(names[0].alias.as_deref(), Some("p"));
                assert_eq!(names[1].path, "sys");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            stmts[1].kind,
            StmtKind::ImportFrom {
                module: Some("pkg".into()),
                level: 2,
                names: vec![
                    ImportName {
                        path: "a".into(),
                        alias: None,
                    },
                    ImportName {
                        path: "b".into(),
                        alias: Some("c".into()),
                    },
                ],
            }
        );
        assert!(matches!(&stmts[2].kind, StmtKind::ImportFrom { module: None, level: 1, .. }));
    }

    #[test]
    fn test_class_and_method_signature() {
        let src = "\
class TradingModel(Base, metaclass=Meta):
    @staticmethod
    def helper(): pass

    def predict(self, stock_prices: list, volume, timestamps=None, *rest, flag, **kw) -> dict:
        return {}
";
        let stmts = body(src);
        let class = match &stmts[0].kind {
            StmtKind::ClassDef(c) => c,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(class.name, "TradingModel");
        assert_eq!(class.bases.len(), 2);

        let predict = class
            .body
            .iter()
            .find_map(|s| match &s.kind {
                StmtKind::FunctionDef(f) if f.name == "predict" => Some(f),
                _ => None,
            })
            .unwrap();
        let names: Vec<&str> = predict.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["self", "stock_prices", "volume", "timestamps", "rest", "flag", "kw"]);
        assert!(predict.params[3].has_default);
        assert_eq!(predict.params[4].kind, ParamKind::VarArgs);
        assert_eq!(predict.params[5].kind, ParamKind::KeywordOnly);
        assert_eq!(predict.params[6].kind, ParamKind::VarKeywords);
        assert_eq!(stmts[0].line, 1);
    }

    #[test]
    fn test_call_lines_and_attribute_chains() {
        let stmts = body("x = 1\ny = os.path.join(a,\n    eval(b))\n");
        let exprs = match &stmts[1].kind {
            StmtKind::Simple(e) => e,
            other => panic!("unexpected {:?}", other),
        };
        // y, call
        assert_eq!(exprs.len(), 2);
        match &exprs[1].kind {
            ExprKind::Call { func, args } => {
                assert_eq!(func.dotted().as_deref(), Some("os.path.join"));
                assert_eq!(args[1].line, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_keyword_arguments_are_not_names() {
        let stmts = body("f(file=x)\n");
        match &stmts[0].kind {
            StmtKind::Simple(e) => match &e[0].kind {
                ExprKind::Call { args, .. } => {
                    assert_eq!(args.len(), 1);
                    assert_eq!(args[0].kind, ExprKind::Name("x".into()));
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_compound_blocks_and_one_line_suites() {
        let src = "\
for i in range(3): total += i
while x:
    if y: break
    else:
        pass
try:
    a()
except (A, B) as e:
    b()
with open(p) as f, g() as h:
    pass
";
        let stmts = body(src);
        let keywords: Vec<&str> = stmts
            .iter()
            .map(|s| match &s.kind {
                StmtKind::Compound { keyword, .. } => keyword.as_str(),
                _ => "?",
            })
            .collect();
        assert_eq!(keywords, vec!["for", "while", "try", "except", "with"]);
    }

    #[test]
    fn test_lambda_in_header() {
        let stmts = body("if lambda: x:\n    pass\nf = lambda a, b: a + b\n");
        assert_eq!(stmts.len(), 2);
    }

    #[test]
    fn test_match_soft_keyword() {
        let src = "\
match command:
    case Point(x=0, y=y):
        pass
    case _:
        pass
match = 3
";
        let stmts = body(src);
        assert!(matches!(&stmts[0].kind, StmtKind::Compound { keyword, body, .. } if keyword == "match" && body.len() == 2));
        assert!(matches!(&stmts[1].kind, StmtKind::Simple(_)));
    }

    #[test]
    fn test_semicolons_and_decorators() {
        let stmts = body("a = 1; b = 2;\n@dec(1)\n@other\nasync def f(): pass\n");
        assert_eq!(stmts.len(), 3);
        match &stmts[2].kind {
            StmtKind::FunctionDef(f) => {
                assert!(f.is_async);
                assert_eq!(f.decorators.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_fstring_fields_become_expressions() {
        let stmts = body("msg = f\"{__import__('os').name}\"\n");
        match &stmts[0].kind {
            StmtKind::Simple(e) => match &e[1].kind {
                ExprKind::Group(fields) => match &fields[0].kind {
                    ExprKind::Attribute { value, attr } => {
                        assert_eq!(attr, "name");
                        assert!(matches!(value.kind, ExprKind::Call { .. }));
                    }
                    other => panic!("unexpected {:?}", other),
                },
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_syntax_errors() {
        let cases = [
            ("def f(:\n    pass\n", 1),
            ("print 'hello'\n", 1),
            ("if x:\npass\n", 2),
            ("x = 1\n    y = 2\n", 2),
            ("class:\n    pass\n", 1),
            ("x = def\n", 1),
            ("from import x\n", 1),
            ("while x\n    pass\n", 1),
            ("@dec\nx = 1\n", 2),
        ];
        for (src, line) in cases {
            match parse(src) {
                Err(err) => assert_eq!(err.line, line, "{:?} for {:?}", err, src),
                Ok(m) => panic!("expected syntax error for {:?}, got {:?}", src, m),
            }
        }
    }

    #[test]
    fn test_misplaced_operators() {
        let cases = [
            "x = = 1\n",
            "return 1 +\n",
            "x = (1,,)\n",
            "f(, a)\n",
            "x = a and or b\n",
            "y = a not b\n",
            "z = [1, 2] lambda: 0\n",
            "f(a=)\n",
            "a[1:-]\n",
            "if x and:\n    pass\n",
            "x = f(a; b)\n",
            "x = f\"{a +}\"\n",
        ];
        for src in cases {
            assert!(parse(src).is_err(), "expected syntax error for {:?}", src);
        }
    }

    #[test]
    fn test_operator_forms_that_stay_valid() {
        let src = "\
a, = pair
first, *rest = items
x = -y ** -2 if not a else ~b
ok = a is not b and c not in d
s = m[::-1], m[:, 0], m[1:, ...]
d = {**base, 'k': lambda *, v=1: v}
g = (yield)
h = [v async for v in stream if v]
f(*args, key=lambda a, /, b: a, **kw)
raise Error from cause
t = 1,
def fn(key=lambda a, b: a, other: int | None = None) -> dict[str, int]: pass
for k, in pairs: pass
";
        assert_eq!(body(src).len(), 13);
    }

    #[test]
    fn test_expression_depth_ceiling() {
        let src = format!("x = a{}\n", ".b".repeat(MAX_EXPR_DEPTH + 5));
        let err = parse(&src).unwrap_err();
        assert!(err.message.contains("deeply nested"));
    }
}
