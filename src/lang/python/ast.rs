/// Syntax tree for python source units.
///
/// The tree is deliberately coarse: it keeps what the structure validator and the
/// safety scanner consult (imports, class and function headers, names, attribute
/// access, calls, subscripts) and folds every other construct into `Group`.

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub line: u32,
    pub kind: StmtKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// `import a.b as c, d`
    Import(Vec<ImportName>),
    /// `from ..pkg.mod import x, y as z`
    ImportFrom {
        module: Option<String>,
        level: u32,
        names: Vec<ImportName>,
    },
    ClassDef(ClassDef),
    FunctionDef(FunctionDef),
    /// Any other block statement: `if`, `for`, `while`, `with`, `try`, `match`, ...
    Compound {
        keyword: String,
        header: Vec<Expr>,
        body: Vec<Stmt>,
    },
    /// Expression statements, assignments, `return`, `raise`, ...
    Simple(Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportName {
    pub path: String,
    pub alias: Option<String>,
}

impl ImportName {
    /// First dotted component
    pub fn root(&self) -> &str {
        self.path.split('.').next().unwrap_or(&self.path)
    }

    /// Name the import binds in the importing module
    pub fn bound(&self) -> &str {
        self.alias.as_deref().unwrap_or_else(|| self.root())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub decorators: Vec<Expr>,
    pub bases: Vec<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub is_async: bool,
    pub decorators: Vec<Expr>,
    pub params: Vec<Param>,
    /// Defaults, annotations and the return annotation
    pub header: Vec<Expr>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Declared before a `/` marker
    PositionalOnly,
    Positional,
    /// `*args`
    VarArgs,
    /// After `*` or `*args`
    KeywordOnly,
    /// `**kwargs`
    VarKeywords,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub has_default: bool,
}

impl Param {
    pub fn is_positional(&self) -> bool {
        matches!(self.kind, ParamKind::Positional | ParamKind::PositionalOnly)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub line: u32,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Name(String),
    Attribute { value: Box<Expr>, attr: String },
    Call { func: Box<Expr>, args: Vec<Expr> },
    Subscript { value: Box<Expr>, index: Vec<Expr> },
    /// Bracketed displays, parenthesized groups and f-string replacement fields
    Group(Vec<Expr>),
    Literal,
}

impl Expr {
    /// Direct children in source order
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Name(_) | ExprKind::Literal => Vec::new(),
            ExprKind::Attribute { value, .. } => vec![value.as_ref()],
            ExprKind::Call { func, args } => {
                std::iter::once(func.as_ref()).chain(args.iter()).collect()
            }
            ExprKind::Subscript { value, index } => {
                std::iter::once(value.as_ref()).chain(index.iter()).collect()
            }
            ExprKind::Group(items) => items.iter().collect(),
        }
    }

    /// Dotted name of a `Name` / `Attribute` chain, e.g. `os.path.join`
    pub fn dotted(&self) -> Option<String> {
        match &self.kind {
            ExprKind::Name(name) => Some(name.clone()),
            ExprKind::Attribute { value, attr } => {
                value.dotted().map(|base| format!("{}.{}", base, attr))
            }
            _ => None,
        }
    }
}
