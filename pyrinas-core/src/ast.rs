//! Surface syntax tree produced by the parser.
//!
//! The tree is owned top-down with no sharing. Statements carry the
//! source line they started on so later stages can point at them.

use std::fmt::{self, Write as _};

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    FunctionDef(FunctionDef),
    ClassDef(ClassDef),
    Assign {
        target: Expr,
        value: Expr,
    },
    AnnAssign {
        target: Expr,
        annotation: TypeExpr,
        value: Option<Expr>,
    },
    If {
        test: Expr,
        body: Vec<Stmt>,
        orelse: Vec<Stmt>,
    },
    While {
        test: Expr,
        body: Vec<Stmt>,
        label: Option<String>,
    },
    For {
        target: String,
        iter: Expr,
        body: Vec<Stmt>,
        label: Option<String>,
    },
    Break {
        label: Option<String>,
    },
    Continue {
        label: Option<String>,
    },
    Return(Option<Expr>),
    Expr(Expr),
    Pass,
    Match {
        subject: Expr,
        cases: Vec<MatchCase>,
    },
    Import(Import),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub params: Parameters,
    pub returns: Option<TypeExpr>,
    pub body: Vec<Stmt>,
}

impl FunctionDef {
    /// True when the body is exactly one `pass`.
    pub fn is_stub(&self) -> bool {
        matches!(self.body.as_slice(), [Stmt { kind: StmtKind::Pass, .. }])
    }
}

/// Ordered parameter list of a function or method.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Parameters(pub Vec<Parameter>);

impl Parameters {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub annotation: Option<TypeExpr>,
    pub line: usize,
}

/// How a class-like declaration is treated by later stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    Struct,
    Enum,
    Interface,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub bases: Vec<String>,
    pub kind: ClassKind,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchCase {
    pub pattern: Pattern,
    pub body: Vec<Stmt>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Wildcard,
    Value(Expr),
}

/// `import a.b` (empty `names`) or `from a.b import x, y`.
#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub module: Vec<String>,
    pub names: Vec<String>,
}

impl Import {
    pub fn module_path(&self) -> String {
        self.module.join(".")
    }
}

/// Syntactic type annotation, resolved to a `Type` by the analyzer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    Name(String),
    Generic { name: String, args: Vec<TypeExpr> },
    Size(usize),
    Tuple(Vec<TypeExpr>),
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Name(name) => f.write_str(name),
            TypeExpr::Size(size) => write!(f, "{size}"),
            TypeExpr::Generic { name, args } => {
                write!(f, "{name}[")?;
                write_joined(f, args)?;
                f.write_str("]")
            }
            TypeExpr::Tuple(items) => {
                f.write_str("(")?;
                write_joined(f, items)?;
                f.write_str(")")
            }
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[TypeExpr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Name(String),
    Constant(Constant),
    BinOp {
        left: Box<Expr>,
        op: BinOp,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Compare {
        left: Box<Expr>,
        op: CmpOp,
        right: Box<Expr>,
    },
    BoolOp {
        op: BoolOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        func: Box<Expr>,
        args: Vec<Expr>,
    },
    Attribute {
        value: Box<Expr>,
        attr: String,
    },
    Subscript {
        value: Box<Expr>,
        index: Box<Expr>,
    },
}

impl Expr {
    pub fn is_lvalue(&self) -> bool {
        matches!(
            self,
            Expr::Name(_) | Expr::Attribute { .. } | Expr::Subscript { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mult,
    Div,
    FloorDiv,
    Mod,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mult => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtE => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtE => ">=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

// ---------------------------------------------------------------------
// Tree dump
// ---------------------------------------------------------------------

impl Module {
    /// Indented one-node-per-line rendering of the tree.
    pub fn dump(&self) -> String {
        let mut out = String::from("Module\n");
        for stmt in &self.body {
            dump_stmt(&mut out, stmt, 1);
        }
        out
    }
}

fn line(out: &mut String, depth: usize, text: impl fmt::Display) {
    let _ = writeln!(out, "{}{}", "  ".repeat(depth), text);
}

fn dump_block(out: &mut String, title: &str, body: &[Stmt], depth: usize) {
    line(out, depth, title);
    for stmt in body {
        dump_stmt(out, stmt, depth + 1);
    }
}

fn dump_stmt(out: &mut String, stmt: &Stmt, depth: usize) {
    match &stmt.kind {
        StmtKind::FunctionDef(def) => {
            let params: Vec<String> = def
                .params
                .iter()
                .map(|p| match &p.annotation {
                    Some(ty) => format!("{}: {}", p.name, ty),
                    None => p.name.clone(),
                })
                .collect();
            let returns = def
                .returns
                .as_ref()
                .map(|ty| format!(" -> {ty}"))
                .unwrap_or_default();
            line(
                out,
                depth,
                format_args!("FunctionDef {}({}){}", def.name, params.join(", "), returns),
            );
            for stmt in &def.body {
                dump_stmt(out, stmt, depth + 1);
            }
        }
        StmtKind::ClassDef(class) => {
            line(
                out,
                depth,
                format_args!("ClassDef {} {:?} bases={:?}", class.name, class.kind, class.bases),
            );
            for stmt in &class.body {
                dump_stmt(out, stmt, depth + 1);
            }
        }
        StmtKind::Assign { target, value } => {
            line(out, depth, "Assign");
            dump_expr(out, target, depth + 1);
            dump_expr(out, value, depth + 1);
        }
        StmtKind::AnnAssign {
            target,
            annotation,
            value,
        } => {
            line(out, depth, format_args!("AnnAssign : {annotation}"));
            dump_expr(out, target, depth + 1);
            if let Some(value) = value {
                dump_expr(out, value, depth + 1);
            }
        }
        StmtKind::If { test, body, orelse } => {
            line(out, depth, "If");
            dump_expr(out, test, depth + 1);
            dump_block(out, "Then", body, depth + 1);
            if !orelse.is_empty() {
                dump_block(out, "Else", orelse, depth + 1);
            }
        }
        StmtKind::While { test, body, label } => {
            line(out, depth, format_args!("While{}", label_suffix(label)));
            dump_expr(out, test, depth + 1);
            dump_block(out, "Body", body, depth + 1);
        }
        StmtKind::For {
            target,
            iter,
            body,
            label,
        } => {
            line(out, depth, format_args!("For {target}{}", label_suffix(label)));
            dump_expr(out, iter, depth + 1);
            dump_block(out, "Body", body, depth + 1);
        }
        StmtKind::Break { label } => line(out, depth, format_args!("Break{}", label_suffix(label))),
        StmtKind::Continue { label } => {
            line(out, depth, format_args!("Continue{}", label_suffix(label)))
        }
        StmtKind::Return(value) => {
            line(out, depth, "Return");
            if let Some(value) = value {
                dump_expr(out, value, depth + 1);
            }
        }
        StmtKind::Expr(expr) => {
            line(out, depth, "Expr");
            dump_expr(out, expr, depth + 1);
        }
        StmtKind::Pass => line(out, depth, "Pass"),
        StmtKind::Match { subject, cases } => {
            line(out, depth, "Match");
            dump_expr(out, subject, depth + 1);
            for case in cases {
                match &case.pattern {
                    Pattern::Wildcard => line(out, depth + 1, "Case _"),
                    Pattern::Value(expr) => {
                        line(out, depth + 1, "Case");
                        dump_expr(out, expr, depth + 2);
                    }
                }
                dump_block(out, "Body", &case.body, depth + 2);
            }
        }
        StmtKind::Import(import) => {
            if import.names.is_empty() {
                line(out, depth, format_args!("Import {}", import.module_path()));
            } else {
                line(
                    out,
                    depth,
                    format_args!("ImportFrom {} [{}]", import.module_path(), import.names.join(", ")),
                );
            }
        }
    }
}

fn label_suffix(label: &Option<String>) -> String {
    label
        .as_ref()
        .map(|l| format!(" label={l:?}"))
        .unwrap_or_default()
}

fn dump_expr(out: &mut String, expr: &Expr, depth: usize) {
    match expr {
        Expr::Name(name) => line(out, depth, format_args!("Name {name}")),
        Expr::Constant(constant) => line(out, depth, format_args!("Constant {constant:?}")),
        Expr::BinOp { left, op, right } => {
            line(out, depth, format_args!("BinOp {}", op.symbol()));
            dump_expr(out, left, depth + 1);
            dump_expr(out, right, depth + 1);
        }
        Expr::UnaryOp { op, operand } => {
            line(out, depth, format_args!("UnaryOp {op:?}"));
            dump_expr(out, operand, depth + 1);
        }
        Expr::Compare { left, op, right } => {
            line(out, depth, format_args!("Compare {}", op.symbol()));
            dump_expr(out, left, depth + 1);
            dump_expr(out, right, depth + 1);
        }
        Expr::BoolOp { op, left, right } => {
            line(out, depth, format_args!("BoolOp {op:?}"));
            dump_expr(out, left, depth + 1);
            dump_expr(out, right, depth + 1);
        }
        Expr::Call { func, args } => {
            line(out, depth, "Call");
            dump_expr(out, func, depth + 1);
            for arg in args {
                dump_expr(out, arg, depth + 1);
            }
        }
        Expr::Attribute { value, attr } => {
            line(out, depth, format_args!("Attribute .{attr}"));
            dump_expr(out, value, depth + 1);
        }
        Expr::Subscript { value, index } => {
            line(out, depth, "Subscript");
            dump_expr(out, value, depth + 1);
            dump_expr(out, index, depth + 1);
        }
    }
}
