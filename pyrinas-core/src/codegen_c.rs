//! C backend.
//!
//! Lowers an analyzed module to one C translation unit. The output is
//! assembled from fixed sections (includes, aggregates and globals,
//! prototypes, function definitions, entry point) so declarations always
//! precede their uses whatever the source order was.
//!
//! The generator re-walks bodies in exactly the order the analyzer did
//! and follows the analyzer's scopes with a cursor, which lets local
//! names resolve to the same symbols the analyzer saw.

use std::fmt::Write as _;

use crate::ast::{
    BinOp, BoolOp, ClassDef, ClassKind, Constant, Expr, FunctionDef, MatchCase, Module,
    Pattern, Stmt, StmtKind, TypeExpr, UnaryOp,
};
use crate::builtins::{BuiltinDescriptor, BuiltinKind, Payload, find_builtin};
use crate::compiler::UnitKind;
use crate::error::CoreError;
use crate::parser::parse_annotation;
use crate::symbols::{
    FunctionSig, GLOBAL_SCOPE, ScopeId, Symbol, SymbolKind, SymbolOrigin, SymbolTable,
};
use crate::typecheck::ENTRY_POINT;
use crate::types::{Type, resolve_annotation, resolve_type};

const INDENT: &str = "    ";

/// Generate the C translation unit for an analyzed module.
///
/// Library units get no `main`, even when they define one.
pub fn generate(
    module: &Module,
    table: &SymbolTable,
    runtime_header: &str,
    unit: UnitKind,
) -> Result<String, CoreError> {
    let mut generator = CGenerator::new(table);
    let aggregates = generator.aggregates(module)?;
    let prototypes = generator.prototypes()?;
    let (functions, mut entry) = generator.functions(module)?;
    if unit == UnitKind::Library {
        entry.clear();
    }
    let includes = generator.includes(runtime_header);

    let sections = [includes, aggregates, prototypes, functions, entry];
    let mut out = String::new();
    for section in sections.iter().filter(|s| !s.is_empty()) {
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(section);
    }
    Ok(out)
}

fn codegen_error(message: impl Into<String>) -> CoreError {
    CoreError::CodeGenError(message.into())
}

/// Goto targets of a labeled loop.
struct LoopFrame {
    label: Option<String>,
    target: Option<String>,
}

struct CGenerator<'a> {
    table: &'a SymbolTable,
    /// Scope the walk is currently in.
    scope: ScopeId,
    /// Last scope entered, in creation order.
    cursor: ScopeId,
    body: String,
    depth: usize,
    loops: Vec<LoopFrame>,
    returns: Type,
    in_entry: bool,
    counter: usize,
    uses_string: bool,
    uses_math: bool,
}

impl<'a> CGenerator<'a> {
    fn new(table: &'a SymbolTable) -> Self {
        CGenerator {
            table,
            scope: GLOBAL_SCOPE,
            cursor: GLOBAL_SCOPE,
            body: String::new(),
            depth: 0,
            loops: Vec::new(),
            returns: Type::None,
            in_entry: false,
            counter: 0,
            uses_string: false,
            uses_math: false,
        }
    }

    // -----------------------------------------------------------------
    // Sections
    // -----------------------------------------------------------------

    fn includes(&self, runtime_header: &str) -> String {
        let mut headers = vec!["stdio.h".to_string(), "stdlib.h".to_string()];
        if self.uses_string {
            headers.push("string.h".to_string());
        }
        if self.uses_math {
            headers.push("math.h".to_string());
        }
        for symbol in self.table.globals() {
            let symbols: Vec<&Symbol> = match &symbol.kind {
                SymbolKind::Module { exports } => exports.iter().collect(),
                _ => vec![symbol],
            };
            for symbol in symbols {
                if let SymbolOrigin::Foreign(origin) = &symbol.origin {
                    if !headers.contains(&origin.header) {
                        headers.push(origin.header.clone());
                    }
                }
            }
        }

        let mut out = String::new();
        for (index, header) in headers.iter().enumerate() {
            let _ = writeln!(out, "#include <{header}>");
            if index == 1 {
                let _ = writeln!(out, "#include \"{runtime_header}\"");
            }
        }
        out
    }

    /// Struct and enum symbols visible to this unit, local and imported.
    fn visible_aggregates(&self) -> Vec<&'a Symbol> {
        let mut seen: Vec<&'a Symbol> = Vec::new();
        let table = self.table;
        for symbol in table.globals() {
            let candidates: Vec<&'a Symbol> = match &symbol.kind {
                SymbolKind::Module { exports } => exports.iter().collect(),
                _ => vec![symbol],
            };
            for candidate in candidates {
                let aggregate = matches!(
                    candidate.kind,
                    SymbolKind::Struct { .. } | SymbolKind::Enum { .. }
                );
                if aggregate && !seen.iter().any(|s| s.name == candidate.name) {
                    seen.push(candidate);
                }
            }
        }
        seen
    }

    fn aggregates(&mut self, module: &Module) -> Result<String, CoreError> {
        let aggregates = self.visible_aggregates();
        let mut out = String::new();

        for symbol in &aggregates {
            if let SymbolKind::Enum { members } = &symbol.kind {
                let _ = writeln!(out, "enum {} {{", symbol.name);
                for (member, value) in members {
                    let _ = writeln!(out, "{INDENT}{}_{member} = {value},", symbol.name);
                }
                out.push_str("};\n\n");
            }
        }

        let structs: Vec<&Symbol> = aggregates
            .iter()
            .copied()
            .filter(|s| matches!(s.kind, SymbolKind::Struct { .. }))
            .collect();
        for symbol in &structs {
            let _ = writeln!(out, "struct {};", symbol.name);
        }
        if !structs.is_empty() {
            out.push('\n');
        }
        for symbol in self.struct_order(&structs)? {
            let SymbolKind::Struct { fields, .. } = &symbol.kind else {
                continue;
            };
            let _ = writeln!(out, "struct {} {{", symbol.name);
            if fields.is_empty() {
                let _ = writeln!(out, "{INDENT}char _empty;");
            }
            for field in fields {
                let _ = writeln!(out, "{INDENT}{};", self.declaration(&field.ty, &field.name)?);
            }
            out.push_str("};\n\n");
        }

        let globals = self.globals(module)?;
        out.push_str(&globals);
        Ok(out)
    }

    /// Order struct definitions so by-value members are complete first.
    fn struct_order<'s>(&self, structs: &[&'s Symbol]) -> Result<Vec<&'s Symbol>, CoreError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Unvisited,
            Visiting,
            Done,
        }

        fn by_value(ty: &Type) -> Option<&str> {
            match ty {
                Type::Named(name) => Some(name),
                Type::Array(item, _) => by_value(item),
                _ => None,
            }
        }

        fn visit<'s>(
            index: usize,
            structs: &[&'s Symbol],
            marks: &mut [Mark],
            order: &mut Vec<&'s Symbol>,
        ) -> Result<(), CoreError> {
            match marks[index] {
                Mark::Done => return Ok(()),
                Mark::Visiting => {
                    return Err(codegen_error(format!(
                        "struct '{}' contains itself by value",
                        structs[index].name
                    )));
                }
                Mark::Unvisited => {}
            }
            marks[index] = Mark::Visiting;
            if let SymbolKind::Struct { fields, .. } = &structs[index].kind {
                for field in fields {
                    let dependency = by_value(&field.ty)
                        .and_then(|name| structs.iter().position(|s| s.name == name));
                    if let Some(dependency) = dependency {
                        visit(dependency, structs, marks, order)?;
                    }
                }
            }
            marks[index] = Mark::Done;
            order.push(structs[index]);
            Ok(())
        }

        let mut marks = vec![Mark::Unvisited; structs.len()];
        let mut order = Vec::with_capacity(structs.len());
        for index in 0..structs.len() {
            visit(index, structs, &mut marks, &mut order)?;
        }
        Ok(order)
    }

    fn globals(&mut self, module: &Module) -> Result<String, CoreError> {
        let mut out = String::new();
        let mut externs: Vec<&Symbol> = Vec::new();
        for symbol in self.table.globals() {
            let SymbolOrigin::Module(_) = symbol.origin else {
                continue;
            };
            let symbols: Vec<&Symbol> = match &symbol.kind {
                SymbolKind::Module { exports } => exports.iter().collect(),
                _ => vec![symbol],
            };
            for symbol in symbols {
                if matches!(symbol.kind, SymbolKind::Variable { .. })
                    && !externs.iter().any(|s| s.name == symbol.name)
                {
                    externs.push(symbol);
                }
            }
        }
        for symbol in externs {
            if let SymbolKind::Variable { ty } = &symbol.kind {
                let qualifier = if symbol.immutable { "const " } else { "" };
                let _ = writeln!(
                    out,
                    "extern {qualifier}{};",
                    self.declaration(ty, &symbol.name)?
                );
            }
        }

        for stmt in &module.body {
            let StmtKind::AnnAssign {
                target: Expr::Name(name),
                annotation,
                value,
            } = &stmt.kind
            else {
                continue;
            };
            let annotation = resolve_annotation(annotation).map_err(codegen_error)?;
            let qualifier = if annotation.immutable { "const " } else { "" };
            let declaration = self.declaration(&annotation.ty, name)?;
            let initializer = match value {
                Some(value) => format!(" = {}", self.expr(value)?),
                None => self.zero_initializer(&annotation.ty),
            };
            let _ = writeln!(out, "{qualifier}{declaration}{initializer};");
        }
        if !out.is_empty() {
            out.push('\n');
        }
        Ok(out)
    }

    fn prototypes(&self) -> Result<String, CoreError> {
        let mut out = String::new();
        let mut declared: Vec<String> = Vec::new();
        let mut declare = |out: &mut String, prototype: String| {
            if !declared.contains(&prototype) {
                let _ = writeln!(out, "{prototype};");
                declared.push(prototype);
            }
        };

        let table = self.table;
        for symbol in table.globals() {
            let symbols: Vec<&Symbol> = match &symbol.kind {
                SymbolKind::Module { exports } => exports.iter().collect(),
                _ => vec![symbol],
            };
            for symbol in symbols {
                match &symbol.kind {
                    SymbolKind::Function(sig)
                        if !symbol.is_foreign() && symbol.name != ENTRY_POINT =>
                    {
                        declare(&mut out, self.prototype(&symbol.name, sig, None)?);
                    }
                    SymbolKind::Struct { methods, .. } => {
                        for method in methods {
                            let prototype =
                                self.prototype(&method.name, &method.sig, Some(&symbol.name))?;
                            declare(&mut out, prototype);
                        }
                    }
                    _ => {}
                }
            }
        }
        Ok(out)
    }

    /// `ret name(types...)`, with the receiver first for methods.
    fn prototype(
        &self,
        name: &str,
        sig: &FunctionSig,
        owner: Option<&str>,
    ) -> Result<String, CoreError> {
        let mut params = Vec::new();
        if let Some(owner) = owner {
            params.push(format!("struct {owner}*"));
        }
        for param in &sig.params {
            params.push(self.c_type(param)?);
        }
        let params = if params.is_empty() {
            "void".to_string()
        } else {
            params.join(", ")
        };
        Ok(format!(
            "{} {}({params})",
            self.c_type(&sig.returns)?,
            function_name(name, owner)
        ))
    }

    /// Definitions in source order; `main` goes to its own section.
    fn functions(&mut self, module: &Module) -> Result<(String, String), CoreError> {
        let mut functions = String::new();
        let mut entry = String::new();
        for stmt in &module.body {
            match &stmt.kind {
                StmtKind::FunctionDef(def) if def.name == ENTRY_POINT => {
                    entry.push_str(&self.function(def, None)?);
                }
                StmtKind::FunctionDef(def) => {
                    functions.push_str(&self.function(def, None)?);
                    functions.push('\n');
                }
                StmtKind::ClassDef(class) if class.kind == ClassKind::Struct => {
                    for def in methods_of(class) {
                        functions.push_str(&self.function(def, Some(&class.name))?);
                        functions.push('\n');
                    }
                }
                _ => {}
            }
        }
        Ok((functions, entry))
    }

    fn function(&mut self, def: &FunctionDef, owner: Option<&str>) -> Result<String, CoreError> {
        let sig = self.signature_of(def, owner)?;
        let is_entry = owner.is_none() && def.name == ENTRY_POINT;

        let mut params = Vec::new();
        let mut names = def.params.iter();
        if let Some(owner) = owner {
            let receiver = names
                .next()
                .ok_or_else(|| codegen_error(format!("method '{owner}.{}' has no receiver", def.name)))?;
            params.push(format!("struct {owner}* {}", receiver.name));
        }
        for (param, ty) in names.zip(&sig.params) {
            params.push(self.parameter(ty, &param.name)?);
        }
        let params = if params.is_empty() {
            "void".to_string()
        } else {
            params.join(", ")
        };
        let header = if is_entry {
            format!("int {ENTRY_POINT}({params})")
        } else {
            format!(
                "{} {}({params})",
                self.c_type(&sig.returns)?,
                function_name(&def.name, owner)
            )
        };

        self.body = String::new();
        self.depth = 1;
        self.loops.clear();
        self.returns = sig.returns;
        self.in_entry = is_entry;

        self.enter_scope()?;
        self.statements(&def.body)?;
        if is_entry {
            self.line("return 0;");
        }
        self.leave_scope();

        Ok(format!("{header} {{\n{}}}\n", std::mem::take(&mut self.body)))
    }

    fn signature_of(&self, def: &FunctionDef, owner: Option<&str>) -> Result<FunctionSig, CoreError> {
        let found = match owner {
            Some(owner) => self
                .table
                .global(owner)
                .and_then(|s| s.method(&def.name))
                .map(|m| m.sig.clone()),
            None => match self.table.global(&def.name).map(|s| &s.kind) {
                Some(SymbolKind::Function(sig)) => Some(sig.clone()),
                _ => None,
            },
        };
        found.ok_or_else(|| codegen_error(format!("function '{}' was not analyzed", def.name)))
    }

    // -----------------------------------------------------------------
    // Scopes and output helpers
    // -----------------------------------------------------------------

    /// Step into the next scope the analyzer created.
    fn enter_scope(&mut self) -> Result<(), CoreError> {
        let next = self.cursor + 1;
        if next >= self.table.scope_count() || self.table.parent(next) != Some(self.scope) {
            return Err(codegen_error(
                "scope layout does not match the analyzed program",
            ));
        }
        self.cursor = next;
        self.scope = next;
        Ok(())
    }

    fn leave_scope(&mut self) {
        self.scope = self.table.parent(self.scope).unwrap_or(GLOBAL_SCOPE);
    }

    fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.depth {
            self.body.push_str(INDENT);
        }
        self.body.push_str(text.as_ref());
        self.body.push('\n');
    }

    fn fresh(&mut self, stem: &str) -> String {
        self.counter += 1;
        format!("{stem}_{}", self.counter)
    }

    fn lookup(&self, name: &str) -> Option<&'a Symbol> {
        let table = self.table;
        table.lookup_from(self.scope, name)
    }

    // -----------------------------------------------------------------
    // Types
    // -----------------------------------------------------------------

    fn c_type(&self, ty: &Type) -> Result<String, CoreError> {
        match ty {
            Type::Int | Type::Bool => Ok("int".to_string()),
            Type::Float => Ok("float".to_string()),
            Type::Str => Ok("char*".to_string()),
            Type::None => Ok("void".to_string()),
            Type::Ptr(inner) | Type::Array(inner, _) => Ok(format!("{}*", self.c_type(inner)?)),
            Type::Result(..) => Ok("Result".to_string()),
            Type::Named(name) => match self.table.global(name).map(|s| &s.kind) {
                Some(SymbolKind::Struct { .. }) => Ok(format!("struct {name}")),
                Some(SymbolKind::Enum { .. }) => Ok(format!("enum {name}")),
                Some(SymbolKind::Interface { .. }) => Err(codegen_error(format!(
                    "interface '{name}' has no C representation"
                ))),
                _ => match self.import_aggregate(name) {
                    Some(SymbolKind::Struct { .. }) => Ok(format!("struct {name}")),
                    Some(SymbolKind::Enum { .. }) => Ok(format!("enum {name}")),
                    _ => Err(codegen_error(format!("unknown type '{name}'"))),
                },
            },
            Type::Range => Err(codegen_error("range values have no C representation")),
        }
    }

    fn import_aggregate(&self, name: &str) -> Option<&'a SymbolKind> {
        self.visible_aggregates()
            .into_iter()
            .find(|s| s.name == name)
            .map(|s| &s.kind)
    }

    /// `T name` or `T name[N]...` for arrays.
    fn declaration(&self, ty: &Type, name: &str) -> Result<String, CoreError> {
        let mut dims = String::new();
        let mut item = ty;
        while let Type::Array(inner, size) = item {
            let _ = write!(dims, "[{size}]");
            item = inner;
        }
        Ok(format!("{} {name}{dims}", self.c_type(item)?))
    }

    /// Arrays decay to pointers at function boundaries.
    fn parameter(&self, ty: &Type, name: &str) -> Result<String, CoreError> {
        Ok(format!("{} {name}", self.c_type(ty)?))
    }

    fn zero_initializer(&self, ty: &Type) -> String {
        match ty {
            Type::Array(..) | Type::Result(..) => " = {0}".to_string(),
            Type::Named(name) if self.is_struct(name) => " = {0}".to_string(),
            _ => String::new(),
        }
    }

    fn is_struct(&self, name: &str) -> bool {
        matches!(
            self.table.global(name).map(|s| &s.kind),
            Some(SymbolKind::Struct { .. })
        ) || matches!(self.import_aggregate(name), Some(SymbolKind::Struct { .. }))
    }

    fn struct_symbol(&self, ty: &Type) -> Option<&'a Symbol> {
        let name = ty.pointee_or_self().named()?;
        let table = self.table;
        table
            .global(name)
            .filter(|s| matches!(s.kind, SymbolKind::Struct { .. }))
            .or_else(|| {
                self.visible_aggregates()
                    .into_iter()
                    .find(|s| s.name == name && matches!(s.kind, SymbolKind::Struct { .. }))
            })
    }

    /// Whether C's comparison operators apply to values of `ty`.
    fn is_equatable(&self, ty: &Type) -> bool {
        match ty {
            Type::Array(..) | Type::Result(..) | Type::Range => false,
            Type::Named(_) => self.is_enum(ty),
            _ => true,
        }
    }

    fn is_enum(&self, ty: &Type) -> bool {
        match ty.named() {
            Some(name) => matches!(
                self.table.global(name).map(|s| &s.kind),
                Some(SymbolKind::Enum { .. })
            ) || matches!(self.import_aggregate(name), Some(SymbolKind::Enum { .. })),
            None => false,
        }
    }

    /// Best-effort static type of an expression, used to pick lowerings.
    fn type_of(&self, expr: &Expr) -> Option<Type> {
        match expr {
            Expr::Name(name) => match &self.lookup(name)?.kind {
                SymbolKind::Variable { ty } => Some(ty.clone()),
                _ => None,
            },
            Expr::Constant(constant) => Some(match constant {
                Constant::Int(_) => Type::Int,
                Constant::Float(_) => Type::Float,
                Constant::Str(_) => Type::Str,
                Constant::Bool(_) => Type::Bool,
                Constant::None => Type::None,
            }),
            Expr::BinOp { left, right, .. } => {
                let left = self.type_of(left).unwrap_or(Type::Int);
                let right = self.type_of(right).unwrap_or(Type::Int);
                Some(Type::arithmetic(&left, &right))
            }
            Expr::UnaryOp { op: UnaryOp::Not, .. } => Some(Type::Bool),
            Expr::UnaryOp { operand, .. } => self.type_of(operand),
            Expr::Compare { .. } | Expr::BoolOp { .. } => Some(Type::Bool),
            Expr::Call { func, args } => self.call_type(func, args),
            Expr::Attribute { value, attr } => {
                if let Expr::Name(base) = value.as_ref() {
                    if let Some(symbol) = self.lookup(base) {
                        match &symbol.kind {
                            SymbolKind::Enum { .. } => return Some(Type::Named(base.clone())),
                            SymbolKind::Module { .. } => {
                                return symbol.export(attr).and_then(|s| match &s.kind {
                                    SymbolKind::Variable { ty } => Some(ty.clone()),
                                    _ => None,
                                });
                            }
                            _ => {}
                        }
                    }
                }
                let base = self.type_of(value)?;
                self.struct_symbol(&base)?.field(attr).map(|f| f.ty.clone())
            }
            Expr::Subscript { value, .. } => self.type_of(value)?.element().cloned(),
        }
    }

    fn call_type(&self, func: &Expr, args: &[Expr]) -> Option<Type> {
        match func {
            Expr::Name(name) => {
                if let Some(builtin) = find_builtin(name) {
                    return match builtin.kind {
                        BuiltinKind::Addr => Some(Type::ptr(self.type_of(args.first()?)?)),
                        BuiltinKind::Deref => match self.type_of(args.first()?)? {
                            Type::Ptr(inner) => Some(*inner),
                            _ => None,
                        },
                        BuiltinKind::Malloc => Some(Type::ptr(Type::None)),
                        BuiltinKind::SizeOf | BuiltinKind::IntCast => Some(Type::Int),
                        BuiltinKind::FloatCast => Some(Type::Float),
                        BuiltinKind::IsOk | BuiltinKind::IsErr => Some(Type::Bool),
                        BuiltinKind::Unwrap(payload)
                        | BuiltinKind::UnwrapOr(payload)
                        | BuiltinKind::Expect(payload) => Some(payload.ty()),
                        _ => None,
                    };
                }
                match &self.lookup(name)?.kind {
                    SymbolKind::Function(sig) => Some(sig.returns.clone()),
                    SymbolKind::Struct { .. } => Some(Type::Named(name.clone())),
                    _ => None,
                }
            }
            Expr::Attribute { value, attr } => {
                if let Expr::Name(base) = value.as_ref() {
                    if let Some(module) = self
                        .lookup(base)
                        .filter(|s| matches!(s.kind, SymbolKind::Module { .. }))
                    {
                        return match &module.export(attr)?.kind {
                            SymbolKind::Function(sig) => Some(sig.returns.clone()),
                            SymbolKind::Struct { .. } => Some(Type::Named(attr.clone())),
                            _ => None,
                        };
                    }
                }
                let receiver = self.type_of(value)?;
                self.struct_symbol(&receiver)?
                    .method(attr)
                    .map(|m| m.sig.returns.clone())
            }
            _ => None,
        }
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn statements(&mut self, body: &[Stmt]) -> Result<(), CoreError> {
        for stmt in body {
            self.statement(stmt)?;
        }
        Ok(())
    }

    /// A nested block in its own scope, one level deeper.
    fn block(&mut self, body: &[Stmt]) -> Result<(), CoreError> {
        self.enter_scope()?;
        self.depth += 1;
        let result = self.statements(body);
        self.depth -= 1;
        self.leave_scope();
        result
    }

    fn statement(&mut self, stmt: &Stmt) -> Result<(), CoreError> {
        match &stmt.kind {
            StmtKind::AnnAssign {
                target,
                annotation,
                value,
            } => self.local_declaration(target, annotation, value.as_ref()),
            StmtKind::Assign { target, value } => {
                let expected = self.type_of(target);
                if let Some(ty @ Type::Array(..)) = &expected {
                    return Err(codegen_error(format!(
                        "line {}: an array of type '{ty}' cannot be assigned as a whole",
                        stmt.line
                    )));
                }
                let target = self.expr(target)?;
                let value = self.value(value, expected.as_ref())?;
                self.line(format!("{target} = {value};"));
                Ok(())
            }
            StmtKind::If { test, body, orelse } => {
                let test = self.expr(test)?;
                self.line(format!("if ({test}) {{"));
                self.block(body)?;
                self.else_branch(orelse)?;
                self.line("}");
                Ok(())
            }
            StmtKind::While { test, body, label } => {
                let test = self.expr(test)?;
                self.line(format!("while ({test}) {{"));
                self.loop_body(body, label, &[])
            }
            StmtKind::For {
                target,
                iter,
                body,
                label,
            } => self.for_loop(target, iter, body, label),
            StmtKind::Break { label } => {
                let text = self.jump(label, "break")?;
                self.line(text);
                Ok(())
            }
            StmtKind::Continue { label } => {
                let text = self.jump(label, "continue")?;
                self.line(text);
                Ok(())
            }
            StmtKind::Return(value) => {
                if self.in_entry {
                    self.line("return 0;");
                    return Ok(());
                }
                match value {
                    None | Some(Expr::Constant(Constant::None)) if self.returns == Type::None => {
                        self.line("return;");
                    }
                    None => self.line("return;"),
                    Some(value) => {
                        let returns = self.returns.clone();
                        let value = self.value(value, Some(&returns))?;
                        self.line(format!("return {value};"));
                    }
                }
                Ok(())
            }
            // Docstrings and bare string statements.
            StmtKind::Expr(Expr::Constant(Constant::Str(_))) => Ok(()),
            StmtKind::Expr(expr) => {
                let text = self.expr(expr)?;
                self.line(format!("{text};"));
                Ok(())
            }
            StmtKind::Pass => Ok(()),
            StmtKind::Match { subject, cases } => self.match_chain(subject, cases),
            StmtKind::Import(_) | StmtKind::FunctionDef(_) | StmtKind::ClassDef(_) => Err(
                codegen_error(format!("line {}: nested declarations cannot be lowered", stmt.line)),
            ),
        }
    }

    fn local_declaration(
        &mut self,
        target: &Expr,
        annotation: &TypeExpr,
        value: Option<&Expr>,
    ) -> Result<(), CoreError> {
        let Expr::Name(name) = target else {
            return Err(codegen_error("only names can be declared"));
        };
        let annotation = resolve_annotation(annotation).map_err(codegen_error)?;
        let ty = annotation.ty;
        let qualifier = if annotation.immutable { "const " } else { "" };
        let declaration = self.declaration(&ty, name)?;
        let initializer = match value {
            Some(_) if matches!(ty, Type::Array(..)) => {
                return Err(codegen_error(format!(
                    "array '{name}' cannot be initialized from another array"
                )));
            }
            Some(value) if self.is_constructor(value) => " = {0}".to_string(),
            Some(value) => format!(" = {}", self.value(value, Some(&ty))?),
            None => self.zero_initializer(&ty),
        };
        self.line(format!("{qualifier}{declaration}{initializer};"));
        Ok(())
    }

    /// Emits the `else` part; the closing brace is left to the caller.
    fn else_branch(&mut self, orelse: &[Stmt]) -> Result<(), CoreError> {
        match orelse {
            [] => {
                // The analyzer still opened a scope for the empty branch.
                self.enter_scope()?;
                self.leave_scope();
                Ok(())
            }
            [
                Stmt {
                    kind: StmtKind::If { test, body, orelse },
                    ..
                },
            ] => {
                self.enter_scope()?;
                let result = self.elif(test, body, orelse);
                self.leave_scope();
                result
            }
            _ => {
                self.line("} else {");
                self.block(orelse)
            }
        }
    }

    fn elif(&mut self, test: &Expr, body: &[Stmt], orelse: &[Stmt]) -> Result<(), CoreError> {
        let test = self.expr(test)?;
        self.line(format!("}} else if ({test}) {{"));
        self.block(body)?;
        self.else_branch(orelse)
    }

    /// Body of a loop whose header is already written. `prologue` lines
    /// are emitted first inside the loop's scope.
    fn loop_body(
        &mut self,
        body: &[Stmt],
        label: &Option<String>,
        prologue: &[String],
    ) -> Result<(), CoreError> {
        let target = label.as_ref().map(|label| self.fresh(&c_identifier(label)));
        self.loops.push(LoopFrame {
            label: label.clone(),
            target: target.clone(),
        });

        self.enter_scope()?;
        self.depth += 1;
        for line in prologue {
            self.line(line);
        }
        let result = self.statements(body);
        if let Some(target) = &target {
            self.line(format!("{target}_continue: ;"));
        }
        self.depth -= 1;
        self.leave_scope();
        self.loops.pop();
        result?;

        self.line("}");
        if let Some(target) = &target {
            self.line(format!("{target}_break: ;"));
        }
        Ok(())
    }

    fn for_loop(
        &mut self,
        target: &str,
        iter: &Expr,
        body: &[Stmt],
        label: &Option<String>,
    ) -> Result<(), CoreError> {
        if let Expr::Call { func, args } = iter {
            if is_builtin(func, BuiltinKind::Range) {
                let (start, stop) = match args.as_slice() {
                    [stop] => ("0".to_string(), self.expr(stop)?),
                    [start, stop] => (self.expr(start)?, self.expr(stop)?),
                    _ => return Err(codegen_error("range() takes one or two arguments")),
                };
                self.line(format!(
                    "for (int {target} = {start}; {target} < {stop}; {target}++) {{"
                ));
                return self.loop_body(body, label, &[]);
            }
        }

        let Some(Type::Array(item, size)) = self.type_of(iter) else {
            return Err(codegen_error("for loops iterate over ranges or arrays"));
        };
        if matches!(*item, Type::Array(..)) {
            return Err(codegen_error("iterating over nested arrays is not supported"));
        }
        let array = self.expr(iter)?;
        let index = self.fresh("_i");
        let element = self.declaration(&item, target)?;
        self.line(format!(
            "for (int {index} = 0; {index} < {size}; {index}++) {{"
        ));
        self.loop_body(body, label, &[format!("{element} = {array}[{index}];")])
    }

    fn jump(&self, label: &Option<String>, keyword: &str) -> Result<String, CoreError> {
        let Some(label) = label else {
            return Ok(format!("{keyword};"));
        };
        let frame = self
            .loops
            .iter()
            .rev()
            .find(|frame| frame.label.as_ref() == Some(label))
            .ok_or_else(|| codegen_error(format!("no enclosing loop is labeled '{label}'")))?;
        match &frame.target {
            Some(target) => Ok(format!("goto {target}_{keyword};")),
            None => Ok(format!("{keyword};")),
        }
    }

    fn match_chain(&mut self, subject: &Expr, cases: &[MatchCase]) -> Result<(), CoreError> {
        let subject_ty = self.type_of(subject);
        if let Some(ty) = subject_ty.as_ref().filter(|ty| !self.is_equatable(ty)) {
            return Err(codegen_error(format!("cannot match on a value of type '{ty}'")));
        }
        let mut subject_text = self.expr(subject)?;
        if !matches!(subject, Expr::Name(_) | Expr::Attribute { .. } | Expr::Constant(_)) {
            if let Some(ty) = &subject_ty {
                let temp = self.fresh("_match");
                let declaration = self.declaration(ty, &temp)?;
                self.line(format!("{declaration} = {subject_text};"));
                subject_text = temp;
            }
        }
        let is_str = subject_ty == Some(Type::Str);

        for (index, case) in cases.iter().enumerate() {
            let condition = match &case.pattern {
                Pattern::Wildcard => None,
                Pattern::Value(pattern) => {
                    let pattern = self.expr(pattern)?;
                    Some(if is_str {
                        self.uses_string = true;
                        format!("strcmp({subject_text}, {pattern}) == 0")
                    } else {
                        format!("{subject_text} == {pattern}")
                    })
                }
            };
            let opener = match (index, condition) {
                (0, Some(condition)) => format!("if ({condition}) {{"),
                (0, None) => "if (1) {".to_string(),
                (_, Some(condition)) => format!("}} else if ({condition}) {{"),
                (_, None) => "} else {".to_string(),
            };
            self.line(opener);
            self.block(&case.body)?;
        }
        if !cases.is_empty() {
            self.line("}");
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    fn is_constructor(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Call { func, .. } => match func.as_ref() {
                Expr::Name(name) => matches!(
                    self.lookup(name).map(|s| &s.kind),
                    Some(SymbolKind::Struct { .. })
                ),
                _ => false,
            },
            _ => false,
        }
    }

    /// Lower a value stored where `expected` is required.
    fn value(&mut self, expr: &Expr, expected: Option<&Type>) -> Result<String, CoreError> {
        if let Expr::Call { func, args } = expr {
            let ctor = [BuiltinKind::Ok, BuiltinKind::Err]
                .into_iter()
                .find(|kind| is_builtin(func, *kind));
            if let Some(kind) = ctor {
                let Some(Type::Result(ok, err)) = expected else {
                    return Err(codegen_error("Ok/Err need a Result context"));
                };
                let (tag, payload_ty) = if kind == BuiltinKind::Ok {
                    ("OK", ok.as_ref())
                } else {
                    ("ERR", err.as_ref())
                };
                let payload = if self.is_enum(payload_ty) {
                    Some(Payload::Int)
                } else {
                    Payload::for_type(payload_ty)
                }
                .ok_or_else(|| {
                    codegen_error(format!("a Result cannot carry a '{payload_ty}' payload"))
                })?;
                let arg = args
                    .first()
                    .ok_or_else(|| codegen_error("Ok/Err take exactly one argument"))?;
                let arg = self.value(arg, Some(payload_ty))?;
                return Ok(format!(
                    "(Result){{ .type = {tag}, .value = {{ .{} = {arg} }} }}",
                    payload.slot()
                ));
            }
        }
        self.expr(expr)
    }

    fn expr(&mut self, expr: &Expr) -> Result<String, CoreError> {
        match expr {
            Expr::Name(name) => Ok(name.clone()),
            Expr::Constant(constant) => Ok(constant_text(constant)),
            Expr::BinOp { left, op, right } => {
                let ty = self.type_of(expr);
                let left = self.expr(left)?;
                let right = self.expr(right)?;
                let float = ty == Some(Type::Float);
                Ok(match op {
                    BinOp::FloorDiv if float => {
                        self.uses_math = true;
                        format!("floor({left} / {right})")
                    }
                    BinOp::FloorDiv => format!("({left} / {right})"),
                    BinOp::Mod if float => {
                        self.uses_math = true;
                        format!("fmod({left}, {right})")
                    }
                    _ => format!("({left} {} {right})", op.symbol()),
                })
            }
            Expr::UnaryOp { op, operand } => {
                let operand = self.expr(operand)?;
                Ok(match op {
                    UnaryOp::Not => format!("(!{operand})"),
                    UnaryOp::Neg => format!("(-{operand})"),
                    UnaryOp::Pos => format!("(+{operand})"),
                })
            }
            Expr::Compare { left, op, right } => {
                let left_ty = self.type_of(left);
                let right_ty = self.type_of(right);
                for ty in [&left_ty, &right_ty].into_iter().flatten() {
                    if !self.is_equatable(ty) {
                        return Err(codegen_error(format!(
                            "values of type '{ty}' cannot be compared in C"
                        )));
                    }
                }
                let strings = left_ty == Some(Type::Str) && right_ty == Some(Type::Str);
                let left = self.expr(left)?;
                let right = self.expr(right)?;
                if strings {
                    self.uses_string = true;
                    Ok(format!("(strcmp({left}, {right}) {} 0)", op.symbol()))
                } else {
                    Ok(format!("({left} {} {right})", op.symbol()))
                }
            }
            Expr::BoolOp { op, left, right } => {
                let left = self.expr(left)?;
                let right = self.expr(right)?;
                let op = match op {
                    BoolOp::And => "&&",
                    BoolOp::Or => "||",
                };
                Ok(format!("({left} {op} {right})"))
            }
            Expr::Call { func, args } => self.call(func, args),
            Expr::Attribute { value, attr } => self.attribute(value, attr),
            Expr::Subscript { value, index } => {
                let value = self.expr(value)?;
                let index = self.expr(index)?;
                Ok(format!("{value}[{index}]"))
            }
        }
    }

    fn attribute(&mut self, value: &Expr, attr: &str) -> Result<String, CoreError> {
        if let Expr::Name(base) = value {
            if let Some(symbol) = self.lookup(base) {
                match symbol.kind {
                    SymbolKind::Enum { .. } => return Ok(format!("{base}_{attr}")),
                    SymbolKind::Module { .. } => return Ok(attr.to_string()),
                    _ => {}
                }
            }
        }
        let pointer = self.type_of(value).is_some_and(|ty| ty.is_pointer());
        let base = self.expr(value)?;
        Ok(if pointer {
            format!("{base}->{attr}")
        } else {
            format!("{base}.{attr}")
        })
    }

    fn arguments(&mut self, args: &[Expr], params: &[Type]) -> Result<Vec<String>, CoreError> {
        args.iter()
            .enumerate()
            .map(|(index, arg)| self.value(arg, params.get(index)))
            .collect()
    }

    fn call(&mut self, func: &Expr, args: &[Expr]) -> Result<String, CoreError> {
        match func {
            Expr::Name(name) => {
                if let Some(builtin) = find_builtin(name) {
                    return self.builtin_call(builtin, args);
                }
                let symbol = self
                    .lookup(name)
                    .ok_or_else(|| codegen_error(format!("unknown function '{name}'")))?;
                match &symbol.kind {
                    SymbolKind::Struct { .. } => Ok(format!("(struct {name}){{0}}")),
                    SymbolKind::Function(sig) => {
                        let args = self.arguments(args, &sig.params)?;
                        Ok(format!("{name}({})", args.join(", ")))
                    }
                    _ => Err(codegen_error(format!("'{name}' is not callable"))),
                }
            }
            Expr::Attribute { value, attr } => {
                if let Expr::Name(base) = value.as_ref() {
                    if let Some(module) = self
                        .lookup(base)
                        .filter(|s| matches!(s.kind, SymbolKind::Module { .. }))
                    {
                        let export = module.export(attr).ok_or_else(|| {
                            codegen_error(format!("module '{base}' has no export '{attr}'"))
                        })?;
                        return match &export.kind {
                            SymbolKind::Struct { .. } => Ok(format!("(struct {attr}){{0}}")),
                            SymbolKind::Function(sig) => {
                                let args = self.arguments(args, &sig.params)?;
                                Ok(format!("{attr}({})", args.join(", ")))
                            }
                            _ => Err(codegen_error(format!("'{base}.{attr}' is not callable"))),
                        };
                    }
                }

                let receiver_ty = self
                    .type_of(value)
                    .ok_or_else(|| codegen_error(format!("cannot resolve receiver of '{attr}'")))?;
                let owner = self.struct_symbol(&receiver_ty).ok_or_else(|| {
                    codegen_error(format!("'{receiver_ty}' has no method '{attr}'"))
                })?;
                let method = owner.method(attr).ok_or_else(|| {
                    codegen_error(format!("struct '{}' has no method '{attr}'", owner.name))
                })?;
                let receiver = self.expr(value)?;
                let receiver = if receiver_ty.is_pointer() {
                    receiver
                } else {
                    format!("&{receiver}")
                };
                let mut lowered = vec![receiver];
                lowered.extend(self.arguments(args, &method.sig.params)?);
                Ok(format!(
                    "{}({})",
                    function_name(attr, Some(&owner.name)),
                    lowered.join(", ")
                ))
            }
            _ => Err(codegen_error("only named functions and methods can be called")),
        }
    }

    fn builtin_call(
        &mut self,
        builtin: &BuiltinDescriptor,
        args: &[Expr],
    ) -> Result<String, CoreError> {
        let arg = |index: usize| {
            args.get(index).ok_or_else(|| {
                codegen_error(format!("{}() expects {}", builtin.name, builtin.arity_text()))
            })
        };
        if builtin.is_runtime_helper() {
            let args = args
                .iter()
                .map(|a| self.expr(a))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(format!("{}({})", builtin.name, args.join(", ")));
        }
        match builtin.kind {
            BuiltinKind::Print => {
                let value = arg(0)?;
                let ty = self.type_of(value);
                let text = self.expr(value)?;
                Ok(match ty {
                    Some(Type::Float) => format!("printf(\"%f\\n\", {text})"),
                    Some(Type::Str) => format!("printf(\"%s\\n\", {text})"),
                    Some(Type::Ptr(_)) => format!("printf(\"%p\\n\", (void*){text})"),
                    _ => format!("printf(\"%d\\n\", {text})"),
                })
            }
            BuiltinKind::Range => Err(codegen_error("range() is only valid in a for loop")),
            BuiltinKind::Addr => Ok(format!("(&{})", self.expr(arg(0)?)?)),
            BuiltinKind::Deref => Ok(format!("(*{})", self.expr(arg(0)?)?)),
            BuiltinKind::Store => {
                let target = arg(0)?;
                let pointee = match self.type_of(target) {
                    Some(Type::Ptr(inner)) => Some(*inner),
                    _ => None,
                };
                let pointer = self.expr(target)?;
                let value = self.value(arg(1)?, pointee.as_ref())?;
                Ok(format!("*({pointer}) = {value}"))
            }
            BuiltinKind::Malloc => Ok(format!("malloc({})", self.expr(arg(0)?)?)),
            BuiltinKind::Free => Ok(format!("free({})", self.expr(arg(0)?)?)),
            BuiltinKind::SizeOf => {
                let ty = self.sizeof_type(arg(0)?)?;
                Ok(format!("sizeof({})", self.c_type(&ty)?))
            }
            BuiltinKind::IntCast => Ok(format!("((int)({}))", self.expr(arg(0)?)?)),
            BuiltinKind::FloatCast => Ok(format!("((float)({}))", self.expr(arg(0)?)?)),
            BuiltinKind::Ok | BuiltinKind::Err => Err(codegen_error(format!(
                "{}() needs a Result context",
                builtin.name
            ))),
            BuiltinKind::IsOk
            | BuiltinKind::IsErr
            | BuiltinKind::Unwrap(_)
            | BuiltinKind::UnwrapOr(_)
            | BuiltinKind::Expect(_) => Err(codegen_error(format!(
                "{}() is provided by the runtime library",
                builtin.name
            ))),
        }
    }

    fn sizeof_type(&self, arg: &Expr) -> Result<Type, CoreError> {
        let expr = match arg {
            Expr::Constant(Constant::Str(text)) => parse_annotation(text, 0)
                .map_err(|err| codegen_error(err.message().to_string()))?,
            Expr::Name(name) => TypeExpr::Name(name.clone()),
            _ => return Err(codegen_error("sizeof() expects a type")),
        };
        resolve_type(&expr).map_err(codegen_error)
    }
}

fn methods_of(class: &ClassDef) -> impl Iterator<Item = &FunctionDef> {
    class.body.iter().filter_map(|stmt| match &stmt.kind {
        StmtKind::FunctionDef(def) => Some(def),
        _ => None,
    })
}

fn function_name(name: &str, owner: Option<&str>) -> String {
    match owner {
        Some(owner) => format!("{owner}_{name}"),
        None => name.to_string(),
    }
}

fn is_builtin(func: &Expr, kind: BuiltinKind) -> bool {
    match func {
        Expr::Name(name) => find_builtin(name).is_some_and(|b| b.kind == kind),
        _ => false,
    }
}

fn c_identifier(label: &str) -> String {
    let mut ident: String = label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if ident.is_empty() || ident.starts_with(|c: char| c.is_ascii_digit()) {
        ident.insert(0, '_');
    }
    ident
}

fn constant_text(constant: &Constant) -> String {
    match constant {
        Constant::Int(value) => value.to_string(),
        Constant::Float(value) => format!("{value:?}"),
        Constant::Str(text) => c_string(text),
        Constant::Bool(true) => "1".to_string(),
        Constant::Bool(false) => "0".to_string(),
        Constant::None => "NULL".to_string(),
    }
}

fn c_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\{:03o}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::typecheck::analyze;

    fn generate_c(source: &str) -> String {
        try_generate(source).expect("codegen")
    }

    fn try_generate(source: &str) -> Result<String, CoreError> {
        let module = parse(source).expect("parse");
        let table = analyze(&module, UnitKind::Program, &[]).expect("analyze");
        generate(&module, &table, "pyrinas.h", UnitKind::Program)
    }

    #[test]
    fn lowers_minimal_program() {
        let c = generate_c("def main():\n    print(1)\n");
        assert!(c.starts_with("#include <stdio.h>\n#include <stdlib.h>\n#include \"pyrinas.h\"\n"));
        assert!(c.contains("int main(void) {\n    printf(\"%d\\n\", 1);\n    return 0;\n}\n"));
    }

    #[test]
    fn generation_is_deterministic() {
        let source = "from typing import Enum\n\nclass Mode(Enum):\n    ON = 1\n    OFF = 0\n\nclass Box:\n    mode: Mode\n    size: float\n\ndef main():\n    b: Box = Box()\n    b.mode = Mode.ON\n    print(b.size)\n";
        let module = parse(source).expect("parse");
        let table = analyze(&module, UnitKind::Program, &[]).expect("analyze");
        let first = generate(&module, &table, "pyrinas.h", UnitKind::Program).expect("first");
        let second = generate(&module, &table, "pyrinas.h", UnitKind::Program).expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn defines_by_value_members_first() {
        let source = "class Line:\n    start: Point\n    end: Point\n\nclass Point:\n    x: int\n    y: int\n\ndef main():\n    l: Line = Line()\n    print(l.end.y)\n";
        let c = generate_c(source);
        let point = c.find("struct Point {").expect("Point defined");
        let line = c.find("struct Line {").expect("Line defined");
        assert!(point < line);
        assert!(c.contains("struct Line;\nstruct Point;\n"));
        assert!(c.contains("struct Line l = {0};"));
        assert!(c.contains("printf(\"%d\\n\", l.end.y);"));
    }

    #[test]
    fn rejects_by_value_cycles() {
        let source = "class A:\n    b: B\n\nclass B:\n    a: A\n\ndef main():\n    pass\n";
        let err = try_generate(source).unwrap_err();
        assert!(matches!(err, CoreError::CodeGenError(ref m) if m.contains("by value")), "{err}");
    }

    #[test]
    fn lowers_enums() {
        let source = "class Color(Enum):\n    RED = 0\n    BLUE = -2\n\ndef main():\n    c: Color = Color.BLUE\n    print(c)\n";
        let c = generate_c(source);
        assert!(c.contains("enum Color {\n    Color_RED = 0,\n    Color_BLUE = -2,\n};"));
        assert!(c.contains("enum Color c = Color_BLUE;"));
        assert!(c.contains("printf(\"%d\\n\", c);"));
    }

    #[test]
    fn picks_print_format_from_types() {
        let source = "class P:\n    w: float\n\ndef main():\n    s: str = \"hi\"\n    p: P = P()\n    print(2.5)\n    print(s)\n    print(p.w)\n    print(True)\n    print(addr(p))\n";
        let c = generate_c(source);
        assert!(c.contains("printf(\"%f\\n\", 2.5);"));
        assert!(c.contains("printf(\"%s\\n\", s);"));
        assert!(c.contains("printf(\"%f\\n\", p.w);"));
        assert!(c.contains("printf(\"%d\\n\", 1);"));
        assert!(c.contains("printf(\"%p\\n\", (void*)(&p));"));
    }

    #[test]
    fn lowers_pointer_builtins() {
        let source = "def main():\n    x: int = 1\n    p: 'ptr[int]' = addr(x)\n    assign(p, 5)\n    print(deref(p))\n    buf: 'ptr[float]' = malloc(sizeof(\"float\") * 4)\n    free(buf)\n";
        let c = generate_c(source);
        assert!(c.contains("int* p = (&x);"));
        assert!(c.contains("*(p) = 5;"));
        assert!(c.contains("printf(\"%d\\n\", (*p));"));
        assert!(c.contains("float* buf = malloc((sizeof(float) * 4));"));
        assert!(c.contains("free(buf);"));
    }

    #[test]
    fn lowers_methods_with_receivers() {
        let source = "class Counter:\n    n: int\n    def bump(self, by: int) -> int:\n        self.n = self.n + by\n        return self.n\n\ndef main():\n    c: Counter = Counter()\n    print(c.bump(2))\n";
        let c = generate_c(source);
        assert!(c.contains("int Counter_bump(struct Counter*, int);"));
        assert!(c.contains("int Counter_bump(struct Counter* self, int by) {"));
        assert!(c.contains("self->n = (self->n + by);"));
        assert!(c.contains("printf(\"%d\\n\", Counter_bump(&c, 2));"));
    }

    #[test]
    fn labeled_break_jumps_out_of_outer_loop() {
        let source = "def main():\n    i: int = 0\n    \"outer\"\n    while i < 3:\n        for j in range(4):\n            if j == 2:\n                \"outer\"\n                break\n        i = i + 1\n";
        let c = generate_c(source);
        assert!(c.contains("goto outer_1_break;"));
        assert!(c.contains("outer_1_continue: ;"));
        assert!(c.contains("outer_1_break: ;"));
        assert!(c.contains("for (int j = 0; j < 4; j++) {"));
    }

    #[test]
    fn lowers_result_constructors() {
        let source = "def divide(a: int, b: int) -> (int, str):\n    if b == 0:\n        return Err(\"division by zero\")\n    return Ok(a // b)\n\ndef main():\n    r: Result[int, str] = divide(7, 2)\n    print(unwrap_or_int(r, -1))\n";
        let c = generate_c(source);
        assert!(c.contains("Result divide(int a, int b) {"));
        assert!(c.contains("return (Result){ .type = ERR, .value = { .str_val = \"division by zero\" } };"));
        assert!(c.contains("return (Result){ .type = OK, .value = { .int_val = (a / b) } };"));
        assert!(c.contains("printf(\"%d\\n\", unwrap_or_int(r, (-1)));"));
    }

    #[test]
    fn rejects_aggregate_result_payloads() {
        let source = "class P:\n    x: int\n\ndef make() -> Result[P, str]:\n    p: P = P()\n    return Ok(p)\n\ndef main():\n    pass\n";
        let err = try_generate(source).unwrap_err();
        assert!(matches!(err, CoreError::CodeGenError(_)), "{err}");
    }

    #[test]
    fn rejects_unregistered_aggregates() {
        let err = try_generate("def f(x: Ghost):\n    pass\n\ndef main():\n    pass\n").unwrap_err();
        assert_eq!(err, CoreError::CodeGenError("unknown type 'Ghost'".to_string()));
    }

    #[test]
    fn lowers_string_and_float_operators() {
        let source = "def main():\n    a: str = \"x\"\n    if a == \"y\":\n        print(1)\n    f: float = 7.5 // 2.0\n    g: float = f % 2.0\n";
        let c = generate_c(source);
        assert!(c.contains("#include <string.h>\n#include <math.h>\n"));
        assert!(c.contains("if ((strcmp(a, \"y\") == 0)) {"));
        assert!(c.contains("float f = floor(7.5 / 2.0);"));
        assert!(c.contains("float g = fmod(f, 2.0);"));
    }

    #[test]
    fn lowers_elif_and_match_chains() {
        let source = "def main():\n    n: int = 2\n    if n == 1:\n        print(1)\n    elif n == 2:\n        print(2)\n    else:\n        print(3)\n    match n:\n        case 1:\n            print(10)\n        case _:\n            print(0)\n";
        let c = generate_c(source);
        assert!(c.contains("} else if ((n == 2)) {"));
        assert!(c.contains("    } else {\n        printf(\"%d\\n\", 3);"));
        assert!(c.contains("if (n == 1) {\n        printf(\"%d\\n\", 10);\n    } else {"));
    }

    #[test]
    fn iterates_arrays_by_index() {
        let source = "def total(xs: 'array[int, 3]') -> int:\n    sum: int = 0\n    for x in xs:\n        sum = sum + x\n    return sum\n\ndef main():\n    data: 'array[int, 3]'\n    data[0] = 4\n    print(total(data))\n";
        let c = generate_c(source);
        assert!(c.contains("int total(int* xs) {"));
        assert!(c.contains("for (int _i_1 = 0; _i_1 < 3; _i_1++) {\n        int x = xs[_i_1];"));
        assert!(c.contains("int data[3] = {0};"));
    }

    #[test]
    fn emits_globals_and_skips_docstrings() {
        let source = "\"Module docs.\"\nLIMIT: Final[int] = 10\ncount: int = 0\n\ndef main():\n    \"Entry point.\"\n    count = LIMIT\n";
        let c = generate_c(source);
        assert!(c.contains("const int LIMIT = 10;\nint count = 0;\n"));
        assert!(!c.contains("Entry point"));
        assert!(c.contains("count = LIMIT;"));
    }

    /// Swap the statement at `index` of `main` after analysis succeeded.
    fn generate_with_main_statement(source: &str, index: usize, kind: StmtKind) -> Result<String, CoreError> {
        let mut module = parse(source).expect("parse");
        let table = analyze(&module, UnitKind::Program, &[]).expect("analyze");
        let main = module
            .body
            .iter_mut()
            .find_map(|stmt| match &mut stmt.kind {
                StmtKind::FunctionDef(def) if def.name == "main" => Some(def),
                _ => None,
            })
            .expect("main");
        main.body[index].kind = kind;
        generate(&module, &table, "pyrinas.h", UnitKind::Program)
    }

    fn name(text: &str) -> Expr {
        Expr::Name(text.to_string())
    }

    #[test]
    fn refuses_whole_array_assignment() {
        let source = "def main():\n    a: 'array[int, 3]'\n    b: 'array[int, 3]'\n    a[0] = b[0]\n";
        let err = generate_with_main_statement(
            source,
            2,
            StmtKind::Assign {
                target: name("a"),
                value: name("b"),
            },
        )
        .unwrap_err();
        assert_eq!(err.stage(), crate::error::Stage::CodeGen);
        assert!(err.message().contains("cannot be assigned as a whole"), "{err}");
    }

    #[test]
    fn refuses_struct_comparison() {
        let source = "class P:\n    x: int\n\ndef main():\n    p: P = P()\n    q: P = P()\n    print(p.x == q.x)\n";
        let compare = Expr::Compare {
            left: Box::new(name("p")),
            op: crate::ast::CmpOp::Eq,
            right: Box::new(name("q")),
        };
        let print = Expr::Call {
            func: Box::new(name("print")),
            args: vec![compare],
        };
        let err = generate_with_main_statement(source, 2, StmtKind::Expr(print)).unwrap_err();
        assert_eq!(
            err,
            CoreError::CodeGenError("values of type 'P' cannot be compared in C".to_string())
        );
    }

    #[test]
    fn libraries_get_no_entry_point() {
        let source = "def helper() -> int:\n    return 1\n\ndef main():\n    print(helper())\n";
        let module = parse(source).expect("parse");
        let table = analyze(&module, UnitKind::Library, &[]).expect("analyze");
        let c = generate(&module, &table, "pyrinas.h", UnitKind::Library).expect("codegen");
        assert!(c.contains("int helper(void) {"));
        assert!(!c.contains("int main"), "{c}");
    }

    #[test]
    fn escapes_string_literals() {
        assert_eq!(c_string("a\"b\\c\n"), "\"a\\\"b\\\\c\\n\"");
        assert_eq!(c_string("\u{1}"), "\"\\001\"");
    }
}
