//! Semantic analysis and type checking.
//!
//! Analysis runs in two passes over the module:
//!
//! 1. the signature pass registers imports, functions, classes and
//!    globals in the root scope, so bodies may refer to anything
//!    declared at top level regardless of order;
//! 2. the body pass walks each function and method body in a fresh
//!    scope and checks every statement and expression.
//!
//! The first violation aborts analysis. Per-function state (return
//! type, enclosing loops) travels in a [`FnContext`] passed down the
//! walk instead of living on the analyzer.

use crate::ast::{
    ClassDef, ClassKind, Constant, Expr, FunctionDef, Import, Module, Pattern, Stmt, StmtKind,
    TypeExpr, UnaryOp,
};
use crate::builtins::{BuiltinDescriptor, BuiltinKind, Payload, find_builtin};
use crate::compiler::UnitKind;
use crate::error::CoreError;
use crate::parser::parse_annotation;
use crate::symbols::{Field, FunctionSig, Method, ModuleFragment, Symbol, SymbolKind, SymbolTable};
use crate::types::{Annotation, Type, resolve_annotation, resolve_type};

/// Name of the function every program unit must define.
pub const ENTRY_POINT: &str = "main";

/// Imports that only provide typing markers and resolve to nothing.
const MARKER_MODULES: &[&str] = &["typing"];

/// Analyze a parsed module and return its populated symbol table.
pub fn analyze(
    module: &Module,
    unit: UnitKind,
    imports: &[ModuleFragment],
) -> Result<SymbolTable, CoreError> {
    let mut analyzer = Analyzer {
        table: SymbolTable::new(),
        imports,
    };
    analyzer.declare_signatures(module, unit)?;
    analyzer.check_bodies(module)?;
    Ok(analyzer.table)
}

fn error(line: usize, message: impl Into<String>) -> CoreError {
    CoreError::SemanticError {
        line,
        message: message.into(),
    }
}

/// State of the function whose body is being checked.
struct FnContext {
    name: String,
    returns: Type,
    /// Enclosing loops, innermost last, with their optional labels.
    loops: Vec<Option<String>>,
}

struct Analyzer<'a> {
    table: SymbolTable,
    imports: &'a [ModuleFragment],
}

/// A declared parameter after resolving its annotation.
struct ParamInfo {
    name: String,
    annotation: Annotation,
}

impl Analyzer<'_> {
    // -----------------------------------------------------------------
    // Signature pass
    // -----------------------------------------------------------------

    fn declare_signatures(&mut self, module: &Module, unit: UnitKind) -> Result<(), CoreError> {
        for stmt in &module.body {
            let line = stmt.line;
            match &stmt.kind {
                StmtKind::Import(import) => self.merge_import(import, line)?,
                StmtKind::FunctionDef(def) => {
                    let sig = self.signature(def, false, line)?;
                    self.declare(Symbol::function(&def.name, sig.params, sig.returns), line)?;
                }
                StmtKind::ClassDef(class) => self.declare_class(class, line)?,
                StmtKind::AnnAssign {
                    target, annotation, ..
                } => {
                    let name = declared_name(target, line)?;
                    let Annotation { ty, immutable } = self.annotation(annotation, line)?;
                    self.declare(Symbol::variable(name, ty, immutable), line)?;
                }
                StmtKind::Pass => {}
                StmtKind::Expr(Expr::Constant(Constant::Str(_))) => {}
                _ => {
                    return Err(error(
                        line,
                        "only imports, definitions and global declarations are allowed at module level",
                    ));
                }
            }
        }

        self.check_implementations(module)?;

        if unit == UnitKind::Program {
            match self.table.global(ENTRY_POINT).map(|s| &s.kind) {
                Some(SymbolKind::Function(sig)) if sig.params.is_empty() => {}
                Some(SymbolKind::Function(_)) => {
                    return Err(error(1, format!("'{ENTRY_POINT}' must not take parameters")));
                }
                _ => {
                    return Err(error(
                        1,
                        format!("missing entry point: no '{ENTRY_POINT}' function is defined"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Insert into the current scope, rejecting builtins and duplicates.
    fn declare(&mut self, symbol: Symbol, line: usize) -> Result<(), CoreError> {
        if find_builtin(&symbol.name).is_some() {
            return Err(error(
                line,
                format!("'{}' is a builtin and cannot be redefined", symbol.name),
            ));
        }
        let kind = symbol.kind_name();
        self.table
            .insert(symbol)
            .map_err(|name| error(line, format!("{kind} '{name}' is already defined")))
    }

    /// `from a.b import x` binds `x`. `import a.b` binds only the last
    /// component, so its exports are reached as `b.x`, never `a.b.x`.
    fn merge_import(&mut self, import: &Import, line: usize) -> Result<(), CoreError> {
        let path = import.module_path();
        if MARKER_MODULES.contains(&path.as_str()) {
            return Ok(());
        }
        let imports = self.imports;
        let fragment = imports
            .iter()
            .find(|fragment| fragment.path == path)
            .ok_or_else(|| error(line, format!("module '{path}' could not be resolved")))?;

        if import.names.is_empty() {
            let alias = import.module.last().cloned().unwrap_or_else(|| path.clone());
            return self.declare(Symbol::module(alias, &path, fragment.symbols.clone()), line);
        }
        for name in &import.names {
            let symbol = fragment
                .find(name)
                .ok_or_else(|| error(line, format!("module '{path}' has no export '{name}'")))?;
            self.declare(symbol.clone(), line)?;
        }
        Ok(())
    }

    fn annotation(&self, expr: &TypeExpr, line: usize) -> Result<Annotation, CoreError> {
        resolve_annotation(expr).map_err(|message| error(line, message))
    }

    fn parameters(
        &self,
        def: &FunctionDef,
        is_method: bool,
        line: usize,
    ) -> Result<Vec<ParamInfo>, CoreError> {
        let mut params = def.params.iter();
        if is_method && params.next().is_none() {
            return Err(error(
                line,
                format!("method '{}' must take a receiver parameter", def.name),
            ));
        }
        params
            .map(|param| {
                let annotation = param.annotation.as_ref().ok_or_else(|| {
                    error(
                        param.line,
                        format!(
                            "parameter '{}' of '{}' must have a type annotation",
                            param.name, def.name
                        ),
                    )
                })?;
                Ok(ParamInfo {
                    name: param.name.clone(),
                    annotation: self.annotation(annotation, param.line)?,
                })
            })
            .collect()
    }

    fn signature(
        &self,
        def: &FunctionDef,
        is_method: bool,
        line: usize,
    ) -> Result<FunctionSig, CoreError> {
        let params = self
            .parameters(def, is_method, line)?
            .into_iter()
            .map(|param| param.annotation.ty)
            .collect();
        let returns = match &def.returns {
            Some(expr) => resolve_type(expr).map_err(|message| error(line, message))?,
            None => Type::None,
        };
        Ok(FunctionSig { params, returns })
    }

    fn declare_class(&mut self, class: &ClassDef, line: usize) -> Result<(), CoreError> {
        let symbol = match class.kind {
            ClassKind::Enum => Symbol::enumeration(&class.name, self.enum_members(class)?),
            ClassKind::Struct => {
                let mut fields: Vec<Field> = Vec::new();
                let mut methods: Vec<Method> = Vec::new();
                for stmt in &class.body {
                    match &stmt.kind {
                        StmtKind::AnnAssign {
                            target,
                            annotation,
                            value,
                        } => {
                            let name = declared_name(target, stmt.line)?;
                            if value.is_some() {
                                return Err(error(
                                    stmt.line,
                                    format!("field '{}.{name}' cannot have an initializer", class.name),
                                ));
                            }
                            let ty = self.annotation(annotation, stmt.line)?.ty;
                            if ty == Type::Named(class.name.clone()) {
                                return Err(error(
                                    stmt.line,
                                    format!("struct '{}' cannot contain itself by value", class.name),
                                ));
                            }
                            ensure_unique_member(class, name, &fields, &methods, stmt.line)?;
                            fields.push(Field {
                                name: name.to_string(),
                                ty,
                            });
                        }
                        StmtKind::FunctionDef(def) => {
                            let sig = self.signature(def, true, stmt.line)?;
                            ensure_unique_member(class, &def.name, &fields, &methods, stmt.line)?;
                            methods.push(Method {
                                name: def.name.clone(),
                                sig,
                            });
                        }
                        StmtKind::Pass | StmtKind::Expr(Expr::Constant(Constant::Str(_))) => {}
                        _ => {
                            return Err(error(
                                stmt.line,
                                format!(
                                    "struct '{}' may only contain fields and methods",
                                    class.name
                                ),
                            ));
                        }
                    }
                }
                let mut symbol = Symbol::structure(&class.name, fields, methods);
                symbol.implements = class.bases.clone();
                symbol
            }
            ClassKind::Interface => {
                let mut methods: Vec<Method> = Vec::new();
                for stmt in &class.body {
                    match &stmt.kind {
                        StmtKind::FunctionDef(def) => {
                            let sig = self.signature(def, true, stmt.line)?;
                            ensure_unique_member(class, &def.name, &[], &methods, stmt.line)?;
                            methods.push(Method {
                                name: def.name.clone(),
                                sig,
                            });
                        }
                        StmtKind::Pass | StmtKind::Expr(Expr::Constant(Constant::Str(_))) => {}
                        _ => {
                            return Err(error(
                                stmt.line,
                                format!("interface '{}' may only declare methods", class.name),
                            ));
                        }
                    }
                }
                Symbol::interface(&class.name, methods)
            }
        };
        self.declare(symbol, line)
    }

    fn enum_members(&self, class: &ClassDef) -> Result<Vec<(String, i64)>, CoreError> {
        let mut members: Vec<(String, i64)> = Vec::new();
        for stmt in &class.body {
            match &stmt.kind {
                StmtKind::Assign {
                    target: Expr::Name(member),
                    value,
                } => {
                    let value = integer_literal(value).ok_or_else(|| {
                        error(
                            stmt.line,
                            format!(
                                "enum member '{}.{member}' must be assigned an integer literal",
                                class.name
                            ),
                        )
                    })?;
                    check_int_range(value, stmt.line)?;
                    if members.iter().any(|(existing, _)| existing == member) {
                        return Err(error(
                            stmt.line,
                            format!("enum member '{}.{member}' is already defined", class.name),
                        ));
                    }
                    members.push((member.clone(), value));
                }
                StmtKind::Pass | StmtKind::Expr(Expr::Constant(Constant::Str(_))) => {}
                _ => {
                    return Err(error(
                        stmt.line,
                        format!("enum '{}' may only contain member assignments", class.name),
                    ));
                }
            }
        }
        Ok(members)
    }

    /// Every interface a struct names as a base must be fully provided.
    fn check_implementations(&self, module: &Module) -> Result<(), CoreError> {
        for stmt in &module.body {
            let StmtKind::ClassDef(class) = &stmt.kind else {
                continue;
            };
            if class.kind != ClassKind::Struct {
                continue;
            }
            let Some(owner) = self.table.global(&class.name) else {
                continue;
            };
            for base in &owner.implements {
                let required = match self.table.global(base).map(|s| &s.kind) {
                    Some(SymbolKind::Interface { methods }) => methods,
                    Some(_) => {
                        return Err(error(stmt.line, format!("base '{base}' of '{}' is not an interface", class.name)));
                    }
                    None => {
                        return Err(error(stmt.line, format!("unknown interface '{base}'")));
                    }
                };
                for method in required {
                    match owner.method(&method.name) {
                        None => {
                            return Err(error(
                                stmt.line,
                                format!(
                                    "struct '{}' does not implement '{base}.{}'",
                                    class.name, method.name
                                ),
                            ));
                        }
                        Some(own) if own.sig != method.sig => {
                            return Err(error(
                                stmt.line,
                                format!(
                                    "method '{}.{}' does not match the signature required by '{base}'",
                                    class.name, method.name
                                ),
                            ));
                        }
                        Some(_) => {}
                    }
                }
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Body pass
    // -----------------------------------------------------------------

    fn check_bodies(&mut self, module: &Module) -> Result<(), CoreError> {
        for stmt in &module.body {
            match &stmt.kind {
                StmtKind::FunctionDef(def) => self.check_function(def, None, stmt.line)?,
                StmtKind::ClassDef(class) if class.kind == ClassKind::Struct => {
                    for member in &class.body {
                        if let StmtKind::FunctionDef(def) = &member.kind {
                            self.check_function(def, Some(&class.name), member.line)?;
                        }
                    }
                }
                StmtKind::AnnAssign { target, value, .. } => {
                    self.check_global(target, value.as_ref(), stmt.line)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn check_global(&self, target: &Expr, value: Option<&Expr>, line: usize) -> Result<(), CoreError> {
        let name = declared_name(target, line)?;
        let Some(symbol) = self.table.global(name) else {
            return Ok(());
        };
        let ty = symbol.value_type().unwrap_or(Type::None);
        match value {
            Some(value) => {
                if !is_constant_initializer(value) {
                    return Err(error(
                        line,
                        format!("global '{name}' must be initialized with a literal"),
                    ));
                }
                self.check_value(value, &ty, line)
            }
            None if symbol.immutable => Err(error(
                line,
                format!("immutable variable '{name}' must be initialized"),
            )),
            None => Ok(()),
        }
    }

    fn check_function(
        &mut self,
        def: &FunctionDef,
        receiver: Option<&str>,
        line: usize,
    ) -> Result<(), CoreError> {
        let sig = self.signature(def, receiver.is_some(), line)?;
        let params = self.parameters(def, receiver.is_some(), line)?;

        self.table.push_scope();
        let result = self.check_function_body(def, receiver, params, sig.returns, line);
        self.table.pop_scope();
        result
    }

    fn check_function_body(
        &mut self,
        def: &FunctionDef,
        receiver: Option<&str>,
        params: Vec<ParamInfo>,
        returns: Type,
        line: usize,
    ) -> Result<(), CoreError> {
        if let (Some(owner), Some(param)) = (receiver, def.params.iter().next()) {
            let self_ty = Type::ptr(Type::Named(owner.to_string()));
            self.declare(Symbol::variable(&param.name, self_ty, false), line)?;
        }
        for param in params {
            self.declare(
                Symbol::variable(param.name, param.annotation.ty, param.annotation.immutable),
                line,
            )?;
        }

        let name = match receiver {
            Some(owner) => format!("{owner}.{}", def.name),
            None => def.name.clone(),
        };
        let mut ctx = FnContext {
            name,
            returns,
            loops: Vec::new(),
        };
        self.check_statements(&def.body, &mut ctx)
    }

    fn check_block(&mut self, body: &[Stmt], ctx: &mut FnContext) -> Result<(), CoreError> {
        self.table.push_scope();
        let result = self.check_statements(body, ctx);
        self.table.pop_scope();
        result
    }

    fn check_statements(&mut self, body: &[Stmt], ctx: &mut FnContext) -> Result<(), CoreError> {
        for stmt in body {
            self.check_statement(stmt, ctx)?;
        }
        Ok(())
    }

    fn check_statement(&mut self, stmt: &Stmt, ctx: &mut FnContext) -> Result<(), CoreError> {
        let line = stmt.line;
        match &stmt.kind {
            StmtKind::AnnAssign {
                target,
                annotation,
                value,
            } => {
                let name = declared_name(target, line)?;
                let Annotation { ty, immutable } = self.annotation(annotation, line)?;
                match value {
                    Some(value) => self.check_value(value, &ty, line)?,
                    None if immutable => {
                        return Err(error(
                            line,
                            format!("immutable variable '{name}' must be initialized"),
                        ));
                    }
                    None => {}
                }
                if self.table.lookup_local(name).is_some() {
                    return Err(error(
                        line,
                        format!("variable '{name}' is already declared in this scope"),
                    ));
                }
                self.declare(Symbol::variable(name, ty, immutable), line)
            }
            StmtKind::Assign { target, value } => {
                let target_ty = self.assign_target_type(target, line)?;
                if let Type::Array(..) = target_ty {
                    return Err(error(
                        line,
                        format!("cannot assign to an array of type '{target_ty}' as a whole"),
                    ));
                }
                self.check_value(value, &target_ty, line)
            }
            StmtKind::If { test, body, orelse } => {
                self.check_condition(test, line)?;
                self.check_block(body, ctx)?;
                self.check_block(orelse, ctx)
            }
            StmtKind::While { test, body, label } => {
                self.check_condition(test, line)?;
                self.enter_loop(label, ctx, line)?;
                let result = self.check_block(body, ctx);
                ctx.loops.pop();
                result
            }
            StmtKind::For {
                target,
                iter,
                body,
                label,
            } => {
                let element = self.iteration_type(iter, line)?;
                self.enter_loop(label, ctx, line)?;
                self.table.push_scope();
                let result = self
                    .declare(Symbol::variable(target, element, false), line)
                    .and_then(|_| self.check_statements(body, ctx));
                self.table.pop_scope();
                ctx.loops.pop();
                result
            }
            StmtKind::Break { label } => self.check_loop_control("break", label, ctx, line),
            StmtKind::Continue { label } => self.check_loop_control("continue", label, ctx, line),
            StmtKind::Return(value) => self.check_return(value.as_ref(), ctx, line),
            StmtKind::Expr(expr) => self.expr_type(expr, line).map(|_| ()),
            StmtKind::Pass => Ok(()),
            StmtKind::Match { subject, cases } => {
                let subject_ty = self.expr_type(subject, line)?;
                if !self.is_equatable(&subject_ty) {
                    return Err(error(
                        line,
                        format!("cannot match on a value of type '{subject_ty}'"),
                    ));
                }
                for case in cases {
                    if let Pattern::Value(pattern) = &case.pattern {
                        let pattern_ty = self.expr_type(pattern, case.line)?;
                        if !Type::comparable(&subject_ty, &pattern_ty) {
                            return Err(error(
                                case.line,
                                format!(
                                    "case pattern of type '{pattern_ty}' cannot match a subject of type '{subject_ty}'"
                                ),
                            ));
                        }
                    }
                    self.check_block(&case.body, ctx)?;
                }
                Ok(())
            }
            StmtKind::Import(_) => Err(error(line, "imports are only allowed at module level")),
            StmtKind::FunctionDef(_) | StmtKind::ClassDef(_) => {
                Err(error(line, "nested definitions are not supported"))
            }
        }
    }

    fn enter_loop(
        &self,
        label: &Option<String>,
        ctx: &mut FnContext,
        line: usize,
    ) -> Result<(), CoreError> {
        if let Some(label) = label {
            if ctx.loops.iter().any(|l| l.as_ref() == Some(label)) {
                return Err(error(
                    line,
                    format!("loop label '{label}' is already used by an enclosing loop"),
                ));
            }
        }
        ctx.loops.push(label.clone());
        Ok(())
    }

    fn check_loop_control(
        &self,
        keyword: &str,
        label: &Option<String>,
        ctx: &FnContext,
        line: usize,
    ) -> Result<(), CoreError> {
        if ctx.loops.is_empty() {
            return Err(error(line, format!("'{keyword}' outside loop")));
        }
        if let Some(label) = label {
            if !ctx.loops.iter().any(|l| l.as_ref() == Some(label)) {
                return Err(error(
                    line,
                    format!("'{keyword}' targets unknown loop label '{label}'"),
                ));
            }
        }
        Ok(())
    }

    fn check_return(
        &self,
        value: Option<&Expr>,
        ctx: &FnContext,
        line: usize,
    ) -> Result<(), CoreError> {
        match (value, &ctx.returns) {
            (None, Type::None) | (Some(Expr::Constant(Constant::None)), Type::None) => Ok(()),
            (None, expected) => Err(error(
                line,
                format!("'{}' must return a value of type '{expected}'", ctx.name),
            )),
            (Some(_), Type::None) => Err(error(
                line,
                format!("'{}' does not return a value", ctx.name),
            )),
            (Some(value), expected) => self.check_value(value, expected, line),
        }
    }

    fn check_condition(&self, test: &Expr, line: usize) -> Result<(), CoreError> {
        self.check_truth_value(test, "condition", line)
    }

    /// Conditions and `and`/`or` operands must be bool or int.
    fn check_truth_value(&self, expr: &Expr, what: &str, line: usize) -> Result<(), CoreError> {
        let ty = self.expr_type(expr, line)?;
        if matches!(ty, Type::Bool | Type::Int) {
            Ok(())
        } else {
            Err(error(line, format!("{what} must be bool or int, found '{ty}'")))
        }
    }

    /// Types that C compares with its built-in operators.
    fn is_equatable(&self, ty: &Type) -> bool {
        match ty {
            Type::Int | Type::Float | Type::Bool | Type::Str | Type::None | Type::Ptr(_) => true,
            Type::Named(_) => self.is_enum(ty),
            Type::Array(..) | Type::Result(..) | Type::Range => false,
        }
    }

    fn iteration_type(&self, iter: &Expr, line: usize) -> Result<Type, CoreError> {
        if let Expr::Call { func, args } = iter {
            if let Some(range) = builtin_callee(func).filter(|b| b.kind == BuiltinKind::Range) {
                self.check_arity(range, args, line)?;
                for arg in args {
                    let ty = self.expr_type(arg, line)?;
                    if ty != Type::Int {
                        return Err(error(
                            line,
                            format!("range() bounds must be int, found '{ty}'"),
                        ));
                    }
                }
                return Ok(Type::Int);
            }
        }
        match self.expr_type(iter, line)? {
            Type::Array(item, _) => Ok(*item),
            other => Err(error(line, format!("cannot iterate over a value of type '{other}'"))),
        }
    }

    fn assign_target_type(&self, target: &Expr, line: usize) -> Result<Type, CoreError> {
        match target {
            Expr::Name(name) => match self.table.lookup(name) {
                Some(symbol) => match &symbol.kind {
                    SymbolKind::Variable { .. } if symbol.immutable => Err(error(
                        line,
                        format!("cannot assign to immutable variable '{name}'"),
                    )),
                    SymbolKind::Variable { ty } => Ok(ty.clone()),
                    _ => Err(error(
                        line,
                        format!("cannot assign to {} '{name}'", symbol.kind_name()),
                    )),
                },
                None => Err(error(line, format!("name '{name}' is not declared"))),
            },
            Expr::Attribute { value, attr } => {
                if let Expr::Name(base) = value.as_ref() {
                    if let Some(symbol) = self.table.lookup(base) {
                        if !matches!(symbol.kind, SymbolKind::Variable { .. }) {
                            return Err(error(line, format!("cannot assign to '{base}.{attr}'")));
                        }
                    }
                }
                self.expr_type(target, line)
            }
            Expr::Subscript { .. } => self.expr_type(target, line),
            _ => Err(error(line, "invalid assignment target")),
        }
    }

    /// Check that `expr` can be stored where `expected` is required.
    ///
    /// `Ok(..)`/`Err(..)` are only typed against an expected Result.
    fn check_value(&self, expr: &Expr, expected: &Type, line: usize) -> Result<(), CoreError> {
        if let Expr::Call { func, args } = expr {
            if let Some(ctor) = builtin_callee(func)
                .filter(|b| matches!(b.kind, BuiltinKind::Ok | BuiltinKind::Err))
            {
                let Type::Result(ok, err) = expected else {
                    return Err(error(
                        line,
                        format!("{}(...) is only allowed where a Result is expected, found '{expected}'", ctor.name),
                    ));
                };
                self.check_arity(ctor, args, line)?;
                let payload = if ctor.kind == BuiltinKind::Ok { ok } else { err };
                return self.check_value(&args[0], payload, line);
            }
        }
        let actual = self.expr_type(expr, line)?;
        if expected.accepts(&actual) {
            Ok(())
        } else {
            Err(error(
                line,
                format!("type mismatch: expected '{expected}', found '{actual}'"),
            ))
        }
    }

    // -----------------------------------------------------------------
    // Expressions
    // -----------------------------------------------------------------

    fn expr_type(&self, expr: &Expr, line: usize) -> Result<Type, CoreError> {
        match expr {
            Expr::Name(name) => self.name_type(name, line),
            Expr::Constant(constant) => {
                if let Constant::Int(value) = constant {
                    check_int_range(*value, line)?;
                }
                Ok(constant_type(constant))
            }
            Expr::BinOp { left, right, .. } => {
                let left = self.expr_type(left, line)?;
                let right = self.expr_type(right, line)?;
                Ok(Type::arithmetic(&left, &right))
            }
            Expr::UnaryOp { op, operand } => {
                if let (UnaryOp::Neg, Expr::Constant(Constant::Int(value))) = (op, operand.as_ref()) {
                    check_int_range(-value, line)?;
                    return Ok(Type::Int);
                }
                let ty = self.expr_type(operand, line)?;
                Ok(match op {
                    UnaryOp::Not => Type::Bool,
                    UnaryOp::Neg | UnaryOp::Pos if ty.is_numeric() => ty,
                    UnaryOp::Neg | UnaryOp::Pos => Type::Int,
                })
            }
            Expr::Compare { left, right, .. } => {
                let left = self.expr_type(left, line)?;
                let right = self.expr_type(right, line)?;
                if !self.is_equatable(&left) || !self.is_equatable(&right) {
                    Err(error(line, format!("cannot compare '{left}' with '{right}'")))
                } else if Type::comparable(&left, &right) {
                    Ok(Type::Bool)
                } else {
                    Err(error(line, format!("cannot compare '{left}' with '{right}'")))
                }
            }
            Expr::BoolOp { left, right, .. } => {
                self.check_truth_value(left, "operand of 'and'/'or'", line)?;
                self.check_truth_value(right, "operand of 'and'/'or'", line)?;
                Ok(Type::Bool)
            }
            Expr::Call { func, args } => self.call_type(func, args, line),
            Expr::Attribute { value, attr } => self.attribute_type(value, attr, line),
            Expr::Subscript { value, index } => {
                let base = self.expr_type(value, line)?;
                let index = self.expr_type(index, line)?;
                if index != Type::Int {
                    return Err(error(line, format!("index must be int, found '{index}'")));
                }
                base.element()
                    .filter(|item| **item != Type::None)
                    .cloned()
                    .ok_or_else(|| error(line, format!("type '{base}' is not subscriptable")))
            }
        }
    }

    fn name_type(&self, name: &str, line: usize) -> Result<Type, CoreError> {
        match self.table.lookup(name) {
            Some(symbol) => match &symbol.kind {
                SymbolKind::Variable { ty } => Ok(ty.clone()),
                SymbolKind::Function(_) => Err(error(
                    line,
                    format!("function '{name}' cannot be used as a value"),
                )),
                SymbolKind::Module { .. } => Err(error(
                    line,
                    format!("module '{name}' cannot be used as a value"),
                )),
                _ => Err(error(line, format!("'{name}' is a type, not a value"))),
            },
            None if find_builtin(name).is_some() => {
                Err(error(line, format!("builtin '{name}' must be called")))
            }
            None => Err(error(line, format!("name '{name}' is not declared"))),
        }
    }

    /// Struct symbol behind a struct value or a pointer to one.
    fn struct_of(&self, ty: &Type) -> Option<&Symbol> {
        let name = ty.pointee_or_self().named()?;
        self.table
            .global(name)
            .filter(|s| matches!(s.kind, SymbolKind::Struct { .. }))
    }

    fn is_enum(&self, ty: &Type) -> bool {
        ty.named()
            .and_then(|name| self.table.global(name))
            .is_some_and(|s| matches!(s.kind, SymbolKind::Enum { .. }))
    }

    fn attribute_type(&self, value: &Expr, attr: &str, line: usize) -> Result<Type, CoreError> {
        if let Expr::Name(base) = value {
            if let Some(symbol) = self.table.lookup(base) {
                match &symbol.kind {
                    SymbolKind::Enum { .. } => {
                        return symbol
                            .member(attr)
                            .map(|_| Type::Named(base.clone()))
                            .ok_or_else(|| {
                                error(line, format!("enum '{base}' has no member '{attr}'"))
                            });
                    }
                    SymbolKind::Module { .. } => {
                        let export = symbol.export(attr).ok_or_else(|| {
                            error(line, format!("module '{base}' has no export '{attr}'"))
                        })?;
                        return match &export.kind {
                            SymbolKind::Variable { ty } => Ok(ty.clone()),
                            _ => Err(error(line, format!("'{base}.{attr}' is not a value"))),
                        };
                    }
                    _ => {}
                }
            }
        }

        let base_ty = self.expr_type(value, line)?;
        let owner = self.struct_of(&base_ty).ok_or_else(|| {
            error(
                line,
                format!("cannot access attribute on non-struct type '{base_ty}'"),
            )
        })?;
        if let Some(field) = owner.field(attr) {
            return Ok(field.ty.clone());
        }
        if owner.method(attr).is_some() {
            return Err(error(
                line,
                format!("method '{}.{attr}' must be called", owner.name),
            ));
        }
        Err(error(
            line,
            format!("struct '{}' has no field '{attr}'", owner.name),
        ))
    }

    fn call_type(&self, func: &Expr, args: &[Expr], line: usize) -> Result<Type, CoreError> {
        match func {
            Expr::Name(name) => {
                if let Some(builtin) = find_builtin(name) {
                    return self.builtin_call_type(builtin, args, line);
                }
                let symbol = self
                    .table
                    .lookup(name)
                    .ok_or_else(|| error(line, format!("function '{name}' is not defined")))?;
                self.symbol_call_type(symbol, name, args, line)
            }
            Expr::Attribute { value, attr } => {
                if let Expr::Name(base) = value.as_ref() {
                    if let Some(module) = self
                        .table
                        .lookup(base)
                        .filter(|s| matches!(s.kind, SymbolKind::Module { .. }))
                    {
                        let export = module.export(attr).ok_or_else(|| {
                            error(line, format!("module '{base}' has no export '{attr}'"))
                        })?;
                        return self.symbol_call_type(export, &format!("{base}.{attr}"), args, line);
                    }
                }

                let receiver = self.expr_type(value, line)?;
                let owner = self.struct_of(&receiver).ok_or_else(|| {
                    error(
                        line,
                        format!("cannot call method '{attr}' on non-struct type '{receiver}'"),
                    )
                })?;
                let method = owner.method(attr).ok_or_else(|| {
                    error(line, format!("struct '{}' has no method '{attr}'", owner.name))
                })?;
                if !receiver.is_pointer() && !value.is_lvalue() {
                    return Err(error(
                        line,
                        format!("receiver of '{}.{attr}' must be a variable, field or element", owner.name),
                    ));
                }
                let display = format!("{}.{attr}", owner.name);
                self.check_arguments(&display, &method.sig.params, args, line)?;
                Ok(method.sig.returns.clone())
            }
            _ => Err(error(line, "expression is not callable")),
        }
    }

    fn symbol_call_type(
        &self,
        symbol: &Symbol,
        display: &str,
        args: &[Expr],
        line: usize,
    ) -> Result<Type, CoreError> {
        match &symbol.kind {
            SymbolKind::Function(sig) => {
                self.check_arguments(display, &sig.params, args, line)?;
                Ok(sig.returns.clone())
            }
            SymbolKind::Struct { .. } => {
                if !args.is_empty() {
                    return Err(error(
                        line,
                        format!("constructor '{display}' takes no arguments"),
                    ));
                }
                Ok(Type::Named(symbol.name.clone()))
            }
            _ => Err(error(
                line,
                format!("{} '{display}' is not callable", symbol.kind_name()),
            )),
        }
    }

    /// Arity is checked before any argument type.
    fn check_arguments(
        &self,
        callee: &str,
        params: &[Type],
        args: &[Expr],
        line: usize,
    ) -> Result<(), CoreError> {
        if params.len() != args.len() {
            return Err(error(
                line,
                format!(
                    "'{callee}' expects {} argument(s), got {}",
                    params.len(),
                    args.len()
                ),
            ));
        }
        for (position, (param, arg)) in params.iter().zip(args).enumerate() {
            self.check_value(arg, param, line).map_err(|err| {
                error(
                    line,
                    format!("argument {} of '{callee}': {}", position + 1, err.message()),
                )
            })?;
        }
        Ok(())
    }

    fn check_arity(
        &self,
        builtin: &BuiltinDescriptor,
        args: &[Expr],
        line: usize,
    ) -> Result<(), CoreError> {
        if builtin.accepts_arity(args.len()) {
            Ok(())
        } else {
            Err(error(
                line,
                format!(
                    "{}() expects {}, got {}",
                    builtin.name,
                    builtin.arity_text(),
                    args.len()
                ),
            ))
        }
    }

    fn builtin_call_type(
        &self,
        builtin: &BuiltinDescriptor,
        args: &[Expr],
        line: usize,
    ) -> Result<Type, CoreError> {
        self.check_arity(builtin, args, line)?;
        let name = builtin.name;
        match builtin.kind {
            BuiltinKind::Print => {
                let ty = self.expr_type(&args[0], line)?;
                let printable = matches!(
                    ty,
                    Type::Int | Type::Float | Type::Bool | Type::Str | Type::Ptr(_)
                ) || self.is_enum(&ty);
                if printable {
                    Ok(Type::None)
                } else {
                    Err(error(line, format!("cannot print a value of type '{ty}'")))
                }
            }
            BuiltinKind::Range => Err(error(
                line,
                "range() may only be used as a for-loop iterable",
            )),
            BuiltinKind::Addr => {
                if !args[0].is_lvalue() {
                    return Err(error(line, "addr() expects a variable, field or element"));
                }
                Ok(Type::ptr(self.expr_type(&args[0], line)?))
            }
            BuiltinKind::Deref => match self.expr_type(&args[0], line)? {
                Type::Ptr(inner) if *inner != Type::None => Ok(*inner),
                other => Err(error(
                    line,
                    format!("deref() expects a typed pointer, found '{other}'"),
                )),
            },
            BuiltinKind::Store => match self.expr_type(&args[0], line)? {
                Type::Ptr(inner) if *inner != Type::None => {
                    self.check_value(&args[1], &inner, line)?;
                    Ok(Type::None)
                }
                other => Err(error(
                    line,
                    format!("assign() expects a typed pointer, found '{other}'"),
                )),
            },
            BuiltinKind::Malloc => {
                self.check_value(&args[0], &Type::Int, line)?;
                Ok(Type::ptr(Type::None))
            }
            BuiltinKind::Free => match self.expr_type(&args[0], line)? {
                Type::Ptr(_) => Ok(Type::None),
                other => Err(error(line, format!("free() expects a pointer, found '{other}'"))),
            },
            BuiltinKind::SizeOf => {
                self.sizeof_operand(&args[0], line)?;
                Ok(Type::Int)
            }
            BuiltinKind::IntCast => {
                let ty = self.expr_type(&args[0], line)?;
                if ty.is_numeric() || ty == Type::Bool || self.is_enum(&ty) {
                    Ok(Type::Int)
                } else {
                    Err(error(line, format!("cannot convert '{ty}' to int")))
                }
            }
            BuiltinKind::FloatCast => {
                let ty = self.expr_type(&args[0], line)?;
                if ty.is_numeric() || ty == Type::Bool {
                    Ok(Type::Float)
                } else {
                    Err(error(line, format!("cannot convert '{ty}' to float")))
                }
            }
            BuiltinKind::Ok | BuiltinKind::Err => Err(error(
                line,
                format!("{name}(...) is only allowed where a Result is expected"),
            )),
            BuiltinKind::IsOk | BuiltinKind::IsErr => {
                self.result_operand(name, &args[0], line)?;
                Ok(Type::Bool)
            }
            BuiltinKind::Unwrap(payload) => {
                self.unwrap_operand(name, payload, &args[0], line)?;
                Ok(payload.ty())
            }
            BuiltinKind::UnwrapOr(payload) => {
                self.unwrap_operand(name, payload, &args[0], line)?;
                self.check_value(&args[1], &payload.ty(), line)?;
                Ok(payload.ty())
            }
            BuiltinKind::Expect(payload) => {
                self.unwrap_operand(name, payload, &args[0], line)?;
                self.check_value(&args[1], &Type::Str, line)?;
                Ok(payload.ty())
            }
        }
    }

    fn sizeof_operand(&self, arg: &Expr, line: usize) -> Result<Type, CoreError> {
        let ty = match arg {
            Expr::Constant(Constant::Str(text)) => {
                let expr = parse_annotation(text, line)
                    .map_err(|err| error(line, err.message().to_string()))?;
                resolve_type(&expr).map_err(|message| error(line, message))?
            }
            Expr::Name(name) => match self.table.lookup(name).map(|s| &s.kind) {
                Some(SymbolKind::Struct { .. } | SymbolKind::Enum { .. }) => {
                    Type::Named(name.clone())
                }
                _ => resolve_type(&TypeExpr::Name(name.clone()))
                    .ok()
                    .filter(|ty| !matches!(ty, Type::Named(_)))
                    .ok_or_else(|| error(line, format!("sizeof() expects a type, found '{name}'")))?,
            },
            _ => return Err(error(line, "sizeof() expects a type name")),
        };
        if let Some(name) = ty.pointee_or_self().named() {
            if self.table.global(name).is_none() {
                return Err(error(line, format!("unknown type '{name}'")));
            }
        }
        Ok(ty)
    }

    fn result_operand(&self, name: &str, arg: &Expr, line: usize) -> Result<(Type, Type), CoreError> {
        match self.expr_type(arg, line)? {
            Type::Result(ok, err) => Ok((*ok, *err)),
            other => Err(error(
                line,
                format!("{name}() expects a Result, found '{other}'"),
            )),
        }
    }

    fn unwrap_operand(
        &self,
        name: &str,
        payload: Payload,
        arg: &Expr,
        line: usize,
    ) -> Result<(), CoreError> {
        let (ok, _) = self.result_operand(name, arg, line)?;
        let slot = if self.is_enum(&ok) {
            Some(Payload::Int)
        } else {
            Payload::for_type(&ok)
        };
        if slot == Some(payload) {
            Ok(())
        } else {
            Err(error(
                line,
                format!("{name}() cannot unwrap a Result carrying '{ok}'"),
            ))
        }
    }
}

fn builtin_callee(func: &Expr) -> Option<&'static BuiltinDescriptor> {
    match func {
        Expr::Name(name) => find_builtin(name),
        _ => None,
    }
}

fn constant_type(constant: &Constant) -> Type {
    match constant {
        Constant::Int(_) => Type::Int,
        Constant::Float(_) => Type::Float,
        Constant::Str(_) => Type::Str,
        Constant::Bool(_) => Type::Bool,
        Constant::None => Type::None,
    }
}

/// Integer literals lower to C `int`.
fn check_int_range(value: i64, line: usize) -> Result<(), CoreError> {
    if i32::try_from(value).is_ok() {
        Ok(())
    } else {
        Err(error(line, format!("integer literal {value} does not fit in int")))
    }
}

fn declared_name(target: &Expr, line: usize) -> Result<&str, CoreError> {
    match target {
        Expr::Name(name) => Ok(name),
        _ => Err(error(line, "only plain names can be declared with a type")),
    }
}

fn integer_literal(expr: &Expr) -> Option<i64> {
    match expr {
        Expr::Constant(Constant::Int(value)) => Some(*value),
        Expr::UnaryOp {
            op: UnaryOp::Neg,
            operand,
        } => integer_literal(operand).map(|value| -value),
        _ => None,
    }
}

fn is_constant_initializer(expr: &Expr) -> bool {
    match expr {
        Expr::Constant(_) => true,
        Expr::UnaryOp {
            op: UnaryOp::Neg | UnaryOp::Pos,
            operand,
        } => matches!(
            operand.as_ref(),
            Expr::Constant(Constant::Int(_) | Constant::Float(_))
        ),
        _ => false,
    }
}

fn ensure_unique_member(
    class: &ClassDef,
    name: &str,
    fields: &[Field],
    methods: &[Method],
    line: usize,
) -> Result<(), CoreError> {
    let taken = fields.iter().any(|f| f.name == name) || methods.iter().any(|m| m.name == name);
    if taken {
        Err(error(
            line,
            format!("member '{}.{name}' is already defined", class.name),
        ))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::symbols::ForeignOrigin;

    fn check(source: &str) -> Result<SymbolTable, CoreError> {
        let module = parse(source).expect("parse");
        analyze(&module, UnitKind::Program, &[])
    }

    fn check_err(source: &str) -> String {
        let err = check(source).unwrap_err();
        assert!(matches!(err, CoreError::SemanticError { .. }), "{err:?}");
        err.message().to_string()
    }

    #[test]
    fn accepts_minimal_program() {
        let table = check("def main():\n    print(1)\n").expect("valid program");
        assert!(table.global("main").is_some());
    }

    #[test]
    fn rejects_duplicate_functions_before_bodies() {
        let source = "def f() -> int:\n    return undefined_name\n\ndef f() -> int:\n    return 2\n\ndef main():\n    pass\n";
        let message = check_err(source);
        assert!(message.contains("already defined"), "{message}");
    }

    #[test]
    fn rejects_attribute_on_primitive() {
        let message = check_err("def main():\n    x: int = 1\n    print(x.value)\n");
        assert!(message.contains("cannot access attribute on non-struct type"), "{message}");
    }

    #[test]
    fn rejects_break_outside_loop_even_inside_if() {
        let message = check_err("def main():\n    if True:\n        if 1 < 2:\n            break\n");
        assert!(message.contains("outside loop"), "{message}");

        let message = check_err("def main():\n    continue\n");
        assert!(message.contains("'continue' outside loop"), "{message}");
    }

    #[test]
    fn arity_mismatch_fails_regardless_of_argument_types() {
        let base = "def add(a: int, b: int) -> int:\n    return a + b\n\ndef main():\n";
        for call in ["add(1)", "add(1, 2, 3)", "add(\"x\")", "add(True, 2.5, \"s\")"] {
            let message = check_err(&format!("{base}    print({call})\n"));
            assert!(message.contains("expects 2 argument(s)"), "{call}: {message}");
        }
    }

    #[test]
    fn widens_int_into_bool_only() {
        check("def main():\n    flag: bool = 1\n").expect("bool accepts int");
        let message = check_err("def main():\n    count: int = True\n");
        assert!(message.contains("type mismatch"), "{message}");
    }

    #[test]
    fn requires_entry_point_for_programs_only() {
        let module = parse("def helper() -> int:\n    return 1\n").expect("parse");
        let err = analyze(&module, UnitKind::Program, &[]).unwrap_err();
        assert!(err.message().contains("missing entry point"));
        analyze(&module, UnitKind::Library, &[]).expect("libraries need no main");
    }

    #[test]
    fn requires_parameter_annotations() {
        let message = check_err("def f(x) -> int:\n    return 1\n\ndef main():\n    pass\n");
        assert!(message.contains("must have a type annotation"), "{message}");
    }

    #[test]
    fn allows_forward_references_between_functions() {
        check("def main():\n    print(later(2))\n\ndef later(x: int) -> int:\n    return x * 2\n")
            .expect("forward reference");
    }

    #[test]
    fn reports_undeclared_names() {
        let message = check_err("def main():\n    y = 3\n");
        assert!(message.contains("'y' is not declared"), "{message}");
        let message = check_err("def main():\n    print(z)\n");
        assert!(message.contains("'z' is not declared"), "{message}");
    }

    #[test]
    fn block_scopes_end_with_their_block() {
        let message = check_err("def main():\n    if True:\n        inner: int = 1\n    print(inner)\n");
        assert!(message.contains("'inner' is not declared"), "{message}");
    }

    #[test]
    fn rejects_redeclaration_in_same_scope() {
        let message = check_err("def main():\n    x: int = 1\n    x: int = 2\n");
        assert!(message.contains("already declared"), "{message}");
    }

    #[test]
    fn checks_struct_fields_and_methods() {
        let source = "class Point:\n    x: int\n    y: int\n    def sum(self) -> int:\n        return self.x + self.y\n\ndef main():\n    p: Point = Point()\n    p.x = 3\n    print(p.sum())\n";
        let table = check(source).expect("struct program");
        let point = table.global("Point").expect("Point registered");
        assert_eq!(point.field("y").map(|f| f.ty.clone()), Some(Type::Int));
        assert!(point.method("sum").expect("method").sig.params.is_empty());

        let message = check_err(
            "class Point:\n    x: int\n\ndef main():\n    p: Point = Point()\n    print(p.z)\n",
        );
        assert!(message.contains("has no field 'z'"), "{message}");
    }

    #[test]
    fn accesses_fields_through_pointers() {
        let source = "class Node:\n    value: int\n    next: 'ptr[Node]'\n\ndef total(n: 'ptr[Node]') -> int:\n    return n.value\n\ndef main():\n    node: Node = Node()\n    print(total(addr(node)))\n";
        check(source).expect("pointer field access");
    }

    #[test]
    fn checks_enum_members() {
        let source = "from typing import Enum\n\nclass Color(Enum):\n    RED = 0\n    BLUE = -2\n\ndef main():\n    c: Color = Color.RED\n    if c == Color.BLUE:\n        print(int(c))\n";
        let table = check(source).expect("enum program");
        assert_eq!(table.global("Color").and_then(|s| s.member("BLUE")), Some(-2));

        let message = check_err(
            "class Color(Enum):\n    RED = 0\n\ndef main():\n    c: Color = Color.GREEN\n",
        );
        assert!(message.contains("no member 'GREEN'"), "{message}");

        let message = check_err("class Color(Enum):\n    RED = \"r\"\n\ndef main():\n    pass\n");
        assert!(message.contains("integer literal"), "{message}");
    }

    #[test]
    fn checks_interface_implementations() {
        let iface = "class Shape:\n    def area(self) -> float:\n        pass\n\n";
        let good = format!(
            "{iface}class Square(Shape):\n    side: float\n    def area(self) -> float:\n        return self.side * self.side\n\ndef main():\n    pass\n"
        );
        let table = check(&good).expect("implements interface");
        assert_eq!(table.global("Square").expect("Square").implements, vec!["Shape".to_string()]);

        let bad = format!(
            "{iface}class Label(Shape):\n    text: str\n\ndef main():\n    pass\n"
        );
        let message = check_err(&bad);
        assert!(message.contains("does not implement 'Shape.area'"), "{message}");
    }

    #[test]
    fn immutable_bindings_cannot_be_reassigned() {
        let message = check_err("def main():\n    y: Final[int] = 42\n    y = 1\n");
        assert!(message.contains("immutable"), "{message}");
        let message = check_err("def main():\n    y: Final[int]\n");
        assert!(message.contains("must be initialized"), "{message}");
    }

    #[test]
    fn labeled_break_must_name_enclosing_loop() {
        let ok = "def main():\n    i: int = 0\n    \"outer\"\n    while i < 3:\n        while True:\n            \"outer\"\n            break\n        i = i + 1\n";
        check(ok).expect("label resolves");

        let bad = "def main():\n    while True:\n        \"missing\"\n        break\n";
        let message = check_err(bad);
        assert!(message.contains("unknown loop label 'missing'"), "{message}");
    }

    #[test]
    fn result_constructors_need_result_context() {
        let ok = "def divide(a: int, b: int) -> (int, str):\n    if b == 0:\n        return Err(\"division by zero\")\n    return Ok(a // b)\n\ndef main():\n    r: Result[int, str] = divide(4, 2)\n    if is_ok(r):\n        print(unwrap_int(r))\n";
        check(ok).expect("result program");

        let message = check_err("def main():\n    x: int = Ok(1)\n");
        assert!(message.contains("only allowed where a Result is expected"), "{message}");

        let message = check_err("def f() -> Result[int, str]:\n    return Err(3)\n\ndef main():\n    pass\n");
        assert!(message.contains("type mismatch"), "{message}");

        let message = check_err(
            "def f() -> Result[float, str]:\n    return Ok(1.0)\n\ndef main():\n    print(unwrap_int(f()))\n",
        );
        assert!(message.contains("cannot unwrap"), "{message}");
    }

    #[test]
    fn checks_return_values() {
        let message = check_err("def f() -> int:\n    return 1.5\n\ndef main():\n    pass\n");
        assert!(message.contains("expected 'int', found 'float'"), "{message}");
        let message = check_err("def f() -> int:\n    return\n\ndef main():\n    pass\n");
        assert!(message.contains("must return a value"), "{message}");
        let message = check_err("def main():\n    return 1\n");
        assert!(message.contains("does not return a value"), "{message}");
    }

    #[test]
    fn range_is_only_a_loop_iterable() {
        check("def main():\n    for i in range(1, 4):\n        print(i)\n").expect("range loop");
        let message = check_err("def main():\n    r: int = range(3)\n");
        assert!(message.contains("for-loop iterable"), "{message}");
        let message = check_err("def main():\n    for i in range(1, 2, 3):\n        pass\n");
        assert!(message.contains("range() expects 1 to 2 arguments"), "{message}");
    }

    #[test]
    fn iterates_over_arrays() {
        check("def main():\n    xs: 'array[float, 3]'\n    for x in xs:\n        print(x + 1.0)\n")
            .expect("array loop");
    }

    #[test]
    fn pointer_builtins_are_typed() {
        let source = "def main():\n    x: int = 1\n    p: 'ptr[int]' = addr(x)\n    assign(p, 5)\n    print(deref(p))\n    raw: 'ptr[float]' = malloc(sizeof(\"float\") * 4)\n    free(raw)\n";
        check(source).expect("pointer program");

        let message = check_err("def main():\n    x: int = 1\n    print(deref(x))\n");
        assert!(message.contains("deref() expects a typed pointer"), "{message}");
    }

    #[test]
    fn rejects_builtin_redefinition() {
        let message = check_err("def print(x: int):\n    pass\n\ndef main():\n    pass\n");
        assert!(message.contains("builtin"), "{message}");
    }

    #[test]
    fn merges_imported_fragments() {
        let math = ModuleFragment::new(
            "c.math",
            vec![Symbol::foreign_function(
                "sqrt",
                vec![Type::Float],
                Type::Float,
                ForeignOrigin {
                    header: "math.h".to_string(),
                    library: Some("m".to_string()),
                },
            )],
        );
        let geometry = ModuleFragment::new(
            "geometry",
            vec![Symbol::function("area", vec![Type::Float], Type::Float)],
        );
        let source = "from c.math import sqrt\nimport geometry\n\ndef main():\n    print(sqrt(geometry.area(2.0)))\n";
        let module = parse(source).expect("parse");
        let table = analyze(&module, UnitKind::Program, &[math.clone(), geometry])
            .expect("imports resolve");
        assert!(table.global("sqrt").expect("sqrt").is_foreign());

        let module = parse("import missing\n\ndef main():\n    pass\n").expect("parse");
        let err = analyze(&module, UnitKind::Program, &[math.clone()]).unwrap_err();
        assert!(err.message().contains("could not be resolved"));

        let module = parse("from c.math import cbrt\n\ndef main():\n    pass\n").expect("parse");
        let err = analyze(&module, UnitKind::Program, &[math]).unwrap_err();
        assert!(err.message().contains("no export 'cbrt'"));
    }

    #[test]
    fn rejects_statements_at_module_level() {
        let message = check_err("print(1)\n\ndef main():\n    pass\n");
        assert!(message.contains("module level"), "{message}");
    }

    #[test]
    fn globals_need_literal_initializers() {
        check("PI: Final[float] = 3.14\n\ndef main():\n    print(PI)\n").expect("global constant");
        let message = check_err("def one() -> int:\n    return 1\n\nX: int = one()\n\ndef main():\n    pass\n");
        assert!(message.contains("initialized with a literal"), "{message}");
    }

    #[test]
    fn match_patterns_must_fit_subject() {
        let ok = "def main():\n    n: int = 2\n    match n:\n        case 1:\n            print(1)\n        case _:\n            print(0)\n";
        check(ok).expect("match program");
        let bad = "def main():\n    n: int = 2\n    match n:\n        case \"two\":\n            pass\n";
        let message = check_err(bad);
        assert!(message.contains("cannot match"), "{message}");

        let structs = "class P:\n    x: int\n\ndef main():\n    p: P = P()\n    match p:\n        case _:\n            pass\n";
        let message = check_err(structs);
        assert!(message.contains("cannot match on a value of type 'P'"), "{message}");
    }

    #[test]
    fn rejects_whole_array_assignment() {
        let source = "def main():\n    a: 'array[int, 3]'\n    b: 'array[int, 3]'\n    a = b\n";
        let err = check(source).unwrap_err();
        assert_eq!(err.stage(), crate::error::Stage::Semantic);
        assert!(err.message().contains("cannot assign to an array"), "{err}");

        check("def main():\n    a: 'array[int, 3]'\n    a[0] = 1\n").expect("element assignment");
    }

    #[test]
    fn comparisons_need_scalar_operands() {
        let structs = "class P:\n    x: int\n\ndef main():\n    p: P = P()\n    q: P = P()\n    if p == q:\n        pass\n";
        let message = check_err(structs);
        assert!(message.contains("cannot compare 'P' with 'P'"), "{message}");

        let arrays = "def main():\n    a: 'array[int, 2]'\n    b: 'array[int, 2]'\n    print(a != b)\n";
        let message = check_err(arrays);
        assert!(message.contains("cannot compare"), "{message}");

        let pointers = "class P:\n    x: int\n\ndef main():\n    p: P = P()\n    q: 'ptr[P]' = addr(p)\n    if q == addr(p):\n        print(q.x)\n";
        check(pointers).expect("pointer comparison");
    }

    #[test]
    fn boolean_operators_need_truth_values() {
        let source = "class P:\n    x: int\n\ndef main():\n    p: P = P()\n    if p.x and p:\n        pass\n";
        let message = check_err(source);
        assert!(message.contains("operand of 'and'/'or' must be bool or int, found 'P'"), "{message}");

        let message = check_err("def main():\n    s: bool = 2.5 or True\n");
        assert!(message.contains("found 'float'"), "{message}");

        check("def main():\n    n: int = 3\n    ok: bool = n > 1 and n\n").expect("int operand");
    }

    #[test]
    fn integer_literals_must_fit_in_int() {
        check("def main():\n    low: int = -2147483648\n    high: int = 2147483647\n")
            .expect("int bounds");
        let message = check_err("def main():\n    big: int = 2147483648\n");
        assert!(message.contains("does not fit in int"), "{message}");
        let message = check_err("class Big(Enum):\n    HUGE = 5000000000\n\ndef main():\n    pass\n");
        assert!(message.contains("does not fit in int"), "{message}");
    }
}
