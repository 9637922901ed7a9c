//! Symbol table built by the semantic analyzer.
//!
//! Scopes live in an arena and are addressed by [`ScopeId`]. Popping a
//! scope only moves the current pointer back to its parent, so every
//! scope stays valid for lookups after analysis; the code generator
//! walks them again in creation order.

use crate::types::Type;

pub type ScopeId = usize;

/// The root scope holding top-level declarations.
pub const GLOBAL_SCOPE: ScopeId = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSig {
    pub params: Vec<Type>,
    pub returns: Type,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

/// A method signature; the receiver is not part of `sig.params`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    pub name: String,
    pub sig: FunctionSig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    Variable { ty: Type },
    Function(FunctionSig),
    Struct { fields: Vec<Field>, methods: Vec<Method> },
    Enum { members: Vec<(String, i64)> },
    Interface { methods: Vec<Method> },
    Module { exports: Vec<Symbol> },
}

/// Where a C library function comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignOrigin {
    pub header: String,
    pub library: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SymbolOrigin {
    /// Declared in the unit being compiled.
    #[default]
    Local,
    /// Exported by another Pyrinas module, by dotted path.
    Module(String),
    /// Provided by a C header.
    Foreign(ForeignOrigin),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub immutable: bool,
    pub origin: SymbolOrigin,
    /// Interfaces a struct declares as bases.
    pub implements: Vec<String>,
}

impl Symbol {
    fn new(name: impl Into<String>, kind: SymbolKind) -> Self {
        Symbol {
            name: name.into(),
            kind,
            immutable: false,
            origin: SymbolOrigin::Local,
            implements: Vec::new(),
        }
    }

    pub fn variable(name: impl Into<String>, ty: Type, immutable: bool) -> Self {
        let mut symbol = Symbol::new(name, SymbolKind::Variable { ty });
        symbol.immutable = immutable;
        symbol
    }

    pub fn function(name: impl Into<String>, params: Vec<Type>, returns: Type) -> Self {
        Symbol::new(name, SymbolKind::Function(FunctionSig { params, returns }))
    }

    pub fn foreign_function(
        name: impl Into<String>,
        params: Vec<Type>,
        returns: Type,
        origin: ForeignOrigin,
    ) -> Self {
        let mut symbol = Symbol::function(name, params, returns);
        symbol.origin = SymbolOrigin::Foreign(origin);
        symbol
    }

    pub fn structure(name: impl Into<String>, fields: Vec<Field>, methods: Vec<Method>) -> Self {
        Symbol::new(name, SymbolKind::Struct { fields, methods })
    }

    pub fn enumeration(name: impl Into<String>, members: Vec<(String, i64)>) -> Self {
        Symbol::new(name, SymbolKind::Enum { members })
    }

    pub fn interface(name: impl Into<String>, methods: Vec<Method>) -> Self {
        Symbol::new(name, SymbolKind::Interface { methods })
    }

    pub fn module(name: impl Into<String>, path: impl Into<String>, exports: Vec<Symbol>) -> Self {
        let mut symbol = Symbol::new(name, SymbolKind::Module { exports });
        symbol.origin = SymbolOrigin::Module(path.into());
        symbol
    }

    /// Declared value type of the symbol, when it has one.
    pub fn value_type(&self) -> Option<Type> {
        match &self.kind {
            SymbolKind::Variable { ty } => Some(ty.clone()),
            SymbolKind::Function(sig) => Some(sig.returns.clone()),
            SymbolKind::Struct { .. } | SymbolKind::Enum { .. } | SymbolKind::Interface { .. } => {
                Some(Type::Named(self.name.clone()))
            }
            SymbolKind::Module { .. } => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            SymbolKind::Variable { .. } => "variable",
            SymbolKind::Function(_) => "function",
            SymbolKind::Struct { .. } => "struct",
            SymbolKind::Enum { .. } => "enum",
            SymbolKind::Interface { .. } => "interface",
            SymbolKind::Module { .. } => "module",
        }
    }

    pub fn is_foreign(&self) -> bool {
        matches!(self.origin, SymbolOrigin::Foreign(_))
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        match &self.kind {
            SymbolKind::Struct { fields, .. } => fields.iter().find(|f| f.name == name),
            _ => None,
        }
    }

    pub fn method(&self, name: &str) -> Option<&Method> {
        match &self.kind {
            SymbolKind::Struct { methods, .. } | SymbolKind::Interface { methods } => {
                methods.iter().find(|m| m.name == name)
            }
            _ => None,
        }
    }

    pub fn member(&self, name: &str) -> Option<i64> {
        match &self.kind {
            SymbolKind::Enum { members } => members
                .iter()
                .find(|(member, _)| member == name)
                .map(|(_, value)| *value),
            _ => None,
        }
    }

    pub fn export(&self, name: &str) -> Option<&Symbol> {
        match &self.kind {
            SymbolKind::Module { exports } => exports.iter().find(|s| s.name == name),
            _ => None,
        }
    }
}

/// Pre-resolved declarations of one imported module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleFragment {
    /// Dotted module path as written in the import, e.g. `c.math`.
    pub path: String,
    pub symbols: Vec<Symbol>,
}

impl ModuleFragment {
    pub fn new(path: impl Into<String>, symbols: Vec<Symbol>) -> Self {
        ModuleFragment {
            path: path.into(),
            symbols,
        }
    }

    pub fn find(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub symbols: Vec<Symbol>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    current: ScopeId,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![Scope {
                parent: None,
                symbols: Vec::new(),
            }],
            current: GLOBAL_SCOPE,
        }
    }

    pub fn current(&self) -> ScopeId {
        self.current
    }

    /// Open a child of the current scope and make it current.
    pub fn push_scope(&mut self) -> ScopeId {
        let id = self.scopes.len();
        self.scopes.push(Scope {
            parent: Some(self.current),
            symbols: Vec::new(),
        });
        self.current = id;
        id
    }

    /// Return to the parent scope. The popped scope stays in the arena.
    pub fn pop_scope(&mut self) {
        if let Some(parent) = self.scopes[self.current].parent {
            self.current = parent;
        }
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes.get(scope).and_then(|s| s.parent)
    }

    /// Declare a symbol in the current scope.
    ///
    /// Fails with the name when the scope already holds it.
    pub fn insert(&mut self, symbol: Symbol) -> Result<(), String> {
        let scope = &mut self.scopes[self.current];
        if scope.symbols.iter().any(|s| s.name == symbol.name) {
            return Err(symbol.name);
        }
        scope.symbols.push(symbol);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        self.lookup_from(self.current, name)
    }

    /// Walk the scope chain starting at `scope`.
    pub fn lookup_from(&self, scope: ScopeId, name: &str) -> Option<&Symbol> {
        let mut next = Some(scope);
        while let Some(id) = next {
            let scope = self.scopes.get(id)?;
            if let Some(symbol) = scope.symbols.iter().find(|s| s.name == name) {
                return Some(symbol);
            }
            next = scope.parent;
        }
        None
    }

    pub fn lookup_local(&self, name: &str) -> Option<&Symbol> {
        self.scopes[self.current]
            .symbols
            .iter()
            .find(|s| s.name == name)
    }

    pub fn global(&self, name: &str) -> Option<&Symbol> {
        self.globals().iter().find(|s| s.name == name)
    }

    pub fn globals(&self) -> &[Symbol] {
        &self.scopes[GLOBAL_SCOPE].symbols
    }

    /// Public top-level declarations of this unit, tagged with `path`.
    ///
    /// Imported and foreign symbols are not re-exported; variables are
    /// exported only when immutable.
    pub fn exports(&self, path: &str) -> Vec<Symbol> {
        self.globals()
            .iter()
            .filter(|s| s.origin == SymbolOrigin::Local)
            .filter(|s| match s.kind {
                SymbolKind::Variable { .. } => s.immutable && !s.name.starts_with('_'),
                SymbolKind::Module { .. } => false,
                _ => true,
            })
            .map(|s| {
                let mut exported = s.clone();
                exported.origin = SymbolOrigin::Module(path.to_string());
                exported
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_through_parent_chain() {
        let mut table = SymbolTable::new();
        table
            .insert(Symbol::variable("limit", Type::Int, true))
            .expect("insert global");
        table.push_scope();
        table
            .insert(Symbol::variable("x", Type::Float, false))
            .expect("insert local");
        assert_eq!(table.lookup("limit").map(|s| s.immutable), Some(true));
        assert!(table.lookup("x").is_some());
        assert!(table.lookup_local("limit").is_none());
        table.pop_scope();
        assert!(table.lookup("x").is_none());
    }

    #[test]
    fn inner_declarations_shadow_outer_ones() {
        let mut table = SymbolTable::new();
        table.insert(Symbol::variable("v", Type::Int, false)).expect("outer");
        table.push_scope();
        table.insert(Symbol::variable("v", Type::Str, false)).expect("inner");
        assert_eq!(table.lookup("v").and_then(Symbol::value_type), Some(Type::Str));
    }

    #[test]
    fn rejects_duplicate_in_same_scope() {
        let mut table = SymbolTable::new();
        table.insert(Symbol::function("f", vec![], Type::None)).expect("first");
        let err = table
            .insert(Symbol::function("f", vec![Type::Int], Type::Int))
            .unwrap_err();
        assert_eq!(err, "f");
    }

    #[test]
    fn popped_scopes_remain_addressable() {
        let mut table = SymbolTable::new();
        let inner = table.push_scope();
        table.insert(Symbol::variable("tmp", Type::Bool, false)).expect("insert");
        table.pop_scope();
        assert_eq!(table.current(), GLOBAL_SCOPE);
        assert_eq!(table.parent(inner), Some(GLOBAL_SCOPE));
        assert!(table.lookup_from(inner, "tmp").is_some());
        assert_eq!(table.scope_count(), 2);
    }

    #[test]
    fn popping_global_scope_is_a_no_op() {
        let mut table = SymbolTable::new();
        table.pop_scope();
        assert_eq!(table.current(), GLOBAL_SCOPE);
    }

    #[test]
    fn exports_public_declarations_only() {
        let mut table = SymbolTable::new();
        table.insert(Symbol::function("area", vec![], Type::Float)).expect("fn");
        table.insert(Symbol::variable("PI", Type::Float, true)).expect("const");
        table.insert(Symbol::variable("counter", Type::Int, false)).expect("var");
        table
            .insert(Symbol::foreign_function(
                "sqrt",
                vec![Type::Float],
                Type::Float,
                ForeignOrigin {
                    header: "math.h".to_string(),
                    library: Some("m".to_string()),
                },
            ))
            .expect("foreign");

        let exports = table.exports("geometry");
        let names: Vec<&str> = exports.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["area", "PI"]);
        assert!(exports
            .iter()
            .all(|s| s.origin == SymbolOrigin::Module("geometry".to_string())));
    }
}
