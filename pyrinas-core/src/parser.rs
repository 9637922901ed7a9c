//! Recursive-descent parser producing the surface AST.
//!
//! Statements are selected by their first token; expressions use one
//! function per precedence level, loosest first. The first violation
//! aborts the whole unit, there is no recovery.

use crate::ast::{
    BinOp, BoolOp, ClassDef, ClassKind, CmpOp, Constant, Expr, FunctionDef, Import, MatchCase,
    Module, Parameter, Parameters, Pattern, Stmt, StmtKind, TypeExpr, UnaryOp,
};
use crate::error::CoreError;
use crate::lexer::{Token, TokenKind, tokenize};

/// Base class name that marks an enumeration.
pub const ENUM_MARKER: &str = "Enum";
/// Base class name that marks an interface.
pub const INTERFACE_MARKER: &str = "Protocol";

pub fn parse(source: &str) -> Result<Module, CoreError> {
    let tokens = tokenize(source)?;
    parse_tokens(tokens)
}

pub fn parse_tokens(tokens: Vec<Token>) -> Result<Module, CoreError> {
    let mut parser = Parser::new(tokens)?;
    parser.parse_module()
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn new(mut tokens: Vec<Token>) -> Result<Self, CoreError> {
        if let Some(bad) = tokens.iter().find(|t| t.kind == TokenKind::Error) {
            return Err(CoreError::LexError {
                line: bad.line,
                column: bad.column,
                message: bad.text().to_string(),
            });
        }
        if tokens.last().map(|t| t.kind) != Some(TokenKind::Eof) {
            let (line, column) = tokens.last().map(|t| (t.line, t.column)).unwrap_or((1, 1));
            tokens.push(Token {
                kind: TokenKind::Eof,
                lexeme: None,
                line,
                column,
            });
        }
        Ok(Parser {
            tokens,
            position: 0,
        })
    }

    fn parse_module(&mut self) -> Result<Module, CoreError> {
        let mut body = Vec::new();
        self.skip_newlines();
        while !self.check(TokenKind::Eof) {
            body.push(self.parse_statement()?);
            self.skip_newlines();
        }
        Ok(Module { body })
    }

    // -----------------------------------------------------------------
    // Statements
    // -----------------------------------------------------------------

    fn parse_statement(&mut self) -> Result<Stmt, CoreError> {
        let label = self.take_label();
        let line = self.peek().line;
        let kind = match self.kind() {
            TokenKind::Def => StmtKind::FunctionDef(self.parse_function_def()?),
            TokenKind::Class => StmtKind::ClassDef(self.parse_class_def()?),
            TokenKind::If => self.parse_if()?,
            TokenKind::While => self.parse_while(label)?,
            TokenKind::For => self.parse_for(label)?,
            TokenKind::Match => self.parse_match()?,
            TokenKind::Return => {
                self.advance();
                let value = if self.at_statement_end() {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.end_simple_statement()?;
                StmtKind::Return(value)
            }
            TokenKind::Break => {
                self.advance();
                self.end_simple_statement()?;
                StmtKind::Break { label }
            }
            TokenKind::Continue => {
                self.advance();
                self.end_simple_statement()?;
                StmtKind::Continue { label }
            }
            TokenKind::Pass => {
                self.advance();
                self.end_simple_statement()?;
                StmtKind::Pass
            }
            TokenKind::Import | TokenKind::From => StmtKind::Import(self.parse_import()?),
            _ => self.parse_assign_or_expr()?,
        };
        Ok(Stmt { kind, line })
    }

    /// A bare string statement directly before a loop or a
    /// `break`/`continue` names that statement.
    fn take_label(&mut self) -> Option<String> {
        if self.kind() != TokenKind::String || self.kind_at(1) != TokenKind::Newline {
            return None;
        }
        let mut offset = 1;
        while self.kind_at(offset) == TokenKind::Newline {
            offset += 1;
        }
        if !matches!(
            self.kind_at(offset),
            TokenKind::While | TokenKind::For | TokenKind::Break | TokenKind::Continue
        ) {
            return None;
        }
        let label = self.peek().text().to_string();
        self.position += offset;
        Some(label)
    }

    fn parse_function_def(&mut self) -> Result<FunctionDef, CoreError> {
        self.expect(TokenKind::Def, "'def'")?;
        let name = self.expect_identifier("function name")?;
        self.expect(TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        while !self.check(TokenKind::RParen) {
            let line = self.peek().line;
            let param_name = self.expect_identifier("parameter name")?;
            let annotation = if self.eat(TokenKind::Colon) {
                Some(self.parse_type()?)
            } else {
                None
            };
            params.push(Parameter {
                name: param_name,
                annotation,
                line,
            });
            if !self.eat(TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "')'")?;
        let returns = if self.eat(TokenKind::Arrow) {
            Some(self.parse_type()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        Ok(FunctionDef {
            name,
            params: Parameters(params),
            returns,
            body,
        })
    }

    fn parse_class_def(&mut self) -> Result<ClassDef, CoreError> {
        self.expect(TokenKind::Class, "'class'")?;
        let name = self.expect_identifier("class name")?;
        let mut bases = Vec::new();
        if self.eat(TokenKind::LParen) {
            while !self.check(TokenKind::RParen) {
                // `typing.Enum` and `Enum` name the same marker
                let mut base = self.expect_identifier("base class name")?;
                while self.eat(TokenKind::Dot) {
                    base = self.expect_identifier("base class name")?;
                }
                bases.push(base);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
            self.expect(TokenKind::RParen, "')'")?;
        }
        let body = self.parse_block()?;
        let kind = classify(&bases, &body);
        Ok(ClassDef {
            name,
            bases,
            kind,
            body,
        })
    }

    fn parse_if(&mut self) -> Result<StmtKind, CoreError> {
        // entered on either `if` or `elif`
        self.advance();
        let test = self.parse_expression()?;
        let body = self.parse_block()?;
        let orelse = if self.check(TokenKind::Elif) {
            let line = self.peek().line;
            vec![Stmt {
                kind: self.parse_if()?,
                line,
            }]
        } else if self.eat(TokenKind::Else) {
            self.parse_block()?
        } else {
            Vec::new()
        };
        Ok(StmtKind::If { test, body, orelse })
    }

    fn parse_while(&mut self, label: Option<String>) -> Result<StmtKind, CoreError> {
        self.expect(TokenKind::While, "'while'")?;
        let test = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(StmtKind::While { test, body, label })
    }

    fn parse_for(&mut self, label: Option<String>) -> Result<StmtKind, CoreError> {
        self.expect(TokenKind::For, "'for'")?;
        let target = self.expect_identifier("loop variable")?;
        self.expect(TokenKind::In, "'in'")?;
        let iter = self.parse_expression()?;
        let body = self.parse_block()?;
        Ok(StmtKind::For {
            target,
            iter,
            body,
            label,
        })
    }

    fn parse_match(&mut self) -> Result<StmtKind, CoreError> {
        self.expect(TokenKind::Match, "'match'")?;
        let subject = self.parse_expression()?;
        self.expect(TokenKind::Colon, "':'")?;
        self.skip_newlines();
        self.expect(TokenKind::Indent, "an indented block of cases")?;
        self.skip_newlines();

        let mut cases = Vec::new();
        while self.check(TokenKind::Case) {
            let line = self.peek().line;
            self.advance();
            let pattern = if self.check(TokenKind::Identifier)
                && self.peek().text() == "_"
                && self.kind_at(1) == TokenKind::Colon
            {
                self.advance();
                Pattern::Wildcard
            } else {
                Pattern::Value(self.parse_expression()?)
            };
            let body = self.parse_block()?;
            cases.push(MatchCase {
                pattern,
                body,
                line,
            });
            self.skip_newlines();
        }
        if cases.is_empty() {
            return Err(self.unexpected("'case'"));
        }
        self.expect(TokenKind::Dedent, "end of match block")?;
        Ok(StmtKind::Match { subject, cases })
    }

    fn parse_import(&mut self) -> Result<Import, CoreError> {
        let from = self.advance().kind == TokenKind::From;
        let module = self.parse_dotted_name()?;
        let mut names = Vec::new();
        if from {
            self.expect(TokenKind::Import, "'import'")?;
            loop {
                names.push(self.expect_identifier("imported name")?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.end_simple_statement()?;
        Ok(Import { module, names })
    }

    fn parse_dotted_name(&mut self) -> Result<Vec<String>, CoreError> {
        let mut parts = vec![self.expect_identifier("module name")?];
        while self.eat(TokenKind::Dot) {
            parts.push(self.expect_identifier("module name")?);
        }
        Ok(parts)
    }

    fn parse_assign_or_expr(&mut self) -> Result<StmtKind, CoreError> {
        let target = self.parse_expression()?;
        let kind = if self.eat(TokenKind::Colon) {
            let annotation = self.parse_type()?;
            let value = if self.eat(TokenKind::Assign) {
                Some(self.parse_expression()?)
            } else {
                None
            };
            StmtKind::AnnAssign {
                target,
                annotation,
                value,
            }
        } else if self.eat(TokenKind::Assign) {
            let value = self.parse_expression()?;
            StmtKind::Assign { target, value }
        } else {
            StmtKind::Expr(target)
        };
        self.end_simple_statement()?;
        Ok(kind)
    }

    /// `:` NEWLINE* INDENT statements DEDENT
    fn parse_block(&mut self) -> Result<Vec<Stmt>, CoreError> {
        self.expect(TokenKind::Colon, "':'")?;
        self.skip_newlines();
        self.expect(TokenKind::Indent, "an indented block")?;
        self.skip_newlines();
        let mut body = Vec::new();
        while !self.check(TokenKind::Dedent) && !self.check(TokenKind::Eof) {
            body.push(self.parse_statement()?);
            self.skip_newlines();
        }
        self.expect(TokenKind::Dedent, "end of block")?;
        Ok(body)
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.kind(),
            TokenKind::Newline | TokenKind::Semicolon | TokenKind::Dedent | TokenKind::Eof
        )
    }

    fn end_simple_statement(&mut self) -> Result<(), CoreError> {
        match self.kind() {
            TokenKind::Newline | TokenKind::Semicolon => {
                self.advance();
                Ok(())
            }
            TokenKind::Dedent | TokenKind::Eof => Ok(()),
            _ => Err(self.unexpected("end of statement")),
        }
    }

    // -----------------------------------------------------------------
    // Type annotations
    // -----------------------------------------------------------------

    fn parse_type(&mut self) -> Result<TypeExpr, CoreError> {
        match self.kind() {
            TokenKind::Identifier => {
                let name = self.advance().text().to_string();
                if !self.eat(TokenKind::LBracket) {
                    return Ok(TypeExpr::Name(name));
                }
                let mut args = Vec::new();
                loop {
                    if self.check(TokenKind::Number) {
                        let token = self.advance();
                        let size = token.text().parse::<usize>().map_err(|_| {
                            parse_error(&token, format!("invalid size '{}' in type", token.text()))
                        })?;
                        args.push(TypeExpr::Size(size));
                    } else {
                        args.push(self.parse_type()?);
                    }
                    if !self.eat(TokenKind::Comma) {
                        break;
                    }
                }
                self.expect(TokenKind::RBracket, "']'")?;
                Ok(TypeExpr::Generic { name, args })
            }
            TokenKind::None => {
                self.advance();
                Ok(TypeExpr::Name("None".to_string()))
            }
            TokenKind::String => {
                let token = self.advance();
                parse_type_string(&token)
            }
            TokenKind::LParen => {
                self.advance();
                let mut items = vec![self.parse_type()?];
                while self.eat(TokenKind::Comma) {
                    if self.check(TokenKind::RParen) {
                        break;
                    }
                    items.push(self.parse_type()?);
                }
                self.expect(TokenKind::RParen, "')'")?;
                if items.len() == 1 {
                    Ok(items.remove(0))
                } else {
                    Ok(TypeExpr::Tuple(items))
                }
            }
            _ => Err(self.unexpected("a type annotation")),
        }
    }

    // -----------------------------------------------------------------
    // Expressions, loosest binding first
    // -----------------------------------------------------------------

    fn parse_expression(&mut self) -> Result<Expr, CoreError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, CoreError> {
        let mut left = self.parse_and()?;
        while self.eat(TokenKind::Or) {
            let right = self.parse_and()?;
            left = Expr::BoolOp {
                op: BoolOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, CoreError> {
        let mut left = self.parse_not()?;
        while self.eat(TokenKind::And) {
            let right = self.parse_not()?;
            left = Expr::BoolOp {
                op: BoolOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, CoreError> {
        if self.eat(TokenKind::Not) {
            let operand = self.parse_not()?;
            return Ok(Expr::UnaryOp {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_comparison()
    }

    fn parse_comparison(&mut self) -> Result<Expr, CoreError> {
        let left = self.parse_additive()?;
        let Some(op) = comparison_op(self.kind()) else {
            return Ok(left);
        };
        self.advance();
        let right = self.parse_additive()?;
        if comparison_op(self.kind()).is_some() {
            return Err(self.error_here("chained comparisons are not supported".to_string()));
        }
        Ok(Expr::Compare {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }

    fn parse_additive(&mut self) -> Result<Expr, CoreError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.kind() {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_multiplicative()?;
            left = binary(left, op, right);
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, CoreError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.kind() {
                TokenKind::Star => BinOp::Mult,
                TokenKind::Slash => BinOp::Div,
                TokenKind::DoubleSlash => BinOp::FloorDiv,
                TokenKind::Percent => BinOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.parse_unary()?;
            left = binary(left, op, right);
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, CoreError> {
        let op = match self.kind() {
            TokenKind::Minus => UnaryOp::Neg,
            TokenKind::Plus => UnaryOp::Pos,
            _ => return self.parse_postfix(),
        };
        self.advance();
        let operand = self.parse_unary()?;
        Ok(Expr::UnaryOp {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, CoreError> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.kind() {
                TokenKind::LParen => {
                    self.advance();
                    let mut args = Vec::new();
                    while !self.check(TokenKind::RParen) {
                        args.push(self.parse_expression()?);
                        if !self.eat(TokenKind::Comma) {
                            break;
                        }
                    }
                    self.expect(TokenKind::RParen, "')'")?;
                    expr = Expr::Call {
                        func: Box::new(expr),
                        args,
                    };
                }
                TokenKind::Dot => {
                    self.advance();
                    let attr = self.expect_identifier("attribute name")?;
                    expr = Expr::Attribute {
                        value: Box::new(expr),
                        attr,
                    };
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(TokenKind::RBracket, "']'")?;
                    expr = Expr::Subscript {
                        value: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, CoreError> {
        let token = self.peek().clone();
        let expr = match token.kind {
            TokenKind::Number => {
                let text = token.text();
                let constant = if text.contains('.') {
                    text.parse::<f64>().map(Constant::Float).ok()
                } else {
                    text.parse::<i64>().map(Constant::Int).ok()
                };
                let constant = constant.ok_or_else(|| {
                    parse_error(&token, format!("numeric literal '{text}' is out of range"))
                })?;
                Expr::Constant(constant)
            }
            TokenKind::String => Expr::Constant(Constant::Str(token.text().to_string())),
            TokenKind::True => Expr::Constant(Constant::Bool(true)),
            TokenKind::False => Expr::Constant(Constant::Bool(false)),
            TokenKind::None => Expr::Constant(Constant::None),
            TokenKind::Identifier => Expr::Name(token.text().to_string()),
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RParen, "')'")?;
                return Ok(inner);
            }
            _ => return Err(self.unexpected("an expression")),
        };
        self.advance();
        Ok(expr)
    }

    // -----------------------------------------------------------------
    // Token cursor
    // -----------------------------------------------------------------

    fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.position.min(last)]
    }

    fn kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn kind_at(&self, offset: usize) -> TokenKind {
        let last = self.tokens.len() - 1;
        self.tokens[(self.position + offset).min(last)].kind
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.position < self.tokens.len() - 1 {
            self.position += 1;
        }
        token
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.kind() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token, CoreError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_identifier(&mut self, what: &str) -> Result<String, CoreError> {
        Ok(self.expect(TokenKind::Identifier, what)?.text().to_string())
    }

    fn skip_newlines(&mut self) {
        while self.check(TokenKind::Newline) {
            self.advance();
        }
    }

    fn unexpected(&self, expected: &str) -> CoreError {
        self.error_here(format!("expected {expected}, found {}", self.peek()))
    }

    fn error_here(&self, message: String) -> CoreError {
        parse_error(self.peek(), message)
    }
}

fn parse_error(token: &Token, message: String) -> CoreError {
    CoreError::ParseError {
        line: token.line,
        column: token.column,
        message,
    }
}

/// Parse annotation text such as `ptr[int]` on its own.
pub fn parse_annotation(text: &str, line: usize) -> Result<TypeExpr, CoreError> {
    let token = Token {
        kind: TokenKind::String,
        lexeme: Some(text.to_string()),
        line,
        column: 1,
    };
    parse_type_string(&token)
}

/// Parse the contents of a quoted annotation such as `'ptr[int]'`.
fn parse_type_string(token: &Token) -> Result<TypeExpr, CoreError> {
    let invalid = |detail: &str| {
        parse_error(
            token,
            format!("invalid type annotation '{}': {detail}", token.text()),
        )
    };
    let tokens = tokenize(token.text()).map_err(|err| invalid(err.message()))?;
    let mut inner = Parser::new(tokens).map_err(|err| invalid(err.message()))?;
    let ty = inner.parse_type().map_err(|err| invalid(err.message()))?;
    if !inner.check(TokenKind::Eof) {
        return Err(invalid("unexpected trailing input"));
    }
    Ok(ty)
}

fn comparison_op(kind: TokenKind) -> Option<CmpOp> {
    match kind {
        TokenKind::EqEq => Some(CmpOp::Eq),
        TokenKind::NotEq => Some(CmpOp::NotEq),
        TokenKind::Less => Some(CmpOp::Lt),
        TokenKind::LessEq => Some(CmpOp::LtE),
        TokenKind::Greater => Some(CmpOp::Gt),
        TokenKind::GreaterEq => Some(CmpOp::GtE),
        _ => None,
    }
}

fn binary(left: Expr, op: BinOp, right: Expr) -> Expr {
    Expr::BinOp {
        left: Box::new(left),
        op,
        right: Box::new(right),
    }
}

/// Decide whether a class body declares a struct, enum or interface.
///
/// Explicit marker bases win; otherwise fields or a method with a real
/// body make a struct, and anything else is an interface.
pub fn classify(bases: &[String], body: &[Stmt]) -> ClassKind {
    if bases.iter().any(|base| base == ENUM_MARKER) {
        return ClassKind::Enum;
    }
    if bases.iter().any(|base| base == INTERFACE_MARKER) {
        return ClassKind::Interface;
    }
    let has_state = body.iter().any(|stmt| match &stmt.kind {
        StmtKind::AnnAssign { .. } => true,
        StmtKind::FunctionDef(def) => !def.is_stub(),
        _ => false,
    });
    if has_state {
        ClassKind::Struct
    } else {
        ClassKind::Interface
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(source: &str) -> Module {
        parse(source).expect("parse")
    }

    fn main_body(module: &Module) -> &[Stmt] {
        match &module.body[0].kind {
            StmtKind::FunctionDef(def) => &def.body,
            other => panic!("expected a function, found {other:?}"),
        }
    }

    fn name(text: &str) -> Expr {
        Expr::Name(text.to_string())
    }

    fn int(value: i64) -> Expr {
        Expr::Constant(Constant::Int(value))
    }

    #[test]
    fn parses_minimal_program() {
        let module = parse_ok("def main():\n    print(1)\n");
        assert_eq!(module.body.len(), 1);
        let StmtKind::FunctionDef(def) = &module.body[0].kind else {
            panic!("expected a function definition");
        };
        assert_eq!(def.name, "main");
        assert!(def.params.is_empty());
        assert_eq!(
            def.body[0].kind,
            StmtKind::Expr(Expr::Call {
                func: Box::new(name("print")),
                args: vec![int(1)],
            })
        );
    }

    #[test]
    fn postfix_operators_chain_left_to_right() {
        let module = parse_ok("a.b[0](x)\n");
        let expected = Expr::Call {
            func: Box::new(Expr::Subscript {
                value: Box::new(Expr::Attribute {
                    value: Box::new(name("a")),
                    attr: "b".to_string(),
                }),
                index: Box::new(int(0)),
            }),
            args: vec![name("x")],
        };
        assert_eq!(module.body[0].kind, StmtKind::Expr(expected));
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let module = parse_ok("x = 1 + 2 * 3\n");
        let StmtKind::Assign { value, .. } = &module.body[0].kind else {
            panic!("expected an assignment");
        };
        assert_eq!(*value, binary(int(1), BinOp::Add, binary(int(2), BinOp::Mult, int(3))));
    }

    #[test]
    fn boolean_operators_bind_looser_than_comparison() {
        let module = parse_ok("not a == b and c or d\n");
        let StmtKind::Expr(Expr::BoolOp { op, left, .. }) = &module.body[0].kind else {
            panic!("expected a boolean operation");
        };
        assert_eq!(*op, BoolOp::Or);
        let Expr::BoolOp { op: inner, left: negated, .. } = left.as_ref() else {
            panic!("expected nested and");
        };
        assert_eq!(*inner, BoolOp::And);
        assert!(matches!(
            negated.as_ref(),
            Expr::UnaryOp { op: UnaryOp::Not, operand } if matches!(operand.as_ref(), Expr::Compare { .. })
        ));
    }

    #[test]
    fn unary_minus_binds_tighter_than_multiplication() {
        let module = parse_ok("y = -a * b\n");
        let StmtKind::Assign { value, .. } = &module.body[0].kind else {
            panic!("expected an assignment");
        };
        assert!(matches!(value, Expr::BinOp { op: BinOp::Mult, left, .. }
            if matches!(left.as_ref(), Expr::UnaryOp { op: UnaryOp::Neg, .. })));
    }

    #[test]
    fn rejects_chained_comparisons() {
        let err = parse("x = a < b < c\n").unwrap_err();
        assert!(matches!(err, CoreError::ParseError { .. }));
    }

    #[test]
    fn parses_annotated_declarations() {
        let module = parse_ok(
            "def main():\n    p: 'ptr[int]' = addr(x)\n    arr: 'array[int, 5]'\n    n: Final[int] = 3\n",
        );
        let body = main_body(&module);
        let StmtKind::AnnAssign { annotation, value, .. } = &body[0].kind else {
            panic!("expected a declaration");
        };
        assert_eq!(annotation.to_string(), "ptr[int]");
        assert!(value.is_some());
        let StmtKind::AnnAssign { annotation, value, .. } = &body[1].kind else {
            panic!("expected a declaration");
        };
        assert_eq!(
            *annotation,
            TypeExpr::Generic {
                name: "array".to_string(),
                args: vec![TypeExpr::Name("int".to_string()), TypeExpr::Size(5)],
            }
        );
        assert!(value.is_none());
        let StmtKind::AnnAssign { annotation, .. } = &body[2].kind else {
            panic!("expected a declaration");
        };
        assert_eq!(annotation.to_string(), "Final[int]");
    }

    #[test]
    fn parses_signature_with_tuple_return() {
        let module = parse_ok("def divide(a: int, b: int) -> (int, str):\n    pass\n");
        let StmtKind::FunctionDef(def) = &module.body[0].kind else {
            panic!("expected a function definition");
        };
        assert_eq!(def.params.len(), 2);
        assert_eq!(def.returns.as_ref().map(|t| t.to_string()).as_deref(), Some("(int, str)"));
    }

    #[test]
    fn rejects_malformed_string_annotation() {
        let err = parse("x: 'ptr[int' = 1\n").unwrap_err();
        assert!(err.message().contains("invalid type annotation"));
    }

    #[test]
    fn requires_indented_block() {
        let err = parse("def main():\nprint(1)\n").unwrap_err();
        assert!(matches!(err, CoreError::ParseError { line: 2, .. }));

        let err = parse("def main(): pass\n").unwrap_err();
        assert!(err.message().contains("indented block"));
    }

    #[test]
    fn rejects_trailing_tokens() {
        let err = parse("x = 1 2\n").unwrap_err();
        assert!(err.message().contains("end of statement"));
    }

    #[test]
    fn elif_nests_into_else_branch() {
        let module = parse_ok("if a:\n    pass\nelif b:\n    pass\nelse:\n    x = 1\n");
        let StmtKind::If { orelse, .. } = &module.body[0].kind else {
            panic!("expected if");
        };
        assert_eq!(orelse.len(), 1);
        let StmtKind::If { test, orelse: inner, .. } = &orelse[0].kind else {
            panic!("expected nested if");
        };
        assert_eq!(*test, name("b"));
        assert_eq!(inner.len(), 1);
    }

    #[test]
    fn string_before_loop_and_break_becomes_label() {
        let source = "def f():\n    \"outer\"\n    while a:\n        while b:\n            \"outer\"\n            break\n";
        let module = parse_ok(source);
        let body = main_body(&module);
        assert_eq!(body.len(), 1);
        let StmtKind::While { label, body: outer_body, .. } = &body[0].kind else {
            panic!("expected while");
        };
        assert_eq!(label.as_deref(), Some("outer"));
        let StmtKind::While { label: inner_label, body: inner_body, .. } = &outer_body[0].kind else {
            panic!("expected inner while");
        };
        assert_eq!(*inner_label, None);
        assert_eq!(
            inner_body[0].kind,
            StmtKind::Break {
                label: Some("outer".to_string())
            }
        );
    }

    #[test]
    fn plain_string_statement_stays_an_expression() {
        let module = parse_ok("def f():\n    \"docs\"\n    x = 1\n");
        assert!(matches!(
            main_body(&module)[0].kind,
            StmtKind::Expr(Expr::Constant(Constant::Str(_)))
        ));
    }

    #[test]
    fn parses_match_with_wildcard() {
        let source = "match c:\n    case Color.RED:\n        pass\n    case 2:\n        pass\n    case _:\n        pass\n";
        let module = parse_ok(source);
        let StmtKind::Match { cases, .. } = &module.body[0].kind else {
            panic!("expected match");
        };
        assert_eq!(cases.len(), 3);
        assert!(matches!(cases[0].pattern, Pattern::Value(Expr::Attribute { .. })));
        assert_eq!(cases[2].pattern, Pattern::Wildcard);
    }

    #[test]
    fn parses_for_loop() {
        let module = parse_ok("for i in range(10):\n    print(i)\n");
        let StmtKind::For { target, iter, .. } = &module.body[0].kind else {
            panic!("expected for");
        };
        assert_eq!(target, "i");
        assert!(matches!(iter, Expr::Call { .. }));
    }

    #[test]
    fn parses_imports() {
        let module = parse_ok("import geometry.shapes\nfrom c.math import sqrt, pow\n");
        assert_eq!(
            module.body[0].kind,
            StmtKind::Import(Import {
                module: vec!["geometry".to_string(), "shapes".to_string()],
                names: vec![],
            })
        );
        let StmtKind::Import(import) = &module.body[1].kind else {
            panic!("expected import");
        };
        assert_eq!(import.module_path(), "c.math");
        assert_eq!(import.names, vec!["sqrt".to_string(), "pow".to_string()]);
    }

    #[test]
    fn classifies_class_declarations() {
        let source = "class Color(Enum):\n    RED = 0\n\nclass Point:\n    x: int\n\nclass Shape:\n    def area(self) -> float:\n        pass\n\nclass Counter:\n    def bump(self) -> int:\n        return 1\n\nclass Named(Protocol):\n    def name(self) -> str:\n        return \"\"\n";
        let module = parse_ok(source);
        let kinds: Vec<ClassKind> = module
            .body
            .iter()
            .map(|stmt| match &stmt.kind {
                StmtKind::ClassDef(class) => class.kind,
                other => panic!("expected class, found {other:?}"),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                ClassKind::Enum,
                ClassKind::Struct,
                ClassKind::Interface,
                ClassKind::Struct,
                ClassKind::Interface
            ]
        );
    }

    #[test]
    fn dump_lists_nodes() {
        let dump = parse_ok("def main():\n    print(1)\n").dump();
        assert!(dump.starts_with("Module\n  FunctionDef main()"));
        assert!(dump.contains("Name print"));
    }
}
