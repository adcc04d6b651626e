//! Parser for the C subset.
//!
//! This module implements a recursive descent parser that converts a stream
//! of tokens into the normalized tree. It parses far more than the analyses
//! accept: rejecting a construct is the access collector's job, so the
//! parser only rejects text that is not C.

use crate::frontend::ast::*;
use crate::frontend::lexer::Lexer;
use crate::frontend::semantic::ScopeStack;
use crate::frontend::token::{Token, TokenKind};
use crate::utils::errors::{AnalysisError, AnalysisResult, ParseError, ParseErrorKind};
use crate::utils::intern::{SymbolId, SymbolKind, SymbolTable};
use crate::utils::location::Span;

/// Type names from the standard headers, recognised without a typedef.
const TYPEDEF_NAMES: &[&str] = &[
    "int8_t", "int16_t", "int32_t", "int64_t", "uint8_t", "uint16_t", "uint32_t", "uint64_t", "size_t",
    "ssize_t", "ptrdiff_t", "intptr_t", "uintptr_t", "_Bool", "bool",
];

/// A parser for the C subset.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    previous: Token,
    peeked: Option<Token>,
    symbols: SymbolTable,
    scopes: ScopeStack,
    next_loop: u32,
}

impl<'a> Parser<'a> {
    /// Create a new parser from a lexer.
    pub fn new(mut lexer: Lexer<'a>) -> AnalysisResult<Self> {
        let first_token = lexer.next_token()?;
        Ok(Self {
            lexer,
            current: first_token.clone(),
            previous: first_token,
            peeked: None,
            symbols: SymbolTable::new(),
            scopes: ScopeStack::new(),
            next_loop: 0,
        })
    }

    /// Parse a complete translation unit.
    pub fn parse_translation_unit(mut self) -> AnalysisResult<TranslationUnit> {
        let mut functions = Vec::new();
        let mut globals = Vec::new();

        while !self.is_at_end() {
            if self.match_token(TokenKind::Pragma)? {
                continue;
            }
            match self.parse_external_declaration()? {
                Some(External::Function(func)) => functions.push(func),
                Some(External::Global(stmt)) => globals.push(stmt),
                None => {}
            }
        }

        log::debug!(
            "parsed {} functions, {} global declarations, {} symbols",
            functions.len(),
            globals.len(),
            self.symbols.len()
        );
        Ok(TranslationUnit {
            functions,
            globals,
            symbols: self.symbols,
        })
    }

    fn parse_external_declaration(&mut self) -> AnalysisResult<Option<External>> {
        let start = self.current.span;
        if !self.is_type_start()? {
            return Err(self.error(ParseErrorKind::ExpectedType, "Expected declaration"));
        }
        let storage = StorageClass::from_specifiers(&self.parse_specifiers()?);
        if self.match_token(TokenKind::Semicolon)? {
            return Ok(None);
        }

        let pointer = self.parse_pointer()?;
        let name_span = self.current.span;
        let name = self.consume_identifier("Expected declarator name")?;

        if self.check(TokenKind::LeftParen) {
            let symbol = match self.scopes.lookup(&name) {
                Some(id) if self.symbols.kind(id) == SymbolKind::Function => id,
                _ => self.scopes.declare(&mut self.symbols, &name, SymbolKind::Function, name_span),
            };
            self.advance()?;
            self.scopes.push();
            let params = self.parse_parameters()?;
            self.consume(TokenKind::RightParen, "Expected ')' after parameters")?;

            if self.check(TokenKind::LeftBrace) {
                let body = self.parse_compound_statement()?;
                self.scopes.pop();
                return Ok(Some(External::Function(Function {
                    name,
                    symbol,
                    params,
                    body,
                    span: start.merge(&self.previous.span),
                })));
            }
            self.scopes.pop();
            self.consume(TokenKind::Semicolon, "Expected ';' after prototype")?;
            return Ok(None);
        }

        let mut decls = vec![self.finish_declarator(name, name_span, pointer, storage)?];
        while self.match_token(TokenKind::Comma)? {
            decls.push(self.parse_declarator(storage)?);
        }
        self.consume(TokenKind::Semicolon, "Expected ';' after declaration")?;
        Ok(Some(External::Global(Stmt::new(
            StmtKind::Decl(decls),
            start.merge(&self.previous.span),
        ))))
    }

    fn parse_parameters(&mut self) -> AnalysisResult<Vec<Declarator>> {
        let mut params = Vec::new();
        if self.check(TokenKind::RightParen) {
            return Ok(params);
        }
        if self.check(TokenKind::Void) && self.peek()?.kind == TokenKind::RightParen {
            self.advance()?;
            return Ok(params);
        }
        loop {
            if !self.is_type_start()? {
                return Err(self.error(ParseErrorKind::ExpectedType, "Expected parameter type"));
            }
            self.parse_specifiers()?;
            let pointer = self.parse_pointer()?;
            let name_span = self.current.span;
            let name = if self.check(TokenKind::Identifier) {
                let n = self.current.lexeme.clone();
                self.advance()?;
                n
            } else {
                format!("<param{}>", params.len())
            };
            let dims = self.parse_dimensions()?;
            let kind = declared_kind(pointer, dims.len());
            let symbol = self.scopes.declare(&mut self.symbols, &name, kind, name_span);
            params.push(Declarator {
                symbol,
                dims,
                pointer,
                init: None,
                storage: StorageClass::Auto,
                span: name_span.merge(&self.previous.span),
            });
            if !self.match_token(TokenKind::Comma)? {
                break;
            }
        }
        Ok(params)
    }

    /// Consume declaration specifiers, returning their text.
    fn parse_specifiers(&mut self) -> AnalysisResult<String> {
        let mut words = Vec::new();
        loop {
            if matches!(self.current.kind, TokenKind::Struct | TokenKind::Union) {
                words.push(self.current.lexeme.clone());
                self.advance()?;
                if self.check(TokenKind::Identifier) {
                    words.push(self.current.lexeme.clone());
                    self.advance()?;
                }
                if self.check(TokenKind::LeftBrace) {
                    self.skip_balanced_braces()?;
                }
            } else if self.is_type_start()? {
                words.push(self.current.lexeme.clone());
                self.advance()?;
            } else {
                break;
            }
        }
        Ok(words.join(" "))
    }

    fn skip_balanced_braces(&mut self) -> AnalysisResult<()> {
        let mut depth = 0usize;
        loop {
            match self.current.kind {
                TokenKind::LeftBrace => depth += 1,
                TokenKind::RightBrace => depth = depth.saturating_sub(1),
                TokenKind::Eof => {
                    return Err(self.error(ParseErrorKind::UnexpectedEof, "Unterminated struct body"))
                }
                _ => {}
            }
            self.advance()?;
            if depth == 0 {
                return Ok(());
            }
        }
    }

    fn parse_pointer(&mut self) -> AnalysisResult<bool> {
        let mut pointer = false;
        while self.match_token(TokenKind::Star)? {
            pointer = true;
            while matches!(
                self.current.kind,
                TokenKind::Const | TokenKind::Volatile | TokenKind::Restrict
            ) {
                self.advance()?;
            }
        }
        Ok(pointer)
    }

    fn parse_dimensions(&mut self) -> AnalysisResult<Vec<Option<Expr>>> {
        let mut dims = Vec::new();
        while self.match_token(TokenKind::LeftBracket)? {
            if self.match_token(TokenKind::RightBracket)? {
                dims.push(None);
                continue;
            }
            dims.push(Some(self.parse_assignment()?));
            self.consume(TokenKind::RightBracket, "Expected ']' after array dimension")?;
        }
        Ok(dims)
    }

    fn parse_declarator(&mut self, storage: StorageClass) -> AnalysisResult<Declarator> {
        let pointer = self.parse_pointer()?;
        let name_span = self.current.span;
        let name = self.consume_identifier("Expected declarator name")?;
        self.finish_declarator(name, name_span, pointer, storage)
    }

    fn finish_declarator(
        &mut self,
        name: String,
        name_span: Span,
        pointer: bool,
        storage: StorageClass,
    ) -> AnalysisResult<Declarator> {
        let dims = self.parse_dimensions()?;
        let kind = declared_kind(pointer, dims.len());
        let symbol = self.scopes.declare(&mut self.symbols, &name, kind, name_span);
        let init = if self.match_token(TokenKind::Equal)? {
            Some(self.parse_initializer()?)
        } else {
            None
        };
        Ok(Declarator {
            symbol,
            dims,
            pointer,
            init,
            storage,
            span: name_span.merge(&self.previous.span),
        })
    }

    fn parse_initializer(&mut self) -> AnalysisResult<Initializer> {
        if !self.match_token(TokenKind::LeftBrace)? {
            return Ok(Initializer::Expr(self.parse_assignment()?));
        }
        let mut items = Vec::new();
        while !self.check(TokenKind::RightBrace) {
            items.push(self.parse_initializer()?);
            if !self.match_token(TokenKind::Comma)? {
                break;
            }
        }
        self.consume(TokenKind::RightBrace, "Expected '}' after initializer list")?;
        Ok(Initializer::List(items))
    }

    /// Declaration statement; specifiers not yet consumed.
    fn parse_declaration(&mut self) -> AnalysisResult<StmtKind> {
        let storage = StorageClass::from_specifiers(&self.parse_specifiers()?);
        let mut decls = Vec::new();
        if !self.check(TokenKind::Semicolon) {
            loop {
                decls.push(self.parse_declarator(storage)?);
                if !self.match_token(TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.consume(TokenKind::Semicolon, "Expected ';' after declaration")?;
        Ok(StmtKind::Decl(decls))
    }

    fn parse_compound_statement(&mut self) -> AnalysisResult<Stmt> {
        let start = self.current.span;
        self.consume(TokenKind::LeftBrace, "Expected '{'")?;
        self.scopes.push();
        let mut statements = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            statements.push(self.parse_statement()?);
        }
        self.scopes.pop();
        self.consume(TokenKind::RightBrace, "Expected '}'")?;
        Ok(Stmt::new(StmtKind::Compound(statements), start.merge(&self.previous.span)))
    }

    fn parse_statement(&mut self) -> AnalysisResult<Stmt> {
        let mut pragmas = Vec::new();
        while self.check(TokenKind::Pragma) {
            pragmas.push(self.current.lexeme.clone());
            self.advance()?;
        }
        let start = self.current.span;

        if self.check(TokenKind::LeftBrace) {
            let mut stmt = self.parse_compound_statement()?;
            stmt.pragmas = pragmas;
            return Ok(stmt);
        }

        let current_kind = self.current.kind;
        let kind = match current_kind {
            TokenKind::Semicolon => {
                self.advance()?;
                StmtKind::Null
            }
            TokenKind::For => self.parse_for_statement()?,
            TokenKind::If => self.parse_if_statement()?,
            TokenKind::While => {
                self.advance()?;
                let cond = self.parse_paren_condition()?;
                let body = Box::new(self.parse_statement()?);
                StmtKind::While { cond, body }
            }
            TokenKind::Do => {
                self.advance()?;
                let body = Box::new(self.parse_statement()?);
                self.consume(TokenKind::While, "Expected 'while' after do body")?;
                let cond = self.parse_paren_condition()?;
                self.consume(TokenKind::Semicolon, "Expected ';' after do-while")?;
                StmtKind::DoWhile { body, cond }
            }
            TokenKind::Switch => {
                self.advance()?;
                let cond = self.parse_paren_condition()?;
                let body = Box::new(self.parse_statement()?);
                StmtKind::Switch { cond, body }
            }
            TokenKind::Case => {
                self.advance()?;
                let value = self.parse_conditional()?;
                self.consume(TokenKind::Colon, "Expected ':' after case value")?;
                StmtKind::Case(value)
            }
            TokenKind::Default => {
                self.advance()?;
                self.consume(TokenKind::Colon, "Expected ':' after default")?;
                StmtKind::Default
            }
            TokenKind::Break => {
                self.advance()?;
                self.consume(TokenKind::Semicolon, "Expected ';' after break")?;
                StmtKind::Break
            }
            TokenKind::Continue => {
                self.advance()?;
                self.consume(TokenKind::Semicolon, "Expected ';' after continue")?;
                StmtKind::Continue
            }
            TokenKind::Return => {
                self.advance()?;
                let value = if self.check(TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                self.consume(TokenKind::Semicolon, "Expected ';' after return")?;
                StmtKind::Return(value)
            }
            TokenKind::Goto => {
                self.advance()?;
                let label = self.consume_identifier("Expected label after goto")?;
                self.consume(TokenKind::Semicolon, "Expected ';' after goto")?;
                StmtKind::Goto(label)
            }
            TokenKind::Identifier if self.peek()?.kind == TokenKind::Colon => {
                let name = self.current.lexeme.clone();
                self.advance()?;
                self.advance()?;
                let body = Box::new(self.parse_statement()?);
                StmtKind::Label { name, body }
            }
            _ if self.is_type_start()? => self.parse_declaration()?,
            _ => {
                let expr = self.parse_expression()?;
                self.consume(TokenKind::Semicolon, "Expected ';' after expression")?;
                StmtKind::Expr(expr)
            }
        };

        Ok(Stmt {
            kind,
            span: start.merge(&self.previous.span),
            pragmas,
        })
    }

    fn parse_paren_condition(&mut self) -> AnalysisResult<Expr> {
        self.consume(TokenKind::LeftParen, "Expected '('")?;
        let cond = self.parse_expression()?;
        self.consume(TokenKind::RightParen, "Expected ')'")?;
        Ok(cond)
    }

    fn parse_for_statement(&mut self) -> AnalysisResult<StmtKind> {
        let id = LoopId(self.next_loop);
        self.next_loop += 1;
        self.consume(TokenKind::For, "Expected 'for'")?;
        self.consume(TokenKind::LeftParen, "Expected '(' after 'for'")?;
        self.scopes.push();

        let init_start = self.current.span;
        let init = if self.match_token(TokenKind::Semicolon)? {
            None
        } else if self.is_type_start()? {
            let kind = self.parse_declaration()?;
            Some(Box::new(Stmt::new(kind, init_start.merge(&self.previous.span))))
        } else {
            let expr = self.parse_expression()?;
            self.consume(TokenKind::Semicolon, "Expected ';' after for initializer")?;
            Some(Box::new(Stmt::new(StmtKind::Expr(expr), init_start.merge(&self.previous.span))))
        };

        let cond = if self.check(TokenKind::Semicolon) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(TokenKind::Semicolon, "Expected ';' after for condition")?;

        let incr = if self.check(TokenKind::RightParen) {
            None
        } else {
            Some(self.parse_expression()?)
        };
        self.consume(TokenKind::RightParen, "Expected ')' after for header")?;

        let body = Box::new(self.parse_statement()?);
        self.scopes.pop();
        Ok(StmtKind::For(ForStmt {
            id,
            init,
            cond,
            incr,
            body,
        }))
    }

    fn parse_if_statement(&mut self) -> AnalysisResult<StmtKind> {
        self.consume(TokenKind::If, "Expected 'if'")?;
        let cond = self.parse_paren_condition()?;
        let then_branch = Box::new(self.parse_statement()?);
        let else_branch = if self.match_token(TokenKind::Else)? {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(StmtKind::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    // Expression parsing with precedence climbing

    fn parse_expression(&mut self) -> AnalysisResult<Expr> {
        let first = self.parse_assignment()?;
        if !self.check(TokenKind::Comma) {
            return Ok(first);
        }
        let mut items = vec![first];
        while self.match_token(TokenKind::Comma)? {
            items.push(self.parse_assignment()?);
        }
        let span = items[0].span.merge(&self.previous.span);
        Ok(Expr::new(ExprKind::Comma(items), span))
    }

    fn parse_assignment(&mut self) -> AnalysisResult<Expr> {
        let lhs = self.parse_conditional()?;
        let op = match assign_op(self.current.kind) {
            Some(op) => op,
            None => return Ok(lhs),
        };
        self.advance()?;
        let rhs = self.parse_assignment()?;
        let span = lhs.span.merge(&rhs.span);
        Ok(Expr::new(
            ExprKind::Assign {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span,
        ))
    }

    fn parse_conditional(&mut self) -> AnalysisResult<Expr> {
        let cond = self.parse_binary(0)?;
        if !self.match_token(TokenKind::Question)? {
            return Ok(cond);
        }
        let then_expr = self.parse_expression()?;
        self.consume(TokenKind::Colon, "Expected ':' in conditional expression")?;
        let else_expr = self.parse_conditional()?;
        let span = cond.span.merge(&else_expr.span);
        Ok(Expr::new(
            ExprKind::Conditional {
                cond: Box::new(cond),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            span,
        ))
    }

    /// Left-associative binary operators at `level` and tighter.
    fn parse_binary(&mut self, level: usize) -> AnalysisResult<Expr> {
        if level == BINARY_LEVELS {
            return self.parse_unary();
        }
        let mut lhs = self.parse_binary(level + 1)?;
        while let Some(op) = binary_op(level, self.current.kind) {
            self.advance()?;
            let rhs = self.parse_binary(level + 1)?;
            let span = lhs.span.merge(&rhs.span);
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                span,
            );
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> AnalysisResult<Expr> {
        let start = self.current.span;
        let op = match self.current.kind {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Plus),
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Amp => Some(UnaryOp::AddrOf),
            TokenKind::Star => Some(UnaryOp::Deref),
            TokenKind::PlusPlus => Some(UnaryOp::PreInc),
            TokenKind::MinusMinus => Some(UnaryOp::PreDec),
            _ => None,
        };
        if let Some(op) = op {
            self.advance()?;
            let operand = self.parse_unary()?;
            let span = start.merge(&operand.span);
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            ));
        }

        if self.check(TokenKind::Sizeof) {
            self.advance()?;
            if self.check(TokenKind::LeftParen) && self.peek_is_type_start()? {
                self.advance()?;
                self.parse_type_name()?;
                self.consume(TokenKind::RightParen, "Expected ')' after type name")?;
                return Ok(Expr::new(ExprKind::SizeOf(None), start.merge(&self.previous.span)));
            }
            let operand = self.parse_unary()?;
            let span = start.merge(&operand.span);
            return Ok(Expr::new(ExprKind::SizeOf(Some(Box::new(operand))), span));
        }

        if self.check(TokenKind::LeftParen) && self.peek_is_type_start()? {
            self.advance()?;
            let ty = self.parse_type_name()?;
            self.consume(TokenKind::RightParen, "Expected ')' after cast type")?;
            let expr = self.parse_unary()?;
            let span = start.merge(&expr.span);
            return Ok(Expr::new(ExprKind::Cast { ty, expr: Box::new(expr) }, span));
        }

        self.parse_postfix()
    }

    fn parse_type_name(&mut self) -> AnalysisResult<String> {
        let mut ty = self.parse_specifiers()?;
        while self.match_token(TokenKind::Star)? {
            ty.push('*');
        }
        Ok(ty)
    }

    fn parse_postfix(&mut self) -> AnalysisResult<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.current.kind {
                TokenKind::LeftBracket => {
                    self.advance()?;
                    let index = self.parse_expression()?;
                    self.consume(TokenKind::RightBracket, "Expected ']'")?;
                    let span = expr.span.merge(&self.previous.span);
                    expr = Expr::new(
                        ExprKind::Subscript {
                            base: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                TokenKind::LeftParen => {
                    self.advance()?;
                    let args = self.parse_args()?;
                    self.consume(TokenKind::RightParen, "Expected ')' after arguments")?;
                    let span = expr.span.merge(&self.previous.span);
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            args,
                        },
                        span,
                    );
                }
                TokenKind::Dot | TokenKind::Arrow => {
                    let arrow = self.check(TokenKind::Arrow);
                    self.advance()?;
                    let name = self.consume_identifier("Expected member name")?;
                    let field = self.scopes.field(&mut self.symbols, &name);
                    let span = expr.span.merge(&self.previous.span);
                    expr = Expr::new(
                        ExprKind::Field {
                            owner: Box::new(expr),
                            field,
                            arrow,
                        },
                        span,
                    );
                }
                TokenKind::PlusPlus | TokenKind::MinusMinus => {
                    let op = if self.check(TokenKind::PlusPlus) {
                        UnaryOp::PostInc
                    } else {
                        UnaryOp::PostDec
                    };
                    self.advance()?;
                    let span = expr.span.merge(&self.previous.span);
                    expr = Expr::new(
                        ExprKind::Unary {
                            op,
                            operand: Box::new(expr),
                        },
                        span,
                    );
                }
                _ => break,
            }
        }
        if let Some((array, rank)) = subscript_chain(&expr) {
            self.symbols.refine_implicit(array, SymbolKind::Array { rank });
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> AnalysisResult<Expr> {
        let start = self.current.span;
        match self.current.kind {
            TokenKind::Integer => {
                let value = parse_integer(&self.current.lexeme)
                    .ok_or_else(|| self.error(ParseErrorKind::ExpectedExpression, "Invalid integer literal"))?;
                self.advance()?;
                Ok(Expr::int_lit(value, start))
            }
            TokenKind::Float => {
                let text = self.current.lexeme.trim_end_matches(['f', 'F', 'l', 'L']);
                let value: f64 = text
                    .parse()
                    .map_err(|_| self.error(ParseErrorKind::ExpectedExpression, "Invalid float literal"))?;
                self.advance()?;
                Ok(Expr::new(ExprKind::FloatLit(value), start))
            }
            TokenKind::Char => {
                let text = strip_quotes(&self.current.lexeme);
                self.advance()?;
                Ok(Expr::new(ExprKind::CharLit(text), start))
            }
            TokenKind::String => {
                let mut text = strip_quotes(&self.current.lexeme);
                self.advance()?;
                while self.check(TokenKind::String) {
                    text.push_str(&strip_quotes(&self.current.lexeme));
                    self.advance()?;
                }
                Ok(Expr::new(ExprKind::StrLit(text), start.merge(&self.previous.span)))
            }
            TokenKind::Identifier => {
                let name = self.current.lexeme.clone();
                let implicit = if self.peek()?.kind == TokenKind::LeftParen {
                    SymbolKind::Function
                } else {
                    SymbolKind::Implicit
                };
                self.advance()?;
                let symbol = self.scopes.resolve(&mut self.symbols, &name, implicit);
                Ok(Expr::ident(symbol, start))
            }
            TokenKind::LeftParen => {
                self.advance()?;
                let mut inner = self.parse_expression()?;
                self.consume(TokenKind::RightParen, "Expected ')'")?;
                inner.span = start.merge(&self.previous.span);
                Ok(inner)
            }
            _ => Err(self.error(ParseErrorKind::ExpectedExpression, "Expected expression")),
        }
    }

    fn parse_args(&mut self) -> AnalysisResult<Vec<Expr>> {
        let mut args = Vec::new();
        if !self.check(TokenKind::RightParen) {
            loop {
                args.push(self.parse_assignment()?);
                if !self.match_token(TokenKind::Comma)? {
                    break;
                }
            }
        }
        Ok(args)
    }

    // Helper methods

    fn check(&self, kind: TokenKind) -> bool {
        self.current.kind == kind
    }

    fn is_at_end(&self) -> bool {
        self.current.kind == TokenKind::Eof
    }

    fn advance(&mut self) -> AnalysisResult<()> {
        let next = match self.peeked.take() {
            Some(token) => token,
            None => self.lexer.next_token()?,
        };
        self.previous = std::mem::replace(&mut self.current, next);
        Ok(())
    }

    fn peek(&mut self) -> AnalysisResult<&Token> {
        if self.peeked.is_none() {
            self.peeked = Some(self.lexer.next_token()?);
        }
        Ok(self.peeked.as_ref().unwrap_or(&self.current))
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> AnalysisResult<()> {
        if self.check(kind) {
            self.advance()
        } else {
            Err(self.error(ParseErrorKind::ExpectedToken, message))
        }
    }

    fn consume_identifier(&mut self, message: &str) -> AnalysisResult<String> {
        if self.check(TokenKind::Identifier) {
            let name = self.current.lexeme.clone();
            self.advance()?;
            Ok(name)
        } else {
            Err(self.error(ParseErrorKind::ExpectedIdentifier, message))
        }
    }

    fn match_token(&mut self, kind: TokenKind) -> AnalysisResult<bool> {
        if self.check(kind) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn is_type_token(&self, token: &Token) -> bool {
        token.kind.is_type_keyword()
            || (token.kind == TokenKind::Identifier
                && TYPEDEF_NAMES.contains(&token.lexeme.as_str())
                && self.scopes.lookup(&token.lexeme).is_none())
    }

    fn is_type_start(&mut self) -> AnalysisResult<bool> {
        Ok(self.is_type_token(&self.current))
    }

    fn peek_is_type_start(&mut self) -> AnalysisResult<bool> {
        let token = self.peek()?.clone();
        Ok(self.is_type_token(&token))
    }

    fn error(&self, kind: ParseErrorKind, message: &str) -> AnalysisError {
        let kind = if self.is_at_end() {
            ParseErrorKind::UnexpectedEof
        } else {
            kind
        };
        AnalysisError::Parse(ParseError {
            message: message.to_string(),
            span: self.current.span,
            kind,
            found: Some(self.current.kind.name().to_string()),
        })
    }
}

enum External {
    Function(Function),
    Global(Stmt),
}

fn declared_kind(pointer: bool, rank: usize) -> SymbolKind {
    if rank > 0 {
        SymbolKind::Array { rank }
    } else if pointer {
        SymbolKind::Pointer
    } else {
        SymbolKind::Scalar
    }
}

/// Number of precedence levels handled by `parse_binary`.
const BINARY_LEVELS: usize = 10;

fn binary_op(level: usize, kind: TokenKind) -> Option<BinaryOp> {
    use TokenKind::*;
    let op = match (level, kind) {
        (0, PipePipe) => BinaryOp::Or,
        (1, AmpAmp) => BinaryOp::And,
        (2, Pipe) => BinaryOp::BitOr,
        (3, Caret) => BinaryOp::BitXor,
        (4, Amp) => BinaryOp::BitAnd,
        (5, EqualEqual) => BinaryOp::Eq,
        (5, BangEqual) => BinaryOp::Ne,
        (6, Less) => BinaryOp::Lt,
        (6, LessEqual) => BinaryOp::Le,
        (6, Greater) => BinaryOp::Gt,
        (6, GreaterEqual) => BinaryOp::Ge,
        (7, LessLess) => BinaryOp::Shl,
        (7, GreaterGreater) => BinaryOp::Shr,
        (8, Plus) => BinaryOp::Add,
        (8, Minus) => BinaryOp::Sub,
        (9, Star) => BinaryOp::Mul,
        (9, Slash) => BinaryOp::Div,
        (9, Percent) => BinaryOp::Mod,
        _ => return None,
    };
    Some(op)
}

fn assign_op(kind: TokenKind) -> Option<AssignOp> {
    use TokenKind::*;
    let op = match kind {
        Equal => return Some(AssignOp::Assign),
        PlusEqual => BinaryOp::Add,
        MinusEqual => BinaryOp::Sub,
        StarEqual => BinaryOp::Mul,
        SlashEqual => BinaryOp::Div,
        PercentEqual => BinaryOp::Mod,
        AmpEqual => BinaryOp::BitAnd,
        PipeEqual => BinaryOp::BitOr,
        CaretEqual => BinaryOp::BitXor,
        LessLessEqual => BinaryOp::Shl,
        GreaterGreaterEqual => BinaryOp::Shr,
        _ => return None,
    };
    Some(AssignOp::Compound(op))
}

/// `a[i][j]` gives `(a, 2)`.
fn subscript_chain(expr: &Expr) -> Option<(SymbolId, usize)> {
    let mut rank = 0;
    let mut cur = expr;
    while let ExprKind::Subscript { base, .. } = &cur.kind {
        rank += 1;
        cur = base;
    }
    match cur.kind {
        ExprKind::Ident(id) if rank > 0 => Some((id, rank)),
        _ => None,
    }
}

fn parse_integer(lexeme: &str) -> Option<i64> {
    let digits = lexeme.trim_end_matches(['u', 'U', 'l', 'L']);
    if let Some(hex) = digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).ok()
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8).ok()
    } else {
        digits.parse().ok()
    }
}

fn strip_quotes(lexeme: &str) -> String {
    lexeme
        .get(1..lexeme.len().saturating_sub(1))
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> AnalysisResult<TranslationUnit> {
        Parser::new(Lexer::new(source))?.parse_translation_unit()
    }

    fn first_stmt(unit: &TranslationUnit) -> &Stmt {
        &unit.functions[0].statements()[0]
    }

    #[test]
    fn test_empty_function() {
        let unit = parse("void test(void) {}").unwrap();
        assert_eq!(unit.functions.len(), 1);
        assert_eq!(unit.functions[0].name, "test");
        assert!(unit.functions[0].params.is_empty());
    }

    #[test]
    fn test_array_params() {
        let unit = parse("void f(int n, double a[][100], float *p) {}").unwrap();
        let params = &unit.functions[0].params;
        assert_eq!(params.len(), 3);
        assert_eq!(unit.symbols.rank(params[1].symbol), Some(2));
        assert_eq!(unit.symbols.kind(params[2].symbol), SymbolKind::Pointer);
    }

    #[test]
    fn test_for_loop_ids_are_preorder() {
        let unit = parse("void f(int n) { for (int i = 0; i < n; i++) for (int j = 0; j < n; j++) ; for (;;) ; }")
            .unwrap();
        let stmts = unit.functions[0].statements();
        let outer = stmts[0].as_for().unwrap();
        assert_eq!(outer.id, LoopId(0));
        assert_eq!(outer.body.as_for().unwrap().id, LoopId(1));
        assert_eq!(stmts[1].as_for().unwrap().id, LoopId(2));
        assert!(stmts[1].as_for().unwrap().cond.is_none());
    }

    #[test]
    fn test_shadowed_declarations_resolve_separately() {
        let unit = parse("void f() { int x = 1; { int x = 2; x++; } x--; }").unwrap();
        let xs = unit.symbols.lookup_all("x");
        assert_eq!(xs.len(), 2);
        let stmts = unit.functions[0].statements();
        let inner_use = match &stmts[1].statements()[1].kind {
            StmtKind::Expr(Expr { kind: ExprKind::Unary { operand, .. }, .. }) => operand.as_ident(),
            _ => None,
        };
        assert_eq!(inner_use, Some(xs[1]));
        let outer_use = match &stmts[2].kind {
            StmtKind::Expr(Expr { kind: ExprKind::Unary { operand, .. }, .. }) => operand.as_ident(),
            _ => None,
        };
        assert_eq!(outer_use, Some(xs[0]));
    }

    #[test]
    fn test_implicit_array_rank() {
        let unit = parse("void f() { b[1][2] = 0; }").unwrap();
        let b = unit.symbols.lookup("b").unwrap();
        assert_eq!(unit.symbols.rank(b), Some(2));
    }

    #[test]
    fn test_pragma_attaches_to_next_statement() {
        let unit = parse("void f(int n, int *a) {\n#pragma acc parallel loop\nfor (int i = 0; i < n; i++) a[i] = 0;\n}")
            .unwrap();
        assert_eq!(first_stmt(&unit).pragmas, vec!["pragma acc parallel loop".to_string()]);
    }

    #[test]
    fn test_storage_class() {
        let unit = parse("extern int g; void f() { static const int c = 0, d; int e; }").unwrap();
        let storage = |stmt: &Stmt| match &stmt.kind {
            StmtKind::Decl(decls) => decls.iter().map(|d| d.storage).collect::<Vec<_>>(),
            _ => Vec::new(),
        };
        assert_eq!(storage(&unit.globals[0]), vec![StorageClass::Extern]);
        let stmts = unit.functions[0].statements();
        assert_eq!(storage(&stmts[0]), vec![StorageClass::Static, StorageClass::Static]);
        assert_eq!(storage(&stmts[1]), vec![StorageClass::Auto]);
    }

    #[test]
    fn test_precedence() {
        let unit = parse("void f() { x = 1 + 2 * 3 << 1; }").unwrap();
        let rhs = match &first_stmt(&unit).kind {
            StmtKind::Expr(Expr { kind: ExprKind::Assign { rhs, .. }, .. }) => rhs,
            _ => panic!("expected assignment"),
        };
        assert!(matches!(rhs.kind, ExprKind::Binary { op: BinaryOp::Shl, .. }));
    }

    #[test]
    fn test_all_statement_forms_parse() {
        let source = r#"
            struct point { int x; int y; };
            int total(int n, struct point *p) {
                int s = 0;
                while (n > 0) { n--; }
                do { s += 1; } while (s < 10);
                switch (s) { case 1: s = 2; break; default: break; }
                if (s) goto done; else s = (int) 3.5 + sizeof(int) + sizeof s;
            done:
                p->x = p[0].y ? s : -s;
                return s, n;
            }
        "#;
        let unit = parse(source).unwrap();
        assert_eq!(unit.functions.len(), 1);
        assert_eq!(unit.functions[0].statements().len(), 7);
    }

    #[test]
    fn test_integer_literals() {
        assert_eq!(parse_integer("0x1F"), Some(31));
        assert_eq!(parse_integer("010"), Some(8));
        assert_eq!(parse_integer("42UL"), Some(42));
        assert_eq!(parse_integer("0"), Some(0));
    }

    #[test]
    fn test_syntax_error_reports_location() {
        let err = parse("void f() { x = ; }").unwrap_err();
        match err {
            AnalysisError::Parse(e) => {
                assert_eq!(e.kind, ParseErrorKind::ExpectedExpression);
                assert_eq!(e.span.start_line, 1);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
