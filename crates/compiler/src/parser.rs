//! Recursive-descent parser: token stream to [`Program`].
//!
//! One token of lookahead for almost everything; lambda-vs-grouped-expr and
//! construction-vs-block disambiguation use bounded backtracking (save/
//! restore the cursor) rather than a separate lookahead buffer. Parse
//! failures never abort the whole program: `synchronize()` discards tokens
//! until a safe restart point and the caller gets a best-effort `Program`
//! plus whatever diagnostics were reported.

use std::rc::Rc;

use crate::ast::*;
use crate::diagnostics::{codes, Diagnostic, Diagnostics};
use crate::lexing::{Lexer, Token, TokenKind};
use crate::source::Span;

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    diagnostics: &'a mut Diagnostics,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: Vec<Token>, diagnostics: &'a mut Diagnostics) -> Self {
        Parser {
            tokens,
            pos: 0,
            diagnostics,
        }
    }

    /// Tokenize `source` and parse it in one step, reporting into the same
    /// diagnostics engine the lexer uses.
    pub fn parse_source(source: &str, file: Rc<str>, diagnostics: &'a mut Diagnostics) -> Program {
        let tokens = Lexer::new(source, file, diagnostics).tokenize();
        let mut parser = Parser::new(tokens, diagnostics);
        parser.parse_program()
    }

    pub fn parse_program(&mut self) -> Program {
        let mut program = Program::new();
        while !self.is_at_end() {
            self.skip_comments();
            if self.is_at_end() {
                break;
            }
            match self.parse_declaration_stmt() {
                Some(stmt) => program.declarations.push(stmt),
                None => self.synchronize(),
            }
        }
        program
    }

    // -------------------------------------------------------------
    // Token stream helpers
    // -------------------------------------------------------------

    fn skip_comments(&mut self) {
        while matches!(
            self.peek_kind(),
            TokenKind::LineComment | TokenKind::BlockComment | TokenKind::DocComment
        ) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or_else(|| self.tokens.last().unwrap())
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn peek_at(&self, offset: usize) -> TokenKind {
        let mut idx = self.pos;
        let mut skipped = 0;
        loop {
            let tok = self.tokens.get(idx).map(|t| t.kind).unwrap_or(TokenKind::EndOfFile);
            if matches!(
                tok,
                TokenKind::LineComment | TokenKind::BlockComment | TokenKind::DocComment
            ) {
                idx += 1;
                continue;
            }
            if skipped == offset {
                return tok;
            }
            skipped += 1;
            idx += 1;
        }
    }

    fn is_at_end(&self) -> bool {
        self.peek_kind() == TokenKind::EndOfFile
    }

    fn check(&mut self, kind: TokenKind) -> bool {
        self.skip_comments();
        self.peek_kind() == kind
    }

    fn advance(&mut self) -> Token {
        self.skip_comments();
        let tok = self.tokens.get(self.pos).cloned().unwrap_or_else(|| self.tokens.last().unwrap().clone());
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn match_kind(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            let tok = self.peek().clone();
            self.diagnostics.report(Diagnostic::error(
                codes::EXPECTED_TOKEN,
                format!("expected {}, found {:?} `{}`", what, tok.kind, tok.text),
                tok.span.clone(),
            ));
            None
        }
    }

    fn save(&self) -> usize {
        self.pos
    }

    fn restore(&mut self, mark: usize) {
        self.pos = mark;
    }

    /// Skip tokens until a safe restart point: the next `;`, a declaration
    /// keyword, or a brace boundary. Never gets stuck — always advances at
    /// least once.
    fn synchronize(&mut self) {
        if self.is_at_end() {
            return;
        }
        self.advance();
        while !self.is_at_end() {
            if matches!(self.peek_kind(), TokenKind::Semicolon) {
                self.advance();
                return;
            }
            if matches!(
                self.peek_kind(),
                TokenKind::KwFunc
                    | TokenKind::KwVar
                    | TokenKind::KwLet
                    | TokenKind::KwIf
                    | TokenKind::KwWhile
                    | TokenKind::KwFor
                    | TokenKind::KwReturn
                    | TokenKind::KwImport
                    | TokenKind::KwClass
                    | TokenKind::KwInterface
                    | TokenKind::KwEnum
                    | TokenKind::RightBrace
            ) {
                return;
            }
            self.advance();
        }
    }

    // -------------------------------------------------------------
    // Declarations
    // -------------------------------------------------------------

    /// Consume zero or more `@Name[(args, …)]` annotations preceding a
    /// declaration. Parsed for source compatibility but not retained: no
    /// AST node carries them since nothing downstream consumes them yet.
    fn skip_annotations(&mut self) {
        while self.check(TokenKind::At) {
            self.advance();
            self.expect(TokenKind::Identifier, "annotation name");
            if self.check(TokenKind::LeftParen) {
                self.advance();
                let mut depth = 1;
                while depth > 0 && !self.is_at_end() {
                    match self.peek_kind() {
                        TokenKind::LeftParen => depth += 1,
                        TokenKind::RightParen => depth -= 1,
                        _ => {}
                    }
                    self.advance();
                }
            }
        }
    }

    fn parse_access_modifier(&mut self) -> AccessModifier {
        match self.peek_kind() {
            TokenKind::KwPublic => {
                self.advance();
                AccessModifier::Public
            }
            TokenKind::KwPrivate => {
                self.advance();
                AccessModifier::Private
            }
            TokenKind::KwProtected => {
                self.advance();
                AccessModifier::Protected
            }
            _ => AccessModifier::Private,
        }
    }

    fn parse_declaration_stmt(&mut self) -> Option<Stmt> {
        self.skip_annotations();
        match self.peek_kind() {
            TokenKind::KwImport => self.parse_import(),
            TokenKind::KwClass => self.parse_class(),
            TokenKind::KwInterface => self.parse_interface(),
            TokenKind::KwEnum => self.parse_enum(),
            TokenKind::KwExtern => self.parse_extern_func(),
            TokenKind::KwPublic | TokenKind::KwPrivate | TokenKind::KwProtected => {
                let mark = self.save();
                let access = self.parse_access_modifier();
                if self.check(TokenKind::KwClass) {
                    return self.parse_class_with_access(access);
                }
                self.restore(mark);
                self.parse_statement()
            }
            TokenKind::KwAsync | TokenKind::KwFunc | TokenKind::KwOperator => self.parse_func(),
            TokenKind::KwShared => self.parse_class(),
            _ => self.parse_statement(),
        }
    }

    fn parse_import(&mut self) -> Option<Stmt> {
        let span = self.advance().span; // 'import'
        let path_tok = self.expect(TokenKind::StringLiteral, "a string path after 'import'")?;
        self.match_kind(TokenKind::Semicolon);
        Some(Stmt::new(
            StmtKind::Import(ImportDecl {
                path: path_tok.text,
                span: path_tok.span,
            }),
            span,
        ))
    }

    fn parse_class(&mut self) -> Option<Stmt> {
        self.parse_class_with_access(AccessModifier::Private)
    }

    fn parse_class_with_access(&mut self, access: AccessModifier) -> Option<Stmt> {
        let is_shared = self.match_kind(TokenKind::KwShared).is_some();
        let span = self.expect(TokenKind::KwClass, "'class'")?.span;
        let name = self.expect(TokenKind::Identifier, "a class name")?.text;

        let mut type_params = Vec::new();
        if self.match_kind(TokenKind::Less).is_some() {
            loop {
                let param = self.expect(TokenKind::Identifier, "a type parameter name");
                if let Some(p) = param {
                    type_params.push(p.text);
                }
                if self.match_kind(TokenKind::Comma).is_none() {
                    break;
                }
            }
            self.expect(TokenKind::Greater, "'>' closing type parameter list");
        }

        let mut base_class = None;
        let mut interfaces = Vec::new();
        if self.match_kind(TokenKind::Colon).is_some() {
            loop {
                let name_tok = self.expect(TokenKind::Identifier, "a base class or interface name");
                if let Some(t) = name_tok {
                    if base_class.is_none() {
                        base_class = Some(t.text);
                    } else {
                        interfaces.push(t.text);
                    }
                }
                if self.match_kind(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }

        self.expect(TokenKind::LeftBrace, "'{' starting class body")?;

        let mut fields = Vec::new();
        let mut methods = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            self.skip_annotations();
            let member_access = self.parse_access_modifier();
            match self.peek_kind() {
                TokenKind::KwVar | TokenKind::KwLet => {
                    if let Some(Stmt {
                        kind: StmtKind::VarDecl(mut decl),
                        ..
                    }) = self.parse_var_decl()
                    {
                        decl.access = member_access;
                        fields.push(decl);
                    }
                }
                TokenKind::KwAsync | TokenKind::KwFunc | TokenKind::KwOperator => {
                    if let Some(Stmt {
                        kind: StmtKind::FuncDecl(mut func),
                        ..
                    }) = self.parse_func()
                    {
                        func.access = member_access;
                        methods.push(Rc::new(func));
                    }
                }
                _ => {
                    self.diagnostics.report(Diagnostic::error(
                        codes::EXPECTED_TOKEN,
                        "expected a field or method inside class body",
                        self.peek().span.clone(),
                    ));
                    self.synchronize();
                }
            }
        }
        self.expect(TokenKind::RightBrace, "'}' closing class body");

        Some(Stmt::new(
            StmtKind::ClassDecl(ClassDecl {
                name,
                is_public: access == AccessModifier::Public,
                is_shared,
                type_params,
                base_class,
                interfaces,
                fields,
                methods,
                span: span.clone(),
            }),
            span,
        ))
    }

    fn parse_interface(&mut self) -> Option<Stmt> {
        let span = self.advance().span; // 'interface'
        let name = self.expect(TokenKind::Identifier, "an interface name")?.text;
        self.expect(TokenKind::LeftBrace, "'{' starting interface body")?;

        let mut methods = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            if let Some(Stmt {
                kind: StmtKind::FuncDecl(func),
                ..
            }) = self.parse_func()
            {
                methods.push(func);
            } else {
                self.synchronize();
            }
        }
        self.expect(TokenKind::RightBrace, "'}' closing interface body");

        Some(Stmt::new(
            StmtKind::InterfaceDecl(InterfaceDecl {
                name,
                methods,
                span: span.clone(),
            }),
            span,
        ))
    }

    fn parse_enum(&mut self) -> Option<Stmt> {
        let span = self.advance().span; // 'enum'
        let name = self.expect(TokenKind::Identifier, "an enum name")?.text;
        self.expect(TokenKind::LeftBrace, "'{' starting enum body")?;

        let mut variants = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            let variant_name = self.expect(TokenKind::Identifier, "an enum variant name");
            let Some(variant_name) = variant_name else {
                self.synchronize();
                continue;
            };
            let associated_type = if self.match_kind(TokenKind::LeftParen).is_some() {
                let ty = self.parse_type_expr();
                self.expect(TokenKind::RightParen, "')' closing variant payload type");
                ty
            } else {
                None
            };
            variants.push(EnumVariant {
                name: variant_name.text,
                associated_type,
            });
            if self.match_kind(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RightBrace, "'}' closing enum body");

        Some(Stmt::new(
            StmtKind::EnumDecl(EnumDecl {
                name,
                variants,
                span: span.clone(),
            }),
            span,
        ))
    }

    fn parse_extern_func(&mut self) -> Option<Stmt> {
        let span = self.advance().span; // 'extern'
        self.expect(TokenKind::KwFunc, "'func' after 'extern'")?;
        let name = self.expect(TokenKind::Identifier, "a function name")?.text;
        self.expect(TokenKind::LeftParen, "'(' starting parameter list")?;

        let mut parameters = Vec::new();
        let mut is_variadic = false;
        while !self.check(TokenKind::RightParen) && !self.is_at_end() {
            if self.match_kind(TokenKind::Ellipsis).is_some() {
                is_variadic = true;
                break;
            }
            if let Some(param) = self.parse_parameter() {
                parameters.push(param);
            }
            if self.match_kind(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RightParen, "')' closing parameter list");

        let return_type = if self.match_kind(TokenKind::Arrow).is_some() {
            self.parse_type_expr()
        } else {
            None
        };
        self.match_kind(TokenKind::Semicolon);

        Some(Stmt::new(
            StmtKind::ExternFuncDecl(ExternFuncDecl {
                name,
                parameters,
                return_type,
                is_variadic,
                span: span.clone(),
            }),
            span,
        ))
    }

    fn parse_parameter(&mut self) -> Option<Parameter> {
        let name_tok = self.expect(TokenKind::Identifier, "a parameter name")?;
        self.expect(TokenKind::Colon, "':' before a parameter type")?;
        let ty = self.parse_type_expr()?;
        Some(Parameter {
            name: name_tok.text,
            type_annotation: ty,
            span: name_tok.span,
        })
    }

    fn parse_func(&mut self) -> Option<Stmt> {
        let is_async = self.match_kind(TokenKind::KwAsync).is_some();
        let async_kind = if is_async {
            if self.match_kind(TokenKind::KwIo).is_some() {
                AsyncKind::Io
            } else if self.match_kind(TokenKind::KwCompute).is_some() {
                AsyncKind::Compute
            } else {
                AsyncKind::None
            }
        } else {
            AsyncKind::None
        };
        let is_operator = self.check(TokenKind::KwOperator);
        let span = if is_operator {
            self.advance().span
        } else {
            self.expect(TokenKind::KwFunc, "'func'")?.span
        };
        if is_operator {
            self.expect(TokenKind::KwFunc, "'func' after 'operator'");
        }

        let name = if is_operator {
            let tok = self.advance();
            tok.text
        } else {
            self.expect(TokenKind::Identifier, "a function name")?.text
        };

        self.expect(TokenKind::LeftParen, "'(' starting parameter list")?;
        let mut parameters = Vec::new();
        while !self.check(TokenKind::RightParen) && !self.is_at_end() {
            if let Some(param) = self.parse_parameter() {
                parameters.push(param);
            }
            if self.match_kind(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RightParen, "')' closing parameter list");

        let return_type = if self.match_kind(TokenKind::Arrow).is_some() {
            self.parse_type_expr()
        } else {
            None
        };

        let body = if self.check(TokenKind::LeftBrace) {
            self.parse_block()
        } else {
            self.match_kind(TokenKind::Semicolon);
            None
        };

        Some(Stmt::new(
            StmtKind::FuncDecl(FuncDecl {
                name,
                access: AccessModifier::Private,
                is_operator,
                is_async,
                async_kind,
                parameters,
                return_type,
                body,
                span: span.clone(),
            }),
            span,
        ))
    }

    // -------------------------------------------------------------
    // Type expressions
    // -------------------------------------------------------------

    fn parse_type_expr(&mut self) -> Option<TypeExpr> {
        let span = self.peek().span.clone();

        // `[T]` shorthand lowers to `Array<T>`.
        if self.check(TokenKind::LeftBracket) {
            self.advance();
            let elem = self.parse_type_expr()?;
            self.expect(TokenKind::RightBracket, "']' closing array type");
            return Some(TypeExpr {
                name: "Array".to_string(),
                nullable: self.match_kind(TokenKind::QuestionMark).is_some(),
                type_args: vec![elem],
                span,
            });
        }

        // Parenthesized parameter list followed by `->` is a function type.
        if self.check(TokenKind::LeftParen) {
            let mark = self.save();
            self.advance();
            let mut params = Vec::new();
            let mut ok = true;
            while !self.check(TokenKind::RightParen) && !self.is_at_end() {
                match self.parse_type_expr() {
                    Some(t) => params.push(t),
                    None => {
                        ok = false;
                        break;
                    }
                }
                if self.match_kind(TokenKind::Comma).is_none() {
                    break;
                }
            }
            if ok && self.check(TokenKind::RightParen) {
                self.advance();
                if self.match_kind(TokenKind::Arrow).is_some() {
                    if let Some(ret) = self.parse_type_expr() {
                        let mut type_args = params;
                        type_args.push(ret);
                        return Some(TypeExpr {
                            name: FUNC_TYPE_NAME.to_string(),
                            nullable: false,
                            type_args,
                            span,
                        });
                    }
                }
            }
            self.restore(mark);
        }

        let name_tok = self.expect(TokenKind::Identifier, "a type name")?;
        let mut type_args = Vec::new();
        if self.match_kind(TokenKind::Less).is_some() {
            loop {
                match self.parse_type_expr() {
                    Some(t) => type_args.push(t),
                    None => break,
                }
                if self.match_kind(TokenKind::Comma).is_none() {
                    break;
                }
            }
            self.expect(TokenKind::Greater, "'>' closing type argument list");
        }
        let nullable = self.match_kind(TokenKind::QuestionMark).is_some();
        Some(TypeExpr {
            name: name_tok.text,
            nullable,
            type_args,
            span: name_tok.span,
        })
    }

    // -------------------------------------------------------------
    // Statements
    // -------------------------------------------------------------

    fn parse_block(&mut self) -> Option<Block> {
        self.expect(TokenKind::LeftBrace, "'{'")?;
        let mut statements = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            match self.parse_statement() {
                Some(stmt) => statements.push(stmt),
                None => self.synchronize(),
            }
        }
        self.expect(TokenKind::RightBrace, "'}' closing block");
        Some(Block { statements })
    }

    fn parse_statement(&mut self) -> Option<Stmt> {
        self.skip_annotations();
        match self.peek_kind() {
            TokenKind::LeftBrace => {
                let span = self.peek().span.clone();
                let block = self.parse_block()?;
                Some(Stmt::new(StmtKind::Block(block), span))
            }
            TokenKind::KwVar | TokenKind::KwLet => self.parse_var_decl(),
            TokenKind::KwReturn => self.parse_return(),
            TokenKind::KwIf => self.parse_if(),
            TokenKind::KwWhile => self.parse_while(),
            TokenKind::KwFor => self.parse_for(),
            TokenKind::KwBreak => {
                let span = self.advance().span;
                self.match_kind(TokenKind::Semicolon);
                Some(Stmt::new(StmtKind::Break, span))
            }
            TokenKind::KwContinue => {
                let span = self.advance().span;
                self.match_kind(TokenKind::Semicolon);
                Some(Stmt::new(StmtKind::Continue, span))
            }
            TokenKind::KwThrow => {
                let span = self.advance().span;
                let expr = self.parse_expression()?;
                self.match_kind(TokenKind::Semicolon);
                Some(Stmt::new(StmtKind::Throw(expr), span))
            }
            TokenKind::KwTry => self.parse_try(),
            TokenKind::KwUnsafe => {
                let span = self.advance().span;
                let block = self.parse_block()?;
                Some(Stmt::new(StmtKind::Unsafe(block), span))
            }
            TokenKind::KwImport
            | TokenKind::KwClass
            | TokenKind::KwInterface
            | TokenKind::KwEnum
            | TokenKind::KwExtern
            | TokenKind::KwFunc
            | TokenKind::KwAsync
            | TokenKind::KwOperator
            | TokenKind::KwPublic
            | TokenKind::KwPrivate
            | TokenKind::KwProtected
            | TokenKind::KwShared => self.parse_declaration_stmt(),
            kind if reserved_but_unimplemented(kind) => {
                let tok = self.advance();
                self.diagnostics.report(Diagnostic::error(
                    codes::RESERVED_KEYWORD,
                    format!("'{}' is a reserved keyword with no statement form here", tok.text),
                    tok.span,
                ));
                None
            }
            _ => self.parse_expr_stmt(),
        }
    }

    fn parse_var_decl(&mut self) -> Option<Stmt> {
        let span = self.peek().span.clone();
        let is_mutable = self.advance().is(TokenKind::KwVar);
        let name = self.expect(TokenKind::Identifier, "a variable name")?.text;
        let type_annotation = if self.match_kind(TokenKind::Colon).is_some() {
            self.parse_type_expr()
        } else {
            None
        };
        let initializer = if self.match_kind(TokenKind::Assign).is_some() {
            self.parse_expression()
        } else {
            None
        };
        self.match_kind(TokenKind::Semicolon);
        Some(Stmt::new(
            StmtKind::VarDecl(VarDecl {
                name,
                is_mutable,
                type_annotation,
                initializer,
                access: AccessModifier::Private,
            }),
            span,
        ))
    }

    fn parse_return(&mut self) -> Option<Stmt> {
        let span = self.advance().span;
        let value = if self.check(TokenKind::Semicolon) || self.check(TokenKind::RightBrace) {
            None
        } else {
            self.parse_expression()
        };
        self.match_kind(TokenKind::Semicolon);
        Some(Stmt::new(StmtKind::Return(value), span))
    }

    fn parse_if(&mut self) -> Option<Stmt> {
        let span = self.advance().span; // 'if'
        let condition = self.parse_expression()?;
        let then_block = self.parse_block()?;
        let else_block = if self.match_kind(TokenKind::KwElse).is_some() {
            if self.check(TokenKind::KwIf) {
                self.parse_if().map(Box::new)
            } else {
                let else_span = self.peek().span.clone();
                self.parse_block().map(|b| Box::new(Stmt::new(StmtKind::Block(b), else_span)))
            }
        } else {
            None
        };
        Some(Stmt::new(
            StmtKind::If {
                condition,
                then_block,
                else_block,
            },
            span,
        ))
    }

    fn parse_while(&mut self) -> Option<Stmt> {
        let span = self.advance().span;
        let condition = self.parse_expression()?;
        let body = self.parse_block()?;
        Some(Stmt::new(StmtKind::While { condition, body }, span))
    }

    fn parse_for(&mut self) -> Option<Stmt> {
        let span = self.advance().span;
        let variable = self.expect(TokenKind::Identifier, "a loop variable name")?.text;
        self.expect(TokenKind::KwIn, "'in'")?;
        let iterable = self.parse_expression()?;
        let body = self.parse_block()?;
        Some(Stmt::new(
            StmtKind::For {
                variable,
                iterable,
                body,
            },
            span,
        ))
    }

    fn parse_try(&mut self) -> Option<Stmt> {
        let span = self.advance().span;
        let try_block = self.parse_block()?;
        let mut catch_clauses = Vec::new();
        while self.check(TokenKind::KwCatch) {
            self.advance();
            self.expect(TokenKind::LeftParen, "'(' starting catch clause")?;
            let var_name = self.expect(TokenKind::Identifier, "a catch variable name")?.text;
            self.expect(TokenKind::Colon, "':' before the caught type")?;
            let type_name = self.expect(TokenKind::Identifier, "an exception type name")?.text;
            self.expect(TokenKind::RightParen, "')' closing catch clause")?;
            let body = self.parse_block()?;
            catch_clauses.push(CatchClause {
                var_name,
                type_name,
                body,
            });
        }
        let finally_block = if self.match_kind(TokenKind::KwFinally).is_some() {
            self.parse_block()
        } else {
            None
        };
        Some(Stmt::new(
            StmtKind::TryCatch {
                try_block,
                catch_clauses,
                finally_block,
            },
            span,
        ))
    }

    fn parse_expr_stmt(&mut self) -> Option<Stmt> {
        let span = self.peek().span.clone();
        let expr = self.parse_expression()?;
        self.match_kind(TokenKind::Semicolon);
        Some(Stmt::new(StmtKind::Expr(expr), span))
    }

    // -------------------------------------------------------------
    // Expressions — precedence climbing, lowest to highest:
    // assignment, range, nil-coalesce, or, and, equality, comparison,
    // additive, multiplicative, unary, postfix, primary.
    // -------------------------------------------------------------

    fn parse_expression(&mut self) -> Option<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Option<Expr> {
        let target = self.parse_range()?;
        let span = target.span.clone();

        let compound_op = match self.peek_kind() {
            TokenKind::Assign => None,
            TokenKind::PlusAssign => Some("+"),
            TokenKind::MinusAssign => Some("-"),
            TokenKind::StarAssign => Some("*"),
            TokenKind::SlashAssign => Some("/"),
            TokenKind::PercentAssign => Some("%"),
            _ => return Some(target),
        };

        if self.peek_kind() == TokenKind::Assign {
            self.advance();
            let value = self.parse_assignment()?;
            return Some(Expr::new(
                ExprKind::Assign {
                    target: Box::new(target),
                    value: Box::new(value),
                },
                span,
            ));
        }

        if let Some(op) = compound_op {
            self.advance();
            let rhs = self.parse_assignment()?;
            let desugared = Expr::new(
                ExprKind::Binary {
                    op: op.to_string(),
                    left: Box::new(target.clone()),
                    right: Box::new(rhs),
                },
                span.clone(),
            );
            return Some(Expr::new(
                ExprKind::Assign {
                    target: Box::new(target),
                    value: Box::new(desugared),
                },
                span,
            ));
        }

        Some(target)
    }

    fn parse_range(&mut self) -> Option<Expr> {
        let start = self.parse_nil_coalesce()?;
        if self.match_kind(TokenKind::DotDot).is_some() {
            let span = start.span.clone();
            let end = self.parse_nil_coalesce()?;
            return Some(Expr::new(
                ExprKind::Range {
                    start: Box::new(start),
                    end: Box::new(end),
                },
                span,
            ));
        }
        Some(start)
    }

    fn parse_nil_coalesce(&mut self) -> Option<Expr> {
        let value = self.parse_or()?;
        if self.match_kind(TokenKind::DoubleQuestion).is_some() {
            let span = value.span.clone();
            let default_value = self.parse_nil_coalesce()?;
            return Some(Expr::new(
                ExprKind::NilCoalesce {
                    value: Box::new(value),
                    default_value: Box::new(default_value),
                },
                span,
            ));
        }
        Some(value)
    }

    fn parse_or(&mut self) -> Option<Expr> {
        let mut left = self.parse_and()?;
        while self.check(TokenKind::Or) {
            let span = left.span.clone();
            self.advance();
            let right = self.parse_and()?;
            left = Expr::new(
                ExprKind::Binary {
                    op: "||".to_string(),
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        Some(left)
    }

    fn parse_and(&mut self) -> Option<Expr> {
        let mut left = self.parse_equality()?;
        while self.check(TokenKind::And) {
            let span = left.span.clone();
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::new(
                ExprKind::Binary {
                    op: "&&".to_string(),
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        Some(left)
    }

    fn parse_equality(&mut self) -> Option<Expr> {
        let mut left = self.parse_comparison()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Equal => "==",
                TokenKind::NotEqual => "!=",
                _ => break,
            };
            let span = left.span.clone();
            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::new(
                ExprKind::Binary {
                    op: op.to_string(),
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        Some(left)
    }

    fn parse_comparison(&mut self) -> Option<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Less => "<",
                TokenKind::Greater => ">",
                TokenKind::LessEqual => "<=",
                TokenKind::GreaterEqual => ">=",
                _ => break,
            };
            let span = left.span.clone();
            self.advance();
            let right = self.parse_additive()?;
            left = Expr::new(
                ExprKind::Binary {
                    op: op.to_string(),
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        Some(left)
    }

    fn parse_additive(&mut self) -> Option<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => "+",
                TokenKind::Minus => "-",
                _ => break,
            };
            let span = left.span.clone();
            self.advance();
            let right = self.parse_multiplicative()?;
            left = Expr::new(
                ExprKind::Binary {
                    op: op.to_string(),
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        Some(left)
    }

    fn parse_multiplicative(&mut self) -> Option<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => "*",
                TokenKind::Slash => "/",
                TokenKind::Percent => "%",
                _ => break,
            };
            let span = left.span.clone();
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::new(
                ExprKind::Binary {
                    op: op.to_string(),
                    left: Box::new(left),
                    right: Box::new(right),
                },
                span,
            );
        }
        Some(left)
    }

    fn parse_unary(&mut self) -> Option<Expr> {
        match self.peek_kind() {
            TokenKind::Minus => {
                let span = self.advance().span;
                let operand = self.parse_unary()?;
                Some(Expr::new(
                    ExprKind::Unary {
                        op: "-".to_string(),
                        operand: Box::new(operand),
                    },
                    span,
                ))
            }
            TokenKind::Not => {
                let span = self.advance().span;
                let operand = self.parse_unary()?;
                Some(Expr::new(
                    ExprKind::Unary {
                        op: "!".to_string(),
                        operand: Box::new(operand),
                    },
                    span,
                ))
            }
            TokenKind::KwAwait => {
                let span = self.advance().span;
                let operand = self.parse_unary()?;
                Some(Expr::new(ExprKind::Await(Box::new(operand)), span))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Option<Expr> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek_kind() {
                TokenKind::LeftParen => {
                    let span = expr.span.clone();
                    self.advance();
                    let mut arguments = Vec::new();
                    while !self.check(TokenKind::RightParen) && !self.is_at_end() {
                        arguments.push(self.parse_expression()?);
                        if self.match_kind(TokenKind::Comma).is_none() {
                            break;
                        }
                    }
                    self.expect(TokenKind::RightParen, "')' closing call arguments");
                    expr = Expr::new(
                        ExprKind::Call {
                            callee: Box::new(expr),
                            arguments,
                        },
                        span,
                    );
                }
                TokenKind::Dot => {
                    let span = expr.span.clone();
                    self.advance();
                    let member = self.expect(TokenKind::Identifier, "a member name after '.'")?.text;
                    expr = Expr::new(
                        ExprKind::Member {
                            object: Box::new(expr),
                            member,
                        },
                        span,
                    );
                }
                TokenKind::QuestionDot => {
                    let span = expr.span.clone();
                    self.advance();
                    let member = self.expect(TokenKind::Identifier, "a member name after '?.'")?.text;
                    expr = Expr::new(
                        ExprKind::OptionalChain {
                            object: Box::new(expr),
                            member,
                        },
                        span,
                    );
                }
                TokenKind::LeftBracket => {
                    let span = expr.span.clone();
                    self.advance();
                    let index = self.parse_expression()?;
                    self.expect(TokenKind::RightBracket, "']' closing index expression");
                    expr = Expr::new(
                        ExprKind::Index {
                            object: Box::new(expr),
                            index: Box::new(index),
                        },
                        span,
                    );
                }
                TokenKind::Not => {
                    // Force-unwrap only binds postfix when directly after an
                    // operand; it never starts an expression, so this arm
                    // cannot be reached from parse_unary's own `!` handling.
                    let span = expr.span.clone();
                    self.advance();
                    expr = Expr::new(ExprKind::ForceUnwrap(Box::new(expr)), span);
                }
                _ => break,
            }
        }
        Some(expr)
    }

    fn parse_primary(&mut self) -> Option<Expr> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::IntLiteral => {
                self.advance();
                let value = tok.text.parse::<i64>().unwrap_or(0);
                Some(Expr::new(ExprKind::IntLiteral(value), tok.span))
            }
            TokenKind::FloatLiteral => {
                self.advance();
                let value = tok.text.parse::<f64>().unwrap_or(0.0);
                Some(Expr::new(ExprKind::FloatLiteral(value), tok.span))
            }
            TokenKind::StringLiteral => {
                self.advance();
                Some(Expr::new(ExprKind::StringLiteral(tok.text), tok.span))
            }
            TokenKind::StringInterpStart => self.parse_string_interpolation(),
            TokenKind::CharLiteral => {
                self.advance();
                let value = tok.text.chars().next().unwrap_or('\0');
                Some(Expr::new(ExprKind::CharLiteral(value), tok.span))
            }
            TokenKind::BoolLiteral => {
                self.advance();
                Some(Expr::new(ExprKind::BoolLiteral(tok.text == "true"), tok.span))
            }
            TokenKind::NilLiteral => {
                self.advance();
                Some(Expr::new(ExprKind::NilLiteral, tok.span))
            }
            TokenKind::KwThis => {
                self.advance();
                Some(Expr::new(ExprKind::This, tok.span))
            }
            TokenKind::LeftBracket => self.parse_array_literal(),
            TokenKind::KwMatch => self.parse_match(),
            TokenKind::KwIf => self.parse_if_expr(),
            TokenKind::LeftParen => {
                if let Some(lambda) = self.try_parse_lambda() {
                    return Some(lambda);
                }
                self.advance();
                let inner = self.parse_expression()?;
                self.expect(TokenKind::RightParen, "')' closing parenthesized expression");
                Some(inner)
            }
            TokenKind::Identifier => {
                self.advance();
                if self.looks_like_construction() {
                    return self.parse_construction(tok.text, tok.span);
                }
                Some(Expr::new(ExprKind::Identifier(tok.text), tok.span))
            }
            _ => {
                self.diagnostics.report(Diagnostic::error(
                    codes::EXPECTED_TOKEN,
                    format!("expected an expression, found {:?} `{}`", tok.kind, tok.text),
                    tok.span,
                ));
                self.advance();
                None
            }
        }
    }

    /// `identifier { name: value, … }` is construction only when the brace
    /// is immediately followed by `identifier :` — otherwise `{` starts an
    /// unrelated block (e.g. a lambda body or an `if` condition's block).
    fn looks_like_construction(&mut self) -> bool {
        self.peek_kind() == TokenKind::LeftBrace
            && self.peek_at(1) == TokenKind::Identifier
            && self.peek_at(2) == TokenKind::Colon
    }

    fn parse_construction(&mut self, class_name: String, span: Span) -> Option<Expr> {
        self.advance(); // '{'
        let mut field_inits = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            let field_name = self.expect(TokenKind::Identifier, "a field name")?.text;
            self.expect(TokenKind::Colon, "':' before the field value")?;
            let value = self.parse_expression()?;
            field_inits.push((field_name, value));
            if self.match_kind(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RightBrace, "'}' closing construction");
        Some(Expr::new(
            ExprKind::Construct {
                class_name,
                field_inits,
            },
            span,
        ))
    }

    fn parse_array_literal(&mut self) -> Option<Expr> {
        let span = self.advance().span; // '['
        let mut elements = Vec::new();
        while !self.check(TokenKind::RightBracket) && !self.is_at_end() {
            elements.push(self.parse_expression()?);
            if self.match_kind(TokenKind::Comma).is_none() {
                break;
            }
        }
        self.expect(TokenKind::RightBracket, "']' closing array literal");
        Some(Expr::new(ExprKind::ArrayLiteral(elements), span))
    }

    fn parse_if_expr(&mut self) -> Option<Expr> {
        let span = self.advance().span; // 'if'
        let condition = self.parse_expression()?;
        self.expect(TokenKind::LeftBrace, "'{' starting the then-branch")?;
        let then_expr = self.parse_expression()?;
        self.expect(TokenKind::RightBrace, "'}' closing the then-branch")?;
        self.expect(TokenKind::KwElse, "'else' (if-expressions always have an else branch)")?;
        self.expect(TokenKind::LeftBrace, "'{' starting the else-branch")?;
        let else_expr = self.parse_expression()?;
        self.expect(TokenKind::RightBrace, "'}' closing the else-branch")?;
        Some(Expr::new(
            ExprKind::If {
                condition: Box::new(condition),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            },
            span,
        ))
    }

    fn parse_match(&mut self) -> Option<Expr> {
        let span = self.advance().span; // 'match'
        let subject = self.parse_expression()?;
        self.expect(TokenKind::LeftBrace, "'{' starting match arms")?;

        let mut arms = Vec::new();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            let first = self.expect(TokenKind::Identifier, "a pattern name")?;
            let (enum_name, case_name) = if self.match_kind(TokenKind::Dot).is_some() {
                let case_tok = self.expect(TokenKind::Identifier, "a variant name after '.'")?;
                (first.text, case_tok.text)
            } else {
                (String::new(), first.text)
            };
            let binding_name = if self.match_kind(TokenKind::LeftParen).is_some() {
                let binding = self.expect(TokenKind::Identifier, "a binding name").map(|t| t.text);
                self.expect(TokenKind::RightParen, "')' closing pattern binding");
                binding.unwrap_or_default()
            } else {
                String::new()
            };
            self.expect(TokenKind::FatArrow, "'=>' after a match pattern")?;
            let body = if self.check(TokenKind::LeftBrace) {
                let block_span = self.peek().span.clone();
                Box::new(Stmt::new(StmtKind::Block(self.parse_block()?), block_span))
            } else {
                let expr_span = self.peek().span.clone();
                let expr = self.parse_expression()?;
                Box::new(Stmt::new(StmtKind::Expr(expr), expr_span))
            };
            arms.push(MatchArm {
                enum_name,
                case_name,
                binding_name,
                body,
            });
            self.match_kind(TokenKind::Comma);
        }
        self.expect(TokenKind::RightBrace, "'}' closing match arms");

        Some(Expr::new(
            ExprKind::Match {
                subject: Box::new(subject),
                arms,
            },
            span,
        ))
    }

    /// `(params) => expr|{block}`, with backtracking: if the parenthesized
    /// region doesn't resolve to `)` followed by `=>`, the cursor is
    /// restored and the caller falls back to a grouped expression.
    fn try_parse_lambda(&mut self) -> Option<Expr> {
        let mark = self.save();
        let span = self.peek().span.clone();
        self.advance(); // '('

        let mut params = Vec::new();
        let mut plausible = true;
        while !self.check(TokenKind::RightParen) && !self.is_at_end() {
            if !self.check(TokenKind::Identifier) {
                plausible = false;
                break;
            }
            let name = self.advance().text;
            let type_annotation = if self.match_kind(TokenKind::Colon).is_some() {
                self.parse_type_expr()
            } else {
                None
            };
            params.push(LambdaParam {
                name,
                type_annotation,
            });
            if self.match_kind(TokenKind::Comma).is_none() {
                break;
            }
        }

        if !plausible || !self.check(TokenKind::RightParen) {
            self.restore(mark);
            return None;
        }
        self.advance(); // ')'
        if !self.check(TokenKind::FatArrow) {
            self.restore(mark);
            return None;
        }
        self.advance(); // '=>'

        let body = if self.check(TokenKind::LeftBrace) {
            LambdaBody::Block(Box::new(self.parse_block()?))
        } else {
            LambdaBody::Expr(Box::new(self.parse_expression()?))
        };

        Some(Expr::new(ExprKind::Lambda { params, body }, span))
    }

    fn parse_string_interpolation(&mut self) -> Option<Expr> {
        let start = self.advance(); // StringInterpStart
        let span = start.span.clone();
        let mut parts = vec![start.text];
        let mut expressions = Vec::new();

        loop {
            expressions.push(self.parse_expression()?);
            let tok = self.advance();
            match tok.kind {
                TokenKind::StringInterpMiddle => {
                    parts.push(tok.text);
                }
                TokenKind::StringInterpEnd => {
                    parts.push(tok.text);
                    break;
                }
                _ => {
                    self.diagnostics.report(Diagnostic::error(
                        codes::UNTERMINATED_INTERPOLATION,
                        "malformed string interpolation",
                        tok.span,
                    ));
                    break;
                }
            }
        }

        Some(Expr::new(
            ExprKind::StringInterpolation { parts, expressions },
            span,
        ))
    }
}

fn reserved_but_unimplemented(kind: TokenKind) -> bool {
    kind.is_reserved_only()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> (Program, Diagnostics) {
        let mut diags = Diagnostics::new();
        let program = Parser::parse_source(source, Rc::from("t.chr"), &mut diags);
        (program, diags)
    }

    #[test]
    fn parses_function_with_return() {
        let (program, diags) = parse("func add(a: Int, b: Int) -> Int { return a + b; }");
        assert!(!diags.has_errors());
        assert_eq!(program.declarations.len(), 1);
        match &program.declarations[0].kind {
            StmtKind::FuncDecl(f) => {
                assert_eq!(f.name, "add");
                assert_eq!(f.parameters.len(), 2);
            }
            other => panic!("expected FuncDecl, got {:?}", other),
        }
    }

    #[test]
    fn range_not_confused_with_float_in_for_loop() {
        let (program, diags) = parse("func main() { for i in 0..10 { print(i); } }");
        assert!(!diags.has_errors());
        let StmtKind::FuncDecl(f) = &program.declarations[0].kind else {
            panic!("expected func");
        };
        let body = f.body.as_ref().unwrap();
        let StmtKind::For { iterable, .. } = &body.statements[0].kind else {
            panic!("expected for statement");
        };
        assert!(matches!(iterable.kind, ExprKind::Range { .. }));
    }

    #[test]
    fn compound_assignment_desugars_to_assign_of_binary() {
        let (program, diags) = parse("func main() { var x = 1; x += 2; }");
        assert!(!diags.has_errors());
        let StmtKind::FuncDecl(f) = &program.declarations[0].kind else {
            panic!("expected func");
        };
        let body = f.body.as_ref().unwrap();
        let StmtKind::Expr(expr) = &body.statements[1].kind else {
            panic!("expected expr stmt");
        };
        match &expr.kind {
            ExprKind::Assign { value, .. } => {
                assert!(matches!(value.kind, ExprKind::Binary { .. }));
            }
            other => panic!("expected assign, got {:?}", other),
        }
    }

    #[test]
    fn lambda_vs_grouped_expression_disambiguation() {
        let (program, diags) = parse("func main() { var f = (x: Int) => x + 1; var g = (1 + 2) * 3; }");
        assert!(!diags.has_errors());
        let StmtKind::FuncDecl(f) = &program.declarations[0].kind else {
            panic!("expected func");
        };
        let body = f.body.as_ref().unwrap();
        let StmtKind::VarDecl(first) = &body.statements[0].kind else {
            panic!();
        };
        assert!(matches!(
            first.initializer.as_ref().unwrap().kind,
            ExprKind::Lambda { .. }
        ));
        let StmtKind::VarDecl(second) = &body.statements[1].kind else {
            panic!();
        };
        assert!(matches!(
            second.initializer.as_ref().unwrap().kind,
            ExprKind::Binary { .. }
        ));
    }

    #[test]
    fn construction_requires_identifier_colon_lookahead() {
        let (program, diags) = parse("func main() { var b = Box { v: 1 }; if true { } else { } }");
        assert!(!diags.has_errors());
        let StmtKind::FuncDecl(f) = &program.declarations[0].kind else {
            panic!("expected func");
        };
        let body = f.body.as_ref().unwrap();
        let StmtKind::VarDecl(decl) = &body.statements[0].kind else {
            panic!();
        };
        assert!(matches!(
            decl.initializer.as_ref().unwrap().kind,
            ExprKind::Construct { .. }
        ));
    }

    #[test]
    fn array_type_shorthand_lowers_to_array_named_type() {
        let (program, diags) = parse("func sum(xs: [Int]) -> Int { return 0; }");
        assert!(!diags.has_errors());
        let StmtKind::FuncDecl(f) = &program.declarations[0].kind else {
            panic!("expected func");
        };
        assert_eq!(f.parameters[0].type_annotation.name, "Array");
        assert_eq!(f.parameters[0].type_annotation.type_args[0].name, "Int");
    }

    #[test]
    fn unexpected_token_recovers_via_synchronize() {
        let (program, diags) = parse("func a() { )))) } func b() { return 1; }");
        assert!(diags.has_errors());
        assert!(program.declarations.iter().any(|d| matches!(
            &d.kind,
            StmtKind::FuncDecl(f) if f.name == "b"
        )));
    }

    #[test]
    fn match_exhaustiveness_is_a_semantic_concern_not_parse_concern() {
        let (_, diags) = parse(
            "enum Color { Red, Green, Blue } func main() { var c = Color.Red; match c { Red => 1 Green => 2 } }",
        );
        assert!(!diags.has_errors());
    }
}
