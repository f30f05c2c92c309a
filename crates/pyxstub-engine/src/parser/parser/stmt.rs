//! Statement parsing

use super::guards::LoopGuard;
use super::params::parse_parameters;
use super::recovery::{skip_block, skip_to_line_end, sync_to_next_statement};
use super::{ParseError, Parser};
use crate::parser::ast::*;
use crate::parser::token::{Span, Token};

/// Keywords the lexer leaves as identifiers; never assignment targets.
const PYTHON_KEYWORDS: &[&str] = &[
    "assert", "await", "break", "continue", "del", "elif", "else", "except", "finally", "for",
    "global", "if", "lambda", "nonlocal", "raise", "return", "try", "while", "with", "yield",
];

/// Parse statements until the end of the current block.
///
/// Leaves the closing `Dedent` (or `Eof`) in place. Statements that fail
/// to parse are kept as [`Unsupported`] nodes.
pub fn parse_statements(parser: &mut Parser) -> Vec<Stmt> {
    parse_statements_with(parser, parse_statement)
}

fn parse_statements_with(
    parser: &mut Parser,
    mut parse_one: impl FnMut(&mut Parser) -> Result<Vec<Stmt>, ParseError>,
) -> Vec<Stmt> {
    let mut body = Vec::new();
    let mut guard = LoopGuard::new("statements");

    loop {
        while parser.check(&Token::Newline) || parser.check(&Token::Semicolon) {
            parser.advance();
        }
        if parser.check(&Token::Dedent) || parser.at_eof() {
            break;
        }

        let start = parser.position();
        let start_span = parser.current_span();
        let outcome = guard
            .check_progress(start, start_span)
            .and_then(|_| parse_one(parser));

        match outcome {
            Ok(stmts) => body.extend(stmts),
            Err(err) => {
                tracing::debug!(line = start_span.line, "recovering from parse error: {}", err);
                parser.rewind(start);
                sync_to_next_statement(parser);
                body.push(Stmt::Unsupported(
                    parser.unsupported_from(start_span, Some(err.message)),
                ));
            }
        }
    }

    body
}

/// Parse a single statement (or a line of several declarators).
pub fn parse_statement(parser: &mut Parser) -> Result<Vec<Stmt>, ParseError> {
    match parser.current() {
        Token::At => {
            let decorators = parse_decorators(parser)?;
            parse_decorated(parser, decorators)
        }
        Token::Def | Token::Async => Ok(vec![Stmt::Function(parse_def(parser, Vec::new())?)]),
        Token::Class => {
            let start = parser.current_span();
            let class = parse_class(parser, Vec::new(), false, Modifiers::default(), start)?;
            Ok(vec![Stmt::Class(class)])
        }
        Token::Cdef | Token::Cpdef => parse_native(parser, Vec::new()),
        Token::Ctypedef => Ok(vec![skip_native(parser, NativeKind::Ctypedef)]),
        Token::Import | Token::Cimport | Token::From => {
            let import = parse_import(parser)?;
            parser.expect_statement_end()?;
            Ok(vec![Stmt::Import(import)])
        }
        Token::StringLiteral(lit) => {
            let follows_end = parser.peek().is_line_end() || matches!(parser.peek(), Token::Semicolon);
            if !follows_end {
                return Ok(vec![parse_unsupported(parser)]);
            }
            let stmt = if lit.is_doc_candidate() {
                Stmt::Docstring(Docstring {
                    value: lit.value.clone(),
                    span: parser.current_span(),
                })
            } else {
                Stmt::Pass(parser.current_span())
            };
            parser.advance();
            Ok(vec![stmt])
        }
        Token::Ellipsis if parser.peek().is_line_end() => {
            let span = parser.current_span();
            parser.advance();
            Ok(vec![Stmt::Pass(span)])
        }
        Token::Identifier(word) => match word.as_str() {
            "pass" if parser.peek().is_line_end() || matches!(parser.peek(), Token::Semicolon) => {
                let span = parser.current_span();
                parser.advance();
                Ok(vec![Stmt::Pass(span)])
            }
            "property"
                if matches!(parser.peek(), Token::Identifier(_))
                    && matches!(parser.peek_nth(2), Token::Colon) =>
            {
                Ok(vec![Stmt::Property(parse_property_block(parser)?)])
            }
            "DEF" if matches!(parser.peek(), Token::Identifier(_)) => {
                Ok(vec![skip_native(parser, NativeKind::Define)])
            }
            "include" if matches!(parser.peek(), Token::StringLiteral(_)) => {
                Ok(vec![skip_native(parser, NativeKind::Include)])
            }
            _ if !PYTHON_KEYWORDS.contains(&word.as_str())
                && matches!(parser.peek(), Token::Equal | Token::Colon) =>
            {
                Ok(vec![Stmt::Variable(parse_assignment(parser)?)])
            }
            _ => Ok(vec![parse_unsupported(parser)]),
        },
        _ => Ok(vec![parse_unsupported(parser)]),
    }
}

/// Record the statement at the cursor opaquely and skip it.
fn parse_unsupported(parser: &mut Parser) -> Stmt {
    let start = parser.current_span();
    sync_to_next_statement(parser);
    Stmt::Unsupported(parser.unsupported_from(start, None))
}

// ============================================================================
// Decorators
// ============================================================================

fn parse_decorators(parser: &mut Parser) -> Result<Vec<Decorator>, ParseError> {
    let mut decorators = Vec::new();
    while parser.check(&Token::At) {
        let start = parser.current_span();
        parser.advance();

        let (mut name, _) = parser.expect_ident()?;
        while parser.check(&Token::Dot) {
            parser.advance();
            let (part, _) = parser.expect_ident()?;
            name.push('.');
            name.push_str(&part);
        }

        let args = if parser.check(&Token::LeftParen) {
            let open = parser.current_span();
            parser.advance();
            parser.take_until(|_, _| false);
            let close = parser.current_span();
            parser.expect(Token::RightParen)?;
            Some(parser.text_between(open.start, close.end))
        } else {
            None
        };

        let span = start.merge(&parser.previous_span());
        parser.expect(Token::Newline)?;
        decorators.push(Decorator { name, args, span });
    }
    Ok(decorators)
}

fn parse_decorated(parser: &mut Parser, decorators: Vec<Decorator>) -> Result<Vec<Stmt>, ParseError> {
    match parser.current() {
        Token::Def | Token::Async => Ok(vec![Stmt::Function(parse_def(parser, decorators)?)]),
        Token::Class => {
            let start = decorators
                .first()
                .map(|d| d.span)
                .unwrap_or_else(|| parser.current_span());
            Ok(vec![Stmt::Class(parse_class(
                parser,
                decorators,
                false,
                Modifiers::default(),
                start,
            )?)])
        }
        Token::Cdef | Token::Cpdef => parse_native(parser, decorators),
        _ => Err(parser.unexpected_token(vec![Token::Def, Token::Class, Token::Cdef, Token::Cpdef])),
    }
}

// ============================================================================
// Functions and classes
// ============================================================================

fn parse_def(parser: &mut Parser, decorators: Vec<Decorator>) -> Result<FunctionDef, ParseError> {
    let start = decorators
        .first()
        .map(|d| d.span)
        .unwrap_or_else(|| parser.current_span());
    let is_async = parser.eat(&Token::Async);
    parser.expect(Token::Def)?;
    let (name, _) = parser.expect_ident()?;
    let params = parse_parameters(parser)?;

    let return_annotation = if parser.eat(&Token::Arrow) {
        parser.text_until(|tok, _| matches!(tok, Token::Colon))
    } else {
        None
    };

    parser.expect(Token::Colon)?;
    let header_end = parser.previous_span();
    let doc = parse_function_suite(parser)?;

    Ok(FunctionDef {
        name,
        kind: DefKind::Python,
        modifiers: Modifiers::default(),
        is_async,
        decorators,
        params,
        return_annotation,
        native_return: None,
        doc,
        span: start.merge(&header_end),
    })
}

/// Consume a function body, keeping only its docstring.
///
/// The cursor is just past the header's `:`.
fn parse_function_suite(parser: &mut Parser) -> Result<Option<Docstring>, ParseError> {
    if parser.eat(&Token::Newline) {
        if !parser.check(&Token::Indent) {
            return Err(ParseError::invalid_syntax(
                "expected an indented block",
                parser.current_span(),
            ));
        }
        let doc = docstring_at(parser, 1);
        skip_block(parser);
        Ok(doc)
    } else {
        let doc = docstring_at(parser, 0);
        skip_to_line_end(parser);
        Ok(doc)
    }
}

/// A docstring statement `offset` tokens ahead, if there is one.
fn docstring_at(parser: &Parser, offset: usize) -> Option<Docstring> {
    match parser.peek_nth(offset) {
        Token::StringLiteral(lit) if lit.is_doc_candidate() => {
            let next = parser.peek_nth(offset + 1);
            if next.is_line_end() || matches!(next, Token::Semicolon) {
                Some(Docstring {
                    value: lit.value.clone(),
                    span: parser.span_nth(offset),
                })
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Parse a block of statements after a header's `:` (not yet consumed).
fn parse_suite(parser: &mut Parser, name: &'static str) -> Result<Vec<Stmt>, ParseError> {
    parser.expect(Token::Colon)?;

    if parser.eat(&Token::Newline) {
        if !parser.check(&Token::Indent) {
            return Err(ParseError::invalid_syntax(
                "expected an indented block",
                parser.current_span(),
            ));
        }
        let span = parser.current_span();
        parser.advance();
        parser.depth.enter(name, span)?;
        let body = parse_statements(parser);
        parser.depth.exit();
        parser.eat(&Token::Dedent);
        Ok(body)
    } else {
        // `class A: pass`
        let mut body = parse_statement(parser)?;
        while parser.eat(&Token::Semicolon) && !parser.current().is_line_end() {
            body.extend(parse_statement(parser)?);
        }
        parser.expect_statement_end()?;
        Ok(body)
    }
}

fn parse_class(
    parser: &mut Parser,
    decorators: Vec<Decorator>,
    native: bool,
    modifiers: Modifiers,
    start: Span,
) -> Result<ClassDef, ParseError> {
    parser.expect(Token::Class)?;
    let (name, _) = parser.expect_ident()?;

    let mut bases = Vec::new();
    if parser.eat(&Token::LeftParen) {
        while !parser.check(&Token::RightParen) {
            let taken = parser.take_until(|tok, _| matches!(tok, Token::Comma));
            match parser.text_of(&taken) {
                Some(base) => bases.push(base),
                None => return Err(parser.unexpected_token(vec![Token::RightParen])),
            }
            if !parser.eat(&Token::Comma) {
                break;
            }
        }
        parser.expect(Token::RightParen)?;
    }

    // `cdef class A [object AObject, type AType]`
    if native && parser.check(&Token::LeftBracket) {
        parser.advance();
        parser.take_until(|_, _| false);
        parser.expect(Token::RightBracket)?;
    }

    let header_end = parser.current_span();
    let body = parse_suite(parser, "class body")?;

    Ok(ClassDef {
        name,
        native,
        modifiers,
        decorators,
        bases,
        body,
        span: start.merge(&header_end),
    })
}

fn parse_property_block(parser: &mut Parser) -> Result<PropertyBlock, ParseError> {
    let start = parser.current_span();
    parser.advance();
    let (name, _) = parser.expect_ident()?;
    let header_end = parser.current_span();
    let body = parse_suite(parser, "property body")?;
    Ok(PropertyBlock {
        name,
        body,
        span: start.merge(&header_end),
    })
}

// ============================================================================
// Native declarations
// ============================================================================

/// `cdef ...` / `cpdef ...`
fn parse_native(parser: &mut Parser, decorators: Vec<Decorator>) -> Result<Vec<Stmt>, ParseError> {
    let start = decorators
        .first()
        .map(|d| d.span)
        .unwrap_or_else(|| parser.current_span());
    let kind = match parser.advance() {
        Token::Cpdef => DefKind::Cpdef,
        _ => DefKind::Cdef,
    };

    let mut modifiers = Modifiers::default();
    while let Some(word) = parser.current().ident() {
        let is_modifier = !matches!(parser.peek(), Token::LeftParen | Token::Equal)
            && modifiers.apply(word);
        if !is_modifier {
            break;
        }
        parser.advance();
    }

    if parser.check(&Token::Colon) {
        return parse_native_block(parser, kind, modifiers);
    }
    if parser.check(&Token::Class) {
        return Ok(vec![Stmt::Class(parse_class(
            parser, decorators, true, modifiers, start,
        )?)]);
    }

    let next_is_name = matches!(parser.peek(), Token::Identifier(_) | Token::Colon);
    match parser.current().ident() {
        Some("enum") if next_is_name => {
            return Ok(vec![parse_enum(parser, kind == DefKind::Cpdef, start)?]);
        }
        Some("struct") if next_is_name => return Ok(vec![skip_native(parser, NativeKind::Struct)]),
        Some("union") if next_is_name => return Ok(vec![skip_native(parser, NativeKind::Union)]),
        Some("fused") if next_is_name => return Ok(vec![skip_native(parser, NativeKind::Fused)]),
        Some("packed") if next_is_name => return Ok(vec![skip_native(parser, NativeKind::Struct)]),
        Some("extern") => return Ok(vec![skip_native(parser, NativeKind::Extern)]),
        _ => {}
    }

    parse_declarator_line(parser, kind, modifiers, decorators, start)
}

/// `cdef [public|readonly]:` followed by an indented block of declarations.
fn parse_native_block(
    parser: &mut Parser,
    kind: DefKind,
    block_modifiers: Modifiers,
) -> Result<Vec<Stmt>, ParseError> {
    parser.expect(Token::Colon)?;
    parser.expect(Token::Newline)?;
    if !parser.check(&Token::Indent) {
        return Err(ParseError::invalid_syntax(
            "expected an indented block",
            parser.current_span(),
        ));
    }
    parser.advance();

    let body = parse_statements_with(parser, |p| {
        let start = p.current_span();
        let mut modifiers = block_modifiers;
        while let Some(word) = p.current().ident() {
            if !modifiers.apply(word) {
                break;
            }
            p.advance();
        }
        match p.current().ident() {
            Some("struct") | Some("union") | Some("enum") | Some("fused") => {
                Ok(vec![skip_native(p, NativeKind::Block)])
            }
            _ => parse_declarator_line(p, kind, modifiers, Vec::new(), start),
        }
    });
    parser.eat(&Token::Dedent);
    Ok(body)
}

/// `<type> name(params) [qualifiers][: body]` or `<type> a [= v], *b`.
fn parse_declarator_line(
    parser: &mut Parser,
    kind: DefKind,
    modifiers: Modifiers,
    decorators: Vec<Decorator>,
    start: Span,
) -> Result<Vec<Stmt>, ParseError> {
    let mut declarator = parser.take_until(|tok, taken| {
        matches!(
            tok,
            Token::Equal | Token::Comma | Token::Colon | Token::Semicolon
        ) || (taken > 0 && matches!(tok, Token::LeftParen))
    });

    let (name, name_span) = match declarator.pop() {
        Some((Token::Identifier(name), span)) => (name, span),
        Some((found, span)) => {
            return Err(ParseError::unexpected_token(
                vec![Token::Identifier(String::new())],
                found,
                span,
            ))
        }
        None => return Err(parser.unexpected_token(vec![Token::Identifier(String::new())])),
    };
    let native_type = parser.text_of(&declarator);

    if parser.check(&Token::LeftParen) {
        let params = parse_parameters(parser)?;
        // except/noexcept/nogil/with gil/const
        parser.take_until(|tok, _| matches!(tok, Token::Colon));
        let header_end = parser.previous_span();
        let doc = if parser.eat(&Token::Colon) {
            parse_function_suite(parser)?
        } else {
            parser.expect_statement_end()?;
            None
        };
        return Ok(vec![Stmt::Function(FunctionDef {
            name,
            kind,
            modifiers,
            is_async: false,
            decorators,
            params,
            return_annotation: None,
            native_return: native_type,
            doc,
            span: start.merge(&header_end),
        })]);
    }

    if !decorators.is_empty() {
        return Err(ParseError::invalid_syntax(
            "decorators are only allowed on functions and classes",
            name_span,
        ));
    }

    let base_type = native_type
        .as_deref()
        .map(|t| t.trim_end_matches(|c: char| c == '*' || c == ' ').to_string());

    let mut vars = Vec::new();
    let mut current = (name, name_span, native_type);
    loop {
        let value = if parser.eat(&Token::Equal) {
            parser.text_until(|tok, _| matches!(tok, Token::Comma))
        } else {
            None
        };
        let (name, name_span, native_type) = current;
        vars.push(Stmt::Variable(VariableDecl {
            name,
            kind,
            modifiers,
            annotation: None,
            native_type,
            value,
            span: start.merge(&name_span).merge(&parser.previous_span()),
        }));

        if !parser.eat(&Token::Comma) {
            break;
        }

        // Further declarators share the base type: `cdef int a, *b`
        let mut stars = String::new();
        loop {
            if parser.eat(&Token::Star) {
                stars.push('*');
            } else if parser.eat(&Token::StarStar) {
                stars.push_str("**");
            } else {
                break;
            }
        }
        let (next_name, next_span) = parser.expect_ident()?;
        let next_type = base_type.as_ref().map(|base| format!("{}{}", base, stars));
        current = (next_name, next_span, next_type);
    }

    parser.expect_statement_end()?;
    Ok(vars)
}

/// `[c|cp]def enum Name:` with one member per line or comma separated.
fn parse_enum(parser: &mut Parser, public: bool, start: Span) -> Result<Stmt, ParseError> {
    parser.advance();
    let name = match parser.current().ident() {
        Some(_) => Some(parser.expect_ident()?.0),
        None => None,
    };
    let header_end = parser.previous_span();

    let mut members = Vec::new();
    let mut doc = None;
    if parser.eat(&Token::Colon) && parser.eat(&Token::Newline) && parser.check(&Token::Indent) {
        parser.advance();
        let mut guard = LoopGuard::new("enum body");
        loop {
            guard.check_progress(parser.position(), parser.current_span())?;
            match parser.current() {
                Token::Dedent => {
                    parser.advance();
                    break;
                }
                Token::Eof => break,
                Token::Newline | Token::Comma => {
                    parser.advance();
                }
                Token::StringLiteral(lit) => {
                    if members.is_empty() && doc.is_none() && lit.is_doc_candidate() {
                        doc = Some(Docstring {
                            value: lit.value.clone(),
                            span: parser.current_span(),
                        });
                    }
                    parser.advance();
                }
                Token::Identifier(word) if word == "pass" => {
                    parser.advance();
                }
                Token::Identifier(member) => {
                    members.push(member.clone());
                    parser.advance();
                    // Skip `= value`
                    parser.take_until(|tok, _| matches!(tok, Token::Comma));
                }
                Token::Indent => skip_block(parser),
                _ => return Err(parser.unexpected_token(vec![Token::Identifier(String::new())])),
            }
        }
    } else {
        sync_to_next_statement(parser);
    }

    let Some(name) = name else {
        return Ok(Stmt::Native(NativeDecl {
            kind: NativeKind::Enum,
            name: None,
            span: start.merge(&header_end),
        }));
    };

    Ok(Stmt::Enum(EnumDef {
        name,
        public,
        members,
        doc,
        span: start.merge(&header_end),
    }))
}

/// Record a declaration that never reaches Python and skip it (line and block).
fn skip_native(parser: &mut Parser, kind: NativeKind) -> Stmt {
    let start = parser.current_span();
    parser.advance();
    let name = parser.current().ident().map(str::to_string);
    let header_end = parser.current_span();
    sync_to_next_statement(parser);
    Stmt::Native(NativeDecl {
        kind,
        name,
        span: start.merge(&header_end),
    })
}

// ============================================================================
// Imports and assignments
// ============================================================================

fn parse_dotted_name(parser: &mut Parser) -> Result<String, ParseError> {
    let (mut name, _) = parser.expect_ident()?;
    while parser.check(&Token::Dot) && matches!(parser.peek(), Token::Identifier(_)) {
        parser.advance();
        let (part, _) = parser.expect_ident()?;
        name.push('.');
        name.push_str(&part);
    }
    Ok(name)
}

fn parse_alias(parser: &mut Parser) -> Result<Option<String>, ParseError> {
    if parser.eat(&Token::As) {
        Ok(Some(parser.expect_ident()?.0))
    } else {
        Ok(None)
    }
}

fn parse_import(parser: &mut Parser) -> Result<ImportStmt, ParseError> {
    let start = parser.current_span();

    if parser.eat(&Token::From) {
        let mut module = String::new();
        loop {
            if parser.eat(&Token::Dot) {
                module.push('.');
            } else if parser.eat(&Token::Ellipsis) {
                module.push_str("...");
            } else {
                break;
            }
        }
        if matches!(parser.current(), Token::Identifier(_)) {
            module.push_str(&parse_dotted_name(parser)?);
        }
        if module.is_empty() {
            return Err(parser.unexpected_token(vec![Token::Identifier(String::new())]));
        }

        let cimport = match parser.current() {
            Token::Import => false,
            Token::Cimport => true,
            _ => return Err(parser.unexpected_token(vec![Token::Import, Token::Cimport])),
        };
        parser.advance();

        let mut names = Vec::new();
        if parser.eat(&Token::Star) {
            names.push(ImportName {
                name: "*".to_string(),
                alias: None,
            });
        } else {
            let parenthesized = parser.eat(&Token::LeftParen);
            loop {
                let (name, _) = parser.expect_ident()?;
                let alias = parse_alias(parser)?;
                names.push(ImportName { name, alias });
                if !parser.eat(&Token::Comma) {
                    break;
                }
                if parenthesized && parser.check(&Token::RightParen) {
                    break;
                }
            }
            if parenthesized {
                parser.expect(Token::RightParen)?;
            }
        }

        return Ok(ImportStmt {
            cimport,
            from_module: Some(module),
            names,
            span: start.merge(&parser.previous_span()),
        });
    }

    let cimport = matches!(parser.advance(), Token::Cimport);
    let mut names = Vec::new();
    loop {
        let name = parse_dotted_name(parser)?;
        let alias = parse_alias(parser)?;
        names.push(ImportName { name, alias });
        if !parser.eat(&Token::Comma) {
            break;
        }
    }

    Ok(ImportStmt {
        cimport,
        from_module: None,
        names,
        span: start.merge(&parser.previous_span()),
    })
}

/// `name = value` or `name: annotation [= value]`
fn parse_assignment(parser: &mut Parser) -> Result<VariableDecl, ParseError> {
    let (name, start) = parser.expect_ident()?;

    let annotation = if parser.eat(&Token::Colon) {
        let annotation = parser.text_until(|tok, _| matches!(tok, Token::Equal | Token::Semicolon));
        if annotation.is_none() {
            return Err(ParseError::invalid_syntax("expected an annotation", parser.current_span()));
        }
        annotation
    } else {
        None
    };

    let value = if parser.eat(&Token::Equal) {
        // `a = b = 1` keeps everything after the first `=`
        let value = parser.text_until(|tok, _| matches!(tok, Token::Semicolon));
        if value.is_none() {
            return Err(ParseError::invalid_syntax("expected a value", parser.current_span()));
        }
        value
    } else {
        None
    };

    parser.expect_statement_end()?;
    Ok(VariableDecl {
        name,
        kind: DefKind::Python,
        modifiers: Modifiers::default(),
        annotation,
        native_type: None,
        value,
        span: start.merge(&parser.previous_span()),
    })
}
