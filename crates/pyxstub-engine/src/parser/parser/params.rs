//! Parameter list parsing.
//!
//! Accepts both Python (`x: int = 1`) and native (`int x=1`,
//! `object o not None`) forms, which may be mixed in one list.

use super::guards::LoopGuard;
use super::{ParseError, Parser};
use crate::parser::ast::{Param, ParamKind};
use crate::parser::token::{Span, Token};

/// Parse `( param, ... )`.
pub fn parse_parameters(parser: &mut Parser) -> Result<Vec<Param>, ParseError> {
    parser.expect(Token::LeftParen)?;
    let mut params = Vec::new();
    let mut guard = LoopGuard::new("parameters");

    while !parser.check(&Token::RightParen) {
        guard.check_progress(parser.position(), parser.current_span())?;
        params.push(parse_parameter(parser)?);
        if !parser.eat(&Token::Comma) {
            break;
        }
    }

    parser.expect(Token::RightParen)?;
    Ok(params)
}

fn parse_parameter(parser: &mut Parser) -> Result<Param, ParseError> {
    let start = parser.current_span();

    if parser.eat(&Token::Slash) {
        return Ok(marker(ParamKind::PositionalOnlyMarker, start));
    }

    let kind = if parser.eat(&Token::StarStar) {
        ParamKind::VarKeyword
    } else if parser.eat(&Token::Star) {
        if parser.check(&Token::Comma) || parser.check(&Token::RightParen) {
            return Ok(marker(ParamKind::KeywordOnlyMarker, start));
        }
        ParamKind::VarPositional
    } else {
        ParamKind::Regular
    };

    let mut declarator =
        parser.take_until(|tok, _| matches!(tok, Token::Colon | Token::Equal | Token::Comma));
    strip_none_check(&mut declarator);

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

    let annotation = if parser.eat(&Token::Colon) {
        parser.text_until(|tok, _| matches!(tok, Token::Equal | Token::Comma))
    } else {
        None
    };

    let default = if parser.eat(&Token::Equal) {
        let text = parser.text_until(|tok, _| matches!(tok, Token::Comma));
        if text.is_none() {
            return Err(ParseError::invalid_syntax(
                "expected a default value",
                parser.current_span(),
            ));
        }
        text
    } else {
        None
    };

    Ok(Param {
        name,
        kind,
        annotation,
        native_type,
        default,
        span: start.merge(&name_span).merge(&parser.previous_span()),
    })
}

/// Drop a trailing `not None` / `or None` argument check.
fn strip_none_check(declarator: &mut Vec<(Token, Span)>) {
    let len = declarator.len();
    if len < 3 {
        return;
    }
    let is_none = declarator[len - 1].0.ident() == Some("None");
    let is_check = matches!(declarator[len - 2].0.ident(), Some("not") | Some("or"));
    if is_none && is_check {
        declarator.truncate(len - 2);
    }
}

fn marker(kind: ParamKind, span: Span) -> Param {
    let name = match kind {
        ParamKind::PositionalOnlyMarker => "/",
        _ => "*",
    };
    Param {
        name: name.to_string(),
        kind,
        annotation: None,
        native_type: None,
        default: None,
        span,
    }
}
