//! Error recovery and block skipping.
//!
//! Both unsupported statements and statements that fail to parse are
//! skipped the same way: to the end of the logical line, plus any
//! indented block (and `elif`/`else`/`except`/`finally` clauses) that
//! belongs to it.

use super::Parser;
use crate::parser::token::Token;

/// Clause keywords that continue a compound statement at the same level.
const CONTINUATION_CLAUSES: &[&str] = &["elif", "else", "except", "finally"];

/// Skip to the start of the next statement in the current block.
///
/// Stops before a `Dedent`/`Eof`, so the enclosing block loop sees it.
pub fn sync_to_next_statement(parser: &mut Parser) {
    loop {
        match parser.current() {
            Token::Eof | Token::Dedent => return,
            Token::Newline => {
                parser.advance();
                if parser.check(&Token::Indent) {
                    skip_block(parser);
                }
                let continues = parser
                    .current()
                    .ident()
                    .is_some_and(|word| CONTINUATION_CLAUSES.contains(&word));
                if !continues {
                    return;
                }
            }
            Token::Indent => skip_block(parser),
            _ => {
                parser.advance();
            }
        }
    }
}

/// Skip an indented block, starting at its `Indent` token.
///
/// Consumes the matching `Dedent`.
pub fn skip_block(parser: &mut Parser) {
    let mut depth = 0usize;
    loop {
        match parser.current() {
            Token::Eof => return,
            Token::Indent => depth += 1,
            Token::Dedent => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    parser.advance();
                    return;
                }
            }
            _ => {}
        }
        parser.advance();
    }
}

/// Skip the rest of the logical line, leaving the `Newline` in place.
pub fn skip_to_line_end(parser: &mut Parser) {
    while !parser.current().is_line_end() {
        parser.advance();
    }
}
