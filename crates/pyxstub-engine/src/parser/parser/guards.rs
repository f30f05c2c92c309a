//! Parser guards against runaway loops and deep nesting

use super::ParseError;
use crate::parser::token::Span;

/// Maximum iterations for any parser loop
const MAX_LOOP_ITERATIONS: usize = 1_000_000;

/// Maximum class/property nesting depth
pub const MAX_PARSE_DEPTH: usize = 64;

/// Guard against infinite loops in parser
///
/// Counts iterations and also fails if the token position stops moving
/// between two checks.
pub struct LoopGuard {
    name: &'static str,
    count: usize,
    max: usize,
    last_pos: Option<usize>,
}

impl LoopGuard {
    #[inline]
    pub fn new(name: &'static str) -> Self {
        Self::with_limit(name, MAX_LOOP_ITERATIONS)
    }

    #[inline]
    pub fn with_limit(name: &'static str, max: usize) -> Self {
        Self {
            name,
            count: 0,
            max,
            last_pos: None,
        }
    }

    /// Check iteration count, return error if exceeded
    #[inline]
    pub fn check(&mut self) -> Result<(), ParseError> {
        self.count += 1;
        if self.count > self.max {
            return Err(ParseError::parser_limit_exceeded(
                format!("loop '{}' exceeded {} iterations", self.name, self.max),
                Span::new(0, 0, 0, 0),
            ));
        }
        Ok(())
    }

    /// Like [`check`](Self::check), but also requires `pos` to have moved.
    pub fn check_progress(&mut self, pos: usize, span: Span) -> Result<(), ParseError> {
        self.check()?;
        if self.last_pos == Some(pos) {
            return Err(ParseError::parser_stuck(
                format!("loop '{}' made no progress", self.name),
                span,
            ));
        }
        self.last_pos = Some(pos);
        Ok(())
    }
}

/// Tracks nesting depth of recursive block parsing.
#[derive(Debug, Default)]
pub struct DepthCounter {
    depth: usize,
}

impl DepthCounter {
    /// Enter one level; fails once [`MAX_PARSE_DEPTH`] would be exceeded.
    pub fn enter(&mut self, name: &'static str, span: Span) -> Result<(), ParseError> {
        if self.depth >= MAX_PARSE_DEPTH {
            return Err(ParseError::parser_limit_exceeded(
                format!("maximum nesting depth ({}) exceeded in {}", MAX_PARSE_DEPTH, name),
                span,
            ));
        }
        self.depth += 1;
        Ok(())
    }

    pub fn exit(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}
