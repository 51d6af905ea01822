//! Token ranges
//!
//! A range is the half-open ring interval `(left, right]`. When
//! `left >= right` the range wraps past the end of the ring; `left == right`
//! covers everything.

use super::Token;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    left: Token,
    right: Token,
}

impl Range {
    pub fn new(left: Token, right: Token) -> Self {
        Self { left, right }
    }

    /// Every token
    pub fn full() -> Self {
        Self::new(Token::minimum(), Token::minimum())
    }

    pub fn left(&self) -> &Token {
        &self.left
    }

    pub fn right(&self) -> &Token {
        &self.right
    }

    pub fn is_wrap_around(&self) -> bool {
        self.left >= self.right
    }

    pub fn contains(&self, token: &Token) -> bool {
        if self.left == self.right {
            return true;
        }
        if self.left < self.right {
            &self.left < token && token <= &self.right
        } else {
            token > &self.left || token <= &self.right
        }
    }
}
