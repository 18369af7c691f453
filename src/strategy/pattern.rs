//! Betting pattern and cyclic cursor.
//!
//! A pattern is a non-empty sequence of `B` / `P` / `T` steps. The cursor
//! walks it cyclically; a `T` (repeat) step bets whatever concrete side most
//! recently precedes it in the pattern.

use std::fmt;

use tracing::warn;

use crate::types::{SessionError, Side, Symbol};

/// Pattern used when the requested one is empty or malformed.
pub const DEFAULT_PATTERN: &str = "B";

/// Side bet by a repeat step with nothing concrete before it.
pub const DEFAULT_SIDE: Side = Side::Banker;

/// Strip separators and uppercase a user-supplied pattern string.
pub fn normalize(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, '-' | ' '))
        .flat_map(|c| c.to_uppercase())
        .collect()
}

/// Resolve the side bet at `cursor`.
///
/// A repeat step scans backward from `cursor - 1` down to index 0 (no
/// wrap-around) for the latest concrete side.
pub fn resolve_side(symbols: &[Symbol], cursor: usize) -> Side {
    match symbols.get(cursor) {
        Some(sym) => match sym.side() {
            Some(side) => side,
            None => symbols[..cursor]
                .iter()
                .rev()
                .find_map(Symbol::side)
                .unwrap_or(DEFAULT_SIDE),
        },
        None => DEFAULT_SIDE,
    }
}

/// Validated, non-empty pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    symbols: Vec<Symbol>,
}

impl Pattern {
    /// Parse a pattern string. Separators are ignored and case is folded.
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        let text = normalize(raw);
        if text.is_empty() {
            return Err(SessionError::InvalidPattern {
                pattern: raw.to_string(),
                reason: "pattern is empty".to_string(),
            });
        }

        let symbols = text
            .chars()
            .map(|c| {
                Symbol::from_code(c).ok_or_else(|| SessionError::InvalidPattern {
                    pattern: raw.to_string(),
                    reason: format!("unexpected symbol '{c}'"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { symbols })
    }

    /// Parse, falling back to the default pattern on error.
    pub fn parse_or_default(raw: &str) -> Self {
        match Self::parse(raw) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, fallback = DEFAULT_PATTERN, "Invalid pattern, using default");
                Self::default()
            }
        }
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Whether two Banker steps are adjacent anywhere (no wrap-around).
    pub fn has_consecutive_banker(&self) -> bool {
        self.symbols
            .windows(2)
            .any(|w| w[0] == Symbol::Banker && w[1] == Symbol::Banker)
    }

    /// Canonical text form, e.g. `"BBPT"`.
    pub fn as_text(&self) -> String {
        self.symbols.iter().map(Symbol::code).collect()
    }
}

impl Default for Pattern {
    fn default() -> Self {
        Self {
            symbols: vec![Symbol::Banker],
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_text())
    }
}

// ---------------------------------------------------------------------------
// Cursor
// ---------------------------------------------------------------------------

/// A pattern together with the current position in it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PatternCursor {
    pattern: Pattern,
    cursor: usize,
}

impl PatternCursor {
    pub fn new(pattern: Pattern) -> Self {
        Self { pattern, cursor: 0 }
    }

    /// Build from text, degrading to the default pattern when invalid.
    pub fn from_text(raw: &str) -> Self {
        Self::new(Pattern::parse_or_default(raw))
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.pattern.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    /// Raw symbol at the cursor.
    pub fn current_symbol(&self) -> Symbol {
        self.pattern.symbols()[self.cursor]
    }

    /// Side to bet at the cursor, with repeat steps resolved.
    pub fn current_side(&self) -> Side {
        resolve_side(self.pattern.symbols(), self.cursor)
    }

    pub fn advance(&mut self) {
        self.cursor = (self.cursor + 1) % self.pattern.len();
    }

    /// Replace the pattern and rewind to the first step.
    pub fn set_pattern(&mut self, pattern: Pattern) {
        self.pattern = pattern;
        self.cursor = 0;
    }

    /// Replace the pattern from text. Invalid text installs the default
    /// pattern and returns the parse error so the caller can report it.
    pub fn set_text(&mut self, raw: &str) -> Result<(), SessionError> {
        match Pattern::parse(raw) {
            Ok(p) => {
                self.set_pattern(p);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, fallback = DEFAULT_PATTERN, "Invalid pattern, using default");
                self.set_pattern(Pattern::default());
                Err(e)
            }
        }
    }

    pub fn rewind(&mut self) {
        self.cursor = 0;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
