// crates/query-relay-gateway/src/classify.rs
// ============================================================================
// Module: Statement Classification
// Description: Read/write classification of inbound SQL text.
// Purpose: Decide whether a statement needs approval before it runs.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Classification is lexical and fail-closed. The leading keyword decides
//! the class; `WITH` statements are scanned for mutating keywords; any
//! keyword not known to be a read is a write. Text with more than one
//! statement is rejected outright.
//!
//! String literals, quoted identifiers, and comments are skipped so that a
//! `;` or `DELETE` inside them never affects the result.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Classification of a single SQL statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementClass {
    /// Statement only reads data.
    Read,
    /// Statement may mutate stored data.
    Write,
}

impl StatementClass {
    /// Returns a stable label for audit output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
        }
    }

    /// Returns true for [`StatementClass::Write`].
    #[must_use]
    pub const fn is_write(self) -> bool {
        matches!(self, Self::Write)
    }
}

/// Classification failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyError {
    /// Statement text has no keyword.
    #[error("statement is empty")]
    Empty,
    /// Statement text contains more than one statement.
    #[error("multiple statements are not allowed")]
    MultipleStatements,
    /// A literal, identifier, or comment is not terminated.
    #[error("unterminated {0}")]
    Unterminated(&'static str),
}

/// Leading keywords that only read.
const READ_KEYWORDS: &[&str] = &["SELECT", "VALUES"];
/// Keywords that mutate when they appear inside a `WITH` statement.
const MUTATING_KEYWORDS: &[&str] = &["INSERT", "UPDATE", "DELETE", "REPLACE", "UPSERT"];

// ============================================================================
// SECTION: Classification
// ============================================================================

/// Classifies SQL text as a read or a write.
///
/// # Errors
///
/// Returns [`ClassifyError`] for empty, multi-statement, or unterminated text.
pub fn classify(sql: &str) -> Result<StatementClass, ClassifyError> {
    let words = keywords(sql)?;
    let Some(first) = words.first() else {
        return Err(ClassifyError::Empty);
    };
    if first == "WITH" {
        let mutates = words.iter().skip(1).any(|word| MUTATING_KEYWORDS.contains(&word.as_str()));
        return Ok(if mutates { StatementClass::Write } else { StatementClass::Read });
    }
    if READ_KEYWORDS.contains(&first.as_str()) {
        Ok(StatementClass::Read)
    } else {
        Ok(StatementClass::Write)
    }
}

/// Extracts uppercase bare words, skipping literals and comments.
fn keywords(sql: &str) -> Result<Vec<String>, ClassifyError> {
    let mut words = Vec::new();
    let mut chars = sql.char_indices().peekable();
    let mut terminated = false;
    while let Some((index, ch)) = chars.next() {
        if terminated && !ch.is_whitespace() && ch != ';' && !starts_comment(sql, index) {
            return Err(ClassifyError::MultipleStatements);
        }
        match ch {
            '\'' | '"' | '`' => skip_quoted(&mut chars, ch)?,
            '[' => skip_quoted(&mut chars, ']')?,
            '-' if chars.peek().is_some_and(|(_, next)| *next == '-') => {
                for (_, next) in chars.by_ref() {
                    if next == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek().is_some_and(|(_, next)| *next == '*') => {
                chars.next();
                let mut previous = '\0';
                let mut closed = false;
                for (_, next) in chars.by_ref() {
                    if previous == '*' && next == '/' {
                        closed = true;
                        break;
                    }
                    previous = next;
                }
                if !closed {
                    return Err(ClassifyError::Unterminated("comment"));
                }
            }
            ';' => terminated = true,
            ch if ch.is_ascii_alphabetic() || ch == '_' => {
                let mut word = String::new();
                word.push(ch.to_ascii_uppercase());
                while let Some((_, next)) = chars.peek() {
                    if next.is_ascii_alphanumeric() || *next == '_' {
                        word.push(next.to_ascii_uppercase());
                        chars.next();
                    } else {
                        break;
                    }
                }
                words.push(word);
            }
            _ => {}
        }
    }
    Ok(words)
}

/// Returns true when a comment starts at `index`.
fn starts_comment(sql: &str, index: usize) -> bool {
    let rest = &sql[index ..];
    rest.starts_with("--") || rest.starts_with("/*")
}

/// Consumes characters through the closing `close` delimiter.
fn skip_quoted(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    close: char,
) -> Result<(), ClassifyError> {
    while let Some((_, ch)) = chars.next() {
        if ch == close {
            if close != ']' && chars.peek().is_some_and(|(_, next)| *next == close) {
                chars.next();
                continue;
            }
            return Ok(());
        }
    }
    Err(ClassifyError::Unterminated("quoted text"))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
