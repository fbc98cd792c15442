// crates/query-relay-core/src/codec/descriptor.rs
// ============================================================================
// Module: Type-Descriptor Parser
// Description: Structural type descriptors and their string grammar.
// Purpose: Turn captured type-hint strings into trees the wire codec can walk.
// Dependencies: crate::identifiers, thiserror
// ============================================================================

//! ## Overview
//! Result types travel as short descriptor strings such as
//! `Optional[list["Acceptance"]]` or `Union[ApiLedgerAccountKey, ResponseError]`.
//! This module parses them with a recursive-descent parser over the grammar
//!
//! ```text
//! Type  := Ident | Quoted | "Optional[" Type "]" | ("list" | "List") "[" Type "]"
//!        | "Union[" Type ("," Type)+ "]"
//! Ident := name ("." name)*
//! ```
//!
//! Invariants:
//! - Any token outside the grammar is a hard [`DescriptorError`]; there is no
//!   opaque fallback type.
//! - Bare identifiers resolve against the capture namespace; dotted
//!   identifiers carry their namespace explicitly.
//! - Quoted forward references parse exactly like unquoted identifiers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use thiserror::Error;

use crate::identifiers::Namespace;
use crate::identifiers::TypeName;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum descriptor length in bytes.
pub const MAX_DESCRIPTOR_BYTES: usize = 4096;
/// Maximum generic nesting depth.
pub const MAX_DESCRIPTOR_DEPTH: usize = 32;

// ============================================================================
// SECTION: Descriptor Tree
// ============================================================================

/// Builtin scalar kinds recognized by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    /// UTF-8 string (`str`).
    String,
    /// Signed 64-bit integer (`int`).
    Integer,
    /// Finite 64-bit float (`float`).
    Float,
    /// Boolean (`bool`).
    Boolean,
    /// Arbitrary-precision decimal (`Decimal`).
    Decimal,
    /// RFC 3339 date-time (`datetime`).
    DateTime,
    /// Calendar date (`date`).
    Date,
    /// The null type (`None`).
    Null,
    /// The absence type (`Unset`).
    Absent,
}

impl ScalarKind {
    /// Resolves a builtin scalar name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "str" => Some(Self::String),
            "int" => Some(Self::Integer),
            "float" => Some(Self::Float),
            "bool" => Some(Self::Boolean),
            "Decimal" => Some(Self::Decimal),
            "datetime" => Some(Self::DateTime),
            "date" => Some(Self::Date),
            "None" | "NoneType" => Some(Self::Null),
            "Unset" => Some(Self::Absent),
            _ => None,
        }
    }

    /// Returns the canonical descriptor name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "str",
            Self::Integer => "int",
            Self::Float => "float",
            Self::Boolean => "bool",
            Self::Decimal => "Decimal",
            Self::DateTime => "datetime",
            Self::Date => "date",
            Self::Null => "None",
            Self::Absent => "Unset",
        }
    }
}

/// Structural description of a decode target.
///
/// # Invariants
/// - `UnionOf` always holds at least two alternatives.
/// - `Named` is only resolvable against the registry entry for its exact
///   `(namespace, name)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeDescriptor {
    /// Builtin scalar.
    Scalar(ScalarKind),
    /// Nullable wrapper.
    Optional(Box<TypeDescriptor>),
    /// Homogeneous list.
    ListOf(Box<TypeDescriptor>),
    /// Untagged union decoded by first structural match.
    UnionOf(Vec<TypeDescriptor>),
    /// Registered struct type.
    Named {
        /// Namespace the type belongs to.
        namespace: Namespace,
        /// Short type name within the namespace.
        name: TypeName,
    },
}

impl TypeDescriptor {
    /// Parses a descriptor string captured from `namespace`.
    ///
    /// # Errors
    ///
    /// Returns [`DescriptorError`] when the input falls outside the grammar or
    /// `namespace` is not a dotted identifier.
    pub fn parse(input: &str, namespace: &Namespace) -> Result<Self, DescriptorError> {
        if input.len() > MAX_DESCRIPTOR_BYTES {
            return Err(DescriptorError::TooLong {
                max: MAX_DESCRIPTOR_BYTES,
            });
        }
        validate_identifier(namespace.as_str(), 0)
            .map_err(|_| DescriptorError::InvalidNamespace(namespace.as_str().to_string()))?;
        let tokens = tokenize(input)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            namespace,
        };
        if parser.peek().kind == TokenKind::End {
            return Err(DescriptorError::Empty);
        }
        let descriptor = parser.parse_type(0)?;
        let trailing = parser.next();
        if trailing.kind != TokenKind::End {
            return Err(DescriptorError::Expected {
                expected: "end of descriptor",
                found: trailing.kind.describe(),
                offset: trailing.offset,
            });
        }
        Ok(descriptor)
    }

    /// Shorthand for a named descriptor.
    #[must_use]
    pub fn named(namespace: impl Into<Namespace>, name: impl Into<TypeName>) -> Self {
        Self::Named {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Returns true when JSON `null` is an acceptable value.
    #[must_use]
    pub fn accepts_null(&self) -> bool {
        match self {
            Self::Optional(_) | Self::Scalar(ScalarKind::Null) => true,
            Self::UnionOf(alternatives) => alternatives.iter().any(Self::accepts_null),
            _ => false,
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(kind) => f.write_str(kind.as_str()),
            Self::Optional(inner) => write!(f, "Optional[{inner}]"),
            Self::ListOf(inner) => write!(f, "list[{inner}]"),
            Self::UnionOf(alternatives) => {
                f.write_str("Union[")?;
                for (index, alternative) in alternatives.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{alternative}")?;
                }
                f.write_str("]")
            }
            Self::Named {
                namespace,
                name,
            } => write!(f, "{namespace}.{name}"),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Descriptor parse failures.
///
/// # Invariants
/// - Offsets are byte offsets into the original input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// Input held no tokens.
    #[error("type descriptor is empty")]
    Empty,
    /// Input exceeded [`MAX_DESCRIPTOR_BYTES`].
    #[error("type descriptor exceeds {max} bytes")]
    TooLong {
        /// Maximum accepted length.
        max: usize,
    },
    /// Character outside the descriptor alphabet.
    #[error("unexpected character '{found}' at offset {offset}")]
    UnexpectedChar {
        /// Offending character.
        found: char,
        /// Byte offset.
        offset: usize,
    },
    /// Quoted identifier without a closing quote.
    #[error("unterminated quoted identifier at offset {offset}")]
    UnterminatedQuote {
        /// Offset of the opening quote.
        offset: usize,
    },
    /// Capture namespace is not a dotted identifier.
    #[error("invalid namespace '{0}'")]
    InvalidNamespace(String),
    /// Malformed identifier text.
    #[error("invalid identifier '{ident}' at offset {offset}")]
    InvalidIdentifier {
        /// Identifier text.
        ident: String,
        /// Byte offset.
        offset: usize,
    },
    /// Token did not fit the grammar at this position.
    #[error("expected {expected} at offset {offset}, found {found}")]
    Expected {
        /// Description of the expected token.
        expected: &'static str,
        /// Description of the token found.
        found: String,
        /// Byte offset.
        offset: usize,
    },
    /// Generic constructor outside `Optional`, `list`, `List`, `Union`.
    #[error("unknown generic '{name}' at offset {offset}")]
    UnknownGeneric {
        /// Generic name.
        name: String,
        /// Byte offset.
        offset: usize,
    },
    /// Generic applied to the wrong number of arguments.
    #[error("{name} takes {expected} argument(s), found {found}")]
    Arity {
        /// Generic name.
        name: String,
        /// Accepted arity description.
        expected: &'static str,
        /// Number of arguments supplied.
        found: usize,
    },
    /// Generic nesting deeper than [`MAX_DESCRIPTOR_DEPTH`].
    #[error("type descriptor nesting exceeds depth {max}")]
    TooDeep {
        /// Maximum accepted depth.
        max: usize,
    },
}

// ============================================================================
// SECTION: Tokenizer
// ============================================================================

/// Lexical token kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    /// Bare identifier, possibly dotted.
    Ident(String),
    /// Quoted forward reference.
    Quoted(String),
    /// `[`
    Open,
    /// `]`
    Close,
    /// `,`
    Comma,
    /// End of input.
    End,
}

impl TokenKind {
    /// Describes the token for error messages.
    fn describe(&self) -> String {
        match self {
            Self::Ident(name) | Self::Quoted(name) => format!("identifier '{name}'"),
            Self::Open => "'['".to_string(),
            Self::Close => "']'".to_string(),
            Self::Comma => "','".to_string(),
            Self::End => "end of descriptor".to_string(),
        }
    }
}

/// Token with its source offset.
#[derive(Debug, Clone)]
struct Token {
    /// Token kind.
    kind: TokenKind,
    /// Byte offset of the token start.
    offset: usize,
}

/// Splits the descriptor into tokens.
fn tokenize(input: &str) -> Result<Vec<Token>, DescriptorError> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some((offset, ch)) = chars.next() {
        let kind = match ch {
            c if c.is_ascii_whitespace() => continue,
            '[' => TokenKind::Open,
            ']' => TokenKind::Close,
            ',' => TokenKind::Comma,
            '\'' | '"' => {
                let mut text = String::new();
                let mut closed = false;
                for (_, next) in chars.by_ref() {
                    if next == ch {
                        closed = true;
                        break;
                    }
                    text.push(next);
                }
                if !closed {
                    return Err(DescriptorError::UnterminatedQuote {
                        offset,
                    });
                }
                validate_identifier(&text, offset)?;
                TokenKind::Quoted(text)
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut text = String::from(c);
                while let Some((_, next)) = chars.peek() {
                    if next.is_ascii_alphanumeric() || *next == '_' || *next == '.' {
                        text.push(*next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                validate_identifier(&text, offset)?;
                TokenKind::Ident(text)
            }
            other => {
                return Err(DescriptorError::UnexpectedChar {
                    found: other,
                    offset,
                });
            }
        };
        tokens.push(Token {
            kind,
            offset,
        });
    }
    tokens.push(Token {
        kind: TokenKind::End,
        offset: input.len(),
    });
    Ok(tokens)
}

/// Checks that every dotted segment is a non-empty identifier.
fn validate_identifier(text: &str, offset: usize) -> Result<(), DescriptorError> {
    let valid = !text.is_empty()
        && text.split('.').all(|segment| {
            let mut chars = segment.chars();
            chars.next().is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        });
    if valid {
        Ok(())
    } else {
        Err(DescriptorError::InvalidIdentifier {
            ident: text.to_string(),
            offset,
        })
    }
}

// ============================================================================
// SECTION: Parser
// ============================================================================

/// Recursive-descent parser state.
struct Parser<'a> {
    /// Token stream terminated by [`TokenKind::End`].
    tokens: Vec<Token>,
    /// Index of the next token.
    pos: usize,
    /// Namespace applied to bare identifiers.
    namespace: &'a Namespace,
}

impl Parser<'_> {
    /// Returns the next token without consuming it.
    fn peek(&self) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[self.pos.min(last)]
    }

    /// Consumes and returns the next token.
    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::End {
            self.pos += 1;
        }
        token
    }

    /// Parses one `Type` production.
    fn parse_type(&mut self, depth: usize) -> Result<TypeDescriptor, DescriptorError> {
        if depth > MAX_DESCRIPTOR_DEPTH {
            return Err(DescriptorError::TooDeep {
                max: MAX_DESCRIPTOR_DEPTH,
            });
        }
        let token = self.next();
        match token.kind {
            TokenKind::Ident(name) if self.peek().kind == TokenKind::Open => {
                self.next();
                self.parse_generic(&name, token.offset, depth)
            }
            TokenKind::Ident(name) | TokenKind::Quoted(name) => Ok(self.resolve_name(&name)),
            other => Err(DescriptorError::Expected {
                expected: "type",
                found: other.describe(),
                offset: token.offset,
            }),
        }
    }

    /// Parses the bracketed argument list of a generic and builds the node.
    fn parse_generic(
        &mut self,
        name: &str,
        offset: usize,
        depth: usize,
    ) -> Result<TypeDescriptor, DescriptorError> {
        if !matches!(name, "Optional" | "list" | "List" | "Union") {
            return Err(DescriptorError::UnknownGeneric {
                name: name.to_string(),
                offset,
            });
        }
        let mut args = vec![self.parse_type(depth + 1)?];
        loop {
            let token = self.next();
            match token.kind {
                TokenKind::Comma => args.push(self.parse_type(depth + 1)?),
                TokenKind::Close => break,
                other => {
                    return Err(DescriptorError::Expected {
                        expected: "',' or ']'",
                        found: other.describe(),
                        offset: token.offset,
                    });
                }
            }
        }
        match (name, args.len()) {
            ("Optional", 1) => Ok(TypeDescriptor::Optional(Box::new(args.remove(0)))),
            ("list" | "List", 1) => Ok(TypeDescriptor::ListOf(Box::new(args.remove(0)))),
            ("Union", count) if count >= 2 => Ok(TypeDescriptor::UnionOf(args)),
            ("Union", count) => Err(DescriptorError::Arity {
                name: name.to_string(),
                expected: "two or more",
                found: count,
            }),
            (_, count) => Err(DescriptorError::Arity {
                name: name.to_string(),
                expected: "exactly one",
                found: count,
            }),
        }
    }

    /// Resolves an identifier to a scalar or a namespaced type.
    fn resolve_name(&self, name: &str) -> TypeDescriptor {
        if let Some(kind) = ScalarKind::from_name(name) {
            return TypeDescriptor::Scalar(kind);
        }
        match name.rsplit_once('.') {
            Some((namespace, short)) => TypeDescriptor::named(namespace, short),
            None => TypeDescriptor::named(self.namespace.clone(), name),
        }
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        reason = "Test fixtures use explicit asserts and unwraps for clarity."
    )]

    use super::DescriptorError;
    use super::ScalarKind;
    use super::TypeDescriptor;
    use crate::identifiers::Namespace;

    fn ns() -> Namespace {
        Namespace::new("agreements")
    }

    #[test]
    fn parses_optional_list_of_quoted_forward_reference() {
        let parsed = TypeDescriptor::parse("Optional[list[\"Acceptance\"]]", &ns());
        assert_eq!(
            parsed,
            Ok(TypeDescriptor::Optional(Box::new(TypeDescriptor::ListOf(Box::new(
                TypeDescriptor::named("agreements", "Acceptance")
            )))))
        );
    }

    #[test]
    fn quoted_and_bare_identifiers_are_identical() {
        let bare = TypeDescriptor::parse("list[Acceptance]", &ns());
        let single = TypeDescriptor::parse("List['Acceptance']", &ns());
        assert_eq!(bare, single);
    }

    #[test]
    fn union_requires_two_alternatives() {
        let err = TypeDescriptor::parse("Union[str]", &ns());
        assert!(matches!(err, Err(DescriptorError::Arity { found: 1, .. })));
    }

    #[test]
    fn unknown_generic_is_rejected() {
        let err = TypeDescriptor::parse("dict[str, int]", &ns());
        assert!(matches!(err, Err(DescriptorError::UnknownGeneric { .. })));
    }

    #[test]
    fn dotted_identifier_carries_namespace() {
        let parsed = TypeDescriptor::parse("ledger.api.ResponseError", &ns());
        assert_eq!(parsed, Ok(TypeDescriptor::named("ledger.api", "ResponseError")));
    }

    #[test]
    fn scalars_resolve_before_named_types() {
        let parsed = TypeDescriptor::parse("Union[Unset, 'str', None]", &ns());
        assert_eq!(
            parsed,
            Ok(TypeDescriptor::UnionOf(vec![
                TypeDescriptor::Scalar(ScalarKind::Absent),
                TypeDescriptor::Scalar(ScalarKind::String),
                TypeDescriptor::Scalar(ScalarKind::Null),
            ]))
        );
    }

    #[test]
    fn rejects_stray_tokens() {
        assert!(matches!(
            TypeDescriptor::parse("list[int]]", &ns()),
            Err(DescriptorError::Expected { .. })
        ));
        assert!(matches!(
            TypeDescriptor::parse("list[int", &ns()),
            Err(DescriptorError::Expected { .. })
        ));
        assert!(matches!(
            TypeDescriptor::parse("list<int>", &ns()),
            Err(DescriptorError::UnexpectedChar { found: '<', .. })
        ));
        assert!(matches!(
            TypeDescriptor::parse("'Acceptance", &ns()),
            Err(DescriptorError::UnterminatedQuote { offset: 0 })
        ));
        assert_eq!(TypeDescriptor::parse("   ", &ns()), Err(DescriptorError::Empty));
    }

    #[test]
    fn display_reparses_to_same_tree() {
        let source = "Optional[Union[list[Acceptance], billing.Invoice, None]]";
        let parsed = TypeDescriptor::parse(source, &ns());
        let Ok(parsed) = parsed else {
            panic!("descriptor should parse");
        };
        let rendered = parsed.to_string();
        assert!(rendered.contains("billing.Invoice"));
        assert_eq!(TypeDescriptor::parse(&rendered, &ns()), Ok(parsed.clone()));
        assert_eq!(TypeDescriptor::parse(&rendered, &Namespace::new("other")), Ok(parsed));
    }

    #[test]
    fn capture_namespace_must_be_an_identifier() {
        for namespace in ["my-ns", "", "billing.", "9lives"] {
            assert_eq!(
                TypeDescriptor::parse("Acceptance", &Namespace::new(namespace)),
                Err(DescriptorError::InvalidNamespace(namespace.to_string()))
            );
        }
        let parsed = TypeDescriptor::parse("Acceptance", &Namespace::new("billing.v2")).unwrap();
        assert_eq!(parsed.to_string(), "billing.v2.Acceptance");
        assert_eq!(TypeDescriptor::parse(&parsed.to_string(), &ns()), Ok(parsed));
    }

    #[test]
    fn nesting_is_bounded() {
        let depth = super::MAX_DESCRIPTOR_DEPTH + 2;
        let input = format!("{}int{}", "list[".repeat(depth), "]".repeat(depth));
        assert!(matches!(
            TypeDescriptor::parse(&input, &ns()),
            Err(DescriptorError::TooDeep { .. })
        ));
    }
}
