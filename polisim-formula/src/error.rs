//! Error types for the formula language.

use std::fmt;

/// Errors raised while tokenizing, parsing, or evaluating a formula.
///
/// Callers are expected to catch these at the evaluation boundary, log a
/// diagnostic, and substitute a zero delta; no formula failure may escape
/// the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum FormulaError {
    /// A character outside the grammar was encountered.
    UnexpectedChar {
        /// Byte offset into the source string.
        position: usize,
        /// The offending character.
        found: char,
    },
    /// The source ended while a production was still open.
    UnexpectedEof,
    /// Encountered a token that does not fit the grammar here.
    UnexpectedToken {
        /// Position in the token stream.
        position: usize,
        /// The token that was found.
        token: String,
        /// What was expected instead.
        expected: String,
    },
    /// Parsing succeeded but tokens remain (unbalanced input).
    UnconsumedTokens {
        /// Position where unconsumed tokens start.
        position: usize,
        /// Number of tokens remaining.
        remaining: usize,
    },
    /// Input was empty (no tokens to parse).
    EmptyInput,
    /// The token stream exceeds the complexity bound.
    TooManyTokens { count: usize, limit: usize },
    /// Expression nesting exceeds the recursion bound.
    TooDeep { limit: usize },
    /// A name was referenced that is not present in the scope.
    UnknownName { name: String },
    /// A function outside the allow-list was called.
    DisallowedFunction { name: String },
    /// A function was called with the wrong number of arguments.
    Arity {
        function: &'static str,
        expected: &'static str,
        got: usize,
    },
    /// An operation was applied to operands of an unsupported type.
    TypeMismatch {
        operation: &'static str,
        operand: String,
    },
    /// An unset ("None") value reached an operation that needs a number.
    NoneOperand { operation: &'static str },
    /// An arithmetic step produced a non-finite value (division by zero,
    /// overflow).
    NonFinite { operation: &'static str },
    /// A function argument was outside its mathematical domain.
    Domain {
        function: &'static str,
        argument: f64,
    },
}

impl fmt::Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaError::UnexpectedChar { position, found } => {
                write!(f, "Unexpected character '{}' at byte {}", found, position)
            }
            FormulaError::UnexpectedEof => {
                write!(f, "Unexpected end of formula")
            }
            FormulaError::UnexpectedToken {
                position,
                token,
                expected,
            } => {
                write!(
                    f,
                    "Unexpected token '{}' at position {}, expected {}",
                    token, position, expected
                )
            }
            FormulaError::UnconsumedTokens {
                position,
                remaining,
            } => {
                write!(
                    f,
                    "Parsing incomplete: {} unconsumed tokens starting at position {}",
                    remaining, position
                )
            }
            FormulaError::EmptyInput => {
                write!(f, "Cannot parse an empty formula")
            }
            FormulaError::TooManyTokens { count, limit } => {
                write!(f, "Formula has {} tokens, limit is {}", count, limit)
            }
            FormulaError::TooDeep { limit } => {
                write!(f, "Formula nesting exceeds depth limit {}", limit)
            }
            FormulaError::UnknownName { name } => {
                write!(f, "Name '{}' is not defined in the scope", name)
            }
            FormulaError::DisallowedFunction { name } => {
                write!(f, "Function '{}' is not on the allow-list", name)
            }
            FormulaError::Arity {
                function,
                expected,
                got,
            } => {
                write!(
                    f,
                    "{}() expects {} argument(s), got {}",
                    function, expected, got
                )
            }
            FormulaError::TypeMismatch { operation, operand } => {
                write!(f, "Unsupported operand for {}: {}", operation, operand)
            }
            FormulaError::NoneOperand { operation } => {
                write!(f, "Unset value used in {}", operation)
            }
            FormulaError::NonFinite { operation } => {
                write!(f, "Non-finite result from {}", operation)
            }
            FormulaError::Domain { function, argument } => {
                write!(f, "{}() argument {} outside domain", function, argument)
            }
        }
    }
}

impl std::error::Error for FormulaError {}
