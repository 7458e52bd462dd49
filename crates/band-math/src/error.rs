use thiserror::Error;

/// Errors from parsing or evaluating a band formula.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("Formula is empty")]
    Empty,

    #[error("Formula is too long ({len} bytes, max {max})")]
    TooLong { len: usize, max: usize },

    #[error("Unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("Invalid number '{0}'")]
    InvalidNumber(String),

    #[error("Unknown identifier '{0}', only band1 and band2 are allowed")]
    UnknownIdentifier(String),

    #[error("Unexpected {found} at position {pos}")]
    UnexpectedToken { found: String, pos: usize },

    #[error("Unexpected end of formula")]
    UnexpectedEnd,

    #[error("Formula nesting exceeds {0} levels")]
    TooDeep(usize),

    #[error("Formula references band2 but no second band was supplied")]
    UnboundBand,

    #[error("Band shapes differ: {0}x{1} vs {2}x{3}")]
    ShapeMismatch(usize, usize, usize, usize),
}
