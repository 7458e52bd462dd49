//! Band algebra over decoded raster tiles.
//!
//! Formulas are restricted to `+ - * / ( )`, numeric literals and the two
//! bound names `band1` and `band2`. Text is tokenized, parsed into an
//! [`Expr`] tree and evaluated by walking that tree per pixel; there is no
//! other execution path.
//!
//! ```
//! use band_math::Formula;
//!
//! let ndvi = Formula::parse("(band2 - band1) / (band2 + band1)").unwrap();
//! assert!(ndvi.uses_band2());
//! ```

pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;

pub use error::ExprError;
pub use eval::evaluate;
pub use parser::{BandRef, BinaryOp, Expr, Formula};

/// Longest formula accepted, in bytes.
pub const MAX_FORMULA_LEN: usize = 1024;

/// Deepest nesting of parentheses and unary operators accepted.
pub const MAX_DEPTH: usize = 64;
