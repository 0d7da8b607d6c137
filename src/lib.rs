//! Guard-rule formula parser/evaluator.
//!
//! A guard rule is a tenant-configured boolean formula that is checked against
//! a CRM record before the record is saved. By convention the caller blocks the
//! save when the formula evaluates to `true`; this crate only produces the
//! verdict.
//!
//! Formulas compare record fields with `==`, `!=`, `<`, `>`, `<=` and `>=`,
//! combine comparisons with `AND`, `OR` and `NOT`, and call functions such as
//! `ISBLANK`, `CONTAINS`, `LEN` and `NOW`. Malformed formulas and evaluation
//! failures are reported as an error message rather than a verdict.
//!
//! # Example
//!
//! ```rust
//! use guard_expr::*;
//!
//! let record = Record::new().with("status", "CLOSED").with("resolution", "Fixed");
//! let result = evaluate("status == 'CLOSED' AND ISBLANK(resolution)", &record);
//! assert_eq!(result.result(), Some(false));
//! assert_eq!(result.error(), None);
//!
//! let result = evaluate("UNKNOWN_FN(x)", &record);
//! assert_eq!(result.result(), None);
//! assert_eq!(result.error(), Some("Unknown function: UNKNOWN_FN"));
//! ```

mod config;
mod error;
mod evaluate;
mod expression;
mod functions;
mod lex;
mod parse;
mod value;

/// Uses the [`pest`] parsing expression grammar language.
///
/// ```text
#[doc = include_str!("grammar.pest")]
/// ```
pub mod grammar_doc {}

pub use config::*;
pub use error::{ConfigError, ErrorKind, FormulaError, RecordError};
pub use evaluate::*;
pub use expression::*;
pub use functions::{FunctionDescriptor, FunctionImpl, FunctionRegistry};
pub use lex::{check_nesting, tokenize, Token, TokenKind};
pub use value::{Record, ScalarValue};

use once_cell::sync::Lazy;

static DEFAULT_EVALUATOR: Lazy<Evaluator> = Lazy::new(Evaluator::default);

/// Evaluates `formula` against `record` with the default limits and the
/// built-in functions.
pub fn evaluate(formula: &str, record: &Record) -> EvaluationResult {
    DEFAULT_EVALUATOR.evaluate(formula, record)
}
