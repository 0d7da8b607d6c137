use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::EvaluatorConfig;
use crate::error::FormulaError;
use crate::expression::{Expression, LogicalOp};
use crate::functions::FunctionRegistry;
use crate::lex::{self, TokenKind};
use crate::parse;
use crate::value::{Record, ScalarValue};

#[cfg(feature = "rayon")]
use rayon::prelude::{IntoParallelRefIterator, ParallelIterator};

/// Outcome of evaluating a formula against a record.
///
/// Exactly one of [`result`](Self::result) and [`error`](Self::error) is
/// present. Serializes as `{"result": bool | null, "error": string | null}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EvaluationResult {
    result: Option<bool>,
    error: Option<String>,
}

impl EvaluationResult {
    pub fn success(verdict: bool) -> Self {
        Self {
            result: Some(verdict),
            error: None,
        }
    }

    pub fn failure(error: &FormulaError) -> Self {
        Self {
            result: None,
            error: Some(error.to_string()),
        }
    }

    /// The verdict, if evaluation succeeded.
    pub fn result(&self) -> Option<bool> {
        self.result
    }

    /// The error message, if evaluation failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }

    pub fn into_result(self) -> Result<bool, String> {
        match (self.result, self.error) {
            (Some(verdict), _) => Ok(verdict),
            (None, error) => Err(error.unwrap_or_default()),
        }
    }
}

impl From<Result<bool, FormulaError>> for EvaluationResult {
    fn from(outcome: Result<bool, FormulaError>) -> Self {
        match outcome {
            Ok(verdict) => Self::success(verdict),
            Err(error) => Self::failure(&error),
        }
    }
}

/// A parsed formula that can be evaluated against many records.
#[derive(Clone, Debug, PartialEq)]
pub struct Formula {
    source: String,
    expression: Expression,
}

impl Formula {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// Record fields the formula reads.
    pub fn field_names(&self) -> BTreeSet<String> {
        self.expression.field_names()
    }

    /// Evaluates the formula and coerces the result to a verdict.
    pub fn evaluate(&self, scope: &Scope<'_>) -> Result<bool, FormulaError> {
        Ok(scope.eval(&self.expression)?.is_truthy())
    }
}

/// Everything one evaluation can see: the record, the instant `NOW()`
/// returns, and the callable functions.
pub struct Scope<'a> {
    record: &'a Record,
    now: DateTime<Utc>,
    registry: &'a FunctionRegistry,
}

impl<'a> Scope<'a> {
    pub fn new(record: &'a Record, now: DateTime<Utc>, registry: &'a FunctionRegistry) -> Self {
        Self {
            record,
            now,
            registry,
        }
    }

    pub fn record(&self) -> &Record {
        self.record
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    pub fn eval(&self, expression: &Expression) -> Result<ScalarValue, FormulaError> {
        match expression {
            Expression::Literal(value) => Ok(value.clone()),
            Expression::FieldRef(name) => Ok(self.record.get(name).clone()),
            Expression::Call { name, args } => self.registry.call(name, args, self),
            Expression::Not(only) => Ok(ScalarValue::Boolean(!self.eval(only)?.is_truthy())),
            Expression::Compare { op, left, right } => {
                let lhs = self.eval(left)?;
                let rhs = self.eval(right)?;
                lhs.compare(*op, &rhs).map(ScalarValue::Boolean)
            }
            Expression::Logical { op, left, right } => {
                let lhs = self.eval(left)?.is_truthy();
                let verdict = match (op, lhs) {
                    (LogicalOp::And, false) => false,
                    (LogicalOp::Or, true) => true,
                    _ => self.eval(right)?.is_truthy(),
                };
                Ok(ScalarValue::Boolean(verdict))
            }
        }
    }

    /// Evaluates `expression` and returns its text form.
    pub fn eval_text(&self, expression: &Expression) -> Result<String, FormulaError> {
        Ok(self.eval(expression)?.to_text())
    }
}

/// Compiles and evaluates guard-rule formulas.
///
/// Holds no per-call state, so one evaluator can be shared across threads.
#[derive(Clone, Debug)]
pub struct Evaluator {
    config: EvaluatorConfig,
    registry: Arc<FunctionRegistry>,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(EvaluatorConfig::default())
    }
}

impl Evaluator {
    /// An evaluator over the built-in functions.
    pub fn new(config: EvaluatorConfig) -> Self {
        Self {
            config,
            registry: FunctionRegistry::builtin(),
        }
    }

    pub fn with_registry(config: EvaluatorConfig, registry: FunctionRegistry) -> Self {
        Self {
            config,
            registry: Arc::new(registry),
        }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Lexes and parses `formula`, enforcing the configured limits.
    pub fn compile(&self, formula: &str) -> Result<Formula, FormulaError> {
        if formula.chars().count() > self.config.max_formula_length {
            return Err(FormulaError::TooLong {
                limit: self.config.max_formula_length,
            });
        }
        let tokens = lex::tokenize(formula)?;
        if tokens.iter().all(|token| token.kind == TokenKind::End) {
            return Err(FormulaError::EmptyExpression);
        }
        lex::check_nesting(&tokens, self.config.max_depth)?;
        let expression = parse::parse(formula, &tokens)?;
        Ok(Formula {
            source: formula.to_string(),
            expression,
        })
    }

    /// Evaluates `formula` against `record`, with `NOW()` reading the clock.
    pub fn evaluate(&self, formula: &str, record: &Record) -> EvaluationResult {
        self.evaluate_at(formula, record, Utc::now())
    }

    /// Evaluates `formula` against `record`, with `NOW()` returning `now`.
    pub fn evaluate_at(
        &self,
        formula: &str,
        record: &Record,
        now: DateTime<Utc>,
    ) -> EvaluationResult {
        let outcome = self
            .compile(formula)
            .and_then(|compiled| self.evaluate_compiled(&compiled, record, now));
        match &outcome {
            Ok(verdict) => tracing::debug!(formula, verdict, "evaluated formula"),
            Err(error) => {
                tracing::debug!(formula, kind = ?error.kind(), %error, "rejected formula")
            }
        }
        outcome.into()
    }

    pub fn evaluate_compiled(
        &self,
        formula: &Formula,
        record: &Record,
        now: DateTime<Utc>,
    ) -> Result<bool, FormulaError> {
        formula.evaluate(&Scope::new(record, now, &self.registry))
    }

    /// Evaluates one formula against each record. Every record sees the same
    /// `NOW()` instant.
    pub fn evaluate_many(&self, formula: &Formula, records: &[Record]) -> Vec<EvaluationResult> {
        let now = Utc::now();

        #[cfg(feature = "rayon")]
        let records = records.par_iter();
        #[cfg(not(feature = "rayon"))]
        let records = records.iter();

        records
            .map(|record| EvaluationResult::from(self.evaluate_compiled(formula, record, now)))
            .collect()
    }
}
