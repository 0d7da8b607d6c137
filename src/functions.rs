use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveTime, TimeZone, Utc};
use once_cell::sync::Lazy;

use crate::error::FormulaError;
use crate::evaluate::Scope;
use crate::expression::Expression;
use crate::value::ScalarValue;

/// Implementation of a formula function.
///
/// Arguments arrive unevaluated so that a function may evaluate only the ones
/// it needs through `scope`.
pub type FunctionImpl = fn(&[Expression], &Scope<'_>) -> Result<ScalarValue, FormulaError>;

/// A named function with its accepted argument count.
#[derive(Clone, Copy)]
pub struct FunctionDescriptor {
    name: &'static str,
    min_arity: usize,
    max_arity: usize,
    call: FunctionImpl,
}

impl FunctionDescriptor {
    pub const fn new(
        name: &'static str,
        min_arity: usize,
        max_arity: usize,
        call: FunctionImpl,
    ) -> Self {
        Self {
            name,
            min_arity,
            max_arity,
            call,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn min_arity(&self) -> usize {
        self.min_arity
    }

    pub fn max_arity(&self) -> usize {
        self.max_arity
    }

    fn expected_arity(&self) -> String {
        if self.min_arity == self.max_arity {
            self.min_arity.to_string()
        } else {
            format!("{} to {}", self.min_arity, self.max_arity)
        }
    }
}

impl fmt::Debug for FunctionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDescriptor")
            .field("name", &self.name)
            .field("min_arity", &self.min_arity)
            .field("max_arity", &self.max_arity)
            .finish_non_exhaustive()
    }
}

const BUILTIN_FUNCTIONS: &[FunctionDescriptor] = &[
    FunctionDescriptor::new("ISBLANK", 1, 1, isblank),
    FunctionDescriptor::new("ISNUMBER", 1, 1, isnumber),
    FunctionDescriptor::new("CONTAINS", 2, 2, contains),
    FunctionDescriptor::new("BEGINS", 2, 2, begins),
    FunctionDescriptor::new("LEN", 1, 1, len),
    FunctionDescriptor::new("UPPER", 1, 1, upper),
    FunctionDescriptor::new("LOWER", 1, 1, lower),
    FunctionDescriptor::new("TRIM", 1, 1, trim),
    FunctionDescriptor::new("NOW", 0, 0, now),
    FunctionDescriptor::new("TODAY", 0, 0, today),
    FunctionDescriptor::new("IF", 2, 3, if_),
];

static BUILTINS: Lazy<Arc<FunctionRegistry>> =
    Lazy::new(|| Arc::new(FunctionRegistry::with_builtins()));

/// Read-only table of callable functions, keyed case-insensitively.
#[derive(Clone, Debug, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, FunctionDescriptor>,
}

impl FunctionRegistry {
    /// A registry with no functions.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A fresh registry holding the built-in functions, for extending with
    /// [`register`](Self::register).
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for descriptor in BUILTIN_FUNCTIONS {
            registry.register(*descriptor);
        }
        registry
    }

    /// The shared built-in registry, constructed on first use.
    pub fn builtin() -> Arc<Self> {
        Arc::clone(&BUILTINS)
    }

    /// Adds or replaces a function.
    pub fn register(&mut self, descriptor: FunctionDescriptor) -> &mut Self {
        self.functions
            .insert(descriptor.name.to_ascii_uppercase(), descriptor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&FunctionDescriptor> {
        self.functions.get(&name.to_ascii_uppercase())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.values().map(|descriptor| descriptor.name)
    }

    /// Checks arity and invokes the function named `name`.
    pub fn call(
        &self,
        name: &str,
        args: &[Expression],
        scope: &Scope<'_>,
    ) -> Result<ScalarValue, FormulaError> {
        let descriptor = self.get(name).ok_or_else(|| FormulaError::UnknownFunction {
            name: name.to_string(),
        })?;
        if args.len() < descriptor.min_arity || args.len() > descriptor.max_arity {
            return Err(FormulaError::Arity {
                name: descriptor.name.to_string(),
                expected: descriptor.expected_arity(),
                found: args.len(),
            });
        }
        tracing::trace!(function = descriptor.name, args = args.len(), "calling function");
        (descriptor.call)(args, scope)
    }
}

fn arity(name: &str, expected: &str, args: &[Expression]) -> FormulaError {
    FormulaError::Arity {
        name: name.to_string(),
        expected: expected.to_string(),
        found: args.len(),
    }
}

fn isblank(args: &[Expression], scope: &Scope<'_>) -> Result<ScalarValue, FormulaError> {
    let [value] = args else {
        return Err(arity("ISBLANK", "1", args));
    };
    Ok(ScalarValue::Boolean(scope.eval(value)?.is_blank()))
}

fn isnumber(args: &[Expression], scope: &Scope<'_>) -> Result<ScalarValue, FormulaError> {
    let [value] = args else {
        return Err(arity("ISNUMBER", "1", args));
    };
    Ok(ScalarValue::Boolean(scope.eval(value)?.as_number().is_some()))
}

/// Case-sensitive substring test.
fn contains(args: &[Expression], scope: &Scope<'_>) -> Result<ScalarValue, FormulaError> {
    let [haystack, needle] = args else {
        return Err(arity("CONTAINS", "2", args));
    };
    let haystack = scope.eval_text(haystack)?;
    let needle = scope.eval_text(needle)?;
    Ok(ScalarValue::Boolean(haystack.contains(&needle)))
}

fn begins(args: &[Expression], scope: &Scope<'_>) -> Result<ScalarValue, FormulaError> {
    let [text, prefix] = args else {
        return Err(arity("BEGINS", "2", args));
    };
    let text = scope.eval_text(text)?;
    let prefix = scope.eval_text(prefix)?;
    Ok(ScalarValue::Boolean(text.starts_with(&prefix)))
}

/// Length in characters of the text form.
fn len(args: &[Expression], scope: &Scope<'_>) -> Result<ScalarValue, FormulaError> {
    let [value] = args else {
        return Err(arity("LEN", "1", args));
    };
    let text = scope.eval_text(value)?;
    Ok(ScalarValue::Number(text.chars().count() as f64))
}

fn upper(args: &[Expression], scope: &Scope<'_>) -> Result<ScalarValue, FormulaError> {
    let [value] = args else {
        return Err(arity("UPPER", "1", args));
    };
    Ok(ScalarValue::String(scope.eval_text(value)?.to_uppercase()))
}

fn lower(args: &[Expression], scope: &Scope<'_>) -> Result<ScalarValue, FormulaError> {
    let [value] = args else {
        return Err(arity("LOWER", "1", args));
    };
    Ok(ScalarValue::String(scope.eval_text(value)?.to_lowercase()))
}

fn trim(args: &[Expression], scope: &Scope<'_>) -> Result<ScalarValue, FormulaError> {
    let [value] = args else {
        return Err(arity("TRIM", "1", args));
    };
    Ok(ScalarValue::String(scope.eval_text(value)?.trim().to_string()))
}

fn now(_args: &[Expression], scope: &Scope<'_>) -> Result<ScalarValue, FormulaError> {
    Ok(ScalarValue::Date(scope.now()))
}

/// Midnight UTC of the evaluation instant.
fn today(_args: &[Expression], scope: &Scope<'_>) -> Result<ScalarValue, FormulaError> {
    let midnight = scope.now().date_naive().and_time(NaiveTime::MIN);
    Ok(ScalarValue::Date(Utc.from_utc_datetime(&midnight)))
}

/// `IF(condition, then[, else])`; only the chosen branch is evaluated.
fn if_(args: &[Expression], scope: &Scope<'_>) -> Result<ScalarValue, FormulaError> {
    let (condition, then, otherwise) = match args {
        [condition, then] => (condition, then, None),
        [condition, then, otherwise] => (condition, then, Some(otherwise)),
        _ => return Err(arity("IF", "2 to 3", args)),
    };
    if scope.eval(condition)?.is_truthy() {
        scope.eval(then)
    } else {
        otherwise.map_or(Ok(ScalarValue::Null), |otherwise| scope.eval(otherwise))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Record;
    use chrono::DateTime;

    fn instant() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 15, 30, 0).unwrap()
    }

    fn field(name: &str) -> Expression {
        Expression::FieldRef(name.into())
    }

    fn text(value: &str) -> Expression {
        Expression::Literal(value.into())
    }

    fn call(
        registry: &FunctionRegistry,
        name: &str,
        args: &[Expression],
        record: &Record,
    ) -> Result<ScalarValue, FormulaError> {
        let scope = Scope::new(record, instant(), registry);
        registry.call(name, args, &scope)
    }

    #[test]
    fn isblank_truth_table() {
        let registry = FunctionRegistry::with_builtins();
        let record = Record::new()
            .with("empty", "")
            .with("space", " ")
            .with("zero", 0)
            .with("no", false)
            .with("null", ScalarValue::Null)
            .with("date", instant());
        for (name, blank) in [
            ("missing", true),
            ("null", true),
            ("empty", true),
            ("space", false),
            ("zero", false),
            ("no", false),
            ("date", false),
        ] {
            assert_eq!(
                call(&registry, "ISBLANK", &[field(name)], &record).unwrap(),
                ScalarValue::Boolean(blank),
                "{name}"
            );
        }
    }

    #[test]
    fn text_functions() {
        let registry = FunctionRegistry::with_builtins();
        let record = Record::new()
            .with("email", "Ada@Example.com")
            .with("amount", 1234.5);

        let check = |name: &str, args: &[Expression], expected: ScalarValue| {
            assert_eq!(call(&registry, name, args, &record).unwrap(), expected, "{name}");
        };
        check("CONTAINS", &[field("email"), text("@")], true.into());
        check("CONTAINS", &[field("email"), text("example")], false.into());
        check("CONTAINS", &[field("amount"), text(".5")], true.into());
        check("BEGINS", &[field("email"), text("Ada")], true.into());
        check("LEN", &[field("email")], 15.into());
        check("LEN", &[field("amount")], 6.into());
        check("LEN", &[field("missing")], 0.into());
        check("LEN", &[text("héllo")], 5.into());
        check("UPPER", &[field("email")], "ADA@EXAMPLE.COM".into());
        check("LOWER", &[field("email")], "ada@example.com".into());
        check("TRIM", &[text("  padded ")], "padded".into());
        check("ISNUMBER", &[text(" 42 ")], true.into());
        check("ISNUMBER", &[field("email")], false.into());
    }

    #[test]
    fn clock_functions_use_scope_instant() {
        let registry = FunctionRegistry::with_builtins();
        let record = Record::new();
        assert_eq!(
            call(&registry, "NOW", &[], &record).unwrap(),
            ScalarValue::Date(instant())
        );
        assert_eq!(
            call(&registry, "TODAY", &[], &record).unwrap(),
            ScalarValue::Date(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn if_evaluates_only_the_chosen_branch() {
        let registry = FunctionRegistry::with_builtins();
        let record = Record::new().with("vip", true);
        let failing = Expression::Call {
            name: "UNKNOWN_FN".into(),
            args: vec![],
        };
        assert_eq!(
            call(&registry, "IF", &[field("vip"), text("yes"), failing.clone()], &record).unwrap(),
            "yes".into()
        );
        assert_eq!(
            call(&registry, "IF", &[field("missing"), failing], &record).unwrap(),
            ScalarValue::Null
        );
    }

    #[test]
    fn names_are_case_insensitive() {
        let registry = FunctionRegistry::with_builtins();
        assert!(registry.contains("isBlank"));
        assert_eq!(registry.get("len").map(FunctionDescriptor::name), Some("LEN"));
        assert_eq!(registry.names().count(), BUILTIN_FUNCTIONS.len());
    }

    #[test]
    fn unknown_function_and_arity() {
        let registry = FunctionRegistry::with_builtins();
        let record = Record::new();
        assert_eq!(
            call(&registry, "UNKNOWN_FN", &[field("x")], &record).unwrap_err(),
            FormulaError::UnknownFunction {
                name: "UNKNOWN_FN".into()
            }
        );
        assert_eq!(
            call(&registry, "len", &[], &record).unwrap_err().to_string(),
            "LEN expects 1 argument(s), got 0"
        );
        assert_eq!(
            call(&registry, "IF", &[field("x")], &record)
                .unwrap_err()
                .to_string(),
            "IF expects 2 to 3 argument(s), got 1"
        );
    }

    #[test]
    fn registry_can_be_extended() {
        fn always(_args: &[Expression], _scope: &Scope<'_>) -> Result<ScalarValue, FormulaError> {
            Ok(ScalarValue::Boolean(true))
        }

        let mut registry = FunctionRegistry::empty();
        assert!(!registry.contains("ISBLANK"));
        registry.register(FunctionDescriptor::new("ALWAYS", 0, 0, always));
        assert_eq!(
            call(&registry, "always", &[], &Record::new()).unwrap(),
            ScalarValue::Boolean(true)
        );
    }

    #[test]
    fn builtins_check_their_own_arguments() {
        fn loose_len(args: &[Expression], scope: &Scope<'_>) -> Result<ScalarValue, FormulaError> {
            len(args, scope)
        }

        let mut registry = FunctionRegistry::with_builtins();
        registry.register(FunctionDescriptor::new("LEN", 0, 3, loose_len));
        let record = Record::new();
        assert_eq!(
            call(&registry, "LEN", &[], &record).unwrap_err().to_string(),
            "LEN expects 1 argument(s), got 0"
        );
        assert_eq!(
            call(&registry, "LEN", &[text("a"), text("b")], &record)
                .unwrap_err()
                .to_string(),
            "LEN expects 1 argument(s), got 2"
        );

        let scope = Scope::new(&record, instant(), &registry);
        assert!(matches!(
            contains(&[text("a")], &scope),
            Err(FormulaError::Arity { found: 1, .. })
        ));
        assert!(matches!(
            if_(&[], &scope),
            Err(FormulaError::Arity { found: 0, .. })
        ));
        assert_eq!(registry.get("len").map(FunctionDescriptor::max_arity), Some(3));
    }
}
