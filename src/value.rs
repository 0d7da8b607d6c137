use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Timelike, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::{FormulaError, RecordError};
use crate::expression::CompareOp;

/// A dynamically-typed record field or intermediate result.
///
/// Serializes untagged, so a date becomes its RFC 3339 string. Inbound JSON
/// goes through [`Record::from_json`], which reads strings as strings.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ScalarValue {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Date(DateTime<Utc>),
}

static NULL: ScalarValue = ScalarValue::Null;

impl ScalarValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Date(_) => "date",
        }
    }

    /// Null or the empty string.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// `Null`, `""`, `0` and `false` are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Boolean(b) => *b,
            Self::Number(n) => *n != 0.0,
            Self::String(s) => !s.is_empty(),
            Self::Date(_) => true,
        }
    }

    /// Numbers, and strings that parse as a finite number once trimmed.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n).filter(|n| n.is_finite()),
            Self::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            _ => None,
        }
    }

    /// Dates, and strings in one of the accepted date formats (read as UTC).
    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Date(d) => Some(*d),
            Self::String(s) => parse_date(s),
            _ => None,
        }
    }

    fn is_date(&self) -> bool {
        matches!(self, Self::Date(_))
    }

    fn is_textual(&self) -> bool {
        matches!(self, Self::String(_) | Self::Number(_))
    }

    /// Text form used by string functions and text comparison. Null is empty.
    pub fn to_text(&self) -> String {
        self.to_string()
    }

    /// Compares two values with `op`.
    ///
    /// Coercion order, first match wins:
    ///
    /// 1. If either side is a date, both sides are read as dates.
    /// 2. If both sides read as finite numbers, they are compared numerically.
    /// 3. If both sides are strings or numbers, their text forms are compared.
    /// 4. Booleans equal booleans, and blank (null or `""`) equals blank.
    ///
    /// Equality is total: pairs that match no rule are unequal. For ordering
    /// operators a blank operand yields `false`, and any other pair that
    /// matches no rule is a [`FormulaError::TypeMismatch`].
    pub fn compare(&self, op: CompareOp, other: &Self) -> Result<bool, FormulaError> {
        match op {
            CompareOp::Equal => Ok(self.loosely_equals(other)),
            CompareOp::NotEqual => Ok(!self.loosely_equals(other)),
            _ => Ok(self
                .ordering(op, other)?
                .map_or(false, |ordering| op.accepts(ordering))),
        }
    }

    fn loosely_equals(&self, other: &Self) -> bool {
        if self.is_date() || other.is_date() {
            return match (self.as_date(), other.as_date()) {
                (Some(lhs), Some(rhs)) => lhs == rhs,
                _ => false,
            };
        }
        if let (Some(lhs), Some(rhs)) = (self.as_number(), other.as_number()) {
            return lhs == rhs;
        }
        match (self, other) {
            (lhs, rhs) if lhs.is_textual() && rhs.is_textual() => lhs.to_text() == rhs.to_text(),
            (Self::Boolean(lhs), Self::Boolean(rhs)) => lhs == rhs,
            (lhs, rhs) => lhs.is_blank() && rhs.is_blank(),
        }
    }

    fn ordering(&self, op: CompareOp, other: &Self) -> Result<Option<Ordering>, FormulaError> {
        if self.is_blank() || other.is_blank() {
            return Ok(None);
        }
        if self.is_date() || other.is_date() {
            return match (self.as_date(), other.as_date()) {
                (Some(lhs), Some(rhs)) => Ok(Some(lhs.cmp(&rhs))),
                _ => Err(self.mismatch(op, other)),
            };
        }
        if let (Some(lhs), Some(rhs)) = (self.as_number(), other.as_number()) {
            return Ok(lhs.partial_cmp(&rhs));
        }
        if self.is_textual() && other.is_textual() {
            return Ok(Some(self.to_text().cmp(&other.to_text())));
        }
        Err(self.mismatch(op, other))
    }

    fn mismatch(&self, op: CompareOp, other: &Self) -> FormulaError {
        FormulaError::TypeMismatch {
            op: op.symbol(),
            left: self.type_name(),
            right: other.type_name(),
        }
    }

    fn from_json(field: &str, value: Value) -> Result<Self, RecordError> {
        Ok(match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Boolean(b),
            Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            Value::String(s) => Self::String(s),
            Value::Array(_) | Value::Object(_) => {
                return Err(RecordError::NestedValue {
                    field: field.to_string(),
                })
            }
        })
    }
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
            Self::Date(d) if d.num_seconds_from_midnight() == 0 && d.nanosecond() == 0 => {
                write!(f, "{}", d.format("%Y-%m-%d"))
            }
            Self::Date(d) => f.write_str(&d.to_rfc3339_opts(SecondsFormat::Secs, true)),
        }
    }
}

fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(date_time) = DateTime::parse_from_rfc3339(text) {
        return Some(date_time.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

impl From<&str> for ScalarValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for ScalarValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for ScalarValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for ScalarValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<i32> for ScalarValue {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<bool> for ScalarValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<DateTime<Utc>> for ScalarValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Date(value)
    }
}

/// Field values of the entity being validated.
///
/// Lookups never fail: a field that is not present reads as
/// [`ScalarValue::Null`].
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: HashMap<String, ScalarValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, field: &str) -> &ScalarValue {
        self.fields.get(field).unwrap_or(&NULL)
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn insert(
        &mut self,
        field: impl Into<String>,
        value: impl Into<ScalarValue>,
    ) -> Option<ScalarValue> {
        self.fields.insert(field.into(), value.into())
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<ScalarValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Builds a record from a JSON object of scalar fields.
    pub fn from_json(value: Value) -> Result<Self, RecordError> {
        let Value::Object(map) = value else {
            return Err(RecordError::NotAnObject);
        };
        let fields = map
            .into_iter()
            .map(|(field, value)| {
                let scalar = ScalarValue::from_json(&field, value)?;
                Ok((field, scalar))
            })
            .collect::<Result<_, RecordError>>()?;
        Ok(Self { fields })
    }

    /// Parses sample record JSON such as `{"email": "", "discount": 35}`.
    pub fn from_json_str(input: &str) -> Result<Self, RecordError> {
        Self::from_json(serde_json::from_str(input)?)
    }
}

impl TryFrom<Value> for Record {
    type Error = RecordError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::from_json(value)
    }
}

impl<K: Into<String>, V: Into<ScalarValue>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            fields: iter
                .into_iter()
                .map(|(field, value)| (field.into(), value.into()))
                .collect(),
        }
    }
}
