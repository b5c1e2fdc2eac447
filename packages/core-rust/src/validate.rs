//! Field validator pipeline.
//!
//! [`validate`] walks a [`Value`] against its [`TypeDescriptor`]. Every declared
//! field of an object runs the caller-supplied validators first, then the
//! built-in rules (required, enum, min/max), then recurses into the field's own
//! shape. Array elements are walked with the element descriptor; the container
//! field's annotations are not applied to individual elements.
//!
//! Validation is fail-fast: the first failing field in declaration order is
//! reported.

use std::fmt;
use std::sync::Arc;

use regex::Regex;

use crate::schema::{FieldDescriptor, Kind, TypeDescriptor};
use crate::types::Value;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// The rule a value violated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Required,
    Enum,
    Min,
    Max,
    /// The value's structure does not match the descriptor (e.g. a string where an object is declared).
    Shape,
    /// A named custom validator.
    Custom(String),
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => f.write_str("required"),
            Self::Enum => f.write_str("enum"),
            Self::Min => f.write_str("min"),
            Self::Max => f.write_str("max"),
            Self::Shape => f.write_str("shape"),
            Self::Custom(name) => write!(f, "custom:{name}"),
        }
    }
}

/// A single rule failure reported by a [`FieldValidator`], before the walker
/// attaches the field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub rule: Rule,
    pub message: String,
}

impl Violation {
    #[must_use]
    pub fn new(rule: Rule, message: impl Into<String>) -> Self {
        Self {
            rule,
            message: message.into(),
        }
    }

    /// Violation of a named custom rule.
    #[must_use]
    pub fn custom(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Rule::Custom(name.into()), message)
    }
}

/// A failed validation, identifying the field path and the violated rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("validation failed at `{path}` ({rule}): {message}")]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `user.groups[1].name`.
    pub path: String,
    pub rule: Rule,
    pub message: String,
}

impl ValidationError {
    fn at(path: &str, violation: Violation) -> Self {
        Self {
            path: path.to_string(),
            rule: violation.rule,
            message: violation.message,
        }
    }
}

// ---------------------------------------------------------------------------
// FieldValidator
// ---------------------------------------------------------------------------

/// A per-field rule.
///
/// Implementations decide for themselves whether they apply to a field,
/// usually by checking [`FieldDescriptor::has_custom`].
pub trait FieldValidator: Send + Sync {
    /// Checks one field value.
    ///
    /// # Errors
    ///
    /// Returns the violation when the value breaks the rule.
    fn validate(&self, value: &Value, field: &FieldDescriptor) -> Result<(), Violation>;
}

impl<F> FieldValidator for F
where
    F: Fn(&Value, &FieldDescriptor) -> Result<(), Violation> + Send + Sync,
{
    fn validate(&self, value: &Value, field: &FieldDescriptor) -> Result<(), Violation> {
        self(value, field)
    }
}

/// Shared handle to a validator, as stored in dispatch options.
pub type SharedValidator = Arc<dyn FieldValidator>;

// ---------------------------------------------------------------------------
// Walker
// ---------------------------------------------------------------------------

/// Validates `value` against `schema`, running `validators` before the built-in rules on every field.
///
/// # Errors
///
/// Returns the first [`ValidationError`] encountered.
pub fn validate(
    value: &Value,
    schema: &TypeDescriptor,
    validators: &[SharedValidator],
) -> Result<(), ValidationError> {
    walk(value, schema, validators, "")
}

fn walk(
    value: &Value,
    schema: &TypeDescriptor,
    validators: &[SharedValidator],
    path: &str,
) -> Result<(), ValidationError> {
    match (schema.kind, value) {
        (_, Value::Null) => Ok(()),
        (Kind::Object, Value::Map(map)) => {
            for field in &schema.fields {
                let child = join_field(path, &field.name);
                let fv = map.get(&field.name).unwrap_or(&Value::Null);
                validate_field(fv, field, validators, &child)?;
            }
            Ok(())
        }
        (Kind::Array, Value::Array(items)) => {
            let Some(element) = schema.element.as_deref() else {
                return Ok(());
            };
            for (i, item) in items.iter().enumerate() {
                walk(item, element, validators, &format!("{path}[{i}]"))?;
            }
            Ok(())
        }
        (Kind::Object | Kind::Array, other) => Err(ValidationError::at(
            path,
            Violation::new(
                Rule::Shape,
                format!("expected {}, found {}", schema.kind, other.type_name()),
            ),
        )),
        _ => Ok(()),
    }
}

fn validate_field(
    value: &Value,
    field: &FieldDescriptor,
    validators: &[SharedValidator],
    path: &str,
) -> Result<(), ValidationError> {
    let apply = |v: &dyn FieldValidator| {
        v.validate(value, field)
            .map_err(|violation| ValidationError::at(path, violation))
    };
    for v in validators {
        apply(v.as_ref())?;
    }
    apply(&required)?;
    apply(&one_of)?;
    apply(&bounds)?;

    walk(value, &field.ty, validators, path)
}

fn join_field(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}

// ---------------------------------------------------------------------------
// Built-in rules
// ---------------------------------------------------------------------------

/// Non-optional fields must hold a non-zero value for their kind.
///
/// # Errors
///
/// Returns a [`Rule::Required`] violation for zero values.
pub fn required(value: &Value, field: &FieldDescriptor) -> Result<(), Violation> {
    if field.optional || !is_zero(value, field.ty.kind) {
        return Ok(());
    }
    let what = match value {
        Value::Array(_) | Value::Map(_) => "empty",
        Value::Null => "missing",
        _ => "zero",
    };
    Err(Violation::new(
        Rule::Required,
        format!("field {} is required but {what}", field.name),
    ))
}

/// Scalar fields with declared enum values must render to one of them.
///
/// # Errors
///
/// Returns a [`Rule::Enum`] violation for values outside the set, or when an
/// enum is declared on an object or array field.
pub fn one_of(value: &Value, field: &FieldDescriptor) -> Result<(), Violation> {
    if field.enum_values.is_empty() || value.is_null() {
        return Ok(());
    }
    if !field.ty.kind.is_scalar() {
        return Err(Violation::new(
            Rule::Enum,
            format!(
                "field {} has enum constraint but is {} type",
                field.name, field.ty.kind
            ),
        ));
    }
    let rendered = value.to_string();
    if field.enum_values.iter().any(|allowed| *allowed == rendered) {
        return Ok(());
    }
    Err(Violation::new(
        Rule::Enum,
        format!(
            "field {} has value {rendered} which is not in enum [{}]",
            field.name,
            field.enum_values.join(", ")
        ),
    ))
}

/// Numeric fields must respect `min`/`max`, compared in the value's own domain.
///
/// # Errors
///
/// Returns a [`Rule::Min`] or [`Rule::Max`] violation naming the value and the limit.
pub fn bounds(value: &Value, field: &FieldDescriptor) -> Result<(), Violation> {
    match *value {
        Value::Int(i) => check_bounds(i128::from(i), field, |b| i128::from(b)),
        Value::Uint(u) => check_bounds(i128::from(u), field, |b| i128::from(b)),
        #[allow(clippy::cast_precision_loss)]
        Value::Float(x) => check_bounds(x, field, |b| b as f64),
        _ => Ok(()),
    }
}

fn check_bounds<N>(n: N, field: &FieldDescriptor, widen: impl Fn(i64) -> N) -> Result<(), Violation>
where
    N: PartialOrd + fmt::Display + Copy,
{
    if let Some(min) = field.min {
        if n < widen(min) {
            return Err(Violation::new(
                Rule::Min,
                format!("field {} has value {n} which is less than min {min}", field.name),
            ));
        }
    }
    if let Some(max) = field.max {
        if n > widen(max) {
            return Err(Violation::new(
                Rule::Max,
                format!("field {} has value {n} which is greater than max {max}", field.name),
            ));
        }
    }
    Ok(())
}

/// Whether `value` is the zero value of `kind`.
///
/// Maps are zero when every entry is zero; `time` values are zero at the Unix epoch.
#[must_use]
pub fn is_zero(value: &Value, kind: Kind) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Int(i) => *i == 0,
        Value::Uint(u) => *u == 0,
        Value::Float(x) => *x == 0.0,
        Value::String(s) if kind == Kind::Time => {
            s.is_empty()
                || chrono::DateTime::parse_from_rfc3339(s).is_ok_and(|t| t.timestamp() == 0 && t.timestamp_subsec_nanos() == 0)
        }
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Map(map) => map.values().all(|v| is_zero(v, Kind::Object)),
    }
}

// ---------------------------------------------------------------------------
// PatternValidator
// ---------------------------------------------------------------------------

/// Named custom validator that matches string fields against a regular expression.
///
/// Applies only to fields that list its name under `custom:`.
#[derive(Debug, Clone)]
pub struct PatternValidator {
    name: String,
    pattern: Regex,
}

impl PatternValidator {
    /// # Errors
    ///
    /// Returns an error if `pattern` is not a valid regular expression.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            pattern: Regex::new(pattern)?,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FieldValidator for PatternValidator {
    fn validate(&self, value: &Value, field: &FieldDescriptor) -> Result<(), Violation> {
        if !field.has_custom(&self.name) {
            return Ok(());
        }
        match value {
            Value::Null => Ok(()),
            Value::String(s) if self.pattern.is_match(s) => Ok(()),
            Value::String(s) => Err(Violation::custom(
                &self.name,
                format!(
                    "field {} has value {s} which does not match /{}/",
                    field.name,
                    self.pattern.as_str()
                ),
            )),
            other => Err(Violation::custom(
                &self.name,
                format!("field {} must be a string, found {}", field.name, other.type_name()),
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
