use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::http::{IntoResponse, Json, Response, StatusCode};
use crate::types::BoxFuture;

// ── Error types ────────────────────────────────────────────

/// A field-level validation violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
    pub code: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code: code.into(),
        }
    }
}

/// Structured validation failure, rendered as a 400 with per-field details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    pub violations: Vec<FieldViolation>,
}

impl ValidationFailure {
    pub fn new(violations: Vec<FieldViolation>) -> Self {
        Self { violations }
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>, code: impl Into<String>) -> Self {
        Self::new(vec![FieldViolation::new(field, message, code)])
    }

    /// Fill in the field name for violations that were raised against the
    /// value as a whole.
    pub fn scoped(mut self, field: &str) -> Self {
        for violation in &mut self.violations {
            if violation.field.is_empty() {
                violation.field = field.to_string();
            }
        }
        self
    }
}

impl std::fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation failed: {} violation(s)", self.violations.len())
    }
}

impl std::error::Error for ValidationFailure {}

impl IntoResponse for ValidationFailure {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "status": "error",
            "error": {
                "code": "VALIDATION_ERROR",
                "message": "Validation failed",
                "details": self.violations,
            }
        });
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

// ── Schema seam ────────────────────────────────────────────

/// Validates (and possibly normalizes) a raw parameter value.
///
/// `parse` is async so schemas backed by remote lookups fit the same seam.
pub trait Schema: Send + Sync + 'static {
    fn parse<'a>(&'a self, value: Value) -> BoxFuture<'a, Result<Value, ValidationFailure>>;
}

/// Schema backed by a `garde`-validated, serde-deserializable type.
///
/// The raw value is deserialized into `T`, validated, and re-serialized so
/// the handler receives the normalized form.
pub struct GardeSchema<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> GardeSchema<T> {
    pub fn new() -> Self {
        Self { _marker: PhantomData }
    }
}

impl<T> Default for GardeSchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Schema for GardeSchema<T>
where
    T: DeserializeOwned + Serialize + garde::Validate + 'static,
    T::Context: Default,
{
    fn parse<'a>(&'a self, value: Value) -> BoxFuture<'a, Result<Value, ValidationFailure>> {
        Box::pin(async move {
            let typed: T = serde_json::from_value(value)
                .map_err(|e| ValidationFailure::single("", e.to_string(), "invalid_type"))?;
            typed.validate().map_err(|report| convert_garde_report(&report))?;
            serde_json::to_value(&typed)
                .map_err(|e| ValidationFailure::single("", e.to_string(), "invalid_type"))
        })
    }
}

fn convert_garde_report(report: &garde::Report) -> ValidationFailure {
    let violations = report
        .iter()
        .map(|(path, error)| FieldViolation {
            field: path.to_string(),
            message: error.message().to_string(),
            code: "validation".to_string(),
        })
        .collect();
    ValidationFailure::new(violations)
}

// Re-export garde::Validate for convenience.
pub use garde::Validate;

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, garde::Validate)]
    struct NewRegion {
        #[garde(length(min = 2))]
        name: String,
        #[garde(range(min = 0))]
        population: i64,
    }

    #[tokio::test]
    async fn garde_schema_accepts_valid_value() {
        let schema = GardeSchema::<NewRegion>::new();
        let parsed = schema
            .parse(serde_json::json!({"name": "North", "population": 10}))
            .await
            .unwrap();
        assert_eq!(parsed["name"], "North");
    }

    #[tokio::test]
    async fn garde_schema_reports_each_field() {
        let schema = GardeSchema::<NewRegion>::new();
        let err = schema
            .parse(serde_json::json!({"name": "N", "population": -1}))
            .await
            .unwrap_err();
        let fields: Vec<_> = err.violations.iter().map(|v| v.field.as_str()).collect();
        assert!(fields.contains(&"name"));
        assert!(fields.contains(&"population"));
    }

    #[tokio::test]
    async fn type_errors_are_scoped_by_caller() {
        let schema = GardeSchema::<NewRegion>::new();
        let err = schema
            .parse(serde_json::json!({"name": 3}))
            .await
            .unwrap_err()
            .scoped("body");
        assert_eq!(err.violations.len(), 1);
        assert_eq!(err.violations[0].field, "body");
        assert_eq!(err.violations[0].code, "invalid_type");
    }
}
