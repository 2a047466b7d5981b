//! Validation report representations returned by `POST /validate`.

use std::str::FromStr;

use axum::{
    Json,
    response::{Html, IntoResponse, Response},
};
use serde_json::{Value, json};

use crate::error::AppError;

/// File the validator must write into its output directory.
pub const JSON_REPORT_FILE: &str = "report.json";

/// File the validator may write into its output directory.
pub const HTML_REPORT_FILE: &str = "report.html";

/// Severity value selected by the `errors` format.
pub const ERROR_SEVERITY: &str = "ERROR";

/// Report shape requested by the caller via `?format=`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportFormat {
    /// Full structured report (`report.json`)
    #[default]
    Json,
    /// Rendered report (`report.html`)
    Html,
    /// Only the ERROR-severity notices from `report.json`
    Errors,
}

impl FromStr for ReportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "html" => Ok(Self::Html),
            "errors" => Ok(Self::Errors),
            _ => Err(AppError::InvalidInput(
                "Invalid format parameter.".to_string(),
            )),
        }
    }
}

/// A report read out of the validator's output directory.
///
/// Held in memory so the workspace can be removed before responding.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationReport {
    Json(Value),
    Html(String),
    Errors(Vec<Value>),
}

impl ValidationReport {
    /// Select the ERROR-severity entries of a structured report's `notices`.
    pub fn errors_from(report: &Value) -> Self {
        let errors = report
            .get("notices")
            .and_then(Value::as_array)
            .map(|notices| {
                notices
                    .iter()
                    .filter(|n| n.get("severity").and_then(Value::as_str) == Some(ERROR_SEVERITY))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Self::Errors(errors)
    }
}

impl IntoResponse for ValidationReport {
    fn into_response(self) -> Response {
        match self {
            ValidationReport::Json(report) => Json(report).into_response(),
            ValidationReport::Html(page) => Html(page).into_response(),
            ValidationReport::Errors(errors) => Json(json!({ "errors": errors })).into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_formats() {
        assert_eq!("json".parse::<ReportFormat>().unwrap(), ReportFormat::Json);
        assert_eq!("html".parse::<ReportFormat>().unwrap(), ReportFormat::Html);
        assert_eq!("errors".parse::<ReportFormat>().unwrap(), ReportFormat::Errors);
        assert!("xml".parse::<ReportFormat>().is_err());
    }

    #[test]
    fn errors_keeps_only_error_severity() {
        let report = json!({
            "notices": [
                { "code": "missing_required_file", "severity": "ERROR" },
                { "code": "unused_shape", "severity": "WARNING" },
                { "code": "feed_expiration_date", "severity": "INFO" },
                { "code": "duplicate_key", "severity": "ERROR" }
            ]
        });

        let ValidationReport::Errors(errors) = ValidationReport::errors_from(&report) else {
            panic!("expected errors report");
        };
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0]["code"], "missing_required_file");
        assert_eq!(errors[1]["code"], "duplicate_key");
    }

    #[test]
    fn errors_tolerates_missing_notices() {
        assert_eq!(
            ValidationReport::errors_from(&json!({ "summary": {} })),
            ValidationReport::Errors(Vec::new())
        );
    }
}
