//! `POST /validate`: run the external validator against a submitted feed.

use std::collections::HashMap;

use axum::{
    Extension, Form,
    extract::{FromRequest, Multipart, Query, Request, State},
    http::header,
};
use serde::Deserialize;

use crate::{
    error::AppError,
    middleware::admission::CallerContext,
    models::{
        feed::{FeedSubmission, UploadedFeed},
        report::{ReportFormat, ValidationReport},
    },
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ValidateQuery {
    pub format: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Reads `file` and `url` parts from a multipart body, or `url` from a
/// urlencoded one. Any other body yields an empty submission.
impl<S> FromRequest<S> for FeedSubmission
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| AppError::InvalidInput(e.body_text()))?;
            read_multipart(multipart).await
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(mut fields) = Form::<HashMap<String, String>>::from_request(req, state)
                .await
                .map_err(|e| AppError::InvalidInput(e.body_text()))?;
            Ok(FeedSubmission {
                upload: None,
                url: non_empty(fields.remove("url")),
            })
        } else {
            Ok(FeedSubmission::default())
        }
    }
}

async fn read_multipart(mut multipart: Multipart) -> Result<FeedSubmission, AppError> {
    let mut submission = FeedSubmission::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidInput(format!("Malformed multipart body: {e}")))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = non_empty(field.file_name().map(str::to_string));
                let content_type = field.content_type().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("Failed to read uploaded file: {e}")))?;

                // Browsers send an empty, unnamed part when no file was chosen.
                if bytes.is_empty() && file_name.is_none() {
                    continue;
                }
                submission.upload = Some(UploadedFeed {
                    file_name,
                    content_type,
                    bytes,
                });
            }
            Some("url") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| AppError::InvalidInput(format!("Failed to read url field: {e}")))?;
                submission.url = non_empty(Some(text));
            }
            _ => {}
        }
    }

    Ok(submission)
}

/// Validate a GTFS feed given as an uploaded file or a URL.
///
/// # Query
///
/// - `format`: `json` (default), `html` or `errors`
///
/// # Errors
///
/// - 400 for missing, conflicting or malformed input
/// - 401 / 429 from the admission layer
/// - 500 if the validator fails or the requested report is absent
pub async fn validate(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerContext>,
    Query(query): Query<ValidateQuery>,
    submission: FeedSubmission,
) -> Result<ValidationReport, AppError> {
    let format = match query.format.as_deref() {
        Some(raw) => raw.parse::<ReportFormat>()?,
        None => ReportFormat::default(),
    };

    tracing::info!(
        origin = %caller.origin,
        key_id = ?caller.identity.as_ref().map(|i| i.key_id),
        tier = ?caller.tier,
        ?format,
        "validation requested"
    );

    state.validation.run(submission, format).await.inspect_err(|e| {
        if matches!(e, AppError::Database(_) | AppError::Io(_) | AppError::Internal(_)) {
            tracing::error!(origin = %caller.origin, error = %e, "validation crashed");
        }
    })
}
