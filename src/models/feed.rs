//! Feed input submitted to `POST /validate`.

use axum::body::Bytes;

/// Content types accepted for an uploaded feed.
pub const ZIP_CONTENT_TYPES: &[&str] = &["application/zip", "application/x-zip-compressed"];

/// A feed uploaded as a multipart `file` part.
#[derive(Debug, Clone)]
pub struct UploadedFeed {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl UploadedFeed {
    pub fn is_zip(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase())
            .is_some_and(|ct| ZIP_CONTENT_TYPES.contains(&ct.as_str()))
    }
}

/// Raw submission as parsed from the request body, before resolution.
///
/// Empty file parts and empty URL strings are normalized to `None`.
#[derive(Debug, Clone, Default)]
pub struct FeedSubmission {
    pub upload: Option<UploadedFeed>,
    pub url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(content_type: Option<&str>) -> UploadedFeed {
        UploadedFeed {
            file_name: Some("feed.zip".into()),
            content_type: content_type.map(str::to_string),
            bytes: Bytes::from_static(b"PK"),
        }
    }

    #[test]
    fn zip_content_types() {
        assert!(upload(Some("application/zip")).is_zip());
        assert!(upload(Some("Application/ZIP; charset=binary")).is_zip());
        assert!(upload(Some("application/x-zip-compressed")).is_zip());
        assert!(!upload(Some("text/plain")).is_zip());
        assert!(!upload(None).is_zip());
    }
}
