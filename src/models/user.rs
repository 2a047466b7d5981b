//! User model and email normalization.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::AppError;

/// A user, identified by lowercased email.
///
/// # Database Table
///
/// Maps to the `users` table. Rows are created on the first key request and
/// only ever change from unverified to verified.
#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct User {
    pub email: String,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(email: impl Into<String>, is_verified: bool) -> Self {
        Self {
            email: email.into(),
            is_verified,
            created_at: Utc::now(),
        }
    }
}

/// Normalize an email address into the identity key used by every table.
///
/// Trims surrounding whitespace and lowercases. Rejects values that are
/// obviously not addresses; deliverability is left to the mail provider.
pub fn normalize_email(raw: &str) -> Result<String, AppError> {
    let email = raw.trim().to_lowercase();

    let valid = email.len() <= 254
        && !email.chars().any(char::is_whitespace)
        && match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            }
            None => false,
        };

    if !valid {
        return Err(AppError::InvalidInput(
            "A valid email address must be provided.".to_string(),
        ));
    }

    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_trims() {
        assert_eq!(
            normalize_email("  Alice@Example.COM ").unwrap(),
            "alice@example.com"
        );
    }

    #[test]
    fn rejects_malformed_addresses() {
        for raw in ["", "alice", "@example.com", "alice@", "alice@example", "a b@example.com", "a@b@example.com"] {
            assert!(normalize_email(raw).is_err(), "{raw} should be rejected");
        }
    }
}
