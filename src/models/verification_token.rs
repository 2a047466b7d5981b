//! Single-use email verification tokens.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// A verification token record.
///
/// # Database Table
///
/// Maps to the `verification_tokens` table. `token_value` carries a unique
/// index so consumption is a point lookup. Records are never deleted.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct VerificationToken {
    pub id: Uuid,
    pub owner_email: String,
    /// Opaque, URL-safe bearer value sent in the verification link.
    pub token_value: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
}

impl VerificationToken {
    pub fn new(owner_email: impl Into<String>, token_value: String, ttl: Duration) -> Self {
        let created_at = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner_email: owner_email.into(),
            token_value,
            created_at,
            expires_at: created_at + ttl,
            is_used: false,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Consumable iff unused and not yet expired.
    pub fn is_consumable_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_used && !self.is_expired_at(now)
    }
}

/// Short SHA-256 fingerprint of a token for log lines.
pub fn fingerprint(token_value: &str) -> String {
    let digest = Sha256::digest(token_value.as_bytes());
    hex::encode(&digest[..6])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consumable_until_expiry() {
        let token = VerificationToken::new("a@example.com", "abc".into(), Duration::hours(24));

        assert!(token.is_consumable_at(Utc::now()));
        assert!(!token.is_consumable_at(token.expires_at));
        assert!(token.is_expired_at(token.expires_at + Duration::seconds(1)));
    }

    #[test]
    fn used_token_is_not_consumable() {
        let mut token = VerificationToken::new("a@example.com", "abc".into(), Duration::hours(24));
        token.is_used = true;

        assert!(!token.is_consumable_at(Utc::now()));
    }

    #[test]
    fn fingerprint_is_short_and_stable() {
        assert_eq!(fingerprint("token"), fingerprint("token"));
        assert_eq!(fingerprint("token").len(), 12);
        assert_ne!(fingerprint("token"), fingerprint("token2"));
    }
}
