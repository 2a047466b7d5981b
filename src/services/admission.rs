//! Admission control: tier classification and budget enforcement.

use std::fmt;

use uuid::Uuid;

use crate::{
    error::AppError,
    services::rate_limiter::{RateLimit, RateLimitDecision, RateLimiter},
};

/// Rate tier a caller is assigned from its authentication state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Unauthenticated,
    Authenticated,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "unauthenticated"),
            Self::Authenticated => write!(f, "authenticated"),
        }
    }
}

/// Identity a request is counted against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallerKey {
    /// Verified API key
    ApiKey(Uuid),
    /// Network origin of an unauthenticated caller
    Origin(String),
    /// Network origin that sent API keys which did not verify
    RejectedKey(String),
}

impl fmt::Display for CallerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKey(id) => write!(f, "key:{id}"),
            Self::Origin(addr) => write!(f, "ip:{addr}"),
            Self::RejectedKey(addr) => write!(f, "rejected-key:{addr}"),
        }
    }
}

#[derive(Debug)]
pub struct AdmissionController {
    unauthenticated: RateLimit,
    authenticated: RateLimit,
    bypass: bool,
    limiter: RateLimiter,
}

impl AdmissionController {
    pub fn new(unauthenticated: RateLimit, authenticated: RateLimit, bypass: bool) -> Self {
        Self {
            unauthenticated,
            authenticated,
            bypass,
            limiter: RateLimiter::new(),
        }
    }

    /// Trusted-deployment mode: identity and limiting are both skipped.
    pub fn is_bypassed(&self) -> bool {
        self.bypass
    }

    pub fn classify(&self, has_valid_identity: bool) -> Tier {
        if has_valid_identity {
            Tier::Authenticated
        } else {
            Tier::Unauthenticated
        }
    }

    pub fn limit_for(&self, tier: Tier) -> RateLimit {
        match tier {
            Tier::Unauthenticated => self.unauthenticated,
            Tier::Authenticated => self.authenticated,
        }
    }

    /// Count the request against `caller` and reject it once the tier's
    /// budget for the current window is spent.
    pub async fn enforce(&self, tier: Tier, caller: &CallerKey) -> Result<(), AppError> {
        if self.bypass {
            return Ok(());
        }

        let limit = self.limit_for(tier);
        match self
            .limiter
            .check_and_record(&caller.to_string(), &limit)
            .await
        {
            RateLimitDecision::Allowed { remaining } => {
                tracing::debug!(%caller, %tier, remaining, "request admitted");
                Ok(())
            }
            RateLimitDecision::Limited { retry_after } => {
                tracing::warn!(%caller, %tier, %limit, "rate limit exceeded");
                Err(AppError::RateLimited {
                    limit,
                    retry_after_secs: retry_after.as_secs().max(1),
                })
            }
        }
    }

    /// Refuse key verification for an origin whose rejected keys already
    /// used up the unauthenticated budget. Counts nothing.
    pub async fn check_key_attempt(&self, origin: &str) -> Result<(), AppError> {
        if self.bypass {
            return Ok(());
        }

        let caller = CallerKey::RejectedKey(origin.to_string());
        let limit = self.unauthenticated;
        match self.limiter.peek(&caller.to_string(), &limit).await {
            RateLimitDecision::Allowed { .. } => Ok(()),
            RateLimitDecision::Limited { retry_after } => {
                tracing::warn!(%caller, %limit, "too many rejected api keys");
                Err(AppError::RateLimited {
                    limit,
                    retry_after_secs: retry_after.as_secs().max(1),
                })
            }
        }
    }

    /// Charge a request whose API key did not verify.
    ///
    /// Counted against the origin's rejected-key window and against its
    /// unauthenticated budget; fails once that budget is spent.
    pub async fn record_rejected_key(&self, origin: &str) -> Result<(), AppError> {
        if self.bypass {
            return Ok(());
        }

        let rejected = CallerKey::RejectedKey(origin.to_string());
        self.limiter
            .check_and_record(&rejected.to_string(), &self.unauthenticated)
            .await;

        self.enforce(Tier::Unauthenticated, &CallerKey::Origin(origin.to_string()))
            .await
    }

    /// Sweep closed windows; called periodically from a background task.
    pub async fn sweep(&self) {
        self.limiter.cleanup().await;
    }
}
