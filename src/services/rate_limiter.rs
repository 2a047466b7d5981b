//! Fixed-window rate limiter keyed by caller.
//!
//! A window opens on a caller's first request and lasts one period of the
//! tier's [`RateLimit`]. Increment-and-check runs under a single lock, so a
//! burst from one caller can never admit more than `count` requests per
//! window.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Window length unit of a [`RateLimit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowUnit {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    /// 30 days
    Month,
}

impl WindowUnit {
    pub fn duration(self) -> Duration {
        let secs = match self {
            Self::Second => 1,
            Self::Minute => 60,
            Self::Hour => 60 * 60,
            Self::Day => 24 * 60 * 60,
            Self::Week => 7 * 24 * 60 * 60,
            Self::Month => 30 * 24 * 60 * 60,
        };
        Duration::from_secs(secs)
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Second => "second",
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}

/// A request budget, written `<count>/<unit>` (e.g. `5/day`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct RateLimit {
    pub count: u32,
    pub unit: WindowUnit,
}

impl RateLimit {
    pub const fn new(count: u32, unit: WindowUnit) -> Self {
        Self { count, unit }
    }

    pub const fn per_day(count: u32) -> Self {
        Self::new(count, WindowUnit::Day)
    }

    pub fn window(&self) -> Duration {
        self.unit.duration()
    }
}

impl FromStr for RateLimit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || format!("rate limit must look like <N>/<second|minute|hour|day|week|month>, got {s:?}");

        let (count, unit) = s.trim().split_once('/').ok_or_else(malformed)?;
        if count.is_empty() || !count.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        let count = count.parse().map_err(|_| malformed())?;
        let unit = match unit {
            "second" => WindowUnit::Second,
            "minute" => WindowUnit::Minute,
            "hour" => WindowUnit::Hour,
            "day" => WindowUnit::Day,
            "week" => WindowUnit::Week,
            "month" => WindowUnit::Month,
            _ => return Err(malformed()),
        };

        Ok(Self { count, unit })
    }
}

impl TryFrom<String> for RateLimit {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for RateLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.count, self.unit.as_str())
    }
}

/// Outcome of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed {
        /// Requests left in the current window
        remaining: u32,
    },
    Limited {
        /// Time until the current window closes
        retry_after: Duration,
    },
}

#[derive(Debug)]
struct Window {
    started: Instant,
    length: Duration,
    count: u32,
}

impl Window {
    fn is_expired(&self, now: Instant) -> bool {
        now.duration_since(self.started) >= self.length
    }
}

/// Thread-safe per-caller request counter.
#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one request for `key` and decide whether it is admitted.
    ///
    /// Rejected requests are not counted.
    pub async fn check_and_record(&self, key: &str, limit: &RateLimit) -> RateLimitDecision {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        let window = windows.entry(key.to_string()).or_insert_with(|| Window {
            started: now,
            length: limit.window(),
            count: 0,
        });

        if window.is_expired(now) || window.length != limit.window() {
            *window = Window {
                started: now,
                length: limit.window(),
                count: 0,
            };
        }

        if window.count >= limit.count {
            let retry_after = window.length.saturating_sub(now.duration_since(window.started));
            return RateLimitDecision::Limited { retry_after };
        }

        window.count += 1;
        RateLimitDecision::Allowed {
            remaining: limit.count - window.count,
        }
    }

    /// Decide like [`RateLimiter::check_and_record`] without counting.
    pub async fn peek(&self, key: &str, limit: &RateLimit) -> RateLimitDecision {
        let now = Instant::now();
        let windows = self.windows.lock().await;

        let open = windows
            .get(key)
            .filter(|w| !w.is_expired(now) && w.length == limit.window());
        let Some(window) = open else {
            return RateLimitDecision::Allowed {
                remaining: limit.count,
            };
        };

        if window.count >= limit.count {
            RateLimitDecision::Limited {
                retry_after: window.length.saturating_sub(now.duration_since(window.started)),
            }
        } else {
            RateLimitDecision::Allowed {
                remaining: limit.count - window.count,
            }
        }
    }

    /// Drop windows that have closed.
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, w| !w.is_expired(now));
        tracing::debug!(removed = before - windows.len(), "rate limit windows swept");
    }

    pub async fn tracked_callers(&self) -> usize {
        self.windows.lock().await.len()
    }
}
