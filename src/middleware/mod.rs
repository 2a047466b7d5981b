//! HTTP middleware components.
//!
//! Middleware run before route handlers. They can authenticate requests,
//! enforce rate limits, and short-circuit requests that are not admitted.

/// API key authentication and rate limiting for the validation endpoint
pub mod admission;
