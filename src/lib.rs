//! GTFS validation service.
//!
//! Accepts transit feeds (uploaded or by URL), runs an external validator
//! against them and returns its report. Callers may onboard by email to
//! receive an API key with a larger request budget.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
