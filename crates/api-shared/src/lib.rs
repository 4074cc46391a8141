//! # API Shared
//!
//! Shared utilities and definitions for the patient flow APIs.
//!
//! Contains:
//! - Wire types (`wire` module) with conversions from the core records
//! - Shared services like `HealthService`
//! - Authentication utilities
//!
//! Used by `api-rest` and the `flow-run` binary.

pub mod auth;
pub mod health;
pub mod wire;

pub use health::HealthService;
pub use wire::*;
