//! Framework-free building blocks for triage route loading.
//!
//! Holds the route error taxonomy, verb enumeration, per-route configuration
//! merging, render-locals helpers and the request-body validation seam. The
//! axum-facing pieces live in `triage-api`.

pub mod encoding;
pub mod error;
pub mod locals;
pub mod policy;
pub mod route_config;
pub mod validation;
pub mod verb;
