//! Triage: route discovery, registration and a uniform request pipeline
//! over axum.
//!
//! Route authors describe endpoints with [`descriptor::RouteDefinition`];
//! the [`loader`] resolves them (instantiating factories with merged
//! per-route configuration), the [`registrar`] binds them onto an axum
//! router, and each request runs through the [`pipeline`].

pub mod config;
pub mod cors;
pub mod descriptor;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod registrar;
pub mod render;
pub mod request;
pub mod router;
pub mod routes;

pub use triage_core::error::{LoadError, RouteError};
pub use triage_core::verb::Verb;
