//! Library surface of the Argus server: routing, handlers, middleware,
//! and the reference collectors, kept importable for integration tests.

pub mod collectors;
pub mod errors;
pub mod handlers;
pub mod infra;
pub mod middleware;
pub mod routes;

#[cfg(test)]
mod tests;

pub use errors::{ApiError, ApiResult};
pub use infra::app_state::AppState;
