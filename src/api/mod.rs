//! API module
//!
//! HTTP read API for the dashboard.

pub mod routes;

pub use routes::{create_router, AppState};
