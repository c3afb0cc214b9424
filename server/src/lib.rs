//! V Panel server - HTTP surface over `vpanel-core`
//!
//! Builds the axum router, wires the services into shared state, and runs
//! the background sweepers next to the listener.

#![forbid(unsafe_code)]

pub mod error;
pub mod extract;
pub mod routes;
pub mod state;
pub mod sweepers;

pub use routes::build_router;
pub use state::AppState;
