//! HTTP API for the gateway.

mod handlers;
pub mod types;

pub use handlers::{create_router, AppState};
