pub mod auth;
pub mod chat;
pub mod middleware;
pub mod protocol;
pub mod rest;
pub mod shell;
pub mod state;
pub mod stories;

// Re-export the router and its state so the binary can serve them directly.
pub use middleware::require_session;
pub use rest::{router, ApiDoc};
pub use state::AppState;
