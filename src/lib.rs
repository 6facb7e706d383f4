pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway; // request id, rate-limit headers, access log
pub mod models;
pub mod openapi;
pub mod password;
pub mod rate_limit; // in-memory rate limiting
pub mod repo;
pub mod routes;
pub mod token;

// Re-export commonly used items for tests / external users
pub use gateway::RequestGateway;
pub use routes::{config, AppState};
