pub mod client;
pub mod config;
pub mod rate_limiter;
pub mod types;

// Re-export commonly used types
pub use client::{LastFmClient, LastFmError};
pub use config::ApiKeyConfig;
pub use rate_limiter::RateLimiter;
