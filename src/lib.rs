// Library exports for testing
pub mod config;
pub mod keys;
pub mod tls;
