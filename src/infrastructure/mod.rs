//! Infrastructure layer - Framework implementations
//!
//! This layer contains:
//! - Configuration loading (config)
//! - HTTP transport to the catalog backend (transport)

pub mod config;
pub mod transport;

pub use config::Config;
pub use transport::{ApiRequest, HttpTransport, Transport};
