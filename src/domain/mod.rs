//! Domain layer - Error types shared by every layer
//!
//! This layer has no knowledge of the cache or the transport.

pub mod errors;

pub use errors::CatalogError;
