pub mod client;
pub mod domain;
pub mod infrastructure;
pub mod models;
pub mod services;

pub use client::{CatalogClient, LifecycleEvent, QueryHandle, QueryState, SubscribeOptions, Tag};
pub use domain::CatalogError;
pub use infrastructure::config;
pub use infrastructure::Config;
