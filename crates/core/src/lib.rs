//! Core types and shared functionality for hntop.
//!
//! This crate provides:
//! - SQLite store for items and the preview metadata cache
//! - Unified error types
//! - Layered application configuration

pub mod config;
pub mod error;
pub mod store;

pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use store::{CacheEntry, CacheTtl, Item, PreviewMetadata, Store};
