//! Core types and shared functionality for the SafeNest offline coordinator.
//!
//! This crate provides:
//! - Partitioned response cache with SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CacheEntry, CachedResponse, Partition, PartitionStats};
pub use config::{AppConfig, CacheNames, ConfigError};
pub use error::Error;
