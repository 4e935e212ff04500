//! SQLite-backed partitioned response cache.
//!
//! This module provides persistent, named cache partitions using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Request-keyed storage using SHA-256 hashing of method and URL
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - All-or-nothing bulk inserts for install-time pre-caching
//! - Partition eviction and per-partition purge strategies (pattern, LRU)

pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;
pub mod partitions;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::{CacheEntry, CachedResponse};
pub use partitions::{Partition, PartitionStats};
