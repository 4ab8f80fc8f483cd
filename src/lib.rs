//! Durable storage engine for a distributed commit log.
//!
//! An append-only, offset-addressable record log persisted to disk as a
//! sequence of segments, each a store file of length-prefixed payloads plus a
//! memory-mapped index giving O(1) offset lookups.
//!
//! ```no_run
//! use commitlog::config::Config;
//! use commitlog::storage::log::Log;
//!
//! # fn main() -> commitlog::error::StorageResult<()> {
//! let log = Log::open("/tmp/commitlog", Config::default())?;
//! let offset = log.append(b"hello world")?;
//! assert_eq!(log.read(offset)?, b"hello world");
//! log.close()?;
//! # Ok(())
//! # }
//! ```
pub mod config;
pub mod error;
pub mod storage;
