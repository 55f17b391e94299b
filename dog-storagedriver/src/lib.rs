//! # dog-storagedriver: Resumable storage driver for object stores
//!
//! `dog-storagedriver` exposes a uniform blob-storage contract (get, put,
//! ranged reads, resumable streaming writes, listing, move, delete) on top of
//! object stores that only know whole-object PUT/GET and multipart uploads.
//!
//! ## Key Features
//!
//! - **Resumable writes**: `write_stream` picks up at any chunk boundary a
//!   previous call committed, re-deriving its position from the store
//! - **Stateless**: the open multipart session *is* the write state; nothing
//!   is kept locally between calls
//! - **Store agnostic**: any [`ObjectStore`] works; S3 and in-memory stores ship
//! - **Explicit registration**: hosts map driver names to constructors in a
//!   [`DriverRegistry`], nothing registers itself
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use dog_storagedriver::prelude::*;
//! use dog_storagedriver::MemoryObjectStore;
//!
//! # #[tokio::main]
//! # async fn main() -> DriverResult<()> {
//! let store = Arc::new(MemoryObjectStore::new());
//! let driver = ObjectDriver::new(store, ChunkRules::default(), ObjectOptions::default());
//!
//! let body: ByteStream = Box::pin(futures::stream::iter(vec![
//!     Ok::<_, std::io::Error>(Bytes::from_static(b"hello")),
//! ]));
//! let outcome = driver.write_stream("/greeting", 0, 5, body).await?;
//! assert!(outcome.is_complete());
//!
//! assert_eq!(driver.get_content("/greeting").await?, Bytes::from_static(b"hello"));
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │    StorageDriver     │  ← uniform contract (ObjectDriver)
//! ├──────────────────────┤
//! │     StreamWriter     │  ← resumable chunked writes
//! ├───────────┬──────────┤
//! │  Planner  │ Sessions │  ← chunk sizing / session discovery
//! ├───────────┴──────────┤
//! │     ObjectStore      │  ← store primitives (S3, memory)
//! └──────────────────────┘
//! ```
//!
//! Writers to the same path are not coordinated. If two callers may write the
//! same path, serialise them outside the driver.

mod config;
pub mod driver;
mod error;
mod memory;
mod planner;
pub mod registry;
pub mod s3;
mod session;
pub mod store;
mod types;
mod writer;

// Re-export main types for clean API
pub use config::{ChunkRules, DriverParameters, S3DriverConfig, KNOWN_REGIONS};
pub use driver::{ObjectDriver, StorageDriver, LIST_MAX_KEYS};
pub use error::{DriverError, DriverResult};
pub use memory::MemoryObjectStore;
pub use planner::{ChunkPlanner, ResumePoint};
pub use registry::{DriverFactory, DriverRegistry};
pub use s3::S3ObjectStore;
pub use session::UploadSessionManager;
pub use store::ObjectStore;
pub use types::{
    ByteStream, ListPage, ObjectHead, ObjectOptions, Part, SessionId, UploadSession, WriteOutcome,
    DEFAULT_CONTENT_TYPE,
};
pub use writer::StreamWriter;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        ByteStream, ChunkRules, DriverError, DriverRegistry, DriverResult, ObjectDriver,
        ObjectOptions, ObjectStore, StorageDriver, WriteOutcome,
    };
}
