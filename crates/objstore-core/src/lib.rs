//! Pluggable object storage with validation, lifecycle management, and
//! multi-backend routing.
//!
//! The building blocks, bottom to top:
//!
//! * [`storage`]: the [`ObjectStorage`] contract, the in-memory and local
//!   filesystem backends, and the [`new_storage`] factory.
//! * [`validation`]: the single choke point every caller-supplied key,
//!   backend name, and prefix passes through.
//! * [`lifecycle`]: prefix-scoped retention policies (delete or archive)
//!   with volatile and durable engines and a periodic scan loop.
//! * [`replication`]: fan-out rules applied to puts, synchronously or in
//!   the background.
//! * [`facade`]: a registry of named backends routing operations by
//!   `backend:key` references.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use objstore_core::{Facade, FacadeConfig, MemoryBackend};
//!
//! # async fn demo() -> objstore_core::Result<()> {
//! let facade = Facade::new(
//!     FacadeConfig::new().with_backend("primary", Arc::new(MemoryBackend::new())),
//! )?;
//!
//! facade.put("logs/app.log", Bytes::from("hello")).await?;
//! assert_eq!(facade.get("logs/app.log").await?, "hello");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod facade;
pub mod lifecycle;
pub mod replication;
pub mod storage;
pub mod validation;

pub use error::{Error, Result};
pub use facade::{BackendDefinition, Facade, FacadeConfig};
pub use lifecycle::{
    LifecycleAction, LifecycleEngine, LifecycleManager, LifecyclePolicy,
    PersistentLifecycleEngine,
};
pub use replication::{ReplicationMode, ReplicationPolicy};
pub use storage::{
    new_storage, Archiver, BackendConfig, ListOptions, ListResult, LocalBackend, MemoryBackend,
    Metadata, ObjectInfo, ObjectStorage,
};
