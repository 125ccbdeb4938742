//! 🔌 Backends — where the real I/O happens.
//!
//! 🚰 Sources pour product records in. 🪣 Object stores hold the images that come out.
//! And in between, we panic! (kidding, we use anyhow)
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls → backend enum with `impl Trait for Enum` dispatch.
//! - `Source` + `SourceBackend`: InMemory, File (NDJSON, optionally gzipped).
//! - `ObjectStore` + `StoreBackend`: InMemory, File (a directory), Gcs (XML API over reqwest).
//! - Configs live next to the backend that uses them. No scavenger hunts at 2am.
//!
//! 🦆 The duck is here because every file must have one. This is law.

pub(crate) mod file;
pub(crate) mod gcs;
pub(crate) mod in_mem;
mod source;
mod store;

pub use file::{FileSourceConfig, FileStoreConfig};
pub use gcs::GcsStoreConfig;
pub(crate) use source::{Source, SourceBackend};
pub use store::{UploadReceipt, content_type_for};
pub(crate) use store::{ObjectStore, StoreBackend};
