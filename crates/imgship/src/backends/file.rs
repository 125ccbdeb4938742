// ai
//! 📂 Previously, on "Things That Could Go Wrong With A File"...
//!
//! The export was 4GB. Half of it was gzipped. The other half had Windows line endings.
//! Somewhere in the middle, a product had no id and three photos of the same shoe.
//!
//! This module handles file-based I/O: reading product records from an NDJSON export
//! (plain or gzipped), and storing images in a local directory that pretends to be a bucket.
//!
//! 🚰 export → FileSource → records → jobs → ... → FileStore → directory
//! 💀 Disk full → your problem now
//! 🦆 (mandatory, no notes)

mod file_source;
mod file_store;

pub(crate) use file_source::FileSource;
pub use file_source::FileSourceConfig;
pub(crate) use file_store::FileStore;
pub use file_store::FileStoreConfig;
