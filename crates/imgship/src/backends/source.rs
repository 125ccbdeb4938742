use anyhow::Result;
use async_trait::async_trait;

use crate::backends::{file, in_mem};
use crate::common::ProductRecord;

/// 🚰 A source of product records — the document store's cursor, seen from our side.
///
/// # Contract 📜
/// - `next_record` returns `Ok(Some(record))` while records flow, `Ok(None)` once the well is dry.
/// - The source may run dry at any time. The pipeline copes.
/// - The source does NOT derive jobs. It hands over records; the source worker does the rest.
/// - `&mut self` because cursors have state. And feelings. Mostly state.
#[async_trait]
pub(crate) trait Source: std::fmt::Debug + Send {
    async fn next_record(&mut self) -> Result<Option<ProductRecord>>;
}

/// 🎭 The many faces of a Source. Enum dispatch, so the supervisor never cares where records come from.
#[derive(Debug)]
pub(crate) enum SourceBackend {
    InMemory(in_mem::InMemorySource),
    File(file::FileSource),
}

#[async_trait]
impl Source for SourceBackend {
    async fn next_record(&mut self) -> Result<Option<ProductRecord>> {
        match self {
            SourceBackend::InMemory(i) => i.next_record().await,
            SourceBackend::File(f) => f.next_record().await,
        }
    }
}
