use std::collections::VecDeque;

use anyhow::Result;
use async_trait::async_trait;

use crate::backends::Source;
use crate::common::ProductRecord;

/// 📦 The world's most optimistic document store — it never times out and it never lies.
///
/// `InMemorySource` hands out a fixed list of records, one per call, then `None` forever.
/// Used by tests and by configs that inline their records. Not for feelings. Feelings are unindexed.
#[derive(Debug, Default)]
pub(crate) struct InMemorySource {
    /// 🔒 Records not yet handed out. Once popped, forever popped.
    remaining: VecDeque<ProductRecord>,
}

impl InMemorySource {
    pub(crate) fn new(records: Vec<ProductRecord>) -> Self {
        Self {
            remaining: records.into(),
        }
    }
}

#[async_trait]
impl Source for InMemorySource {
    async fn next_record(&mut self) -> Result<Option<ProductRecord>> {
        // -- 🏁 empty deque = the well is dry
        Ok(self.remaining.pop_front())
    }
}
