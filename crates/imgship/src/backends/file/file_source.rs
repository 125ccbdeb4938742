use std::io::Read;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::{
    fs::File,
    io::{self, AsyncBufReadExt},
};
use tracing::{debug, trace};

use crate::backends::Source;
use crate::common::ProductRecord;

// -- 📂 FileSourceConfig — "It's just an export", said no DBA ever before the disk filled up.
// KNOWLEDGE GRAPH: config lives co-located with the backend that uses it.
#[derive(Debug, Deserialize, Clone)]
pub struct FileSourceConfig {
    /// 📄 Path to a newline-delimited JSON export. A `.gz` suffix means gzip.
    pub file_name: String,
}

/// 🚿 Where the lines come from: a streaming reader for plain files,
/// or a fully inflated buffer for gzipped ones.
enum Lines {
    Streaming(io::BufReader<File>),
    Inflated { data: Vec<u8>, offset: usize },
}

/// 📂 FileSource — reads a document-store export one record per line.
///
/// Plain files stream through a tokio `BufReader`. Gzipped files get inflated up front
/// (on a blocking thread, flate2 is synchronous) and split with `memchr`.
/// Blank lines are ignored. A line that isn't a product record is an error, with its line number,
/// because silently dropping records is how counts stop adding up.
pub(crate) struct FileSource {
    lines: Lines,
    source_config: FileSourceConfig,
    line_number: usize,
}

// 🐛 Debug impl excludes the reader. Nobody debugging a FileSource wants to see BufReader internals.
impl std::fmt::Debug for FileSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileSource")
            .field("source_config", &self.source_config)
            .field("line_number", &self.line_number)
            .finish()
    }
}

impl FileSource {
    /// 🚀 Opens the export. If it doesn't exist, anyhow will tell you with theatrical flair.
    pub(crate) async fn new(source_config: FileSourceConfig) -> Result<Self> {
        let lines = if source_config.file_name.ends_with(".gz") {
            let compressed = tokio::fs::read(&source_config.file_name)
                .await
                .context(format!(
                    "💀 Couldn't read gzipped export '{}'. We knocked. The file did not answer.",
                    source_config.file_name
                ))?;
            let data = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<u8>> {
                let mut decoder = flate2::read::GzDecoder::new(compressed.as_slice());
                let mut inflated = Vec::new();
                decoder.read_to_end(&mut inflated)?;
                Ok(inflated)
            })
            .await
            .context("💀 The gunzip thread panicked. That's new.")?
            .context(format!(
                "💀 '{}' claims to be gzip but flate2 disagrees.",
                source_config.file_name
            ))?;
            debug!(
                "🫁 inflated '{}' to {} bytes",
                source_config.file_name,
                data.len()
            );
            Lines::Inflated { data, offset: 0 }
        } else {
            let file_handle = File::open(&source_config.file_name).await.context(format!(
                "💀 The door to '{}' would not budge. Check that it exists and that we're allowed in.",
                source_config.file_name
            ))?;
            Lines::Streaming(io::BufReader::new(file_handle))
        };

        Ok(Self {
            lines,
            source_config,
            line_number: 0,
        })
    }

    /// 📄 Next raw line. `None` at EOF.
    ///
    /// Both paths hand back raw bytes and share one UTF-8 check, so a plain export and its
    /// gzipped twin fail on exactly the same lines.
    async fn next_line(&mut self) -> Result<Option<String>> {
        self.line_number += 1;
        let raw = match &mut self.lines {
            Lines::Streaming(reader) => {
                let mut line = Vec::new();
                let bytes_read = reader.read_until(b'\n', &mut line).await.context(format!(
                    "💀 Failed reading line {} of '{}'",
                    self.line_number, self.source_config.file_name
                ))?;
                if bytes_read == 0 {
                    return Ok(None);
                }
                line
            }
            Lines::Inflated { data, offset } => {
                if *offset >= data.len() {
                    return Ok(None);
                }
                let rest = &data[*offset..];
                let end = memchr::memchr(b'\n', rest).unwrap_or(rest.len());
                let line = rest[..end].to_vec();
                *offset += (end + 1).min(rest.len());
                line
            }
        };
        let line = String::from_utf8(raw).context(format!(
            "💀 Line {} of '{}' is not valid UTF-8.",
            self.line_number, self.source_config.file_name
        ))?;
        Ok(Some(line))
    }
}

#[async_trait]
impl Source for FileSource {
    async fn next_record(&mut self) -> Result<Option<ProductRecord>> {
        while let Some(line) = self.next_line().await? {
            let trimmed = line.trim_end_matches('\n').trim_end_matches('\r').trim();
            if trimmed.is_empty() {
                continue;
            }
            trace!("📖 line {} of '{}'", self.line_number, self.source_config.file_name);
            let record: ProductRecord = serde_json::from_str(trimmed).context(format!(
                "💀 Line {} of '{}' is not a product record. JSON had other plans.",
                self.line_number, self.source_config.file_name
            ))?;
            return Ok(Some(record));
        }
        // -- 🏁 EOF. The well is dry.
        Ok(None)
    }
}
