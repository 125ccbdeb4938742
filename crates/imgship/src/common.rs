// ai
//! 📦 Common data structures — the building blocks of imgship.
//!
//! 🎬 COLD OPEN — INT. DOCUMENT STORE — 3:47 AM
//!
//! A product record wakes up holding a list of media URLs. Some point at real
//! images. Some point at nothing. One of them points at a 404 that has been a 404
//! since 2019. Nobody has noticed. Tonight, somebody will.
//!
//! 🧠 Knowledge graph:
//! - `ProductRecord` / `MediaEntry`: the raw shape of a document-store record.
//! - `TransferJob`: one image, one destination key. Immutable once built.
//! - `TransferOutcome`: exactly one per job that reaches a terminal state.
//! - Key convention: `{productId}_{mediaType}.{ext}` — bit-exact, do not get creative. 🦆

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 🏷️ The media type used when a record forgets to say what kind of picture it is.
pub const UNKNOWN_MEDIA_TYPE: &str = "unknown";

/// 📄 One document from the document store. Only the fields we care about survive serde.
///
/// `productId` is a string in most exports and a number in the ones nobody warned us about,
/// so it lands as a raw JSON value and gets normalized in [`ProductRecord::product_id`].
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ProductRecord {
    /// 🆔 Document-store identity, only used for log lines.
    #[serde(default, rename = "_id", alias = "id")]
    pub id: Option<serde_json::Value>,
    #[serde(default, rename = "productId")]
    pub product_id: Option<serde_json::Value>,
    #[serde(default)]
    pub media: Vec<MediaEntry>,
}

/// 🖼️ A single media reference inside a product record.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct MediaEntry {
    /// 📡 The URL of the medium-sized rendition. The one we actually copy.
    #[serde(default)]
    pub medium: Option<String>,
    #[serde(default, rename = "type")]
    pub media_type: Option<String>,
}

impl ProductRecord {
    /// 🔧 Product id as a string, whether the export stored it as text or as a number.
    ///
    /// The text is used verbatim, whitespace and all: it goes straight into the object key.
    /// Nulls, empty strings and a numeric zero count as "no id".
    pub fn product_id(&self) -> Option<String> {
        match self.product_id.as_ref()? {
            serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
            serde_json::Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
            _ => None,
        }
    }

    /// 🏭 Turns this record into transfer jobs, one per media entry that has a URL.
    ///
    /// Records without a product id produce nothing. Media without a URL produce nothing.
    /// Media whose `type` field is absent (or null) become [`UNKNOWN_MEDIA_TYPE`]; an empty
    /// `type` stays empty.
    pub fn into_jobs(self, image_extension: &str) -> Vec<TransferJob> {
        let Some(product_id) = self.product_id() else {
            return Vec::new();
        };

        self.media
            .into_iter()
            .filter_map(|media| {
                let url = media.medium.filter(|u| !u.is_empty())?;
                let media_type = media
                    .media_type
                    .unwrap_or_else(|| UNKNOWN_MEDIA_TYPE.to_string());
                Some(TransferJob::new(
                    product_id.clone(),
                    url,
                    destination_key(&product_id, &media_type, image_extension),
                ))
            })
            .collect()
    }
}

/// 🗝️ Builds the destination object key: `{productId}_{mediaType}.{ext}`.
pub fn destination_key(product_id: &str, media_type: &str, image_extension: &str) -> String {
    format!(
        "{}_{}.{}",
        product_id,
        media_type,
        image_extension.trim_start_matches('.')
    )
}

/// 🎯 One unit of work: copy the image at `source_locator` to `destination_key`.
///
/// Immutable. The attempt counter lives in the worker's `RetryState`, never here,
/// so nothing about a job is ever shared mutably between workers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob {
    /// 🆔 Product id the job came from — for log lines and nothing else.
    pub product_id: String,
    pub source_locator: String,
    pub destination_key: String,
}

impl TransferJob {
    pub fn new(product_id: String, source_locator: String, destination_key: String) -> Self {
        Self {
            product_id,
            source_locator,
            destination_key,
        }
    }
}

/// 🚦 Which stage of a job's life produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Probe,
    Fetch,
    Upload,
}

/// 🏷️ How a failure ended. `Transient` only shows up on single attempts; a job
/// that keeps failing transiently ends as `Exhausted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Transient,
    Permanent,
    Exhausted,
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ErrorKind::Transient => "transient",
            ErrorKind::Permanent => "permanent",
            ErrorKind::Exhausted => "exhausted",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// ⏭️ Why a job never needed a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    AlreadyPresent,
}

/// 🏁 The terminal state of a job. Produced exactly once per job.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    Success {
        bytes_written: u64,
        duration: Duration,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        stage: Stage,
        error_kind: ErrorKind,
        /// 🔢 The attempt number the job was on when it gave up. 0 = never attempted.
        last_attempt: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(json: &str) -> ProductRecord {
        serde_json::from_str(json).expect("💀 test record should parse")
    }

    #[test]
    fn the_one_where_keys_follow_the_naming_contract_to_the_byte() {
        assert_eq!(destination_key("P123", "front", "jpg"), "P123_front.jpg");
        assert_eq!(destination_key("P123", "front", ".jpg"), "P123_front.jpg");
    }

    #[test]
    fn the_one_where_a_record_fans_out_into_one_job_per_url() {
        let the_record = record(
            r#"{
                "_id": "abc",
                "productId": "P1",
                "media": [
                    {"medium": "https://cdn.example.com/a.jpg", "type": "front"},
                    {"medium": "https://cdn.example.com/b.jpg"},
                    {"type": "back"},
                    {"medium": "", "type": "side"}
                ]
            }"#,
        );

        let jobs = the_record.into_jobs("jpg");

        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[0].destination_key, "P1_front.jpg");
        assert_eq!(jobs[0].source_locator, "https://cdn.example.com/a.jpg");
        assert_eq!(jobs[1].destination_key, "P1_unknown.jpg");
        assert!(jobs.iter().all(|j| j.product_id == "P1"));
    }

    #[test]
    fn the_one_where_records_without_a_product_id_are_ghosted() {
        let no_id = record(r#"{"media": [{"medium": "https://x/y.jpg", "type": "front"}]}"#);
        let empty_id = record(r#"{"productId": "", "media": [{"medium": "https://x/y.jpg"}]}"#);
        let null_id = record(r#"{"productId": null, "media": [{"medium": "https://x/y.jpg"}]}"#);
        let zero_id = record(r#"{"productId": 0, "media": [{"medium": "https://x/y.jpg"}]}"#);

        assert!(no_id.into_jobs("jpg").is_empty());
        assert!(empty_id.into_jobs("jpg").is_empty());
        assert!(null_id.into_jobs("jpg").is_empty());
        assert!(zero_id.into_jobs("jpg").is_empty());
    }

    #[test]
    fn the_one_where_odd_ids_and_empty_types_land_in_the_key_untouched() {
        let padded = record(r#"{"productId": " P1 ", "media": [{"medium": "https://x/a.jpg", "type": ""}]}"#);
        let blank = record(r#"{"productId": "  ", "media": [{"medium": "https://x/b.jpg"}]}"#);
        let null_type = record(r#"{"productId": "P2", "media": [{"medium": "https://x/c.jpg", "type": null}]}"#);

        let keys = |r: ProductRecord| -> Vec<String> {
            r.into_jobs("jpg").into_iter().map(|j| j.destination_key).collect()
        };

        assert_eq!(keys(padded), vec![" P1 _.jpg"]);
        assert_eq!(keys(blank), vec!["  _unknown.jpg"]);
        assert_eq!(keys(null_type), vec!["P2_unknown.jpg"]);
    }

    #[test]
    fn the_one_where_numeric_product_ids_are_welcome_too() {
        let the_record = record(r#"{"productId": 4521, "media": [{"medium": "https://x/y.jpg", "type": "top"}]}"#);
        let jobs = the_record.into_jobs("png");
        assert_eq!(jobs[0].destination_key, "4521_top.png");
    }
}
