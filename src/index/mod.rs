//! # Feed Index Maintenance
//!
//! Operations on the index the ingestion pipeline writes to:
//!
//! * [`IndexClient::ensure`] creates it with the feed mapping if it does not exist.
//! * [`IndexClient::backup`] scrolls through it into a gzip-compressed NDJSON file.
//! * [`IndexClient::restore`] replays such a file through the bulk API.

pub mod error;

pub use error::IndexError;

use crate::transport::{Credentials, Reply, Request, Transport};
use chrono::{DateTime, Local};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub const DEFAULT_INDEX: &str = "bsky_feed_posts";
pub const SCROLL_PAGE_SIZE: usize = 1000;
pub const SCROLL_KEEP_ALIVE: &str = "1m";
pub const BULK_BATCH_SIZE: usize = 1000;
const PROGRESS_EVERY: u64 = 100_000;

/// Every string is a `keyword`, except the post text which stays full-text searchable.
pub fn feed_mapping() -> Value {
    json!({
        "mappings": {
            "dynamic_templates": [
                {
                    "strings_as_keywords": {
                        "match_mapping_type": "string",
                        "mapping": { "type": "keyword" }
                    }
                }
            ],
            "properties": {
                "commit": {
                    "properties": {
                        "record": {
                            "properties": {
                                "text": { "type": "text" }
                            }
                        }
                    }
                }
            }
        }
    })
}

/// `<index>_backup_<YYYYmmdd_HHMMSS>.json.gz`
pub fn backup_file_name(index: &str, at: DateTime<Local>) -> String {
    format!("{index}_backup_{}.json.gz", at.format("%Y%m%d_%H%M%S"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupReport {
    pub path: PathBuf,
    pub documents: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreReport {
    pub documents: u64,
    pub batches: u64,
}

#[derive(Deserialize)]
struct CountReply {
    count: u64,
}

#[derive(Deserialize)]
struct SearchPage {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: Hits,
}

#[derive(Deserialize)]
struct Hits {
    hits: Vec<Value>,
}

#[derive(Deserialize)]
struct BulkReply {
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

pub struct IndexClient {
    transport: Arc<dyn Transport>,
    credentials: Credentials,
    index: String,
}

impl IndexClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Credentials,
        index: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            credentials,
            index: index.into(),
        }
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    async fn send(&self, request: Request) -> Result<Reply, IndexError> {
        Ok(self
            .transport
            .send(request.with_auth(self.credentials.clone()))
            .await?)
    }

    pub async fn exists(&self) -> Result<bool, IndexError> {
        let reply = self.send(Request::head(format!("/{}", self.index))).await?;
        match reply.status {
            200 => Ok(true),
            404 => Ok(false),
            status => Err(IndexError::Status {
                operation: "index lookup",
                status,
                body: reply.body,
            }),
        }
    }

    pub async fn ensure(&self) -> Result<EnsureOutcome, IndexError> {
        if self.exists().await? {
            info!(index = %self.index, "Index already exists");
            return Ok(EnsureOutcome::AlreadyExists);
        }
        let request = Request::put(format!("/{}", self.index)).json(feed_mapping());
        checked("index creation", self.send(request).await?)?;
        info!(index = %self.index, "Index created with dynamic mapping");
        Ok(EnsureOutcome::Created)
    }

    pub async fn count(&self) -> Result<u64, IndexError> {
        let reply = self.send(Request::get(format!("/{}/_count", self.index))).await?;
        let count: CountReply = decode("count", checked("count", reply)?)?;
        Ok(count.count)
    }

    /// Writes a timestamped backup into `dir`, creating it if needed.
    pub async fn backup(&self, dir: &Path) -> Result<BackupReport, IndexError> {
        fs::create_dir_all(dir).map_err(IndexError::io(dir))?;
        let path = dir.join(backup_file_name(&self.index, Local::now()));
        self.backup_to(&path).await
    }

    /// Writes every document of the index, one search hit per line, to `path`.
    /// Nothing appears at `path` unless the whole index was written.
    pub async fn backup_to(&self, path: &Path) -> Result<BackupReport, IndexError> {
        let total = self.count().await?;
        info!(index = %self.index, total, file = %path.display(), "Starting backup");

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "backup".to_string());
        let partial = path.with_file_name(format!(".{file_name}.partial"));

        let written = match self.scroll_into(&partial, total).await {
            Ok(written) => written,
            Err(e) => {
                if let Err(cleanup) = fs::remove_file(&partial) {
                    warn!(error = %cleanup, file = %partial.display(), "Could not remove partial backup");
                }
                return Err(e);
            }
        };
        fs::rename(&partial, path).map_err(IndexError::io(path))?;

        info!(written, total, file = %path.display(), "Backup complete");
        Ok(BackupReport {
            path: path.to_path_buf(),
            documents: written,
        })
    }

    async fn scroll_into(&self, path: &Path, total: u64) -> Result<u64, IndexError> {
        let file = File::create(path).map_err(IndexError::io(path))?;
        let mut out = GzEncoder::new(BufWriter::new(file), Compression::default());

        let first = Request::post(format!(
            "/{}/_search?scroll={SCROLL_KEEP_ALIVE}",
            self.index
        ))
        .json(json!({ "size": SCROLL_PAGE_SIZE, "sort": ["_doc"] }));
        let mut page: SearchPage = decode("search", checked("search", self.send(first).await?)?)?;

        let mut written = 0u64;
        let mut scroll_id = page.scroll_id.take();
        while !page.hits.hits.is_empty() {
            for hit in &page.hits.hits {
                serde_json::to_writer(&mut out, hit)
                    .map_err(|source| IndexError::Decode { operation: "backup", source })?;
                out.write_all(b"\n").map_err(IndexError::io(path))?;
                written += 1;
                if written % PROGRESS_EVERY == 0 {
                    info!(written, total, "Backup progress");
                }
            }
            let Some(id) = scroll_id.clone() else {
                break;
            };
            let next = Request::post("/_search/scroll")
                .json(json!({ "scroll": SCROLL_KEEP_ALIVE, "scroll_id": id }));
            page = decode("scroll", checked("scroll", self.send(next).await?)?)?;
            if let Some(id) = page.scroll_id.take() {
                scroll_id = Some(id);
            }
        }

        out.finish()
            .and_then(|mut w| w.flush())
            .map_err(IndexError::io(path))?;

        if let Some(id) = scroll_id {
            let clear = Request::delete("/_search/scroll").json(json!({ "scroll_id": id }));
            if let Err(e) = self.send(clear).await {
                warn!(error = %e, "Could not clear scroll context");
            }
        }
        Ok(written)
    }

    /// Replays a backup file into the index in bulk batches. Document ids are kept
    /// when the backup carries them.
    pub async fn restore(&self, path: &Path) -> Result<RestoreReport, IndexError> {
        if !path.exists() {
            return Err(IndexError::MissingBackup(path.to_path_buf()));
        }
        let file = File::open(path).map_err(IndexError::io(path))?;
        let reader = BufReader::new(GzDecoder::new(file));
        info!(index = %self.index, file = %path.display(), "Restoring backup");

        let mut report = RestoreReport {
            documents: 0,
            batches: 0,
        };
        let mut batch = String::new();
        let mut in_batch = 0usize;

        for (n, line) in reader.lines().enumerate() {
            let line = line.map_err(IndexError::io(path))?;
            if line.trim().is_empty() {
                continue;
            }
            let (action, source) = self.bulk_entry(n + 1, &line)?;
            batch.push_str(&action);
            batch.push('\n');
            batch.push_str(&source);
            batch.push('\n');
            in_batch += 1;

            if in_batch >= BULK_BATCH_SIZE {
                self.flush_batch(std::mem::take(&mut batch), in_batch, &mut report)
                    .await?;
                in_batch = 0;
            }
        }
        if in_batch > 0 {
            self.flush_batch(batch, in_batch, &mut report).await?;
        }

        info!(index = %self.index, documents = report.documents, "Restore complete");
        Ok(report)
    }

    fn bulk_entry(&self, line_no: usize, line: &str) -> Result<(String, String), IndexError> {
        let malformed = |reason: String| IndexError::Malformed {
            line: line_no,
            reason,
        };
        let doc: Value = serde_json::from_str(line).map_err(|e| malformed(e.to_string()))?;
        let source = doc
            .get("_source")
            .ok_or_else(|| malformed("no _source".to_string()))?;

        let mut meta = json!({ "_index": self.index });
        if let Some(id) = doc.get("_id").and_then(Value::as_str) {
            meta["_id"] = Value::from(id);
        }
        Ok((json!({ "index": meta }).to_string(), source.to_string()))
    }

    async fn flush_batch(
        &self,
        body: String,
        documents: usize,
        report: &mut RestoreReport,
    ) -> Result<(), IndexError> {
        let reply = checked("bulk", self.send(Request::post("/_bulk").ndjson(body)).await?)?;
        let bulk: BulkReply = decode("bulk", reply)?;
        if bulk.errors {
            let failed: Vec<&Value> = bulk
                .items
                .iter()
                .filter_map(|item| item.get("index"))
                .filter(|result| result.get("error").is_some())
                .collect();
            let first = failed
                .first()
                .and_then(|r| r.get("error"))
                .map(Value::to_string)
                .unwrap_or_default();
            return Err(IndexError::Bulk {
                failed: failed.len(),
                first,
            });
        }
        report.documents += documents as u64;
        report.batches += 1;
        info!(uploaded = documents, total = report.documents, "Uploaded batch");
        Ok(())
    }
}

fn checked(operation: &'static str, reply: Reply) -> Result<Reply, IndexError> {
    if reply.is_success() {
        Ok(reply)
    } else {
        Err(IndexError::Status {
            operation,
            status: reply.status,
            body: reply.body,
        })
    }
}

fn decode<T: DeserializeOwned>(operation: &'static str, reply: Reply) -> Result<T, IndexError> {
    reply
        .json()
        .map_err(|source| IndexError::Decode { operation, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn mapping_keeps_post_text_full_text() {
        let mapping = feed_mapping();
        assert_eq!(
            mapping["mappings"]["properties"]["commit"]["properties"]["record"]["properties"]["text"]
                ["type"],
            "text"
        );
        assert_eq!(
            mapping["mappings"]["dynamic_templates"][0]["strings_as_keywords"]["mapping"]["type"],
            "keyword"
        );
    }

    #[test]
    fn backup_name_is_timestamped() {
        let at = Local.with_ymd_and_hms(2024, 12, 7, 21, 23, 38).unwrap();
        assert_eq!(
            backup_file_name("bsky_feed_posts", at),
            "bsky_feed_posts_backup_20241207_212338.json.gz"
        );
    }
}
