//! Output storage: one write-once JSON file per validated record.
//!
//! Files are named `<stem>_<UTC timestamp>.json` and opened with
//! `create_new`, so an existing record is never overwritten. A re-run of the
//! same invoice always produces a new file.

use crate::error::InvoiceError;
use crate::output::{ExtractionOutput, OrderedFields};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::info;

/// Name collisions within the same millisecond get a numeric suffix; give up
/// after this many.
const MAX_NAME_ATTEMPTS: u32 = 100;

/// On-disk layout of a persisted record.
#[derive(Debug, Serialize)]
struct StoredRecord<'a> {
    source: &'a str,
    extracted_at: String,
    attempts: u32,
    record: OrderedFields<'a>,
    extras: &'a Map<String, Value>,
    warnings: Vec<String>,
}

/// Directory that receives persisted records.
#[derive(Debug, Clone)]
pub struct RecordStore {
    dir: PathBuf,
}

impl RecordStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `output` as a new pretty-printed JSON file and return its path.
    pub async fn persist(&self, output: &ExtractionOutput) -> Result<PathBuf, InvoiceError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| InvoiceError::OutputWriteFailed {
                path: self.dir.clone(),
                source: e,
            })?;

        let now = Utc::now();
        let stored = StoredRecord {
            source: &output.source,
            extracted_at: now.to_rfc3339_opts(SecondsFormat::Secs, true),
            attempts: output.attempts,
            record: output.record.ordered_fields(),
            extras: output.record.extras(),
            warnings: output.warnings(),
        };
        let body = serde_json::to_vec_pretty(&stored)
            .map_err(|e| InvoiceError::Internal(format!("record serialisation: {e}")))?;

        let stem = file_stem(&output.source);
        for n in 0..MAX_NAME_ATTEMPTS {
            let path = self.dir.join(file_name(&stem, now, n));
            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(f) => f,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(InvoiceError::OutputWriteFailed { path, source: e }),
            };

            write_body(&mut file, &body)
                .await
                .map_err(|e| InvoiceError::OutputWriteFailed {
                    path: path.clone(),
                    source: e,
                })?;

            info!("Record written to {}", path.display());
            return Ok(path);
        }

        Err(InvoiceError::OutputWriteFailed {
            path: self.dir.join(file_name(&stem, now, 0)),
            source: std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "no free file name for this timestamp",
            ),
        })
    }
}

async fn write_body(file: &mut tokio::fs::File, body: &[u8]) -> std::io::Result<()> {
    file.write_all(body).await?;
    file.write_all(b"\n").await?;
    file.flush().await
}

/// File-system-safe stem derived from the source name.
fn file_stem(source: &str) -> String {
    let stem = Path::new(source)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let safe: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if safe.trim_matches('_').is_empty() {
        "invoice".to_string()
    } else {
        safe
    }
}

fn file_name(stem: &str, at: DateTime<Utc>, n: u32) -> String {
    let ts = at.format("%Y%m%dT%H%M%S%.3fZ");
    if n == 0 {
        format!("{stem}_{ts}.json")
    } else {
        format!("{stem}_{ts}_{n}.json")
    }
}
