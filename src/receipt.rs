use anyhow::{Context, Result};
use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use crate::protocol::RECEIPT_LOG_NAME;

// ISO-8601 local time with microseconds, e.g. 2024-05-01T12:34:56.789012
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub timestamp: String,
    pub filename: String,
}

/// Append-only record of completed transfers, one `<timestamp>,<filename>`
/// line each.
#[derive(Debug, Clone)]
pub struct ReceiptLog {
    log_file_path: PathBuf,
}

impl ReceiptLog {
    pub fn new(directory: &Path) -> Self {
        let log_file_path = directory.join(RECEIPT_LOG_NAME);
        ReceiptLog { log_file_path }
    }

    pub fn path(&self) -> &Path {
        &self.log_file_path
    }

    /// Record one completed transfer.
    ///
    /// The file is opened in append mode for this write only and the line goes
    /// out in a single `write_all`, so appends never interleave.
    pub fn append(&self, filename: &str) -> io::Result<()> {
        let line = format!("{},{}\n", Local::now().format(TIMESTAMP_FORMAT), filename);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file_path)?;
        file.write_all(line.as_bytes())?;
        file.flush()
    }

    pub fn read(&self) -> Result<Vec<Receipt>> {
        if !self.log_file_path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.log_file_path)
            .context("Failed to open receipt log for reading")?;
        let reader = BufReader::new(file);
        let mut receipts = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            // filenames may contain commas, timestamps never do
            let (timestamp, filename) = line
                .split_once(',')
                .with_context(|| format!("malformed receipt line {line:?}"))?;
            receipts.push(Receipt {
                timestamp: timestamp.to_string(),
                filename: filename.to_string(),
            });
        }
        Ok(receipts)
    }
}
