//! # Snapshot Logger
//!
//! Writes periodic snapshots of the read API to JSONL (JSON Lines) files.
//!
//! - One line per snapshot, stamped with an RFC 3339 local time
//! - A new file after `max_records_per_file` lines
//! - Only the newest `max_files_to_keep` files are retained

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, SecondsFormat};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::store::SensorReading;
use crate::error::Result;

const FILE_PREFIX: &str = "telemetry_";
const FILE_EXTENSION: &str = "jsonl";

/// One JSONL line
#[derive(Debug, Serialize)]
struct SnapshotRecord<'a> {
    timestamp: String,
    sensors: &'a [SensorReading],
}

/// Rotating JSONL writer
pub struct SnapshotLogger {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    current_path: Option<PathBuf>,
    records_in_file: usize,
    files_opened: u64,
}

impl std::fmt::Debug for SnapshotLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotLogger")
            .field("dir", &self.dir)
            .field("current_path", &self.current_path)
            .field("records_in_file", &self.records_in_file)
            .finish_non_exhaustive()
    }
}

impl SnapshotLogger {
    /// Create a logger writing into `dir`
    ///
    /// # Arguments
    ///
    /// * `dir` - Output directory, created if missing
    /// * `max_records_per_file` - Lines per file before rotating
    /// * `max_files_to_keep` - Files retained after rotation
    ///
    /// # Errors
    ///
    /// Returns error if the directory cannot be created
    pub fn new<P: AsRef<Path>>(dir: P, max_records_per_file: usize, max_files_to_keep: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            writer: None,
            current_path: None,
            records_in_file: 0,
            files_opened: 0,
        })
    }

    /// File currently written to, if any
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    /// Append one snapshot
    ///
    /// # Errors
    ///
    /// Returns error if serialization or writing fails
    pub fn log(&mut self, readings: &[SensorReading]) -> Result<()> {
        self.log_at(Local::now(), readings)
    }

    fn log_at(&mut self, now: DateTime<Local>, readings: &[SensorReading]) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate(now)?;
        }

        let record = SnapshotRecord {
            timestamp: now.to_rfc3339_opts(SecondsFormat::Millis, false),
            sensors: readings,
        };
        let line = serde_json::to_string(&record)?;

        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", line)?;
            writer.flush()?;
        }
        self.records_in_file += 1;

        Ok(())
    }

    /// Flush buffered lines to disk
    ///
    /// # Errors
    ///
    /// Returns error if the flush fails
    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn rotate(&mut self, now: DateTime<Local>) -> Result<()> {
        self.flush()?;

        self.files_opened += 1;
        let name = format!(
            "{}{}_{:04}.{}",
            FILE_PREFIX,
            now.format("%Y%m%d_%H%M%S"),
            self.files_opened,
            FILE_EXTENSION
        );
        let path = self.dir.join(name);

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!("Logging telemetry snapshots to {}", path.display());

        self.writer = Some(BufWriter::new(file));
        self.current_path = Some(path);
        self.records_in_file = 0;

        self.prune()
    }

    /// Delete the oldest log files beyond the retention limit
    fn prune(&self) -> Result<()> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| is_log_file(path))
            .collect();

        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }

        // Names embed timestamp and sequence, so name order is age order
        files.sort();
        let excess = files.len() - self.max_files_to_keep;
        for path in files.into_iter().take(excess) {
            debug!("Removing old telemetry log {}", path.display());
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove {}: {}", path.display(), e);
            }
        }

        Ok(())
    }
}

fn is_log_file(path: &Path) -> bool {
    let name_ok = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(FILE_PREFIX));
    let extension_ok = path.extension().and_then(|ext| ext.to_str()) == Some(FILE_EXTENSION);
    name_ok && extension_ok
}
