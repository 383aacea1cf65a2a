//! JSONL (JSON Lines) storage for history records.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::MergeError;
use crate::core::Record;

/// JSONL writer/reader for history records.
///
/// Each record is stored as a single JSON object per line, so a history can be
/// appended to while a run is live and streamed back in logging order.
#[derive(Debug, Clone)]
pub struct HistoryJsonl {
    path: PathBuf,
}

impl HistoryJsonl {
    /// Create a new HistoryJsonl for the given path.
    ///
    /// The file will be created if it doesn't exist when writing.
    pub fn new(path: impl AsRef<Path>) -> Self {
        HistoryJsonl {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Get the path to the JSONL file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_parent(&self) -> Result<(), MergeError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| MergeError::Message(format!("failed to create directory: {e}")))?;
            }
        }
        Ok(())
    }

    fn open_append(&self) -> Result<File, MergeError> {
        self.ensure_parent()?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| MergeError::Message(format!("failed to open file: {e}")))
    }

    /// Append a single record.
    ///
    /// # Errors
    /// Returns an error if file operations or JSON serialization fail.
    pub fn append(&self, record: &Record) -> Result<(), MergeError> {
        let mut file = self.open_append()?;
        let json = serde_json::to_string(record)
            .map_err(|e| MergeError::Message(format!("failed to serialize record: {e}")))?;
        writeln!(file, "{}", json)
            .map_err(|e| MergeError::Message(format!("failed to write record: {e}")))?;
        Ok(())
    }

    /// Append many records through one buffered handle.
    pub fn append_all<'a>(
        &self,
        records: impl IntoIterator<Item = &'a Record>,
    ) -> Result<usize, MergeError> {
        let file = self.open_append()?;
        let mut w = BufWriter::new(file);
        let mut written = 0;
        for record in records {
            serde_json::to_writer(&mut w, record)
                .map_err(|e| MergeError::Message(format!("failed to serialize record: {e}")))?;
            w.write_all(b"\n")
                .map_err(|e| MergeError::Message(format!("failed to write record: {e}")))?;
            written += 1;
        }
        w.flush()
            .map_err(|e| MergeError::Message(format!("failed to flush file: {e}")))?;
        Ok(written)
    }

    /// Read all records in file order.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The file doesn't exist
    /// - File operations fail
    /// - Any non-empty line is not a JSON object
    pub fn read_all(&self) -> Result<Vec<Record>, MergeError> {
        if !self.path.exists() {
            return Err(MergeError::Message(format!(
                "file not found: {}",
                self.path.display()
            )));
        }

        let file = File::open(&self.path)
            .map_err(|e| MergeError::Message(format!("failed to open file: {e}")))?;

        let reader = BufReader::new(file);
        let mut records = Vec::new();

        for (line_num, line_result) in reader.lines().enumerate() {
            let line = line_result.map_err(|e| {
                MergeError::Message(format!("failed to read line {}: {e}", line_num + 1))
            })?;

            // Skip empty lines
            if line.trim().is_empty() {
                continue;
            }

            let record: Record = serde_json::from_str(&line).map_err(|e| {
                MergeError::Message(format!("failed to parse line {}: {e}", line_num + 1))
            })?;
            records.push(record);
        }

        Ok(records)
    }

    /// Check if the JSONL file exists.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Get the number of records in the file.
    ///
    /// This reads through the entire file to count lines.
    pub fn count(&self) -> Result<usize, MergeError> {
        if !self.path.exists() {
            return Ok(0);
        }

        let file = File::open(&self.path)
            .map_err(|e| MergeError::Message(format!("failed to open file: {e}")))?;

        let reader = BufReader::new(file);
        let count = reader
            .lines()
            .filter_map(|l| l.ok())
            .filter(|l| !l.trim().is_empty())
            .count();

        Ok(count)
    }
}
