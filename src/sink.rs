use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::debug;

use crate::error::Result;
use crate::reading::Reading;

/// Where readings go once collected.
pub trait ReadingSink: Send {
    fn append(&self, reading: &Reading) -> Result<()>;
}

/// Appends each reading as one line of JSON to `data_<YYYY-MM-DD>.ndjson`,
/// named after the reading's UTC date.
///
/// The file is opened and closed for every reading, so nothing is held open
/// between poll cycles.
#[derive(Debug, Clone)]
pub struct NdjsonSink {
    dir: PathBuf,
}

impl NdjsonSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("data_{}.ndjson", date.format("%Y-%m-%d")))
    }
}

impl ReadingSink for NdjsonSink {
    fn append(&self, reading: &Reading) -> Result<()> {
        let mut line = reading.to_json_line()?;
        line.push('\n');

        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(reading.timestamp.date_naive());
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(line.as_bytes())?;
        debug!(path = %path.display(), "reading appended");
        Ok(())
    }
}
