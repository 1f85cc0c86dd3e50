//! Newline-delimited JSON task log.
//!
//! One [`LogRecord`] per line, only ever appended. A process that dies
//! mid-write can leave a torn final line; replay skips it with a warning.
//! A malformed line anywhere else is a hard error.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{LogRecord, TaskLog};

#[derive(Debug)]
pub struct JsonlTaskLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlTaskLog {
    /// Open (or prepare to create) the log at `path`, creating parent
    /// directories as needed.
    pub fn open(path: impl Into<PathBuf>) -> DomainResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TaskLog for JsonlTaskLog {
    fn append(&self, record: &LogRecord) -> DomainResult<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    fn replay(&self) -> DomainResult<Vec<LogRecord>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let lines: Vec<String> = BufReader::new(file)
            .lines()
            .collect::<Result<_, _>>()?;
        let last_content = lines.iter().rposition(|l| !l.trim().is_empty());

        let mut records = Vec::with_capacity(lines.len());
        for (n, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogRecord>(line) {
                Ok(record) => records.push(record),
                Err(err) if Some(n) == last_content => {
                    warn!(line = n + 1, error = %err, "skipping torn final log line");
                }
                Err(err) => {
                    return Err(DomainError::SerializationError(format!(
                        "{}:{}: {err}",
                        self.path.display(),
                        n + 1
                    )));
                }
            }
        }

        debug!(path = %self.path.display(), records = records.len(), "task log replayed");
        Ok(records)
    }
}
