//! Timestamped artifact files.
//!
//! Every file a run produces is named `<label>_<UTC-timestamp>.<ext>` and
//! opened with `create_new`, so an existing artifact is never overwritten.
//! When two runs land on the same microsecond the later one gets a numeric
//! suffix.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::{PipelineError, Result};

/// Layout of the timestamp embedded in artifact names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%6fZ";

const MAX_SUFFIX: u32 = 1000;

/// UTC timestamp shared by all artifacts of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStamp {
    at: DateTime<Utc>,
    label: String,
}

impl RunStamp {
    /// Stamp for the current instant.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Stamp for a fixed instant.
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self {
            label: at.format(TIMESTAMP_FORMAT).to_string(),
            at,
        }
    }

    /// The instant this stamp represents.
    pub fn datetime(&self) -> DateTime<Utc> {
        self.at
    }

    /// The formatted timestamp, e.g. `20240101T120000123456Z`.
    pub fn as_str(&self) -> &str {
        &self.label
    }

    /// File name for an artifact with this stamp.
    pub fn file_name(&self, label: &str, extension: &str) -> String {
        format!("{}_{}.{}", label, self.label, extension)
    }
}

/// Creates a new artifact file in `dir`, never reusing an existing name.
///
/// # Errors
/// Returns an I/O error when the directory is missing or not writable.
pub fn create_artifact(
    dir: &Path,
    label: &str,
    extension: &str,
    stamp: &RunStamp,
) -> Result<(File, PathBuf)> {
    let mut candidate = dir.join(stamp.file_name(label, extension));
    for attempt in 0..=MAX_SUFFIX {
        if attempt > 0 {
            candidate = dir.join(format!(
                "{}_{}_{}.{}",
                label,
                stamp.as_str(),
                attempt,
                extension
            ));
        }
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(file) => return Ok((file, candidate)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(PipelineError::io("create", &candidate, e)),
        }
    }
    Err(PipelineError::Io {
        context: format!(
            "No free artifact name for {} in {}",
            stamp.file_name(label, extension),
            dir.display()
        ),
        source: std::io::Error::from(ErrorKind::AlreadyExists),
    })
}

/// Creates an artifact and fills it through `write`, flushing at the end.
pub fn write_artifact<F>(
    dir: &Path,
    label: &str,
    extension: &str,
    stamp: &RunStamp,
    write: F,
) -> Result<PathBuf>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let (file, path) = create_artifact(dir, label, extension, stamp)?;
    let mut writer = BufWriter::new(file);
    write(&mut writer)?;
    writer
        .flush()
        .map_err(|e| PipelineError::io("write", &path, e))?;
    tracing::debug!("Wrote artifact {}", path.display());
    Ok(path)
}
