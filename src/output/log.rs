//! Append-only CSV log of stable cycles.

use crate::orchestrator::CycleRecord;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Header written once when the log file is created.
pub const LOG_HEADER: &str = "nfd,texp,gain,temp";

/// Errors that can occur while writing the log.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("failed to open log {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write log: {0}")]
    Write(#[from] std::io::Error),
}

/// Formats one log line: timestamp, exposure (s), gain, temperature (°C).
pub fn format_line(record: &CycleRecord) -> String {
    format!(
        "{},{:.6},{:.6},{:.6}",
        record.stamp(),
        record.reported.exposure_seconds(),
        f64::from(record.reported.gain),
        record.temperature_c
    )
}

/// The `log.csv` file, kept open for the process lifetime.
pub struct CycleLog {
    writer: BufWriter<File>,
    path: PathBuf,
    lines: u64,
}

impl CycleLog {
    /// Opens `path` for appending, writing the header if the file is new.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LogError> {
        let path = path.as_ref().to_path_buf();
        let open_err = |source| LogError::Open {
            path: path.clone(),
            source,
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(open_err)?;
        let is_new = file.metadata().map_err(open_err)?.len() == 0;

        let mut writer = BufWriter::new(file);
        if is_new {
            writeln!(writer, "{LOG_HEADER}")?;
            writer.flush()?;
        }

        tracing::debug!(path = %path.display(), created = is_new, "Opened cycle log");
        Ok(Self {
            writer,
            path,
            lines: 0,
        })
    }

    /// Appends one record and flushes it to disk.
    pub fn append(&mut self, record: &CycleRecord) -> Result<(), LogError> {
        writeln!(self.writer, "{}", format_line(record))?;
        self.writer.flush()?;
        self.lines += 1;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), LogError> {
        self.writer.flush()?;
        Ok(())
    }

    /// Lines appended by this process.
    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{ControlState, Setpoint};
    use chrono::{TimeZone, Utc};

    fn record() -> CycleRecord {
        CycleRecord {
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 22, 15, 4).unwrap()
                + chrono::Duration::milliseconds(250),
            reported: Setpoint::new(1_500_000, 42),
            temperature_c: -3.5,
            state: ControlState::NightSteady,
            night: true,
            stable: true,
            command: None,
        }
    }

    #[test]
    fn test_line_format() {
        assert_eq!(
            format_line(&record()),
            "2024-03-01T22:15:04.250,1.500000,42.000000,-3.500000"
        );
    }

    #[test]
    fn test_header_written_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.csv");

        {
            let mut log = CycleLog::open(&path).unwrap();
            log.append(&record()).unwrap();
            assert_eq!(log.lines(), 1);
        }
        {
            let mut log = CycleLog::open(&path).unwrap();
            log.append(&record()).unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], LOG_HEADER);
        assert_eq!(content.matches(LOG_HEADER).count(), 1);
    }

    #[test]
    fn test_open_in_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = CycleLog::open(dir.path().join("missing").join("log.csv"));
        assert!(matches!(result, Err(LogError::Open { .. })));
    }
}
