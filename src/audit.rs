// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Append-only log of authorization denials.
//!
//! Each entry is one line of the form `<timestamp> : <message>`, where the
//! timestamp uses the classic `asctime` layout, e.g.,
//! `Sun Oct 18 14:02:11 2026 : ...`.

use chrono::{DateTime, Local};
use std::{
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
};

const TIMESTAMP_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Denial log file.
#[derive(Debug, Clone)]
pub struct DenialLog {
    path: PathBuf,
}

impl DenialLog {
    /// Construct new denial log writing to target path.
    ///
    /// Nothing is touched on disk until the first entry is appended.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of log file.
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Append message stamped with current local time.
    ///
    /// # Errors
    ///
    /// - Return [`AuditError::Write`] if log file cannot be opened or written.
    pub fn append(&self, message: impl AsRef<str>) -> Result<()> {
        self.append_at(Local::now(), message)
    }

    /// Append message stamped with given time.
    ///
    /// # Errors
    ///
    /// - Return [`AuditError::Write`] if log file cannot be opened or written.
    pub fn append_at(&self, time: DateTime<Local>, message: impl AsRef<str>) -> Result<()> {
        // INVARIANT: Parent directory exists before first write.
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            mkdirp::mkdirp(parent).map_err(|err| self.write_error(err))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|err| self.write_error(err))?;
        writeln!(
            file,
            "{} : {}",
            time.format(TIMESTAMP_FORMAT),
            message.as_ref()
        )
        .map_err(|err| self.write_error(err))?;

        Ok(())
    }

    fn write_error(&self, err: std::io::Error) -> AuditError {
        AuditError::Write {
            source: err,
            path: self.path.clone(),
        }
    }
}

/// Denial log error types.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Log file cannot be written.
    #[error("failed to write denial log at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = AuditError> = std::result::Result<T, E>;
