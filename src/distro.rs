// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Distribution identification.
//!
//! Read the running distribution's name and release codename from
//! os-release. The codename picks the suite for PPA shortcuts, and expands
//! pocket names like `-security` into full suites.

use crate::path::OS_RELEASE;

use std::{collections::HashMap, fs::read_to_string, path::Path, str::FromStr};

/// Parsed os-release fields.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct OsRelease {
    fields: HashMap<String, String>,
}

impl OsRelease {
    /// Read os-release from the standard location.
    ///
    /// # Errors
    ///
    /// - Return [`DistroError::Read`] if the file cannot be read.
    pub fn load() -> Result<Self> {
        Self::load_from(OS_RELEASE)
    }

    /// Read os-release from target path.
    ///
    /// # Errors
    ///
    /// - Return [`DistroError::Read`] if the file cannot be read.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        read_to_string(path.as_ref())
            .map_err(|err| DistroError::Read {
                source: err,
                path: path.as_ref().display().to_string(),
            })?
            .parse()
    }

    /// Release codename.
    ///
    /// Prefers `UBUNTU_CODENAME` so derivatives resolve PPAs against the
    /// Ubuntu release they are built on.
    ///
    /// # Errors
    ///
    /// - Return [`DistroError::NoCodename`] if neither field is set.
    pub fn codename(&self) -> Result<&str> {
        self.get("UBUNTU_CODENAME")
            .or_else(|| self.get("VERSION_CODENAME"))
            .ok_or(DistroError::NoCodename)
    }

    /// Human readable distribution name.
    pub fn name(&self) -> &str {
        self.get("NAME").unwrap_or("Linux")
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

impl FromStr for OsRelease {
    type Err = DistroError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let fields = data
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once('='))
            .map(|(key, value)| {
                let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
                (key.trim().to_string(), value.to_string())
            })
            .collect();

        Ok(Self { fields })
    }
}

/// Distribution identification error types.
#[derive(Debug, thiserror::Error)]
pub enum DistroError {
    /// os-release cannot be read.
    #[error("failed to read {path}")]
    Read {
        #[source]
        source: std::io::Error,
        path: String,
    },

    /// os-release has no codename.
    #[error("cannot determine distribution codename")]
    NoCodename,
}

/// Friendly result alias :3
pub type Result<T, E = DistroError> = std::result::Result<T, E>;
