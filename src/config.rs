// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout for the configuration file that both the privileged
//! helper and the client read. Every field has a default, so a missing file or
//! a partial file is always valid.

use crate::path::{DEFAULT_DENIAL_LOG, DEFAULT_SOURCES_DIR, DEFAULT_SYSTEM_SOURCE};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use tracing::debug;

/// Repoman settings.
///
/// # General Layout
///
/// The settings are split in two sections. The sources section tells both
/// processes where source files live on disk. The service section only
/// concerns the privileged helper: which bus to serve on, whether polkit is
/// enforced, where denials are logged, and how the package index is refreshed.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Location of source files.
    pub sources: SourcesSettings,

    /// Privileged helper behaviour.
    pub service: ServiceSettings,
}

impl Settings {
    /// Load settings from target path.
    ///
    /// A missing file is not an error, the defaults are returned instead.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if the file exists but cannot be read.
    /// - Return [`ConfigError::Deserialize`] if the file is not valid TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        match read_to_string(path.as_ref()) {
            Ok(data) => data.parse(),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("no configuration at {}, using defaults", path.as_ref().display());
                Ok(Self::default())
            }
            Err(err) => Err(ConfigError::Read {
                source: err,
                path: path.as_ref().to_path_buf(),
            }),
        }
    }

    /// Absolute path to the system source file.
    pub fn system_source_path(&self) -> PathBuf {
        self.sources
            .dir
            .join(format!("{}.sources", self.sources.system))
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every path field.
        settings.sources.dir = expand_path(&settings.sources.dir)?;
        settings.service.denial_log = expand_path(&settings.service.denial_log)?;

        Ok(settings)
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Source file locations.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourcesSettings {
    /// Directory holding one `.sources` file per repository.
    pub dir: PathBuf,

    /// File id of the vendor's default source, without extension.
    pub system: String,
}

impl Default for SourcesSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_SOURCES_DIR),
            system: DEFAULT_SYSTEM_SOURCE.into(),
        }
    }
}

/// Privileged helper settings.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Bus to own the service name on.
    pub bus: BusKind,

    /// Ask polkit before every mutation.
    ///
    /// Only meant to be switched off on a session bus for testing.
    pub enforce_polkit: bool,

    /// Append-only log of authorization denials.
    pub denial_log: PathBuf,

    /// Upper bound for a single polkit authorization check in seconds.
    pub auth_timeout_secs: u64,

    /// Command run after a source is modified to refresh the package index.
    ///
    /// An empty command disables refreshing.
    pub refresh_command: Vec<String>,
}

impl ServiceSettings {
    /// Authorization check timeout as a [`Duration`].
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            bus: BusKind::System,
            enforce_polkit: true,
            denial_log: PathBuf::from(DEFAULT_DENIAL_LOG),
            auth_timeout_secs: 600,
            refresh_command: vec!["apt-get".into(), "update".into()],
        }
    }
}

/// Message bus to serve on.
#[derive(Default, Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    /// System bus, the only bus a real deployment uses.
    #[default]
    System,

    /// Session bus, for running the helper unprivileged during development.
    Session,
}

fn expand_path(path: &Path) -> Result<PathBuf> {
    Ok(PathBuf::from(
        shellexpand::full(path.to_string_lossy().as_ref())
            .map_err(ConfigError::ShellExpansion)?
            .into_owned(),
    ))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read configuration at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[sealed_test(env = [("APT_ROOT", "/srv/apt")])]
    fn deserialize_settings() -> anyhow::Result<()> {
        let result: Settings = r#"
            [sources]
            dir = "$APT_ROOT/sources.list.d"
            system = "pop-os"

            [service]
            bus = "session"
            enforce_polkit = false
            denial_log = "$APT_ROOT/denials.log"
            auth_timeout_secs = 30
            refresh_command = []
        "#
        .parse()?;

        let expect = Settings {
            sources: SourcesSettings {
                dir: PathBuf::from("/srv/apt/sources.list.d"),
                system: "pop-os".into(),
            },
            service: ServiceSettings {
                bus: BusKind::Session,
                enforce_polkit: false,
                denial_log: PathBuf::from("/srv/apt/denials.log"),
                auth_timeout_secs: 30,
                refresh_command: Vec::new(),
            },
        };

        assert_eq!(result, expect);
        assert_eq!(
            result.system_source_path(),
            PathBuf::from("/srv/apt/sources.list.d/pop-os.sources")
        );

        Ok(())
    }

    #[test]
    fn partial_settings_keep_defaults() -> anyhow::Result<()> {
        let result: Settings = r#"
            [service]
            enforce_polkit = false
        "#
        .parse()?;

        assert_eq!(result.sources, SourcesSettings::default());
        assert!(!result.service.enforce_polkit);
        assert_eq!(result.service.auth_timeout(), Duration::from_secs(600));
        assert_eq!(
            result.service.refresh_command,
            vec!["apt-get".to_string(), "update".to_string()]
        );

        Ok(())
    }

    #[test]
    fn serialize_settings() {
        let result = Settings::default().to_string();
        let expect = indoc! {r#"
            [sources]
            dir = "/etc/apt/sources.list.d"
            system = "system"

            [service]
            bus = "system"
            enforce_polkit = true
            denial_log = "/tmp/repoman.log"
            auth_timeout_secs = 600
            refresh_command = [
                "apt-get",
                "update",
            ]
        "#};

        assert_eq!(result, expect);
    }

    #[sealed_test]
    fn missing_file_yields_defaults() -> anyhow::Result<()> {
        let result = Settings::load("does-not-exist.toml")?;
        assert_eq!(result, Settings::default());
        Ok(())
    }
}
