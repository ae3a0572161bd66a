// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that Repoman
//! needs to read or manage in some way.

use std::path::PathBuf;

/// Default directory holding one deb822 source file per repository.
pub const DEFAULT_SOURCES_DIR: &str = "/etc/apt/sources.list.d";

/// Default file id of the vendor's system source.
pub const DEFAULT_SYSTEM_SOURCE: &str = "system";

/// Default append-only log of authorization denials.
pub const DEFAULT_DENIAL_LOG: &str = "/tmp/repoman.log";

/// Location of the distribution's os-release file.
pub const OS_RELEASE: &str = "/etc/os-release";

/// System-wide configuration file shared by the helper and the client.
pub const SYSTEM_CONFIG: &str = "/etc/repoman/repoman.toml";

/// Environment variable that overrides configuration file lookup.
pub const CONFIG_ENV: &str = "REPOMAN_CONFIG";

/// Determine path of the per-user configuration file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/repoman/repoman.toml`.
/// Does not check if the path returned actually exists.
///
/// # Errors
///
/// - Return [`NoWayHome`] if configuration directory cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn user_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("repoman").join("repoman.toml"))
        .ok_or(NoWayHome)
}

/// Determine which configuration file to load.
///
/// Lookup order: explicit path, then `$REPOMAN_CONFIG`, then the per-user
/// file if it exists, and finally the system-wide file. The returned path
/// may not exist, callers fall back to defaults in that case.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(path) = explicit {
        return path;
    }

    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return PathBuf::from(path);
    }

    match user_config_path() {
        Ok(path) if path.exists() => path,
        _ => PathBuf::from(SYSTEM_CONFIG),
    }
}

/// No way to determine user's configuration directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoWayHome;

/// Friendly result alias :3
pub type Result<T, E = NoWayHome> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;

    #[test]
    fn explicit_config_path_wins() {
        let result = resolve_config_path(Some(PathBuf::from("/tmp/custom.toml")));
        assert_eq!(result, PathBuf::from("/tmp/custom.toml"));
    }

    #[sealed_test(env = [("REPOMAN_CONFIG", "/srv/repoman.toml")])]
    fn config_path_from_environment() {
        let result = resolve_config_path(None);
        assert_eq!(result, PathBuf::from("/srv/repoman.toml"));
    }

    #[sealed_test(env = [("XDG_CONFIG_HOME", "/nonexistent/config")])]
    fn config_path_falls_back_to_system_file() {
        std::env::remove_var(CONFIG_ENV);
        let result = resolve_config_path(None);
        assert_eq!(result, PathBuf::from(SYSTEM_CONFIG));
    }
}
