// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Source store management and manipulation.
//!
//! Repoman groups source definitions together into one place called the
//! __source store__: a directory holding one deb822 `.sources` file per
//! repository. The default location is `/etc/apt/sources.list.d`.
//!
//! # Source Store Layout
//!
//! Each source is identified by its file id, the file name without the
//! `.sources` extension. So, `/etc/apt/sources.list.d/system.sources` means
//! that the store contains a source with id "system". One id is singled out
//! as the __system source__, the distribution's default repositories. It is
//! never listed along with user added sources, and it cannot be deleted.
//!
//! Only the top-level of the store is evaluated. Legacy `.list` files are
//! ignored.
//!
//! # Consistency
//!
//! The store keeps no cache. Every operation reads its target file fresh from
//! disk, and every write goes to a sibling temporary file that is renamed
//! into place.

use crate::source::{line::normalize_line, SourceDefinition, SourceError};

use std::{
    collections::BTreeMap,
    fs::{read_to_string, remove_file, rename, write},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

const EXTENSION: &str = "sources";

/// Directory of source definition files.
#[derive(Debug, Clone)]
pub struct SourceStore {
    store_path: PathBuf,
    system_id: String,
}

impl SourceStore {
    /// Open source store at target directory.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::MissingStore`] if the directory does not exist.
    pub fn open(path: impl Into<PathBuf>, system_id: impl Into<String>) -> Result<Self> {
        let store_path = path.into();
        if !store_path.is_dir() {
            return Err(StoreError::MissingStore(store_path));
        }

        Ok(Self {
            store_path,
            system_id: system_id.into(),
        })
    }

    /// Path to source store directory.
    pub fn path(&self) -> &Path {
        self.store_path.as_path()
    }

    /// File id of the system source.
    pub fn system_id(&self) -> &str {
        &self.system_id
    }

    /// Check whether identifier names the system source.
    pub fn is_system(&self, id: &str) -> bool {
        strip_extension(id) == self.system_id
    }

    /// Absolute path of source file for target id.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::InvalidId`] if id could escape the store.
    pub fn source_path(&self, id: &str) -> Result<PathBuf> {
        let id = validate_id(id)?;
        Ok(self.store_path.join(format!("{id}.{EXTENSION}")))
    }

    /// List every source except the system source.
    ///
    /// Maps source file path to human readable name. Files that fail to parse
    /// are skipped with a warning.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Glob`] if the store path is not valid UTF-8.
    #[instrument(skip(self), level = "debug")]
    pub fn list(&self) -> Result<BTreeMap<PathBuf, String>> {
        let mut sources = BTreeMap::new();
        for path in self.source_files()? {
            let Some(id) = file_id(&path) else { continue };
            if id == self.system_id {
                continue;
            }

            match self.load(&id, &path) {
                Ok(definition) => {
                    sources.insert(path, definition.name);
                }
                Err(error) => warn!("skip unreadable source {}: {error}", path.display()),
            }
        }

        Ok(sources)
    }

    /// Load every source except the system source.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::Glob`] if the store path is not valid UTF-8.
    pub fn definitions(&self) -> Result<Vec<SourceDefinition>> {
        let mut definitions = Vec::new();
        for path in self.source_files()? {
            let Some(id) = file_id(&path) else { continue };
            if id == self.system_id {
                continue;
            }

            match self.load(&id, &path) {
                Ok(definition) => definitions.push(definition),
                Err(error) => warn!("skip unreadable source {}: {error}", path.display()),
            }
        }

        Ok(definitions)
    }

    /// Open source definition by id.
    ///
    /// Accepts the id with or without `.sources` extension.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::InvalidId`] if id could escape the store.
    /// - Return [`StoreError::NotFound`] if no such file exists.
    /// - Return [`StoreError::Read`] if the file cannot be read.
    /// - Return [`StoreError::Parse`] if the file is not a valid definition.
    pub fn open_source(&self, id: &str) -> Result<SourceDefinition> {
        let id = validate_id(id)?;
        let path = self.source_path(id)?;
        self.load(id, &path)
    }

    /// Open the system source definition.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::NotFound`] if the system source is missing.
    /// - Return [`StoreError::Read`] if the file cannot be read.
    /// - Return [`StoreError::Parse`] if the file is not a valid definition.
    pub fn system_source(&self) -> Result<SourceDefinition> {
        self.open_source(&self.system_id)
    }

    /// Create new source file from definition.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::InvalidId`] if definition id could escape the
    ///   store.
    /// - Return [`StoreError::AlreadyExists`] if a file with the same id
    ///   exists.
    /// - Return [`StoreError::Invalid`] if the definition lacks types, URIs,
    ///   or suites.
    /// - Return [`StoreError::Write`] if the file cannot be written.
    #[instrument(skip(self, definition), fields(id = %definition.id), level = "debug")]
    pub fn create(&self, definition: &SourceDefinition) -> Result<PathBuf> {
        let path = self.source_path(&definition.id)?;
        if path.exists() {
            return Err(StoreError::AlreadyExists(definition.id.clone()));
        }

        self.persist(&path, definition)?;
        info!("created source {}", path.display());

        Ok(path)
    }

    /// First unused file id starting from `base`.
    ///
    /// Returns `base` itself when free, else `base-2`, `base-3`, and so on.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::InvalidId`] if `base` could escape the store.
    pub fn available_id(&self, base: &str) -> Result<String> {
        let base = validate_id(base)?;
        let mut id = base.to_string();
        let mut counter = 1;
        while self.source_path(&id)?.exists() {
            counter += 1;
            id = format!("{base}-{counter}");
        }

        Ok(id)
    }

    /// Overwrite existing source file with definition.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::InvalidId`] if definition id could escape the
    ///   store.
    /// - Return [`StoreError::NotFound`] if no such file exists.
    /// - Return [`StoreError::Invalid`] if the definition lacks types, URIs,
    ///   or suites.
    /// - Return [`StoreError::Write`] if the file cannot be written.
    pub fn save(&self, definition: &SourceDefinition) -> Result<()> {
        let path = self.source_path(&definition.id)?;
        if !path.exists() {
            return Err(StoreError::NotFound(definition.id.clone()));
        }

        self.persist(&path, definition)
    }

    /// Edit source definition in place.
    ///
    /// Reads the current definition from disk, hands it to the editor, and
    /// writes the result back only if the editor reports a change.
    ///
    /// # Errors
    ///
    /// - Return errors of [`SourceStore::open_source`].
    /// - Return [`StoreError::Invalid`] if the definition lacks types, URIs,
    ///   or suites.
    /// - Return [`StoreError::Write`] if the file cannot be written.
    #[instrument(skip(self, editor), level = "debug")]
    pub fn edit<E>(&self, id: &str, editor: E) -> Result<SourceDefinition>
    where
        E: FnOnce(&mut SourceDefinition) -> bool,
    {
        let mut definition = self.open_source(id)?;
        if !editor(&mut definition) {
            debug!("source {id} unchanged, skip write");
            return Ok(definition);
        }

        let path = self.source_path(&definition.id)?;
        self.persist(&path, &definition)?;
        info!("updated source {}", path.display());

        Ok(definition)
    }

    /// Delete source file by id.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::InvalidId`] if id could escape the store.
    /// - Return [`StoreError::ProtectedSystemSource`] if id names the system
    ///   source.
    /// - Return [`StoreError::NotFound`] if no such file exists.
    /// - Return [`StoreError::Write`] if the file cannot be removed.
    pub fn delete(&self, id: &str) -> Result<()> {
        if self.is_system(id) {
            return Err(StoreError::ProtectedSystemSource);
        }

        let path = self.source_path(id)?;
        remove_file(&path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => StoreError::NotFound(strip_extension(id).into()),
            _ => StoreError::Write { source: err, path: path.clone() },
        })?;
        info!("deleted source {}", path.display());

        Ok(())
    }

    /// Find source by file id, file name, or legacy one-line identity.
    ///
    /// File ids are tried first. Otherwise the identifier is normalized and
    /// compared against the one-line rendering of every listed source.
    ///
    /// # Errors
    ///
    /// - Return [`StoreError::NotFound`] if nothing matches.
    /// - Return errors of [`SourceStore::open_source`] for a matching file id
    ///   that cannot be loaded.
    pub fn find(&self, identifier: &str) -> Result<SourceDefinition> {
        let identifier = identifier.trim();
        if validate_id(identifier).is_ok() {
            match self.open_source(identifier) {
                Err(StoreError::NotFound(_)) => {}
                other => return other,
            }
        }

        let wanted = normalize_line(identifier);
        self.definitions()?
            .into_iter()
            .find(|definition| {
                definition
                    .one_line_entries()
                    .iter()
                    .any(|entry| normalize_line(entry) == wanted)
            })
            .ok_or_else(|| StoreError::NotFound(identifier.into()))
    }

    fn source_files(&self) -> Result<Vec<PathBuf>> {
        let pattern = self.store_path.join(format!("*.{EXTENSION}"));
        let pattern = pattern
            .to_str()
            .ok_or_else(|| StoreError::Glob(self.store_path.clone()))?;
        let mut paths = glob::glob(pattern)
            .map_err(|_| StoreError::Glob(self.store_path.clone()))?
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .collect::<Vec<_>>();
        paths.sort();

        Ok(paths)
    }

    fn load(&self, id: &str, path: &Path) -> Result<SourceDefinition> {
        let content = read_to_string(path).map_err(|err| match err.kind() {
            ErrorKind::NotFound => StoreError::NotFound(id.into()),
            _ => StoreError::Read { source: err, path: path.to_path_buf() },
        })?;

        SourceDefinition::parse(id, &content).map_err(|err| StoreError::Parse {
            source: err,
            path: path.to_path_buf(),
        })
    }

    fn persist(&self, path: &Path, definition: &SourceDefinition) -> Result<()> {
        definition.validate().map_err(StoreError::Invalid)?;

        let staging = path.with_extension(format!("{EXTENSION}.repoman-tmp"));
        write(&staging, definition.to_string().as_bytes()).map_err(|err| StoreError::Write {
            source: err,
            path: staging.clone(),
        })?;
        if let Err(err) = rename(&staging, path) {
            if let Err(cleanup) = remove_file(&staging) {
                warn!("cannot remove staging file {}: {cleanup}", staging.display());
            }
            return Err(StoreError::Write {
                source: err,
                path: path.to_path_buf(),
            });
        }

        Ok(())
    }
}

fn strip_extension(id: &str) -> &str {
    id.strip_suffix(".sources").unwrap_or(id)
}

fn validate_id(id: &str) -> Result<&str> {
    let id = strip_extension(id.trim());
    if id.is_empty()
        || id.contains(['/', '\0', ' '])
        || id.contains("..")
        || id.starts_with('.')
    {
        return Err(StoreError::InvalidId(id.into()));
    }

    Ok(id)
}

fn file_id(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_owned)
}

/// All possible error types for source store interaction.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Source store directory does not exist.
    #[error("source store {:?} does not exist", .0.display())]
    MissingStore(PathBuf),

    /// Source store path cannot be used as glob pattern.
    #[error("cannot enumerate source store at {:?}", .0.display())]
    Glob(PathBuf),

    /// Id would resolve outside the store.
    #[error("invalid source id {0:?}")]
    InvalidId(String),

    /// No source matches.
    #[error("source {0:?} not found")]
    NotFound(String),

    /// Source with this id already exists.
    #[error("source {0:?} already exists")]
    AlreadyExists(String),

    /// System source cannot be removed.
    #[error("system source cannot be removed")]
    ProtectedSystemSource,

    /// Source file cannot be read.
    #[error("failed to read source file at {:?}", path.display())]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Source file cannot be written.
    #[error("failed to write source file at {:?}", path.display())]
    Write {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Definition would not be usable by APT.
    #[error("refusing to write unusable source definition")]
    Invalid(#[source] SourceError),

    /// Source file content is invalid.
    #[error("failed to parse source file at {:?}", path.display())]
    Parse {
        #[source]
        source: SourceError,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
