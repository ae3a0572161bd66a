// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Software source definitions.
//!
//! A __source definition__ describes one APT repository entry: where to fetch
//! packages from (URIs), which distribution releases to fetch (suites), which
//! archive areas to fetch (components), and whether the entry is enabled or
//! includes source code.
//!
//! # File Layout
//!
//! Each definition lives in its own deb822 file under the sources directory,
//! e.g., `/etc/apt/sources.list.d/system.sources`. The file name without the
//! `.sources` extension is the definition's __id__. A file holds exactly one
//! stanza:
//!
//! ```text
//! X-Repolib-Name: Pop_OS System Sources
//! Enabled: yes
//! Types: deb deb-src
//! URIs: http://apt.pop-os.org/ubuntu
//! Suites: jammy jammy-security jammy-updates
//! Components: main restricted universe multiverse
//! ```
//!
//! Keys that Repoman does not model are kept verbatim and written back after
//! the known keys.
//!
//! # Invariants
//!
//! - Suites and components are always kept sorted and free of duplicates.
//! - URIs keep their original order, duplicates are dropped.
//!
//! # See Also
//!
//! - [sources.list(5)](https://manpages.debian.org/stable/apt/sources.list.5.en.html)

pub mod line;

use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

const KEY_NAME: &str = "X-Repolib-Name";
const KEY_ENABLED: &str = "Enabled";
const KEY_TYPES: &str = "Types";
const KEY_URIS: &str = "URIs";
const KEY_SUITES: &str = "Suites";
const KEY_COMPONENTS: &str = "Components";

/// Kind of archive a source entry fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceType {
    /// Binary packages.
    Binary,

    /// Source code packages.
    Code,
}

impl SourceType {
    /// Name of type as written in source files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binary => "deb",
            Self::Code => "deb-src",
        }
    }
}

impl FromStr for SourceType {
    type Err = SourceError;

    fn from_str(data: &str) -> Result<Self> {
        match data {
            "deb" => Ok(Self::Binary),
            "deb-src" => Ok(Self::Code),
            other => Err(SourceError::UnknownType(other.into())),
        }
    }
}

impl Display for SourceType {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

/// A single software source definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDefinition {
    /// File id, i.e., file name without `.sources` extension.
    pub id: String,

    /// Human readable name.
    pub name: String,

    /// Whether APT uses this source at all.
    pub enabled: bool,

    pub(crate) types: BTreeSet<SourceType>,
    pub(crate) uris: Vec<String>,
    pub(crate) suites: BTreeSet<String>,
    pub(crate) components: BTreeSet<String>,
    pub(crate) extra: Vec<(String, String)>,
}

impl SourceDefinition {
    /// Construct new enabled binary-only source definition.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            enabled: true,
            types: BTreeSet::from([SourceType::Binary]),
            uris: Vec::new(),
            suites: BTreeSet::new(),
            components: BTreeSet::new(),
            extra: Vec::new(),
        }
    }

    /// Parse deb822 file content into a definition with target id.
    ///
    /// # Errors
    ///
    /// - Return [`SourceError::Empty`] if content has no fields.
    /// - Return [`SourceError::MissingField`] if URIs or suites are absent,
    ///   or if types, URIs, or suites are empty. Absent types mean `deb`.
    /// - Return [`SourceError::UnknownType`] for a type other than `deb` or
    ///   `deb-src`.
    /// - Return [`SourceError::InvalidLine`] for a line that is neither a
    ///   field, a continuation, nor a comment.
    pub fn parse(id: impl Into<String>, content: &str) -> Result<Self> {
        let mut fields: Vec<(String, String)> = Vec::new();
        for line in content.lines() {
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }

            // INVARIANT: Continuation lines extend the previous field.
            if line.starts_with([' ', '\t']) {
                match fields.last_mut() {
                    Some((_, value)) => {
                        value.push(' ');
                        value.push_str(line.trim());
                    }
                    None => return Err(SourceError::InvalidLine(line.into())),
                }
                continue;
            }

            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| SourceError::InvalidLine(line.into()))?;
            fields.push((key.trim().into(), value.trim().into()));
        }

        if fields.is_empty() {
            return Err(SourceError::Empty);
        }

        let id = id.into();
        let mut definition = Self::new(id.clone(), id);
        for (key, value) in fields {
            match key.to_ascii_lowercase().as_str() {
                "x-repolib-name" => definition.name = value,
                "enabled" => definition.enabled = parse_bool(&value),
                "types" => {
                    definition.types = value
                        .split_whitespace()
                        .map(SourceType::from_str)
                        .collect::<Result<BTreeSet<_>>>()?;
                }
                "uris" => {
                    definition.uris.clear();
                    definition.insert_uris(value.split_whitespace());
                }
                "suites" => {
                    definition.suites = value.split_whitespace().map(str::to_owned).collect();
                }
                "components" => {
                    definition.components =
                        value.split_whitespace().map(str::to_owned).collect();
                }
                _ => definition.extra.push((key, value)),
            }
        }

        definition.validate()?;

        Ok(definition)
    }

    /// Check that APT can use this definition.
    ///
    /// # Errors
    ///
    /// - Return [`SourceError::MissingField`] if types, URIs, or suites are
    ///   empty.
    pub fn validate(&self) -> Result<()> {
        if self.types.is_empty() {
            return Err(SourceError::MissingField(KEY_TYPES));
        }

        if self.uris.is_empty() {
            return Err(SourceError::MissingField(KEY_URIS));
        }

        if self.suites.is_empty() {
            return Err(SourceError::MissingField(KEY_SUITES));
        }

        Ok(())
    }

    /// File name of this definition inside the sources directory.
    pub fn file_name(&self) -> String {
        format!("{}.sources", self.id)
    }

    /// Types of archive fetched by this source.
    pub fn types(&self) -> impl Iterator<Item = SourceType> + '_ {
        self.types.iter().copied()
    }

    /// Repository URIs in precedence order.
    pub fn uris(&self) -> &[String] {
        &self.uris
    }

    /// Suites in sorted order.
    pub fn suites(&self) -> impl Iterator<Item = &str> + '_ {
        self.suites.iter().map(String::as_str)
    }

    /// Components in sorted order.
    pub fn components(&self) -> impl Iterator<Item = &str> + '_ {
        self.components.iter().map(String::as_str)
    }

    /// Fields that Repoman keeps but does not interpret.
    pub fn extra_fields(&self) -> &[(String, String)] {
        &self.extra
    }

    /// Check if source code packages are fetched.
    pub fn source_code_enabled(&self) -> bool {
        self.types.contains(&SourceType::Code)
    }

    /// Toggle fetching of source code packages.
    ///
    /// Returns true if the definition changed.
    pub fn set_source_code(&mut self, enabled: bool) -> bool {
        if enabled {
            self.types.insert(SourceType::Code)
        } else {
            self.types.remove(&SourceType::Code)
        }
    }

    /// Toggle the enabled flag.
    ///
    /// Returns true if the definition changed.
    pub fn set_enabled(&mut self, enabled: bool) -> bool {
        let changed = self.enabled != enabled;
        self.enabled = enabled;
        changed
    }

    /// Insert component if absent.
    ///
    /// Returns true if the definition changed.
    pub fn insert_component(&mut self, component: impl Into<String>) -> bool {
        self.components.insert(component.into())
    }

    /// Remove component if present.
    ///
    /// Returns true if the definition changed.
    pub fn remove_component(&mut self, component: impl AsRef<str>) -> bool {
        self.components.remove(component.as_ref())
    }

    /// Insert suite if absent.
    ///
    /// Returns true if the definition changed.
    pub fn insert_suite(&mut self, suite: impl Into<String>) -> bool {
        self.suites.insert(suite.into())
    }

    /// Remove suite if present.
    ///
    /// Returns true if the definition changed.
    pub fn remove_suite(&mut self, suite: impl AsRef<str>) -> bool {
        self.suites.remove(suite.as_ref())
    }

    /// Append URIs, skipping ones already present.
    pub fn insert_uris(&mut self, uris: impl IntoIterator<Item = impl Into<String>>) {
        for uri in uris {
            let uri = uri.into();
            if !self.uris.contains(&uri) {
                self.uris.push(uri);
            }
        }
    }

    /// Replace suites wholesale.
    pub fn replace_suites(&mut self, suites: impl IntoIterator<Item = impl Into<String>>) {
        self.suites = suites.into_iter().map(Into::into).collect();
    }

    /// Replace components wholesale.
    pub fn replace_components(&mut self, components: impl IntoIterator<Item = impl Into<String>>) {
        self.components = components.into_iter().map(Into::into).collect();
    }

    /// Replace URIs wholesale, keeping order.
    pub fn replace_uris(&mut self, uris: impl IntoIterator<Item = impl Into<String>>) {
        self.uris.clear();
        self.insert_uris(uris);
    }

    /// Set or replace an uninterpreted field.
    pub fn set_extra(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self
            .extra
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&key))
        {
            Some((_, existing)) => *existing = value,
            None => self.extra.push((key, value)),
        }
    }

    /// Fold another entry of the same archive into this definition.
    ///
    /// Both must share URIs, components, options, and enabled state. Then an
    /// entry differing only in types, or only in suites, is merged in. Returns
    /// true if the entry was merged.
    pub fn absorb(&mut self, other: &SourceDefinition) -> bool {
        let same_archive = self.enabled == other.enabled
            && self.uris == other.uris
            && self.components == other.components
            && self.extra == other.extra;
        if !same_archive {
            return false;
        }

        if self.types == other.types {
            self.suites.extend(other.suites.iter().cloned());
            true
        } else if self.suites == other.suites {
            self.types.extend(other.types.iter().copied());
            true
        } else {
            false
        }
    }

    /// Take over every field from another definition except id and name.
    pub fn replace_fields(&mut self, other: SourceDefinition) {
        self.enabled = other.enabled;
        self.types = other.types;
        self.uris = other.uris;
        self.suites = other.suites;
        self.components = other.components;
        self.extra = other.extra;
    }

    /// Render definition in legacy one-line format.
    ///
    /// Produces one entry for every combination of type, URI, and suite.
    /// Disabled definitions are commented out.
    pub fn one_line_entries(&self) -> Vec<String> {
        let prefix = if self.enabled { "" } else { "# " };
        let options = self
            .extra
            .iter()
            .filter_map(|(key, value)| {
                line::option_name(key).map(|name| format!("{name}={value}"))
            })
            .collect::<Vec<_>>();
        let options = if options.is_empty() {
            String::new()
        } else {
            format!(" [{}]", options.join(" "))
        };
        let components = self
            .components
            .iter()
            .map(|component| format!(" {component}"))
            .collect::<String>();

        let mut entries = Vec::new();
        for kind in &self.types {
            for uri in &self.uris {
                for suite in &self.suites {
                    entries.push(format!(
                        "{prefix}{kind}{options} {uri} {suite}{components}"
                    ));
                }
            }
        }

        entries
    }
}

impl Display for SourceDefinition {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        writeln!(fmt, "{KEY_NAME}: {}", self.name)?;
        writeln!(
            fmt,
            "{KEY_ENABLED}: {}",
            if self.enabled { "yes" } else { "no" }
        )?;
        writeln!(
            fmt,
            "{KEY_TYPES}: {}",
            join(self.types.iter().map(SourceType::as_str))
        )?;
        writeln!(
            fmt,
            "{KEY_URIS}: {}",
            join(self.uris.iter().map(String::as_str))
        )?;
        writeln!(fmt, "{KEY_SUITES}: {}", join(self.suites()))?;
        if !self.components.is_empty() {
            writeln!(fmt, "{KEY_COMPONENTS}: {}", join(self.components()))?;
        }
        for (key, value) in &self.extra {
            writeln!(fmt, "{key}: {value}")?;
        }

        Ok(())
    }
}

fn join<'a>(items: impl Iterator<Item = &'a str>) -> String {
    items.collect::<Vec<_>>().join(" ")
}

fn parse_bool(value: &str) -> bool {
    !matches!(
        value.to_ascii_lowercase().as_str(),
        "no" | "false" | "0" | "off"
    )
}

/// Source definition error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// Source content has no fields at all.
    #[error("source definition is empty")]
    Empty,

    /// Mandatory field is absent.
    #[error("source definition lacks required field {0:?}")]
    MissingField(&'static str),

    /// Type is neither `deb` nor `deb-src`.
    #[error("unknown source type {0:?}")]
    UnknownType(String),

    /// Line cannot be interpreted.
    #[error("invalid source line {0:?}")]
    InvalidLine(String),

    /// One-line source specification cannot be parsed.
    #[error("malformed source specification {0:?}")]
    MalformedSpec(String),
}

/// Friendly result alias :3
pub type Result<T, E = SourceError> = std::result::Result<T, E>;
