// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! One-line source specifications.
//!
//! Users rarely type a whole deb822 stanza. They paste either a classic
//! sources.list line, or a PPA shortcut:
//!
//! ```text
//! deb [arch=amd64 signed-by=/usr/share/keyrings/example.gpg] http://apt.example.com jammy main
//! ppa:system76/pop
//! ```
//!
//! Both forms are turned into a [`SourceDefinition`] here. PPA shortcuts need
//! the distribution codename to pick a suite, which the caller supplies.

use crate::source::{Result, SourceDefinition, SourceError, SourceType};

const PPA_PREFIX: &str = "ppa:";
const LAUNCHPAD: &str = "http://ppa.launchpad.net";

/// One-line option names and the deb822 keys they map to.
const OPTIONS: &[(&str, &str)] = &[
    ("arch", "Architectures"),
    ("lang", "Languages"),
    ("target", "Targets"),
    ("pdiffs", "PDiffs"),
    ("by-hash", "By-Hash"),
    ("allow-insecure", "Allow-Insecure"),
    ("trusted", "Trusted"),
    ("signed-by", "Signed-By"),
];

/// Parse one-line source specification.
///
/// The file id of the result is derived from the line: `ppa-<owner>-<name>`
/// for PPA shortcuts, a slug of the first URI otherwise.
///
/// # Errors
///
/// - Return [`SourceError::MalformedSpec`] if the line is neither a PPA
///   shortcut nor a valid sources.list line.
pub fn parse_line(line: &str, codename: &str) -> Result<SourceDefinition> {
    let line = line.trim();
    if let Some(ppa) = line.strip_prefix(PPA_PREFIX) {
        return parse_ppa(ppa, codename).ok_or_else(|| SourceError::MalformedSpec(line.into()));
    }

    parse_list_line(line).ok_or_else(|| SourceError::MalformedSpec(line.into()))
}

fn parse_ppa(ppa: &str, codename: &str) -> Option<SourceDefinition> {
    let (owner, archive) = ppa.split_once('/')?;
    let valid = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '+'))
    };
    if !valid(owner) || !valid(archive) || codename.is_empty() {
        return None;
    }

    let id = slugify(&format!("ppa-{owner}-{archive}"));
    let mut definition = SourceDefinition::new(id.clone(), id);
    definition.insert_uris([format!("{LAUNCHPAD}/{owner}/{archive}/ubuntu")]);
    definition.insert_suite(codename);
    definition.insert_component("main");

    Some(definition)
}

fn parse_list_line(line: &str) -> Option<SourceDefinition> {
    let (enabled, rest) = match line.strip_prefix('#') {
        Some(rest) => (false, rest.trim_start()),
        None => (true, line),
    };

    let (kind, rest) = rest.split_once(char::is_whitespace)?;
    let kind: SourceType = kind.parse().ok()?;
    let mut rest = rest.trim_start();

    let mut options = Vec::new();
    if let Some(bracketed) = rest.strip_prefix('[') {
        let (inner, after) = bracketed.split_once(']')?;
        for option in inner.split_whitespace() {
            let (key, value) = option.split_once('=')?;
            options.push((deb822_key(key), value.to_string()));
        }
        rest = after.trim_start();
    }

    let mut words = rest.split_whitespace();
    let uri = words.next()?;
    let suite = words.next()?;
    if !uri.contains(':') {
        return None;
    }

    let id = uri_slug(uri);
    let mut definition = SourceDefinition::new(id.clone(), id);
    definition.enabled = enabled;
    definition.types.clear();
    definition.types.insert(kind);
    definition.insert_uris([uri]);
    definition.insert_suite(suite);
    for component in words {
        definition.insert_component(component);
    }
    for (key, value) in options {
        definition.set_extra(key, value);
    }

    Some(definition)
}

/// Normalize a legacy one-line source identity for comparison.
///
/// Comment markers gain a trailing space, option brackets and single quotes
/// are dropped, runs of spaces collapse to one.
pub fn normalize_line(line: &str) -> String {
    line.replace('#', "# ")
        .replace(['[', ']', '\''], "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Map deb822 key to its one-line option name, if it has one.
pub fn option_name(key: &str) -> Option<&'static str> {
    OPTIONS
        .iter()
        .find(|(_, deb822)| deb822.eq_ignore_ascii_case(key))
        .map(|(option, _)| *option)
}

fn deb822_key(option: &str) -> String {
    match OPTIONS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(option))
    {
        Some((_, key)) => (*key).to_string(),
        None => option
            .split('-')
            .map(|part| {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join("-"),
    }
}

/// Derive file id from URI host and path.
pub fn uri_slug(uri: &str) -> String {
    let without_scheme = uri.split_once("://").map_or(uri, |(_, rest)| rest);
    slugify(without_scheme)
}

/// Lowercase text, collapsing every run of non-alphanumerics into `-`.
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }

    slug.trim_end_matches('-').to_string()
}
