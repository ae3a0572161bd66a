// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Privileged source mutation service.
//!
//! The service is the single trusted point of mutation for source files. The
//! bus layer hands every request to one of the operations below along with
//! the identity of the remote caller. In-process callers, e.g., tests, pass no
//! caller at all and skip authorization.
//!
//! Each operation follows the same shape:
//!
//! 1. Authorize the caller for the operation's privilege.
//! 2. Load the target source fresh from disk.
//! 3. Mutate it, and persist it if anything changed.
//! 4. Return status `0`.
//!
//! Nothing is read or written before authorization succeeds.

use crate::{
    auth::{AuthError, Authorizer, AuthorityError, Caller, PolicyClient, Privilege},
    source::{
        line::{parse_line, slugify},
        SourceDefinition, SourceError,
    },
    store::{SourceStore, StoreError},
};

use std::{ffi::OsStr, sync::Arc};
use tokio::{process::Command, sync::Notify};
use tracing::{debug, info, instrument, warn};

/// Status returned by every successful operation.
pub const SUCCESS: i32 = 0;

/// Privileged source mutation service.
#[derive(Debug)]
pub struct RepomanService<P>
where
    P: PolicyClient,
{
    store: SourceStore,
    authorizer: Authorizer<P>,
    codename: Option<String>,
    refresh_command: Vec<String>,
    shutdown: Arc<Notify>,
}

impl<P> RepomanService<P>
where
    P: PolicyClient,
{
    /// Construct new service.
    ///
    /// The codename is needed to expand PPA shortcuts and update pockets. The
    /// refresh command runs after a source is modified. An empty command
    /// disables refreshing.
    pub fn new(
        store: SourceStore,
        authorizer: Authorizer<P>,
        codename: Option<String>,
        refresh_command: Vec<String>,
    ) -> Self {
        Self {
            store,
            authorizer,
            codename,
            refresh_command,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Source store the service mutates.
    pub fn store(&self) -> &SourceStore {
        &self.store
    }

    /// Authorizer guarding the service.
    pub fn authorizer(&self) -> &Authorizer<P> {
        &self.authorizer
    }

    /// Signal fired when a caller asks the service to exit.
    pub fn shutdown_signal(&self) -> Arc<Notify> {
        Arc::clone(&self.shutdown)
    }

    /// Add source from one-line specification.
    ///
    /// # Errors
    ///
    /// - Return [`ServiceError::Denied`] if caller lacks the add privilege.
    /// - Return [`ServiceError::Malformed`] if the line cannot be parsed.
    /// A line completing a source already stored under the derived id, e.g.,
    /// its `deb-src` companion or another suite of the same archive, is merged
    /// into that file. Any other line landing on a taken id gets a fresh file
    /// with a numbered id.
    ///
    /// # Errors
    ///
    /// - Return [`ServiceError::Denied`] if caller lacks the add privilege.
    /// - Return [`ServiceError::Malformed`] if the line cannot be parsed.
    /// - Return [`ServiceError::AlreadyExists`] if every entry of the line is
    ///   already present in the store.
    /// - Return [`ServiceError::Persistence`] if the file cannot be written.
    #[instrument(skip(self), level = "debug")]
    pub async fn add_repo(&self, caller: Option<&Caller>, line: &str) -> Result<i32> {
        self.authorizer.check(caller, Privilege::Add).await?;

        let mut definition = parse_line(line, self.codename.as_deref().unwrap_or_default())?;
        if self.already_present(&definition)? {
            return Err(ServiceError::AlreadyExists(line.trim().into()));
        }

        match self.store.open_source(&definition.id) {
            Ok(mut existing) => {
                if existing.absorb(&definition) {
                    self.store.save(&existing)?;
                    info!("merged {line:?} into source {}", existing.id);
                    return Ok(SUCCESS);
                }

                let id = self.store.available_id(&definition.id)?;
                if definition.name == definition.id {
                    definition.name = id.clone();
                }
                definition.id = id;
            }
            Err(StoreError::NotFound(_)) => {}
            Err(error) => return Err(error.into()),
        }

        self.store.create(&definition)?;
        info!("added source {} from {line:?}", definition.id);

        Ok(SUCCESS)
    }

    /// Add source from structured fields.
    ///
    /// URIs, suites, and components are whitespace separated lists. The file
    /// id is derived from the name.
    ///
    /// # Errors
    ///
    /// - Return [`ServiceError::Denied`] if caller lacks the add privilege.
    /// - Return [`ServiceError::Malformed`] if name, URIs, or suites are
    ///   empty.
    /// - Return [`ServiceError::AlreadyExists`] if a source with the derived
    ///   id exists.
    /// - Return [`ServiceError::Persistence`] if the file cannot be written.
    #[instrument(skip(self), level = "debug")]
    pub async fn add_full_repo(
        &self,
        caller: Option<&Caller>,
        name: &str,
        uris: &str,
        suites: &str,
        components: &str,
        source_code: bool,
    ) -> Result<i32> {
        self.authorizer.check(caller, Privilege::Add).await?;

        let id = slugify(name);
        if id.is_empty() {
            return Err(ServiceError::Malformed(format!(
                "source name {name:?} has no usable characters"
            )));
        }

        let mut definition = SourceDefinition::new(id, name.trim());
        fill_fields(&mut definition, uris, suites, components)?;
        definition.set_source_code(source_code);
        self.store.create(&definition)?;
        info!("added source {} named {name:?}", definition.id);

        Ok(SUCCESS)
    }

    /// Remove source by file id or one-line identity.
    ///
    /// # Errors
    ///
    /// - Return [`ServiceError::Denied`] if caller lacks the delete privilege.
    /// - Return [`ServiceError::NotFound`] if nothing matches.
    /// - Return [`ServiceError::Malformed`] if the system source is targeted.
    /// - Return [`ServiceError::Persistence`] if the file cannot be removed.
    #[instrument(skip(self), level = "debug")]
    pub async fn remove_repo(&self, caller: Option<&Caller>, identifier: &str) -> Result<i32> {
        self.authorizer.check(caller, Privilege::Delete).await?;

        let definition = self.store.find(identifier)?;
        self.store.delete(&definition.id)?;
        info!("removed source {}", definition.id);

        Ok(SUCCESS)
    }

    /// Replace source located by old identity with one-line specification.
    ///
    /// Keeps the originating file and name, then refreshes the package index.
    ///
    /// # Errors
    ///
    /// - Return [`ServiceError::Denied`] if caller lacks the modify privilege.
    /// - Return [`ServiceError::NotFound`] if the old source does not exist.
    /// - Return [`ServiceError::Malformed`] if the new line cannot be parsed.
    /// - Return [`ServiceError::Persistence`] if the file cannot be written.
    #[instrument(skip(self), level = "debug")]
    pub async fn modify_repo(
        &self,
        caller: Option<&Caller>,
        old_identifier: &str,
        new_line: &str,
    ) -> Result<i32> {
        self.authorizer.check(caller, Privilege::Modify).await?;

        let mut definition = self.store.find(old_identifier)?;
        let replacement = parse_line(new_line, self.codename.as_deref().unwrap_or_default())?;
        definition.replace_fields(replacement);
        self.store.save(&definition)?;
        info!("modified source {}", definition.id);

        self.refresh_package_index().await;
        Ok(SUCCESS)
    }

    /// Overwrite fields of named source file.
    ///
    /// # Errors
    ///
    /// - Return [`ServiceError::Denied`] if caller lacks the modify privilege.
    /// - Return [`ServiceError::NotFound`] if the file does not exist.
    /// - Return [`ServiceError::Malformed`] if URIs or suites are empty.
    /// - Return [`ServiceError::Persistence`] if the file cannot be written.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip(self), level = "debug")]
    pub async fn set_modified_repo(
        &self,
        caller: Option<&Caller>,
        name: &str,
        enabled: bool,
        source_code: bool,
        uris: &str,
        suites: &str,
        components: &str,
        filename: &str,
    ) -> Result<i32> {
        self.authorizer.check(caller, Privilege::Modify).await?;

        let mut fields = SourceDefinition::new(filename, name.trim());
        fill_fields(&mut fields, uris, suites, components)?;
        self.store.edit(filename, |definition| {
            if !name.trim().is_empty() {
                definition.name = name.trim().into();
            }
            definition.set_enabled(enabled);
            definition.set_source_code(source_code);
            definition.replace_uris(fields.uris);
            definition.replace_suites(fields.suites);
            definition.replace_components(fields.components);
            true
        })?;
        info!("rewrote source {filename}");

        self.refresh_package_index().await;
        Ok(SUCCESS)
    }

    /// Add component to source.
    ///
    /// # Errors
    ///
    /// - Return [`ServiceError::Denied`] if caller lacks the modify privilege.
    /// - Return [`ServiceError::NotFound`] if the source does not exist.
    /// - Return [`ServiceError::Malformed`] if the component is not one word.
    /// - Return [`ServiceError::Persistence`] if the file cannot be written.
    #[instrument(skip(self), level = "debug")]
    pub async fn add_component(
        &self,
        caller: Option<&Caller>,
        repo: &str,
        component: &str,
    ) -> Result<i32> {
        self.authorizer.check(caller, Privilege::Modify).await?;

        let component = single_word("component", component)?;
        self.store
            .edit(repo, |definition| definition.insert_component(component))?;

        Ok(SUCCESS)
    }

    /// Remove component from source.
    ///
    /// # Errors
    ///
    /// - Return [`ServiceError::Denied`] if caller lacks the modify privilege.
    /// - Return [`ServiceError::NotFound`] if the source does not exist.
    /// - Return [`ServiceError::Malformed`] if the component is not one word.
    /// - Return [`ServiceError::Persistence`] if the file cannot be written.
    #[instrument(skip(self), level = "debug")]
    pub async fn remove_component(
        &self,
        caller: Option<&Caller>,
        repo: &str,
        component: &str,
    ) -> Result<i32> {
        self.authorizer.check(caller, Privilege::Modify).await?;

        let component = single_word("component", component)?;
        self.store
            .edit(repo, |definition| definition.remove_component(component))?;

        Ok(SUCCESS)
    }

    /// Add suite to source.
    ///
    /// # Errors
    ///
    /// - Return [`ServiceError::Denied`] if caller lacks the modify privilege.
    /// - Return [`ServiceError::NotFound`] if the source does not exist.
    /// - Return [`ServiceError::Malformed`] if the suite is not one word.
    /// - Return [`ServiceError::Persistence`] if the file cannot be written.
    #[instrument(skip(self), level = "debug")]
    pub async fn add_suite(&self, caller: Option<&Caller>, repo: &str, suite: &str) -> Result<i32> {
        self.authorizer.check(caller, Privilege::Modify).await?;

        let suite = single_word("suite", suite)?;
        self.store
            .edit(repo, |definition| definition.insert_suite(suite))?;

        Ok(SUCCESS)
    }

    /// Remove suite from source.
    ///
    /// # Errors
    ///
    /// - Return [`ServiceError::Denied`] if caller lacks the modify privilege.
    /// - Return [`ServiceError::NotFound`] if the source does not exist.
    /// - Return [`ServiceError::Malformed`] if the suite is not one word, or
    ///   it is the last suite of the source.
    /// - Return [`ServiceError::Persistence`] if the file cannot be written.
    #[instrument(skip(self), level = "debug")]
    pub async fn remove_suite(
        &self,
        caller: Option<&Caller>,
        repo: &str,
        suite: &str,
    ) -> Result<i32> {
        self.authorizer.check(caller, Privilege::Modify).await?;

        let suite = single_word("suite", suite)?;
        self.store
            .edit(repo, |definition| definition.remove_suite(suite))?;

        Ok(SUCCESS)
    }

    /// Toggle component of the system source.
    ///
    /// # Errors
    ///
    /// - Return errors of [`RepomanService::add_component`].
    pub async fn set_component_enabled(
        &self,
        caller: Option<&Caller>,
        component: &str,
        enabled: bool,
    ) -> Result<i32> {
        let system = self.store.system_id().to_owned();
        if enabled {
            self.add_component(caller, &system, component).await
        } else {
            self.remove_component(caller, &system, component).await
        }
    }

    /// Toggle child suite of the system source.
    ///
    /// A child starting with `-` names an update pocket, e.g., `-proposed`,
    /// and is prefixed with the distribution codename.
    ///
    /// # Errors
    ///
    /// - Return [`ServiceError::Malformed`] if a pocket is given but the
    ///   codename is unknown.
    /// - Return errors of [`RepomanService::add_suite`].
    pub async fn set_child_enabled(
        &self,
        caller: Option<&Caller>,
        child: &str,
        enabled: bool,
    ) -> Result<i32> {
        self.authorizer.check(caller, Privilege::Modify).await?;

        let suite = if child.starts_with('-') {
            let codename = self.codename.as_deref().ok_or_else(|| {
                ServiceError::Malformed(format!(
                    "cannot expand pocket {child:?} without distribution codename"
                ))
            })?;
            format!("{codename}{child}")
        } else {
            child.to_owned()
        };

        let system = self.store.system_id().to_owned();
        if enabled {
            self.add_suite(None, &system, &suite).await
        } else {
            self.remove_suite(None, &system, &suite).await
        }
    }

    /// Toggle source code packages of the system source.
    ///
    /// # Errors
    ///
    /// - Return errors of [`RepomanService::set_source`].
    pub async fn set_source_code_enabled(
        &self,
        caller: Option<&Caller>,
        enabled: bool,
    ) -> Result<i32> {
        let system = self.store.system_id().to_owned();
        self.set_source(caller, &system, enabled).await
    }

    /// Toggle source code packages of named source.
    ///
    /// # Errors
    ///
    /// - Return [`ServiceError::Denied`] if caller lacks the modify privilege.
    /// - Return [`ServiceError::NotFound`] if the source does not exist.
    /// - Return [`ServiceError::Malformed`] if disabling source code would
    ///   leave the source without any type.
    /// - Return [`ServiceError::Persistence`] if the file cannot be written.
    #[instrument(skip(self), level = "debug")]
    pub async fn set_source(&self, caller: Option<&Caller>, repo: &str, enabled: bool) -> Result<i32> {
        self.authorizer.check(caller, Privilege::Modify).await?;

        self.store
            .edit(repo, |definition| definition.set_source_code(enabled))?;

        Ok(SUCCESS)
    }

    /// Always fail.
    ///
    /// Lets clients exercise their error reporting path.
    ///
    /// # Errors
    ///
    /// - Always return [`ServiceError::Raised`].
    pub fn raise_exception(&self) -> Result<()> {
        Err(ServiceError::Raised)
    }

    /// Ask the service loop to stop.
    pub fn exit(&self) {
        info!("exit requested");
        self.shutdown.notify_one();
    }

    fn already_present(&self, definition: &SourceDefinition) -> Result<bool> {
        for entry in definition.one_line_entries() {
            match self.store.find(&entry) {
                Ok(_) => {}
                Err(StoreError::NotFound(_)) => return Ok(false),
                Err(error) => return Err(error.into()),
            }
        }

        Ok(true)
    }

    async fn refresh_package_index(&self) {
        let Some((program, args)) = self.refresh_command.split_first() else {
            debug!("package index refresh disabled");
            return;
        };

        match syscall_non_interactive(program, args).await {
            Ok(message) => debug!("package index refreshed: {message}"),
            Err(error) => warn!("package index refresh failed: {error}"),
        }
    }
}

fn fill_fields(
    definition: &mut SourceDefinition,
    uris: &str,
    suites: &str,
    components: &str,
) -> Result<()> {
    definition.replace_uris(uris.split_whitespace());
    definition.replace_suites(suites.split_whitespace());
    definition.replace_components(components.split_whitespace());

    if definition.uris().is_empty() {
        return Err(ServiceError::Malformed("source needs at least one URI".into()));
    }

    if definition.suites().next().is_none() {
        return Err(ServiceError::Malformed("source needs at least one suite".into()));
    }

    Ok(())
}

fn single_word<'a>(what: &str, word: &'a str) -> Result<&'a str> {
    let word = word.trim();
    if word.is_empty() || word.contains(char::is_whitespace) {
        return Err(ServiceError::Malformed(format!("invalid {what} {word:?}")));
    }

    Ok(word)
}

async fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> std::io::Result<String> {
    let output = Command::new(cmd.as_ref()).args(args).output().await?;
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();
    let mut message = String::new();

    if !stdout.is_empty() {
        message.push_str(format!("stdout: {stdout}").as_str());
    }

    if !stderr.is_empty() {
        message.push_str(format!("stderr: {stderr}").as_str());
    }

    // INVARIANT: Chomp trailing newlines.
    let message = message.trim_end_matches(['\r', '\n']).to_string();

    if !output.status.success() {
        return Err(std::io::Error::other(format!(
            "command {:?} failed:\n{message}",
            cmd.as_ref()
        )));
    }

    Ok(message)
}

/// Service error types.
///
/// Each variant maps to a distinct bus error so that clients can react to
/// the kind of failure.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Caller does not hold the privilege.
    #[error("permission denied by policy: {0}")]
    Denied(Privilege),

    /// Policy authority could not decide.
    #[error(transparent)]
    Authority(AuthorityError),

    /// Target source does not exist.
    #[error("source {0:?} not found")]
    NotFound(String),

    /// Request parameters are invalid.
    #[error("malformed request: {0}")]
    Malformed(String),

    /// Source with the same id already exists.
    #[error("source {0:?} already exists")]
    AlreadyExists(String),

    /// Source file could not be read or written.
    #[error("could not complete operation")]
    Persistence(#[source] StoreError),

    /// Diagnostic failure requested by caller.
    #[error("Error managing software sources!")]
    Raised,
}

impl From<AuthError> for ServiceError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Denied(privilege) => Self::Denied(privilege),
            AuthError::Authority(error) => Self::Authority(error),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::AlreadyExists(id) => Self::AlreadyExists(id),
            StoreError::InvalidId(_) | StoreError::ProtectedSystemSource => {
                Self::Malformed(error.to_string())
            }
            StoreError::Invalid(source) => Self::Malformed(source.to_string()),
            other => Self::Persistence(other),
        }
    }
}

impl From<SourceError> for ServiceError {
    fn from(error: SourceError) -> Self {
        Self::Malformed(error.to_string())
    }
}

/// Friendly result alias :3
pub type Result<T, E = ServiceError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{audit::DenialLog, auth::tests::MockPolicy};
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::fs::{read_to_string, write};
    use tempfile::TempDir;

    const SYSTEM: &str = indoc! {r#"
        X-Repolib-Name: System Sources
        Enabled: yes
        Types: deb
        URIs: http://archive.ubuntu.com/ubuntu
        Suites: focal focal-proposed
        Components: main
    "#};

    const VENDOR: &str = indoc! {r#"
        X-Repolib-Name: Vendor
        Enabled: yes
        Types: deb
        URIs: https://apt.vendor.example
        Suites: stable
        Components: main
    "#};

    struct Fixture {
        dir: TempDir,
        service: RepomanService<MockPolicy>,
    }

    impl Fixture {
        fn new(policy: MockPolicy) -> anyhow::Result<Self> {
            let dir = tempfile::tempdir()?;
            let sources = dir.path().join("sources.list.d");
            std::fs::create_dir(&sources)?;
            write(sources.join("system.sources"), SYSTEM)?;
            write(sources.join("vendor.sources"), VENDOR)?;

            let store = SourceStore::open(&sources, "system")?;
            let log = DenialLog::new(dir.path().join("repoman.log"));
            let authorizer = Authorizer::new(policy, true, log);
            let service = RepomanService::new(store, authorizer, Some("focal".into()), Vec::new());

            Ok(Self { dir, service })
        }

        fn read(&self, id: &str) -> anyhow::Result<String> {
            Ok(read_to_string(
                self.dir
                    .path()
                    .join("sources.list.d")
                    .join(format!("{id}.sources")),
            )?)
        }

        fn system(&self) -> anyhow::Result<SourceDefinition> {
            Ok(self.service.store().system_source()?)
        }
    }

    fn remote() -> Caller {
        Caller::new(":1.99")
    }

    #[tokio::test]
    async fn add_component_to_system_source() -> anyhow::Result<()> {
        let fixture = Fixture::new(MockPolicy::allowing())?;

        let status = fixture
            .service
            .add_component(Some(&remote()), "system", "universe")
            .await?;

        assert_eq!(status, SUCCESS);
        assert_eq!(
            fixture.system()?.components().collect::<Vec<_>>(),
            vec!["main", "universe"]
        );
        assert!(fixture.read("system")?.contains("Components: main universe\n"));
        Ok(())
    }

    #[tokio::test]
    async fn remove_suite_from_system_source() -> anyhow::Result<()> {
        let fixture = Fixture::new(MockPolicy::allowing())?;

        fixture
            .service
            .remove_suite(Some(&remote()), "system", "focal-proposed")
            .await?;

        assert_eq!(fixture.system()?.suites().collect::<Vec<_>>(), vec!["focal"]);
        Ok(())
    }

    #[tokio::test]
    async fn components_persist_sorted_regardless_of_order() -> anyhow::Result<()> {
        let fixture = Fixture::new(MockPolicy::allowing())?;

        for component in ["universe", "multiverse", "restricted", "universe"] {
            fixture.service.add_component(None, "system", component).await?;
        }
        fixture.service.remove_component(None, "system", "absent").await?;

        assert!(fixture
            .read("system")?
            .contains("Components: main multiverse restricted universe\n"));
        Ok(())
    }

    #[tokio::test]
    async fn denied_caller_leaves_files_untouched() -> anyhow::Result<()> {
        let fixture = Fixture::new(MockPolicy::denying())?;
        let before = fixture.read("system")?;
        let caller = remote();
        let caller = Some(&caller);
        let service = &fixture.service;

        let results = vec![
            service.add_repo(caller, "deb http://new.example jammy main").await,
            service
                .add_full_repo(caller, "New", "http://new.example", "jammy", "main", false)
                .await,
            service.remove_repo(caller, "vendor").await,
            service
                .modify_repo(caller, "vendor", "deb http://other.example jammy main")
                .await,
            service
                .set_modified_repo(caller, "Vendor", false, true, "http://x", "a", "b", "vendor")
                .await,
            service.add_component(caller, "system", "universe").await,
            service.remove_component(caller, "system", "main").await,
            service.add_suite(caller, "system", "focal-updates").await,
            service.remove_suite(caller, "system", "focal").await,
            service.set_component_enabled(caller, "universe", true).await,
            service.set_child_enabled(caller, "-security", true).await,
            service.set_source_code_enabled(caller, true).await,
            service.set_source(caller, "vendor", true).await,
        ];

        for result in results {
            assert!(matches!(result, Err(ServiceError::Denied(_))));
        }
        assert_eq!(fixture.read("system")?, before);
        assert_eq!(fixture.read("vendor")?, VENDOR);
        assert_eq!(fixture.service.store().list()?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn local_calls_never_consult_policy() -> anyhow::Result<()> {
        let fixture = Fixture::new(MockPolicy::denying())?;
        let service = &fixture.service;

        service.add_repo(None, "deb http://new.example jammy main").await?;
        service
            .add_full_repo(None, "Full Repo", "http://full.example", "jammy", "main", true)
            .await?;
        service
            .modify_repo(None, "new-example", "deb http://newer.example jammy main")
            .await?;
        service
            .set_modified_repo(None, "Vendor", false, false, "https://apt.vendor.example", "stable", "main", "vendor")
            .await?;
        service.set_component_enabled(None, "universe", true).await?;
        service.set_child_enabled(None, "-security", true).await?;
        service.set_source_code_enabled(None, true).await?;
        service.set_source(None, "vendor", true).await?;
        service.add_suite(None, "system", "focal-updates").await?;
        service.remove_repo(None, "full-repo").await?;

        assert_eq!(service.authorizer().policy().checks.load(std::sync::atomic::Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test]
    async fn add_ppa_uses_codename() -> anyhow::Result<()> {
        let fixture = Fixture::new(MockPolicy::allowing())?;

        fixture.service.add_repo(None, "ppa:system76/pop").await?;

        let expect = indoc! {r#"
            X-Repolib-Name: ppa-system76-pop
            Enabled: yes
            Types: deb
            URIs: http://ppa.launchpad.net/system76/pop/ubuntu
            Suites: focal
            Components: main
        "#};
        assert_eq!(fixture.read("ppa-system76-pop")?, expect);

        let again = fixture.service.add_repo(None, "ppa:system76/pop").await;
        assert!(matches!(again, Err(ServiceError::AlreadyExists(_))));
        Ok(())
    }

    #[tokio::test]
    async fn add_repo_merges_companion_lines() -> anyhow::Result<()> {
        let fixture = Fixture::new(MockPolicy::allowing())?;
        let service = &fixture.service;

        service
            .add_repo(None, "deb http://archive.canonical.com/ubuntu focal partner")
            .await?;
        service
            .add_repo(None, "deb-src http://archive.canonical.com/ubuntu focal partner")
            .await?;

        let expect = indoc! {r#"
            X-Repolib-Name: archive-canonical-com-ubuntu
            Enabled: yes
            Types: deb deb-src
            URIs: http://archive.canonical.com/ubuntu
            Suites: focal
            Components: partner
        "#};
        assert_eq!(fixture.read("archive-canonical-com-ubuntu")?, expect);

        let again = service
            .add_repo(None, "deb-src  http://archive.canonical.com/ubuntu focal partner")
            .await;
        assert!(matches!(again, Err(ServiceError::AlreadyExists(_))));
        assert_eq!(fixture.read("archive-canonical-com-ubuntu")?, expect);
        Ok(())
    }

    #[tokio::test]
    async fn add_repo_merges_suites_of_same_archive() -> anyhow::Result<()> {
        let fixture = Fixture::new(MockPolicy::allowing())?;
        let service = &fixture.service;

        service
            .add_repo(None, "deb http://archive.canonical.com/ubuntu focal partner")
            .await?;
        service
            .add_repo(None, "deb http://archive.canonical.com/ubuntu jammy partner")
            .await?;

        let source = service.store().open_source("archive-canonical-com-ubuntu")?;
        assert_eq!(source.suites().collect::<Vec<_>>(), vec!["focal", "jammy"]);
        assert_eq!(service.store().list()?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn add_repo_takes_numbered_id_when_unmergeable() -> anyhow::Result<()> {
        let fixture = Fixture::new(MockPolicy::allowing())?;
        let service = &fixture.service;

        service
            .add_repo(None, "deb http://archive.canonical.com/ubuntu focal partner")
            .await?;
        service
            .add_repo(None, "deb http://archive.canonical.com/ubuntu focal restricted")
            .await?;

        let expect = indoc! {r#"
            X-Repolib-Name: archive-canonical-com-ubuntu-2
            Enabled: yes
            Types: deb
            URIs: http://archive.canonical.com/ubuntu
            Suites: focal
            Components: restricted
        "#};
        assert_eq!(fixture.read("archive-canonical-com-ubuntu-2")?, expect);
        assert!(fixture
            .read("archive-canonical-com-ubuntu")?
            .contains("Components: partner\n"));
        Ok(())
    }

    #[tokio::test]
    async fn unusable_definitions_are_not_written() -> anyhow::Result<()> {
        let fixture = Fixture::new(MockPolicy::allowing())?;
        let service = &fixture.service;
        service
            .add_repo(None, "deb-src https://src.example stable main")
            .await?;
        let before = fixture.read("src-example")?;

        let result = service.set_source(None, "src-example", false).await;
        assert!(matches!(result, Err(ServiceError::Malformed(_))));
        assert_eq!(fixture.read("src-example")?, before);

        let result = service.remove_suite(None, "vendor", "stable").await;
        assert!(matches!(result, Err(ServiceError::Malformed(_))));
        assert_eq!(fixture.read("vendor")?, VENDOR);
        Ok(())
    }

    #[tokio::test]
    async fn remove_by_one_line_identity() -> anyhow::Result<()> {
        let fixture = Fixture::new(MockPolicy::allowing())?;

        fixture
            .service
            .remove_repo(None, "deb https://apt.vendor.example stable main")
            .await?;

        assert!(fixture.service.store().list()?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn modify_keeps_file_and_name() -> anyhow::Result<()> {
        let fixture = Fixture::new(MockPolicy::allowing())?;

        fixture
            .service
            .modify_repo(
                None,
                "deb https://apt.vendor.example stable main",
                "deb-src https://mirror.vendor.example testing contrib",
            )
            .await?;

        let expect = indoc! {r#"
            X-Repolib-Name: Vendor
            Enabled: yes
            Types: deb-src
            URIs: https://mirror.vendor.example
            Suites: testing
            Components: contrib
        "#};
        assert_eq!(fixture.read("vendor")?, expect);
        Ok(())
    }

    #[tokio::test]
    async fn set_child_enabled_expands_pockets() -> anyhow::Result<()> {
        let fixture = Fixture::new(MockPolicy::allowing())?;

        fixture.service.set_child_enabled(None, "-security", true).await?;
        fixture.service.set_child_enabled(None, "focal-proposed", false).await?;

        assert_eq!(
            fixture.system()?.suites().collect::<Vec<_>>(),
            vec!["focal", "focal-security"]
        );
        Ok(())
    }

    #[tokio::test]
    async fn set_source_code_toggles_types() -> anyhow::Result<()> {
        let fixture = Fixture::new(MockPolicy::allowing())?;

        fixture.service.set_source_code_enabled(None, true).await?;
        assert!(fixture.read("system")?.contains("Types: deb deb-src\n"));

        fixture.service.set_source_code_enabled(None, false).await?;
        assert!(fixture.read("system")?.contains("Types: deb\n"));
        Ok(())
    }

    #[tokio::test]
    async fn errors_are_tagged() -> anyhow::Result<()> {
        let fixture = Fixture::new(MockPolicy::allowing())?;
        let service = &fixture.service;

        assert!(matches!(
            service.add_component(None, "missing", "main").await,
            Err(ServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.add_component(None, "../etc/passwd", "main").await,
            Err(ServiceError::Malformed(_))
        ));
        assert!(matches!(
            service.add_suite(None, "system", "two words").await,
            Err(ServiceError::Malformed(_))
        ));
        assert!(matches!(
            service.add_repo(None, "not a source line").await,
            Err(ServiceError::Malformed(_))
        ));
        assert!(matches!(
            service.remove_repo(None, "system").await,
            Err(ServiceError::Malformed(_))
        ));
        assert!(matches!(
            service.add_full_repo(None, "Empty", "", "jammy", "", false).await,
            Err(ServiceError::Malformed(_))
        ));
        assert!(matches!(service.raise_exception(), Err(ServiceError::Raised)));
        Ok(())
    }

    #[tokio::test]
    async fn exit_fires_shutdown_signal() {
        let fixture = Fixture::new(MockPolicy::allowing()).unwrap();
        let signal = fixture.service.shutdown_signal();

        fixture.service.exit();

        tokio::time::timeout(std::time::Duration::from_secs(1), signal.notified())
            .await
            .expect("shutdown signal not fired");
    }
}
