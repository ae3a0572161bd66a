// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Unprivileged source management.
//!
//! Source files are world readable, so the client reads them straight from
//! disk. Every mutation is forwarded to the privileged helper instead.

use crate::{
    config::Settings,
    dbus::{self, RepomanError, RepomanProxy},
    distro::OsRelease,
    source::SourceDefinition,
    store::{SourceStore, StoreError},
};

use std::{future::Future, sync::Arc};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, instrument, warn};

/// Mutating calls of the privileged helper.
///
/// Every call answers with status `0` on success, or the helper's bus error.
/// [`RepomanProxy`] forwards each call over the bus.
pub trait RemoteSources: Send + Sync + 'static {
    /// Add source from one-line specification or PPA shortcut.
    fn add_repo(&self, line: &str) -> impl Future<Output = Result<i32, RepomanError>> + Send;

    /// Add source from structured fields.
    ///
    /// URIs, suites, and components are whitespace separated lists.
    fn add_full_repo(
        &self,
        name: &str,
        uris: &str,
        suites: &str,
        components: &str,
        source_code: bool,
    ) -> impl Future<Output = Result<i32, RepomanError>> + Send;

    /// Remove source by file id or one-line identity.
    fn del_repo(&self, identifier: &str) -> impl Future<Output = Result<i32, RepomanError>> + Send;

    /// Replace source located by old identity with one-line specification.
    fn modify_repo(
        &self,
        old_identifier: &str,
        new_line: &str,
    ) -> impl Future<Output = Result<i32, RepomanError>> + Send;

    /// Overwrite fields of the source stored under file id `filename`.
    #[allow(clippy::too_many_arguments)]
    fn set_modified_repo(
        &self,
        name: &str,
        enabled: bool,
        source_code: bool,
        uris: &str,
        suites: &str,
        components: &str,
        filename: &str,
    ) -> impl Future<Output = Result<i32, RepomanError>> + Send;

    /// Add component to source.
    fn add_comp(&self, repo: &str, comp: &str) -> impl Future<Output = Result<i32, RepomanError>> + Send;

    /// Remove component from source.
    fn del_comp(&self, repo: &str, comp: &str) -> impl Future<Output = Result<i32, RepomanError>> + Send;

    /// Add suite to source.
    fn add_suite(&self, repo: &str, suite: &str) -> impl Future<Output = Result<i32, RepomanError>> + Send;

    /// Remove suite from source.
    fn del_suite(&self, repo: &str, suite: &str) -> impl Future<Output = Result<i32, RepomanError>> + Send;

    /// Toggle source code packages of source.
    fn set_source(&self, repo: &str, enabled: bool) -> impl Future<Output = Result<i32, RepomanError>> + Send;
}

impl RemoteSources for RepomanProxy<'static> {
    async fn add_repo(&self, line: &str) -> Result<i32, RepomanError> {
        RepomanProxy::add_repo(self, line).await
    }

    async fn add_full_repo(
        &self,
        name: &str,
        uris: &str,
        suites: &str,
        components: &str,
        source_code: bool,
    ) -> Result<i32, RepomanError> {
        RepomanProxy::add_full_repo(self, name, uris, suites, components, source_code).await
    }

    async fn del_repo(&self, identifier: &str) -> Result<i32, RepomanError> {
        RepomanProxy::del_repo(self, identifier).await
    }

    async fn modify_repo(&self, old_identifier: &str, new_line: &str) -> Result<i32, RepomanError> {
        RepomanProxy::modify_repo(self, old_identifier, new_line).await
    }

    async fn set_modified_repo(
        &self,
        name: &str,
        enabled: bool,
        source_code: bool,
        uris: &str,
        suites: &str,
        components: &str,
        filename: &str,
    ) -> Result<i32, RepomanError> {
        RepomanProxy::set_modified_repo(
            self,
            name,
            enabled,
            source_code,
            uris,
            suites,
            components,
            filename,
        )
        .await
    }

    async fn add_comp(&self, repo: &str, comp: &str) -> Result<i32, RepomanError> {
        RepomanProxy::add_comp(self, repo, comp).await
    }

    async fn del_comp(&self, repo: &str, comp: &str) -> Result<i32, RepomanError> {
        RepomanProxy::del_comp(self, repo, comp).await
    }

    async fn add_suite(&self, repo: &str, suite: &str) -> Result<i32, RepomanError> {
        RepomanProxy::add_suite(self, repo, suite).await
    }

    async fn del_suite(&self, repo: &str, suite: &str) -> Result<i32, RepomanError> {
        RepomanProxy::del_suite(self, repo, suite).await
    }

    async fn set_source(&self, repo: &str, enabled: bool) -> Result<i32, RepomanError> {
        RepomanProxy::set_source(self, repo, enabled).await
    }
}

/// Fields of a source added through [`SourceManager::add_full_source`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FullSourceRequest {
    /// Human readable name. The file id is derived from it.
    pub name: String,

    /// Archive URIs, at least one.
    pub uris: Vec<String>,

    /// Suites, at least one.
    pub suites: Vec<String>,

    /// Components, may be empty for flat archives.
    pub components: Vec<String>,

    /// Fetch source code packages too.
    pub source_code: bool,
}

/// Progress of a background add.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddEvent {
    /// Source was added. Carries the refreshed source list.
    Completed { sources: Vec<SourceDefinition> },

    /// Helper refused or failed the request.
    Failed { reason: String },

    /// Task was cancelled before the helper answered.
    Cancelled,
}

/// Handle to a background add.
#[derive(Debug)]
pub struct AddTask {
    events: mpsc::UnboundedReceiver<AddEvent>,
    cancel: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl AddTask {
    /// Stop the task if it has not completed yet.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            // INVARIANT: A finished task has dropped its receiver, nothing to stop.
            let _ = cancel.send(());
        }
    }

    /// Wait for next event.
    ///
    /// Returns `None` once the task has finished and every event was read.
    pub async fn next_event(&mut self) -> Option<AddEvent> {
        self.events.recv().await
    }

    /// Check if the task has finished.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Client view of the system's software sources.
#[derive(Debug)]
pub struct SourceManager<R>
where
    R: RemoteSources,
{
    store: SourceStore,
    remote: Arc<R>,
    codename: Option<String>,
}

impl SourceManager<RepomanProxy<'static>> {
    /// Connect to the privileged helper on the configured bus.
    ///
    /// # Errors
    ///
    /// - Return [`ClientError::Store`] if the source directory is missing.
    /// - Return [`ClientError::Remote`] if the bus cannot be reached.
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let store = SourceStore::open(&settings.sources.dir, &settings.sources.system)?;
        let connection = dbus::connect(settings.service.bus)
            .await
            .map_err(RepomanError::from)?;
        let proxy = RepomanProxy::new(&connection)
            .await
            .map_err(RepomanError::from)?;
        let codename = OsRelease::load().and_then(|release| release.codename().map(str::to_owned));
        let codename = match codename {
            Ok(codename) => Some(codename),
            Err(error) => {
                warn!("{error}");
                None
            }
        };
        debug!("connected to helper on {:?} bus", settings.service.bus);

        Ok(Self::new(store, proxy, codename))
    }
}

impl<R> SourceManager<R>
where
    R: RemoteSources,
{
    /// Construct new source manager.
    pub fn new(store: SourceStore, remote: R, codename: Option<String>) -> Self {
        Self {
            store,
            remote: Arc::new(remote),
            codename,
        }
    }

    /// Every source except the system source.
    ///
    /// # Errors
    ///
    /// - Return [`ClientError::Store`] if the store cannot be enumerated.
    pub fn sources(&self) -> Result<Vec<SourceDefinition>> {
        Ok(self.store.definitions()?)
    }

    /// Source by file id, including the system source.
    ///
    /// # Errors
    ///
    /// - Return [`ClientError::Store`] if the source cannot be loaded.
    pub fn source(&self, id: &str) -> Result<SourceDefinition> {
        Ok(self.store.open_source(id)?)
    }

    /// Suites of the system source.
    ///
    /// # Errors
    ///
    /// - Return [`ClientError::Store`] if the system source cannot be loaded.
    pub fn system_suites(&self) -> Result<Vec<String>> {
        let system = self.store.system_source()?;
        Ok(system.suites().map(str::to_owned).collect())
    }

    /// Components of the system source.
    ///
    /// # Errors
    ///
    /// - Return [`ClientError::Store`] if the system source cannot be loaded.
    pub fn system_components(&self) -> Result<Vec<String>> {
        let system = self.store.system_source()?;
        Ok(system.components().map(str::to_owned).collect())
    }

    /// Check if source code packages are fetched for a source.
    ///
    /// # Errors
    ///
    /// - Return [`ClientError::Store`] if the source cannot be loaded.
    pub fn source_code_enabled(&self, id: &str) -> Result<bool> {
        Ok(self.store.open_source(id)?.source_code_enabled())
    }

    /// Distribution codename, if known.
    pub fn codename(&self) -> Option<&str> {
        self.codename.as_deref()
    }

    /// Id of the system source.
    pub fn system_id(&self) -> &str {
        self.store.system_id()
    }

    /// Add component to source.
    ///
    /// # Errors
    ///
    /// - Return [`ClientError::Remote`] if the helper rejects the request.
    #[instrument(skip(self), level = "debug")]
    pub async fn add_component(&self, repo: &str, component: &str) -> Result<()> {
        self.remote.add_comp(repo, component).await?;
        Ok(())
    }

    /// Remove component from source.
    ///
    /// # Errors
    ///
    /// - Return [`ClientError::Remote`] if the helper rejects the request.
    #[instrument(skip(self), level = "debug")]
    pub async fn remove_component(&self, repo: &str, component: &str) -> Result<()> {
        self.remote.del_comp(repo, component).await?;
        Ok(())
    }

    /// Add suite to source.
    ///
    /// # Errors
    ///
    /// - Return [`ClientError::Remote`] if the helper rejects the request.
    #[instrument(skip(self), level = "debug")]
    pub async fn add_suite(&self, repo: &str, suite: &str) -> Result<()> {
        self.remote.add_suite(repo, suite).await?;
        Ok(())
    }

    /// Remove suite from source.
    ///
    /// # Errors
    ///
    /// - Return [`ClientError::Remote`] if the helper rejects the request,
    ///   e.g., when removing the last suite.
    #[instrument(skip(self), level = "debug")]
    pub async fn remove_suite(&self, repo: &str, suite: &str) -> Result<()> {
        self.remote.del_suite(repo, suite).await?;
        Ok(())
    }

    /// Add source from structured fields.
    ///
    /// # Errors
    ///
    /// - Return [`ClientError::Remote`] if the helper rejects the request.
    #[instrument(skip(self), level = "debug")]
    pub async fn add_full_source(&self, request: &FullSourceRequest) -> Result<()> {
        self.remote
            .add_full_repo(
                &request.name,
                &request.uris.join(" "),
                &request.suites.join(" "),
                &request.components.join(" "),
                request.source_code,
            )
            .await?;
        info!("added source {:?}", request.name);

        Ok(())
    }

    /// Remove source by file id or one-line identity.
    ///
    /// # Errors
    ///
    /// - Return [`ClientError::Remote`] if the helper rejects the request.
    #[instrument(skip(self), level = "debug")]
    pub async fn remove_source(&self, identifier: &str) -> Result<()> {
        self.remote.del_repo(identifier).await?;
        info!("removed source {identifier:?}");

        Ok(())
    }

    /// Replace source identified by old line with a new one-line
    /// specification.
    ///
    /// # Errors
    ///
    /// - Return [`ClientError::Remote`] if the helper rejects the request.
    #[instrument(skip(self), level = "debug")]
    pub async fn modify_source(&self, old_identifier: &str, new_line: &str) -> Result<()> {
        self.remote.modify_repo(old_identifier, new_line).await?;
        Ok(())
    }

    /// Toggle source code packages of source.
    ///
    /// # Errors
    ///
    /// - Return [`ClientError::Remote`] if the helper rejects the request.
    #[instrument(skip(self), level = "debug")]
    pub async fn set_source_code_enabled(&self, repo: &str, enabled: bool) -> Result<()> {
        self.remote.set_source(repo, enabled).await?;
        Ok(())
    }

    /// Write every field of a locally edited definition back through the
    /// helper.
    ///
    /// # Errors
    ///
    /// - Return [`ClientError::Remote`] if the helper rejects the request.
    #[instrument(skip(self, source), fields(id = %source.id), level = "debug")]
    pub async fn set_modified_source(&self, source: &SourceDefinition) -> Result<()> {
        self.remote
            .set_modified_repo(
                &source.name,
                source.enabled,
                source.source_code_enabled(),
                &source.uris().join(" "),
                &source.suites().collect::<Vec<_>>().join(" "),
                &source.components().collect::<Vec<_>>().join(" "),
                &source.id,
            )
            .await?;

        Ok(())
    }

    /// Add source from one-line specification in the background.
    ///
    /// Concurrent adds are not serialized against each other.
    pub fn spawn_add(&self, line: impl Into<String>) -> AddTask {
        let line = line.into();
        let remote = Arc::clone(&self.remote);
        let store = self.store.clone();
        let (sender, events) = mpsc::unbounded_channel();
        let (cancel, cancelled) = oneshot::channel();

        let handle = tokio::spawn(async move {
            let event = tokio::select! {
                Ok(()) = cancelled => AddEvent::Cancelled,
                result = remote.add_repo(&line) => match result {
                    Ok(_) => match store.definitions() {
                        Ok(sources) => AddEvent::Completed { sources },
                        Err(error) => AddEvent::Failed { reason: error.to_string() },
                    },
                    Err(error) => AddEvent::Failed { reason: error.to_string() },
                },
            };
            debug!("add of {line:?} finished: {event:?}");

            // INVARIANT: Receiver may be gone if caller dropped the task.
            let _ = sender.send(event);
        });

        AddTask {
            events,
            cancel: Some(cancel),
            handle,
        }
    }
}

/// Client error types.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Helper rejected or failed the request.
    #[error(transparent)]
    Remote(#[from] RepomanError),

    /// Local source files could not be read.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Friendly result alias :3
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audit::DenialLog,
        auth::{tests::MockPolicy, Authorizer},
        service::RepomanService,
    };
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::{fs::write, sync::Mutex, time::Duration};
    use tempfile::TempDir;

    const SYSTEM: &str = indoc! {r#"
        X-Repolib-Name: System Sources
        Enabled: yes
        Types: deb
        URIs: http://archive.ubuntu.com/ubuntu
        Suites: focal focal-proposed
        Components: main
    "#};

    /// Remote answering through an in-process service.
    #[derive(Debug)]
    struct LocalRemote {
        service: RepomanService<MockPolicy>,
        hang: bool,
        calls: Mutex<Vec<String>>,
    }

    impl LocalRemote {
        fn record(&self, call: impl Into<String>) {
            self.calls.lock().unwrap().push(call.into());
        }
    }

    impl RemoteSources for LocalRemote {
        async fn add_repo(&self, line: &str) -> Result<i32, RepomanError> {
            self.record(format!("AddRepo {line}"));
            if self.hang {
                std::future::pending::<()>().await;
            }
            Ok(self.service.add_repo(None, line).await?)
        }

        async fn add_full_repo(
            &self,
            name: &str,
            uris: &str,
            suites: &str,
            components: &str,
            source_code: bool,
        ) -> Result<i32, RepomanError> {
            self.record(format!("AddFullRepo {name}|{uris}|{suites}|{components}|{source_code}"));
            Ok(self
                .service
                .add_full_repo(None, name, uris, suites, components, source_code)
                .await?)
        }

        async fn del_repo(&self, identifier: &str) -> Result<i32, RepomanError> {
            self.record(format!("DelRepo {identifier}"));
            Ok(self.service.remove_repo(None, identifier).await?)
        }

        async fn modify_repo(&self, old_identifier: &str, new_line: &str) -> Result<i32, RepomanError> {
            self.record(format!("ModifyRepo {old_identifier}|{new_line}"));
            Ok(self.service.modify_repo(None, old_identifier, new_line).await?)
        }

        async fn set_modified_repo(
            &self,
            name: &str,
            enabled: bool,
            source_code: bool,
            uris: &str,
            suites: &str,
            components: &str,
            filename: &str,
        ) -> Result<i32, RepomanError> {
            self.record(format!(
                "SetModifiedRepo {name}|{enabled}|{source_code}|{uris}|{suites}|{components}|{filename}"
            ));
            Ok(self
                .service
                .set_modified_repo(None, name, enabled, source_code, uris, suites, components, filename)
                .await?)
        }

        async fn add_comp(&self, repo: &str, comp: &str) -> Result<i32, RepomanError> {
            self.record(format!("AddComp {repo}|{comp}"));
            Ok(self.service.add_component(None, repo, comp).await?)
        }

        async fn del_comp(&self, repo: &str, comp: &str) -> Result<i32, RepomanError> {
            self.record(format!("DelComp {repo}|{comp}"));
            Ok(self.service.remove_component(None, repo, comp).await?)
        }

        async fn add_suite(&self, repo: &str, suite: &str) -> Result<i32, RepomanError> {
            self.record(format!("AddSuite {repo}|{suite}"));
            Ok(self.service.add_suite(None, repo, suite).await?)
        }

        async fn del_suite(&self, repo: &str, suite: &str) -> Result<i32, RepomanError> {
            self.record(format!("DelSuite {repo}|{suite}"));
            Ok(self.service.remove_suite(None, repo, suite).await?)
        }

        async fn set_source(&self, repo: &str, enabled: bool) -> Result<i32, RepomanError> {
            self.record(format!("SetSource {repo}|{enabled}"));
            Ok(self.service.set_source(None, repo, enabled).await?)
        }
    }

    fn manager(hang: bool) -> anyhow::Result<(TempDir, SourceManager<LocalRemote>)> {
        let dir = tempfile::tempdir()?;
        let sources = dir.path().join("sources.list.d");
        std::fs::create_dir(&sources)?;
        write(sources.join("system.sources"), SYSTEM)?;

        let store = SourceStore::open(&sources, "system")?;
        let authorizer = Authorizer::new(
            MockPolicy::denying(),
            true,
            DenialLog::new(dir.path().join("repoman.log")),
        );
        let service = RepomanService::new(store.clone(), authorizer, Some("focal".into()), Vec::new());
        let remote = LocalRemote {
            service,
            hang,
            calls: Mutex::new(Vec::new()),
        };

        Ok((dir, SourceManager::new(store, remote, Some("focal".into()))))
    }

    #[tokio::test]
    async fn reads_system_source_from_disk() -> anyhow::Result<()> {
        let (_dir, manager) = manager(false)?;

        assert_eq!(manager.system_suites()?, vec!["focal", "focal-proposed"]);
        assert_eq!(manager.system_components()?, vec!["main"]);
        assert!(!manager.source_code_enabled("system")?);
        assert_eq!(manager.codename(), Some("focal"));
        assert!(manager.sources()?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn mutations_go_through_remote() -> anyhow::Result<()> {
        let (_dir, manager) = manager(false)?;

        manager.add_component("system", "universe").await?;
        manager.remove_suite("system", "focal-proposed").await?;
        manager.set_source_code_enabled("system", true).await?;

        assert_eq!(manager.system_components()?, vec!["main", "universe"]);
        assert_eq!(manager.system_suites()?, vec!["focal"]);
        assert!(manager.source_code_enabled("system")?);
        assert_eq!(
            *manager.remote.calls.lock().unwrap(),
            vec![
                "AddComp system|universe",
                "DelSuite system|focal-proposed",
                "SetSource system|true",
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn full_source_fields_are_joined() -> anyhow::Result<()> {
        let (_dir, manager) = manager(false)?;
        let request = FullSourceRequest {
            name: "Vendor Tools".into(),
            uris: vec!["https://a.example".into(), "https://b.example".into()],
            suites: vec!["stable".into()],
            components: vec!["main".into(), "extra".into()],
            source_code: true,
        };

        manager.add_full_source(&request).await?;

        let source = manager.source("vendor-tools")?;
        assert_eq!(source.name, "Vendor Tools");
        assert_eq!(source.uris(), ["https://a.example", "https://b.example"]);
        assert_eq!(source.components().collect::<Vec<_>>(), vec!["extra", "main"]);
        assert!(source.source_code_enabled());

        let mut edited = source.clone();
        edited.set_enabled(false);
        edited.remove_component("extra");
        manager.set_modified_source(&edited).await?;
        assert_eq!(manager.source("vendor-tools")?, edited);

        manager.remove_source("vendor-tools").await?;
        assert!(manager.sources()?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn spawn_add_reports_refreshed_sources() -> anyhow::Result<()> {
        let (_dir, manager) = manager(false)?;

        let mut task = manager.spawn_add("ppa:system76/pop");
        let event = task.next_event().await;

        match event {
            Some(AddEvent::Completed { sources }) => {
                let ids = sources.iter().map(|s| s.id.as_str()).collect::<Vec<_>>();
                assert_eq!(ids, vec!["ppa-system76-pop"]);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(task.next_event().await, None);
        Ok(())
    }

    #[tokio::test]
    async fn spawn_add_reports_failure() -> anyhow::Result<()> {
        let (_dir, manager) = manager(false)?;

        let mut task = manager.spawn_add("not a source line");

        assert!(matches!(
            task.next_event().await,
            Some(AddEvent::Failed { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn cancelled_add_never_completes() -> anyhow::Result<()> {
        let (_dir, manager) = manager(true)?;

        let mut task = manager.spawn_add("deb http://hang.example jammy main");
        tokio::time::sleep(Duration::from_millis(10)).await;
        task.cancel();

        let event = tokio::time::timeout(Duration::from_secs(1), task.next_event()).await?;
        assert_eq!(event, Some(AddEvent::Cancelled));
        assert!(manager.sources()?.is_empty());
        Ok(())
    }
}
