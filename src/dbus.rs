// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Bus surface of the privileged helper.
//!
//! [`RepomanInterface`] exports a [`RepomanService`] on the bus, and
//! [`RepomanProxy`] lets unprivileged clients call it. Every remote call
//! carries its sender, which becomes the [`Caller`] checked against policy.
//!
//! The `*PPA` methods are kept for older clients. They share the same
//! operations as their `*Repo` counterparts.

use crate::{
    auth::{Caller, PolicyClient},
    config::BusKind,
    service::{RepomanService, ServiceError},
};

use tracing::debug;
use zbus::{message::Header, Connection};

/// Well-known bus name of the helper.
pub const BUS_NAME: &str = "ro.santopiet.repoman";

/// Object path the helper serves.
pub const OBJECT_PATH: &str = "/PPAObject";

/// Interface name of the helper.
pub const INTERFACE: &str = "ro.santopiet.repoman.Interface";

/// Open connection to configured bus.
///
/// # Errors
///
/// - Return [`zbus::Error`] if the bus daemon cannot be reached.
pub async fn connect(bus: BusKind) -> zbus::Result<Connection> {
    match bus {
        BusKind::System => Connection::system().await,
        BusKind::Session => Connection::session().await,
    }
}

/// Bus errors returned by the helper.
#[derive(Debug, zbus::DBusError)]
#[zbus(prefix = "ro.santopiet.repoman")]
pub enum RepomanError {
    /// Transport level failure.
    #[zbus(error)]
    ZBus(zbus::Error),

    /// Caller does not hold the required privilege.
    PermissionDeniedByPolicy(String),

    /// Target source does not exist.
    NotFound(String),

    /// Request parameters are invalid.
    Malformed(String),

    /// Source already exists.
    AlreadyExists(String),

    /// Operation failed inside the helper.
    RepomanException(String),

    /// Policy authority could not be reached.
    AuthorityUnavailable(String),
}

impl From<ServiceError> for RepomanError {
    fn from(error: ServiceError) -> Self {
        let message = error_chain(&error);
        match error {
            ServiceError::Denied(_) => Self::PermissionDeniedByPolicy(message),
            ServiceError::Authority(_) => Self::AuthorityUnavailable(message),
            ServiceError::NotFound(_) => Self::NotFound(message),
            ServiceError::Malformed(_) => Self::Malformed(message),
            ServiceError::AlreadyExists(_) => Self::AlreadyExists(message),
            ServiceError::Persistence(_) | ServiceError::Raised => Self::RepomanException(message),
        }
    }
}

fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }

    message
}

/// Bus object wrapping the mutation service.
#[derive(Debug)]
pub struct RepomanInterface<P>
where
    P: PolicyClient,
{
    service: RepomanService<P>,
}

impl<P> RepomanInterface<P>
where
    P: PolicyClient,
{
    /// Wrap service for export.
    pub fn new(service: RepomanService<P>) -> Self {
        Self { service }
    }
}

#[zbus::interface(name = "ro.santopiet.repoman.Interface")]
impl<P> RepomanInterface<P>
where
    P: PolicyClient,
{
    async fn add_repo(&self, #[zbus(header)] header: Header<'_>, line: &str) -> Result<i32> {
        let caller = caller(&header)?;
        Ok(self.service.add_repo(Some(&caller), line).await?)
    }

    #[zbus(name = "AddPPA")]
    async fn add_ppa(&self, #[zbus(header)] header: Header<'_>, line: &str) -> Result<i32> {
        let caller = caller(&header)?;
        Ok(self.service.add_repo(Some(&caller), line).await?)
    }

    async fn add_full_repo(
        &self,
        #[zbus(header)] header: Header<'_>,
        name: &str,
        uris: &str,
        suites: &str,
        components: &str,
        source_code: bool,
    ) -> Result<i32> {
        let caller = caller(&header)?;
        Ok(self
            .service
            .add_full_repo(Some(&caller), name, uris, suites, components, source_code)
            .await?)
    }

    async fn del_repo(&self, #[zbus(header)] header: Header<'_>, identifier: &str) -> Result<i32> {
        let caller = caller(&header)?;
        Ok(self.service.remove_repo(Some(&caller), identifier).await?)
    }

    #[zbus(name = "DelPPA")]
    async fn del_ppa(&self, #[zbus(header)] header: Header<'_>, identifier: &str) -> Result<i32> {
        let caller = caller(&header)?;
        Ok(self.service.remove_repo(Some(&caller), identifier).await?)
    }

    async fn modify_repo(
        &self,
        #[zbus(header)] header: Header<'_>,
        old_identifier: &str,
        new_line: &str,
    ) -> Result<i32> {
        let caller = caller(&header)?;
        Ok(self
            .service
            .modify_repo(Some(&caller), old_identifier, new_line)
            .await?)
    }

    #[zbus(name = "ModifyPPA")]
    async fn modify_ppa(
        &self,
        #[zbus(header)] header: Header<'_>,
        old_identifier: &str,
        new_line: &str,
    ) -> Result<i32> {
        let caller = caller(&header)?;
        Ok(self
            .service
            .modify_repo(Some(&caller), old_identifier, new_line)
            .await?)
    }

    async fn set_modified_repo(
        &self,
        #[zbus(header)] header: Header<'_>,
        name: &str,
        enabled: bool,
        source_code: bool,
        uris: &str,
        suites: &str,
        components: &str,
        filename: &str,
    ) -> Result<i32> {
        let caller = caller(&header)?;
        Ok(self
            .service
            .set_modified_repo(
                Some(&caller),
                name,
                enabled,
                source_code,
                uris,
                suites,
                components,
                filename,
            )
            .await?)
    }

    async fn add_comp(&self, #[zbus(header)] header: Header<'_>, repo: &str, comp: &str) -> Result<i32> {
        let caller = caller(&header)?;
        Ok(self.service.add_component(Some(&caller), repo, comp).await?)
    }

    async fn del_comp(&self, #[zbus(header)] header: Header<'_>, repo: &str, comp: &str) -> Result<i32> {
        let caller = caller(&header)?;
        Ok(self
            .service
            .remove_component(Some(&caller), repo, comp)
            .await?)
    }

    async fn add_suite(&self, #[zbus(header)] header: Header<'_>, repo: &str, suite: &str) -> Result<i32> {
        let caller = caller(&header)?;
        Ok(self.service.add_suite(Some(&caller), repo, suite).await?)
    }

    async fn del_suite(&self, #[zbus(header)] header: Header<'_>, repo: &str, suite: &str) -> Result<i32> {
        let caller = caller(&header)?;
        Ok(self.service.remove_suite(Some(&caller), repo, suite).await?)
    }

    async fn set_comp_enabled(
        &self,
        #[zbus(header)] header: Header<'_>,
        comp: &str,
        enabled: bool,
    ) -> Result<i32> {
        let caller = caller(&header)?;
        Ok(self
            .service
            .set_component_enabled(Some(&caller), comp, enabled)
            .await?)
    }

    async fn set_child_enabled(
        &self,
        #[zbus(header)] header: Header<'_>,
        child: &str,
        enabled: bool,
    ) -> Result<i32> {
        let caller = caller(&header)?;
        Ok(self
            .service
            .set_child_enabled(Some(&caller), child, enabled)
            .await?)
    }

    async fn set_source_code_enabled(
        &self,
        #[zbus(header)] header: Header<'_>,
        enabled: bool,
    ) -> Result<i32> {
        let caller = caller(&header)?;
        Ok(self
            .service
            .set_source_code_enabled(Some(&caller), enabled)
            .await?)
    }

    async fn set_source(
        &self,
        #[zbus(header)] header: Header<'_>,
        repo: &str,
        enabled: bool,
    ) -> Result<i32> {
        let caller = caller(&header)?;
        Ok(self.service.set_source(Some(&caller), repo, enabled).await?)
    }

    async fn raise_exception(&self) -> Result<()> {
        Ok(self.service.raise_exception()?)
    }

    async fn exit(&self) {
        self.service.exit();
    }
}

/// Remote caller of a method call.
///
/// Peer-to-peer connections carry no sender. Such calls still go through
/// the policy client, which cannot resolve an empty name on a real bus.
fn caller(header: &Header<'_>) -> Result<Caller> {
    let Some(sender) = header.sender() else {
        debug!("request from unnamed peer");
        return Ok(Caller::new(String::new()));
    };
    debug!("request from {sender}");

    Ok(Caller::new(sender.to_string()))
}

/// Client side of the helper interface.
#[zbus::proxy(
    interface = "ro.santopiet.repoman.Interface",
    default_service = "ro.santopiet.repoman",
    default_path = "/PPAObject",
    gen_blocking = false
)]
pub trait Repoman {
    fn add_repo(&self, line: &str) -> Result<i32>;

    #[zbus(name = "AddPPA")]
    fn add_ppa(&self, line: &str) -> Result<i32>;

    fn add_full_repo(
        &self,
        name: &str,
        uris: &str,
        suites: &str,
        components: &str,
        source_code: bool,
    ) -> Result<i32>;

    fn del_repo(&self, identifier: &str) -> Result<i32>;

    #[zbus(name = "DelPPA")]
    fn del_ppa(&self, identifier: &str) -> Result<i32>;

    fn modify_repo(&self, old_identifier: &str, new_line: &str) -> Result<i32>;

    #[zbus(name = "ModifyPPA")]
    fn modify_ppa(&self, old_identifier: &str, new_line: &str) -> Result<i32>;

    fn set_modified_repo(
        &self,
        name: &str,
        enabled: bool,
        source_code: bool,
        uris: &str,
        suites: &str,
        components: &str,
        filename: &str,
    ) -> Result<i32>;

    fn add_comp(&self, repo: &str, comp: &str) -> Result<i32>;

    fn del_comp(&self, repo: &str, comp: &str) -> Result<i32>;

    fn add_suite(&self, repo: &str, suite: &str) -> Result<i32>;

    fn del_suite(&self, repo: &str, suite: &str) -> Result<i32>;

    fn set_comp_enabled(&self, comp: &str, enabled: bool) -> Result<i32>;

    fn set_child_enabled(&self, child: &str, enabled: bool) -> Result<i32>;

    fn set_source_code_enabled(&self, enabled: bool) -> Result<i32>;

    fn set_source(&self, repo: &str, enabled: bool) -> Result<i32>;

    fn raise_exception(&self) -> Result<()>;

    fn exit(&self) -> Result<()>;
}

/// Friendly result alias :3
pub type Result<T, E = RepomanError> = std::result::Result<T, E>;
