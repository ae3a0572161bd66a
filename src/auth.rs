// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Caller authorization.
//!
//! Every mutating request that reaches the privileged helper over the bus is
//! checked against polkit before any source file is touched. The check is
//! keyed by a __privilege__, one of three polkit action ids covering adding,
//! deleting, and modifying sources.
//!
//! # Decision Procedure
//!
//! 1. Requests that did not arrive over the bus (no caller) are authorized
//!    immediately. The policy client is never consulted.
//! 2. If enforcement is switched off in settings, the request is authorized.
//! 3. The caller's process id is resolved from its unique bus name, and polkit
//!    is asked whether that process holds the privilege.
//! 4. If polkit is momentarily unavailable, e.g., it was restarted, the
//!    policy client reconnects and the query is repeated exactly once.
//! 5. A negative answer is written to the denial log and returned as
//!    [`AuthError::Denied`], which is final for the request.

pub mod polkit;

use crate::audit::DenialLog;

use std::{
    collections::HashMap,
    fmt::{Display, Formatter, Result as FmtResult},
    future::Future,
    time::Duration,
};
use tracing::{debug, instrument, warn};

/// Privileges the helper asks polkit about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Privilege {
    /// Add a new source.
    Add,

    /// Delete an existing source.
    Delete,

    /// Modify an existing source.
    Modify,
}

impl Privilege {
    /// Polkit action id of privilege.
    pub fn action_id(&self) -> &'static str {
        match self {
            Self::Add => "ro.santopiet.repoman.addppa",
            Self::Delete => "ro.santopiet.repoman.delppa",
            Self::Modify => "ro.santopiet.repoman.modppa",
        }
    }
}

impl Display for Privilege {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.action_id())
    }
}

/// Remote caller of a bus method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// Unique bus name of caller, e.g., ":1.42".
    pub sender: String,
}

impl Caller {
    /// Construct new caller from unique bus name.
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
        }
    }
}

/// Answer of the policy authority.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Decision {
    /// Whether the subject holds the privilege.
    pub authorized: bool,

    /// Extra details supplied by the authority.
    pub details: HashMap<String, String>,
}

/// Connection to a policy authority.
///
/// Constructed once at startup and handed to [`Authorizer`]. Implementations
/// keep whatever connection state they need across calls.
pub trait PolicyClient: Send + Sync + 'static {
    /// Resolve unique bus name to process id.
    fn caller_pid(&self, sender: &str) -> impl Future<Output = Result<u32, AuthorityError>> + Send;

    /// Ask whether process holds privilege.
    fn check_authorization(
        &self,
        pid: u32,
        privilege: Privilege,
    ) -> impl Future<Output = Result<Decision, AuthorityError>> + Send;

    /// Drop current connection state and connect again.
    fn reconnect(&self) -> impl Future<Output = Result<(), AuthorityError>> + Send;
}

/// Gatekeeper for privileged operations.
#[derive(Debug)]
pub struct Authorizer<P>
where
    P: PolicyClient,
{
    policy: P,
    enforce: bool,
    log: DenialLog,
}

impl<P> Authorizer<P>
where
    P: PolicyClient,
{
    /// Construct new authorizer.
    pub fn new(policy: P, enforce: bool, log: DenialLog) -> Self {
        Self {
            policy,
            enforce,
            log,
        }
    }

    /// Underlying policy client.
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Verify that caller holds privilege.
    ///
    /// # Errors
    ///
    /// - Return [`AuthError::Denied`] if the authority refuses the caller.
    /// - Return [`AuthError::Authority`] if the authority cannot be reached,
    ///   even after one reconnect for a transient outage.
    #[instrument(skip(self), level = "debug")]
    pub async fn check(&self, caller: Option<&Caller>, privilege: Privilege) -> Result<()> {
        let Some(caller) = caller else {
            debug!("local invocation, skip authorization");
            return Ok(());
        };

        if !self.enforce {
            debug!("polkit enforcement disabled, allow {}", caller.sender);
            return Ok(());
        }

        let (pid, decision) = match self.query(caller, privilege).await {
            Err(AuthorityError::Unavailable(reason)) => {
                warn!("policy authority unavailable ({reason}), reconnecting");
                self.policy.reconnect().await?;
                self.query(caller, privilege).await?
            }
            other => other?,
        };

        if decision.authorized {
            debug!("sender {} pid {pid} holds {privilege}", caller.sender);
            return Ok(());
        }

        let message = format!(
            "check_privilege: sender {} pid {pid} is not authorized for {privilege}: {:?}",
            caller.sender, decision.details
        );
        warn!("{message}");
        if let Err(error) = self.log.append(&message) {
            warn!("cannot record denial: {error}");
        }

        Err(AuthError::Denied(privilege))
    }

    async fn query(
        &self,
        caller: &Caller,
        privilege: Privilege,
    ) -> Result<(u32, Decision), AuthorityError> {
        let pid = self.policy.caller_pid(&caller.sender).await?;
        let decision = self.policy.check_authorization(pid, privilege).await?;
        Ok((pid, decision))
    }
}

/// Failures talking to the policy authority.
#[derive(Debug, thiserror::Error)]
pub enum AuthorityError {
    /// Authority service is not on the bus right now.
    #[error("policy authority unavailable: {0}")]
    Unavailable(String),

    /// Authority did not answer in time.
    #[error("policy authority did not answer within {0:?}")]
    Timeout(Duration),

    /// Sender is not a valid bus name.
    #[error("invalid sender bus name {0:?}")]
    InvalidSender(String),

    /// Any other bus failure.
    #[error(transparent)]
    Bus(#[from] zbus::Error),
}

/// Authorization error types.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Caller does not hold privilege.
    #[error("caller is not authorized for {0}")]
    Denied(Privilege),

    /// Authority could not give an answer.
    #[error(transparent)]
    Authority(#[from] AuthorityError),
}

/// Friendly result alias :3
pub type Result<T, E = AuthError> = std::result::Result<T, E>;
