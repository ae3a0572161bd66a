// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Polkit policy client over zbus.
//!
//! Process ids are resolved through the bus daemon the helper serves on.
//! Authorization is always asked of polkitd on the system bus.
//!
//! # See Also
//!
//! - [polkit D-Bus API](https://www.freedesktop.org/software/polkit/docs/latest/eggdbus-interface-org.freedesktop.PolicyKit1.Authority.html)

use crate::auth::{AuthorityError, Decision, PolicyClient, Privilege};

use serde::{Deserialize, Serialize};
use std::{collections::HashMap, time::Duration};
use tokio::sync::RwLock;
use tracing::{debug, instrument};
use zbus::{
    fdo::DBusProxy,
    names::BusName,
    zvariant::{Type, Value},
    Connection,
};

const SERVICE_UNKNOWN: &str = "org.freedesktop.DBus.Error.ServiceUnknown";

/// Let polkit interact with the user, e.g., ask for a password.
const ALLOW_USER_INTERACTION: u32 = 1;

#[zbus::proxy(
    interface = "org.freedesktop.PolicyKit1.Authority",
    default_service = "org.freedesktop.PolicyKit1",
    default_path = "/org/freedesktop/PolicyKit1/Authority",
    gen_blocking = false
)]
trait Authority {
    fn check_authorization(
        &self,
        subject: &Subject<'_>,
        action_id: &str,
        details: &HashMap<&str, &str>,
        flags: u32,
        cancellation_id: &str,
    ) -> zbus::Result<AuthorizationResult>;
}

/// Polkit subject, always a unix process here.
#[derive(Debug, Serialize, Type)]
struct Subject<'a> {
    kind: &'a str,
    details: HashMap<&'a str, Value<'a>>,
}

impl<'a> Subject<'a> {
    fn unix_process(pid: u32) -> Self {
        let mut details = HashMap::new();
        details.insert("pid", Value::from(pid));
        details.insert("start-time", Value::from(0u64));

        Self {
            kind: "unix-process",
            details,
        }
    }
}

#[derive(Debug, Deserialize, Type)]
struct AuthorizationResult {
    is_authorized: bool,
    _is_challenge: bool,
    details: HashMap<String, String>,
}

/// Policy client backed by polkitd.
#[derive(Debug)]
pub struct PolkitClient {
    bus: Connection,
    authority: RwLock<AuthorityProxy<'static>>,
    timeout: Duration,
}

impl PolkitClient {
    /// Connect to polkit.
    ///
    /// The `bus` connection is the one the helper serves requests on. It is
    /// used to resolve caller process ids.
    ///
    /// # Errors
    ///
    /// - Return [`AuthorityError::Bus`] if the system bus is unreachable.
    pub async fn connect(bus: Connection, timeout: Duration) -> Result<Self, AuthorityError> {
        let authority = connect_authority().await?;
        Ok(Self {
            bus,
            authority: RwLock::new(authority),
            timeout,
        })
    }
}

impl PolicyClient for PolkitClient {
    #[instrument(skip(self), level = "debug")]
    async fn caller_pid(&self, sender: &str) -> Result<u32, AuthorityError> {
        let name = BusName::try_from(sender)
            .map_err(|_| AuthorityError::InvalidSender(sender.into()))?;
        let dbus = DBusProxy::new(&self.bus).await.map_err(classify)?;
        let pid = dbus
            .get_connection_unix_process_id(name)
            .await
            .map_err(|err| classify(err.into()))?;
        debug!("sender {sender} resolved to pid {pid}");

        Ok(pid)
    }

    #[instrument(skip(self), level = "debug")]
    async fn check_authorization(
        &self,
        pid: u32,
        privilege: Privilege,
    ) -> Result<Decision, AuthorityError> {
        let authority = self.authority.read().await.clone();
        let subject = Subject::unix_process(pid);
        let details = HashMap::from([("", "")]);
        let call = authority.check_authorization(
            &subject,
            privilege.action_id(),
            &details,
            ALLOW_USER_INTERACTION,
            "",
        );

        let result = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| AuthorityError::Timeout(self.timeout))?
            .map_err(classify)?;

        Ok(Decision {
            authorized: result.is_authorized,
            details: result.details,
        })
    }

    async fn reconnect(&self) -> Result<(), AuthorityError> {
        let authority = connect_authority().await?;
        *self.authority.write().await = authority;
        debug!("reconnected to policy authority");

        Ok(())
    }
}

async fn connect_authority() -> Result<AuthorityProxy<'static>, AuthorityError> {
    let system = Connection::system().await?;
    Ok(AuthorityProxy::new(&system).await?)
}

fn classify(err: zbus::Error) -> AuthorityError {
    let unknown = match &err {
        zbus::Error::MethodError(name, _, _) => name.as_str() == SERVICE_UNKNOWN,
        zbus::Error::FDO(fdo) => matches!(**fdo, zbus::fdo::Error::ServiceUnknown(_)),
        _ => false,
    };

    if unknown {
        AuthorityError::Unavailable(err.to_string())
    } else {
        AuthorityError::Bus(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn unix_process_subject() {
        let subject = Subject::unix_process(1234);
        assert_eq!(subject.kind, "unix-process");
        assert_eq!(subject.details.get("pid"), Some(&Value::from(1234u32)));
        assert_eq!(subject.details.get("start-time"), Some(&Value::from(0u64)));
    }

    #[test]
    fn service_unknown_is_transient() {
        let err = zbus::Error::from(zbus::fdo::Error::ServiceUnknown("gone".into()));
        assert!(matches!(classify(err), AuthorityError::Unavailable(_)));

        let err = zbus::Error::from(zbus::fdo::Error::AccessDenied("nope".into()));
        assert!(matches!(classify(err), AuthorityError::Bus(_)));
    }
}
