// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use repoman::{
    audit::DenialLog,
    auth::{polkit::PolkitClient, Authorizer},
    config::Settings,
    dbus::{self, RepomanInterface, BUS_NAME, INTERFACE, OBJECT_PATH},
    distro::OsRelease,
    path::{resolve_config_path, CONFIG_ENV},
    service::RepomanService,
    store::SourceStore,
};

use anyhow::Result;
use clap::Parser;
use std::{path::PathBuf, process::exit};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(about, version)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, env = CONFIG_ENV, value_name = "path")]
    pub config: Option<PathBuf>,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let settings = Settings::load(resolve_config_path(self.config))?;
        let connection = dbus::connect(settings.service.bus).await?;

        let policy = PolkitClient::connect(connection.clone(), settings.service.auth_timeout()).await?;
        let log = DenialLog::new(&settings.service.denial_log);
        let authorizer = Authorizer::new(policy, settings.service.enforce_polkit, log);
        if !settings.service.enforce_polkit {
            warn!("polkit enforcement disabled, every caller is authorized");
        }

        let codename = match OsRelease::load().and_then(|release| release.codename().map(str::to_owned)) {
            Ok(codename) => Some(codename),
            Err(error) => {
                warn!("{error}, PPA shortcuts and pockets are unavailable");
                None
            }
        };

        let store = SourceStore::open(&settings.sources.dir, &settings.sources.system)?;
        let service = RepomanService::new(
            store,
            authorizer,
            codename,
            settings.service.refresh_command.clone(),
        );
        let shutdown = service.shutdown_signal();

        connection
            .object_server()
            .at(OBJECT_PATH, RepomanInterface::new(service))
            .await?;
        connection.request_name(BUS_NAME).await?;
        info!("serving {INTERFACE} at {OBJECT_PATH} as {BUS_NAME}");

        tokio::select! {
            _ = shutdown.notified() => info!("exit requested by client"),
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("interrupted");
            }
        }

        connection.release_name(BUS_NAME).await?;

        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run().await {
        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

async fn run() -> Result<()> {
    Cli::parse().run().await
}
