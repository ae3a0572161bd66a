// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use repoman::{
    client::{AddEvent, FullSourceRequest, SourceManager},
    config::Settings,
    dbus::RepomanProxy,
    path::{resolve_config_path, CONFIG_ENV},
};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use inquire::Confirm;
use std::{path::PathBuf, process::exit, time::Duration};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "repoman [options] <repoman-command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to configuration file.
    #[arg(short, long, global = true, env = CONFIG_ENV, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let settings = Settings::load(resolve_config_path(self.config))?;
        let manager = SourceManager::connect(&settings).await?;

        match self.command {
            Command::List => run_list(&manager),
            Command::Show(opts) => run_show(&manager, opts),
            Command::System => run_system(&manager),
            Command::Add(opts) => run_add(&manager, opts).await,
            Command::AddFull(opts) => run_add_full(&manager, opts).await,
            Command::Remove(opts) => run_remove(&manager, opts).await,
            Command::Modify(opts) => run_modify(&manager, opts).await,
            Command::Component(opts) => run_component(&manager, opts).await,
            Command::Suite(opts) => run_suite(&manager, opts).await,
            Command::SourceCode(opts) => run_source_code(&manager, opts).await,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// List every source except the system source.
    #[command(override_usage = "repoman list [options]")]
    List,

    /// Show one source in deb822 form.
    #[command(override_usage = "repoman show [options] <id>")]
    Show(ShowOptions),

    /// Show suites and components of the system source.
    #[command(override_usage = "repoman system [options]")]
    System,

    /// Add source from sources.list line or PPA shortcut.
    #[command(override_usage = "repoman add [options] <line>")]
    Add(AddOptions),

    /// Add source from individual fields.
    #[command(override_usage = "repoman add-full [options] --name <name> --uris <uri>... --suites <suite>...")]
    AddFull(AddFullOptions),

    /// Remove source by id or sources.list line.
    #[command(override_usage = "repoman remove [options] <id>")]
    Remove(RemoveOptions),

    /// Replace source with new sources.list line.
    #[command(override_usage = "repoman modify [options] <old> <new>")]
    Modify(ModifyOptions),

    /// Add or remove component of a source.
    #[command(override_usage = "repoman component [options] <add|remove> <repo> <component>")]
    Component(ComponentOptions),

    /// Add or remove suite of a source.
    #[command(override_usage = "repoman suite [options] <add|remove> <repo> <suite>")]
    Suite(SuiteOptions),

    /// Toggle source code packages of a source.
    #[command(override_usage = "repoman source-code [options] <repo> <on|off>")]
    SourceCode(SourceCodeOptions),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Action {
    Add,
    Remove,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Toggle {
    On,
    Off,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ShowOptions {
    /// File id of source.
    #[arg(required = true, value_name = "id")]
    pub id: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct AddOptions {
    /// Sources.list line or `ppa:<owner>/<archive>` shortcut.
    #[arg(required = true, value_name = "line")]
    pub line: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct AddFullOptions {
    /// Human readable name, also used to derive the file id.
    #[arg(short, long, value_name = "name")]
    pub name: String,

    /// Archive URIs.
    #[arg(short, long, required = true, num_args = 1.., value_name = "uri")]
    pub uris: Vec<String>,

    /// Suites to fetch.
    #[arg(short, long, required = true, num_args = 1.., value_name = "suite")]
    pub suites: Vec<String>,

    /// Components to fetch.
    #[arg(short, long, num_args = 1.., value_name = "component")]
    pub components: Vec<String>,

    /// Also fetch source code packages.
    #[arg(long)]
    pub source_code: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RemoveOptions {
    /// File id or sources.list line of source.
    #[arg(required = true, value_name = "id")]
    pub id: String,

    /// Skip confirmation prompt.
    #[arg(short, long)]
    pub yes: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ModifyOptions {
    /// File id or sources.list line of existing source.
    #[arg(required = true, value_name = "old")]
    pub old: String,

    /// Replacement sources.list line.
    #[arg(required = true, value_name = "new")]
    pub new: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ComponentOptions {
    #[arg(value_enum, value_name = "action")]
    pub action: Action,

    /// File id of source.
    #[arg(value_name = "repo")]
    pub repo: String,

    #[arg(value_name = "component")]
    pub component: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SuiteOptions {
    #[arg(value_enum, value_name = "action")]
    pub action: Action,

    /// File id of source.
    #[arg(value_name = "repo")]
    pub repo: String,

    #[arg(value_name = "suite")]
    pub suite: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SourceCodeOptions {
    /// File id of source.
    #[arg(value_name = "repo")]
    pub repo: String,

    #[arg(value_enum, value_name = "toggle")]
    pub toggle: Toggle,
}

type Manager = SourceManager<RepomanProxy<'static>>;

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

fn run_list(manager: &Manager) -> Result<()> {
    for source in manager.sources()? {
        let state = if source.enabled { "enabled" } else { "disabled" };
        println!("{:<30} {:<9} {}", source.id, state, source.name);
    }

    Ok(())
}

fn run_show(manager: &Manager, opts: ShowOptions) -> Result<()> {
    let source = manager.source(&opts.id)?;
    print!("{source}");

    Ok(())
}

fn run_system(manager: &Manager) -> Result<()> {
    if let Some(codename) = manager.codename() {
        println!("codename:   {codename}");
    }
    println!("suites:     {}", manager.system_suites()?.join(" "));
    println!("components: {}", manager.system_components()?.join(" "));
    println!(
        "source code: {}",
        if manager.source_code_enabled(manager.system_id())? { "on" } else { "off" }
    );

    Ok(())
}

async fn run_add(manager: &Manager, opts: AddOptions) -> Result<()> {
    let bar = ProgressBar::new_spinner();
    let style = ProgressStyle::with_template("{elapsed_precise:.green}  {spinner:.yellow}  {msg}")?;
    bar.set_style(style);
    bar.set_message(format!("adding {}", opts.line));
    bar.enable_steady_tick(Duration::from_millis(100));

    let mut task = manager.spawn_add(opts.line.as_str());
    let event = tokio::select! {
        event = task.next_event() => event,
        _ = tokio::signal::ctrl_c() => {
            task.cancel();
            task.next_event().await
        }
    };
    bar.finish_and_clear();

    match event {
        Some(AddEvent::Completed { sources }) => {
            info!("added {}, {} sources configured", opts.line, sources.len());
            Ok(())
        }
        Some(AddEvent::Failed { reason }) => Err(anyhow!("cannot add {}: {reason}", opts.line)),
        Some(AddEvent::Cancelled) | None => Err(anyhow!("add of {} cancelled", opts.line)),
    }
}

async fn run_add_full(manager: &Manager, opts: AddFullOptions) -> Result<()> {
    let request = FullSourceRequest {
        name: opts.name,
        uris: opts.uris,
        suites: opts.suites,
        components: opts.components,
        source_code: opts.source_code,
    };
    manager.add_full_source(&request).await?;

    Ok(())
}

async fn run_remove(manager: &Manager, opts: RemoveOptions) -> Result<()> {
    if !opts.yes {
        let confirmed = Confirm::new(&format!("remove source {}?", opts.id))
            .with_default(false)
            .prompt()?;
        if !confirmed {
            info!("leaving {} in place", opts.id);
            return Ok(());
        }
    }

    manager.remove_source(&opts.id).await?;

    Ok(())
}

async fn run_modify(manager: &Manager, opts: ModifyOptions) -> Result<()> {
    manager.modify_source(&opts.old, &opts.new).await?;

    Ok(())
}

async fn run_component(manager: &Manager, opts: ComponentOptions) -> Result<()> {
    match opts.action {
        Action::Add => manager.add_component(&opts.repo, &opts.component).await?,
        Action::Remove => manager.remove_component(&opts.repo, &opts.component).await?,
    }

    Ok(())
}

async fn run_suite(manager: &Manager, opts: SuiteOptions) -> Result<()> {
    match opts.action {
        Action::Add => manager.add_suite(&opts.repo, &opts.suite).await?,
        Action::Remove => manager.remove_suite(&opts.repo, &opts.suite).await?,
    }

    Ok(())
}

async fn run_source_code(manager: &Manager, opts: SourceCodeOptions) -> Result<()> {
    let enabled = matches!(opts.toggle, Toggle::On);
    manager.set_source_code_enabled(&opts.repo, enabled).await?;
    let source = manager.source(&opts.repo)?;
    info!(
        "source code for {} is now {}",
        source.id,
        if source.source_code_enabled() { "on" } else { "off" }
    );

    Ok(())
}
