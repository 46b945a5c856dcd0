//! # Cleats Bridge
//!
//! Command-line and session front end for driving the `pairofcleats` tool
//! from an editor. Every action goes through the same pipeline:
//!
//! ```text
//! Action + Target
//!       │
//!       ▼
//! ProjectLocator ──▶ ToolResolver ──▶ ProcessRunner ──▶ EditorPort
//! (project root)     (invocation)     (child + I/O)     (status, panels)
//!                                           │
//!                                           ▼
//!                                    SessionRegistry
//!                                    (one watch per window)
//! ```
//!
//! One-shot commands (`build`, `search`, `map`, ...) report through a
//! terminal port. `session` speaks JSON lines on stdin/stdout so an editor
//! can keep one bridge process alive across many actions.

use anyhow::{anyhow, Result};
use clap::{Args, Parser, Subcommand};
use cleats_protocol::{serialize_json, IndexMode, MapFormat, MapScope, MapType, SearchBackend, SearchMode};
use cleats_runner::{ProjectLocator, ToolResolver};
use serde_json::{json, Value};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

mod api;
pub mod dispatch;
pub mod port;
pub mod report;
pub mod serve;
pub mod settings;

use dispatch::{Action, DispatchTarget, Dispatcher, MapSelection, Outcome, WatchStart};
use port::{JsonLinesPort, TerminalPort};
use settings::{BridgeSettings, SearchOverrides};

fn print_stdout(text: &str) -> Result<()> {
    use std::io::Write;

    let mut stdout = io::stdout().lock();
    if let Err(err) = stdout
        .write_all(text.as_bytes())
        .and_then(|_| stdout.write_all(b"\n"))
        .and_then(|_| stdout.flush())
    {
        if err.kind() == io::ErrorKind::BrokenPipe {
            return Ok(());
        }
        return Err(err.into());
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "cleats-bridge")]
#[command(about = "Editor bridge for the PairOfCleats indexing tool", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Print the action outcome as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// Settings file (overrides CLEATS_BRIDGE_SETTINGS)
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Tool executable or script (overrides tool_path)
    #[arg(long, global = true)]
    tool_path: Option<PathBuf>,

    /// Map API server base URL (overrides api_server_url)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Extra child environment entry, KEY=VALUE (repeatable)
    #[arg(long = "env", global = true, value_parser = parse_env_pair)]
    env: Vec<(String, String)>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index for the project
    Build(BuildArgs),

    /// Keep the index up to date until interrupted
    Watch(TargetArgs),

    /// Validate the index
    Validate(TargetArgs),

    /// Print the tool's cache root for the project
    #[command(name = "config-dump")]
    ConfigDump(TargetArgs),

    /// Search the index
    Search(SearchArgs),

    /// Generate a dependency map
    Map(MapArgs),

    /// Print the project root a path resolves to
    Locate(TargetArgs),

    /// Print the tool invocation that would be used for the project
    Resolve(TargetArgs),

    /// Serve JSON-lines requests on stdin until EOF
    Session,
}

#[derive(Args, Clone)]
struct TargetArgs {
    /// File or directory the action was triggered from
    #[arg(long)]
    path: Option<PathBuf>,

    /// Open workspace folder (repeatable)
    #[arg(long = "folder")]
    folders: Vec<PathBuf>,

    /// Window key watches are tracked under
    #[arg(long, default_value = "cli")]
    window: String,
}

impl TargetArgs {
    fn target(&self) -> DispatchTarget {
        let hint = self
            .path
            .clone()
            .or_else(|| std::env::current_dir().ok());
        let mut target = DispatchTarget::new(self.window.clone()).with_folders(self.folders.clone());
        target.hint = hint;
        target
    }
}

#[derive(Args)]
struct BuildArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// code|prose|all (default from settings)
    #[arg(long)]
    mode: Option<IndexMode>,
}

#[derive(Args)]
struct SearchArgs {
    /// Query text
    query: String,

    #[command(flatten)]
    target: TargetArgs,

    /// code|prose|both
    #[arg(long)]
    mode: Option<SearchMode>,

    /// memory|sqlite|sqlite-fts|lmdb
    #[arg(long)]
    backend: Option<SearchBackend>,

    /// Maximum number of hits
    #[arg(short, long)]
    limit: Option<u32>,

    /// Print score breakdowns instead of the hit list
    #[arg(long)]
    explain: bool,
}

#[derive(Args)]
struct MapArgs {
    #[command(flatten)]
    target: TargetArgs,

    /// repo|dir|file|symbol
    #[arg(long, default_value = "repo")]
    scope: MapScope,

    /// File or directory to focus on (default: --path)
    #[arg(long)]
    focus: Option<PathBuf>,

    /// Symbol name for --scope symbol
    #[arg(long)]
    symbol: Option<String>,

    /// combined|imports|calls|usages|dataflow
    #[arg(long = "type")]
    map_type: Option<MapType>,

    /// html-iso|html|svg|dot|json
    #[arg(long)]
    format: Option<MapFormat>,
}

fn parse_env_pair(raw: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {raw:?}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in {raw:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

pub async fn main_entry() -> Result<()> {
    let cli = Cli::parse();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if cli.quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if cli.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();

    let (mut settings, source) = BridgeSettings::load(cli.settings.as_deref())?;
    match &source {
        Some(path) => log::debug!("Loaded settings from {}", path.display()),
        None => log::debug!("No settings file found; using defaults"),
    }
    if let Some(path) = &cli.tool_path {
        settings.tool_path = Some(path.clone());
    }
    if let Some(url) = &cli.api_url {
        settings.api_server_url = Some(url.clone());
    }
    for (key, value) in &cli.env {
        settings.env.insert(key.clone(), Value::String(value.clone()));
    }

    match cli.command {
        Commands::Session => run_session(settings).await,
        Commands::Locate(args) => run_locate(&args, cli.json),
        Commands::Resolve(args) => run_resolve(&args, &settings),
        Commands::Watch(args) => run_watch(settings, &args, cli.json).await,
        Commands::Build(args) => {
            let action = Action::Build { mode: args.mode };
            run_action(settings, &args.target, action, cli.json).await
        }
        Commands::Validate(args) => run_action(settings, &args, Action::Validate, cli.json).await,
        Commands::ConfigDump(args) => run_action(settings, &args, Action::ConfigDump, cli.json).await,
        Commands::Search(args) => {
            let action = Action::Search {
                query: args.query,
                overrides: SearchOverrides {
                    mode: args.mode,
                    backend: args.backend,
                    limit: args.limit,
                    explain: args.explain,
                },
            };
            run_action(settings, &args.target, action, cli.json).await
        }
        Commands::Map(args) => {
            let selection = MapSelection {
                scope: args.scope,
                focus: args.focus.or_else(|| args.target.path.clone()),
                symbol: args.symbol,
                map_type: args.map_type,
                format: args.format,
            };
            run_action(settings, &args.target, Action::Map(selection), cli.json).await
        }
    }
}

async fn run_action(settings: BridgeSettings, args: &TargetArgs, action: Action, json: bool) -> Result<()> {
    let dispatcher = Dispatcher::new(settings, Arc::new(TerminalPort::new(json)));
    let outcome = dispatcher.dispatch(&args.target(), action).await?;
    if json {
        return print_stdout(&serialize_json(&outcome)?);
    }
    if let Some(summary) = summarize(&outcome) {
        print_stdout(&summary)?;
    }
    Ok(())
}

/// One human-readable line for outcomes whose details were not already
/// written to a panel.
fn summarize(outcome: &Outcome) -> Option<String> {
    match outcome {
        Outcome::CacheRoot { path } => Some(path.display().to_string()),
        Outcome::Mapped(map) if map.open_in_browser => Some(map.browser_url()),
        Outcome::Mapped(map) => Some(map.out_path.clone()),
        _ => None,
    }
}

async fn run_watch(settings: BridgeSettings, args: &TargetArgs, json: bool) -> Result<()> {
    let dispatcher = Dispatcher::new(settings, Arc::new(TerminalPort::new(json)));
    let target = args.target();
    let start = dispatcher.start_watch(&target)?;
    if json {
        print_stdout(&serialize_json(&start.outcome())?)?;
    }
    let WatchStart::Started { mut monitor, .. } = start else {
        return Ok(());
    };

    tokio::select! {
        joined = &mut monitor => {
            joined.map_err(|err| anyhow!("watch monitor failed: {err}"))?;
            return Ok(());
        }
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                log::warn!("Failed to listen for Ctrl-C: {err}");
            }
        }
    }

    dispatcher.stop_watch(&target);
    monitor
        .await
        .map_err(|err| anyhow!("watch monitor failed: {err}"))
}

async fn run_session(settings: BridgeSettings) -> Result<()> {
    let events = Arc::new(JsonLinesPort::stdout());
    let dispatcher = Arc::new(Dispatcher::new(settings, events.clone()));
    log::info!("Session started; reading requests from stdin");
    serve::run_stdio(dispatcher, events).await
}

fn run_locate(args: &TargetArgs, json: bool) -> Result<()> {
    let target = args.target();
    let located = ProjectLocator::default().locate(target.hint.as_deref(), &target.open_folders);
    if json {
        return print_stdout(&serialize_json(&located)?);
    }
    let Some(root) = &located.root else {
        let reason = located
            .diagnostic
            .map(|diagnostic| diagnostic.to_string())
            .unwrap_or_else(|| "no project root".to_string());
        return Err(anyhow!(reason));
    };
    if let Some(diagnostic) = located.diagnostic {
        log::warn!("{diagnostic}");
    }
    print_stdout(&root.display().to_string())
}

fn run_resolve(args: &TargetArgs, settings: &BridgeSettings) -> Result<()> {
    let target = args.target();
    let located = ProjectLocator::default().locate(target.hint.as_deref(), &target.open_folders);
    let root = located
        .root
        .ok_or_else(|| anyhow!("no folders open, cannot proceed"))?;
    let invocation = ToolResolver.resolve(&settings.tool_config(), &root);
    let payload = json!({ "root": root, "invocation": invocation });
    print_stdout(&serde_json::to_string_pretty(&payload)?)
}
