mod analyzers;
mod commands;
mod config;
mod findings;
mod probes;
mod report;

use clap::{Args, CommandFactory, Parser, Subcommand};
use commands::{config_check, deps, health, stall, watch, Context};
use config::{Config, ConfigError, DEFAULT_SETTINGS_PATH};
use findings::{exit_code, Diagnosis};
use report::Reporter;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const INTERRUPTED: u8 = 130;

#[derive(Parser, Debug)]
#[command(name = "quantdiag")]
#[command(version)]
#[command(about = "Health and stall diagnosis for the quant trader, from the outside")]
struct Cli {
    /// Toolkit settings file.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    #[arg(long)]
    print_default_config: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args, Debug, Clone)]
struct PathArgs {
    /// Trader log file.
    #[arg(long)]
    log: Option<PathBuf>,
    /// Trading configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Is the trader running and making progress?
    Health {
        #[command(flatten)]
        paths: PathArgs,
        #[arg(long)]
        json: bool,
    },
    /// The log stopped moving: find out why.
    DiagnoseStall {
        #[command(flatten)]
        paths: PathArgs,
        #[arg(long)]
        json: bool,
    },
    /// Lint the trading configuration.
    ConfigCheck {
        #[command(flatten)]
        paths: PathArgs,
    },
    /// Check the interpreter, packages and project files.
    DependencyCheck {
        #[command(flatten)]
        paths: PathArgs,
        /// Print a sample trading configuration and exit.
        #[arg(long)]
        example: bool,
    },
    /// Follow the log and report activity on every tick.
    LogWatch {
        #[command(flatten)]
        paths: PathArgs,
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        interval: Option<u64>,
        /// Stop after this many ticks instead of running until interrupted.
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        ticks: Option<u64>,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Health { .. } => "health",
            Command::DiagnoseStall { .. } => "diagnose-stall",
            Command::ConfigCheck { .. } => "config-check",
            Command::DependencyCheck { .. } => "dependency-check",
            Command::LogWatch { .. } => "log-watch",
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        let mut out = Reporter::stdout();
        out.raw(Config::example_yaml());
        out.flush();
        return ExitCode::SUCCESS;
    }
    let Some(command) = cli.command else {
        let mut out = Reporter::stdout();
        out.raw(&format!("{}\n", Cli::command().render_help()));
        out.flush();
        return ExitCode::from(2);
    };

    let cfg = load_settings(cli.settings);
    let name = command.name();
    debug!(command = name, "starting");

    tokio::select! {
        code = dispatch(command, cfg) => ExitCode::from(code),
        _ = interrupted() => {
            let mut out = Reporter::stdout();
            out.info(&format!("interrupted; {name} stopped"));
            out.flush();
            // Dropping the runtime would wait for blocking tasks such as a
            // full-log scan.
            std::process::exit(INTERRUPTED.into());
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// Settings are best-effort: any problem falls back to built-in defaults.
fn load_settings(explicit: Option<PathBuf>) -> Config {
    let path = explicit
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH));
    match Config::load_from_file(&path) {
        Ok(cfg) => cfg,
        Err(ConfigError::Read { source, .. })
            if explicit.is_none() && source.kind() == io::ErrorKind::NotFound =>
        {
            Config::default()
        }
        Err(err) => {
            report::internal(&format!("{err}; using built-in defaults"));
            Config::default()
        }
    }
}

async fn interrupted() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

async fn dispatch(command: Command, cfg: Config) -> u8 {
    match command {
        Command::Health { paths, json } => {
            let mut ctx = Context::new(cfg, paths.log, paths.config);
            if json {
                let diagnosis = health::run(&mut ctx, &mut Reporter::new(io::sink())).await;
                print_json(&diagnosis);
                diagnosis.exit_code()
            } else {
                health::run(&mut ctx, &mut Reporter::stdout())
                    .await
                    .exit_code()
            }
        }
        Command::DiagnoseStall { paths, json } => {
            let mut ctx = Context::new(cfg, paths.log, paths.config);
            if json {
                let diagnosis = stall::run(&mut ctx, &mut Reporter::new(io::sink())).await;
                print_json(&diagnosis);
                diagnosis.exit_code()
            } else {
                stall::run(&mut ctx, &mut Reporter::stdout())
                    .await
                    .exit_code()
            }
        }
        Command::ConfigCheck { paths } => {
            let ctx = Context::new(cfg, paths.log, paths.config);
            exit_code(&config_check::run(&ctx, &mut Reporter::stdout()))
        }
        Command::DependencyCheck { paths, example } => {
            let ctx = Context::new(cfg, paths.log, paths.config);
            exit_code(&deps::run(&ctx, example, &mut Reporter::stdout()).await)
        }
        Command::LogWatch {
            paths,
            interval,
            ticks,
        } => {
            let ctx = Context::new(cfg, paths.log, paths.config);
            let secs = interval.unwrap_or(ctx.config.watch.interval_secs);
            watch::run(
                &ctx.log_path,
                &ctx.config.watch,
                Duration::from_secs(secs),
                ticks,
                &mut Reporter::stdout(),
            )
            .await;
            0
        }
    }
}

fn print_json(diagnosis: &Diagnosis) {
    match serde_json::to_string_pretty(diagnosis) {
        Ok(text) => {
            let mut out = Reporter::stdout();
            out.raw(&format!("{text}\n"));
            out.flush();
        }
        Err(err) => report::internal(&format!("json output: {err}")),
    }
}
