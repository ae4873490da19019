pub mod config_check;
pub mod deps;
pub mod health;
pub mod stall;
pub mod watch;

use crate::analyzers::{activity, config_lint, host};
use crate::config::{Config, ProcessConfig, ResourceConfig};
use crate::findings::{Category, Finding, Severity};
use crate::probes::log::LogFileStat;
use crate::probes::process::{
    default_enumerator, probe_processes, ProcessEnumerator, MIN_SAMPLE_WINDOW,
};
use crate::probes::resources::probe_resources;
use crate::probes::trading_config::ConfigView;
use crate::probes::ProbeError;
use crate::report;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

/// Everything a command needs, resolved once from settings and flags.
pub struct Context {
    pub config: Config,
    pub log_path: PathBuf,
    pub trading_config_path: PathBuf,
    /// Base directory for the project-file check.
    pub project_dir: PathBuf,
    pub enumerator: Box<dyn ProcessEnumerator>,
    pub sample_window: Duration,
    pub ping: bool,
}

impl Context {
    pub fn new(config: Config, log: Option<PathBuf>, trading_config: Option<PathBuf>) -> Self {
        Self {
            log_path: log.unwrap_or_else(|| config.log_path.clone()),
            trading_config_path: trading_config
                .unwrap_or_else(|| config.trading_config_path.clone()),
            project_dir: PathBuf::from("."),
            enumerator: default_enumerator(),
            sample_window: MIN_SAMPLE_WINDOW,
            ping: true,
            config,
        }
    }
}

pub(crate) async fn check_process(
    enumerator: &mut dyn ProcessEnumerator,
    cfg: &ProcessConfig,
    window: Duration,
) -> Vec<Finding> {
    let scan = probe_processes(enumerator, cfg, window).await;
    if let Err(err) = &scan {
        tracing::warn!(enumerator = enumerator.name(), error = %err, "process probe failed");
    }
    host::process_findings(&scan, cfg)
}

pub(crate) async fn check_resources(cfg: &ResourceConfig, window: Duration) -> Vec<Finding> {
    let snapshot = probe_resources(window).await;
    if let Err(err) = &snapshot {
        tracing::warn!(error = %err, "resource probe failed");
    }
    host::resource_findings(&snapshot, cfg)
}

/// Stat plus tail of the trader's log, classified. A tail that cannot be
/// read degrades to stat-only classification.
pub(crate) fn check_log(ctx: &Context, now: SystemTime) -> (LogFileStat, Vec<Finding>) {
    let stat = LogFileStat::probe(&ctx.log_path, now);
    let mut findings = Vec::new();
    let tail = match stat.tail(ctx.config.log.tail_lines) {
        Some(Ok(tail)) => Some(tail),
        Some(Err(err)) => {
            findings.push(unreadable_log(&err));
            None
        }
        None => None,
    };
    findings.extend(activity::classify_activity(
        &stat,
        tail.as_ref(),
        &ctx.config.log,
    ));
    (stat, findings)
}

pub(crate) fn unreadable_log(err: &ProbeError) -> Finding {
    Finding::error(
        Category::Log,
        "unreadable",
        err.to_string(),
        "check the log file permissions",
    )
}

/// Load and lint the trading configuration. Load failures are reported as a
/// single critical finding and skip the lint.
pub(crate) fn check_trading_config(ctx: &Context) -> (Option<ConfigView>, Vec<Finding>) {
    let path = &ctx.trading_config_path;
    match ConfigView::load(path) {
        Ok(view) => {
            let findings = config_lint::lint(&view);
            (Some(view), findings)
        }
        Err(err) if err.is_not_found() => (
            None,
            vec![Finding::critical(
                Category::Config,
                "missing",
                format!("configuration file not found: {}", path.display()),
                "create it from the sample printed by `quantdiag dependency-check --example`",
            )],
        ),
        Err(err @ ProbeError::Parse { .. }) => (
            None,
            vec![Finding::critical(
                Category::Config,
                "unparseable",
                err.to_string(),
                "fix the YAML syntax; `quantdiag config-check` shows the position",
            )],
        ),
        Err(err) => (
            None,
            vec![Finding::critical(
                Category::Config,
                "unreadable",
                err.to_string(),
                "check the configuration file permissions",
            )],
        ),
    }
}

/// Report an error that came from inside the toolkit rather than the
/// trader, and keep going.
pub(crate) fn internal(probe: &str, err: &dyn std::fmt::Display) -> Finding {
    report::internal(&format!("{probe}: {err}"));
    Finding::error(
        Category::Internal,
        probe.to_string(),
        err.to_string(),
        "rerun with RUST_LOG=debug and report the output",
    )
}

pub(crate) fn at_least(findings: &[Finding], min: Severity) -> Vec<Finding> {
    findings
        .iter()
        .filter(|f| f.severity >= min || f.failed_check)
        .cloned()
        .collect()
}
