//! `health`: is the trader running and making progress?

use crate::analyzers::inference;
use crate::commands::{at_least, check_log, check_process, check_resources, check_trading_config, Context};
use crate::findings::{Diagnosis, Severity};
use crate::report::Reporter;
use std::io::Write;
use std::time::SystemTime;

pub async fn run<W: Write>(ctx: &mut Context, out: &mut Reporter<W>) -> Diagnosis {
    let Context {
        config,
        enumerator,
        sample_window,
        ..
    } = ctx;
    let (process, resources) = tokio::join!(
        check_process(enumerator.as_mut(), &config.process, *sample_window),
        check_resources(&config.resources, *sample_window),
    );

    let (stat, log) = check_log(ctx, SystemTime::now());
    let (_, trading_config) = check_trading_config(ctx);

    out.section("Trader health");
    out.findings(&process, Severity::Ok);

    out.section("Log");
    out.kv("path", stat.path.display());
    if stat.exists {
        out.kv("size", format!("{:.2} KiB", stat.size_bytes as f64 / 1024.0));
        if let Some(modified) = stat.modified_local() {
            out.kv("last modified", modified.format("%Y-%m-%d %H:%M:%S"));
        }
    }
    out.findings(&log, Severity::Ok);

    out.section("Configuration");
    out.kv("path", ctx.trading_config_path.display());
    let config_issues = at_least(&trading_config, Severity::Warn);
    if config_issues.is_empty() {
        out.ok("no configuration issues");
    }
    out.findings(&config_issues, Severity::Warn);

    out.section("Resources");
    out.findings(&resources, Severity::Ok);

    let mut findings = process;
    findings.extend(log);
    findings.extend(config_issues);
    findings.extend(resources);

    let diagnosis = inference::infer(findings);
    out.diagnosis(&diagnosis);
    out.flush();
    diagnosis
}
