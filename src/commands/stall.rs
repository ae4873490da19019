//! `diagnose-stall`: the log stopped moving; find out why.

use crate::analyzers::activity::LogHistory;
use crate::analyzers::host::network_findings;
use crate::analyzers::inference;
use crate::analyzers::startup::{StartupReport, StartupTracker};
use crate::commands::{
    check_log, check_process, check_resources, check_trading_config, internal, unreadable_log,
    Context,
};
use crate::config::StartupMarkers;
use crate::findings::{Category, Diagnosis, Finding, Severity, Verdict};
use crate::probes::log::{for_each_line, LogFileStat};
use crate::probes::network::probe_url;
use crate::probes::ProbeError;
use crate::report::Reporter;
use chrono::Local;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

const ECHOED_TAIL_LINES: usize = 10;

#[cfg(windows)]
const STOP_STEP: &str = "stop the process: Ctrl+C in its window, or taskkill /F /PID <pid>";
#[cfg(not(windows))]
const STOP_STEP: &str = "stop the process: Ctrl+C, or kill -9 <pid> (see section 2)";

pub async fn run<W: Write>(ctx: &mut Context, out: &mut Reporter<W>) -> Diagnosis {
    let mut findings = Vec::new();

    let (stat, log) = check_log(ctx, SystemTime::now());
    out.section("1. Log file");
    out.kv("path", stat.path.display());
    if stat.exists {
        out.kv("size", format!("{:.2} KiB", stat.size_bytes as f64 / 1024.0));
        if let Some(modified) = stat.modified_local() {
            out.kv("last modified", modified.format("%Y-%m-%d %H:%M:%S"));
        }
        if let Some(minutes) = stat.minutes_since_update {
            out.kv("since update", format!("{:.1} h ({minutes:.0} min)", minutes / 60.0));
        }
    }
    out.findings(&log, Severity::Ok);
    findings.extend(log);

    let Context {
        config,
        enumerator,
        sample_window,
        ..
    } = &mut *ctx;
    let (process, resources) = tokio::join!(
        check_process(enumerator.as_mut(), &config.process, *sample_window),
        check_resources(&config.resources, *sample_window),
    );
    out.section("2. Process");
    out.findings(&process, Severity::Ok);
    findings.extend(process);

    out.section("3. Recent log lines");
    if stat.exists {
        match stat.tail(ECHOED_TAIL_LINES) {
            Some(Ok(tail)) if tail.lines.is_empty() => out.warn("log is empty"),
            Some(Ok(tail)) => {
                for line in &tail.lines {
                    out.bullet(line);
                }
            }
            // Already reported by the log check.
            Some(Err(_)) | None => {}
        }
    } else {
        out.info("skipped: log file not found");
    }

    out.section("4. Configuration");
    let (view, trading_config) = check_trading_config(ctx);
    out.findings(&trading_config, Severity::Ok);
    findings.extend(trading_config);

    out.section("5. Network");
    let target = view.as_ref().and_then(|v| v.base_url.clone());
    match target {
        Some(url) => {
            out.kv("target", &url);
            match probe_url(&url, &ctx.config.network, ctx.ping).await {
                Ok(result) => {
                    let net = network_findings(&result);
                    out.findings(&net, Severity::Ok);
                    findings.extend(net);
                }
                Err(err @ ProbeError::Parse { .. }) => {
                    let f = Finding::warn(
                        Category::Network,
                        "bad-target",
                        err.to_string(),
                        "fix lighter.base_url so it is an absolute URL",
                    );
                    out.finding(&f);
                    findings.push(f);
                }
                Err(err) => {
                    let f = internal("network", &err);
                    out.finding(&f);
                    findings.push(f);
                }
            }
        }
        None => {
            let f = Finding::warn(
                Category::Network,
                "no-target",
                "no lighter.base_url to probe",
                "set lighter.base_url in the trading configuration",
            );
            out.finding(&f);
            findings.push(f);
        }
    }

    out.section("6. Startup sequence");
    let startup = scan_full_log(&stat, &ctx.config.startup).await;
    match startup {
        Ok(None) => out.info("skipped: log file not found"),
        Ok(Some((report, history))) => {
            let mut scanned = report.findings();
            scanned.extend(history.findings(Local::now().naive_local()));
            out.findings(&scanned, Severity::Ok);
            findings.extend(scanned);
        }
        Err(err @ ProbeError::Io { .. }) => {
            let f = unreadable_log(&err);
            out.finding(&f);
            findings.push(f);
        }
        Err(err) => {
            let f = internal("startup", &err);
            out.finding(&f);
            findings.push(f);
        }
    }

    out.section("7. Resources");
    out.findings(&resources, Severity::Ok);
    findings.extend(resources);

    let diagnosis = inference::infer(findings);
    out.diagnosis(&diagnosis);
    follow_up(diagnosis.verdict, out);
    out.flush();
    diagnosis
}

/// Stream the whole log off the runtime thread: startup phases of the latest
/// attempt plus error and warning history.
async fn scan_full_log(
    stat: &LogFileStat,
    markers: &StartupMarkers,
) -> Result<Option<(StartupReport, LogHistory)>, ProbeError> {
    if !stat.exists {
        return Ok(None);
    }
    let path: PathBuf = stat.path.clone();
    let mut tracker = StartupTracker::new(markers)
        .map_err(|err| ProbeError::Unexpected(format!("startup markers: {err}")))?;

    // Dropping this future (Ctrl+C) stops the blocking scan too.
    let guard = CancelOnDrop::default();
    let cancel = Arc::clone(&guard.0);
    tokio::task::spawn_blocking(move || -> Result<_, ProbeError> {
        let mut history = LogHistory::default();
        for_each_line(&path, &cancel, |line| {
            tracker.observe(line);
            history.observe(line);
        })?;
        Ok(Some((tracker.finish(), history)))
    })
    .await
    .map_err(|err| ProbeError::Unexpected(format!("log scan task: {err}")))?
}

#[derive(Default)]
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

fn follow_up<W: Write>(verdict: Verdict, out: &mut Reporter<W>) {
    let steps: &[&str] = match verdict {
        Verdict::Healthy => return,
        Verdict::Down => &[
            "start the trader: python start_trading.py",
            "watch the startup in another terminal: quantdiag log-watch",
            "confirm the log reaches 'entered main loop'",
        ],
        Verdict::Stalled => &[
            STOP_STEP,
            "check network connectivity to the exchange (section 5)",
            "restart: python start_trading.py",
            "watch the startup: quantdiag log-watch",
        ],
        Verdict::Degraded | Verdict::Unknown => &[
            "work through the findings above, highest severity first",
            "rerun quantdiag diagnose-stall after each change",
            "if the log stays frozen for over an hour, restart the trader",
        ],
    };
    out.section("Follow-up");
    for step in steps {
        out.bullet(step);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::{context, write_config, write_log, GOOD_CONFIG};
    use crate::probes::process::tests::{process, FakeEnumerator};
    use std::time::Duration;

    const FULL_START: [&str; 6] = [
        "2024-05-01 09:00:00 - main - INFO - 启动交易引擎...",
        "2024-05-01 09:00:01 - engine - INFO - 初始化数据管理器",
        "2024-05-01 09:00:03 - data - INFO - 发现 42 个市场",
        "2024-05-01 09:00:04 - engine - INFO - 初始化订单管理器",
        "2024-05-01 09:00:05 - orders - INFO - 订单管理器初始化完成",
        "2024-05-01 09:00:06 - engine - INFO - 进入主循环...",
    ];

    async fn run_captured(ctx: &mut Context) -> (Diagnosis, String) {
        let mut out = Reporter::new(Vec::new());
        let diagnosis = run(ctx, &mut out).await;
        (diagnosis, String::from_utf8(out.into_inner()).unwrap())
    }

    #[tokio::test]
    async fn stalled_trader() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), GOOD_CONFIG);
        let mut lines = FULL_START.to_vec();
        lines.push("2024-05-01 09:00:07 - strategy - INFO - tick");
        write_log(dir.path(), &lines, Duration::from_secs(3 * 3600));
        let mut ctx = context(
            dir.path(),
            FakeEnumerator::with(vec![process(501, "python start_trading.py", 0.0, 7200)]),
        );

        let (diagnosis, text) = run_captured(&mut ctx).await;
        assert_eq!(diagnosis.verdict, Verdict::Stalled);
        let headline = diagnosis
            .findings
            .iter()
            .find(|f| f.category == Category::Log && f.severity == Severity::Critical)
            .unwrap();
        assert_eq!(headline.code, "stalled-long");
        assert!(diagnosis
            .findings
            .iter()
            .any(|f| f.is(Category::Startup, "completed")));
        assert!(!diagnosis
            .findings
            .iter()
            .any(|f| f.is(Category::Log, "errors-present")));
        assert!(diagnosis.remediation[0].starts_with("force-kill and restart"));
        assert!(text.contains("Follow-up"));
    }

    #[tokio::test]
    async fn startup_stuck_at_markets() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), GOOD_CONFIG);
        write_log(dir.path(), &FULL_START[..2], Duration::from_secs(15 * 60));
        let mut ctx = context(
            dir.path(),
            FakeEnumerator::with(vec![process(502, "python main.py", 1.5, 900)]),
        );

        let (diagnosis, text) = run_captured(&mut ctx).await;
        let markets = diagnosis
            .findings
            .iter()
            .find(|f| f.is(Category::Startup, "markets"))
            .unwrap();
        assert_eq!(markets.tag(), "FAIL");
        assert!(markets
            .hint
            .as_deref()
            .unwrap()
            .contains("network or API error at startup"));
        assert!(text.contains("[FAIL] startup/markets"));
        assert_eq!(diagnosis.verdict, Verdict::Degraded);
        assert!(diagnosis.remediation[0].contains("network or API error at startup"));
    }

    #[test]
    fn dropped_scan_raises_the_cancel_flag() {
        let guard = CancelOnDrop::default();
        let flag = Arc::clone(&guard.0);
        assert!(!flag.load(Ordering::Relaxed));
        drop(guard);
        assert!(flag.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn missing_log_skips_scans() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), GOOD_CONFIG);
        let mut ctx = context(dir.path(), FakeEnumerator::with(vec![process(1, "sshd", 0.0, 1)]));

        let (diagnosis, text) = run_captured(&mut ctx).await;
        assert_eq!(diagnosis.verdict, Verdict::Down);
        assert!(text.contains("skipped: log file not found"));
    }
}
