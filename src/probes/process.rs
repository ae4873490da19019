use crate::config::ProcessConfig;
use crate::probes::{decode_output, run_command, ProbeError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use sysinfo::{PidExt, ProcessExt, System, SystemExt};
use tracing::debug;

/// Minimum span between the two CPU readings of a sample.
pub const MIN_SAMPLE_WINDOW: Duration = Duration::from_secs(1);

const LISTING_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub command: String,
    pub cpu_percent: f32,
    pub memory_bytes: u64,
    pub start_time_unix: Option<u64>,
    pub uptime_secs: u64,
}

impl ProcessInfo {
    /// Advisory only: near-idle CPU after a long enough uptime.
    pub fn possibly_stuck(&self, cfg: &ProcessConfig) -> bool {
        self.cpu_percent < cfg.stuck_cpu_percent
            && self.uptime_secs > cfg.stuck_uptime_mins.saturating_mul(60)
    }
}

/// Source of process-table snapshots. A sample is taken in two steps so the
/// caller owns the wait between them and CPU usage covers that window.
#[async_trait]
pub trait ProcessEnumerator: Send {
    fn name(&self) -> &'static str;

    async fn begin_sample(&mut self) -> Result<(), ProbeError>;

    /// Every visible process, with CPU averaged since `begin_sample`.
    async fn finish_sample(&mut self, window: Duration) -> Result<Vec<ProcessInfo>, ProbeError>;
}

pub struct SysinfoEnumerator {
    system: System,
}

impl SysinfoEnumerator {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SysinfoEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessEnumerator for SysinfoEnumerator {
    fn name(&self) -> &'static str {
        "sysinfo"
    }

    async fn begin_sample(&mut self) -> Result<(), ProbeError> {
        if !System::IS_SUPPORTED {
            return Err(ProbeError::Unavailable {
                facility: "process listing",
                reason: "sysinfo does not support this platform".to_string(),
            });
        }
        self.system.refresh_processes();
        Ok(())
    }

    async fn finish_sample(&mut self, _window: Duration) -> Result<Vec<ProcessInfo>, ProbeError> {
        self.system.refresh_processes();
        let out: Vec<ProcessInfo> = self
            .system
            .processes()
            .iter()
            .map(|(pid, process)| {
                let command = if process.cmd().is_empty() {
                    process.name().to_string()
                } else {
                    process.cmd().join(" ")
                };
                ProcessInfo {
                    pid: pid.as_u32(),
                    command,
                    cpu_percent: process.cpu_usage(),
                    memory_bytes: process.memory(),
                    start_time_unix: Some(process.start_time()),
                    uptime_secs: process.run_time(),
                }
            })
            .collect();
        Ok(out)
    }
}

/// Fallback that shells out to `ps` (unix) or `tasklist` (windows) and
/// derives CPU share from the cumulative CPU time delta.
#[derive(Default)]
pub struct ShellEnumerator {
    baseline: HashMap<u32, f64>,
}

/// One row of the OS listing before CPU share is known.
#[derive(Debug, Clone, PartialEq)]
pub struct ShellRow {
    pub pid: u32,
    pub elapsed_secs: u64,
    pub cpu_time_secs: f64,
    pub memory_bytes: u64,
    pub command: String,
}

impl ShellEnumerator {
    pub fn new() -> Self {
        Self::default()
    }

    async fn list(&self) -> Result<Vec<ShellRow>, ProbeError> {
        #[cfg(windows)]
        let (program, args, parse): (&str, &[&str], fn(&str) -> Vec<ShellRow>) =
            ("tasklist", &["/v", "/fo", "csv", "/nh"], parse_tasklist);
        #[cfg(not(windows))]
        let (program, args, parse): (&str, &[&str], fn(&str) -> Vec<ShellRow>) = (
            "ps",
            &["-axo", "pid=,etime=,time=,rss=,args="],
            parse_ps,
        );

        let output = run_command(program, args, LISTING_TIMEOUT)
            .await
            .map_err(|err| match err {
                ProbeError::Unavailable { reason, .. } => ProbeError::Unavailable {
                    facility: "process listing",
                    reason,
                },
                other => other,
            })?;
        if !output.status.success() {
            return Err(ProbeError::Unavailable {
                facility: "process listing",
                reason: format!(
                    "{program} exited with {:?}: {}",
                    output.status.code(),
                    decode_output(&output.stderr).trim()
                ),
            });
        }
        Ok(parse(&decode_output(&output.stdout)))
    }
}

#[async_trait]
impl ProcessEnumerator for ShellEnumerator {
    fn name(&self) -> &'static str {
        if cfg!(windows) {
            "tasklist"
        } else {
            "ps"
        }
    }

    async fn begin_sample(&mut self) -> Result<(), ProbeError> {
        self.baseline = self
            .list()
            .await?
            .into_iter()
            .map(|row| (row.pid, row.cpu_time_secs))
            .collect();
        Ok(())
    }

    async fn finish_sample(&mut self, window: Duration) -> Result<Vec<ProcessInfo>, ProbeError> {
        let now_unix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .ok();
        let window_secs = window.as_secs_f64().max(f64::EPSILON);
        let rows = self.list().await?;
        Ok(rows
            .into_iter()
            .map(|row| {
                let cpu_percent = self
                    .baseline
                    .get(&row.pid)
                    .map(|before| ((row.cpu_time_secs - before).max(0.0) / window_secs) * 100.0)
                    .unwrap_or(0.0) as f32;
                ProcessInfo {
                    pid: row.pid,
                    command: row.command,
                    cpu_percent,
                    memory_bytes: row.memory_bytes,
                    start_time_unix: now_unix.map(|now| now.saturating_sub(row.elapsed_secs)),
                    uptime_secs: row.elapsed_secs,
                }
            })
            .collect())
    }
}

/// Prefer the library when it supports this OS; otherwise the shell tools.
pub fn default_enumerator() -> Box<dyn ProcessEnumerator> {
    if System::IS_SUPPORTED {
        Box::new(SysinfoEnumerator::new())
    } else {
        Box::new(ShellEnumerator::new())
    }
}

/// Script patterns match case-sensitively anywhere in the command line; the
/// interpreter filter, when set, matches case-insensitively.
pub fn matches(cfg: &ProcessConfig, command: &str) -> bool {
    if !cfg.patterns.iter().any(|p| command.contains(p.as_str())) {
        return false;
    }
    match &cfg.interpreter {
        Some(interpreter) => command
            .to_lowercase()
            .contains(&interpreter.to_lowercase()),
        None => true,
    }
}

/// Sample the process table over `window` and keep the trader's processes.
pub async fn probe_processes(
    enumerator: &mut dyn ProcessEnumerator,
    cfg: &ProcessConfig,
    window: Duration,
) -> Result<Vec<ProcessInfo>, ProbeError> {
    enumerator.begin_sample().await?;
    tokio::time::sleep(window).await;
    let all = enumerator.finish_sample(window).await?;
    if all.is_empty() {
        return Err(ProbeError::Unavailable {
            facility: "process listing",
            reason: format!("{} returned no processes", enumerator.name()),
        });
    }

    let own_pid = std::process::id();
    let total = all.len();
    let mut matched: Vec<ProcessInfo> = all
        .into_iter()
        .filter(|p| p.pid != own_pid && matches(cfg, &p.command))
        .collect();
    matched.sort_by_key(|p| p.pid);
    debug!(
        enumerator = enumerator.name(),
        scanned = total,
        matched = matched.len(),
        "process scan"
    );
    Ok(matched)
}

/// Parse `[[dd-]hh:]mm:ss[.frac]` as produced by `ps` for `etime` and `time`.
pub fn parse_clock(value: &str) -> Option<f64> {
    let (days, rest) = match value.split_once('-') {
        Some((days, rest)) => (days.parse::<f64>().ok()?, rest),
        None => (0.0, value),
    };
    let mut total = 0.0;
    for part in rest.split(':') {
        let n: f64 = part.parse().ok()?;
        total = total * 60.0 + n;
    }
    Some(days * 86_400.0 + total)
}

pub fn parse_ps(stdout: &str) -> Vec<ShellRow> {
    stdout
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let pid = fields.next()?.parse().ok()?;
            let elapsed_secs = parse_clock(fields.next()?)? as u64;
            let cpu_time_secs = parse_clock(fields.next()?)?;
            let rss_kib: u64 = fields.next()?.parse().ok()?;
            let command = fields.collect::<Vec<_>>().join(" ");
            if command.is_empty() {
                return None;
            }
            Some(ShellRow {
                pid,
                elapsed_secs,
                cpu_time_secs,
                memory_bytes: rss_kib * 1024,
                command,
            })
        })
        .collect()
}

/// `tasklist /v /fo csv /nh` has no start time, so elapsed is reported as 0
/// and the possibly-stuck heuristic never fires on this path.
#[cfg_attr(not(windows), allow(dead_code))]
pub fn parse_tasklist(stdout: &str) -> Vec<ShellRow> {
    stdout
        .lines()
        .filter_map(|line| {
            let cols = split_csv_line(line);
            if cols.len() < 8 {
                return None;
            }
            let pid = cols[1].parse().ok()?;
            let memory_kib: u64 = cols[4]
                .chars()
                .filter(char::is_ascii_digit)
                .collect::<String>()
                .parse()
                .ok()?;
            let cpu_time_secs = parse_clock(&cols[7]).unwrap_or(0.0);
            let mut command = cols[0].clone();
            if let Some(title) = cols.get(8).filter(|t| !t.is_empty() && t.as_str() != "N/A") {
                command.push(' ');
                command.push_str(title);
            }
            Some(ShellRow {
                pid,
                elapsed_secs: 0,
                cpu_time_secs,
                memory_bytes: memory_kib * 1024,
                command,
            })
        })
        .collect()
}

#[cfg_attr(not(windows), allow(dead_code))]
fn split_csv_line(line: &str) -> Vec<String> {
    let mut cols = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in line.trim_end_matches('\r').chars() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => cols.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    cols.push(current);
    cols
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Returns a fixed process table; counts how often it was sampled.
    pub(crate) struct FakeEnumerator {
        pub processes: Result<Vec<ProcessInfo>, String>,
        pub samples: usize,
    }

    impl FakeEnumerator {
        pub fn with(processes: Vec<ProcessInfo>) -> Self {
            Self {
                processes: Ok(processes),
                samples: 0,
            }
        }

        pub fn denied() -> Self {
            Self {
                processes: Err("permission denied".to_string()),
                samples: 0,
            }
        }
    }

    #[async_trait]
    impl ProcessEnumerator for FakeEnumerator {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn begin_sample(&mut self) -> Result<(), ProbeError> {
            Ok(())
        }

        async fn finish_sample(&mut self, _window: Duration) -> Result<Vec<ProcessInfo>, ProbeError> {
            self.samples += 1;
            self.processes
                .clone()
                .map_err(|reason| ProbeError::Unavailable {
                    facility: "process listing",
                    reason,
                })
        }
    }

    pub(crate) fn process(pid: u32, command: &str, cpu: f32, uptime_secs: u64) -> ProcessInfo {
        ProcessInfo {
            pid,
            command: command.to_string(),
            cpu_percent: cpu,
            memory_bytes: 64 * 1024 * 1024,
            start_time_unix: None,
            uptime_secs,
        }
    }

    #[test]
    fn script_names_are_case_sensitive_interpreter_is_not() {
        let cfg = ProcessConfig::default();
        assert!(matches(&cfg, "/usr/bin/Python3 start_trading.py --testnet"));
        assert!(matches(&cfg, "python main.py"));
        assert!(!matches(&cfg, "python MAIN.PY"));
        assert!(!matches(&cfg, "node main.py"));
        assert!(!matches(&cfg, "vim notes.txt"));
    }

    #[test]
    fn interpreter_filter_can_be_disabled() {
        let cfg = ProcessConfig {
            interpreter: None,
            ..ProcessConfig::default()
        };
        assert!(matches(&cfg, "./start_trading"));
    }

    #[test]
    fn possibly_stuck_needs_low_cpu_and_long_uptime() {
        let cfg = ProcessConfig::default();
        assert!(process(1, "python main.py", 0.0, 7200).possibly_stuck(&cfg));
        assert!(!process(1, "python main.py", 4.0, 7200).possibly_stuck(&cfg));
        assert!(!process(1, "python main.py", 0.0, 60).possibly_stuck(&cfg));
    }

    #[test]
    fn huge_uptime_threshold_saturates() {
        let cfg = ProcessConfig {
            stuck_uptime_mins: u64::MAX,
            ..ProcessConfig::default()
        };
        assert!(!process(1, "python main.py", 0.0, u64::MAX).possibly_stuck(&cfg));
        assert!(!process(1, "python main.py", 0.0, 7200).possibly_stuck(&cfg));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shell_listing_sees_this_process() {
        let mut shell = ShellEnumerator::new();
        shell.begin_sample().await.unwrap();
        let all = shell.finish_sample(Duration::from_millis(10)).await.unwrap();
        assert!(all.iter().any(|p| p.pid == std::process::id()));
    }

    #[tokio::test]
    async fn probe_filters_and_sorts_matches() {
        let mut fake = FakeEnumerator::with(vec![
            process(42, "python start_trading.py", 3.0, 100),
            process(7, "python main.py", 1.0, 100),
            process(9, "bash", 0.0, 100),
        ]);
        let found = probe_processes(&mut fake, &ProcessConfig::default(), Duration::from_millis(1))
            .await
            .unwrap();
        assert_eq!(found.iter().map(|p| p.pid).collect::<Vec<_>>(), vec![7, 42]);
        assert_eq!(fake.samples, 1);
    }

    #[tokio::test]
    async fn empty_listing_is_unavailable() {
        let mut fake = FakeEnumerator::with(Vec::new());
        let err = probe_processes(&mut fake, &ProcessConfig::default(), Duration::from_millis(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Unavailable { .. }));
    }

    #[test]
    fn parses_ps_rows() {
        let out = "  101 2-03:04:05 01:02:03 20480 /usr/bin/python3 main.py --live\n\
                   202 05:00 0:00.50 1024 python start_trading.py\n\
                   garbage line\n";
        let rows = parse_ps(out);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].pid, 101);
        assert_eq!(rows[0].elapsed_secs, 2 * 86_400 + 3 * 3600 + 4 * 60 + 5);
        assert_eq!(rows[0].cpu_time_secs, 3723.0);
        assert_eq!(rows[0].memory_bytes, 20480 * 1024);
        assert_eq!(rows[0].command, "/usr/bin/python3 main.py --live");
        assert_eq!(rows[1].elapsed_secs, 300);
        assert!((rows[1].cpu_time_secs - 0.5).abs() < 1e-9);
    }

    #[test]
    fn parses_tasklist_csv() {
        let out = "\"python.exe\",\"4242\",\"Console\",\"1\",\"45,312 K\",\"Running\",\"HOST\\\\trader\",\"0:01:10\",\"main.py\"\r\n";
        let rows = parse_tasklist(out);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pid, 4242);
        assert_eq!(rows[0].memory_bytes, 45_312 * 1024);
        assert_eq!(rows[0].cpu_time_secs, 70.0);
        assert_eq!(rows[0].command, "python.exe main.py");
    }
}
