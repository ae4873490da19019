use crate::analyzers::RecentLines;
use crate::config::LogConfig;
use crate::findings::{Category, Finding};
use crate::probes::log::{parse_line, LineLevel, LogFileStat, LogTail, TIMESTAMP_FORMAT};
use chrono::NaiveDateTime;

pub const STALLED_LONG_MINUTES: f64 = 120.0;
pub const STALLED_MINUTES: f64 = 30.0;
pub const IDLE_MINUTES: f64 = 5.0;
pub const ACTIVE_MINUTES: f64 = 0.5;
const ECHOED_LINES: usize = 3;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TailSummary {
    pub lines: usize,
    pub info: usize,
    pub warning: usize,
    pub error: usize,
    pub signals: usize,
    pub waiting: bool,
    pub last_errors: Vec<String>,
}

pub fn summarize_tail(tail: &LogTail, cfg: &LogConfig) -> TailSummary {
    let mut summary = TailSummary {
        lines: tail.lines.len(),
        ..TailSummary::default()
    };
    let mut errors = RecentLines::new(ECHOED_LINES);
    for line in &tail.lines {
        match LineLevel::classify(line) {
            Some(LineLevel::Info) => summary.info += 1,
            Some(LineLevel::Warning) => summary.warning += 1,
            Some(LineLevel::Error) => {
                summary.error += 1;
                errors.push(line);
            }
            None => {}
        }
        if cfg.signal_markers.iter().any(|m| line.contains(m.as_str())) {
            summary.signals += 1;
        }
        if cfg.waiting_markers.iter().any(|m| line.contains(m.as_str())) {
            summary.waiting = true;
        }
    }
    summary.last_errors = errors.to_vec();
    summary
}

/// Headline freshness finding first, then tail-derived findings.
pub fn classify_activity(
    stat: &LogFileStat,
    tail: Option<&LogTail>,
    cfg: &LogConfig,
) -> Vec<Finding> {
    if !stat.exists {
        return vec![Finding::critical(
            Category::Log,
            "missing",
            format!("log file not found: {}", stat.path.display()),
            "process never started or logs path wrong",
        )];
    }

    let summary = tail.map(|t| summarize_tail(t, cfg));
    let waiting = summary.as_ref().is_some_and(|s| s.waiting);
    let mut out = Vec::new();

    if stat.size_bytes == 0 {
        out.push(Finding::warn(
            Category::Log,
            "empty",
            "log file exists but is empty",
            "the trader never wrote a log line; check its console output",
        ));
    }
    out.push(freshness(stat.minutes_since_update, waiting));

    if let Some(summary) = summary {
        out.extend(tail_findings(&summary));
    }
    out
}

fn freshness(minutes: Option<f64>, waiting: bool) -> Finding {
    let Some(minutes) = minutes else {
        return Finding::warn(
            Category::Log,
            "mtime-unknown",
            "log modification time is unavailable",
            "check the filesystem supports modification times",
        );
    };

    if minutes > STALLED_LONG_MINUTES {
        Finding::critical(
            Category::Log,
            "stalled-long",
            format!("no log update for {minutes:.0} minutes ({:.1} hours)", minutes / 60.0),
            "the trader is likely crashed or hung; run diagnose-stall",
        )
    } else if minutes > STALLED_MINUTES {
        Finding::warn(
            Category::Log,
            "stalled",
            format!("no log update for {minutes:.0} minutes"),
            "investigate the trader; consider a restart",
        )
    } else if minutes > IDLE_MINUTES {
        if waiting {
            Finding::info(
                Category::Log,
                "idle-waiting",
                format!("no log update for {minutes:.1} minutes; strategy is waiting (normal)"),
            )
        } else {
            Finding::warn(
                Category::Log,
                "idle",
                format!("no log update for {minutes:.1} minutes"),
                "check trading.tick_interval and whether the strategy is waiting for data",
            )
        }
    } else if minutes <= ACTIVE_MINUTES {
        Finding::ok(
            Category::Log,
            "active",
            format!("log updated {:.0} seconds ago", (minutes * 60.0).max(0.0)),
        )
    } else {
        Finding::ok(
            Category::Log,
            "normal",
            format!("log updated {minutes:.1} minutes ago"),
        )
    }
}

fn tail_findings(summary: &TailSummary) -> Vec<Finding> {
    let mut out = vec![Finding::info(
        Category::Log,
        "tail-summary",
        format!(
            "last {} lines: {} INFO, {} WARNING, {} ERROR, {} signals",
            summary.lines, summary.info, summary.warning, summary.error, summary.signals
        ),
    )];
    if summary.signals == 0 {
        out.push(Finding::info(
            Category::Log,
            "no-signals",
            format!(
                "no trading signals in the last {} lines (normal: market conditions not met)",
                summary.lines
            ),
        ));
    }
    if summary.error > 0 {
        out.push(
            Finding::warn(
                Category::Log,
                "errors-present",
                format!("{} ERROR lines in the last {} lines", summary.error, summary.lines),
                "read the errors below and fix their cause",
            )
            .with_evidence(summary.last_errors.clone()),
        );
    }
    out
}

/// Totals over the whole log, fed one line at a time.
#[derive(Debug, Clone)]
pub struct LogHistory {
    pub lines: u64,
    pub errors: u64,
    pub warnings: u64,
    pub last_timestamp: Option<NaiveDateTime>,
    last_errors: RecentLines,
    last_warnings: RecentLines,
}

impl Default for LogHistory {
    fn default() -> Self {
        Self {
            lines: 0,
            errors: 0,
            warnings: 0,
            last_timestamp: None,
            last_errors: RecentLines::new(ECHOED_LINES),
            last_warnings: RecentLines::new(ECHOED_LINES),
        }
    }
}

impl LogHistory {
    pub fn observe(&mut self, line: &str) {
        self.lines += 1;
        match LineLevel::classify(line) {
            Some(LineLevel::Error) => {
                self.errors += 1;
                self.last_errors.push(line);
            }
            Some(LineLevel::Warning) => {
                self.warnings += 1;
                self.last_warnings.push(line);
            }
            _ => {}
        }
        if let Some(parsed) = parse_line(line) {
            self.last_timestamp = Some(parsed.timestamp);
        }
    }

    pub fn findings(&self, now: NaiveDateTime) -> Vec<Finding> {
        let mut out = vec![Finding::info(
            Category::Log,
            "history",
            format!(
                "whole log: {} lines, {} ERROR, {} WARNING",
                self.lines, self.errors, self.warnings
            ),
        )];

        out.push(match self.last_timestamp {
            Some(ts) => {
                let minutes = (now - ts).num_seconds() as f64 / 60.0;
                Finding::info(
                    Category::Log,
                    "last-entry",
                    format!(
                        "last timestamped entry {} ({minutes:.0} minutes ago)",
                        ts.format(TIMESTAMP_FORMAT)
                    ),
                )
            }
            None => Finding::info(
                Category::Log,
                "last-entry",
                "no line matches the `YYYY-MM-DD HH:MM:SS - logger - LEVEL - message` layout",
            ),
        });

        if self.errors > 0 {
            out.push(
                Finding::warn(
                    Category::Log,
                    "history-errors",
                    format!("{} ERROR lines in the whole log; last ones:", self.errors),
                    "match these errors to the startup phase that stopped",
                )
                .with_evidence(self.last_errors.to_vec()),
            );
        }
        if self.warnings > 0 {
            out.push(
                Finding::info(
                    Category::Log,
                    "history-warnings",
                    format!("{} WARNING lines in the whole log; last ones:", self.warnings),
                )
                .with_evidence(self.last_warnings.to_vec()),
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::findings::Severity;
    use std::path::PathBuf;
    use std::time::SystemTime;

    fn stat(minutes: f64) -> LogFileStat {
        LogFileStat {
            path: PathBuf::from("/tmp/quant_trading.log"),
            exists: true,
            size_bytes: 1024,
            modified: Some(SystemTime::now()),
            minutes_since_update: Some(minutes),
        }
    }

    fn tail(lines: &[&str]) -> LogTail {
        LogTail {
            lines: lines.iter().map(|l| l.to_string()).collect(),
        }
    }

    fn codes(findings: &[Finding]) -> Vec<String> {
        findings.iter().map(Finding::id).collect()
    }

    #[test]
    fn missing_log_is_critical_and_alone() {
        let out = classify_activity(
            &LogFileStat::missing(PathBuf::from("logs/x.log")),
            None,
            &LogConfig::default(),
        );
        assert_eq!(codes(&out), vec!["log/missing"]);
        assert_eq!(out[0].severity, Severity::Critical);
        assert!(out[0].hint.as_deref().unwrap().contains("never started"));
    }

    #[test]
    fn freshness_thresholds() {
        let cfg = LogConfig::default();
        let headline = |m: f64| classify_activity(&stat(m), None, &cfg)[0].clone();
        assert_eq!(headline(180.0).id(), "log/stalled-long");
        assert_eq!(headline(120.0).id(), "log/stalled");
        assert_eq!(headline(30.0).id(), "log/idle");
        assert_eq!(headline(5.0).id(), "log/normal");
        assert_eq!(headline(0.2).id(), "log/active");
        assert_eq!(headline(-3.0).id(), "log/active");
        assert_eq!(headline(180.0).severity, Severity::Critical);
        assert_eq!(headline(45.0).severity, Severity::Warn);
    }

    #[test]
    fn waiting_strategy_downgrades_idle() {
        let t = tail(&["2024-05-01 10:00:00 - strategy - INFO - 等待更多K线数据"]);
        let out = classify_activity(&stat(12.0), Some(&t), &LogConfig::default());
        assert_eq!(out[0].id(), "log/idle-waiting");
        assert_eq!(out[0].severity, Severity::Info);
    }

    #[test]
    fn quiet_tail_reports_no_signals_as_normal() {
        let t = tail(&[
            "2024-05-01 10:00:00 - engine - INFO - tick",
            "2024-05-01 10:00:01 - engine - INFO - tick",
        ]);
        let out = classify_activity(&stat(0.1), Some(&t), &LogConfig::default());
        let no_signals = out.iter().find(|f| f.is(Category::Log, "no-signals")).unwrap();
        assert_eq!(no_signals.severity, Severity::Info);
        assert!(no_signals.message.contains("normal"));
        assert!(no_signals.hint.is_none());
        assert!(!codes(&out).contains(&"log/errors-present".to_string()));
    }

    #[test]
    fn errors_echo_last_three() {
        let t = tail(&[
            "a - x - ERROR - e1",
            "a - x - ERROR - e2",
            "a - x - INFO - 交易信号 BUY",
            "a - x - ERROR - e3",
            "a - x - ERROR - e4",
        ]);
        let out = classify_activity(&stat(0.1), Some(&t), &LogConfig::default());
        let errors = out.iter().find(|f| f.is(Category::Log, "errors-present")).unwrap();
        assert_eq!(errors.severity, Severity::Warn);
        assert_eq!(errors.evidence.len(), 3);
        assert!(errors.evidence[0].ends_with("e2"));
        assert!(errors.evidence[2].ends_with("e4"));
        assert!(!codes(&out).contains(&"log/no-signals".to_string()));
    }

    #[test]
    fn empty_log_warns() {
        let mut s = stat(1.0);
        s.size_bytes = 0;
        let out = classify_activity(&s, Some(&tail(&[])), &LogConfig::default());
        assert_eq!(out[0].id(), "log/empty");
    }

    #[test]
    fn history_tracks_counts_and_last_timestamp() {
        let mut history = LogHistory::default();
        for line in [
            "2024-05-01 10:00:00 - engine - INFO - start",
            "2024-05-01 10:05:00 - engine - WARNING - slow",
            "garbage ERROR line without layout",
            "2024-05-01 10:10:00 - engine - ERROR - boom",
            "trailing noise",
        ] {
            history.observe(line);
        }
        assert_eq!(history.lines, 5);
        assert_eq!(history.errors, 2);
        assert_eq!(history.warnings, 1);

        let now = NaiveDateTime::parse_from_str("2024-05-01 10:40:00", TIMESTAMP_FORMAT).unwrap();
        let out = history.findings(now);
        let last = out.iter().find(|f| f.is(Category::Log, "last-entry")).unwrap();
        assert!(last.message.contains("2024-05-01 10:10:00"));
        assert!(last.message.contains("30 minutes ago"));
        let errors = out.iter().find(|f| f.is(Category::Log, "history-errors")).unwrap();
        assert_eq!(errors.evidence.len(), 2);
    }
}
