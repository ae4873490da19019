use crate::findings::{contains, Category, Diagnosis, Finding, Severity, Verdict};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    Absent,
    Unknown,
}

pub fn process_status(findings: &[Finding]) -> ProcessStatus {
    if contains(findings, Category::Process, "unavailable") {
        ProcessStatus::Unknown
    } else if contains(findings, Category::Process, "none") {
        ProcessStatus::Absent
    } else if contains(findings, Category::Process, "running") {
        ProcessStatus::Running
    } else {
        ProcessStatus::Unknown
    }
}

/// Pick the verdict by the first matching rule and put its remediation
/// ahead of the hints carried by the findings themselves.
pub fn infer(findings: Vec<Finding>) -> Diagnosis {
    let status = process_status(&findings);
    let stalled_long = contains(&findings, Category::Log, "stalled-long");
    let stalled = contains(&findings, Category::Log, "stalled");
    let startup_stuck = findings
        .iter()
        .find(|f| f.is(Category::Startup, "incomplete"));
    let config_failed = findings
        .iter()
        .any(|f| f.category == Category::Config && f.severity.is_failure());
    let any_failure = findings.iter().any(|f| f.severity.is_failure());

    let (verdict, primary): (Verdict, Option<String>) = if status == ProcessStatus::Unknown
        && stalled_long
    {
        (
            Verdict::Unknown,
            Some("process listing unavailable; inspect manually".to_string()),
        )
    } else if status == ProcessStatus::Absent {
        (Verdict::Down, Some("relaunch the trader".to_string()))
    } else if status == ProcessStatus::Running && stalled_long {
        (
            Verdict::Stalled,
            Some("force-kill and restart; likely network hang".to_string()),
        )
    } else if status == ProcessStatus::Running && stalled {
        (
            Verdict::Degraded,
            Some("investigate; consider restart".to_string()),
        )
    } else if let Some(stuck) = startup_stuck {
        (Verdict::Degraded, stuck.hint.clone())
    } else if config_failed {
        (
            Verdict::Degraded,
            Some("fix configuration before restart".to_string()),
        )
    } else if any_failure {
        (Verdict::Degraded, Some("review the errors above".to_string()))
    } else {
        (Verdict::Healthy, None)
    };

    let remediation = match primary {
        Some(primary) => prioritized(primary, &findings),
        None => Vec::new(),
    };

    Diagnosis {
        verdict,
        remediation,
        findings,
    }
}

fn prioritized(primary: String, findings: &[Finding]) -> Vec<String> {
    let mut ranked: Vec<&Finding> = findings
        .iter()
        .filter(|f| f.severity >= Severity::Warn && f.hint.is_some())
        .collect();
    // Stable: equal severities keep report order.
    ranked.sort_by(|a, b| b.severity.cmp(&a.severity));

    let mut steps = vec![primary];
    for hint in ranked.into_iter().filter_map(|f| f.hint.as_ref()) {
        if !steps.contains(hint) {
            steps.push(hint.clone());
        }
    }
    steps
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running() -> Finding {
        Finding::ok(Category::Process, "running", "1 matching process(es)")
    }

    fn stalled_long() -> Finding {
        Finding::critical(Category::Log, "stalled-long", "no update for 180 minutes", "run diagnose-stall")
    }

    #[test]
    fn nothing_running_is_down() {
        let d = infer(vec![
            Finding::critical(Category::Log, "missing", "no log", "process never started or logs path wrong"),
            Finding::critical(Category::Process, "none", "no process", "start the trader"),
        ]);
        assert_eq!(d.verdict, Verdict::Down);
        assert_eq!(d.remediation[0], "relaunch the trader");
        assert!(d.remediation.iter().any(|s| s.contains("start the trader")));
        assert_eq!(d.exit_code(), 1);
    }

    #[test]
    fn running_and_silent_is_stalled() {
        let d = infer(vec![running(), stalled_long()]);
        assert_eq!(d.verdict, Verdict::Stalled);
        assert!(d.remediation[0].starts_with("force-kill and restart"));
    }

    #[test]
    fn unknown_process_status_with_stall_is_unknown() {
        let d = infer(vec![
            Finding::warn(Category::Process, "unavailable", "denied", "check manually"),
            stalled_long(),
        ]);
        assert_eq!(d.verdict, Verdict::Unknown);
        assert_eq!(d.remediation[0], "process listing unavailable; inspect manually");
    }

    #[test]
    fn stalled_is_degraded() {
        let d = infer(vec![
            running(),
            Finding::warn(Category::Log, "stalled", "45 minutes", "investigate"),
        ]);
        assert_eq!(d.verdict, Verdict::Degraded);
        assert_eq!(d.remediation[0], "investigate; consider restart");
    }

    #[test]
    fn stuck_startup_uses_phase_hint() {
        let d = infer(vec![
            running(),
            Finding::error(Category::Startup, "incomplete", "stopped", "network or API error at startup"),
        ]);
        assert_eq!(d.verdict, Verdict::Degraded);
        assert_eq!(d.remediation[0], "network or API error at startup");
        assert_eq!(d.remediation.len(), 1);
    }

    #[test]
    fn config_errors_degrade() {
        let d = infer(vec![
            running(),
            Finding::error(Category::Config, "private-key-placeholder", "placeholder", "set the key"),
        ]);
        assert_eq!(d.verdict, Verdict::Degraded);
        assert_eq!(d.remediation[0], "fix configuration before restart");
        assert_eq!(d.remediation[1], "set the key");
    }

    #[test]
    fn warnings_alone_stay_healthy() {
        let d = infer(vec![
            running(),
            Finding::ok(Category::Log, "active", "fresh"),
            Finding::info(Category::Log, "no-signals", "quiet (normal)"),
            Finding::warn(Category::Resource, "disk", "disk 93%", "free space"),
        ]);
        assert_eq!(d.verdict, Verdict::Healthy);
        assert!(d.remediation.is_empty());
        assert_eq!(d.exit_code(), 0);
    }

    #[test]
    fn other_failures_fall_back_to_degraded() {
        let d = infer(vec![
            running(),
            Finding::error(Category::Network, "http", "unreachable", "check connectivity"),
        ]);
        assert_eq!(d.verdict, Verdict::Degraded);
        assert_eq!(d.remediation, vec!["review the errors above", "check connectivity"]);
    }

    #[test]
    fn inference_is_deterministic() {
        let findings = vec![
            running(),
            stalled_long(),
            Finding::warn(Category::Process, "possibly-stuck", "idle", "compare with log"),
        ];
        assert_eq!(infer(findings.clone()), infer(findings));
    }
}
