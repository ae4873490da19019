use crate::config::{ProcessConfig, ResourceConfig};
use crate::findings::{Category, Finding};
use crate::probes::network::{IcmpOutcome, NetworkProbeResult};
use crate::probes::process::ProcessInfo;
use crate::probes::resources::{human_bytes, ResourceSnapshot};
use crate::probes::ProbeError;

pub fn process_findings(
    scan: &Result<Vec<ProcessInfo>, ProbeError>,
    cfg: &ProcessConfig,
) -> Vec<Finding> {
    let processes = match scan {
        Ok(processes) => processes,
        Err(err) => {
            return vec![Finding::warn(
                Category::Process,
                "unavailable",
                format!("process listing failed: {err}"),
                "process status unknown; check with ps or the task manager",
            )]
        }
    };

    if processes.is_empty() {
        return vec![Finding::critical(
            Category::Process,
            "none",
            format!("no process matches {}", cfg.patterns.join(" / ")),
            "start the trader (python start_trading.py) and watch its startup",
        )];
    }

    let mut out = vec![Finding::ok(
        Category::Process,
        "running",
        format!("{} matching process(es)", processes.len()),
    )];
    for p in processes {
        out.push(Finding::info(
            Category::Process,
            "detail",
            format!(
                "pid {}: cpu {:.1}%, rss {}, up {} | {}",
                p.pid,
                p.cpu_percent,
                human_bytes(p.memory_bytes),
                humantime::format_duration(std::time::Duration::from_secs(p.uptime_secs)),
                p.command
            ),
        ));
        if p.possibly_stuck(cfg) {
            out.push(Finding::warn(
                Category::Process,
                "possibly-stuck",
                format!(
                    "pid {} used {:.2}% CPU after {} minutes of uptime",
                    p.pid,
                    p.cpu_percent,
                    p.uptime_secs / 60
                ),
                "compare with log freshness; a silent idle process is often blocked on I/O",
            ));
        }
    }
    out
}

pub fn resource_findings(
    snapshot: &Result<ResourceSnapshot, ProbeError>,
    cfg: &ResourceConfig,
) -> Vec<Finding> {
    let snapshot = match snapshot {
        Ok(snapshot) => snapshot,
        Err(err) => {
            return vec![Finding::warn(
                Category::Resource,
                "unavailable",
                format!("resource statistics unavailable: {err}"),
                "check load manually (top, free, df)",
            )]
        }
    };

    let mut out = vec![usage(
        "cpu",
        snapshot.cpu_percent,
        cfg.cpu_percent,
        format!("CPU {:.1}%", snapshot.cpu_percent),
        "find the busy process; the trader may be starved",
    )];
    out.push(usage(
        "memory",
        snapshot.memory_percent(),
        cfg.memory_percent,
        format!(
            "memory {:.1}% ({} of {})",
            snapshot.memory_percent(),
            human_bytes(snapshot.memory_used_bytes),
            human_bytes(snapshot.memory_total_bytes)
        ),
        "free memory or add swap before the trader is killed",
    ));
    match &snapshot.disk {
        Some(disk) => out.push(usage(
            "disk",
            disk.percent(),
            cfg.disk_percent,
            format!(
                "disk {:.1}% on {} ({} of {})",
                disk.percent(),
                disk.mount.display(),
                human_bytes(disk.used_bytes),
                human_bytes(disk.total_bytes)
            ),
            "free disk space; a full disk stops log writes",
        )),
        None => out.push(Finding::info(
            Category::Resource,
            "disk",
            "no mounted volume matched the working directory",
        )),
    }
    out
}

fn usage(code: &str, value: f64, limit: f64, message: String, hint: &str) -> Finding {
    if value > limit {
        Finding::warn(
            Category::Resource,
            code,
            format!("{message} exceeds {limit:.0}%"),
            hint,
        )
    } else {
        Finding::ok(Category::Resource, code, message)
    }
}

pub fn network_findings(result: &NetworkProbeResult) -> Vec<Finding> {
    let mut out = Vec::new();
    if result.http_reachable {
        out.push(Finding::ok(
            Category::Network,
            "http",
            format!(
                "{} answered HTTP {} in {} ms",
                result.host,
                result
                    .status_code
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "?".to_string()),
                result.elapsed_ms
            ),
        ));
    } else {
        out.push(Finding::error(
            Category::Network,
            "http",
            format!(
                "{} unreachable over HTTP: {}",
                result.target,
                result.error.as_deref().unwrap_or("unknown error")
            ),
            "check connectivity, DNS and firewall; the exchange API may be down",
        ));
    }

    match &result.icmp {
        IcmpOutcome::Reachable => out.push(Finding::ok(
            Category::Network,
            "icmp",
            format!("{} answers ping", result.host),
        )),
        IcmpOutcome::Unreachable | IcmpOutcome::TimedOut => out.push(Finding::info(
            Category::Network,
            "icmp",
            format!(
                "{} does not answer ping; many servers drop ICMP, so this is not conclusive",
                result.host
            ),
        )),
        IcmpOutcome::Unavailable(reason) => out.push(Finding::info(
            Category::Network,
            "icmp",
            format!("ping unavailable ({reason}); HTTP result is authoritative"),
        )),
        IcmpOutcome::Skipped => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::findings::Severity;
    use crate::probes::process::tests::process;
    use crate::probes::resources::DiskUsage;
    use std::path::PathBuf;

    #[test]
    fn no_process_is_critical_with_start_hint() {
        let out = process_findings(&Ok(Vec::new()), &ProcessConfig::default());
        assert_eq!(out.len(), 1);
        assert!(out[0].is(Category::Process, "none"));
        assert_eq!(out[0].severity, Severity::Critical);
        assert!(out[0].hint.as_deref().unwrap().contains("start the trader"));
    }

    #[test]
    fn denied_listing_is_a_warning() {
        let err = ProbeError::Unavailable {
            facility: "process listing",
            reason: "EPERM".to_string(),
        };
        let out = process_findings(&Err(err), &ProcessConfig::default());
        assert!(out[0].is(Category::Process, "unavailable"));
        assert_eq!(out[0].severity, Severity::Warn);
    }

    #[test]
    fn idle_long_running_process_is_flagged() {
        let scan = Ok(vec![process(10, "python start_trading.py", 0.0, 7200)]);
        let out = process_findings(&scan, &ProcessConfig::default());
        assert!(out[0].is(Category::Process, "running"));
        assert!(out.iter().any(|f| f.is(Category::Process, "possibly-stuck")));
    }

    #[test]
    fn thresholds_raise_resource_warnings() {
        let snap = ResourceSnapshot {
            cpu_percent: 95.0,
            memory_total_bytes: 100,
            memory_used_bytes: 50,
            disk: Some(DiskUsage {
                mount: PathBuf::from("/"),
                total_bytes: 100,
                used_bytes: 91,
            }),
        };
        let out = resource_findings(&Ok(snap), &ResourceConfig::default());
        let sev = |code: &str| out.iter().find(|f| f.is(Category::Resource, code)).unwrap().severity;
        assert_eq!(sev("cpu"), Severity::Warn);
        assert_eq!(sev("memory"), Severity::Ok);
        assert_eq!(sev("disk"), Severity::Warn);
    }

    fn probe_result(http: bool, icmp: IcmpOutcome) -> NetworkProbeResult {
        NetworkProbeResult {
            target: "https://testnet.zklighter.elliot.ai".to_string(),
            host: "testnet.zklighter.elliot.ai".to_string(),
            http_reachable: http,
            status_code: http.then_some(404),
            elapsed_ms: 400,
            error: (!http).then(|| "timeout".to_string()),
            icmp,
        }
    }

    #[test]
    fn http_404_with_blocked_ping_is_ok() {
        let out = network_findings(&probe_result(true, IcmpOutcome::TimedOut));
        assert_eq!(out[0].severity, Severity::Ok);
        assert!(out[0].message.contains("404"));
        assert_eq!(out[1].severity, Severity::Info);
        assert!(out[1].message.contains("not conclusive"));
    }

    #[test]
    fn http_failure_is_an_error_with_reason() {
        let out = network_findings(&probe_result(false, IcmpOutcome::Skipped));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].severity, Severity::Error);
        assert!(out[0].message.contains("timeout"));
    }
}
