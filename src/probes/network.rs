use crate::config::NetworkConfig;
use crate::probes::{decode_output, run_command, ProbeError};
use reqwest::{Client, Url};
use std::error::Error as _;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IcmpOutcome {
    Reachable,
    Unreachable,
    TimedOut,
    Unavailable(String),
    Skipped,
}

#[derive(Debug, Clone)]
pub struct NetworkProbeResult {
    pub target: String,
    pub host: String,
    pub http_reachable: bool,
    pub status_code: Option<u16>,
    pub elapsed_ms: u64,
    pub error: Option<String>,
    pub icmp: IcmpOutcome,
}

/// HEAD the target (authoritative) and optionally ping its host
/// (informational). Any HTTP status counts as reachable.
pub async fn probe_url(
    target: &str,
    cfg: &NetworkConfig,
    ping: bool,
) -> Result<NetworkProbeResult, ProbeError> {
    let url = Url::parse(target).map_err(|err| ProbeError::Parse {
        path: target.to_string(),
        reason: err.to_string(),
    })?;
    let host = url
        .host_str()
        .ok_or_else(|| ProbeError::Parse {
            path: target.to_string(),
            reason: "url has no host".to_string(),
        })?
        .to_string();

    let client = Client::builder()
        .timeout(Duration::from_secs(cfg.http_timeout_secs))
        .build()
        .map_err(|err| ProbeError::Unexpected(format!("http client: {err}")))?;

    let start = Instant::now();
    let (http_reachable, status_code, error) = match client.head(url).send().await {
        Ok(resp) => (true, Some(resp.status().as_u16()), None),
        Err(err) => {
            warn!(url = %target, error = %err, "http probe failed");
            (false, None, Some(classify_http_error(&err)))
        }
    };
    let elapsed_ms = start.elapsed().as_millis() as u64;
    debug!(url = %target, http_reachable, ?status_code, elapsed_ms, "http probe");

    let icmp = if ping {
        ping_host(&host, cfg).await
    } else {
        IcmpOutcome::Skipped
    };

    Ok(NetworkProbeResult {
        target: target.to_string(),
        host,
        http_reachable,
        status_code,
        elapsed_ms,
        error,
        icmp,
    })
}

fn classify_http_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        return "timeout".to_string();
    }
    let chain = error_chain(err).to_lowercase();
    if chain.contains("dns") || chain.contains("lookup") || chain.contains("resolve") {
        return format!("dns failure: {chain}");
    }
    if chain.contains("refused") {
        return "connection refused".to_string();
    }
    if err.is_connect() {
        return format!("connect failed: {chain}");
    }
    chain
}

fn error_chain(err: &reqwest::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}

async fn ping_host(host: &str, cfg: &NetworkConfig) -> IcmpOutcome {
    let count = cfg.ping_count.max(1).to_string();
    #[cfg(windows)]
    let args = vec!["-n", count.as_str(), "-w", "2000", host];
    #[cfg(not(windows))]
    let args = vec!["-c", count.as_str(), "-W", "2", host];

    match run_command("ping", &args, Duration::from_secs(cfg.ping_timeout_secs)).await {
        Ok(output) if output.status.success() => IcmpOutcome::Reachable,
        Ok(output) => {
            debug!(
                host,
                stdout = %decode_output(&output.stdout).trim(),
                "ping reported no replies"
            );
            IcmpOutcome::Unreachable
        }
        Err(ProbeError::Timeout { .. }) => IcmpOutcome::TimedOut,
        Err(err) => IcmpOutcome::Unavailable(err.to_string()),
    }
}
