pub mod log;
pub mod network;
pub mod process;
pub mod resources;
pub mod trading_config;

use std::process::{Output, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("{facility} unavailable: {reason}")]
    Unavailable {
        facility: &'static str,
        reason: String,
    },
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("cannot parse {path}: {reason}")]
    Parse { path: String, reason: String },
    #[error("{target} timed out after {secs}s")]
    Timeout { target: String, secs: u64 },
    #[error("cancelled")]
    Cancelled,
    #[error("unexpected probe failure: {0}")]
    Unexpected(String),
}

impl ProbeError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProbeError::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

/// Run an external read-only command with a hard deadline. The child is
/// killed if the deadline passes.
pub async fn run_command(
    program: &str,
    args: &[&str],
    timeout: Duration,
) -> Result<Output, ProbeError> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|err| ProbeError::Unavailable {
        facility: "external command",
        reason: format!("{program}: {err}"),
    })?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            debug!(program, status = ?output.status.code(), "external command finished");
            Ok(output)
        }
        Ok(Err(err)) => Err(ProbeError::Unexpected(format!("{program}: {err}"))),
        Err(_elapsed) => Err(ProbeError::Timeout {
            target: program.to_string(),
            secs: timeout.as_secs(),
        }),
    }
}

/// Console tools on Windows may answer in UTF-16; everything else is UTF-8
/// with replacement.
pub fn decode_output(bytes: &[u8]) -> String {
    if let Ok(utf8) = std::str::from_utf8(bytes) {
        return utf8.to_string();
    }

    if bytes.len() >= 2 && bytes.len() % 2 == 0 {
        let u16buf: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        if let Ok(s) = String::from_utf16(&u16buf) {
            return s;
        }
    }

    String::from_utf8_lossy(bytes).to_string()
}
