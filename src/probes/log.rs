//! Read-only access to the trader's log file.
//!
//! Files are only ever opened for reading; nothing here creates, truncates or
//! rotates the log.

use crate::probes::ProbeError;
use chrono::{DateTime, Local, NaiveDateTime};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

/// Timestamp layout of the trader's log lines:
/// `YYYY-MM-DD HH:MM:SS - <logger> - <LEVEL> - <message>`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const FIELD_SEPARATOR: &str = " - ";
const TAIL_CHUNK_BYTES: u64 = 8 * 1024;
/// Upper bound for bytes read when echoing freshly appended lines.
const NEW_BYTES_WINDOW: u64 = 64 * 1024;

#[derive(Debug, Clone)]
pub struct LogFileStat {
    pub path: PathBuf,
    pub exists: bool,
    pub size_bytes: u64,
    pub modified: Option<SystemTime>,
    pub minutes_since_update: Option<f64>,
}

impl LogFileStat {
    pub fn probe(path: &Path, now: SystemTime) -> Self {
        let path = absolute(path);
        let meta = match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => {
                tracing::warn!(path = %path.display(), "log path is not a regular file");
                return Self::missing(path);
            }
            Err(err) => {
                tracing::debug!(path = %path.display(), error = %err, "log stat failed");
                return Self::missing(path);
            }
        };

        let modified = meta.modified().ok();
        let minutes_since_update = modified.map(|mtime| minutes_between(mtime, now));
        Self {
            path,
            exists: true,
            size_bytes: meta.len(),
            modified,
            minutes_since_update,
        }
    }

    pub fn missing(path: PathBuf) -> Self {
        Self {
            path,
            exists: false,
            size_bytes: 0,
            modified: None,
            minutes_since_update: None,
        }
    }

    pub fn modified_local(&self) -> Option<DateTime<Local>> {
        self.modified.map(DateTime::<Local>::from)
    }

    /// Read the last `lines` lines. `None` when the file does not exist.
    pub fn tail(&self, lines: usize) -> Option<Result<LogTail, ProbeError>> {
        if !self.exists {
            return None;
        }
        Some(read_tail(&self.path, lines))
    }
}

/// `(now - then)` in minutes; negative when `then` lies in the future.
pub fn minutes_between(then: SystemTime, now: SystemTime) -> f64 {
    match now.duration_since(then) {
        Ok(elapsed) => elapsed.as_secs_f64() / 60.0,
        Err(err) => -(err.duration().as_secs_f64() / 60.0),
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

#[derive(Debug, Clone, Default)]
pub struct LogTail {
    pub lines: Vec<String>,
}

fn io_error(path: &Path, source: std::io::Error) -> ProbeError {
    ProbeError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Read backwards from the end in fixed chunks until `n` complete lines are
/// buffered. The final line may be partial.
pub fn read_tail(path: &Path, n: usize) -> Result<LogTail, ProbeError> {
    let mut file = File::open(path).map_err(|err| io_error(path, err))?;
    let len = file.metadata().map_err(|err| io_error(path, err))?.len();
    read_tail_from(&mut file, path, 0, len, n)
}

/// Last `n` lines among the bytes appended after `from`.
pub fn read_appended(path: &Path, from: u64, n: usize) -> Result<LogTail, ProbeError> {
    let mut file = File::open(path).map_err(|err| io_error(path, err))?;
    let len = file.metadata().map_err(|err| io_error(path, err))?.len();
    let floor = from.max(len.saturating_sub(NEW_BYTES_WINDOW));
    read_tail_from(&mut file, path, floor, len, n)
}

fn read_tail_from(
    file: &mut File,
    path: &Path,
    floor: u64,
    end: u64,
    n: usize,
) -> Result<LogTail, ProbeError> {
    if n == 0 || end <= floor {
        return Ok(LogTail::default());
    }

    let mut pos = end;
    let mut buf: Vec<u8> = Vec::new();
    while pos > floor {
        let step = TAIL_CHUNK_BYTES.min(pos - floor);
        pos -= step;
        file.seek(SeekFrom::Start(pos))
            .map_err(|err| io_error(path, err))?;
        let mut chunk = vec![0_u8; step as usize];
        file.read_exact(&mut chunk)
            .map_err(|err| io_error(path, err))?;
        chunk.extend_from_slice(&buf);
        buf = chunk;
        if buf.iter().filter(|b| **b == b'\n').count() > n {
            break;
        }
    }

    let text = String::from_utf8_lossy(&buf);
    let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
    // The first buffered line is cut mid-way unless we started at a line boundary.
    if pos > 0 && !lines.is_empty() && !starts_at_line_boundary(file, pos) {
        lines.remove(0);
    }
    let start = lines.len().saturating_sub(n);
    lines.drain(..start);
    Ok(LogTail { lines })
}

fn starts_at_line_boundary(file: &mut File, pos: u64) -> bool {
    let mut prev = [0_u8; 1];
    file.seek(SeekFrom::Start(pos - 1)).is_ok()
        && file.read_exact(&mut prev).is_ok()
        && prev[0] == b'\n'
}

/// Stream every line of the file through `visit`, decoding invalid UTF-8
/// with replacement. Memory stays bounded by the longest line. The scan
/// stops with [`ProbeError::Cancelled`] once `cancel` is raised.
pub fn for_each_line(
    path: &Path,
    cancel: &AtomicBool,
    mut visit: impl FnMut(&str),
) -> Result<u64, ProbeError> {
    let file = File::open(path).map_err(|err| io_error(path, err))?;
    let mut reader = BufReader::new(file);
    let mut raw = Vec::new();
    let mut count = 0_u64;
    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err(ProbeError::Cancelled);
        }
        raw.clear();
        let read = reader
            .read_until(b'\n', &mut raw)
            .map_err(|err| io_error(path, err))?;
        if read == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&raw);
        visit(line.trim_end_matches(['\n', '\r']));
        count += 1;
    }
    Ok(count)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineLevel {
    Info,
    Warning,
    Error,
}

impl LineLevel {
    /// Level by literal token anywhere in the line, whatever its layout.
    pub fn classify(line: &str) -> Option<Self> {
        if line.contains(" ERROR ") {
            Some(LineLevel::Error)
        } else if line.contains(" WARNING ") {
            Some(LineLevel::Warning)
        } else if line.contains(" INFO ") {
            Some(LineLevel::Info)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine<'a> {
    pub timestamp: NaiveDateTime,
    pub logger: &'a str,
    pub level: &'a str,
    pub message: &'a str,
}

/// Strict parse of the documented layout. Lines that do not fit still count
/// towards level totals via [`LineLevel::classify`], but carry no timestamp.
pub fn parse_line(line: &str) -> Option<ParsedLine<'_>> {
    let mut fields = line.splitn(4, FIELD_SEPARATOR);
    let timestamp = fields.next()?;
    let logger = fields.next()?;
    let level = fields.next()?;
    let message = fields.next()?;
    let timestamp = NaiveDateTime::parse_from_str(timestamp.trim(), TIMESTAMP_FORMAT).ok()?;
    Some(ParsedLine {
        timestamp,
        logger,
        level,
        message,
    })
}
