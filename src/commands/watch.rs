//! `log-watch`: a tail-like activity monitor, one status line per tick.

use crate::config::WatchConfig;
use crate::findings::Severity;
use crate::probes::log::{read_appended, LogFileStat};
use crate::probes::resources::human_bytes;
use crate::report::Reporter;
use chrono::Local;
use std::io::Write;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tokio::time::MissedTickBehavior;

const ECHOED_NEW_LINES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Tick {
    Missing,
    Baseline { size: u64 },
    Grew { from: u64, delta: u64 },
    Shrank { from: u64, to: u64 },
    Stale { minutes: f64, hint: bool },
}

#[derive(Debug, Default)]
pub struct WatchState {
    last_size: Option<u64>,
    stale_ticks: u32,
}

impl WatchState {
    pub fn observe(&mut self, stat: &LogFileStat, hint_after: u32) -> Tick {
        if !stat.exists {
            self.last_size = None;
            self.stale_ticks = 0;
            return Tick::Missing;
        }
        let size = stat.size_bytes;
        let Some(last) = self.last_size.replace(size) else {
            return Tick::Baseline { size };
        };

        if size > last {
            self.stale_ticks = 0;
            Tick::Grew {
                from: last,
                delta: size - last,
            }
        } else if size < last {
            self.stale_ticks = 0;
            Tick::Shrank { from: last, to: size }
        } else {
            self.stale_ticks += 1;
            let hint = hint_after > 0 && self.stale_ticks >= hint_after;
            if hint {
                self.stale_ticks = 0;
            }
            Tick::Stale {
                minutes: stat.minutes_since_update.unwrap_or(0.0),
                hint,
            }
        }
    }
}

pub fn stale_severity(minutes: f64) -> Severity {
    if minutes < 1.0 {
        Severity::Ok
    } else if minutes < 5.0 {
        Severity::Warn
    } else if minutes < 10.0 {
        Severity::Error
    } else {
        Severity::Critical
    }
}

/// Poll the log until interrupted, or for `max_ticks` ticks.
pub async fn run<W: Write>(
    log_path: &Path,
    cfg: &WatchConfig,
    interval: Duration,
    max_ticks: Option<u64>,
    out: &mut Reporter<W>,
) {
    out.section("Log watch");
    out.kv("path", log_path.display());
    out.kv("interval", humantime::format_duration(interval));
    out.info("press Ctrl+C to stop");
    out.flush();

    let mut state = WatchState::default();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut ticks = 0_u64;

    loop {
        if max_ticks.is_some_and(|max| ticks >= max) {
            break;
        }
        ticker.tick().await;
        ticks += 1;

        let stat = LogFileStat::probe(log_path, SystemTime::now());
        let tick = state.observe(&stat, cfg.hint_after_ticks);
        report_tick(&stat, tick, out);
        out.flush();
    }
}

fn report_tick<W: Write>(stat: &LogFileStat, tick: Tick, out: &mut Reporter<W>) {
    let time = Local::now().format("%H:%M:%S");
    match tick {
        Tick::Missing => out.error(&format!("{time} log file not found")),
        Tick::Baseline { size } => {
            let since = stat
                .minutes_since_update
                .map(|m| format!(", last update {m:.0} min ago"))
                .unwrap_or_default();
            out.info(&format!("{time} watching, size {}{since}", human_bytes(size)));
        }
        Tick::Grew { from, delta } => {
            out.ok(&format!(
                "{time} +{} (now {})",
                human_bytes(delta),
                human_bytes(stat.size_bytes)
            ));
            match read_appended(&stat.path, from, ECHOED_NEW_LINES) {
                Ok(tail) => {
                    for line in &tail.lines {
                        out.bullet(line);
                    }
                }
                Err(err) => out.bullet(&format!("could not read new lines: {err}")),
            }
        }
        Tick::Shrank { from, to } => out.warn(&format!(
            "{time} log truncated or rotated ({} -> {})",
            human_bytes(from),
            human_bytes(to)
        )),
        Tick::Stale { minutes, hint } => {
            out.line(
                stale_severity(minutes),
                &format!("{time} no update ({minutes:.0} minutes)"),
            );
            if hint {
                out.bullet("the log has not moved for a while; run `quantdiag health`");
            }
        }
    }
}
