use crate::config::StartupMarkers;
use crate::findings::{Category, Finding};
use regex::RegexSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Engine,
    DataManager,
    Markets,
    OrderManager,
    OrderManagerReady,
    MainLoop,
}

impl Phase {
    pub const ALL: [Phase; 6] = [
        Phase::Engine,
        Phase::DataManager,
        Phase::Markets,
        Phase::OrderManager,
        Phase::OrderManagerReady,
        Phase::MainLoop,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Phase::Engine => "engine",
            Phase::DataManager => "data-manager",
            Phase::Markets => "markets",
            Phase::OrderManager => "order-manager",
            Phase::OrderManagerReady => "order-manager-ready",
            Phase::MainLoop => "main-loop",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Phase::Engine => "engine starting",
            Phase::DataManager => "init data manager",
            Phase::Markets => "markets discovered",
            Phase::OrderManager => "init order manager",
            Phase::OrderManagerReady => "order manager ready",
            Phase::MainLoop => "entered main loop",
        }
    }

    pub fn hint(self) -> &'static str {
        match self {
            Phase::Engine => "trader never started or the log path is wrong",
            Phase::DataManager => "data manager setup failed; check the exchange SDK install",
            Phase::Markets => "network or API error at startup; check lighter.base_url",
            Phase::OrderManager => "order manager was never created; check the account settings",
            Phase::OrderManagerReady => {
                "client verification failed or network issue; check the API key"
            }
            Phase::MainLoop => "strategy setup failed before the main loop; check strategies",
        }
    }
}

/// Which phases the latest startup attempt reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StartupReport {
    pub reached: [bool; 6],
    pub attempts: u32,
}

impl StartupReport {
    /// First phase, in order, whose marker never appeared.
    pub fn stuck_phase(&self) -> Option<Phase> {
        Phase::ALL
            .into_iter()
            .zip(self.reached)
            .find(|(_, reached)| !reached)
            .map(|(phase, _)| phase)
    }

    pub fn findings(&self) -> Vec<Finding> {
        let mut out: Vec<Finding> = Phase::ALL
            .into_iter()
            .zip(self.reached)
            .map(|(phase, reached)| {
                if reached {
                    Finding::ok(Category::Startup, phase.code(), phase.label())
                } else {
                    Finding::failed(
                        Category::Startup,
                        phase.code(),
                        format!("{}: marker not found", phase.label()),
                        phase.hint(),
                    )
                }
            })
            .collect();

        out.push(match self.stuck_phase() {
            Some(phase) => Finding::error(
                Category::Startup,
                "incomplete",
                format!(
                    "startup stopped before '{}' ({} attempt(s) in log)",
                    phase.label(),
                    self.attempts
                ),
                phase.hint(),
            ),
            None => Finding::ok(
                Category::Startup,
                "completed",
                format!("all startup phases reached ({} attempt(s) in log)", self.attempts),
            ),
        });
        out
    }
}

/// Streams log lines and tracks the startup phases of the most recent
/// attempt. Every engine-start marker begins a new attempt.
pub struct StartupTracker {
    phases: Vec<RegexSet>,
    report: StartupReport,
}

impl StartupTracker {
    pub fn new(markers: &StartupMarkers) -> Result<Self, regex::Error> {
        let phases = markers
            .by_phase_name()
            .into_iter()
            .map(|(_, synonyms)| RegexSet::new(synonyms))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            phases,
            report: StartupReport::default(),
        })
    }

    pub fn observe(&mut self, line: &str) {
        for (idx, set) in self.phases.iter().enumerate() {
            if !set.is_match(line) {
                continue;
            }
            if idx == 0 {
                self.report.reached = [false; 6];
                self.report.attempts += 1;
            }
            self.report.reached[idx] = true;
        }
    }

    pub fn finish(self) -> StartupReport {
        self.report
    }
}
