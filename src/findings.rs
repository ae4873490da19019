use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Ok,
    Info,
    Warn,
    Error,
    Critical,
}

impl Severity {
    pub fn tag(self) -> &'static str {
        match self {
            Severity::Ok => "OK",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }

    pub fn is_failure(self) -> bool {
        self >= Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Process,
    Log,
    Config,
    Network,
    Resource,
    Startup,
    Deps,
    Internal,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Process => "process",
            Category::Log => "log",
            Category::Config => "config",
            Category::Network => "network",
            Category::Resource => "resource",
            Category::Startup => "startup",
            Category::Deps => "deps",
            Category::Internal => "internal",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation produced by an analyzer or a command.
///
/// Anything at `WARN` or above is built through a constructor that takes a
/// remediation hint, so the operator always gets a next step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub category: Category,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub failed_check: bool,
    /// Raw log lines or command output backing the finding.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<String>,
}

impl Finding {
    fn build(
        severity: Severity,
        category: Category,
        code: impl Into<String>,
        message: impl Into<String>,
        hint: Option<String>,
    ) -> Self {
        Self {
            severity,
            category,
            code: code.into(),
            message: message.into(),
            hint,
            failed_check: false,
            evidence: Vec::new(),
        }
    }

    pub fn ok(category: Category, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(Severity::Ok, category, code, message, None)
    }

    pub fn info(category: Category, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::build(Severity::Info, category, code, message, None)
    }

    pub fn warn(
        category: Category,
        code: impl Into<String>,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self::build(Severity::Warn, category, code, message, Some(hint.into()))
    }

    pub fn error(
        category: Category,
        code: impl Into<String>,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self::build(Severity::Error, category, code, message, Some(hint.into()))
    }

    pub fn critical(
        category: Category,
        code: impl Into<String>,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self::build(Severity::Critical, category, code, message, Some(hint.into()))
    }

    /// A failed checklist item: `ERROR` severity, rendered as `[FAIL]`.
    pub fn failed(
        category: Category,
        code: impl Into<String>,
        message: impl Into<String>,
        hint: impl Into<String>,
    ) -> Self {
        Self {
            failed_check: true,
            ..Self::error(category, code, message, hint)
        }
    }

    pub fn with_evidence(mut self, evidence: Vec<String>) -> Self {
        self.evidence = evidence;
        self
    }

    pub fn id(&self) -> String {
        format!("{}/{}", self.category, self.code)
    }

    pub fn is(&self, category: Category, code: &str) -> bool {
        self.category == category && self.code == code
    }

    pub fn tag(&self) -> &'static str {
        if self.failed_check {
            "FAIL"
        } else {
            self.severity.tag()
        }
    }
}

pub fn worst_severity(findings: &[Finding]) -> Option<Severity> {
    findings.iter().map(|f| f.severity).max()
}

pub fn has_failures(findings: &[Finding]) -> bool {
    findings.iter().any(|f| f.severity.is_failure())
}

pub fn contains(findings: &[Finding], category: Category, code: &str) -> bool {
    findings.iter().any(|f| f.is(category, code))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Healthy,
    Degraded,
    Stalled,
    Down,
    Unknown,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Healthy => "HEALTHY",
            Verdict::Degraded => "DEGRADED",
            Verdict::Stalled => "STALLED",
            Verdict::Down => "DOWN",
            Verdict::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnosis {
    pub verdict: Verdict,
    pub remediation: Vec<String>,
    pub findings: Vec<Finding>,
}

impl Diagnosis {
    pub fn exit_code(&self) -> u8 {
        exit_code(&self.findings)
    }
}

pub fn exit_code(findings: &[Finding]) -> u8 {
    if worst_severity(findings).is_some_and(Severity::is_failure) {
        1
    } else {
        0
    }
}
