//! Line-oriented operator output with stable severity prefixes.

use crate::findings::{Diagnosis, Finding, Severity, Verdict};
use std::fmt::Display;
use std::io::{self, Write};

const RULE_WIDTH: usize = 60;

pub struct Reporter<W: Write> {
    out: W,
}

impl Reporter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn section(&mut self, title: &str) {
        let _ = writeln!(self.out);
        let _ = writeln!(self.out, "{}", "=".repeat(RULE_WIDTH));
        let _ = writeln!(self.out, "  {title}");
        let _ = writeln!(self.out, "{}", "=".repeat(RULE_WIDTH));
    }

    pub fn line(&mut self, severity: Severity, message: &str) {
        let _ = writeln!(self.out, "[{}] {message}", severity.tag());
    }

    pub fn info(&mut self, message: &str) {
        self.line(Severity::Info, message);
    }

    pub fn ok(&mut self, message: &str) {
        self.line(Severity::Ok, message);
    }

    pub fn warn(&mut self, message: &str) {
        self.line(Severity::Warn, message);
    }

    pub fn error(&mut self, message: &str) {
        self.line(Severity::Error, message);
    }

    pub fn kv(&mut self, label: &str, value: impl Display) {
        let _ = writeln!(self.out, "  {label:<18} {value}");
    }

    /// Verbatim text, no prefix.
    pub fn raw(&mut self, text: &str) {
        let _ = write!(self.out, "{text}");
    }

    pub fn bullet(&mut self, text: &str) {
        let _ = writeln!(self.out, "    - {text}");
    }

    pub fn finding(&mut self, finding: &Finding) {
        let _ = writeln!(
            self.out,
            "[{}] {}: {}",
            finding.tag(),
            finding.id(),
            finding.message
        );
        for line in &finding.evidence {
            self.bullet(line);
        }
        if let Some(hint) = &finding.hint {
            let _ = writeln!(self.out, "      hint: {hint}");
        }
    }

    /// Print every finding at or above `min`, in order.
    pub fn findings(&mut self, findings: &[Finding], min: Severity) {
        for finding in findings.iter().filter(|f| f.severity >= min || f.failed_check) {
            self.finding(finding);
        }
    }

    pub fn diagnosis(&mut self, diagnosis: &Diagnosis) {
        self.section("Diagnosis");
        let severity = match diagnosis.verdict {
            Verdict::Healthy => Severity::Ok,
            Verdict::Degraded | Verdict::Unknown => Severity::Warn,
            Verdict::Stalled | Verdict::Down => Severity::Critical,
        };
        self.line(severity, &format!("verdict: {}", diagnosis.verdict));
        if diagnosis.remediation.is_empty() {
            self.ok("no action needed");
            return;
        }
        let _ = writeln!(self.out, "  next steps:");
        for (idx, step) in diagnosis.remediation.iter().enumerate() {
            let _ = writeln!(self.out, "    {}. {step}", idx + 1);
        }
    }

    pub fn flush(&mut self) {
        let _ = self.out.flush();
    }
}

/// Toolkit-internal problems go to stderr and never abort the command.
pub fn internal(message: &str) {
    tracing::debug!(message, "internal toolkit error");
    let _ = writeln!(io::stderr().lock(), "[internal] {message}");
}
