//! `dependency-check`: can the trader's environment run it? Never installs
//! anything.

use crate::commands::Context;
use crate::config::{Config, DependencyConfig, DependencyKind, DependencySpec};
use crate::findings::{has_failures, Category, Finding, Severity};
use crate::probes::{decode_output, run_command};
use crate::report::Reporter;
use std::cmp::Ordering;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use sysinfo::{System, SystemExt};

const IMPORT_TIMEOUT: Duration = Duration::from_secs(20);
const VERSION_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Present { version: Option<String> },
    Missing { reason: String },
    ProbeFailed(String),
}

pub async fn run<W: Write>(ctx: &Context, example: bool, out: &mut Reporter<W>) -> Vec<Finding> {
    if example {
        out.raw(Config::trading_example_yaml());
        out.flush();
        return Vec::new();
    }

    let cfg = &ctx.config.dependencies;
    let mut findings = Vec::new();

    out.section("Platform");
    let platform = platform_finding();
    out.finding(&platform);
    findings.push(platform);

    out.section("Interpreter");
    let interpreter = check_interpreter(cfg).await;
    out.findings(&interpreter, Severity::Ok);
    let interpreter_ok = !has_failures(&interpreter);
    findings.extend(interpreter);

    for (title, kind) in [
        ("Core packages", DependencyKind::Core),
        ("Optional packages", DependencyKind::Optional),
    ] {
        out.section(title);
        for spec in cfg.packages.iter().filter(|p| p.kind == kind) {
            let outcome = if interpreter_ok {
                probe_import(&cfg.interpreter, spec.import_name()).await
            } else {
                ImportOutcome::ProbeFailed("interpreter unavailable".to_string())
            };
            let finding = classify(spec, &outcome);
            out.finding(&finding);
            findings.push(finding);
        }
    }

    out.section("Project files");
    let files = check_project_files(&ctx.project_dir, cfg);
    out.findings(&files, Severity::Ok);
    findings.extend(files);

    out.section("Summary");
    if has_failures(&findings) {
        out.error("some checks failed");
        out.bullet("install missing core packages: pip install -r requirements-minimal.txt");
        out.bullet(&format!(
            "use Python {} or newer",
            cfg.min_interpreter_version
        ));
        out.bullet("run from the project root directory");
    } else {
        out.ok("all checks passed");
        out.bullet("review config.yaml, then start the trader");
    }
    out.flush();
    findings
}

fn platform_finding() -> Finding {
    let system = System::new();
    let name = system.name().unwrap_or_else(|| std::env::consts::OS.to_string());
    let version = system
        .long_os_version()
        .or_else(|| system.os_version())
        .unwrap_or_default();
    let kernel = system
        .kernel_version()
        .map(|k| format!(", kernel {k}"))
        .unwrap_or_default();
    Finding::info(
        Category::Deps,
        "platform",
        format!(
            "{name} {version} ({}){kernel}",
            std::env::consts::ARCH
        ),
    )
}

async fn check_interpreter(cfg: &DependencyConfig) -> Vec<Finding> {
    let output = match run_command(&cfg.interpreter, &["--version"], VERSION_TIMEOUT).await {
        Ok(output) => output,
        Err(err) => {
            return vec![Finding::error(
                Category::Deps,
                "interpreter-missing",
                format!("cannot run {}: {err}", cfg.interpreter),
                format!(
                    "install Python {} or newer, or set dependencies.interpreter",
                    cfg.min_interpreter_version
                ),
            )]
        }
    };

    // Older interpreters print the version on stderr.
    let text = format!(
        "{} {}",
        decode_output(&output.stdout),
        decode_output(&output.stderr)
    );
    let Some(version) = parse_interpreter_version(&text) else {
        return vec![Finding::warn(
            Category::Deps,
            "interpreter",
            format!("could not read a version from `{} --version`", cfg.interpreter),
            "check the interpreter manually",
        )];
    };

    if compare_versions(&version, &cfg.min_interpreter_version) == Ordering::Less {
        vec![Finding::warn(
            Category::Deps,
            "interpreter-outdated",
            format!(
                "{} {version} is older than {}",
                cfg.interpreter, cfg.min_interpreter_version
            ),
            format!("upgrade to Python {} or newer", cfg.min_interpreter_version),
        )]
    } else {
        vec![Finding::ok(
            Category::Deps,
            "interpreter",
            format!("{} {version}", cfg.interpreter),
        )]
    }
}

/// Import the module in a child interpreter and print its `__version__`.
/// Import names are validated at settings load, so they are safe to inline.
async fn probe_import(interpreter: &str, import: &str) -> ImportOutcome {
    let script = format!("import {import}; print(getattr({import}, '__version__', ''))");
    match run_command(interpreter, &["-c", &script], IMPORT_TIMEOUT).await {
        Ok(output) if output.status.success() => {
            let stdout = decode_output(&output.stdout);
            let version = stdout
                .lines()
                .map(str::trim)
                .rfind(|l| !l.is_empty())
                .map(str::to_string);
            ImportOutcome::Present { version }
        }
        Ok(output) => {
            let stderr = decode_output(&output.stderr);
            let reason = stderr
                .lines()
                .map(str::trim)
                .rfind(|l| !l.is_empty())
                .unwrap_or("import failed")
                .to_string();
            ImportOutcome::Missing { reason }
        }
        Err(err) => ImportOutcome::ProbeFailed(err.to_string()),
    }
}

pub fn classify(spec: &DependencySpec, outcome: &ImportOutcome) -> Finding {
    let core = spec.kind == DependencyKind::Core;
    match outcome {
        ImportOutcome::Present { version } => {
            let shown = version.as_deref().unwrap_or("unknown");
            match (version, &spec.min_version) {
                (Some(found), Some(min)) if compare_versions(found, min) == Ordering::Less => {
                    Finding::warn(
                        Category::Deps,
                        format!("{}-outdated", spec.name),
                        format!("{} {found} is older than {min}", spec.name),
                        format!("pip install -U \"{}>={min}\"", spec.name),
                    )
                }
                _ => Finding::ok(
                    Category::Deps,
                    spec.name.clone(),
                    format!("{:<15} {shown:<10} {}", spec.name, spec.description),
                ),
            }
        }
        ImportOutcome::Missing { reason } if core => Finding::error(
            Category::Deps,
            spec.name.clone(),
            format!("{} missing ({reason})", spec.name),
            format!("pip install {}", spec.name),
        ),
        ImportOutcome::Missing { .. } => Finding::info(
            Category::Deps,
            spec.name.clone(),
            format!("{} not installed (optional: {})", spec.name, spec.description),
        ),
        ImportOutcome::ProbeFailed(reason) if core => Finding::warn(
            Category::Deps,
            spec.name.clone(),
            format!("could not check {}: {reason}", spec.name),
            format!("check manually: python -c \"import {}\"", spec.import_name()),
        ),
        ImportOutcome::ProbeFailed(reason) => Finding::info(
            Category::Deps,
            spec.name.clone(),
            format!("could not check optional {}: {reason}", spec.name),
        ),
    }
}

pub fn check_project_files(base: &Path, cfg: &DependencyConfig) -> Vec<Finding> {
    let mut out = Vec::new();
    for file in &cfg.required_files {
        let present = base.join(file).is_file();
        out.push(if present {
            Finding::ok(Category::Deps, "required-file", file.display().to_string())
        } else {
            Finding::error(
                Category::Deps,
                "required-file",
                format!("{} not found", file.display()),
                "run from the project root directory",
            )
        });
    }
    for file in &cfg.optional_files {
        let present = base.join(file).is_file();
        out.push(if present {
            Finding::ok(Category::Deps, "optional-file", file.display().to_string())
        } else {
            Finding::info(
                Category::Deps,
                "optional-file",
                format!("{} not found (optional)", file.display()),
            )
        });
    }
    out
}

/// "Python 3.11.4" -> "3.11.4"
pub fn parse_interpreter_version(text: &str) -> Option<String> {
    text.split_whitespace()
        .find(|word| word.chars().next().is_some_and(|c| c.is_ascii_digit()) && word.contains('.'))
        .map(str::to_string)
}

/// Compare the leading numeric components; suffixes such as `rc1` are
/// ignored and missing components count as zero.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let left = numeric_parts(a);
    let right = numeric_parts(b);
    let len = left.len().max(right.len());
    for idx in 0..len {
        let l = left.get(idx).copied().unwrap_or(0);
        let r = right.get(idx).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn numeric_parts(version: &str) -> Vec<u64> {
    version
        .trim()
        .trim_start_matches(['v', 'V'])
        .split('.')
        .map_while(|part| {
            let digits: String = part.chars().take_while(char::is_ascii_digit).collect();
            digits.parse().ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn spec(name: &str, kind: DependencyKind, min: Option<&str>) -> DependencySpec {
        DependencySpec {
            name: name.to_string(),
            import: None,
            kind,
            min_version: min.map(str::to_string),
            description: "test".to_string(),
        }
    }

    #[test]
    fn compares_versions_numerically() {
        assert_eq!(compare_versions("1.10.0", "1.9.0"), Ordering::Greater);
        assert_eq!(compare_versions("1.5", "1.5.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.22.4", "1.23.0"), Ordering::Less);
        assert_eq!(compare_versions("2.0.0rc1", "2.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("3.8.10", "3.9"), Ordering::Less);
    }

    #[test]
    fn reads_interpreter_version() {
        assert_eq!(parse_interpreter_version("Python 3.11.4\n").as_deref(), Some("3.11.4"));
        assert_eq!(parse_interpreter_version("nothing here"), None);
    }

    #[test]
    fn missing_core_is_error_optional_is_info() {
        let missing = ImportOutcome::Missing {
            reason: "No module named 'lighter'".to_string(),
        };
        let core = classify(&spec("lighter", DependencyKind::Core, None), &missing);
        assert_eq!(core.severity, Severity::Error);
        assert!(core.hint.is_some());

        let optional = classify(&spec("plotly", DependencyKind::Optional, None), &missing);
        assert_eq!(optional.severity, Severity::Info);
    }

    #[test]
    fn old_version_is_outdated() {
        let present = ImportOutcome::Present {
            version: Some("1.22.4".to_string()),
        };
        let f = classify(&spec("numpy", DependencyKind::Core, Some("1.23.0")), &present);
        assert_eq!(f.code, "numpy-outdated");
        assert_eq!(f.severity, Severity::Warn);

        let unknown = ImportOutcome::Present { version: None };
        let f = classify(&spec("numpy", DependencyKind::Core, Some("1.23.0")), &unknown);
        assert_eq!(f.severity, Severity::Ok);
    }

    #[test]
    fn project_files_required_vs_optional() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.py"), "").unwrap();
        let cfg = DependencyConfig {
            required_files: vec![PathBuf::from("main.py"), PathBuf::from("requirements.txt")],
            optional_files: vec![PathBuf::from("config_linux_testnet.yaml")],
            ..DependencyConfig::default()
        };
        let out = check_project_files(dir.path(), &cfg);
        assert_eq!(out[0].severity, Severity::Ok);
        assert_eq!(out[1].severity, Severity::Error);
        assert_eq!(out[2].severity, Severity::Info);
    }

    #[tokio::test]
    async fn unknown_interpreter_is_an_error() {
        let cfg = DependencyConfig {
            interpreter: "quantdiag-no-such-python".to_string(),
            ..DependencyConfig::default()
        };
        let out = check_interpreter(&cfg).await;
        assert_eq!(out.len(), 1);
        assert!(out[0].is(Category::Deps, "interpreter-missing"));
        assert_eq!(out[0].severity, Severity::Error);
    }
}
