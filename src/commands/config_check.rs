//! `config-check`: lint the trading configuration. Strict: any error fails.

use crate::commands::{check_trading_config, Context};
use crate::findings::{has_failures, Finding, Severity};
use crate::report::Reporter;
use std::io::Write;

const PLAIN_HTTP_TIPS: [&str; 5] = [
    "keep web.backend.ssl_enabled false until a domain and certificate exist",
    "put the server IP in web.frontend.api_url",
    "restrict security.allowed_ips to known networks",
    "enable require_authentication and two_factor_auth",
    "prefer a VPN or SSH tunnel for remote access",
];

pub fn run<W: Write>(ctx: &Context, out: &mut Reporter<W>) -> Vec<Finding> {
    out.section("Configuration check");
    out.kv("path", ctx.trading_config_path.display());

    let (view, findings) = check_trading_config(ctx);
    out.findings(&findings, Severity::Ok);

    out.section("Summary");
    if has_failures(&findings) {
        out.error("required configuration items failed; fix them before starting");
    } else {
        out.ok("all required configuration items passed");
    }

    if let Some(view) = view {
        if view.has_web_backend && view.ssl_enabled != Some(true) {
            out.info("serving the web UI without a domain:");
            for tip in PLAIN_HTTP_TIPS {
                out.bullet(tip);
            }
        }
    }
    out.flush();
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::{context, write_config, GOOD_CONFIG};
    use crate::findings::{exit_code, Category};
    use crate::probes::process::tests::FakeEnumerator;

    #[test]
    fn placeholder_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        let text = GOOD_CONFIG
            .replace(
                "0x4f3edf983ac636a65a842ce7c78d9aa706d3b113bce9c46f30d7d21715b23b1d",
                "YOUR_KEY_HERE",
            )
            .replace("tick_interval: 1", "tick_interval: 120")
            .replace("enabled: true", "enabled: false");
        write_config(dir.path(), &text);
        let ctx = context(dir.path(), FakeEnumerator::with(Vec::new()));

        let mut out = Reporter::new(Vec::new());
        let findings = run(&ctx, &mut out);
        let text = String::from_utf8(out.into_inner()).unwrap();

        assert_eq!(exit_code(&findings), 1);
        let sev = |code: &str| {
            findings
                .iter()
                .find(|f| f.is(Category::Config, code))
                .map(|f| f.severity)
        };
        assert_eq!(sev("private-key-placeholder"), Some(Severity::Error));
        assert_eq!(sev("tick-interval"), Some(Severity::Warn));
        assert_eq!(sev("no-strategies"), Some(Severity::Warn));
        assert!(text.contains("[ERROR] config/private-key-placeholder"));
        assert!(text.contains("[ERROR] required configuration items failed"));
    }

    #[test]
    fn clean_config_passes() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), GOOD_CONFIG);
        let ctx = context(dir.path(), FakeEnumerator::with(Vec::new()));

        let mut out = Reporter::new(Vec::new());
        let findings = run(&ctx, &mut out);
        assert_eq!(exit_code(&findings), 0);
    }

    #[test]
    fn plain_http_tips_follow_disabled_ssl() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            &format!("{GOOD_CONFIG}web:\n  backend:\n    ssl_enabled: false\n"),
        );
        let ctx = context(dir.path(), FakeEnumerator::with(Vec::new()));

        let mut out = Reporter::new(Vec::new());
        run(&ctx, &mut out);
        let text = String::from_utf8(out.into_inner()).unwrap();
        assert!(text.contains("serving the web UI without a domain"));
    }
}
