use crate::findings::{has_failures, Category, Finding};
use crate::probes::trading_config::{ConfigView, NetworkKind, SecretState};

pub const MAX_TICK_INTERVAL_SECS: f64 = 60.0;
const IP_PLACEHOLDERS: [&str; 2] = ["YOUR_", "REPLACE"];
const API_URL_PLACEHOLDERS: [&str; 2] = ["YOUR_", "localhost"];

pub fn lint(view: &ConfigView) -> Vec<Finding> {
    let mut out = Vec::new();
    lint_exchange(view, &mut out);
    lint_trading(view, &mut out);
    lint_web(view, &mut out);
    lint_security(view, &mut out);
    lint_notifications(view, &mut out);

    for key in &view.malformed {
        out.push(Finding::warn(
            Category::Config,
            "malformed",
            format!("unexpected value type at {key}"),
            "fix the value type; the key is ignored until then",
        ));
    }

    let placeholder = out.iter().any(|f| f.code.contains("placeholder"));
    if !has_failures(&out) && !placeholder {
        out.push(Finding::ok(
            Category::Config,
            "complete",
            "all required items present, no placeholder secrets",
        ));
    }
    out
}

fn lint_exchange(view: &ConfigView, out: &mut Vec<Finding>) {
    if !view.has_section("lighter") {
        out.push(Finding::error(
            Category::Config,
            "lighter-missing",
            "lighter section is missing",
            "add lighter.base_url and lighter.api_key_private_key",
        ));
        return;
    }

    out.push(match view.private_key {
        Some(SecretState::Configured) => {
            Finding::ok(Category::Config, "private-key", "API private key configured")
        }
        Some(SecretState::Placeholder) => Finding::error(
            Category::Config,
            "private-key-placeholder",
            "lighter.api_key_private_key is a placeholder, empty or too short",
            "set the real API private key",
        ),
        Some(SecretState::Missing) | None => Finding::error(
            Category::Config,
            "private-key-missing",
            "lighter.api_key_private_key is not set",
            "set the real API private key",
        ),
    });

    match (view.base_url.as_deref(), view.network()) {
        (Some(url), Some(NetworkKind::Mainnet)) => out.push(Finding::ok(
            Category::Config,
            "network",
            format!("exchange endpoint {url} (mainnet)"),
        )),
        (Some(url), Some(NetworkKind::Testnet)) => out.push(Finding::info(
            Category::Config,
            "network",
            format!("exchange endpoint {url} (testnet)"),
        )),
        (Some(url), _) => out.push(Finding::warn(
            Category::Config,
            "network",
            format!("exchange endpoint {url} is neither mainnet nor testnet"),
            "double-check lighter.base_url",
        )),
        (None, _) => out.push(Finding::error(
            Category::Config,
            "base-url-missing",
            "lighter.base_url is not set",
            "set lighter.base_url to the exchange API endpoint",
        )),
    }
}

fn lint_trading(view: &ConfigView, out: &mut Vec<Finding>) {
    match view.tick_interval {
        Some(secs) if secs > MAX_TICK_INTERVAL_SECS => out.push(Finding::warn(
            Category::Config,
            "tick-interval",
            format!("trading.tick_interval = {secs}s; the log will update slowly"),
            format!("lower trading.tick_interval to {MAX_TICK_INTERVAL_SECS}s or less"),
        )),
        Some(secs) => out.push(Finding::ok(
            Category::Config,
            "tick-interval",
            format!("trading.tick_interval = {secs}s"),
        )),
        None => out.push(Finding::info(
            Category::Config,
            "tick-interval",
            "trading.tick_interval not set; the trader default applies",
        )),
    }

    if let Some(level) = &view.log_level {
        out.push(Finding::info(
            Category::Config,
            "log-level",
            format!("log.level = {level}"),
        ));
    }

    if view.enabled_strategies.is_empty() {
        out.push(Finding::warn(
            Category::Config,
            "no-strategies",
            format!("no enabled strategy ({} declared)", view.strategy_count),
            "set strategies.<name>.enabled: true for at least one strategy",
        ));
    } else {
        out.push(Finding::ok(
            Category::Config,
            "strategies",
            format!(
                "{} of {} strategies enabled: {}",
                view.enabled_strategies.len(),
                view.strategy_count,
                view.enabled_strategies.join(", ")
            ),
        ));
    }
}

fn lint_web(view: &ConfigView, out: &mut Vec<Finding>) {
    if !view.has_section("web") {
        out.push(Finding::info(
            Category::Config,
            "web-missing",
            "no web section (fine for command-line only use)",
        ));
        return;
    }

    if view.ssl_enabled == Some(true) {
        if view.ssl_cert.is_some() && view.ssl_key.is_some() {
            out.push(Finding::ok(Category::Config, "ssl", "SSL enabled with certificate and key"));
        } else {
            out.push(Finding::error(
                Category::Config,
                "ssl-incomplete",
                "SSL enabled but ssl_cert or ssl_key is missing",
                "set web.backend.ssl_cert and web.backend.ssl_key, or disable SSL",
            ));
        }
    } else if view.has_web_backend {
        out.push(Finding::info(
            Category::Config,
            "ssl",
            "SSL disabled; the web backend serves plain HTTP",
        ));
    }

    if let Some(url) = &view.frontend_api_url {
        if API_URL_PLACEHOLDERS.iter().any(|m| url.contains(m)) {
            out.push(Finding::warn(
                Category::Config,
                "api-url",
                format!("web.frontend.api_url may need updating: {url}"),
                "replace it with the server's public address",
            ));
        }
    }
}

fn lint_security(view: &ConfigView, out: &mut Vec<Finding>) {
    if !view.has_section("security") {
        out.push(Finding::error(
            Category::Config,
            "security-missing",
            "security section is missing",
            "add security.access_control, allowed_ips and require_authentication",
        ));
        return;
    }

    if view.access_control == Some(true) {
        out.push(Finding::ok(Category::Config, "access-control", "access control enabled"));
        match &view.allowed_ips {
            Some(ips) => {
                for ip in ips
                    .iter()
                    .filter(|ip| IP_PLACEHOLDERS.iter().any(|m| ip.contains(m)))
                {
                    out.push(Finding::warn(
                        Category::Config,
                        "allowed-ip-placeholder",
                        format!("allowed_ips entry '{ip}' is a placeholder"),
                        "replace it with a real address or CIDR range",
                    ));
                }
            }
            None => out.push(Finding::warn(
                Category::Config,
                "allowed-ips-missing",
                "access control enabled without security.allowed_ips",
                "list the addresses allowed to reach the web backend",
            )),
        }
    } else {
        out.push(Finding::warn(
            Category::Config,
            "access-control",
            "access control disabled",
            "enable security.access_control and configure allowed_ips",
        ));
    }

    if view.require_authentication != Some(true) {
        out.push(Finding::warn(
            Category::Config,
            "authentication",
            "authentication is not enforced",
            "set security.require_authentication: true",
        ));
    }
    if view.two_factor_auth != Some(true) {
        out.push(Finding::warn(
            Category::Config,
            "two-factor",
            "two-factor authentication disabled",
            "set security.two_factor_auth: true",
        ));
    }
}

fn lint_notifications(view: &ConfigView, out: &mut Vec<Finding>) {
    if !view.has_section("notifications") {
        out.push(Finding::info(
            Category::Config,
            "notifications-missing",
            "no notifications section",
        ));
        return;
    }

    match (view.email_enabled, view.email_username) {
        (Some(true), Some(SecretState::Configured)) => {
            out.push(Finding::ok(Category::Config, "email", "e-mail notifications configured"))
        }
        (Some(true), _) => out.push(Finding::warn(
            Category::Config,
            "email-placeholder",
            "e-mail notifications enabled with a placeholder username",
            "set notifications.email.username to a real mailbox",
        )),
        _ => out.push(Finding::info(
            Category::Config,
            "email",
            "e-mail notifications disabled",
        )),
    }
}
