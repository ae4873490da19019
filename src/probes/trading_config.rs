//! Lenient, read-only view over the trader's YAML configuration.
//!
//! Only the handful of keys the linter cares about are extracted. Absent keys
//! are `None`; keys present with the wrong type are listed in `malformed`.
//! Secret values are classified and then dropped, never stored.

use crate::probes::ProbeError;
use serde_yaml::Value;
use std::fs;
use std::path::Path;

pub const SECTIONS: [&str; 7] = [
    "trading",
    "lighter",
    "log",
    "strategies",
    "web",
    "security",
    "notifications",
];

const PLACEHOLDER_MARKERS: [&str; 2] = ["YOUR_", "REPLACE"];
const MIN_KEY_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretState {
    Missing,
    Placeholder,
    Configured,
}

impl SecretState {
    /// Keys: template markers, empty, or too short to be real.
    pub fn classify_key(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty()
            || value.chars().count() < MIN_KEY_LEN
            || PLACEHOLDER_MARKERS.iter().any(|m| value.contains(m))
        {
            SecretState::Placeholder
        } else {
            SecretState::Configured
        }
    }

    /// Account names are short by nature, so only template markers and
    /// emptiness count.
    pub fn classify_username(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty()
            || value.contains("your_email")
            || PLACEHOLDER_MARKERS.iter().any(|m| value.contains(m))
        {
            SecretState::Placeholder
        } else {
            SecretState::Configured
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkKind {
    Mainnet,
    Testnet,
    Other,
}

impl NetworkKind {
    pub fn classify(base_url: &str) -> Self {
        let lower = base_url.to_lowercase();
        if lower.contains("mainnet") {
            NetworkKind::Mainnet
        } else if lower.contains("testnet") {
            NetworkKind::Testnet
        } else {
            NetworkKind::Other
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigView {
    pub sections: Vec<&'static str>,
    pub tick_interval: Option<f64>,
    pub base_url: Option<String>,
    pub private_key: Option<SecretState>,
    pub log_level: Option<String>,
    pub strategy_count: usize,
    pub enabled_strategies: Vec<String>,
    pub ssl_enabled: Option<bool>,
    pub ssl_cert: Option<String>,
    pub ssl_key: Option<String>,
    pub has_web_backend: bool,
    pub frontend_api_url: Option<String>,
    pub access_control: Option<bool>,
    pub allowed_ips: Option<Vec<String>>,
    pub require_authentication: Option<bool>,
    pub two_factor_auth: Option<bool>,
    pub email_enabled: Option<bool>,
    pub email_username: Option<SecretState>,
    pub malformed: Vec<String>,
}

impl ConfigView {
    pub fn load(path: &Path) -> Result<Self, ProbeError> {
        let text = fs::read_to_string(path).map_err(|source| ProbeError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    pub fn parse(text: &str, origin: &str) -> Result<Self, ProbeError> {
        let root: Value = serde_yaml::from_str(text).map_err(|err| ProbeError::Parse {
            path: origin.to_string(),
            reason: err.to_string(),
        })?;
        match root {
            Value::Null => Ok(Self::default()),
            Value::Mapping(_) => Ok(Self::from_value(&root)),
            _ => Err(ProbeError::Parse {
                path: origin.to_string(),
                reason: "top level is not a mapping".to_string(),
            }),
        }
    }

    fn from_value(root: &Value) -> Self {
        let mut x = Extractor {
            root,
            malformed: Vec::new(),
        };

        let sections = SECTIONS
            .into_iter()
            .filter(|name| root.get(*name).is_some())
            .collect();

        let (strategy_count, enabled_strategies) = x.strategies();

        ConfigView {
            sections,
            tick_interval: x.number(&["trading", "tick_interval"]),
            base_url: x.string(&["lighter", "base_url"]),
            private_key: x
                .string(&["lighter", "api_key_private_key"])
                .map(|k| SecretState::classify_key(&k)),
            log_level: x.string(&["log", "level"]),
            strategy_count,
            enabled_strategies,
            ssl_enabled: x.boolean(&["web", "backend", "ssl_enabled"]),
            ssl_cert: x.string(&["web", "backend", "ssl_cert"]).filter(|s| !s.trim().is_empty()),
            ssl_key: x.string(&["web", "backend", "ssl_key"]).filter(|s| !s.trim().is_empty()),
            has_web_backend: lookup(root, &["web", "backend"]).is_some(),
            frontend_api_url: x.string(&["web", "frontend", "api_url"]),
            access_control: x.boolean(&["security", "access_control"]),
            allowed_ips: x.string_list(&["security", "allowed_ips"]),
            require_authentication: x.boolean(&["security", "require_authentication"]),
            two_factor_auth: x.boolean(&["security", "two_factor_auth"]),
            email_enabled: x.boolean(&["notifications", "email", "enabled"]),
            email_username: lookup(root, &["notifications", "email"]).map(|_| {
                x.string(&["notifications", "email", "username"])
                    .map(|u| SecretState::classify_username(&u))
                    .unwrap_or(SecretState::Missing)
            }),
            malformed: x.malformed,
        }
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.sections.contains(&name)
    }

    pub fn network(&self) -> Option<NetworkKind> {
        self.base_url.as_deref().map(NetworkKind::classify)
    }
}

fn lookup<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter()
        .try_fold(root, |node, key| node.get(*key))
        .filter(|v| !v.is_null())
}

struct Extractor<'a> {
    root: &'a Value,
    malformed: Vec<String>,
}

impl Extractor<'_> {
    fn mark(&mut self, path: &[&str], expected: &str) {
        self.malformed.push(format!("{} (expected {expected})", path.join(".")));
    }

    fn string(&mut self, path: &[&str]) -> Option<String> {
        let value = lookup(self.root, path)?;
        match value {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => {
                self.mark(path, "string");
                None
            }
        }
    }

    fn number(&mut self, path: &[&str]) -> Option<f64> {
        let value = lookup(self.root, path)?;
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        if parsed.is_none() {
            self.mark(path, "number");
        }
        parsed
    }

    fn boolean(&mut self, path: &[&str]) -> Option<bool> {
        let value = lookup(self.root, path)?;
        let parsed = value.as_bool();
        if parsed.is_none() {
            self.mark(path, "boolean");
        }
        parsed
    }

    fn string_list(&mut self, path: &[&str]) -> Option<Vec<String>> {
        let value = lookup(self.root, path)?;
        let Some(seq) = value.as_sequence() else {
            self.mark(path, "list");
            return None;
        };
        Some(
            seq.iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect(),
        )
    }

    /// `strategies.<name>.enabled`; returns (declared, enabled names).
    fn strategies(&mut self) -> (usize, Vec<String>) {
        let Some(section) = lookup(self.root, &["strategies"]) else {
            return (0, Vec::new());
        };
        let Some(map) = section.as_mapping() else {
            self.mark(&["strategies"], "mapping");
            return (0, Vec::new());
        };
        let mut enabled = Vec::new();
        for (name, body) in map {
            let name = match name {
                Value::String(s) => s.clone(),
                other => serde_yaml::to_string(other)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default(),
            };
            match body.get("enabled") {
                Some(Value::Bool(true)) => enabled.push(name),
                Some(Value::Bool(false)) | Some(Value::Null) | None => {}
                Some(_) => self
                    .malformed
                    .push(format!("strategies.{name}.enabled (expected boolean)")),
            }
        }
        (map.len(), enabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    const REAL_KEY: &str = "0x4f3edf983ac636a65a842ce7c78d9aa706d3b113bce9c46f30d7d21715b23b1d";

    #[test]
    fn key_placeholder_rules() {
        assert_eq!(SecretState::classify_key("YOUR_KEY_HERE"), SecretState::Placeholder);
        assert_eq!(SecretState::classify_key(""), SecretState::Placeholder);
        assert_eq!(SecretState::classify_key("abc123"), SecretState::Placeholder);
        assert_eq!(
            SecretState::classify_key("REPLACE_WITH_YOUR_64_CHAR_HEX_PRIVATE_KEY"),
            SecretState::Placeholder
        );
        assert_eq!(SecretState::classify_key(REAL_KEY), SecretState::Configured);
    }

    #[test]
    fn username_placeholder_ignores_length() {
        assert_eq!(SecretState::classify_username("ops@x.io"), SecretState::Configured);
        assert_eq!(
            SecretState::classify_username("your_email@gmail.com"),
            SecretState::Placeholder
        );
        assert_eq!(SecretState::classify_username(" "), SecretState::Placeholder);
    }

    #[test]
    fn classifies_network_by_substring() {
        assert_eq!(
            NetworkKind::classify("https://mainnet.zklighter.elliot.ai"),
            NetworkKind::Mainnet
        );
        assert_eq!(
            NetworkKind::classify("https://testnet.zklighter.elliot.ai"),
            NetworkKind::Testnet
        );
        assert_eq!(NetworkKind::classify("http://localhost:9000"), NetworkKind::Other);
    }

    #[test]
    fn parses_shipped_sample() {
        let view = ConfigView::parse(Config::trading_example_yaml(), "sample").unwrap();
        assert_eq!(view.sections.len(), SECTIONS.len());
        assert_eq!(view.tick_interval, Some(1.0));
        assert_eq!(view.network(), Some(NetworkKind::Mainnet));
        assert_eq!(view.private_key, Some(SecretState::Placeholder));
        assert_eq!(view.log_level.as_deref(), Some("INFO"));
        assert_eq!(view.strategy_count, 2);
        assert_eq!(view.enabled_strategies, vec!["ut_bot".to_string()]);
        assert_eq!(view.ssl_enabled, Some(false));
        assert_eq!(view.allowed_ips.as_ref().map(Vec::len), Some(2));
        assert_eq!(view.email_enabled, Some(false));
        assert_eq!(view.email_username, Some(SecretState::Placeholder));
        assert!(view.malformed.is_empty());
    }

    #[test]
    fn wrong_types_are_reported_not_fatal() {
        let text = "trading:\n  tick_interval: soon\nsecurity:\n  access_control: maybe\n  allowed_ips: 10.0.0.1\n";
        let view = ConfigView::parse(text, "t").unwrap();
        assert!(view.tick_interval.is_none());
        assert!(view.access_control.is_none());
        assert!(view.allowed_ips.is_none());
        assert_eq!(view.malformed.len(), 3);
        assert!(view.malformed[0].starts_with("trading.tick_interval"));
    }

    #[test]
    fn empty_document_has_no_sections() {
        let view = ConfigView::parse("", "t").unwrap();
        assert!(view.sections.is_empty());
        assert!(view.private_key.is_none());
    }

    #[test]
    fn broken_yaml_and_scalars_are_parse_errors() {
        assert!(matches!(
            ConfigView::parse("lighter: [unclosed", "t"),
            Err(ProbeError::Parse { .. })
        ));
        assert!(matches!(
            ConfigView::parse("just a string", "t"),
            Err(ProbeError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = ConfigView::load(&dir.path().join("config.yaml")).unwrap_err();
        assert!(err.is_not_found());
    }
}
