use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_SETTINGS_PATH: &str = "./quantdiag.yaml";
pub const DEFAULT_LOG_PATH: &str = "logs/quant_trading.log";
pub const DEFAULT_TRADING_CONFIG_PATH: &str = "config.yaml";

/// A matched trader below this CPU share...
pub const DEFAULT_STUCK_CPU_PERCENT: f32 = 0.1;
/// ...for longer than this many minutes of uptime is flagged possibly-stuck.
pub const DEFAULT_STUCK_UPTIME_MINS: u64 = 5;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
    #[serde(default = "default_trading_config_path")]
    pub trading_config_path: PathBuf,
    #[serde(default)]
    pub process: ProcessConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub resources: ResourceConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub startup: StartupMarkers,
    #[serde(default)]
    pub dependencies: DependencyConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProcessConfig {
    #[serde(default = "default_process_patterns")]
    pub patterns: Vec<String>,
    #[serde(default = "default_interpreter_filter")]
    pub interpreter: Option<String>,
    #[serde(default = "default_stuck_cpu_percent")]
    pub stuck_cpu_percent: f32,
    #[serde(default = "default_stuck_uptime_mins")]
    pub stuck_uptime_mins: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default = "default_tail_lines")]
    pub tail_lines: usize,
    #[serde(default = "default_signal_markers")]
    pub signal_markers: Vec<String>,
    #[serde(default = "default_waiting_markers")]
    pub waiting_markers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResourceConfig {
    #[serde(default = "default_usage_threshold_percent")]
    pub cpu_percent: f64,
    #[serde(default = "default_usage_threshold_percent")]
    pub memory_percent: f64,
    #[serde(default = "default_usage_threshold_percent")]
    pub disk_percent: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
    #[serde(default = "default_ping_count")]
    pub ping_count: u32,
    #[serde(default = "default_ping_timeout_secs")]
    pub ping_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchConfig {
    #[serde(default = "default_watch_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_hint_after_ticks")]
    pub hint_after_ticks: u32,
}

/// Synonym regexes per startup phase. A phase counts as reached when any of
/// its synonyms matches a log line.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StartupMarkers {
    #[serde(default = "default_engine_markers")]
    pub engine: Vec<String>,
    #[serde(default = "default_data_manager_markers")]
    pub data_manager: Vec<String>,
    #[serde(default = "default_markets_markers")]
    pub markets: Vec<String>,
    #[serde(default = "default_order_manager_markers")]
    pub order_manager: Vec<String>,
    #[serde(default = "default_order_manager_ready_markers")]
    pub order_manager_ready: Vec<String>,
    #[serde(default = "default_main_loop_markers")]
    pub main_loop: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DependencyConfig {
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default = "default_min_interpreter_version")]
    pub min_interpreter_version: String,
    #[serde(default = "default_packages")]
    pub packages: Vec<DependencySpec>,
    #[serde(default = "default_required_files")]
    pub required_files: Vec<PathBuf>,
    #[serde(default = "default_optional_files")]
    pub optional_files: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    Core,
    Optional,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DependencySpec {
    pub name: String,
    #[serde(default)]
    pub import: Option<String>,
    pub kind: DependencyKind,
    #[serde(default)]
    pub min_version: Option<String>,
    #[serde(default)]
    pub description: String,
}

impl DependencySpec {
    pub fn import_name(&self) -> &str {
        self.import.as_deref().unwrap_or(&self.name)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_path: default_log_path(),
            trading_config_path: default_trading_config_path(),
            process: ProcessConfig::default(),
            log: LogConfig::default(),
            resources: ResourceConfig::default(),
            network: NetworkConfig::default(),
            watch: WatchConfig::default(),
            startup: StartupMarkers::default(),
            dependencies: DependencyConfig::default(),
        }
    }
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            patterns: default_process_patterns(),
            interpreter: default_interpreter_filter(),
            stuck_cpu_percent: default_stuck_cpu_percent(),
            stuck_uptime_mins: default_stuck_uptime_mins(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            tail_lines: default_tail_lines(),
            signal_markers: default_signal_markers(),
            waiting_markers: default_waiting_markers(),
        }
    }
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            cpu_percent: default_usage_threshold_percent(),
            memory_percent: default_usage_threshold_percent(),
            disk_percent: default_usage_threshold_percent(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            http_timeout_secs: default_http_timeout_secs(),
            ping_count: default_ping_count(),
            ping_timeout_secs: default_ping_timeout_secs(),
        }
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_watch_interval_secs(),
            hint_after_ticks: default_hint_after_ticks(),
        }
    }
}

impl Default for StartupMarkers {
    fn default() -> Self {
        Self {
            engine: default_engine_markers(),
            data_manager: default_data_manager_markers(),
            markets: default_markets_markers(),
            order_manager: default_order_manager_markers(),
            order_manager_ready: default_order_manager_ready_markers(),
            main_loop: default_main_loop_markers(),
        }
    }
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            min_interpreter_version: default_min_interpreter_version(),
            packages: default_packages(),
            required_files: default_required_files(),
            optional_files: default_optional_files(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid settings: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "log_path must not be empty".to_string(),
            ));
        }
        if self.trading_config_path.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "trading_config_path must not be empty".to_string(),
            ));
        }

        validate_process(&self.process)?;
        validate_log(&self.log)?;
        validate_resources(&self.resources)?;
        validate_network(&self.network)?;
        validate_watch(&self.watch)?;
        validate_startup(&self.startup)?;
        validate_dependencies(&self.dependencies)?;

        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }

    pub fn trading_example_yaml() -> &'static str {
        include_str!("../trading-config.yaml.example")
    }
}

fn validate_process(cfg: &ProcessConfig) -> Result<(), ConfigError> {
    if cfg.patterns.is_empty() || cfg.patterns.iter().any(|p| p.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "process.patterns must contain at least one non-empty pattern".to_string(),
        ));
    }
    if !(0.0..=100.0).contains(&cfg.stuck_cpu_percent) {
        return Err(ConfigError::Validation(
            "process.stuck_cpu_percent must be within 0..100".to_string(),
        ));
    }
    Ok(())
}

fn validate_log(cfg: &LogConfig) -> Result<(), ConfigError> {
    if cfg.tail_lines == 0 {
        return Err(ConfigError::Validation(
            "log.tail_lines must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_resources(cfg: &ResourceConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("cpu_percent", cfg.cpu_percent),
        ("memory_percent", cfg.memory_percent),
        ("disk_percent", cfg.disk_percent),
    ] {
        if !(0.0..=100.0).contains(&value) {
            return Err(ConfigError::Validation(format!(
                "resources.{name} must be within 0..100"
            )));
        }
    }
    Ok(())
}

fn validate_network(cfg: &NetworkConfig) -> Result<(), ConfigError> {
    if cfg.http_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "network.http_timeout_secs must be > 0".to_string(),
        ));
    }
    if cfg.ping_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "network.ping_timeout_secs must be > 0".to_string(),
        ));
    }
    Ok(())
}

fn validate_watch(cfg: &WatchConfig) -> Result<(), ConfigError> {
    if cfg.interval_secs < 1 {
        return Err(ConfigError::Validation(
            "watch.interval_secs must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_startup(cfg: &StartupMarkers) -> Result<(), ConfigError> {
    for (phase, markers) in cfg.by_phase_name() {
        if markers.is_empty() {
            return Err(ConfigError::Validation(format!(
                "startup.{phase} needs at least one marker"
            )));
        }
        for marker in markers {
            if let Err(err) = Regex::new(marker) {
                return Err(ConfigError::Validation(format!(
                    "startup.{phase} marker '{marker}' is not a valid regex: {err}"
                )));
            }
        }
    }
    Ok(())
}

fn validate_dependencies(cfg: &DependencyConfig) -> Result<(), ConfigError> {
    if cfg.interpreter.trim().is_empty() {
        return Err(ConfigError::Validation(
            "dependencies.interpreter must not be empty".to_string(),
        ));
    }
    for spec in &cfg.packages {
        if spec.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "dependencies.packages[*].name must not be empty".to_string(),
            ));
        }
        let import = spec.import_name();
        let valid_import = import
            .split('.')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_alphanumeric() || c == '_'));
        if !valid_import {
            return Err(ConfigError::Validation(format!(
                "dependencies package '{}' has an invalid import name '{import}'",
                spec.name
            )));
        }
    }
    Ok(())
}

impl StartupMarkers {
    pub fn by_phase_name(&self) -> [(&'static str, &[String]); 6] {
        [
            ("engine", self.engine.as_slice()),
            ("data_manager", self.data_manager.as_slice()),
            ("markets", self.markets.as_slice()),
            ("order_manager", self.order_manager.as_slice()),
            ("order_manager_ready", self.order_manager_ready.as_slice()),
            ("main_loop", self.main_loop.as_slice()),
        ]
    }
}

fn default_log_path() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_PATH)
}

fn default_trading_config_path() -> PathBuf {
    PathBuf::from(DEFAULT_TRADING_CONFIG_PATH)
}

fn default_process_patterns() -> Vec<String> {
    vec!["start_trading".to_string(), "main.py".to_string()]
}

fn default_interpreter_filter() -> Option<String> {
    Some("python".to_string())
}

const fn default_stuck_cpu_percent() -> f32 {
    DEFAULT_STUCK_CPU_PERCENT
}

const fn default_stuck_uptime_mins() -> u64 {
    DEFAULT_STUCK_UPTIME_MINS
}

const fn default_tail_lines() -> usize {
    100
}

fn default_signal_markers() -> Vec<String> {
    vec!["交易信号".to_string(), "SIGNAL".to_string()]
}

fn default_waiting_markers() -> Vec<String> {
    vec![
        "等待".to_string(),
        "waiting for".to_string(),
        "insufficient data".to_string(),
    ]
}

const fn default_usage_threshold_percent() -> f64 {
    90.0
}

const fn default_http_timeout_secs() -> u64 {
    10
}

const fn default_ping_count() -> u32 {
    2
}

const fn default_ping_timeout_secs() -> u64 {
    5
}

const fn default_watch_interval_secs() -> u64 {
    10
}

const fn default_hint_after_ticks() -> u32 {
    6
}

fn markers(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn default_engine_markers() -> Vec<String> {
    markers(&["启动交易引擎", "(?i)engine starting", "(?i)starting trading engine"])
}

fn default_data_manager_markers() -> Vec<String> {
    markers(&["初始化数据管理器", "(?i)init(iali[sz](e|ing))? data manager"])
}

fn default_markets_markers() -> Vec<String> {
    markers(&["发现.*个市场", "(?i)markets discovered", "(?i)discovered \\d+ markets"])
}

fn default_order_manager_markers() -> Vec<String> {
    markers(&["初始化订单管理器", "(?i)init(iali[sz](e|ing))? order manager"])
}

fn default_order_manager_ready_markers() -> Vec<String> {
    markers(&["订单管理器初始化完成", "(?i)order manager ready"])
}

fn default_main_loop_markers() -> Vec<String> {
    markers(&["进入主循环", "(?i)entered main loop", "(?i)entering main loop"])
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_min_interpreter_version() -> String {
    "3.9".to_string()
}

fn package(
    name: &str,
    import: Option<&str>,
    kind: DependencyKind,
    min_version: Option<&str>,
    description: &str,
) -> DependencySpec {
    DependencySpec {
        name: name.to_string(),
        import: import.map(str::to_string),
        kind,
        min_version: min_version.map(str::to_string),
        description: description.to_string(),
    }
}

fn default_packages() -> Vec<DependencySpec> {
    use DependencyKind::{Core, Optional};
    vec![
        package("lighter", None, Core, None, "exchange SDK"),
        package("eth_account", None, Core, None, "account signing"),
        package("pydantic", None, Core, None, "data validation"),
        package("aiohttp", None, Core, None, "async HTTP client"),
        package("websockets", None, Core, None, "websocket client"),
        package("numpy", None, Core, Some("1.23.0"), "numerics"),
        package("pandas", None, Core, Some("1.5.0"), "data frames"),
        package("scipy", None, Core, Some("1.9.0"), "scientific computing"),
        package("pyyaml", Some("yaml"), Core, None, "YAML config parsing"),
        package("colorlog", None, Core, None, "colored logging"),
        package("requests", None, Core, None, "HTTP requests"),
        package("PyQt6", None, Optional, None, "desktop GUI"),
        package("matplotlib", None, Optional, None, "plotting"),
        package("plotly", None, Optional, None, "interactive charts"),
        package("ta-lib", Some("talib"), Optional, None, "technical indicators"),
        package("tradingview_ta", None, Optional, None, "TradingView data"),
        package("pytest", None, Optional, None, "test runner"),
        package("black", None, Optional, None, "formatter"),
        package("flake8", None, Optional, None, "linter"),
    ]
}

fn default_required_files() -> Vec<PathBuf> {
    ["requirements.txt", "config.yaml", "main.py"]
        .into_iter()
        .map(PathBuf::from)
        .collect()
}

fn default_optional_files() -> Vec<PathBuf> {
    [
        "requirements-minimal.txt",
        "config_linux_testnet.yaml",
        "config_linux_mainnet.yaml",
    ]
    .into_iter()
    .map(PathBuf::from)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Config::default()
            .validate()
            .expect("built-in defaults must validate");
    }

    #[test]
    fn example_file_parses_and_validates() {
        let cfg: Config = serde_yaml::from_str(Config::example_yaml()).expect("example parses");
        cfg.validate().expect("example validates");
        assert_eq!(cfg.process.stuck_cpu_percent, DEFAULT_STUCK_CPU_PERCENT);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let cfg: Config = serde_yaml::from_str("log_path: /var/log/trader.log\n").unwrap();
        assert_eq!(cfg.log_path, PathBuf::from("/var/log/trader.log"));
        assert_eq!(cfg.log.tail_lines, 100);
        assert_eq!(cfg.watch.interval_secs, 10);
        assert_eq!(cfg.startup.main_loop, default_main_loop_markers());
    }

    #[test]
    fn invalid_startup_regex_is_rejected() {
        let mut cfg = Config::default();
        cfg.startup.markets = vec!["发现(".to_string()];
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("startup.markets"));
    }

    #[test]
    fn empty_process_patterns_are_rejected() {
        let mut cfg = Config::default();
        cfg.process.patterns.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn import_name_defaults_to_package_name() {
        let deps = default_packages();
        let yaml = deps.iter().find(|d| d.name == "pyyaml").unwrap();
        assert_eq!(yaml.import_name(), "yaml");
        let numpy = deps.iter().find(|d| d.name == "numpy").unwrap();
        assert_eq!(numpy.import_name(), "numpy");
    }

    #[test]
    fn shell_metacharacters_in_import_are_rejected() {
        let mut cfg = Config::default();
        cfg.dependencies.packages.push(DependencySpec {
            name: "evil".to_string(),
            import: Some("os; os.system('x')".to_string()),
            kind: DependencyKind::Optional,
            min_version: None,
            description: String::new(),
        });
        assert!(cfg.validate().is_err());
    }
}
