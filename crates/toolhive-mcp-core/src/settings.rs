use derive_builder::Builder;
use std::time::Duration;

/// Environment-driven configuration for the ToolHive controller.
///
/// Every knob has a documented default so the server starts with no
/// configuration at all against a local `thv` installation.
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(setter(into))]
pub struct Settings {
    /// Base URL of the ToolHive control-plane API (`TOOLHIVE_API_BASE`).
    #[builder(default = "default_api_base()")]
    pub api_base: String,

    /// Path to the ToolHive CLI executable (`TOOLHIVE_CLI_PATH`).
    #[builder(default = "default_cli_path()")]
    pub cli_path: String,

    /// Whether to auto-start `thv serve` when the API is not reachable
    /// (`TOOLHIVE_AUTO_START_API`).
    #[builder(default = "true")]
    pub auto_start: bool,

    /// Total startup wait for the auto-started API server in seconds
    /// (`TOOLHIVE_API_STARTUP_TIMEOUT`).
    #[builder(default = "10")]
    pub startup_timeout_secs: u64,

    /// Number of health polls spread across the startup timeout
    /// (`TOOLHIVE_API_RETRIES`).
    #[builder(default = "5")]
    pub startup_retries: u32,

    /// Extra arguments appended to `thv serve` (`TOOLHIVE_API_CONFIG`,
    /// whitespace separated).
    #[builder(default)]
    pub serve_args: Vec<String>,
}

fn default_api_base() -> String {
    "http://localhost:8080".to_string()
}

fn default_cli_path() -> String {
    "thv".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        SettingsBuilder::default()
            .build()
            .expect("builder defaults are complete")
    }
}

impl Settings {
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::default()
    }

    /// Load settings from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings from an arbitrary lookup, used by tests to avoid
    /// mutating the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Settings::default();
        Settings {
            api_base: lookup("TOOLHIVE_API_BASE").unwrap_or(defaults.api_base),
            cli_path: lookup("TOOLHIVE_CLI_PATH").unwrap_or(defaults.cli_path),
            auto_start: lookup("TOOLHIVE_AUTO_START_API")
                .map(|v| v.to_ascii_lowercase() == "true")
                .unwrap_or(defaults.auto_start),
            startup_timeout_secs: lookup("TOOLHIVE_API_STARTUP_TIMEOUT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.startup_timeout_secs),
            startup_retries: lookup("TOOLHIVE_API_RETRIES")
                .and_then(|v| v.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(defaults.startup_retries),
            serve_args: lookup("TOOLHIVE_API_CONFIG")
                .map(|v| v.split_whitespace().map(str::to_string).collect())
                .unwrap_or(defaults.serve_args),
        }
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    /// Interval between health polls during startup.
    pub fn poll_interval(&self) -> Duration {
        self.startup_timeout() / self.startup_retries.max(1)
    }
}
