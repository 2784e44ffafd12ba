//! Harness configuration.
//!
//! Settings are resolved with the precedence environment > `settle.json`
//! in the project root > built-in defaults:
//!
//! | Setting            | Environment          | Default                                   |
//! |--------------------|----------------------|-------------------------------------------|
//! | platform           | `PLATFORM_NAME`      | `Android`                                 |
//! | Appium server      | `APPIUM_SERVER_URL`  | `http://127.0.0.1:4723`                   |
//! | device profile     | `DEVICE_PROFILE`     | `default`                                 |
//! | capabilities file  |                      | `resources/capabilities/<platform>.json`  |
//! | reference images   |                      | `resources/references`                    |
//! | log directory      |                      | `logs`                                    |
//!
//! # Example
//!
//! ```no_run
//! use settle_core::config::HarnessConfig;
//!
//! let config = HarnessConfig::load(".").unwrap();
//! let capabilities = config.load_capabilities().unwrap();
//! println!("{} capabilities for {}", capabilities.len(), config.platform);
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::policy::{
    ReadinessPolicy, ViewportConfig, DEFAULT_ESCALATION_PERCENT, DEFAULT_POLL_INTERVAL,
    DEFAULT_STABILITY_WINDOW, DEFAULT_TIMEOUT,
};

/// Name of the optional project config file.
pub const CONFIG_FILENAME: &str = "settle.json";
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:4723";
pub const DEFAULT_PROFILE: &str = "default";

pub const ENV_PLATFORM: &str = "PLATFORM_NAME";
pub const ENV_SERVER_URL: &str = "APPIUM_SERVER_URL";
pub const ENV_DEVICE_PROFILE: &str = "DEVICE_PROFILE";

/// Errors from loading configuration or capabilities.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Capabilities file not found: {}", .path.display())]
    CapabilitiesNotFound { path: PathBuf },

    #[error("Capabilities in {} have no '{profile}' or 'default' profile object", .path.display())]
    InvalidProfile { path: PathBuf, profile: String },

    #[error("Unknown platform '{0}' (expected Android or iOS)")]
    UnknownPlatform(String),

    #[error("Invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Target mobile platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Platform {
    #[default]
    #[serde(rename = "Android", alias = "android")]
    Android,
    #[serde(rename = "iOS", alias = "ios", alias = "IOS")]
    Ios,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Android => "Android",
            Platform::Ios => "iOS",
        }
    }

    fn capabilities_file(&self) -> &'static str {
        match self {
            Platform::Android => "android.json",
            Platform::Ios => "ios.json",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "android" => Ok(Platform::Android),
            "ios" => Ok(Platform::Ios),
            _ => Err(ConfigError::UnknownPlatform(s.to_string())),
        }
    }
}

/// Per-project defaults for [`ReadinessPolicy`], in config-file units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitDefaults {
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub stability_window_ms: u64,
    pub allow_scroll: bool,
    pub require_enabled: bool,
    pub prepare_for_click: bool,
    pub escalation_percent: f64,
    pub viewport: ViewportConfig,
}

impl Default for WaitDefaults {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            stability_window_ms: DEFAULT_STABILITY_WINDOW.as_millis() as u64,
            allow_scroll: true,
            require_enabled: true,
            prepare_for_click: true,
            escalation_percent: DEFAULT_ESCALATION_PERCENT,
            viewport: ViewportConfig::default(),
        }
    }
}

impl WaitDefaults {
    pub fn to_policy(&self) -> ReadinessPolicy {
        ReadinessPolicy::default()
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_stability_window(Duration::from_millis(self.stability_window_ms))
            .with_allow_scroll(self.allow_scroll)
            .with_require_enabled(self.require_enabled)
            .with_prepare_for_click(self.prepare_for_click)
            .with_escalation_percent(self.escalation_percent)
            .with_viewport(self.viewport)
    }
}

/// Contents of `settle.json`. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_profile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
    pub wait: WaitDefaults,
}

impl ConfigFile {
    /// Reads `<root>/settle.json`.
    ///
    /// Returns [`Default`] if the file does not exist. A file that exists but
    /// does not parse is an error.
    pub fn read(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(CONFIG_FILENAME);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&text).map_err(|source| ConfigError::Json { path, source })
    }
}

/// Fully resolved harness configuration.
#[derive(Debug, Clone, Serialize)]
pub struct HarnessConfig {
    /// Project root; relative paths below are resolved against it.
    pub root: PathBuf,
    pub platform: Platform,
    pub server_url: String,
    pub device_profile: String,
    pub capabilities_path: PathBuf,
    pub reference_dir: PathBuf,
    pub log_dir: PathBuf,
    pub wait: WaitDefaults,
}

impl HarnessConfig {
    /// Loads configuration for the project at `root` from the process
    /// environment and `settle.json`.
    pub fn load(root: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let root = root.as_ref();
        let file = ConfigFile::read(root)?;
        Self::resolve(root, file, |key| std::env::var(key).ok())
    }

    /// Resolves configuration from an explicit environment lookup.
    /// Empty environment values count as unset.
    pub fn resolve(
        root: &Path,
        file: ConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let platform = match env(ENV_PLATFORM) {
            Some(value) => value.parse()?,
            None => file.platform.unwrap_or_default(),
        };
        let server_url = env(ENV_SERVER_URL)
            .or(file.server_url)
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string());
        let device_profile = env(ENV_DEVICE_PROFILE)
            .or(file.device_profile)
            .unwrap_or_else(|| DEFAULT_PROFILE.to_string());

        let capabilities_path = file.capabilities_path.unwrap_or_else(|| {
            PathBuf::from("resources/capabilities").join(platform.capabilities_file())
        });
        let reference_dir = file
            .reference_dir
            .unwrap_or_else(|| PathBuf::from("resources/references"));
        let log_dir = file.log_dir.unwrap_or_else(|| PathBuf::from("logs"));

        Ok(Self {
            root: root.to_path_buf(),
            platform,
            server_url: server_url.trim_end_matches('/').to_string(),
            device_profile,
            capabilities_path: root.join(capabilities_path),
            reference_dir: root.join(reference_dir),
            log_dir: root.join(log_dir),
            wait: file.wait,
        })
    }

    /// The readiness policy configured for this project.
    pub fn policy(&self) -> ReadinessPolicy {
        self.wait.to_policy()
    }

    /// Reads the capabilities file and returns the configured profile,
    /// falling back to the `default` profile.
    pub fn load_capabilities(&self) -> Result<Map<String, Value>, ConfigError> {
        let path = &self.capabilities_path;
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::CapabilitiesNotFound { path: path.clone() });
            }
            Err(e) => return Err(e.into()),
        };
        let data: Value = serde_json::from_str(&text).map_err(|source| ConfigError::Json {
            path: path.clone(),
            source,
        })?;

        let profile = data
            .get(&self.device_profile)
            .filter(|v| v.is_object())
            .or_else(|| data.get(DEFAULT_PROFILE));
        match profile {
            Some(Value::Object(map)) => Ok(map.clone()),
            _ => Err(ConfigError::InvalidProfile {
                path: path.clone(),
                profile: self.device_profile.clone(),
            }),
        }
    }
}
