use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::browser::{BrowserOptions, RetryPolicy, DEFAULT_LAUNCH_TIMEOUT};
use crate::capture::{
    CaptureSettings, DEFAULT_MAX_SETTLE, DEFAULT_NAVIGATION_TIMEOUT, DEFAULT_NETWORK_IDLE_TIMEOUT,
    DEFAULT_PROVISIONAL_HEIGHT,
};
use crate::document::{DocumentShell, CONTENT_WRAPPER_ID, DEFAULT_FRAMEWORK_SCRIPT};

pub const LOCAL_CONFIG_FILE: &str = "rendershot.toml";
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_COMPONENT: &str = "MyView";
pub const DEFAULT_COMPONENTS_DIR: &str = "components";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub render: RenderConfig,
    pub browser: BrowserConfig,
    pub retry: RetryPolicy,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub expose_error_detail: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            expose_error_detail: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub default_component: String,
    pub components_dir: PathBuf,
    /// `<base href>` of assembled documents; derived from the listen address when unset.
    pub base_url: Option<String>,
    /// Styling framework script; an empty string disables it.
    pub framework_script: String,
    pub provisional_height: u32,
    #[serde(with = "humantime_serde")]
    pub max_settle: Duration,
    pub content_selector: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            default_component: DEFAULT_COMPONENT.to_string(),
            components_dir: PathBuf::from(DEFAULT_COMPONENTS_DIR),
            base_url: None,
            framework_script: DEFAULT_FRAMEWORK_SCRIPT.to_string(),
            provisional_height: DEFAULT_PROVISIONAL_HEIGHT,
            max_settle: DEFAULT_MAX_SETTLE,
            content_selector: format!("#{CONTENT_WRAPPER_ID}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub executable: Option<PathBuf>,
    pub headless: bool,
    pub no_sandbox: bool,
    #[serde(with = "humantime_serde")]
    pub launch_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub navigation_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub network_idle_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            no_sandbox: false,
            launch_timeout: DEFAULT_LAUNCH_TIMEOUT,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            network_idle_timeout: DEFAULT_NETWORK_IDLE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

impl Config {
    /// Loads the config. Priority: explicit path > ./rendershot.toml > defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let local = Path::new(LOCAL_CONFIG_FILE);
                if local.is_file() {
                    Self::from_file(local)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".to_string()));
        }
        if self.render.default_component.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "render.default_component must not be empty".to_string(),
            ));
        }
        if self.render.provisional_height == 0 {
            return Err(ConfigError::Invalid(
                "render.provisional_height must be positive".to_string(),
            ));
        }
        if self.render.content_selector.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "render.content_selector must not be empty".to_string(),
            ));
        }
        if let Some(base) = &self.render.base_url {
            url::Url::parse(base).map_err(|e| {
                ConfigError::Invalid(format!("render.base_url '{base}' is not a valid URL: {e}"))
            })?;
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "retry.multiplier must be at least 1.0".to_string(),
            ));
        }
        if self.retry.max_attempts == Some(0) {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn browser_options(&self) -> BrowserOptions {
        BrowserOptions {
            executable: self.browser.executable.clone(),
            headless: self.browser.headless,
            no_sandbox: self.browser.no_sandbox,
            launch_timeout: self.browser.launch_timeout,
        }
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            provisional_height: self.render.provisional_height,
            max_settle: self.render.max_settle,
            navigation_timeout: self.browser.navigation_timeout,
            network_idle_timeout: self.browser.network_idle_timeout,
            content_selector: self.render.content_selector.clone(),
        }
    }

    pub fn document_shell(&self) -> DocumentShell {
        let base_url = self.render.base_url.clone().unwrap_or_else(|| {
            let host = match self.server.host.as_str() {
                "0.0.0.0" | "::" => "localhost",
                other => other,
            };
            format!("http://{}:{}/", host, self.server.port)
        });
        let script = self.render.framework_script.trim();
        DocumentShell {
            base_url,
            framework_script: (!script.is_empty()).then(|| script.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_values_match_expected() {
        let cfg = Config::default();

        assert_eq!(cfg.server.port, 3000);
        assert!(!cfg.server.expose_error_detail);
        assert_eq!(cfg.render.default_component, "MyView");
        assert_eq!(cfg.render.provisional_height, 2000);
        assert_eq!(cfg.render.content_selector, "#main-screenshot-viewport");
        assert_eq!(cfg.browser.navigation_timeout, Duration::from_secs(30));
        assert_eq!(cfg.browser.network_idle_timeout, Duration::from_secs(10));
        assert_eq!(cfg.retry, RetryPolicy::default());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("rendershot.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 8080

[render]
default_component = "Card"
max_settle = "2s"

[retry]
initial_delay = "1s"
max_delay = "20s"
multiplier = 2.0

[logging]
format = "json"
"#,
        )
        .unwrap();

        let cfg = Config::load(Some(&path)).unwrap();
        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.render.default_component, "Card");
        assert_eq!(cfg.render.max_settle, Duration::from_secs(2));
        assert_eq!(cfg.retry.max_delay, Duration::from_secs(20));
        assert_eq!(cfg.logging.format, LogFormat::Json);
        assert!(cfg.browser.headless);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut cfg = Config::default();
        cfg.render.base_url = Some("not a url".to_string());
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.retry.multiplier = 0.5;
        assert!(cfg.validate().is_err());

        let mut cfg = Config::default();
        cfg.render.default_component = " ".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn document_shell_derives_base_url_from_listen_address() {
        let mut cfg = Config::default();
        cfg.server.host = "0.0.0.0".to_string();
        cfg.server.port = 4000;
        cfg.render.framework_script = String::new();
        let shell = cfg.document_shell();
        assert_eq!(shell.base_url, "http://localhost:4000/");
        assert!(shell.framework_script.is_none());
    }
}
