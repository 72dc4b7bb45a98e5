use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use scout_engine::matcher::{HLS_CONTENT_TYPES, HLS_EXTENSION};
use scout_engine::session::WaitUntil;
use scout_engine::session::cdp::BrowserOptions;
use scout_engine::{Channel, DiscoveryConfig, TargetPattern};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cli::{OutputFormat, SniffArgs};
use crate::error::{AppError, Result};

const CONFIG_DIR: &str = "scout";
const CONFIG_FILE: &str = "config.toml";

/// Settings persisted in the TOML configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub discovery: DiscoverySettings,
    pub browser: BrowserOptions,
    pub output: OutputSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub settle_delay_ms: u64,
    pub navigation_timeout_secs: u64,
    pub max_body_size: u64,
    pub extension: String,
    /// Empty means the HLS defaults when the extension is `m3u8`.
    pub content_types: Vec<String>,
    /// Empty means every channel.
    pub channels: Vec<Channel>,
    pub wait_until: WaitUntilSetting,
    pub playback: bool,
}

/// TOML spelling of [`WaitUntil`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WaitUntilSetting {
    #[default]
    DomContentLoaded,
    Load,
}

impl From<WaitUntilSetting> for WaitUntil {
    fn from(value: WaitUntilSetting) -> Self {
        match value {
            WaitUntilSetting::DomContentLoaded => WaitUntil::DomContentLoaded,
            WaitUntilSetting::Load => WaitUntil::Load,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub format: OutputFormat,
    pub file: Option<PathBuf>,
    pub colored: bool,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        let defaults = DiscoveryConfig::default();
        Self {
            timeout_secs: defaults.time_budget.as_secs(),
            poll_interval_ms: defaults.poll_interval.as_millis() as u64,
            settle_delay_ms: defaults.settle_delay.as_millis() as u64,
            navigation_timeout_secs: defaults.navigation_timeout.as_secs(),
            max_body_size: defaults.max_body_size,
            extension: HLS_EXTENSION.to_string(),
            content_types: Vec::new(),
            channels: Vec::new(),
            wait_until: WaitUntilSetting::default(),
            playback: true,
        }
    }
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            format: OutputFormat::Pretty,
            file: None,
            colored: true,
        }
    }
}

impl AppConfig {
    /// `$CONFIG_DIR/scout/config.toml`, or the working directory when the
    /// platform has no config dir.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR))
            .unwrap_or_default()
            .join(CONFIG_FILE)
    }

    /// Loads `path` (or the default location); a missing file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        if !path.exists() {
            debug!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)?;
        let config = toml::from_str(&content)?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    pub fn show(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Writes the default configuration to `path` (or the default location).
    pub fn reset(path: Option<&Path>) -> Result<PathBuf> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, Self::default().show()?)?;
        Ok(path)
    }

    pub fn extension<'a>(&'a self, args: &'a SniffArgs) -> &'a str {
        args.extension
            .as_deref()
            .unwrap_or(&self.discovery.extension)
    }

    pub fn pattern(&self, args: &SniffArgs) -> Result<TargetPattern> {
        let extension = self.extension(args);
        let mut content_types = if args.content_types.is_empty() {
            self.discovery.content_types.clone()
        } else {
            args.content_types.clone()
        };
        if content_types.is_empty() && extension.eq_ignore_ascii_case(HLS_EXTENSION) {
            content_types = HLS_CONTENT_TYPES.iter().map(|s| s.to_string()).collect();
        }
        Ok(TargetPattern::new(extension, content_types)?)
    }

    /// Engine configuration: file settings overridden by flags.
    pub fn discovery_config(&self, args: &SniffArgs) -> Result<DiscoveryConfig> {
        let settings = &self.discovery;
        let timeout = args.timeout.unwrap_or(settings.timeout_secs);
        if timeout == 0 {
            return Err(AppError::Config("timeout must be at least one second".into()));
        }

        let channels = if !args.channels.is_empty() {
            args.channels.clone()
        } else if !settings.channels.is_empty() {
            settings.channels.clone()
        } else {
            Channel::ALL.to_vec()
        };

        Ok(DiscoveryConfig::builder()
            .time_budget(Duration::from_secs(timeout))
            .poll_interval(Duration::from_millis(settings.poll_interval_ms))
            .settle_delay(Duration::from_millis(settings.settle_delay_ms))
            .navigation_timeout(Duration::from_secs(settings.navigation_timeout_secs))
            .max_body_size(settings.max_body_size)
            .wait_until(args.wait_until.unwrap_or(settings.wait_until.into()))
            .channels(channels)
            .pattern(self.pattern(args)?)
            .build())
    }

    /// Browser launch options: file settings overridden by flags.
    pub fn browser_options(&self, args: &SniffArgs) -> BrowserOptions {
        let mut options = self.browser.clone();
        if args.headful {
            options.headless = false;
        }
        if let Some(chrome) = &args.chrome {
            options.executable = Some(chrome.clone());
        }
        if let Some(proxy) = &args.proxy {
            options.proxy = Some(proxy.clone());
        }
        if args.ignore_cert_errors {
            options.ignore_certificate_errors = true;
        }
        if args.no_sandbox {
            options.no_sandbox = true;
        }
        if let Some(user_agent) = &args.user_agent {
            options.user_agent = Some(user_agent.clone());
        }
        options
    }

    pub fn playback_enabled(&self, args: &SniffArgs) -> bool {
        self.discovery.playback && !args.no_playback
    }

    pub fn output_format(&self, args: &SniffArgs) -> OutputFormat {
        args.output.unwrap_or(self.output.format)
    }

    pub fn output_file(&self, args: &SniffArgs) -> Option<PathBuf> {
        args.output_file.clone().or_else(|| self.output.file.clone())
    }
}
