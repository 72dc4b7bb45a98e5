use std::time::Duration;

use crate::candidate::Channel;
use crate::error::DiscoveryError;
use crate::matcher::TargetPattern;
use crate::session::WaitUntil;

/// Prefix of every message the in-page hooks emit.
pub const DEFAULT_TAG_PREFIX: &str = "__SCOUT_";

/// Tunables of a discovery run
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Hard deadline for the whole run, measured from the start of navigation
    pub time_budget: Duration,

    /// How often the orchestrator re-checks the recorder while waiting
    pub poll_interval: Duration,

    /// Pause between navigation and the playback trigger, letting page init
    /// scripts run
    pub settle_delay: Duration,

    /// Timeout handed to the session's navigate call
    pub navigation_timeout: Duration,

    /// Readiness the navigation waits for
    pub wait_until: WaitUntil,

    /// Textual response bodies larger than this are not read
    pub max_body_size: u64,

    /// Interval at which in-page code looks for the streaming library
    pub library_watch_interval: Duration,

    /// Number of library checks before the watcher stops
    pub library_watch_attempts: u32,

    /// Prefix of tagged instrumentation messages
    pub tag_prefix: String,

    /// How long detached sources get to wind down before they are aborted
    pub detach_grace: Duration,

    /// Channels attached for the run
    pub channels: Vec<Channel>,

    /// What counts as a manifest
    pub pattern: TargetPattern,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            time_budget: Duration::from_secs(35),
            poll_interval: Duration::from_millis(250),
            settle_delay: Duration::from_millis(800),
            navigation_timeout: Duration::from_secs(60),
            wait_until: WaitUntil::DomContentLoaded,
            max_body_size: 2 * 1024 * 1024, // 2MB
            library_watch_interval: Duration::from_secs(1),
            library_watch_attempts: 60,
            tag_prefix: DEFAULT_TAG_PREFIX.to_owned(),
            detach_grace: Duration::from_millis(500),
            channels: Channel::ALL.to_vec(),
            pattern: TargetPattern::hls(),
        }
    }
}

impl DiscoveryConfig {
    pub fn builder() -> DiscoveryConfigBuilder {
        DiscoveryConfigBuilder::new()
    }

    pub fn is_enabled(&self, channel: Channel) -> bool {
        self.channels.contains(&channel)
    }

    pub fn validate(&self) -> Result<(), DiscoveryError> {
        if self.time_budget.is_zero() {
            return Err(DiscoveryError::configuration("time budget must be positive"));
        }
        if self.poll_interval.is_zero() {
            return Err(DiscoveryError::configuration(
                "poll interval must be positive",
            ));
        }
        if self.library_watch_interval.is_zero() {
            return Err(DiscoveryError::configuration(
                "library watch interval must be positive",
            ));
        }
        if self.tag_prefix.is_empty() || self.tag_prefix.contains(':') {
            return Err(DiscoveryError::configuration(
                "tag prefix must be non-empty and must not contain ':'",
            ));
        }
        Ok(())
    }
}

/// Fluent builder for [`DiscoveryConfig`].
#[derive(Debug, Clone, Default)]
pub struct DiscoveryConfigBuilder {
    config: DiscoveryConfig,
}

impl DiscoveryConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn time_budget(mut self, budget: Duration) -> Self {
        self.config.time_budget = budget;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.config.settle_delay = delay;
        self
    }

    pub fn navigation_timeout(mut self, timeout: Duration) -> Self {
        self.config.navigation_timeout = timeout;
        self
    }

    pub fn wait_until(mut self, wait_until: WaitUntil) -> Self {
        self.config.wait_until = wait_until;
        self
    }

    pub fn max_body_size(mut self, bytes: u64) -> Self {
        self.config.max_body_size = bytes;
        self
    }

    pub fn library_watch(mut self, interval: Duration, attempts: u32) -> Self {
        self.config.library_watch_interval = interval;
        self.config.library_watch_attempts = attempts;
        self
    }

    pub fn tag_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.tag_prefix = prefix.into();
        self
    }

    pub fn detach_grace(mut self, grace: Duration) -> Self {
        self.config.detach_grace = grace;
        self
    }

    pub fn channels(mut self, channels: impl IntoIterator<Item = Channel>) -> Self {
        let mut selected: Vec<Channel> = Vec::new();
        for channel in channels {
            if !selected.contains(&channel) {
                selected.push(channel);
            }
        }
        self.config.channels = selected;
        self
    }

    pub fn pattern(mut self, pattern: TargetPattern) -> Self {
        self.config.pattern = pattern;
        self
    }

    pub fn build(self) -> DiscoveryConfig {
        self.config
    }
}
