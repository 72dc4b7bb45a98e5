//! The orchestrator: attaches every source to one session, drives the page and
//! races the first recorded candidate against the run's deadline.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::candidate::{Candidate, Channel};
use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, SessionError};
use crate::matcher::TargetPattern;
use crate::playback::{DefaultPlaybackTrigger, PlaybackTrigger};
use crate::recorder::CandidateRecorder;
use crate::session::Session;
use crate::source::{DomSnapshotScanner, SourceContext, SourceHandle, continuous_sources};

/// States of a discovery run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Running,
    Found,
    Timeout,
    Terminated,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Init => "init",
            RunState::Running => "running",
            RunState::Found => "found",
            RunState::Timeout => "timeout",
            RunState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Final outcome of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DiscoveryOutcome {
    /// Every candidate accepted before the recorder froze, in acceptance order.
    Found { candidates: Vec<Candidate> },
    NotFound,
}

impl DiscoveryOutcome {
    fn from_candidates(candidates: Vec<Candidate>) -> Self {
        if candidates.is_empty() {
            Self::NotFound
        } else {
            Self::Found { candidates }
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found { .. })
    }

    pub fn candidates(&self) -> &[Candidate] {
        match self {
            Self::Found { candidates } => candidates,
            Self::NotFound => &[],
        }
    }

    pub fn urls(&self) -> Vec<&str> {
        self.candidates().iter().map(|c| c.url.as_str()).collect()
    }

    /// The first URL found, if any.
    pub fn first(&self) -> Option<&str> {
        self.candidates().first().map(|c| c.url.as_str())
    }
}

/// What a run hands back to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    /// The normalized page URL.
    pub target: String,
    #[serde(flatten)]
    pub outcome: DiscoveryOutcome,
    /// Set when navigation failed; the run still used whatever was captured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation_error: Option<String>,
    /// Channels that could not attach to the session.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_sources: Vec<Channel>,
    /// Time spent in the running state.
    pub elapsed_ms: u64,
}

/// Runs discovery against sessions with one configuration.
#[derive(Clone)]
pub struct Discovery {
    config: Arc<DiscoveryConfig>,
    trigger: Arc<dyn PlaybackTrigger>,
}

impl fmt::Debug for Discovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Discovery")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for Discovery {
    fn default() -> Self {
        Self::new(DiscoveryConfig::default())
    }
}

impl Discovery {
    pub fn new(config: DiscoveryConfig) -> Self {
        Self {
            config: Arc::new(config),
            trigger: Arc::new(DefaultPlaybackTrigger::default()),
        }
    }

    pub fn with_playback_trigger(mut self, trigger: impl PlaybackTrigger + 'static) -> Self {
        self.trigger = Arc::new(trigger);
        self
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Runs one discovery against `session`, which is closed before this
    /// returns.
    ///
    /// Only precondition failures (bad target, bad configuration) produce an
    /// `Err`; everything that goes wrong once the page is running is absorbed
    /// into the report.
    #[instrument(skip(self, session), fields(target = %target))]
    pub async fn run<S>(&self, session: S, target: &str) -> Result<DiscoveryReport, DiscoveryError>
    where
        S: Session + 'static,
    {
        let session: Arc<dyn Session> = Arc::new(session);

        let target = match self.config.validate().and_then(|()| parse_target(target)) {
            Ok(target) => target,
            Err(e) => {
                close(&*session).await;
                return Err(e);
            }
        };

        debug!(state = %RunState::Init, "Attaching sources");
        let recorder = Arc::new(CandidateRecorder::new(
            target.clone(),
            self.config.pattern.clone(),
        ));
        let token = CancellationToken::new();
        let ctx = SourceContext {
            session: session.clone(),
            recorder: recorder.clone(),
            config: self.config.clone(),
            token: token.clone(),
        };

        let mut handles: Vec<SourceHandle> = Vec::new();
        let mut skipped_sources = Vec::new();
        for source in continuous_sources(&self.config) {
            let channel = source.channel();
            match source.attach(&ctx).await {
                Ok(handle) => {
                    debug!(%channel, "Source attached");
                    handles.push(handle);
                }
                Err(e) => {
                    warn!(%channel, error = %e, "Source unavailable, skipping");
                    skipped_sources.push(channel);
                }
            }
        }

        debug!(state = %RunState::Running, "Navigating");
        let started = Instant::now();
        recorder.start_clock(started);
        let (state, navigation_error) = self.race(&*session, &recorder, &target, started).await;

        token.cancel();
        let candidates = recorder.freeze();
        let elapsed = started.elapsed();
        match state {
            RunState::Found => info!(
                count = candidates.len(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Manifest found"
            ),
            _ => info!(
                elapsed_ms = elapsed.as_millis() as u64,
                "Time budget exhausted"
            ),
        }

        let grace = self.config.detach_grace;
        futures::future::join_all(
            handles
                .into_iter()
                .map(|handle| handle.detach(&*session, grace)),
        )
        .await;
        close(&*session).await;
        debug!(state = %RunState::Terminated, "Run finished");

        Ok(DiscoveryReport {
            target: target.into(),
            outcome: DiscoveryOutcome::from_candidates(candidates),
            navigation_error: navigation_error.map(|e| e.to_string()),
            skipped_sources,
            elapsed_ms: elapsed.as_millis() as u64,
        })
    }

    /// Waits for a non-empty recorder or the deadline while the page is
    /// driven. Returns the terminal state and any navigation failure.
    async fn race(
        &self,
        session: &dyn Session,
        recorder: &CandidateRecorder,
        target: &Url,
        started: Instant,
    ) -> (RunState, Option<SessionError>) {
        let deadline = started + self.config.time_budget;
        let mut accepted = recorder.subscribe();
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Written as soon as navigation settles, the rest of the drive may
        // still be running when the race ends.
        let navigation_error = Mutex::new(None);
        let drive = self.drive(session, recorder, target, &navigation_error);
        tokio::pin!(drive);
        let mut driving = true;

        let state = loop {
            if !recorder.is_empty() {
                break RunState::Found;
            }
            tokio::select! {
                biased;
                _ = tokio::time::sleep_until(deadline) => {
                    break if recorder.is_empty() { RunState::Timeout } else { RunState::Found };
                }
                _ = &mut drive, if driving => driving = false,
                _ = accepted.changed() => {}
                _ = ticker.tick() => {}
            }
        };
        let navigation_error = navigation_error.lock().take();
        (state, navigation_error)
    }

    /// Navigate, let the page settle, try to start playback, scan the DOM.
    async fn drive(
        &self,
        session: &dyn Session,
        recorder: &CandidateRecorder,
        target: &Url,
        navigation_error: &Mutex<Option<SessionError>>,
    ) {
        if let Err(e) = session
            .navigate(
                target.as_str(),
                self.config.wait_until,
                self.config.navigation_timeout,
            )
            .await
        {
            warn!(error = %e, "Navigation failed, continuing with what the page produced");
            *navigation_error.lock() = Some(e);
        }

        tokio::time::sleep(self.config.settle_delay).await;
        self.trigger.trigger(session).await;

        if self.config.is_enabled(Channel::DomSnapshot) {
            DomSnapshotScanner.scan(session, recorder).await;
        }
    }
}

/// Runs discovery with the default configuration, `pattern` and `time_budget`.
pub async fn discover<S>(
    session: S,
    target_url: &str,
    pattern: TargetPattern,
    time_budget: Duration,
) -> Result<DiscoveryReport, DiscoveryError>
where
    S: Session + 'static,
{
    let config = DiscoveryConfig::builder()
        .pattern(pattern)
        .time_budget(time_budget)
        .build();
    Discovery::new(config).run(session, target_url).await
}

fn parse_target(input: &str) -> Result<Url, DiscoveryError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(DiscoveryError::MissingTarget);
    }
    let url = Url::parse(input).map_err(|e| DiscoveryError::invalid_target(input, e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(DiscoveryError::invalid_target(
            input,
            "not a hierarchical URL",
        ));
    }
    Ok(url)
}

async fn close(session: &dyn Session) {
    if let Err(e) = session.close().await {
        debug!(error = %e, "Failed to close session");
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::candidate::Signal;

    #[rstest]
    #[case("")]
    #[case("   ")]
    fn empty_target_is_missing(#[case] input: &str) {
        assert!(matches!(
            parse_target(input),
            Err(DiscoveryError::MissingTarget)
        ));
    }

    #[rstest]
    #[case("not a url")]
    #[case("mailto:someone@example.com")]
    #[case("/relative/path")]
    fn unparseable_target_is_invalid(#[case] input: &str) {
        assert!(matches!(
            parse_target(input),
            Err(DiscoveryError::InvalidTarget { .. })
        ));
    }

    #[test]
    fn target_is_trimmed() {
        let url = parse_target("  https://example.com/watch?v=1 ").unwrap();
        assert_eq!(url.as_str(), "https://example.com/watch?v=1");
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let report = DiscoveryReport {
            target: "https://example.com/".to_string(),
            outcome: DiscoveryOutcome::from_candidates(vec![Candidate {
                url: "https://cdn.example.com/a.m3u8".to_string(),
                raw: "https://cdn.example.com/a.m3u8".to_string(),
                channel: Channel::Transport,
                signal: Signal::ResponseUrl,
                elapsed_ms: 12,
            }]),
            navigation_error: None,
            skipped_sources: Vec::new(),
            elapsed_ms: 40,
        };

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["status"], "found");
        assert_eq!(value["candidates"][0]["signal"], "response-url");
        assert!(value.get("navigation_error").is_none());

        let back: DiscoveryReport = serde_json::from_value(value).unwrap();
        assert_eq!(back, report);
        assert_eq!(back.outcome.first(), Some("https://cdn.example.com/a.m3u8"));
    }

    #[test]
    fn empty_candidates_are_not_found() {
        let outcome = DiscoveryOutcome::from_candidates(Vec::new());
        assert!(!outcome.is_found());
        assert!(outcome.urls().is_empty());
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({ "status": "not_found" })
        );
    }
}
