//! Nudging the page into starting playback.
//!
//! Many players only request their manifest once playback starts, so after
//! navigation settles the orchestrator runs a [`PlaybackTrigger`]. Triggers are
//! best effort: failures are logged and never end the run.

use async_trait::async_trait;
use tracing::{debug, trace};

use crate::session::Session;

/// Selectors of common play controls, tried in order.
pub const PLAY_BUTTON_SELECTORS: &[&str] = &[
    r#"button[aria-label*="play" i]"#,
    r#"button[title*="play" i]"#,
    ".vjs-big-play-button",
    ".jw-icon-playback",
    ".plyr__control--overlaid",
    r#"button[class*="play" i]"#,
];

/// Starts every media element muted, which autoplay policies allow.
const PLAY_MEDIA_SCRIPT: &str = r#"(() => {
  let started = 0;
  document.querySelectorAll('video').forEach((video) => {
    try {
      video.muted = true;
      const pending = video.play();
      if (pending && typeof pending.catch === 'function') {
        pending.catch(() => {});
      }
      started += 1;
    } catch (_) {}
  });
  return started;
})()"#;

#[async_trait]
pub trait PlaybackTrigger: Send + Sync {
    async fn trigger(&self, session: &dyn Session);
}

/// Clicks well-known play controls, then calls `play()` on every video.
#[derive(Debug, Clone)]
pub struct DefaultPlaybackTrigger {
    selectors: Vec<String>,
}

impl Default for DefaultPlaybackTrigger {
    fn default() -> Self {
        Self::with_selectors(PLAY_BUTTON_SELECTORS.iter().copied())
    }
}

impl DefaultPlaybackTrigger {
    pub fn with_selectors<I, S>(selectors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            selectors: selectors.into_iter().map(Into::into).collect(),
        }
    }

    pub fn selectors(&self) -> &[String] {
        &self.selectors
    }
}

#[async_trait]
impl PlaybackTrigger for DefaultPlaybackTrigger {
    async fn trigger(&self, session: &dyn Session) {
        let mut clicked = 0;
        for selector in &self.selectors {
            match session.click_all(selector).await {
                Ok(n) => clicked += n,
                Err(e) => trace!(selector, error = %e, "Play control click failed"),
            }
        }

        let started = match session.evaluate(PLAY_MEDIA_SCRIPT).await {
            Ok(value) => value.as_u64().unwrap_or(0),
            Err(e) => {
                trace!(error = %e, "Media play() failed");
                0
            }
        };
        debug!(clicked, started, "Playback trigger ran");
    }
}

/// Leaves the page alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPlaybackTrigger;

#[async_trait]
impl PlaybackTrigger for NoopPlaybackTrigger {
    async fn trigger(&self, _session: &dyn Session) {}
}
