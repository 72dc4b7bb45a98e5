//! The single critical section shared by every signal source.

use std::collections::HashSet;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, trace};
use url::Url;

use crate::candidate::{Candidate, Signal};
use crate::matcher::TargetPattern;

#[derive(Debug)]
struct RecorderState {
    seen: HashSet<String>,
    candidates: Vec<Candidate>,
    frozen: bool,
    /// Origin of `Candidate::elapsed_ms`.
    started: Instant,
}

/// Dedupe set plus insertion-ordered log of accepted manifest URLs.
///
/// Check-and-insert happens under one lock, so concurrent sources can never
/// both win the first acceptance of the same URL. After [`freeze`](Self::freeze)
/// every accept is rejected.
#[derive(Debug)]
pub struct CandidateRecorder {
    base: Url,
    pattern: TargetPattern,
    state: Mutex<RecorderState>,
    accepted: watch::Sender<usize>,
}

impl CandidateRecorder {
    /// `base` is the page URL relative candidates resolve against.
    ///
    /// Candidate timestamps count from now until [`start_clock`](Self::start_clock)
    /// moves the origin.
    pub fn new(base: Url, pattern: TargetPattern) -> Self {
        let (accepted, _) = watch::channel(0);
        Self {
            base,
            pattern,
            state: Mutex::new(RecorderState {
                seen: HashSet::new(),
                candidates: Vec::new(),
                frozen: false,
                started: Instant::now(),
            }),
            accepted,
        }
    }

    /// Measures candidate timestamps from `origin`, the moment the run starts
    /// driving the page.
    pub fn start_clock(&self, origin: Instant) {
        self.state.lock().started = origin;
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn pattern(&self) -> &TargetPattern {
        &self.pattern
    }

    /// Validates `raw` against the suffix rule and records it on first sight.
    ///
    /// Returns true only for the call that first records the resolved URL.
    pub fn accept(&self, signal: Signal, raw: &str) -> bool {
        let raw = raw.trim();
        if !self.pattern.is_target_url(raw) {
            return false;
        }
        self.accept_classified(signal, raw)
    }

    /// Records `raw` without the suffix rule, for URLs another rule already
    /// classified (e.g. a manifest content type).
    pub fn accept_classified(&self, signal: Signal, raw: &str) -> bool {
        let raw = raw.trim();
        if raw.is_empty() {
            return false;
        }
        let Some(url) = self.resolve(raw) else {
            trace!(raw, "Discarding unparseable candidate");
            return false;
        };
        self.record(signal, raw, url)
    }

    /// Scans `text` for embedded absolute manifest URLs and accepts each one.
    ///
    /// Returns how many URLs were newly recorded.
    pub fn accept_text(&self, signal: Signal, text: &str) -> usize {
        self.pattern
            .extract_target_urls(text)
            .into_iter()
            .filter(|url| self.accept(signal, url))
            .count()
    }

    pub fn len(&self) -> usize {
        self.state.lock().candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ordered snapshot of everything accepted so far.
    pub fn snapshot(&self) -> Vec<Candidate> {
        self.state.lock().candidates.clone()
    }

    /// Watch channel carrying the number of accepted candidates.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.accepted.subscribe()
    }

    /// Stops accepting and returns the final ordered list.
    pub fn freeze(&self) -> Vec<Candidate> {
        let mut state = self.state.lock();
        state.frozen = true;
        state.candidates.clone()
    }

    pub fn is_frozen(&self) -> bool {
        self.state.lock().frozen
    }

    fn resolve(&self, raw: &str) -> Option<String> {
        let url = self.base.join(raw).ok()?;
        if url.cannot_be_a_base() {
            return None;
        }
        Some(url.into())
    }

    fn record(&self, signal: Signal, raw: &str, url: String) -> bool {
        let mut state = self.state.lock();
        if state.frozen {
            debug!(url = %url, signal = %signal, "Recorder frozen, dropping late candidate");
            return false;
        }
        if state.seen.contains(&url) {
            trace!(url = %url, signal = %signal, "Duplicate candidate");
            return false;
        }

        state.seen.insert(url.clone());
        let elapsed_ms = Instant::now()
            .saturating_duration_since(state.started)
            .as_millis() as u64;
        info!(url = %url, signal = %signal, elapsed_ms, "Found manifest URL");
        state.candidates.push(Candidate {
            url,
            raw: raw.to_string(),
            channel: signal.channel(),
            signal,
            elapsed_ms,
        });
        let count = state.candidates.len();
        self.accepted.send_replace(count);
        true
    }
}
