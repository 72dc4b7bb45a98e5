use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::candidate::Signal;
use crate::recorder::CandidateRecorder;
use crate::session::Session;

const DOM_SCAN_SCRIPT: &str = include_str!("../../resources/dom_scan.js");

/// Strings collected from the rendered document in one evaluation.
///
/// URL-valued attributes arrive already resolved against the document's base
/// URI; only values the page could not parse as URLs are left raw.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomSnapshot {
    /// `src` and `currentSrc` of media elements and their `<source>` children.
    pub media: Vec<String>,
    /// Every `<source>` element's `src`.
    pub sources: Vec<String>,
    /// Values of the data attributes players commonly stash URLs in.
    pub data_attributes: Vec<String>,
    /// Text of every inline script.
    pub scripts: Vec<String>,
}

impl DomSnapshot {
    /// Feeds the snapshot to `recorder`; returns how many URLs were new.
    pub fn record(&self, recorder: &CandidateRecorder) -> usize {
        let attributes = self
            .media
            .iter()
            .chain(&self.sources)
            .filter(|value| recorder.accept(Signal::MediaElement, value))
            .count()
            + self
                .data_attributes
                .iter()
                .filter(|value| recorder.accept(Signal::DataAttribute, value))
                .count();

        let scripts: usize = self
            .scripts
            .iter()
            .map(|script| recorder.accept_text(Signal::InlineScript, script))
            .sum();

        attributes + scripts
    }
}

/// One-shot scan of the rendered document, run after navigation settles.
#[derive(Debug, Clone, Copy, Default)]
pub struct DomSnapshotScanner;

impl DomSnapshotScanner {
    /// Evaluates the scan script and records what it finds.
    ///
    /// Evaluation failures are logged and otherwise ignored; a page that
    /// cannot be scanned simply contributes nothing.
    pub async fn scan(&self, session: &dyn Session, recorder: &CandidateRecorder) -> usize {
        let value = match session.evaluate(DOM_SCAN_SCRIPT).await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "DOM snapshot evaluation failed");
                return 0;
            }
        };

        let snapshot: DomSnapshot = match serde_json::from_value(value) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "DOM snapshot had an unexpected shape");
                return 0;
            }
        };

        let found = snapshot.record(recorder);
        debug!(
            media = snapshot.media.len() + snapshot.sources.len(),
            data_attributes = snapshot.data_attributes.len(),
            scripts = snapshot.scripts.len(),
            found,
            "DOM snapshot scanned"
        );
        found
    }
}
