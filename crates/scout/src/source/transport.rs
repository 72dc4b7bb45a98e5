//! Network-layer observer: request URLs and bodies, response URLs, content
//! types, redirect targets and textual response bodies.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::task::JoinSet;
use tracing::{debug, trace};
use url::Url;

use super::{SignalSource, SourceContext, SourceHandle};
use crate::candidate::{Channel, Signal};
use crate::error::SessionError;
use crate::recorder::CandidateRecorder;
use crate::session::{EventStream, NetworkEvent, RequestEvent, ResponseEvent, Session};

const TEXTUAL_CONTENT_HINTS: &[&str] = &["json", "text", "javascript", "xml", "html"];
const TEXTUAL_EXTENSIONS: &[&str] = &[".json", ".js", ".html", ".txt"];

/// Watches every request and response the page makes.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportObserver;

#[async_trait]
impl SignalSource for TransportObserver {
    fn channel(&self) -> Channel {
        Channel::Transport
    }

    async fn attach(&self, ctx: &SourceContext) -> Result<SourceHandle, SessionError> {
        let events = ctx.session.network_events().await?;
        let ctx = ctx.clone();
        let task = tokio::spawn(async move { observe(ctx, events).await });
        Ok(SourceHandle::new(Channel::Transport, task))
    }
}

/// Responses whose bodies are worth reading once loading finishes, keyed by
/// request id.
#[derive(Debug)]
struct PendingBodies {
    max_body_size: u64,
    urls: HashMap<String, String>,
}

impl PendingBodies {
    fn new(max_body_size: u64) -> Self {
        Self {
            max_body_size,
            urls: HashMap::new(),
        }
    }

    /// Remembers `response` when its declared length fits under the ceiling.
    fn track(&mut self, response: ResponseEvent) {
        if response
            .content_length()
            .is_none_or(|len| len <= self.max_body_size)
        {
            self.urls.insert(response.request_id, response.url);
        } else {
            trace!(url = %response.url, "Skipping body with oversized content length");
        }
    }

    /// The URL whose body should be read now, if the request was tracked and
    /// what arrived fits under the ceiling.
    fn finish(&mut self, request_id: &str, encoded_data_length: u64) -> Option<String> {
        let url = self.urls.remove(request_id)?;
        if encoded_data_length > self.max_body_size {
            trace!(%url, encoded_data_length, "Skipping oversized body");
            return None;
        }
        Some(url)
    }

    fn fail(&mut self, request_id: &str) {
        self.urls.remove(request_id);
    }

    fn len(&self) -> usize {
        self.urls.len()
    }
}

async fn observe(ctx: SourceContext, mut events: EventStream<NetworkEvent>) {
    let mut pending = PendingBodies::new(ctx.config.max_body_size);
    let mut reads: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            _ = ctx.token.cancelled() => break,
            Some(_) = reads.join_next(), if !reads.is_empty() => {}
            event = events.next() => {
                let Some(event) = event else {
                    debug!("Network event stream ended");
                    break;
                };
                match event {
                    NetworkEvent::Request(request) => {
                        on_request(&ctx.recorder, &request);
                        if request.post_data.is_none() && request.has_post_data {
                            reads.spawn(read_post_data(
                                ctx.session.clone(),
                                ctx.recorder.clone(),
                                request.request_id,
                            ));
                        }
                    }
                    NetworkEvent::Response(response) => {
                        if on_response(&ctx.recorder, &response) && is_textual(&response) {
                            pending.track(response);
                        }
                    }
                    NetworkEvent::LoadingFinished { request_id, encoded_data_length } => {
                        if let Some(url) = pending.finish(&request_id, encoded_data_length) {
                            reads.spawn(read_body(
                                ctx.session.clone(),
                                ctx.recorder.clone(),
                                request_id,
                                url,
                            ));
                        }
                    }
                    NetworkEvent::LoadingFailed { request_id } => pending.fail(&request_id),
                }
            }
        }
    }

    trace!(unfinished = pending.len(), "Transport observer stopped");
    // In-flight reads are dropped with the set; the recorder is frozen by now
    // or about to be.
    reads.abort_all();
}

fn on_request(recorder: &CandidateRecorder, request: &RequestEvent) {
    recorder.accept(Signal::RequestUrl, &request.url);
    if let Some(post_data) = &request.post_data {
        recorder.accept_text(Signal::PostData, post_data);
    }
}

/// Applies the URL, content-type and redirect rules to `response`.
///
/// Returns false when the response was classified as a manifest by its
/// content type, in which case its body is not worth reading.
fn on_response(recorder: &CandidateRecorder, response: &ResponseEvent) -> bool {
    let pattern = recorder.pattern();
    let mut read_body = true;

    if pattern.is_target_url(&response.url) {
        recorder.accept(Signal::ResponseUrl, &response.url);
    } else if pattern.is_target_content_type(response.content_type()) {
        recorder.accept_classified(Signal::ContentType, &response.url);
        read_body = false;
    }

    if let Some(location) = response.header("location") {
        let resolved = Url::parse(&response.url)
            .and_then(|base| base.join(location.trim()))
            .map(String::from)
            .unwrap_or_else(|_| location.to_owned());
        recorder.accept(Signal::Location, &resolved);
    }

    read_body && !response.is_redirect()
}

fn is_textual(response: &ResponseEvent) -> bool {
    let content_type = response.content_type().to_ascii_lowercase();
    if TEXTUAL_CONTENT_HINTS
        .iter()
        .any(|hint| content_type.contains(hint))
    {
        return true;
    }

    let path = Url::parse(&response.url)
        .map(|url| url.path().to_ascii_lowercase())
        .unwrap_or_default();
    TEXTUAL_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

async fn read_body(
    session: Arc<dyn Session>,
    recorder: Arc<CandidateRecorder>,
    request_id: String,
    url: String,
) {
    match session.response_body(&request_id).await {
        Ok(body) => {
            let found = recorder.accept_text(Signal::ResponseBody, &body);
            trace!(%url, found, "Scanned response body");
        }
        // Bodies of preflights, evicted resources and redirects are routinely
        // unavailable.
        Err(e) => trace!(%url, error = %e, "Response body unavailable"),
    }
}

async fn read_post_data(
    session: Arc<dyn Session>,
    recorder: Arc<CandidateRecorder>,
    request_id: String,
) {
    match session.request_post_data(&request_id).await {
        Ok(body) => {
            recorder.accept_text(Signal::PostData, &body);
        }
        Err(e) => trace!(request_id, error = %e, "Post data unavailable"),
    }
}
