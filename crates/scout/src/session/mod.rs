//! The rendering session every signal source attaches to.
//!
//! The engine never drives a browser directly; it talks to a [`Session`],
//! which exposes navigation, script injection and evaluation plus three event
//! streams (network, console, message frames). [`cdp::CdpSession`] implements
//! it over the Chrome DevTools Protocol.

#[cfg(feature = "chromium")]
pub mod cdp;

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::SessionError;

pub type EventStream<T> = BoxStream<'static, T>;

/// Page readiness a navigation waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum WaitUntil {
    /// The main document has been parsed.
    #[default]
    DomContentLoaded,
    /// The main document and its subresources finished loading.
    Load,
}

/// Identifier of a script registered to run before page scripts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptId(pub String);

impl ScriptId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEvent {
    Request(RequestEvent),
    Response(ResponseEvent),
    /// A response body is fully received and can be read.
    LoadingFinished {
        request_id: String,
        encoded_data_length: u64,
    },
    /// The request failed or was cancelled; no body will follow.
    LoadingFailed { request_id: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestEvent {
    pub request_id: String,
    pub url: String,
    pub method: String,
    /// Inline post data when the session already has it.
    pub post_data: Option<String>,
    /// Whether the request carries a body that can be fetched separately.
    pub has_post_data: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResponseEvent {
    pub request_id: String,
    pub url: String,
    pub status: u16,
    pub mime_type: String,
    pub headers: Vec<(String, String)>,
}

impl ResponseEvent {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The `Content-Type` header, falling back to the session-reported MIME type.
    pub fn content_type(&self) -> &str {
        self.header("content-type")
            .filter(|ct| !ct.is_empty())
            .unwrap_or(&self.mime_type)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length")
            .and_then(|len| len.trim().parse().ok())
    }

    pub fn is_redirect(&self) -> bool {
        matches!(self.status, 301 | 302 | 303 | 307 | 308)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FramePayload {
    Text(String),
    Binary { len: usize },
}

/// A message received on a duplex connection opened by the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameEvent {
    pub connection_id: String,
    pub payload: FramePayload,
}

/// A rendering session owned by exactly one discovery run.
///
/// Event streams must be requested before navigation; events that happened
/// before a stream was created are not replayed.
#[async_trait]
pub trait Session: Send + Sync {
    /// Network requests, responses and completed loads.
    async fn network_events(&self) -> Result<EventStream<NetworkEvent>, SessionError>;

    /// Text of every console message, across the main document and its frames.
    async fn console_messages(&self) -> Result<EventStream<String>, SessionError>;

    /// Frames received on WebSocket-style connections.
    async fn message_frames(&self) -> Result<EventStream<FrameEvent>, SessionError>;

    /// Registers `source` to run in every new document before its own scripts.
    async fn add_init_script(&self, source: &str) -> Result<ScriptId, SessionError>;

    async fn remove_init_script(&self, id: &ScriptId) -> Result<(), SessionError>;

    async fn navigate(
        &self,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<(), SessionError>;

    /// Evaluates `expression` in the main document and returns its JSON value.
    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value, SessionError>;

    /// Activates every element matching `selector`; returns how many were clicked.
    async fn click_all(&self, selector: &str) -> Result<usize, SessionError>;

    async fn response_body(&self, request_id: &str) -> Result<String, SessionError>;

    async fn request_post_data(&self, request_id: &str) -> Result<String, SessionError>;

    async fn close(&self) -> Result<(), SessionError>;
}
