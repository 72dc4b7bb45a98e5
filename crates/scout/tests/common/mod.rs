//! A scripted, in-memory [`Session`] for driving the orchestrator in tests.
//!
//! Navigating "loads" the page: every scheduled [`PageEvent`] is delivered on
//! its stream after its offset from the navigation call. Hook messages are
//! only delivered when the instrumentation script is installed, the way a real
//! page only reports through hooks it was given.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc::{self, UnboundedSender};
use parking_lot::Mutex;
use scout_engine::SessionError;
use scout_engine::session::{
    EventStream, FrameEvent, FramePayload, NetworkEvent, RequestEvent, ResponseEvent, ScriptId,
    Session, WaitUntil,
};

/// Something the page does after navigation starts.
#[derive(Debug, Clone)]
pub enum PageEvent {
    Network(NetworkEvent),
    Console(String),
    /// Reported by an installed hook as `<prefix><tag>:<value>`.
    Hook { tag: &'static str, value: String },
    Frame(FramePayload),
}

impl PageEvent {
    pub fn request(id: &str, url: &str) -> Self {
        Self::Network(NetworkEvent::Request(RequestEvent {
            request_id: id.to_string(),
            url: url.to_string(),
            method: "GET".to_string(),
            ..Default::default()
        }))
    }

    pub fn response(id: &str, url: &str, content_type: &str) -> Self {
        Self::Network(NetworkEvent::Response(ResponseEvent {
            request_id: id.to_string(),
            url: url.to_string(),
            status: 200,
            mime_type: content_type.to_string(),
            headers: vec![("Content-Type".to_string(), content_type.to_string())],
        }))
    }

    /// A response carrying a `Content-Length` header.
    pub fn sized_response(id: &str, url: &str, content_type: &str, len: u64) -> Self {
        Self::Network(NetworkEvent::Response(ResponseEvent {
            request_id: id.to_string(),
            url: url.to_string(),
            status: 200,
            mime_type: content_type.to_string(),
            headers: vec![
                ("Content-Type".to_string(), content_type.to_string()),
                ("Content-Length".to_string(), len.to_string()),
            ],
        }))
    }

    pub fn failed(id: &str) -> Self {
        Self::Network(NetworkEvent::LoadingFailed {
            request_id: id.to_string(),
        })
    }

    pub fn finished(id: &str, len: u64) -> Self {
        Self::Network(NetworkEvent::LoadingFinished {
            request_id: id.to_string(),
            encoded_data_length: len,
        })
    }

    pub fn hook(tag: &'static str, value: &str) -> Self {
        Self::Hook {
            tag,
            value: value.to_string(),
        }
    }

    pub fn text_frame(text: &str) -> Self {
        Self::Frame(FramePayload::Text(text.to_string()))
    }
}

/// What the test can observe about the session after the run.
#[derive(Debug, Default)]
pub struct SessionLog {
    pub closed: AtomicBool,
    pub scripts_added: AtomicUsize,
    pub scripts_removed: AtomicUsize,
    pub navigations: Mutex<Vec<String>>,
    pub clicked_selectors: Mutex<Vec<String>>,
    pub evaluations: AtomicUsize,
}

impl SessionLog {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct Streams {
    network: Vec<UnboundedSender<NetworkEvent>>,
    console: Vec<UnboundedSender<String>>,
    frames: Vec<UnboundedSender<FrameEvent>>,
}

pub struct ScriptedSession {
    events: Vec<(Duration, PageEvent)>,
    bodies: HashMap<String, String>,
    dom: serde_json::Value,
    navigation_error: Option<String>,
    frames_supported: bool,
    scripts: Arc<Mutex<HashMap<String, String>>>,
    streams: Arc<Mutex<Streams>>,
    next_script: AtomicUsize,
    log: Arc<SessionLog>,
}

impl Default for ScriptedSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            bodies: HashMap::new(),
            dom: serde_json::json!({}),
            navigation_error: None,
            frames_supported: true,
            scripts: Arc::new(Mutex::new(HashMap::new())),
            streams: Arc::new(Mutex::new(Streams::default())),
            next_script: AtomicUsize::new(0),
            log: Arc::new(SessionLog::default()),
        }
    }

    /// Delivers `event` immediately once navigation starts.
    pub fn on_load(self, event: PageEvent) -> Self {
        self.after(Duration::ZERO, event)
    }

    /// Delivers `event` `delay` after navigation starts.
    pub fn after(mut self, delay: Duration, event: PageEvent) -> Self {
        self.events.push((delay, event));
        self
    }

    pub fn with_body(mut self, request_id: &str, body: &str) -> Self {
        self.bodies.insert(request_id.to_string(), body.to_string());
        self
    }

    /// Value the DOM scan evaluation returns.
    pub fn with_dom(mut self, dom: serde_json::Value) -> Self {
        self.dom = dom;
        self
    }

    pub fn failing_navigation(mut self, reason: &str) -> Self {
        self.navigation_error = Some(reason.to_string());
        self
    }

    pub fn without_frames(mut self) -> Self {
        self.frames_supported = false;
        self
    }

    pub fn log(&self) -> Arc<SessionLog> {
        self.log.clone()
    }
}

/// The tag prefix baked into an installed hook script.
fn installed_prefix(scripts: &HashMap<String, String>) -> Option<String> {
    scripts.values().find_map(|source| {
        let line = source
            .lines()
            .find(|line| line.trim_start().starts_with("const PREFIX = "))?;
        let literal = line
            .trim()
            .trim_start_matches("const PREFIX = ")
            .trim_end_matches(';');
        serde_json::from_str::<String>(literal).ok()
    })
}

fn deliver(
    streams: &Mutex<Streams>,
    scripts: &Mutex<HashMap<String, String>>,
    event: PageEvent,
) {
    let streams = streams.lock();
    match event {
        PageEvent::Network(event) => {
            for tx in &streams.network {
                let _ = tx.unbounded_send(event.clone());
            }
        }
        PageEvent::Console(message) => {
            for tx in &streams.console {
                let _ = tx.unbounded_send(message.clone());
            }
        }
        PageEvent::Hook { tag, value } => {
            let Some(prefix) = installed_prefix(&scripts.lock()) else {
                return;
            };
            let message = format!("{prefix}{tag}:{value}");
            for tx in &streams.console {
                let _ = tx.unbounded_send(message.clone());
            }
        }
        PageEvent::Frame(payload) => {
            for tx in &streams.frames {
                let _ = tx.unbounded_send(FrameEvent {
                    connection_id: "ws-1".to_string(),
                    payload: payload.clone(),
                });
            }
        }
    }
}

#[async_trait]
impl Session for ScriptedSession {
    async fn network_events(&self) -> Result<EventStream<NetworkEvent>, SessionError> {
        let (tx, rx) = mpsc::unbounded();
        self.streams.lock().network.push(tx);
        Ok(rx.boxed())
    }

    async fn console_messages(&self) -> Result<EventStream<String>, SessionError> {
        let (tx, rx) = mpsc::unbounded();
        self.streams.lock().console.push(tx);
        Ok(rx.boxed())
    }

    async fn message_frames(&self) -> Result<EventStream<FrameEvent>, SessionError> {
        if !self.frames_supported {
            return Err(SessionError::Unsupported {
                capability: "message frames",
            });
        }
        let (tx, rx) = mpsc::unbounded();
        self.streams.lock().frames.push(tx);
        Ok(rx.boxed())
    }

    async fn add_init_script(&self, source: &str) -> Result<ScriptId, SessionError> {
        let id = format!("script-{}", self.next_script.fetch_add(1, Ordering::SeqCst));
        self.scripts.lock().insert(id.clone(), source.to_string());
        self.log.scripts_added.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptId(id))
    }

    async fn remove_init_script(&self, id: &ScriptId) -> Result<(), SessionError> {
        if self.scripts.lock().remove(id.as_str()).is_some() {
            self.log.scripts_removed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn navigate(
        &self,
        url: &str,
        _wait_until: WaitUntil,
        _timeout: Duration,
    ) -> Result<(), SessionError> {
        self.log.navigations.lock().push(url.to_string());

        let mut events = self.events.clone();
        events.sort_by_key(|(delay, _)| *delay);
        let streams = self.streams.clone();
        let scripts = self.scripts.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now();
            for (delay, event) in events {
                tokio::time::sleep_until(start + delay).await;
                deliver(&streams, &scripts, event);
            }
        });
        // Let events scheduled at zero offset land before navigation returns.
        tokio::task::yield_now().await;

        match &self.navigation_error {
            Some(reason) => Err(SessionError::navigation(url, reason.clone())),
            None => Ok(()),
        }
    }

    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value, SessionError> {
        self.log.evaluations.fetch_add(1, Ordering::SeqCst);
        if expression.contains("data_attributes") {
            Ok(self.dom.clone())
        } else {
            Ok(serde_json::Value::from(0))
        }
    }

    async fn click_all(&self, selector: &str) -> Result<usize, SessionError> {
        self.log
            .clicked_selectors
            .lock()
            .push(selector.to_string());
        Ok(0)
    }

    async fn response_body(&self, request_id: &str) -> Result<String, SessionError> {
        self.bodies
            .get(request_id)
            .cloned()
            .ok_or_else(|| SessionError::not_available(format!("body of {request_id}")))
    }

    async fn request_post_data(&self, request_id: &str) -> Result<String, SessionError> {
        Err(SessionError::not_available(format!(
            "post data of {request_id}"
        )))
    }

    async fn close(&self) -> Result<(), SessionError> {
        *self.streams.lock() = Streams::default();
        self.log.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Installs a test subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
