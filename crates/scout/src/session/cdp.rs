//! [`Session`] over the Chrome DevTools Protocol, backed by `chromiumoxide`.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::cdp::browser_protocol::network::{
    self, EventLoadingFinished, EventRequestWillBeSent, EventResponseReceived,
    EventLoadingFailed, EventWebSocketFrameReceived, GetRequestPostDataParams,
    GetResponseBodyParams, Headers, PostDataEntry, RequestId, Response,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, EventDomContentEventFired, EventLoadEventFired,
    NavigateParams, RemoveScriptToEvaluateOnNewDocumentParams, ScriptIdentifier,
};
use chromiumoxide::cdp::js_protocol::runtime::{self, EvaluateParams, EventConsoleApiCalled};
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::{
    EventStream, FrameEvent, FramePayload, NetworkEvent, RequestEvent, ResponseEvent, ScriptId,
    Session, WaitUntil,
};
use crate::error::SessionError;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// How the browser behind a [`CdpSession`] is launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserOptions {
    pub headless: bool,
    /// Chromium binary; auto-detected when unset.
    pub executable: Option<PathBuf>,
    pub window_width: u32,
    pub window_height: u32,
    pub user_agent: Option<String>,
    /// Proxy server, e.g. `http://127.0.0.1:8080` for an intercepting proxy.
    pub proxy: Option<String>,
    pub ignore_certificate_errors: bool,
    pub no_sandbox: bool,
    /// Let media start without a user gesture.
    pub autoplay: bool,
    /// Keep Chromium's per-site process isolation.
    ///
    /// Off by default: an isolated cross-site iframe becomes a separate target
    /// whose network, console and WebSocket events never reach the page
    /// session, and init scripts are not injected into it. Embedded players
    /// usually live in exactly such frames.
    pub site_isolation: bool,
    pub extra_args: Vec<String>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            window_width: 1366,
            window_height: 768,
            user_agent: Some(DEFAULT_USER_AGENT.to_string()),
            proxy: None,
            ignore_certificate_errors: false,
            no_sandbox: false,
            autoplay: true,
            site_isolation: false,
            extra_args: Vec::new(),
        }
    }
}

impl BrowserOptions {
    /// Command-line switches beyond what the launcher sets itself.
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.autoplay {
            args.push("--autoplay-policy=no-user-gesture-required".to_string());
        }
        if let Some(user_agent) = &self.user_agent {
            args.push(format!("--user-agent={user_agent}"));
        }
        if let Some(proxy) = &self.proxy {
            args.push(format!("--proxy-server={proxy}"));
        }
        if self.ignore_certificate_errors {
            args.push("--ignore-certificate-errors".to_string());
        }
        if !self.site_isolation {
            args.push("--disable-site-isolation-trials".to_string());
            args.push("--disable-features=IsolateOrigins,site-per-process".to_string());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }

    fn to_config(&self) -> Result<BrowserConfig, SessionError> {
        let mut builder = BrowserConfig::builder()
            .window_size(self.window_width, self.window_height)
            .args(self.args());
        if !self.headless {
            builder = builder.with_head();
        }
        if self.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(executable) = &self.executable {
            builder = builder.chrome_executable(executable);
        }
        builder.build().map_err(SessionError::launch)
    }
}

/// A single page in a freshly launched browser.
pub struct CdpSession {
    page: Page,
    browser: Mutex<Option<Browser>>,
    handler: JoinHandle<()>,
}

impl CdpSession {
    /// Launches a browser and opens a blank page with network and runtime
    /// events enabled.
    pub async fn launch(options: &BrowserOptions) -> Result<Self, SessionError> {
        let config = options.to_config()?;
        info!(
            headless = options.headless,
            executable = ?options.executable,
            proxy = ?options.proxy,
            "Launching browser"
        );

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SessionError::launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "Browser handler stopped");
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(e) => {
                let _ = browser.close().await;
                handler.abort();
                return Err(SessionError::launch(format!("failed to open page: {e}")));
            }
        };

        page.execute(network::EnableParams::default())
            .await
            .map_err(protocol)?;
        page.execute(runtime::EnableParams::default())
            .await
            .map_err(protocol)?;

        Ok(Self {
            page,
            browser: Mutex::new(Some(browser)),
            handler,
        })
    }
}

fn protocol(e: CdpError) -> SessionError {
    SessionError::protocol(e.to_string())
}

fn headers(headers: &Headers) -> Vec<(String, String)> {
    headers
        .inner()
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(name, value)| {
                    let value = value
                        .as_str()
                        .map(str::to_owned)
                        .unwrap_or_else(|| value.to_string());
                    (name.clone(), value)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn response_event(request_id: &RequestId, response: &Response) -> ResponseEvent {
    ResponseEvent {
        request_id: request_id.inner().clone(),
        url: response.url.clone(),
        status: u16::try_from(response.status).unwrap_or_default(),
        mime_type: response.mime_type.clone(),
        headers: headers(&response.headers),
    }
}

fn request_events(event: &EventRequestWillBeSent) -> Vec<NetworkEvent> {
    let mut events = Vec::with_capacity(2);
    // A redirect hop arrives folded into the follow-up request.
    if let Some(redirect) = &event.redirect_response {
        events.push(NetworkEvent::Response(response_event(
            &event.request_id,
            redirect,
        )));
    }
    events.push(NetworkEvent::Request(RequestEvent {
        request_id: event.request_id.inner().clone(),
        url: event.request.url.clone(),
        method: event.request.method.clone(),
        post_data: event
            .request
            .post_data_entries
            .as_deref()
            .and_then(post_data),
        has_post_data: event.request.has_post_data.unwrap_or(false),
    }));
    events
}

/// Concatenates the base64 `bytes` of every entry. `None` when there is
/// nothing or an entry does not decode, leaving the body to be fetched on
/// demand.
fn post_data(entries: &[PostDataEntry]) -> Option<String> {
    let mut body = Vec::new();
    for bytes in entries.iter().filter_map(|entry| entry.bytes.as_ref()) {
        let encoded: &str = bytes.as_ref();
        match base64::engine::general_purpose::STANDARD.decode(encoded) {
            Ok(decoded) => body.extend_from_slice(&decoded),
            Err(e) => {
                trace!(error = %e, "Undecodable post data entry");
                return None;
            }
        }
    }
    (!body.is_empty()).then(|| String::from_utf8_lossy(&body).into_owned())
}

fn console_text(event: &EventConsoleApiCalled) -> String {
    event
        .args
        .iter()
        .filter_map(|arg| match &arg.value {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(value) => Some(value.to_string()),
            None => arg.description.clone(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn frame_event(event: &EventWebSocketFrameReceived) -> FrameEvent {
    let frame = &event.response;
    // Opcode 1 is a text frame; everything else arrives base64-encoded.
    let payload = if frame.opcode == 1.0 {
        FramePayload::Text(frame.payload_data.clone())
    } else {
        FramePayload::Binary {
            len: frame.payload_data.len(),
        }
    };
    FrameEvent {
        connection_id: event.request_id.inner().clone(),
        payload,
    }
}

#[async_trait]
impl Session for CdpSession {
    async fn network_events(&self) -> Result<EventStream<NetworkEvent>, SessionError> {
        let requests = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(protocol)?
            .flat_map(|event| stream::iter(request_events(&event)));
        let responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(protocol)?
            .map(|event| NetworkEvent::Response(response_event(&event.request_id, &event.response)));
        let finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(protocol)?
            .map(|event| NetworkEvent::LoadingFinished {
                request_id: event.request_id.inner().clone(),
                encoded_data_length: event.encoded_data_length.max(0.0) as u64,
            });

        let failed = self
            .page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(protocol)?
            .map(|event| NetworkEvent::LoadingFailed {
                request_id: event.request_id.inner().clone(),
            });

        let streams: Vec<BoxStream<'static, NetworkEvent>> = vec![
            requests.boxed(),
            responses.boxed(),
            finished.boxed(),
            failed.boxed(),
        ];
        Ok(stream::select_all(streams).boxed())
    }

    async fn console_messages(&self) -> Result<EventStream<String>, SessionError> {
        let messages = self
            .page
            .event_listener::<EventConsoleApiCalled>()
            .await
            .map_err(protocol)?
            .map(|event| console_text(&event));
        Ok(messages.boxed())
    }

    async fn message_frames(&self) -> Result<EventStream<FrameEvent>, SessionError> {
        let frames = self
            .page
            .event_listener::<EventWebSocketFrameReceived>()
            .await
            .map_err(protocol)?
            .map(|event| frame_event(&event));
        Ok(frames.boxed())
    }

    async fn add_init_script(&self, source: &str) -> Result<ScriptId, SessionError> {
        let response = self
            .page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(source))
            .await
            .map_err(protocol)?;
        Ok(ScriptId(response.result.identifier.inner().clone()))
    }

    async fn remove_init_script(&self, id: &ScriptId) -> Result<(), SessionError> {
        self.page
            .execute(RemoveScriptToEvaluateOnNewDocumentParams::new(
                ScriptIdentifier::new(id.as_str()),
            ))
            .await
            .map_err(protocol)?;
        Ok(())
    }

    async fn navigate(
        &self,
        url: &str,
        wait_until: WaitUntil,
        timeout: Duration,
    ) -> Result<(), SessionError> {
        let mut ready: BoxStream<'static, ()> = match wait_until {
            WaitUntil::DomContentLoaded => self
                .page
                .event_listener::<EventDomContentEventFired>()
                .await
                .map_err(protocol)?
                .map(|_| ())
                .boxed(),
            WaitUntil::Load => self
                .page
                .event_listener::<EventLoadEventFired>()
                .await
                .map_err(protocol)?
                .map(|_| ())
                .boxed(),
        };

        let navigation = async {
            let response = self
                .page
                .execute(NavigateParams::new(url))
                .await
                .map_err(|e| SessionError::navigation(url, e.to_string()))?;
            if let Some(error) = &response.result.error_text {
                return Err(SessionError::navigation(url, error.clone()));
            }
            ready.next().await;
            Ok(())
        };

        tokio::time::timeout(timeout, navigation)
            .await
            .map_err(|_| SessionError::NavigationTimeout {
                url: url.to_string(),
                timeout,
            })?
    }

    async fn evaluate(&self, expression: &str) -> Result<serde_json::Value, SessionError> {
        let params = EvaluateParams::builder()
            .expression(expression)
            .return_by_value(true)
            .await_promise(true)
            .build()
            .map_err(SessionError::evaluation)?;
        let response = self.page.execute(params).await.map_err(protocol)?;

        if let Some(exception) = &response.result.exception_details {
            return Err(SessionError::evaluation(exception.text.clone()));
        }
        Ok(response
            .result
            .result
            .value
            .clone()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn click_all(&self, selector: &str) -> Result<usize, SessionError> {
        let elements = self.page.find_elements(selector).await.map_err(protocol)?;
        let mut clicked = 0;
        for element in &elements {
            match element.click().await {
                Ok(_) => clicked += 1,
                Err(e) => trace!(selector, error = %e, "Element not clickable"),
            }
        }
        Ok(clicked)
    }

    async fn response_body(&self, request_id: &str) -> Result<String, SessionError> {
        let response = self
            .page
            .execute(GetResponseBodyParams::new(RequestId::new(request_id)))
            .await
            .map_err(|_| SessionError::not_available(format!("body of {request_id}")))?;

        let body = &response.result;
        if body.base64_encoded {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(&body.body)
                .map_err(|e| SessionError::protocol(format!("bad body encoding: {e}")))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        } else {
            Ok(body.body.clone())
        }
    }

    async fn request_post_data(&self, request_id: &str) -> Result<String, SessionError> {
        let response = self
            .page
            .execute(GetRequestPostDataParams::new(RequestId::new(request_id)))
            .await
            .map_err(|_| SessionError::not_available(format!("post data of {request_id}")))?;
        Ok(response.result.post_data.clone())
    }

    async fn close(&self) -> Result<(), SessionError> {
        let Some(mut browser) = self.browser.lock().await.take() else {
            return Ok(());
        };

        let result = browser.close().await;
        if let Err(e) = browser.wait().await {
            warn!(error = %e, "Browser process did not exit cleanly");
        }
        self.handler.abort();
        debug!("Browser closed");
        result.map(|_| ()).map_err(protocol)
    }
}
