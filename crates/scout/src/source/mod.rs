//! Signal sources: independent observers that feed the recorder.
//!
//! Continuous sources implement [`SignalSource`]: attaching subscribes to a
//! session stream and spawns a task that runs until the run's cancellation
//! token fires. The DOM scanner is one-shot and is invoked by the orchestrator
//! directly.

mod dom;
mod frames;
mod instrumentation;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::candidate::Channel;
use crate::config::DiscoveryConfig;
use crate::error::SessionError;
use crate::recorder::CandidateRecorder;
use crate::session::{EventStream, ScriptId, Session};

pub use dom::{DomSnapshot, DomSnapshotScanner};
pub use frames::MessageFrameListener;
pub use instrumentation::{InstrumentationChannel, InstrumentationHook, render_hooks};
pub use transport::TransportObserver;

/// Everything a source needs for one run.
#[derive(Clone)]
pub struct SourceContext {
    pub session: Arc<dyn Session>,
    pub recorder: Arc<CandidateRecorder>,
    pub config: Arc<DiscoveryConfig>,
    pub token: CancellationToken,
}

/// An attached source: its event task and any in-page state it installed.
#[derive(Debug)]
pub struct SourceHandle {
    channel: Channel,
    task: JoinHandle<()>,
    init_script: Option<ScriptId>,
}

impl SourceHandle {
    pub fn new(channel: Channel, task: JoinHandle<()>) -> Self {
        Self {
            channel,
            task,
            init_script: None,
        }
    }

    pub fn with_init_script(mut self, id: ScriptId) -> Self {
        self.init_script = Some(id);
        self
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Waits up to `grace` for the task to observe cancellation, aborts it
    /// otherwise, then removes any injected script.
    ///
    /// The run's token must already be cancelled.
    pub async fn detach(self, session: &dyn Session, grace: Duration) {
        let Self {
            channel,
            mut task,
            init_script,
        } = self;

        if tokio::time::timeout(grace, &mut task).await.is_err() {
            debug!(%channel, "Source did not stop within grace period, aborting");
            task.abort();
        }

        if let Some(id) = init_script
            && let Err(e) = session.remove_init_script(&id).await
        {
            debug!(%channel, error = %e, "Failed to remove injected script");
        }
        debug!(%channel, "Source detached");
    }
}

/// A continuously running observer of one session channel.
#[async_trait]
pub trait SignalSource: Send + Sync {
    fn channel(&self) -> Channel;

    /// Subscribes to the session and spawns the observer task.
    ///
    /// Must complete before navigation starts.
    async fn attach(&self, ctx: &SourceContext) -> Result<SourceHandle, SessionError>;
}

/// The continuous sources enabled by `config`.
pub fn continuous_sources(config: &DiscoveryConfig) -> Vec<Box<dyn SignalSource>> {
    let mut sources: Vec<Box<dyn SignalSource>> = Vec::new();
    for channel in &config.channels {
        match channel {
            Channel::Transport => sources.push(Box::new(TransportObserver)),
            Channel::Instrumentation => sources.push(Box::new(InstrumentationChannel)),
            Channel::MessageFrame => sources.push(Box::new(MessageFrameListener)),
            Channel::DomSnapshot => {}
        }
    }
    sources
}

/// Feeds every event of `events` to `handle` until the stream ends or `token`
/// is cancelled.
pub(crate) async fn pump<T, F>(
    channel: Channel,
    mut events: EventStream<T>,
    token: CancellationToken,
    mut handle: F,
) where
    T: Send + 'static,
    F: FnMut(T) + Send,
{
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            event = events.next() => match event {
                Some(event) => handle(event),
                None => {
                    debug!(%channel, "Session stream ended");
                    break;
                }
            },
        }
    }
}
