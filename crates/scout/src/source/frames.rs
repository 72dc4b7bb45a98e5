use async_trait::async_trait;
use tracing::trace;

use super::{SignalSource, SourceContext, SourceHandle, pump};
use crate::candidate::{Channel, Signal};
use crate::error::SessionError;
use crate::recorder::CandidateRecorder;
use crate::session::{FrameEvent, FramePayload};

/// Scans text frames received on the page's WebSocket-style connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageFrameListener;

#[async_trait]
impl SignalSource for MessageFrameListener {
    fn channel(&self) -> Channel {
        Channel::MessageFrame
    }

    async fn attach(&self, ctx: &SourceContext) -> Result<SourceHandle, SessionError> {
        let frames = ctx.session.message_frames().await?;
        let recorder = ctx.recorder.clone();
        let token = ctx.token.clone();
        let task = tokio::spawn(async move {
            pump(Channel::MessageFrame, frames, token, |frame| {
                on_frame(&recorder, &frame)
            })
            .await;
        });
        Ok(SourceHandle::new(Channel::MessageFrame, task))
    }
}

fn on_frame(recorder: &CandidateRecorder, frame: &FrameEvent) {
    match &frame.payload {
        FramePayload::Text(text) => {
            recorder.accept_text(Signal::Frame, text);
        }
        FramePayload::Binary { len } => {
            trace!(connection = %frame.connection_id, len, "Ignoring binary frame");
        }
    }
}
