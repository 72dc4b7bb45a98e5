use std::fmt;

use serde::{Deserialize, Serialize};

/// Independent observation channel attached to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum Channel {
    /// Network requests and responses seen by the session.
    Transport,
    /// In-page hooks reporting through the out-of-band console channel.
    Instrumentation,
    /// One-shot scan of the rendered document.
    DomSnapshot,
    /// WebSocket-style message frames.
    MessageFrame,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Transport,
        Channel::Instrumentation,
        Channel::DomSnapshot,
        Channel::MessageFrame,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Transport => "transport",
            Channel::Instrumentation => "instrumentation",
            Channel::DomSnapshot => "dom-snapshot",
            Channel::MessageFrame => "message-frame",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The concrete observation that produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Signal {
    RequestUrl,
    PostData,
    ResponseUrl,
    ContentType,
    ResponseBody,
    Location,
    Fetch,
    Xhr,
    MediaSrc,
    LibraryLoad,
    /// Instrumentation message with a tag this build does not know.
    Hook,
    MediaElement,
    DataAttribute,
    InlineScript,
    Frame,
}

impl Signal {
    pub fn channel(&self) -> Channel {
        match self {
            Signal::RequestUrl
            | Signal::PostData
            | Signal::ResponseUrl
            | Signal::ContentType
            | Signal::ResponseBody
            | Signal::Location => Channel::Transport,
            Signal::Fetch | Signal::Xhr | Signal::MediaSrc | Signal::LibraryLoad | Signal::Hook => {
                Channel::Instrumentation
            }
            Signal::MediaElement | Signal::DataAttribute | Signal::InlineScript => {
                Channel::DomSnapshot
            }
            Signal::Frame => Channel::MessageFrame,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::RequestUrl => "request-url",
            Signal::PostData => "post-data",
            Signal::ResponseUrl => "response-url",
            Signal::ContentType => "content-type",
            Signal::ResponseBody => "response-body",
            Signal::Location => "location",
            Signal::Fetch => "fetch",
            Signal::Xhr => "xhr",
            Signal::MediaSrc => "media-src",
            Signal::LibraryLoad => "library-load",
            Signal::Hook => "hook",
            Signal::MediaElement => "media-element",
            Signal::DataAttribute => "data-attribute",
            Signal::InlineScript => "inline-script",
            Signal::Frame => "frame",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.channel(), self.as_str())
    }
}

/// A manifest URL accepted by the recorder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candidate {
    /// Absolute form, the uniqueness key.
    pub url: String,
    /// The string as the channel observed it.
    pub raw: String,
    pub channel: Channel,
    pub signal: Signal,
    /// Milliseconds between recorder creation and acceptance.
    pub elapsed_ms: u64,
}
