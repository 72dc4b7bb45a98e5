//! # Scout
//!
//! Finds the streaming manifest URL (by default an HLS `.m3u8` playlist) that a
//! rendered web page requests, embeds or signals while its player starts up.
//!
//! A [`Discovery`] run attaches several independent observers to one
//! [`Session`](session::Session) and records whatever they see into a shared
//! [`CandidateRecorder`]:
//!
//! - [`TransportObserver`] - request and response URLs, content types,
//!   redirect targets, post data and textual bodies
//! - [`InstrumentationChannel`] - hooks injected before page scripts that
//!   report `fetch`, XHR, media `src` and streaming-library loads
//! - [`DomSnapshotScanner`] - one pass over media elements, data attributes
//!   and inline scripts once the page settles
//! - [`MessageFrameListener`] - text frames on the page's WebSocket connections
//!
//! The run ends on the first accepted candidate or when the time budget runs
//! out, whichever happens first.
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use scout_engine::session::cdp::{BrowserOptions, CdpSession};
//! use scout_engine::{TargetPattern, discover};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let session = CdpSession::launch(&BrowserOptions::default()).await?;
//! let report = discover(
//!     session,
//!     "https://example.com/live",
//!     TargetPattern::hls(),
//!     Duration::from_secs(35),
//! )
//! .await?;
//! println!("{:?}", report.outcome.urls());
//! # Ok(())
//! # }
//! ```

pub mod candidate;
pub mod config;
pub mod discovery;
pub mod error;
pub mod matcher;
pub mod playback;
pub mod recorder;
pub mod session;
pub mod source;

pub use candidate::{Candidate, Channel, Signal};
pub use config::{DiscoveryConfig, DiscoveryConfigBuilder};
pub use discovery::{Discovery, DiscoveryOutcome, DiscoveryReport, RunState, discover};
pub use error::{DiscoveryError, SessionError};
pub use matcher::{TargetPattern, extract_target_urls, is_target_content_type, is_target_url};
pub use playback::{DefaultPlaybackTrigger, NoopPlaybackTrigger, PlaybackTrigger};
pub use recorder::CandidateRecorder;
pub use source::{
    DomSnapshot, DomSnapshotScanner, InstrumentationChannel, MessageFrameListener, SignalSource,
    TransportObserver,
};
