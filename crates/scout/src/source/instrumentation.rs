//! In-page hooks reporting manifest URLs over the console channel.
//!
//! The hook script is registered to run before any page script. It wraps
//! `fetch`, `XMLHttpRequest.open`, the media element `src` setter and, once it
//! appears, the streaming library's `loadSource`. Every matching value is
//! logged as `<prefix><TAG>:<url>`; the Rust side only trusts messages that
//! carry the run's prefix.

use async_trait::async_trait;
use tracing::{debug, trace};

use super::{SignalSource, SourceContext, SourceHandle, pump};
use crate::candidate::{Channel, Signal};
use crate::config::DiscoveryConfig;
use crate::error::SessionError;
use crate::recorder::CandidateRecorder;

const HOOKS_TEMPLATE: &str = include_str!("../../resources/hooks.js");

/// Interception points of the hook script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstrumentationHook {
    Fetch,
    Xhr,
    MediaSrc,
    LibraryLoad,
}

impl InstrumentationHook {
    pub const ALL: [InstrumentationHook; 4] = [
        InstrumentationHook::Fetch,
        InstrumentationHook::Xhr,
        InstrumentationHook::MediaSrc,
        InstrumentationHook::LibraryLoad,
    ];

    /// Tag the hook script writes between prefix and colon.
    pub fn tag(&self) -> &'static str {
        match self {
            InstrumentationHook::Fetch => "FETCH",
            InstrumentationHook::Xhr => "XHR",
            InstrumentationHook::MediaSrc => "MEDIA_SRC",
            InstrumentationHook::LibraryLoad => "HLS_LOAD",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|hook| hook.tag() == tag)
    }

    pub fn signal(&self) -> Signal {
        match self {
            InstrumentationHook::Fetch => Signal::Fetch,
            InstrumentationHook::Xhr => Signal::Xhr,
            InstrumentationHook::MediaSrc => Signal::MediaSrc,
            InstrumentationHook::LibraryLoad => Signal::LibraryLoad,
        }
    }
}

/// Renders the hook script for `config`'s pattern, prefix and library watch.
pub fn render_hooks(config: &DiscoveryConfig) -> String {
    let json = |s: &str| serde_json::Value::from(s).to_string();
    HOOKS_TEMPLATE
        .replace("{{PATTERN}}", &json(config.pattern.suffix_source()))
        .replace("{{PREFIX}}", &json(&config.tag_prefix))
        .replace(
            "{{WATCH_INTERVAL_MS}}",
            &config.library_watch_interval.as_millis().to_string(),
        )
        .replace(
            "{{WATCH_ATTEMPTS}}",
            &config.library_watch_attempts.to_string(),
        )
}

/// Splits a tagged console message into its signal and URL.
///
/// Returns `None` for messages without `prefix`, which are page noise.
fn parse_message<'a>(prefix: &str, message: &'a str) -> Option<(Signal, &'a str)> {
    let rest = message.strip_prefix(prefix)?;
    let (tag, url) = rest.split_once(':')?;
    let signal = InstrumentationHook::from_tag(tag)
        .map(|hook| hook.signal())
        .unwrap_or(Signal::Hook);
    Some((signal, url))
}

fn on_message(recorder: &CandidateRecorder, prefix: &str, message: &str) {
    match parse_message(prefix, message) {
        Some((signal, url)) => {
            recorder.accept(signal, url);
        }
        None => trace!("Ignoring untagged console message"),
    }
}

/// Installs the hook script and listens for its messages.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstrumentationChannel;

#[async_trait]
impl SignalSource for InstrumentationChannel {
    fn channel(&self) -> Channel {
        Channel::Instrumentation
    }

    async fn attach(&self, ctx: &SourceContext) -> Result<SourceHandle, SessionError> {
        // Subscribe first so nothing the script logs on the first document is
        // missed.
        let messages = ctx.session.console_messages().await?;
        let script_id = ctx
            .session
            .add_init_script(&render_hooks(&ctx.config))
            .await?;
        debug!(script_id = script_id.as_str(), "Hook script installed");

        let recorder = ctx.recorder.clone();
        let prefix = ctx.config.tag_prefix.clone();
        let token = ctx.token.clone();
        let task = tokio::spawn(async move {
            pump(Channel::Instrumentation, messages, token, |message| {
                on_message(&recorder, &prefix, &message)
            })
            .await;
        });

        Ok(SourceHandle::new(Channel::Instrumentation, task).with_init_script(script_id))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rstest::rstest;
    use url::Url;

    use super::*;
    use crate::config::DEFAULT_TAG_PREFIX;
    use crate::matcher::TargetPattern;

    #[rstest]
    #[case("__SCOUT_FETCH:https://a/x.m3u8", Some((Signal::Fetch, "https://a/x.m3u8")))]
    #[case("__SCOUT_XHR:https://a/x.m3u8", Some((Signal::Xhr, "https://a/x.m3u8")))]
    #[case("__SCOUT_MEDIA_SRC:blob:https://a/1", Some((Signal::MediaSrc, "blob:https://a/1")))]
    #[case("__SCOUT_HLS_LOAD:https://a/x.m3u8", Some((Signal::LibraryLoad, "https://a/x.m3u8")))]
    #[case("__SCOUT_SHAKA:https://a/x.m3u8", Some((Signal::Hook, "https://a/x.m3u8")))]
    #[case("FETCH:https://a/x.m3u8", None)]
    #[case("__SCOUT_FETCH", None)]
    #[case("player ready https://a/x.m3u8", None)]
    fn parses_tagged_messages(#[case] message: &str, #[case] expected: Option<(Signal, &str)>) {
        assert_eq!(parse_message(DEFAULT_TAG_PREFIX, message), expected);
    }

    #[test]
    fn untagged_messages_never_record() {
        let recorder = CandidateRecorder::new(
            Url::parse("https://example.com/").unwrap(),
            TargetPattern::hls(),
        );
        on_message(&recorder, DEFAULT_TAG_PREFIX, "https://cdn.example.com/a.m3u8");
        assert!(recorder.is_empty());

        on_message(
            &recorder,
            DEFAULT_TAG_PREFIX,
            "__SCOUT_FETCH:https://cdn.example.com/a.m3u8",
        );
        assert_eq!(recorder.len(), 1);
        assert_eq!(recorder.snapshot()[0].channel, Channel::Instrumentation);
    }

    #[test]
    fn rendered_hooks_have_no_placeholders() {
        let config = DiscoveryConfig::builder()
            .tag_prefix("__TEST_")
            .library_watch(Duration::from_millis(250), 8)
            .build();
        let script = render_hooks(&config);

        assert!(!script.contains("{{"));
        assert!(script.contains(r#"const PREFIX = "__TEST_";"#));
        assert!(script.contains(r#"new RegExp("\\.m3u8(\\?|#|$)", 'i')"#));
        assert!(script.contains("const WATCH_INTERVAL_MS = 250;"));
        assert!(script.contains("const WATCH_ATTEMPTS = 8;"));
    }

    #[test]
    fn tags_round_trip() {
        for hook in InstrumentationHook::ALL {
            assert_eq!(InstrumentationHook::from_tag(hook.tag()), Some(hook));
            assert_eq!(hook.signal().channel(), Channel::Instrumentation);
        }
    }
}
