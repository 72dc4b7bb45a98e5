//! Classification of candidate strings as streaming-manifest URLs.
//!
//! A page can reveal a manifest in three ways: the URL itself carries the
//! manifest suffix, a response announces a manifest content type without the
//! suffix, or a text blob (script, JSON, HTML, frame payload) embeds an
//! absolute manifest URL. [`TargetPattern`] answers all three questions for one
//! manifest flavour; the free functions use the built-in HLS pattern.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use crate::error::DiscoveryError;

/// Extension of HLS playlists.
pub const HLS_EXTENSION: &str = "m3u8";

/// Content-type fragments that identify an HLS playlist response.
pub const HLS_CONTENT_TYPES: &[&str] = &[
    "mpegurl",
    "x-mpegurl",
    "vnd.apple.mpegurl",
    "vnd.apple.m3u8",
];

static HLS_PATTERN: LazyLock<TargetPattern> = LazyLock::new(|| {
    TargetPattern::new(HLS_EXTENSION, HLS_CONTENT_TYPES.iter().copied()).unwrap()
});

/// Matching rules for one manifest flavour.
#[derive(Debug, Clone)]
pub struct TargetPattern {
    extension: String,
    suffix: Regex,
    embedded: Regex,
    content_types: Vec<String>,
}

impl TargetPattern {
    /// The HLS (`.m3u8`) pattern.
    pub fn hls() -> Self {
        HLS_PATTERN.clone()
    }

    /// Builds a pattern for manifests ending in `.{extension}`.
    ///
    /// `content_types` are lowercase fragments searched for inside a
    /// `Content-Type` header value; an empty list disables content-type matching.
    pub fn new<I, S>(extension: &str, content_types: I) -> Result<Self, DiscoveryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let extension = extension.trim().trim_start_matches('.').to_ascii_lowercase();
        if extension.is_empty() {
            return Err(DiscoveryError::invalid_pattern(
                extension,
                "extension must not be empty",
            ));
        }
        if !extension
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(DiscoveryError::invalid_pattern(
                extension,
                "extension may only contain ASCII letters, digits, '-' and '_'",
            ));
        }

        let escaped = regex::escape(&extension);
        let suffix = RegexBuilder::new(&format!(r"\.{escaped}(\?|#|$)"))
            .case_insensitive(true)
            .build()
            .map_err(|e| DiscoveryError::invalid_pattern(&extension, e.to_string()))?;
        let embedded = RegexBuilder::new(&format!(
            r#"https?://[^'"\s>]+\.{escaped}[^'"\s>]*"#
        ))
        .case_insensitive(true)
        .build()
        .map_err(|e| DiscoveryError::invalid_pattern(&extension, e.to_string()))?;

        let content_types = content_types
            .into_iter()
            .map(|ct| ct.into().to_ascii_lowercase())
            .filter(|ct| !ct.is_empty())
            .collect();

        Ok(Self {
            extension,
            suffix,
            embedded,
            content_types,
        })
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Source of the suffix expression, shared with the in-page hooks.
    ///
    /// The expression only uses syntax that JavaScript's `RegExp` reads the
    /// same way.
    pub fn suffix_source(&self) -> &str {
        self.suffix.as_str()
    }

    pub fn content_types(&self) -> &[String] {
        &self.content_types
    }

    /// True iff `s` carries the manifest suffix, optionally followed by a query
    /// or fragment.
    pub fn is_target_url(&self, s: &str) -> bool {
        !s.is_empty() && self.suffix.is_match(s)
    }

    /// All absolute manifest URLs embedded in `text`, in order of appearance.
    ///
    /// Duplicates are preserved.
    pub fn extract_target_urls<'a>(&self, text: &'a str) -> Vec<&'a str> {
        self.embedded.find_iter(text).map(|m| m.as_str()).collect()
    }

    /// True iff a `Content-Type` header value names a manifest media type.
    pub fn is_target_content_type(&self, content_type: &str) -> bool {
        if content_type.is_empty() || self.content_types.is_empty() {
            return false;
        }
        let content_type = content_type.to_ascii_lowercase();
        self.content_types
            .iter()
            .any(|ct| content_type.contains(ct.as_str()))
    }
}

impl Default for TargetPattern {
    fn default() -> Self {
        Self::hls()
    }
}

#[inline]
pub fn is_target_url(s: &str) -> bool {
    HLS_PATTERN.is_target_url(s)
}

#[inline]
pub fn extract_target_urls(text: &str) -> Vec<&str> {
    HLS_PATTERN.extract_target_urls(text)
}

#[inline]
pub fn is_target_content_type(content_type: &str) -> bool {
    HLS_PATTERN.is_target_content_type(content_type)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("https://x/a.m3u8", true)]
    #[case("https://x/a.M3U8?t=1", true)]
    #[case("https://x/a.m3u8#frag", true)]
    #[case("/live/index.m3u8", true)]
    #[case("index.m3u8", true)]
    #[case("https://x/a.m3u82", false)]
    #[case("https://x/a.m3u8/segment.ts", false)]
    #[case("https://x/a.mp4", false)]
    #[case("https://x/m3u8", false)]
    #[case("", false)]
    fn suffix_matching(#[case] input: &str, #[case] expected: bool) {
        assert_eq!(is_target_url(input), expected, "input: {input:?}");
    }

    #[rstest]
    #[case("application/vnd.apple.mpegurl", true)]
    #[case("application/x-mpegURL; charset=utf-8", true)]
    #[case("audio/mpegurl", true)]
    #[case("application/vnd.apple.m3u8", true)]
    #[case("application/json", false)]
    #[case("video/mp2t", false)]
    #[case("", false)]
    fn content_type_matching(#[case] header: &str, #[case] expected: bool) {
        assert_eq!(is_target_content_type(header), expected, "header: {header:?}");
    }

    #[test]
    fn extracts_embedded_urls_in_order() {
        let text = r#"{"a":"https://cdn.example.com/live/master.m3u8?token=1","b":'http://b.example/x.M3U8'}
            <source src="https://c.example/v.m3u8">
            https://cdn.example.com/live/master.m3u8?token=1"#;

        assert_eq!(
            extract_target_urls(text),
            vec![
                "https://cdn.example.com/live/master.m3u8?token=1",
                "http://b.example/x.M3U8",
                "https://c.example/v.m3u8",
                "https://cdn.example.com/live/master.m3u8?token=1",
            ]
        );
    }

    #[test]
    fn ignores_relative_urls_in_text() {
        assert!(extract_target_urls(r#"player.load("/live/index.m3u8")"#).is_empty());
        assert!(extract_target_urls("nothing to see here").is_empty());
    }

    #[test]
    fn custom_extension() {
        let dash = TargetPattern::new(".MPD", ["application/dash+xml"]).unwrap();
        assert_eq!(dash.extension(), "mpd");
        assert!(dash.is_target_url("https://x/manifest.mpd?x=1"));
        assert!(!dash.is_target_url("https://x/index.m3u8"));
        assert!(dash.is_target_content_type("application/dash+xml"));
        assert_eq!(
            dash.extract_target_urls("see https://x/a.mpd now"),
            vec!["https://x/a.mpd"]
        );
    }

    #[test]
    fn rejects_invalid_extensions() {
        assert!(TargetPattern::new("", HLS_CONTENT_TYPES.iter().copied()).is_err());
        assert!(TargetPattern::new("m3u8|mp4", Vec::<String>::new()).is_err());
    }

    #[test]
    fn suffix_source_is_javascript_compatible() {
        assert_eq!(TargetPattern::hls().suffix_source(), r"\.m3u8(\?|#|$)");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// Re-extracting from the joined output of a previous extraction yields
        /// the same URLs.
        #[test]
        fn prop_extraction_is_idempotent(
            prefix in "[a-z ]{0,12}",
            hosts in proptest::collection::vec("[a-z]{1,8}", 1..5),
            query in proptest::option::of("[a-z0-9=&]{1,10}"),
            suffix in "[a-z ]{0,12}",
        ) {
            let mut text = prefix.clone();
            for host in &hosts {
                text.push_str(" https://");
                text.push_str(host);
                text.push_str(".example/live.m3u8");
                if let Some(q) = &query {
                    text.push('?');
                    text.push_str(q);
                }
                text.push(' ');
            }
            text.push_str(&suffix);

            let first = extract_target_urls(&text);
            prop_assert_eq!(first.len(), hosts.len());

            let joined = first.join("\n");
            let second = extract_target_urls(&joined);
            prop_assert_eq!(first, second);
        }

        /// Every extracted URL is itself a target URL.
        #[test]
        fn prop_extracted_urls_match_suffix(
            host in "[a-z]{1,10}",
            path in "[a-z/]{0,10}",
        ) {
            let text = format!("src='https://{host}.example/{path}index.m3u8'");
            for url in extract_target_urls(&text) {
                prop_assert!(is_target_url(url));
            }
        }
    }
}
