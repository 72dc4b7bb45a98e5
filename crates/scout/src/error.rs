use std::time::Duration;

/// Errors that abort a discovery run before it produces an outcome.
///
/// Channel-local failures never surface here: a source that cannot attach is
/// skipped and a failed navigation is reported on the
/// [`DiscoveryReport`](crate::DiscoveryReport).
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("no target URL was provided")]
    MissingTarget,

    #[error("invalid target URL `{input}`: {reason}")]
    InvalidTarget { input: String, reason: String },

    #[error("invalid target pattern `{extension}`: {reason}")]
    InvalidPattern { extension: String, reason: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },
}

impl DiscoveryError {
    pub fn invalid_target(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTarget {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_pattern(extension: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            extension: extension.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }
}

/// Errors raised by a [`Session`](crate::session::Session) implementation.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("browser launch failed: {reason}")]
    Launch { reason: String },

    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("navigation to {url} timed out after {timeout:?}")]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("{capability} is not supported by this session")]
    Unsupported { capability: &'static str },

    #[error("script evaluation failed: {reason}")]
    Evaluation { reason: String },

    #[error("protocol error: {reason}")]
    Protocol { reason: String },

    #[error("resource not available: {resource}")]
    NotAvailable { resource: String },
}

impl SessionError {
    pub fn launch(reason: impl Into<String>) -> Self {
        Self::Launch {
            reason: reason.into(),
        }
    }

    pub fn navigation(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Navigation {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    pub fn evaluation(reason: impl Into<String>) -> Self {
        Self::Evaluation {
            reason: reason.into(),
        }
    }

    pub fn not_available(resource: impl Into<String>) -> Self {
        Self::NotAvailable {
            resource: resource.into(),
        }
    }
}
