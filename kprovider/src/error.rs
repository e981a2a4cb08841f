//! Gateway error taxonomy and classification helpers.
//!
//! Exactly five kinds ever leave the gateway. Only rate limiting is retryable.
//!
//! ```rust
//! use kprovider::{GatewayError, GatewayErrorKind};
//!
//! let throttled = GatewayError::classify_code("ThrottlingException", "slow down");
//! assert_eq!(throttled.kind, GatewayErrorKind::RateLimitExceeded);
//! assert!(throttled.retryable);
//!
//! let denied = GatewayError::permission_denied("missing bedrock:Converse");
//! assert!(!denied.retryable);
//! ```

use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayErrorKind {
    RateLimitExceeded,
    PermissionDenied,
    InvalidRequest,
    UpstreamTimeout,
    Provider,
}

impl GatewayErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::PermissionDenied => "permission_denied",
            Self::InvalidRequest => "invalid_request",
            Self::UpstreamTimeout => "upstream_timeout",
            Self::Provider => "provider",
        }
    }
}

impl Display for GatewayErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayError {
    pub kind: GatewayErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl GatewayError {
    pub fn new(kind: GatewayErrorKind, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable,
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::RateLimitExceeded, message, true)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::PermissionDenied, message, false)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::InvalidRequest, message, false)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::UpstreamTimeout, message, false)
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorKind::Provider, message, false)
    }

    /// Maps a provider error code (`ThrottlingException`, `AccessDeniedException`, ...)
    /// onto the taxonomy. Unknown codes become `Provider` and keep the code in the message.
    pub fn classify_code(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let normalized = normalize_code(code);

        match normalized.as_str() {
            "throttlingexception" | "toomanyrequestsexception" | "servicequotaexceededexception" => {
                Self::rate_limited(message)
            }
            "accessdeniedexception" | "unrecognizedclientexception" | "forbidden" => {
                Self::permission_denied(message)
            }
            "validationexception" => Self::invalid_request(format!("invalid request: {message}")),
            "modeltimeoutexception" | "requesttimeout" => Self::timeout(message),
            _ if normalized.is_empty() => Self::provider(message),
            _ => Self::provider(format!("provider error ({code}): {message}")),
        }
    }

    /// Classification by HTTP status, used when the provider sent no error code.
    pub fn classify_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => Self::rate_limited(message),
            401 | 403 => Self::permission_denied(message),
            400 | 422 => Self::invalid_request(format!("invalid request: {message}")),
            408 | 504 => Self::timeout(message),
            _ => Self::provider(format!("provider error (status {status}): {message}")),
        }
    }
}

fn normalize_code(code: &str) -> String {
    // `x-amzn-errortype` values look like `ThrottlingException:http://internal.amazon.com/...`.
    let code = code.split(':').next().unwrap_or_default();
    let code = code.rsplit('#').next().unwrap_or_default();
    code.trim().to_ascii_lowercase()
}

impl Display for GatewayError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl Error for GatewayError {}
