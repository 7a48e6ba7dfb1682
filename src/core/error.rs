//! Error types shared by the request engine and the turn coordinators.

use std::fmt;

use crate::core::provider::Provider;
use crate::utils::redaction::redact_str;

/// No credential was found for a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingCredentialError {
    pub provider: Provider,
    pub env_var: &'static str,
}

impl MissingCredentialError {
    pub fn new(provider: Provider) -> Self {
        Self {
            provider,
            env_var: provider.env_var(),
        }
    }

    /// Print the error with a remediation hint.
    pub fn print(&self) {
        eprintln!("❌ {self}");
        eprintln!(
            "💡 Export it in your shell or add it to the .env file in the config directory:"
        );
        eprintln!("   export {}=\"your-api-key-here\"", self.env_var);
    }
}

impl fmt::Display for MissingCredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Environment variable '{}' is not set (needed for {}).",
            self.env_var,
            self.provider.display_name()
        )
    }
}

impl std::error::Error for MissingCredentialError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// The request did not complete within the configured timeout.
    Timeout,
    /// DNS, connect, TLS or other transport failure.
    Connection,
    /// The server answered with a non-success status.
    Status(u16),
    /// A success response whose body was not valid JSON.
    Decode,
    /// A success response that nonetheless carried an `error` object.
    Embedded,
}

/// A failed API call. Never retried; the session reports it and moves on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequestError {
    pub kind: ApiErrorKind,
    pub message: String,
}

pub const DECODE_FAILURE_MESSAGE: &str = "Failed to decode API response.";

impl ApiRequestError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn decode() -> Self {
        Self::new(ApiErrorKind::Decode, DECODE_FAILURE_MESSAGE)
    }

    /// Classify a transport-level failure from reqwest.
    ///
    /// reqwest includes the request URL in its messages, which carries the
    /// Gemini key, so the text is scrubbed here.
    pub fn from_transport(err: &reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            ApiErrorKind::Timeout
        } else if err.is_decode() {
            ApiErrorKind::Decode
        } else {
            ApiErrorKind::Connection
        };
        Self::new(kind, redact_str(&err.to_string()))
    }
}

impl fmt::Display for ApiRequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ApiErrorKind::Timeout => write!(f, "Request timed out: {}", self.message),
            ApiErrorKind::Status(code) => write!(f, "HTTP {}: {}", code, self.message),
            _ => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for ApiRequestError {}

/// Failure of a non-streaming helper request such as history summarization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HelperError {
    Api(ApiRequestError),
    /// The call succeeded but produced no text.
    EmptyResponse,
    /// A suggested file name had nothing usable in it.
    UnusableName(String),
}

impl fmt::Display for HelperError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HelperError::Api(err) => write!(f, "API Error: {err}"),
            HelperError::EmptyResponse => {
                f.write_str("the helper model returned an empty response")
            }
            HelperError::UnusableName(reply) => {
                write!(f, "the helper model suggested an unusable name: {reply:?}")
            }
        }
    }
}

impl std::error::Error for HelperError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HelperError::Api(err) => Some(err),
            HelperError::EmptyResponse | HelperError::UnusableName(_) => None,
        }
    }
}

impl From<ApiRequestError> for HelperError {
    fn from(err: ApiRequestError) -> Self {
        HelperError::Api(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_include_code() {
        let err = ApiRequestError::new(ApiErrorKind::Status(429), "rate limited");
        assert_eq!(err.to_string(), "HTTP 429: rate limited");
    }

    #[test]
    fn missing_credential_names_the_variable() {
        let err = MissingCredentialError::new(Provider::Gemini);
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn unusable_name_quotes_the_reply() {
        let err = HelperError::UnusableName("...".to_string());
        assert_eq!(
            err.to_string(),
            "the helper model suggested an unusable name: \"...\""
        );
    }

    #[test]
    fn helper_error_wraps_api_error() {
        let err: HelperError = ApiRequestError::decode().into();
        assert_eq!(err.to_string(), "API Error: Failed to decode API response.");
    }
}
