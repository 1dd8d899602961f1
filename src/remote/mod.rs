//! Remote calendar store access.
//
// Everything network-facing fails with a typed [`RemoteError`] so callers
// can tell transient failures (retry) from terminal ones, and authentication
// failures (force re-auth) from everything else.

use async_trait::async_trait;
use chrono::NaiveDate;

mod rest;
mod types;

pub use rest::{RestCalendarStore, DEFAULT_API_BASE};
pub use types::{EventPatch, EventPayload, EventTime, RemoteEvent};

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("authentication rejected by the calendar service (HTTP {status}); sign in again")]
    Auth { status: u16 },
    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("calendar service temporarily unavailable (HTTP {status}): {message}")]
    Transient { status: u16, message: String },
    #[error("calendar service error (HTTP {status}): {message}")]
    Api { status: u16, message: String },
    #[error("invalid request url: {0}")]
    Url(#[from] url::ParseError),
    #[error("transport error talking to the calendar service: {0}")]
    Http(#[from] reqwest::Error),
}

impl RemoteError {
    /// Map an HTTP error status to the failure taxonomy.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => RemoteError::Auth { status },
            404 => RemoteError::NotFound { message },
            429 | 500..=599 => RemoteError::Transient { status, message },
            _ => RemoteError::Api { status, message },
        }
    }

    /// Expected to resolve on retry (overload, rate limit, 5xx).
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Transient { .. })
    }

    /// Fatal to the current session's remote access; the caller must force
    /// re-authentication before any further remote operation.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, RemoteError::Auth { .. })
    }
}

/// The four operations the rest of the system needs from a calendar store.
/// Bulk work goes through the batch engine with one of these bound in; list
/// and single inserts may be called directly.
#[async_trait]
pub trait CalendarStore: Send + Sync {
    async fn list(
        &self,
        calendar_id: &str,
        time_min: Option<NaiveDate>,
        time_max: Option<NaiveDate>,
    ) -> Result<Vec<RemoteEvent>, RemoteError>;

    async fn insert(
        &self,
        calendar_id: &str,
        payload: &EventPayload,
    ) -> Result<RemoteEvent, RemoteError>;

    async fn patch(
        &self,
        calendar_id: &str,
        event_id: &str,
        patch: &EventPatch,
    ) -> Result<RemoteEvent, RemoteError>;

    async fn delete(&self, calendar_id: &str, event_id: &str) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(RemoteError::from_status(401, String::new()).requires_reauth());
        assert!(RemoteError::from_status(403, String::new()).requires_reauth());
        assert!(RemoteError::from_status(429, String::new()).is_transient());
        assert!(RemoteError::from_status(503, String::new()).is_transient());
        assert!(matches!(RemoteError::from_status(404, "gone".into()), RemoteError::NotFound { .. }));
        assert!(matches!(RemoteError::from_status(409, "conflict".into()), RemoteError::Api { .. }));
        assert!(!RemoteError::from_status(409, String::new()).is_transient());
    }
}
