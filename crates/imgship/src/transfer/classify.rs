//! 🩺 Sorting HTTP trouble into "try again" and "don't bother".
//!
//! Shared by the fetcher and the GCS store so both sides of the pipeline agree
//! on what a transient failure looks like.

use reqwest::StatusCode;

use crate::transfer::retry::AttemptError;

/// 📡 Classifies a transport-level reqwest error.
pub(crate) fn classify_reqwest_error(error: reqwest::Error) -> AttemptError {
    let cause = error.to_string();
    if error.is_builder() || error.is_redirect() {
        // -- 🐛 bad URL or a redirect loop. Asking again won't fix either.
        AttemptError::Permanent(cause)
    } else if let Some(status) = error.status() {
        classify_status(status, &cause)
    } else {
        // -- 🔄 timeouts, refused connections, resets, truncated bodies
        AttemptError::Transient(cause)
    }
}

/// 🚦 Classifies a non-success status code. 408, 429 and 5xx are worth retrying.
pub(crate) fn classify_status(status: StatusCode, context: &str) -> AttemptError {
    let cause = format!("{} returned {}", context, status);
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        AttemptError::Transient(cause)
    } else {
        AttemptError::Permanent(cause)
    }
}
