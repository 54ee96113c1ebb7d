use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::FetchError;

/// Server error type that logs on conversion and returns a JSON body.
///
/// Failures from the image pipeline convert via `From<FetchError>`, which
/// picks the status code from the failing stage and, for runtime errors, from
/// the text the Docker Engine returned.
///
/// # Example
///
/// ```rust,ignore
/// use crate::server::error::ServerError;
///
/// let err = ServerError::bad_request("no images requested");
///
/// let archive = fetch_and_package(runtime, authn, images, cancel).await?;
/// ```
#[derive(Debug)]
pub struct ServerError {
    /// HTTP status code to return
    pub status: StatusCode,
    /// User-facing error message (returned in response)
    pub message: String,
    /// Internal error with full chain (logged but not exposed to client)
    pub source: Option<anyhow::Error>,
    /// Structured context for logging (key-value pairs)
    pub context: Vec<(&'static str, String)>,
}

impl ServerError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            source: None,
            context: Vec::new(),
        }
    }

    pub fn from_anyhow(
        source: anyhow::Error,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            message: message.into(),
            source: Some(source),
            context: Vec::new(),
        }
    }

    /// Add a context field for logging (chainable)
    pub fn with_context(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.context.push((key, value.into()));
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(
                status = self.status.as_u16(),
                message = %self.message,
                context = ?self.context,
                error = ?self.source,
                "Server error"
            );
        } else {
            tracing::warn!(
                status = self.status.as_u16(),
                message = %self.message,
                context = ?self.context,
                "Request failed"
            );
        }

        let body = Json(json!({
            "error": self.message,
        }));

        (self.status, body).into_response()
    }
}

impl From<FetchError> for ServerError {
    fn from(err: FetchError) -> Self {
        let status = status_for(&err);
        let stage = err.stage().to_string();
        let message = err.to_string();
        Self::from_anyhow(err.into(), status, message).with_context("stage", stage)
    }
}

/// HTTP status for a pipeline failure.
pub fn status_for(err: &FetchError) -> StatusCode {
    if err.is_client_input() {
        return StatusCode::BAD_REQUEST;
    }
    // Only the runtime's text is classified; the image name is client input.
    match err {
        FetchError::Pull { message, .. } => status_from_message(message),
        FetchError::Save(message) => status_from_message(message),
        FetchError::Lookup { reason, .. } => status_from_message(reason),
        FetchError::Cancelled => StatusCode::REQUEST_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// The Engine reports registry failures as free text; the first matching
/// phrase decides the status.
const MESSAGE_STATUS: [(&str, StatusCode); 9] = [
    ("forbidden", StatusCode::FORBIDDEN),
    ("not found", StatusCode::NOT_FOUND),
    ("unauthorized", StatusCode::UNAUTHORIZED),
    ("unauthorised", StatusCode::UNAUTHORIZED),
    ("service unavailable", StatusCode::SERVICE_UNAVAILABLE),
    ("bad request", StatusCode::BAD_REQUEST),
    ("bad gateway", StatusCode::BAD_GATEWAY),
    ("request timeout", StatusCode::REQUEST_TIMEOUT),
    ("timeout", StatusCode::REQUEST_TIMEOUT),
];

fn status_from_message(message: &str) -> StatusCode {
    let message = message.to_lowercase();
    MESSAGE_STATUS
        .iter()
        .find(|(phrase, _)| message.contains(phrase))
        .map(|(_, status)| *status)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}
