use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;

/// The JSON body every request is answered with.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EnvelopeBody {
    status_code: u16,
    success: bool,
    messages: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

#[derive(Debug, thiserror::Error)]
enum EnvelopeError {
    #[error("status code was never set")]
    MissingStatus,
    #[error("success flag was never set")]
    MissingSuccess,
    #[error("data could not be serialized: {0}")]
    Data(#[from] serde_json::Error),
}

/// Builder for the response envelope.
///
/// Status and success flag have no defaults. `send` consumes the envelope, so a request
/// can only ever be answered once.
#[derive(Debug, Default)]
#[must_use]
pub struct Envelope {
    status: Option<StatusCode>,
    success: Option<bool>,
    messages: Vec<String>,
    data: Option<Result<serde_json::Value, serde_json::Error>>,
}

impl Envelope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ok(status: StatusCode) -> Self {
        Self::new().status(status).success(true)
    }

    pub fn failure(status: StatusCode) -> Self {
        Self::new().status(status).success(false)
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    pub fn messages(mut self, messages: impl IntoIterator<Item = String>) -> Self {
        self.messages.extend(messages);
        self
    }

    pub fn data(mut self, data: &impl Serialize) -> Self {
        self.data = Some(serde_json::to_value(data));
        self
    }

    fn into_body(self) -> Result<(StatusCode, EnvelopeBody), EnvelopeError> {
        let status = self.status.ok_or(EnvelopeError::MissingStatus)?;
        let success = self.success.ok_or(EnvelopeError::MissingSuccess)?;
        let data = self.data.transpose()?;

        Ok((
            status,
            EnvelopeBody {
                status_code: status.as_u16(),
                success,
                messages: self.messages,
                data,
            },
        ))
    }

    /// Serializes the envelope into the HTTP response for this request.
    pub fn send(self) -> Response {
        let (status, body) = match self.into_body() {
            Ok(parts) => parts,
            Err(e) => {
                error!("Failed to build response envelope: {e}");
                let status = StatusCode::INTERNAL_SERVER_ERROR;
                let body = EnvelopeBody {
                    status_code: status.as_u16(),
                    success: false,
                    messages: vec!["Response creation error".to_string()],
                    data: None,
                };
                (status, body)
            }
        };

        (status, Json(body)).into_response()
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        self.send()
    }
}
