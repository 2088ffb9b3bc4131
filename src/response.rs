use actix_web::{error::JsonPayloadError, HttpRequest, HttpResponse};
use once_cell::sync::OnceCell;
use serde::Serialize;

use crate::error::AppError;

static DEVELOPMENT: OnceCell<bool> = OnceCell::new();

/// Enables error details in response bodies. Only the first call wins.
pub fn set_development(enabled: bool) {
    let _ = DEVELOPMENT.set(enabled);
}

fn development() -> bool {
    DEVELOPMENT.get().copied().unwrap_or(false)
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

pub fn json_error_handler(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    let app_err = match err {
        JsonPayloadError::ContentType => AppError::validation("unsupported content type"),
        JsonPayloadError::Deserialize(e) => AppError::validation(format!("malformed JSON body: {}", e)),
        JsonPayloadError::Overflow { .. } | JsonPayloadError::OverflowKnownLength { .. } => {
            AppError::validation("request body too large")
        }
        _ => AppError::validation("malformed request body"),
    };
    app_err.into()
}

fn error_body(err: &AppError, development: bool) -> ErrorBody {
    let detail = if development {
        err.detail().map(str::to_string)
    } else {
        None
    };
    ErrorBody {
        message: err.msg().to_string(),
        detail,
    }
}

pub fn response_from_error(err: &AppError) -> HttpResponse {
    HttpResponse::build(actix_web::ResponseError::status_code(err)).json(error_body(err, development()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{body::to_bytes, http::StatusCode};
    use serde_json::{json, Value};

    #[test]
    fn detail_only_in_development() {
        let err = AppError::storage("failed to write image file", "disk full");
        assert_eq!(error_body(&err, false).detail, None);
        assert_eq!(error_body(&err, true).detail.as_deref(), Some("disk full"));
        assert_eq!(error_body(&AppError::not_found("gone"), true).detail, None);
    }

    #[actix_web::test]
    async fn error_response_hides_detail_by_default() {
        let resp = response_from_error(&AppError::storage("failed to write image file", "disk full"));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(resp.into_body()).await.unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!({ "message": "failed to write image file" }));
    }
}
