use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub data: Option<T>,
    pub meta: ResponseMeta,
}

#[derive(Serialize)]
pub struct ResponseMeta {
    pub status: String,
    pub status_code: u16,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub message: Option<String>,
}

pub fn success<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    let meta = ResponseMeta {
        status: "success".to_string(),
        status_code: StatusCode::OK.as_u16(),
        timestamp: Utc::now().to_rfc3339(),
        kind: None,
        message: None,
    };

    (
        StatusCode::OK,
        Json(ApiResponse {
            data: Some(data),
            meta,
        }),
    )
}

fn error_meta(status: StatusCode, kind: &str, message: String) -> ResponseMeta {
    ResponseMeta {
        status: "error".to_string(),
        status_code: status.as_u16(),
        timestamp: Utc::now().to_rfc3339(),
        kind: Some(kind.to_string()),
        message: Some(message),
    }
}

pub fn error<T>(
    status: StatusCode,
    kind: &str,
    message: String,
) -> (StatusCode, Json<ApiResponse<T>>) {
    (
        status,
        Json(ApiResponse {
            data: None,
            meta: error_meta(status, kind, message),
        }),
    )
}

/// Error response that still carries a payload, e.g. per-URL fetch details.
pub fn error_with_data<T>(
    status: StatusCode,
    kind: &str,
    message: String,
    data: T,
) -> (StatusCode, Json<ApiResponse<T>>) {
    (
        status,
        Json(ApiResponse {
            data: Some(data),
            meta: error_meta(status, kind, message),
        }),
    )
}
