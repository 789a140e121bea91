use std::error;
use std::fmt;
use std::sync::Arc;

use map_session::BackendError;

pub mod client;
pub mod config;
pub mod sse;

pub use client::HttpBackend;
pub use config::ApiConfig;
pub use sse::SseTransport;

#[derive(Debug, Clone)]
pub enum ApiError {
    RequestError(Arc<reqwest::Error>),
    JsonError(Arc<serde_json::Error>),
    InvalidResponse {
        status_code: reqwest::StatusCode,
        url: String,
        response: Option<String>,
    },
    InvalidConfig(String),
}

impl error::Error for ApiError {}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ApiError::RequestError(e) => write!(f, "HTTP request error: {}", e),
            ApiError::JsonError(e) => write!(f, "JSON parse error: {}", e),
            ApiError::InvalidResponse {
                status_code,
                url,
                response,
            } => match response {
                Some(text) if !text.is_empty() => {
                    write!(f, "Invalid Response ({}) {}: {}", status_code, text, url)
                }
                _ => write!(f, "Invalid Response ({}) {}", status_code, url),
            },
            ApiError::InvalidConfig(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::RequestError(Arc::new(e))
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::JsonError(Arc::new(e))
    }
}

impl From<ApiError> for BackendError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::InvalidResponse { status_code, .. }
                if status_code == reqwest::StatusCode::NOT_FOUND =>
            {
                BackendError::NotFound
            }
            ApiError::InvalidResponse {
                status_code,
                url,
                response,
            } => BackendError::Rejected {
                status: status_code.as_u16(),
                url,
                body: response,
            },
            ApiError::JsonError(_) => BackendError::decode(e),
            other => BackendError::other(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_backend_errors() {
        let not_found = ApiError::InvalidResponse {
            status_code: reqwest::StatusCode::NOT_FOUND,
            url: "http://localhost/api/features/delete/3".to_owned(),
            response: None,
        };
        assert!(matches!(BackendError::from(not_found), BackendError::NotFound));

        let rejected = ApiError::InvalidResponse {
            status_code: reqwest::StatusCode::BAD_REQUEST,
            url: "http://localhost/api/features/save".to_owned(),
            response: Some("invalid polygon".to_owned()),
        };
        match BackendError::from(rejected) {
            BackendError::Rejected { status, body, .. } => {
                assert_eq!(status, 400);
                assert_eq!(body.as_deref(), Some("invalid polygon"));
            }
            other => panic!("unexpected {other:?}"),
        }

        let json = serde_json::from_str::<u32>("nope").unwrap_err();
        assert!(matches!(
            BackendError::from(ApiError::from(json)),
            BackendError::Decode(_)
        ));
    }
}
