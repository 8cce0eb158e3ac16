//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! The core error taxonomy maps onto HTTP statuses here, and every failure
//! body carries the same `{"success": false, "message": …}` envelope the
//! mutation endpoints use on success. Backend failures are logged in full
//! server-side and reported to the caller generically.

use attest_core::Error as CoreError;
use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  /// Missing or bad credentials. Deliberately indistinguishable for unknown
  /// users, expired accounts, and wrong passwords.
  #[error("unauthorized")]
  Unauthorized,

  #[error(transparent)]
  Core(#[from] CoreError),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::Unauthorized => {
        let mut res = (
          StatusCode::UNAUTHORIZED,
          Json(json!({ "success": false, "message": "unauthorized" })),
        )
          .into_response();
        res.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static("Basic realm=\"attest\""),
        );
        return res;
      }

      ApiError::Core(core) => match core {
        CoreError::Validation(_)
        | CoreError::UnknownCategory(_)
        | CoreError::MissingCategoryColumn => {
          (StatusCode::BAD_REQUEST, core.to_string())
        }

        // Never leak what the resource is or whether it exists.
        CoreError::AccessDenied => {
          (StatusCode::FORBIDDEN, "no access".to_string())
        }

        CoreError::UserNotFound(_)
        | CoreError::RcmNotFound(_)
        | CoreError::HeaderNotFound(_)
        | CoreError::DesignSessionNotFound { .. } => {
          (StatusCode::NOT_FOUND, core.to_string())
        }

        CoreError::EmailTaken(_) | CoreError::SessionExists { .. } => {
          (StatusCode::CONFLICT, core.to_string())
        }

        CoreError::Serialization(_)
        | CoreError::Decode(_)
        | CoreError::Storage(_) => {
          tracing::error!(error = %core, "internal error while handling request");
          (
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal server error".to_string(),
          )
        }
      },
    };

    (status, Json(json!({ "success": false, "message": message })))
      .into_response()
  }
}
