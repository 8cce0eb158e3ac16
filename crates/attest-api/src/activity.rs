//! Fire-and-forget activity recording.
//!
//! Called after successful mutations. A failed write is logged and dropped;
//! it never fails the request that triggered it.

use axum::http::{HeaderMap, header};
use serde_json::Value;

use attest_core::{activity::NewActivity, store::ControlStore};

use crate::auth::Identity;

fn header_str(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
  headers
    .get(name)
    .and_then(|v| v.to_str().ok())
    .map(str::to_owned)
}

pub async fn record<S: ControlStore>(
  store: &S,
  who: &Identity,
  action: &str,
  description: impl Into<String>,
  url_path: &str,
  headers: &HeaderMap,
  detail: Option<Value>,
) {
  let record = NewActivity {
    user_id: Some(who.user_id),
    email: who.email.clone(),
    action: action.to_owned(),
    description: description.into(),
    url_path: url_path.to_owned(),
    ip_address: header_str(headers, header::FORWARDED)
      .or_else(|| header_str(headers, header::HeaderName::from_static("x-forwarded-for"))),
    user_agent: header_str(headers, header::USER_AGENT),
    detail,
  };

  if let Err(err) = store.record_activity(record).await {
    tracing::warn!(error = %err, action, "failed to record activity");
  }
}
