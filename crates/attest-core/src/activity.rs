//! Activity-log records. Append-only; writes are fire-and-forget.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One activity entry, recorded after a successful mutation. The caller
/// never depends on the write succeeding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewActivity {
  pub user_id:     Option<Uuid>,
  pub email:       String,
  /// Short machine-readable action tag, e.g. `RCM_IMPORT`, `DESIGN_SAVE`.
  pub action:      String,
  pub description: String,
  pub url_path:    String,
  pub ip_address:  Option<String>,
  pub user_agent:  Option<String>,
  /// Free-form JSON payload with operation-specific identifiers.
  pub detail:      Option<serde_json::Value>,
}
