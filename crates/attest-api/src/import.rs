//! Control import orchestration: mapped sheets into persisted RCMs.
//!
//! Single-category mode works against a pre-created RCM; integrated mode
//! creates one RCM per category found in the sheet. Buckets commit category
//! by category — a failure partway through an integrated import leaves the
//! earlier categories in place.

use std::collections::BTreeMap;

use uuid::Uuid;

use attest_core::{
  Error, Result,
  rcm::{ControlCategory, NewGrant, NewRcm, PermissionType},
  store::ControlStore,
};
use attest_sheet::{
  HeaderMapping, Sheet, extract_controls, find_category_column,
  split_by_category,
};

/// The result of an integrated import: one RCM per non-empty category.
#[derive(Debug, Clone)]
pub struct ImportOutcome {
  pub rcm_ids:        BTreeMap<ControlCategory, Uuid>,
  pub controls_count: usize,
}

/// Parameters shared by every RCM an integrated import creates.
#[derive(Debug, Clone)]
pub struct IntegratedImport {
  pub base_name:       String,
  pub description:     Option<String>,
  pub uploaded_by:     Uuid,
  pub target_user:     Uuid,
  pub source_filename: Option<String>,
}

/// Import every qualifying row of `sheet` into an existing RCM, then grant
/// the target user READ access. Returns the number of imported rows.
pub async fn import_single<S: ControlStore>(
  store: &S,
  rcm_id: Uuid,
  target_user: Uuid,
  granted_by: Uuid,
  sheet: &Sheet,
  mapping: &HeaderMapping,
) -> Result<usize> {
  let controls = extract_controls(sheet, mapping);
  let count = controls.len();

  for control in controls {
    store.upsert_control(rcm_id, control).await?;
  }

  store
    .grant_access(NewGrant {
      user_id:    target_user,
      rcm_id,
      permission: PermissionType::Read,
      granted_by,
    })
    .await?;

  Ok(count)
}

/// Integrated import: bucket rows by their category cell, create an RCM per
/// non-empty bucket named `"<base> - <CATEGORY>"`, and import each bucket
/// under it. Rows with an unrecognised category are dropped silently; a
/// sheet with no category column at all fails before anything is written.
pub async fn import_integrated<S: ControlStore>(
  store: &S,
  params: IntegratedImport,
  sheet: &Sheet,
  mapping: &HeaderMapping,
) -> Result<ImportOutcome> {
  let category_col =
    find_category_column(sheet.headers()).ok_or(Error::MissingCategoryColumn)?;

  let buckets = split_by_category(sheet, mapping, category_col);

  let mut rcm_ids = BTreeMap::new();
  let mut controls_count = 0;

  for (category, controls) in buckets {
    let rcm = store
      .create_rcm(NewRcm {
        name:            format!("{} - {}", params.base_name, category),
        category,
        description:     params.description.clone(),
        uploaded_by:     params.uploaded_by,
        source_filename: params.source_filename.clone(),
      })
      .await?;

    controls_count += controls.len();
    for control in controls {
      store.upsert_control(rcm.rcm_id, control).await?;
    }

    store
      .grant_access(NewGrant {
        user_id:    params.target_user,
        rcm_id:     rcm.rcm_id,
        permission: PermissionType::Read,
        granted_by: params.uploaded_by,
      })
      .await?;

    rcm_ids.insert(category, rcm.rcm_id);
  }

  Ok(ImportOutcome { rcm_ids, controls_count })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
