//! Row extraction: mapped sheet rows into control definitions.

use std::collections::BTreeMap;

use attest_core::rcm::{ControlCategory, ControlDefinition};

use crate::{
  Sheet,
  mapping::{ControlField, HeaderMapping},
};

fn mapped_cell(sheet: &Sheet, mapping: &HeaderMapping, row: usize, field: ControlField) -> String {
  mapping
    .get(field)
    .map(|col| sheet.cell(row, col).to_owned())
    .unwrap_or_default()
}

fn row_to_definition(
  sheet: &Sheet,
  mapping: &HeaderMapping,
  row: usize,
  control_code: String,
) -> ControlDefinition {
  let cell = |field| mapped_cell(sheet, mapping, row, field);

  ControlDefinition {
    control_code,
    control_name: cell(ControlField::ControlName),
    control_description: cell(ControlField::ControlDescription),
    key_control: cell(ControlField::KeyControl),
    control_frequency: cell(ControlField::ControlFrequency),
    control_type: cell(ControlField::ControlType),
    control_nature: cell(ControlField::ControlNature),
    process_area: cell(ControlField::ProcessArea),
    risk_description: cell(ControlField::RiskDescription),
    risk_impact: cell(ControlField::RiskImpact),
    risk_likelihood: cell(ControlField::RiskLikelihood),
    population: cell(ControlField::Population),
    population_completeness_check: cell(ControlField::PopulationCompletenessCheck),
    population_count: cell(ControlField::PopulationCount),
    test_procedure: cell(ControlField::TestProcedure),
    control_owner: cell(ControlField::ControlOwner),
    control_performer: cell(ControlField::ControlPerformer),
    evidence_type: cell(ControlField::EvidenceType),
  }
}

/// Extract control definitions from every qualifying row.
///
/// A row qualifies iff its mapped `control_code` cell is non-empty after
/// trimming; the trimmed code becomes the control's key. Every other mapped
/// cell is taken verbatim, with missing cells as empty strings.
pub fn extract_controls(sheet: &Sheet, mapping: &HeaderMapping) -> Vec<ControlDefinition> {
  let mut controls = Vec::new();

  for row in 0..sheet.rows.len() {
    let code = mapped_cell(sheet, mapping, row, ControlField::ControlCode);
    let code = code.trim();
    if code.is_empty() {
      continue;
    }
    controls.push(row_to_definition(sheet, mapping, row, code.to_owned()));
  }

  controls
}

/// Bucket qualifying rows by the category cell at `category_col`.
///
/// Rows whose trimmed, upper-cased category is not exactly one of the three
/// tags are silently dropped, as are rows with an empty control code. Empty
/// buckets do not appear in the result.
pub fn split_by_category(
  sheet: &Sheet,
  mapping: &HeaderMapping,
  category_col: usize,
) -> BTreeMap<ControlCategory, Vec<ControlDefinition>> {
  let mut buckets: BTreeMap<ControlCategory, Vec<ControlDefinition>> = BTreeMap::new();

  for row in 0..sheet.rows.len() {
    let Some(category) = ControlCategory::from_cell(sheet.cell(row, category_col)) else {
      continue;
    };

    let code = mapped_cell(sheet, mapping, row, ControlField::ControlCode);
    let code = code.trim();
    if code.is_empty() {
      continue;
    }

    buckets
      .entry(category)
      .or_default()
      .push(row_to_definition(sheet, mapping, row, code.to_owned()));
  }

  buckets
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;
  use crate::mapping::auto_map_headers;

  fn sheet(headers: &[&str], rows: &[&[&str]]) -> Sheet {
    Sheet::new(
      headers.iter().map(|s| s.to_string()).collect(),
      rows
        .iter()
        .map(|r| r.iter().map(|c| c.to_string()).collect())
        .collect(),
    )
  }

  #[test]
  fn rows_without_control_code_are_skipped() {
    let s = sheet(
      &["통제코드", "통제명"],
      &[
        &["ITGC-001", "시스템 접근 통제"],
        &["", "이름만 있는 행"],
        &["   ", "공백 코드"],
        &["ITGC-002", "변경 관리"],
      ],
    );
    let mapping = auto_map_headers(s.headers());
    let controls = extract_controls(&s, &mapping);

    assert_eq!(controls.len(), 2);
    assert_eq!(controls[0].control_code, "ITGC-001");
    assert_eq!(controls[1].control_code, "ITGC-002");
  }

  #[test]
  fn control_code_is_trimmed_but_other_cells_are_verbatim() {
    let s = sheet(&["통제코드", "통제명"], &[&[" ELC-001 ", "  이사회 운영  "]]);
    let mapping = auto_map_headers(s.headers());
    let controls = extract_controls(&s, &mapping);

    assert_eq!(controls[0].control_code, "ELC-001");
    assert_eq!(controls[0].control_name, "  이사회 운영  ");
  }

  #[test]
  fn short_rows_read_missing_cells_as_empty() {
    let s = sheet(&["통제코드", "통제명", "통제설명"], &[&["TLC-001"]]);
    let mapping = auto_map_headers(s.headers());
    let controls = extract_controls(&s, &mapping);

    assert_eq!(controls.len(), 1);
    assert_eq!(controls[0].control_name, "");
    assert_eq!(controls[0].control_description, "");
  }

  #[test]
  fn unmapped_fields_stay_empty() {
    let s = sheet(&["통제코드"], &[&["ITGC-001"]]);
    let mapping = auto_map_headers(s.headers());
    let controls = extract_controls(&s, &mapping);

    assert_eq!(controls[0].test_procedure, "");
    assert_eq!(controls[0].evidence_type, "");
  }

  #[test]
  fn split_buckets_by_category_and_drops_unknown_tags() {
    let s = sheet(
      &["카테고리", "통제코드", "통제명"],
      &[
        &["ELC", "ELC-001", "이사회 운영"],
        &["elc ", "ELC-002", "내부감사"],
        &["TLC", "TLC-001", "매출 승인"],
        &["기타", "XXX-001", "버려질 행"],
        &["ITGC", "ITGC-001", "접근 통제"],
        &["ITGC", "", "코드 없는 행"],
      ],
    );
    let mapping = auto_map_headers(s.headers());
    let col = crate::find_category_column(s.headers()).unwrap();
    let buckets = split_by_category(&s, &mapping, col);

    assert_eq!(buckets.len(), 3);
    assert_eq!(buckets[&ControlCategory::Elc].len(), 2);
    assert_eq!(buckets[&ControlCategory::Tlc].len(), 1);
    assert_eq!(buckets[&ControlCategory::Itgc].len(), 1);
  }

  #[test]
  fn split_with_no_matching_rows_is_empty() {
    let s = sheet(&["카테고리", "통제코드"], &[&["ETC", "A-1"]]);
    let mapping = auto_map_headers(s.headers());
    let buckets = split_by_category(&s, &mapping, 0);
    assert!(buckets.is_empty());
  }
}
