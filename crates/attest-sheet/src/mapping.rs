//! Header auto-mapping: classify spreadsheet columns into canonical control
//! fields by keyword, Korean and English synonyms alike.
//!
//! Matching is a case-insensitive substring test against the trimmed header.
//! Fields are tried in declaration order and each tries every header left to
//! right; the first match wins. A header claimed by an earlier field is not
//! offered to later ones, so field order — not header order — breaks ties
//! when two synonym lists would match the same column.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ─── Canonical fields ────────────────────────────────────────────────────────

/// The canonical control-record fields a spreadsheet column can map to.
/// Serialised names match the control columns they feed.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ControlField {
  ControlCode,
  ControlName,
  ControlDescription,
  KeyControl,
  ControlFrequency,
  ControlType,
  ControlNature,
  ProcessArea,
  RiskDescription,
  RiskImpact,
  RiskLikelihood,
  Population,
  PopulationCompletenessCheck,
  PopulationCount,
  TestProcedure,
  ControlOwner,
  ControlPerformer,
  EvidenceType,
}

impl ControlField {
  /// Declaration order doubles as the claiming order in
  /// [`auto_map_headers`].
  pub const ALL: [ControlField; 18] = [
    Self::ControlCode,
    Self::ControlName,
    Self::ControlDescription,
    Self::KeyControl,
    Self::ControlFrequency,
    Self::ControlType,
    Self::ControlNature,
    Self::ProcessArea,
    Self::RiskDescription,
    Self::RiskImpact,
    Self::RiskLikelihood,
    Self::Population,
    Self::PopulationCompletenessCheck,
    Self::PopulationCount,
    Self::TestProcedure,
    Self::ControlOwner,
    Self::ControlPerformer,
    Self::EvidenceType,
  ];

  /// Ordered synonym list, lower-cased. Korean terms first, mirroring the
  /// vocabularies these sheets actually arrive with.
  pub fn synonyms(self) -> &'static [&'static str] {
    match self {
      Self::ControlCode => {
        &["통제코드", "코드", "control code", "code", "control_code"]
      }
      Self::ControlName => &[
        "통제명",
        "통제이름",
        "통제활동",
        "control name",
        "control",
        "control_name",
      ],
      Self::ControlDescription => {
        &["통제설명", "설명", "통제내용", "description", "control description"]
      }
      Self::KeyControl => &["핵심통제", "핵심통제여부", "key control", "key"],
      Self::ControlFrequency => &["빈도", "통제빈도", "frequency"],
      Self::ControlType => &["통제유형", "유형", "type", "control type"],
      Self::ControlNature => &["통제성격", "성격", "nature"],
      Self::ProcessArea => &["프로세스", "업무영역", "process", "process area"],
      Self::RiskDescription => {
        &["위험", "위험설명", "risk", "risk description"]
      }
      Self::RiskImpact => &["영향", "위험영향", "impact"],
      Self::RiskLikelihood => &["발생가능성", "가능성", "likelihood"],
      Self::Population => &["모집단", "population"],
      Self::PopulationCompletenessCheck => {
        &["완전성점검", "완전성확인", "completeness"]
      }
      Self::PopulationCount => &["모집단수", "건수", "count"],
      Self::TestProcedure => &["테스트절차", "절차", "procedure", "test"],
      Self::ControlOwner => &["통제담당자", "담당자", "owner"],
      Self::ControlPerformer => &["수행자", "performer"],
      Self::EvidenceType => &["증적유형", "증적", "evidence"],
    }
  }
}

/// Keywords that mark the category column in integrated-mode sheets.
const CATEGORY_KEYWORDS: [&str; 5] = ["카테고리", "category", "구분", "type", "class"];

// ─── Mapping result ──────────────────────────────────────────────────────────

/// Canonical field → zero-based column index. Fields with no matching
/// header are simply absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderMapping(BTreeMap<ControlField, usize>);

impl HeaderMapping {
  pub fn get(&self, field: ControlField) -> Option<usize> {
    self.0.get(&field).copied()
  }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  pub fn iter(&self) -> impl Iterator<Item = (ControlField, usize)> + '_ {
    self.0.iter().map(|(f, i)| (*f, *i))
  }
}

// ─── Mapping functions ───────────────────────────────────────────────────────

fn matches_any(header: &str, keywords: &[&str]) -> bool {
  let normalized = header.trim().to_lowercase();
  keywords.iter().any(|kw| normalized.contains(kw))
}

/// Map raw header strings onto canonical control fields.
///
/// Pure function over the header list; no side effects, no errors.
pub fn auto_map_headers(headers: &[String]) -> HeaderMapping {
  let mut bound = BTreeMap::new();
  let mut claimed = vec![false; headers.len()];

  for field in ControlField::ALL {
    let synonyms = field.synonyms();
    let hit = headers
      .iter()
      .enumerate()
      .find(|(idx, header)| !claimed[*idx] && matches_any(header.as_str(), synonyms));

    if let Some((idx, _)) = hit {
      claimed[idx] = true;
      bound.insert(field, idx);
    }
  }

  HeaderMapping(bound)
}

/// Locate the category column for integrated import. Independent of
/// [`auto_map_headers`] — it scans all headers with its own keyword list.
/// `None` is an absence signal, not an error.
pub fn find_category_column(headers: &[String]) -> Option<usize> {
  headers
    .iter()
    .position(|header| matches_any(header, &CATEGORY_KEYWORDS))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
