//! Core domain model and classification rules for ITR.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "itr-core";

/// Sentinel used when a source field is absent.
pub const MISSING: &str = "N/A";
/// Sentinel used when an entry carries no title.
pub const UNTITLED: &str = "Sin título";
/// Sentinel used when an entry carries no link.
pub const NO_LINK: &str = "#";

/// Coarse procurement lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StatusLabel {
    /// Default when the source carries no status code.
    Pending,
    Announced,
    UnderEvaluation,
    Awarded,
    Formalized,
    Cancelled,
    /// A non-empty code that matches none of the mapping rules.
    Other,
}

impl StatusLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusLabel::Pending => "pending",
            StatusLabel::Announced => "announced",
            StatusLabel::UnderEvaluation => "under-evaluation",
            StatusLabel::Awarded => "awarded",
            StatusLabel::Formalized => "formalized",
            StatusLabel::Cancelled => "cancelled",
            StatusLabel::Other => "other",
        }
    }
}

impl std::str::FromStr for StatusLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(StatusLabel::Pending),
            "announced" => Ok(StatusLabel::Announced),
            "under-evaluation" => Ok(StatusLabel::UnderEvaluation),
            "awarded" => Ok(StatusLabel::Awarded),
            "formalized" => Ok(StatusLabel::Formalized),
            "cancelled" => Ok(StatusLabel::Cancelled),
            "other" => Ok(StatusLabel::Other),
            other => Err(format!("unknown status label: {other}")),
        }
    }
}

/// Parsed handoff contract from the feed extractor into the ingestion
/// pipeline. Carries the raw vendor status code; the derived fields
/// (`status`, `is_it`, `is_favorite`) are attached by [`TenderDraft::into_record`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenderDraft {
    pub id: String,
    pub date: String,
    pub title: String,
    pub contracting_body: String,
    pub budget_amount: f64,
    pub link: String,
    pub cpv_code: String,
    pub raw_status: Option<String>,
}

impl TenderDraft {
    /// Build the canonical record: classify the CPV code, map the raw
    /// status code, start unfavorited. `is_it` is always recomputed here,
    /// never read back from a previously stored record.
    pub fn into_record(self) -> TenderRecord {
        let status = map_status(self.raw_status.as_deref());
        let is_it = is_technology(&self.cpv_code);
        TenderRecord {
            id: self.id,
            date: self.date,
            title: self.title,
            contracting_body: self.contracting_body,
            budget_amount: self.budget_amount,
            link: self.link,
            cpv_code: self.cpv_code,
            status,
            is_it,
            is_favorite: false,
        }
    }
}

/// Canonical persisted tender representation. `id` is the merge key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenderRecord {
    pub id: String,
    pub date: String,
    pub title: String,
    pub contracting_body: String,
    pub budget_amount: f64,
    pub link: String,
    pub cpv_code: String,
    pub status: StatusLabel,
    pub is_it: bool,
    pub is_favorite: bool,
}

/// Deterministic fallback identifier for entries that carry no `<id>`.
///
/// Derived from the content the entry does have, so re-importing the same
/// archive reproduces the same id and favorite flags survive the merge.
pub fn deterministic_tender_id(title: &str, date: &str, contracting_body: &str) -> String {
    let source = format!("{title}:{date}:{contracting_body}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, source.as_bytes()).to_string()
}

/// CPV-based IT classification.
///
/// A code qualifies iff it starts with `72` and its third character is a
/// digit in `1..=9` (CPV divisions 721-729; the bare `720` root does not
/// qualify). Total over all string inputs.
pub fn is_technology(cpv_code: &str) -> bool {
    if !cpv_code.starts_with("72") {
        return false;
    }
    matches!(cpv_code.as_bytes().get(2), Some(b'1'..=b'9'))
}

/// Ordered status mapping rules, first match wins.
///
/// Precedence is load-bearing: a code containing both `EV` and `ADJ`
/// resolves to `UnderEvaluation`. Kept as an explicit table so each rule
/// is visible and testable on its own.
const STATUS_RULES: &[(fn(&str) -> bool, StatusLabel)] = &[
    (
        |code| code.contains("CONV") || code == "PUB",
        StatusLabel::Announced,
    ),
    (
        |code| code.contains("EV") || code.contains("PRE"),
        StatusLabel::UnderEvaluation,
    ),
    (|code| code.contains("ADJ"), StatusLabel::Awarded),
    (
        |code| code.contains("RES") || code.contains("FOR"),
        StatusLabel::Formalized,
    ),
    (
        |code| code.contains("ANUL") || code.contains("SUSP"),
        StatusLabel::Cancelled,
    ),
];

/// Map a raw vendor status code onto the closed label set.
///
/// Absent or blank codes map to `Pending`; a non-empty code that matches
/// no rule maps to `Other`, never to an error.
pub fn map_status(raw_code: Option<&str>) -> StatusLabel {
    let code = raw_code.map(str::trim).unwrap_or_default();
    if code.is_empty() {
        return StatusLabel::Pending;
    }
    let code = code.to_ascii_uppercase();
    for (matches, label) in STATUS_RULES {
        if matches(&code) {
            return *label;
        }
    }
    StatusLabel::Other
}
