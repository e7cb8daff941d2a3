use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A review count as shown by the status page.
///
/// The page hides exact numbers past a threshold and renders them as `2+**`.
/// Those are kept as lower bounds and never compared numerically against
/// exact values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ReviewCount {
    Exact(u32),
    AtLeast(u32),
}

/// Sentinel the page appends to a masked count
pub const MASK_SENTINEL: &str = "+**";

impl ReviewCount {
    /// The number shown on the page, exact or not
    pub fn shown(&self) -> u32 {
        match self {
            ReviewCount::Exact(n) | ReviewCount::AtLeast(n) => *n,
        }
    }

    pub fn is_masked(&self) -> bool {
        matches!(self, ReviewCount::AtLeast(_))
    }
}

impl fmt::Display for ReviewCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewCount::Exact(n) => write!(f, "{}", n),
            ReviewCount::AtLeast(n) => write!(f, "{}{}", n, MASK_SENTINEL),
        }
    }
}

impl FromStr for ReviewCount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (digits, masked) = match s.strip_suffix(MASK_SENTINEL) {
            Some(head) => (head.trim_end(), true),
            None => (s, false),
        };

        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("not a review count: {:?}", s));
        }

        let n: u32 = digits
            .parse()
            .map_err(|_| format!("review count out of range: {:?}", s))?;

        Ok(if masked {
            ReviewCount::AtLeast(n)
        } else {
            ReviewCount::Exact(n)
        })
    }
}

impl TryFrom<String> for ReviewCount {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReviewCount> for String {
    fn from(count: ReviewCount) -> Self {
        count.to_string()
    }
}

/// Review status of one manuscript as read from the status page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManuscriptStatus {
    pub title: String,
    pub progress_status: String,
    pub reviews_completed: u32,
    pub reviews_accepted: ReviewCount,
    pub reviews_invited: ReviewCount,
    pub journal: String,
    pub manuscript_number: String,
    pub updated_date: NaiveDate,
    pub submitted_date: NaiveDate,
}

/// Fields of a [`ManuscriptStatus`], in display and fingerprint order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusField {
    Title,
    ProgressStatus,
    ReviewsCompleted,
    ReviewsAccepted,
    ReviewsInvited,
    Journal,
    ManuscriptNumber,
    UpdatedDate,
    SubmittedDate,
}

impl StatusField {
    pub const ALL: [StatusField; 9] = [
        StatusField::Title,
        StatusField::ProgressStatus,
        StatusField::ReviewsCompleted,
        StatusField::ReviewsAccepted,
        StatusField::ReviewsInvited,
        StatusField::Journal,
        StatusField::ManuscriptNumber,
        StatusField::UpdatedDate,
        StatusField::SubmittedDate,
    ];

    /// Stable machine name, matches the persisted field name
    pub fn key(&self) -> &'static str {
        match self {
            StatusField::Title => "title",
            StatusField::ProgressStatus => "progress_status",
            StatusField::ReviewsCompleted => "reviews_completed",
            StatusField::ReviewsAccepted => "reviews_accepted",
            StatusField::ReviewsInvited => "reviews_invited",
            StatusField::Journal => "journal",
            StatusField::ManuscriptNumber => "manuscript_number",
            StatusField::UpdatedDate => "updated_date",
            StatusField::SubmittedDate => "submitted_date",
        }
    }

    /// Human-readable label used in notifications
    pub fn label(&self) -> &'static str {
        match self {
            StatusField::Title => "Title",
            StatusField::ProgressStatus => "Current status",
            StatusField::ReviewsCompleted => "Reviews completed",
            StatusField::ReviewsAccepted => "Invitations accepted",
            StatusField::ReviewsInvited => "Invitations sent",
            StatusField::Journal => "Journal",
            StatusField::ManuscriptNumber => "Manuscript number",
            StatusField::UpdatedDate => "Last updated",
            StatusField::SubmittedDate => "Submitted",
        }
    }
}

impl fmt::Display for StatusField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl ManuscriptStatus {
    /// Textual value of a single field. Dates render as ISO-8601.
    pub fn value(&self, field: StatusField) -> String {
        match field {
            StatusField::Title => self.title.clone(),
            StatusField::ProgressStatus => self.progress_status.clone(),
            StatusField::ReviewsCompleted => self.reviews_completed.to_string(),
            StatusField::ReviewsAccepted => self.reviews_accepted.to_string(),
            StatusField::ReviewsInvited => self.reviews_invited.to_string(),
            StatusField::Journal => self.journal.clone(),
            StatusField::ManuscriptNumber => self.manuscript_number.clone(),
            StatusField::UpdatedDate => self.updated_date.format("%Y-%m-%d").to_string(),
            StatusField::SubmittedDate => self.submitted_date.format("%Y-%m-%d").to_string(),
        }
    }

    /// All fields with their textual values, in [`StatusField::ALL`] order
    pub fn fields(&self) -> Vec<(StatusField, String)> {
        StatusField::ALL
            .iter()
            .map(|field| (*field, self.value(*field)))
            .collect()
    }

    /// Fields whose values differ from `prior`
    pub fn changes_from(&self, prior: &ManuscriptStatus) -> Vec<FieldChange> {
        StatusField::ALL
            .iter()
            .filter_map(|field| {
                let before = prior.value(*field);
                let after = self.value(*field);
                (before != after).then(|| FieldChange {
                    field: *field,
                    before,
                    after,
                })
            })
            .collect()
    }
}

/// A single field that differs between two observations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: StatusField,
    pub before: String,
    pub after: String,
}

/// Comparison key derived from every field of a status
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FingerprintKey(String);

impl FingerprintKey {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FingerprintKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Last successfully observed status, as persisted by a state store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub status: ManuscriptStatus,
    pub fingerprint: FingerprintKey,
    pub observed_at: DateTime<Utc>,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn status() -> ManuscriptStatus {
        ManuscriptStatus {
            title: "Adaptive mesh refinement for coupled flow problems".to_string(),
            progress_status: "Under Review".to_string(),
            reviews_completed: 2,
            reviews_accepted: ReviewCount::AtLeast(2),
            reviews_invited: ReviewCount::Exact(4),
            journal: "Journal of Computational Physics".to_string(),
            manuscript_number: "JCP-D-24-01234".to_string(),
            updated_date: NaiveDate::from_ymd_opt(2024, 5, 20).unwrap(),
            submitted_date: NaiveDate::from_ymd_opt(2024, 3, 5).unwrap(),
        }
    }
}
