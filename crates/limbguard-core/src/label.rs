//! Gangrene grade labels produced by the classifier.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Ordinal severity label assigned to a foot image.
///
/// The discriminant order matches the classifier's output logits:
/// `normal, grade_1, grade_2, grade_3, grade_4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GradeLabel {
    #[serde(rename = "normal")]
    Normal,
    #[serde(rename = "grade_1")]
    Grade1,
    #[serde(rename = "grade_2")]
    Grade2,
    #[serde(rename = "grade_3")]
    Grade3,
    #[serde(rename = "grade_4")]
    Grade4,
}

impl GradeLabel {
    /// All labels in logit order.
    pub const ALL: [GradeLabel; 5] = [
        Self::Normal,
        Self::Grade1,
        Self::Grade2,
        Self::Grade3,
        Self::Grade4,
    ];

    /// Number of classes the classifier head emits.
    pub const COUNT: usize = Self::ALL.len();

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Grade1 => "grade_1",
            Self::Grade2 => "grade_2",
            Self::Grade3 => "grade_3",
            Self::Grade4 => "grade_4",
        }
    }

    /// Human-readable name, e.g. `"Grade 2"`.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Normal => "Normal",
            Self::Grade1 => "Grade 1",
            Self::Grade2 => "Grade 2",
            Self::Grade3 => "Grade 3",
            Self::Grade4 => "Grade 4",
        }
    }

    /// Position in the classifier output.
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }

    /// Grade number (0 for normal).
    pub fn grade(&self) -> u8 {
        *self as u8
    }

    /// True for any gangrene grade.
    pub fn is_abnormal(&self) -> bool {
        !matches!(self, Self::Normal)
    }
}

impl fmt::Display for GradeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not one of the five labels.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown classification label: {0:?}")]
pub struct UnknownLabel(pub String);

impl FromStr for GradeLabel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|label| label.as_str() == normalized)
            .ok_or_else(|| UnknownLabel(s.to_string()))
    }
}
