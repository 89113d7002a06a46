//! Static advice table keyed by classification label.
//!
//! Normal results get preventive self-care guidance; graded results get an
//! urgency level plus a recommended action and home-care instructions. The
//! table is validated once when it is built so that a lookup can never miss.

use serde::{Deserialize, Serialize};

use crate::{ConfigError, GradeLabel};

/// How quickly a graded result needs clinical attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Urgency {
    Low,
    Moderate,
    High,
    Critical,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Moderate => "MODERATE",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Advice returned alongside a classification.
///
/// Exactly one field group is populated: the clinical group
/// (`urgency`, `recommended_action`, `home_care`) for gangrene grades, or the
/// preventive group (`sugar_maintenance`, `skin_care`, `footwear`,
/// `scheduling`) for normal results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdviceRecord {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urgency: Option<Urgency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub home_care: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sugar_maintenance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skin_care: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footwear: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduling: Option<String>,
}

impl AdviceRecord {
    /// Record with only the preventive-care group populated.
    pub fn preventive(
        status: impl Into<String>,
        sugar_maintenance: impl Into<String>,
        skin_care: impl Into<String>,
        footwear: impl Into<String>,
        scheduling: impl Into<String>,
    ) -> Self {
        Self {
            status: status.into(),
            urgency: None,
            recommended_action: None,
            home_care: None,
            sugar_maintenance: Some(sugar_maintenance.into()),
            skin_care: Some(skin_care.into()),
            footwear: Some(footwear.into()),
            scheduling: Some(scheduling.into()),
        }
    }

    /// Record with only the clinical-action group populated.
    pub fn clinical(
        status: impl Into<String>,
        urgency: Urgency,
        recommended_action: impl Into<String>,
        home_care: impl Into<String>,
    ) -> Self {
        Self {
            status: status.into(),
            urgency: Some(urgency),
            recommended_action: Some(recommended_action.into()),
            home_care: Some(home_care.into()),
            sugar_maintenance: None,
            skin_care: None,
            footwear: None,
            scheduling: None,
        }
    }

    fn has_clinical(&self) -> bool {
        self.urgency.is_some() || self.recommended_action.is_some() || self.home_care.is_some()
    }

    fn has_preventive(&self) -> bool {
        self.sugar_maintenance.is_some()
            || self.skin_care.is_some()
            || self.footwear.is_some()
            || self.scheduling.is_some()
    }

    fn clinical_complete(&self) -> bool {
        self.urgency.is_some() && non_empty(&self.recommended_action) && non_empty(&self.home_care)
    }

    fn preventive_complete(&self) -> bool {
        non_empty(&self.sugar_maintenance)
            && non_empty(&self.skin_care)
            && non_empty(&self.footwear)
            && non_empty(&self.scheduling)
    }
}

fn non_empty(field: &Option<String>) -> bool {
    field.as_deref().is_some_and(|s| !s.trim().is_empty())
}

/// One row of the advice table.
#[derive(Debug, Clone)]
pub struct AdviceEntry {
    pub label: GradeLabel,
    pub record: AdviceRecord,
}

/// Complete, validated mapping from every label to its advice.
#[derive(Debug, Clone)]
pub struct AdviceTable {
    // Indexed by `GradeLabel::index()`.
    records: Vec<AdviceRecord>,
}

impl AdviceTable {
    /// The built-in advice table.
    pub fn standard() -> Result<Self, ConfigError> {
        Self::from_entries(standard_entries())
    }

    /// Build a table from explicit entries, rejecting incomplete or
    /// inconsistent tables.
    pub fn from_entries(entries: Vec<AdviceEntry>) -> Result<Self, ConfigError> {
        let mut slots: Vec<Option<AdviceRecord>> = vec![None; GradeLabel::COUNT];

        for entry in entries {
            let slot = &mut slots[entry.label.index()];
            if slot.is_some() {
                return Err(ConfigError::DuplicateAdvice(entry.label));
            }
            *slot = Some(entry.record);
        }

        let mut records = Vec::with_capacity(GradeLabel::COUNT);
        for (label, slot) in GradeLabel::ALL.into_iter().zip(slots) {
            let record = slot.ok_or(ConfigError::MissingAdvice(label))?;
            validate_record(label, &record)?;
            records.push(record);
        }

        // Urgency must not decrease as the grade increases.
        for pair in GradeLabel::ALL[1..].windows(2) {
            let (from, to) = (pair[0], pair[1]);
            if records[to.index()].urgency < records[from.index()].urgency {
                return Err(ConfigError::UrgencyNotMonotonic { from, to });
            }
        }

        Ok(Self { records })
    }

    /// Advice for a label. Total over all labels.
    pub fn advise(&self, label: GradeLabel) -> &AdviceRecord {
        &self.records[label.index()]
    }

    /// Iterate `(label, record)` pairs in label order.
    pub fn iter(&self) -> impl Iterator<Item = (GradeLabel, &AdviceRecord)> {
        GradeLabel::ALL.into_iter().zip(self.records.iter())
    }
}

fn validate_record(label: GradeLabel, record: &AdviceRecord) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidAdvice {
        label,
        reason: reason.to_string(),
    };

    if record.status.trim().is_empty() {
        return Err(invalid("empty status"));
    }

    if label.is_abnormal() {
        if !record.clinical_complete() {
            return Err(invalid("missing urgency, recommended_action or home_care"));
        }
        if record.has_preventive() {
            return Err(invalid("graded result carries preventive-care fields"));
        }
    } else {
        if !record.preventive_complete() {
            return Err(invalid("missing preventive-care fields"));
        }
        if record.has_clinical() {
            return Err(invalid("normal result carries clinical-action fields"));
        }
    }
    Ok(())
}

// ── Built-in table ──

const NORMAL_STATUS: &str = "Normal – no signs of gangrene detected.";

const SUGAR_MAINTENANCE: &str = "Monitor your blood sugar levels regularly. Aim for fasting glucose \
    between 80-130 mg/dL and post-meal glucose below 180 mg/dL. Keep a daily log and share it with \
    your healthcare provider.";

const SKIN_CARE: &str = "Inspect your feet daily for cuts, blisters, or changes in skin color. \
    Wash feet with lukewarm water and mild soap, then dry thoroughly, especially between the toes. \
    Apply a fragrance-free moisturizer to prevent cracking, but avoid applying between the toes.";

const FOOTWEAR: &str = "Wear well-fitting, supportive shoes and moisture-wicking socks. Avoid \
    walking barefoot. Check the inside of your shoes for foreign objects before wearing them.";

const SCHEDULING: &str = "Schedule a comprehensive foot examination with your healthcare provider \
    at least once a year. If you have diabetes or peripheral vascular disease, more frequent \
    check-ups (every 3-6 months) are recommended.";

fn graded_status(label: GradeLabel) -> String {
    format!("Gangrene detected – {}.", label.display_name().to_lowercase())
}

fn standard_entries() -> Vec<AdviceEntry> {
    let graded = |label: GradeLabel, urgency: Urgency, action: &str, home_care: &str| AdviceEntry {
        label,
        record: AdviceRecord::clinical(graded_status(label), urgency, action, home_care),
    };

    vec![
        AdviceEntry {
            label: GradeLabel::Normal,
            record: AdviceRecord::preventive(
                NORMAL_STATUS,
                SUGAR_MAINTENANCE,
                SKIN_CARE,
                FOOTWEAR,
                SCHEDULING,
            ),
        },
        graded(
            GradeLabel::Grade1,
            Urgency::Low,
            "Early-stage wound detected. Clean the area gently with saline and apply a sterile \
             dressing. Schedule an appointment with your healthcare provider within the next 1-2 \
             days for professional evaluation.",
            "Keep the foot elevated when resting. Avoid putting pressure on the affected area. \
             Monitor for signs of infection such as increased redness, warmth, swelling, or \
             discharge.",
        ),
        graded(
            GradeLabel::Grade2,
            Urgency::Moderate,
            "A deeper wound has been detected that may involve underlying tissue. Seek medical \
             attention within 24 hours. Do not attempt to debride the wound yourself.",
            "Keep the wound covered with a sterile, moist dressing. Avoid bearing weight on the \
             affected foot. Monitor your temperature for signs of systemic infection.",
        ),
        graded(
            GradeLabel::Grade3,
            Urgency::High,
            "Significant tissue involvement detected. Seek medical attention today. This grade of \
             wound may require surgical debridement, antibiotics, or specialized wound care.",
            "Do not walk on the affected foot. Keep the wound loosely covered and seek emergency \
             care if you notice foul odor, spreading redness, or fever.",
        ),
        graded(
            GradeLabel::Grade4,
            Urgency::Critical,
            "Severe tissue damage detected. Seek emergency medical care immediately. This \
             condition may require hospitalization, IV antibiotics, or surgical intervention.",
            "Go to the nearest emergency department or call emergency services. Do not delay \
             treatment.",
        ),
    ]
}
