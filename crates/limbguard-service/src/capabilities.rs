//! Process-wide operating modes, decided once at startup.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierMode {
    /// No usable checkpoint; labels come from filenames.
    Demo,
    Live,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    Disabled,
    Enabled,
}

/// What this process can do. Fixed for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub classifier: ClassifierMode,
    pub retrieval: RetrievalMode,
}

impl Capabilities {
    pub fn demo_mode(&self) -> bool {
        self.classifier == ClassifierMode::Demo
    }

    pub fn rag_enabled(&self) -> bool {
        self.retrieval == RetrievalMode::Enabled
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let classifier = match self.classifier {
            ClassifierMode::Demo => "DEMO",
            ClassifierMode::Live => "LIVE",
        };
        let retrieval = match self.retrieval {
            RetrievalMode::Disabled => "RAG_DISABLED",
            RetrievalMode::Enabled => "RAG_ENABLED",
        };
        write!(f, "{classifier}/{retrieval}")
    }
}
