//! Baseline push engine
//!
//! Takes a baseline envelope and reconciles it into a target tenant:
//! imports the target's live state, classifies every entry, then runs
//! ordered, retried push passes with identifier remapping. Emits one
//! outcome record per baseline entry.

pub mod classify;
pub mod engine;
pub mod remap;
pub mod report;

pub use classify::{Classification, PlanAction, PlannedPush};
pub use engine::PushEngine;
pub use remap::IdentifierMap;
pub use report::PushReport;

/// Terminal outcome of one baseline entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PushOutcome {
    Created,
    Updated,
    /// Stripped payloads matched an existing target entry exactly.
    SkippedIdentical,
    /// Recognized predefined/system instance of a predefined-skip type.
    SkippedPredefined,
    /// Entry's type is environment-specific and never pushed.
    SkippedType,
    Failed,
}

impl PushOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::SkippedIdentical => "skipped_identical",
            Self::SkippedPredefined => "skipped_predefined",
            Self::SkippedType => "skipped_type",
            Self::Failed => "failed",
        }
    }

    /// True for outcomes that changed the target.
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Created | Self::Updated)
    }
}

/// One outcome per baseline entry per push run.
#[derive(Debug, Clone)]
pub struct PushRecord {
    pub resource_type: String,
    /// Natural key used for matching (name or type-specific unique field).
    pub source_key: String,
    /// Identifier the entry carried in its source environment, if any.
    pub source_id: Option<String>,
    pub outcome: PushOutcome,
    /// Set once resolved in the target.
    pub target_id: Option<String>,
    /// Set iff `outcome` is `Failed`.
    pub error_detail: Option<String>,
}

impl PushRecord {
    pub fn new(resource_type: &str, source_key: &str, outcome: PushOutcome) -> Self {
        Self {
            resource_type: resource_type.to_string(),
            source_key: source_key.to_string(),
            source_id: None,
            outcome,
            target_id: None,
            error_detail: None,
        }
    }

    pub fn source_id(mut self, id: Option<String>) -> Self {
        self.source_id = id;
        self
    }

    pub fn target_id(mut self, id: Option<String>) -> Self {
        self.target_id = id;
        self
    }

    pub fn failed(resource_type: &str, source_key: &str, detail: &str) -> Self {
        let mut record = Self::new(resource_type, source_key, PushOutcome::Failed);
        record.error_detail = Some(detail.to_string());
        record
    }
}
