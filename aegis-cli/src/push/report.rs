//! Push run report
//!
//! The final set of push records is the authoritative account of a run:
//! per-type outcome counts plus the flat list of failures with enough detail
//! to retry manually.

use std::collections::BTreeMap;

use super::{PushOutcome, PushRecord};

/// Outcome counts for one resource type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub created: usize,
    pub updated: usize,
    pub skipped_identical: usize,
    pub skipped_predefined: usize,
    pub skipped_type: usize,
    pub failed: usize,
}

impl OutcomeCounts {
    fn bump(&mut self, outcome: PushOutcome) {
        match outcome {
            PushOutcome::Created => self.created += 1,
            PushOutcome::Updated => self.updated += 1,
            PushOutcome::SkippedIdentical => self.skipped_identical += 1,
            PushOutcome::SkippedPredefined => self.skipped_predefined += 1,
            PushOutcome::SkippedType => self.skipped_type += 1,
            PushOutcome::Failed => self.failed += 1,
        }
    }
}

/// Complete report for one push run.
#[derive(Debug, Default)]
pub struct PushReport {
    pub records: Vec<PushRecord>,
    /// Number of passes the multi-pass loop executed.
    pub passes: usize,
    /// True when anything was created or updated: the caller should invoke
    /// the separate activation step.
    pub needs_activation: bool,
}

impl PushReport {
    pub fn new(records: Vec<PushRecord>, passes: usize) -> Self {
        let needs_activation = records.iter().any(|r| r.outcome.is_mutation());
        Self { records, passes, needs_activation }
    }

    /// Per-type outcome counts, type-sorted.
    pub fn counts_by_type(&self) -> BTreeMap<String, OutcomeCounts> {
        let mut counts: BTreeMap<String, OutcomeCounts> = BTreeMap::new();
        for record in &self.records {
            counts.entry(record.resource_type.clone()).or_default().bump(record.outcome);
        }
        counts
    }

    /// Aggregate counts across all types.
    pub fn totals(&self) -> OutcomeCounts {
        let mut total = OutcomeCounts::default();
        for record in &self.records {
            total.bump(record.outcome);
        }
        total
    }

    /// Every failed record, in report order.
    pub fn failed(&self) -> Vec<&PushRecord> {
        self.records.iter().filter(|r| r.outcome == PushOutcome::Failed).collect()
    }
}
