//! Compliance status derivation.
//!
//! `StatusEngine::evaluate` is a pure transition function: it never touches
//! shared state or storage. The capture loop owns every side effect.

use crate::types::{ComplianceStatus, Detection, ViolationKind};
use std::collections::BTreeSet;

/// Result of evaluating one frame's detections
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    pub status: ComplianceStatus,
    /// True only when this frame entered an alert state, or changed which items are missing
    pub should_log: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatusEngine;

impl StatusEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, previous: &ComplianceStatus, detections: &[Detection]) -> Evaluation {
        let status = Self::classify(detections);
        let should_log = status.is_alert() && status != *previous;
        Evaluation { status, should_log }
    }

    /// Map a detection set to a status, ignoring order and duplicates
    pub fn classify(detections: &[Detection]) -> ComplianceStatus {
        let missing: BTreeSet<ViolationKind> =
            detections.iter().filter_map(Detection::violation).collect();

        if !missing.is_empty() {
            ComplianceStatus::Alert(missing)
        } else if !detections.is_empty() {
            ComplianceStatus::Compliant
        } else {
            ComplianceStatus::Scanning
        }
    }
}
