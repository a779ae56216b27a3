// calibrate.rs — Calibration gate
//
// Fingerprints each diagnostic as a numeric feature vector and consults an
// external calibration store of experimentally refuted findings. A record
// whose (fingerprint, hazard class) has been refuted by at least
// `MIN_REFUTATIONS` independent experiments is suppressed. Safety rail: a
// High or Critical finding at the Proven tier is never suppressed, whatever
// the store says. Store I/O failure means nothing is suppressed — the gate
// fails open to preserve signal.
//
// Preconditions: the gate runs after refinement; it only ever sets the
//   suppression flag.
// Postconditions: diagnostic order and all other fields are untouched.
// Failure modes: none surfaced; unreadable stores degrade to empty.
// Side effects: log records for suppression counts and store problems.

use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::diag::{Diagnostic, EvidenceTier, Severity};
use crate::interact::{hazard_class_for_rule, HazardClass};

/// Independent refutations required before the store may answer
/// "known false positive".
pub const MIN_REFUTATIONS: u32 = 3;

// ── Feature fingerprint ─────────────────────────────────────────────────────

/// Fixed-layout feature vector: severity ordinal, confidence, escalation
/// count, then the numeric structural-evidence fields (absent keys are 0).
pub fn extract_features(diag: &Diagnostic) -> Vec<f64> {
    let num = |key: &str| diag.evidence_num(key).unwrap_or(0.0);
    // Line count appears under a per-rule key; take whichever is present.
    let line_count = diag
        .evidence_num("lines_spanned")
        .or_else(|| diag.evidence_num("cache_lines"))
        .or_else(|| diag.evidence_num("lines"))
        .unwrap_or(0.0);

    vec![
        f64::from(diag.severity.rank()),
        diag.confidence,
        diag.escalations.len() as f64,
        num("sizeof"),
        line_count,
        num("atomic_writes"),
        num("mutable_fields"),
        num("estimated_frame"),
        num("depth"),
        num("callees"),
    ]
}

// ── Store interface ─────────────────────────────────────────────────────────

/// What the core expects from calibration storage.
pub trait FalsePositiveStore {
    fn is_known_false_positive(&self, features: &[f64], class: HazardClass) -> bool;
}

#[derive(Debug, Deserialize)]
struct StoreEntry {
    hazard_class: String,
    #[serde(default)]
    refutation_count: u32,
    #[serde(default)]
    feature_vector: Vec<f64>,
    #[serde(default)]
    reason: String,
}

/// JSON-backed store of refuted findings.
#[derive(Debug, Default)]
pub struct JsonCalibrationStore {
    entries: Vec<StoreEntry>,
}

impl JsonCalibrationStore {
    /// Load from disk; any failure yields an empty store (fail-open).
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => {
                warn!(
                    "cannot read calibration store '{}': {}; nothing suppressed",
                    path.display(),
                    e
                );
                return Self::default();
            }
        };
        match serde_json::from_str::<Vec<StoreEntry>>(&text) {
            Ok(entries) => Self { entries },
            Err(e) => {
                warn!(
                    "cannot parse calibration store '{}': {}; nothing suppressed",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    #[cfg(test)]
    fn with_entries(entries: Vec<StoreEntry>) -> Self {
        Self { entries }
    }
}

impl FalsePositiveStore for JsonCalibrationStore {
    fn is_known_false_positive(&self, features: &[f64], class: HazardClass) -> bool {
        for entry in &self.entries {
            if entry.hazard_class != class.name()
                || entry.refutation_count < MIN_REFUTATIONS
            {
                continue;
            }
            // An empty stored fingerprint refutes the whole class; otherwise
            // the severity ordinal (dimension 0) must agree.
            let fingerprint_matches = entry.feature_vector.is_empty()
                || entry.feature_vector.first() == features.first();
            if fingerprint_matches {
                tracing::debug!(
                    "calibration match for {}: {} ({} refutations)",
                    class.name(),
                    entry.reason,
                    entry.refutation_count
                );
                return true;
            }
        }
        false
    }
}

// ── Gate ────────────────────────────────────────────────────────────────────

pub struct CalibrationGate<'a> {
    store: &'a dyn FalsePositiveStore,
}

impl<'a> CalibrationGate<'a> {
    pub fn new(store: &'a dyn FalsePositiveStore) -> Self {
        Self { store }
    }

    /// Mark known false positives suppressed; returns how many. High and
    /// Critical findings at the Proven tier always pass.
    pub fn apply(&self, diagnostics: &mut [Diagnostic]) -> usize {
        let mut suppressed = 0;
        for diag in diagnostics.iter_mut() {
            if diag.suppressed {
                continue;
            }
            let shielded = diag.severity >= Severity::High
                && diag.tier == EvidenceTier::Proven;
            if shielded {
                continue;
            }
            let features = extract_features(diag);
            let class = hazard_class_for_rule(diag.rule_id);
            if self.store.is_known_false_positive(&features, class) {
                diag.suppressed = true;
                suppressed += 1;
            }
        }
        if suppressed > 0 {
            warn!("suppressed {suppressed} diagnostic(s) via calibration feedback");
        }
        suppressed
    }
}
