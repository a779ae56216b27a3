// diag.rs — Diagnostic record
//
// The immutable result carrier each detector emits and the external contract
// of the core: rule id, severity, confidence, evidence tier, location,
// hardware reasoning, packed structural evidence, mitigation, and the
// escalation trace explaining any severity raise.
//
// Lifecycle: created by a detector; mutated exactly once by the IR refiner
// (confidence, tier, escalations, suppression) and then by the calibration
// gate (suppression only); immutable afterwards.
//
// Preconditions: none (types only).
// Postconditions: none (types only).
// Failure modes: none.
// Side effects: none.

use std::fmt;

use serde::Serialize;

use crate::tu::SourceLoc;

// ── Severity ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Informational,
    Medium,
    High,
    Critical,
}

impl<'de> serde::Deserialize<'de> for Severity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Severity::parse(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown severity '{s}'")))
    }
}

impl Severity {
    /// Case-insensitive name parse, shared by configuration and CLI.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "informational" => Some(Severity::Informational),
            "medium" => Some(Severity::Medium),
            "high" => Some(Severity::High),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }

    pub fn rank(self) -> u8 {
        match self {
            Severity::Informational => 0,
            Severity::Medium => 1,
            Severity::High => 2,
            Severity::Critical => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Severity::Informational => "Informational",
            Severity::Medium => "Medium",
            Severity::High => "High",
            Severity::Critical => "Critical",
        }
    }
}

// ── Evidence tier ───────────────────────────────────────────────────────────

/// How firmly the finding is grounded: `Proven` requires layout/size facts or
/// IR site-level correlation; `Likely` is a strong heuristic with escape
/// evidence; `Speculative` depends on runtime topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EvidenceTier {
    Proven,
    Likely,
    Speculative,
}

impl EvidenceTier {
    /// Case-insensitive name parse, shared by configuration and CLI.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "proven" => Some(EvidenceTier::Proven),
            "likely" => Some(EvidenceTier::Likely),
            "speculative" => Some(EvidenceTier::Speculative),
            _ => None,
        }
    }

    /// Lower rank = stronger evidence.
    pub fn rank(self) -> u8 {
        match self {
            EvidenceTier::Proven => 0,
            EvidenceTier::Likely => 1,
            EvidenceTier::Speculative => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EvidenceTier::Proven => "proven",
            EvidenceTier::Likely => "likely",
            EvidenceTier::Speculative => "speculative",
        }
    }
}

// ── Diagnostic ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub rule_id: &'static str,
    pub title: &'static str,
    pub severity: Severity,
    /// In [0, 1]; adjusted only through the refiner's clamped deltas.
    pub confidence: f64,
    pub tier: EvidenceTier,
    pub suppressed: bool,
    pub location: SourceLoc,
    /// Qualified name of the owning function, for IR correlation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    pub hardware_reasoning: String,
    /// Packed `key=value; key=value` structural facts.
    pub evidence: String,
    pub mitigation: String,
    pub escalations: Vec<String>,
    /// Refiner latch: a second refinement pass is a no-op.
    #[serde(skip)]
    pub(crate) refined: bool,
}

impl Diagnostic {
    pub fn new(rule_id: &'static str, title: &'static str, severity: Severity) -> Self {
        Self {
            rule_id,
            title,
            severity,
            confidence: 0.0,
            tier: EvidenceTier::Speculative,
            suppressed: false,
            location: SourceLoc::default(),
            function: None,
            hardware_reasoning: String::new(),
            evidence: String::new(),
            mitigation: String::new(),
            escalations: Vec::new(),
            refined: false,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_tier(mut self, tier: EvidenceTier) -> Self {
        self.tier = tier;
        self
    }

    pub fn at(mut self, loc: SourceLoc) -> Self {
        self.location = loc;
        self
    }

    pub fn in_function(mut self, qualified_name: impl Into<String>) -> Self {
        self.function = Some(qualified_name.into());
        self
    }

    pub fn with_reasoning(mut self, text: impl Into<String>) -> Self {
        self.hardware_reasoning = text.into();
        self
    }

    pub fn with_evidence(mut self, text: impl Into<String>) -> Self {
        self.evidence = text.into();
        self
    }

    pub fn with_mitigation(mut self, text: impl Into<String>) -> Self {
        self.mitigation = text.into();
        self
    }

    pub fn with_escalations(mut self, escalations: Vec<String>) -> Self {
        self.escalations = escalations;
        self
    }

    /// Parse a numeric value out of the packed evidence string, e.g.
    /// `evidence_num("sizeof")` on `"sizeof=160B; lines_spanned=3"` → 160.
    /// A trailing byte suffix is stripped. Returns `None` when the key is
    /// absent or non-numeric.
    pub fn evidence_num(&self, key: &str) -> Option<f64> {
        let needle = format!("{key}=");
        let mut search = self.evidence.as_str();
        loop {
            let pos = search.find(&needle)?;
            // Key must start at a field boundary, not mid-word.
            let at_boundary = pos == 0
                || search[..pos]
                    .ends_with(|c: char| c == ' ' || c == ';');
            let rest = &search[pos + needle.len()..];
            if at_boundary {
                let end = rest
                    .find(|c: char| c == ';' || c == ',' || c == ' ')
                    .unwrap_or(rest.len());
                let mut val = &rest[..end];
                if let Some(stripped) = val.strip_suffix('B') {
                    val = stripped;
                }
                return val.parse::<f64>().ok();
            }
            search = rest;
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}, confidence {:.2}, {}) at {}:{}:{}",
            self.rule_id,
            self.title,
            self.severity.name(),
            self.confidence,
            self.tier.name(),
            self.location.file,
            self.location.line,
            self.location.column,
        )
    }
}
