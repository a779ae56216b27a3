// output.rs — Diagnostic rendering
//
// Thin serialization of the finished diagnostic sequence: a human-readable
// CLI format and a JSON document carrying the full records plus execution
// metadata. The diagnostic record itself is the contract; these are just
// projections of it. Input order is preserved exactly.

use serde::Serialize;

use crate::diag::Diagnostic;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionMetadata {
    pub tool_version: &'static str,
    pub ir_enabled: bool,
    pub ir_opt_level: String,
    pub inputs: Vec<String>,
}

impl ExecutionMetadata {
    pub fn new(ir_enabled: bool, ir_opt_level: String, inputs: Vec<String>) -> Self {
        Self {
            tool_version: env!("CARGO_PKG_VERSION"),
            ir_enabled,
            ir_opt_level,
            inputs,
        }
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    tool: &'static str,
    #[serde(flatten)]
    meta: &'a ExecutionMetadata,
    diagnostic_count: usize,
    diagnostics: &'a [Diagnostic],
}

pub fn format_json(diagnostics: &[Diagnostic], meta: &ExecutionMetadata) -> String {
    let report = JsonReport {
        tool: "faultline",
        meta,
        diagnostic_count: diagnostics.len(),
        diagnostics,
    };
    // The report type serializes infallibly.
    serde_json::to_string_pretty(&report).unwrap_or_else(|_| "{}".to_string())
}

pub fn format_cli(diagnostics: &[Diagnostic], meta: &ExecutionMetadata) -> String {
    use std::fmt::Write;

    let mut out = String::new();
    let _ = writeln!(
        out,
        "faultline {} — {} diagnostic(s)",
        meta.tool_version,
        diagnostics.len()
    );

    for diag in diagnostics {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "[{}] {} {} (confidence {:.2}, {})",
            diag.severity.name(),
            diag.rule_id,
            diag.title,
            diag.confidence,
            diag.tier.name()
        );
        let _ = writeln!(
            out,
            "  at {}:{}:{}",
            diag.location.file, diag.location.line, diag.location.column
        );
        if let Some(function) = &diag.function {
            let _ = writeln!(out, "  in {function}");
        }
        let _ = writeln!(out, "  mechanism:  {}", diag.hardware_reasoning);
        let _ = writeln!(out, "  evidence:   {}", diag.evidence);
        let _ = writeln!(out, "  mitigation: {}", diag.mitigation);
        for escalation in &diag.escalations {
            let _ = writeln!(out, "  ! {escalation}");
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::{EvidenceTier, Severity};
    use crate::tu::SourceLoc;

    fn sample() -> Vec<Diagnostic> {
        vec![Diagnostic::new(
            "FL002",
            "False Sharing Candidate",
            Severity::Critical,
        )
        .with_confidence(0.88)
        .with_tier(EvidenceTier::Proven)
        .at(SourceLoc::new("q.cpp", 7, 3))
        .with_reasoning("two atomics share a line")
        .with_evidence("sizeof=16B; atomic_pairs_same_line=1; thread_escape=true")
        .with_mitigation("pad the fields apart")
        .with_escalations(vec!["atomic fields 'a' and 'b' share line 0".into()])]
    }

    #[test]
    fn cli_format_contains_all_sections() {
        let meta = ExecutionMetadata::new(true, "O0".into(), vec!["q.json".into()]);
        let text = format_cli(&sample(), &meta);
        assert!(text.contains("[Critical] FL002"));
        assert!(text.contains("at q.cpp:7:3"));
        assert!(text.contains("evidence:   sizeof=16B"));
        assert!(text.contains("! atomic fields"));
    }

    #[test]
    fn json_format_round_trips() {
        let meta = ExecutionMetadata::new(false, "O0".into(), vec![]);
        let text = format_json(&sample(), &meta);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["tool"], "faultline");
        assert_eq!(value["diagnostic_count"], 1);
        assert_eq!(value["diagnostics"][0]["rule_id"], "FL002");
        assert_eq!(value["diagnostics"][0]["severity"], "critical");
        assert_eq!(value["diagnostics"][0]["tier"], "proven");
    }
}
