// config.rs — Analyzer configuration
//
// Recognized keys with their defaults, loadable from a JSON file. An
// unreadable or unparseable file degrades to defaults with a logged warning;
// configuration problems never abort an analysis run.

use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::diag::Severity;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    // Cache model
    pub cache_line_bytes: u64,
    pub cache_line_span_warn: u64,
    pub cache_line_span_crit: u64,

    // Stack frame
    pub stack_frame_warn_bytes: u64,

    // Allocation
    pub alloc_size_escalation: u64,

    // Branch depth
    pub branch_depth_warn: u32,

    // TLB heuristics
    pub page_size: u64,

    // Minimum severity to emit
    pub min_severity: Severity,

    // Output
    pub json_output: bool,
    pub output_file: String,

    // Hot path patterns (glob syntax)
    pub hot_function_patterns: Vec<String>,
    pub hot_file_patterns: Vec<String>,

    // Rule enable/disable
    pub disabled_rules: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_line_bytes: 64,
            cache_line_span_warn: 64,
            cache_line_span_crit: 128,
            stack_frame_warn_bytes: 2048,
            alloc_size_escalation: 256,
            branch_depth_warn: 4,
            page_size: 4096,
            min_severity: Severity::Informational,
            json_output: false,
            output_file: String::new(),
            hot_function_patterns: Vec::new(),
            hot_file_patterns: Vec::new(),
            disabled_rules: Vec::new(),
        }
    }
}

impl Config {
    /// Load from a JSON file, falling back to defaults on any failure.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) => {
                warn!("cannot open config '{}', using defaults: {}", path.display(), e);
                return Self::default();
            }
        };
        match serde_json::from_str(&text) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(
                    "config parse error in '{}', using defaults: {}",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    pub fn is_rule_disabled(&self, rule_id: &str) -> bool {
        self.disabled_rules.iter().any(|r| r == rule_id)
    }
}
