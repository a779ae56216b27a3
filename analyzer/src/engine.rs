// engine.rs — Rule engine
//
// Invokes every registered detector on every top-level declaration outside
// system headers, then establishes the externally observable order with one
// global sort. A detector failing its internal contract on one declaration
// is logged and that declaration is skipped; the run continues.
//
// Preconditions: the translation unit came from the producer unmodified.
// Postconditions: diagnostic order is deterministic for a fixed input and
//   configuration (traversal order within a declaration, registration order
//   across rules, input order across declarations, then the global sort).
// Failure modes: none surfaced; per-declaration incidents are logged.
// Side effects: log records for skipped declarations and timing.

use std::cell::RefCell;
use std::time::Instant;

use tracing::{debug, warn};

use crate::config::Config;
use crate::diag::Diagnostic;
use crate::escape::EscapeModel;
use crate::hotpath::HotPathOracle;
use crate::layout::LayoutCache;
use crate::rules::{analyze, RuleContext, REGISTRY};
use crate::tu::TranslationUnit;

/// Run the full registry over one translation unit.
pub fn run_rules(tu: &TranslationUnit, config: &Config) -> Vec<Diagnostic> {
    let started = Instant::now();
    let layouts = RefCell::new(LayoutCache::new(config.cache_line_bytes));
    let escape = EscapeModel::new();
    let oracle = HotPathOracle::new(config);
    let ctx = RuleContext {
        tu,
        layouts: &layouts,
        escape: &escape,
        oracle: &oracle,
        config,
    };

    let mut diagnostics = Vec::new();

    'decls: for top in &tu.decls {
        if top.in_system_header {
            continue;
        }
        for &rule in REGISTRY.iter() {
            if config.is_rule_disabled(rule.id()) {
                continue;
            }
            match analyze(rule, &top.decl, &ctx) {
                Ok(found) => diagnostics.extend(found),
                Err(e) => {
                    warn!(
                        "rule {} failed on declaration '{}': {}; declaration skipped",
                        rule.id(),
                        top.decl.display_name(),
                        e
                    );
                    continue 'decls;
                }
            }
        }
    }

    debug!(
        "rule sweep over '{}': {} declaration(s), {} diagnostic(s), {:.1}ms",
        tu.source_path,
        tu.decls.len(),
        diagnostics.len(),
        started.elapsed().as_secs_f64() * 1000.0
    );

    diagnostics
}

/// Final global order: severity descending, then file ascending, then line
/// ascending. Stable, so positional identity within a tie is preserved.
pub fn sort_diagnostics(diagnostics: &mut [Diagnostic]) {
    diagnostics.sort_by(|a, b| {
        b.severity
            .rank()
            .cmp(&a.severity.rank())
            .then_with(|| a.location.file.cmp(&b.location.file))
            .then_with(|| a.location.line.cmp(&b.location.line))
    });
}

/// Drop suppressed records and apply severity / evidence-tier floors.
pub fn filter_diagnostics(
    diagnostics: Vec<Diagnostic>,
    config: &Config,
    min_tier: crate::diag::EvidenceTier,
) -> Vec<Diagnostic> {
    diagnostics
        .into_iter()
        .filter(|d| {
            !d.suppressed
                && d.severity.rank() >= config.min_severity.rank()
                && d.tier.rank() <= min_tier.rank()
        })
        .collect()
}
