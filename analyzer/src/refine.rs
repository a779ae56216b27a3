// refine.rs — IR-driven diagnostic refinement
//
// Cross-checks syntactic findings against the lowered-IR profiles: confirms
// them (confidence up, tier to Proven on site-level correlation), weakens
// them (pattern optimized away), or suppresses them (stack frame below
// threshold in the precise IR figure). Adjustments are additive named
// deltas, each clamped by its own floor/ceiling and then by the global
// bounds; all arithmetic saturates, so no adjustment can error.
//
// The refiner never touches rule id, title, severity, or location, and never
// reorders. A latch on each record makes a second pass a no-op.
//
// Preconditions: profiles were built by `irprofile::build_profiles`.
// Postconditions: each diagnostic is mutated at most once across the
//   refiner's lifetime; confidence stays within [0.10, 0.98].
// Failure modes: none; a missing profile leaves the record unchanged.
// Side effects: none.

use crate::config::Config;
use crate::diag::{Diagnostic, EvidenceTier};
use crate::irprofile::{IrFunctionProfile, ProfileMap};

// ── Confidence model ────────────────────────────────────────────────────────

pub const GLOBAL_FLOOR: f64 = 0.10;
pub const GLOBAL_CEILING: f64 = 0.98;

#[derive(Debug, Clone, Copy)]
pub struct ConfidenceAdjustment {
    pub factor: &'static str,
    pub delta: f64,
    pub floor: f64,
    pub ceiling: f64,
}

/// Named evidence factors. Positive deltas use the global floor; negative
/// deltas carry their own floor so refutation never erases a finding.
pub mod evidence {
    use super::ConfidenceAdjustment;

    pub const SITE_CONFIRMED: ConfidenceAdjustment = ConfidenceAdjustment {
        factor: "site-confirmed",
        delta: 0.10,
        floor: super::GLOBAL_FLOOR,
        ceiling: 0.98,
    };
    pub const FUNCTION_CONFIRMED: ConfidenceAdjustment = ConfidenceAdjustment {
        factor: "function-level IR confirmation",
        delta: 0.05,
        floor: super::GLOBAL_FLOOR,
        ceiling: 0.92,
    };
    pub const ORDERING_OPTIMIZED_AWAY: ConfidenceAdjustment = ConfidenceAdjustment {
        factor: "ordering optimized away",
        delta: -0.20,
        floor: 0.30,
        ceiling: super::GLOBAL_CEILING,
    };
    pub const ATOMIC_WRITES_CONFIRMED: ConfidenceAdjustment = ConfidenceAdjustment {
        factor: "atomic writes survive lowering",
        delta: 0.10,
        floor: super::GLOBAL_FLOOR,
        ceiling: 0.95,
    };
    pub const HEAP_SURVIVED: ConfidenceAdjustment = ConfidenceAdjustment {
        factor: "heap call survives inlining",
        delta: 0.05,
        floor: super::GLOBAL_FLOOR,
        ceiling: 0.98,
    };
    pub const HEAP_ELIMINATED: ConfidenceAdjustment = ConfidenceAdjustment {
        factor: "allocation eliminated",
        delta: -0.15,
        floor: 0.40,
        ceiling: super::GLOBAL_CEILING,
    };
    pub const INDIRECT_CONFIRMED: ConfidenceAdjustment = ConfidenceAdjustment {
        factor: "indirect calls remain",
        delta: 0.10,
        floor: super::GLOBAL_FLOOR,
        ceiling: 0.95,
    };
    pub const FULLY_DEVIRTUALIZED: ConfidenceAdjustment = ConfidenceAdjustment {
        factor: "fully devirtualized",
        delta: -0.25,
        floor: 0.30,
        ceiling: super::GLOBAL_CEILING,
    };
    pub const LOCK_CONFIRMED: ConfidenceAdjustment = ConfidenceAdjustment {
        factor: "lock call survives lowering",
        delta: 0.05,
        floor: super::GLOBAL_FLOOR,
        ceiling: 0.95,
    };
    pub const STACK_CONFIRMED: ConfidenceAdjustment = ConfidenceAdjustment {
        factor: "IR-precise stack frame",
        delta: 0.10,
        floor: super::GLOBAL_FLOOR,
        ceiling: 0.95,
    };
}

/// Apply one named delta with its clamps, recording a trace entry when the
/// value moved.
pub fn apply_adjustment(diag: &mut Diagnostic, adj: ConfidenceAdjustment) {
    let prev = diag.confidence;
    let adjusted = (prev + adj.delta)
        .clamp(adj.floor, adj.ceiling)
        .clamp(GLOBAL_FLOOR, GLOBAL_CEILING);
    if (adjusted - prev).abs() > f64::EPSILON {
        diag.escalations.push(format!(
            "confidence {:+.2} ({:.2}->{:.2}): {}",
            adj.delta, prev, adjusted, adj.factor
        ));
        diag.confidence = adjusted;
    }
}

// ── Refiner ─────────────────────────────────────────────────────────────────

pub struct DiagnosticRefiner<'a> {
    profiles: &'a ProfileMap,
    stack_frame_warn_bytes: u64,
}

impl<'a> DiagnosticRefiner<'a> {
    pub fn new(profiles: &'a ProfileMap, config: &Config) -> Self {
        Self {
            profiles,
            stack_frame_warn_bytes: config.stack_frame_warn_bytes,
        }
    }

    /// Refine every diagnostic in place. Order is preserved; records already
    /// refined are left alone, so the pass is idempotent.
    pub fn refine(&self, diagnostics: &mut [Diagnostic]) {
        for diag in diagnostics.iter_mut() {
            if diag.refined {
                continue;
            }
            match diag.rule_id {
                "FL010" => self.refine_ordering(diag),
                "FL011" => self.refine_contention(diag),
                "FL012" => self.refine_lock(diag),
                "FL020" => self.refine_heap(diag),
                "FL021" => self.refine_stack(diag),
                "FL030" | "FL031" => self.refine_indirect(diag),
                _ => {}
            }
            diag.refined = true;
        }
    }

    /// Qualified-name suffix match at a name boundary, then exact mangled
    /// name.
    fn find_profile(&self, diag: &Diagnostic) -> Option<&IrFunctionProfile> {
        let qname = diag.function.as_deref()?;
        if qname.is_empty() {
            return None;
        }
        self.profiles
            .values()
            .find(|p| suffix_matches(&p.demangled_name, qname))
            .or_else(|| self.profiles.get(qname))
    }

    fn refine_ordering(&self, diag: &mut Diagnostic) {
        let Some(profile) = self.find_profile(diag) else {
            return;
        };

        let site_match = profile.atomics.iter().any(|a| {
            a.ordering == crate::irmodel::IrOrdering::SeqCst
                && a.source_line == Some(diag.location.line)
        });

        if site_match {
            diag.tier = EvidenceTier::Proven;
            apply_adjustment(diag, evidence::SITE_CONFIRMED);
            diag.escalations.push(format!(
                "site-confirmed: seq_cst instruction at line {} after lowering",
                diag.location.line
            ));
        } else if profile.seq_cst_count > 0 {
            apply_adjustment(diag, evidence::FUNCTION_CONFIRMED);
            diag.escalations.push(format!(
                "IR confirmed: {} seq_cst instruction(s) emitted after lowering",
                profile.seq_cst_count
            ));
        } else if !profile.atomics.is_empty() {
            apply_adjustment(diag, evidence::ORDERING_OPTIMIZED_AWAY);
            diag.escalations.push(
                "ordering optimized away: atomics present but no seq_cst instruction \
                 emitted"
                    .to_string(),
            );
        }

        if profile.fence_count > 0 {
            diag.escalations.push(format!(
                "IR confirmed: {} explicit fence instruction(s)",
                profile.fence_count
            ));
        }
    }

    fn refine_contention(&self, diag: &mut Diagnostic) {
        let Some(profile) = self.find_profile(diag) else {
            return;
        };

        let writes: Vec<_> = profile.atomics.iter().filter(|a| a.is_write()).collect();
        if writes.is_empty() {
            return;
        }

        apply_adjustment(diag, evidence::ATOMIC_WRITES_CONFIRMED);
        let loop_writes = writes.iter().filter(|a| a.in_loop).count();
        let mut note = format!(
            "IR confirmed: {} atomic write instruction(s)",
            writes.len()
        );
        if loop_writes > 0 {
            note.push_str(&format!(", {loop_writes} in loop back-edge blocks"));
        }
        diag.escalations.push(note);

        if writes.iter().any(|a| a.source_line.is_some()) {
            diag.tier = EvidenceTier::Proven;
        }
    }

    fn refine_lock(&self, diag: &mut Diagnostic) {
        let Some(profile) = self.find_profile(diag) else {
            return;
        };

        let has_cmpxchg = profile
            .atomics
            .iter()
            .any(|a| a.op == crate::irmodel::IrAtomicOp::CmpXchg);
        if profile.mutex_calls.is_empty() && !has_cmpxchg {
            return;
        }

        apply_adjustment(diag, evidence::LOCK_CONFIRMED);
        diag.escalations.push(format!(
            "IR confirmed: {} mutex-family call(s), cmpxchg {}",
            profile.mutex_calls.len(),
            if has_cmpxchg { "present" } else { "absent" }
        ));

        if profile
            .mutex_calls
            .iter()
            .any(|c| c.source_line == Some(diag.location.line))
        {
            diag.tier = EvidenceTier::Proven;
            diag.escalations.push(format!(
                "site-confirmed: lock call at line {} after lowering",
                diag.location.line
            ));
        }
    }

    fn refine_heap(&self, diag: &mut Diagnostic) {
        let Some(profile) = self.find_profile(diag) else {
            return;
        };

        let direct: Vec<_> = profile
            .heap_calls
            .iter()
            .filter(|c| !c.is_indirect)
            .collect();

        if direct.is_empty() {
            apply_adjustment(diag, evidence::HEAP_ELIMINATED);
            diag.escalations.push(
                "allocation eliminated: no heap calls remain after inlining".to_string(),
            );
            return;
        }

        apply_adjustment(diag, evidence::HEAP_SURVIVED);
        let in_loop = direct.iter().filter(|c| c.in_loop).count();
        let mut note = format!(
            "IR confirmed: {} heap alloc/free call(s) after inlining",
            direct.len()
        );
        if in_loop > 0 {
            note.push_str(&format!(", {in_loop} in loop blocks"));
        }
        diag.escalations.push(note);
    }

    fn refine_stack(&self, diag: &mut Diagnostic) {
        let Some(profile) = self.find_profile(diag) else {
            return;
        };

        let ir_frame = profile.total_alloca_bytes;
        diag.evidence.push_str(&format!(
            "; ir_frame={}B; ir_allocas={}",
            ir_frame,
            profile.allocas.len()
        ));

        // The precise figure replaces the AST estimate; below threshold the
        // finding is withdrawn entirely.
        if ir_frame < self.stack_frame_warn_bytes {
            diag.suppressed = true;
            diag.escalations.push(format!(
                "withdrawn: IR stack frame {}B is below the {}B threshold",
                ir_frame, self.stack_frame_warn_bytes
            ));
            return;
        }

        apply_adjustment(diag, evidence::STACK_CONFIRMED);
        let mut note = format!(
            "IR confirmed: stack frame {}B from {} alloca(s)",
            ir_frame,
            profile.allocas.len()
        );
        for a in profile.allocas.iter().filter(|a| a.size_bytes >= 256) {
            note.push_str(&format!(" [{}={}B]", a.name, a.size_bytes));
        }
        diag.escalations.push(note);

        let ast_estimate = diag.evidence_num("estimated_frame").unwrap_or(0.0) as u64;
        if ast_estimate > 0 && ir_frame > ast_estimate * 2 {
            diag.tier = EvidenceTier::Proven;
            diag.escalations.push(format!(
                "IR stack frame ({ir_frame}B) exceeds the AST estimate \
                 ({ast_estimate}B) by more than 2x: compiler temporaries or \
                 alignment padding"
            ));
        }
    }

    fn refine_indirect(&self, diag: &mut Diagnostic) {
        let Some(profile) = self.find_profile(diag) else {
            return;
        };

        if profile.indirect_call_count > 0 {
            apply_adjustment(diag, evidence::INDIRECT_CONFIRMED);
            diag.escalations.push(format!(
                "IR confirmed: {} indirect call(s) remain after devirtualization",
                profile.indirect_call_count
            ));
        } else if profile.direct_call_count > 0 {
            apply_adjustment(diag, evidence::FULLY_DEVIRTUALIZED);
            diag.escalations.push(
                "fully devirtualized: all calls lowered to direct targets".to_string(),
            );
        }
    }
}

/// `haystack` equals `needle`, or ends with it immediately after a
/// qualified-name separator.
fn suffix_matches(haystack: &str, needle: &str) -> bool {
    if haystack == needle {
        return true;
    }
    haystack
        .strip_suffix(needle)
        .is_some_and(|prefix| prefix.ends_with(':'))
}
