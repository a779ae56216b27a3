// rules.rs — The fifteen hazard detectors
//
// Each detector is a pure function from one top-level declaration (plus the
// layout provider, escape model, hot-path oracle, and configuration) to zero
// or more diagnostics. The registry is a closed enum in registration order;
// dispatch is one match arm per kind, no virtual table.
//
// Preconditions: declarations come from the producer unmodified; records
//   passed to the layout provider are complete (detectors pre-filter).
// Postconditions: diagnostics from one declaration appear in body traversal
//   order; detectors share no mutable state, so registration order cannot
//   change the multiset of results.
// Failure modes: `RuleError` on a broken layout contract; the engine logs
//   and skips the declaration.
// Side effects: none.

use std::cell::RefCell;

use crate::config::Config;
use crate::diag::{Diagnostic, EvidenceTier, Severity};
use crate::escape::EscapeModel;
use crate::hotpath::HotPathOracle;
use crate::layout::{CacheLineMap, LayoutCache, LayoutError};
use crate::tu::{
    AtomicMethod, AtomicOpClass, Callee, ContainerKind, Decl, Expr, ExprKind, FunctionDecl,
    MemOrdering, RecordDecl, SourceLoc, Stmt, TranslationUnit, TypeKind,
};

// ── Rule identity and registry ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    CacheLineSpanning,
    FalseSharing,
    StrongOrdering,
    AtomicContention,
    LockHotPath,
    HeapAllocHotPath,
    LargeStackFrame,
    VirtualDispatch,
    ErasedCallableHotPath,
    GlobalState,
    ContendedQueue,
    DeepConditionalTree,
    NumaUnfriendly,
    CentralizedDispatcher,
    HazardAmplification,
}

/// All detectors in registration order. The engine iterates this array; the
/// order fixes the relative position of different rules' diagnostics on the
/// same declaration before the final global sort.
pub const REGISTRY: [RuleKind; 15] = [
    RuleKind::CacheLineSpanning,
    RuleKind::FalseSharing,
    RuleKind::StrongOrdering,
    RuleKind::AtomicContention,
    RuleKind::LockHotPath,
    RuleKind::HeapAllocHotPath,
    RuleKind::LargeStackFrame,
    RuleKind::VirtualDispatch,
    RuleKind::ErasedCallableHotPath,
    RuleKind::GlobalState,
    RuleKind::ContendedQueue,
    RuleKind::DeepConditionalTree,
    RuleKind::NumaUnfriendly,
    RuleKind::CentralizedDispatcher,
    RuleKind::HazardAmplification,
];

impl RuleKind {
    pub fn id(self) -> &'static str {
        match self {
            RuleKind::CacheLineSpanning => "FL001",
            RuleKind::FalseSharing => "FL002",
            RuleKind::StrongOrdering => "FL010",
            RuleKind::AtomicContention => "FL011",
            RuleKind::LockHotPath => "FL012",
            RuleKind::HeapAllocHotPath => "FL020",
            RuleKind::LargeStackFrame => "FL021",
            RuleKind::VirtualDispatch => "FL030",
            RuleKind::ErasedCallableHotPath => "FL031",
            RuleKind::GlobalState => "FL040",
            RuleKind::ContendedQueue => "FL041",
            RuleKind::DeepConditionalTree => "FL050",
            RuleKind::NumaUnfriendly => "FL060",
            RuleKind::CentralizedDispatcher => "FL061",
            RuleKind::HazardAmplification => "FL090",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            RuleKind::CacheLineSpanning => "Cache Line Spanning Struct",
            RuleKind::FalseSharing => "False Sharing Candidate",
            RuleKind::StrongOrdering => "Overly Strong Atomic Ordering",
            RuleKind::AtomicContention => "Atomic Contention Hotspot",
            RuleKind::LockHotPath => "Lock in Hot Path",
            RuleKind::HeapAllocHotPath => "Heap Allocation in Hot Path",
            RuleKind::LargeStackFrame => "Large Stack Frame",
            RuleKind::VirtualDispatch => "Virtual Dispatch in Hot Path",
            RuleKind::ErasedCallableHotPath => "Erased Callable in Hot Path",
            RuleKind::GlobalState => "Centralized Mutable Global State",
            RuleKind::ContendedQueue => "Contended Queue Pattern",
            RuleKind::DeepConditionalTree => "Deep Conditional Tree in Hot Path",
            RuleKind::NumaUnfriendly => "NUMA-Unfriendly Shared Structure",
            RuleKind::CentralizedDispatcher => "Centralized Dispatcher Bottleneck",
            RuleKind::HazardAmplification => "Hazard Amplification",
        }
    }

    pub fn base_severity(self) -> Severity {
        match self {
            RuleKind::LargeStackFrame | RuleKind::DeepConditionalTree => Severity::Medium,
            RuleKind::CacheLineSpanning
            | RuleKind::StrongOrdering
            | RuleKind::VirtualDispatch
            | RuleKind::ErasedCallableHotPath
            | RuleKind::GlobalState
            | RuleKind::ContendedQueue
            | RuleKind::NumaUnfriendly
            | RuleKind::CentralizedDispatcher => Severity::High,
            RuleKind::FalseSharing
            | RuleKind::AtomicContention
            | RuleKind::LockHotPath
            | RuleKind::HeapAllocHotPath
            | RuleKind::HazardAmplification => Severity::Critical,
        }
    }

    pub fn hardware_mechanism(self) -> &'static str {
        match self {
            RuleKind::CacheLineSpanning => {
                "L1/L2 cache line footprint expansion. Increased eviction \
                 probability. Higher coherence traffic under multi-core writes."
            }
            RuleKind::FalseSharing => {
                "MESI invalidation ping-pong across cores due to shared cache \
                 line writes. Each write by one core forces invalidation of the \
                 line in all other cores' L1/L2, triggering RFO traffic."
            }
            RuleKind::StrongOrdering => {
                "On x86-64 TSO: seq_cst stores lower to XCHG (implicit LOCK, \
                 store buffer drain). seq_cst loads lower to plain MOV. seq_cst \
                 RMW lowers to a LOCK-prefixed instruction, same as acq_rel. \
                 The actionable cost is on stores where release ordering would \
                 emit plain MOV."
            }
            RuleKind::AtomicContention => {
                "Cache line ownership thrashing via MESI RFO. Each atomic write \
                 from a different core forces exclusive ownership transfer \
                 (~40-100ns cross-core, ~100-300ns cross-socket). Store buffer \
                 pressure from sustained atomic writes."
            }
            RuleKind::LockHotPath => {
                "Lock convoy: threads serialize on a contended mutex, converting \
                 parallel execution to sequential. Blocking locks trigger futex \
                 syscall and context switch (~1-10us). Cache line contention on \
                 mutex internal state."
            }
            RuleKind::HeapAllocHotPath => {
                "Allocator lock contention (arena locks). TLB pressure from new \
                 page mappings. Page fault jitter. Heap fragmentation degrades \
                 spatial locality."
            }
            RuleKind::LargeStackFrame => {
                "TLB pressure from stack spanning multiple pages. L1D cache \
                 pressure from large working set. Potential stack page faults \
                 on deep call chains."
            }
            RuleKind::VirtualDispatch => {
                "Indirect branch via vtable pointer. BTB lookup required. \
                 Misprediction causes a full pipeline flush (~14-20 cycles). \
                 Polymorphic call sites with multiple targets degrade BTB hit \
                 rate."
            }
            RuleKind::ErasedCallableHotPath => {
                "Type-erased callable storage forces an indirect call (BTB \
                 pressure). Construction may heap-allocate when the callable \
                 exceeds the small-buffer threshold. Prevents inlining."
            }
            RuleKind::GlobalState => {
                "Global mutable state accessed from multiple cores causes NUMA \
                 remote access on multi-socket systems (~100-300ns penalty). \
                 Cache line contention on shared writes. Scalability collapse \
                 as core count grows."
            }
            RuleKind::ContendedQueue => {
                "Head/tail index cache line bouncing in MPMC queues. Atomic \
                 head and tail on the same line cause MESI invalidation on \
                 every enqueue/dequeue from different cores."
            }
            RuleKind::DeepConditionalTree => {
                "Deeply nested conditionals widen the branch-misprediction \
                 surface; each unpredictable branch costs ~14-20 cycles. Large \
                 switches on non-constant values pressure the BTB and I-cache."
            }
            RuleKind::NumaUnfriendly => {
                "On multi-socket systems memory is partitioned across NUMA \
                 nodes; remote access costs ~100-300ns vs ~60-80ns local. Large \
                 shared mutable structures without NUMA-aware placement are \
                 accessed remotely by at least one socket."
            }
            RuleKind::CentralizedDispatcher => {
                "Single-point fan-out serializes all message processing through \
                 one function: I-cache pressure from the dispatch body, branch \
                 misprediction from polymorphic dispatch, no per-core locality \
                 of handler state."
            }
            RuleKind::HazardAmplification => {
                "Multiple interacting latency multipliers on one structure: \
                 line spanning, atomic contention, and cross-thread sharing \
                 compound under load into coherence storms, store buffer \
                 saturation, and TLB pressure."
            }
        }
    }

    pub fn from_id(id: &str) -> Option<RuleKind> {
        REGISTRY.iter().copied().find(|k| k.id() == id)
    }
}

// ── Context and dispatch ────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error(transparent)]
    Layout(#[from] LayoutError),
}

pub struct RuleContext<'a> {
    pub tu: &'a TranslationUnit,
    pub layouts: &'a RefCell<LayoutCache>,
    pub escape: &'a EscapeModel,
    pub oracle: &'a HotPathOracle,
    pub config: &'a Config,
}

impl<'a> RuleContext<'a> {
    fn layout_of(&self, record: &RecordDecl) -> Result<std::rc::Rc<CacheLineMap>, RuleError> {
        Ok(self.layouts.borrow_mut().get_or_build(record, self.tu)?)
    }
}

/// Run one detector over one declaration.
pub fn analyze(
    kind: RuleKind,
    decl: &Decl,
    ctx: &RuleContext,
) -> Result<Vec<Diagnostic>, RuleError> {
    match kind {
        RuleKind::CacheLineSpanning => fl001_cache_line_spanning(decl, ctx),
        RuleKind::FalseSharing => fl002_false_sharing(decl, ctx),
        RuleKind::StrongOrdering => Ok(fl010_strong_ordering(decl, ctx)),
        RuleKind::AtomicContention => Ok(fl011_atomic_contention(decl, ctx)),
        RuleKind::LockHotPath => Ok(fl012_lock_hot_path(decl, ctx)),
        RuleKind::HeapAllocHotPath => Ok(fl020_heap_alloc(decl, ctx)),
        RuleKind::LargeStackFrame => Ok(fl021_large_stack_frame(decl, ctx)),
        RuleKind::VirtualDispatch => Ok(fl030_virtual_dispatch(decl, ctx)),
        RuleKind::ErasedCallableHotPath => Ok(fl031_erased_callable(decl, ctx)),
        RuleKind::GlobalState => Ok(fl040_global_state(decl, ctx)),
        RuleKind::ContendedQueue => fl041_contended_queue(decl, ctx),
        RuleKind::DeepConditionalTree => Ok(fl050_deep_conditional(decl, ctx)),
        RuleKind::NumaUnfriendly => fl060_numa_unfriendly(decl, ctx),
        RuleKind::CentralizedDispatcher => Ok(fl061_centralized_dispatcher(decl, ctx)),
        RuleKind::HazardAmplification => fl090_hazard_amplification(decl, ctx),
    }
}

/// Records are analyzed only as complete, named, non-synthesized definitions.
fn analyzable_record(decl: &Decl) -> Option<&RecordDecl> {
    match decl {
        Decl::Record(r) if r.is_complete && !r.is_implicit && !r.is_closure => Some(r),
        _ => None,
    }
}

fn hot_function_with_body<'d>(decl: &'d Decl, ctx: &RuleContext) -> Option<(&'d FunctionDecl, &'d Stmt)> {
    let Decl::Function(f) = decl else { return None };
    let body = f.body.as_ref()?;
    if !ctx.oracle.is_hot(f) {
        return None;
    }
    Some((f, body))
}

fn yes_no(b: bool) -> &'static str {
    if b {
        "yes"
    } else {
        "no"
    }
}

// ── Body traversal helpers ──────────────────────────────────────────────────

/// Visit every expression in traversal order, carrying loop membership.
fn walk_exprs<'s>(stmt: &'s Stmt, in_loop: bool, f: &mut impl FnMut(&'s Expr, bool)) {
    match stmt {
        Stmt::Block(stmts) => stmts.iter().for_each(|s| walk_exprs(s, in_loop, f)),
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            walk_exprs(then_branch, in_loop, f);
            if let Some(e) = else_branch {
                walk_exprs(e, in_loop, f);
            }
        }
        Stmt::Switch { body, .. } => walk_exprs(body, in_loop, f),
        Stmt::Loop { body, .. } => walk_exprs(body, true, f),
        Stmt::Local(_) => {}
        Stmt::Expr(e) => f(e, in_loop),
        Stmt::Return(value) => {
            if let Some(e) = value {
                f(e, in_loop);
            }
        }
    }
}

/// Visit every local variable declaration in traversal order.
fn walk_locals<'s>(stmt: &'s Stmt, f: &mut impl FnMut(&'s crate::tu::LocalVar)) {
    match stmt {
        Stmt::Block(stmts) => stmts.iter().for_each(|s| walk_locals(s, f)),
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            walk_locals(then_branch, f);
            if let Some(e) = else_branch {
                walk_locals(e, f);
            }
        }
        Stmt::Switch { body, .. } => walk_locals(body, f),
        Stmt::Loop { body, .. } => walk_locals(body, f),
        Stmt::Local(v) => f(v),
        Stmt::Expr(_) | Stmt::Return(_) => {}
    }
}

fn body_has_loop(stmt: &Stmt) -> bool {
    match stmt {
        Stmt::Loop { .. } => true,
        Stmt::Block(stmts) => stmts.iter().any(body_has_loop),
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            body_has_loop(then_branch)
                || else_branch.as_deref().is_some_and(body_has_loop)
        }
        Stmt::Switch { body, .. } => body_has_loop(body),
        Stmt::Local(_) | Stmt::Expr(_) | Stmt::Return(_) => false,
    }
}

// ── FL001 — Cache Line Spanning Struct ──────────────────────────────────────

fn fl001_cache_line_spanning(
    decl: &Decl,
    ctx: &RuleContext,
) -> Result<Vec<Diagnostic>, RuleError> {
    let Some(record) = analyzable_record(decl) else {
        return Ok(vec![]);
    };
    if record.size_bytes <= ctx.config.cache_line_span_warn {
        return Ok(vec![]);
    }

    let map = ctx.layout_of(record)?;
    if map.lines_spanned() <= 1 {
        return Ok(vec![]);
    }

    let straddlers = map.straddling_fields();
    let has_atomics = map.total_atomic_fields() > 0;
    let many_lines = record.size_bytes > ctx.config.cache_line_span_crit;

    let mut severity = Severity::High;
    let mut escalations = Vec::new();

    for f in &straddlers {
        escalations.push(format!(
            "field '{}' ({}B at offset {}) straddles lines {}-{}: split access \
             touches two lines per reference",
            f.name, f.size_bytes, f.offset_bytes, f.start_line, f.end_line
        ));
    }

    if many_lines {
        severity = Severity::Critical;
        escalations.push(format!(
            "sizeof > {}B: spans {} cache lines, elevated eviction pressure",
            ctx.config.cache_line_span_crit,
            map.lines_spanned()
        ));
    }

    if has_atomics {
        severity = Severity::Critical;
        let atomic_lines = map.buckets().iter().filter(|b| b.atomic_count > 0).count();
        escalations.push(format!(
            "{} atomics across {} lines, each incurring independent ownership transfer",
            map.total_atomic_fields(),
            atomic_lines
        ));
    }

    let confidence = if has_atomics {
        0.90
    } else if !straddlers.is_empty() {
        0.82
    } else {
        0.72
    };

    let diag = Diagnostic::new(
        RuleKind::CacheLineSpanning.id(),
        RuleKind::CacheLineSpanning.title(),
        severity,
    )
    .with_confidence(confidence)
    .with_tier(EvidenceTier::Proven)
    .at(record.loc.clone())
    .with_reasoning(format!(
        "Struct '{}' occupies {}B, spanning {} cache line(s). Each access may \
         touch multiple lines, increasing L1D pressure and the coherence \
         invalidation surface.",
        record.name,
        record.size_bytes,
        map.lines_spanned()
    ))
    .with_evidence(format!(
        "struct={}; sizeof={}B; cache_line={}B; lines_spanned={}; atomics={}; straddling={}",
        record.name,
        record.size_bytes,
        map.line_bytes(),
        map.lines_spanned(),
        yes_no(has_atomics),
        straddlers.len()
    ))
    .with_mitigation(
        "Split hot/cold fields into separate structs. Consider AoS-to-SoA \
         transformation. Apply alignas(64) to isolate write-heavy sub-structs.",
    )
    .with_escalations(escalations);

    Ok(vec![diag])
}

// ── FL002 — False Sharing Candidate ─────────────────────────────────────────

fn fl002_false_sharing(decl: &Decl, ctx: &RuleContext) -> Result<Vec<Diagnostic>, RuleError> {
    let Some(record) = analyzable_record(decl) else {
        return Ok(vec![]);
    };
    if !ctx.escape.may_escape_thread(record, ctx.tu) {
        return Ok(vec![]);
    }

    let map = ctx.layout_of(record)?;
    let mutable_pairs = map.mutable_pairs_on_same_line();
    if mutable_pairs.is_empty() {
        return Ok(vec![]);
    }

    let atomic_pairs = map.atomic_pairs_on_same_line();
    let has_atomic_pairs = !atomic_pairs.is_empty();

    // Without an atomic pair on the line, distinct-thread writers cannot be
    // inferred statically; require at least one atomic field in the record.
    if !has_atomic_pairs && map.total_atomic_fields() == 0 {
        return Ok(vec![]);
    }

    let severity = if has_atomic_pairs {
        Severity::Critical
    } else {
        Severity::High
    };

    let mut escalations = Vec::new();
    for pair in &atomic_pairs {
        escalations.push(format!(
            "atomic fields '{}' and '{}' share line {}: guaranteed cross-core \
             invalidation on write",
            map.field(pair.a).name,
            map.field(pair.b).name,
            pair.line_index
        ));
    }
    for line in map.false_sharing_candidate_lines() {
        let bucket = &map.buckets()[line as usize];
        escalations.push(format!(
            "line {}: {} atomic + {} non-atomic mutable field(s), mixed write surface",
            line,
            bucket.atomic_count,
            bucket.mutable_count - bucket.atomic_count
        ));
    }

    let confidence = if has_atomic_pairs {
        0.88
    } else if map.total_atomic_fields() > 0 {
        0.68
    } else {
        0.55
    };

    let diag = Diagnostic::new(
        RuleKind::FalseSharing.id(),
        RuleKind::FalseSharing.title(),
        severity,
    )
    .with_confidence(confidence)
    .with_tier(if has_atomic_pairs {
        EvidenceTier::Proven
    } else {
        EvidenceTier::Likely
    })
    .at(record.loc.clone())
    .with_reasoning(format!(
        "Struct '{}' ({}B, {} line(s)): {} mutable field pair(s) share cache \
         line(s) with thread-escape evidence. Concurrent writes to co-located \
         fields trigger MESI invalidation per write.",
        record.name,
        map.size_bytes(),
        map.lines_spanned(),
        mutable_pairs.len()
    ))
    .with_evidence(format!(
        "struct={}; sizeof={}B; lines={}; mutable_pairs_same_line={}; \
         atomic_pairs_same_line={}; thread_escape=true; atomics={}",
        record.name,
        map.size_bytes(),
        map.lines_spanned(),
        mutable_pairs.len(),
        atomic_pairs.len(),
        yes_no(map.total_atomic_fields() > 0)
    ))
    .with_mitigation(
        "Pad independently-written fields to separate 64B cache lines with \
         alignas(64). Consider per-thread or per-core replicas.",
    )
    .with_escalations(escalations);

    Ok(vec![diag])
}

// ── FL010 — Overly Strong Atomic Ordering ───────────────────────────────────

struct SeqCstSite<'a> {
    loc: &'a SourceLoc,
    method: AtomicMethod,
    receiver: &'a str,
    in_loop: bool,
}

fn fl010_strong_ordering(decl: &Decl, ctx: &RuleContext) -> Vec<Diagnostic> {
    let Some((func, body)) = hot_function_with_body(decl, ctx) else {
        return vec![];
    };

    let mut sites: Vec<SeqCstSite> = Vec::new();
    walk_exprs(body, false, &mut |expr, in_loop| {
        if let ExprKind::Atomic {
            receiver,
            method,
            ordering,
        } = &expr.kind
        {
            // Explicit seq_cst, or implicit default (no ordering argument).
            let seq_cst = matches!(ordering, None | Some(MemOrdering::SeqCst));
            if seq_cst && method.class() != AtomicOpClass::Other {
                sites.push(SeqCstSite {
                    loc: &expr.loc,
                    method: *method,
                    receiver,
                    in_loop,
                });
            }
        }
    });

    if sites.is_empty() {
        return vec![];
    }

    let total = sites.len();
    let mut out = Vec::new();

    for site in &sites {
        // Plain loads cost nothing extra on TSO; never flagged.
        if site.method.class() == AtomicOpClass::Load {
            continue;
        }
        let is_store = site.method.class() == AtomicOpClass::Store;

        let mut severity = if is_store {
            Severity::High
        } else {
            Severity::Medium
        };
        let mut confidence = if is_store { 0.85 } else { 0.55 };
        let mut escalations = Vec::new();

        if site.in_loop {
            confidence += 0.05;
            if is_store {
                severity = Severity::Critical;
                escalations.push(
                    "seq_cst store inside loop: XCHG per iteration, sustained store \
                     buffer drain"
                        .to_string(),
                );
            } else {
                severity = Severity::High;
                escalations.push(
                    "seq_cst RMW inside loop: LOCK-prefixed op per iteration (same \
                     cost as acq_rel on x86-64, but blocks compiler reordering)"
                        .to_string(),
                );
            }
        }

        if total > 1 {
            escalations.push(format!(
                "{total} seq_cst operations in function: cumulative serialization"
            ));
        }

        let reasoning = if is_store {
            format!(
                "seq_cst store on '{}' in '{}': lowers to XCHG on x86-64 \
                 (implicit LOCK prefix, store buffer drain). release ordering \
                 would emit plain MOV with zero fence cost on TSO.",
                site.receiver, func.qualified_name
            )
        } else {
            format!(
                "seq_cst {} on '{}' in '{}': lowers to a LOCK-prefixed \
                 instruction on x86-64, identical to acq_rel RMW at runtime; \
                 seq_cst still prevents compiler reordering across the \
                 operation.",
                site.method.display_name(),
                site.receiver,
                func.qualified_name
            )
        };

        let mitigation = if is_store {
            "Use release ordering for stores where total order is not required; \
             on x86-64 TSO a release store emits plain MOV. Verify no downstream \
             load depends on the SC total order before weakening."
        } else {
            "Use acq_rel ordering for RMW when total order is not required; the \
             runtime cost on x86-64 is identical, but the weaker ordering \
             unlocks compiler reordering around the operation."
        };

        out.push(
            Diagnostic::new(
                RuleKind::StrongOrdering.id(),
                RuleKind::StrongOrdering.title(),
                severity,
            )
            .with_confidence(confidence)
            .with_tier(if is_store {
                EvidenceTier::Likely
            } else {
                EvidenceTier::Speculative
            })
            .at(site.loc.clone())
            .in_function(&func.qualified_name)
            .with_reasoning(reasoning)
            .with_evidence(format!(
                "op={}; op_class={}; var={}; ordering=seq_cst; function={}; \
                 in_loop={}; total_seq_cst_in_func={}",
                site.method.display_name(),
                if is_store { "store" } else { "rmw" },
                site.receiver,
                func.qualified_name,
                yes_no(site.in_loop),
                total
            ))
            .with_mitigation(mitigation)
            .with_escalations(escalations),
        );
    }

    out
}

// ── FL011 — Atomic Contention Hotspot ───────────────────────────────────────

fn fl011_atomic_contention(decl: &Decl, ctx: &RuleContext) -> Vec<Diagnostic> {
    let Some((func, body)) = hot_function_with_body(decl, ctx) else {
        return vec![];
    };

    let mut writes: Vec<(&str, AtomicMethod, bool)> = Vec::new();
    walk_exprs(body, false, &mut |expr, in_loop| {
        if let ExprKind::Atomic {
            receiver, method, ..
        } = &expr.kind
        {
            if method.is_write() {
                writes.push((receiver, *method, in_loop));
            }
        }
    });

    if writes.is_empty() {
        return vec![];
    }

    let write_count = writes.len();
    let has_loop_write = writes.iter().any(|(_, _, in_loop)| *in_loop);
    if write_count < 2 && !has_loop_write {
        return vec![];
    }

    let mut escalations = Vec::new();
    if write_count >= 3 {
        escalations.push(
            "3+ atomic writes per invocation: high store buffer pressure, sustained \
             RFO traffic"
                .to_string(),
        );
    }
    if has_loop_write {
        escalations.push(
            "atomic write inside loop: per-iteration cache line ownership transfer, \
             store buffer saturation risk"
                .to_string(),
        );
    }

    let ops = writes
        .iter()
        .map(|(recv, m, _)| format!("{}({})", m.display_name(), recv))
        .collect::<Vec<_>>()
        .join(", ");

    vec![Diagnostic::new(
        RuleKind::AtomicContention.id(),
        RuleKind::AtomicContention.title(),
        Severity::Critical,
    )
    .with_confidence(if has_loop_write { 0.80 } else { 0.65 })
    .at(func.loc.clone())
    .in_function(&func.qualified_name)
    .with_reasoning(format!(
        "Hot function '{}' contains {} atomic write(s). Under multi-core \
         contention, each write triggers an RFO line transfer; multiple writes \
         compound store buffer drain latency and coherence traffic.",
        func.qualified_name, write_count
    ))
    .with_evidence(format!(
        "function={}; atomic_writes={}; loop_writes={}; ops=[{}]",
        func.qualified_name,
        write_count,
        yes_no(has_loop_write),
        ops
    ))
    .with_mitigation(
        "Shard atomic state per-core to eliminate cross-core RFO. Batch updates \
         to reduce write frequency. Redesign to a single-writer pattern, or \
         accumulate thread-locally with periodic merge.",
    )
    .with_escalations(escalations)]
}

// ── FL012 — Lock in Hot Path ────────────────────────────────────────────────

struct LockSite<'a> {
    loc: &'a SourceLoc,
    kind: String,
    nested: bool,
    in_loop: bool,
}

fn collect_lock_sites<'s>(
    stmt: &'s Stmt,
    in_loop: bool,
    depth: &mut u32,
    out: &mut Vec<LockSite<'s>>,
) {
    match stmt {
        Stmt::Block(stmts) => {
            // Scoped acquisitions release at block end.
            let saved = *depth;
            for s in stmts {
                collect_lock_sites(s, in_loop, depth, out);
            }
            *depth = saved;
        }
        Stmt::If {
            then_branch,
            else_branch,
            ..
        } => {
            collect_lock_sites(then_branch, in_loop, depth, out);
            if let Some(e) = else_branch {
                collect_lock_sites(e, in_loop, depth, out);
            }
        }
        Stmt::Switch { body, .. } => collect_lock_sites(body, in_loop, depth, out),
        Stmt::Loop { body, .. } => collect_lock_sites(body, true, depth, out),
        Stmt::Local(_) => {}
        Stmt::Expr(expr) => record_lock_site(expr, in_loop, depth, out),
        Stmt::Return(value) => {
            // A returned expression is evaluated before the frame unwinds.
            if let Some(expr) = value {
                record_lock_site(expr, in_loop, depth, out);
            }
        }
    }
}

fn record_lock_site<'s>(
    expr: &'s Expr,
    in_loop: bool,
    depth: &mut u32,
    out: &mut Vec<LockSite<'s>>,
) {
    let kind = match &expr.kind {
        ExprKind::Call {
            callee: Callee::Named { name },
        } if is_mutex_lock_call(name) => Some(name.clone()),
        ExprKind::Construct { ty } if matches!(ty.kind, TypeKind::ScopedLockGuard) => {
            Some(ty.name.clone())
        }
        _ => None,
    };
    if let Some(kind) = kind {
        out.push(LockSite {
            loc: &expr.loc,
            kind,
            nested: *depth > 0,
            in_loop,
        });
        *depth += 1;
    }
}

fn is_mutex_lock_call(name: &str) -> bool {
    let Some((class, method)) = name.rsplit_once("::") else {
        return false;
    };
    if method != "lock" && method != "try_lock" {
        return false;
    }
    class.contains("mutex") || class.contains("spinlock") || class.contains("shared_mutex")
}

fn fl012_lock_hot_path(decl: &Decl, ctx: &RuleContext) -> Vec<Diagnostic> {
    let Some((func, body)) = hot_function_with_body(decl, ctx) else {
        return vec![];
    };

    let mut sites = Vec::new();
    let mut depth = 0;
    collect_lock_sites(body, false, &mut depth, &mut sites);

    sites
        .iter()
        .map(|site| {
            let mut escalations = Vec::new();
            if site.nested {
                escalations.push(
                    "nested lock acquisition: deadlock risk and compounding \
                     serialization latency"
                        .to_string(),
                );
            }
            if site.in_loop {
                escalations.push(
                    "lock inside loop: per-iteration convoy risk, sustained context \
                     switch pressure under contention"
                        .to_string(),
                );
            }

            Diagnostic::new(
                RuleKind::LockHotPath.id(),
                RuleKind::LockHotPath.title(),
                Severity::Critical,
            )
            .with_confidence(0.75)
            .with_tier(EvidenceTier::Likely)
            .at(site.loc.clone())
            .in_function(&func.qualified_name)
            .with_reasoning(format!(
                "'{}' in hot function '{}'. Under contention a blocking mutex \
                 triggers futex syscall and context switch (~1-10us); even \
                 uncontended, LOCK CMPXCHG on the mutex state drains the store \
                 buffer.",
                site.kind, func.qualified_name
            ))
            .with_evidence(format!(
                "lock_type={}; function={}; nested={}; in_loop={}",
                site.kind,
                func.qualified_name,
                yes_no(site.nested),
                yes_no(site.in_loop)
            ))
            .with_mitigation(
                "Use lock-free structures or a single-writer design. Partition \
                 state to eliminate shared mutable access. Use try_lock with a \
                 fallback to avoid blocking.",
            )
            .with_escalations(escalations)
        })
        .collect()
}

// ── FL020 — Heap Allocation in Hot Path ─────────────────────────────────────

fn alloc_site_kind(expr: &Expr) -> Option<(String, u64)> {
    match &expr.kind {
        ExprKind::New => Some(("operator new".into(), 0)),
        ExprKind::Delete => Some(("operator delete".into(), 0)),
        ExprKind::Call {
            callee: Callee::Named { name },
        } => {
            const C_ALLOC: [&str; 6] = [
                "malloc",
                "calloc",
                "realloc",
                "free",
                "aligned_alloc",
                "posix_memalign",
            ];
            if C_ALLOC.contains(&name.as_str()) {
                return Some((name.clone(), 0));
            }
            if name.contains("make_shared") || name.contains("make_unique") {
                return Some((name.clone(), 0));
            }
            None
        }
        ExprKind::Construct { ty } => match &ty.kind {
            TypeKind::HeapContainer(kind) => {
                let what = match kind {
                    ContainerKind::String => "string ctor",
                    ContainerKind::Vector => "vector ctor",
                    ContainerKind::Map => "map ctor",
                    ContainerKind::HashMap => "hash map ctor",
                    ContainerKind::List => "list ctor",
                    ContainerKind::Deque => "deque ctor",
                };
                Some((format!("{} ({})", what, ty.name), ty.size_bytes))
            }
            TypeKind::SharedOwnership { .. } => {
                Some((format!("shared_ptr ctor ({})", ty.name), ty.size_bytes))
            }
            TypeKind::ErasedCallable => {
                Some((format!("erased callable ctor ({})", ty.name), ty.size_bytes))
            }
            _ => None,
        },
        _ => None,
    }
}

fn fl020_heap_alloc(decl: &Decl, ctx: &RuleContext) -> Vec<Diagnostic> {
    let Some((func, body)) = hot_function_with_body(decl, ctx) else {
        return vec![];
    };

    let mut out = Vec::new();
    walk_exprs(body, false, &mut |expr, in_loop| {
        let Some((kind, ty_size)) = alloc_site_kind(expr) else {
            return;
        };

        let mut escalations = Vec::new();
        if in_loop {
            escalations.push(
                "allocation inside loop: per-iteration allocator pressure, \
                 compounding TLB and fragmentation cost"
                    .to_string(),
            );
        }
        if ty_size >= ctx.config.alloc_size_escalation {
            escalations.push(format!(
                "allocated object is {}B (>= {}B): multi-line footprint per \
                 allocation",
                ty_size, ctx.config.alloc_size_escalation
            ));
        }

        out.push(
            Diagnostic::new(
                RuleKind::HeapAllocHotPath.id(),
                RuleKind::HeapAllocHotPath.title(),
                Severity::Critical,
            )
            .with_confidence(0.75)
            .with_tier(EvidenceTier::Likely)
            .at(expr.loc.clone())
            .in_function(&func.qualified_name)
            .with_reasoning(format!(
                "'{}' in hot function '{}'. Each allocation may contend on \
                 allocator arena locks, fault new pages into the TLB, and \
                 fragment the heap reducing spatial locality.",
                kind, func.qualified_name
            ))
            .with_evidence(format!(
                "alloc_type={}; function={}; in_loop={}; hot_path=true",
                kind,
                func.qualified_name,
                yes_no(in_loop)
            ))
            .with_mitigation(
                "Preallocate buffers. Use arena/slab/pool allocators. Move \
                 allocation to the cold initialization path. Reserve container \
                 capacity upfront.",
            )
            .with_escalations(escalations),
        );
    });

    out
}

// ── FL021 — Large Stack Frame ───────────────────────────────────────────────

fn fl021_large_stack_frame(decl: &Decl, ctx: &RuleContext) -> Vec<Diagnostic> {
    let Decl::Function(func) = decl else {
        return vec![];
    };
    let Some(body) = &func.body else {
        return vec![];
    };

    let mut total: u64 = 0;
    let mut large_locals: Vec<(String, u64)> = Vec::new();
    walk_locals(body, &mut |var| {
        let sz = var.ty.size_bytes;
        total += sz;
        if sz >= 256 {
            large_locals.push((var.name.clone(), sz));
        }
    });

    // By-value parameters land in the frame too; references and pointers
    // do not.
    for param in &func.params {
        if !param.ty.is_indirection() {
            total += param.ty.size_bytes;
        }
    }

    let threshold = ctx.config.stack_frame_warn_bytes;
    if total < threshold {
        return vec![];
    }

    let is_hot = ctx.oracle.is_hot(func);
    let mut severity = if is_hot {
        Severity::High
    } else {
        Severity::Medium
    };
    let mut escalations = Vec::new();

    if total > ctx.config.page_size {
        escalations.push(format!(
            "stack frame exceeds page size ({}B): guaranteed TLB miss on first \
             access, potential page fault",
            ctx.config.page_size
        ));
        if is_hot {
            severity = Severity::Critical;
        }
    }
    if is_hot {
        escalations.push("function is on the hot path".to_string());
    }

    let mut evidence = format!(
        "function={}; estimated_frame={}B; threshold={}B",
        func.qualified_name, total, threshold
    );
    if !large_locals.is_empty() {
        let listed = large_locals
            .iter()
            .map(|(n, s)| format!("{n}({s}B)"))
            .collect::<Vec<_>>()
            .join(", ");
        evidence.push_str(&format!("; large_locals=[{listed}]"));
    }

    vec![Diagnostic::new(
        RuleKind::LargeStackFrame.id(),
        RuleKind::LargeStackFrame.title(),
        severity,
    )
    .with_confidence(0.80)
    .with_tier(EvidenceTier::Likely)
    .at(func.loc.clone())
    .in_function(&func.qualified_name)
    .with_reasoning(format!(
        "Function '{}' estimated stack frame ~{}B, spanning ~{} page(s). Large \
         frames widen the D-TLB working set, pressure L1D capacity, and risk \
         stack page faults on deep call chains.",
        func.qualified_name,
        total,
        total.div_ceil(ctx.config.page_size.max(1))
    ))
    .with_evidence(evidence)
    .with_mitigation(
        "Move large arrays to an arena on the heap. Use static or thread-local \
         buffers for fixed-size data. Pass large structures by reference.",
    )
    .with_escalations(escalations)]
}

// ── FL030 — Virtual Dispatch in Hot Path ────────────────────────────────────

fn fl030_virtual_dispatch(decl: &Decl, ctx: &RuleContext) -> Vec<Diagnostic> {
    let Some((func, body)) = hot_function_with_body(decl, ctx) else {
        return vec![];
    };

    let mut out = Vec::new();
    walk_exprs(body, false, &mut |expr, in_loop| {
        let ExprKind::Call {
            callee:
                Callee::Virtual {
                    class,
                    method,
                    through_indirection,
                },
        } = &expr.kind
        else {
            return;
        };
        // A fully typed receiver devirtualizes; only pointer/reference
        // receivers keep the indirect branch.
        if !through_indirection {
            return;
        }

        let mut severity = Severity::High;
        let mut escalations = Vec::new();
        if in_loop {
            severity = Severity::Critical;
            escalations.push(
                "virtual call inside loop: repeated indirect branch, BTB capacity \
                 pressure, sustained pipeline flush risk"
                    .to_string(),
            );
        }

        out.push(
            Diagnostic::new(
                RuleKind::VirtualDispatch.id(),
                RuleKind::VirtualDispatch.title(),
                severity,
            )
            .with_confidence(0.80)
            .with_tier(EvidenceTier::Proven)
            .at(expr.loc.clone())
            .in_function(&func.qualified_name)
            .with_reasoning(format!(
                "Virtual call to '{}::{}' in hot function '{}'. Requires a \
                 vtable pointer dereference (potential L1D miss on a cold \
                 vtable) followed by an indirect branch; BTB misprediction \
                 flushes the pipeline.",
                class, method, func.qualified_name
            ))
            .with_evidence(format!(
                "virtual_call={}::{}; caller={}; in_loop={}; hot_path=true",
                class,
                method,
                func.qualified_name,
                yes_no(in_loop)
            ))
            .with_mitigation(
                "Use CRTP for static polymorphism, a variant plus visit for \
                 closed type sets, or template-based dispatch with known \
                 targets.",
            )
            .with_escalations(escalations),
        );
    });

    out
}

// ── FL031 — Erased Callable in Hot Path ─────────────────────────────────────

#[derive(Clone, Copy, PartialEq)]
enum ErasedSiteKind {
    Invoke,
    Construct,
    Parameter,
}

fn fl031_erased_callable(decl: &Decl, ctx: &RuleContext) -> Vec<Diagnostic> {
    let Some((func, body)) = hot_function_with_body(decl, ctx) else {
        return vec![];
    };

    let mut sites: Vec<(SourceLoc, ErasedSiteKind, bool)> = Vec::new();
    walk_exprs(body, false, &mut |expr, in_loop| {
        match &expr.kind {
            ExprKind::Call {
                callee: Callee::ErasedInvoke,
            } => sites.push((expr.loc.clone(), ErasedSiteKind::Invoke, in_loop)),
            ExprKind::Construct { ty } if matches!(ty.kind, TypeKind::ErasedCallable) => {
                sites.push((expr.loc.clone(), ErasedSiteKind::Construct, in_loop))
            }
            _ => {}
        }
    });

    // A parameter of erased-callable type makes the hot body the source of
    // the indirect call regardless of where the value was constructed.
    for param in &func.params {
        if matches!(param.ty.kind, TypeKind::ErasedCallable) {
            sites.push((func.loc.clone(), ErasedSiteKind::Parameter, false));
        }
    }

    // Consolidate duplicate sites by source location.
    let mut seen: Vec<(String, u32)> = Vec::new();
    sites.retain(|(loc, _, _)| {
        let key = (loc.file.clone(), loc.line);
        if seen.contains(&key) {
            false
        } else {
            seen.push(key);
            true
        }
    });

    sites
        .into_iter()
        .map(|(loc, kind, in_loop)| {
            let kind_str = match kind {
                ErasedSiteKind::Invoke => "invocation",
                ErasedSiteKind::Construct => "construction",
                ErasedSiteKind::Parameter => "parameter",
            };

            let mut severity = Severity::High;
            let mut escalations = Vec::new();
            if in_loop {
                severity = Severity::Critical;
                escalations.push(
                    "erased callable used inside loop: repeated indirect call and \
                     potential per-iteration heap allocation"
                        .to_string(),
                );
            }
            if kind == ErasedSiteKind::Construct {
                escalations.push(
                    "erased callable constructed in hot path: may heap-allocate when \
                     the callable exceeds the small-buffer threshold"
                        .to_string(),
                );
            }

            Diagnostic::new(
                RuleKind::ErasedCallableHotPath.id(),
                RuleKind::ErasedCallableHotPath.title(),
                severity,
            )
            .with_confidence(0.80)
            .with_tier(EvidenceTier::Proven)
            .at(loc)
            .in_function(&func.qualified_name)
            .with_reasoning(format!(
                "Erased-callable {} in hot function '{}'. Type erasure forces an \
                 indirect call through a function pointer (BTB lookup, pipeline \
                 flush on mispredict) and prevents inlining of the callable.",
                kind_str, func.qualified_name
            ))
            .with_evidence(format!(
                "erased_callable_{}; caller={}; in_loop={}; hot_path=true",
                kind_str,
                func.qualified_name,
                yes_no(in_loop)
            ))
            .with_mitigation(
                "Take the callable as a template parameter or auto lambda. Use a \
                 raw function pointer when the target is known, or a variant \
                 plus visitor for closed type sets.",
            )
            .with_escalations(escalations)
        })
        .collect()
}

// ── FL040 — Centralized Mutable Global State ────────────────────────────────

fn fl040_global_state(decl: &Decl, ctx: &RuleContext) -> Vec<Diagnostic> {
    let Decl::Global(global) = decl else {
        return vec![];
    };
    if !ctx.escape.is_global_shared_mutable(global) {
        return vec![];
    }

    let index = ctx.tu.record_index();
    let has_atomics = match &global.ty.kind {
        TypeKind::Atomic(_) => true,
        TypeKind::Record { name } => index
            .get(name.as_str())
            .is_some_and(|r| ctx.escape.has_atomic_members(r, ctx.tu)),
        _ => false,
    };

    let severity = if has_atomics {
        Severity::Critical
    } else {
        Severity::High
    };
    let mut escalations = Vec::new();
    if has_atomics {
        escalations.push(
            "contains atomic fields: confirmed multi-writer intent, guaranteed \
             cross-core cache line contention"
                .to_string(),
        );
    }

    let storage = match global.storage {
        crate::tu::StorageClass::Global => "global",
        crate::tu::StorageClass::Static => "static",
        crate::tu::StorageClass::ThreadLocal => "thread_local",
    };

    vec![Diagnostic::new(
        RuleKind::GlobalState.id(),
        RuleKind::GlobalState.title(),
        severity,
    )
    .with_confidence(if has_atomics { 0.85 } else { 0.60 })
    .with_tier(if has_atomics {
        EvidenceTier::Likely
    } else {
        EvidenceTier::Speculative
    })
    .at(global.loc.clone())
    .with_reasoning(format!(
        "Global mutable variable '{}' (type: {}) is accessible from any thread \
         without confinement. On multi-socket systems remote NUMA access adds \
         ~100-300ns; under write contention, line bouncing degrades with core \
         count.",
        global.name, global.ty.name
    ))
    .with_evidence(format!(
        "var={}; type={}; storage={}; const=no; thread_local=no; atomics={}",
        global.name,
        global.ty.name,
        storage,
        yes_no(has_atomics)
    ))
    .with_mitigation(
        "Partition state per-thread or per-core. Inject via a context object \
         instead of global access. Use thread_local where possible; for \
         read-mostly data consider RCU-style patterns.",
    )
    .with_escalations(escalations)]
}

// ── FL041 — Contended Queue Pattern ─────────────────────────────────────────

fn fl041_contended_queue(decl: &Decl, ctx: &RuleContext) -> Result<Vec<Diagnostic>, RuleError> {
    let Some(record) = analyzable_record(decl) else {
        return Ok(vec![]);
    };
    let map = ctx.layout_of(record)?;

    let atomic_pairs = map.atomic_pairs_on_same_line();
    if atomic_pairs.is_empty() {
        return Ok(vec![]);
    }

    let lowered = record.name.to_ascii_lowercase();
    let looks_like_queue =
        lowered.contains("queue") || lowered.contains("buffer") || lowered.contains("ring");

    const ROLE_NAMES: [&str; 8] = [
        "head", "tail", "read", "write", "push", "pop", "front", "back",
    ];
    let has_head_tail = map.fields().iter().any(|f| {
        f.is_atomic && ROLE_NAMES.iter().any(|role| f.name.contains(role))
    });

    let name_match = looks_like_queue || has_head_tail;
    let severity = if name_match {
        Severity::Critical
    } else {
        Severity::High
    };

    let mut escalations = Vec::new();
    if name_match {
        escalations.push(
            "structure appears to be a concurrent queue: head/tail atomic indices \
             on one cache line guarantee producer-consumer line ping-pong"
                .to_string(),
        );
    }
    for pair in &atomic_pairs {
        escalations.push(format!(
            "atomic fields '{}' and '{}' share line {}: concurrent writes trigger \
             MESI invalidation",
            map.field(pair.a).name,
            map.field(pair.b).name,
            pair.line_index
        ));
    }

    let first = &atomic_pairs[0];
    Ok(vec![Diagnostic::new(
        RuleKind::ContendedQueue.id(),
        RuleKind::ContendedQueue.title(),
        severity,
    )
    .with_confidence(if name_match { 0.82 } else { 0.62 })
    .at(record.loc.clone())
    .with_reasoning(format!(
        "Struct '{}' ({}B, {} line(s)) has {} atomic field(s) with '{}' and \
         '{}' on the same cache line. Under MPMC load every enqueue/dequeue \
         triggers cross-core RFO for the shared line.",
        record.name,
        map.size_bytes(),
        map.lines_spanned(),
        map.total_atomic_fields(),
        map.field(first.a).name,
        map.field(first.b).name
    ))
    .with_evidence(format!(
        "struct={}; sizeof={}B; lines={}; atomic_fields={}; \
         atomic_pairs_same_line={}; queue_heuristic={}; head_tail_names={}",
        record.name,
        map.size_bytes(),
        map.lines_spanned(),
        map.total_atomic_fields(),
        atomic_pairs.len(),
        yes_no(looks_like_queue),
        yes_no(has_head_tail)
    ))
    .with_mitigation(
        "Pad head and tail indices to separate 64B cache lines with \
         alignas(64). Prefer per-core SPSC queues where possible, or a \
         cache-line-aware queue implementation.",
    )
    .with_escalations(escalations)])
}

// ── FL050 — Deep Conditional Tree in Hot Path ───────────────────────────────

struct BranchScan<'a> {
    deepest_loc: Option<&'a SourceLoc>,
    max_depth: u32,
    switches: Vec<(&'a SourceLoc, u32)>,
}

fn scan_branches<'s>(stmt: &'s Stmt, depth: u32, scan: &mut BranchScan<'s>) {
    match stmt {
        Stmt::Block(stmts) => stmts.iter().for_each(|s| scan_branches(s, depth, scan)),
        Stmt::If {
            then_branch,
            else_branch,
            loc,
        } => {
            let here = depth + 1;
            if here > scan.max_depth {
                scan.max_depth = here;
                scan.deepest_loc = Some(loc);
            }
            scan_branches(then_branch, here, scan);
            if let Some(e) = else_branch {
                scan_branches(e, here, scan);
            }
        }
        Stmt::Switch {
            case_count,
            body,
            loc,
        } => {
            if *case_count >= 8 {
                scan.switches.push((loc, *case_count));
            }
            scan_branches(body, depth, scan);
        }
        Stmt::Loop { body, .. } => scan_branches(body, depth, scan),
        Stmt::Local(_) | Stmt::Expr(_) | Stmt::Return(_) => {}
    }
}

fn fl050_deep_conditional(decl: &Decl, ctx: &RuleContext) -> Vec<Diagnostic> {
    let Some((func, body)) = hot_function_with_body(decl, ctx) else {
        return vec![];
    };

    let mut scan = BranchScan {
        deepest_loc: None,
        max_depth: 0,
        switches: Vec::new(),
    };
    scan_branches(body, 0, &mut scan);

    let mut out = Vec::new();

    // At most one nesting diagnostic per function, at the deepest point.
    if scan.max_depth >= ctx.config.branch_depth_warn {
        let loc = scan.deepest_loc.cloned().unwrap_or_else(|| func.loc.clone());
        let mut severity = Severity::Medium;
        let mut escalations = Vec::new();
        if scan.max_depth >= 6 {
            severity = Severity::High;
            escalations.push(format!(
                "nesting depth {}: high branch entropy, compounding misprediction \
                 cost",
                scan.max_depth
            ));
        }

        out.push(
            Diagnostic::new(
                RuleKind::DeepConditionalTree.id(),
                RuleKind::DeepConditionalTree.title(),
                severity,
            )
            .with_confidence(0.50)
            .at(loc)
            .in_function(&func.qualified_name)
            .with_reasoning(format!(
                "Conditional nesting depth {} in hot function '{}'. Each nested \
                 branch is a prediction point; deep trees create correlated \
                 misprediction chains that defeat pattern-based predictors.",
                scan.max_depth, func.qualified_name
            ))
            .with_evidence(format!(
                "function={}; type=nested_if; depth={}; max_depth={}",
                func.qualified_name, scan.max_depth, scan.max_depth
            ))
            .with_mitigation(
                "Use table-driven dispatch. Flatten conditional logic with early \
                 returns. Precompute decision trees.",
            )
            .with_escalations(escalations),
        );
    }

    for (loc, cases) in &scan.switches {
        out.push(
            Diagnostic::new(
                RuleKind::DeepConditionalTree.id(),
                RuleKind::DeepConditionalTree.title(),
                Severity::High,
            )
            .with_confidence(0.50)
            .at((*loc).clone())
            .in_function(&func.qualified_name)
            .with_reasoning(format!(
                "switch with {} cases in hot function '{}'. A non-constant \
                 switch generates an indirect jump table; the BTB must predict \
                 the target from {} possibilities and I-cache footprint scales \
                 with case count.",
                cases, func.qualified_name, cases
            ))
            .with_evidence(format!(
                "function={}; type=switch; depth={}; max_depth={}; cases={}",
                func.qualified_name, scan.max_depth, scan.max_depth, cases
            ))
            .with_mitigation(
                "Use table-driven dispatch with a function-pointer array, or \
                 split the switch by message class.",
            )
            .with_escalations(vec![format!(
                "large switch ({cases} cases): BTB capacity pressure, I-cache bloat \
                 from jump table expansion"
            )]),
        );
    }

    out
}

// ── FL060 — NUMA-Unfriendly Shared Structure ────────────────────────────────

fn fl060_numa_unfriendly(decl: &Decl, ctx: &RuleContext) -> Result<Vec<Diagnostic>, RuleError> {
    let Some(record) = analyzable_record(decl) else {
        return Ok(vec![]);
    };
    // NUMA placement only matters once the structure is big enough to span
    // several lines.
    if record.size_bytes < 256 {
        return Ok(vec![]);
    }
    if !ctx.escape.may_escape_thread(record, ctx.tu) {
        return Ok(vec![]);
    }

    let has_atomics = ctx.escape.has_atomic_members(record, ctx.tu);
    let mutable_count = record.fields.iter().filter(|f| f.is_mutable()).count();
    if mutable_count == 0 && !has_atomics {
        return Ok(vec![]);
    }

    let cache_lines = record.size_bytes.div_ceil(ctx.config.cache_line_bytes.max(1));
    let mut severity = Severity::High;
    let mut escalations = Vec::new();

    if record.size_bytes >= ctx.config.page_size {
        severity = Severity::Critical;
        escalations.push(format!(
            "sizeof >= {}B: spans {} cache lines, guaranteed multi-page TLB \
             footprint on a remote NUMA node",
            ctx.config.page_size, cache_lines
        ));
    }
    if has_atomics {
        escalations.push(
            "contains atomic fields: cross-socket atomic RMW incurs an \
             interconnect round-trip (~200-400ns on QPI/UPI)"
                .to_string(),
        );
    }
    if mutable_count > 8 {
        escalations.push(format!(
            "{mutable_count} mutable fields: wide write surface amplifies remote \
             store buffer pressure"
        ));
    }

    Ok(vec![Diagnostic::new(
        RuleKind::NumaUnfriendly.id(),
        RuleKind::NumaUnfriendly.title(),
        severity,
    )
    .with_confidence(if has_atomics { 0.55 } else { 0.35 })
    .with_tier(EvidenceTier::Speculative)
    .at(record.loc.clone())
    .with_reasoning(format!(
        "Struct '{}' ({}B, {} cache lines) with {} mutable field(s) and \
         thread-escape evidence. On multi-socket systems at least one socket \
         reaches this structure over the NUMA interconnect; each remote line \
         fetch adds ~100-300ns.",
        record.name, record.size_bytes, cache_lines, mutable_count
    ))
    .with_evidence(format!(
        "struct={}; sizeof={}B; cache_lines={}; mutable_fields={}; atomics={}; \
         thread_escape=yes",
        record.name,
        record.size_bytes,
        cache_lines,
        mutable_count,
        yes_no(has_atomics)
    ))
    .with_mitigation(
        "Use NUMA-aware placement (numa_alloc_onnode / mbind). Replicate \
         per-socket with periodic synchronization, or split read-mostly \
         (replicated) from write-heavy (local) parts.",
    )
    .with_escalations(escalations)])
}

// ── FL061 — Centralized Dispatcher Bottleneck ───────────────────────────────

fn fl061_centralized_dispatcher(decl: &Decl, ctx: &RuleContext) -> Vec<Diagnostic> {
    let Some((func, body)) = hot_function_with_body(decl, ctx) else {
        return vec![];
    };

    let mut call_count = 0u32;
    let mut virtual_calls = 0u32;
    walk_exprs(body, false, &mut |expr, _| {
        if let ExprKind::Call { callee } = &expr.kind {
            call_count += 1;
            if matches!(callee, Callee::Virtual { .. }) {
                virtual_calls += 1;
            }
        }
    });

    let mut max_switch_cases = 0u32;
    fn max_cases(stmt: &Stmt, acc: &mut u32) {
        match stmt {
            Stmt::Block(stmts) => stmts.iter().for_each(|s| max_cases(s, acc)),
            Stmt::If {
                then_branch,
                else_branch,
                ..
            } => {
                max_cases(then_branch, acc);
                if let Some(e) = else_branch {
                    max_cases(e, acc);
                }
            }
            Stmt::Switch {
                case_count, body, ..
            } => {
                *acc = (*acc).max(*case_count);
                max_cases(body, acc);
            }
            Stmt::Loop { body, .. } => max_cases(body, acc),
            Stmt::Local(_) | Stmt::Expr(_) | Stmt::Return(_) => {}
        }
    }
    max_cases(body, &mut max_switch_cases);
    let has_loop = body_has_loop(body);

    // High fan-out heuristics.
    let reason = if call_count >= 8 {
        Some(format!("{call_count} call sites (high fan-out)"))
    } else if max_switch_cases >= 6 && call_count >= 3 {
        Some(format!(
            "{max_switch_cases}-case switch with {call_count} call sites"
        ))
    } else if virtual_calls >= 3 {
        Some(format!(
            "{virtual_calls} virtual dispatch sites (polymorphic fan-out)"
        ))
    } else {
        None
    };
    let Some(reason) = reason else {
        return vec![];
    };

    let mut severity = Severity::High;
    let mut escalations = Vec::new();
    if has_loop {
        severity = Severity::Critical;
        escalations.push(
            "dispatch loop: per-iteration fan-out amplifies I-cache and BTB \
             pressure"
                .to_string(),
        );
    }
    if virtual_calls >= 3 && max_switch_cases >= 4 {
        severity = Severity::Critical;
        escalations.push(
            "mixed dispatch: switch plus virtual calls compound the branch \
             misprediction surface"
                .to_string(),
        );
    }

    vec![Diagnostic::new(
        RuleKind::CentralizedDispatcher.id(),
        RuleKind::CentralizedDispatcher.title(),
        severity,
    )
    .with_confidence(0.55)
    .with_tier(EvidenceTier::Speculative)
    .at(func.loc.clone())
    .in_function(&func.qualified_name)
    .with_reasoning(format!(
        "Hot function '{}' exhibits a centralized dispatcher pattern: {}. \
         Single-point fan-out serializes processing, pressures the I-cache \
         with a large dispatch body, and contends the BTB across many \
         indirect targets.",
        func.qualified_name, reason
    ))
    .with_evidence(format!(
        "function={}; callees={}; virtual_calls={}; switch_cases={}; has_loop={}",
        func.qualified_name,
        call_count,
        virtual_calls,
        max_switch_cases,
        yes_no(has_loop)
    ))
    .with_mitigation(
        "Partition dispatch by message type into separate handlers. Use \
         compile-time dispatch where the type set is closed; shard by core to \
         keep handler state local.",
    )
    .with_escalations(escalations)]
}

// ── FL090 — Hazard Amplification ────────────────────────────────────────────

fn fl090_hazard_amplification(
    decl: &Decl,
    ctx: &RuleContext,
) -> Result<Vec<Diagnostic>, RuleError> {
    let Some(record) = analyzable_record(decl) else {
        return Ok(vec![]);
    };
    let map = ctx.layout_of(record)?;

    let multi_line = map.lines_spanned() >= 3;
    let has_atomics = map.total_atomic_fields() > 0;
    let thread_escape = ctx.escape.may_escape_thread(record, ctx.tu);

    let signal_count =
        u32::from(multi_line) + u32::from(has_atomics) + u32::from(thread_escape);
    if signal_count < 3 {
        return Ok(vec![]);
    }

    let atomic_lines = map.buckets().iter().filter(|b| b.atomic_count > 0).count();
    let hot_lines = map.buckets().iter().filter(|b| b.mutable_count > 0).count();
    let straddlers = map.straddling_fields();
    let atomic_pairs = map.atomic_pairs_on_same_line();

    let mut escalations = vec![
        format!(
            "{}B across {} cache lines",
            map.size_bytes(),
            map.lines_spanned()
        ),
        format!(
            "{} atomic field(s) on {} line(s): per-line RFO ownership transfer",
            map.total_atomic_fields(),
            atomic_lines
        ),
        "thread-escaping: coherence traffic amplified across participating cores"
            .to_string(),
    ];
    if !straddlers.is_empty() {
        escalations.push(format!(
            "{} field(s) straddle line boundaries: split load/store penalty \
             compounds with coherence cost",
            straddlers.len()
        ));
    }
    if map.total_mutable_fields() > 4 {
        escalations.push(format!(
            "{} mutable fields across {} line(s): wide write surface",
            map.total_mutable_fields(),
            hot_lines
        ));
    }
    if !atomic_pairs.is_empty() {
        escalations.push(format!(
            "{} atomic pair(s) share cache line(s): intra-line contention adds to \
             cross-line RFO cost",
            atomic_pairs.len()
        ));
    }

    Ok(vec![Diagnostic::new(
        RuleKind::HazardAmplification.id(),
        RuleKind::HazardAmplification.title(),
        Severity::Critical,
    )
    .with_confidence(0.88)
    .with_tier(EvidenceTier::Likely)
    .at(record.loc.clone())
    .with_reasoning(format!(
        "Struct '{}' ({}B, {} lines) exhibits a compound hazard: {} atomic \
         field(s) across {} line(s) with thread-escape evidence. Under \
         multi-core contention, per-line RFO ownership transfer and coherence \
         invalidation interact across the full footprint.",
        record.name,
        map.size_bytes(),
        map.lines_spanned(),
        map.total_atomic_fields(),
        atomic_lines
    ))
    .with_evidence(format!(
        "struct={}; sizeof={}B; cache_lines={}; atomic_fields={}; \
         atomic_lines={}; mutable_fields={}; straddling={}; thread_escape=yes; \
         signal_count={}",
        record.name,
        map.size_bytes(),
        map.lines_spanned(),
        map.total_atomic_fields(),
        atomic_lines,
        map.total_mutable_fields(),
        straddlers.len(),
        signal_count
    ))
    .with_mitigation(
        "Decompose into cache-line-aligned sub-structures. Isolate atomic \
         fields with alignas(64) padding. Split hot and cold fields; consider \
         per-core replicas with periodic merge.",
    )
    .with_escalations(escalations)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tu::{FieldDecl, LocalVar, ParamDecl, TopLevel, TypeRef};

    fn empty_unit() -> TranslationUnit {
        TranslationUnit {
            path: String::new(),
            source_path: String::new(),
            compile_args: vec![],
            decls: vec![],
        }
    }

    fn unit_with_decls(decls: Vec<Decl>) -> TranslationUnit {
        TranslationUnit {
            path: String::new(),
            source_path: String::new(),
            compile_args: vec![],
            decls: decls
                .into_iter()
                .map(|decl| TopLevel {
                    decl,
                    in_system_header: false,
                })
                .collect(),
        }
    }

    struct Harness {
        tu: TranslationUnit,
        layouts: RefCell<LayoutCache>,
        escape: EscapeModel,
        oracle: HotPathOracle,
        config: Config,
    }

    impl Harness {
        fn new(tu: TranslationUnit) -> Self {
            let config = Config::default();
            Self {
                layouts: RefCell::new(LayoutCache::new(config.cache_line_bytes)),
                escape: EscapeModel::new(),
                oracle: HotPathOracle::new(&config),
                config,
                tu,
            }
        }

        fn ctx(&self) -> RuleContext<'_> {
            RuleContext {
                tu: &self.tu,
                layouts: &self.layouts,
                escape: &self.escape,
                oracle: &self.oracle,
                config: &self.config,
            }
        }

        fn run(&self, kind: RuleKind, decl: &Decl) -> Vec<Diagnostic> {
            analyze(kind, decl, &self.ctx()).unwrap()
        }
    }

    fn record(name: &str, size: u64, fields: Vec<FieldDecl>) -> RecordDecl {
        RecordDecl {
            name: name.into(),
            size_bytes: size,
            fields,
            bases: vec![],
            is_complete: true,
            is_implicit: false,
            is_closure: false,
            loc: SourceLoc::new("t.cpp", 3, 1),
        }
    }

    fn atomic_u64(name: &str, offset: u64) -> FieldDecl {
        FieldDecl::new(
            name,
            offset,
            TypeRef::atomic(TypeRef::primitive("unsigned long", 8)),
        )
    }

    fn hot_fn(name: &str, body: Stmt) -> FunctionDecl {
        FunctionDecl {
            qualified_name: name.into(),
            mangled_name: String::new(),
            params: vec![],
            body: Some(body),
            attributes: vec![crate::hotpath::HOT_ANNOTATION.into()],
            loc: SourceLoc::new("t.cpp", 10, 1),
        }
    }

    fn atomic_expr(method: AtomicMethod, line: u32) -> Stmt {
        Stmt::Expr(Expr {
            kind: ExprKind::Atomic {
                receiver: "seq".into(),
                method,
                ordering: None,
            },
            loc: SourceLoc::new("t.cpp", line, 5),
        })
    }

    #[test]
    fn registry_ids_are_unique_and_stable() {
        let ids: Vec<&str> = REGISTRY.iter().map(|k| k.id()).collect();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 15);
        assert_eq!(REGISTRY[0].id(), "FL001");
        assert_eq!(REGISTRY[14].id(), "FL090");
        assert_eq!(RuleKind::from_id("FL041"), Some(RuleKind::ContendedQueue));
        assert_eq!(RuleKind::from_id("FL999"), None);
    }

    #[test]
    fn fl001_fires_on_multi_line_record() {
        let r = record(
            "Wide",
            160,
            vec![FieldDecl::new(
                "data",
                0,
                TypeRef::array_of(TypeRef::primitive("unsigned long", 8), 20),
            )],
        );
        let h = Harness::new(unit_with_decls(vec![Decl::Record(r.clone())]));
        let diags = h.run(RuleKind::CacheLineSpanning, &Decl::Record(r));

        assert_eq!(diags.len(), 1);
        let d = &diags[0];
        assert_eq!(d.severity, Severity::Critical); // 160 > 128
        assert_eq!(d.tier, EvidenceTier::Proven);
        assert!(d.evidence.contains("sizeof=160B"));
        assert!(d.evidence.contains("lines_spanned=3"));
        assert!((d.confidence - 0.82).abs() < 1e-9); // straddler at 56..64? no — 160B array spans, single field straddles
    }

    #[test]
    fn fl001_skips_single_line_record() {
        let r = record("Small", 48, vec![atomic_u64("a", 0)]);
        let h = Harness::new(unit_with_decls(vec![Decl::Record(r.clone())]));
        assert!(h.run(RuleKind::CacheLineSpanning, &Decl::Record(r)).is_empty());
    }

    #[test]
    fn fl001_atomics_escalate_to_critical_with_higher_confidence() {
        let r = record(
            "TwoLines",
            96,
            vec![atomic_u64("a", 0), atomic_u64("b", 72)],
        );
        let h = Harness::new(unit_with_decls(vec![Decl::Record(r.clone())]));
        let diags = h.run(RuleKind::CacheLineSpanning, &Decl::Record(r));
        assert_eq!(diags[0].severity, Severity::Critical);
        assert!((diags[0].confidence - 0.90).abs() < 1e-9);
    }

    #[test]
    fn fl002_requires_escape_and_atomics() {
        // Two plain mutable u64s on one line: no atomics, no escape — silent.
        let plain = record(
            "Plain",
            16,
            vec![
                FieldDecl::new("a", 0, TypeRef::primitive("unsigned long", 8)),
                FieldDecl::new("b", 8, TypeRef::primitive("unsigned long", 8)),
            ],
        );
        let h = Harness::new(unit_with_decls(vec![Decl::Record(plain.clone())]));
        assert!(h.run(RuleKind::FalseSharing, &Decl::Record(plain)).is_empty());
    }

    #[test]
    fn fl002_atomic_pair_is_critical_proven() {
        let r = record("Counters", 16, vec![atomic_u64("hits", 0), atomic_u64("misses", 8)]);
        let h = Harness::new(unit_with_decls(vec![Decl::Record(r.clone())]));
        let diags = h.run(RuleKind::FalseSharing, &Decl::Record(r));

        assert_eq!(diags.len(), 1);
        let d = &diags[0];
        assert_eq!(d.severity, Severity::Critical);
        assert_eq!(d.tier, EvidenceTier::Proven);
        assert!((d.confidence - 0.88).abs() < 1e-9);
        assert!(d.evidence.contains("sizeof=16B"));
        assert!(d.evidence.contains("atomic_pairs_same_line=1"));
        assert!(d.evidence.contains("thread_escape=true"));
    }

    #[test]
    fn fl010_flags_store_not_load() {
        let body = Stmt::Block(vec![
            atomic_expr(AtomicMethod::Load, 11),
            atomic_expr(AtomicMethod::Store, 12),
        ]);
        let f = hot_fn("engine::advance", body);
        let h = Harness::new(empty_unit());
        let diags = h.run(RuleKind::StrongOrdering, &Decl::Function(f));

        assert_eq!(diags.len(), 1);
        let d = &diags[0];
        assert_eq!(d.severity, Severity::High);
        assert_eq!(d.tier, EvidenceTier::Likely);
        assert_eq!(d.location.line, 12);
        assert!(d.evidence.contains("op_class=store"));
    }

    #[test]
    fn fl010_explicit_weak_ordering_not_flagged() {
        let body = Stmt::Block(vec![Stmt::Expr(Expr {
            kind: ExprKind::Atomic {
                receiver: "seq".into(),
                method: AtomicMethod::Store,
                ordering: Some(MemOrdering::Release),
            },
            loc: SourceLoc::new("t.cpp", 11, 5),
        })]);
        let f = hot_fn("engine::publish", body);
        let h = Harness::new(empty_unit());
        assert!(h.run(RuleKind::StrongOrdering, &Decl::Function(f)).is_empty());
    }

    #[test]
    fn fl010_rmw_in_loop_is_high_speculative() {
        let body = Stmt::Loop {
            body: Box::new(atomic_expr(AtomicMethod::FetchAdd, 12)),
            loc: SourceLoc::new("t.cpp", 11, 3),
        };
        let f = hot_fn("engine::bump", body);
        let h = Harness::new(empty_unit());
        let diags = h.run(RuleKind::StrongOrdering, &Decl::Function(f));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::High);
        assert_eq!(diags[0].tier, EvidenceTier::Speculative);
        assert!((diags[0].confidence - 0.60).abs() < 1e-9);
    }

    #[test]
    fn fl010_operator_increment_treated_as_rmw() {
        let body = atomic_expr(AtomicMethod::OpIncrement, 20);
        let f = hot_fn("engine::count", body);
        let h = Harness::new(empty_unit());
        let diags = h.run(RuleKind::StrongOrdering, &Decl::Function(f));
        assert_eq!(diags.len(), 1);
        assert!(diags[0].evidence.contains("op_class=rmw"));
        assert_eq!(diags[0].severity, Severity::Medium);
    }

    #[test]
    fn fl010_atomic_in_return_expression() {
        // `return seq.fetch_add(1);` with the implicit ordering default.
        let body = Stmt::Return(Some(Expr {
            kind: ExprKind::Atomic {
                receiver: "seq".into(),
                method: AtomicMethod::FetchAdd,
                ordering: None,
            },
            loc: SourceLoc::new("t.cpp", 14, 12),
        }));
        let f = hot_fn("engine::next_ticket", body);
        let h = Harness::new(empty_unit());
        let diags = h.run(RuleKind::StrongOrdering, &Decl::Function(f));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].location.line, 14);
        assert!(diags[0].evidence.contains("op_class=rmw"));
    }

    #[test]
    fn fl012_lock_guard_in_return_expression() {
        // `return std::unique_lock(m);` hands the guard to the caller; the
        // acquisition still happens in the hot body.
        let guard = TypeRef {
            name: "std::unique_lock<std::mutex>".into(),
            size_bytes: 16,
            const_qual: false,
            volatile_qual: false,
            kind: TypeKind::ScopedLockGuard,
        };
        let body = Stmt::Return(Some(Expr {
            kind: ExprKind::Construct { ty: guard },
            loc: SourceLoc::new("t.cpp", 21, 12),
        }));
        let f = hot_fn("engine::acquire", body);
        let h = Harness::new(empty_unit());
        let diags = h.run(RuleKind::LockHotPath, &Decl::Function(f));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].location.line, 21);
    }

    #[test]
    fn fl010_cold_function_is_skipped() {
        let mut f = hot_fn("cold::f", atomic_expr(AtomicMethod::Store, 9));
        f.attributes.clear();
        let h = Harness::new(empty_unit());
        assert!(h.run(RuleKind::StrongOrdering, &Decl::Function(f)).is_empty());
    }

    #[test]
    fn fl011_two_writes_fire_once_per_function() {
        let body = Stmt::Block(vec![
            atomic_expr(AtomicMethod::Store, 11),
            atomic_expr(AtomicMethod::FetchAdd, 12),
        ]);
        let f = hot_fn("engine::commit", body);
        let h = Harness::new(empty_unit());
        let diags = h.run(RuleKind::AtomicContention, &Decl::Function(f));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Critical);
        assert!((diags[0].confidence - 0.65).abs() < 1e-9);
        assert!(diags[0].evidence.contains("atomic_writes=2"));
    }

    #[test]
    fn fl011_single_write_outside_loop_is_silent() {
        let f = hot_fn("engine::set", atomic_expr(AtomicMethod::Store, 11));
        let h = Harness::new(empty_unit());
        assert!(h.run(RuleKind::AtomicContention, &Decl::Function(f)).is_empty());
    }

    #[test]
    fn fl012_nested_and_loop_locks() {
        let guard = TypeRef {
            name: "std::lock_guard<std::mutex>".into(),
            size_bytes: 8,
            const_qual: false,
            volatile_qual: false,
            kind: TypeKind::ScopedLockGuard,
        };
        let body = Stmt::Block(vec![
            Stmt::Expr(Expr {
                kind: ExprKind::Construct { ty: guard.clone() },
                loc: SourceLoc::new("t.cpp", 11, 5),
            }),
            Stmt::Expr(Expr {
                kind: ExprKind::Call {
                    callee: Callee::Named {
                        name: "std::mutex::lock".into(),
                    },
                },
                loc: SourceLoc::new("t.cpp", 12, 5),
            }),
        ]);
        let f = hot_fn("engine::guarded", body);
        let h = Harness::new(empty_unit());
        let diags = h.run(RuleKind::LockHotPath, &Decl::Function(f));
        assert_eq!(diags.len(), 2);
        assert!(diags[0].escalations.is_empty());
        assert!(diags[1].escalations[0].contains("nested"));
    }

    #[test]
    fn fl020_vector_ctor_in_loop() {
        let body = Stmt::Loop {
            body: Box::new(Stmt::Expr(Expr {
                kind: ExprKind::Construct {
                    ty: TypeRef::container(ContainerKind::Vector, "std::vector<int>", 24),
                },
                loc: SourceLoc::new("t.cpp", 12, 9),
            })),
            loc: SourceLoc::new("t.cpp", 11, 5),
        };
        let f = hot_fn("engine::churn", body);
        let h = Harness::new(empty_unit());
        let diags = h.run(RuleKind::HeapAllocHotPath, &Decl::Function(f));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Critical);
        assert!(diags[0].evidence.contains("in_loop=yes"));
    }

    #[test]
    fn fl021_cold_function_medium() {
        let body = Stmt::Block(vec![Stmt::Local(LocalVar {
            name: "buf".into(),
            ty: TypeRef::array_of(TypeRef::primitive("char", 1), 3000),
            loc: SourceLoc::new("t.cpp", 11, 5),
        })]);
        let f = FunctionDecl {
            qualified_name: "cold::serialize".into(),
            mangled_name: String::new(),
            params: vec![],
            body: Some(body),
            attributes: vec![],
            loc: SourceLoc::new("t.cpp", 10, 1),
        };
        let h = Harness::new(empty_unit());
        let diags = h.run(RuleKind::LargeStackFrame, &Decl::Function(f));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Medium);
        assert!(diags[0].evidence.contains("estimated_frame=3000B"));
        assert!(diags[0].evidence.contains("large_locals=[buf(3000B)]"));
    }

    #[test]
    fn fl021_hot_over_page_size_is_critical() {
        let body = Stmt::Block(vec![Stmt::Local(LocalVar {
            name: "scratch".into(),
            ty: TypeRef::array_of(TypeRef::primitive("char", 1), 5000),
            loc: SourceLoc::new("t.cpp", 11, 5),
        })]);
        let f = hot_fn("engine::burst", body);
        let h = Harness::new(empty_unit());
        let diags = h.run(RuleKind::LargeStackFrame, &Decl::Function(f));
        assert_eq!(diags[0].severity, Severity::Critical);
    }

    #[test]
    fn fl021_reference_params_excluded() {
        let f = FunctionDecl {
            qualified_name: "cold::takes_ref".into(),
            mangled_name: String::new(),
            params: vec![ParamDecl {
                name: "big".into(),
                ty: TypeRef::reference_to(TypeRef::record("Big", 8192)),
            }],
            body: Some(Stmt::Block(vec![])),
            attributes: vec![],
            loc: SourceLoc::new("t.cpp", 10, 1),
        };
        let h = Harness::new(empty_unit());
        assert!(h.run(RuleKind::LargeStackFrame, &Decl::Function(f)).is_empty());
    }

    #[test]
    fn fl030_typed_receiver_skipped() {
        let body = Stmt::Block(vec![
            Stmt::Expr(Expr {
                kind: ExprKind::Call {
                    callee: Callee::Virtual {
                        class: "Handler".into(),
                        method: "on_event".into(),
                        through_indirection: true,
                    },
                },
                loc: SourceLoc::new("t.cpp", 11, 5),
            }),
            Stmt::Expr(Expr {
                kind: ExprKind::Call {
                    callee: Callee::Virtual {
                        class: "Handler".into(),
                        method: "on_event".into(),
                        through_indirection: false,
                    },
                },
                loc: SourceLoc::new("t.cpp", 12, 5),
            }),
        ]);
        let f = hot_fn("engine::deliver", body);
        let h = Harness::new(empty_unit());
        let diags = h.run(RuleKind::VirtualDispatch, &Decl::Function(f));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].location.line, 11);
        assert_eq!(diags[0].tier, EvidenceTier::Proven);
    }

    #[test]
    fn fl031_param_sites_consolidated_by_location() {
        let cb = TypeRef::erased_callable("std::function<void()>");
        let f = FunctionDecl {
            qualified_name: "engine::notify".into(),
            mangled_name: String::new(),
            params: vec![
                ParamDecl {
                    name: "on_ok".into(),
                    ty: cb.clone(),
                },
                ParamDecl {
                    name: "on_err".into(),
                    ty: cb,
                },
            ],
            body: Some(Stmt::Block(vec![])),
            attributes: vec![crate::hotpath::HOT_ANNOTATION.into()],
            loc: SourceLoc::new("t.cpp", 10, 1),
        };
        let h = Harness::new(empty_unit());
        let diags = h.run(RuleKind::ErasedCallableHotPath, &Decl::Function(f));
        // Both parameter sites share the function's location — one diagnostic.
        assert_eq!(diags.len(), 1);
        assert!(diags[0].evidence.contains("erased_callable_parameter"));
    }

    #[test]
    fn fl040_atomic_global_critical() {
        let g = GlobalDeclFixture::atomic_global();
        let h = Harness::new(empty_unit());
        let diags = h.run(RuleKind::GlobalState, &Decl::Global(g));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Critical);
        assert_eq!(diags[0].tier, EvidenceTier::Likely);
    }

    #[test]
    fn fl040_thread_local_silent() {
        let mut g = GlobalDeclFixture::atomic_global();
        g.storage = crate::tu::StorageClass::ThreadLocal;
        let h = Harness::new(empty_unit());
        assert!(h.run(RuleKind::GlobalState, &Decl::Global(g)).is_empty());
    }

    struct GlobalDeclFixture;
    impl GlobalDeclFixture {
        fn atomic_global() -> crate::tu::GlobalDecl {
            crate::tu::GlobalDecl {
                name: "g_epoch".into(),
                ty: TypeRef::atomic(TypeRef::primitive("unsigned long", 8)),
                storage: crate::tu::StorageClass::Global,
                has_initializer: true,
                loc: SourceLoc::new("t.cpp", 2, 1),
            }
        }
    }

    #[test]
    fn fl041_queue_name_is_critical() {
        let r = record(
            "SpscRing",
            16,
            vec![atomic_u64("head", 0), atomic_u64("tail", 8)],
        );
        let h = Harness::new(unit_with_decls(vec![Decl::Record(r.clone())]));
        let diags = h.run(RuleKind::ContendedQueue, &Decl::Record(r));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Critical);
        assert!((diags[0].confidence - 0.82).abs() < 1e-9);
    }

    #[test]
    fn fl041_anonymous_pair_is_high() {
        let r = record("Stats", 16, vec![atomic_u64("x", 0), atomic_u64("y", 8)]);
        let h = Harness::new(unit_with_decls(vec![Decl::Record(r.clone())]));
        let diags = h.run(RuleKind::ContendedQueue, &Decl::Record(r));
        assert_eq!(diags[0].severity, Severity::High);
        assert!((diags[0].confidence - 0.62).abs() < 1e-9);
    }

    fn nested_ifs(depth: u32, innermost_line: u32) -> Stmt {
        let mut stmt = Stmt::Block(vec![]);
        for level in (0..depth).rev() {
            stmt = Stmt::If {
                then_branch: Box::new(stmt),
                else_branch: None,
                loc: SourceLoc::new("t.cpp", innermost_line - (depth - 1 - level), 5),
            };
        }
        stmt
    }

    #[test]
    fn fl050_deepest_if_reported_once() {
        let f = hot_fn("engine::route", nested_ifs(5, 15));
        let h = Harness::new(empty_unit());
        let diags = h.run(RuleKind::DeepConditionalTree, &Decl::Function(f));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Medium);
        assert!(diags[0].evidence.contains("depth=5"));
        assert_eq!(diags[0].location.line, 15);
    }

    #[test]
    fn fl050_depth_six_is_high() {
        let f = hot_fn("engine::route", nested_ifs(6, 16));
        let h = Harness::new(empty_unit());
        let diags = h.run(RuleKind::DeepConditionalTree, &Decl::Function(f));
        assert_eq!(diags[0].severity, Severity::High);
    }

    #[test]
    fn fl050_large_switch_site() {
        let body = Stmt::Switch {
            case_count: 12,
            body: Box::new(Stmt::Block(vec![])),
            loc: SourceLoc::new("t.cpp", 20, 5),
        };
        let f = hot_fn("engine::decode", body);
        let h = Harness::new(empty_unit());
        let diags = h.run(RuleKind::DeepConditionalTree, &Decl::Function(f));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::High);
        assert!(diags[0].evidence.contains("cases=12"));
    }

    #[test]
    fn fl060_small_record_silent() {
        let r = record("Tiny", 128, vec![atomic_u64("a", 0)]);
        let h = Harness::new(unit_with_decls(vec![Decl::Record(r.clone())]));
        assert!(h.run(RuleKind::NumaUnfriendly, &Decl::Record(r)).is_empty());
    }

    #[test]
    fn fl060_large_escaping_record_fires() {
        let mut fields = vec![atomic_u64("epoch", 0)];
        for i in 0..4 {
            fields.push(FieldDecl::new(
                format!("slot{i}"),
                8 + i * 8,
                TypeRef::primitive("unsigned long", 8),
            ));
        }
        let r = record("Registry", 512, fields);
        let h = Harness::new(unit_with_decls(vec![Decl::Record(r.clone())]));
        let diags = h.run(RuleKind::NumaUnfriendly, &Decl::Record(r));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::High);
        assert!((diags[0].confidence - 0.55).abs() < 1e-9);
        assert_eq!(diags[0].tier, EvidenceTier::Speculative);
    }

    #[test]
    fn fl061_fan_out_with_loop_is_critical() {
        let call = |line: u32| {
            Stmt::Expr(Expr {
                kind: ExprKind::Call {
                    callee: Callee::Named {
                        name: format!("handler_{line}"),
                    },
                },
                loc: SourceLoc::new("t.cpp", line, 5),
            })
        };
        let calls: Vec<Stmt> = (20..28).map(call).collect();
        let body = Stmt::Loop {
            body: Box::new(Stmt::Block(calls)),
            loc: SourceLoc::new("t.cpp", 19, 3),
        };
        let f = hot_fn("engine::dispatch", body);
        let h = Harness::new(empty_unit());
        let diags = h.run(RuleKind::CentralizedDispatcher, &Decl::Function(f));
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Critical);
        assert!(diags[0].evidence.contains("callees=8"));
    }

    #[test]
    fn fl090_three_signals_fire() {
        let r = record(
            "Hub",
            192,
            vec![
                atomic_u64("a", 0),
                atomic_u64("b", 8),
                atomic_u64("c", 64),
                atomic_u64("d", 128),
            ],
        );
        let h = Harness::new(unit_with_decls(vec![Decl::Record(r.clone())]));
        let diags = h.run(RuleKind::HazardAmplification, &Decl::Record(r));
        assert_eq!(diags.len(), 1);
        let d = &diags[0];
        assert_eq!(d.severity, Severity::Critical);
        assert_eq!(d.tier, EvidenceTier::Likely);
        assert!((d.confidence - 0.88).abs() < 1e-9);
        assert!(d.evidence.contains("signal_count=3"));
    }

    #[test]
    fn fl090_two_signals_do_not_fire() {
        // Atomic + escape, but only one line.
        let r = record("Small", 16, vec![atomic_u64("a", 0)]);
        let h = Harness::new(unit_with_decls(vec![Decl::Record(r.clone())]));
        assert!(h
            .run(RuleKind::HazardAmplification, &Decl::Record(r))
            .is_empty());
    }

    #[test]
    fn implicit_and_closure_records_skipped() {
        let mut r = record("Lambda", 160, vec![atomic_u64("a", 0)]);
        r.is_closure = true;
        let h = Harness::new(unit_with_decls(vec![Decl::Record(r.clone())]));
        assert!(h.run(RuleKind::CacheLineSpanning, &Decl::Record(r)).is_empty());
    }
}
