// interact.rs — Hazard classes, hypothesis templates, and the interaction model
//
// Every rule maps to one of fifteen hazard classes. Each class carries a
// hypothesis template: null/alternative prose, the canonical
// performance-counter set that would validate the hypothesis on real
// hardware, a minimum detectable effect, and the confound controls a valid
// experiment requires. The interaction matrix declares which class pairs
// (and one triple) amplify each other; the detector scans a preliminary
// diagnostic set for co-located eligible pairs and seeds amplified
// hypotheses from them.
//
// Catalogs are plain values built once at core initialization and passed by
// reference — no process-wide registries.
//
// Preconditions: none.
// Postconditions: every hazard class resolves to a template.
// Failure modes: none.
// Side effects: none.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::diag::{Diagnostic, EvidenceTier};

// ── Hazard classes ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum HazardClass {
    CacheGeometry,
    FalseSharing,
    AtomicOrdering,
    AtomicContention,
    LockContention,
    HeapAllocation,
    StackPressure,
    VirtualDispatch,
    ErasedCallable,
    GlobalState,
    ContendedQueue,
    DeepConditional,
    NumaLocality,
    CentralizedDispatch,
    HazardAmplification,
}

impl HazardClass {
    pub fn name(self) -> &'static str {
        match self {
            HazardClass::CacheGeometry => "CacheGeometry",
            HazardClass::FalseSharing => "FalseSharing",
            HazardClass::AtomicOrdering => "AtomicOrdering",
            HazardClass::AtomicContention => "AtomicContention",
            HazardClass::LockContention => "LockContention",
            HazardClass::HeapAllocation => "HeapAllocation",
            HazardClass::StackPressure => "StackPressure",
            HazardClass::VirtualDispatch => "VirtualDispatch",
            HazardClass::ErasedCallable => "ErasedCallable",
            HazardClass::GlobalState => "GlobalState",
            HazardClass::ContendedQueue => "ContendedQueue",
            HazardClass::DeepConditional => "DeepConditional",
            HazardClass::NumaLocality => "NumaLocality",
            HazardClass::CentralizedDispatch => "CentralizedDispatch",
            HazardClass::HazardAmplification => "HazardAmplification",
        }
    }
}

/// Stable rule-id → hazard-class mapping; the identity a finding carries
/// into calibration storage.
pub fn hazard_class_for_rule(rule_id: &str) -> HazardClass {
    match rule_id {
        "FL001" => HazardClass::CacheGeometry,
        "FL002" => HazardClass::FalseSharing,
        "FL010" => HazardClass::AtomicOrdering,
        "FL011" => HazardClass::AtomicContention,
        "FL012" => HazardClass::LockContention,
        "FL020" => HazardClass::HeapAllocation,
        "FL021" => HazardClass::StackPressure,
        "FL030" => HazardClass::VirtualDispatch,
        "FL031" => HazardClass::ErasedCallable,
        "FL040" => HazardClass::GlobalState,
        "FL041" => HazardClass::ContendedQueue,
        "FL050" => HazardClass::DeepConditional,
        "FL060" => HazardClass::NumaLocality,
        "FL061" => HazardClass::CentralizedDispatch,
        "FL090" => HazardClass::HazardAmplification,
        _ => HazardClass::CacheGeometry,
    }
}

// ── Counters ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CounterTier {
    /// Available on every perf-capable kernel.
    Universal,
    /// Generic hardware events, present on all mainstream x86-64.
    Standard,
    /// Microarchitecture-specific raw events.
    Extended,
}

#[derive(Debug, Clone, Serialize)]
pub struct Counter {
    pub name: &'static str,
    pub tier: CounterTier,
    pub rationale: &'static str,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CounterSet {
    pub required: Vec<Counter>,
    pub optional: Vec<Counter>,
}

impl CounterSet {
    /// Union of two sets, deduplicated by counter name.
    pub fn merged(&self, other: &CounterSet) -> CounterSet {
        let mut result = self.clone();
        for c in &other.required {
            if !result.required.iter().any(|r| r.name == c.name) {
                result.required.push(c.clone());
            }
        }
        for c in &other.optional {
            if !result.optional.iter().any(|r| r.name == c.name) {
                result.optional.push(c.clone());
            }
        }
        result
    }
}

fn counter(name: &'static str, tier: CounterTier, rationale: &'static str) -> Counter {
    Counter {
        name,
        tier,
        rationale,
    }
}

// ── Hypothesis templates ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct MetricSpec {
    pub name: &'static str,
    pub unit: &'static str,
    pub percentile: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfoundControl {
    pub variable: &'static str,
    pub method: &'static str,
}

fn standard_confounds() -> Vec<ConfoundControl> {
    let pairs: [(&'static str, &'static str); 8] = [
        ("cpu_frequency", "cpupower frequency-set --governor performance"),
        ("turbo_boost", "disable via intel_pstate no_turbo"),
        ("c_states", "disable states deeper than C0 via cpuidle sysfs"),
        ("cpu_pinning", "taskset / pthread_setaffinity_np"),
        ("transparent_hugepages", "echo never to the THP enabled knob"),
        ("aslr", "randomize_va_space=0 for the run"),
        ("compiler_flags", "fixed -O2 -march, LTO off"),
        ("interrupt_isolation", "isolcpus plus irqbalance off on test cores"),
    ];
    pairs
        .into_iter()
        .map(|(variable, method)| ConfoundControl { variable, method })
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct HypothesisTemplate {
    pub class: HazardClass,
    pub h0: &'static str,
    pub h1: &'static str,
    pub primary_metric: MetricSpec,
    pub counters: CounterSet,
    pub default_mde: f64,
    pub confounds: Vec<ConfoundControl>,
}

/// All fifteen per-class templates, built once and passed by reference.
#[derive(Debug)]
pub struct HypothesisCatalog {
    templates: BTreeMap<HazardClass, HypothesisTemplate>,
}

impl HypothesisCatalog {
    pub fn new() -> Self {
        let mut templates = BTreeMap::new();
        for template in build_templates() {
            templates.insert(template.class, template);
        }
        Self { templates }
    }

    pub fn lookup(&self, class: HazardClass) -> &HypothesisTemplate {
        // Every class is populated in the constructor.
        &self.templates[&class]
    }
}

impl Default for HypothesisCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn cache_geometry_counters() -> CounterSet {
    CounterSet {
        required: vec![
            counter(
                "L1-dcache-load-misses",
                CounterTier::Standard,
                "direct measure of L1D pressure from footprint",
            ),
            counter("L1-dcache-store-misses", CounterTier::Standard, "write-side pressure"),
            counter("LLC-load-misses", CounterTier::Standard, "eviction cascading to LLC"),
            counter("cycles", CounterTier::Universal, "baseline for IPC"),
            counter("instructions", CounterTier::Universal, "baseline for IPC"),
        ],
        optional: vec![counter(
            "MEM_LOAD_RETIRED.L1_MISS",
            CounterTier::Extended,
            "precise L1 miss attribution",
        )],
    }
}

fn false_sharing_counters() -> CounterSet {
    CounterSet {
        required: vec![
            counter(
                "L1-dcache-load-misses",
                CounterTier::Standard,
                "invalidation forces reload",
            ),
            counter("L1-dcache-store-misses", CounterTier::Standard, "RFO stall"),
            counter(
                "LLC-store-misses",
                CounterTier::Standard,
                "ownership transfer reaching LLC",
            ),
            counter(
                "stalled-cycles-backend",
                CounterTier::Standard,
                "pipeline stall from coherence wait",
            ),
        ],
        optional: vec![counter(
            "offcore_response.demand_rfo.l3_miss.snoop_hitm",
            CounterTier::Extended,
            "direct HITM measurement",
        )],
    }
}

fn atomic_ordering_counters() -> CounterSet {
    CounterSet {
        required: vec![
            counter(
                "stalled-cycles-backend",
                CounterTier::Standard,
                "store buffer drain stall",
            ),
            counter("cycles", CounterTier::Universal, "total cycle cost"),
            counter("instructions", CounterTier::Universal, "IPC computation"),
        ],
        optional: vec![counter(
            "MACHINE_CLEARS.MEMORY_ORDERING",
            CounterTier::Extended,
            "memory-ordering machine clears",
        )],
    }
}

fn atomic_contention_counters() -> CounterSet {
    CounterSet {
        required: vec![
            counter(
                "stalled-cycles-backend",
                CounterTier::Standard,
                "ownership transfer stall",
            ),
            counter("LLC-store-misses", CounterTier::Standard, "RFO reaching LLC"),
            counter(
                "L1-dcache-store-misses",
                CounterTier::Standard,
                "invalidation-induced store miss",
            ),
        ],
        optional: vec![counter(
            "offcore_response.demand_rfo.l3_hit.snoop_hitm",
            CounterTier::Extended,
            "intra-socket contention",
        )],
    }
}

fn lock_contention_counters() -> CounterSet {
    CounterSet {
        required: vec![
            counter(
                "context-switches",
                CounterTier::Universal,
                "direct serialization measure",
            ),
            counter(
                "cpu-migrations",
                CounterTier::Universal,
                "scheduler-induced cache invalidation",
            ),
            counter(
                "stalled-cycles-backend",
                CounterTier::Standard,
                "lock spin plus syscall overhead",
            ),
            counter("cycles", CounterTier::Universal, "total cost"),
        ],
        optional: vec![counter(
            "page-faults",
            CounterTier::Universal,
            "post-context-switch TLB refill",
        )],
    }
}

fn heap_allocation_counters() -> CounterSet {
    CounterSet {
        required: vec![
            counter("dTLB-load-misses", CounterTier::Standard, "new-page TLB pressure"),
            counter("page-faults", CounterTier::Universal, "fresh mapping cost"),
            counter("cycles", CounterTier::Universal, "total cost"),
        ],
        optional: vec![counter(
            "dTLB-store-misses",
            CounterTier::Standard,
            "write-side TLB pressure",
        )],
    }
}

fn stack_pressure_counters() -> CounterSet {
    CounterSet {
        required: vec![
            counter("dTLB-load-misses", CounterTier::Standard, "stack page TLB footprint"),
            counter(
                "L1-dcache-load-misses",
                CounterTier::Standard,
                "working-set displacement",
            ),
            counter("page-faults", CounterTier::Universal, "stack growth faults"),
        ],
        optional: vec![],
    }
}

fn branch_counters() -> CounterSet {
    CounterSet {
        required: vec![
            counter("branch-misses", CounterTier::Standard, "misprediction count"),
            counter("branches", CounterTier::Standard, "baseline for miss rate"),
            counter("cycles", CounterTier::Universal, "flush cost"),
        ],
        optional: vec![counter(
            "BACLEARS.ANY",
            CounterTier::Extended,
            "front-end resteers",
        )],
    }
}

fn numa_counters() -> CounterSet {
    CounterSet {
        required: vec![
            counter("node-load-misses", CounterTier::Standard, "remote-node accesses"),
            counter("node-loads", CounterTier::Standard, "baseline locality"),
            counter("LLC-load-misses", CounterTier::Standard, "cross-socket traffic"),
        ],
        optional: vec![counter(
            "OFFCORE_RESPONSE.DEMAND_DATA_RD.REMOTE_DRAM",
            CounterTier::Extended,
            "direct remote DRAM reads",
        )],
    }
}

fn build_templates() -> Vec<HypothesisTemplate> {
    let metric = MetricSpec {
        name: "p99.99_operation_latency_ns",
        unit: "nanoseconds",
        percentile: "p99.99",
    };

    let mk = |class: HazardClass,
              h0: &'static str,
              h1: &'static str,
              counters: CounterSet,
              default_mde: f64| HypothesisTemplate {
        class,
        h0,
        h1,
        primary_metric: metric.clone(),
        counters,
        default_mde,
        confounds: standard_confounds(),
    };

    vec![
        mk(
            HazardClass::CacheGeometry,
            "Record footprint has no measurable effect on tail latency.",
            "Accesses spanning multiple cache lines raise tail latency via L1D \
             pressure and multi-line coherence transfers.",
            cache_geometry_counters(),
            0.05,
        ),
        mk(
            HazardClass::FalseSharing,
            "Co-located writers do not affect each other's tail latency.",
            "Writers sharing a cache line inflate each other's tail latency \
             through MESI invalidation ping-pong.",
            false_sharing_counters(),
            0.05,
        ),
        mk(
            HazardClass::AtomicOrdering,
            "Weakening the ordering has no measurable latency effect.",
            "seq_cst stores raise tail latency via store-buffer drains that \
             release ordering avoids on TSO.",
            atomic_ordering_counters(),
            0.05,
        ),
        mk(
            HazardClass::AtomicContention,
            "Concurrent atomic writes do not degrade tail latency.",
            "Contended atomic writes serialize on cache-line ownership and \
             inflate the latency tail.",
            atomic_contention_counters(),
            0.05,
        ),
        mk(
            HazardClass::LockContention,
            "The lock is uncontended under production load.",
            "Lock convoying converts parallel work to sequential and inflates \
             the tail via context switches.",
            lock_contention_counters(),
            0.05,
        ),
        mk(
            HazardClass::HeapAllocation,
            "Hot-path allocation cost is hidden by the allocator fast path.",
            "Hot-path allocation inflates tail latency via arena contention, \
             TLB misses, and page faults.",
            heap_allocation_counters(),
            0.05,
        ),
        mk(
            HazardClass::StackPressure,
            "Frame size has no measurable effect on tail latency.",
            "Multi-page frames inflate the tail through D-TLB misses and stack \
             page faults on deep chains.",
            stack_pressure_counters(),
            0.05,
        ),
        mk(
            HazardClass::VirtualDispatch,
            "The indirect branch predicts perfectly under production load.",
            "Polymorphic dispatch inflates the tail via BTB misses and pipeline \
             flushes.",
            branch_counters(),
            0.05,
        ),
        mk(
            HazardClass::ErasedCallable,
            "Type erasure costs nothing beyond a predicted indirect call.",
            "Erased callables inflate the tail via indirect calls, lost \
             inlining, and hidden allocation.",
            branch_counters(),
            0.05,
        ),
        mk(
            HazardClass::GlobalState,
            "Shared global state is effectively read-only under load.",
            "Writes to centralized global state inflate the tail via cross-core \
             and cross-socket coherence traffic.",
            atomic_contention_counters().merged(&numa_counters()),
            0.05,
        ),
        mk(
            HazardClass::ContendedQueue,
            "Queue index updates do not interfere across cores.",
            "Head/tail co-location inflates the tail via per-operation line \
             ping-pong between producers and consumers.",
            false_sharing_counters().merged(&atomic_contention_counters()),
            0.05,
        ),
        mk(
            HazardClass::DeepConditional,
            "The branch tree predicts well on production data.",
            "Deep or wide branching inflates the tail through correlated \
             mispredictions and I-cache pressure.",
            branch_counters(),
            0.05,
        ),
        mk(
            HazardClass::NumaLocality,
            "All sockets observe local-memory latency for this structure.",
            "Remote-socket access to the shared structure inflates the tail by \
             the interconnect round-trip.",
            numa_counters(),
            0.05,
        ),
        mk(
            HazardClass::CentralizedDispatch,
            "The dispatcher is not a serialization point under load.",
            "Single-point fan-out inflates the tail via I-cache and BTB \
             pressure and lost per-core locality.",
            branch_counters().merged(&cache_geometry_counters()),
            0.05,
        ),
        mk(
            HazardClass::HazardAmplification,
            "Co-located hazards contribute at most additively to tail latency.",
            "Co-located hazards interact super-additively: coherence, ordering, \
             and locality costs compound under load.",
            cache_geometry_counters()
                .merged(&atomic_contention_counters())
                .merged(&numa_counters()),
            0.05,
        ),
    ]
}

// ── Hypotheses ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct LatencyHypothesis {
    pub finding_id: String,
    pub hypothesis_id: String,
    pub hazard_class: HazardClass,
    pub h0: String,
    pub h1: String,
    pub primary_metric: MetricSpec,
    pub counters: CounterSet,
    pub minimum_detectable_effect: f64,
    pub significance_level: f64,
    pub power: f64,
    pub confound_controls: Vec<ConfoundControl>,
    pub structural_features: Vec<f64>,
    pub evidence_tier: EvidenceTier,
}

fn finding_id(diag: &Diagnostic) -> String {
    format!(
        "{}-{}:{}",
        diag.rule_id, diag.location.file, diag.location.line
    )
}

fn stable_hash(text: &str) -> u64 {
    // FNV-1a; stable across runs, unlike the std hasher.
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in text.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

/// Expand one finding into its validation hypothesis.
pub fn construct_hypothesis(
    diag: &Diagnostic,
    catalog: &HypothesisCatalog,
) -> LatencyHypothesis {
    let class = hazard_class_for_rule(diag.rule_id);
    let template = catalog.lookup(class);
    let fid = finding_id(diag);

    LatencyHypothesis {
        hypothesis_id: format!("H-{}-{:016x}", diag.rule_id, stable_hash(&fid)),
        finding_id: fid,
        hazard_class: class,
        h0: template.h0.to_string(),
        h1: template.h1.to_string(),
        primary_metric: template.primary_metric.clone(),
        counters: template.counters.clone(),
        minimum_detectable_effect: template.default_mde,
        significance_level: 0.01,
        power: 0.90,
        confound_controls: template.confounds.clone(),
        structural_features: crate::calibrate::extract_features(diag),
        evidence_tier: diag.tier,
    }
}

// ── Interaction templates ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct InteractionTemplate {
    pub id: &'static str,
    pub components: Vec<HazardClass>,
    pub mechanism: &'static str,
    pub counters: CounterSet,
    /// Minimum super-additive fraction that counts as an interaction.
    pub threshold: f64,
}

#[derive(Debug)]
pub struct InteractionMatrix {
    templates: Vec<InteractionTemplate>,
}

impl InteractionMatrix {
    pub fn new(catalog: &HypothesisCatalog) -> Self {
        use HazardClass::*;
        let counters = |c: HazardClass| catalog.lookup(c).counters.clone();

        let templates = vec![
            InteractionTemplate {
                id: "IX-001",
                components: vec![CacheGeometry, AtomicContention],
                mechanism: "Multi-line RFO amplification: RFO traffic spans several \
                            cache lines, each requiring a separate ownership transfer",
                counters: counters(CacheGeometry).merged(&counters(AtomicContention)),
                threshold: 0.20,
            },
            InteractionTemplate {
                id: "IX-002",
                components: vec![FalseSharing, AtomicContention],
                mechanism: "Same-line invalidation plus atomic write serialization: \
                            every write invalidates the line for all other cores and \
                            atomics prevent batching",
                counters: counters(FalseSharing).merged(&counters(AtomicContention)),
                threshold: 0.20,
            },
            InteractionTemplate {
                id: "IX-003",
                components: vec![AtomicOrdering, AtomicContention],
                mechanism: "Fence serialization plus ownership transfer: the seq_cst \
                            drain extends the window in which the line is exclusively \
                            held",
                counters: counters(AtomicOrdering).merged(&counters(AtomicContention)),
                threshold: 0.20,
            },
            InteractionTemplate {
                id: "IX-004",
                components: vec![AtomicContention, NumaLocality],
                mechanism: "Cross-socket RFO: a remote RFO is several times the cost \
                            of intra-socket, compounding the contention penalty",
                counters: counters(AtomicContention).merged(&counters(NumaLocality)),
                threshold: 0.20,
            },
            InteractionTemplate {
                id: "IX-005",
                components: vec![LockContention, HeapAllocation],
                mechanism: "Allocation under lock: allocator latency extends the \
                            critical section, raising the contention probability",
                counters: counters(LockContention).merged(&counters(HeapAllocation)),
                threshold: 0.20,
            },
            InteractionTemplate {
                id: "IX-006",
                components: vec![VirtualDispatch, DeepConditional],
                mechanism: "Compounding misprediction surface: virtual dispatch plus \
                            deep conditionals exhaust the BTB and pattern history",
                counters: counters(VirtualDispatch).merged(&counters(DeepConditional)),
                threshold: 0.20,
            },
            InteractionTemplate {
                id: "IX-007",
                components: vec![CacheGeometry, AtomicContention, NumaLocality],
                mechanism: "Full compound hazard: large structure plus atomics plus \
                            NUMA produces a multi-line cross-socket RFO storm",
                counters: counters(CacheGeometry)
                    .merged(&counters(AtomicContention))
                    .merged(&counters(NumaLocality)),
                threshold: 0.20,
            },
        ];
        Self { templates }
    }

    pub fn templates(&self) -> &[InteractionTemplate] {
        &self.templates
    }

    pub fn is_eligible(&self, a: HazardClass, b: HazardClass) -> bool {
        self.find_template(a, b).is_some()
    }

    pub fn find_template(&self, a: HazardClass, b: HazardClass) -> Option<&InteractionTemplate> {
        self.templates.iter().find(|t| {
            t.components.len() == 2
                && ((t.components[0] == a && t.components[1] == b)
                    || (t.components[0] == b && t.components[1] == a))
        })
    }
}

// ── Interaction detection ───────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct InteractionCandidate {
    /// Declaration scope the findings share (file of the diagnostic
    /// location).
    pub scope: String,
    pub finding_ids: [String; 2],
    pub classes: [HazardClass; 2],
    pub template_id: &'static str,
}

/// Group preliminary diagnostics by declaration scope and emit a candidate
/// for every interaction-eligible pair within a scope.
pub fn detect_interactions(
    diagnostics: &[Diagnostic],
    matrix: &InteractionMatrix,
) -> Vec<InteractionCandidate> {
    let mut by_scope: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, d) in diagnostics.iter().enumerate() {
        by_scope.entry(d.location.file.as_str()).or_default().push(i);
    }

    let mut candidates = Vec::new();
    for (scope, indices) in by_scope {
        if indices.len() < 2 {
            continue;
        }
        for i in 0..indices.len() {
            for j in (i + 1)..indices.len() {
                let a = &diagnostics[indices[i]];
                let b = &diagnostics[indices[j]];
                let ca = hazard_class_for_rule(a.rule_id);
                let cb = hazard_class_for_rule(b.rule_id);
                let Some(template) = matrix.find_template(ca, cb) else {
                    continue;
                };
                candidates.push(InteractionCandidate {
                    scope: scope.to_string(),
                    finding_ids: [finding_id(a), finding_id(b)],
                    classes: [ca, cb],
                    template_id: template.id,
                });
            }
        }
    }
    candidates
}

/// Seed an amplified (FL090-class) hypothesis from an eligible pair.
pub fn construct_interaction_hypothesis(
    candidate: &InteractionCandidate,
    matrix: &InteractionMatrix,
) -> Option<LatencyHypothesis> {
    let template = matrix
        .templates()
        .iter()
        .find(|t| t.id == candidate.template_id)?;

    let fid = format!("{}+{}", candidate.finding_ids[0], candidate.finding_ids[1]);
    let h0 = format!(
        "The combined effect of {} and {} on tail latency is at most the sum of \
         the individual effects.",
        candidate.classes[0].name(),
        candidate.classes[1].name()
    );
    let h1 = format!(
        "The combined effect of {} and {} on tail latency exceeds the sum of the \
         individual effects by at least {}%. Mechanism: {}",
        candidate.classes[0].name(),
        candidate.classes[1].name(),
        (template.threshold * 100.0) as u32,
        template.mechanism
    );

    Some(LatencyHypothesis {
        hypothesis_id: format!("H-{}-{:016x}", template.id, stable_hash(&fid)),
        finding_id: fid,
        hazard_class: HazardClass::HazardAmplification,
        h0,
        h1,
        primary_metric: MetricSpec {
            name: "p99.99_operation_latency_ns",
            unit: "nanoseconds",
            percentile: "p99.99",
        },
        counters: template.counters.clone(),
        minimum_detectable_effect: 0.05,
        significance_level: 0.01,
        power: 0.90,
        confound_controls: standard_confounds(),
        structural_features: Vec::new(),
        evidence_tier: EvidenceTier::Likely,
    })
}
