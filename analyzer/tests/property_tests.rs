// Property-based tests for analyzer invariants.
//
// Four categories:
// 1. Bucket coverage: for any generated record, bucket membership equals the
//    per-field line spans, and every field lands inside the record's lines
// 2. Escape monotonicity: adding a field never un-escapes a record
// 3. Confidence clamping: any adjustment sequence stays inside [0.10, 0.98]
// 4. Refinement idempotence and rule-sweep determinism over generated input
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use proptest::prelude::*;

use faultline::config::Config;
use faultline::diag::{Diagnostic, Severity};
use faultline::engine::{run_rules, sort_diagnostics};
use faultline::escape::EscapeModel;
use faultline::layout::CacheLineMap;
use faultline::refine::{apply_adjustment, evidence, DiagnosticRefiner, GLOBAL_CEILING, GLOBAL_FLOOR};
use faultline::tu::{
    Decl, FieldDecl, RecordDecl, SourceLoc, TopLevel, TranslationUnit, TypeRef,
};

// ── Generators ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct GenField {
    offset: u64,
    size: u64,
    atomic: bool,
    const_qual: bool,
}

fn arb_field() -> impl Strategy<Value = GenField> {
    (0u64..512, prop_oneof![Just(1u64), Just(2), Just(4), Just(8), Just(16), Just(64)], any::<bool>(), any::<bool>())
        .prop_map(|(offset, size, atomic, const_qual)| GenField {
            offset,
            size,
            atomic,
            const_qual,
        })
}

fn build_record(fields: &[GenField]) -> RecordDecl {
    let mut decls = Vec::new();
    let mut end = 0u64;
    for (i, f) in fields.iter().enumerate() {
        let base = TypeRef::primitive("unsigned long", f.size);
        let ty = if f.atomic {
            TypeRef::atomic(base)
        } else if f.const_qual {
            base.with_const()
        } else {
            base
        };
        decls.push(FieldDecl::new(format!("f{i}"), f.offset, ty));
        end = end.max(f.offset + f.size);
    }
    RecordDecl {
        name: "Generated".into(),
        size_bytes: end.max(1),
        fields: decls,
        bases: vec![],
        is_complete: true,
        is_implicit: false,
        is_closure: false,
        loc: SourceLoc::new("gen.cpp", 1, 1),
    }
}

fn unit_of(record: RecordDecl) -> TranslationUnit {
    TranslationUnit {
        path: String::new(),
        source_path: "gen.cpp".into(),
        compile_args: vec![],
        decls: vec![TopLevel {
            decl: Decl::Record(record),
            in_system_header: false,
        }],
    }
}

// ── Bucket coverage ─────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn bucket_membership_equals_field_spans(fields in prop::collection::vec(arb_field(), 1..12)) {
        let record = build_record(&fields);
        let tu = unit_of(record.clone());
        let map = CacheLineMap::build(&record, &tu, 64).unwrap();

        let bucket_total: usize = map.buckets().iter().map(|b| b.fields.len()).sum();
        let span_total: u64 = map
            .fields()
            .iter()
            .map(|f| f.end_line - f.start_line + 1)
            .sum();
        prop_assert_eq!(bucket_total as u64, span_total);
    }

    #[test]
    fn every_field_lies_within_spanned_lines(fields in prop::collection::vec(arb_field(), 1..12)) {
        let record = build_record(&fields);
        let tu = unit_of(record.clone());
        let map = CacheLineMap::build(&record, &tu, 64).unwrap();

        for f in map.fields() {
            prop_assert!(f.start_line <= f.end_line);
            prop_assert_eq!(f.start_line, f.offset_bytes / 64);
            prop_assert_eq!(f.end_line, (f.offset_bytes + f.size_bytes - 1) / 64);
            prop_assert!(f.straddles == (f.start_line != f.end_line));
        }
    }

    // ── Escape monotonicity ────────────────────────────────────────────────

    #[test]
    fn adding_a_field_never_unescapes(
        fields in prop::collection::vec(arb_field(), 1..10),
        extra in arb_field(),
    ) {
        let record = build_record(&fields);
        let tu = unit_of(record.clone());
        let model = EscapeModel::new();
        let before = model.may_escape_thread(&record, &tu);

        let mut grown_fields = fields.clone();
        grown_fields.push(extra);
        let grown = build_record(&grown_fields);
        let after = model.may_escape_thread(&grown, &tu);

        if before {
            prop_assert!(after);
        }
    }

    // ── Confidence clamping ────────────────────────────────────────────────

    #[test]
    fn adjustments_stay_clamped(
        seed in 0.0f64..1.0,
        picks in prop::collection::vec(0usize..10, 1..20),
    ) {
        const ALL: [faultline::refine::ConfidenceAdjustment; 10] = [
            evidence::SITE_CONFIRMED,
            evidence::FUNCTION_CONFIRMED,
            evidence::ORDERING_OPTIMIZED_AWAY,
            evidence::ATOMIC_WRITES_CONFIRMED,
            evidence::HEAP_SURVIVED,
            evidence::HEAP_ELIMINATED,
            evidence::INDIRECT_CONFIRMED,
            evidence::FULLY_DEVIRTUALIZED,
            evidence::LOCK_CONFIRMED,
            evidence::STACK_CONFIRMED,
        ];

        let mut diag = Diagnostic::new("FL010", "t", Severity::High).with_confidence(seed);
        for pick in picks {
            apply_adjustment(&mut diag, ALL[pick]);
            prop_assert!(diag.confidence >= GLOBAL_FLOOR - 1e-12);
            prop_assert!(diag.confidence <= GLOBAL_CEILING + 1e-12);
        }
    }

    // ── Determinism and idempotence ────────────────────────────────────────

    #[test]
    fn rule_sweep_is_deterministic(fields in prop::collection::vec(arb_field(), 1..10)) {
        let tu = unit_of(build_record(&fields));
        let config = Config::default();

        let render = |mut diags: Vec<Diagnostic>| {
            sort_diagnostics(&mut diags);
            diags
                .iter()
                .map(|d| format!("{d}|{}|{:?}", d.evidence, d.escalations))
                .collect::<Vec<_>>()
        };
        prop_assert_eq!(render(run_rules(&tu, &config)), render(run_rules(&tu, &config)));
    }

    #[test]
    fn refining_twice_equals_refining_once(fields in prop::collection::vec(arb_field(), 1..10)) {
        let tu = unit_of(build_record(&fields));
        let config = Config::default();
        let profiles = faultline::irprofile::ProfileMap::new();
        let refiner = DiagnosticRefiner::new(&profiles, &config);

        let mut once = run_rules(&tu, &config);
        refiner.refine(&mut once);
        let mut twice = once.clone();
        refiner.refine(&mut twice);

        let render = |diags: &[Diagnostic]| {
            diags
                .iter()
                .map(|d| format!("{d}|{}|{:?}|{}", d.evidence, d.escalations, d.suppressed))
                .collect::<Vec<_>>()
        };
        prop_assert_eq!(render(&once), render(&twice));
    }
}
