use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use faultline::config::Config;
use faultline::engine::run_rules;
use faultline::layout::CacheLineMap;
use faultline::tu::{
    Decl, FieldDecl, RecordDecl, SourceLoc, TopLevel, TranslationUnit, TypeRef,
};

// ── Synthetic inputs ────────────────────────────────────────────────────────

fn wide_record(field_count: u64) -> RecordDecl {
    let fields = (0..field_count)
        .map(|i| {
            let ty = if i % 4 == 0 {
                TypeRef::atomic(TypeRef::primitive("unsigned long", 8))
            } else {
                TypeRef::primitive("unsigned long", 8)
            };
            FieldDecl::new(format!("f{i}"), i * 8, ty)
        })
        .collect();
    RecordDecl {
        name: format!("Wide{field_count}"),
        size_bytes: field_count * 8,
        fields,
        bases: vec![],
        is_complete: true,
        is_implicit: false,
        is_closure: false,
        loc: SourceLoc::new("bench.cpp", 1, 1),
    }
}

fn unit_of(records: Vec<RecordDecl>) -> TranslationUnit {
    TranslationUnit {
        path: String::new(),
        source_path: "bench.cpp".into(),
        compile_args: vec![],
        decls: records
            .into_iter()
            .map(|r| TopLevel {
                decl: Decl::Record(r),
                in_system_header: false,
            })
            .collect(),
    }
}

// ── Benchmarks ──────────────────────────────────────────────────────────────

fn bench_layout(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_line_map");
    for field_count in [8u64, 64, 256] {
        let record = wide_record(field_count);
        let tu = unit_of(vec![record.clone()]);
        group.bench_with_input(
            BenchmarkId::from_parameter(field_count),
            &field_count,
            |b, _| {
                b.iter(|| {
                    let map = CacheLineMap::build(black_box(&record), &tu, 64).unwrap();
                    black_box(map.atomic_pairs_on_same_line().len())
                })
            },
        );
    }
    group.finish();
}

fn bench_rule_sweep(c: &mut Criterion) {
    let records: Vec<RecordDecl> = (0..32).map(|i| {
        let mut r = wide_record(24);
        r.name = format!("Record{i}");
        r.loc = SourceLoc::new("bench.cpp", 10 + i, 1);
        r
    }).collect();
    let tu = unit_of(records);
    let config = Config::default();

    c.bench_function("rule_sweep_32_records", |b| {
        b.iter(|| black_box(run_rules(black_box(&tu), &config)).len())
    });
}

criterion_group!(benches, bench_layout, bench_rule_sweep);
criterion_main!(benches);
