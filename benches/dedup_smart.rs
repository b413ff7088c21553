use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use testcase_import::builder::{BuildContext, IdAllocator, build_test_case};
use testcase_import::dedup::{DedupConfig, DeduplicationMode, detect_duplicates};
use testcase_import::mapping::MappedRecord;
use testcase_import::model::{TestCase, TestStep};

const MODULES: &[&str] = &["Auth", "Cart", "Search", "Billing", "Profile"];
const VERBS: &[&str] = &["Verify", "Check", "Ensure", "Validate"];
const SUBJECTS: &[&str] = &[
    "login with valid credentials",
    "checkout with saved card",
    "search by keyword",
    "invoice download",
    "avatar upload",
    "password reset email",
];

fn generate_cases(count: usize) -> Vec<TestCase> {
    let context = BuildContext::new(None);
    let mut ids = IdAllocator::default();
    (0..count)
        .map(|i| {
            let subject = SUBJECTS[i % SUBJECTS.len()];
            let verb = VERBS[(i / SUBJECTS.len()) % VERBS.len()];
            let record = MappedRecord {
                title: format!("{verb} {subject} #{}", i % 97),
                module: MODULES[i % MODULES.len()].to_string(),
                steps: vec![
                    TestStep::new(1, format!("Open the {subject} screen"), ""),
                    TestStep::new(2, format!("Perform action {}", i % 13), "Success"),
                ],
                ..MappedRecord::default()
            };
            build_test_case(record, &context, &mut ids)
        })
        .collect()
}

fn bench_smart_dedup(c: &mut Criterion) {
    let mut group = c.benchmark_group("dedup_smart");
    group.sample_size(20);
    let config = DedupConfig::default();
    for size in [200usize, 800] {
        let cases = generate_cases(size);
        group.bench_with_input(BenchmarkId::new("strict", size), &cases, |b, cases| {
            b.iter_batched(
                || cases.clone(),
                |cases| detect_duplicates(&cases, DeduplicationMode::Strict, &config),
                BatchSize::LargeInput,
            )
        });
        group.bench_with_input(BenchmarkId::new("smart", size), &cases, |b, cases| {
            b.iter_batched(
                || cases.clone(),
                |cases| detect_duplicates(&cases, DeduplicationMode::Smart, &config),
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_smart_dedup);
criterion_main!(benches);
