use criterion::{Criterion, criterion_group, criterion_main};
use futures::TryStreamExt;
use pdfrag::services::load_chunks;
use pdfrag::utils::clean;
use std::hint::black_box;

fn sample_text() -> String {
    "Refunds are accepted within thirty days of purchase.\n\
     Items must be returned in their original packaging;\n\
     shipping costs are not refunded.\n\n"
        .repeat(2_000)
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let text = sample_text();
    c.bench_function("clean", |b| b.iter(|| clean(black_box(&text))));

    let dir = tempfile::tempdir().expect("can create temp dir");
    let path = dir.path().join("sample.txt");
    std::fs::write(&path, &text).expect("can write sample");

    let runtime = tokio::runtime::Runtime::new().expect("can build runtime");
    c.bench_function("load_chunks_512", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let chunks: Vec<String> = load_chunks(black_box(&path), 512)
                    .try_collect()
                    .await
                    .expect("can read sample");
                chunks.len()
            })
        })
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
