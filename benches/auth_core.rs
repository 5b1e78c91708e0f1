use criterion::{Criterion, criterion_group, criterion_main};

use portico::domain::normalize;
use portico::reset::token_digest;

fn bench_normalize(c: &mut Criterion) {
    c.bench_function("normalize_full_url", |b| {
        b.iter(|| normalize(std::hint::black_box("HTTPS://www.Example.com:8443/portfolio?ref=1")))
    });
    c.bench_function("normalize_bare_domain", |b| {
        b.iter(|| normalize(std::hint::black_box("example.com")))
    });
}

fn bench_token_digest(c: &mut Criterion) {
    c.bench_function("token_digest", |b| {
        b.iter(|| token_digest(std::hint::black_box("3q2-7w8x9y0z1a2b3c4d5e6f7g8h9i0j1k2l3m4n5o6p")))
    });
}

criterion_group!(benches, bench_normalize, bench_token_digest);
criterion_main!(benches);
