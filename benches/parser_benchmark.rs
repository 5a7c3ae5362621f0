use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use datastore_middleware::driver::file::{Codec, FileFormat};
use datastore_middleware::sql::{CriteriaPredicate, parse, parse_query};
use datastore_middleware::types::RowValues;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde_json::json;
use std::hint::black_box;

const STATEMENTS: &[&str] = &[
    "SELECT id, name AS n, count(*) FROM events WHERE kind = 'click' AND ts BETWEEN ? AND ? GROUP BY id, n",
    "SELECT * FROM people WHERE email IS NOT NULL OR name LIKE 'a%'",
    "INSERT INTO events(id, kind, ts, payload) VALUES (?, ?, ?, ?)",
    "UPDATE events SET kind = 'view', ts = ? WHERE id IN (?, ?, ?, ?)",
    "DELETE FROM events WHERE id NOT IN (1, 2, 3) AND kind <> 'keep'",
];

// Deterministic NDJSON body so runs are comparable
fn generate_ndjson(rows: usize) -> String {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let kinds = ["click", "view", "scroll", "purchase"];
    let mut body = String::with_capacity(rows * 96);
    for i in 0..rows {
        let line = json!({
            "id": i,
            "kind": kinds[rng.random_range(0..kinds.len())],
            "ts": rng.random_range(1_600_000_000i64..1_700_000_000),
            "score": rng.random_range(0.0..100.0),
            "email": if rng.random_bool(0.2) { None } else { Some(format!("user{i}@example.com")) },
        });
        body.push_str(&line.to_string());
        body.push('\n');
    }
    body
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for sql in STATEMENTS {
        let label = sql.split_whitespace().next().unwrap_or("sql");
        group.bench_with_input(BenchmarkId::new(label, sql.len()), sql, |b, sql| {
            b.iter(|| parse(black_box(sql)).unwrap());
        });
    }
    group.finish();
}

fn bench_filter(c: &mut Criterion) {
    let codec = Codec::new(FileFormat::Json);
    let mut group = c.benchmark_group("filter");
    for rows in [1_000usize, 50_000] {
        let decoded = codec.decode(&generate_ndjson(rows)).unwrap();
        let query = parse_query(
            "SELECT id FROM events WHERE kind IN ('click', 'purchase') AND score >= ? AND email IS NOT NULL",
        )
        .unwrap();
        group.bench_with_input(BenchmarkId::new("where", rows), &decoded, |b, decoded| {
            b.iter(|| {
                let predicate = CriteriaPredicate::new(
                    query.criteria(),
                    &mut std::iter::once(RowValues::Float(50.0)),
                )
                .unwrap();
                decoded
                    .records
                    .iter()
                    .filter(|record| predicate.matches(*record))
                    .count()
            });
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let codec = Codec::new(FileFormat::Json);
    let body = generate_ndjson(10_000);
    c.bench_function("decode_ndjson_10k", |b| {
        b.iter(|| codec.decode(black_box(&body)).unwrap());
    });
}

criterion_group!(benches, bench_parse, bench_filter, bench_decode);
criterion_main!(benches);
