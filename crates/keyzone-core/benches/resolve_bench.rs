//! Criterion benchmarks for the per-fingertip hot path.
//!
//! Every detected fingertip of every frame goes through one homography
//! transform and one key lookup, so both must stay well under a frame period.
//!
//! Run with:
//! ```bash
//! cargo bench --package keyzone-core --bench resolve_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use keyzone_core::{
    CameraQuad, Fingertip, FingertipResolver, Hand, Handedness, HomographyMapper, Key,
    KeyClassifier, KeyboardLayout, FINGERTIP_IDS,
};

// ── Fixtures ──────────────────────────────────────────────────────────────────

/// Builds a `rows` × `cols` grid of equal keys filling a 1000×300 frame.
fn grid_layout(rows: usize, cols: usize) -> KeyboardLayout {
    let h = 0.3;
    let (kw, kh) = (1.0 / cols as f64, h / rows as f64);
    let keys = (0..rows)
        .flat_map(|r| {
            (0..cols).map(move |c| Key::new(format!("K{r}_{c}"), c as f64 * kw, r as f64 * kh, kw, kh))
        })
        .collect();
    KeyboardLayout::new(1000.0, 300.0, keys).expect("grid layout is valid")
}

fn camera_quad() -> CameraQuad {
    CameraQuad::new([[10.0, 20.0], [642.0, 20.0], [598.0, 215.0], [51.0, 215.0]])
}

// ── Benchmarks: homography ────────────────────────────────────────────────────

fn bench_homography(c: &mut Criterion) {
    let layout = grid_layout(5, 15);
    let mut group = c.benchmark_group("homography");

    group.bench_function("construct", |b| {
        b.iter(|| HomographyMapper::new(black_box(&layout), black_box(camera_quad())))
    });

    let mapper = HomographyMapper::new(&layout, camera_quad()).expect("quad is valid");
    group.bench_function("transform", |b| {
        b.iter(|| mapper.transform(black_box(320.0), black_box(120.0)))
    });

    group.finish();
}

// ── Benchmarks: key lookup ────────────────────────────────────────────────────

/// Lookup is a linear scan, so the last key of the grid is the worst case.
fn bench_lookup_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup_scaling");

    for &cols in &[4usize, 15, 30] {
        let layout = grid_layout(5, cols);
        let last = layout.keys().last().expect("grid is non-empty").center();

        group.bench_with_input(BenchmarkId::new("keys", 5 * cols), &last, |b, &(x, y)| {
            b.iter(|| KeyClassifier::lookup(&layout, black_box(x), black_box(y)))
        });
    }

    group.finish();
}

// ── Benchmarks: full frame ────────────────────────────────────────────────────

/// Resolves two hands with five fingertips each, a typical frame.
fn bench_resolve_two_hands(c: &mut Criterion) {
    let resolver = FingertipResolver::new(grid_layout(5, 15), camera_quad()).expect("quad is valid");
    let hand = |handedness, dx: f64| Hand {
        handedness,
        fingertips: FINGERTIP_IDS
            .iter()
            .enumerate()
            .map(|(i, &id)| Fingertip { landmark_id: id, x: dx + 25.0 * i as f64, y: 110.0 })
            .collect(),
    };
    let hands = vec![hand(Handedness::Left, 100.0), hand(Handedness::Right, 400.0)];

    c.bench_function("resolve_hands/two_hands", |b| {
        b.iter(|| resolver.resolve_hands(black_box(&hands)))
    });
}

criterion_group!(benches, bench_homography, bench_lookup_scaling, bench_resolve_two_hands);
criterion_main!(benches);
