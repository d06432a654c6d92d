//! Benchmarks for the merge + encode path
//!
//! Run with: cargo bench --package zone-config-lib

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use geo::{Geometry, LineString, Polygon};
use zone_config_lib::{Precision, ZoneLookup, codec};

/// Identifier for grid cell (row, col), shaped like a postal code
fn cell_id(row: usize, col: usize) -> String {
    let letter = |n: usize| (b'A' + (n % 26) as u8) as char;
    format!("{}{}{}{}", letter(row), col % 10, letter(col / 10), row / 26)
}

/// Jagged square cell so unions have realistic vertex counts
fn cell(row: usize, col: usize, size: f64, vertices_per_side: usize) -> Polygon<f64> {
    let (x0, y0) = (-73.9 + col as f64 * size, 45.4 + row as f64 * size);
    let mut coords = Vec::with_capacity(vertices_per_side * 4);
    let step = size / vertices_per_side as f64;
    for i in 0..vertices_per_side {
        coords.push((x0 + i as f64 * step, y0));
    }
    for i in 0..vertices_per_side {
        coords.push((x0 + size, y0 + i as f64 * step));
    }
    for i in 0..vertices_per_side {
        coords.push((x0 + size - i as f64 * step, y0 + size));
    }
    for i in 0..vertices_per_side {
        coords.push((x0, y0 + size - i as f64 * step));
    }
    Polygon::new(LineString::from(coords), Vec::new())
}

fn grid_lookup(side: usize) -> (ZoneLookup, Vec<String>) {
    let mut lookup = ZoneLookup::new();
    let mut ids = Vec::with_capacity(side * side);
    for row in 0..side {
        for col in 0..side {
            let id = cell_id(row, col);
            lookup.insert(&id, Geometry::Polygon(cell(row, col, 0.01, 16)));
            ids.push(id);
        }
    }
    (lookup, ids)
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    for side in [2, 4, 8] {
        let (lookup, ids) = grid_lookup(side);
        group.throughput(Throughput::Elements(ids.len() as u64));
        group.bench_with_input(BenchmarkId::new("adjacent_cells", ids.len()), &ids, |b, ids| {
            b.iter(|| lookup.resolve(ids))
        });
    }

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let (lookup, ids) = grid_lookup(8);
    let shape = lookup.resolve(&ids).shape;

    if let Some(shape) = shape {
        for precision in [Precision::Edit, Precision::Generate] {
            group.bench_function(BenchmarkId::new("merged_grid", precision.decimals()), |b| {
                b.iter(|| codec::encode(&shape, precision))
            });
        }

        let text = codec::encode(&shape, Precision::Edit);
        group.bench_function("decode_merged_grid", |b| b.iter(|| codec::decode(&text)));
    }

    group.finish();
}

criterion_group!(benches, bench_resolve, bench_encode);
criterion_main!(benches);
