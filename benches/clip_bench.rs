//! Benchmarks for clipping and sampling.
//!
//! Run with: `cargo bench --bench clip_bench`
//!
//! Compares clipping in the grid's own reference system against clipping
//! that reprojects every cell, and times centroid sampling per unit.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use geo::{Coord, Rect};
use raster_ward::aggregation::{clip, sample};
use raster_ward::boundary::{BoundarySet, BoundaryUnit};
use raster_ward::grid::{Crs, Grid};

/// Geographic grid of n x n cells around Nairobi.
fn generate_grid(n: usize) -> Grid {
    let step = 1.0 / n as f64;
    let lons: Vec<f64> = (0..n).map(|i| 36.5 + step * i as f64).collect();
    let lats: Vec<f64> = (0..n).map(|i| -0.8 - step * i as f64).collect();
    let values = (0..n * n).map(|i| (i % 97) as f64 * 0.01).collect();
    Grid::new(lons, lats, values, Crs::Geographic).unwrap()
}

/// A k x k checkerboard of square wards over the grid's footprint.
fn generate_wards(k: usize, crs: Crs) -> BoundarySet {
    let size = 1.0 / k as f64;
    let mut units = Vec::with_capacity(k * k);
    for i in 0..k {
        for j in 0..k {
            let x0 = 36.5 + size * i as f64;
            let y0 = -1.8 + size * j as f64;
            let (min, max) = corners(x0, y0, x0 + size, y0 + size, crs);
            let poly = Rect::new(min, max).to_polygon();
            units.push(BoundaryUnit::from_polygon(format!("ward {i}-{j}"), poly).unwrap());
        }
    }
    BoundarySet::new(units, crs).unwrap()
}

fn corners(x0: f64, y0: f64, x1: f64, y1: f64, crs: Crs) -> (Coord<f64>, Coord<f64>) {
    let (ax, ay) = Crs::transform(&Crs::Geographic, &crs, x0, y0).unwrap();
    let (bx, by) = Crs::transform(&Crs::Geographic, &crs, x1, y1).unwrap();
    (Coord { x: ax, y: ay }, Coord { x: bx, y: by })
}

/// Benchmark clipping at several grid sizes, with and without reprojection.
fn bench_clip(c: &mut Criterion) {
    let mut group = c.benchmark_group("clip");
    let utm = Crs::Utm {
        zone: 37,
        north: false,
    };
    let geographic = generate_wards(8, Crs::Geographic);
    let projected = generate_wards(8, utm);

    for n in [64, 128, 256] {
        let grid = generate_grid(n);
        group.bench_with_input(BenchmarkId::new("same_crs", n), &grid, |b, grid| {
            b.iter(|| clip(black_box(grid), black_box(&geographic)))
        });
        group.bench_with_input(BenchmarkId::new("to_utm", n), &grid, |b, grid| {
            b.iter(|| clip(black_box(grid), black_box(&projected)))
        });
    }

    group.finish();
}

/// Benchmark sampling every ward of a clipped grid.
fn bench_sample(c: &mut Criterion) {
    let mut group = c.benchmark_group("sample");

    for k in [4, 16, 32] {
        let wards = generate_wards(k, Crs::Geographic);
        let clipped = clip(&generate_grid(256), &wards).unwrap();
        group.bench_with_input(BenchmarkId::new("all_units", k * k), &wards, |b, wards| {
            b.iter(|| {
                let mut defined = 0usize;
                for unit in wards.units() {
                    if !sample(black_box(clipped.grid()), unit).is_missing() {
                        defined += 1;
                    }
                }
                defined
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_clip, bench_sample);
criterion_main!(benches);
