use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use soilife_core::{FramePalette, SoilGrid, SoilParams, render_frame};
use std::time::Duration;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

fn seeded_grid(side: u32) -> SoilGrid {
    let mut grid = SoilGrid::new(side, side, 0.7).expect("grid");
    grid.randomize(0.3, 0xBEEF);
    grid
}

fn bench_kernel(c: &mut Criterion) {
    let mut group = c.benchmark_group("kernel");
    group.sample_size(env_or("SOILIFE_BENCH_SAMPLES", 30_usize));
    group.warm_up_time(Duration::from_secs(env_or("SOILIFE_BENCH_WARMUP_SECS", 2_u64)));
    group.measurement_time(Duration::from_secs(env_or("SOILIFE_BENCH_MEASURE_SECS", 8_u64)));
    let steps: usize = env_or("SOILIFE_BENCH_STEPS", 16);
    let params = SoilParams::default();
    let palette = FramePalette::default();

    for side in [128_u32, 256, 512] {
        group.bench_function(format!("step{steps}_{side}x{side}"), |b| {
            b.iter_batched(
                || seeded_grid(side),
                |mut grid| {
                    for _ in 0..steps {
                        grid.step(&params);
                    }
                    grid
                },
                BatchSize::LargeInput,
            );
        });

        let grid = seeded_grid(side);
        group.bench_function(format!("render_{side}x{side}"), |b| {
            b.iter(|| render_frame(&grid, &palette));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_kernel);
criterion_main!(benches);
