use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use feed_proto::{Cell, Grid, RleMode, StreamUpdate};
use feed_schema::{StreamDef, StreamFlags, WindowFlags};
use feed_server::StreamEncoder;

fn dungeon(width: u16, height: u16, seed: u16) -> Grid {
    let mut grid = Grid::filled(width, height, Cell::new(b'.', 9));
    for y in 0..height {
        for x in 0..width {
            if (x * 7 + y * 13 + seed) % 11 == 0 {
                grid.set(x, y, Cell::new(b'#', 1));
            }
        }
    }
    grid
}

fn bench_modes(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_mode");
    let grid = dungeon(198, 66, 0);
    for mode in RleMode::PREFERENCE {
        group.bench_with_input(BenchmarkId::new("forced", mode.label()), &mode, |b, &mode| {
            b.iter(|| StreamUpdate::encode_with(0, &grid, Some(mode)))
        });
    }
    group.bench_function("selected", |b| b.iter(|| StreamUpdate::encode(0, &grid)));
    group.finish();
}

fn bench_delta(c: &mut Criterion) {
    let def = StreamDef {
        id: 0,
        name: "dungeon".into(),
        flags: StreamFlags::AUTO,
        window: WindowFlags::MAP,
        cols: 66,
        rows: 22,
        max_rows: 0,
    };
    let frames: Vec<Grid> = (0..8).map(|seed| dungeon(66, 22, seed)).collect();

    c.bench_function("encode_delta_sequence", |b| {
        b.iter(|| {
            let mut encoder = StreamEncoder::new(&def);
            frames
                .iter()
                .filter_map(|grid| encoder.encode(grid, None))
                .map(|update| update.bytes.len())
                .sum::<usize>()
        })
    });
}

criterion_group!(encode_benches, bench_modes, bench_delta);
criterion_main!(encode_benches);
