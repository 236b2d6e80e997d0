use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use voicover::audio::{AudioChunker, AudioTrack, RenderedChunk};

const RATE: u32 = 44_100;

fn source(duration_ms: u64) -> AudioTrack {
    let frames = duration_ms as usize * RATE as usize / 1000;
    let samples = (0..frames)
        .map(|n| (n as f32 * 0.01).sin() * 0.3)
        .collect();
    AudioTrack::new(samples, RATE, 1).expect("valid track")
}

/// Rendered chunks alternating between 3% short and 2% long.
fn drifted(chunker: &AudioChunker, track: &AudioTrack) -> Vec<RenderedChunk> {
    chunker
        .split(track)
        .iter()
        .map(|chunk| {
            let mut payload = chunk.payload.clone();
            let percent = if chunk.index % 2 == 0 { 97 } else { 102 };
            payload.resize_frames(payload.frames() * percent / 100);
            chunk.rendered(payload)
        })
        .collect()
}

fn bench_reassemble(c: &mut Criterion) {
    let mut group = c.benchmark_group("reassemble");
    group.sample_size(20);

    for duration_ms in [60_000u64, 180_000, 300_000] {
        let chunker = AudioChunker::new(60_000).expect("valid chunk length");
        let track = source(duration_ms);
        let rendered = drifted(&chunker, &track);

        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}s", duration_ms / 1000)),
            &rendered,
            |b, rendered| {
                b.iter(|| {
                    let out = chunker
                        .reassemble(black_box(rendered.clone()), duration_ms, RATE, 1)
                        .expect("reassembly succeeds");
                    black_box(out)
                })
            },
        );
    }

    group.finish();
}

fn bench_split(c: &mut Criterion) {
    let chunker = AudioChunker::new(60_000).expect("valid chunk length");
    let track = source(300_000);
    c.bench_function("split_300s", |b| {
        b.iter(|| black_box(chunker.split(black_box(&track))))
    });
}

criterion_group!(benches, bench_reassemble, bench_split);
criterion_main!(benches);
