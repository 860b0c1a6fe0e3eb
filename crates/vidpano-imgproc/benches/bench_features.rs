use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::{rngs::StdRng, Rng, SeedableRng};

use vidpano_image::{Image, ImageSize};
use vidpano_imgproc::features::{fast_feature_detector, knn_match_hamming, OrbExtractor};

fn noise_image(size: ImageSize) -> Image<u8, 1> {
    let mut rng = StdRng::seed_from_u64(42);
    let data = (0..size.width * size.height)
        .map(|i| if (i / 8) % 2 == 0 { rng.random() } else { 128 })
        .collect();
    Image::new(size, data).unwrap()
}

fn bench_fast_corner_detect(c: &mut Criterion) {
    let mut group = c.benchmark_group("FastCornerDetect");

    for (width, height) in [(640, 480), (1280, 720)].iter() {
        let image = noise_image([*width, *height].into());
        let parameter_string = format!("{width}x{height}");

        group.bench_with_input(
            BenchmarkId::new("fast_native_cpu", &parameter_string),
            &image,
            |b, i| b.iter(|| black_box(fast_feature_detector(i, 20, 9)).unwrap()),
        );

        let extractor = OrbExtractor::default();
        group.bench_with_input(
            BenchmarkId::new("orb_detect_and_describe", &parameter_string),
            &image,
            |b, i| b.iter(|| black_box(extractor.detect_and_describe(i)).unwrap()),
        );
    }

    group.finish();
}

fn bench_knn_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("KnnMatchHamming");
    let mut rng = StdRng::seed_from_u64(7);

    for n in [500usize, 2000].iter() {
        let query: Vec<[u8; 32]> = (0..*n).map(|_| rng.random()).collect();
        let train: Vec<[u8; 32]> = (0..*n).map(|_| rng.random()).collect();

        group.bench_with_input(BenchmarkId::new("knn_k2", n), &(query, train), |b, (q, t)| {
            b.iter(|| black_box(knn_match_hamming(q, t, 2)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fast_corner_detect, bench_knn_match);
criterion_main!(benches);
