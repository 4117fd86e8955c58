use criterion::{criterion_group, criterion_main, Criterion};
use macmirror_core::capture::RawImage;
use macmirror_core::encode::JpegEncoder;

fn bench_jpeg_frame_encoding(c: &mut Criterion) {
    let width = 1920;
    let height = 1080;
    let image = RawImage::solid_fill(width, height, [128, 128, 128]);
    let encoder = JpegEncoder::new().expect("encoder init");

    c.bench_function("encode_1080p_frame", |b| {
        b.iter(|| {
            let _ = encoder.encode(&image, 0.5);
        })
    });
}

criterion_group!(benches, bench_jpeg_frame_encoding);
criterion_main!(benches);
