use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::Array2;

use cloudfit::fit::fugacity_from_temperature;
use cloudfit::image_proc::radial::radial_average;
use cloudfit::image_proc::test_patterns::{cloud_od_image, transmission_from_od};
use cloudfit::{fit_image, AnalysisConfig, EllipseModel, FitModel, Point};

fn synthetic_cloud(size: usize, stretch: f64) -> Array2<f64> {
    let q = fugacity_from_temperature(0.15).unwrap();
    let model = FitModel::ideal_fermi(0.8, q, size as f64 / 8.0);
    let c = (size / 2) as f64;
    let od = cloud_od_image((size, size), Point::new(c, c), &model, stretch);
    transmission_from_od(&od)
}

fn bench_radial_average(c: &mut Criterion) {
    let round = synthetic_cloud(201, 1.0);
    let stretched = synthetic_cloud(201, 1.2);
    let center = Point::new(100.0, 100.0);

    let mut group = c.benchmark_group("radial_average");
    group.bench_function("circular_201x201", |b| {
        b.iter(|| {
            radial_average(
                black_box(&round.view()),
                black_box(center),
                black_box(0.3),
                None,
                EllipseModel::circle(),
            )
        })
    });
    group.bench_function("elliptical_201x201", |b| {
        b.iter(|| {
            radial_average(
                black_box(&stretched.view()),
                black_box(center),
                black_box(0.3),
                None,
                EllipseModel::new(1.0 / 1.2, 0.0),
            )
        })
    });
    group.finish();
}

fn bench_fit_image(c: &mut Criterion) {
    let trans = synthetic_cloud(201, 1.0);
    let config = AnalysisConfig {
        normalize: false,
        ..AnalysisConfig::default()
    };

    let mut group = c.benchmark_group("fit_image");
    group.sample_size(10);
    group.bench_function("ideal_fermi_201x201", |b| {
        b.iter(|| fit_image(black_box(&trans.view()), black_box(&config)))
    });
    group.finish();
}

criterion_group!(benches, bench_radial_average, bench_fit_image);
criterion_main!(benches);
