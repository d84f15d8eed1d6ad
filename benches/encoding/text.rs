use counter_exporter::encoding::text::encode;
use counter_exporter::metrics::{Descriptor, MetricSample, MetricType};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

pub fn text(c: &mut Criterion) {
    c.bench_function("encode", |b| {
        let mut samples = Vec::new();

        for i in 0..100 {
            let counter = Arc::new(Descriptor::new(
                format!("windows_bench_counter_{i}_total"),
                "My counter",
                vec!["nic".into(), "direction".into()],
                MetricType::Counter,
            ));
            let gauge = Arc::new(Descriptor::new(
                format!("windows_bench_gauge_{i}"),
                "My gauge",
                vec!["volume".into()],
                MetricType::Gauge,
            ));

            for nic in 0..10 {
                for direction in ["in", "out"] {
                    samples.push(MetricSample::new(
                        counter.clone(),
                        (i * nic) as f64,
                        vec![format!("Ethernet{nic}"), direction.to_string()],
                    ));
                }
                samples.push(MetricSample::new(
                    gauge.clone(),
                    nic as f64 / 3.0,
                    vec![format!("C:\\Volume{nic}")],
                ));
            }
        }

        let mut buffer = String::new();

        b.iter(|| {
            encode(&mut buffer, &samples).unwrap();
            black_box(&mut buffer);
            buffer.clear();
        });
    });
}

criterion_group!(benches, text);
criterion_main!(benches);
