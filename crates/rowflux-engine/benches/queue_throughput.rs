use criterion::{criterion_group, criterion_main, Criterion, Throughput};

use rowflux_engine::LinkQueue;
use rowflux_types::row::{Row, Value};

const ROWS: u64 = 10_000;

fn bench_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("link_queue");
    group.throughput(Throughput::Elements(ROWS));

    for capacity in [8usize, 64, 512] {
        group.bench_function(format!("put_get_cap{capacity}"), |b| {
            b.iter(|| {
                let queue = LinkQueue::new("p", "c", "p.0 -> c.0", capacity);
                let producer = {
                    let queue = queue.clone();
                    std::thread::spawn(move || {
                        for i in 0..ROWS as i64 {
                            queue.put(Row::new(vec![Value::Int64(i)]));
                        }
                        queue.mark_producer_finished();
                    })
                };
                let mut received = 0u64;
                while queue.get().is_some() {
                    received += 1;
                }
                producer.join().unwrap();
                assert_eq!(received, ROWS);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_queue);
criterion_main!(benches);
