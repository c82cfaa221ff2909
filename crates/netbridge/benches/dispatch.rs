use std::hint::black_box;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use netbridge::{
    ApiClient, Configuration, EventSink, HttpResponse, Request, TaskHandle, TaskOptions, TaskSpec,
    Transport, TransportEvent,
};
use parking_lot::Mutex;

/// Answers every task right away with `chunks` pieces of body.
struct Echo {
    sink:   Mutex<Option<EventSink>>,
    next:   AtomicU64,
    chunks: usize,
}

impl Echo {
    fn new(chunks: usize) -> Self {
        Self {
            sink: Mutex::new(None),
            next: AtomicU64::new(0),
            chunks,
        }
    }
}

impl Transport for Echo {
    fn attach(&self, sink: EventSink) {
        *self.sink.lock() = Some(sink);
    }

    fn create_task(&self, _spec: TaskSpec) -> TaskHandle {
        TaskHandle::new(self.next.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn resume(&self, task: TaskHandle) {
        let Some(sink) = self.sink.lock().clone() else {
            return;
        };
        for _ in 0..self.chunks {
            sink.emit(TransportEvent::ReceivedData {
                task,
                data: Bytes::from_static(&[0u8; 1024]),
            });
        }
        let url = url::Url::parse("https://bench.example.com/").unwrap();
        sink.emit(TransportEvent::Completed {
            task,
            response: Some(HttpResponse::new(url, 200)),
            error: None,
        });
    }

    fn cancel(&self, _task: TaskHandle) {}

    fn invalidate_and_cancel(&self) {}
}

fn client(rt: &tokio::runtime::Runtime, chunks: usize) -> Arc<ApiClient> {
    let _guard = rt.enter();
    let config = Configuration::with_base_url("https://bench.example.com")
        .unwrap()
        .purge_download_dir(false);
    Arc::new(ApiClient::new(config, Echo::new(chunks)))
}

fn bench_sequential(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_sequential");
    let rt = tokio::runtime::Runtime::new().unwrap();

    for chunks in [1usize, 16, 128] {
        let client = client(&rt, chunks);
        group.throughput(Throughput::Bytes((chunks * 1024) as u64));
        group.bench_with_input(BenchmarkId::new("data_task", chunks), &chunks, |b, _| {
            b.to_async(&rt).iter(|| async {
                let response = client
                    .data(&Request::<()>::get("/"), TaskOptions::new())
                    .await
                    .unwrap();
                black_box(response.data.len())
            });
        });
    }

    group.finish();
}

fn bench_concurrent(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_concurrent");
    let rt = tokio::runtime::Runtime::new().unwrap();
    let client = client(&rt, 4);

    for tasks in [8usize, 64, 256] {
        group.throughput(Throughput::Elements(tasks as u64));
        group.bench_with_input(BenchmarkId::new("data_tasks", tasks), &tasks, |b, &tasks| {
            b.to_async(&rt).iter(|| {
                let client = client.clone();
                async move {
                    let mut handles = Vec::with_capacity(tasks);
                    for _ in 0..tasks {
                        let client = client.clone();
                        handles.push(tokio::spawn(async move {
                            client.data(&Request::<()>::get("/"), TaskOptions::new()).await
                        }));
                    }
                    for handle in handles {
                        black_box(handle.await.unwrap().unwrap());
                    }
                }
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sequential, bench_concurrent);
criterion_main!(benches);
