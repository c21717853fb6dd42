use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};

use canvas_history::{
    config::HistoryConfig,
    core::stack::HistoryStack,
    engine::{history::HistoryEngine, transaction::OperationRequest},
    op::{HistoryEntry, OperationRecord},
    snapshot::Snapshot,
    surface::memory::MemorySurface,
    types::OpType,
};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .expect("runtime")
}

fn engine(side: u32) -> HistoryEngine<MemorySurface> {
    let config = HistoryConfig {
        enable_compression: false,
        enable_perf_monitoring: false,
        ..HistoryConfig::default()
    };
    HistoryEngine::new(MemorySurface::new(side, side).expect("surface"), config)
}

async fn paint(engine: &mut HistoryEngine<MemorySurface>, shade: u8) {
    engine
        .execute_operation(OperationRequest::new(OpType::Draw, "bench"), move |s| {
            Box::pin(async move {
                s.fill_rect(0, 0, 4, 4, [shade, 0, 0, 255]);
                Ok(())
            })
        })
        .await
        .expect("paint");
}

fn bench_stack_push(c: &mut Criterion) {
    let snap = Snapshot::blank(16, 16).expect("snapshot");
    c.bench_function("stack_push_10k_capped", |b| {
        b.iter(|| {
            let mut stack = HistoryStack::new(50);
            for id in 0..10_000u64 {
                let rec = OperationRecord::new(id, OpType::Draw, "push", snap.clone(), snap.clone());
                stack.push(HistoryEntry::Operation(rec));
            }
        });
    });
}

fn bench_execute(c: &mut Criterion) {
    let rt = runtime();
    let mut group = c.benchmark_group("execute_operation");
    for side in [16u32, 64, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(side), &side, |b, &side| {
            b.iter(|| {
                rt.block_on(async {
                    let mut engine = engine(side);
                    for shade in 0..100u8 {
                        paint(&mut engine, shade).await;
                    }
                });
            });
        });
    }
    group.finish();
}

fn bench_undo_redo(c: &mut Criterion) {
    let rt = runtime();
    let mut engine = engine(64);
    rt.block_on(async {
        for shade in 0..50u8 {
            paint(&mut engine, shade).await;
        }
    });

    c.bench_function("undo_redo_50_steps_64px", |b| {
        b.iter(|| {
            rt.block_on(async {
                while engine.undo().await.expect("undo") {}
                while engine.redo().await.expect("redo") {}
            });
        });
    });
}

criterion_group!(benches, bench_stack_push, bench_execute, bench_undo_redo);
criterion_main!(benches);
