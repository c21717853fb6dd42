use std::time::Duration;

use canvas_history::{
    config::{ConfigPatch, HistoryConfig},
    engine::{history::HistoryEngine, transaction::OperationRequest, HistoryError},
    runtime::{
        events::HistoryEvent,
        handle::{spawn_history, HistoryHandle, RuntimeConfig, RuntimeError},
    },
    surface::memory::MemorySurface,
    types::{Metadata, OpId, OpType},
};

fn spawn() -> HistoryHandle<MemorySurface> {
    let config = HistoryConfig {
        enable_compression: false,
        ..HistoryConfig::default()
    };
    let engine = HistoryEngine::new(MemorySurface::new(8, 8).expect("surface"), config);
    spawn_history(engine, RuntimeConfig::default())
}

async fn paint(handle: &HistoryHandle<MemorySurface>, x: u32, y: u32) -> Result<OpId, RuntimeError> {
    handle
        .execute_operation(OperationRequest::new(OpType::Draw, format!("dot {x},{y}")), move |s| {
            Box::pin(async move {
                s.set_pixel(x, y, [255, 255, 0, 255]);
                Ok(())
            })
        })
        .await
}

fn auto_cleanup_engine(check_interval_secs: u64) -> HistoryEngine<MemorySurface> {
    // Three 512-byte entries sit above the 1024-byte default target.
    let config = HistoryConfig {
        enable_compression: false,
        auto_cleanup_threshold_minutes: 1,
        auto_cleanup_check_interval_secs: check_interval_secs,
        memory_limit_bytes: 4 * 512,
        cleanup_target_ratio: 0.5,
        min_retained_entries: 1,
        ..HistoryConfig::default()
    };
    HistoryEngine::new(MemorySurface::new(8, 8).expect("surface"), config)
}

fn automatic_cleanups(sub: &mut tokio::sync::broadcast::Receiver<HistoryEvent>) -> Vec<(usize, usize)> {
    let mut seen = Vec::new();
    while let Ok(evt) = sub.try_recv() {
        if let HistoryEvent::CleanupCompleted {
            evicted,
            usage,
            automatic: true,
        } = evt
        {
            seen.push((evicted, usage));
        }
    }
    seen
}

async fn next_event(sub: &mut tokio::sync::broadcast::Receiver<HistoryEvent>) -> HistoryEvent {
    tokio::time::timeout(Duration::from_secs(1), sub.recv())
        .await
        .expect("event")
        .expect("recv")
}

#[tokio::test]
async fn runtime_execute_undo_and_events_ordered() {
    let handle = spawn();
    let mut sub = handle.subscribe();

    let id = paint(&handle, 1, 1).await.expect("paint");
    assert!(handle.undo().await.expect("undo"));
    assert!(handle.redo().await.expect("redo"));
    assert!(handle.jump_to(None).await.expect("jump"));

    assert_eq!(next_event(&mut sub).await, HistoryEvent::Executed { id });
    assert_eq!(next_event(&mut sub).await, HistoryEvent::UndoApplied { cursor: None });
    assert_eq!(next_event(&mut sub).await, HistoryEvent::RedoApplied { cursor: Some(0) });
    assert_eq!(next_event(&mut sub).await, HistoryEvent::Jumped { cursor: None });

    let rec = handle.get_operation(id).await.expect("get").expect("record");
    assert_eq!(rec.description, "dot 1,1");

    let engine = handle.shutdown().await.expect("shutdown");
    assert_eq!(engine.surface().pixel(1, 1), Some([0, 0, 0, 0]));
    assert!(engine.can_redo());
}

#[tokio::test]
async fn runtime_composite_lifecycle() {
    let handle = spawn();
    let mut sub = handle.subscribe();

    let tx = handle
        .start_composite("drag", Metadata::new())
        .await
        .expect("open");
    let first = paint(&handle, 0, 0).await.expect("first");
    let second = paint(&handle, 1, 0).await.expect("second");

    let err = handle.undo().await.expect_err("undo while open");
    assert!(matches!(
        err,
        RuntimeError::History(HistoryError::CompositeInProgress(id)) if id == tx
    ));
    assert_eq!(handle.end_composite().await.expect("seal"), Some(tx));

    handle
        .start_composite("noop", Metadata::new())
        .await
        .expect("open empty");
    assert_eq!(handle.end_composite().await.expect("discard"), None);

    let expected = [
        HistoryEvent::CompositeOpened { id: tx },
        HistoryEvent::SubOperationRecorded { composite: tx, id: first },
        HistoryEvent::SubOperationRecorded { composite: tx, id: second },
        HistoryEvent::CompositeSealed { id: tx },
    ];
    for want in expected {
        assert_eq!(next_event(&mut sub).await, want);
    }
    assert!(matches!(next_event(&mut sub).await, HistoryEvent::CompositeOpened { .. }));
    assert_eq!(next_event(&mut sub).await, HistoryEvent::CompositeDiscarded);

    let history = handle.history().await.expect("history");
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].sub_operations, 2);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_callers_are_serialized() {
    let handle = spawn();

    let mut tasks = Vec::new();
    for row in 0..4u32 {
        let handle = handle.clone();
        tasks.push(tokio::spawn(async move {
            for col in 0..5u32 {
                paint(&handle, col, row).await.expect("paint");
            }
        }));
    }
    for task in tasks {
        task.await.expect("join");
    }

    let state = handle.state().await.expect("state");
    assert_eq!(state.stats.total_operations, 20);
    assert_eq!(state.entry_count, 20);
    assert_eq!(state.memory_usage, 20 * 2 * 8 * 8 * 4);

    let engine = handle.shutdown().await.expect("shutdown");
    for row in 0..4 {
        for col in 0..5 {
            assert_eq!(engine.surface().pixel(col, row), Some([255, 255, 0, 255]));
        }
    }
}

#[tokio::test]
async fn runtime_cleanup_config_and_export() {
    let handle = spawn();
    let mut sub = handle.subscribe();
    for x in 0..4 {
        paint(&handle, x, 0).await.expect("paint");
    }

    handle
        .update_config(ConfigPatch {
            min_retained_entries: Some(2),
            ..ConfigPatch::default()
        })
        .await
        .expect("config");
    let report = handle.cleanup(Some(0)).await.expect("cleanup");
    assert_eq!(report.evicted, 2);

    let bytes = handle.export_history().await.expect("export");
    handle.clear_history().await.expect("clear");
    assert_eq!(handle.state().await.expect("state").entry_count, 0);
    assert!(handle.import_history(bytes).await.expect("import"));
    assert!(!handle.import_history(b"{}".to_vec()).await.expect("bad import"));

    let mut seen = Vec::new();
    while let Ok(Ok(evt)) = tokio::time::timeout(Duration::from_millis(200), sub.recv()).await {
        if !matches!(evt, HistoryEvent::Executed { .. }) {
            seen.push(evt);
        }
    }
    assert_eq!(
        seen,
        vec![
            HistoryEvent::ConfigUpdated,
            HistoryEvent::CleanupCompleted { evicted: 2, usage: 2 * 512, automatic: false },
            HistoryEvent::Cleared,
            HistoryEvent::Imported,
        ]
    );

    let state = handle.state().await.expect("state");
    assert_eq!(state.stats.total_operations, 4);
    assert_eq!(state.stats.evicted_entries, 2);

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test]
async fn calls_after_shutdown_report_closed_channel() {
    let handle = spawn();
    let other = handle.clone();
    handle.shutdown().await.expect("shutdown");

    assert!(matches!(other.state().await, Err(RuntimeError::ChannelClosed)));
    assert!(matches!(paint(&other, 0, 0).await, Err(RuntimeError::ChannelClosed)));
}

#[tokio::test(start_paused = true)]
async fn ticker_runs_auto_cleanup_once_threshold_passes() {
    let handle = spawn_history(auto_cleanup_engine(1), RuntimeConfig::default());
    let mut sub = handle.subscribe();
    for x in 0..3 {
        paint(&handle, x, 0).await.expect("paint");
    }

    tokio::time::sleep(Duration::from_secs(30)).await;
    let state = handle.state().await.expect("state");
    assert_eq!(state.stats.cleanup_runs, 0);
    assert_eq!(state.entry_count, 3);

    tokio::time::sleep(Duration::from_secs(90)).await;
    let state = handle.state().await.expect("state");
    assert!(state.stats.cleanup_runs >= 1);
    assert_eq!(state.entry_count, 2);
    assert_eq!(state.memory_usage, 2 * 512);

    let cleanups = automatic_cleanups(&mut sub);
    assert_eq!(cleanups.first(), Some(&(1, 2 * 512)));

    handle.shutdown().await.expect("shutdown");
}

#[tokio::test(start_paused = true)]
async fn check_interval_change_rebuilds_ticker() {
    let handle = spawn_history(auto_cleanup_engine(3600), RuntimeConfig::default());
    let mut sub = handle.subscribe();
    for x in 0..3 {
        paint(&handle, x, 0).await.expect("paint");
    }

    // Threshold has passed, but the hourly check has not fired yet.
    tokio::time::sleep(Duration::from_secs(120)).await;
    let state = handle.state().await.expect("state");
    assert_eq!(state.stats.cleanup_runs, 0);
    assert!(automatic_cleanups(&mut sub).is_empty());

    handle
        .update_config(ConfigPatch {
            auto_cleanup_check_interval_secs: Some(1),
            ..ConfigPatch::default()
        })
        .await
        .expect("config");
    tokio::time::sleep(Duration::from_secs(2)).await;

    let state = handle.state().await.expect("state");
    assert_eq!(state.entry_count, 2);
    assert_eq!(automatic_cleanups(&mut sub).first(), Some(&(1, 2 * 512)));

    handle.shutdown().await.expect("shutdown");
}
