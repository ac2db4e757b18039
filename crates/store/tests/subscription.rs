#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use gatesync_store::{handle_subscription, ErrorSink, Metadata, Watchable};
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handler_sees_updates_sequentially_until_close() {
    let w: Arc<Watchable<String, u32>> = Arc::new(Watchable::new());
    w.store("a".to_string(), 1);
    let sub = w.subscribe();
    w.store("a".to_string(), 2);
    w.delete(&"a".to_string());
    w.close();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen2 = Arc::clone(&seen);
    handle_subscription(Metadata::new("test", "numbers"), sub, CancellationToken::new(), move |u, _errs| {
        seen2.lock().unwrap().push((u.key.clone(), u.value.as_deref().copied(), u.is_delete()));
    })
    .await;

    let seen = seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            ("a".to_string(), Some(1), false),
            ("a".to_string(), Some(2), false),
            ("a".to_string(), None, true),
        ]
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancellation_stops_waiting_loop() {
    let w: Watchable<String, u32> = Watchable::new();
    let sub = w.subscribe();
    let cancel = CancellationToken::new();
    let task = tokio::spawn(handle_subscription(Metadata::new("test", "idle"), sub, cancel.clone(), |_u, _e| {}));
    tokio::time::sleep(Duration::from_millis(10)).await;
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("loop exits after cancel")
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn error_sink_never_blocks_when_full() {
    let (sink, mut rx) = ErrorSink::channel(Metadata::new("test", "errors"), 2);
    for i in 0..10 {
        sink.report(anyhow::anyhow!("failure {i}"));
    }
    let mut received = 0;
    while rx.try_recv().is_ok() {
        received += 1;
    }
    assert_eq!(received, 2, "overflow is dropped, not queued");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn handler_errors_do_not_stop_the_loop() {
    let w: Watchable<String, u32> = Watchable::new();
    let sub = w.subscribe();
    for i in 0..5u32 {
        w.store(format!("k{i}"), i);
    }
    w.close();
    let mut count = 0;
    handle_subscription(Metadata::new("test", "errs"), sub, CancellationToken::new(), |u, errs| {
        count += 1;
        errs.report(anyhow::anyhow!("bad {}", u.key));
    })
    .await;
    assert_eq!(count, 5);
}
