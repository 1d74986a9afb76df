//! Timing tests for the debounce engine.
//!
//! Every test runs on a paused Tokio clock so window arithmetic is exact and
//! the suite does not sleep in real time. The recording sink timestamps each
//! delivery with the virtual instant at which it happened.

use std::{sync::Arc, time::Duration};

use futures::future::join_all;
use grouprelay_core::{
    normalize, Fragment, GroupKey, GroupStore, InboundEvent, MemoryGroupStore, RealClock,
    SenderInfo,
};
use grouprelay_delivery::{
    CheckOutcome, DebounceEngine, DeliveryError, DispatchOutcome, EngineConfig, EngineStats,
    FlushDispatcher, Sink, SubmitOutcome,
};
use grouprelay_testing::{FailingSink, MessageBuilder, RecordingSink, UnavailableStore};
use tokio::time::{sleep, Instant};

const WINDOW: Duration = Duration::from_secs(3);
const WAIT: Duration = Duration::from_secs(60);
const SHUTDOWN: Duration = Duration::from_secs(10);

fn config() -> EngineConfig {
    EngineConfig {
        debounce_window: WINDOW,
        sweep_interval: Duration::ZERO,
    }
}

fn engine_with(store: Arc<dyn GroupStore>, sink: Arc<dyn Sink>) -> DebounceEngine {
    DebounceEngine::new(store, sink, Arc::new(RealClock::new()), config())
}

fn engine(sink: &RecordingSink) -> DebounceEngine {
    engine_with(Arc::new(MemoryGroupStore::new()), Arc::new(sink.clone()))
}

fn photo(group: &str, message_id: i64, file_id: &str) -> InboundEvent {
    normalize(&MessageBuilder::photo(message_id, file_id).media_group(group).build()).unwrap()
}

fn assert_close(actual: Duration, expected: Duration) {
    let tolerance = Duration::from_millis(50);
    assert!(
        actual >= expected && actual <= expected + tolerance,
        "expected ~{expected:?}, got {actual:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn album_flushes_once_after_last_fragment_goes_quiet() {
    let sink = RecordingSink::new();
    let engine = engine(&sink);
    let start = Instant::now();

    engine.submit(photo("G1", 1, "A")).await.unwrap();
    sleep(Duration::from_secs(1)).await;
    engine.submit(photo("G1", 2, "B")).await.unwrap();
    sleep(Duration::from_secs(1)).await;
    let outcome = engine.submit(photo("G1", 3, "C")).await.unwrap();
    assert_eq!(outcome, SubmitOutcome::Buffered { fragments: 3 });

    let deliveries = sink.wait_for(1, WAIT).await;
    assert_close(deliveries[0].at - start, Duration::from_secs(5));
    assert_eq!(deliveries[0].media_refs(), ["A", "B", "C"]);
    assert_eq!(deliveries[0].payload.group_key(), Some(&GroupKey::new("G1")));

    sleep(Duration::from_secs(10)).await;
    assert_eq!(sink.count().await, 1, "group must be delivered exactly once");

    let stats = engine.stats();
    assert_eq!(stats.fragments_buffered, 3);
    assert_eq!(stats.checks_scheduled, 3);
    assert_eq!(stats.checks_superseded, 2);
    assert_eq!(stats.groups_flushed, 1);
}

#[tokio::test(start_paused = true)]
async fn window_restarts_on_every_fragment() {
    let sink = RecordingSink::new();
    let engine = engine(&sink);
    let start = Instant::now();

    // Gaps just under the window keep the group open far past one window.
    for (i, file) in ["A", "B", "C", "D", "E"].iter().enumerate() {
        engine.submit(photo("G1", i as i64, file)).await.unwrap();
        sleep(Duration::from_millis(2_900)).await;
    }

    assert_eq!(sink.count().await, 0);

    let deliveries = sink.wait_for(1, WAIT).await;
    assert_close(deliveries[0].at - start, Duration::from_millis(4 * 2_900 + 3_000));
    assert_eq!(deliveries[0].media_refs().len(), 5);
}

#[tokio::test(start_paused = true)]
async fn single_fragment_group_flushes_after_one_window() {
    let sink = RecordingSink::new();
    let engine = engine(&sink);
    let start = Instant::now();

    engine.submit(photo("solo", 1, "A")).await.unwrap();

    let deliveries = sink.wait_for(1, WAIT).await;
    assert_close(deliveries[0].at - start, WINDOW);
    assert_eq!(deliveries[0].media_refs(), ["A"]);
}

#[tokio::test(start_paused = true)]
async fn batch_keeps_arrival_order_and_first_sender() {
    let sink = RecordingSink::new();
    let engine = engine(&sink);

    let first =
        MessageBuilder::photo(30, "A").media_group("G1").caption("trip").from_user(1, "Ann");
    let second = MessageBuilder::photo(10, "B").media_group("G1").from_user(2, "Bob");

    engine.submit(normalize(&first.build()).unwrap()).await.unwrap();
    engine.submit(normalize(&second.build()).unwrap()).await.unwrap();

    let deliveries = sink.wait_for(1, WAIT).await;
    let payload = serde_json::to_value(&deliveries[0].payload).unwrap();

    assert_eq!(payload["groupKey"], "G1");
    assert_eq!(payload["fragments"][0]["mediaRef"], "A");
    assert_eq!(payload["fragments"][0]["caption"], "trip");
    assert_eq!(payload["fragments"][0]["sequenceId"], 30);
    assert_eq!(payload["fragments"][1]["mediaRef"], "B");
    assert_eq!(payload["fragments"][1]["caption"], "");
    assert_eq!(payload["senderInfo"]["from"]["first_name"], "Ann");
}

#[tokio::test(start_paused = true)]
async fn interleaved_groups_flush_independently() {
    let sink = RecordingSink::new();
    let engine = engine(&sink);
    let start = Instant::now();

    engine.submit(photo("G1", 1, "a1")).await.unwrap();
    engine.submit(photo("G2", 2, "b1")).await.unwrap();
    sleep(Duration::from_secs(2)).await;
    engine.submit(photo("G2", 3, "b2")).await.unwrap();
    engine.submit(photo("G1", 4, "a2")).await.unwrap();
    sleep(Duration::from_secs(1)).await;
    engine.submit(photo("G2", 5, "b3")).await.unwrap();

    let deliveries = sink.wait_for(2, WAIT).await;

    assert_eq!(deliveries[0].payload.group_key(), Some(&GroupKey::new("G1")));
    assert_eq!(deliveries[0].media_refs(), ["a1", "a2"]);
    assert_close(deliveries[0].at - start, Duration::from_secs(5));

    assert_eq!(deliveries[1].payload.group_key(), Some(&GroupKey::new("G2")));
    assert_eq!(deliveries[1].media_refs(), ["b1", "b2", "b3"]);
    assert_close(deliveries[1].at - start, Duration::from_secs(6));
}

#[tokio::test(start_paused = true)]
async fn late_fragment_starts_a_new_batch() {
    let sink = RecordingSink::new();
    let engine = engine(&sink);

    engine.submit(photo("G1", 1, "A")).await.unwrap();
    sink.wait_for(1, WAIT).await;

    let outcome = engine.submit(photo("G1", 2, "B")).await.unwrap();
    assert_eq!(outcome, SubmitOutcome::Buffered { fragments: 1 });

    let deliveries = sink.wait_for(2, WAIT).await;
    assert_eq!(deliveries[0].media_refs(), ["A"]);
    assert_eq!(deliveries[1].media_refs(), ["B"]);
}

#[tokio::test(start_paused = true)]
async fn ungrouped_events_bypass_the_store() {
    let sink = RecordingSink::new();
    let engine = engine_with(Arc::new(UnavailableStore), Arc::new(sink.clone()));
    let start = Instant::now();

    let event = normalize(&MessageBuilder::text(9, "hello").build()).unwrap();
    assert_eq!(engine.submit(event).await.unwrap(), SubmitOutcome::Forwarded);

    let deliveries = sink.wait_for(1, WAIT).await;
    assert!(deliveries[0].at - start < Duration::from_millis(50));

    let payload = serde_json::to_value(&deliveries[0].payload).unwrap();
    assert_eq!(payload["single"], true);
    assert_eq!(payload["fragment"]["mediaRef"], "");
    assert_eq!(payload["raw"]["text"], "hello");

    let stats = engine.stats();
    assert_eq!(stats.singles_forwarded, 1);
    assert_eq!(stats.store_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn store_outage_rejects_grouped_events_without_panicking() {
    let sink = RecordingSink::new();
    let engine = engine_with(Arc::new(UnavailableStore), Arc::new(sink.clone()));

    let err = engine.submit(photo("G1", 1, "A")).await.unwrap_err();
    assert!(matches!(err, DeliveryError::StoreError { .. }), "got {err}");

    sleep(WINDOW * 2).await;
    assert_eq!(sink.count().await, 0);
    assert_eq!(engine.stats().store_failures, 1);
    assert_eq!(engine.stats().checks_scheduled, 0);
}

#[tokio::test(start_paused = true)]
async fn failed_delivery_drops_the_batch() {
    let sink = FailingSink::new(500);
    let store = MemoryGroupStore::new();
    let engine = engine_with(Arc::new(store.clone()), Arc::new(sink.clone()));

    engine.submit(photo("G1", 1, "A")).await.unwrap();
    engine.submit(photo("G1", 2, "B")).await.unwrap();

    sleep(WINDOW * 5).await;

    assert_eq!(sink.attempts().await.len(), 1, "failed batches are not retried");
    assert_eq!(store.group_count(), 0, "drained data is not re-enqueued");

    let stats = engine.stats();
    assert_eq!(stats.delivery_failures, 1);
    assert_eq!(stats.groups_flushed, 0);
}

#[tokio::test(start_paused = true)]
async fn check_is_a_noop_while_marker_is_live() {
    let sink = RecordingSink::new();
    let engine = engine(&sink);
    let key = GroupKey::new("G1");

    engine.submit(photo("G1", 1, "A")).await.unwrap();
    assert_eq!(engine.check(&key).await, CheckOutcome::Superseded);

    sink.wait_for(1, WAIT).await;
    assert_eq!(engine.check(&key).await, CheckOutcome::AlreadyDrained);
}

#[tokio::test(start_paused = true)]
async fn shutdown_flushes_pending_groups_immediately() {
    let sink = RecordingSink::new();
    let engine = engine(&sink);
    let start = Instant::now();

    engine.submit(photo("G1", 1, "A")).await.unwrap();
    engine.submit(photo("G1", 2, "B")).await.unwrap();
    engine.submit(photo("G2", 3, "C")).await.unwrap();
    sleep(Duration::from_secs(1)).await;

    engine.shutdown(SHUTDOWN).await.unwrap();

    let deliveries = sink.deliveries().await;
    assert_eq!(deliveries.len(), 2);
    for delivery in &deliveries {
        assert_close(delivery.at - start, Duration::from_secs(1));
    }
    assert_eq!(engine.in_flight(), 0);

    let err = engine.submit(photo("G3", 4, "D")).await.unwrap_err();
    assert!(matches!(err, DeliveryError::ShutdownRequested));
}

#[tokio::test(start_paused = true)]
async fn shutdown_reports_tasks_that_outlive_the_timeout() {
    let sink = RecordingSink::new().with_delay(Duration::from_secs(120));
    let engine = engine(&sink);

    let event = normalize(&MessageBuilder::text(1, "slow").build()).unwrap();
    engine.submit(event).await.unwrap();

    let err = engine.shutdown(Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(err, DeliveryError::ShutdownTimeout { pending: 1 }), "got {err}");
}

#[tokio::test(start_paused = true)]
async fn sweeper_recovers_groups_without_a_pending_check() {
    let sink = RecordingSink::new();
    let store = MemoryGroupStore::new();
    let engine = DebounceEngine::new(
        Arc::new(store.clone()),
        Arc::new(sink.clone()),
        Arc::new(RealClock::new()),
        EngineConfig { sweep_interval: Duration::from_secs(10), ..config() },
    );

    // Buffered by a previous process whose checks died with it.
    let key = GroupKey::new("orphan");
    store.append(&key, Fragment::new("A", "", 1), &SenderInfo::new()).await.unwrap();
    store.append(&key, Fragment::new("B", "", 2), &SenderInfo::new()).await.unwrap();

    engine.start();

    let deliveries = sink.wait_for(1, WAIT).await;
    assert_eq!(deliveries[0].media_refs(), ["A", "B"]);
    assert_eq!(engine.stats().groups_recovered, 1);

    engine.shutdown(SHUTDOWN).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn sweep_leaves_open_groups_alone() {
    let sink = RecordingSink::new();
    let engine = engine(&sink);

    engine.submit(photo("G1", 1, "A")).await.unwrap();
    assert_eq!(engine.sweep().await, 0);

    sink.wait_for(1, WAIT).await;
    assert_eq!(engine.stats().groups_recovered, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_dispatches_deliver_exactly_once() {
    let sink = RecordingSink::new();
    let store = MemoryGroupStore::new();
    let dispatcher = FlushDispatcher::new(
        Arc::new(store.clone()),
        Arc::new(sink.clone()),
        Arc::new(RealClock::new()),
        Arc::new(EngineStats::default()),
    );

    let key = GroupKey::new("G1");
    for i in 0..5 {
        let fragment = Fragment::new(format!("m{i}"), "", i);
        store.append(&key, fragment, &SenderInfo::new()).await.unwrap();
    }

    let attempts = (0..8).map(|_| {
        let dispatcher = dispatcher.clone();
        let key = key.clone();
        tokio::spawn(async move { dispatcher.dispatch(&key).await.unwrap() })
    });
    let outcomes: Vec<_> = join_all(attempts).await.into_iter().map(Result::unwrap).collect();

    let delivered: Vec<_> =
        outcomes.iter().filter(|o| matches!(o, DispatchOutcome::Delivered { .. })).collect();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0], &DispatchOutcome::Delivered { fragments: 5, status_code: 200 });
    assert_eq!(sink.count().await, 1);
}
