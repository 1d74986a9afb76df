//! Property tests for debounce grouping.
//!
//! Drives the engine with random inter-arrival gaps on a paused clock and
//! checks that batches split exactly where a gap exceeded the window.

use std::{sync::Arc, time::Duration};

use grouprelay_core::{normalize, MemoryGroupStore, RealClock};
use grouprelay_delivery::{DebounceEngine, EngineConfig};
use grouprelay_testing::{MessageBuilder, RecordingSink};
use proptest::prelude::*;

const WINDOW_MS: u64 = 1_000;

/// Gaps well inside or well outside the window; arrivals landing on the
/// exact expiry instant race with the check and are excluded.
fn gap_strategy() -> impl Strategy<Value = u64> {
    prop_oneof![0..WINDOW_MS - 50, WINDOW_MS + 50..WINDOW_MS * 3]
}

fn expected_batches(gaps: &[u64]) -> Vec<Vec<String>> {
    let mut batches = vec![vec!["m0".to_string()]];
    for (i, gap) in gaps.iter().enumerate() {
        if *gap > WINDOW_MS {
            batches.push(Vec::new());
        }
        if let Some(batch) = batches.last_mut() {
            batch.push(format!("m{}", i + 1));
        }
    }
    batches
}

fn run_scenario(gaps: Vec<u64>) -> Vec<Vec<String>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .start_paused(true)
        .build()
        .unwrap();

    runtime.block_on(async move {
        let sink = RecordingSink::new();
        let engine = DebounceEngine::new(
            Arc::new(MemoryGroupStore::new()),
            Arc::new(sink.clone()),
            Arc::new(RealClock::new()),
            EngineConfig {
                debounce_window: Duration::from_millis(WINDOW_MS),
                sweep_interval: Duration::ZERO,
            },
        );

        let submit = |id: usize| {
            let update = MessageBuilder::photo(id as i64, format!("m{id}")).media_group("G");
            normalize(&update.build()).unwrap()
        };

        engine.submit(submit(0)).await.unwrap();
        for (i, gap) in gaps.iter().enumerate() {
            tokio::time::sleep(Duration::from_millis(*gap)).await;
            engine.submit(submit(i + 1)).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(WINDOW_MS * 2)).await;

        sink.deliveries().await.iter().map(|d| d.media_refs()).collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn batches_split_only_on_gaps_longer_than_the_window(
        gaps in prop::collection::vec(gap_strategy(), 0..12)
    ) {
        let expected = expected_batches(&gaps);
        let actual = run_scenario(gaps);
        prop_assert_eq!(actual, expected);
    }
}
