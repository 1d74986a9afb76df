//! Property-based tests for group store invariants.
//!
//! Drives the in-memory store with arbitrary interleavings of appends and
//! drains across a handful of keys and checks that every drained batch equals
//! exactly what was appended since the previous drain, in arrival order.

#![allow(clippy::unwrap_used)]

use std::collections::HashMap;

use grouprelay_core::{
    normalize, Fragment, GroupKey, GroupStore, InboundEvent, MemoryGroupStore, SenderInfo,
};
use proptest::{prelude::*, test_runner::Config as ProptestConfig};
use serde_json::json;

fn proptest_config() -> ProptestConfig {
    ProptestConfig {
        cases: 64,
        failure_persistence: None,
        source_file: None,
        ..ProptestConfig::default()
    }
}

#[derive(Debug, Clone)]
enum Op {
    Append { key: u8, media: String },
    Drain { key: u8 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u8..4, "[a-z0-9]{1,12}").prop_map(|(key, media)| Op::Append { key, media }),
        1 => (0u8..4).prop_map(|key| Op::Drain { key }),
    ]
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

proptest! {
    #![proptest_config(proptest_config())]

    #[test]
    fn drained_batches_match_appends_in_order(ops in prop::collection::vec(op_strategy(), 1..80)) {
        let rt = runtime();
        rt.block_on(async {
            let store = MemoryGroupStore::new();
            let mut model: HashMap<u8, Vec<Fragment>> = HashMap::new();
            let mut sequence = 0i64;

            for op in ops {
                match op {
                    Op::Append { key, media } => {
                        sequence += 1;
                        let fragment = Fragment::new(media, "", sequence);
                        let group = GroupKey::new(format!("g{key}"));
                        let count = store
                            .append(&group, fragment.clone(), &SenderInfo::new())
                            .await
                            .unwrap();

                        let expected = model.entry(key).or_default();
                        expected.push(fragment);
                        assert_eq!(count, expected.len());
                    },
                    Op::Drain { key } => {
                        let group = GroupKey::new(format!("g{key}"));
                        let drained = store.drain(&group).await.unwrap();
                        let expected = model.remove(&key).unwrap_or_default();

                        match drained {
                            Some(record) => assert_eq!(record.fragments, expected),
                            None => assert!(expected.is_empty()),
                        }
                    },
                }
            }

            for (key, expected) in model {
                let record = store.drain(&GroupKey::new(format!("g{key}"))).await.unwrap();
                assert_eq!(record.map(|r| r.fragments).unwrap_or_default(), expected);
            }

            assert_eq!(store.group_count(), 0);
        });
    }

    #[test]
    fn normalized_group_messages_keep_their_key(
        group in "[0-9]{1,18}",
        message_id in 1i64..1_000_000,
        caption in ".{0,64}",
    ) {
        let update = json!({
            "update_id": 1,
            "message": {
                "message_id": message_id,
                "media_group_id": group.clone(),
                "caption": caption.clone(),
                "photo": [{"file_id": "p", "width": 10, "height": 10}]
            }
        });

        let event: InboundEvent = normalize(&update).unwrap();
        prop_assert_eq!(event.group_key, Some(GroupKey::new(group)));
        prop_assert_eq!(event.fragment, Fragment::new("p", caption, message_id));
    }
}
