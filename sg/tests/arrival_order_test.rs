//! Property tests for reply ordering in the gatherer

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;

use scattergather::{CollectPayloads, Gatherer, Message};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime")
}

proptest! {
    #[test]
    fn prop_aggregate_preserves_arrival_order(values in prop::collection::vec(any::<i64>(), 1..32)) {
        let expected = json!(values);
        let size = values.len();

        let result = runtime().block_on(async move {
            let gatherer = Gatherer::new(Arc::new(CollectPayloads));
            let mut released = None;
            for v in values {
                let mut reply = Message::new(json!(v)).correlated("k");
                reply.headers.sequence_size = Some(size);
                if let Some(result) = gatherer.on_reply(reply).await.unwrap() {
                    released = Some(result);
                }
            }
            released
        });

        let result = result.expect("group should release once every reply arrived");
        prop_assert_eq!(result.payload, expected);
    }

    #[test]
    fn prop_release_happens_exactly_once(size in 1usize..16, extra in 0usize..8) {
        let released = runtime().block_on(async move {
            let gatherer = Gatherer::new(Arc::new(CollectPayloads));
            let mut count = 0;
            for v in 0..size + extra {
                let mut reply = Message::new(json!(v)).correlated("k");
                reply.headers.sequence_size = Some(size);
                if gatherer.on_reply(reply).await.unwrap().is_some() {
                    count += 1;
                }
            }
            count
        });
        prop_assert_eq!(released, 1);
    }
}
