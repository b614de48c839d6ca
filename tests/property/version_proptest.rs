//! Property-based tests for document versioning

use diagramsync::backend::store::{DiagramStore, WriteOutcome};
use diagramsync::shared::{DiagramPatch, DiagramState, HistoryRetention, Shape, Sheet, SheetPatch};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
enum Write {
    Patch(String),
    Replace,
    Guarded { stale: bool },
}

fn write() -> impl Strategy<Value = Write> {
    prop_oneof![
        "[a-z]{1,4}".prop_map(Write::Patch),
        Just(Write::Replace),
        any::<bool>().prop_map(|stale| Write::Guarded { stale }),
    ]
}

fn empty_state() -> DiagramState {
    DiagramState {
        sheets: BTreeMap::from([("s1".to_string(), Sheet::default())]),
        ..DiagramState::default()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_versions_increase_by_one(writes in proptest::collection::vec(write(), 1..20)) {
        let observed: Vec<i64> = tokio_test::block_on(async {
            let store = DiagramStore::memory(Duration::from_secs(5), HistoryRetention::Retain);
            let actor = Some(Uuid::new_v4());
            let created = store.create(empty_state(), actor, actor).await.unwrap();
            let mut version = created.version;
            let mut observed = vec![version];

            for write in writes {
                let outcome = match write {
                    Write::Patch(shape) => {
                        let patch = DiagramPatch::sheet("s1", SheetPatch::with_shape(shape.clone(), Shape::new(shape)));
                        store.patch(created.id, &patch, None, actor).await.unwrap()
                    }
                    Write::Replace => store
                        .replace(created.id, empty_state(), actor)
                        .await
                        .unwrap()
                        .map(WriteOutcome::Committed),
                    Write::Guarded { stale } => {
                        let expected = if stale { version - 1 } else { version };
                        store
                            .replace_guarded(created.id, expected, empty_state(), actor)
                            .await
                            .unwrap()
                    }
                };

                match outcome.unwrap() {
                    WriteOutcome::Committed(diagram) => {
                        version = diagram.version;
                        observed.push(version);
                    }
                    WriteOutcome::Conflict(report) => {
                        assert_eq!(report.server_version, version);
                    }
                }
            }
            observed
        });

        prop_assert_eq!(observed[0], 1);
        for pair in observed.windows(2) {
            prop_assert_eq!(pair[1], pair[0] + 1);
        }
    }
}
