use std::collections::{BTreeMap, HashSet};

use lix_core::branch::BranchView;
use lix_core::model::{NewChange, NewCommit};
use lix_core::resolve::{current_value, entity_history, value_at};
use lix_core::snapshot::content_id;
use lix_core::{History, HistoryStore, MemoryHistory};
use proptest::prelude::*;
use serde_json::{Value, json};

const BASE_TS_US: i64 = 1_708_012_200_000_000;

fn arb_content() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        any::<i32>().prop_map(|n| json!(n)),
        "[a-z]{0,6}".prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        Just(Value::Null),
    ];
    leaf.prop_recursive(2, 12, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
            prop::collection::btree_map("[a-c]", inner, 0..4)
                .prop_map(|m: BTreeMap<String, Value>| json!(m)),
        ]
    })
}

/// One edit: which entity, `Some(content)` or a deletion, and how far the
/// clock moves first (zero allowed).
fn arb_edit() -> impl Strategy<Value = (usize, Option<Value>, i64)> {
    (0..3usize, prop::option::weighted(0.8, arb_content()), 0..3i64)
}

fn apply(edits: &[(usize, Option<Value>, i64)]) -> MemoryHistory {
    let mut history = MemoryHistory::new();
    let mut ts = BASE_TS_US;
    for (entity, content, step) in edits {
        ts += step;
        let entity_id = format!("e{entity}");
        let change = match content {
            Some(content) => NewChange::set("variant", entity_id, content.clone(), "prop", ts),
            None => NewChange::delete("variant", entity_id, "prop", ts),
        };
        let head = history.active_branch().unwrap().head;
        history
            .write_commit(
                NewCommit::new(head.into_iter().collect(), "prop", "edit", ts),
                vec![change],
            )
            .unwrap();
    }
    history
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(256))]

    #[test]
    fn snapshots_deduplicate_by_content(contents in prop::collection::vec(arb_content(), 1..12)) {
        let mut history = MemoryHistory::new();
        let ids: HashSet<_> = contents
            .iter()
            .map(|content| history.put_snapshot(content.clone()).unwrap())
            .collect();
        let distinct: HashSet<_> = contents.iter().map(content_id).collect();
        prop_assert_eq!(ids.len(), distinct.len());
        prop_assert_eq!(history.snapshot_count(), distinct.len());
    }

    #[test]
    fn entity_history_is_newest_first(edits in prop::collection::vec(arb_edit(), 1..16)) {
        let history = apply(&edits);
        let view = BranchView::active(&history).unwrap();
        for entity in 0..3 {
            let changes = entity_history(&history, &format!("e{entity}"), &view).unwrap();
            for pair in changes.windows(2) {
                let newer = (view.commit_time(&pair[0].commit_id), pair[0].created_at_us, &pair[0].id);
                let older = (view.commit_time(&pair[1].commit_id), pair[1].created_at_us, &pair[1].id);
                prop_assert!(newer > older);
            }
        }
    }

    #[test]
    fn first_change_has_no_predecessor(edits in prop::collection::vec(arb_edit(), 1..16)) {
        let history = apply(&edits);
        let view = BranchView::active(&history).unwrap();
        for entity in 0..3 {
            let entity_id = format!("e{entity}");
            let changes = entity_history(&history, &entity_id, &view).unwrap();
            if let Some(oldest) = changes.last() {
                prop_assert_eq!(value_at(&history, &entity_id, oldest).unwrap(), None);
            }
            for pair in changes.windows(2) {
                let previous = value_at(&history, &entity_id, &pair[0]).unwrap();
                prop_assert_eq!(previous.as_ref(), Some(&pair[1]));
            }
        }
    }

    #[test]
    fn current_value_is_last_write(edits in prop::collection::vec(arb_edit(), 1..16)) {
        let history = apply(&edits);
        for entity in 0..3 {
            let expected = edits
                .iter()
                .rev()
                .find(|(e, _, _)| *e == entity)
                .and_then(|(_, content, _)| content.clone());
            let actual = current_value(&history, &format!("e{entity}")).unwrap();
            prop_assert_eq!(actual, expected);
        }
    }
}
