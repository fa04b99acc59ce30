mod common;

use common::{created, object, updated};
use entityfold::changeset::{apply, diff};
use entityfold::snapshot::fold;
use entityfold::{
    changed_columns, CreateEntity, CursorGenerator, EntityStore, Event, UpdateEntity,
};
use proptest::prelude::*;
use serde_json::{Map, Value};
use std::collections::HashSet;

fn arb_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        (-1000i64..1000).prop_map(Value::from),
        "[a-z]{0,6}".prop_map(Value::String),
    ]
}

/// Arbitrary JSON without nulls. Null stands for "absent" in changesets, so
/// it is left out of values that must survive a diff round trip.
fn arb_value() -> impl Strategy<Value = Value> {
    arb_leaf().prop_recursive(4, 48, 6, |inner| {
        prop_oneof![
            proptest::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            proptest::collection::btree_map("[a-e]", inner, 0..5)
                .prop_map(|fields| Value::Object(fields.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

fn arb_object() -> impl Strategy<Value = Value> {
    proptest::collection::btree_map("[a-f]", arb_value(), 0..6)
        .prop_map(|fields| Value::Object(fields.into_iter().collect::<Map<_, _>>()))
}

fn history(states: &[Value]) -> Vec<Event> {
    let cursors = CursorGenerator::new();
    let mut events = vec![created(&cursors, "Doc", "d-1", states[0].clone())];
    for pair in states.windows(2) {
        events.push(updated(&cursors, "Doc", "d-1", &pair[0], &pair[1]));
    }
    events
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

// For any two objects, applying their diff to the first yields the second.
proptest! {
    #[test]
    fn prop_diff_apply_round_trip(old in arb_object(), new in arb_object()) {
        prop_assert_eq!(apply(&diff(&old, &new), &old), new);
    }
}

// Any value is rebuilt from nothing by its creation diff.
proptest! {
    #[test]
    fn prop_diff_from_null_round_trip(value in arb_value()) {
        prop_assert_eq!(apply(&diff(&Value::Null, &value), &Value::Null), value);
    }
}

// Diffing a value against itself produces no operations.
proptest! {
    #[test]
    fn prop_diff_of_equal_values_is_empty(value in arb_value()) {
        prop_assert!(diff(&value, &value.clone()).is_empty());
    }
}

// Folding any prefix then applying the next changeset equals folding the
// longer prefix, and the full fold is the final state.
proptest! {
    #[test]
    fn prop_fold_prefix_idempotent(states in proptest::collection::vec(arb_object(), 1..8)) {
        let events = history(&states);
        for k in 1..events.len() {
            let changeset = events[k].changeset.as_ref().unwrap();
            prop_assert_eq!(apply(changeset, &fold(&events[..k])), fold(&events[..=k]));
        }
        prop_assert_eq!(&fold(&events), states.last().unwrap());
    }
}

// Changed columns are unique and each names a key present before or after.
proptest! {
    #[test]
    fn prop_changed_columns_unique_and_relevant(old in arb_object(), new in arb_object()) {
        let cursors = CursorGenerator::new();
        let event = updated(&cursors, "Doc", "d-1", &old, &new);
        let columns = changed_columns(&event);

        let unique: HashSet<_> = columns.iter().collect();
        prop_assert_eq!(unique.len(), columns.len());
        for column in &columns {
            prop_assert!(old.get(column) != new.get(column), "{} did not change", column);
        }
    }
}

// Cursors from one generator are strictly increasing.
proptest! {
    #[test]
    fn prop_cursors_strictly_increase(count in 1usize..500) {
        let cursors = CursorGenerator::new();
        let emitted: Vec<_> = (0..count).map(|_| cursors.next().0).collect();
        prop_assert!(emitted.windows(2).all(|w| w[0] < w[1]));
    }
}

// Any sequence of updates through the store ends in the shallow merge of
// all payloads.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]
    #[test]
    fn prop_store_state_is_shallow_merge(
        initial in arb_object(),
        updates in proptest::collection::vec(arb_object(), 0..6),
    ) {
        let (actual, expected) = runtime().block_on(async {
            let store = EntityStore::in_memory();
            let event = store
                .create_entity(CreateEntity::new("Doc", object(initial.clone())))
                .await
                .unwrap();

            let mut expected = object(initial);
            for update in updates {
                let fields = object(update);
                expected.extend(fields.clone());
                store
                    .update_entity(UpdateEntity::new("Doc", &event.entity_id, fields))
                    .await
                    .unwrap();
            }

            let snapshot = store
                .get_entity_data("Doc", &event.entity_id, None)
                .await
                .unwrap()
                .unwrap();
            (snapshot.data, expected)
        });
        prop_assert_eq!(actual, expected);
    }
}
