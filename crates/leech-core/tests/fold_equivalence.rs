// SPDX-License-Identifier: Apache-2.0
//! Fold equivalence over random table histories.
//!
//! For any sequence of states `s0 … sn` (starting from empty) and the
//! per-step deltas between them, folding a consecutive span of deltas must
//! have the same observable effect as the single delta computed across the
//! span. This is the property that makes a folded patch a faithful
//! substitute for the block span it replaces.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use std::collections::BTreeMap;

use leech_core::{Delta, DeltaKind};
use leech_json::{Object, Value};
use proptest::prelude::*;

/// A table state: key index → value index, over a small universe so that
/// consecutive states actually share, change, and drop keys.
type SparseState = BTreeMap<u8, u8>;

fn to_state(sparse: &SparseState) -> Value {
    let mut state = Object::new();
    for (key, value) in sparse {
        state.insert(
            format!("key-{key}").into_bytes(),
            Value::from(format!("value-{value}").as_str()),
        );
    }
    Value::Object(state)
}

fn arb_history() -> impl Strategy<Value = Vec<SparseState>> {
    prop::collection::vec(prop::collection::btree_map(0u8..8, 0u8..4, 0..8), 1..6)
}

/// Step deltas `d_i = delta(s_i, s_{i-1})`, with `s_{-1}` empty.
fn step_deltas(history: &[SparseState]) -> Vec<Delta> {
    let mut deltas = Vec::new();
    let mut previous = Value::Object(Object::new());
    for sparse in history {
        let current = to_state(sparse);
        deltas.push(
            Delta::compute("t", DeltaKind::Delta, &current, &previous).unwrap(),
        );
        previous = current;
    }
    deltas
}

/// Fold a span of step deltas newest-first, the way a chain walk does.
fn fold_span(deltas: &[Delta]) -> Delta {
    let mut span = deltas.to_vec();
    let mut folded = span.pop().unwrap();
    while let Some(parent) = span.pop() {
        folded.fold_parent(&parent).unwrap();
    }
    folded
}

fn sorted_keys(object: &Object) -> Vec<Vec<u8>> {
    let mut keys: Vec<Vec<u8>> = object.keys().map(<[u8]>::to_vec).collect();
    keys.sort();
    keys
}

proptest! {
    /// Folding the whole history equals a snapshot of the final state:
    /// everything surfaces as an insert, nothing else survives.
    #[test]
    fn folding_the_full_history_yields_pure_inserts(history in arb_history()) {
        let deltas = step_deltas(&history);
        let folded = fold_span(&deltas);

        let final_state = to_state(history.last().unwrap());
        let empty = Value::Object(Object::new());
        let direct =
            Delta::compute("t", DeltaKind::Delta, &final_state, &empty).unwrap();

        prop_assert_eq!(folded.inserts(), direct.inserts());
        prop_assert!(folded.deletes().is_empty());
        prop_assert!(folded.updates().is_empty());
    }

    /// Folding any suffix of the history equals the direct delta across it.
    #[test]
    fn folding_a_span_matches_the_direct_delta(
        history in arb_history(),
        split in 0usize..6,
    ) {
        prop_assume!(split < history.len());
        let deltas = step_deltas(&history);
        let folded = fold_span(&deltas[split..]);

        let from = if split == 0 {
            Value::Object(Object::new())
        } else {
            to_state(&history[split - 1])
        };
        let to = to_state(history.last().unwrap());
        let direct = Delta::compute("t", DeltaKind::Delta, &to, &from).unwrap();

        // Inserts agree exactly; deletes agree on keys (a folded delete may
        // carry an intermediate value as its old side).
        prop_assert_eq!(folded.inserts(), direct.inserts());
        prop_assert_eq!(sorted_keys(folded.deletes()), sorted_keys(direct.deletes()));

        // Every direct update appears in the fold with the same value. The
        // fold may carry extra updates for keys that were deleted and
        // re-inserted with their original value — observationally no-ops,
        // so they must restate the span-start value.
        let from_state = from.as_object().unwrap();
        for (key, value) in direct.updates().iter() {
            prop_assert_eq!(folded.updates().get(key), Some(value));
        }
        for (key, value) in folded.updates().iter() {
            if !direct.updates().contains_key(key) {
                prop_assert_eq!(from_state.get(key), Some(value));
            }
        }
    }

    /// The three key sets of a folded delta stay pairwise disjoint.
    #[test]
    fn folded_key_sets_stay_disjoint(history in arb_history()) {
        let deltas = step_deltas(&history);
        let folded = fold_span(&deltas);
        for key in folded.inserts().keys() {
            prop_assert!(!folded.deletes().contains_key(key));
            prop_assert!(!folded.updates().contains_key(key));
        }
        for key in folded.deletes().keys() {
            prop_assert!(!folded.updates().contains_key(key));
        }
    }
}
