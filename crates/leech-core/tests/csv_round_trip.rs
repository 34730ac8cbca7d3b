// SPDX-License-Identifier: Apache-2.0
//! Round-trip property for the CSV codec: composing any table and parsing
//! it back reproduces the table, whatever bytes the fields carry.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use leech_core::csv::{compose_record, compose_table, parse_record, parse_table};
use proptest::prelude::*;

fn arb_field() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..16)
}

fn arb_record() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(arb_field(), 1..6)
}

proptest! {
    #[test]
    fn record_compose_parse_round_trips(record in arb_record()) {
        let bytes = compose_record(&record);
        prop_assert_eq!(parse_record(&bytes).unwrap(), record);
    }

    #[test]
    fn table_compose_parse_round_trips(table in prop::collection::vec(arb_record(), 1..8)) {
        let bytes = compose_table(&table);
        prop_assert_eq!(parse_table(&bytes).unwrap(), table);
    }

    #[test]
    fn parse_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        // Arbitrary input must fail cleanly or parse, never panic.
        let _ = parse_table(&bytes);
    }
}
