// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Property tests for the framed codec.

use crate::envelope::{Envelope, EnvelopeKind};
use crate::frame::{decode, encode};
use proptest::prelude::*;

fn arb_json() -> impl Strategy<Value = serde_json::Value> {
    let leaf = prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::Bool),
        any::<i64>().prop_map(|n| serde_json::json!(n)),
        "[a-z0-9 ]{0,24}".prop_map(serde_json::Value::String),
    ];
    leaf.prop_recursive(3, 16, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..4)
                .prop_map(|m| serde_json::Value::Object(m.into_iter().collect())),
        ]
    })
}

fn arb_envelope() -> impl Strategy<Value = Envelope> {
    prop_oneof![
        "[a-z.]{1,24}".prop_map(Envelope::subscribe),
        "[a-z.]{1,24}".prop_map(Envelope::unsubscribe),
        (any::<u64>(), "[a-z_]{1,16}", arb_json())
            .prop_map(|(id, method, params)| Envelope::request(id, method, params)),
        (any::<u64>(), arb_json()).prop_map(|(id, result)| Envelope::response_ok(id, result)),
        ("[a-z.]{1,24}", arb_json()).prop_map(|(topic, payload)| Envelope::event(topic, payload)),
    ]
}

proptest! {
    #[test]
    fn encode_decode_round_trips(envelope in arb_envelope()) {
        let bytes = encode(&envelope).unwrap();
        let (decoded, consumed) = decode(&bytes).unwrap().unwrap();
        prop_assert_eq!(consumed, bytes.len());
        prop_assert_eq!(decoded, envelope);
    }

    #[test]
    fn decode_never_panics_on_garbage(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let _ = decode(&bytes);
    }

    #[test]
    fn back_to_back_frames_decode_in_order(a in arb_envelope(), b in arb_envelope()) {
        let mut bytes = encode(&a).unwrap();
        bytes.extend(encode(&b).unwrap());
        let (first, consumed) = decode(&bytes).unwrap().unwrap();
        prop_assert_eq!(&first.kind, &a.kind);
        let (second, _) = decode(&bytes[consumed..]).unwrap().unwrap();
        prop_assert_eq!(second, b);
    }
}
