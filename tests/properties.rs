//! Property tests: classification totality, id round-trips, store invariants.

use proptest::prelude::*;
use serde_json::{json, Value};
use uuid::Uuid;

use lilith_mitm::core::correlation::{classify, extract_id, extract_method, with_id};
use lilith_mitm::core::models::{Direction, JsonRpcId, MessageKind, ProxyMessage, TransportKind};
use lilith_mitm::core::session::SessionStore;

/// Recursive strategy over arbitrary JSON documents.
fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        any::<f64>().prop_filter("finite", |f| f.is_finite()).prop_map(|f| json!(f)),
        "\\PC*".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 32, 8, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..8).prop_map(Value::Array),
            prop::collection::hash_map("\\PC*", inner, 0..8)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

fn arb_id() -> impl Strategy<Value = JsonRpcId> {
    prop_oneof![
        any::<i64>().prop_map(JsonRpcId::Number),
        "[a-zA-Z0-9_-]{1,32}".prop_map(JsonRpcId::String),
    ]
}

proptest! {
    /// The helpers are total: no JSON document makes them panic, and an
    /// envelope never classifies as more than one kind.
    #[test]
    fn classification_is_total(value in arb_json()) {
        let kind = classify(&value);
        let _ = extract_id(&value);
        let _ = extract_method(&value);

        if let Some(kind) = kind {
            match kind {
                MessageKind::Request => {
                    prop_assert!(extract_method(&value).is_some());
                }
                MessageKind::Notification => {
                    prop_assert!(extract_method(&value).is_some());
                    prop_assert!(extract_id(&value).is_none());
                }
                MessageKind::Response | MessageKind::Error => {
                    prop_assert!(extract_method(&value).is_none());
                }
            }
        }
    }

    /// String and integer ids round-trip through envelope substitution.
    #[test]
    fn ids_round_trip(id in arb_id(), method in "[a-z/]{1,24}") {
        let envelope = with_id(
            &json!({"jsonrpc": "2.0", "id": 0, "method": method}),
            &id,
        );
        prop_assert_eq!(classify(&envelope), Some(MessageKind::Request));
        prop_assert_eq!(extract_id(&envelope), Some(id));
    }

    /// Requests classify as requests, responses as responses, errors as
    /// errors, notifications as notifications.
    #[test]
    fn envelope_shapes_classify_correctly(id in arb_id(), method in "[a-z/]{1,24}") {
        let id_json = match &id {
            JsonRpcId::String(s) => json!(s),
            JsonRpcId::Number(n) => json!(n),
        };
        prop_assert_eq!(
            classify(&json!({"jsonrpc": "2.0", "id": id_json.clone(), "method": method.clone()})),
            Some(MessageKind::Request)
        );
        prop_assert_eq!(
            classify(&json!({"jsonrpc": "2.0", "id": id_json.clone(), "result": {}})),
            Some(MessageKind::Response)
        );
        prop_assert_eq!(
            classify(&json!({"jsonrpc": "2.0", "id": id_json,
                             "error": {"code": -32600, "message": "bad"}})),
            Some(MessageKind::Error)
        );
        prop_assert_eq!(
            classify(&json!({"jsonrpc": "2.0", "method": method})),
            Some(MessageKind::Notification)
        );
    }

    /// A present id must be a string, an integer, or null; any other shape
    /// invalidates the envelope instead of reclassifying it.
    #[test]
    fn malformed_ids_never_reclassify(method in "[a-z/]{1,24}") {
        prop_assert_eq!(
            classify(&json!({"jsonrpc": "2.0", "id": [1, 2], "method": method.clone()})),
            None
        );
        prop_assert_eq!(
            classify(&json!({"jsonrpc": "2.0", "id": {"nested": 1}, "method": method.clone()})),
            None
        );
        prop_assert_eq!(
            classify(&json!({"jsonrpc": "2.0", "id": 1.5, "method": method})),
            None
        );
    }

    /// Appended messages come back in order with their ids indexed.
    #[test]
    fn store_preserves_order_and_index(count in 1usize..32) {
        let store = SessionStore::new(TransportKind::Stdio, None, None);
        let mut ids = Vec::new();
        for sequence in 0..count {
            let raw = json!({"jsonrpc": "2.0", "method": "ping"});
            let msg = ProxyMessage {
                id: Uuid::new_v4(),
                sequence: sequence as u64,
                timestamp: chrono::Utc::now(),
                direction: Direction::ClientToServer,
                transport: TransportKind::Stdio,
                raw,
                jsonrpc_id: None,
                method: Some("ping".to_string()),
                correlated_id: None,
                modified: false,
                original_raw: None,
            };
            ids.push(msg.id);
            store.append(msg);
        }

        let messages = store.messages();
        prop_assert_eq!(messages.len(), count);
        for (i, msg) in messages.iter().enumerate() {
            prop_assert_eq!(msg.sequence, i as u64);
            prop_assert_eq!(msg.id, ids[i]);
            prop_assert_eq!(store.by_id(&msg.id).map(|m| m.id), Some(msg.id));
        }
    }
}

#[test]
fn error_members_require_code_and_message() {
    assert_eq!(
        classify(&json!({"jsonrpc": "2.0", "id": 1, "error": {"anything": true}})),
        None
    );
    assert_eq!(
        classify(&json!({"jsonrpc": "2.0", "id": 1, "error": "boom"})),
        None
    );
    assert_eq!(
        classify(&json!({"jsonrpc": "2.0", "id": 1,
                         "error": {"code": -32601, "message": "method not found"}})),
        Some(MessageKind::Error)
    );
    assert_eq!(
        classify(&json!({"jsonrpc": "2.0", "id": 1,
                         "error": {"code": -32000, "message": "x", "data": {"extra": true}}})),
        Some(MessageKind::Error)
    );
}

#[test]
fn null_ids_classify_but_never_extract() {
    let envelope = json!({"jsonrpc": "2.0", "id": null,
                          "error": {"code": -32700, "message": "parse error"}});
    assert_eq!(classify(&envelope), Some(MessageKind::Error));
    assert_eq!(extract_id(&envelope), None);
}
