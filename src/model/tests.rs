use super::*;

#[test]
fn test_decode_camel_case_event() {
    let payload = br#"{"id":"e1","productId":"p1","qty":2,"createdAt":"2024-01-01T00:00:00Z"}"#;
    let event = OrderCreated::decode(payload).unwrap();

    assert_eq!(event.id, "e1");
    assert_eq!(event.product_id, "p1");
    assert_eq!(event.qty, 2);
    assert_eq!(event.created_at, "2024-01-01T00:00:00Z");
}

#[test]
fn test_decode_accepts_field_aliases() {
    let snake = br#"{"id":"e1","product_id":"p1","qty":1,"created_at":"2024-01-01T00:00:00Z"}"#;
    assert_eq!(OrderCreated::decode(snake).unwrap().product_id, "p1");

    let legacy = br#"{"id":"e1","productID":"p9","qty":1,"createdAt":"2024-01-01T00:00:00Z"}"#;
    assert_eq!(OrderCreated::decode(legacy).unwrap().product_id, "p9");
}

#[test]
fn test_decode_accepts_both_spellings_in_one_payload() {
    let payload = br#"{"id":"e1","productId":"p1","product_id":"p1","qty":1,"createdAt":"2024-01-01T00:00:00Z","created_at":"2024-01-01T00:00:00Z"}"#;
    let event = OrderCreated::decode(payload).unwrap();

    assert_eq!(event.product_id, "p1");
    assert_eq!(event.created_at, "2024-01-01T00:00:00Z");
}

#[test]
fn test_decode_prefers_camel_case_spelling() {
    let payload = br#"{"id":"e1","product_id":"snake","productId":"camel","qty":1,"created_at":"2023-06-01T00:00:00Z","createdAt":"2024-01-01T00:00:00Z"}"#;
    let event = OrderCreated::decode(payload).unwrap();

    assert_eq!(event.product_id, "camel");
    assert_eq!(event.created_at, "2024-01-01T00:00:00Z");
}

#[test]
fn test_decode_falls_back_when_camel_case_is_empty() {
    let payload = br#"{"id":"e1","productId":"","product_id":"p1","qty":1,"createdAt":"2024-01-01T00:00:00Z"}"#;
    assert_eq!(OrderCreated::decode(payload).unwrap().product_id, "p1");
}

#[test]
fn test_decode_ignores_unknown_fields() {
    let payload = br#"{"id":"e1","productId":"p1","qty":1,"createdAt":"2024-01-01T00:00:00Z","source":"web","v":3}"#;
    assert!(OrderCreated::decode(payload).is_ok());
}

#[test]
fn test_decode_rejects_missing_fields() {
    let cases: [(&[u8], &str); 4] = [
        (br#"{"productId":"p1","qty":1,"createdAt":"2024-01-01T00:00:00Z"}"#, "id"),
        (br#"{"id":"e1","qty":1,"createdAt":"2024-01-01T00:00:00Z"}"#, "productId"),
        (br#"{"id":"e1","productId":"p1","createdAt":"2024-01-01T00:00:00Z"}"#, "qty"),
        (br#"{"id":"e1","productId":"p1","qty":1}"#, "createdAt"),
    ];

    for (payload, field) in cases {
        match OrderCreated::decode(payload) {
            Err(EventDecodeError::MissingField(f)) => assert_eq!(f, field),
            other => panic!("expected missing {field}, got {other:?}"),
        }
    }
}

#[test]
fn test_decode_rejects_empty_id() {
    let payload = br#"{"id":"  ","productId":"p1","qty":1,"createdAt":"2024-01-01T00:00:00Z"}"#;
    assert!(matches!(
        OrderCreated::decode(payload),
        Err(EventDecodeError::MissingField("id"))
    ));
}

#[test]
fn test_decode_rejects_non_json() {
    assert!(matches!(
        OrderCreated::decode(b"not json"),
        Err(EventDecodeError::Json(_))
    ));
}

#[test]
fn test_decode_rejects_non_integer_qty() {
    let payload = br#"{"id":"e1","productId":"p1","qty":"two","createdAt":"2024-01-01T00:00:00Z"}"#;
    assert!(matches!(
        OrderCreated::decode(payload),
        Err(EventDecodeError::Json(_))
    ));
}

#[test]
fn test_timestamp_parses_rfc3339_with_offset() {
    let mut event = OrderCreated::new("p1", 1);
    event.created_at = "2024-01-01T02:00:00+02:00".to_string();

    let ts = event.timestamp().unwrap();
    assert_eq!(ts.to_rfc3339(), "2024-01-01T00:00:00+00:00");
}

#[test]
fn test_timestamp_rejects_garbage() {
    let mut event = OrderCreated::new("p1", 1);
    event.created_at = "yesterday".to_string();

    assert!(matches!(
        event.timestamp(),
        Err(EventDecodeError::InvalidTimestamp { .. })
    ));
}

#[test]
fn test_new_event_is_decodable() {
    let event = OrderCreated::new("p1", 3);
    let decoded = OrderCreated::decode(&event.encode().unwrap()).unwrap();

    assert_eq!(decoded, event);
    assert!(decoded.timestamp().is_ok());
}

#[test]
fn test_new_events_have_distinct_ids() {
    let a = OrderCreated::new("p1", 1);
    let b = OrderCreated::new("p1", 1);
    assert_ne!(a.id, b.id);
}

#[test]
fn test_materialized_order_keeps_event_id() {
    let event = OrderCreated::new("p1", 2);
    let order = Order::materialize(&event, event.timestamp().unwrap());

    assert_eq!(order.event_id, event.id);
    assert_ne!(order.id, event.id);
    assert_eq!(order.product_id, "p1");
    assert_eq!(order.qty, 2);
}

#[test]
fn test_order_json_uses_camel_case() {
    let event = OrderCreated::new("p1", 2);
    let order = Order::provisional(&event, event.timestamp().unwrap());
    let json = serde_json::to_value(&order).unwrap();

    assert_eq!(json["eventId"], event.id);
    assert_eq!(json["productId"], "p1");
    assert!(json["createdAt"].is_string());
}
