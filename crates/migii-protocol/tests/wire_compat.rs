// Verify the wire format dashboards already parse.

use migii_protocol::{ChangeEvent, ChangeMessage, ErrorBody, HealthResponse, OperationKind};

#[test]
fn change_message_shape() {
    let ev = ChangeEvent::new(
        "workers",
        OperationKind::Update,
        serde_json::json!({"id": "w-1", "status": "assigned"}),
    );
    let json = serde_json::to_value(ev.to_message()).unwrap();

    assert_eq!(json["type"], "change");
    assert_eq!(json["collection"], "workers");
    assert_eq!(json["operation"], "update");
    assert_eq!(json["document"]["status"], "assigned");
    // internal field name must not leak onto the wire
    assert!(json.get("full_document").is_none());
}

#[test]
fn change_message_parses_back_into_event() {
    let text = r#"{"type":"change","collection":"jobs","operation":"insert","document":{"id":"j-9"}}"#;
    let ev = ChangeMessage::parse(text).unwrap();
    assert_eq!(ev.collection, "jobs");
    assert_eq!(ev.operation, OperationKind::Insert);
    assert_eq!(ev.full_document["id"], "j-9");
}

#[test]
fn poll_batch_document_is_an_array() {
    let ev = ChangeEvent::new(
        "workers",
        OperationKind::Update,
        serde_json::json!([{"id": "a"}, {"id": "b"}]),
    );
    let text = serde_json::to_string(&ev.to_message()).unwrap();
    assert!(text.contains(r#""document":[{"id":"a"},{"id":"b"}]"#));
}

#[test]
fn malformed_text_is_an_error_not_a_panic() {
    assert!(ChangeMessage::parse("not json").is_err());
    assert!(ChangeMessage::parse(r#"{"type":"change"}"#).is_err());
}

#[test]
fn health_timestamp_is_iso8601() {
    let at = chrono::DateTime::parse_from_rfc3339("2026-03-01T12:30:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let json = serde_json::to_string(&HealthResponse::ok_at(at)).unwrap();
    assert_eq!(
        json,
        r#"{"status":"ok","timestamp":"2026-03-01T12:30:00.000Z"}"#
    );
}

#[test]
fn error_body_has_only_message() {
    let json = serde_json::to_string(&ErrorBody::new("phone already registered")).unwrap();
    assert_eq!(json, r#"{"message":"phone already registered"}"#);
}
