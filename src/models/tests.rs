use serde_json::json;
use std::time::Duration;

use super::*;

// ==================== ConnectionOptions Tests ====================

#[test]
fn test_connection_options_default() {
    let opts = ConnectionOptions::default();

    assert_eq!(opts.server_url, DEFAULT_SERVER_URL);
    assert_eq!(opts.origin, DEFAULT_ORIGIN);
    assert!(opts.auto_reconnect, "auto_reconnect should default to true");
    assert_eq!(opts.reconnect_delay_ms, 1000, "reconnect_delay_ms should default to 1000");
    assert_eq!(
        opts.max_reconnect_delay_ms, 30000,
        "max_reconnect_delay_ms should default to 30000"
    );
    assert!(
        opts.max_reconnect_attempts.is_none(),
        "max_reconnect_attempts should default to None (infinite)"
    );
}

#[test]
fn test_connection_options_builder_pattern() {
    let opts = ConnectionOptions::new()
        .with_server_url("ws://127.0.0.1:9000")
        .with_origin("http://localhost")
        .with_auto_reconnect(false)
        .with_reconnect_delay_ms(2000)
        .with_max_reconnect_delay_ms(60000)
        .with_max_reconnect_attempts(Some(5));

    assert_eq!(opts.server_url, "ws://127.0.0.1:9000");
    assert_eq!(opts.origin, "http://localhost");
    assert!(!opts.auto_reconnect);
    assert_eq!(opts.reconnect_delay_ms, 2000);
    assert_eq!(opts.max_reconnect_delay_ms, 60000);
    assert_eq!(opts.max_reconnect_attempts, Some(5));
}

#[test]
fn test_reconnect_delay_backoff_is_capped() {
    let opts = ConnectionOptions::new()
        .with_reconnect_delay_ms(100)
        .with_max_reconnect_delay_ms(1000);

    assert_eq!(opts.reconnect_delay(0), Duration::from_millis(100));
    assert_eq!(opts.reconnect_delay(1), Duration::from_millis(200));
    assert_eq!(opts.reconnect_delay(3), Duration::from_millis(800));
    assert_eq!(opts.reconnect_delay(4), Duration::from_millis(1000));
    // Large attempt counts must saturate, not overflow
    assert_eq!(opts.reconnect_delay(200), Duration::from_millis(1000));
}

#[test]
fn test_may_reconnect_respects_budget() {
    let unlimited = ConnectionOptions::new();
    assert!(unlimited.may_reconnect(0));
    assert!(unlimited.may_reconnect(10_000));

    let bounded = ConnectionOptions::new().with_max_reconnect_attempts(Some(2));
    assert!(bounded.may_reconnect(0));
    assert!(bounded.may_reconnect(1));
    assert!(!bounded.may_reconnect(2));

    let disabled = ConnectionOptions::new().with_max_reconnect_attempts(Some(0));
    assert!(!disabled.may_reconnect(0));

    let off = ConnectionOptions::new().with_auto_reconnect(false);
    assert!(!off.may_reconnect(0));
}

#[test]
fn test_connection_options_deserialize_partial() {
    let opts: ConnectionOptions =
        serde_json::from_value(json!({ "max_reconnect_attempts": 3 })).unwrap();

    assert_eq!(opts.server_url, DEFAULT_SERVER_URL);
    assert!(opts.auto_reconnect);
    assert_eq!(opts.max_reconnect_attempts, Some(3));
}

// ==================== Wire message Tests ====================

#[test]
fn test_handshake_wire_format() {
    let msg = ClientMessage::handshake("griffpatch", 10128407);
    let value: serde_json::Value = serde_json::to_value(&msg).unwrap();

    assert_eq!(
        value,
        json!({ "method": "handshake", "user": "griffpatch", "project_id": "10128407" })
    );
}

#[test]
fn test_set_wire_format_uses_numeric_project_id() {
    let msg = ClientMessage::set("griffpatch", "☁ score", "42", 10128407);
    let value: serde_json::Value = serde_json::to_value(&msg).unwrap();

    assert_eq!(
        value,
        json!({
            "method": "set",
            "user": "griffpatch",
            "name": "☁ score",
            "value": "42",
            "project_id": 10128407
        })
    );
}

#[test]
fn test_to_line_is_minified_and_newline_terminated() {
    let line = ClientMessage::set("a", "☁ x", "1", 1).to_line().unwrap();

    assert!(line.ends_with('\n'));
    assert_eq!(line.matches('\n').count(), 1);
    assert!(!line.contains(": "), "line should be minified: {}", line);
}

#[test]
fn test_server_set_with_string_value() {
    let msg: ServerMessage =
        serde_json::from_str(r#"{"method":"set","name":"☁ score","value":"17"}"#).unwrap();

    assert_eq!(msg.into_update(), Some(VariableUpdate::new("☁ score", "17")));
}

#[test]
fn test_server_set_with_numeric_value_is_stringified() {
    let msg: ServerMessage =
        serde_json::from_str(r#"{"method":"set","name":"☁ score","value":17.5}"#).unwrap();

    assert_eq!(msg.into_update(), Some(VariableUpdate::new("☁ score", "17.5")));
}

#[test]
fn test_server_unknown_method_is_inert() {
    let msg: ServerMessage =
        serde_json::from_str(r#"{"method":"ack","project_id":"1"}"#).unwrap();

    assert!(matches!(msg, ServerMessage::Other));
    assert_eq!(msg.into_update(), None);
}

// ==================== Naming and identity Tests ====================

#[test]
fn test_canonical_name() {
    assert_eq!(canonical_name("score"), "☁ score");
    assert_eq!(canonical_name("☁ score"), "☁ score");
    assert_eq!(canonical_name(""), "☁ ");
    // Only the exact prefix counts; a bare cloud symbol is still prefixed
    assert_eq!(canonical_name("☁score"), "☁ ☁score");
}

#[test]
fn test_variable_update_short_name() {
    assert_eq!(VariableUpdate::new("☁ FROM_USER_1", "0").short_name(), "FROM_USER_1");
    assert_eq!(VariableUpdate::new("plain", "0").short_name(), "plain");
}

#[test]
fn test_identity_completeness() {
    assert!(Identity::new("alice", "scratchsessionsid=abc;").is_complete());
    assert!(!Identity::new("", "scratchsessionsid=abc;").is_complete());
    assert!(!Identity::new("alice", "  ").is_complete());
}

#[test]
fn test_identity_debug_redacts_cookie() {
    let identity = Identity::from_session("alice", "csrf", "secret-session");
    let debug = format!("{:?}", identity);

    assert!(debug.contains("alice"));
    assert!(!debug.contains("secret-session"));
}

#[test]
fn test_connection_state_round_trip_u8() {
    for state in [ConnectionState::Connecting, ConnectionState::Open, ConnectionState::Closed] {
        assert_eq!(ConnectionState::from_u8(state.as_u8()), state);
    }
    assert_eq!(ConnectionState::Open.to_string(), "open");
}
