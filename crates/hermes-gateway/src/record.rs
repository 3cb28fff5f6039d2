// Copyright 2026-Present the Hermes authors
// SPDX-License-Identifier: Apache-2.0

//! The canonical log record forwarded to the relay sink.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use crate::severity::Severity;

/// Fixed record tag; every relayed record is a client-originated error log.
pub const RECORD_TYPE: &str = "client_error";

/// The normalized unit handed to the relay sink. Created once per decoded
/// entry, immutable afterwards, owned by the pipeline only for the duration
/// of a single forward call.
#[derive(Clone, Debug, Serialize)]
pub struct CanonicalLogRecord {
    #[serde(rename = "type")]
    pub record_type: &'static str,
    /// Client-side logger name, when the protocol carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Correlates multiple records decoded from one batch submission.
    #[serde(rename = "requestID")]
    pub request_id: String,
    pub severity: Severity,
    /// Parsed message body, or the raw string when it is not structured.
    pub payload: Value,
    #[serde(rename = "sourceIP")]
    pub source_ip: String,
    /// Correlation id of the HTTP request that carried this record.
    #[serde(rename = "callID")]
    pub call_id: String,
    /// Snapshot of the submitting request's headers.
    pub headers: HashMap<String, String>,
    /// Timestamp reported by the client (epoch ms or ISO string), if any.
    #[serde(rename = "clientTimestamp")]
    pub client_timestamp: Value,
    /// ISO-8601 instant the gateway received the request.
    #[serde(rename = "serverTimestamp")]
    pub server_timestamp: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_wire_field_names() {
        let record = CanonicalLogRecord {
            record_type: RECORD_TYPE,
            name: Some("test".to_string()),
            request_id: "ABCDEFG".to_string(),
            severity: Severity::Error,
            payload: json!({"msg": "LAME"}),
            source_ip: "10.0.0.1".to_string(),
            call_id: "call-1".to_string(),
            headers: HashMap::new(),
            client_timestamp: json!(1700000000000_u64),
            server_timestamp: "2026-01-01T00:00:00.000Z".to_string(),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["type"], "client_error");
        assert_eq!(value["requestID"], "ABCDEFG");
        assert_eq!(value["severity"], "error");
        assert_eq!(value["sourceIP"], "10.0.0.1");
        assert_eq!(value["callID"], "call-1");
        assert_eq!(value["clientTimestamp"], json!(1700000000000_u64));
        assert!(value.get("serverTimestamp").is_some());
    }

    #[test]
    fn test_absent_name_is_omitted() {
        let record = CanonicalLogRecord {
            record_type: RECORD_TYPE,
            name: None,
            request_id: "r".to_string(),
            severity: Severity::Info,
            payload: json!("raw"),
            source_ip: String::new(),
            call_id: String::new(),
            headers: HashMap::new(),
            client_timestamp: json!(null),
            server_timestamp: String::new(),
        };

        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("name").is_none());
    }
}
