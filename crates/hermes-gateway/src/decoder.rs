// Copyright 2026-Present the Hermes authors
// SPDX-License-Identifier: Apache-2.0

//! Client log format decoders.
//!
//! Two wire formats are supported and detected by shape, in fixed priority
//! order: the batched JSNLog-style protocol (`r` + `lg`) and the single
//! log4js-style message (`level` + `message`). Each decoded record is
//! forwarded to the relay sink as it is produced, so a failure on entry N
//! never blocks entries 1..N-1 already sent; nothing is retracted. Records
//! whose message is empty are filtered ahead of the sink.

use serde_json::{json, Value};
use thiserror::Error;

use crate::context::RequestContext;
use crate::record::{CanonicalLogRecord, RECORD_TYPE};
use crate::relay_sink::{RelaySink, SinkError};
use crate::severity::Severity;

#[derive(Debug, Error)]
pub enum DecodeError {
    /// The batch's `lg` field is present but not a structured array.
    #[error("log batch field is not a structured array")]
    MalformedBatch,
    /// Neither protocol's required field set is present.
    #[error("no recognized logging message")]
    UnrecognizedFormat,
    /// The sink refused a record; the request fails, earlier entries stand.
    #[error("relay forward failed: {0}")]
    Relay(SinkError),
}

// Empty client messages carry no signal; they are filtered here, ahead of
// the sink, rather than inside the logging transport.
fn should_emit(record: &CanonicalLogRecord) -> bool {
    match &record.payload {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Object(map) => match map.get("msg") {
            Some(Value::Null) => false,
            Some(Value::String(s)) => !s.trim().is_empty(),
            _ => true,
        },
        _ => true,
    }
}

/// Sniffs the parsed body and relays every decoded record. Returns the
/// number of records forwarded.
pub async fn decode_and_relay(
    body: &Value,
    ctx: &RequestContext,
    sink: &(dyn RelaySink + Send + Sync),
) -> Result<usize, DecodeError> {
    let Some(obj) = body.as_object() else {
        return Err(DecodeError::UnrecognizedFormat);
    };

    if obj.contains_key("r") && obj.contains_key("lg") {
        decode_batch(obj, ctx, sink).await
    } else if obj.contains_key("level") && obj.contains_key("message") {
        decode_single(obj, ctx, sink).await
    } else {
        Err(DecodeError::UnrecognizedFormat)
    }
}

async fn decode_batch(
    obj: &serde_json::Map<String, Value>,
    ctx: &RequestContext,
    sink: &(dyn RelaySink + Send + Sync),
) -> Result<usize, DecodeError> {
    // Some clients double-encode the entry array as a JSON string.
    let entries = match &obj["lg"] {
        Value::String(raw) => {
            serde_json::from_str::<Value>(raw).map_err(|_| DecodeError::MalformedBatch)?
        }
        other => other.clone(),
    };
    let Some(entries) = entries.as_array() else {
        return Err(DecodeError::MalformedBatch);
    };

    let request_id = obj
        .get("r")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut forwarded = 0;
    for entry in entries {
        let severity = Severity::normalize(entry.get("l"));
        // A message that is not valid structured data stays as raw text.
        let payload = match entry.get("m") {
            Some(Value::String(raw)) => {
                serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone()))
            }
            Some(other) => other.clone(),
            None => Value::Null,
        };
        let record = CanonicalLogRecord {
            record_type: RECORD_TYPE,
            name: entry.get("n").and_then(Value::as_str).map(str::to_string),
            request_id: request_id.clone(),
            severity,
            payload,
            source_ip: ctx.client_ip.clone(),
            call_id: ctx.call_id.clone(),
            headers: ctx.headers.clone(),
            client_timestamp: entry.get("t").cloned().unwrap_or(Value::Null),
            server_timestamp: ctx.time.clone(),
        };
        if !should_emit(&record) {
            continue;
        }
        sink.forward(severity, &record)
            .await
            .map_err(DecodeError::Relay)?;
        forwarded += 1;
    }
    Ok(forwarded)
}

async fn decode_single(
    obj: &serde_json::Map<String, Value>,
    ctx: &RequestContext,
    sink: &(dyn RelaySink + Send + Sync),
) -> Result<usize, DecodeError> {
    let severity = Severity::normalize(obj.get("level"));
    let message = obj.get("message").cloned().unwrap_or(Value::Null);
    let record = CanonicalLogRecord {
        record_type: RECORD_TYPE,
        name: None,
        request_id: ctx.call_id.clone(),
        severity,
        payload: json!({ "msg": message }),
        source_ip: ctx.client_ip.clone(),
        call_id: ctx.call_id.clone(),
        headers: ctx.headers.clone(),
        client_timestamp: Value::String(ctx.time.clone()),
        server_timestamp: ctx.time.clone(),
    };
    if !should_emit(&record) {
        return Ok(0);
    }
    sink.forward(severity, &record)
        .await
        .map_err(DecodeError::Relay)?;
    Ok(1)
}
