// Copyright 2026-Present the Hermes authors
// SPDX-License-Identifier: Apache-2.0

//! HTTP helpers shared by the pipeline: the response envelope, CORS
//! headers, body reading and content-type-driven parsing.

use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::http::HeaderValue;
use hyper::{header, http, HeaderMap, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;

use crate::context::{ErrorBlock, RequestContext};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub const CORS_ALLOW_ORIGIN: &str = "*";
// Routing itself only accepts POST; the advertised set stays permissive for
// browser clients probing with preflights.
pub const CORS_ALLOW_METHODS: &str = "GET, POST, DELETE, PUT, OPTIONS";
pub const CORS_ALLOW_HEADERS: &str =
    "Origin, X-Requested-With, Content-Type, Accept, level, message";

/// The uniform JSON body every request is answered with.
#[derive(Debug, Serialize)]
pub struct ResponseEnvelope {
    #[serde(rename = "respCode")]
    pub resp_code: i64,
    pub status: u16,
    #[serde(rename = "callID")]
    pub call_id: String,
    pub time: String,
    pub timestamp: String,
    pub ip: String,
    #[serde(rename = "ipForwarding")]
    pub ip_forwarding: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBlock>,
}

impl ResponseEnvelope {
    pub fn from_context(ctx: &RequestContext) -> Self {
        ResponseEnvelope {
            resp_code: ctx.resp_code,
            status: ctx.http_status,
            call_id: ctx.call_id.clone(),
            time: ctx.time.clone(),
            timestamp: ctx.timestamp.clone(),
            ip: ctx.client_ip.clone(),
            ip_forwarding: ctx.forwarded_ips.clone(),
            error: if ctx.has_error { ctx.error.clone() } else { None },
        }
    }
}

pub fn apply_cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static(CORS_ALLOW_ORIGIN),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(CORS_ALLOW_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(CORS_ALLOW_HEADERS),
    );
}

/// CORS preflight short-circuit: 200 with the permissive header set, no
/// body processing.
pub fn preflight_response() -> http::Result<Response<Full<Bytes>>> {
    let mut response = Response::builder()
        .status(StatusCode::OK)
        .body(Full::from("OK"))?;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

/// The single response exit point: staged CORS headers, JSON content type,
/// the context's HTTP status, the envelope as the body.
pub fn envelope_response(ctx: &RequestContext) -> http::Result<Response<Full<Bytes>>> {
    let envelope = ResponseEnvelope::from_context(ctx);
    let body = serde_json::to_string(&envelope).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::builder()
        .status(ctx.http_status)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::from(body))?;
    apply_cors_headers(response.headers_mut());
    Ok(response)
}

/// Collects the request body, enforcing the configured size cap against the
/// Content-Length header before reading.
pub async fn read_body<B>(
    headers: &HeaderMap,
    body: B,
    max_content_length: usize,
) -> Result<Bytes, BoxError>
where
    B: hyper::body::Body,
    B::Error: Into<BoxError>,
{
    if let Some(value) = headers.get(header::CONTENT_LENGTH) {
        let length = value
            .to_str()
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .ok_or("Invalid Content-Length header")?;
        if length > max_content_length {
            return Err("Payload too large".into());
        }
    }
    let collected = body.collect().await.map_err(Into::into)?;
    Ok(collected.to_bytes())
}

/// Parses the raw body by content type: urlencoded forms become a flat
/// string map, everything else is treated as JSON. A parse failure is a
/// request-level error funneled to the error handler.
pub fn parse_body(headers: &HeaderMap, raw: &[u8]) -> Result<Value, BoxError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if content_type.starts_with("application/x-www-form-urlencoded") {
        let fields: Vec<(String, String)> = serde_urlencoded::from_bytes(raw)?;
        Ok(Value::Object(
            fields
                .into_iter()
                .map(|(k, v)| (k, Value::String(v)))
                .collect(),
        ))
    } else {
        Ok(serde_json::from_slice(raw)?)
    }
}
