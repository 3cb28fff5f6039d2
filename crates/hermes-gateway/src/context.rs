// Copyright 2026-Present the Hermes authors
// SPDX-License-Identifier: Apache-2.0

//! Per-request scratch state threaded through the pipeline stages.
//!
//! One `RequestContext` is allocated at pipeline entry, mutated by every
//! stage, and discarded once the response is sent. It is never shared
//! between requests, which is what lets the pipeline run lock-free.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use hyper::http::request::Parts;
use serde::Serialize;
use uuid::Uuid;

/// Domain response codes embedded in every envelope, distinct from the HTTP
/// status.
pub mod codes {
    pub const SUCCESS: i64 = 200_000;
    pub const NOT_FOUND: i64 = 404_000;
    pub const TIMEOUT: i64 = 408_000;
    pub const SERVER_ERROR: i64 = 500_000;
}

pub const NOT_FOUND_MESSAGE: &str = "Endpoint Not Found.";
pub const TIMEOUT_MESSAGE: &str =
    "The request data took too long to send, please attempt your request again.";
pub const SERVER_ERROR_SUMMARY: &str = "General Server Error";
pub const SERVER_ERROR_MESSAGE: &str =
    "An unknown error occurred processing the log message.";

/// Error detail carried into the response envelope when a request fails.
#[derive(Clone, Debug, Serialize)]
pub struct ErrorBlock {
    pub summary: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Response and route timers, captured as start marks and stopped into
/// elapsed milliseconds. Stops are idempotent: the first stop wins, so the
/// error handler can stop both timers without clobbering earlier stages.
#[derive(Clone, Copy, Debug, Default)]
pub struct Timers {
    response_start: Option<Instant>,
    route_start: Option<Instant>,
    pub response_ms: Option<u64>,
    pub route_ms: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct RequestContext {
    /// Per-request correlation id, shared by logs, relayed records and the
    /// envelope.
    pub call_id: String,
    /// ISO-8601 receive time.
    pub time: String,
    /// Receive time as an epoch-milliseconds string.
    pub timestamp: String,
    /// Hostname of the gateway process.
    pub host: String,
    pub method: String,
    pub url_path: String,
    pub secure: bool,
    pub remote_addr: SocketAddr,
    /// Client ip: first X-Forwarded-For hop when present, socket peer
    /// otherwise.
    pub client_ip: String,
    /// Full X-Forwarded-For chain, empty when the header is absent.
    pub forwarded_ips: Vec<String>,
    /// Snapshot of the request headers (non-UTF-8 values dropped).
    pub headers: HashMap<String, String>,
    pub has_data: bool,
    pub has_error: bool,
    pub timed_out: bool,
    pub resp_code: i64,
    pub http_status: u16,
    pub error: Option<ErrorBlock>,
    pub timers: Timers,
}

impl RequestContext {
    pub fn new(parts: &Parts, remote_addr: SocketAddr, secure: bool, host: &str) -> Self {
        let now = Utc::now();
        let forwarded_ips = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(|v| {
                v.split(',')
                    .map(|ip| ip.trim().to_string())
                    .filter(|ip| !ip.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let client_ip = forwarded_ips
            .first()
            .cloned()
            .unwrap_or_else(|| remote_addr.ip().to_string());
        let headers = parts
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        RequestContext {
            call_id: Uuid::new_v4().to_string(),
            time: now.to_rfc3339_opts(SecondsFormat::Millis, true),
            timestamp: now.timestamp_millis().to_string(),
            host: host.to_string(),
            method: parts.method.to_string(),
            url_path: parts.uri.path().to_string(),
            secure,
            remote_addr,
            client_ip,
            forwarded_ips,
            headers,
            has_data: false,
            has_error: false,
            timed_out: false,
            resp_code: codes::SUCCESS,
            http_status: 200,
            error: None,
            timers: Timers::default(),
        }
    }

    pub fn start_response_timer(&mut self) {
        self.timers.response_start = Some(Instant::now());
    }

    pub fn stop_response_timer(&mut self) {
        if let (Some(start), None) = (self.timers.response_start, self.timers.response_ms) {
            self.timers.response_ms = Some(start.elapsed().as_millis() as u64);
        }
    }

    pub fn start_route_timer(&mut self) {
        self.timers.route_start = Some(Instant::now());
    }

    pub fn stop_route_timer(&mut self) {
        if let (Some(start), None) = (self.timers.route_start, self.timers.route_ms) {
            self.timers.route_ms = Some(start.elapsed().as_millis() as u64);
        }
    }

    /// Timeout guard outcome: 408 envelope with a user-facing message.
    pub fn fail_timeout(&mut self) {
        self.resp_code = codes::TIMEOUT;
        self.http_status = 408;
        self.has_error = true;
        self.error = Some(ErrorBlock {
            summary: "Request Timeout".to_string(),
            message: TIMEOUT_MESSAGE.to_string(),
            details: None,
        });
    }

    /// 404 fallback outcome for requests no route claimed.
    pub fn fail_not_found(&mut self) {
        self.resp_code = codes::NOT_FOUND;
        self.http_status = 404;
        self.has_error = true;
        self.error = Some(ErrorBlock {
            summary: "Not Found".to_string(),
            message: NOT_FOUND_MESSAGE.to_string(),
            details: None,
        });
    }

    /// Terminal error-handler outcome. Leaves a domain code set by an
    /// earlier guard in place; only an unclaimed request becomes a 500.
    pub fn fail_server_error(&mut self, details: &str) {
        if self.resp_code == codes::SUCCESS {
            self.resp_code = codes::SERVER_ERROR;
            self.http_status = 500;
        }
        self.has_error = true;
        self.error = Some(ErrorBlock {
            summary: SERVER_ERROR_SUMMARY.to_string(),
            message: SERVER_ERROR_MESSAGE.to_string(),
            details: Some(details.to_string()),
        });
    }
}
