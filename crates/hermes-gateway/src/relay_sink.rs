// Copyright 2026-Present the Hermes authors
// SPDX-License-Identifier: Apache-2.0

//! The relay sink boundary: forwards one canonical record per call to the
//! downstream aggregation collector.
//!
//! Intentionally thin: a single forwarding attempt, no buffering, no retry.
//! Errors propagate to the caller, which converts them into a request-level
//! failure. The wire shape is the Logstash event convention: a JSON object
//! with `@timestamp`, `level`, `application` and the record under `message`.

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::config::{RelayConfig, RelayTransport};
use crate::record::CanonicalLogRecord;
use crate::severity::Severity;

pub type SinkError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait RelaySink {
    /// Delivers one record downstream. Single attempt; an error means the
    /// record was not (or may not have been) delivered.
    async fn forward(
        &self,
        severity: Severity,
        record: &CanonicalLogRecord,
    ) -> Result<(), SinkError>;
}

/// Builds the sink selected by the configured transport.
pub async fn connect(config: &RelayConfig) -> Result<Arc<dyn RelaySink + Send + Sync>, SinkError> {
    match config.transport {
        RelayTransport::Udp => Ok(Arc::new(UdpRelaySink::connect(config).await?)),
        RelayTransport::Tcp => Ok(Arc::new(TcpRelaySink::connect(config).await?)),
    }
}

#[derive(Serialize)]
struct RelayEvent<'a> {
    #[serde(rename = "@timestamp")]
    timestamp: String,
    level: Severity,
    application: &'a str,
    message: &'a CanonicalLogRecord,
}

fn encode(app_name: &str, severity: Severity, record: &CanonicalLogRecord) -> Result<Vec<u8>, SinkError> {
    let event = RelayEvent {
        timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        level: severity,
        application: app_name,
        message: record,
    };
    Ok(serde_json::to_vec(&event)?)
}

/// Logstash-UDP transport: one JSON datagram per record.
pub struct UdpRelaySink {
    socket: UdpSocket,
    app_name: String,
}

impl UdpRelaySink {
    pub async fn connect(config: &RelayConfig) -> Result<Self, SinkError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket
            .connect((config.host.as_str(), config.port))
            .await?;
        debug!("relay sink connected (udp) to {}:{}", config.host, config.port);
        Ok(UdpRelaySink {
            socket,
            app_name: config.app_name.clone(),
        })
    }
}

#[async_trait]
impl RelaySink for UdpRelaySink {
    async fn forward(
        &self,
        severity: Severity,
        record: &CanonicalLogRecord,
    ) -> Result<(), SinkError> {
        let datagram = encode(&self.app_name, severity, record)?;
        self.socket.send(&datagram).await?;
        Ok(())
    }
}

/// Newline-delimited JSON over a persistent TCP connection. A failed write
/// drops the connection; the next call reconnects. The failed call itself
/// reports the error.
pub struct TcpRelaySink {
    host: String,
    port: u16,
    app_name: String,
    conn: Mutex<Option<TcpStream>>,
}

impl TcpRelaySink {
    pub async fn connect(config: &RelayConfig) -> Result<Self, SinkError> {
        let stream = TcpStream::connect((config.host.as_str(), config.port)).await?;
        debug!("relay sink connected (tcp) to {}:{}", config.host, config.port);
        Ok(TcpRelaySink {
            host: config.host.clone(),
            port: config.port,
            app_name: config.app_name.clone(),
            conn: Mutex::new(Some(stream)),
        })
    }
}

#[async_trait]
impl RelaySink for TcpRelaySink {
    async fn forward(
        &self,
        severity: Severity,
        record: &CanonicalLogRecord,
    ) -> Result<(), SinkError> {
        let mut line = encode(&self.app_name, severity, record)?;
        line.push(b'\n');

        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(TcpStream::connect((self.host.as_str(), self.port)).await?);
        }
        // The connection is present here; a write failure poisons it so the
        // next forward call starts from a fresh connect.
        if let Some(stream) = guard.as_mut() {
            if let Err(e) = stream.write_all(&line).await {
                *guard = None;
                return Err(e.into());
            }
        }
        Ok(())
    }
}

/// Stand-in used when the relay is unreachable at startup: the gateway keeps
/// serving, records are dropped.
pub struct DisabledSink;

#[async_trait]
impl RelaySink for DisabledSink {
    async fn forward(
        &self,
        _severity: Severity,
        record: &CanonicalLogRecord,
    ) -> Result<(), SinkError> {
        trace!("relay disabled, dropping record for call {}", record.call_id);
        Ok(())
    }
}
