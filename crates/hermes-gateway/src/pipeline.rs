// Copyright 2026-Present the Hermes authors
// SPDX-License-Identifier: Apache-2.0

//! The per-request middleware pipeline.
//!
//! Every inbound request runs the same strict stage order over a fresh
//! [`RequestContext`]: timers, CORS/preflight, identity, body parse and
//! route dispatch under the request deadline, the timeout and 404 fallback
//! guards, the terminal error handler, the access log, and a single send.
//! The fallback chain guarantees exactly one well-formed JSON envelope per
//! request no matter which stage failed.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::http::request::Parts;
use hyper::{http, Method, Request, Response};
use serde_json::json;
use tracing::{debug, error, info};

use crate::config::Config;
use crate::context::RequestContext;
use crate::decoder;
use crate::http_utils::{self, BoxError};
use crate::relay_sink::RelaySink;

pub const LOGGER_ENDPOINT_PATH: &str = "/api/logger";
pub const JSNLOG_ENDPOINT_PATH: &str = "/jsnlog.logger";

pub async fn handle_request<B>(
    config: Arc<Config>,
    sink: Arc<dyn RelaySink + Send + Sync>,
    remote_addr: SocketAddr,
    secure: bool,
    hostname: Arc<str>,
    req: Request<B>,
) -> http::Result<Response<Full<Bytes>>>
where
    B: hyper::body::Body,
    B::Error: Into<BoxError>,
{
    let (parts, body) = req.into_parts();

    let mut ctx = RequestContext::new(&parts, remote_addr, secure, &hostname);
    ctx.start_response_timer();

    // CORS runs before routing so pre-flight requests short-circuit.
    if parts.method == Method::OPTIONS {
        return http_utils::preflight_response();
    }

    // Body read and route dispatch share the request deadline. Work the
    // sink already accepted is not retracted when the deadline fires.
    let deadline = Duration::from_secs(config.server.timeout_secs);
    let mut route_error: Option<BoxError> = None;
    match tokio::time::timeout(
        deadline,
        dispatch(&config, sink.as_ref(), &mut ctx, &parts, body),
    )
    .await
    {
        Ok(Ok(())) => {}
        Ok(Err(e)) => route_error = Some(e),
        Err(_) => ctx.timed_out = true,
    }
    ctx.stop_route_timer();

    // Fallback guards only run when no error is in flight to the error
    // handler: timeout first, then 404 for requests nothing claimed.
    if route_error.is_none() {
        if ctx.timed_out && !ctx.has_error {
            ctx.fail_timeout();
        }
        if !ctx.has_data && !ctx.has_error {
            ctx.fail_not_found();
        }
    }

    ctx.stop_response_timer();

    // Terminal error handler: every parse/route/relay failure funnels here
    // and still yields a well-formed envelope.
    if let Some(err) = &route_error {
        ctx.stop_route_timer();
        ctx.stop_response_timer();
        let details = err.to_string();
        ctx.fail_server_error(&details);
        error!("{}", error_log_line(&ctx, &details));
    }

    // The gateway's own telemetry goes through the internal logger, never
    // the relay sink.
    let access = access_log_line(&ctx);
    if ctx.has_error {
        error!("{access}");
    } else {
        info!("{access}");
    }

    http_utils::envelope_response(&ctx)
}

async fn dispatch<B>(
    config: &Config,
    sink: &(dyn RelaySink + Send + Sync),
    ctx: &mut RequestContext,
    parts: &Parts,
    body: B,
) -> Result<(), BoxError>
where
    B: hyper::body::Body,
    B::Error: Into<BoxError>,
{
    let raw =
        http_utils::read_body(&parts.headers, body, config.server.max_content_length).await?;

    ctx.start_route_timer();
    if parts.method == Method::POST
        && matches!(
            ctx.url_path.as_str(),
            LOGGER_ENDPOINT_PATH | JSNLOG_ENDPOINT_PATH
        )
    {
        let parsed = http_utils::parse_body(&parts.headers, &raw)?;
        let forwarded = decoder::decode_and_relay(&parsed, ctx, sink).await?;
        ctx.has_data = true;
        debug!("relayed {forwarded} record(s) for call {}", ctx.call_id);
    }
    ctx.stop_route_timer();
    Ok(())
}

fn access_log_line(ctx: &RequestContext) -> String {
    json!({
        "status": ctx.http_status,
        "respCode": ctx.resp_code,
        "protocol": if ctx.secure { "HTTPS" } else { "HTTP" },
        "method": ctx.method,
        "endpoint": ctx.url_path,
        "actualIP": ctx.remote_addr.ip().to_string(),
        "ip": ctx.client_ip,
        "callID": ctx.call_id,
        "server": ctx.host,
        "headers": ctx.headers,
        "performance": {
            "response": ctx.timers.response_ms,
            "route": ctx.timers.route_ms,
        },
    })
    .to_string()
}

fn error_log_line(ctx: &RequestContext, details: &str) -> String {
    json!({
        "status": ctx.http_status,
        "protocol": if ctx.secure { "HTTPS" } else { "HTTP" },
        "endpoint": ctx.url_path,
        "actualIP": ctx.remote_addr.ip().to_string(),
        "ip": ctx.client_ip,
        "callID": ctx.call_id,
        "server": ctx.host,
        "headers": ctx.headers,
        "performance": {
            "response": ctx.timers.response_ms,
            "route": ctx.timers.route_ms,
        },
        "error": details,
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tokio::sync::mpsc;

    use super::*;
    use crate::context::codes;
    use crate::record::CanonicalLogRecord;
    use crate::relay_sink::SinkError;
    use crate::severity::Severity;

    struct RecordingSink {
        tx: mpsc::UnboundedSender<CanonicalLogRecord>,
    }

    #[async_trait]
    impl RelaySink for RecordingSink {
        async fn forward(
            &self,
            _severity: Severity,
            record: &CanonicalLogRecord,
        ) -> Result<(), SinkError> {
            self.tx
                .send(record.clone())
                .map_err(|e| -> SinkError { e.to_string().into() })
        }
    }

    /// Succeeds the first N calls, then fails; optionally sleeps first so
    /// the request deadline can win the race.
    struct FlakySink {
        succeed_first: usize,
        delay_ms: u64,
        calls: AtomicUsize,
        tx: mpsc::UnboundedSender<CanonicalLogRecord>,
    }

    #[async_trait]
    impl RelaySink for FlakySink {
        async fn forward(
            &self,
            _severity: Severity,
            record: &CanonicalLogRecord,
        ) -> Result<(), SinkError> {
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.succeed_first {
                let _ = self.tx.send(record.clone());
                Ok(())
            } else {
                Err("collector unreachable".into())
            }
        }
    }

    fn recording() -> (
        Arc<dyn RelaySink + Send + Sync>,
        mpsc::UnboundedReceiver<CanonicalLogRecord>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(RecordingSink { tx }), rx)
    }

    fn test_config() -> Arc<Config> {
        Arc::new(Config::default())
    }

    fn peer() -> SocketAddr {
        "192.0.2.7:55555".parse().unwrap()
    }

    fn json_request(method: &str, path: &str, body: &Value) -> Request<Full<Bytes>> {
        Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json")
            .body(Full::from(serde_json::to_vec(body).unwrap()))
            .unwrap()
    }

    async fn response_json(response: Response<Full<Bytes>>) -> (u16, Value) {
        let status = response.status().as_u16();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn run(
        config: Arc<Config>,
        sink: Arc<dyn RelaySink + Send + Sync>,
        req: Request<Full<Bytes>>,
    ) -> (u16, Value) {
        let response = handle_request(config, sink, peer(), false, Arc::from("test-host"), req)
            .await
            .unwrap();
        response_json(response).await
    }

    #[tokio::test]
    async fn test_unmatched_path_resolves_404() {
        let (sink, mut rx) = recording();
        let req = json_request("GET", "/test", &json!({}));
        let (status, body) = run(test_config(), sink, req).await;

        assert_eq!(status, 404);
        assert_eq!(body["respCode"], json!(codes::NOT_FOUND));
        assert_eq!(body["error"]["message"], "Endpoint Not Found.");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_get_on_logger_path_is_404() {
        // Submission endpoints are POST-only.
        let (sink, _rx) = recording();
        let req = json_request("GET", "/api/logger", &json!({}));
        let (status, body) = run(test_config(), sink, req).await;

        assert_eq!(status, 404);
        assert_eq!(body["respCode"], json!(codes::NOT_FOUND));
    }

    #[tokio::test]
    async fn test_single_protocol_success() {
        let (sink, mut rx) = recording();
        let req = json_request(
            "POST",
            "/api/logger",
            &json!({"level": "error", "message": "LAME"}),
        );
        let (status, body) = run(test_config(), sink, req).await;

        assert_eq!(status, 200);
        assert_eq!(body["respCode"], json!(codes::SUCCESS));
        assert!(body.get("error").is_none());

        let record = rx.try_recv().unwrap();
        assert_eq!(record.severity, Severity::Error);
        assert_eq!(record.payload, json!({"msg": "LAME"}));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_batch_protocol_success_on_alias_path() {
        let (sink, mut rx) = recording();
        let req = json_request(
            "POST",
            "/jsnlog.logger",
            &json!({
                "r": "ABCDEFG",
                "lg": [{"n": "test", "l": "error", "t": 1700000000000_u64, "m": "LAME"}]
            }),
        );
        let (status, body) = run(test_config(), sink, req).await;

        assert_eq!(status, 200);
        assert_eq!(body["respCode"], json!(codes::SUCCESS));

        let record = rx.try_recv().unwrap();
        assert_eq!(record.request_id, "ABCDEFG");
        assert_eq!(record.name.as_deref(), Some("test"));
        assert_eq!(record.severity, Severity::Error);
    }

    #[tokio::test]
    async fn test_empty_batch_succeeds_with_zero_forwards() {
        let (sink, mut rx) = recording();
        let req = json_request("POST", "/api/logger", &json!({"r": "R1", "lg": []}));
        let (status, body) = run(test_config(), sink, req).await;

        assert_eq!(status, 200);
        assert_eq!(body["respCode"], json!(codes::SUCCESS));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_body_parse_failure_resolves_500() {
        let (sink, _rx) = recording();
        let req = Request::builder()
            .method("POST")
            .uri("/api/logger")
            .header("content-type", "application/json")
            .body(Full::from("not json"))
            .unwrap();
        let (status, body) = run(test_config(), sink, req).await;

        assert_eq!(status, 500);
        assert_eq!(body["respCode"], json!(codes::SERVER_ERROR));
        assert_eq!(body["error"]["summary"], "General Server Error");
        assert!(body["error"]["details"].is_string());
    }

    #[tokio::test]
    async fn test_unrecognized_format_resolves_500() {
        let (sink, _rx) = recording();
        let req = json_request("POST", "/api/logger", &json!({"level": "error"}));
        let (status, body) = run(test_config(), sink, req).await;

        assert_eq!(status, 500);
        assert_eq!(body["respCode"], json!(codes::SERVER_ERROR));
    }

    #[tokio::test]
    async fn test_relay_failure_resolves_500_without_retraction() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = Arc::new(FlakySink {
            succeed_first: 1,
            delay_ms: 0,
            calls: AtomicUsize::new(0),
            tx,
        });
        let req = json_request(
            "POST",
            "/api/logger",
            &json!({
                "r": "R1",
                "lg": [
                    {"n": "a", "l": "info", "m": "first"},
                    {"n": "b", "l": "info", "m": "second"}
                ]
            }),
        );
        let (status, body) = run(test_config(), sink, req).await;

        assert_eq!(status, 500);
        assert_eq!(body["respCode"], json!(codes::SERVER_ERROR));
        // Entry already accepted by the sink stays delivered.
        assert_eq!(rx.try_recv().unwrap().name.as_deref(), Some("a"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_deadline_expiry_resolves_408() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let sink = Arc::new(FlakySink {
            succeed_first: usize::MAX,
            delay_ms: 50,
            calls: AtomicUsize::new(0),
            tx,
        });
        let mut config = Config::default();
        config.server.timeout_secs = 0;
        let req = json_request(
            "POST",
            "/api/logger",
            &json!({"level": "error", "message": "slow"}),
        );
        let (status, body) = run(Arc::new(config), sink, req).await;

        assert_eq!(status, 408);
        assert_eq!(body["respCode"], json!(codes::TIMEOUT));
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("took too long"));
    }

    #[tokio::test]
    async fn test_deadline_beats_route_failure_single_response() {
        // Even when the route would also have failed, the request resolves
        // once, with the timeout envelope.
        let (tx, _rx) = mpsc::unbounded_channel();
        let sink = Arc::new(FlakySink {
            succeed_first: 0,
            delay_ms: 50,
            calls: AtomicUsize::new(0),
            tx,
        });
        let mut config = Config::default();
        config.server.timeout_secs = 0;
        let req = json_request(
            "POST",
            "/api/logger",
            &json!({"level": "error", "message": "slow"}),
        );
        let (status, body) = run(Arc::new(config), sink, req).await;

        assert_eq!(status, 408);
        assert_eq!(body["respCode"], json!(codes::TIMEOUT));
    }

    #[tokio::test]
    async fn test_options_preflight_short_circuits() {
        let (sink, mut rx) = recording();
        let req: Request<Full<Bytes>> = Request::builder()
            .method("OPTIONS")
            .uri("/api/logger")
            .body(Full::from(""))
            .unwrap();
        let response =
            handle_request(test_config(), sink, peer(), false, Arc::from("test-host"), req)
                .await
                .unwrap();

        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .unwrap(),
            "*"
        );
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_envelope_correlation_fields_present() {
        let (sink, _rx) = recording();
        let req = json_request(
            "POST",
            "/api/logger",
            &json!({"level": "info", "message": "ok"}),
        );
        let (_, body) = run(test_config(), sink, req).await;

        assert!(body["callID"].is_string());
        assert!(body["time"].is_string());
        assert!(body["timestamp"].is_string());
        assert_eq!(body["ip"], "192.0.2.7");
        assert!(body["ipForwarding"].as_array().unwrap().is_empty());
    }
}
