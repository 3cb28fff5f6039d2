// Copyright 2026-Present the Hermes authors
// SPDX-License-Identifier: Apache-2.0

//! Server lifecycle: binds the pipeline to the configured listeners and
//! provides idempotent shutdown.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hyper::service::service_fn;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::config::{self, Config};
use crate::http_utils::BoxError;
use crate::pipeline;
use crate::relay_sink::RelaySink;

pub struct Gateway {
    config: Arc<Config>,
    sink: Arc<dyn RelaySink + Send + Sync>,
    hostname: Arc<str>,
    active: AtomicBool,
    shutdown: CancellationToken,
}

impl Gateway {
    pub fn new(config: Arc<Config>, sink: Arc<dyn RelaySink + Send + Sync>) -> Gateway {
        Gateway {
            hostname: Arc::from(config::hostname().as_str()),
            config,
            sink,
            active: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Binds the plaintext listener and, when encryption is enabled, a
    /// second listener on the secure port sharing the same pipeline.
    /// Termination for the secure listener happens in the deployment layer
    /// holding the configured certificate material. Runs until `close()`.
    pub async fn start(&self) -> Result<(), BoxError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.server.port));
        let listener = TcpListener::bind(&addr).await?;
        debug!("listening for HTTP on port {}", self.config.server.port);

        let secure_listener = if self.config.server.ssl_enabled {
            let addr = SocketAddr::from(([0, 0, 0, 0], self.config.server.ssl_port));
            let listener = TcpListener::bind(&addr).await?;
            debug!("listening for HTTPS on port {}", self.config.server.ssl_port);
            Some(listener)
        } else {
            None
        };

        self.active.store(true, Ordering::SeqCst);

        match secure_listener {
            Some(secure) => {
                tokio::try_join!(self.serve(listener, false), self.serve(secure, true))?;
            }
            None => self.serve(listener, false).await?,
        }
        Ok(())
    }

    async fn serve(&self, listener: TcpListener, secure: bool) -> Result<(), BoxError> {
        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();

        loop {
            let (conn, peer) = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Server error: {e}");
                        return Err(e.into());
                    }
                    Ok(pair) => pair,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        // Don't kill the listener on a handler panic.
                        error!("Connection handler panicked: {e:?}");
                        continue;
                    }
                    Ok(()) | Err(_) => continue,
                },
            };

            let config = Arc::clone(&self.config);
            let sink = Arc::clone(&self.sink);
            let hostname = Arc::clone(&self.hostname);
            let service = service_fn(move |req| {
                pipeline::handle_request(
                    Arc::clone(&config),
                    Arc::clone(&sink),
                    peer,
                    secure,
                    Arc::clone(&hostname),
                    req,
                )
            });
            let conn = hyper_util::rt::TokioIo::new(conn);
            let server = server.clone();
            joinset.spawn(async move {
                if let Err(e) = server.serve_connection(conn, service).await {
                    error!("Connection error: {e}");
                }
            });
        }

        debug!(
            "{} listener closed",
            if secure { "secure" } else { "plaintext" }
        );
        Ok(())
    }

    /// Idempotent shutdown: closes only listeners that are active, marks
    /// the gateway inactive, safe to call repeatedly or before `start()`.
    pub fn close(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            debug!("shutting down listeners");
        }
        self.shutdown.cancel();
    }
}
