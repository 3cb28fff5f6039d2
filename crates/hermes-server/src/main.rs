// Copyright 2026-Present the Hermes authors
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::{env, sync::Arc};

use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use hermes_gateway::{
    config::Config,
    gateway::Gateway,
    relay_sink::{self, DisabledSink, RelaySink},
};

#[tokio::main]
pub async fn main() {
    let log_level = env::var("HERMES_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,{}", log_level);

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match Config::from_env() {
        Ok(c) => Arc::new(c),
        Err(e) => {
            error!("Error creating config on log-relay gateway startup: {e}");
            return;
        }
    };

    // A relay that is down at startup is reported, not fatal: the gateway
    // keeps answering clients without the relay capability.
    let sink: Arc<dyn RelaySink + Send + Sync> = match relay_sink::connect(&config.relay).await {
        Ok(sink) => sink,
        Err(e) => {
            error!("Relay sink unreachable at startup, continuing without relay capability: {e}");
            Arc::new(DisabledSink)
        }
    };

    let gateway = Arc::new(Gateway::new(Arc::clone(&config), sink));

    let server = Arc::clone(&gateway);
    tokio::spawn(async move {
        if let Err(e) = server.start().await {
            error!("Error when starting the log-relay gateway: {e:?}");
        }
    });

    shutdown_signal().await;
    info!("Received shutdown signal, performing graceful shutdown");
    gateway.close();
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
