// Copyright 2026-Present the Hermes authors
// SPDX-License-Identifier: Apache-2.0

//! Hermes log-relay gateway.
//!
//! Accepts client-originated log entries over HTTP in two wire formats
//! (batched JSNLog-style and single log4js-style messages), normalizes them
//! into canonical records, and forwards each record to a Logstash-style
//! relay sink. Every request is answered with exactly one uniform JSON
//! envelope, including the timeout, 404 and error fallback paths.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod config;
pub mod context;
pub mod decoder;
pub mod gateway;
pub mod http_utils;
pub mod pipeline;
pub mod record;
pub mod relay_sink;
pub mod severity;
