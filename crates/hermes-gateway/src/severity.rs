// Copyright 2026-Present the Hermes authors
// SPDX-License-Identifier: Apache-2.0

//! Canonical severity levels and normalization of client-supplied levels.
//!
//! Clients report levels either as numeric codes (JSNLog-style, where
//! 1000-6000 map onto trace..fatal) or as free-text names. Everything is
//! folded into the fixed five-level set; unrecognized input is treated as
//! `error` so a malformed level never drops a client record on the floor.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// The canonical ordered severity set all inbound level representations are
/// mapped into. Serialized lowercase on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Severity {
    /// Maps a raw level value from a client payload to a canonical severity.
    /// Total: never fails, defaults to `Error` for absent or unrecognized
    /// input.
    pub fn normalize(raw: Option<&Value>) -> Severity {
        match raw {
            Some(Value::Number(n)) => Self::from_numeric(n.as_f64().unwrap_or(-1.0)),
            Some(Value::String(s)) => Self::from_name(s),
            _ => Severity::Error,
        }
    }

    // Numeric levels are bucketed by floor(value / 1000). Bucket 6 is the
    // JSNLog "fatal" range, folded into error.
    fn from_numeric(value: f64) -> Severity {
        match (value / 1000.0).floor() as i64 {
            1 => Severity::Trace,
            2 => Severity::Debug,
            3 => Severity::Info,
            4 => Severity::Warn,
            5 | 6 => Severity::Error,
            _ => Severity::Error,
        }
    }

    fn from_name(name: &str) -> Severity {
        match name.to_lowercase().as_str() {
            "trace" => Severity::Trace,
            "debug" => Severity::Debug,
            "info" => Severity::Info,
            "warn" => Severity::Warn,
            "error" => Severity::Error,
            _ => Severity::Error,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "trace",
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
