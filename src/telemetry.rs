// SPDX-License-Identifier: MIT
//
// Copyright (c) 2025 Noderr Protocol Foundation
//
// Permission is hereby granted, free of charge, to any person obtaining a copy
// of this software and associated documentation files (the "Software"), to deal
// in the Software without restriction, including without limitation the rights
// to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
// copies of the Software, and to permit persons to whom the Software is
// furnished to do so, subject to the following conditions:
//
// The above copyright notice and this permission notice shall be included in all
// copies or substantial portions of the Software.

//! Thin logging facade over `tracing`, so components depend on a trait
//! object (`Logger`) per the "abstracted behind a Logger interface"
//! language in spec.md §1, rather than calling `tracing` macros directly
//! everywhere. The default implementation just forwards to `tracing`,
//! matching the announcement style of the teacher's `telemetry_streamer.rs`.

use tracing::{debug, error, info, warn};

/// Severity level for a log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Logging sink every component is constructed with.
pub trait Logger: Send + Sync {
    fn log(&self, level: LogLevel, target: &str, message: &str);

    fn debug(&self, target: &str, message: &str) {
        self.log(LogLevel::Debug, target, message);
    }
    fn info(&self, target: &str, message: &str) {
        self.log(LogLevel::Info, target, message);
    }
    fn warn(&self, target: &str, message: &str) {
        self.log(LogLevel::Warn, target, message);
    }
    fn error(&self, target: &str, message: &str) {
        self.log(LogLevel::Error, target, message);
    }
}

/// Default logger, forwarding to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, target: &str, message: &str) {
        match level {
            LogLevel::Debug => debug!(target: "noderr_core", component = target, "{}", message),
            LogLevel::Info => info!(target: "noderr_core", component = target, "{}", message),
            LogLevel::Warn => warn!(target: "noderr_core", component = target, "{}", message),
            LogLevel::Error => error!(target: "noderr_core", component = target, "{}", message),
        }
    }
}
