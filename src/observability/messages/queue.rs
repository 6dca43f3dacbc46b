// Copyright (c) 2026 tensorq contributors
// SPDX-License-Identifier: MIT

//! Message types for device queue lifecycle and worker events.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A run queue was created for a device, with its worker threads spawned.
///
/// # Log Level
/// `info!` - Important operational event
pub struct QueueCreated<'a> {
    pub device: &'a str,
    pub workers: usize,
}

impl Display for QueueCreated<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Created run queue for device {} with {} worker(s)",
            self.device, self.workers
        )
    }
}

impl StructuredLog for QueueCreated<'_> {
    fn log(&self) {
        tracing::info!(device = self.device, workers = self.workers, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "queue",
            span_name = name,
            device = self.device,
            workers = self.workers,
        )
    }
}

/// A worker thread entered its dispatch loop.
///
/// # Log Level
/// `debug!` - Diagnostic detail
pub struct WorkerStarted<'a> {
    pub device: &'a str,
    pub worker: usize,
}

impl Display for WorkerStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Worker {} for device {} started", self.worker, self.device)
    }
}

impl StructuredLog for WorkerStarted<'_> {
    fn log(&self) {
        tracing::debug!(device = self.device, worker = self.worker, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "worker",
            span_name = name,
            device = self.device,
            worker = self.worker,
        )
    }
}

/// A caller went away while its job was queued or running; the computed
/// result is discarded.
///
/// # Log Level
/// `warn!` - Observed but tolerated
pub struct ClientDisconnected<'a> {
    pub device: &'a str,
}

impl Display for ClientDisconnected<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Caller disconnected before completion on device {}; result discarded",
            self.device
        )
    }
}

impl StructuredLog for ClientDisconnected<'_> {
    fn log(&self) {
        tracing::warn!(device = self.device, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("disconnect", span_name = name, device = self.device)
    }
}

/// A run queue drained and its workers joined.
///
/// # Log Level
/// `info!` - Important operational event
pub struct QueueShutdown<'a> {
    pub device: &'a str,
}

impl Display for QueueShutdown<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Run queue for device {} shut down", self.device)
    }
}

impl StructuredLog for QueueShutdown<'_> {
    fn log(&self) {
        tracing::info!(device = self.device, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("shutdown", span_name = name, device = self.device)
    }
}
