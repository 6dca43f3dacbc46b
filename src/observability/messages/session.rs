// Copyright (c) 2026 tensorq contributors
// SPDX-License-Identifier: MIT

//! Message types for batch dispatch and execution session events.

use crate::observability::messages::StructuredLog;
use crate::store::BackendKind;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// A batch left the queue for a single backend call.
///
/// # Log Level
/// `debug!` - Diagnostic detail
pub struct BatchDispatched<'a> {
    pub device: &'a str,
    pub members: usize,
    pub total_dim: usize,
}

impl Display for BatchDispatched<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Dispatching batch of {} job(s) (leading dim {}) on device {}",
            self.members, self.total_dim, self.device
        )
    }
}

impl StructuredLog for BatchDispatched<'_> {
    fn log(&self) {
        tracing::debug!(
            device = self.device,
            members = self.members,
            total_dim = self.total_dim,
            "{}",
            self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "batch",
            span_name = name,
            device = self.device,
            members = self.members,
            total_dim = self.total_dim,
        )
    }
}

/// An execution session finished with every member succeeding.
///
/// # Log Level
/// `debug!` - Diagnostic detail
pub struct SessionCompleted<'a> {
    pub device: &'a str,
    pub members: usize,
    pub duration: Duration,
}

impl Display for SessionCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Session of {} job(s) on device {} completed in {:?}",
            self.members, self.device, self.duration
        )
    }
}

impl StructuredLog for SessionCompleted<'_> {
    fn log(&self) {
        tracing::debug!(
            device = self.device,
            members = self.members,
            duration_us = self.duration.as_micros() as u64,
            "{}",
            self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "session",
            span_name = name,
            device = self.device,
            members = self.members,
        )
    }
}

/// An execution session failed; every member receives the same error.
///
/// # Log Level
/// `warn!` - The job outcome carries the error; the session only notes it
pub struct SessionFailed<'a> {
    pub device: &'a str,
    pub code: &'a str,
    pub oneline: &'a str,
}

impl Display for SessionFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Session on device {} failed ({}): {}",
            self.device, self.code, self.oneline
        )
    }
}

impl StructuredLog for SessionFailed<'_> {
    fn log(&self) {
        tracing::warn!(device = self.device, code = self.code, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "session_failure",
            span_name = name,
            device = self.device,
            code = self.code,
        )
    }
}

/// A backend adapter was constructed on first use.
///
/// # Log Level
/// `info!` - Important operational event
pub struct BackendLazyLoaded {
    pub backend: BackendKind,
}

impl Display for BackendLazyLoaded {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Backend {} loaded on first use", self.backend)
    }
}

impl StructuredLog for BackendLazyLoaded {
    fn log(&self) {
        tracing::info!(backend = %self.backend, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!("backend_load", span_name = name, backend = %self.backend)
    }
}
