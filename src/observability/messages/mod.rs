// Copyright (c) 2026 tensorq contributors
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for human-readable output and
//! [`StructuredLog`] for field-structured emission at its canonical level.
//!
//! Messages are organized by subsystem:
//!
//! * `queue` - device queue lifecycle and worker events
//! * `session` - batch dispatch and execution session events

pub mod queue;
pub mod session;

use tracing::Span;

/// Emit a message with structured fields at its canonical level, or open a
/// span carrying the same fields.
pub trait StructuredLog {
    fn log(&self);

    fn span(&self, name: &str) -> Span;
}
