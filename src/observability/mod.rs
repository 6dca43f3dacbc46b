// Copyright (c) 2026 tensorq contributors
// SPDX-License-Identifier: MIT

//! Structured logging for the run engine.
//!
//! Diagnostic events are struct-based message types with a `Display`
//! implementation, organized by subsystem:
//!
//! * `messages::queue` - device queue lifecycle and worker events
//! * `messages::session` - batch dispatch and execution session events
//!
//! The struct-per-message pattern keeps log strings out of the engine code
//! and gives every event a stable set of structured fields.

pub mod messages;
