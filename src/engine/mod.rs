// Copyright (c) 2026 tensorq contributors
// SPDX-License-Identifier: MIT

//! The run engine: job descriptors, per-device queues, batch gathering and
//! execution sessions.
//!
//! Admission happens on the caller's thread (synchronously, before anything
//! is queued); execution happens on a device queue's worker threads; the
//! completion protocol resumes the suspended caller exactly once per job.

pub mod batching;
pub mod run_info;
pub mod run_queue;
pub mod session;


pub use run_info::{JobKind, ModelRunCtx, RunInfo, RunReply, RunTicket, ScriptRunCtx};
pub use run_queue::{DeviceRegistry, RunQueue};
