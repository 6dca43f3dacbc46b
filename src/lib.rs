// Copyright (c) 2026 tensorq contributors
// SPDX-License-Identifier: MIT

pub mod backends; // compute backend adapters + registry
pub mod config; // config loading + defaults
pub mod dag; // DAG parsing and chain execution
pub mod engine; // queues, batching, sessions
pub mod errors; // error handling
pub mod observability;
pub mod runtime; // admission facade
pub mod stats; // per-key run statistics
pub mod store; // keyspace, tensors, models, scripts

pub use runtime::Runtime;
