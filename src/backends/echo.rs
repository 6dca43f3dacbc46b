// Copyright (c) 2026 tensorq contributors
// SPDX-License-Identifier: MIT

//! A backend that copies inputs to outputs.
//!
//! Useful as the demo backend and as the workhorse of the engine tests: it
//! exercises the full dispatch path (queueing, batching, output write-back)
//! without a real inference runtime, and it records the shape of every batch
//! it receives so tests can assert on dispatch behavior.

use std::sync::Mutex;

use crate::backends::Backend;
use crate::engine::run_info::{ModelRunCtx, ScriptRunCtx};
use crate::errors::RunError;

/// Leading dimension and member count of one dispatched batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchObservation {
    pub members: usize,
    pub total_dim: usize,
}

pub struct EchoBackend {
    batches: Mutex<Vec<BatchObservation>>,
}

impl EchoBackend {
    pub fn new() -> EchoBackend {
        EchoBackend {
            batches: Mutex::new(Vec::new()),
        }
    }

    /// Every batch this adapter has executed, in dispatch order.
    pub fn observed_batches(&self) -> Vec<BatchObservation> {
        match self.batches.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record(&self, members: usize, total_dim: usize) {
        let mut batches = match self.batches.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        batches.push(BatchObservation { members, total_dim });
    }
}

impl Default for EchoBackend {
    fn default() -> Self {
        EchoBackend::new()
    }
}

impl Backend for EchoBackend {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn run_model(&self, batch: &mut [&mut ModelRunCtx]) -> Result<(), RunError> {
        let total_dim = batch.iter().map(|ctx| ctx.batch_dim()).sum();
        self.record(batch.len(), total_dim);

        for ctx in batch.iter_mut() {
            if ctx.inputs.is_empty() {
                return Err(RunError::BackendExecutionError {
                    detail: format!("model '{}' invoked with no inputs", ctx.model_key),
                    oneline: format!("model '{}' invoked with no inputs", ctx.model_key),
                });
            }
            ctx.outputs = (0..ctx.output_names.len())
                .map(|i| ctx.inputs[i % ctx.inputs.len()].1.shallow_copy())
                .collect();
        }
        Ok(())
    }

    fn run_script(&self, ctx: &mut ScriptRunCtx) -> Result<(), RunError> {
        if ctx.inputs.is_empty() {
            return Err(RunError::BackendExecutionError {
                detail: format!(
                    "script '{}' function '{}' invoked with no inputs",
                    ctx.script_key, ctx.function
                ),
                oneline: format!("script '{}' invoked with no inputs", ctx.script_key),
            });
        }
        ctx.outputs = (0..ctx.output_names.len())
            .map(|i| ctx.inputs[i % ctx.inputs.len()].1.shallow_copy())
            .collect();
        Ok(())
    }
}
