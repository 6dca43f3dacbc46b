// Copyright (c) 2026 tensorq contributors
// SPDX-License-Identifier: MIT

//! Misbehaving backends for failure-path tests.

use std::time::Duration;

use crate::backends::Backend;
use crate::engine::run_info::{ModelRunCtx, ScriptRunCtx};
use crate::errors::RunError;

/// Fails every call with a fixed execution error.
pub struct FailingBackend;

impl Backend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn run_model(&self, _batch: &mut [&mut ModelRunCtx]) -> Result<(), RunError> {
        Err(RunError::BackendExecutionError {
            detail: "deliberate failure\nsecond line of detail".into(),
            oneline: "deliberate failure second line of detail".into(),
        })
    }

    fn run_script(&self, _ctx: &mut ScriptRunCtx) -> Result<(), RunError> {
        Err(RunError::BackendExecutionError {
            detail: "deliberate failure".into(),
            oneline: "deliberate failure".into(),
        })
    }
}

/// Panics inside the model call, for worker containment tests.
pub struct PanickingBackend;

impl Backend for PanickingBackend {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn run_model(&self, _batch: &mut [&mut ModelRunCtx]) -> Result<(), RunError> {
        panic!("backend blew up");
    }

    fn run_script(&self, _ctx: &mut ScriptRunCtx) -> Result<(), RunError> {
        panic!("backend blew up");
    }
}

/// Echoes inputs after sleeping, to hold a worker busy while followers queue.
pub struct SlowEchoBackend {
    pub delay: Duration,
}

impl Backend for SlowEchoBackend {
    fn name(&self) -> &'static str {
        "slow-echo"
    }

    fn run_model(&self, batch: &mut [&mut ModelRunCtx]) -> Result<(), RunError> {
        std::thread::sleep(self.delay);
        for ctx in batch.iter_mut() {
            ctx.outputs = (0..ctx.output_names.len())
                .filter_map(|i| {
                    ctx.inputs
                        .get(i % ctx.inputs.len().max(1))
                        .map(|(_, t)| t.shallow_copy())
                })
                .collect();
        }
        Ok(())
    }

    fn run_script(&self, ctx: &mut ScriptRunCtx) -> Result<(), RunError> {
        std::thread::sleep(self.delay);
        ctx.outputs = ctx
            .inputs
            .iter()
            .take(ctx.output_names.len())
            .map(|(_, t)| t.shallow_copy())
            .collect();
        Ok(())
    }
}
