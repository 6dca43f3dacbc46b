// Copyright (c) 2026 tensorq contributors
// SPDX-License-Identifier: MIT

//! The runtime facade: keyspace, backends, device queues and stats behind one
//! admission API.
//!
//! Admission is synchronous and happens on the caller's thread: keys are
//! resolved, input tensors fetched, backends checked (triggering a lazy load
//! if one is registered) and run contexts built *before* anything is queued.
//! A job that makes it onto a queue can therefore only fail in execution, not
//! in lookup.

use std::sync::Arc;

use crate::backends::BackendRegistry;
use crate::config::RuntimeConfig;
use crate::dag::{self, DagOp, DagRunInfo};
use crate::engine::run_info::{ModelRunCtx, RunInfo, RunTicket, ScriptRunCtx};
use crate::engine::run_queue::{DeviceRegistry, WorkerContext};
use crate::errors::{DagParseError, RunError};
use crate::stats::StatsRegistry;
use crate::store::Keyspace;

pub struct Runtime {
    config: RuntimeConfig,
    keyspace: Arc<Keyspace>,
    backends: Arc<BackendRegistry>,
    queues: DeviceRegistry,
    stats: Arc<StatsRegistry>,
}

impl Runtime {
    /// Construct a runtime from a validated configuration.
    pub fn new(config: RuntimeConfig) -> Result<Runtime, crate::config::ConfigError> {
        config.validate()?;
        Ok(Runtime::build(config))
    }

    /// Construct a runtime with the built-in defaults.
    pub fn with_defaults() -> Runtime {
        Runtime::build(RuntimeConfig::default())
    }

    fn build(config: RuntimeConfig) -> Runtime {
        let backends = Arc::new(BackendRegistry::new());
        let queues = DeviceRegistry::new(
            config.threads_per_queue,
            WorkerContext {
                backends: backends.clone(),
                minbatch_wait: config.minbatch_wait(),
            },
        );
        Runtime {
            config,
            keyspace: Arc::new(Keyspace::new()),
            backends,
            queues,
            stats: Arc::new(StatsRegistry::new()),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn keyspace(&self) -> &Arc<Keyspace> {
        &self.keyspace
    }

    pub fn backends(&self) -> &Arc<BackendRegistry> {
        &self.backends
    }

    pub fn stats(&self) -> &Arc<StatsRegistry> {
        &self.stats
    }

    /// Devices that currently have a queue.
    pub fn devices(&self) -> Vec<String> {
        self.queues.devices()
    }

    /// Create (or fetch) the run queue for `device`, spawning its workers on
    /// first use. Submission does this implicitly; calling it up front warms
    /// a device before the first job arrives.
    pub fn ensure_queue(&self, device: &str) -> Result<Arc<crate::engine::RunQueue>, RunError> {
        self.queues.ensure_queue(device)
    }

    /// Run the model under `model_key` over tensors at `input_keys`, writing
    /// outputs to `output_keys` on completion.
    pub fn submit_model_run(
        &self,
        model_key: &str,
        input_keys: &[&str],
        output_keys: &[&str],
    ) -> Result<RunTicket, RunError> {
        let model = self.keyspace.get_model(model_key)?;
        self.backends.get_or_load(model.backend)?;

        let mut ctx = ModelRunCtx::new(model_key, model.clone());
        for (i, key) in input_keys.iter().enumerate() {
            let tensor = self.keyspace.get_tensor(key)?;
            let name = model
                .inputs
                .get(i)
                .cloned()
                .unwrap_or_else(|| key.to_string());
            ctx.add_input(name, tensor);
        }
        for (i, key) in output_keys.iter().enumerate() {
            let name = model
                .outputs
                .get(i)
                .cloned()
                .unwrap_or_else(|| key.to_string());
            ctx.add_output(name);
        }

        let outkeys = output_keys.iter().map(|k| k.to_string()).collect();
        self.submit(RunInfo::new_model(ctx, outkeys))
    }

    /// Invoke `function` of the script under `script_key`.
    pub fn submit_script_run(
        &self,
        script_key: &str,
        function: &str,
        input_keys: &[&str],
        output_keys: &[&str],
    ) -> Result<RunTicket, RunError> {
        let script = self.keyspace.get_script(script_key)?;
        // Scripts that declare entry points restrict callers to them; a
        // script without declared entry points accepts any function name and
        // leaves resolution to the backend.
        if !script.entry_points.is_empty()
            && !script.entry_points.iter().any(|ep| ep == function)
        {
            return Err(RunError::ScriptFunctionNotFound {
                key: script_key.to_string(),
                function: function.to_string(),
            });
        }
        self.backends.get_or_load(script.backend)?;

        let mut ctx = ScriptRunCtx::new(script_key, script, function);
        for key in input_keys {
            let tensor = self.keyspace.get_tensor(key)?;
            ctx.add_input(key.to_string(), tensor);
        }
        for key in output_keys {
            ctx.add_output(key.to_string());
        }

        let outkeys = output_keys.iter().map(|k| k.to_string()).collect();
        self.submit(RunInfo::new_script(ctx, outkeys))
    }

    /// Parse a DAG token stream against this runtime's keyspace.
    pub fn parse_dag(&self, tokens: &[String]) -> Result<DagRunInfo, DagParseError> {
        dag::parse_dag(tokens, &self.keyspace, &self.config.default_device)
    }

    /// Parse and enqueue a DAG. Backend presence for every MODELRUN op is
    /// checked here so a missing backend surfaces at admission.
    pub fn submit_dag(&self, tokens: &[String]) -> Result<RunTicket, RunError> {
        let dag = self.parse_dag(tokens).map_err(RunError::from)?;
        for op in dag.ops() {
            if let DagOp::ModelRun { ctx, .. } = op {
                self.backends.get_or_load(ctx.model.backend)?;
            }
        }
        self.submit(RunInfo::new_dag(dag))
    }

    /// Enqueue a job and return the caller's half of the completion protocol.
    pub fn submit(&self, job: RunInfo) -> Result<RunTicket, RunError> {
        let mut job = Box::new(job);
        let (handle, ticket) = RunTicket::channel(self.keyspace.clone(), self.stats.clone());
        job.attach_client(handle);
        self.enqueue(job)?;
        Ok(ticket)
    }

    /// Enqueue a job nobody waits for; its result is dropped on completion.
    pub fn submit_detached(&self, job: RunInfo) -> Result<(), RunError> {
        self.enqueue(Box::new(job))
    }

    fn enqueue(&self, job: Box<RunInfo>) -> Result<(), RunError> {
        let device = if job.device().is_empty() {
            self.config.default_device.as_str()
        } else {
            job.device()
        };
        let queue = self.queues.ensure_queue(device)?;
        queue.push(job);
        Ok(())
    }

    /// Drain every queue and join every worker thread.
    pub fn shutdown(&self) {
        self.queues.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::echo::EchoBackend;
    use crate::store::{BackendKind, Model, Script, Tensor};

    #[test]
    fn model_run_against_a_missing_model_fails_at_admission() {
        let rt = Runtime::with_defaults();
        let err = rt.submit_model_run("ghost", &["in"], &["out"]).unwrap_err();
        assert_eq!(err.code(), "ENOTFOUND");
    }

    #[test]
    fn model_run_without_its_backend_fails_at_admission() {
        let rt = Runtime::with_defaults();
        rt.keyspace()
            .set_model("m", Model::new(BackendKind::Torch, "CPU"));
        rt.keyspace()
            .set_tensor("in", Tensor::from_f32(vec![1], &[1.0]).unwrap());
        let err = rt.submit_model_run("m", &["in"], &["out"]).unwrap_err();
        assert_eq!(err.code(), "EBACKENDNOTLOADED");
    }

    #[test]
    fn script_entry_points_gate_the_function() {
        let rt = Runtime::with_defaults();
        rt.backends()
            .register(BackendKind::Torch, Arc::new(EchoBackend::new()));
        rt.keyspace().set_script(
            "s",
            Script::new("CPU", "def f(x): return x").with_entry_points(vec!["f"]),
        );
        rt.keyspace()
            .set_tensor("in", Tensor::from_f32(vec![1], &[1.0]).unwrap());

        let err = rt
            .submit_script_run("s", "g", &["in"], &["out"])
            .unwrap_err();
        assert_eq!(err.code(), "ENOFUNCTION");

        assert!(rt.submit_script_run("s", "f", &["in"], &["out"]).is_ok());
        rt.shutdown();
    }

    #[test]
    fn dag_parse_errors_surface_as_run_errors() {
        let rt = Runtime::with_defaults();
        let err = rt
            .submit_dag(&["NOSUCHOP".to_string(), "x".to_string()])
            .unwrap_err();
        assert_eq!(err.code(), "EPARSE");
    }
}
