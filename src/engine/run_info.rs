// Copyright (c) 2026 tensorq contributors
// SPDX-License-Identifier: MIT

//! Job descriptors and the completion/unblock protocol.
//!
//! A [`RunInfo`] describes one unit of queued work: a model run, a script
//! run, or a DAG. It is created at admission time, owned by the submitting
//! thread until pushed, owned by the worker thread after popping, and handed
//! to the completion protocol exactly once. The queue machinery never touches
//! a job again after [`deliver`] has been called on it.
//!
//! The suspended caller is represented by a tokio `oneshot` channel: the
//! worker sends the finished descriptor through [`CompletionHandle`], and the
//! caller's [`RunTicket::wait`] performs the reply-side work (output
//! write-back, DAG persistence, stats recording) before resolving.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;

use crate::dag::DagRunInfo;
use crate::errors::RunError;
use crate::observability::messages::queue::ClientDisconnected;
use crate::observability::messages::StructuredLog;
use crate::stats::StatsRegistry;
use crate::store::{Keyspace, Model, Script, Tensor};

/// Execution context for one model invocation.
///
/// For plain model runs the inputs are bound (tensors fetched from the
/// keyspace) at admission time. For a MODELRUN op inside a DAG the inputs are
/// names resolved against the DAG's private tables just before the backend
/// call.
#[derive(Debug)]
pub struct ModelRunCtx {
    pub model_key: String,
    pub model: Arc<Model>,
    pub inputs: Vec<(String, Tensor)>,
    pub output_names: Vec<String>,
    /// Filled by the backend, parallel to `output_names`.
    pub outputs: Vec<Tensor>,
}

impl ModelRunCtx {
    pub fn new(model_key: impl Into<String>, model: Arc<Model>) -> ModelRunCtx {
        ModelRunCtx {
            model_key: model_key.into(),
            model,
            inputs: Vec::new(),
            output_names: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn add_input(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.inputs.push((name.into(), tensor));
    }

    pub fn add_output(&mut self, name: impl Into<String>) {
        self.output_names.push(name.into());
    }

    /// Leading-dimension contribution of this context to a batch.
    pub fn batch_dim(&self) -> usize {
        self.inputs
            .first()
            .map(|(_, t)| t.leading_dim())
            .unwrap_or(1)
    }
}

/// Execution context for one script function invocation.
#[derive(Debug)]
pub struct ScriptRunCtx {
    pub script_key: String,
    pub script: Arc<Script>,
    pub function: String,
    pub inputs: Vec<(String, Tensor)>,
    pub output_names: Vec<String>,
    pub outputs: Vec<Tensor>,
}

impl ScriptRunCtx {
    pub fn new(
        script_key: impl Into<String>,
        script: Arc<Script>,
        function: impl Into<String>,
    ) -> ScriptRunCtx {
        ScriptRunCtx {
            script_key: script_key.into(),
            script,
            function: function.into(),
            inputs: Vec::new(),
            output_names: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn add_input(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.inputs.push((name.into(), tensor));
    }

    pub fn add_output(&mut self, name: impl Into<String>) {
        self.output_names.push(name.into());
    }
}

/// Exactly one of these is populated per job; the enum enforces it.
#[derive(Debug)]
pub enum JobKind {
    Model(ModelRunCtx),
    Script(ScriptRunCtx),
    Dag(DagRunInfo),
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::Model(_) => "model",
            JobKind::Script(_) => "script",
            JobKind::Dag(_) => "dag",
        }
    }
}

/// One queued unit of work and its destination(s).
#[derive(Debug)]
pub struct RunInfo {
    device: String,
    /// Stats key; absent for DAG jobs.
    runkey: Option<String>,
    pub kind: JobKind,
    /// Keyspace destinations for model/script outputs.
    pub outkeys: Vec<String>,
    client: Option<CompletionHandle>,
    result: Option<Result<(), RunError>>,
    duration: Duration,
}

impl RunInfo {
    pub fn new_model(ctx: ModelRunCtx, outkeys: Vec<String>) -> RunInfo {
        RunInfo {
            device: ctx.model.device.clone(),
            runkey: Some(ctx.model_key.clone()),
            kind: JobKind::Model(ctx),
            outkeys,
            client: None,
            result: None,
            duration: Duration::ZERO,
        }
    }

    pub fn new_script(ctx: ScriptRunCtx, outkeys: Vec<String>) -> RunInfo {
        RunInfo {
            device: ctx.script.device.clone(),
            runkey: Some(ctx.script_key.clone()),
            kind: JobKind::Script(ctx),
            outkeys,
            client: None,
            result: None,
            duration: Duration::ZERO,
        }
    }

    pub fn new_dag(dag: DagRunInfo) -> RunInfo {
        RunInfo {
            device: dag.device.clone(),
            runkey: None,
            kind: JobKind::Dag(dag),
            outkeys: Vec::new(),
            client: None,
            result: None,
            duration: Duration::ZERO,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn runkey(&self) -> Option<&str> {
        self.runkey.as_deref()
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub(crate) fn set_duration(&mut self, duration: Duration) {
        self.duration = duration;
    }

    pub fn result(&self) -> Option<&Result<(), RunError>> {
        self.result.as_ref()
    }

    /// Record the terminal outcome. The first call wins; a second call is a
    /// protocol violation and is logged and ignored rather than overwriting.
    pub(crate) fn finish(&mut self, result: Result<(), RunError>) {
        if self.result.is_some() {
            tracing::error!(
                kind = self.kind.name(),
                device = %self.device,
                "attempted to finish a job twice"
            );
            return;
        }
        self.result = Some(result);
    }

    pub(crate) fn attach_client(&mut self, handle: CompletionHandle) {
        self.client = Some(handle);
    }

    /// Model identity and leading-dimension contribution, if this job can
    /// participate in a batch right now. `None` for scripts, for model runs
    /// whose model declares no batch size, and for DAGs whose next op is not
    /// a MODELRUN.
    pub(crate) fn batch_model(&self) -> Option<(Arc<Model>, usize)> {
        match &self.kind {
            JobKind::Model(ctx) if ctx.model.batchsize > 0 => {
                Some((ctx.model.clone(), ctx.batch_dim()))
            }
            JobKind::Dag(dag) => dag.head_batch_model(),
            _ => None,
        }
    }
}

/// Worker-side handle to the suspended caller.
#[derive(Debug)]
pub struct CompletionHandle {
    tx: oneshot::Sender<Box<RunInfo>>,
}

/// Resume the caller (if any) with the completed descriptor.
///
/// A missing caller means a background/internal job: the result is dropped by
/// design. A closed channel means the caller disconnected while the job was
/// queued or running; that is observed and logged, nothing more: the work
/// was already done and its result is silently discarded.
pub(crate) fn deliver(mut job: Box<RunInfo>) {
    match job.client.take() {
        Some(handle) => {
            let device = job.device.clone();
            if handle.tx.send(job).is_err() {
                ClientDisconnected { device: &device }.log();
            }
        }
        None => {
            tracing::debug!(
                kind = job.kind.name(),
                device = %job.device,
                "background job completed, no caller to resume"
            );
        }
    }
}

/// Everything the caller gets back from a completed run.
#[derive(Debug)]
pub struct RunReply {
    pub duration: Duration,
    /// TENSORGET replies, in op order. Empty for model/script runs, whose
    /// outputs go to the keyspace instead.
    pub tensors: Vec<(String, Tensor)>,
}

/// Caller-side half of the completion protocol.
///
/// Holding the ticket *is* the suspension: the submitting task is not
/// resumed until a worker delivers the finished descriptor. Dropping the
/// ticket is the disconnect case: the job still runs, its result is
/// discarded.
#[derive(Debug)]
pub struct RunTicket {
    rx: oneshot::Receiver<Box<RunInfo>>,
    keyspace: Arc<Keyspace>,
    stats: Arc<StatsRegistry>,
}

impl RunTicket {
    pub(crate) fn channel(
        keyspace: Arc<Keyspace>,
        stats: Arc<StatsRegistry>,
    ) -> (CompletionHandle, RunTicket) {
        let (tx, rx) = oneshot::channel();
        (
            CompletionHandle { tx },
            RunTicket {
                rx,
                keyspace,
                stats,
            },
        )
    }

    /// Suspend until the job completes, then run the reply-side protocol:
    /// write model/script outputs to their destination keys, persist the
    /// DAG's `persist` set, record stats, and surface exactly one of
    /// success or error.
    pub async fn wait(self) -> Result<RunReply, RunError> {
        let mut job = self.rx.await.map_err(|_| RunError::Abandoned)?;
        let result = job.result.take().unwrap_or(Err(RunError::Abandoned));
        let duration = job.duration;
        let runkey = job.runkey.clone();

        if let Err(err) = result {
            tracing::warn!(code = err.code(), "{}", err.detail_oneline());
            if let Some(key) = &runkey {
                self.stats.record(key, duration, 0, false);
            }
            return Err(err);
        }

        let mut tensors = Vec::new();
        let mut samples = 0u64;

        match &mut job.kind {
            JobKind::Model(ctx) => {
                samples = ctx
                    .outputs
                    .first()
                    .map(|t| t.leading_dim() as u64)
                    .unwrap_or(0);
                for (key, tensor) in job.outkeys.iter().zip(ctx.outputs.drain(..)) {
                    self.keyspace.set_tensor(key.clone(), tensor);
                }
            }
            JobKind::Script(ctx) => {
                for (key, tensor) in job.outkeys.iter().zip(ctx.outputs.drain(..)) {
                    self.keyspace.set_tensor(key.clone(), tensor);
                }
            }
            JobKind::Dag(dag) => {
                for name in &dag.persist {
                    match dag.local.get(name) {
                        Some(tensor) => {
                            self.keyspace.set_tensor(name.clone(), tensor.shallow_copy());
                        }
                        None => {
                            // PERSIST names must end up in the DAG-local
                            // table; anything else is a caller mistake.
                            return Err(RunError::KeyNotFound { key: name.clone() });
                        }
                    }
                }
                tensors = std::mem::take(&mut dag.replies);
            }
        }

        if let Some(key) = &runkey {
            self.stats.record(key, duration, samples, true);
        }

        Ok(RunReply { duration, tensors })
    }
}
