// Copyright (c) 2026 tensorq contributors
// SPDX-License-Identifier: MIT

//! Execution sessions: one gathered batch, one backend call, one outcome per
//! job.
//!
//! A session owns the batch from the moment the worker releases the queue
//! lock until every member carries a terminal result. A batch of model work
//! (plain model runs and DAGs whose next op is a MODELRUN on the same model)
//! is executed through a *single* backend call; on failure every member
//! receives the same error. Scripts and DAGs without a batchable head run
//! singly.
//!
//! Sessions never panic across their boundary: the worker wraps `run` in
//! `catch_unwind` and converts an escape into per-job failures.

use std::time::Instant;

use crate::backends::BackendRegistry;
use crate::dag::{chain, DagState};
use crate::engine::run_info::{JobKind, ModelRunCtx, RunInfo};
use crate::errors::RunError;
use crate::observability::messages::session::{
    BatchDispatched, SessionCompleted, SessionFailed,
};
use crate::observability::messages::StructuredLog;

pub(crate) struct ExecutionSession<'a> {
    device: &'a str,
    backends: &'a BackendRegistry,
}

impl<'a> ExecutionSession<'a> {
    pub fn new(device: &'a str, backends: &'a BackendRegistry) -> ExecutionSession<'a> {
        ExecutionSession { device, backends }
    }

    /// Execute the batch. Every job carries a result when this returns.
    pub fn run(&self, batch: &mut [Box<RunInfo>]) {
        if batch.is_empty() {
            return;
        }
        if batch.len() == 1 {
            match &batch[0].kind {
                JobKind::Script(_) => return self.run_script_job(&mut batch[0]),
                JobKind::Dag(_) => return self.run_solo_dag(&mut batch[0]),
                JobKind::Model(_) => {}
            }
        }
        self.run_model_batch(batch);
    }

    fn run_script_job(&self, job: &mut RunInfo) {
        let started = Instant::now();
        let result = match &mut job.kind {
            JobKind::Script(ctx) => self
                .backends
                .get_or_load(ctx.script.backend)
                .and_then(|backend| backend.run_script(ctx)),
            _ => unreachable!("run_script_job called with a non-script job"),
        };
        job.set_duration(started.elapsed());
        self.note_outcome(1, started, &result);
        job.finish(result);
    }

    fn run_solo_dag(&self, job: &mut RunInfo) {
        let started = Instant::now();
        let result = match &mut job.kind {
            JobKind::Dag(dag) => chain::run_chain(dag, self.backends),
            _ => unreachable!("run_solo_dag called with a non-dag job"),
        };
        job.set_duration(started.elapsed());
        self.note_outcome(1, started, &result);
        job.finish(result);
    }

    /// All members are model runs or DAGs whose next op is a MODELRUN on the
    /// same model; the gather step guarantees it.
    fn run_model_batch(&self, batch: &mut [Box<RunInfo>]) {
        let started = Instant::now();

        // Bind DAG heads first. A bind failure fails that DAG alone and
        // removes it from the backend call.
        for job in batch.iter_mut() {
            if let JobKind::Dag(dag) = &mut job.kind {
                if let Err(err) = chain::bind_head(dag) {
                    job.set_duration(started.elapsed());
                    job.finish(Err(err));
                }
            }
        }

        let call_result = {
            let mut ctxs: Vec<&mut ModelRunCtx> = batch
                .iter_mut()
                .filter(|job| job.result().is_none())
                .filter_map(|job| match &mut job.kind {
                    JobKind::Model(ctx) => Some(ctx),
                    JobKind::Dag(dag) => chain::head_ctx(dag),
                    JobKind::Script(_) => None,
                })
                .collect();
            if ctxs.is_empty() {
                return;
            }

            let total_dim: usize = ctxs.iter().map(|ctx| ctx.batch_dim()).sum();
            let dispatch = BatchDispatched {
                device: self.device,
                members: ctxs.len(),
                total_dim,
            };
            dispatch.log();
            let _call_span = dispatch.span("backend_call").entered();

            match self.backends.get_or_load(ctxs[0].model.backend) {
                Ok(backend) => backend.run_model(ctxs.as_mut_slice()),
                Err(err) => Err(err),
            }
        };

        let call_duration = started.elapsed();
        self.note_outcome(batch.len(), started, &call_result);

        // Fan out: on success each member resolves individually (DAGs still
        // have a tail to run); on failure every member gets the same error.
        for job in batch.iter_mut() {
            if job.result().is_some() {
                continue;
            }
            match &call_result {
                Ok(()) => match &mut job.kind {
                    JobKind::Model(_) => {
                        job.set_duration(call_duration);
                        job.finish(Ok(()));
                    }
                    JobKind::Dag(dag) => {
                        chain::absorb_head_outputs(dag);
                        let tail = chain::run_chain(dag, self.backends);
                        job.set_duration(started.elapsed());
                        job.finish(tail);
                    }
                    JobKind::Script(_) => {}
                },
                Err(err) => {
                    let result = match &mut job.kind {
                        JobKind::Dag(dag) => {
                            dag.state = DagState::Failed;
                            Err(RunError::DagOpFailed {
                                index: dag.next_op() + 1,
                                command: "MODELRUN",
                                source: Box::new(err.clone()),
                            })
                        }
                        _ => Err(err.clone()),
                    };
                    job.set_duration(call_duration);
                    job.finish(result);
                }
            }
        }
    }

    fn note_outcome(&self, members: usize, started: Instant, result: &Result<(), RunError>) {
        match result {
            Ok(()) => SessionCompleted {
                device: self.device,
                members,
                duration: started.elapsed(),
            }
            .log(),
            Err(err) => SessionFailed {
                device: self.device,
                code: err.code(),
                oneline: &err.detail_oneline(),
            }
            .log(),
        }
    }
}
