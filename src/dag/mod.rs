// Copyright (c) 2026 tensorq contributors
// SPDX-License-Identifier: MIT

//! DAG jobs: an ordered chain of tensor/model operations sharing a private
//! namespace, executed as one queued unit of work.
//!
//! A DAG is a fixed two-stage pipeline (load, then an ordered op sequence)
//! followed by selective persistence. It is not a general dataflow graph:
//! there are no joins or branches, only declaration order.

pub mod chain;
pub mod parser;

use std::collections::HashMap;
use std::sync::Arc;

use crate::engine::run_info::ModelRunCtx;
use crate::store::{Model, Tensor};

pub use parser::parse_dag;

/// Lifecycle of one DAG job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DagState {
    Parsed,
    Running,
    Completed,
    Failed,
}

/// One step in a DAG chain.
#[derive(Debug)]
pub enum DagOp {
    /// Write a literal tensor into the DAG-local namespace.
    TensorSet { name: String, tensor: Tensor },
    /// Read a tensor from the loaded/local namespace and mark it for reply.
    TensorGet { name: String },
    /// Run a model over named inputs, writing named outputs to the local
    /// namespace. The context is constructed eagerly at parse time; inputs
    /// are bound just before the backend call.
    ModelRun {
        ctx: ModelRunCtx,
        input_names: Vec<String>,
        output_names: Vec<String>,
    },
}

impl DagOp {
    pub fn command_name(&self) -> &'static str {
        match self {
            DagOp::TensorSet { .. } => "TENSORSET",
            DagOp::TensorGet { .. } => "TENSORGET",
            DagOp::ModelRun { .. } => "MODELRUN",
        }
    }
}

/// A parsed DAG: the op chain plus its three string-keyed symbol tables.
///
/// `loaded` is populated from the keyspace at parse time, `local` holds
/// tensors produced within this DAG's lifetime, and `persist` names the
/// local tensors written back to the keyspace after completion. Everything
/// else in `local` is discarded with the DAG.
#[derive(Debug)]
pub struct DagRunInfo {
    /// Single admitted device; taken from the first MODELRUN op, or the
    /// configured fallback for pure tensor-manipulation DAGs.
    pub device: String,
    pub state: DagState,
    ops: Vec<DagOp>,
    /// Index of the first unexecuted op. Advanced by the chain executor and
    /// by the batching path when the head MODELRUN runs as part of a merged
    /// backend call.
    next_op: usize,
    pub loaded: HashMap<String, Tensor>,
    pub local: HashMap<String, Tensor>,
    pub persist: Vec<String>,
    /// TENSORGET results, in op order.
    pub replies: Vec<(String, Tensor)>,
}

impl DagRunInfo {
    pub(crate) fn new(device: String, ops: Vec<DagOp>) -> DagRunInfo {
        DagRunInfo {
            device,
            state: DagState::Parsed,
            ops,
            next_op: 0,
            loaded: HashMap::new(),
            local: HashMap::new(),
            persist: Vec::new(),
            replies: Vec::new(),
        }
    }

    pub fn ops(&self) -> &[DagOp] {
        &self.ops
    }

    pub(crate) fn ops_mut(&mut self) -> &mut [DagOp] {
        &mut self.ops
    }

    pub fn next_op(&self) -> usize {
        self.next_op
    }

    pub(crate) fn advance(&mut self) {
        self.next_op += 1;
    }

    /// Look up a tensor the way ops see the namespace: `local` shadows
    /// `loaded`.
    pub fn resolve(&self, name: &str) -> Option<&Tensor> {
        self.local.get(name).or_else(|| self.loaded.get(name))
    }

    /// Model identity and leading-dim contribution of the next op, when that
    /// op is a batchable MODELRUN. This is what lets a queued DAG join a
    /// batch with plain model-run jobs and with other DAGs.
    pub(crate) fn head_batch_model(&self) -> Option<(Arc<Model>, usize)> {
        match self.ops.get(self.next_op)? {
            DagOp::ModelRun {
                ctx, input_names, ..
            } if ctx.model.batchsize > 0 => {
                let dim = input_names
                    .first()
                    .and_then(|n| self.resolve(n))
                    .map(|t| t.leading_dim())
                    .unwrap_or(1);
                Some((ctx.model.clone(), dim))
            }
            _ => None,
        }
    }
}
