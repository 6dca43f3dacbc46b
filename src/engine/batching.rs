//! Batch gathering over a device queue.
//!
//! Gathering happens with the queue lock held, so only cheap checks are
//! allowed here: model identity is `Arc` pointer equality and capacity is
//! leading-dimension arithmetic against the model's declared batch size.
//! Followers are taken strictly from the front of the queue; the first
//! non-matching job ends the batch, preserving FIFO order for everyone
//! behind it.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::engine::run_info::RunInfo;
use crate::store::Model;

/// Running capacity state of a batch being gathered.
pub(crate) struct BatchAccumulator {
    pub model: Arc<Model>,
    pub total_dim: usize,
}

impl BatchAccumulator {
    /// Minimum batch the model prefers, if it declares one.
    pub fn minbatch(&self) -> usize {
        self.model.minbatchsize
    }

    pub fn wants_more(&self) -> bool {
        self.total_dim < self.model.minbatchsize
    }
}

/// Pop the head job and greedily absorb same-model followers behind it.
///
/// Returns the gathered jobs plus the accumulator when the head was
/// batchable; a non-batchable head comes back alone with `None`.
pub(crate) fn gather(
    queue: &mut VecDeque<Box<RunInfo>>,
) -> (Vec<Box<RunInfo>>, Option<BatchAccumulator>) {
    let head = match queue.pop_front() {
        Some(job) => job,
        None => return (Vec::new(), None),
    };

    let mut acc = match head.batch_model() {
        Some((model, dim)) => BatchAccumulator {
            model,
            total_dim: dim,
        },
        None => return (vec![head], None),
    };

    let mut batch = vec![head];
    gather_more(queue, &mut batch, &mut acc);
    (batch, Some(acc))
}

/// Absorb same-model followers from the queue front while capacity remains.
pub(crate) fn gather_more(
    queue: &mut VecDeque<Box<RunInfo>>,
    batch: &mut Vec<Box<RunInfo>>,
    acc: &mut BatchAccumulator,
) {
    while let Some(next) = queue.front() {
        let dim = match next.batch_model() {
            Some((model, dim)) if Arc::ptr_eq(&model, &acc.model) => dim,
            _ => break,
        };
        if acc.total_dim + dim > acc.model.batchsize {
            break;
        }
        acc.total_dim += dim;
        match queue.pop_front() {
            Some(job) => batch.push(job),
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::run_info::ModelRunCtx;
    use crate::store::{BackendKind, Tensor};

    fn model(batchsize: usize, minbatchsize: usize) -> Arc<Model> {
        Arc::new(
            Model::new(BackendKind::Tensorflow, "CPU")
                .with_batching(batchsize, minbatchsize)
                .with_io(vec!["a"], vec!["b"]),
        )
    }

    fn job(model: &Arc<Model>, dim: usize) -> Box<RunInfo> {
        let mut ctx = ModelRunCtx::new("m", model.clone());
        ctx.add_input(
            "a",
            Tensor::zeroed(crate::store::DType::Float, vec![dim, 2]).unwrap(),
        );
        ctx.add_output("b");
        Box::new(RunInfo::new_model(ctx, vec!["out".into()]))
    }

    #[test]
    fn empty_queue_gathers_nothing() {
        let mut queue = VecDeque::new();
        let (batch, acc) = gather(&mut queue);
        assert!(batch.is_empty());
        assert!(acc.is_none());
    }

    #[test]
    fn same_model_followers_merge_within_capacity() {
        let m = model(4, 0);
        let mut queue: VecDeque<Box<RunInfo>> =
            VecDeque::from([job(&m, 1), job(&m, 2), job(&m, 1)]);

        let (batch, acc) = gather(&mut queue);
        assert_eq!(batch.len(), 3);
        assert_eq!(acc.unwrap().total_dim, 4);
        assert!(queue.is_empty());
    }

    #[test]
    fn capacity_overflow_stops_the_gather() {
        let m = model(3, 0);
        let mut queue: VecDeque<Box<RunInfo>> =
            VecDeque::from([job(&m, 2), job(&m, 2), job(&m, 1)]);

        let (batch, acc) = gather(&mut queue);
        // The dim-2 follower would overflow; it stays queued along with
        // everything behind it, even though the dim-1 job would have fit.
        assert_eq!(batch.len(), 1);
        assert_eq!(acc.unwrap().total_dim, 2);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn different_model_instance_ends_the_batch() {
        let m1 = model(8, 0);
        let m2 = model(8, 0);
        let mut queue: VecDeque<Box<RunInfo>> =
            VecDeque::from([job(&m1, 1), job(&m2, 1), job(&m1, 1)]);

        let (batch, _) = gather(&mut queue);
        // Same shape, different stored model: identity is by Arc pointer.
        assert_eq!(batch.len(), 1);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn unbatchable_head_runs_alone() {
        let m = model(0, 0);
        let mut queue: VecDeque<Box<RunInfo>> = VecDeque::from([job(&m, 1), job(&m, 1)]);

        let (batch, acc) = gather(&mut queue);
        assert_eq!(batch.len(), 1);
        assert!(acc.is_none());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn accumulator_reports_minbatch_shortfall() {
        let m = model(8, 4);
        let mut queue: VecDeque<Box<RunInfo>> = VecDeque::from([job(&m, 1)]);
        let (_, acc) = gather(&mut queue);
        let acc = acc.unwrap();
        assert!(acc.wants_more());
        assert_eq!(acc.minbatch(), 4);
    }
}
