//! Sequential execution of a DAG's op chain on a worker thread.
//!
//! Ops run strictly in declaration order against the DAG's private
//! loaded/local tables. The first failing op stops the chain: later ops never
//! run, and the error carries the 1-based index and command of the op that
//! failed.
//!
//! The batching path in the session handles the *head* MODELRUN op itself
//! (so it can merge the backend call with other jobs) via [`bind_head`],
//! [`head_ctx`] and [`absorb_head_outputs`], then hands the rest of the chain
//! to [`run_chain`].

use crate::backends::BackendRegistry;
use crate::dag::{DagOp, DagRunInfo, DagState};
use crate::engine::run_info::ModelRunCtx;
use crate::errors::RunError;
use crate::store::Tensor;

/// Run every remaining op in order. Terminal: leaves the DAG `Completed` or
/// `Failed`.
pub(crate) fn run_chain(dag: &mut DagRunInfo, backends: &BackendRegistry) -> Result<(), RunError> {
    if dag.state == DagState::Parsed {
        dag.state = DagState::Running;
    }
    while dag.next_op() < dag.ops().len() {
        let idx = dag.next_op();
        if let Err(source) = run_op(dag, idx, backends) {
            dag.state = DagState::Failed;
            return Err(RunError::DagOpFailed {
                index: idx + 1,
                command: dag.ops()[idx].command_name(),
                source: Box::new(source),
            });
        }
        dag.advance();
    }
    dag.state = DagState::Completed;
    Ok(())
}

fn run_op(dag: &mut DagRunInfo, idx: usize, backends: &BackendRegistry) -> Result<(), RunError> {
    let DagRunInfo {
        ops,
        loaded,
        local,
        replies,
        ..
    } = dag;
    match &mut ops[idx] {
        DagOp::TensorSet { name, tensor } => {
            local.insert(name.clone(), tensor.shallow_copy());
            Ok(())
        }
        DagOp::TensorGet { name } => {
            let tensor = resolve(local, loaded, name)?;
            replies.push((name.clone(), tensor));
            Ok(())
        }
        DagOp::ModelRun {
            ctx,
            input_names,
            output_names,
        } => {
            if ctx.inputs.is_empty() {
                for name in input_names.iter() {
                    let tensor = resolve(local, loaded, name)?;
                    ctx.add_input(name.clone(), tensor);
                }
            }
            let backend = backends.get_or_load(ctx.model.backend)?;
            backend.run_model(&mut [&mut *ctx])?;
            for (name, tensor) in output_names.iter().zip(ctx.outputs.drain(..)) {
                local.insert(name.clone(), tensor);
            }
            Ok(())
        }
    }
}

fn resolve(
    local: &std::collections::HashMap<String, Tensor>,
    loaded: &std::collections::HashMap<String, Tensor>,
    name: &str,
) -> Result<Tensor, RunError> {
    local
        .get(name)
        .or_else(|| loaded.get(name))
        .map(Tensor::shallow_copy)
        .ok_or_else(|| RunError::KeyNotFound {
            key: name.to_string(),
        })
}

/// Bind the head MODELRUN op's inputs from the DAG tables so its context can
/// join a merged backend call. Marks the DAG `Running`. A missing input fails
/// only this DAG, with the head op's attribution.
pub(crate) fn bind_head(dag: &mut DagRunInfo) -> Result<(), RunError> {
    dag.state = DagState::Running;
    let idx = dag.next_op();
    let bound = {
        let DagRunInfo {
            ops, loaded, local, ..
        } = &mut *dag;
        match ops.get_mut(idx) {
            Some(DagOp::ModelRun {
                ctx, input_names, ..
            }) if ctx.inputs.is_empty() => input_names.iter().try_for_each(|name| {
                resolve(local, loaded, name).map(|tensor| ctx.add_input(name.clone(), tensor))
            }),
            _ => Ok(()),
        }
    };
    if let Err(source) = bound {
        dag.state = DagState::Failed;
        return Err(RunError::DagOpFailed {
            index: idx + 1,
            command: "MODELRUN",
            source: Box::new(source),
        });
    }
    Ok(())
}

/// The head MODELRUN context, for inclusion in a merged backend call.
pub(crate) fn head_ctx(dag: &mut DagRunInfo) -> Option<&mut ModelRunCtx> {
    let idx = dag.next_op();
    match dag.ops_mut().get_mut(idx) {
        Some(DagOp::ModelRun { ctx, .. }) => Some(ctx),
        _ => None,
    }
}

/// After a merged backend call filled the head op's outputs, move them into
/// the local table and step past the op.
pub(crate) fn absorb_head_outputs(dag: &mut DagRunInfo) {
    let idx = dag.next_op();
    {
        let DagRunInfo { ops, local, .. } = dag;
        if let Some(DagOp::ModelRun {
            ctx, output_names, ..
        }) = ops.get_mut(idx)
        {
            for (name, tensor) in output_names.iter().zip(ctx.outputs.drain(..)) {
                local.insert(name.clone(), tensor);
            }
        }
    }
    dag.advance();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::echo::EchoBackend;
    use crate::dag::parse_dag;
    use crate::store::{BackendKind, Keyspace, Model, Tensor};
    use std::sync::Arc;

    fn toks(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    fn echo_registry() -> BackendRegistry {
        let registry = BackendRegistry::new();
        registry.register(BackendKind::Tensorflow, Arc::new(EchoBackend::new()));
        registry
    }

    #[test]
    fn set_then_get_round_trips_through_the_local_table() {
        let ks = Keyspace::new();
        let mut dag = parse_dag(
            &toks(&[
                "TENSORSET", "x", "FLOAT", "2", "VALUES", "1.0", "2.0", "|>", "TENSORGET", "x",
            ]),
            &ks,
            "CPU",
        )
        .unwrap();

        run_chain(&mut dag, &echo_registry()).unwrap();
        assert_eq!(dag.state, DagState::Completed);
        assert_eq!(dag.replies.len(), 1);
        assert_eq!(dag.replies[0].0, "x");
        assert_eq!(dag.replies[0].1.as_f32_vec(), Some(vec![1.0, 2.0]));
    }

    #[test]
    fn local_shadows_loaded() {
        let ks = Keyspace::new();
        ks.set_tensor("x", Tensor::from_f32(vec![1], &[9.0]).unwrap());
        let mut dag = parse_dag(
            &toks(&[
                "LOAD", "1", "x", "|>", "TENSORSET", "x", "FLOAT", "1", "VALUES", "5.0", "|>",
                "TENSORGET", "x",
            ]),
            &ks,
            "CPU",
        )
        .unwrap();

        run_chain(&mut dag, &echo_registry()).unwrap();
        assert_eq!(dag.replies[0].1.as_f32_vec(), Some(vec![5.0]));
    }

    #[test]
    fn failing_op_stops_the_chain_with_its_position() {
        let ks = Keyspace::new();
        ks.set_model(
            "m",
            Model::new(BackendKind::Tensorflow, "CPU").with_io(vec!["a"], vec!["b"]),
        );
        let mut dag = parse_dag(
            &toks(&[
                "TENSORSET", "x", "FLOAT", "1", "VALUES", "1.0", "|>", "MODELRUN", "m", "INPUTS",
                "missing", "OUTPUTS", "y", "|>", "TENSORGET", "y",
            ]),
            &ks,
            "CPU",
        )
        .unwrap();

        let err = run_chain(&mut dag, &echo_registry()).unwrap_err();
        match err {
            RunError::DagOpFailed {
                index,
                command,
                source,
            } => {
                assert_eq!(index, 2);
                assert_eq!(command, "MODELRUN");
                assert!(matches!(*source, RunError::KeyNotFound { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(dag.state, DagState::Failed);
        // The TENSORGET after the failing op never ran.
        assert!(dag.replies.is_empty());
        assert_eq!(dag.next_op(), 1);
    }

    #[test]
    fn modelrun_outputs_feed_later_ops() {
        let ks = Keyspace::new();
        ks.set_model(
            "m",
            Model::new(BackendKind::Tensorflow, "CPU").with_io(vec!["a"], vec!["b"]),
        );
        let mut dag = parse_dag(
            &toks(&[
                "TENSORSET", "in", "FLOAT", "2", "VALUES", "3.0", "4.0", "|>", "MODELRUN", "m",
                "INPUTS", "in", "OUTPUTS", "out", "|>", "TENSORGET", "out",
            ]),
            &ks,
            "CPU",
        )
        .unwrap();

        run_chain(&mut dag, &echo_registry()).unwrap();
        assert_eq!(dag.state, DagState::Completed);
        assert_eq!(dag.replies[0].1.as_f32_vec(), Some(vec![3.0, 4.0]));
    }

    #[test]
    fn head_binding_failure_fails_only_at_the_head() {
        let ks = Keyspace::new();
        ks.set_model(
            "m",
            Model::new(BackendKind::Tensorflow, "CPU")
                .with_batching(4, 0)
                .with_io(vec!["a"], vec!["b"]),
        );
        let mut dag = parse_dag(
            &toks(&["MODELRUN", "m", "INPUTS", "nope", "OUTPUTS", "out"]),
            &ks,
            "CPU",
        )
        .unwrap();

        let err = bind_head(&mut dag).unwrap_err();
        assert!(matches!(err, RunError::DagOpFailed { index: 1, .. }));
        assert_eq!(dag.state, DagState::Failed);
    }
}
