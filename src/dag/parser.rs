// Copyright (c) 2026 tensorq contributors
// SPDX-License-Identifier: MIT

//! DAG construction from a flattened command-and-separator token stream.
//!
//! Grammar (case-insensitive keywords):
//!
//! ```text
//! [LOAD <n> key1 .. keyN] [PERSIST <n> key1 .. keyN] |> OP [|> OP ..]
//! ```
//!
//! where `OP` is one of
//!
//! ```text
//! TENSORSET name dtype dim1 .. dimN VALUES v1 .. vM
//! TENSORGET name
//! MODELRUN modelkey INPUTS in1 .. OUTPUTS out1 ..
//! ```
//!
//! Parsing is also admission: LOAD tensors are fetched from the keyspace
//! into the DAG's `loaded` table here, MODELRUN contexts are constructed
//! eagerly, and the single-device rule is enforced here, so every error below
//! is returned synchronously, before the DAG touches a run queue.

use std::collections::HashMap;

use crate::dag::{DagOp, DagRunInfo};
use crate::engine::run_info::ModelRunCtx;
use crate::errors::DagParseError;
use crate::store::{DType, Keyspace, Tensor};

const PIPE: &str = "|>";

/// Parse a DAG token stream against `keyspace`, falling back to
/// `default_device` when no MODELRUN op pins the device.
pub fn parse_dag(
    tokens: &[String],
    keyspace: &Keyspace,
    default_device: &str,
) -> Result<DagRunInfo, DagParseError> {
    let mut loaded: HashMap<String, Tensor> = HashMap::new();
    let mut persist: Vec<String> = Vec::new();

    // First pass: split tokens into op slots, honoring the rule that the
    // first pipe right after a LOAD/PERSIST preamble reuses the already
    // allocated first slot instead of opening an empty one.
    let mut raw_ops: Vec<Vec<&str>> = vec![Vec::new()];
    let mut load_flag = false;
    let mut persist_flag = false;
    let mut chaining_count = 0usize;

    let mut pos = 0;
    while pos < tokens.len() {
        let tok = tokens[pos].as_str();
        if tok.eq_ignore_ascii_case("LOAD") {
            load_flag = true;
            pos += parse_load_section(tokens, pos, keyspace, &mut loaded)?;
        } else if tok.eq_ignore_ascii_case("PERSIST") {
            persist_flag = true;
            pos += parse_persist_section(tokens, pos, &mut persist)?;
        } else if tok == PIPE {
            if !((load_flag || persist_flag) && chaining_count == 0) {
                raw_ops.push(Vec::new());
            }
            chaining_count += 1;
            pos += 1;
        } else {
            match raw_ops.last_mut() {
                Some(op) => op.push(tok),
                None => unreachable!("raw_ops always holds at least one slot"),
            }
            pos += 1;
        }
    }

    if raw_ops.len() == 1 && raw_ops[0].is_empty() {
        return Err(DagParseError::EmptyPipeline);
    }

    // Second pass: compile each slot into a typed op, enforcing the
    // single-device rule across MODELRUN ops as we go.
    let mut ops = Vec::with_capacity(raw_ops.len());
    let mut device: Option<String> = None;

    for (index, raw) in raw_ops.iter().enumerate() {
        let op = compile_op(raw, index + 1, keyspace, &mut device)?;
        ops.push(op);
    }

    let device = device.unwrap_or_else(|| default_device.to_ascii_uppercase());
    let mut dag = DagRunInfo::new(device, ops);
    dag.loaded = loaded;
    dag.persist = persist;
    Ok(dag)
}

fn parse_load_section(
    tokens: &[String],
    start: usize,
    keyspace: &Keyspace,
    loaded: &mut HashMap<String, Tensor>,
) -> Result<usize, DagParseError> {
    let count = parse_count(tokens, start, "LOAD")?;
    let mut consumed = 2;
    for offset in 0..count {
        let pos = start + 2 + offset;
        match tokens.get(pos) {
            Some(tok) if tok != PIPE => {
                let tensor = keyspace.get_tensor(tok)?;
                loaded.insert(tok.clone(), tensor);
                consumed += 1;
            }
            _ => {
                return Err(DagParseError::TruncatedSection {
                    section: "LOAD",
                    expected: count,
                    found: offset,
                })
            }
        }
    }
    Ok(consumed)
}

fn parse_persist_section(
    tokens: &[String],
    start: usize,
    persist: &mut Vec<String>,
) -> Result<usize, DagParseError> {
    let count = parse_count(tokens, start, "PERSIST")?;
    let mut consumed = 2;
    for offset in 0..count {
        let pos = start + 2 + offset;
        match tokens.get(pos) {
            Some(tok) if tok != PIPE => {
                persist.push(tok.clone());
                consumed += 1;
            }
            _ => {
                return Err(DagParseError::TruncatedSection {
                    section: "PERSIST",
                    expected: count,
                    found: offset,
                })
            }
        }
    }
    Ok(consumed)
}

fn parse_count(
    tokens: &[String],
    start: usize,
    section: &'static str,
) -> Result<usize, DagParseError> {
    let token = tokens.get(start + 1).map(String::as_str).unwrap_or("");
    match token.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(DagParseError::BadCount {
            section,
            token: token.to_string(),
        }),
    }
}

fn compile_op(
    raw: &[&str],
    index: usize,
    keyspace: &Keyspace,
    device: &mut Option<String>,
) -> Result<DagOp, DagParseError> {
    let command = match raw.first() {
        Some(c) => *c,
        None => return Err(DagParseError::EmptyOp { index }),
    };

    if command.eq_ignore_ascii_case("TENSORSET") {
        compile_tensorset(raw)
    } else if command.eq_ignore_ascii_case("TENSORGET") {
        let name = raw.get(1).ok_or(DagParseError::MissingArgument {
            command: "TENSORGET",
            argument: "name",
        })?;
        // Trailing format tokens (VALUES / META) are accepted and ignored.
        Ok(DagOp::TensorGet {
            name: name.to_string(),
        })
    } else if command.eq_ignore_ascii_case("MODELRUN") {
        compile_modelrun(raw, keyspace, device)
    } else {
        Err(DagParseError::UnknownCommand {
            token: command.to_string(),
        })
    }
}

fn compile_tensorset(raw: &[&str]) -> Result<DagOp, DagParseError> {
    let name = raw.get(1).ok_or(DagParseError::MissingArgument {
        command: "TENSORSET",
        argument: "name",
    })?;
    let dtype_tok = raw.get(2).ok_or(DagParseError::MissingArgument {
        command: "TENSORSET",
        argument: "dtype",
    })?;
    let dtype = DType::parse(dtype_tok).ok_or_else(|| DagParseError::InvalidTensorLiteral {
        name: name.to_string(),
        reason: format!("unknown dtype '{}'", dtype_tok),
    })?;

    let mut shape = Vec::new();
    let mut pos = 3;
    while pos < raw.len() && !raw[pos].eq_ignore_ascii_case("VALUES") {
        let dim = raw[pos]
            .parse::<usize>()
            .map_err(|_| DagParseError::InvalidTensorLiteral {
                name: name.to_string(),
                reason: format!("shape dimension '{}' is not a number", raw[pos]),
            })?;
        shape.push(dim);
        pos += 1;
    }
    if pos >= raw.len() {
        return Err(DagParseError::MissingArgument {
            command: "TENSORSET",
            argument: "VALUES",
        });
    }

    let values = &raw[pos + 1..];
    let tensor = Tensor::from_values(dtype, shape, values).ok_or_else(|| {
        DagParseError::InvalidTensorLiteral {
            name: name.to_string(),
            reason: "values do not match the declared dtype and shape".into(),
        }
    })?;
    Ok(DagOp::TensorSet {
        name: name.to_string(),
        tensor,
    })
}

fn compile_modelrun(
    raw: &[&str],
    keyspace: &Keyspace,
    device: &mut Option<String>,
) -> Result<DagOp, DagParseError> {
    let model_key = raw.get(1).ok_or(DagParseError::MissingArgument {
        command: "MODELRUN",
        argument: "model key",
    })?;
    let model = keyspace.get_model(model_key)?;

    // A DAG admits at most one device; reject before anything executes.
    let model_device = model.device.to_ascii_uppercase();
    match device {
        Some(first) if !first.eq_ignore_ascii_case(&model_device) => {
            return Err(DagParseError::DeviceMismatch {
                first: first.clone(),
                second: model_device,
            });
        }
        Some(_) => {}
        None => *device = Some(model_device),
    }

    let inputs_at = raw
        .iter()
        .position(|t| t.eq_ignore_ascii_case("INPUTS"))
        .ok_or(DagParseError::MissingArgument {
            command: "MODELRUN",
            argument: "INPUTS",
        })?;
    let outputs_at = raw
        .iter()
        .position(|t| t.eq_ignore_ascii_case("OUTPUTS"))
        .filter(|at| *at > inputs_at)
        .ok_or(DagParseError::MissingArgument {
            command: "MODELRUN",
            argument: "OUTPUTS",
        })?;

    let input_names: Vec<String> = raw[inputs_at + 1..outputs_at]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let output_names: Vec<String> = raw[outputs_at + 1..].iter().map(|s| s.to_string()).collect();

    let mut ctx = ModelRunCtx::new(model_key.to_string(), model);
    for out in &output_names {
        ctx.add_output(out.clone());
    }

    Ok(DagOp::ModelRun {
        ctx,
        input_names,
        output_names,
    })
}
