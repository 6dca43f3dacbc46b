// Copyright (c) 2026 tensorq contributors
// SPDX-License-Identifier: MIT

//! Errors raised while parsing a DAG command token stream.
//!
//! Everything here is admission-time: a `DagParseError` is returned to the
//! caller synchronously and the DAG never reaches a run queue.

use thiserror::Error;

use crate::errors::RunError;

/// Errors that can occur while building a DAG from a flattened
/// command-and-separator token stream.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DagParseError {
    /// The token stream contained no operations at all.
    #[error("DAG contains no operations")]
    EmptyPipeline,

    /// An op slot between two pipe separators ended up with no tokens.
    #[error("DAG op {index} is empty")]
    EmptyOp { index: usize },

    /// The first token of an op is not a recognized command.
    #[error("unknown DAG command '{token}'")]
    UnknownCommand { token: String },

    /// A command was present but missing a required argument.
    #[error("{command} is missing required argument {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    /// The count token after LOAD or PERSIST was not a positive integer.
    #[error("{section} count '{token}' is not a valid number of keys")]
    BadCount { section: &'static str, token: String },

    /// A LOAD or PERSIST section declared more keys than the stream provides.
    #[error("{section} declared {expected} keys but only {found} were given")]
    TruncatedSection {
        section: &'static str,
        expected: usize,
        found: usize,
    },

    /// Two MODELRUN ops name models on different devices.
    #[error("multi-device DAGs not supported: {first} vs {second}")]
    DeviceMismatch { first: String, second: String },

    /// A TENSORSET literal could not be decoded into a tensor.
    #[error("invalid tensor literal for '{name}': {reason}")]
    InvalidTensorLiteral { name: String, reason: String },

    /// A keyspace lookup performed during parsing failed (LOAD tensor fetch,
    /// MODELRUN model fetch). Surfaced unchanged.
    #[error(transparent)]
    Admission(#[from] RunError),
}

impl From<DagParseError> for RunError {
    fn from(err: DagParseError) -> RunError {
        match err {
            DagParseError::Admission(inner) => inner,
            other => RunError::ParseError {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_errors_pass_through_unchanged() {
        let parse_err = DagParseError::Admission(RunError::KeyNotFound { key: "m".into() });
        let run_err: RunError = parse_err.into();
        assert_eq!(run_err, RunError::KeyNotFound { key: "m".into() });
    }

    #[test]
    fn structural_errors_become_parse_errors() {
        let run_err: RunError = DagParseError::EmptyPipeline.into();
        assert_eq!(run_err.code(), "EPARSE");
    }
}
