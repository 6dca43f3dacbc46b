// Copyright (c) 2026 tensorq contributors
// SPDX-License-Identifier: MIT

//! Execution and admission errors for queued runs.
//!
//! Admission-time errors are returned synchronously before a job is queued.
//! Execution-time errors are captured on the job descriptor and surfaced only
//! when the completion protocol resumes the caller; they never cross the
//! queue boundary as panics.

use thiserror::Error;

/// Errors produced while admitting or executing a run.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RunError {
    /// The backend required by a model or script has not been loaded and no
    /// loader is (or remains) registered for it.
    #[error("backend {backend} not loaded")]
    BackendNotLoaded { backend: String },

    /// The backend call itself failed. `detail` may span multiple lines;
    /// `oneline` is what gets sent back to the caller.
    #[error("{oneline}")]
    BackendExecutionError { detail: String, oneline: String },

    /// A device run queue could not be created.
    #[error("could not initialize run queue for device {device}: {reason}")]
    QueueInitFailed { device: String, reason: String },

    /// Malformed DAG or command token stream.
    #[error("parse error: {message}")]
    ParseError { message: String },

    /// The keyspace has no entry under this name.
    #[error("key {key} not found")]
    KeyNotFound { key: String },

    /// The keyspace entry under this name holds a different value type.
    #[error("key {key} holds the wrong type, expected {expected}")]
    KeyTypeMismatch { key: String, expected: &'static str },

    /// The requested function is not an entry point of the script.
    #[error("function {function} is not an entry point of script {key}")]
    ScriptFunctionNotFound { key: String, function: String },

    /// A DAG op failed; carries the 1-based position of the failing op so the
    /// failure is attributable to that op specifically.
    #[error("DAG op {index} ({command}) failed: {source}")]
    DagOpFailed {
        index: usize,
        command: &'static str,
        #[source]
        source: Box<RunError>,
    },

    /// The job was dropped before a result was produced. This is an internal
    /// defect indicator, not a normal outcome.
    #[error("run was abandoned before a result was produced")]
    Abandoned,
}

impl RunError {
    /// Structured error code, stable across message wording changes.
    pub fn code(&self) -> &'static str {
        match self {
            RunError::BackendNotLoaded { .. } => "EBACKENDNOTLOADED",
            RunError::BackendExecutionError { .. } => "EBACKENDRUN",
            RunError::QueueInitFailed { .. } => "EQUEUEINIT",
            RunError::ParseError { .. } => "EPARSE",
            RunError::KeyNotFound { .. } => "ENOTFOUND",
            RunError::KeyTypeMismatch { .. } => "ETYPE",
            RunError::ScriptFunctionNotFound { .. } => "ENOFUNCTION",
            RunError::DagOpFailed { .. } => "EDAGOP",
            RunError::Abandoned => "EABANDONED",
        }
    }

    /// Long-form diagnostic detail. Multi-line for backend errors; logged but
    /// not necessarily returned to the caller.
    pub fn detail(&self) -> String {
        match self {
            RunError::BackendExecutionError { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }

    /// Single-line, human-readable message suitable for a client reply.
    pub fn detail_oneline(&self) -> String {
        let s = self.to_string();
        if s.contains('\n') {
            s.replace('\n', " ")
        } else {
            s
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct_per_variant() {
        let not_loaded = RunError::BackendNotLoaded {
            backend: "TF".into(),
        };
        let not_found = RunError::KeyNotFound { key: "t".into() };
        assert_eq!(not_loaded.code(), "EBACKENDNOTLOADED");
        assert_eq!(not_found.code(), "ENOTFOUND");
        assert_ne!(not_loaded.code(), not_found.code());
    }

    #[test]
    fn oneline_flattens_newlines() {
        let err = RunError::BackendExecutionError {
            detail: "stack:\nframe 1\nframe 2".into(),
            oneline: "graph execution failed".into(),
        };
        assert_eq!(err.detail_oneline(), "graph execution failed");
        assert!(err.detail().contains('\n'));
    }

    #[test]
    fn dag_op_failure_names_the_op() {
        let err = RunError::DagOpFailed {
            index: 2,
            command: "MODELRUN",
            source: Box::new(RunError::KeyNotFound { key: "in".into() }),
        };
        let msg = err.to_string();
        assert!(msg.contains("op 2"));
        assert!(msg.contains("MODELRUN"));
    }
}
