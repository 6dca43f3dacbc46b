// Copyright (c) 2026 tensorq contributors
// SPDX-License-Identifier: MIT

//! The shared keyspace: one name-to-value map holding tensors, models and
//! scripts.
//!
//! Models and scripts are stored behind `Arc`, and every run context clones
//! that `Arc` at admission time. Replacing a key while a run is queued or in
//! flight therefore never corrupts the run: the old object stays alive until
//! the last context referencing it completes.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use crate::errors::RunError;
use crate::store::tensor::Tensor;

/// Identifies which compute backend executes a model or script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Tensorflow,
    TfLite,
    Torch,
    OnnxRuntime,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::Tensorflow => "TF",
            BackendKind::TfLite => "TFLITE",
            BackendKind::Torch => "TORCH",
            BackendKind::OnnxRuntime => "ONNX",
        };
        write!(f, "{}", name)
    }
}

/// A stored model: backend, placement, batching declaration and the opaque
/// serialized graph the backend adapter consumes.
#[derive(Debug)]
pub struct Model {
    pub backend: BackendKind,
    pub device: String,
    /// Maximum total leading-dimension size of one dispatched batch.
    /// Zero disables batching for this model.
    pub batchsize: usize,
    /// Minimum accumulated batch the dispatcher prefers before running.
    /// Only meaningful when `batchsize > 0`.
    pub minbatchsize: usize,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub blob: Arc<Vec<u8>>,
}

impl Model {
    pub fn new(backend: BackendKind, device: impl Into<String>) -> Model {
        Model {
            backend,
            device: device.into(),
            batchsize: 0,
            minbatchsize: 0,
            inputs: Vec::new(),
            outputs: Vec::new(),
            blob: Arc::new(Vec::new()),
        }
    }

    pub fn with_batching(mut self, batchsize: usize, minbatchsize: usize) -> Model {
        self.batchsize = batchsize;
        self.minbatchsize = minbatchsize;
        self
    }

    pub fn with_io(
        mut self,
        inputs: Vec<impl Into<String>>,
        outputs: Vec<impl Into<String>>,
    ) -> Model {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }
}

/// A stored script: a source body plus the functions callers may invoke.
#[derive(Debug)]
pub struct Script {
    pub backend: BackendKind,
    pub device: String,
    pub source: String,
    pub entry_points: Vec<String>,
}

impl Script {
    pub fn new(device: impl Into<String>, source: impl Into<String>) -> Script {
        Script {
            backend: BackendKind::Torch,
            device: device.into(),
            source: source.into(),
            entry_points: Vec::new(),
        }
    }

    pub fn with_entry_points(mut self, entry_points: Vec<impl Into<String>>) -> Script {
        self.entry_points = entry_points.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug)]
enum Entry {
    Tensor(Tensor),
    Model(Arc<Model>),
    Script(Arc<Script>),
}

impl Entry {
    fn type_name(&self) -> &'static str {
        match self {
            Entry::Tensor(_) => "tensor",
            Entry::Model(_) => "model",
            Entry::Script(_) => "script",
        }
    }
}

/// Process-wide name-to-value store with typed getters.
///
/// Lookups for the wrong type surface [`RunError::KeyTypeMismatch`] rather
/// than pretending the key is absent; absent keys surface
/// [`RunError::KeyNotFound`].
#[derive(Debug)]
pub struct Keyspace {
    entries: RwLock<HashMap<String, Entry>>,
}

impl Keyspace {
    pub fn new() -> Keyspace {
        Keyspace {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_tensor(&self, name: impl Into<String>, tensor: Tensor) {
        let mut entries = self.write_entries();
        entries.insert(name.into(), Entry::Tensor(tensor));
    }

    /// Shallow copy of the tensor stored under `name`.
    pub fn get_tensor(&self, name: &str) -> Result<Tensor, RunError> {
        let entries = self.read_entries();
        match entries.get(name) {
            Some(Entry::Tensor(t)) => Ok(t.shallow_copy()),
            Some(other) => {
                tracing::debug!(key = name, found = other.type_name(), "type mismatch");
                Err(RunError::KeyTypeMismatch {
                    key: name.to_string(),
                    expected: "tensor",
                })
            }
            None => Err(RunError::KeyNotFound {
                key: name.to_string(),
            }),
        }
    }

    /// Store (or replace) a model. In-flight runs keep the previous `Arc`.
    pub fn set_model(&self, name: impl Into<String>, model: Model) -> Arc<Model> {
        let model = Arc::new(model);
        let mut entries = self.write_entries();
        entries.insert(name.into(), Entry::Model(model.clone()));
        model
    }

    pub fn get_model(&self, name: &str) -> Result<Arc<Model>, RunError> {
        let entries = self.read_entries();
        match entries.get(name) {
            Some(Entry::Model(m)) => Ok(m.clone()),
            Some(_) => Err(RunError::KeyTypeMismatch {
                key: name.to_string(),
                expected: "model",
            }),
            None => Err(RunError::KeyNotFound {
                key: name.to_string(),
            }),
        }
    }

    pub fn set_script(&self, name: impl Into<String>, script: Script) -> Arc<Script> {
        let script = Arc::new(script);
        let mut entries = self.write_entries();
        entries.insert(name.into(), Entry::Script(script.clone()));
        script
    }

    pub fn get_script(&self, name: &str) -> Result<Arc<Script>, RunError> {
        let entries = self.read_entries();
        match entries.get(name) {
            Some(Entry::Script(s)) => Ok(s.clone()),
            Some(_) => Err(RunError::KeyTypeMismatch {
                key: name.to_string(),
                expected: "script",
            }),
            None => Err(RunError::KeyNotFound {
                key: name.to_string(),
            }),
        }
    }

    /// Remove a key. Returns whether anything was removed.
    pub fn remove(&self, name: &str) -> bool {
        let mut entries = self.write_entries();
        entries.remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        let entries = self.read_entries();
        entries.contains_key(name)
    }

    fn read_entries(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Entry>> {
        match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write_entries(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Entry>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Keyspace::new()
    }
}
