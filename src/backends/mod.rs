// Copyright (c) 2026 tensorq contributors
// SPDX-License-Identifier: MIT

//! Backend adapters and the registry that resolves them.
//!
//! A [`Backend`] executes model and script contexts; the engine is agnostic
//! to what actually runs behind the trait. The [`BackendRegistry`] maps a
//! [`BackendKind`] to a live adapter, with optional lazy loading: a loader
//! registered for a kind is invoked the first time that kind is requested,
//! and removed after that one attempt; a failed load is permanent for the
//! process, surfaced as [`RunError::BackendNotLoaded`] from then on.

pub mod echo;
#[cfg(test)]
pub mod stub;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::engine::run_info::{ModelRunCtx, ScriptRunCtx};
use crate::errors::RunError;
use crate::observability::messages::session::BackendLazyLoaded;
use crate::observability::messages::StructuredLog;
use crate::store::BackendKind;

/// One compute backend. `run_model` receives the whole batch in a single
/// call: every context belongs to the same model, and the adapter fills each
/// context's `outputs` in place.
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    fn run_model(&self, batch: &mut [&mut ModelRunCtx]) -> Result<(), RunError>;

    fn run_script(&self, ctx: &mut ScriptRunCtx) -> Result<(), RunError>;
}

type BackendLoader = Box<dyn Fn() -> Result<Arc<dyn Backend>, RunError> + Send + Sync>;

/// Maps backend kinds to adapters, with one-shot lazy loading.
pub struct BackendRegistry {
    loaded: RwLock<HashMap<BackendKind, Arc<dyn Backend>>>,
    loaders: Mutex<HashMap<BackendKind, BackendLoader>>,
}

impl BackendRegistry {
    pub fn new() -> BackendRegistry {
        BackendRegistry {
            loaded: RwLock::new(HashMap::new()),
            loaders: Mutex::new(HashMap::new()),
        }
    }

    /// Install an already-constructed adapter.
    pub fn register(&self, kind: BackendKind, backend: Arc<dyn Backend>) {
        let mut loaded = match self.loaded.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        loaded.insert(kind, backend);
    }

    /// Install a loader invoked on first request for `kind`. The loader runs
    /// at most once.
    pub fn register_loader<F>(&self, kind: BackendKind, loader: F)
    where
        F: Fn() -> Result<Arc<dyn Backend>, RunError> + Send + Sync + 'static,
    {
        let mut loaders = match self.loaders.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        loaders.insert(kind, Box::new(loader));
    }

    pub fn get(&self, kind: BackendKind) -> Option<Arc<dyn Backend>> {
        let loaded = match self.loaded.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        loaded.get(&kind).cloned()
    }

    /// Resolve `kind`, attempting the registered loader if the adapter is
    /// not present yet.
    pub fn get_or_load(&self, kind: BackendKind) -> Result<Arc<dyn Backend>, RunError> {
        if let Some(backend) = self.get(kind) {
            return Ok(backend);
        }

        // Take the loader out before invoking it: whatever happens, it will
        // not be tried again.
        let loader = {
            let mut loaders = match self.loaders.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            loaders.remove(&kind)
        };

        match loader {
            Some(loader) => {
                let backend = loader()?;
                BackendLazyLoaded { backend: kind }.log();
                self.register(kind, backend.clone());
                Ok(backend)
            }
            None => Err(RunError::BackendNotLoaded {
                backend: kind.to_string(),
            }),
        }
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        BackendRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::echo::EchoBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn unknown_backend_is_not_loaded() {
        let registry = BackendRegistry::new();
        // `dyn Backend` is not Debug, so take the error side explicitly.
        let err = registry.get_or_load(BackendKind::Torch).err().unwrap();
        assert_eq!(err.code(), "EBACKENDNOTLOADED");
    }

    #[test]
    fn loader_runs_once_and_caches_the_adapter() {
        let registry = BackendRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        registry.register_loader(BackendKind::Tensorflow, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(EchoBackend::new()) as Arc<dyn Backend>)
        });

        registry.get_or_load(BackendKind::Tensorflow).unwrap();
        registry.get_or_load(BackendKind::Tensorflow).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failed_load_is_permanent() {
        let registry = BackendRegistry::new();
        registry.register_loader(BackendKind::OnnxRuntime, || {
            Err(RunError::BackendExecutionError {
                detail: "shared object missing".into(),
                oneline: "shared object missing".into(),
            })
        });

        let first = registry.get_or_load(BackendKind::OnnxRuntime).err().unwrap();
        assert_eq!(first.code(), "EBACKENDRUN");

        // The loader was consumed; later requests see a plain not-loaded.
        let second = registry
            .get_or_load(BackendKind::OnnxRuntime)
            .err()
            .unwrap();
        assert_eq!(second.code(), "EBACKENDNOTLOADED");
    }
}
