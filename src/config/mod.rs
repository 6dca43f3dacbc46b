// Copyright (c) 2026 tensorq contributors
// SPDX-License-Identifier: MIT

//! Runtime configuration: YAML loading, validation and defaults.

pub mod consts;
pub mod loader;

pub use consts::{DEFAULT_DEVICE, DEFAULT_MINBATCH_WAIT_MS, DEFAULT_THREADS_PER_QUEUE};
pub use loader::{load_config, ConfigError, RuntimeConfig};
