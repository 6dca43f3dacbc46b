// Copyright (c) 2026 tensorq contributors
// SPDX-License-Identifier: MIT

pub mod keyspace;
pub mod tensor;

pub use keyspace::{BackendKind, Keyspace, Model, Script};
pub use tensor::{DType, Tensor};
