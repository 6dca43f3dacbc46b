// Copyright (c) 2026 tensorq contributors
// SPDX-License-Identifier: MIT

mod parse;
mod run;

pub use parse::DagParseError;
pub use run::RunError;
