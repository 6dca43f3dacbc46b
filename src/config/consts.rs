// Copyright (c) 2026 tensorq contributors
// SPDX-License-Identifier: MIT

/// Worker threads spawned per device queue.
pub const DEFAULT_THREADS_PER_QUEUE: usize = 1;

/// Hard cap on workers per queue; more threads than this never helps a
/// single device and inflates context switching.
pub const MAX_THREADS_PER_QUEUE: usize = 32;

/// Device used for jobs that do not pin one (pure tensor DAGs, models whose
/// device string is empty).
pub const DEFAULT_DEVICE: &str = "CPU";

/// Upper bound, in milliseconds, on how long a worker holds an
/// under-minimum batch open waiting for same-model followers.
pub const DEFAULT_MINBATCH_WAIT_MS: u64 = 2;

/// Cap on the configurable minbatch wait. Holding a worker longer than this
/// trades too much latency for batch fill.
pub const MAX_MINBATCH_WAIT_MS: u64 = 1_000;
