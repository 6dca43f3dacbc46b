// Copyright (c) 2026 tensorq contributors
// SPDX-License-Identifier: MIT

use std::env;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use tensorq::backends::echo::EchoBackend;
use tensorq::config::{load_config, RuntimeConfig};
use tensorq::store::{BackendKind, Model, Tensor};
use tensorq::Runtime;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();

    // Optional leading `--config <file>`; everything after is a DAG token
    // stream. With no tokens, a built-in demo DAG runs.
    let mut rest = &args[1..];
    let config = if rest.first().map(String::as_str) == Some("--config") {
        let path = rest.get(1).context("--config requires a file path")?;
        let cfg = load_config(path).with_context(|| format!("loading {}", path))?;
        rest = &rest[2..];
        cfg
    } else {
        RuntimeConfig::default()
    };

    let rt = Runtime::new(config)?;
    seed_demo(&rt);

    let tokens: Vec<String> = if rest.is_empty() {
        demo_tokens()
    } else {
        rest.to_vec()
    };

    println!("🧮 tensorq demo");
    println!("Device queues start on demand; default device: {}", rt.config().default_device);
    println!("DAG: {}", tokens.join(" "));
    println!();

    let started = Instant::now();
    let ticket = rt.submit_dag(&tokens)?;
    let reply = ticket.wait().await?;

    println!("Completed in {:?} (backend time {:?})", started.elapsed(), reply.duration);
    for (name, tensor) in &reply.tensors {
        match tensor.as_f32_vec() {
            Some(values) => println!("  {} = {:?}", name, values),
            None => println!("  {} = {:?} ({} bytes)", name, tensor.shape(), tensor.byte_size()),
        }
    }

    println!("\nRun stats:");
    println!("{}", serde_json::to_string_pretty(&rt.stats().snapshot())?);

    rt.shutdown();
    Ok(())
}

/// An echo backend for every kind, one demo model, one demo tensor.
fn seed_demo(rt: &Runtime) {
    let echo = Arc::new(EchoBackend::new());
    for kind in [
        BackendKind::Tensorflow,
        BackendKind::TfLite,
        BackendKind::Torch,
        BackendKind::OnnxRuntime,
    ] {
        rt.backends().register(kind, echo.clone());
    }

    rt.keyspace().set_model(
        "demo-model",
        Model::new(BackendKind::Tensorflow, "CPU")
            .with_batching(8, 2)
            .with_io(vec!["input"], vec!["output"]),
    );
    if let Some(tensor) = Tensor::from_f32(vec![2, 2], &[1.0, 2.0, 3.0, 4.0]) {
        rt.keyspace().set_tensor("demo-input", tensor);
    }
}

fn demo_tokens() -> Vec<String> {
    [
        "LOAD", "1", "demo-input", "|>", "MODELRUN", "demo-model", "INPUTS", "demo-input",
        "OUTPUTS", "hidden", "|>", "TENSORGET", "hidden",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}
