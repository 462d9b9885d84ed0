//! Runs the order-processing workflow against in-memory clients and prints
//! the recorded trace as JSON.
//!
//! Configuration is loaded from (in order of priority):
//! 1. Default values
//! 2. Config file: `sdk-segments.toml` in the working directory
//! 3. `AWS_REGION` / `AWS_DEFAULT_REGION`
//! 4. Environment variables with `SDK_SEGMENTS_` prefix
//!
//! Set `RUST_LOG=sdk_segments=trace` to see every interception decision.

use anyhow::{Context, Result};
use aws_sdk_segment_example::{init_tracing, run_demo};
use aws_sdk_segment_tower::Config;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().context("failed to initialise tracing subscriber")?;

    let config = Config::load().context("failed to load configuration")?;
    tracing::debug!(?config, "Configuration loaded");

    let trace = run_demo(&config).await.context("demo workflow failed")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&trace).context("failed to serialise trace")?
    );

    Ok(())
}
