// src/bin/run_once.rs
// One invocation outside the function runtime, for cron-style scheduling.

use anyhow::Result;
use serde_json::Value;
use vsa_sync::{handler, logging};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let result = handler(Value::Null, "local").await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if !result.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
