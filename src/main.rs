use anyhow::{anyhow, Result};
use lambda_runtime::{service_fn, LambdaEvent};
use serde_json::Value;
use tracing::info;
use vsa_sync::{handler, logging, InvocationResult};

async fn invoke(event: LambdaEvent<Value>) -> Result<InvocationResult, lambda_runtime::Error> {
    let (payload, ctx) = event.into_parts();
    Ok(handler(payload, &ctx.request_id).await)
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    logging::init();
    info!("startup");

    // ─── 2) serve invocations until the runtime shuts us down ────────
    lambda_runtime::run(service_fn(invoke))
        .await
        .map_err(|e| anyhow!("lambda runtime: {}", e))
}
