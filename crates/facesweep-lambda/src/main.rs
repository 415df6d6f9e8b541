use anyhow::Context;
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use facesweep_core::{routines, Settings};

mod config;

use config::resolve_routine;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .without_time()
        .init();

    let settings = Settings::from_env().context("loading settings")?;
    let routine = resolve_routine(|key| std::env::var(key).ok())?;
    let gateways = facesweep_aws::connect(&settings).await;

    tracing::info!(%routine, collection = %settings.collection_id, "facesweep-lambda ready");

    let settings = &settings;
    let gateways = &gateways;
    run(service_fn(move |event: LambdaEvent<Value>| async move {
        tracing::info!(request_id = %event.context.request_id, %routine, "invocation");
        Ok::<_, Error>(routines::run(routine, event.payload, gateways, settings).await)
    }))
    .await
}
