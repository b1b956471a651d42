//! AWS Lambda entry point for the offer watcher
//!
//! Deploy with `cargo lambda build --release --features lambda`
//! and schedule the function with an EventBridge rule.

use lambda_runtime::{Error as LambdaError, service_fn};
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Main entry point for the AWS Lambda function.
#[tokio::main]
async fn main() -> Result<(), LambdaError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("offerwatch Lambda starting...");
    lambda_runtime::run(service_fn(offerwatch::lambda::handler)).await
}
