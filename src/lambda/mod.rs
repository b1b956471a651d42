// src/lambda/mod.rs

//! AWS Lambda handler for the offer watcher.
//!
//! Each invocation performs one watch run:
//! 1. Builds the configuration from defaults and the environment
//! 2. Wires the pipeline
//! 3. Runs it and reports the outcome

use lambda_runtime::{Error as LambdaError, LambdaEvent};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument};

use crate::bootstrap;
use crate::error::Result;
use crate::models::Config;
use crate::pipeline::RunReport;

/// Lambda invocation payload.
#[derive(Debug, Default, Deserialize)]
pub struct WatchRequest {
    /// Detect and compare only; send nothing and write nothing
    #[serde(default)]
    pub dry_run: bool,
}

/// Lambda response payload.
#[derive(Debug, Default, Serialize)]
pub struct WatchResponse {
    /// Terminal state name, e.g. `unchanged` or `dispatched`
    pub outcome: String,

    /// Number of subscribers loaded
    pub targets: usize,

    pub sent: usize,

    pub failed: usize,

    /// Whether the new offer state was written
    pub persisted: bool,

    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

impl From<&RunReport> for WatchResponse {
    fn from(report: &RunReport) -> Self {
        Self {
            outcome: report.outcome.name().to_string(),
            targets: report.targets,
            sent: report.sent(),
            failed: report.failed(),
            persisted: report.persisted(),
            execution_time_ms: 0,
        }
    }
}

/// Main Lambda handler function.
///
/// Fatal run errors fail the invocation so the scheduler sees them.
#[instrument(skip(event))]
pub async fn handler(
    event: LambdaEvent<WatchRequest>,
) -> std::result::Result<WatchResponse, LambdaError> {
    let (request, _context) = event.into_parts();
    respond(&request, load_lambda_config()).await
}

async fn respond(
    request: &WatchRequest,
    config: Result<Config>,
) -> std::result::Result<WatchResponse, LambdaError> {
    let start = std::time::Instant::now();
    info!("Starting watch run: dry_run={}", request.dry_run);

    match run_watch(request, config).await {
        Ok(report) => {
            let mut response = WatchResponse::from(&report);
            response.execution_time_ms = start.elapsed().as_millis() as u64;
            info!(
                "Watch run completed: {} ({} sent, {} failed) in {}ms",
                response.outcome, response.sent, response.failed, response.execution_time_ms
            );
            Ok(response)
        }
        Err(e) => {
            error!(
                "Watch run failed after {}ms: {}",
                start.elapsed().as_millis(),
                e
            );
            Err(LambdaError::from(e))
        }
    }
}

async fn run_watch(request: &WatchRequest, config: Result<Config>) -> Result<RunReport> {
    let config = config?;
    config.validate()?;
    let pipeline = bootstrap::build(&config).await?;
    pipeline.run(request.dry_run).await
}

/// Load configuration suitable for the Lambda environment.
///
/// Defaults, optionally overlaid by the bundled file named in `OFFERWATCH_CONFIG`.
fn load_lambda_config() -> Result<Config> {
    let mut config = match std::env::var("OFFERWATCH_CONFIG") {
        Ok(path) => Config::load_or_default(path),
        Err(_) => Config::default(),
    };
    config.apply_env();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{DispatchReport, DeliveryResult, Offer};
    use crate::pipeline::RunOutcome;

    #[test]
    fn test_request_defaults() {
        let req: WatchRequest = serde_json::from_str("{}").unwrap();
        assert!(!req.dry_run);

        let req: WatchRequest = serde_json::from_str(r#"{"dry_run": true}"#).unwrap();
        assert!(req.dry_run);
    }

    #[test]
    fn test_response_from_report() {
        let report = RunReport {
            targets: 2,
            offer: Some(Offer::new("Crete", "https://x/c")),
            outcome: RunOutcome::Dispatched {
                report: DispatchReport {
                    results: vec![
                        DeliveryResult::sent("a"),
                        DeliveryResult::failed("b", "unregistered"),
                    ],
                    batches: 1,
                },
                persisted: true,
            },
        };

        let response = WatchResponse::from(&report);
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["outcome"], "dispatched");
        assert_eq!(value["sent"], 1);
        assert_eq!(value["failed"], 1);
        assert_eq!(value["persisted"], true);
    }

    #[tokio::test]
    async fn test_invalid_config_fails_invocation() {
        // Default config has no repository for the GitHub registry.
        let result = respond(&WatchRequest::default(), Ok(Config::default())).await;
        let err = result.unwrap_err();
        assert!(err.to_string().contains("github.repository"));
    }

    #[tokio::test]
    async fn test_load_error_fails_invocation() {
        let load = Err(AppError::config("OFFERWATCH_CONFIG is unreadable"));
        let result = respond(&WatchRequest { dry_run: true }, load).await;
        assert!(result.is_err());
    }
}
