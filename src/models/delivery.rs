//! Delivery outcome structures.

use serde::Serialize;

/// A registered device's push token.
pub type Target = String;

/// Outcome of one push attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryResult {
    pub target: Target,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeliveryResult {
    pub fn sent(target: impl Into<Target>) -> Self {
        Self {
            target: target.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed(target: impl Into<Target>, error: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Aggregated result of a dispatch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    /// Per-target outcomes in submission order
    pub results: Vec<DeliveryResult>,
    /// Number of batch requests issued
    pub batches: usize,
}

impl DispatchReport {
    pub fn success_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failure_count(&self) -> usize {
        self.results.len() - self.success_count()
    }
}
