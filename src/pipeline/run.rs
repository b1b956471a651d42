// src/pipeline/run.rs

//! The change-detection run: targets → offer → compare → dispatch → persist.

use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;
use crate::models::{DispatchReport, Offer};
use crate::services::{NotificationDispatcher, OfferSource, OfferStateStore, SubscriberRegistry};
use crate::utils::report;

use super::detect::{ChangeDecision, detect_change};

const TOTAL_STEPS: usize = 5;

/// Terminal state of a run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunOutcome {
    /// No registered targets; nothing was extracted
    NoSubscribers,
    /// The page did not yield a complete offer
    InvalidOffer,
    /// The offer title matches the persisted state
    Unchanged,
    /// Dry run stopped before sending
    WouldDispatch,
    /// Notifications were sent; `persisted` tells whether the state write succeeded
    Dispatched {
        report: DispatchReport,
        persisted: bool,
    },
}

impl RunOutcome {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NoSubscribers => "no_subscribers",
            Self::InvalidOffer => "invalid_offer",
            Self::Unchanged => "unchanged",
            Self::WouldDispatch => "would_dispatch",
            Self::Dispatched { .. } => "dispatched",
        }
    }
}

/// Summary of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub targets: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offer: Option<Offer>,
    pub outcome: RunOutcome,
}

impl RunReport {
    fn new(targets: usize, offer: Option<Offer>, outcome: RunOutcome) -> Self {
        Self {
            targets,
            offer,
            outcome,
        }
    }

    pub fn sent(&self) -> usize {
        match &self.outcome {
            RunOutcome::Dispatched { report, .. } => report.success_count(),
            _ => 0,
        }
    }

    pub fn failed(&self) -> usize {
        match &self.outcome {
            RunOutcome::Dispatched { report, .. } => report.failure_count(),
            _ => 0,
        }
    }

    pub fn persisted(&self) -> bool {
        matches!(
            self.outcome,
            RunOutcome::Dispatched {
                persisted: true,
                ..
            }
        )
    }
}

/// Wired components of one run.
pub struct ChangeDetectionPipeline {
    registry: SubscriberRegistry,
    extractor: Arc<dyn OfferSource>,
    state: OfferStateStore,
    dispatcher: NotificationDispatcher,
}

impl ChangeDetectionPipeline {
    pub fn new(
        registry: SubscriberRegistry,
        extractor: Arc<dyn OfferSource>,
        state: OfferStateStore,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            registry,
            extractor,
            state,
            dispatcher,
        }
    }

    pub fn state(&self) -> &OfferStateStore {
        &self.state
    }

    /// Run once. Extraction failures propagate; every other failure is absorbed.
    pub async fn run(&self, dry_run: bool) -> Result<RunReport> {
        report::header(if dry_run {
            "Offer watch (dry run)"
        } else {
            "Offer watch"
        });

        let report = self.execute(dry_run).await?;
        Self::log_summary(&report);
        Ok(report)
    }

    async fn execute(&self, dry_run: bool) -> Result<RunReport> {
        report::step(1, TOTAL_STEPS, "Loading subscribers");
        let targets = self.registry.list_targets().await;
        if targets.is_empty() {
            log::info!("No subscribers registered; skipping extraction");
            return Ok(RunReport::new(0, None, RunOutcome::NoSubscribers));
        }

        report::step(2, TOTAL_STEPS, "Extracting current offer");
        let offer = self
            .extractor
            .fetch_current_offer()
            .await
            .inspect_err(|e| {
                if e.is_timeout() {
                    log::error!("Offer page did not load in time: {}", e);
                } else {
                    log::error!("Offer extraction failed: {}", e);
                }
            })?;

        report::step(3, TOTAL_STEPS, "Comparing with last offer");
        let previous = if offer.is_valid() {
            self.state.read_last_offer().await
        } else {
            None
        };
        match detect_change(&offer, previous.as_ref()) {
            ChangeDecision::Invalid => {
                log::warn!("No valid offer found on the page");
                return Ok(RunReport::new(targets.len(), Some(offer), RunOutcome::InvalidOffer));
            }
            ChangeDecision::Unchanged => {
                log::info!("Offer unchanged: {}", offer.title());
                return Ok(RunReport::new(targets.len(), Some(offer), RunOutcome::Unchanged));
            }
            ChangeDecision::FirstOffer => log::info!("First offer seen: {}", offer.title()),
            ChangeDecision::TitleChanged { previous } => {
                log::info!("New offer: '{}' (was '{}')", offer.title(), previous)
            }
        }

        if dry_run {
            log::info!(
                "Dry run: would notify {} devices in {} batches",
                targets.len(),
                targets.len().div_ceil(self.dispatcher.batch_size())
            );
            return Ok(RunReport::new(targets.len(), Some(offer), RunOutcome::WouldDispatch));
        }

        report::step(4, TOTAL_STEPS, "Dispatching notifications");
        let dispatch = self.dispatcher.dispatch(&targets, &offer).await;

        report::step(5, TOTAL_STEPS, "Persisting offer state");
        let persisted = match self.state.write_offer(&offer).await {
            Ok(()) => true,
            Err(e) => {
                log::error!("Error saving offer: {}", e);
                false
            }
        };

        Ok(RunReport::new(
            targets.len(),
            Some(offer),
            RunOutcome::Dispatched {
                report: dispatch,
                persisted,
            },
        ))
    }

    fn log_summary(run: &RunReport) {
        let mut items = vec![
            ("Outcome", run.outcome.name().to_string()),
            ("Targets", run.targets.to_string()),
        ];
        if let Some(offer) = &run.offer {
            items.push(("Offer", offer.title().to_string()));
        }
        if let RunOutcome::Dispatched { report, persisted } = &run.outcome {
            items.push(("Batches", report.batches.to_string()));
            items.push(("Sent", report.success_count().to_string()));
            items.push(("Failed", report.failure_count().to_string()));
            items.push(("Persisted", persisted.to_string()));
        }
        report::summary("Run complete", &items);
    }
}
