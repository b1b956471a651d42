// src/services/dispatcher.rs

//! Notification fan-out.
//!
//! Builds one push message per target and sends them in fixed-size batches,
//! strictly one batch at a time.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::models::{DeliveryResult, DispatchReport, Offer, PushConfig, Target};

/// Display part shown by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

/// Data payload; `url` is what the client opens on click.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageData {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebPushNotification {
    pub title: String,
    pub body: String,
    pub click_action: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FcmOptions {
    pub link: String,
}

/// Web push overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WebPush {
    pub notification: WebPushNotification,
    pub fcm_options: FcmOptions,
}

/// One message addressed to one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushMessage {
    pub token: String,
    pub notification: Notification,
    pub data: MessageData,
    pub webpush: WebPush,
}

impl PushMessage {
    pub fn for_offer(token: &str, title: &str, offer: &Offer) -> Self {
        let body = offer.title().to_string();
        let link = offer.link().to_string();
        Self {
            token: token.to_string(),
            notification: Notification {
                title: title.to_string(),
                body: body.clone(),
            },
            data: MessageData { url: link.clone() },
            webpush: WebPush {
                notification: WebPushNotification {
                    title: title.to_string(),
                    body,
                    click_action: link.clone(),
                },
                fcm_options: FcmOptions { link },
            },
        }
    }
}

/// Outcome of one message within a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendResponse {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl SendResponse {
    pub fn ok(message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    pub fn err(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}

/// Per-message outcomes of a batch, in message order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResponse {
    pub responses: Vec<SendResponse>,
}

impl BatchResponse {
    pub fn success_count(&self) -> usize {
        self.responses.iter().filter(|r| r.success).count()
    }
}

/// Push delivery backend.
#[async_trait]
pub trait PushService: Send + Sync {
    /// Send every message of the batch. `Err` means the batch as a whole failed.
    async fn send_batch(&self, messages: &[PushMessage]) -> Result<BatchResponse>;
}

/// Sends an offer to a set of targets.
pub struct NotificationDispatcher {
    push: Arc<dyn PushService>,
    batch_size: usize,
    title: String,
}

impl NotificationDispatcher {
    pub fn new(push: Arc<dyn PushService>, batch_size: usize, title: impl Into<String>) -> Self {
        Self {
            push,
            batch_size: batch_size.max(1),
            title: title.into(),
        }
    }

    pub fn from_config(push: Arc<dyn PushService>, config: &PushConfig) -> Self {
        Self::new(push, config.batch_size, &config.notification_title)
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Send `offer` to every target. Never fails; failures are recorded per target.
    pub async fn dispatch(&self, targets: &[Target], offer: &Offer) -> DispatchReport {
        log::info!("Sending notifications to {} devices...", targets.len());

        let mut report = DispatchReport::default();
        let mut total_sent = 0;

        for (index, chunk) in targets.chunks(self.batch_size).enumerate() {
            let batch_no = index + 1;
            let messages: Vec<PushMessage> = chunk
                .iter()
                .map(|token| PushMessage::for_offer(token, &self.title, offer))
                .collect();

            report.batches += 1;
            let results = match self.push.send_batch(&messages).await {
                Ok(response) => Self::pair(chunk, response),
                Err(e) => {
                    log::error!("Batch {} failed: {}", batch_no, e);
                    let message = e.to_string();
                    chunk
                        .iter()
                        .map(|t| DeliveryResult::failed(t.as_str(), message.as_str()))
                        .collect()
                }
            };

            let sent = results.iter().filter(|r| r.success).count();
            log::info!("Batch {}: {}/{} sent", batch_no, sent, chunk.len());
            for failure in results.iter().filter(|r| !r.success) {
                log::warn!(
                    "Failed token: {} - {}",
                    failure.target,
                    failure.error.as_deref().unwrap_or("unknown error")
                );
            }

            total_sent += sent;
            report.results.extend(results);
        }

        log::info!("Total notifications sent: {}", total_sent);
        report
    }

    /// Match responses to targets by position; a missing response counts as a failure.
    fn pair(chunk: &[Target], response: BatchResponse) -> Vec<DeliveryResult> {
        let mut responses = response.responses.into_iter();
        chunk
            .iter()
            .map(|target| match responses.next() {
                Some(r) if r.success => DeliveryResult::sent(target.as_str()),
                Some(r) => DeliveryResult::failed(
                    target.as_str(),
                    r.error.unwrap_or_else(|| "unknown error".to_string()),
                ),
                None => DeliveryResult::failed(target.as_str(), "no response for message"),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::error::AppError;

    /// Records batches; fails the targets listed in `reject` and any batch containing `explode`.
    #[derive(Default)]
    struct RecordingPush {
        batches: Mutex<Vec<Vec<String>>>,
        reject: Vec<&'static str>,
        explode: Option<&'static str>,
    }

    #[async_trait]
    impl PushService for RecordingPush {
        async fn send_batch(&self, messages: &[PushMessage]) -> Result<BatchResponse> {
            let tokens: Vec<String> = messages.iter().map(|m| m.token.clone()).collect();
            self.batches.lock().unwrap().push(tokens.clone());

            if self.explode.is_some_and(|t| tokens.iter().any(|x| x == t)) {
                return Err(AppError::Push("quota exceeded".into()));
            }
            Ok(BatchResponse {
                responses: tokens
                    .iter()
                    .map(|t| {
                        if self.reject.contains(&t.as_str()) {
                            SendResponse::err("registration-token-not-registered")
                        } else {
                            SendResponse::ok(format!("projects/p/messages/{t}"))
                        }
                    })
                    .collect(),
            })
        }
    }

    fn targets(n: usize) -> Vec<Target> {
        (1..=n).map(|i| format!("t{i}")).collect()
    }

    fn offer() -> Offer {
        Offer::new("Crete 5 nights", "https://www.lagonika.gr/offers/crete")
    }

    #[test]
    fn test_message_payload_shape() {
        let message = PushMessage::for_offer("tok", "🚀 Νέα Προσφορά!", &offer());
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "token": "tok",
                "notification": { "title": "🚀 Νέα Προσφορά!", "body": "Crete 5 nights" },
                "data": { "url": "https://www.lagonika.gr/offers/crete" },
                "webpush": {
                    "notification": {
                        "title": "🚀 Νέα Προσφορά!",
                        "body": "Crete 5 nights",
                        "click_action": "https://www.lagonika.gr/offers/crete"
                    },
                    "fcm_options": { "link": "https://www.lagonika.gr/offers/crete" }
                }
            })
        );
    }

    #[tokio::test]
    async fn test_batches_partition_targets_in_order() {
        let push = Arc::new(RecordingPush::default());
        let dispatcher = NotificationDispatcher::new(push.clone(), 5, "title");

        for n in [1usize, 4, 5, 6, 12] {
            push.batches.lock().unwrap().clear();
            let all = targets(n);
            let report = dispatcher.dispatch(&all, &offer()).await;

            let batches = push.batches.lock().unwrap().clone();
            assert_eq!(batches.len(), n.div_ceil(5), "n = {n}");
            assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= 5));
            assert_eq!(batches.concat(), all);
            assert_eq!(report.batches, batches.len());
            assert_eq!(report.success_count(), n);
        }
    }

    #[tokio::test]
    async fn test_per_target_failures_are_recorded() {
        let push = Arc::new(RecordingPush {
            reject: vec!["t2", "t4"],
            ..Default::default()
        });
        let dispatcher = NotificationDispatcher::new(push, 5, "title");

        let report = dispatcher.dispatch(&targets(4), &offer()).await;
        assert_eq!(report.success_count(), 2);
        let failed: Vec<_> = report.results.iter().filter(|r| !r.success).collect();
        let names: Vec<_> = failed.iter().map(|r| r.target.as_str()).collect();
        assert_eq!(names, ["t2", "t4"]);
        assert!(failed.iter().all(|r| r.error.is_some()));
    }

    #[tokio::test]
    async fn test_batch_failure_continues_with_next_batch() {
        let push = Arc::new(RecordingPush {
            explode: Some("t3"),
            ..Default::default()
        });
        let dispatcher = NotificationDispatcher::new(push.clone(), 2, "title");

        let report = dispatcher.dispatch(&targets(6), &offer()).await;
        assert_eq!(push.batches.lock().unwrap().len(), 3);
        assert_eq!(report.results.len(), 6);
        let failed: Vec<_> = report
            .results
            .iter()
            .filter(|r| !r.success)
            .map(|r| r.target.as_str())
            .collect();
        assert_eq!(failed, ["t3", "t4"]);
        assert_eq!(report.success_count(), 4);
    }

    #[test]
    fn test_missing_responses_count_as_failed() {
        let chunk = targets(3);
        let response = BatchResponse {
            responses: vec![SendResponse::ok("m1")],
        };
        let results = NotificationDispatcher::pair(&chunk, response);
        assert!(results[0].success);
        assert!(!results[1].success && !results[2].success);
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        let dispatcher = NotificationDispatcher::new(Arc::new(RecordingPush::default()), 0, "t");
        assert_eq!(dispatcher.batch_size(), 1);
    }
}
