//! Anomaly alert dispatch
//!
//! Alerts are fire-and-forget: a failed delivery is logged and never fails
//! or rolls back the ingestion that triggered it.

use std::collections::HashMap;

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

/// Notification collaborator
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn anomaly_alert(&self, user_id: &str, metrics: &HashMap<String, f64>);
}

/// Alert payload posted to the webhook (and logged)
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyAlert<'a> {
    pub alert_id: Uuid,
    pub user_id: &'a str,
    pub metrics: &'a HashMap<String, f64>,
    pub detected_at: i64,
}

impl<'a> AnomalyAlert<'a> {
    fn new(user_id: &'a str, metrics: &'a HashMap<String, f64>) -> Self {
        Self {
            alert_id: Uuid::new_v4(),
            user_id,
            metrics,
            detected_at: Utc::now().timestamp_millis(),
        }
    }
}

/// Default notifier: structured log only
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn anomaly_alert(&self, user_id: &str, metrics: &HashMap<String, f64>) {
        let alert = AnomalyAlert::new(user_id, metrics);
        tracing::warn!(
            alert_id = %alert.alert_id,
            user_id = %user_id,
            ?metrics,
            "Anomaly alert"
        );
    }
}

/// Webhook notifier: POSTs the alert payload to a configured URL
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    async fn anomaly_alert(&self, user_id: &str, metrics: &HashMap<String, f64>) {
        let alert = AnomalyAlert::new(user_id, metrics);

        match self.client.post(&self.url).json(&alert).send().await {
            Ok(resp) if resp.status().is_success() => {
                tracing::info!(alert_id = %alert.alert_id, user_id = %user_id, "Anomaly alert delivered");
            }
            Ok(resp) => {
                tracing::warn!(
                    alert_id = %alert.alert_id,
                    status = %resp.status(),
                    "Anomaly alert rejected by webhook"
                );
            }
            Err(e) => {
                tracing::warn!(alert_id = %alert.alert_id, "Anomaly alert delivery failed: {}", e);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alert_payload_shape() {
        let mut metrics = HashMap::new();
        metrics.insert("heartRate".to_string(), 160.0);

        let alert = AnomalyAlert::new("user-1", &metrics);
        let value = serde_json::to_value(&alert).unwrap();

        assert_eq!(value["userId"], "user-1");
        assert_eq!(value["metrics"]["heartRate"], 160.0);
        assert!(value["alertId"].is_string());
        assert!(value["detectedAt"].is_i64());
    }
}
