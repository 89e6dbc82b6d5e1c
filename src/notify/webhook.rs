use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use super::{AlertPayload, AlertSink};
use crate::error::AlertDeliveryError;

/// Posts the alert payload as JSON; any 2xx is an acknowledgment.
#[derive(Clone)]
pub struct WebhookNotifier {
    url: String,
    client: Client,
    timeout: Duration,
    max_attempts: u8,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: Client::new(),
            timeout: Duration::from_secs(5),
            max_attempts: 3,
        }
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout = Duration::from_secs(secs);
        self
    }

    pub fn with_attempts(mut self, attempts: u8) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }
}

#[async_trait]
impl AlertSink for WebhookNotifier {
    async fn send(&self, payload: &AlertPayload) -> Result<(), AlertDeliveryError> {
        let mut attempt: u8 = 0;
        loop {
            attempt += 1;
            let res = self
                .client
                .post(&self.url)
                .timeout(self.timeout)
                .json(payload)
                .send()
                .await;

            let err = match res {
                Ok(rsp) if rsp.status().is_success() => return Ok(()),
                Ok(rsp) => AlertDeliveryError::Status(rsp.status().as_u16()),
                Err(e) => AlertDeliveryError::Request(e.to_string()),
            };
            if attempt >= self.max_attempts {
                return Err(err);
            }
            tokio::time::sleep(Duration::from_millis(500u64 << (attempt - 1))).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_webhook_is_a_request_error() {
        let n = WebhookNotifier::new("http://127.0.0.1:9/hook")
            .with_timeout(1)
            .with_attempts(1);
        let payload = AlertPayload {
            event: "low_success_rate".into(),
            run_id: "r".into(),
            avg_success_rate: 0.1,
            threshold: 0.6,
            platforms: Vec::new(),
        };
        let err = n.send(&payload).await.unwrap_err();
        assert!(matches!(err, AlertDeliveryError::Request(_)));
    }
}
