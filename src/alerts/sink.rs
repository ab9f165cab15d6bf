use crate::error::AlertError;
use log::{info, warn};
use reqwest::Client;
use serde::Serialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

/// Destination for alert messages
///
/// `notify` is called at most once per alerting cycle and never retried.
/// Implementations must tolerate concurrent calls from overlapping cycles.
pub trait AlertSink: Send + Sync {
    fn notify<'a>(
        &'a self,
        message: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>>;
}

/// Writes alerts to the log output
#[derive(Debug, Default, Clone)]
pub struct ConsoleSink;

impl AlertSink for ConsoleSink {
    fn notify<'a>(
        &'a self,
        message: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>> {
        Box::pin(async move {
            warn!("📩 Sending alert: {}", message);
            Ok(())
        })
    }
}

/// Payload posted by [`WebhookSink`]
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: &'a str,
}

/// Posts alerts as `{"text": message}` to an HTTP endpoint
///
/// The body shape is accepted by Slack and Mattermost incoming webhooks.
pub struct WebhookSink {
    client: Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: String) -> Result<Self, AlertError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                AlertError::NotificationFailed(format!("Failed to create HTTP client: {}", e))
            })?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl AlertSink for WebhookSink {
    fn notify<'a>(
        &'a self,
        message: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .json(&WebhookPayload { text: message })
                .send()
                .await?;

            if !response.status().is_success() {
                return Err(AlertError::NotificationFailed(format!(
                    "Webhook returned status {}",
                    response.status()
                )));
            }

            info!("Alert delivered to webhook");
            Ok(())
        })
    }
}

/// In-memory sink that records every message it receives
///
/// Can be switched into a failing mode to exercise dispatch errors.
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: Mutex<Vec<String>>,
    failure: Option<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that records each attempt and then fails it
    pub fn failing(reason: &str) -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            failure: Some(reason.to_string()),
        }
    }

    /// Messages received so far, in call order
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }
}

impl AlertSink for MemorySink {
    fn notify<'a>(
        &'a self,
        message: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>> {
        Box::pin(async move {
            self.messages.lock().unwrap().push(message.to_string());
            match &self.failure {
                Some(reason) => Err(AlertError::NotificationFailed(reason.clone())),
                None => Ok(()),
            }
        })
    }
}
