//! Outbound messages. Delivery is best-effort everywhere: a failed send is
//! logged and counted, never propagated into the pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::settings::{NotifierKind, Settings};
use crate::utils::errors::ApiError;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, destination: &str, text: &str) -> Result<(), ApiError>;
}

/// Writes messages to the log. Used when no chat is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, destination: &str, text: &str) -> Result<(), ApiError> {
        log::info!("[notify → {destination}] {text}");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Telegram Bot API
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TelegramAck {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Clone)]
pub struct TelegramNotifier {
    http: Client,
    base_url: String,
    token: String,
}

impl TelegramNotifier {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    /// `{base}/bot{token}/{method}`
    pub fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    pub fn http(&self) -> &Client {
        &self.http
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, destination: &str, text: &str) -> Result<(), ApiError> {
        let resp = self
            .http
            .post(self.method_url("sendMessage"))
            .form(&[("chat_id", destination), ("text", text)])
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        let ack: Option<TelegramAck> = serde_json::from_str(&body).ok();

        match ack {
            Some(TelegramAck { ok: true, .. }) if status.is_success() => Ok(()),
            Some(TelegramAck { description, .. }) => Err(ApiError::Rejected {
                status: status.as_u16(),
                description: description.unwrap_or(body),
            }),
            None => Err(ApiError::Rejected { status: status.as_u16(), description: body }),
        }
    }
}

/// Send and swallow. Returns whether the message went out.
pub async fn notify_best_effort(notifier: &dyn Notifier, destination: &str, text: &str) -> bool {
    match notifier.send(destination, text).await {
        Ok(()) => true,
        Err(e) => {
            log::error!("notification to {destination} failed: {e}");
            metrics::increment_counter!("warn_notify_failures_total");
            false
        }
    }
}

pub fn notifier_from_settings(settings: &Settings) -> Arc<dyn Notifier> {
    match (settings.notifier, settings.telegram_token.as_deref()) {
        (NotifierKind::Telegram, Some(token)) => {
            Arc::new(TelegramNotifier::new(settings.telegram_base_url.clone(), token))
        }
        _ => Arc::new(LogNotifier),
    }
}
