// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.

//! Outgoing text messages.
//!
//! Two backends are provided:
//! - `LogOnlyNotifier` logs the message and reports success. It is used when
//!   no SMS provider is configured, so the reminder flow behaves the same.
//! - `TwilioNotifier` sends the message through the Twilio Messages API.

use crate::config::TwilioConfig;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

/// A message could not be delivered. Never fatal to the caller.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("SMS provider rejected the message with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("SMS provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends `body` to `to`. `Ok` means the provider accepted the message.
    async fn send(&self, to: &str, body: &str) -> Result<(), DeliveryError>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LogOnlyNotifier;

#[async_trait]
impl Notifier for LogOnlyNotifier {
    async fn send(&self, to: &str, body: &str) -> Result<(), DeliveryError> {
        info!(to, body, "SMS not configured, logging message instead of sending");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log-only"
    }
}

pub struct TwilioNotifier {
    client: reqwest::Client,
    messages_url: String,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioNotifier {
    pub fn new(config: &TwilioConfig) -> Self {
        Self::with_api_base(config, TWILIO_API_BASE)
    }

    /// Points the notifier at another API root, e.g. a local test double.
    pub fn with_api_base(config: &TwilioConfig, api_base: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            messages_url: format!(
                "{}/Accounts/{}/Messages.json",
                api_base.trim_end_matches('/'),
                config.account_sid
            ),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            from_number: config.from_number.clone(),
        }
    }
}

#[async_trait]
impl Notifier for TwilioNotifier {
    async fn send(&self, to: &str, body: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(&self.messages_url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", self.from_number.as_str()), ("Body", body)])
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!(to, "SMS sent");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        error!(to, status = status.as_u16(), "SMS provider rejected message");
        Err(DeliveryError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    fn name(&self) -> &'static str {
        "twilio"
    }
}

/// Twilio when fully configured, log-only otherwise.
pub fn from_config(twilio: Option<&TwilioConfig>) -> Arc<dyn Notifier> {
    match twilio {
        Some(config) => Arc::new(TwilioNotifier::new(config)),
        None => Arc::new(LogOnlyNotifier),
    }
}
