// Copyright (c) 2025 sbksba
//
// This software is licensed under the terms of the MIT License.
// See the LICENSE file in the project root for the full license text.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

const ENV_PREFIX: &str = "FITPAY_";

/// Runtime configuration of the billing server.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Config {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Local hour of day (0-23) after which the daily reminder sweep runs.
    #[serde(default = "default_reminder_hour")]
    pub reminder_hour: u32,
    /// How often the scheduler wakes up to check whether a sweep is due.
    #[serde(default = "default_sweep_check_interval_secs")]
    pub sweep_check_interval_secs: u64,
    #[serde(default)]
    pub twilio: Option<TwilioConfig>,
}

/// Credentials for the Twilio SMS gateway.
#[derive(Clone, Deserialize, Serialize, PartialEq)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

// Keeps the auth token out of logs.
impl fmt::Debug for TwilioConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwilioConfig")
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"<redacted>")
            .field("from_number", &self.from_number)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            host: default_host(),
            port: default_port(),
            reminder_hour: default_reminder_hour(),
            sweep_check_interval_secs: default_sweep_check_interval_secs(),
            twilio: None,
        }
    }
}

fn default_database_url() -> String {
    "sqlite://database/fitness_payments.db".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_reminder_hour() -> u32 {
    9
}

fn default_sweep_check_interval_secs() -> u64 {
    5 * 60
}

impl Config {
    /// Loads configuration from the process environment.
    /// `FITPAY_<KEY>` wins over `<KEY>`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    /// Unparseable values fall back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(&format!("{ENV_PREFIX}{key}"))
                .or_else(|| lookup(key))
                .filter(|value| !value.trim().is_empty())
        };

        let mut config = Config::default();

        if let Some(url) = get("DATABASE_URL") {
            config.database_url = url;
        }
        if let Some(host) = get("HOST") {
            config.host = host;
        }
        if let Some(port) = get("PORT").and_then(|p| p.parse().ok()) {
            config.port = port;
        }
        if let Some(hour) = get("REMINDER_HOUR")
            .and_then(|h| h.parse::<u32>().ok())
            .filter(|h| *h < 24)
        {
            config.reminder_hour = hour;
        }
        if let Some(secs) = get("SWEEP_CHECK_INTERVAL_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|s| *s > 0)
        {
            config.sweep_check_interval_secs = secs;
        }

        // Twilio is only used when every credential is present.
        if let (Some(account_sid), Some(auth_token), Some(from_number)) = (
            get("TWILIO_ACCOUNT_SID"),
            get("TWILIO_AUTH_TOKEN"),
            get("TWILIO_PHONE_NUMBER"),
        ) {
            config.twilio = Some(TwilioConfig {
                account_sid,
                auth_token,
                from_number,
            });
        }

        config
    }

    pub fn addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }

    pub fn sweep_check_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_check_interval_secs)
    }
}
