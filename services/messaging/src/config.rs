use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context as _, bail};
use chrono::{DateTime, Utc};

/// How history endpoints answer for a campaign with no recorded attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmptyCampaignPolicy {
    /// Respond 404 `CAMPAIGN_NOT_FOUND`.
    #[default]
    NotFound,
    /// Respond with zero counters and an empty list.
    Empty,
}

impl FromStr for EmptyCampaignPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "not-found" => Ok(Self::NotFound),
            "empty" => Ok(Self::Empty),
            other => bail!("unknown empty campaign policy: {other}"),
        }
    }
}

/// Backoff and attempt cap applied by the retry orchestrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub base_delay: Duration,
    pub multiplier: f64,
    pub max_attempts: i32,
    pub max_delay: Duration,
    /// How long a claimed retry may stay unresolved before another worker
    /// takes it over.
    pub claim_lease: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(30_000),
            multiplier: 2.0,
            max_attempts: 3,
            max_delay: Duration::from_millis(3_600_000),
            claim_lease: Duration::from_secs(20),
        }
    }
}

impl RetryPolicy {
    /// Claims taken before this instant are abandoned.
    pub fn claim_expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.claim_lease)
            .ok()
            .and_then(|lease| now.checked_sub_signed(lease))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Delay before retrying after failed attempt `n` (1-based):
    /// `base × multiplier^(n−1)`, capped at `max_delay`.
    pub fn delay(&self, attempt_number: i32) -> Duration {
        let exponent = attempt_number.saturating_sub(1).max(0);
        let factor = self.multiplier.max(1.0).powi(exponent);
        let millis = self.base_delay.as_millis() as f64 * factor;
        let cap = self.max_delay.as_millis() as f64;
        if !millis.is_finite() || millis >= cap {
            self.max_delay
        } else {
            Duration::from_millis(millis as u64)
        }
    }
}

/// SMS HTTP gateway credentials.
#[derive(Debug, Clone)]
pub struct SmsGatewayConfig {
    pub base_url: String,
    pub api_key: String,
    pub sender_id: String,
}

/// WhatsApp Cloud API credentials.
#[derive(Debug, Clone)]
pub struct WhatsappCloudConfig {
    pub base_url: String,
    pub phone_number_id: String,
    pub access_token: String,
}

/// Messaging service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct MessagingConfig {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// TCP port for the HTTP server (default 3120). Env var: `MESSAGING_PORT`.
    pub messaging_port: u16,
    /// Token echoed back during WhatsApp webhook verification.
    pub webhook_verify_token: String,
    /// When set, `X-Hub-Signature-256` must verify against this secret.
    pub whatsapp_app_secret: Option<String>,
    pub retry: RetryPolicy,
    /// Maximum node evaluations per inbound message (default 10).
    pub flow_hop_cap: usize,
    pub session_idle_timeout: Duration,
    pub empty_campaign_policy: EmptyCampaignPolicy,
    /// Path of the JSON flow definition loaded at startup.
    pub flow_definition_path: String,
    pub sms: Option<SmsGatewayConfig>,
    pub whatsapp: Option<WhatsappCloudConfig>,
    pub provider_timeout: Duration,
    pub worker_poll_interval: Duration,
    pub worker_batch_size: u64,
}

impl MessagingConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let provider_timeout = Duration::from_secs(vars.parse_or("PROVIDER_TIMEOUT_SECS", 10)?);
        if provider_timeout.is_zero() {
            bail!("PROVIDER_TIMEOUT_SECS must be at least 1");
        }

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            base_delay: Duration::from_millis(vars.parse_or(
                "RETRY_BASE_DELAY_MS",
                defaults.base_delay.as_millis() as u64,
            )?),
            multiplier: vars.parse_or("RETRY_MULTIPLIER", defaults.multiplier)?,
            max_attempts: vars.parse_or("RETRY_MAX_ATTEMPTS", defaults.max_attempts)?,
            max_delay: Duration::from_millis(vars.parse_or(
                "RETRY_MAX_DELAY_MS",
                defaults.max_delay.as_millis() as u64,
            )?),
            claim_lease: provider_timeout * 2,
        };
        if retry.max_attempts < 1 {
            bail!("RETRY_MAX_ATTEMPTS must be at least 1");
        }
        if retry.multiplier < 1.0 {
            bail!("RETRY_MULTIPLIER must be at least 1.0");
        }

        let flow_hop_cap = vars.parse_or("FLOW_HOP_CAP", 10)?;
        if flow_hop_cap == 0 {
            bail!("FLOW_HOP_CAP must be at least 1");
        }
        let worker_poll_interval =
            Duration::from_millis(vars.parse_or("WORKER_POLL_INTERVAL_MS", 5000)?);
        if worker_poll_interval.is_zero() {
            bail!("WORKER_POLL_INTERVAL_MS must be at least 1");
        }
        let worker_batch_size = vars.parse_or("WORKER_BATCH_SIZE", 50)?;
        if worker_batch_size == 0 {
            bail!("WORKER_BATCH_SIZE must be at least 1");
        }

        let sms = match (vars.get("SMS_API_BASE_URL"), vars.get("SMS_API_KEY")) {
            (Some(base_url), Some(api_key)) => Some(SmsGatewayConfig {
                base_url,
                api_key,
                sender_id: vars.get("SMS_SENDER_ID").unwrap_or_default(),
            }),
            _ => None,
        };
        let whatsapp = match (
            vars.get("WHATSAPP_PHONE_NUMBER_ID"),
            vars.get("WHATSAPP_ACCESS_TOKEN"),
        ) {
            (Some(phone_number_id), Some(access_token)) => Some(WhatsappCloudConfig {
                base_url: vars
                    .get("WHATSAPP_API_BASE_URL")
                    .unwrap_or_else(|| "https://graph.facebook.com/v19.0".to_owned()),
                phone_number_id,
                access_token,
            }),
            _ => None,
        };

        Ok(Self {
            database_url: vars.get("DATABASE_URL").context("DATABASE_URL must be set")?,
            messaging_port: vars.parse_or("MESSAGING_PORT", 3120)?,
            webhook_verify_token: vars
                .get("WEBHOOK_VERIFY_TOKEN")
                .context("WEBHOOK_VERIFY_TOKEN must be set")?,
            whatsapp_app_secret: vars.get("WHATSAPP_APP_SECRET"),
            retry,
            flow_hop_cap,
            session_idle_timeout: Duration::from_secs(
                vars.parse_or("SESSION_IDLE_TIMEOUT_SECS", 1800)?,
            ),
            empty_campaign_policy: vars
                .parse_or("EMPTY_CAMPAIGN_POLICY", EmptyCampaignPolicy::default())?,
            flow_definition_path: vars
                .get("FLOW_DEFINITION_PATH")
                .unwrap_or_else(|| "flows/default.json".to_owned()),
            sms,
            whatsapp,
            provider_timeout,
            worker_poll_interval,
            worker_batch_size,
        })
    }
}

struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn get(&self, name: &str) -> Option<String> {
        (self.0)(name).filter(|v| !v.trim().is_empty())
    }

    fn parse_or<T>(&self, name: &str, default: T) -> anyhow::Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(name) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid {name}={raw:?}: {e}")),
            None => Ok(default),
        }
    }
}
