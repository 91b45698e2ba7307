//! Account balance lookup for OpenAI-compatible billing endpoints

use chrono::{Duration, Local};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::base_url;

/// Hard limits at or above this value mean the key has no quota
const UNLIMITED_THRESHOLD_USD: f64 = 100_000_000.0;

/// Days of usage history summed into the balance
const USAGE_WINDOW_DAYS: i64 = 99;

/// Remaining quota for an API key
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BalanceInfo {
    pub hard_limit_usd: f64,
    pub usage: f64,
    pub remaining: f64,
    pub is_unlimited: bool,
}

impl BalanceInfo {
    /// Derive balance figures from the subscription limit and usage in cents
    pub fn from_raw(hard_limit_usd: f64, total_usage_cents: f64) -> Self {
        let usage = total_usage_cents / 100.0;
        if hard_limit_usd >= UNLIMITED_THRESHOLD_USD {
            Self {
                hard_limit_usd: f64::INFINITY,
                usage: 0.0,
                remaining: f64::INFINITY,
                is_unlimited: true,
            }
        } else {
            Self {
                hard_limit_usd,
                usage,
                remaining: hard_limit_usd - usage,
                is_unlimited: false,
            }
        }
    }
}

/// Format an amount for compact display
pub fn format_balance(amount: f64, is_unlimited: bool) -> String {
    if is_unlimited || amount.is_infinite() {
        return "unlimited".to_string();
    }
    if amount >= 1_000_000.0 {
        return format!("{:.1}M", amount / 1_000_000.0);
    }
    if amount >= 1_000.0 {
        return format!("{:.1}K", amount / 1_000.0);
    }
    format!("{:.1}", amount)
}

/// Client for `/v1/dashboard/billing/*`
pub struct BalanceClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl BalanceClient {
    pub fn new(api_key: impl Into<String>, endpoint: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            base_url: base_url(endpoint),
        }
    }

    /// Query the subscription limit and recent usage
    pub async fn fetch(&self) -> Result<BalanceInfo> {
        let subscription: Subscription = self
            .get_json(&format!("{}/v1/dashboard/billing/subscription", self.base_url))
            .await?;

        let today = Local::now().date_naive();
        let start = today - Duration::days(USAGE_WINDOW_DAYS);
        let end = today + Duration::days(1);
        let usage: UsageResponse = self
            .get_json(&format!(
                "{}/v1/dashboard/billing/usage?start_date={}&end_date={}",
                self.base_url,
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d"),
            ))
            .await?;

        let info = BalanceInfo::from_raw(subscription.hard_limit_usd, usage.total_usage);
        tracing::debug!(remaining = info.remaining, "balance refreshed");
        Ok(info)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.client.get(url).bearer_auth(&self.api_key).send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::from_status(status.as_u16(), text));
        }
        Ok(response.json().await?)
    }
}

#[derive(Debug, Deserialize)]
struct Subscription {
    #[serde(default)]
    hard_limit_usd: f64,
}

#[derive(Debug, Deserialize)]
struct UsageResponse {
    #[serde(default)]
    total_usage: f64,
}
