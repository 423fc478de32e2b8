use anyhow::{bail, Context, Result};
use reqwest::Client;
use serde_json::Value;

/// Thin HTTP client for the sentinel API, used by the probe bin and handy
/// for smoke-testing deployments.
pub struct SentinelClient {
    base_url: String,
    client: Client,
}

impl SentinelClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::new(),
        }
    }

    pub async fn submit_payment(&self, body: &Value) -> Result<Value> {
        let response = self
            .client
            .post(format!("{}/api/payments", self.base_url))
            .json(body)
            .send()
            .await
            .context("Failed to reach sentinel")?;

        if !response.status().is_success() {
            bail!("Submission rejected: {}", response.text().await?);
        }
        Ok(response.json().await?)
    }

    pub async fn payment_detail(&self, payment_id: &str) -> Result<Value> {
        let response = self
            .client
            .get(format!("{}/api/payments/{}", self.base_url, payment_id))
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("Detail fetch failed: {}", response.text().await?);
        }
        Ok(response.json().await?)
    }

    pub async fn trigger_verification(&self, payment_id: &str) -> Result<Value> {
        let response = self
            .client
            .post(format!(
                "{}/api/payments/{}/verify",
                self.base_url, payment_id
            ))
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("Verify trigger failed: {}", response.text().await?);
        }
        Ok(response.json().await?)
    }

    pub async fn stats(&self) -> Result<Value> {
        let response = self
            .client
            .get(format!("{}/stats", self.base_url))
            .send()
            .await?;
        Ok(response.json().await?)
    }
}
