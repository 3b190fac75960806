use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{config::AppConfig, error::AppError};

/// Client for the external payment provider.
///
/// The provider call is the one externally-dependent blocking step in order
/// creation, so it carries its own request timeout; on failure the order is
/// left PENDING for retry or manual reconciliation.
#[derive(Debug, Clone)]
pub struct PaymentClient {
    http: reqwest::Client,
    base_url: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChargeRequest<'a> {
    reference: &'a str,
    method: &'a str,
    amount: Decimal,
}

#[derive(Debug, Deserialize)]
struct ChargeResponse {
    status: String,
}

impl PaymentClient {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.payment_timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.payment_provider_url.clone(),
        })
    }

    /// Client with no provider configured; charges settle locally.
    pub fn disconnected() -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: None,
        }
    }

    /// Whether a payment method is charged during order creation rather than
    /// settled later (cash on delivery).
    pub fn settles_immediately(method: &str) -> bool {
        matches!(method, "card" | "wallet")
    }

    /// Charge the provider for an order. `Ok` means the money moved.
    pub async fn charge(
        &self,
        reference: &str,
        method: &str,
        amount: Decimal,
    ) -> Result<(), AppError> {
        let Some(base_url) = &self.base_url else {
            // No provider configured (development, tests): settle locally.
            tracing::debug!(reference, "no payment provider configured, auto-settling");
            return Ok(());
        };

        let response = self
            .http
            .post(format!("{base_url}/charges"))
            .json(&ChargeRequest {
                reference,
                method,
                amount,
            })
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    AppError::PaymentProvider("provider request timed out".into())
                } else {
                    AppError::PaymentProvider(err.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(AppError::PaymentProvider(format!(
                "provider returned {}",
                response.status()
            )));
        }

        let charge: ChargeResponse = response
            .json()
            .await
            .map_err(|err| AppError::PaymentProvider(err.to_string()))?;
        if charge.status != "succeeded" {
            return Err(AppError::PaymentProvider(format!(
                "charge {reference} ended in status {}",
                charge.status
            )));
        }

        Ok(())
    }
}
