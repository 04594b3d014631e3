//! Upstream pricing feed.
//!
//! `RateSource` is the seam the engine polls through; `HttpRateSource`
//! implements it against the hosted pricing API.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use lumo_types::{CurrencyCode, ExchangeRate, FeeRates, HistoricalRates, TimeInterval};

use crate::error::RateError;

/// Default timeout for pricing feed requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default connection timeout.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Provider of exchange rates, fee rates and historical series.
#[async_trait]
pub trait RateSource: Send + Sync {
    async fn fetch_exchange_rates(&self) -> Result<Vec<ExchangeRate>, RateError>;

    async fn fetch_fee_rates(&self) -> Result<BTreeMap<CurrencyCode, FeeRates>, RateError>;

    async fn fetch_historical(
        &self,
        interval: TimeInterval,
    ) -> Result<HistoricalRates, RateError>;
}

/// Pricing feed client for the hosted rates API.
///
/// The API contract:
/// `GET {base}/exchange-rates` returns `{"rates": [ExchangeRate, ...]}`;
/// `GET {base}/fee-rates` returns `{"fee_rates": {currency: FeeRates}}`;
/// `GET {base}/historical-rates?interval={interval}` returns
/// `{"historical": HistoricalRates}` filtered to that interval.
pub struct HttpRateSource {
    http_client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeRatesResponse {
    rates: Vec<ExchangeRate>,
}

#[derive(Debug, Deserialize)]
struct FeeRatesResponse {
    fee_rates: BTreeMap<CurrencyCode, FeeRates>,
}

#[derive(Debug, Deserialize)]
struct HistoricalResponse {
    historical: HistoricalRates,
}

impl HttpRateSource {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, RateError> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(%url, "pricing feed request");

        let response = self
            .http_client
            .get(&url)
            .header("x-api-key", &self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(RateError::Decode(format!(
                "HTTP status {}",
                response.status()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| RateError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RateSource for HttpRateSource {
    async fn fetch_exchange_rates(&self) -> Result<Vec<ExchangeRate>, RateError> {
        let resp: ExchangeRatesResponse = self.get_json("exchange-rates").await?;
        Ok(resp.rates)
    }

    async fn fetch_fee_rates(&self) -> Result<BTreeMap<CurrencyCode, FeeRates>, RateError> {
        let resp: FeeRatesResponse = self.get_json("fee-rates").await?;
        Ok(resp.fee_rates)
    }

    async fn fetch_historical(
        &self,
        interval: TimeInterval,
    ) -> Result<HistoricalRates, RateError> {
        let path = format!("historical-rates?interval={}", interval.as_str());
        let resp: HistoricalResponse = self.get_json(&path).await?;
        Ok(resp.historical)
    }
}
