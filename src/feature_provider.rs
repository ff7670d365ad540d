// =============================================================================
// Feature Provider client — upstream "ME" feature-engineering service
// =============================================================================
//
// Same reqwest-based request shape as `binance/client.rs`'s account/market
// calls, minus request signing (this upstream has no auth in scope).
// =============================================================================

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

const FETCH_DEADLINE: Duration = Duration::from_secs(3);

#[derive(Debug, Deserialize)]
struct FeatureResponse {
    success: bool,
    #[serde(default)]
    features: HashMap<String, f64>,
}

#[derive(Debug, thiserror::Error)]
pub enum FeatureProviderError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("upstream reported failure")]
    UpstreamFailure,
    #[error("deadline exceeded")]
    Timeout,
}

pub struct FeatureProviderClient {
    base_url: String,
    http: reqwest::Client,
}

impl FeatureProviderClient {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    /// Fetches supplemental features for `instrument`, bounded by a 3s
    /// deadline. Any failure or timeout is the caller's cue to fall back to
    /// the default-approval path — this never panics and never retries.
    pub async fn fetch(&self, instrument: &str) -> Result<HashMap<String, f64>, FeatureProviderError> {
        let url = format!("{}/api/features/{instrument}", self.base_url);
        let call = async {
            let resp = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| FeatureProviderError::Request(e.to_string()))?;
            let body: FeatureResponse = resp
                .json()
                .await
                .map_err(|e| FeatureProviderError::Request(e.to_string()))?;
            if !body.success {
                return Err(FeatureProviderError::UpstreamFailure);
            }
            Ok(body.features)
        };

        match tokio::time::timeout(FETCH_DEADLINE, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(instrument, "feature provider fetch exceeded 3s deadline");
                Err(FeatureProviderError::Timeout)
            }
        }
    }
}
