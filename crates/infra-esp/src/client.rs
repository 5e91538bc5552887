// ESP HTTP Gateway

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::Client as HttpClient;
use segmill_core::domain::SegmentDefinition;
use segmill_core::port::{CreateOutcome, EspError, EspGateway, MetricPage};
use tracing::{debug, warn};

use crate::wire::{classify_create_response, snippet, CreateSegmentRequest, MetricsResponse};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Spacing between attempts when the ESP is unreachable or 5xx. Rate-limit
/// responses never take this path.
const TRANSPORT_RETRY_SPACING: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct EspConfig {
    /// Base URL of the ESP API, without a trailing slash.
    pub base_url: String,
    /// API key per credential reference. Jobs carry the reference only; the
    /// key itself never leaves this adapter.
    pub api_keys: BTreeMap<String, String>,
    pub timeout: Duration,
    /// Attempts per create call when the ESP is unreachable or 5xx.
    pub max_attempts: u32,
}

impl EspConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_keys: BTreeMap::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_api_key(
        mut self,
        credential_ref: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        self.api_keys.insert(credential_ref.into(), key.into());
        self
    }
}

pub struct EspHttpGateway {
    http_client: HttpClient,
    config: EspConfig,
}

impl EspHttpGateway {
    pub fn new(config: EspConfig) -> Result<Self, EspError> {
        let http_client = HttpClient::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EspError::Transport(e.to_string()))?;
        Ok(Self {
            http_client,
            config,
        })
    }

    fn api_key(&self, credential_ref: &str) -> Result<&str, EspError> {
        self.config
            .api_keys
            .get(credential_ref)
            .map(String::as_str)
            .ok_or_else(|| {
                EspError::InvalidCredential(format!(
                    "no API key configured for credential '{credential_ref}'"
                ))
            })
    }

    /// One POST to the create-segment endpoint, returning the raw pieces the
    /// classifier needs.
    async fn post_segment(
        &self,
        api_key: &str,
        request: &CreateSegmentRequest<'_>,
    ) -> Result<(u16, Option<u64>, String), EspError> {
        let url = format!("{}/v1/segments", self.config.base_url);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await
            .map_err(|e| EspError::Transport(e.to_string()))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|raw| raw.trim().parse().ok());
        let body = response
            .text()
            .await
            .map_err(|e| EspError::Transport(e.to_string()))?;

        Ok((status, retry_after, body))
    }
}

#[async_trait]
impl EspGateway for EspHttpGateway {
    async fn create_segment(
        &self,
        credential_ref: &str,
        definition: &SegmentDefinition,
    ) -> Result<CreateOutcome, EspError> {
        let api_key = self.api_key(credential_ref)?;
        let request = CreateSegmentRequest::from_definition(definition);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.post_segment(api_key, &request).await {
                Ok((status, _, body)) if (500..600).contains(&status) => {
                    if attempt >= self.config.max_attempts {
                        return Ok(CreateOutcome::HardFailure {
                            reason: format!(
                                "ESP unavailable after {attempt} attempt(s): HTTP {status}: {}",
                                snippet(&body)
                            ),
                        });
                    }
                    warn!(
                        segment_id = %definition.segment_id,
                        status,
                        attempt,
                        "ESP server error, retrying create"
                    );
                }
                Ok((status, retry_after, body)) => {
                    debug!(
                        segment_id = %definition.segment_id,
                        status,
                        "ESP create response"
                    );
                    return classify_create_response(status, retry_after, &body);
                }
                Err(error) => {
                    if attempt >= self.config.max_attempts {
                        return Ok(CreateOutcome::HardFailure {
                            reason: format!(
                                "ESP unreachable after {attempt} attempt(s): {error}"
                            ),
                        });
                    }
                    warn!(
                        segment_id = %definition.segment_id,
                        error = %error,
                        attempt,
                        "ESP transport error, retrying create"
                    );
                }
            }
            tokio::time::sleep(TRANSPORT_RETRY_SPACING).await;
        }
    }

    async fn list_metrics(
        &self,
        credential_ref: &str,
        cursor: Option<&str>,
    ) -> Result<MetricPage, EspError> {
        let api_key = self.api_key(credential_ref)?;
        let url = format!("{}/v1/metrics", self.config.base_url);

        let mut request = self.http_client.get(&url).bearer_auth(api_key);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| EspError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| EspError::Transport(e.to_string()))?;

        match status {
            200..=299 => {
                let parsed: MetricsResponse = serde_json::from_str(&body).map_err(|e| {
                    EspError::UnexpectedResponse(format!("metric page did not parse: {e}"))
                })?;
                Ok(parsed.into())
            }
            401 | 403 => Err(EspError::InvalidCredential(format!(
                "HTTP {status}: {}",
                snippet(&body)
            ))),
            _ => Err(EspError::UnexpectedResponse(format!(
                "HTTP {status}: {}",
                snippet(&body)
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use segmill_core::domain::{Amount, Comparator, ConditionTree, Measurement, MetricRef};

    fn sample_definition() -> SegmentDefinition {
        SegmentDefinition {
            segment_id: "engaged-30d".to_string(),
            name: "Engaged (Last 30 Days)".to_string(),
            condition: ConditionTree::Metric {
                metric: MetricRef::Id {
                    id: "MTR-1".to_string(),
                },
                measurement: Measurement::Count,
                comparator: Comparator::Gte,
                value: Amount::Literal(3.0),
                window_days: Some(30),
            },
        }
    }

    #[test]
    fn test_config_trims_trailing_slash() {
        let config = EspConfig::new("https://esp.example.com/");
        assert_eq!(config.base_url, "https://esp.example.com");
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_unknown_credential_fails_before_any_call() {
        let gateway = EspHttpGateway::new(
            EspConfig::new("https://esp.example.com").with_api_key("acct-a", "key-a"),
        )
        .unwrap();

        let err = gateway
            .create_segment("acct-unknown", &sample_definition())
            .await
            .unwrap_err();
        assert!(matches!(err, EspError::InvalidCredential(ref m) if m.contains("acct-unknown")));

        let err = gateway.list_metrics("acct-unknown", None).await.unwrap_err();
        assert!(matches!(err, EspError::InvalidCredential(_)));
    }
}
