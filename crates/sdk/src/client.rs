//! Segmill Client Implementation

use crate::error::{Result, SdkError};
use crate::types::{
    CancelRequest, CancelResponse, JobReport, ListRequest, ListResponse, StatusRequest,
    StatsResponse, SubmitRequest, SubmitResponse,
};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ObjectParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use serde::Serialize;
use std::time::Duration;

/// Segmill daemon client
///
/// Provides a high-level interface to the Segmill JSON-RPC surface.
///
/// # Example
///
/// ```no_run
/// use segmill_sdk::SegmillClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = SegmillClient::connect("http://127.0.0.1:9630").await?;
/// # Ok(())
/// # }
/// ```
pub struct SegmillClient {
    client: HttpClient,
}

/// The daemon parses named parameter objects, so every request travels as
/// a JSON object rather than a positional array.
fn named_params<T: Serialize>(request: &T) -> Result<ObjectParams> {
    let value = serde_json::to_value(request)?;
    let serde_json::Value::Object(map) = value else {
        return Err(SdkError::Other(
            "request did not serialize to an object".to_string(),
        ));
    };
    let mut params = ObjectParams::new();
    for (key, value) in map {
        params.insert(&key, value)?;
    }
    Ok(params)
}

impl SegmillClient {
    /// Connect to the Segmill daemon
    ///
    /// # Arguments
    ///
    /// * `url` - RPC endpoint URL (e.g., `http://127.0.0.1:9630`)
    pub async fn connect(url: impl AsRef<str>) -> Result<Self> {
        let url = url.as_ref();

        let client = HttpClientBuilder::default()
            .request_timeout(Duration::from_secs(30))
            .build(url)
            .map_err(|e| SdkError::Connection(format!("Failed to create client: {}", e)))?;

        Ok(Self { client })
    }

    /// Submit a segment creation job
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use segmill_sdk::{SegmillClient, SubmitRequest};
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// # let client = SegmillClient::connect("http://127.0.0.1:9630").await?;
    /// let response = client.submit(SubmitRequest {
    ///     credential_ref: "acct-7".to_string(),
    ///     segment_ids: vec!["engaged-30d".to_string(), "repeat-buyers".to_string()],
    ///     currency_symbol: None,
    ///     thresholds: None,
    /// }).await?;
    ///
    /// println!("Job submitted: {}", response.job_id);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitResponse> {
        let params = named_params(&request)?;
        let response: SubmitResponse = self.client.request("segments.submit.v1", params).await?;

        Ok(response)
    }

    /// Fetch the full row view of one job
    pub async fn status(&self, job_id: impl Into<String>) -> Result<JobReport> {
        let request = StatusRequest {
            job_id: job_id.into(),
        };
        let params = named_params(&request)?;
        let response: JobReport = self.client.request("segments.status.v1", params).await?;

        Ok(response)
    }

    /// List recent jobs, newest first
    ///
    /// # Arguments
    ///
    /// * `status` - Optional status filter (e.g. `"WAITING_RETRY"`)
    /// * `limit` - Maximum number of rows
    pub async fn list(&self, status: Option<&str>, limit: i64) -> Result<ListResponse> {
        let request = ListRequest {
            status: status.map(|s| s.to_string()),
            limit,
        };
        let params = named_params(&request)?;
        let response: ListResponse = self.client.request("segments.list.v1", params).await?;

        Ok(response)
    }

    /// Cancel a job
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use segmill_sdk::SegmillClient;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// # let client = SegmillClient::connect("http://127.0.0.1:9630").await?;
    /// let response = client.cancel("job-123").await?;
    /// assert!(response.cancelled);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn cancel(&self, job_id: impl Into<String>) -> Result<CancelResponse> {
        let request = CancelRequest {
            job_id: job_id.into(),
        };
        let params = named_params(&request)?;
        let response: CancelResponse = self.client.request("segments.cancel.v1", params).await?;

        Ok(response)
    }

    /// Fetch daemon statistics
    pub async fn stats(&self) -> Result<StatsResponse> {
        let params = ObjectParams::new();
        let response: StatsResponse = self.client.request("admin.stats.v1", params).await?;

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_named_params_from_request() {
        let mut thresholds = BTreeMap::new();
        thresholds.insert("high_value_spend".to_string(), 500.0);

        let request = SubmitRequest {
            credential_ref: "acct-1".to_string(),
            segment_ids: vec!["engaged-30d".to_string()],
            currency_symbol: Some("€".to_string()),
            thresholds: Some(thresholds),
        };

        // A serializable struct becomes a named parameter object.
        assert!(named_params(&request).is_ok());
    }

    #[test]
    fn test_named_params_rejects_non_objects() {
        assert!(named_params(&42_u32).is_err());
    }
}
