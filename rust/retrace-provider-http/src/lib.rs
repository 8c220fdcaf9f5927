//! HTTP trace index backed by a toncenter-style v3 API.
//!
//! `GET {endpoint}/traces?tx_hash=<hash>` returns the trace graph containing
//! the transaction. Calls are retried with the configured policy and abort as
//! soon as the caller's cancellation token fires.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use retrace_rt::client::{TraceIndex, TraceResponse};
use retrace_rt::config::IndexSection;
use retrace_rt::error::ClientError;
use retrace_rt::retry::{call_for_success, RetryPolicy};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

const API_KEY_HEADER: &str = "X-API-Key";

pub struct ToncenterTraceIndex {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    retry: RetryPolicy,
}

impl ToncenterTraceIndex {
    /// Builds a client for the endpoint selected by `section`.
    pub fn new(section: &IndexSection) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(section.timeout())
            .build()
            .map_err(|e| ClientError::Transport(format!("cannot build HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: section.active_endpoint().trim_end_matches('/').to_string(),
            api_key: section.api_key(),
            retry: RetryPolicy::from(section),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn traces_url(&self, tx_hash: &str) -> Result<Url, ClientError> {
        if tx_hash.is_empty() {
            return Err(ClientError::NotFound("empty transaction hash".into()));
        }
        Url::parse_with_params(&format!("{}/traces", self.endpoint), &[("tx_hash", tx_hash)])
            .map_err(|e| ClientError::Transport(format!("invalid endpoint '{}': {e}", self.endpoint)))
    }

    async fn fetch(&self, url: &Url) -> Result<TraceResponse, ClientError> {
        let mut request = self.client.get(url.clone());
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ClientError::Transport(format!("HTTP request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(format!("failed to read response body: {e}")))?;
        if status != StatusCode::OK {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| ClientError::Decode(format!("trace response: {e}")))
    }
}

#[async_trait]
impl TraceIndex for ToncenterTraceIndex {
    #[instrument(skip(self, cancel), fields(endpoint = %self.endpoint))]
    async fn traces(&self, tx_hash: &str, cancel: &CancellationToken) -> Result<TraceResponse, ClientError> {
        let url = self.traces_url(tx_hash)?;
        let response = call_for_success(&self.retry, cancel, || self.fetch(&url)).await?;
        debug!(traces = response.traces.len(), "trace index answered");
        Ok(response)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn section(testnet: bool) -> IndexSection {
        IndexSection {
            testnet,
            api_key_env: None,
            ..IndexSection::default()
        }
    }

    #[test]
    fn picks_endpoint_by_network() {
        let main = ToncenterTraceIndex::new(&section(false)).unwrap();
        assert_eq!(main.endpoint(), "https://toncenter.com/api/v3");
        let test = ToncenterTraceIndex::new(&section(true)).unwrap();
        assert_eq!(test.endpoint(), "https://testnet.toncenter.com/api/v3");
    }

    #[test]
    fn hash_is_query_encoded() {
        let index = ToncenterTraceIndex::new(&section(false)).unwrap();
        let url = index.traces_url("ab+c/d=").unwrap();
        assert_eq!(url.path(), "/api/v3/traces");
        let pairs: Vec<_> = url.query_pairs().collect();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, "tx_hash");
        assert_eq!(pairs[0].1, "ab+c/d=");
        assert!(url.as_str().contains("ab%2Bc%2Fd%3D"));
    }

    #[test]
    fn empty_hash_is_rejected() {
        let index = ToncenterTraceIndex::new(&section(false)).unwrap();
        assert!(matches!(index.traces_url(""), Err(ClientError::NotFound(_))));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let mut s = section(false);
        s.endpoint = "http://localhost:8081/api/v3/".into();
        let index = ToncenterTraceIndex::new(&s).unwrap();
        assert_eq!(
            index.traces_url("x").unwrap().as_str(),
            "http://localhost:8081/api/v3/traces?tx_hash=x"
        );
    }

    #[tokio::test]
    async fn cancelled_before_request() {
        let mut s = section(false);
        s.endpoint = "http://127.0.0.1:9".into();
        let index = ToncenterTraceIndex::new(&s).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let err = index.traces("abc", &token).await.unwrap_err();
        assert!(matches!(err, ClientError::Cancelled));
    }
}
