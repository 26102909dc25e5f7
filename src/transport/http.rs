use super::{BatchSender, FailedEntry, SendOutcome, TransportError};
use crate::batch::WireEntry;
use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::debug;

/// Settings for [`HttpBatchSender`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSenderConfig {
    pub endpoint: url::Url,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<String>,
}

fn default_timeout_secs() -> u64 {
    30
}

impl HttpSenderConfig {
    pub fn new(endpoint: &str) -> Result<Self> {
        let endpoint = url::Url::parse(endpoint).map_err(|e| {
            Error::configuration_with_context(
                format!("invalid endpoint URL: {}", e),
                ErrorContext::new()
                    .with_field_path("http.endpoint")
                    .with_details(endpoint.to_string())
                    .with_source("http_sender"),
            )
        })?;
        Ok(Self {
            endpoint,
            timeout_secs: default_timeout_secs(),
            bearer_token: None,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// `TOPIC_BATCHER_HTTP_TIMEOUT_SECS` and `TOPIC_BATCHER_HTTP_TOKEN` win over file values.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Some(secs) = env::var("TOPIC_BATCHER_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            self.timeout_secs = secs;
        }
        if let Ok(token) = env::var("TOPIC_BATCHER_HTTP_TOKEN") {
            self.bearer_token = Some(token);
        }
        self
    }
}

#[derive(Serialize)]
struct SendBatchRequest<'a> {
    topic: &'a str,
    entries: &'a [WireEntry],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SendBatchResponse {
    // Tried first: `Detailed` has only optional fields and would match any object.
    Counts {
        success_count: usize,
        failure_count: usize,
    },
    Detailed {
        #[serde(default, alias = "Successful")]
        successful: Option<Vec<SuccessfulEntry>>,
        #[serde(default, alias = "Failed")]
        failed: Option<Vec<FailedEntry>>,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SuccessfulEntry {
    Id(String),
    Obj {
        #[serde(alias = "Id")]
        id: String,
    },
}

impl SuccessfulEntry {
    fn into_id(self) -> String {
        match self {
            SuccessfulEntry::Id(id) | SuccessfulEntry::Obj { id } => id,
        }
    }
}

/// JSON-over-HTTP send primitive.
///
/// POSTs `{"topic": ..., "entries": [...]}` and accepts either a per-entry report
/// (`successful` / `failed`) or plain counts in the response body.
pub struct HttpBatchSender {
    client: reqwest::Client,
    config: HttpSenderConfig,
}

impl HttpBatchSender {
    pub fn new(config: HttpSenderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(8)
            .pool_idle_timeout(Some(Duration::from_secs(90)))
            .build()
            .map_err(|e| Error::Transport(TransportError::Other(e.to_string())))?;
        Ok(Self { client, config })
    }

    pub fn endpoint(&self) -> &url::Url {
        &self.config.endpoint
    }
}

#[async_trait]
impl BatchSender for HttpBatchSender {
    async fn send_batch(
        &self,
        topic: &str,
        entries: &[WireEntry],
    ) -> std::result::Result<SendOutcome, TransportError> {
        let mut request = self
            .client
            .post(self.config.endpoint.clone())
            .json(&SendBatchRequest { topic, entries });
        if let Some(token) = &self.config.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let body: SendBatchResponse = response.json().await?;
        let outcome = match body {
            SendBatchResponse::Detailed {
                successful: None,
                failed: None,
            } => {
                return Err(TransportError::Other(
                    "unrecognised response body: expected successful/failed or counts".into(),
                ));
            }
            SendBatchResponse::Detailed { successful, failed } => {
                let ids: Vec<String> = successful
                    .unwrap_or_default()
                    .into_iter()
                    .map(SuccessfulEntry::into_id)
                    .collect();
                SendOutcome::from_entries(&ids, failed.unwrap_or_default())
            }
            SendBatchResponse::Counts {
                success_count,
                failure_count,
            } => SendOutcome::new(success_count, failure_count),
        };
        debug!(
            topic,
            http_status = status.as_u16(),
            success_count = outcome.success_count,
            failure_count = outcome.failure_count,
            "batch call returned"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_rejects_bad_url() {
        let err = HttpSenderConfig::new("not a url").unwrap_err();
        assert_eq!(
            err.context().and_then(|c| c.field_path.as_deref()),
            Some("http.endpoint")
        );
    }

    #[test]
    fn test_config_defaults() {
        let cfg = HttpSenderConfig::new("http://localhost:9324/batch").unwrap();
        assert_eq!(cfg.timeout_secs, 30);
        assert!(cfg.bearer_token.is_none());
        let cfg = cfg.with_timeout(Duration::from_millis(10));
        assert_eq!(cfg.timeout_secs, 1);
    }

    #[test]
    fn test_response_shapes() {
        let detailed: SendBatchResponse = serde_json::from_str(
            r#"{"Successful":[{"Id":"0"}],"Failed":[{"id":"1","code":"Throttled"}]}"#,
        )
        .unwrap();
        assert!(matches!(
            detailed,
            SendBatchResponse::Detailed { successful: Some(ref s), failed: Some(ref f) }
                if s.len() == 1 && f.len() == 1
        ));

        let error_body: SendBatchResponse =
            serde_json::from_str(r#"{"error":"queue does not exist"}"#).unwrap();
        assert!(matches!(
            error_body,
            SendBatchResponse::Detailed { successful: None, failed: None }
        ));

        let counts: SendBatchResponse =
            serde_json::from_str(r#"{"success_count":3,"failure_count":0}"#).unwrap();
        assert!(matches!(
            counts,
            SendBatchResponse::Counts { success_count: 3, failure_count: 0 }
        ));
    }
}
