pub mod auth;
pub mod mail;

use crate::config::ConfigManager;
use crate::error::{ReportError, Result};
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

pub const GRAPH_API_BASE: &str = "https://graph.microsoft.com/v1.0";

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;
const MAX_BACKOFF_MS: u64 = 30000;
const JITTER_FACTOR: f64 = 0.3; // +/- 30% jitter

/// Exponential backoff capped at `MAX_BACKOFF_MS`, with jitter
fn calculate_backoff_with_jitter(attempt: u32) -> Duration {
    let capped_backoff = (INITIAL_BACKOFF_MS * 2u64.pow(attempt)).min(MAX_BACKOFF_MS);

    let jitter_range = (capped_backoff as f64 * JITTER_FACTOR) as u64;
    let jitter = if jitter_range > 0 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        std::time::SystemTime::now().hash(&mut hasher);
        (hasher.finish() % (jitter_range * 2)) as i64 - jitter_range as i64
    } else {
        0
    };

    Duration::from_millis((capped_backoff as i64 + jitter).max(100) as u64)
}

/// Read-only Graph API client with retry support
pub struct GraphClient {
    client: Client,
    access_token: String,
    base_url: String,
}

impl GraphClient {
    pub fn new(access_token: String) -> Self {
        Self::with_base_url(access_token, GRAPH_API_BASE)
    }

    pub fn with_base_url(access_token: String, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            access_token,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Create a client for a configured tenant from its cached token
    pub async fn from_config(config: &ConfigManager, tenant_name: &str) -> Result<Self> {
        let graph_auth = auth::GraphAuth::new(config.clone());
        let access_token = graph_auth.get_access_token(tenant_name).await?;

        Ok(Self::new(access_token))
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    /// Follow `@odata.nextLink` until every page of `endpoint` is fetched
    pub async fn get_all_pages<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Vec<T>> {
        let mut all_items: Vec<T> = Vec::new();
        let mut current_url = self.url(endpoint);

        loop {
            let page: PaginatedResponse<T> = self.get_url(&current_url).await?;
            all_items.extend(page.value);

            match page.next_link {
                Some(next) => current_url = next,
                None => break,
            }
        }

        Ok(all_items)
    }

    /// GET an absolute URL, retrying 429s, server errors and connection failures
    async fn get_url<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            let response = self
                .client
                .get(url)
                .bearer_auth(&self.access_token)
                .send()
                .await;

            let resp = match response {
                Ok(resp) => resp,
                Err(e) => {
                    if attempt < MAX_RETRIES - 1 {
                        let wait_time = calculate_backoff_with_jitter(attempt);
                        tracing::warn!(
                            "Connection error: {}. Retrying in {:?}... (attempt {}/{})",
                            e,
                            wait_time,
                            attempt + 1,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(wait_time).await;
                        last_error = Some(e);
                        continue;
                    }
                    return Err(e.into());
                }
            };

            let status = resp.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS && attempt < MAX_RETRIES - 1 {
                let retry_after = resp
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(INITIAL_BACKOFF_MS / 1000);

                tracing::warn!(
                    "Rate limited (429). Retrying in {} seconds... (attempt {}/{})",
                    retry_after,
                    attempt + 1,
                    MAX_RETRIES
                );
                tokio::time::sleep(Duration::from_secs(retry_after)).await;
                continue;
            }

            if status.is_server_error() && attempt < MAX_RETRIES - 1 {
                let wait_time = calculate_backoff_with_jitter(attempt);
                tracing::warn!(
                    "Server error ({}). Retrying in {:?}... (attempt {}/{})",
                    status,
                    wait_time,
                    attempt + 1,
                    MAX_RETRIES
                );
                tokio::time::sleep(wait_time).await;
                continue;
            }

            if !status.is_success() {
                let error_text = resp.text().await.unwrap_or_default();
                let enhanced_error = crate::error::enhance_graph_error(&error_text);
                return Err(ReportError::GraphApiError(format!(
                    "HTTP {}: {}",
                    status, enhanced_error
                )));
            }

            return Ok(resp.json::<T>().await?);
        }

        Err(last_error.map(|e| e.into()).unwrap_or_else(|| {
            ReportError::GraphApiError(format!("GET {} failed after {} retries", url, MAX_RETRIES))
        }))
    }
}

/// Standard OData page: `value` array plus an optional `@odata.nextLink`
#[derive(Debug, Deserialize)]
pub struct PaginatedResponse<T> {
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_backoff_is_capped() {
        for attempt in 0..10 {
            let wait = calculate_backoff_with_jitter(attempt);
            let ceiling = (MAX_BACKOFF_MS as f64 * (1.0 + JITTER_FACTOR)) as u128;
            assert!(wait.as_millis() <= ceiling);
            assert!(wait.as_millis() >= 100);
        }
    }

    #[tokio::test]
    async fn test_get_all_pages_follows_next_link() {
        let server = MockServer::start().await;
        let next = format!("{}/v1.0/me/mailFolders?page=2", server.uri());

        Mock::given(method("GET"))
            .and(path("/v1.0/me/mailFolders"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [{"id": "b"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/v1.0/me/mailFolders"))
            .and(header("authorization", "Bearer token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "value": [{"id": "a"}],
                "@odata.nextLink": next
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GraphClient::with_base_url("token".into(), format!("{}/v1.0", server.uri()));
        let items: Vec<serde_json::Value> = client.get_all_pages("me/mailFolders").await.unwrap();
        let ids: Vec<&str> = items.iter().filter_map(|v| v["id"].as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1.0/me/mailFolders"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "error": {"code": "ErrorAccessDenied", "message": "Access is denied."}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = GraphClient::with_base_url("token".into(), format!("{}/v1.0", server.uri()));
        let err = client
            .get_all_pages::<serde_json::Value>("me/mailFolders")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("ErrorAccessDenied"));
    }
}
