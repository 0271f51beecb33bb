//核心 Trait 定义（PolicyFetcher）
use super::policy_error::PolicyError;
use super::policy_model::{Endpoint, Policy};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use std::time::Duration;

/// One-shot fetch of every scaling policy an inventory endpoint knows about.
///
/// The returned future may never complete. An `Err` is only diagnostics: the
/// cache handles it the same way as a fetch that never answers.
#[async_trait]
pub trait PolicyFetcher: Send + Sync {
    async fn fetch(&self, endpoint: &Endpoint) -> Result<Vec<Policy>, PolicyError>;
}

//HTTP 客户端实现
#[derive(Clone)]
pub struct HttpPolicyFetcher {
    client: reqwest::Client,
    base_url: Url,
    auth_token: Option<String>,
}

impl HttpPolicyFetcher {
    pub fn new(
        base_url: Url,
        auth_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, PolicyError> {
        if base_url.cannot_be_a_base() {
            return Err(PolicyError::Config(format!(
                "Inventory URL {} cannot be a base",
                base_url
            )));
        }
        let client = reqwest::ClientBuilder::new().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            auth_token,
        })
    }

    // endpoint 字段逐段转义，不能改写请求路径
    pub(crate) fn policies_url(&self, endpoint: &Endpoint) -> Result<Url, PolicyError> {
        //Url样例：http://inventory:8080/inventory/123456789012/us-east-1/prod/scaling-policies
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                PolicyError::Config(format!("Inventory URL {} cannot be a base", self.base_url))
            })?
            .pop_if_empty()
            .extend([
                "inventory",
                endpoint.account_id.as_str(),
                endpoint.region.as_str(),
                endpoint.environment.as_str(),
                "scaling-policies",
            ]);
        Ok(url)
    }
}

#[async_trait]
impl PolicyFetcher for HttpPolicyFetcher {
    async fn fetch(&self, endpoint: &Endpoint) -> Result<Vec<Policy>, PolicyError> {
        let url = self.policies_url(endpoint)?;

        let mut req = self.client.get(url.clone());
        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }

        let start = std::time::Instant::now();
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await.map_err(|e| {
            PolicyError::HttpError(status, format!("Failed to read response: {}", e))
        })?;

        log::info!(
            "FetchPolicies [{}] status={} took: {:.4}s",
            endpoint,
            status,
            start.elapsed().as_secs_f64()
        );

        match status {
            StatusCode::OK => Ok(serde_json::from_str(&body)?),
            _ => Err(PolicyError::HttpError(status, format!("{} - {}", body, url))),
        }
    }
}
