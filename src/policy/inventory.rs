// 本地 inventory：没有配置后端地址时使用，测试里也用它模拟后端
use super::policy_error::PolicyError;
use super::policy_fetcher::PolicyFetcher;
use super::policy_model::{Endpoint, Policy};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::time::Duration;

#[derive(Default)]
pub struct InMemoryInventory {
    policies: DashMap<Endpoint, Vec<Policy>>,
    silent: DashSet<Endpoint>,
    calls: DashMap<Endpoint, usize>,
    latency: Duration,
}

impl InMemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every answer is delayed by `latency`.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn insert(&self, endpoint: Endpoint, policies: Vec<Policy>) {
        self.silent.remove(&endpoint);
        self.policies.insert(endpoint, policies);
    }

    /// Fetches for `endpoint` never complete from now on.
    pub fn silence(&self, endpoint: Endpoint) {
        self.silent.insert(endpoint);
    }

    pub fn calls(&self, endpoint: &Endpoint) -> usize {
        self.calls.get(endpoint).map(|count| *count).unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|count| *count.value()).sum()
    }
}

#[async_trait]
impl PolicyFetcher for InMemoryInventory {
    async fn fetch(&self, endpoint: &Endpoint) -> Result<Vec<Policy>, PolicyError> {
        *self.calls.entry(endpoint.clone()).or_insert(0) += 1;

        if self.silent.contains(endpoint) {
            return std::future::pending().await;
        }
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        // 未知 endpoint 视为没有策略
        Ok(self
            .policies
            .get(endpoint)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::policy_model::PolicyKind;

    #[tokio::test]
    async fn test_fetch_counts_calls() {
        let inventory = InMemoryInventory::new();
        let endpoint = Endpoint::new("123", "us-east-1", "prod");
        inventory.insert(
            endpoint.clone(),
            vec![Policy::new("p1", PolicyKind::Ec2, "cpu")],
        );

        let policies = inventory.fetch(&endpoint).await.unwrap();
        assert_eq!(policies.len(), 1);
        let unknown = Endpoint::new("123", "us-east-1", "dev");
        assert!(inventory.fetch(&unknown).await.unwrap().is_empty());

        assert_eq!(inventory.calls(&endpoint), 1);
        assert_eq!(inventory.calls(&unknown), 1);
        assert_eq!(inventory.total_calls(), 2);
    }

    #[tokio::test]
    async fn test_silenced_fetch_never_completes() {
        let inventory = InMemoryInventory::new();
        let endpoint = Endpoint::new("123", "us-east-1", "prod");
        inventory.silence(endpoint.clone());

        let outcome =
            tokio::time::timeout(Duration::from_millis(20), inventory.fetch(&endpoint)).await;
        assert!(outcome.is_err());
        assert_eq!(inventory.calls(&endpoint), 1);
    }
}
