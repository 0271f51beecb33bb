use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One inventory cluster. All three fields take part in equality, so this is
/// the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub account_id: String,
    pub region: String,
    pub environment: String,
}

impl Endpoint {
    pub fn new(
        account_id: impl Into<String>,
        region: impl Into<String>,
        environment: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            region: region.into(),
            environment: environment.into(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.account_id, self.region, self.environment)
    }
}

// 策略所伸缩的计算资源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PolicyKind {
    Ec2,
    Ecs,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub id: String,
    pub kind: PolicyKind,
    pub metric_name: String,
    /// Carried through untouched from the inventory.
    #[serde(default)]
    pub related_ids: Vec<String>,
}

impl Policy {
    pub fn new(id: impl Into<String>, kind: PolicyKind, metric_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            metric_name: metric_name.into(),
            related_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub region: String,
    pub account_id: String,
    pub metric_name: String,
    #[serde(default)]
    pub tags: HashMap<String, String>,
}

impl Query {
    pub fn new(
        account_id: impl Into<String>,
        region: impl Into<String>,
        metric_name: impl Into<String>,
    ) -> Self {
        Self {
            region: region.into(),
            account_id: account_id.into(),
            metric_name: metric_name.into(),
            tags: HashMap::new(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Value copy of the whole cache, as returned by inspect.
pub type CacheSnapshot = HashMap<Endpoint, Vec<Policy>>;

/// First policy in stored order whose metric name matches.
pub fn find_policy(policies: &[Policy], metric_name: &str) -> Option<Policy> {
    policies
        .iter()
        .find(|policy| policy.metric_name == metric_name)
        .cloned()
}
