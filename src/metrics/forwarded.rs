//转发指标的结构体实现
use crate::policy::policy_model::Query;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// 指标转发管道发来的一条指标描述
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardedMetric {
    #[serde(rename = "accountId")]
    pub account_id: String,

    pub region: String,

    #[serde(rename = "metricName")]
    pub metric_name: String,

    #[serde(default)]
    pub dimensions: HashMap<String, String>,
}

impl ForwardedMetric {
    pub fn to_query(&self) -> Query {
        Query {
            region: self.region.clone(),
            account_id: self.account_id.clone(),
            metric_name: self.metric_name.clone(),
            tags: self.dimensions.clone(),
        }
    }
}
