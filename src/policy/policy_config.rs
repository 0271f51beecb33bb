use super::policy_error::PolicyError;
use reqwest::Url;
use std::time::Duration;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 3000;
const DEFAULT_REFRESH_WAIT_MS: u64 = 5000;
const DEFAULT_LOOKUP_TIMEOUT_MS: u64 = 2000;
const DEFAULT_ENVIRONMENT_TAG: &str = "environment";

#[derive(Debug, Clone)]
pub struct PolicyConfig {
    pub bind_addr: String,
    pub inventory_url: Option<Url>,
    pub inventory_token: Option<String>,
    pub request_timeout: Duration,
    /// Per-endpoint bound on a refresh fetch.
    pub refresh_wait: Duration,
    /// Deadline the HTTP lookup handler puts around a cache get.
    pub lookup_timeout: Duration,
    pub refresh_interval: Option<Duration>,
    pub environment_tag: String,
    pub default_environment: Option<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            inventory_url: None,
            inventory_token: None,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            refresh_wait: Duration::from_millis(DEFAULT_REFRESH_WAIT_MS),
            lookup_timeout: Duration::from_millis(DEFAULT_LOOKUP_TIMEOUT_MS),
            refresh_interval: None,
            environment_tag: DEFAULT_ENVIRONMENT_TAG.to_string(),
            default_environment: None,
        }
    }
}

impl PolicyConfig {
    pub fn from_env() -> Result<Self, PolicyError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    // 方便测试：不直接读进程环境变量
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PolicyError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let inventory_url = get("POLICY_INVENTORY_URL")
            .map(|raw| {
                Url::parse(&raw).map_err(|e| {
                    PolicyError::Config(format!("Invalid POLICY_INVENTORY_URL {}: {}", raw, e))
                })
            })
            .transpose()?;

        Ok(Self {
            bind_addr: get("POLICY_BIND_ADDR").unwrap_or(defaults.bind_addr),
            inventory_url,
            inventory_token: get("POLICY_INVENTORY_TOKEN"),
            request_timeout: parse_millis(
                get("POLICY_REQUEST_TIMEOUT_MS"),
                "POLICY_REQUEST_TIMEOUT_MS",
                defaults.request_timeout,
            )?,
            refresh_wait: parse_millis(
                get("POLICY_REFRESH_WAIT_MS"),
                "POLICY_REFRESH_WAIT_MS",
                defaults.refresh_wait,
            )?,
            lookup_timeout: parse_millis(
                get("POLICY_LOOKUP_TIMEOUT_MS"),
                "POLICY_LOOKUP_TIMEOUT_MS",
                defaults.lookup_timeout,
            )?,
            refresh_interval: get("POLICY_REFRESH_INTERVAL_SECS")
                .map(|raw| parse_interval(&raw, "POLICY_REFRESH_INTERVAL_SECS"))
                .transpose()?,
            environment_tag: get("POLICY_ENVIRONMENT_TAG").unwrap_or(defaults.environment_tag),
            default_environment: get("POLICY_DEFAULT_ENVIRONMENT"),
        })
    }
}

fn parse_millis(raw: Option<String>, key: &str, default: Duration) -> Result<Duration, PolicyError> {
    match raw {
        Some(raw) => parse_u64(&raw, key).map(Duration::from_millis),
        None => Ok(default),
    }
}

// tokio 的 interval 不接受零周期
fn parse_interval(raw: &str, key: &str) -> Result<Duration, PolicyError> {
    match parse_u64(raw, key)? {
        0 => Err(PolicyError::Config(format!("{} must be greater than 0", key))),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn parse_u64(raw: &str, key: &str) -> Result<u64, PolicyError> {
    raw.trim()
        .parse()
        .map_err(|_| PolicyError::Config(format!("Invalid {} value: {}", key, raw)))
}
