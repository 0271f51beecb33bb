use reqwest::StatusCode;
use serde_json::Error as JsonError;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum PolicyError {
    #[error("HTTP error ({0}): {1}")]
    HttpError(StatusCode, String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] JsonError),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),

    #[error("Config error: {0}")]
    Config(String),

    // 调用方的等待时限到期，缓存本身没有超时
    #[error("No answer within {0:?}")]
    Timeout(Duration),

    #[error("Policy cache is no longer running")]
    CacheClosed,
}
