pub mod endpoint_resolver;
pub mod inventory;
pub mod policy_cache;
pub mod policy_config;
pub mod policy_error;
pub mod policy_fetcher;
pub mod policy_model;
mod test_policy_fetcher;
