pub mod handlers;
pub mod metrics;
pub mod policy;
