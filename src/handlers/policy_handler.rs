//策略缓存 HTTP 处理器实现
// policy_handler.rs
use crate::metrics::forwarded::ForwardedMetric;
use crate::policy::policy_cache::PolicyCacheHandle;
use crate::policy::policy_error::PolicyError;
use crate::policy::policy_model::{Endpoint, Policy};
use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;
use std::time::Duration;

pub struct PolicyState {
    pub cache: PolicyCacheHandle,
    /// Deadline around every lookup; the cache has none of its own.
    pub lookup_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct EndpointPolicies {
    endpoint: Endpoint,
    policies: Vec<Policy>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/system/policy/lookup").route(web::post().to(lookup_policy)))
        .service(web::resource("/system/policy/refresh").route(web::post().to(refresh_policies)))
        .service(web::resource("/system/policy/cache").route(web::get().to(inspect_policies)));
}

pub async fn lookup_policy(
    payload: web::Json<ForwardedMetric>, //指标转发管道发来的指标, json形式
    state: web::Data<PolicyState>,
) -> impl Responder {
    let query = payload.to_query();
    log::debug!("Processing lookup: {:?}", query);

    match state.cache.get_within(query, state.lookup_timeout).await {
        Ok(Some(policy)) => HttpResponse::Ok().json(policy),
        Ok(None) => HttpResponse::NotFound().finish(),
        Err(e) => error_response(e),
    }
}

pub async fn refresh_policies(state: web::Data<PolicyState>) -> impl Responder {
    match state.cache.refresh().await {
        Ok(()) => HttpResponse::NoContent().finish(),
        Err(e) => error_response(e),
    }
}

pub async fn inspect_policies(state: web::Data<PolicyState>) -> impl Responder {
    match state.cache.inspect().await {
        Ok(snapshot) => {
            let mut entries: Vec<EndpointPolicies> = snapshot
                .into_iter()
                .map(|(endpoint, policies)| EndpointPolicies { endpoint, policies })
                .collect();
            entries.sort_by_key(|entry| entry.endpoint.to_string());
            HttpResponse::Ok().json(entries)
        }
        Err(e) => error_response(e),
    }
}

fn error_response(err: PolicyError) -> HttpResponse {
    log::warn!("Policy request failed: {}", err);
    let message = err.to_string();
    match err {
        PolicyError::Timeout(_) => HttpResponse::GatewayTimeout().body(message),
        PolicyError::CacheClosed => HttpResponse::ServiceUnavailable().body(message),
        _ => HttpResponse::InternalServerError().body(message),
    }
}
