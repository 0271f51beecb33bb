//http服务入口
use actix_web::{web, App, HttpServer};
use std::sync::Arc;
use scaling_policy_cache::handlers::policy_handler::{self, PolicyState};
use scaling_policy_cache::policy::endpoint_resolver::TagEndpointResolver;
use scaling_policy_cache::policy::inventory::InMemoryInventory;
use scaling_policy_cache::policy::policy_cache::{PolicyCache, PolicyCacheHandle};
use scaling_policy_cache::policy::policy_config::PolicyConfig;
use scaling_policy_cache::policy::policy_error::PolicyError;
use scaling_policy_cache::policy::policy_fetcher::{HttpPolicyFetcher, PolicyFetcher};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = PolicyConfig::from_env().map_err(invalid_input)?;
    let fetcher: Arc<dyn PolicyFetcher> = match &config.inventory_url {
        Some(url) => Arc::new(
            HttpPolicyFetcher::new(
                url.clone(),
                config.inventory_token.clone(),
                config.request_timeout,
            )
            .map_err(invalid_input)?,
        ),
        None => {
            log::warn!("POLICY_INVENTORY_URL not set, serving from an empty in-memory inventory");
            Arc::new(InMemoryInventory::new())
        }
    };
    let resolver = Arc::new(TagEndpointResolver::new(
        config.environment_tag.clone(),
        config.default_environment.clone(),
    ));

    let cache = PolicyCache::spawn(config.refresh_wait, fetcher, resolver);
    if let Some(interval) = config.refresh_interval {
        spawn_periodic_refresh(cache.clone(), interval);
    }

    let state = web::Data::new(PolicyState {
        cache: cache.clone(),
        lookup_timeout: config.lookup_timeout,
    });

    log::info!("Listening on {}", config.bind_addr);
    // 启动 HTTP 服务
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(policy_handler::configure)
    })
    .bind(&config.bind_addr)?//监听地址
    .run()
    .await?;

    if let Err(e) = cache.shutdown().await {
        log::warn!("Policy cache already stopped: {}", e);
    }
    Ok(())
}

// 定时触发 refresh；缓存本身不做重试
fn spawn_periodic_refresh(cache: PolicyCacheHandle, interval: std::time::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = cache.refresh().await {
                log::warn!("Periodic refresh stopped: {}", e);
                break;
            }
        }
    });
}

fn invalid_input(err: PolicyError) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::InvalidInput, err)
}
