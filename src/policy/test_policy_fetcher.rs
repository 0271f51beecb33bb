#[cfg(test)]
mod tests {
    use crate::policy::endpoint_resolver::TagEndpointResolver;
    use crate::policy::policy_cache::PolicyCache;
    use crate::policy::policy_error::PolicyError;
    use crate::policy::policy_fetcher::{HttpPolicyFetcher, PolicyFetcher};
    use crate::policy::policy_model::{Endpoint, PolicyKind, Query};
    use mockito::{mock, Matcher};
    use reqwest::{StatusCode, Url};
    use std::sync::Arc;
    use std::time::Duration;

    fn fetcher(token: Option<String>) -> HttpPolicyFetcher {
        let base_url = Url::parse(&mockito::server_url()).unwrap();
        HttpPolicyFetcher::new(base_url, token, Duration::from_secs(3)).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_policies() {
        // 模拟 inventory 返回的响应体
        let _mock = mock("GET", "/inventory/111111111111/us-east-1/prod/scaling-policies")
            .match_header("authorization", "Bearer token")
            .with_status(200)
            .with_body(
                r#"
                [
                    {"id": "asg-web", "kind": "EC2", "metricName": "cpu", "relatedIds": ["web-1"]},
                    {"id": "svc-api", "kind": "ECS", "metricName": "requests"}
                ]
            "#,
            )
            .create();

        let endpoint = Endpoint::new("111111111111", "us-east-1", "prod");
        let policies = fetcher(Some("token".into()))
            .fetch(&endpoint)
            .await
            .unwrap();

        assert_eq!(policies.len(), 2);
        assert_eq!(policies[0].id, "asg-web");
        assert_eq!(policies[0].kind, PolicyKind::Ec2);
        assert_eq!(policies[0].related_ids, vec!["web-1".to_string()]);
        assert_eq!(policies[1].kind, PolicyKind::Ecs);
        assert!(policies[1].related_ids.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_empty_inventory() {
        let _mock = mock("GET", "/inventory/222222222222/us-east-1/dev/scaling-policies")
            .with_status(200)
            .with_body("[]")
            .create();

        let endpoint = Endpoint::new("222222222222", "us-east-1", "dev");
        let policies = fetcher(None).fetch(&endpoint).await.unwrap();
        assert!(policies.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_500() {
        let _mock = mock("GET", "/inventory/333333333333/eu-west-1/prod/scaling-policies")
            .with_status(500)
            .with_body("inventory unavailable")
            .create();

        let endpoint = Endpoint::new("333333333333", "eu-west-1", "prod");
        match fetcher(None).fetch(&endpoint).await {
            Err(PolicyError::HttpError(status, body)) => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert!(body.contains("inventory unavailable"));
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_fetch_malformed_body() {
        let _mock = mock("GET", "/inventory/444444444444/eu-west-1/prod/scaling-policies")
            .with_status(200)
            .with_body(r#"{"policies": "nope"}"#)
            .create();

        let endpoint = Endpoint::new("444444444444", "eu-west-1", "prod");
        let result = fetcher(None).fetch(&endpoint).await;
        assert!(matches!(result, Err(PolicyError::JsonError(_))));
    }

    #[tokio::test]
    async fn test_cache_over_http_backend() {
        let _mock = mock("GET", "/inventory/555555555555/ap-south-1/prod/scaling-policies")
            .with_status(200)
            .with_body(r#"[{"id": "asg-batch", "kind": "EC2", "metricName": "queue_depth"}]"#)
            .expect(1)
            .create();

        let cache = PolicyCache::spawn(
            Duration::from_millis(500),
            Arc::new(fetcher(None)),
            Arc::new(TagEndpointResolver::new("environment", None)),
        );
        let query =
            Query::new("555555555555", "ap-south-1", "queue_depth").with_tag("environment", "prod");

        let first = cache
            .get_within(query.clone(), Duration::from_secs(3))
            .await
            .unwrap();
        assert_eq!(first.unwrap().id, "asg-batch");
        let second = cache.get_within(query, Duration::from_secs(3)).await.unwrap();
        assert_eq!(second.unwrap().id, "asg-batch");

        _mock.assert();
    }

    #[tokio::test]
    async fn test_failed_fetch_times_out_caller() {
        let _mock = mock("GET", "/inventory/666666666666/ap-south-1/prod/scaling-policies")
            .with_status(503)
            .create();

        let cache = PolicyCache::spawn(
            Duration::from_millis(500),
            Arc::new(fetcher(None)),
            Arc::new(TagEndpointResolver::new("environment", None)),
        );
        let query = Query::new("666666666666", "ap-south-1", "cpu").with_tag("environment", "prod");

        let outcome = cache.get_within(query, Duration::from_millis(300)).await;
        assert!(matches!(outcome, Err(PolicyError::Timeout(_))));
        assert!(cache.inspect().await.unwrap().is_empty());
    }

    #[test]
    fn test_policies_url_keeps_base_path() {
        let endpoint = Endpoint::new("1", "r", "prod");
        for base in ["http://inv:9000/api", "http://inv:9000/api/"] {
            let fetcher =
                HttpPolicyFetcher::new(Url::parse(base).unwrap(), None, Duration::from_secs(3))
                    .unwrap();
            assert_eq!(
                fetcher.policies_url(&endpoint).unwrap().as_str(),
                "http://inv:9000/api/inventory/1/r/prod/scaling-policies"
            );
        }
    }

    #[test]
    fn test_policies_url_escapes_endpoint_fields() {
        let fetcher = HttpPolicyFetcher::new(
            Url::parse("http://inv:9000/").unwrap(),
            None,
            Duration::from_secs(3),
        )
        .unwrap();
        let endpoint = Endpoint::new("1", "r", "../../admin/delete?x=");
        let url = fetcher.policies_url(&endpoint).unwrap();

        assert!(url.query().is_none());
        let segments: Vec<&str> = url.path_segments().unwrap().collect();
        assert_eq!(segments.len(), 5);
        assert_eq!(segments[0], "inventory");
        assert!(segments[3].contains("%2F"));
        assert!(segments[3].contains("%3F"));
        assert_eq!(segments[4], "scaling-policies");
    }

    #[test]
    fn test_rejects_non_base_url() {
        let result = HttpPolicyFetcher::new(
            Url::parse("mailto:inventory@example.com").unwrap(),
            None,
            Duration::from_secs(3),
        );
        assert!(matches!(result, Err(PolicyError::Config(_))));
    }

    #[tokio::test]
    async fn test_fetch_with_escaped_environment() {
        let _mock = mock(
            "GET",
            Matcher::Regex(
                r"^/inventory/777777777777/us-east-1/prod%2F.*%3F.*/scaling-policies$".into(),
            ),
        )
        .with_status(200)
        .with_body(r#"[{"id": "asg-odd", "kind": "EC2", "metricName": "cpu"}]"#)
        .expect(1)
        .create();

        let endpoint = Endpoint::new("777777777777", "us-east-1", "prod/../admin?x=1");
        let policies = fetcher(None).fetch(&endpoint).await.unwrap();
        assert_eq!(policies[0].id, "asg-odd");
        _mock.assert();
    }
}
