use super::policy_model::{Endpoint, Query};

pub trait EndpointResolver: Send + Sync {
    /// `None` means the query maps to no inventory endpoint.
    fn resolve(&self, query: &Query) -> Option<Endpoint>;
}

/// Takes account and region from the query and the environment from one of its
/// tags.
#[derive(Debug, Clone)]
pub struct TagEndpointResolver {
    environment_tag: String,
    default_environment: Option<String>,
}

impl TagEndpointResolver {
    pub fn new(environment_tag: impl Into<String>, default_environment: Option<String>) -> Self {
        Self {
            environment_tag: environment_tag.into(),
            default_environment,
        }
    }
}

impl EndpointResolver for TagEndpointResolver {
    fn resolve(&self, query: &Query) -> Option<Endpoint> {
        if query.account_id.is_empty() || query.region.is_empty() {
            return None;
        }
        let environment = query
            .tags
            .get(&self.environment_tag)
            .filter(|env| !env.is_empty())
            .or(self.default_environment.as_ref())?;
        Some(Endpoint::new(
            query.account_id.clone(),
            query.region.clone(),
            environment.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_from_tag() {
        let resolver = TagEndpointResolver::new("environment", Some("prod".into()));
        let query = Query::new("123", "eu-west-1", "cpu").with_tag("environment", "staging");
        assert_eq!(
            resolver.resolve(&query),
            Some(Endpoint::new("123", "eu-west-1", "staging"))
        );
    }

    #[test]
    fn test_default_environment() {
        let resolver = TagEndpointResolver::new("env", Some("prod".into()));
        let query = Query::new("123", "eu-west-1", "cpu").with_tag("environment", "staging");
        assert_eq!(
            resolver.resolve(&query),
            Some(Endpoint::new("123", "eu-west-1", "prod"))
        );
    }

    #[test]
    fn test_resolution_miss() {
        let resolver = TagEndpointResolver::new("environment", None);
        assert!(resolver.resolve(&Query::new("123", "eu-west-1", "cpu")).is_none());
        assert!(resolver
            .resolve(&Query::new("", "eu-west-1", "cpu").with_tag("environment", "prod"))
            .is_none());
        assert!(resolver
            .resolve(&Query::new("123", "eu-west-1", "cpu").with_tag("environment", ""))
            .is_none());
    }
}
