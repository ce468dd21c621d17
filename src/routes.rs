use std::collections::HashMap;

use reqwest::Url;
use tracing::info;

use crate::config::ServiceSpec;
use crate::error::{GatewayError, Result};

/// One proxied service: its name under `/api/` and the backend base URL.
#[derive(Debug, Clone)]
pub struct Route {
    pub name: String,
    pub target: Url,
}

impl Route {
    /// Join a rewritten path (and optional query string) onto the backend
    /// base URL.
    pub fn backend_url(&self, path: &str, query: Option<&str>) -> String {
        let base = self.target.as_str().trim_end_matches('/');
        match query {
            Some(q) => format!("{base}{path}?{q}"),
            None => format!("{base}{path}"),
        }
    }
}

/// Immutable service name -> backend mapping, built once at startup.
#[derive(Debug)]
pub struct RouteTable {
    routes: HashMap<String, Route>,
}

impl RouteTable {
    /// Build and validate the table. Absent or malformed URLs and duplicate
    /// names are startup errors, not first-request surprises.
    pub fn from_specs(specs: &[ServiceSpec]) -> Result<Self> {
        let mut routes = HashMap::new();

        for spec in specs {
            let target = Url::parse(spec.url.trim()).map_err(|e| {
                GatewayError::Config(format!(
                    "service '{}' has an invalid backend URL '{}': {e}",
                    spec.name, spec.url
                ))
            })?;
            if !matches!(target.scheme(), "http" | "https") {
                return Err(GatewayError::Config(format!(
                    "service '{}' backend URL must be http(s), got '{}'",
                    spec.name,
                    target.scheme()
                )));
            }

            let route = Route {
                name: spec.name.clone(),
                target,
            };
            if routes.insert(spec.name.clone(), route).is_some() {
                return Err(GatewayError::Config(format!(
                    "duplicate service '{}'",
                    spec.name
                )));
            }
        }

        info!(services = routes.len(), "route table initialized");
        for route in routes.values() {
            info!(service = %route.name, target = %route.target, "route registered");
        }

        Ok(Self { routes })
    }

    /// Match `/api/<service>[/<rest>]` and rewrite the path for the backend.
    /// The backend never sees the `/api/<service>` prefix; a bare service
    /// path forwards `/`. Anything else is a routing miss.
    pub fn resolve(&self, path: &str) -> Option<(&Route, String)> {
        let rest = path.strip_prefix("/api/")?;
        let (service, remainder) = match rest.split_once('/') {
            Some((service, remainder)) => (service, remainder),
            None => (rest, ""),
        };

        let route = self.routes.get(service)?;
        let rewritten = if remainder.is_empty() {
            "/".to_string()
        } else {
            format!("/{remainder}")
        };
        Some((route, rewritten))
    }
}
