use clap::Parser;

use crate::error::{GatewayError, Result};

// CLI argument structure. Every flag doubles as an environment variable so
// the gateway can be configured the usual deployment way (PORT, SERVICES,
// USERS_SERVICE_URL, ...).
#[derive(Parser, Debug, Clone)]
#[command(name = "api-gateway")]
#[command(about = "Rate-limiting reverse proxy for named backend services")]
pub struct Args {
    // Port to run the gateway on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    // Services to route, comma-separated. Each entry is either a bare name
    // ("users" - URL taken from USERS_SERVICE_URL) or an inline "name=url".
    #[arg(
        short,
        long,
        env = "SERVICES",
        value_delimiter = ',',
        default_value = "users,orders"
    )]
    pub services: Vec<String>,

    // Rate limit: max requests per window, per client
    #[arg(long, env = "RATE_LIMIT_MAX", default_value_t = 3)]
    pub rate_limit: u32,

    // Rate limit window in milliseconds
    #[arg(long, env = "RATE_LIMIT_WINDOW_MS", default_value_t = 60_000)]
    pub rate_window_ms: u64,

    // Upper bound on a single backend call, in seconds
    #[arg(long, env = "PROXY_TIMEOUT_SECS", default_value_t = 30)]
    pub proxy_timeout_secs: u64,
}

/// A service name paired with its backend base URL, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSpec {
    pub name: String,
    pub url: String,
}

impl Args {
    /// Resolve the configured service list into name/URL pairs. A bare name
    /// looks up `<NAME>_SERVICE_URL`; a missing or empty URL refuses to
    /// start rather than proxying to nowhere on first request.
    pub fn resolve_services(&self) -> Result<Vec<ServiceSpec>> {
        let mut specs = Vec::new();

        for entry in &self.services {
            let entry = entry.trim();
            if entry.is_empty() {
                continue;
            }

            let spec = match entry.split_once('=') {
                Some((name, url)) => ServiceSpec {
                    name: name.trim().to_string(),
                    url: url.trim().to_string(),
                },
                None => ServiceSpec {
                    name: entry.to_string(),
                    url: std::env::var(url_var(entry)).unwrap_or_default(),
                },
            };

            if spec.name.is_empty() {
                return Err(GatewayError::Config(format!(
                    "empty service name in entry '{entry}'"
                )));
            }
            if spec.url.trim().is_empty() {
                return Err(GatewayError::Config(format!(
                    "service '{}' has no backend URL (set {} or pass '{}=<url>')",
                    spec.name,
                    url_var(&spec.name),
                    spec.name
                )));
            }

            specs.push(spec);
        }

        if specs.is_empty() {
            return Err(GatewayError::Config("no services configured".to_string()));
        }

        Ok(specs)
    }
}

// "users" -> "USERS_SERVICE_URL"
fn url_var(name: &str) -> String {
    format!("{}_SERVICE_URL", name.to_uppercase().replace('-', "_"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults() {
        let args = parse(&["api-gateway", "--services", "users=http://localhost:3001"]);
        assert_eq!(args.port, 3000);
        assert_eq!(args.rate_limit, 3);
        assert_eq!(args.rate_window_ms, 60_000);
    }

    #[test]
    fn inline_service_entries() {
        let args = parse(&[
            "api-gateway",
            "--services",
            "users=http://localhost:3001,orders=http://localhost:3002",
        ]);
        let specs = args.resolve_services().unwrap();
        assert_eq!(
            specs,
            vec![
                ServiceSpec {
                    name: "users".into(),
                    url: "http://localhost:3001".into()
                },
                ServiceSpec {
                    name: "orders".into(),
                    url: "http://localhost:3002".into()
                },
            ]
        );
    }

    #[test]
    fn bare_name_resolves_env_var() {
        // SAFETY: test-local variable name, nothing else reads it
        unsafe { std::env::set_var("PAYMENTS_SERVICE_URL", "http://localhost:3003") };

        let args = parse(&["api-gateway", "--services", "payments"]);
        let specs = args.resolve_services().unwrap();
        assert_eq!(specs[0].url, "http://localhost:3003");
    }

    #[test]
    fn missing_backend_url_is_a_config_error() {
        let args = parse(&["api-gateway", "--services", "definitely-not-configured"]);
        let err = args.resolve_services().unwrap_err();
        assert!(err.to_string().contains("DEFINITELY_NOT_CONFIGURED_SERVICE_URL"));
    }

    #[test]
    fn empty_service_list_is_a_config_error() {
        let args = parse(&["api-gateway", "--services", " , "]);
        assert!(args.resolve_services().is_err());
    }

    #[test]
    fn url_var_normalizes_name() {
        assert_eq!(url_var("users"), "USERS_SERVICE_URL");
        assert_eq!(url_var("order-items"), "ORDER_ITEMS_SERVICE_URL");
    }
}
