//! Environment-driven configuration for the gateway process.
//!
//! Values are read once at startup, following the same `from_env` idiom
//! `platform-shared-kv::config` uses.

use std::collections::BTreeMap;
use std::env;

/// A single proxy route: a path prefix mapped to a downstream target.
#[derive(Debug, Clone)]
pub struct Route {
    /// Path prefix this route matches, e.g. `/api/v1/students`.
    pub prefix: String,
    /// Downstream base URL requests under this prefix are forwarded to.
    pub target: String,
}

/// The proxy routing table, ordered most-specific prefix first.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Build the table from `(service name, default local port)` pairs,
    /// reading `{SERVICE}_SERVICE_URL` as an override for each.
    #[must_use]
    pub fn from_env(services: &[(&str, &str, u16)]) -> Self {
        let mut routes: Vec<Route> = services
            .iter()
            .map(|(env_prefix, path_prefix, default_port)| {
                let env_key = format!("{env_prefix}_SERVICE_URL");
                let target = env::var(&env_key)
                    .unwrap_or_else(|_| format!("http://localhost:{default_port}"));
                Route { prefix: (*path_prefix).to_string(), target }
            })
            .collect();
        // Most-specific first: longer prefixes win ties against shorter ones.
        routes.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
        Self { routes }
    }

    /// Resolve the route whose prefix matches `path`, if any.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&Route> {
        self.routes.iter().find(|r| path.starts_with(&r.prefix))
    }
}

/// CORS allow-list, parsed from a comma-delimited `CORS_ORIGIN`.
#[derive(Debug, Clone, Default)]
pub struct CorsConfig {
    /// Allowed origins; empty means same-origin only.
    pub allowed_origins: Vec<String>,
}

impl CorsConfig {
    /// Read `CORS_ORIGIN` as a comma-delimited allow-list.
    #[must_use]
    pub fn from_env() -> Self {
        let allowed_origins = env::var("CORS_ORIGIN")
            .ok()
            .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default();
        Self { allowed_origins }
    }
}

/// Top-level gateway configuration, assembled once at startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// This instance's id (subscription-registry key prefix).
    pub instance_id: String,
    /// Per-instance WebSocket connection cap.
    pub max_connections_per_instance: u32,
    /// Redis connection string backing the shared KV and Pub/Sub.
    pub redis_url: String,
    /// Proxy routing table.
    pub routes: RouteTable,
    /// CORS allow-list.
    pub cors: CorsConfig,
    /// Shared secret verifying access tokens.
    pub jwt_secret: String,
    /// Proxy read timeout, kept below the edge load balancer's client timeout.
    pub proxy_read_timeout: std::time::Duration,
    /// Grace period before a shutdown forcibly drops in-flight work.
    pub shutdown_grace_period: std::time::Duration,
}

/// Downstream services the routing table knows about: `(env prefix, path
/// prefix, local-dev fallback port)`.
pub const KNOWN_SERVICES: &[(&str, &str, u16)] = &[
    ("STUDENTS", "/api/v1/students", 4001),
    ("TRAINERS", "/api/v1/trainers", 4002),
    ("ADMIN", "/api/v1/admin", 4003),
    ("BOOKING", "/api/v1/booking", 4004),
    ("PAYMENTS", "/api/v1/payments", 4005),
];

impl GatewayConfig {
    /// Read every recognized `§6` environment variable relevant to this
    /// process, falling back to local-development defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let instance_id = env::var("INSTANCE_ID").unwrap_or_else(|_| {
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| format!("gw-{}", uuid::Uuid::new_v4()))
        });
        let max_connections_per_instance = env::var("WS_MAX_CONNECTIONS_PER_INSTANCE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1000);
        let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let jwt_secret = env::var("JWT_SECRET").unwrap_or_else(|_| "dev-secret".to_string());
        let proxy_read_timeout = std::time::Duration::from_secs(55);
        let shutdown_grace_period = env::var("SHUTDOWN_GRACE_PERIOD_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or(std::time::Duration::from_secs(30), std::time::Duration::from_millis);

        Self {
            instance_id,
            max_connections_per_instance,
            redis_url,
            routes: RouteTable::from_env(KNOWN_SERVICES),
            cors: CorsConfig::from_env(),
            jwt_secret,
            proxy_read_timeout,
            shutdown_grace_period,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_table_resolves_the_most_specific_prefix() {
        let services: &[(&str, &str, u16)] =
            &[("STUDENTS", "/api/v1/students", 4001), ("STUDENTS_BILLING", "/api/v1/students/billing", 4006)];
        let table = RouteTable::from_env(services);

        let route = table.resolve("/api/v1/students/billing/invoices").expect("route found");
        assert_eq!(route.target, "http://localhost:4006");
    }

    #[test]
    fn route_table_falls_back_to_the_shorter_prefix() {
        let services: &[(&str, &str, u16)] =
            &[("STUDENTS", "/api/v1/students", 4001), ("STUDENTS_BILLING", "/api/v1/students/billing", 4006)];
        let table = RouteTable::from_env(services);

        let route = table.resolve("/api/v1/students/profile").expect("route found");
        assert_eq!(route.target, "http://localhost:4001");
    }

    #[test]
    fn unmatched_path_resolves_to_none() {
        let table = RouteTable::from_env(KNOWN_SERVICES);
        assert!(table.resolve("/unknown").is_none());
    }

    #[test]
    fn cors_parses_a_comma_delimited_allow_list() {
        let origins: Vec<String> =
            " https://a.example , https://b.example ".split(',').map(|s| s.trim().to_string()).collect();
        assert_eq!(origins, vec!["https://a.example", "https://b.example"]);
    }
}
