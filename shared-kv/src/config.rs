//! Environment-driven configuration for the shared-KV layer.
//!
//! Values are read once at startup (`from_env`) rather than threaded
//! through call sites, consistent with the teacher's config-struct idiom.

use std::env;
use std::time::Duration;

/// A role's rate-limit budget: attempts allowed per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitBudget {
    /// Sliding window duration.
    pub window: Duration,
    /// Attempts allowed within `window`.
    pub max_attempts: u32,
}

impl RateLimitBudget {
    const fn new(window_ms: u64, max_attempts: u32) -> Self {
        Self { window: Duration::from_millis(window_ms), max_attempts }
    }
}

/// Role-aware rate-limit budgets, one per `RATE_LIMIT_*` role named in the
/// environment configuration.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Budget for authentication endpoints.
    pub auth: RateLimitBudget,
    /// Budget for OTP/magic-link style endpoints.
    pub otp: RateLimitBudget,
    /// Budget for student-role requests.
    pub student: RateLimitBudget,
    /// Budget for trainer-role requests.
    pub trainer: RateLimitBudget,
    /// Budget for admin-role requests.
    pub admin: RateLimitBudget,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            auth: RateLimitBudget::new(900_000, 5),
            otp: RateLimitBudget::new(900_000, 5),
            student: RateLimitBudget::new(60_000, 120),
            trainer: RateLimitBudget::new(60_000, 120),
            admin: RateLimitBudget::new(60_000, 300),
        }
    }
}

impl RateLimitConfig {
    /// Read budgets from `RATE_LIMIT_{ROLE}_{WINDOW_MS,MAX_ATTEMPTS}`,
    /// falling back to this platform's defaults for any unset pair.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            auth: budget_from_env("AUTH", defaults.auth),
            otp: budget_from_env("OTP", defaults.otp),
            student: budget_from_env("STUDENT", defaults.student),
            trainer: budget_from_env("TRAINER", defaults.trainer),
            admin: budget_from_env("ADMIN", defaults.admin),
        }
    }
}

fn budget_from_env(role: &str, default: RateLimitBudget) -> RateLimitBudget {
    let window_ms = env::var(format!("RATE_LIMIT_{role}_WINDOW_MS")).ok();
    let max_attempts = env::var(format!("RATE_LIMIT_{role}_MAX_ATTEMPTS")).ok();
    budget_from_parts(window_ms.as_deref(), max_attempts.as_deref(), default)
}

fn budget_from_parts(
    window_ms: Option<&str>,
    max_attempts: Option<&str>,
    default: RateLimitBudget,
) -> RateLimitBudget {
    let window_ms = window_ms
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(|| default.window.as_millis().try_into().unwrap_or(u64::MAX));
    let max_attempts = max_attempts.and_then(|v| v.parse().ok()).unwrap_or(default.max_attempts);
    RateLimitBudget { window: Duration::from_millis(window_ms), max_attempts }
}

/// Connection-registry configuration for C4's fanout plane.
#[derive(Debug, Clone)]
pub struct ConnectionRegistryConfig {
    /// This gateway instance's id, used as the connection registry prefix.
    pub instance_id: String,
    /// Per-instance connection cap; new upgrades are rejected once reached.
    pub max_connections_per_instance: u32,
    /// TTL applied to each registered connection entry.
    pub connection_ttl: chrono::Duration,
}

impl ConnectionRegistryConfig {
    /// Read from `INSTANCE_ID` and `WS_MAX_CONNECTIONS_PER_INSTANCE`,
    /// defaulting `instance_id` to the host name (or a generated id if that
    /// is unavailable) and the cap to 1000 connections.
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

        Self {
            instance_id,
            max_connections_per_instance,
            connection_ttl: chrono::Duration::hours(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rate_limit_budgets_match_the_documented_schedule() {
        let config = RateLimitConfig::default();
        assert_eq!(config.auth.max_attempts, 5);
        assert_eq!(config.admin.max_attempts, 300);
    }

    #[test]
    fn env_override_replaces_the_default_budget() {
        let default = RateLimitBudget::new(900_000, 5);
        let budget = budget_from_parts(None, Some("3"), default);
        assert_eq!(budget.max_attempts, 3);
        assert_eq!(budget.window, default.window);
    }

    #[test]
    fn missing_env_values_fall_back_to_the_default_budget() {
        let default = RateLimitBudget::new(900_000, 5);
        let budget = budget_from_parts(None, None, default);
        assert_eq!(budget, default);
    }
}
