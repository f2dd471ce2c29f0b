//! Runtime configuration, read from flags or the environment.

use crate::auth::PublicPaths;
use clap::Parser;
use std::net::SocketAddr;
use std::time::Duration;

/// Secret used when `JWT_SECRET` is not set. Fine for local runs only.
pub const DEV_JWT_SECRET: &str = "creditlens-dev-secret-change-me";

#[derive(Parser, Debug, Clone)]
#[command(name = "creditlens")]
#[command(about = "Credit lookup API with token auth and audit publishing")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:8080")]
    pub bind_addr: SocketAddr,

    /// HMAC secret for bearer tokens
    #[arg(long, env = "JWT_SECRET", default_value = DEV_JWT_SECRET, hide_env_values = true)]
    pub jwt_secret: String,

    /// SQLite file holding users
    #[arg(long, env = "AUTH_DB_PATH", default_value = "auth.db")]
    pub auth_db_path: String,

    /// SQLite file holding credits
    #[arg(long, env = "CREDITS_DB_PATH", default_value = "credits.db")]
    pub credits_db_path: String,

    /// Comma-separated paths that skip authentication (`*` suffix = prefix match)
    #[arg(
        long,
        env = "PUBLIC_PATHS",
        default_value = "/health,/users,/users/login,/credits/status"
    )]
    pub public_paths: String,

    /// Topic audit events are published to
    #[arg(long, env = "AUDIT_TOPIC", default_value = "credit-lookup-audit")]
    pub audit_topic: String,

    /// Kafka REST proxy base URL. In-process bus when unset.
    #[arg(long, env = "AUDIT_BUS_URL")]
    pub audit_bus_url: Option<String>,

    /// Bus request timeout in milliseconds
    #[arg(long, env = "AUDIT_BUS_TIMEOUT_MS", default_value = "5000")]
    pub audit_bus_timeout_ms: u64,

    /// bcrypt work factor for new passwords
    #[arg(long, env = "BCRYPT_COST", default_value_t = bcrypt::DEFAULT_COST)]
    pub bcrypt_cost: u32,

    /// Seed a few demo credits on startup
    #[arg(long, env = "SEED_DEMO_DATA", default_value_t = false)]
    pub seed_demo_data: bool,
}

impl Config {
    pub fn public_paths(&self) -> PublicPaths {
        PublicPaths::from_patterns(self.public_paths.split(','))
    }

    pub fn audit_bus_timeout(&self) -> Duration {
        Duration::from_millis(self.audit_bus_timeout_ms)
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::parse_from(["creditlens"]);

        assert_eq!(config.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.audit_topic, "credit-lookup-audit");
        assert_eq!(config.audit_bus_timeout(), Duration::from_millis(5000));
        assert!(config.audit_bus_url.is_none());
        assert!(config.uses_dev_secret());

        let public = config.public_paths();
        assert!(public.is_public("/health"));
        assert!(public.is_public("/users/login"));
        assert!(!public.is_public("/users/me"));
        assert!(!public.is_public("/credits/123"));
    }

    #[test]
    fn test_flags_override() {
        let config = Config::parse_from([
            "creditlens",
            "--jwt-secret",
            "s3cret",
            "--public-paths",
            "/health, /docs/*",
            "--audit-bus-url",
            "http://localhost:8082",
            "--seed-demo-data",
        ]);

        assert!(!config.uses_dev_secret());
        assert!(config.seed_demo_data);
        assert_eq!(config.audit_bus_url.as_deref(), Some("http://localhost:8082"));
        assert!(config.public_paths().is_public("/docs/openapi.json"));
        assert!(!config.public_paths().is_public("/users"));
    }
}
