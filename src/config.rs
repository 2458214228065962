//! Configuration management for pinglun
//!
//! Configuration is loaded from environment variables with sensible defaults,
//! so the binary runs out of the box against a local SQLite file.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Crawler configuration
    pub crawler: CrawlerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// REST server configuration
    pub server: ServerConfig,

    /// Session/auth configuration
    pub auth: AuthConfig,

    /// Verification-mail configuration
    pub email: EmailConfig,
}

/// Crawler-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Rate limit for remote requests (requests per second)
    pub rate_limit: u32,

    /// Delay between top-level comment pages, in milliseconds
    pub page_delay_ms: u64,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Path to a file holding the Bilibili session cookie (optional)
    pub cookie_path: PathBuf,
}

impl CrawlerConfig {
    /// Request timeout as a [`Duration`]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Inter-page delay as a [`Duration`]
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.page_delay_ms)
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path
    pub sqlite_path: PathBuf,
}

/// REST server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address, e.g. "0.0.0.0:60001"
    pub bind: String,

    /// Enable permissive CORS (for the bundled web UI)
    pub enable_cors: bool,

    /// Enable per-request tracing
    pub enable_request_logging: bool,
}

/// Session/auth configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for session tokens
    pub jwt_secret: String,

    /// Username of the seeded administrator account
    pub admin_username: String,

    /// Password of the seeded administrator account
    pub admin_password: String,
}

/// Verification-mail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    /// SMTP relay host; empty disables mail sending
    pub smtp_host: String,

    /// SMTP relay port (587 = STARTTLS)
    pub smtp_port: u16,

    /// SMTP username
    pub smtp_user: String,

    /// SMTP password / app authorization code
    pub smtp_password: String,

    /// From address on outgoing mail
    pub from_address: String,
}

impl EmailConfig {
    /// Whether an SMTP relay is configured at all
    pub fn is_configured(&self) -> bool {
        !self.smtp_host.is_empty() && !self.from_address.is_empty()
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let rate_limit = env_parse("PINGLUN_RATE_LIMIT", 2u32);
        let page_delay_ms = env_parse("PINGLUN_PAGE_DELAY_MS", 500u64);
        let request_timeout_secs = env_parse("PINGLUN_REQUEST_TIMEOUT", 30u64);

        let cookie_path = std::env::var("PINGLUN_COOKIE_PATH")
            .unwrap_or_else(|_| String::from("bili_cookie.txt"))
            .into();

        let sqlite_path = std::env::var("PINGLUN_SQLITE_PATH")
            .unwrap_or_else(|_| String::from("data/pinglun.db"))
            .into();

        let bind =
            std::env::var("PINGLUN_BIND").unwrap_or_else(|_| String::from("0.0.0.0:60001"));

        let jwt_secret = std::env::var("PINGLUN_JWT_SECRET")
            .unwrap_or_else(|_| String::from("pinglun_comment_service_secret_key"));

        let admin_username =
            std::env::var("PINGLUN_ADMIN_USERNAME").unwrap_or_else(|_| String::from("admin"));
        let admin_password =
            std::env::var("PINGLUN_ADMIN_PASSWORD").unwrap_or_else(|_| String::from("admin123"));

        let smtp_host = std::env::var("PINGLUN_SMTP_HOST").unwrap_or_default();
        let smtp_port = env_parse("PINGLUN_SMTP_PORT", 587u16);
        let smtp_user = std::env::var("PINGLUN_SMTP_USER").unwrap_or_default();
        let smtp_password = std::env::var("PINGLUN_SMTP_PASSWORD").unwrap_or_default();
        let from_address = std::env::var("PINGLUN_SMTP_FROM").unwrap_or_default();

        let config = Self {
            crawler: CrawlerConfig {
                rate_limit,
                page_delay_ms,
                request_timeout_secs,
                cookie_path,
            },
            database: DatabaseConfig { sqlite_path },
            server: ServerConfig {
                bind,
                enable_cors: env_parse("PINGLUN_ENABLE_CORS", true),
                enable_request_logging: env_parse("PINGLUN_REQUEST_LOGGING", true),
            },
            auth: AuthConfig {
                jwt_secret,
                admin_username,
                admin_password,
            },
            email: EmailConfig {
                smtp_host,
                smtp_port,
                smtp_user,
                smtp_password,
                from_address,
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.crawler.rate_limit == 0 {
            anyhow::bail!("PINGLUN_RATE_LIMIT must be at least 1");
        }
        if self.auth.jwt_secret.is_empty() {
            anyhow::bail!("PINGLUN_JWT_SECRET must not be empty");
        }
        if self.server.bind.parse::<std::net::SocketAddr>().is_err() {
            anyhow::bail!("PINGLUN_BIND is not a valid socket address: {}", self.server.bind);
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crawler: CrawlerConfig {
                rate_limit: 2,
                page_delay_ms: 500,
                request_timeout_secs: 30,
                cookie_path: PathBuf::from("bili_cookie.txt"),
            },
            database: DatabaseConfig {
                sqlite_path: PathBuf::from("data/pinglun.db"),
            },
            server: ServerConfig {
                bind: String::from("0.0.0.0:60001"),
                enable_cors: true,
                enable_request_logging: true,
            },
            auth: AuthConfig {
                jwt_secret: String::from("pinglun_comment_service_secret_key"),
                admin_username: String::from("admin"),
                admin_password: String::from("admin123"),
            },
            email: EmailConfig {
                smtp_host: String::new(),
                smtp_port: 587,
                smtp_user: String::new(),
                smtp_password: String::new(),
                from_address: String::new(),
            },
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_bind_rejected() {
        let mut config = Config::default();
        config.server.bind = String::from("not-an-address");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let mut config = Config::default();
        config.crawler.rate_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_email_configured_detection() {
        let mut email = Config::default().email;
        assert!(!email.is_configured());
        email.smtp_host = String::from("smtp.example.com");
        email.from_address = String::from("noreply@example.com");
        assert!(email.is_configured());
    }
}
