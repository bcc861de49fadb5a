/// Configuration management for the API server
///
/// The API composes its own sections (bind address, CORS, JWT) with the
/// provider sections from `keystone_shared::config`. Everything comes from
/// environment variables; a `.env` file is loaded first when present.
///
/// # Environment Variables
///
/// - `DATABASE_URL`: PostgreSQL connection string (required)
/// - `API_HOST` / `API_PORT`: bind address (default: 0.0.0.0:8080)
/// - `JWT_SECRET`: HS256 signing key, at least 32 characters (required)
/// - `CORS_ORIGINS`: comma separated origins, `*` for any (default: `*`)
/// - `APP_ENV`: `production` enables HSTS
/// - `APP_URL`: public frontend URL used in emails and checkout redirects
/// - `FOLLOW_UP_DELAY_HOURS`: delay before the onboarding follow-up email
///
/// # Example
///
/// ```no_run
/// use keystone_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use keystone_shared::config::{
    parse_list, BillingConfig, EmailConfig, FeatureFlags, RateLimitConfig, StorageConfig,
    UploadConfig,
};
use keystone_shared::db::pool::DatabaseConfig;
use keystone_shared::services::ServiceSettings;
use std::env;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub email: EmailConfig,
    pub billing: BillingConfig,
    pub rate_limits: RateLimitConfig,
    pub features: FeatureFlags,
    pub upload: UploadConfig,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origins; `*` allows any origin
    pub cors_origins: Vec<String>,

    /// Production mode enables HSTS
    pub production: bool,

    /// Public frontend URL
    pub app_url: String,

    /// Hours between registration and the follow-up email
    pub follow_up_delay_hours: i64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec!["*".to_string()],
            production: false,
            app_url: "http://localhost:3000".to_string(),
            follow_up_delay_hours: 72,
        }
    }
}

/// JWT configuration
#[derive(Clone)]
pub struct JwtConfig {
    /// Secret key for JWT signing
    ///
    /// Must be at least 32 bytes. Generate with: `openssl rand -hex 32`
    pub secret: String,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig").field("secret", &"<redacted>").finish()
    }
}

impl JwtConfig {
    pub fn new(secret: impl Into<String>) -> anyhow::Result<Self> {
        let secret = secret.into();
        if secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }
        Ok(Self { secret })
    }
}

impl ApiConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let defaults = Self::default();

        let host = env::var("API_HOST").unwrap_or(defaults.host);
        let port = env::var("API_PORT")
            .unwrap_or_else(|_| defaults.port.to_string())
            .parse::<u16>()?;

        let cors_origins = match env::var("CORS_ORIGINS") {
            Ok(raw) if !raw.trim().is_empty() => parse_list(&raw),
            _ => defaults.cors_origins,
        };

        let production = env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let app_url = env::var("APP_URL")
            .unwrap_or(defaults.app_url)
            .trim_end_matches('/')
            .to_string();

        let follow_up_delay_hours = env::var("FOLLOW_UP_DELAY_HOURS")
            .unwrap_or_else(|_| defaults.follow_up_delay_hours.to_string())
            .parse::<i64>()?;
        if follow_up_delay_hours < 0 {
            anyhow::bail!("FOLLOW_UP_DELAY_HOURS must not be negative");
        }

        Ok(Self {
            host,
            port,
            cors_origins,
            production,
            app_url,
            follow_up_delay_hours,
        })
    }

    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|o| o == "*")
    }
}

impl Config {
    /// Loads configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if required variables are missing or any value
    /// fails to parse.
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present (for development)
        dotenvy::dotenv().ok();

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;

        Ok(Self {
            api: ApiConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            jwt: JwtConfig::new(jwt_secret)?,
            storage: StorageConfig::from_env()?,
            email: EmailConfig::from_env()?,
            billing: BillingConfig::from_env()?,
            rate_limits: RateLimitConfig::from_env()?,
            features: FeatureFlags::from_env()?,
            upload: UploadConfig::from_env()?,
        })
    }

    /// Configuration with default sections, for tests and tooling.
    pub fn with_defaults(database_url: impl Into<String>, jwt_secret: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            api: ApiConfig::default(),
            database: DatabaseConfig::with_url(database_url),
            jwt: JwtConfig::new(jwt_secret)?,
            storage: StorageConfig::default(),
            email: EmailConfig::default(),
            billing: BillingConfig::default(),
            rate_limits: RateLimitConfig::default(),
            features: FeatureFlags::default(),
            upload: UploadConfig::default(),
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }

    /// The subset of settings the service layer needs
    pub fn service_settings(&self) -> ServiceSettings {
        let mut settings = ServiceSettings::new(self.api.app_url.clone(), self.jwt.secret.clone());
        settings.upload = self.upload.clone();
        settings.webhook_secret = self.billing.webhook_secret.clone();
        settings.follow_up_delay = chrono::Duration::hours(self.api.follow_up_delay_hours);
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    #[test]
    fn test_bind_address() {
        let mut config = Config::with_defaults("postgresql://localhost/test", SECRET).unwrap();
        config.api.host = "127.0.0.1".to_string();

        assert_eq!(config.bind_address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_short_jwt_secret_rejected() {
        assert!(JwtConfig::new("too-short").is_err());
        assert!(Config::with_defaults("postgresql://localhost/test", "short").is_err());
    }

    #[test]
    fn test_jwt_secret_not_printed() {
        let jwt = JwtConfig::new(SECRET).unwrap();
        assert!(!format!("{:?}", jwt).contains(SECRET));
    }

    #[test]
    fn test_service_settings() {
        let mut config = Config::with_defaults("postgresql://localhost/test", SECRET).unwrap();
        config.api.app_url = "https://app.example.com".to_string();
        config.api.follow_up_delay_hours = 24;
        config.billing.webhook_secret = Some("whsec_1".to_string());

        let settings = config.service_settings();
        assert_eq!(settings.app_url, "https://app.example.com");
        assert_eq!(settings.jwt_secret, SECRET);
        assert_eq!(settings.webhook_secret.as_deref(), Some("whsec_1"));
        assert_eq!(settings.follow_up_delay, chrono::Duration::hours(24));
    }

    #[test]
    fn test_any_origin() {
        let mut api = ApiConfig::default();
        assert!(api.allows_any_origin());

        api.cors_origins = vec!["https://app.example.com".to_string()];
        assert!(!api.allows_any_origin());
    }
}
