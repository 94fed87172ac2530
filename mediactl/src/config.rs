//! Application configuration management.
//!
//! Configuration is loaded from a YAML file with environment variable overrides. The configuration
//! file path defaults to `config.yaml` but can be specified via `-f` flag or `MEDIACTL_CONFIG`
//! environment variable.
//!
//! ## Loading Priority
//!
//! Configuration sources are merged in the following order (later sources override earlier ones):
//!
//! 1. **YAML config file** - Base configuration (default: `config.yaml`)
//! 2. **Environment variables** - Variables prefixed with `MEDIACTL_` override YAML values
//! 3. **Vendor variables** - `CONVEX_URL`, `STRIPE_SECRET_KEY`, `STRIPE_PUBLISHABLE_KEY`,
//!    `FAL_KEY` and `CLERK_JWT_KEY` are accepted under the names the vendors document
//!
//! For nested config values, use double underscores in environment variables. For example,
//! `MEDIACTL_CONVEX__TIMEOUT=5s` sets the `convex.timeout` field.
//!
//! ## Usage
//!
//! ```no_run
//! use clap::Parser;
//! use mediactl::config::{Args, Config};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let args = Args::parse();
//! let config = Config::load(&args)?;
//!
//! println!("Server will bind to {}:{}", config.host, config.port);
//! # Ok(())
//! # }
//! ```
//!
//! ## Start-up validation
//!
//! [`Config::load`] runs [`Config::validate`] before returning. The document backend URL is the
//! one hard requirement: without it no request touching the backend could be served, so the
//! process refuses to start.

use clap::Parser;
use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::errors::Error;
use crate::images::RemotePattern;

/// Simple CLI args - just for specifying config file
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file
    #[arg(short = 'f', long, env = "MEDIACTL_CONFIG", default_value = "config.yaml")]
    pub config: String,

    /// Validate configuration and exit without starting the server.
    #[arg(long)]
    pub validate: bool,
}

/// Main application configuration.
///
/// This is the root configuration structure loaded from YAML and environment variables.
/// All fields have defaults except the document backend URL, which must be provided.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// HTTP server host to bind to (e.g., "0.0.0.0" for all interfaces)
    pub host: String,
    /// HTTP server port to bind to
    pub port: u16,
    /// Raw `CONVEX_URL` override, folded into `convex.url` on load
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convex_url: Option<String>,
    /// Document backend (Convex) configuration
    pub convex: ConvexConfig,
    /// Payments (Stripe) configuration. Payments routes return 404 when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stripe: Option<StripeConfig>,
    /// Media generation (fal.ai) configuration
    pub fal: FalConfig,
    /// Authentication configuration
    pub auth: AuthConfig,
    /// Image host allowlist
    pub images: ImagesConfig,
    /// Onboarding watcher configuration
    pub onboarding: OnboardingConfig,
    /// CORS configuration for the browser front-end
    pub cors: CorsConfig,
    /// Enable OpenTelemetry OTLP export for distributed tracing
    pub enable_otel_export: bool,
}

/// Document backend connection settings.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConvexConfig {
    /// Deployment URL, e.g. `https://happy-otter-123.convex.cloud`. Required.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Optional deploy key, sent as `Authorization: Convex <key>`
    #[serde(skip_serializing)]
    pub deploy_key: Option<String>,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Query function paths
    pub functions: ConvexFunctions,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConvexFunctions {
    /// Query resolving `{ storageId }` to a URL or null
    pub image_url: String,
    /// Query resolving `{ userId }` to `{ completed, user }` or null
    pub onboarding_status: String,
}

impl Default for ConvexFunctions {
    fn default() -> Self {
        Self {
            image_url: "files:getImageUrl".to_string(),
            onboarding_status: "users:getOnboardingStatus".to_string(),
        }
    }
}

impl std::fmt::Debug for ConvexConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConvexConfig")
            .field("url", &self.url)
            .field("deploy_key", &self.deploy_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .field("functions", &self.functions)
            .finish()
    }
}

impl Default for ConvexConfig {
    fn default() -> Self {
        Self {
            url: None,
            deploy_key: None,
            timeout: Duration::from_secs(10),
            functions: ConvexFunctions::default(),
        }
    }
}

/// Stripe keys. Neither key is checked for shape; Stripe rejects bad keys on first use.
#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StripeConfig {
    #[serde(skip_serializing)]
    pub secret_key: String,
    pub publishable_key: String,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"<redacted>")
            .field("publishable_key", &self.publishable_key)
            .finish()
    }
}

/// fal.ai queue settings.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct FalConfig {
    /// API key. Not checked for presence: unauthenticated requests are rejected by fal.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Queue API base URL
    pub queue_url: Url,
    /// Per-request timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl std::fmt::Debug for FalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FalConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("queue_url", &self.queue_url.as_str())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for FalConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            queue_url: Url::parse("https://queue.fal.run").expect("static URL is valid"),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    pub clerk: ClerkAuthConfig,
    pub proxy_header: ProxyHeaderAuthConfig,
}

/// Clerk session token verification
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClerkAuthConfig {
    pub enabled: bool,
    /// PEM-encoded RSA public key of the Clerk instance ("JWT public key" in the dashboard)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_public_key: Option<String>,
    /// Accepted `azp` values. Empty disables the check.
    pub authorized_parties: Vec<String>,
    /// Cookie carrying the session token for same-site browser requests
    pub session_cookie_name: String,
    /// Allowed clock skew when checking `exp`/`nbf`
    #[serde(with = "humantime_serde")]
    pub leeway: Duration,
}

impl Default for ClerkAuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            jwt_public_key: None,
            authorized_parties: Vec::new(),
            session_cookie_name: "__session".to_string(),
            leeway: Duration::from_secs(5),
        }
    }
}

/// Identity asserted by a trusted reverse proxy
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProxyHeaderAuthConfig {
    pub enabled: bool,
    pub header_name: String,
}

impl Default for ProxyHeaderAuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            header_name: "x-clerk-user-id".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImagesConfig {
    pub remote_patterns: Vec<RemotePattern>,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            remote_patterns: vec![
                RemotePattern {
                    protocol: Some("https".to_string()),
                    hostname: "img.clerk.com".to_string(),
                    port: None,
                    pathname: None,
                },
                RemotePattern {
                    protocol: Some("https".to_string()),
                    hostname: "**.convex.cloud".to_string(),
                    port: None,
                    pathname: None,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct OnboardingConfig {
    /// How often a watcher re-runs the status query while subscribed
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
        }
    }
}

/// CORS origin: either a wildcard or a concrete URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CorsOrigin {
    Wildcard,
    Url(Url),
}

impl Serialize for CorsOrigin {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CorsOrigin::Wildcard => serializer.serialize_str("*"),
            CorsOrigin::Url(url) => serializer.serialize_str(url.as_str()),
        }
    }
}

impl<'de> Deserialize<'de> for CorsOrigin {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s == "*" {
            return Ok(CorsOrigin::Wildcard);
        }
        Url::parse(&s)
            .map(CorsOrigin::Url)
            .map_err(|e| serde::de::Error::custom(format!("invalid CORS origin '{s}': {e}")))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorsConfig {
    pub allowed_origins: Vec<CorsOrigin>,
    pub allow_credentials: bool,
    /// Preflight cache lifetime in seconds
    pub max_age: Option<u64>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![CorsOrigin::Url(
                Url::parse("http://localhost:3000").expect("static URL is valid"),
            )],
            allow_credentials: true,
            max_age: Some(3600),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            convex_url: None,
            convex: ConvexConfig::default(),
            stripe: None,
            fal: FalConfig::default(),
            auth: AuthConfig::default(),
            images: ImagesConfig::default(),
            onboarding: OnboardingConfig::default(),
            cors: CorsConfig::default(),
            enable_otel_export: false,
        }
    }
}

/// Raw vendor variables, merged after the prefixed ones.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct VendorEnv {
    stripe_secret_key: Option<String>,
    stripe_publishable_key: Option<String>,
    fal_key: Option<String>,
    clerk_jwt_key: Option<String>,
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load(args: &Args) -> Result<Self, figment::Error> {
        let mut config: Self = Self::figment(args).extract()?;

        if let Some(url) = config.convex_url.take() {
            config.convex.url = Some(url);
        }

        let vendor: VendorEnv = Figment::new()
            .merge(Env::raw().only(&["STRIPE_SECRET_KEY", "STRIPE_PUBLISHABLE_KEY", "FAL_KEY", "CLERK_JWT_KEY"]))
            .extract()?;
        config.apply_vendor_env(vendor);

        config.validate().map_err(|e| figment::Error::from(e.to_string()))?;
        Ok(config)
    }

    fn apply_vendor_env(&mut self, vendor: VendorEnv) {
        if let Some(key) = vendor.fal_key {
            self.fal.api_key = Some(key);
        }
        if let Some(key) = vendor.clerk_jwt_key {
            self.auth.clerk.jwt_public_key = Some(key);
        }
        match (&mut self.stripe, vendor.stripe_secret_key, vendor.stripe_publishable_key) {
            (Some(stripe), secret, publishable) => {
                if let Some(secret) = secret {
                    stripe.secret_key = secret;
                }
                if let Some(publishable) = publishable {
                    stripe.publishable_key = publishable;
                }
            }
            (None, Some(secret_key), publishable) => {
                self.stripe = Some(StripeConfig {
                    secret_key,
                    publishable_key: publishable.unwrap_or_default(),
                });
            }
            (None, None, _) => {}
        }
    }

    /// Validate the configuration for consistency and required fields
    pub fn validate(&self) -> Result<(), Error> {
        let convex_url = self.convex.url.as_deref().filter(|u| !u.trim().is_empty()).ok_or_else(|| Error::Internal {
            operation: "Config validation: the document backend URL is not configured. \
                 Set CONVEX_URL (or MEDIACTL_CONVEX__URL) or add convex.url to the config file."
                .to_string(),
        })?;

        let parsed = Url::parse(convex_url).map_err(|e| Error::Internal {
            operation: format!("Config validation: convex.url '{convex_url}' is not a valid URL: {e}"),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::Internal {
                operation: format!("Config validation: convex.url must use http or https, got '{}'", parsed.scheme()),
            });
        }

        if self.convex.timeout.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: convex.timeout must be greater than 0".to_string(),
            });
        }

        if self.auth.clerk.enabled && self.auth.clerk.jwt_public_key.is_none() {
            return Err(Error::Internal {
                operation: "Config validation: Clerk authentication is enabled but auth.clerk.jwt_public_key is not configured. \
                     Set CLERK_JWT_KEY or disable auth.clerk."
                    .to_string(),
            });
        }

        if self.onboarding.poll_interval.is_zero() {
            return Err(Error::Internal {
                operation: "Config validation: onboarding.poll_interval must be greater than 0".to_string(),
            });
        }

        for pattern in &self.images.remote_patterns {
            if pattern.hostname.trim().is_empty() {
                return Err(Error::Internal {
                    operation: "Config validation: images.remote_patterns entries need a hostname".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn figment(args: &Args) -> Figment {
        Figment::new()
            // Load base config file
            .merge(Yaml::file(&args.config))
            // Environment variables can still override specific values
            // (MEDIACTL_CONFIG names the file itself and is consumed by clap)
            .merge(Env::prefixed("MEDIACTL_").ignore(&["config"]).split("__"))
            // The deployment URL under the name the Convex tooling writes to .env files
            .merge(Env::raw().only(&["CONVEX_URL"]))
    }

    /// The validated document backend URL.
    pub fn convex_url(&self) -> Option<&str> {
        self.convex.url.as_deref()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args() -> Args {
        Args {
            config: "test.yaml".to_string(),
            validate: false,
        }
    }

    #[test]
    fn test_missing_convex_url_fails_fast() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
auth:
  clerk:
    enabled: false
"#,
            )?;

            let err = Config::load(&args()).unwrap_err();
            assert!(err.to_string().contains("document backend URL is not configured"));

            Ok(())
        });
    }

    #[test]
    fn test_convex_url_from_raw_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
auth:
  clerk:
    enabled: false
"#,
            )?;
            jail.set_env("CONVEX_URL", "https://happy-otter-123.convex.cloud");

            let config = Config::load(&args())?;
            assert_eq!(config.convex_url(), Some("https://happy-otter-123.convex.cloud"));
            assert!(config.convex_url.is_none());

            Ok(())
        });
    }

    #[test]
    fn test_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
convex:
  url: https://yaml.convex.cloud
  timeout: 3s
auth:
  clerk:
    enabled: false
"#,
            )?;

            jail.set_env("MEDIACTL_HOST", "127.0.0.1");
            jail.set_env("MEDIACTL_PORT", "8080");
            jail.set_env("MEDIACTL_ONBOARDING__POLL_INTERVAL", "750ms");

            let config = Config::load(&args())?;

            assert_eq!(config.host, "127.0.0.1");
            assert_eq!(config.port, 8080);
            assert_eq!(config.onboarding.poll_interval, Duration::from_millis(750));
            // YAML values should be preserved
            assert_eq!(config.convex_url(), Some("https://yaml.convex.cloud"));
            assert_eq!(config.convex.timeout, Duration::from_secs(3));

            Ok(())
        });
    }

    #[test]
    fn test_vendor_keys_from_raw_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
convex:
  url: https://yaml.convex.cloud
"#,
            )?;

            jail.set_env("STRIPE_SECRET_KEY", "sk_test_123");
            jail.set_env("STRIPE_PUBLISHABLE_KEY", "pk_test_123");
            jail.set_env("FAL_KEY", "fal-key");
            jail.set_env("CLERK_JWT_KEY", "-----BEGIN PUBLIC KEY-----");

            let config = Config::load(&args())?;

            let stripe = config.stripe.expect("stripe configured from env");
            assert_eq!(stripe.secret_key, "sk_test_123");
            assert_eq!(stripe.publishable_key, "pk_test_123");
            assert_eq!(config.fal.api_key.as_deref(), Some("fal-key"));
            assert_eq!(config.auth.clerk.jwt_public_key.as_deref(), Some("-----BEGIN PUBLIC KEY-----"));

            Ok(())
        });
    }

    #[test]
    fn test_unknown_fields_rejected() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "test.yaml",
                r#"
convex:
  url: https://yaml.convex.cloud
  region: eu
"#,
            )?;

            assert!(Config::load(&args()).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_config_validation_rejects_non_http_url() {
        let config = Config {
            convex: ConvexConfig {
                url: Some("ftp://files.example.com".to_string()),
                ..Default::default()
            },
            auth: AuthConfig {
                clerk: ClerkAuthConfig {
                    enabled: false,
                    ..Default::default()
                },
                ..Default::default()
            },
            ..Default::default()
        };

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("http or https"));
    }

    #[test]
    fn test_config_validation_clerk_missing_key() {
        let config = Config {
            convex: ConvexConfig {
                url: Some("https://happy-otter-123.convex.cloud".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("jwt_public_key"));
    }

    #[test]
    fn test_config_validation_valid_config() {
        let mut config = Config::default();
        config.convex.url = Some("https://happy-otter-123.convex.cloud".to_string());
        config.auth.clerk.jwt_public_key = Some("pem".to_string());

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_image_patterns() {
        let config = Config::default();
        let hosts: Vec<&str> = config.images.remote_patterns.iter().map(|p| p.hostname.as_str()).collect();
        assert_eq!(hosts, vec!["img.clerk.com", "**.convex.cloud"]);
    }

    #[test]
    fn test_stripe_debug_redacts_secret() {
        let stripe = StripeConfig {
            secret_key: "sk_live_secret".to_string(),
            publishable_key: "pk_live_public".to_string(),
        };
        let rendered = format!("{stripe:?}");
        assert!(!rendered.contains("sk_live_secret"));
        assert!(rendered.contains("pk_live_public"));
    }

    #[test]
    fn test_config_debug_redacts_vendor_keys() {
        let mut config = Config::default();
        config.convex.url = Some("https://happy-otter-123.convex.cloud".to_string());
        config.convex.deploy_key = Some("prod:deploy-secret".to_string());
        config.fal.api_key = Some("fal-key-secret".to_string());
        config.stripe = Some(StripeConfig {
            secret_key: "sk_live_secret".to_string(),
            publishable_key: "pk_live_public".to_string(),
        });

        let rendered = format!("{config:#?}");
        assert!(!rendered.contains("deploy-secret"));
        assert!(!rendered.contains("fal-key-secret"));
        assert!(!rendered.contains("sk_live_secret"));
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("happy-otter-123.convex.cloud"));
        assert!(rendered.contains("queue.fal.run"));
    }
}
