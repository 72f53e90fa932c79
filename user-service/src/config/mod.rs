use secrecy::{ExposeSecret, SecretString};
use service_core::config as core_config;
use service_core::error::AppError;
use std::collections::HashMap;
use std::env;
use std::str::FromStr;

const DEV_JWT_SECRET: &str = "dev-secret-key-change-in-production";
const MIN_PROD_SECRET_LEN: usize = 32;
const MAX_ACCESS_TOKEN_EXPIRY_MINUTES: i64 = 525_600;
const MAX_REFRESH_TOKEN_EXPIRY_DAYS: i64 = 3_650;
const MAX_RATE_LIMIT_WINDOW_SECONDS: u64 = 86_400;

#[derive(Debug, Clone)]
pub struct UserServiceConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub security: SecurityConfig,
    pub swagger: SwaggerMode,
    pub rate_limit: RateLimitConfig,
    pub admin: Option<AdminBootstrapConfig>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

/// PostgreSQL settings. Without a URL the service keeps users in memory.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Redis settings. Without a URL the blacklist lives in process memory and is
/// purged every `purge_interval_seconds`.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: Option<String>,
    pub purge_interval_seconds: u64,
}

#[derive(Debug, Clone)]
pub enum SigningKeyConfig {
    Hmac {
        secret: SecretString,
    },
    Rsa {
        private_key_path: String,
        public_key_path: String,
    },
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub signing: SigningKeyConfig,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SwaggerMode {
    Public,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub register_attempts: u32,
    pub register_window_seconds: u64,
}

/// Admin account ensured at start-up.
#[derive(Debug, Clone)]
pub struct AdminBootstrapConfig {
    pub username: String,
    pub email: String,
    pub password: SecretString,
}

impl UserServiceConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        Self::from_lookup(common, |key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(common: core_config::Config, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = EnvReader { lookup: &lookup };

        let environment: Environment = vars
            .optional("ENVIRONMENT")
            .unwrap_or_else(|| "dev".to_string())
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let is_prod = environment == Environment::Prod;

        let signing = match (
            vars.optional("JWT_PRIVATE_KEY_PATH"),
            vars.optional("JWT_PUBLIC_KEY_PATH"),
        ) {
            (Some(private_key_path), Some(public_key_path)) => SigningKeyConfig::Rsa {
                private_key_path,
                public_key_path,
            },
            (None, None) => SigningKeyConfig::Hmac {
                secret: SecretString::new(vars.get("JWT_SECRET_KEY", Some(DEV_JWT_SECRET), is_prod)?),
            },
            _ => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "JWT_PRIVATE_KEY_PATH and JWT_PUBLIC_KEY_PATH must be set together"
                )))
            }
        };

        let admin = match (
            vars.optional("ADMIN_USERNAME"),
            vars.optional("ADMIN_EMAIL"),
            vars.optional("ADMIN_PASSWORD"),
        ) {
            (Some(username), Some(email), Some(password)) => Some(AdminBootstrapConfig {
                username,
                email,
                password: SecretString::new(password),
            }),
            (None, None, None) => None,
            _ => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "ADMIN_USERNAME, ADMIN_EMAIL and ADMIN_PASSWORD must be set together"
                )))
            }
        };

        let config = UserServiceConfig {
            common,
            environment: environment.clone(),
            service_name: vars.get("SERVICE_NAME", Some("user-service"), is_prod)?,
            service_version: vars.get(
                "SERVICE_VERSION",
                Some(env!("CARGO_PKG_VERSION")),
                false,
            )?,
            log_level: vars.get("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: vars.optional("OTLP_ENDPOINT"),
            database: DatabaseConfig {
                url: vars.optional("DATABASE_URL"),
                max_connections: vars.parse("DATABASE_MAX_CONNECTIONS", "10")?,
                min_connections: vars.parse("DATABASE_MIN_CONNECTIONS", "1")?,
            },
            redis: RedisConfig {
                url: vars.optional("REDIS_URL"),
                purge_interval_seconds: vars.parse("BLACKLIST_PURGE_INTERVAL_SECONDS", "300")?,
            },
            jwt: JwtConfig {
                signing,
                access_token_expiry_minutes: vars
                    .parse("JWT_ACCESS_TOKEN_EXPIRY_MINUTES", "60")?,
                refresh_token_expiry_days: vars.parse("JWT_REFRESH_TOKEN_EXPIRY_DAYS", "30")?,
            },
            security: SecurityConfig {
                allowed_origins: vars
                    .get("ALLOWED_ORIGINS", Some("*"), is_prod)?
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            },
            swagger: vars
                .get(
                    "ENABLE_SWAGGER",
                    Some(if is_prod { "disabled" } else { "public" }),
                    false,
                )?
                .parse()
                .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?,
            rate_limit: RateLimitConfig {
                login_attempts: vars.parse("RATE_LIMIT_LOGIN_ATTEMPTS", "5")?,
                login_window_seconds: vars.parse("RATE_LIMIT_LOGIN_WINDOW_SECONDS", "60")?,
                register_attempts: vars.parse("RATE_LIMIT_REGISTER_ATTEMPTS", "3")?,
                register_window_seconds: vars.parse("RATE_LIMIT_REGISTER_WINDOW_SECONDS", "60")?,
            },
            admin,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if !(1..=MAX_ACCESS_TOKEN_EXPIRY_MINUTES).contains(&self.jwt.access_token_expiry_minutes) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be between 1 and {}",
                MAX_ACCESS_TOKEN_EXPIRY_MINUTES
            )));
        }

        if !(1..=MAX_REFRESH_TOKEN_EXPIRY_DAYS).contains(&self.jwt.refresh_token_expiry_days) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_REFRESH_TOKEN_EXPIRY_DAYS must be between 1 and {}",
                MAX_REFRESH_TOKEN_EXPIRY_DAYS
            )));
        }

        for (key, window) in [
            (
                "RATE_LIMIT_LOGIN_WINDOW_SECONDS",
                self.rate_limit.login_window_seconds,
            ),
            (
                "RATE_LIMIT_REGISTER_WINDOW_SECONDS",
                self.rate_limit.register_window_seconds,
            ),
        ] {
            if !(1..=MAX_RATE_LIMIT_WINDOW_SECONDS).contains(&window) {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} must be between 1 and {}",
                    key,
                    MAX_RATE_LIMIT_WINDOW_SECONDS
                )));
            }
        }

        if self.redis.purge_interval_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "BLACKLIST_PURGE_INTERVAL_SECONDS must be positive"
            )));
        }

        if self.is_prod() {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if let SigningKeyConfig::Hmac { secret } = &self.jwt.signing {
                if secret.expose_secret().len() < MIN_PROD_SECRET_LEN {
                    return Err(AppError::ConfigError(anyhow::anyhow!(
                        "JWT_SECRET_KEY must be at least {} bytes in production",
                        MIN_PROD_SECRET_LEN
                    )));
                }
            }

            if self.database.url.is_none() || self.redis.url.is_none() {
                tracing::warn!(
                    "Running in production with in-memory stores; state is lost on restart \
                     and not shared between instances"
                );
            }
        }

        Ok(())
    }

    pub fn is_prod(&self) -> bool {
        self.environment == Environment::Prod
    }
}

struct EnvReader<'a, F> {
    lookup: &'a F,
}

impl<F> EnvReader<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn get(&self, key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
        match self.optional(key) {
            Some(val) => Ok(val),
            None => {
                if is_prod {
                    Err(AppError::ConfigError(anyhow::anyhow!(
                        "{} is required in production but not set",
                        key
                    )))
                } else if let Some(def) = default {
                    Ok(def.to_string())
                } else {
                    Err(AppError::ConfigError(anyhow::anyhow!(
                        "{} is required but not set",
                        key
                    )))
                }
            }
        }
    }

    fn parse<T>(&self, key: &str, default: &str) -> Result<T, AppError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let raw = self.optional(key).unwrap_or_else(|| default.to_string());
        raw.trim().parse().map_err(|e: T::Err| {
            AppError::ConfigError(anyhow::anyhow!("Invalid value for {}: {}", key, e))
        })
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" | "testing" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

impl FromStr for SwaggerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "public" | "true" => Ok(SwaggerMode::Public),
            "disabled" | "false" => Ok(SwaggerMode::Disabled),
            _ => Err(format!("Invalid swagger mode: {}", s)),
        }
    }
}

/// Convenience for tests and tools that want to build a config from literals.
pub fn lookup_from_pairs(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}
