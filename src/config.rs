use rust_decimal::Decimal;
use std::env;
use std::fmt;
use std::str::FromStr;
use validator::Validate;

use crate::auth::{AuthSettings, LoginRequest};
use crate::services::circulation::CirculationPolicy;

/// Raised when an environment variable is missing or cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "{} must be set", key),
            ConfigError::Invalid { key, value } => {
                write!(f, "{} has an invalid value: {:?}", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Credentials for the administrator account created at startup.
#[derive(Debug, Clone)]
pub struct AdminBootstrap {
    pub email: String,
    pub password: String,
}

impl AdminBootstrap {
    /// The account must be able to sign in, so it follows the login rules.
    fn checked(email: String, password: String) -> Result<Self, ConfigError> {
        let login = LoginRequest {
            email: email.clone(),
            password: password.clone(),
        };
        if let Err(errors) = login.validate() {
            let invalid = if errors.field_errors().contains_key("email") {
                ConfigError::Invalid {
                    key: "ADMIN_EMAIL",
                    value: email,
                }
            } else {
                ConfigError::Invalid {
                    key: "ADMIN_PASSWORD",
                    value: "<hidden>".into(),
                }
            };
            return Err(invalid);
        }
        Ok(Self { email, password })
    }
}

pub struct Config {
    /// `None` runs the service on the in-memory store.
    pub database_url: Option<String>,
    pub max_db_connections: u32,
    pub server_port: u16,
    pub server_host: String,
    pub cors_allowed_origin: Option<String>,
    pub auth: AuthSettings,
    pub policy: CirculationPolicy,
    pub admin: Option<AdminBootstrap>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET"))?;
        let defaults = CirculationPolicy::default();

        let auth = AuthSettings {
            jwt_secret,
            token_ttl_hours: parse_or("JWT_TTL_HOURS", 24)?,
            bcrypt_cost: parse_or("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
        };

        let policy = CirculationPolicy {
            loan_period_days: parse_or("LOAN_PERIOD_DAYS", defaults.loan_period_days)?,
            daily_fine_rate: parse_or::<Decimal>("DAILY_FINE_RATE", defaults.daily_fine_rate)?,
            restock_damaged: parse_or("RESTOCK_DAMAGED", defaults.restock_damaged)?,
        };
        if policy.loan_period_days < 1 {
            return Err(ConfigError::Invalid {
                key: "LOAN_PERIOD_DAYS",
                value: policy.loan_period_days.to_string(),
            });
        }
        if policy.daily_fine_rate.is_sign_negative() {
            return Err(ConfigError::Invalid {
                key: "DAILY_FINE_RATE",
                value: policy.daily_fine_rate.to_string(),
            });
        }

        let admin = match (non_empty("ADMIN_EMAIL"), non_empty("ADMIN_PASSWORD")) {
            (Some(email), Some(password)) => Some(AdminBootstrap::checked(email, password)?),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("ADMIN_PASSWORD")),
            (None, Some(_)) => return Err(ConfigError::Missing("ADMIN_EMAIL")),
        };

        Ok(Self {
            database_url: non_empty("DATABASE_URL"),
            max_db_connections: parse_or("MAX_DB_CONNECTIONS", 5)?,
            server_port: parse_or("SERVER_PORT", 8080)?,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            cors_allowed_origin: non_empty("CORS_ALLOWED_ORIGIN"),
            auth,
            policy,
            admin,
        })
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server_host, self.server_port)
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match non_empty(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}
