use config::{ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub ledger: LedgerConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LedgerConfig {
    pub default_currency: String,
    /// Issuer float the system wallet is seeded with at bootstrap.
    pub system_seed_balance: String,
}

impl LedgerConfig {
    pub fn seed_balance(&self) -> Result<Decimal, rust_decimal::Error> {
        Decimal::from_str(&self.system_seed_balance)
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let mut builder = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.workers", 4)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("auth.token_ttl_hours", 24)?
            .set_default("ledger.default_currency", "USD")?
            .set_default("ledger.system_seed_balance", "1000000000.00")?;

        // Environment-specific config file, when one exists
        if let Ok(config_file) = env::var("CONFIG_FILE") {
            builder = builder.add_source(File::with_name(&config_file).required(false));
        } else {
            builder = builder
                .add_source(File::with_name(&format!("config/{}", environment)).required(false));
        }

        // Override with environment variables
        builder = builder.add_source(
            Environment::with_prefix("WALLET_ENGINE")
                .separator("__")
                .list_separator(","),
        );

        // Special handling for common env vars
        if let Ok(db_url) = env::var("DATABASE_URL") {
            builder = builder.set_override("database.url", db_url)?;
        }

        if let Ok(jwt_secret) = env::var("JWT_SECRET") {
            builder = builder.set_override("auth.jwt_secret", jwt_secret)?;
        }

        if let Ok(port) = env::var("WALLET_ENGINE_PORT") {
            builder = builder.set_override("server.port", port)?;
        }

        builder.build()?.try_deserialize()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port cannot be 0".to_string());
        }

        if self.database.url.is_empty() {
            return Err("Database URL is required".to_string());
        }

        if self.auth.jwt_secret.is_empty() {
            return Err("JWT secret is required".to_string());
        }

        if self.ledger.default_currency.len() != 3 {
            return Err("Default currency must be a 3-letter code".to_string());
        }

        match self.ledger.seed_balance() {
            Ok(seed) if seed >= Decimal::ZERO => Ok(()),
            Ok(_) => Err("System seed balance cannot be negative".to_string()),
            Err(_) => Err("System seed balance is not a valid decimal".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn base_config() -> Config {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 8080,
                workers: 4,
            },
            database: DatabaseConfig {
                url: "postgres://localhost/wallet_engine".into(),
                max_connections: 10,
                min_connections: 2,
            },
            auth: AuthConfig {
                jwt_secret: "test-secret".into(),
                token_ttl_hours: 24,
            },
            ledger: LedgerConfig {
                default_currency: "USD".into(),
                system_seed_balance: "1000000000.00".into(),
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_missing_database_url_rejected() {
        let mut config = base_config();
        config.database.url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_currency_rejected() {
        let mut config = base_config();
        config.ledger.default_currency = "DOLLARS".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_seed_balance_parses() {
        assert_eq!(
            base_config().ledger.seed_balance().unwrap(),
            dec!(1000000000.00)
        );
    }

    #[test]
    fn test_garbage_seed_balance_rejected() {
        let mut config = base_config();
        config.ledger.system_seed_balance = "a lot".into();
        assert!(config.validate().is_err());
    }
}
