use secrecy::SecretString;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct IamConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub database: DatabaseConfig,
    pub ids: IdConfig,
    pub wrapper: WrapperConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdConfig {
    /// Retries callers get on a public id collision.
    pub collision_retries: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WrapperConfig {
    pub key_id: String,
    /// Base64 encoded 32 byte key. A random key is generated in dev when
    /// unset.
    pub key: Option<SecretString>,
}

impl IamConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = IamConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("iam-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", Some("postgres://localhost:5432/iam"), is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            ids: IdConfig {
                collision_retries: parse_env("ID_COLLISION_RETRIES", "3", false)?,
            },
            wrapper: WrapperConfig {
                key_id: get_env("WRAPPER_KEY_ID", Some("local"), is_prod)?,
                key: env::var("WRAPPER_KEY").ok().map(SecretString::new),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.database.max_connections == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_MAX_CONNECTIONS must be greater than 0"
            )));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "DATABASE_MIN_CONNECTIONS must not exceed DATABASE_MAX_CONNECTIONS"
            )));
        }

        if self.environment == Environment::Prod && self.wrapper.key.is_none() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "WRAPPER_KEY is required in production but not set"
            )));
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: &[&str] = &[
        "ENVIRONMENT",
        "SERVICE_NAME",
        "SERVICE_VERSION",
        "DATABASE_URL",
        "DATABASE_MAX_CONNECTIONS",
        "DATABASE_MIN_CONNECTIONS",
        "ID_COLLISION_RETRIES",
        "WRAPPER_KEY_ID",
        "WRAPPER_KEY",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_dev_defaults() {
        clear_env();
        let config = IamConfig::from_env().unwrap();
        assert_eq!(config.environment, Environment::Dev);
        assert_eq!(config.service_name, "iam-service");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.ids.collision_retries, 3);
        assert_eq!(config.wrapper.key_id, "local");
        assert!(config.wrapper.key.is_none());
    }

    #[test]
    #[serial_test::serial]
    fn test_prod_requires_explicit_settings() {
        clear_env();
        env::set_var("ENVIRONMENT", "prod");
        let err = IamConfig::from_env().unwrap_err();
        clear_env();
        assert!(err.to_string().contains("SERVICE_NAME"));
    }

    #[test]
    #[serial_test::serial]
    fn test_rejects_inverted_pool_bounds() {
        clear_env();
        env::set_var("DATABASE_MAX_CONNECTIONS", "2");
        env::set_var("DATABASE_MIN_CONNECTIONS", "5");
        let result = IamConfig::from_env();
        clear_env();
        assert!(result.is_err());
    }

    #[test]
    fn test_environment_parsing() {
        assert_eq!("PROD".parse::<Environment>().unwrap(), Environment::Prod);
        assert!("staging".parse::<Environment>().is_err());
    }
}
