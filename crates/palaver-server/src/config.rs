use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub database_path: PathBuf,
    pub jwt_secret: String,
    pub environment: Environment,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("invalid value for {var}: {value}")]
    InvalidVar { var: &'static str, value: String },
}

impl ServerConfig {
    /// Load configuration from the environment. Missing required options are
    /// a startup failure, not a warning.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match std::env::var("PORT") {
            Ok(raw) => raw.parse::<u16>().map_err(|_| ConfigError::InvalidVar {
                var: "PORT",
                value: raw,
            })?,
            Err(_) => 3000,
        };

        let database_url =
            std::env::var("DATABASE_URL").map_err(|_| ConfigError::MissingVar("DATABASE_URL"))?;
        let database_path = PathBuf::from(
            database_url
                .strip_prefix("sqlite:")
                .unwrap_or(&database_url),
        );

        let jwt_secret =
            std::env::var("JWT_SECRET").map_err(|_| ConfigError::MissingVar("JWT_SECRET"))?;

        let environment = match std::env::var("NODE_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("development") | Ok("dev") | Err(_) => Environment::Development,
            Ok(other) => {
                tracing::warn!(value = %other, "Unrecognized NODE_ENV, assuming development");
                Environment::Development
            }
        };

        Ok(Self {
            port,
            database_path,
            jwt_secret,
            environment,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Environment-variable tests mutate process state; keep them in one test
    // so they cannot race each other.
    #[test]
    fn from_env_requires_database_url_and_secret() {
        std::env::remove_var("PORT");
        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("JWT_SECRET");
        std::env::remove_var("NODE_ENV");

        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::MissingVar("DATABASE_URL"))
        ));

        std::env::set_var("DATABASE_URL", "sqlite:/tmp/palaver.db");
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::MissingVar("JWT_SECRET"))
        ));

        std::env::set_var("JWT_SECRET", "super-secret");
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.database_path, PathBuf::from("/tmp/palaver.db"));
        assert_eq!(config.environment, Environment::Development);

        std::env::set_var("PORT", "not-a-port");
        assert!(matches!(
            ServerConfig::from_env(),
            Err(ConfigError::InvalidVar { var: "PORT", .. })
        ));

        std::env::set_var("PORT", "8081");
        std::env::set_var("NODE_ENV", "production");
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.port, 8081);
        assert_eq!(config.environment, Environment::Production);

        std::env::remove_var("PORT");
        std::env::remove_var("DATABASE_URL");
        std::env::remove_var("JWT_SECRET");
        std::env::remove_var("NODE_ENV");
    }
}
