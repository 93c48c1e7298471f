//! Server configuration read from the environment.

use promptlab_core::{PromptLabError, Result};

pub const DEFAULT_DB_PATH: &str = "promptlab.db";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_SESSION_COOKIE: &str = "promptlab_session";

/// Configuration for the API server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Path to the SQLite database file
    pub db_path: String,
    /// Port to listen on
    pub port: u16,
    /// Cookie consulted for the session token when no bearer token is sent
    pub session_cookie: String,
    /// Create the schema and apply migrations at startup
    pub run_migrations: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            db_path: DEFAULT_DB_PATH.to_string(),
            port: DEFAULT_PORT,
            session_cookie: DEFAULT_SESSION_COOKIE.to_string(),
            run_migrations: true,
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables.
    ///
    /// Reads:
    /// - `PROMPTLAB_DB_PATH`: SQLite database path (default: `promptlab.db`)
    /// - `PROMPTLAB_PORT`, then `PORT`: listen port (default: 8080)
    /// - `PROMPTLAB_SESSION_COOKIE`: session cookie name (default: `promptlab_session`)
    /// - `PROMPTLAB_RUN_MIGRATIONS`: "false" to skip migrations at startup
    pub fn from_env() -> Result<Self> {
        let db_path =
            std::env::var("PROMPTLAB_DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string());

        let port = match std::env::var("PROMPTLAB_PORT").or_else(|_| std::env::var("PORT")) {
            Ok(raw) => raw.trim().parse::<u16>().map_err(|_| {
                PromptLabError::ValidationError(format!("PORT must be a valid number, got '{}'", raw))
            })?,
            Err(_) => DEFAULT_PORT,
        };

        let session_cookie = std::env::var("PROMPTLAB_SESSION_COOKIE")
            .unwrap_or_else(|_| DEFAULT_SESSION_COOKIE.to_string());

        let run_migrations = std::env::var("PROMPTLAB_RUN_MIGRATIONS")
            .map(|v| v.to_lowercase() != "false")
            .unwrap_or(true);

        Ok(Self {
            db_path,
            port,
            session_cookie,
            run_migrations,
        })
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.db_path.trim().is_empty() {
            return Err(PromptLabError::ValidationError(
                "PROMPTLAB_DB_PATH must not be empty".into(),
            ));
        }
        if self.port == 0 {
            return Err(PromptLabError::ValidationError(
                "PORT must be greater than 0".into(),
            ));
        }
        let valid_cookie = !self.session_cookie.is_empty()
            && self
                .session_cookie
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if !valid_cookie {
            return Err(PromptLabError::ValidationError(format!(
                "PROMPTLAB_SESSION_COOKIE '{}' is not a valid cookie name",
                self.session_cookie
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for key in [
            "PROMPTLAB_DB_PATH",
            "PROMPTLAB_PORT",
            "PORT",
            "PROMPTLAB_SESSION_COOKIE",
            "PROMPTLAB_RUN_MIGRATIONS",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = ApiConfig::from_env().unwrap();
        assert_eq!(config, ApiConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_env_overrides() {
        clear_env();
        std::env::set_var("PROMPTLAB_DB_PATH", "/tmp/pl.db");
        std::env::set_var("PORT", "9000");
        std::env::set_var("PROMPTLAB_SESSION_COOKIE", "sid");
        std::env::set_var("PROMPTLAB_RUN_MIGRATIONS", "FALSE");

        let config = ApiConfig::from_env().unwrap();
        assert_eq!(config.db_path, "/tmp/pl.db");
        assert_eq!(config.port, 9000);
        assert_eq!(config.session_cookie, "sid");
        assert!(!config.run_migrations);

        // PROMPTLAB_PORT wins over PORT
        std::env::set_var("PROMPTLAB_PORT", "9100");
        assert_eq!(ApiConfig::from_env().unwrap().port, 9100);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_port() {
        clear_env();
        std::env::set_var("PROMPTLAB_PORT", "http");
        assert!(ApiConfig::from_env().is_err());
        clear_env();
    }

    #[test]
    fn test_validate_rejects_bad_cookie_name() {
        let config = ApiConfig {
            session_cookie: "bad cookie;".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
