//! Connection settings and addressing modes.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Deserializer, Serialize};

use crate::driver::ConnectTarget;
use crate::error::SqlHandlerError;
use crate::types::DatabaseType;

/// Environment variable naming the JSON settings file read by [`DbSettings::from_env`].
pub const CONFIG_PATH_ENV: &str = "SQL_HANDLER_CONFIG_FP";

/// Which credentials to connect with and whether to select a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminMode {
    /// Regular user credentials and the configured database.
    #[default]
    #[value(name = "no_admin", alias = "no-admin")]
    NoAdmin,
    /// Admin credentials, connected to the server without a database.
    #[value(name = "admin_without_database", alias = "admin-without-database")]
    AdminWithoutDatabase,
    /// Admin credentials and the configured database.
    #[value(name = "admin_with_database", alias = "admin-with-database")]
    AdminWithDatabase,
}

impl FromStr for AdminMode {
    type Err = SqlHandlerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Self as ValueEnum>::from_str(s, false).map_err(|_| {
            SqlHandlerError::ConfigError(format!(
                "admin takes only one of no_admin, admin_without_database, admin_with_database; found {s:?}"
            ))
        })
    }
}

/// Settings for one handler.
///
/// Usually read from a JSON file:
/// ```json
/// {
///   "backend": "postgres",
///   "user": "app",
///   "password": "secret",
///   "database": "app_db",
///   "host": "localhost",
///   "port": 5432,
///   "admin_user": "postgres",
///   "admin_password": ""
/// }
/// ```
/// Empty passwords and admin credentials count as unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbSettings {
    #[serde(default = "default_backend")]
    pub backend: DatabaseType,
    #[serde(default)]
    pub user: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub database: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub admin_user: Option<String>,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub admin_password: Option<String>,
    /// Rewrite `$N`/`?N` markers to the backend's style before running statements.
    #[serde(default)]
    pub translate_placeholders: bool,
}

fn default_backend() -> DatabaseType {
    #[cfg(feature = "postgres")]
    {
        DatabaseType::Postgres
    }
    #[cfg(not(feature = "postgres"))]
    {
        DatabaseType::Sqlite
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    5432
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

impl DbSettings {
    /// Settings for `backend` with defaults everywhere else.
    #[must_use]
    pub fn new(backend: DatabaseType) -> Self {
        Self {
            backend,
            user: String::new(),
            password: None,
            database: String::new(),
            host: default_host(),
            port: default_port(),
            admin_user: None,
            admin_password: None,
            translate_placeholders: false,
        }
    }

    /// Settings for a `SQLite` database file.
    #[cfg(feature = "sqlite")]
    #[must_use]
    pub fn sqlite(path: impl AsRef<Path>) -> Self {
        Self::new(DatabaseType::Sqlite).with_database(path.as_ref().to_string_lossy())
    }

    /// # Errors
    /// Returns `SqlHandlerError::ConfigError` if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, SqlHandlerError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            SqlHandlerError::ConfigError(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&text)
    }

    /// # Errors
    /// Returns `SqlHandlerError::ConfigError` if the text is not valid settings JSON.
    pub fn from_json_str(text: &str) -> Result<Self, SqlHandlerError> {
        serde_json::from_str(text)
            .map_err(|e| SqlHandlerError::ConfigError(format!("invalid settings: {e}")))
    }

    /// Load the file named by [`CONFIG_PATH_ENV`].
    ///
    /// # Errors
    /// Returns `SqlHandlerError::ConfigError` if the variable is unset or the file is invalid.
    pub fn from_env() -> Result<Self, SqlHandlerError> {
        let path = std::env::var(CONFIG_PATH_ENV).map_err(|_| {
            SqlHandlerError::ConfigError(format!("{CONFIG_PATH_ENV} is not set"))
        })?;
        Self::from_json_file(path)
    }

    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into()).filter(|p: &String| !p.is_empty());
        self
    }

    #[must_use]
    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = database.into();
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_admin(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.admin_user = Some(user.into()).filter(|u: &String| !u.is_empty());
        self.admin_password = Some(password.into()).filter(|p: &String| !p.is_empty());
        self
    }

    #[must_use]
    pub fn with_translation(mut self, translate_placeholders: bool) -> Self {
        self.translate_placeholders = translate_placeholders;
        self
    }

    /// Connection parameters for `mode`.
    ///
    /// Admin modes swap in the admin credentials; `AdminWithoutDatabase` also drops
    /// the database name.
    ///
    /// # Errors
    /// Returns `SqlHandlerError::ConfigError` for an admin mode on a backend that
    /// authenticates when `admin_user` is not set.
    pub fn target(&self, mode: AdminMode) -> Result<ConnectTarget, SqlHandlerError> {
        let (user, password) = match mode {
            AdminMode::NoAdmin => (Some(self.user.clone()), self.password.clone()),
            AdminMode::AdminWithoutDatabase | AdminMode::AdminWithDatabase => {
                if self.admin_user.is_none() && self.backend.authenticates() {
                    return Err(SqlHandlerError::ConfigError(format!(
                        "admin_user must be set to connect in {mode:?} mode"
                    )));
                }
                (self.admin_user.clone(), self.admin_password.clone())
            }
        };
        let database = match mode {
            AdminMode::AdminWithoutDatabase => None,
            AdminMode::NoAdmin | AdminMode::AdminWithDatabase => Some(self.database.clone()),
        };
        Ok(ConnectTarget {
            user: user.filter(|u| !u.is_empty()),
            password,
            database,
            host: self.host.clone(),
            port: self.port,
        })
    }
}
