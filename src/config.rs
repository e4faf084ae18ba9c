//! Environment-driven configuration for the bookstore store.

use crate::db::connection::StoreError;
#[cfg(feature = "arango")]
use crate::db::{ArangoAuthRefresh, ArangoConnectionConfig};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_DATABASE: &str = "plp_bookstore";
pub const DEFAULT_COLLECTION: &str = "books";
pub const DEFAULT_ARANGO_URL: &str = "http://127.0.0.1:8529";
pub const DEFAULT_ARANGO_USER: &str = "root";

/// Which `DocumentStore` implementation a session should open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    #[default]
    Memory,
    Arango,
}

impl BackendKind {
    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Memory => "memory",
            BackendKind::Arango => "arango",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for BackendKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(BackendKind::Memory),
            "arango" | "arangodb" => Ok(BackendKind::Arango),
            other => Err(StoreError::validation(format!(
                "unknown backend '{}': expected 'memory' or 'arango'",
                other
            ))),
        }
    }
}

/// Authentication strategy for Arango connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArangoAuthMode {
    #[default]
    Jwt,
    Basic,
}

impl ArangoAuthMode {
    pub fn name(&self) -> &'static str {
        match self {
            ArangoAuthMode::Jwt => "jwt",
            ArangoAuthMode::Basic => "basic",
        }
    }
}

impl fmt::Display for ArangoAuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ArangoAuthMode {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jwt" => Ok(ArangoAuthMode::Jwt),
            "basic" => Ok(ArangoAuthMode::Basic),
            other => Err(StoreError::validation(format!(
                "ARANGO_AUTH must be 'jwt' or 'basic', got '{}'",
                other
            ))),
        }
    }
}

/// Where the books live and how to reach them.
#[derive(Clone, PartialEq, Eq)]
pub struct BookstoreConfig {
    pub backend: BackendKind,
    pub database: String,
    pub collection: String,
    pub arango_url: String,
    pub arango_user: String,
    pub arango_password: String,
    pub arango_auth: ArangoAuthMode,
}

impl fmt::Debug for BookstoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BookstoreConfig")
            .field("backend", &self.backend)
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("arango_url", &self.arango_url)
            .field("arango_user", &self.arango_user)
            .field("arango_auth", &self.arango_auth)
            .finish_non_exhaustive()
    }
}

impl Default for BookstoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            arango_url: DEFAULT_ARANGO_URL.to_string(),
            arango_user: DEFAULT_ARANGO_USER.to_string(),
            arango_password: String::new(),
            arango_auth: ArangoAuthMode::default(),
        }
    }
}

impl BookstoreConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key lookup; unset keys take defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StoreError> {
        let defaults = Self::default();
        let get = |key: &str, default: String| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(default)
        };

        let backend = match lookup("PLP_BOOKSTORE_BACKEND") {
            Some(v) if !v.trim().is_empty() => v.parse()?,
            _ => defaults.backend,
        };
        let arango_auth = match lookup("ARANGO_AUTH") {
            Some(v) if !v.trim().is_empty() => v.parse()?,
            _ => defaults.arango_auth,
        };

        Ok(Self {
            backend,
            database: get("PLP_BOOKSTORE_DATABASE", defaults.database),
            collection: get("PLP_BOOKSTORE_COLLECTION", defaults.collection),
            arango_url: get("ARANGO_URL", defaults.arango_url),
            arango_user: get("ARANGO_USER", defaults.arango_user),
            // an empty password is a valid root password
            arango_password: lookup("ARANGO_PASSWORD").unwrap_or_default(),
            arango_auth,
        })
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    #[cfg(feature = "arango")]
    pub fn arango_connection_config(&self) -> ArangoConnectionConfig {
        let mut cfg = ArangoConnectionConfig::new(
            self.arango_url.clone(),
            self.arango_user.clone(),
            self.arango_password.clone(),
            self.database.clone(),
        );
        cfg.auth_mode = self.arango_auth;
        cfg.refresh = ArangoAuthRefresh::OnAuthError;
        cfg
    }
}
