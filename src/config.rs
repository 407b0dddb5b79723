use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};


pub const DEFAULT_URL: &str = "ldap://localhost:389/";


/// A bind identity.
#[derive(Clone, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct Credentials {
    pub bind_dn: String,
    pub password: String,
}
impl Credentials {
    pub fn new(bind_dn: impl Into<String>, password: impl Into<String>) -> Self {
        Self { bind_dn: bind_dn.into(), password: password.into() }
    }

    /// Reads a TOML file containing `bind_dn` and `password`.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let credentials_string = std::fs::read_to_string(path)
            .map_err(|e| Error::invalid(format!("failed to read credentials file {}: {}", path.display(), e)))?;
        toml::from_str(&credentials_string)
            .map_err(|e| Error::invalid(format!("failed to parse credentials file {}: {}", path.display(), e)))
    }
}
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("bind_dn", &self.bind_dn)
            .field("password", &"***REDACTED***")
            .finish()
    }
}


/// Where and as whom every session of a facade connects. Fixed at construction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerConfig {
    pub url: String,
    /// `None` binds anonymously.
    pub credentials: Option<Credentials>,
}
impl ServerConfig {
    pub fn anonymous(url: impl Into<String>) -> Self {
        Self { url: url.into(), credentials: None }
    }

    pub fn with_credentials(url: impl Into<String>, credentials: Credentials) -> Self {
        Self { url: url.into(), credentials: Some(credentials) }
    }

    pub fn bind_dn(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.bind_dn.as_str())
    }
}
impl Default for ServerConfig {
    fn default() -> Self { Self::anonymous(DEFAULT_URL) }
}
