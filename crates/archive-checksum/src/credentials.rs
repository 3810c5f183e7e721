//! Secret reference resolution.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::config::CredentialsConfig;
use crate::core::{CredentialResolver, Secret};
use crate::error::{ChecksumError, Result};

const SERVICE: &str = "credentials";

/// Reads passwords from environment variables.
///
/// The variable name is the prefix followed by the reference, upper-cased,
/// with every non-alphanumeric character replaced by `_`. With prefix
/// `ARCHIVE_SECRET_`, reference `arn:secret:a1` maps to
/// `ARCHIVE_SECRET_ARN_SECRET_A1`.
#[derive(Debug, Clone)]
pub struct EnvCredentialResolver {
    prefix: String,
}

impl EnvCredentialResolver {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn variable_name(&self, secret_ref: &str) -> String {
        let suffix: String = secret_ref
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}{}", self.prefix, suffix)
    }
}

#[async_trait]
impl CredentialResolver for EnvCredentialResolver {
    async fn resolve(&self, secret_ref: &str) -> Result<Secret> {
        let name = self.variable_name(secret_ref);
        debug!("Resolving secret from environment variable {}", name);
        std::env::var(&name).map(Secret::new).map_err(|e| {
            ChecksumError::upstream(SERVICE, format!("{} for reference '{}'", e, secret_ref))
        })
    }
}

/// Passwords from a YAML map of secret reference to password.
pub struct FileCredentialResolver {
    secrets: HashMap<String, Secret>,
}

impl FileCredentialResolver {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ChecksumError::upstream(SERVICE, format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let raw: HashMap<String, String> = serde_yaml::from_str(yaml)
            .map_err(|e| ChecksumError::upstream(SERVICE, format!("invalid secrets file: {}", e)))?;
        Ok(Self {
            secrets: raw.into_iter().map(|(k, v)| (k, Secret::new(v))).collect(),
        })
    }
}

#[async_trait]
impl CredentialResolver for FileCredentialResolver {
    async fn resolve(&self, secret_ref: &str) -> Result<Secret> {
        self.secrets.get(secret_ref).cloned().ok_or_else(|| {
            ChecksumError::upstream(SERVICE, format!("no secret for reference '{}'", secret_ref))
        })
    }
}

/// Build the resolver selected by configuration; a secrets file wins over
/// the environment.
pub fn from_config(config: &CredentialsConfig) -> Result<Arc<dyn CredentialResolver>> {
    match &config.file {
        Some(path) => Ok(Arc::new(FileCredentialResolver::load(path)?)),
        None => Ok(Arc::new(EnvCredentialResolver::new(&config.env_prefix))),
    }
}
