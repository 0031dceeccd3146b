//! Global configuration model for a Grund project.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{GrundError, Result};
use crate::types::InfraKind;

/// Root configuration for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrundConfig {
    /// Project name; scopes the manifest root.
    pub project: String,
    /// Directory holding one subdirectory per generated unit.
    ///
    /// Defaults to `<tmp>/grund/<project>` when unset.
    pub manifest_root: Option<PathBuf>,
    /// Network every unit attaches to.
    pub network: String,
    /// Emulated cloud settings.
    pub cloud: CloudDefaults,
    /// Credentials for the shared databases.
    pub credentials: DatabaseCredentials,
    /// Container images for the shared infrastructure kinds.
    pub images: ImageOverrides,
}

impl Default for GrundConfig {
    fn default() -> Self {
        Self {
            project: constants::DEFAULT_PROJECT.into(),
            manifest_root: None,
            network: constants::DEFAULT_NETWORK.into(),
            cloud: CloudDefaults::default(),
            credentials: DatabaseCredentials::default(),
            images: ImageOverrides::default(),
        }
    }
}

impl GrundConfig {
    /// Loads a configuration from a YAML file.
    ///
    /// Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`GrundError::Io`] if the file cannot be read and
    /// [`GrundError::Config`] if it is not a valid configuration.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::debug!(path = %path.display(), "loading configuration");
        let content = std::fs::read_to_string(path).map_err(|e| GrundError::io(path, e))?;
        serde_yaml::from_str(&content).map_err(|e| GrundError::Config {
            message: format!("{}: {e}", path.display()),
        })
    }

    /// Returns the effective manifest root.
    #[must_use]
    pub fn manifest_root(&self) -> PathBuf {
        self.manifest_root
            .clone()
            .unwrap_or_else(|| constants::default_manifest_root(&self.project))
    }
}

/// Emulated cloud endpoint, region, account, and credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudDefaults {
    /// Endpoint URL as seen from inside the network.
    pub endpoint: String,
    /// Region.
    pub region: String,
    /// Account id used in URLs and ARNs.
    pub account_id: String,
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
}

impl Default for CloudDefaults {
    fn default() -> Self {
        Self {
            endpoint: constants::DEFAULT_CLOUD_ENDPOINT.into(),
            region: constants::DEFAULT_CLOUD_REGION.into(),
            account_id: constants::DEFAULT_CLOUD_ACCOUNT_ID.into(),
            access_key_id: constants::DEFAULT_CLOUD_ACCESS_KEY_ID.into(),
            secret_access_key: constants::DEFAULT_CLOUD_SECRET_ACCESS_KEY.into(),
        }
    }
}

/// Username and password of the shared databases.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseCredentials {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

impl Default for DatabaseCredentials {
    fn default() -> Self {
        Self {
            username: constants::DEFAULT_DB_USERNAME.into(),
            password: constants::DEFAULT_DB_PASSWORD.into(),
        }
    }
}

/// Container images per infrastructure kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageOverrides {
    /// Relational database image.
    pub postgres: String,
    /// Document store image.
    pub mongodb: String,
    /// Cache image repository; the tag comes from the requirement or `7-alpine`.
    pub redis: String,
    /// Emulated cloud image.
    pub localstack: String,
}

impl Default for ImageOverrides {
    fn default() -> Self {
        Self {
            postgres: "postgres:16-alpine".into(),
            mongodb: "mongo:7".into(),
            redis: "redis".into(),
            localstack: "localstack/localstack:3".into(),
        }
    }
}

impl ImageOverrides {
    /// Returns the configured image for a kind.
    #[must_use]
    pub fn image_for(&self, kind: InfraKind) -> &str {
        match kind {
            InfraKind::Postgres => &self.postgres,
            InfraKind::Mongodb => &self.mongodb,
            InfraKind::Redis => &self.redis,
            InfraKind::Localstack => &self.localstack,
        }
    }
}
