//! Secret values injected into service environments.
//!
//! Where secrets come from is up to the caller; generation only asks a
//! [`SecretSource`] for each name a service declares.

use std::collections::BTreeMap;

use grund_common::error::{GrundError, Result};
use grund_common::types::Service;

/// Provides secret values by name.
pub trait SecretSource {
    /// Returns the value of `name`, if known.
    fn lookup(&self, name: &str) -> Option<String>;
}

impl SecretSource for BTreeMap<String, String> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Reads secrets from the process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecrets;

impl SecretSource for EnvSecrets {
    fn lookup(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Asks several sources in order; the first one that knows a name wins.
#[derive(Default)]
pub struct LayeredSecrets<'a> {
    layers: Vec<&'a dyn SecretSource>,
}

impl<'a> LayeredSecrets<'a> {
    /// Creates a source with no layers.
    #[must_use]
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    /// Appends a layer consulted after the existing ones.
    #[must_use]
    pub fn with(mut self, layer: &'a dyn SecretSource) -> Self {
        self.layers.push(layer);
        self
    }
}

impl std::fmt::Debug for LayeredSecrets<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayeredSecrets")
            .field("layers", &self.layers.len())
            .finish()
    }
}

impl SecretSource for LayeredSecrets<'_> {
    fn lookup(&self, name: &str) -> Option<String> {
        self.layers.iter().find_map(|layer| layer.lookup(name))
    }
}

/// Collects the values of the secrets `service` declares.
///
/// Optional secrets without a value are left out.
///
/// # Errors
///
/// Returns [`GrundError::MissingSecret`] for the first required secret
/// without a value.
pub fn collect(service: &Service, source: &dyn SecretSource) -> Result<BTreeMap<String, String>> {
    let mut values = BTreeMap::new();
    for secret in &service.secrets {
        match source.lookup(&secret.name) {
            Some(value) => {
                let _ = values.insert(secret.name.clone(), value);
            }
            None if secret.required => {
                return Err(GrundError::MissingSecret {
                    name: secret.name.clone(),
                });
            }
            None => {
                tracing::debug!(service = %service.name, secret = %secret.name, "optional secret not set");
            }
        }
    }
    Ok(values)
}
