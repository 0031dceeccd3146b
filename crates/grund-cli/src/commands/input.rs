//! Loading of configuration and service declarations shared by commands.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use grund_common::config::GrundConfig;
use grund_common::types::{InfrastructureRequirements, Service};
use grund_compose::graph::DependencyGraph;
use grund_compose::{EnvSecrets, LayeredSecrets, ManifestGenerator, aggregate_with_diagnostics};

/// Service declarations and generation inputs.
#[derive(Args, Debug)]
pub struct ServiceInputs {
    /// Service declaration files (YAML).
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Generate only these services and what they depend on.
    #[arg(short, long = "service")]
    pub services: Vec<String>,

    /// Public URL of a tunnel, as `name=url`.
    #[arg(long = "tunnel", value_parser = parse_pair)]
    pub tunnels: Vec<(String, String)>,

    /// Secret value, as `name=value`. Looked up before the environment.
    #[arg(long = "secret", value_parser = parse_pair)]
    pub secrets: Vec<(String, String)>,
}

/// Services selected for one pass and their aggregated infrastructure.
#[derive(Debug)]
pub struct Selection {
    /// Services to generate, in selection order.
    pub services: Vec<Service>,
    /// Merged infrastructure of those services.
    pub requirements: InfrastructureRequirements,
}

impl ServiceInputs {
    /// Loads the declarations and narrows them to the selection.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be read or parsed, or a selected
    /// service is unknown.
    pub fn select(&self) -> anyhow::Result<Selection> {
        let declared = self
            .files
            .iter()
            .map(|path| load_service(path))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let services = if self.services.is_empty() {
            declared
        } else {
            let graph = DependencyGraph::from_services(&declared)?;
            let selected: Vec<&str> = self.services.iter().map(String::as_str).collect();
            let closure = graph.closure(&selected)?;
            let mut by_name: BTreeMap<String, Service> = declared
                .into_iter()
                .map(|s| (s.name.clone(), s))
                .collect();
            closure
                .iter()
                .filter_map(|name| by_name.remove(name))
                .collect()
        };

        let declared: Vec<_> = services.iter().map(|s| s.requirements().clone()).collect();
        let aggregation = aggregate_with_diagnostics(&declared);
        Ok(Selection {
            services,
            requirements: aggregation.requirements,
        })
    }

    /// Runs `f` with a generator wired to these inputs.
    ///
    /// Secrets given on the command line take precedence over the
    /// environment.
    pub fn with_generator<T>(
        &self,
        config: &GrundConfig,
        f: impl FnOnce(&ManifestGenerator<'_>) -> T,
    ) -> T {
        let cli_secrets: BTreeMap<String, String> = self.secrets.iter().cloned().collect();
        let env_secrets = EnvSecrets;
        let secrets = LayeredSecrets::new().with(&cli_secrets).with(&env_secrets);
        let generator = ManifestGenerator::new(config, &secrets)
            .with_tunnels(self.tunnels.iter().cloned().collect());
        f(&generator)
    }
}

/// Loads the project configuration; `root` overrides its manifest root.
///
/// # Errors
///
/// Returns an error if the configuration file cannot be loaded.
pub fn load_config(path: Option<&Path>, root: Option<PathBuf>) -> anyhow::Result<GrundConfig> {
    let mut config = match path {
        Some(path) => GrundConfig::load(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => GrundConfig::default(),
    };
    if root.is_some() {
        config.manifest_root = root;
    }
    Ok(config)
}

/// Reads one service declaration; its directory becomes the build root.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a service
/// declaration.
pub fn load_service(path: &Path) -> anyhow::Result<Service> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading service declaration {}", path.display()))?;
    let mut service: Service = serde_yaml::from_str(&content)
        .with_context(|| format!("parsing service declaration {}", path.display()))?;
    service.root = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    tracing::debug!(service = %service.name, path = %path.display(), "loaded service");
    Ok(service)
}

/// Parses a `name=value` argument.
fn parse_pair(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_owned(), value.to_owned())),
        _ => Err(format!("expected name=value, got {arg:?}")),
    }
}
