//! Manifest generation for one pass.
//!
//! Generation runs in two phases. [`ManifestGenerator::plan`] resolves every
//! service into an in-memory [`GenerationPlan`]; nothing is written if any
//! service fails. [`ManifestGenerator::write`] then merges the shared
//! infrastructure manifest under the manifest lock and writes each service
//! manifest. A write failure part way leaves earlier files in place.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use grund_common::config::GrundConfig;
use grund_common::constants::INFRASTRUCTURE_UNIT;
use grund_common::error::{GrundError, Result};
use grund_common::types::{CloudService, InfraKind, InfrastructureRequirements, Service};

use crate::manifest::infra::{cloud_services_of, infrastructure_file, localstack_unit};
use crate::manifest::model::ComposeFile;
use crate::manifest::service::service_file;
use crate::manifest::store::{ManifestLayout, ManifestSet, read_manifest, write_manifest};
use crate::ports::{Allocation, PortAllocator};
use crate::reference::{self, context::ResolutionContext};
use crate::secrets::{self, SecretSource};

/// A service manifest ready to be written.
#[derive(Debug, Clone)]
pub struct PlannedService {
    /// Service name.
    pub name: String,
    /// Destination path.
    pub path: PathBuf,
    /// Host port the manifest publishes.
    pub port: Allocation,
    /// The manifest itself.
    pub manifest: ComposeFile,
}

/// Everything one pass will write.
#[derive(Debug, Clone)]
pub struct GenerationPlan {
    /// Requirements the shared infrastructure was built from.
    pub requirements: InfrastructureRequirements,
    /// Freshly generated shared infrastructure, before merging with what is
    /// on disk. `None` when nothing is required.
    pub infrastructure: Option<ComposeFile>,
    /// Per-service manifests in input order.
    pub services: Vec<PlannedService>,
}

/// Generates the manifests of a project.
pub struct ManifestGenerator<'a> {
    config: &'a GrundConfig,
    layout: ManifestLayout,
    secrets: &'a dyn SecretSource,
    tunnels: BTreeMap<String, String>,
}

impl std::fmt::Debug for ManifestGenerator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestGenerator")
            .field("project", &self.config.project)
            .field("layout", &self.layout)
            .field("tunnels", &self.tunnels)
            .finish_non_exhaustive()
    }
}

impl<'a> ManifestGenerator<'a> {
    /// Creates a generator writing under the configured manifest root.
    #[must_use]
    pub fn new(config: &'a GrundConfig, secrets: &'a dyn SecretSource) -> Self {
        Self {
            config,
            layout: ManifestLayout::new(config.manifest_root()),
            secrets,
            tunnels: BTreeMap::new(),
        }
    }

    /// Writes under `layout` instead of the configured root.
    #[must_use]
    pub fn with_layout(mut self, layout: ManifestLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Public URLs of tunnels, by tunnel name.
    #[must_use]
    pub fn with_tunnels(mut self, tunnels: BTreeMap<String, String>) -> Self {
        self.tunnels = tunnels;
        self
    }

    /// The on-disk layout.
    #[must_use]
    pub const fn layout(&self) -> &ManifestLayout {
        &self.layout
    }

    /// Manifests already on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest root cannot be listed.
    pub fn discover(&self) -> Result<ManifestSet> {
        ManifestSet::discover(&self.layout)
    }

    /// Plans and writes the manifests of `services`.
    ///
    /// `requirements` is the aggregated infrastructure of the pass.
    ///
    /// # Errors
    ///
    /// See [`Self::plan`] and [`Self::write`].
    pub fn generate(
        &self,
        services: &[Service],
        requirements: &InfrastructureRequirements,
    ) -> Result<ManifestSet> {
        let plan = self.plan(services, requirements)?;
        self.write(&plan)
    }

    /// Resolves every manifest of the pass without writing anything.
    ///
    /// Existing service manifests are read so their host ports stay
    /// reserved.
    ///
    /// # Errors
    ///
    /// Returns [`GrundError::Config`] for invalid or duplicate service names,
    /// and [`GrundError::Service`] wrapping the first per-service failure.
    pub fn plan(
        &self,
        services: &[Service],
        requirements: &InfrastructureRequirements,
    ) -> Result<GenerationPlan> {
        validate_names(services)?;

        let mut ports = PortAllocator::new();
        self.reserve_existing_ports(&mut ports, services)?;

        let infrastructure = (!requirements.is_empty()).then(|| {
            infrastructure_file(requirements, &requirements.cloud_services(), self.config)
        });

        let mut ctx = ResolutionContext::build(self.config, requirements, services, &self.tunnels);
        let mut planned = Vec::with_capacity(services.len());
        for service in services {
            let unit = self
                .plan_service(service, &mut ctx, &mut ports)
                .map_err(|e| GrundError::for_service(&service.name, e))?;
            planned.push(unit);
        }

        tracing::info!(
            services = planned.len(),
            infrastructure = ?requirements.kinds(),
            "planned generation"
        );
        Ok(GenerationPlan {
            requirements: requirements.clone(),
            infrastructure,
            services: planned,
        })
    }

    /// Writes a plan to disk.
    ///
    /// The shared infrastructure manifest is merged with the one on disk
    /// while holding the manifest lock.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken or a manifest cannot be
    /// read, parsed, or written.
    pub fn write(&self, plan: &GenerationPlan) -> Result<ManifestSet> {
        let mut set = self.discover()?;

        if let Some(fresh) = &plan.infrastructure {
            let path = self.layout.infrastructure_path();
            let _lock = self.layout.lock()?;
            let merged = merge_infrastructure(
                read_manifest(&path)?,
                fresh.clone(),
                &plan.requirements,
                self.config,
            );
            let _ = write_manifest(&path, &merged)?;
            set.infrastructure = Some(path);
        }

        for service in &plan.services {
            let _ = write_manifest(&service.path, &service.manifest)?;
            let _ = set
                .services
                .insert(service.name.clone(), service.path.clone());
        }

        tracing::info!(
            root = %self.layout.root().display(),
            manifests = set.files().len(),
            "generation complete"
        );
        Ok(set)
    }

    fn reserve_existing_ports(&self, ports: &mut PortAllocator, services: &[Service]) -> Result<()> {
        let regenerated: BTreeSet<&str> = services.iter().map(|s| s.name.as_str()).collect();
        let existing = self.discover()?;
        for (name, path) in &existing.services {
            if regenerated.contains(name.as_str()) {
                continue;
            }
            let Some(manifest) = read_manifest(path)? else {
                continue;
            };
            for port in manifest
                .services
                .values()
                .flat_map(|unit| unit.published_host_ports())
            {
                tracing::debug!(service = %name, port, "reserving port of existing service");
                let _ = ports.reserve(name.clone(), port);
            }
        }
        Ok(())
    }

    fn plan_service(
        &self,
        service: &Service,
        ctx: &mut ResolutionContext,
        ports: &mut PortAllocator,
    ) -> Result<PlannedService> {
        ctx.enter(service);

        let mut environment = service.env.clone();
        environment.extend(reference::resolve(&service.env_refs, ctx)?);

        if service.requirements().kinds().contains(&InfraKind::Localstack) {
            let cloud = &ctx.cloud;
            for (key, value) in [
                ("AWS_ACCESS_KEY_ID", &cloud.access_key_id),
                ("AWS_SECRET_ACCESS_KEY", &cloud.secret_access_key),
                ("AWS_REGION", &cloud.region),
                ("AWS_DEFAULT_REGION", &cloud.region),
                ("AWS_ENDPOINT_URL", &cloud.endpoint),
            ] {
                let _ = environment
                    .entry(key.to_owned())
                    .or_insert_with(|| value.clone());
            }
        }

        environment.extend(secrets::collect(service, self.secrets)?);

        let port = ports.allocate(&service.name, service.port)?;
        if port.reassigned {
            tracing::warn!(
                service = %service.name,
                desired = service.port,
                assigned = port.port,
                "host port taken, reassigned"
            );
        }

        tracing::debug!(service = %service.name, env = environment.len(), "planned service");
        Ok(PlannedService {
            name: service.name.clone(),
            path: self.layout.manifest_path(&service.name),
            port,
            manifest: service_file(service, &environment, port.port, self.config),
        })
    }
}

/// Placeholder namespaces that shadow a sibling service of the same name.
const RESERVED_NAMESPACES: [&str; 2] = ["self", "tunnel"];

/// Whether `name` collides with a shared unit or a placeholder namespace.
fn is_reserved(name: &str) -> bool {
    name == INFRASTRUCTURE_UNIT
        || RESERVED_NAMESPACES.contains(&name)
        || InfraKind::from_name(name).is_some()
        || CloudService::from_name(name).is_some()
}

/// Service names become directory names next to the shared unit, compose
/// unit names beside the infrastructure units, and placeholder namespaces.
fn validate_names(services: &[Service]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for service in services {
        let name = service.name.as_str();
        let invalid = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\']);
        if invalid {
            return Err(GrundError::Config {
                message: format!("invalid service name {name:?}"),
            });
        }
        if is_reserved(name) {
            return Err(GrundError::Config {
                message: format!("service name {name:?} is reserved"),
            });
        }
        if !seen.insert(name) {
            return Err(GrundError::Config {
                message: format!("service {name} is listed more than once"),
            });
        }
    }
    Ok(())
}

/// Unions the freshly generated infrastructure into what is on disk.
///
/// The emulated cloud unit keeps every sub-service an earlier pass enabled.
fn merge_infrastructure(
    existing: Option<ComposeFile>,
    mut fresh: ComposeFile,
    requirements: &InfrastructureRequirements,
    config: &GrundConfig,
) -> ComposeFile {
    let Some(mut merged) = existing else {
        return fresh;
    };

    let cloud = InfraKind::Localstack.canonical_name();
    if let (Some(previous), true) = (merged.services.get(cloud), fresh.services.contains_key(cloud)) {
        let enabled = cloud_services_of(previous);
        let wanted = requirements.cloud_services();
        let union: Vec<CloudService> = CloudService::ALL
            .into_iter()
            .filter(|s| enabled.contains(s) || wanted.contains(s))
            .collect();
        if union != wanted {
            tracing::debug!(services = ?union, "keeping previously enabled cloud services");
            let _ = fresh
                .services
                .insert(cloud.to_owned(), localstack_unit(&union, config));
        }
    }

    merged.merge(fresh);
    merged
}
