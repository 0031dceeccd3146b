//! Compose document for a single service.

use std::collections::BTreeMap;
use std::path::PathBuf;

use grund_common::config::GrundConfig;
use grund_common::types::{HealthCheck, Service};

use super::infra::network_spec;
use super::model::{
    ComposeBuild, ComposeFile, ComposeService, Condition, DependsOn, Healthcheck,
    escape_interpolation,
};

/// Builds the manifest of `service`.
///
/// `environment` must already be fully resolved; `$` in values is escaped
/// so compose passes it through literally. Startup dependencies are only
/// declared on shared infrastructure, never on sibling services.
#[must_use]
pub fn service_file(
    service: &Service,
    environment: &BTreeMap<String, String>,
    host_port: u16,
    config: &GrundConfig,
) -> ComposeFile {
    let depends_on = service
        .requirements()
        .kinds()
        .into_iter()
        .map(|kind| {
            (
                kind.canonical_name().to_owned(),
                DependsOn {
                    condition: Condition::ServiceHealthy,
                },
            )
        })
        .collect();

    let (image, build) = image_or_build(service);
    let unit = ComposeService {
        image,
        build,
        ports: vec![format!("{host_port}:{}", service.port)],
        environment: environment
            .iter()
            .map(|(k, v)| (k.clone(), escape_interpolation(v)))
            .collect(),
        networks: vec![config.network.clone()],
        healthcheck: service
            .health
            .as_ref()
            .map(|health| readiness_probe(health, service.port)),
        depends_on,
        ..ComposeService::default()
    };

    let mut file = ComposeFile::default();
    let _ = file.services.insert(service.name.clone(), unit);
    let _ = file
        .networks
        .insert(config.network.clone(), network_spec(config));
    file
}

fn image_or_build(service: &Service) -> (Option<String>, Option<ComposeBuild>) {
    match (&service.build, &service.image) {
        (None, Some(image)) => (Some(image.clone()), None),
        (build, _) => {
            let build = build.clone().unwrap_or_default();
            let context: PathBuf = service.root.join(&build.context).components().collect();
            (
                None,
                Some(ComposeBuild {
                    context: context.to_string_lossy().into_owned(),
                    dockerfile: build.dockerfile,
                }),
            )
        }
    }
}

fn readiness_probe(health: &HealthCheck, port: u16) -> Healthcheck {
    let endpoint = if health.endpoint.starts_with('/') {
        health.endpoint.clone()
    } else {
        format!("/{}", health.endpoint)
    };
    Healthcheck {
        test: vec![
            "CMD-SHELL".into(),
            format!("curl -fsS http://localhost:{port}{endpoint} || exit 1"),
        ],
        interval: Some(health.interval.clone()),
        timeout: Some(health.timeout.clone()),
        retries: Some(health.retries),
        start_period: health.start_period.clone(),
        extra: BTreeMap::new(),
    }
}
