//! Compose units for the shared infrastructure kinds.
//!
//! Each [`InfraKind`] maps to exactly one unit builder. Which kinds are
//! emitted is decided once from the requirements; nothing is probed.

use std::collections::BTreeMap;

use grund_common::config::GrundConfig;
use grund_common::types::{
    CloudService, InfraKind, InfrastructureRequirements, MongoConfig, PostgresConfig,
    RedisRequirement,
};

use super::model::{
    Command, ComposeFile, ComposeService, Healthcheck, NamedVolume, NetworkSpec,
    escape_interpolation,
};

const DEFAULT_REDIS_TAG: &str = "7-alpine";

/// Environment key listing the emulated cloud's enabled sub-services.
pub const CLOUD_SERVICES_KEY: &str = "SERVICES";

/// Name of the persistent volume of a kind.
#[must_use]
pub fn volume_name(kind: InfraKind) -> String {
    format!("{kind}-data")
}

/// Builds the shared infrastructure document for `requirements`.
///
/// `cloud_services` decides which sub-services the emulated cloud unit
/// exposes; it is passed separately so callers can widen it to what an
/// earlier run already enabled.
#[must_use]
pub fn infrastructure_file(
    requirements: &InfrastructureRequirements,
    cloud_services: &[CloudService],
    config: &GrundConfig,
) -> ComposeFile {
    let mut file = ComposeFile::default();
    for kind in requirements.kinds() {
        let Some(unit) = unit_for(kind, requirements, cloud_services, config) else {
            continue;
        };
        let _ = file.services.insert(kind.canonical_name().to_owned(), unit);
        let _ = file
            .volumes
            .insert(volume_name(kind), NamedVolume::default());
    }
    let _ = file
        .networks
        .insert(config.network.clone(), network_spec(config));
    file
}

/// The network declaration shared by every generated manifest.
#[must_use]
pub fn network_spec(config: &GrundConfig) -> NetworkSpec {
    NetworkSpec {
        name: Some(format!("{}-{}", config.project, config.network)),
        extra: BTreeMap::new(),
    }
}

/// Builds the unit for one kind, or `None` if the requirements lack it.
#[must_use]
pub fn unit_for(
    kind: InfraKind,
    requirements: &InfrastructureRequirements,
    cloud_services: &[CloudService],
    config: &GrundConfig,
) -> Option<ComposeService> {
    match kind {
        InfraKind::Postgres => requirements
            .postgres
            .as_ref()
            .map(|pg| postgres_unit(pg, config)),
        InfraKind::Mongodb => requirements
            .mongodb
            .as_ref()
            .map(|mongo| mongodb_unit(mongo, config)),
        InfraKind::Redis => requirements
            .redis
            .as_ref()
            .map(|redis| redis_unit(redis, config)),
        InfraKind::Localstack => {
            (!cloud_services.is_empty()).then(|| localstack_unit(cloud_services, config))
        }
    }
}

fn base_unit(kind: InfraKind, image: String, mount: &str, config: &GrundConfig) -> ComposeService {
    let port = kind.default_port();
    ComposeService {
        image: Some(image),
        ports: vec![format!("{port}:{port}")],
        volumes: vec![format!("{}:{mount}", volume_name(kind))],
        networks: vec![config.network.clone()],
        ..ComposeService::default()
    }
}

fn probe(test: Vec<String>) -> Healthcheck {
    Healthcheck {
        test,
        interval: Some("5s".into()),
        timeout: Some("5s".into()),
        retries: Some(10),
        start_period: None,
        extra: BTreeMap::new(),
    }
}

/// Environment of a unit; values are escaped so compose takes them literally.
fn env(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), escape_interpolation(v)))
        .collect()
}

fn postgres_unit(pg: &PostgresConfig, config: &GrundConfig) -> ComposeService {
    let kind = InfraKind::Postgres;
    let creds = &config.credentials;
    let mut unit = base_unit(
        kind,
        config.images.image_for(kind).to_owned(),
        "/var/lib/postgresql/data",
        config,
    );
    unit.environment = env(&[
        ("POSTGRES_USER", creds.username.as_str()),
        ("POSTGRES_PASSWORD", creds.password.as_str()),
        ("POSTGRES_DB", pg.database.as_str()),
    ]);
    unit.healthcheck = Some(probe(vec![
        "CMD-SHELL".into(),
        escape_interpolation(&format!(
            "pg_isready -U {} -d {}",
            creds.username, pg.database
        )),
    ]));
    unit
}

fn mongodb_unit(mongo: &MongoConfig, config: &GrundConfig) -> ComposeService {
    let kind = InfraKind::Mongodb;
    let creds = &config.credentials;
    let mut unit = base_unit(
        kind,
        config.images.image_for(kind).to_owned(),
        "/data/db",
        config,
    );
    unit.environment = env(&[
        ("MONGO_INITDB_ROOT_USERNAME", creds.username.as_str()),
        ("MONGO_INITDB_ROOT_PASSWORD", creds.password.as_str()),
        ("MONGO_INITDB_DATABASE", mongo.database.as_str()),
    ]);
    unit.healthcheck = Some(probe(vec![
        "CMD".into(),
        "mongosh".into(),
        "--quiet".into(),
        "--eval".into(),
        "db.adminCommand('ping')".into(),
    ]));
    unit
}

fn redis_image(repository: &str, requirement: &RedisRequirement) -> String {
    let version = requirement.config().and_then(|c| c.version.as_deref());
    let (name, tag) = match repository.rsplit_once(':') {
        Some((name, tag)) if !tag.contains('/') => (name, Some(tag)),
        _ => (repository, None),
    };
    let tag = version.or(tag).unwrap_or(DEFAULT_REDIS_TAG);
    format!("{name}:{tag}")
}

fn redis_unit(requirement: &RedisRequirement, config: &GrundConfig) -> ComposeService {
    let kind = InfraKind::Redis;
    let mut unit = base_unit(
        kind,
        redis_image(config.images.image_for(kind), requirement),
        "/data",
        config,
    );
    if let Some(max_memory) = requirement.config().and_then(|c| c.max_memory.as_ref()) {
        unit.command = Some(Command::Exec(vec![
            "redis-server".into(),
            "--maxmemory".into(),
            escape_interpolation(max_memory),
        ]));
    }
    unit.healthcheck = Some(probe(vec![
        "CMD".into(),
        "redis-cli".into(),
        "ping".into(),
    ]));
    unit
}

/// Builds the emulated cloud unit exposing `services`.
#[must_use]
pub fn localstack_unit(services: &[CloudService], config: &GrundConfig) -> ComposeService {
    let kind = InfraKind::Localstack;
    let names = services
        .iter()
        .map(|s| s.name())
        .collect::<Vec<_>>()
        .join(",");
    let mut unit = base_unit(
        kind,
        config.images.image_for(kind).to_owned(),
        "/var/lib/localstack",
        config,
    );
    unit.environment = env(&[
        (CLOUD_SERVICES_KEY, names.as_str()),
        ("AWS_DEFAULT_REGION", config.cloud.region.as_str()),
        ("PERSISTENCE", "1"),
    ]);
    unit.healthcheck = Some(Healthcheck {
        start_period: Some("10s".into()),
        ..probe(vec!["CMD-SHELL".into(), localstack_probe(services)])
    });
    unit
}

/// Shell probe that passes once every sub-service reports ready.
///
/// `$` is doubled so compose does not interpolate it.
fn localstack_probe(services: &[CloudService]) -> String {
    let mut script = format!(
        "health=$$(curl -s http://localhost:{}/_localstack/health)",
        InfraKind::Localstack.default_port()
    );
    for service in services {
        script.push_str(&format!(
            " && echo \"$$health\" | grep -Eq '\"{service}\": *\"(available|running)\"'"
        ));
    }
    script
}

/// Sub-services an existing emulated cloud unit was generated with.
#[must_use]
pub fn cloud_services_of(unit: &ComposeService) -> Vec<CloudService> {
    unit.environment
        .get(CLOUD_SERVICES_KEY)
        .map(|list| {
            list.split(',')
                .filter_map(|name| CloudService::from_name(name.trim()))
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use grund_common::types::{BucketConfig, QueueConfig, RedisConfig};

    use super::*;

    fn requirements() -> InfrastructureRequirements {
        InfrastructureRequirements {
            postgres: Some(PostgresConfig {
                database: "a_db".into(),
                ..PostgresConfig::default()
            }),
            redis: Some(RedisRequirement::Enabled),
            queues: vec![QueueConfig {
                name: "orders".into(),
                dlq: true,
                visibility_timeout: None,
            }],
            ..InfrastructureRequirements::default()
        }
    }

    #[test]
    fn one_unit_per_required_kind() {
        let reqs = requirements();
        let file = infrastructure_file(&reqs, &reqs.cloud_services(), &GrundConfig::default());
        let names: Vec<&str> = file.services.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["localstack", "postgres", "redis"]);
        assert!(file.volumes.contains_key("postgres-data"));
        assert!(file.networks.contains_key("grund"));
    }

    #[test]
    fn postgres_unit_is_configured_for_database() {
        let reqs = requirements();
        let file = infrastructure_file(&reqs, &[], &GrundConfig::default());
        let pg = &file.services["postgres"];
        assert_eq!(pg.environment["POSTGRES_DB"], "a_db");
        assert_eq!(pg.ports, vec!["5432:5432"]);
        assert_eq!(pg.volumes, vec!["postgres-data:/var/lib/postgresql/data"]);
        let test = &pg.healthcheck.as_ref().expect("healthcheck").test;
        assert!(test[1].contains("pg_isready"));
        assert!(!file.services.contains_key("localstack"));
    }

    #[test]
    fn credentials_with_dollar_signs_are_escaped() {
        let mut config = GrundConfig::default();
        config.credentials.username = "ad$min".into();
        config.credentials.password = "pa$s".into();
        let reqs = InfrastructureRequirements {
            mongodb: Some(MongoConfig {
                database: "docs".into(),
                seed: None,
            }),
            ..requirements()
        };
        let file = infrastructure_file(&reqs, &[], &config);

        let pg = &file.services["postgres"];
        assert_eq!(pg.environment["POSTGRES_USER"], "ad$$min");
        assert_eq!(pg.environment["POSTGRES_PASSWORD"], "pa$$s");
        let test = &pg.healthcheck.as_ref().expect("healthcheck").test;
        assert_eq!(test[1], "pg_isready -U ad$$min -d a_db");

        let mongo = &file.services["mongodb"];
        assert_eq!(mongo.environment["MONGO_INITDB_ROOT_PASSWORD"], "pa$$s");
    }

    #[test]
    fn redis_probe_is_ping() {
        let unit = redis_unit(&RedisRequirement::Enabled, &GrundConfig::default());
        assert_eq!(unit.image.as_deref(), Some("redis:7-alpine"));
        assert_eq!(
            unit.healthcheck.expect("healthcheck").test,
            vec!["CMD", "redis-cli", "ping"]
        );
        assert!(unit.command.is_none());
    }

    #[test]
    fn detailed_redis_sets_tag_and_memory() {
        let requirement = RedisRequirement::Detailed(RedisConfig {
            version: Some("6.2".into()),
            max_memory: Some("128mb".into()),
        });
        let unit = redis_unit(&requirement, &GrundConfig::default());
        assert_eq!(unit.image.as_deref(), Some("redis:6.2"));
        assert_eq!(
            unit.command,
            Some(Command::Exec(vec![
                "redis-server".into(),
                "--maxmemory".into(),
                "128mb".into()
            ]))
        );
    }

    #[test]
    fn redis_image_keeps_registry_port() {
        assert_eq!(
            redis_image("registry:5000/redis", &RedisRequirement::Enabled),
            "registry:5000/redis:7-alpine"
        );
        assert_eq!(
            redis_image("redis:7.2", &RedisRequirement::Enabled),
            "redis:7.2"
        );
    }

    #[test]
    fn localstack_probe_covers_each_sub_service() {
        let reqs = InfrastructureRequirements {
            queues: vec![QueueConfig {
                name: "q".into(),
                ..QueueConfig::default()
            }],
            buckets: vec![BucketConfig {
                name: "b".into(),
                seed: None,
            }],
            ..InfrastructureRequirements::default()
        };
        let unit = localstack_unit(&reqs.cloud_services(), &GrundConfig::default());
        assert_eq!(unit.environment[CLOUD_SERVICES_KEY], "sqs,s3");
        let probe = &unit.healthcheck.as_ref().expect("healthcheck").test[1];
        assert!(probe.contains("\"sqs\""), "got: {probe}");
        assert!(probe.contains("\"s3\""), "got: {probe}");
        assert!(!probe.contains("\"sns\""), "got: {probe}");
        assert_eq!(cloud_services_of(&unit), vec![CloudService::Sqs, CloudService::S3]);
    }

    #[test]
    fn empty_requirements_only_declare_network() {
        let file = infrastructure_file(
            &InfrastructureRequirements::default(),
            &[],
            &GrundConfig::default(),
        );
        assert!(file.services.is_empty());
        assert!(file.volumes.is_empty());
    }
}
