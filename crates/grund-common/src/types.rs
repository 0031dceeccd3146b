//! Declaration types consumed by the generation engine.
//!
//! A [`Service`] is what one service declares about itself; its
//! [`InfrastructureRequirements`] are what the aggregator merges across
//! services. These types are deserialized from YAML but never validated here.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Infrastructure kinds that run as a single shared container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InfraKind {
    /// Relational database.
    Postgres,
    /// Document store.
    Mongodb,
    /// Cache.
    Redis,
    /// Emulated cloud endpoint serving queues, topics, and buckets.
    Localstack,
}

impl InfraKind {
    /// Every kind, in the order units are emitted.
    pub const ALL: [Self; 4] = [Self::Postgres, Self::Mongodb, Self::Redis, Self::Localstack];

    /// Canonical name: the compose unit name and the placeholder namespace.
    #[must_use]
    pub const fn canonical_name(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mongodb => "mongodb",
            Self::Redis => "redis",
            Self::Localstack => "localstack",
        }
    }

    /// Looks up a kind by its canonical name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.canonical_name() == name)
    }

    /// Port the kind listens on inside the network and publishes on the host.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Postgres => 5432,
            Self::Mongodb => 27017,
            Self::Redis => 6379,
            Self::Localstack => 4566,
        }
    }
}

impl fmt::Display for InfraKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

/// Sub-services of the emulated cloud endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudService {
    /// Queues.
    Sqs,
    /// Topics.
    Sns,
    /// Buckets.
    S3,
}

impl CloudService {
    /// Every sub-service.
    pub const ALL: [Self; 3] = [Self::Sqs, Self::Sns, Self::S3];

    /// Name used both as placeholder namespace and in the emulator's service list.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Sqs => "sqs",
            Self::Sns => "sns",
            Self::S3 => "s3",
        }
    }

    /// Looks up a sub-service by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }
}

impl fmt::Display for CloudService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared relational database.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgresConfig {
    /// Database name.
    pub database: String,
    /// Directory of migration scripts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrations: Option<PathBuf>,
    /// Seed data file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<PathBuf>,
}

/// Shared document store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MongoConfig {
    /// Database name.
    pub database: String,
    /// Seed data file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<PathBuf>,
}

/// Detailed cache settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Image tag, e.g. `7-alpine`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Memory cap passed to `--maxmemory`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_memory: Option<String>,
}

/// A cache requirement: either a plain flag or detailed settings.
///
/// In YAML this is written as `redis: true` or as a mapping; `redis: false`
/// means no cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedisRequirement {
    /// Cache with default settings.
    Enabled,
    /// Cache with explicit settings.
    Detailed(RedisConfig),
}

impl RedisRequirement {
    /// Returns the detailed settings, if any.
    #[must_use]
    pub const fn config(&self) -> Option<&RedisConfig> {
        match self {
            Self::Enabled => None,
            Self::Detailed(config) => Some(config),
        }
    }
}

impl Serialize for RedisRequirement {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Enabled => serializer.serialize_bool(true),
            Self::Detailed(config) => config.serialize(serializer),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RedisRepr {
    Flag(bool),
    Detailed(RedisConfig),
}

fn deserialize_redis<'de, D>(deserializer: D) -> Result<Option<RedisRequirement>, D::Error>
where
    D: Deserializer<'de>,
{
    let repr = Option::<RedisRepr>::deserialize(deserializer)?;
    Ok(match repr {
        None | Some(RedisRepr::Flag(false)) => None,
        Some(RedisRepr::Flag(true)) => Some(RedisRequirement::Enabled),
        Some(RedisRepr::Detailed(config)) => Some(RedisRequirement::Detailed(config)),
    })
}

/// Tunnel providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TunnelProvider {
    /// Cloudflare quick tunnels.
    Cloudflared,
    /// ngrok.
    Ngrok,
}

/// Which tunnel provider exposes the tunnel targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// Provider choice.
    pub provider: TunnelProvider,
}

/// A named queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Queue name.
    pub name: String,
    /// Whether a `<name>-dlq` dead-letter companion is created.
    #[serde(default)]
    pub dlq: bool,
    /// Visibility timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility_timeout: Option<u32>,
}

/// A queue subscribed to a topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Name of the subscribed queue.
    pub queue: String,
    /// Deliver raw messages without the notification envelope.
    #[serde(default)]
    pub raw_delivery: bool,
}

/// A named topic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicConfig {
    /// Topic name.
    pub name: String,
    /// Queues subscribed to the topic.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subscriptions: Vec<SubscriptionConfig>,
}

/// A named bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketConfig {
    /// Bucket name.
    pub name: String,
    /// Directory uploaded into the bucket after creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<PathBuf>,
}

/// A named endpoint exposed through a public tunnel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelTarget {
    /// Tunnel name, used as `${tunnel.<name>.url}`.
    pub name: String,
    /// Host the tunnel forwards to; defaults to the declaring service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Port the tunnel forwards to.
    pub port: u16,
}

/// Infrastructure one service declares, or the merge of several services.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InfrastructureRequirements {
    /// Shared relational database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postgres: Option<PostgresConfig>,
    /// Shared document store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mongodb: Option<MongoConfig>,
    /// Shared cache.
    #[serde(
        default,
        deserialize_with = "deserialize_redis",
        skip_serializing_if = "Option::is_none"
    )]
    pub redis: Option<RedisRequirement>,
    /// Tunnel provider choice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnel: Option<TunnelConfig>,
    /// Named queues.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queues: Vec<QueueConfig>,
    /// Named topics.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<TopicConfig>,
    /// Named buckets.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buckets: Vec<BucketConfig>,
    /// Named tunnel targets.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tunnels: Vec<TunnelTarget>,
}

impl InfrastructureRequirements {
    /// Returns `true` if nothing that runs as a container is required.
    ///
    /// Tunnel settings alone do not need a shared infrastructure unit.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds().is_empty()
    }

    /// Emulated-cloud sub-services these requirements use, in canonical order.
    #[must_use]
    pub fn cloud_services(&self) -> Vec<CloudService> {
        let mut services = Vec::new();
        if !self.queues.is_empty() {
            services.push(CloudService::Sqs);
        }
        if !self.topics.is_empty() {
            services.push(CloudService::Sns);
        }
        if !self.buckets.is_empty() {
            services.push(CloudService::S3);
        }
        services
    }

    /// Shared infrastructure kinds these requirements need, in canonical order.
    #[must_use]
    pub fn kinds(&self) -> Vec<InfraKind> {
        InfraKind::ALL
            .into_iter()
            .filter(|kind| match kind {
                InfraKind::Postgres => self.postgres.is_some(),
                InfraKind::Mongodb => self.mongodb.is_some(),
                InfraKind::Redis => self.redis.is_some(),
                InfraKind::Localstack => !self.cloud_services().is_empty(),
            })
            .collect()
    }
}

/// How to build a service image from source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSpec {
    /// Build context, relative to the service directory.
    #[serde(default = "default_build_context")]
    pub context: PathBuf,
    /// Dockerfile path inside the context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,
}

impl Default for BuildSpec {
    fn default() -> Self {
        Self {
            context: default_build_context(),
            dockerfile: None,
        }
    }
}

fn default_build_context() -> PathBuf {
    PathBuf::from(".")
}

/// HTTP readiness endpoint and probe cadence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Path probed on the service port, e.g. `/health`.
    pub endpoint: String,
    /// Time between probes.
    #[serde(default = "default_interval")]
    pub interval: String,
    /// Time a single probe may take.
    #[serde(default = "default_timeout")]
    pub timeout: String,
    /// Consecutive failures before the unit is unhealthy.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Grace period after start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_period: Option<String>,
}

fn default_interval() -> String {
    "5s".into()
}

fn default_timeout() -> String {
    "3s".into()
}

const fn default_retries() -> u32 {
    10
}

/// What a service depends on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependencies {
    /// Sibling services.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
    /// Shared infrastructure.
    #[serde(default)]
    pub infrastructure: InfrastructureRequirements,
}

/// A secret the service expects in its environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRequirement {
    /// Environment variable name, also the lookup key.
    pub name: String,
    /// Whether generation fails when no value is found.
    #[serde(default = "default_required")]
    pub required: bool,
    /// Human-readable hint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

const fn default_required() -> bool {
    true
}

/// One service's declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    /// Service name: compose unit name and placeholder namespace.
    pub name: String,
    /// Port the service listens on inside its container.
    pub port: u16,
    /// Build from source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<BuildSpec>,
    /// Prebuilt image, used when no build is declared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Readiness probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthCheck>,
    /// Declared dependencies.
    #[serde(default)]
    pub depends_on: Dependencies,
    /// Literal environment variables.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Environment variables whose values contain `${...}` placeholders.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env_refs: BTreeMap<String, String>,
    /// Secrets injected at generation time.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<SecretRequirement>,
    /// Directory holding the declaration; build contexts are relative to it.
    #[serde(skip)]
    pub root: PathBuf,
}

impl Service {
    /// Creates a service with a name and port and nothing else declared.
    #[must_use]
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
            ..Self::default()
        }
    }

    /// Infrastructure declared by this service.
    #[must_use]
    pub const fn requirements(&self) -> &InfrastructureRequirements {
        &self.depends_on.infrastructure
    }
}
