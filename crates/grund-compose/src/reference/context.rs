//! The resolution context: everything a placeholder may refer to.
//!
//! A context is built once per generation pass from the aggregated
//! requirements and the selected services, then re-scoped per service by
//! setting [`ResolutionContext::self_service`].

use std::collections::BTreeMap;

use grund_common::config::{CloudDefaults, GrundConfig};
use grund_common::constants::DLQ_SUFFIX;
use grund_common::types::{InfraKind, InfrastructureRequirements, Service};

/// Connection details of a shared infrastructure unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfraEndpoint {
    /// Host name on the compose network.
    pub host: String,
    /// Port on the compose network.
    pub port: u16,
    /// Database name, for kinds that have one.
    pub database: Option<String>,
    /// Username; the resolver falls back to a default when unset.
    pub username: Option<String>,
    /// Password; the resolver falls back to a default when unset.
    pub password: Option<String>,
}

impl InfraEndpoint {
    /// Endpoint at the kind's canonical host and default port.
    #[must_use]
    pub fn for_kind(kind: InfraKind) -> Self {
        Self {
            host: kind.canonical_name().to_owned(),
            port: kind.default_port(),
            database: None,
            username: None,
            password: None,
        }
    }
}

/// A service as seen by the services that reference it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceEndpoint {
    /// Host name on the compose network.
    pub host: String,
    /// Container port.
    pub port: u16,
    /// Free-form values addressable as `${<service>.<dotted.key>}`.
    pub config: BTreeMap<String, String>,
}

impl ServiceEndpoint {
    /// Builds the endpoint of a declared service.
    ///
    /// The config holds the service's literal environment plus the names of
    /// its private databases under `postgres.database` and `mongodb.database`.
    #[must_use]
    pub fn from_service(service: &Service) -> Self {
        let mut config = service.env.clone();
        let reqs = service.requirements();
        if let Some(pg) = &reqs.postgres {
            let _ = config.insert("postgres.database".into(), pg.database.clone());
        }
        if let Some(mongo) = &reqs.mongodb {
            let _ = config.insert("mongodb.database".into(), mongo.database.clone());
        }
        Self {
            host: service.name.clone(),
            port: service.port,
            config,
        }
    }
}

/// A queue's addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDescriptor {
    /// Queue name.
    pub name: String,
    /// Queue URL.
    pub url: String,
    /// Queue ARN.
    pub arn: String,
    /// URL of the dead-letter companion, if one is created.
    pub dlq_url: Option<String>,
}

/// A topic's addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicDescriptor {
    /// Topic name.
    pub name: String,
    /// Topic ARN.
    pub arn: String,
}

/// A bucket's addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketDescriptor {
    /// Bucket name.
    pub name: String,
    /// Bucket ARN.
    pub arn: String,
    /// Path-style bucket URL.
    pub url: String,
}

/// A tunnel with a known public URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelDescriptor {
    /// Tunnel name.
    pub name: String,
    /// Public URL assigned by the provider.
    pub url: String,
}

/// The emulated cloud endpoint and the builders for resource addresses.
///
/// Registered and convention-derived resources both go through these
/// builders, so their URLs and ARNs always agree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudEndpoint {
    /// Endpoint URL.
    pub endpoint: String,
    /// Region.
    pub region: String,
    /// Account id.
    pub account_id: String,
    /// Access key id.
    pub access_key_id: String,
    /// Secret access key.
    pub secret_access_key: String,
}

impl From<&CloudDefaults> for CloudEndpoint {
    fn from(defaults: &CloudDefaults) -> Self {
        Self {
            endpoint: defaults.endpoint.trim_end_matches('/').to_owned(),
            region: defaults.region.clone(),
            account_id: defaults.account_id.clone(),
            access_key_id: defaults.access_key_id.clone(),
            secret_access_key: defaults.secret_access_key.clone(),
        }
    }
}

impl Default for CloudEndpoint {
    fn default() -> Self {
        Self::from(&CloudDefaults::default())
    }
}

impl CloudEndpoint {
    /// The endpoint with its URL scheme stripped.
    #[must_use]
    pub fn host(&self) -> &str {
        self.endpoint
            .split_once("://")
            .map_or(self.endpoint.as_str(), |(_, rest)| rest)
    }

    /// The port from the endpoint URL, or the emulator's default port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.host()
            .rsplit_once(':')
            .and_then(|(_, port)| port.parse().ok())
            .unwrap_or_else(|| InfraKind::Localstack.default_port())
    }

    /// Addresses of a queue and, when `dlq` is set, of its dead-letter companion.
    #[must_use]
    pub fn queue(&self, name: &str, dlq: bool) -> QueueDescriptor {
        QueueDescriptor {
            name: name.to_owned(),
            url: self.queue_url(name),
            arn: self.arn("sqs", name),
            dlq_url: dlq.then(|| self.queue_url(&format!("{name}{DLQ_SUFFIX}"))),
        }
    }

    /// Addresses of a topic.
    #[must_use]
    pub fn topic(&self, name: &str) -> TopicDescriptor {
        TopicDescriptor {
            name: name.to_owned(),
            arn: self.arn("sns", name),
        }
    }

    /// Addresses of a bucket.
    #[must_use]
    pub fn bucket(&self, name: &str) -> BucketDescriptor {
        BucketDescriptor {
            name: name.to_owned(),
            arn: format!("arn:aws:s3:::{name}"),
            url: format!("{}/{name}", self.endpoint),
        }
    }

    fn queue_url(&self, name: &str) -> String {
        format!("{}/{}/{name}", self.endpoint, self.account_id)
    }

    fn arn(&self, service: &str, name: &str) -> String {
        format!(
            "arn:aws:{service}:{}:{}:{name}",
            self.region, self.account_id
        )
    }
}

/// Snapshot of every resolvable value for one generation pass.
#[derive(Debug, Clone, Default)]
pub struct ResolutionContext {
    /// Shared databases and cache, by kind.
    pub infrastructure: BTreeMap<InfraKind, InfraEndpoint>,
    /// Emulated cloud endpoint.
    pub cloud: CloudEndpoint,
    /// Registered queues by name.
    pub queues: BTreeMap<String, QueueDescriptor>,
    /// Registered topics by name.
    pub topics: BTreeMap<String, TopicDescriptor>,
    /// Registered buckets by name.
    pub buckets: BTreeMap<String, BucketDescriptor>,
    /// Sibling services by name.
    pub services: BTreeMap<String, ServiceEndpoint>,
    /// The service currently being resolved.
    pub self_service: Option<ServiceEndpoint>,
    /// Tunnels with known public URLs, by name.
    pub tunnels: BTreeMap<String, TunnelDescriptor>,
}

impl ResolutionContext {
    /// Builds the context for one pass.
    ///
    /// `tunnel_urls` maps tunnel names to the public URLs the tunnel
    /// subsystem reported; tunnels without a URL are not resolvable.
    #[must_use]
    pub fn build(
        config: &GrundConfig,
        requirements: &InfrastructureRequirements,
        services: &[Service],
        tunnel_urls: &BTreeMap<String, String>,
    ) -> Self {
        let cloud = CloudEndpoint::from(&config.cloud);
        let mut ctx = Self {
            cloud,
            ..Self::default()
        };

        let credentials = &config.credentials;
        if let Some(pg) = &requirements.postgres {
            let _ = ctx.infrastructure.insert(
                InfraKind::Postgres,
                InfraEndpoint {
                    database: Some(pg.database.clone()),
                    username: Some(credentials.username.clone()),
                    password: Some(credentials.password.clone()),
                    ..InfraEndpoint::for_kind(InfraKind::Postgres)
                },
            );
        }
        if let Some(mongo) = &requirements.mongodb {
            let _ = ctx.infrastructure.insert(
                InfraKind::Mongodb,
                InfraEndpoint {
                    database: Some(mongo.database.clone()),
                    username: Some(credentials.username.clone()),
                    password: Some(credentials.password.clone()),
                    ..InfraEndpoint::for_kind(InfraKind::Mongodb)
                },
            );
        }
        if requirements.redis.is_some() {
            let _ = ctx
                .infrastructure
                .insert(InfraKind::Redis, InfraEndpoint::for_kind(InfraKind::Redis));
        }

        for queue in &requirements.queues {
            let descriptor = ctx.cloud.queue(&queue.name, queue.dlq);
            let _ = ctx.queues.insert(queue.name.clone(), descriptor);
        }
        for topic in &requirements.topics {
            let descriptor = ctx.cloud.topic(&topic.name);
            let _ = ctx.topics.insert(topic.name.clone(), descriptor);
        }
        for bucket in &requirements.buckets {
            let descriptor = ctx.cloud.bucket(&bucket.name);
            let _ = ctx.buckets.insert(bucket.name.clone(), descriptor);
        }

        for service in services {
            let _ = ctx
                .services
                .insert(service.name.clone(), ServiceEndpoint::from_service(service));
        }

        for (name, url) in tunnel_urls {
            let _ = ctx.tunnels.insert(
                name.clone(),
                TunnelDescriptor {
                    name: name.clone(),
                    url: url.clone(),
                },
            );
        }

        tracing::debug!(
            infrastructure = ctx.infrastructure.len(),
            queues = ctx.queues.len(),
            topics = ctx.topics.len(),
            buckets = ctx.buckets.len(),
            services = ctx.services.len(),
            "built resolution context"
        );
        ctx
    }

    /// Scopes the context to one service for `${self...}` lookups.
    pub fn enter(&mut self, service: &Service) {
        self.self_service = Some(ServiceEndpoint::from_service(service));
    }
}

#[cfg(test)]
mod tests {
    use grund_common::types::{PostgresConfig, QueueConfig};

    use super::*;

    #[test]
    fn cloud_host_strips_scheme() {
        let cloud = CloudEndpoint::default();
        assert_eq!(cloud.host(), "localstack:4566");
        assert_eq!(cloud.port(), 4566);
    }

    #[test]
    fn cloud_port_defaults_without_explicit_port() {
        let cloud = CloudEndpoint {
            endpoint: "https://cloud.internal".into(),
            ..CloudEndpoint::default()
        };
        assert_eq!(cloud.host(), "cloud.internal");
        assert_eq!(cloud.port(), 4566);
    }

    #[test]
    fn queue_addresses_use_account_and_region() {
        let queue = CloudEndpoint::default().queue("orders", true);
        assert_eq!(queue.url, "http://localstack:4566/000000000000/orders");
        assert_eq!(queue.arn, "arn:aws:sqs:us-east-1:000000000000:orders");
        assert_eq!(
            queue.dlq_url.as_deref(),
            Some("http://localstack:4566/000000000000/orders-dlq")
        );
    }

    #[test]
    fn bucket_and_topic_addresses() {
        let cloud = CloudEndpoint::default();
        assert_eq!(cloud.bucket("assets").arn, "arn:aws:s3:::assets");
        assert_eq!(cloud.bucket("assets").url, "http://localstack:4566/assets");
        assert_eq!(
            cloud.topic("events").arn,
            "arn:aws:sns:us-east-1:000000000000:events"
        );
    }

    #[test]
    fn build_registers_infrastructure_and_resources() {
        let reqs = InfrastructureRequirements {
            postgres: Some(PostgresConfig {
                database: "shop".into(),
                ..PostgresConfig::default()
            }),
            queues: vec![QueueConfig {
                name: "orders".into(),
                dlq: false,
                visibility_timeout: None,
            }],
            ..InfrastructureRequirements::default()
        };
        let services = vec![Service::new("api", 8080)];
        let ctx = ResolutionContext::build(
            &GrundConfig::default(),
            &reqs,
            &services,
            &BTreeMap::new(),
        );

        let pg = ctx.infrastructure.get(&InfraKind::Postgres).expect("postgres");
        assert_eq!(pg.host, "postgres");
        assert_eq!(pg.port, 5432);
        assert_eq!(pg.database.as_deref(), Some("shop"));
        assert!(ctx.queues["orders"].dlq_url.is_none());
        assert_eq!(ctx.services["api"].port, 8080);
        assert!(ctx.self_service.is_none());
    }

    #[test]
    fn service_endpoint_exposes_private_database() {
        let mut svc = Service::new("billing", 9000);
        svc.depends_on.infrastructure.postgres = Some(PostgresConfig {
            database: "billing_db".into(),
            ..PostgresConfig::default()
        });
        let _ = svc.env.insert("FEATURE".into(), "on".into());

        let endpoint = ServiceEndpoint::from_service(&svc);
        assert_eq!(endpoint.config["postgres.database"], "billing_db");
        assert_eq!(endpoint.config["FEATURE"], "on");
        assert_eq!(endpoint.host, "billing");
    }
}
