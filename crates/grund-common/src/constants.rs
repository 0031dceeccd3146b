//! System-wide constants and default paths.

use std::path::PathBuf;

/// Application name used in manifest markers and temp paths.
pub const APP_NAME: &str = "grund";

/// File name of the manifest inside each unit directory.
pub const MANIFEST_FILE_NAME: &str = "docker-compose.yaml";

/// Directory reserved for the shared infrastructure unit.
pub const INFRASTRUCTURE_UNIT: &str = "infrastructure";

/// Lock file guarding the shared infrastructure manifest.
pub const LOCK_FILE_NAME: &str = ".grund.lock";

/// Header written at the top of every generated manifest.
pub const GENERATED_MARKER: &str =
    "# Generated by grund. Do not edit by hand: changes are overwritten on the next run.";

/// Network every generated unit attaches to.
pub const DEFAULT_NETWORK: &str = "grund";

/// Default project name when none is configured.
pub const DEFAULT_PROJECT: &str = "default";

/// Database username used when a declaration does not set one.
pub const DEFAULT_DB_USERNAME: &str = "grund";

/// Database password used when a declaration does not set one.
pub const DEFAULT_DB_PASSWORD: &str = "grund";

/// Endpoint of the emulated cloud as seen from inside the compose network.
pub const DEFAULT_CLOUD_ENDPOINT: &str = "http://localstack:4566";

/// Region reported by the emulated cloud.
pub const DEFAULT_CLOUD_REGION: &str = "us-east-1";

/// Account id the emulated cloud uses in URLs and ARNs.
pub const DEFAULT_CLOUD_ACCOUNT_ID: &str = "000000000000";

/// Access key accepted by the emulated cloud.
pub const DEFAULT_CLOUD_ACCESS_KEY_ID: &str = "test";

/// Secret key accepted by the emulated cloud.
pub const DEFAULT_CLOUD_SECRET_ACCESS_KEY: &str = "test";

/// Suffix appended to a queue name to form its dead-letter companion.
pub const DLQ_SUFFIX: &str = "-dlq";

/// Maximum number of candidates the port allocator examines after a collision.
pub const MAX_PORT_PROBES: u32 = 1000;

/// Ports of common external systems that generated services must never take.
pub const WELL_KNOWN_PORTS: &[(u16, &str)] = &[
    (2181, "zookeeper"),
    (3000, "grafana"),
    (3306, "mysql"),
    (4222, "nats"),
    (4317, "otlp-grpc"),
    (4318, "otlp-http"),
    (4566, "localstack"),
    (5432, "postgres"),
    (5672, "rabbitmq"),
    (6379, "redis"),
    (8500, "consul"),
    (9000, "minio"),
    (9090, "prometheus"),
    (9092, "kafka"),
    (9200, "elasticsearch"),
    (11211, "memcached"),
    (15672, "rabbitmq-management"),
    (16686, "jaeger"),
    (27017, "mongodb"),
];

/// Returns the default manifest root for a project: `<tmp>/grund/<project>`.
pub fn default_manifest_root(project: &str) -> PathBuf {
    std::env::temp_dir().join(APP_NAME).join(project)
}
