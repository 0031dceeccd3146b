//! Serde model of the compose documents Grund reads and writes.
//!
//! Only the keys Grund generates are typed. Any other key found in an
//! existing manifest, at the top level or on a unit, is kept in `extra` and
//! written back unchanged. Typed keys accept the short and long forms
//! compose accepts and are written back in long form.

use std::collections::BTreeMap;
use std::path::Path;

use grund_common::constants::GENERATED_MARKER;
use grund_common::error::{GrundError, Result};
use serde::{Deserialize, Serialize};

/// A multi-service compose document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeFile {
    /// Units by name.
    #[serde(default)]
    pub services: BTreeMap<String, ComposeService>,
    /// Named volumes.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, NamedVolume>,
    /// Networks.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub networks: BTreeMap<String, NetworkSpec>,
    /// Top-level keys Grund does not model, such as `version` or `x-*`.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl ComposeFile {
    /// Renders the document as YAML, preceded by the generated marker.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_yaml(&self) -> Result<String> {
        let body = serde_yaml::to_string(self)?;
        Ok(format!("{GENERATED_MARKER}\n{body}"))
    }

    /// Parses a document read from `path`.
    ///
    /// # Errors
    ///
    /// Returns [`GrundError::Manifest`] if the content is not a compose document.
    pub fn from_yaml(path: &Path, content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|source| GrundError::Manifest {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Unions `fresh` into `self`.
    ///
    /// A unit, volume, network, or top-level key present in both is
    /// replaced by the one from `fresh`; everything else in `self` is kept.
    pub fn merge(&mut self, fresh: Self) {
        self.services.extend(fresh.services);
        self.volumes.extend(fresh.volumes);
        self.networks.extend(fresh.networks);
        self.extra.extend(fresh.extra);
    }
}

/// One unit of a compose document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ComposeService {
    /// Image to run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Build from source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<ComposeBuild>,
    /// Command override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Command>,
    /// Published ports as `host:container`.
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "forms::ports"
    )]
    pub ports: Vec<String>,
    /// Environment variables.
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "forms::environment"
    )]
    pub environment: BTreeMap<String, String>,
    /// Volume mounts as `source:target`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    /// Attached networks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<String>,
    /// Readiness probe.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<Healthcheck>,
    /// Startup dependencies by unit name.
    #[serde(
        default,
        skip_serializing_if = "BTreeMap::is_empty",
        deserialize_with = "forms::depends_on"
    )]
    pub depends_on: BTreeMap<String, DependsOn>,
    /// Keys Grund does not model.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl ComposeService {
    /// Host ports this unit publishes.
    ///
    /// Entries that are not of the form `[ip:]host:container` are skipped.
    #[must_use]
    pub fn published_host_ports(&self) -> Vec<u16> {
        self.ports
            .iter()
            .filter_map(|mapping| {
                let mut parts = mapping.rsplitn(3, ':');
                let _container = parts.next()?;
                parts.next()?.parse().ok()
            })
            .collect()
    }
}

/// A command in exec form or as a single shell string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Command {
    /// Program and arguments.
    Exec(Vec<String>),
    /// Split by compose like a shell would.
    Shell(String),
}

/// Build settings of a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeBuild {
    /// Build context directory.
    pub context: String,
    /// Dockerfile inside the context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,
}

/// A compose healthcheck.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Healthcheck {
    /// Probe command, e.g. `["CMD", "redis-cli", "ping"]`.
    ///
    /// The string form is read as `["CMD-SHELL", string]`.
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        deserialize_with = "forms::probe_test"
    )]
    pub test: Vec<String>,
    /// Time between probes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<String>,
    /// Probe timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    /// Failures before unhealthy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    /// Grace period after start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_period: Option<String>,
    /// Keys Grund does not model, such as `disable`.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Condition a dependency must reach before the dependent starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// The dependency's healthcheck passes.
    ServiceHealthy,
    /// The dependency has started.
    #[default]
    ServiceStarted,
    /// The dependency ran to completion with exit code 0.
    ServiceCompletedSuccessfully,
}

/// A long-form `depends_on` entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependsOn {
    /// Required condition.
    #[serde(default)]
    pub condition: Condition,
}

/// A named volume declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamedVolume {
    /// Explicit volume name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Keys Grund does not model.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// A network declaration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Explicit network name, shared by every manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Keys Grund does not model.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Escapes `$` so compose passes the value through without interpolation.
#[must_use]
pub fn escape_interpolation(value: &str) -> String {
    value.replace('$', "$$")
}

/// Readers for the short forms compose accepts on typed keys.
mod forms {
    use std::collections::BTreeMap;

    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};
    use serde_yaml::Value;

    use super::DependsOn;

    /// Text of a scalar; `null` reads as empty, as does a bare `KEY` entry.
    fn scalar(value: Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null => Some(String::new()),
            _ => None,
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum EnvironmentForm {
        Map(BTreeMap<String, Value>),
        List(Vec<String>),
    }

    /// `KEY: value` map or `KEY=value` list.
    pub fn environment<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match EnvironmentForm::deserialize(deserializer)? {
            EnvironmentForm::Map(map) => map
                .into_iter()
                .map(|(key, value)| match scalar(value) {
                    Some(value) => Ok((key, value)),
                    None => Err(D::Error::custom(format!(
                        "environment variable {key} is not a scalar"
                    ))),
                })
                .collect(),
            EnvironmentForm::List(entries) => Ok(entries
                .into_iter()
                .map(|entry| match entry.split_once('=') {
                    Some((key, value)) => (key.to_owned(), value.to_owned()),
                    None => (entry, String::new()),
                })
                .collect()),
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PortForm {
        Long {
            target: u32,
            #[serde(default)]
            published: Option<Value>,
            #[serde(default)]
            host_ip: Option<String>,
        },
        Short(Value),
    }

    /// `"host:container"` strings, bare numbers, or long-form mappings.
    pub fn ports<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Vec::<PortForm>::deserialize(deserializer)?
            .into_iter()
            .map(|port| match port {
                PortForm::Long {
                    target,
                    published,
                    host_ip,
                } => {
                    let published = published.and_then(scalar).filter(|p| !p.is_empty());
                    Ok(match (host_ip, published) {
                        (Some(ip), Some(published)) => format!("{ip}:{published}:{target}"),
                        (None, Some(published)) => format!("{published}:{target}"),
                        (_, None) => target.to_string(),
                    })
                }
                PortForm::Short(value) => {
                    scalar(value).ok_or_else(|| D::Error::custom("port entry is not a scalar"))
                }
            })
            .collect()
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ProbeForm {
        Exec(Vec<String>),
        Shell(String),
    }

    /// Healthcheck `test` as a list or as a shell string.
    pub fn probe_test<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match ProbeForm::deserialize(deserializer)? {
            ProbeForm::Exec(test) => test,
            ProbeForm::Shell(command) => vec!["CMD-SHELL".to_owned(), command],
        })
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum DependsOnForm {
        Map(BTreeMap<String, DependsOn>),
        List(Vec<String>),
    }

    /// Long-form map or a list of unit names, which wait for `service_started`.
    pub fn depends_on<'de, D>(deserializer: D) -> Result<BTreeMap<String, DependsOn>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match DependsOnForm::deserialize(deserializer)? {
            DependsOnForm::Map(map) => map,
            DependsOnForm::List(names) => names
                .into_iter()
                .map(|name| (name, DependsOn::default()))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_starts_with_marker() {
        let yaml = ComposeFile::default().to_yaml().expect("yaml");
        assert!(yaml.starts_with(GENERATED_MARKER));
    }

    #[test]
    fn unknown_unit_keys_survive_a_round_trip() {
        let input = "services:\n  cache:\n    image: redis:7-alpine\n    restart: always\n";
        let file = ComposeFile::from_yaml(Path::new("x.yaml"), input).expect("parse");
        let cache = &file.services["cache"];
        assert_eq!(cache.image.as_deref(), Some("redis:7-alpine"));
        assert!(cache.extra.contains_key("restart"));

        let yaml = file.to_yaml().expect("yaml");
        assert!(yaml.contains("restart: always"), "got: {yaml}");
    }

    #[test]
    fn short_compose_forms_are_read() {
        let input = r#"
version: "3.8"
x-common:
  restart: always
services:
  jaeger:
    image: jaegertracing/all-in-one:1.57
    command: --collector.otlp.enabled=true
    environment:
      - COLLECTOR_OTLP_ENABLED=true
      - SPAN_STORAGE_TYPE
    ports:
      - 16686
      - "4317:4317"
      - target: 4318
        published: 14318
    healthcheck:
      test: wget -q --spider localhost:14269
    depends_on:
      - redis
"#;
        let file = ComposeFile::from_yaml(Path::new("x.yaml"), input).expect("parse");
        assert!(file.extra.contains_key("x-common"));
        assert!(file.extra.contains_key("version"));

        let jaeger = &file.services["jaeger"];
        assert_eq!(
            jaeger.command,
            Some(Command::Shell("--collector.otlp.enabled=true".into()))
        );
        assert_eq!(jaeger.environment["COLLECTOR_OTLP_ENABLED"], "true");
        assert_eq!(jaeger.environment["SPAN_STORAGE_TYPE"], "");
        assert_eq!(jaeger.ports, vec!["16686", "4317:4317", "14318:4318"]);
        assert_eq!(jaeger.published_host_ports(), vec![4317, 14318]);
        assert_eq!(
            jaeger.healthcheck.as_ref().expect("healthcheck").test,
            vec!["CMD-SHELL", "wget -q --spider localhost:14269"]
        );
        assert_eq!(
            jaeger.depends_on["redis"].condition,
            Condition::ServiceStarted
        );

        let yaml = file.to_yaml().expect("yaml");
        let again = ComposeFile::from_yaml(Path::new("x.yaml"), &yaml).expect("reparse");
        assert_eq!(again, file);
    }

    #[test]
    fn environment_map_values_may_be_numbers_or_booleans() {
        let input = "services:\n  a:\n    environment:\n      WORKERS: 4\n      DEBUG: false\n";
        let file = ComposeFile::from_yaml(Path::new("x.yaml"), input).expect("parse");
        let env = &file.services["a"].environment;
        assert_eq!(env["WORKERS"], "4");
        assert_eq!(env["DEBUG"], "false");
    }

    #[test]
    fn escape_interpolation_doubles_dollars() {
        assert_eq!(escape_interpolation("pa$s${x}"), "pa$$s$${x}");
        assert_eq!(escape_interpolation("plain"), "plain");
    }

    #[test]
    fn merge_replaces_same_named_units_and_keeps_others() {
        let mut existing = ComposeFile::default();
        let _ = existing.services.insert(
            "redis".into(),
            ComposeService {
                image: Some("redis:6".into()),
                ..ComposeService::default()
            },
        );
        let _ = existing.services.insert(
            "mongodb".into(),
            ComposeService {
                image: Some("mongo:7".into()),
                ..ComposeService::default()
            },
        );

        let mut fresh = ComposeFile::default();
        let _ = fresh.services.insert(
            "redis".into(),
            ComposeService {
                image: Some("redis:7-alpine".into()),
                ..ComposeService::default()
            },
        );

        existing.merge(fresh);
        assert_eq!(existing.services.len(), 2);
        assert_eq!(
            existing.services["redis"].image.as_deref(),
            Some("redis:7-alpine")
        );
        assert!(existing.services.contains_key("mongodb"));
    }

    #[test]
    fn published_host_ports_parses_mappings() {
        let unit = ComposeService {
            ports: vec![
                "8080:80".into(),
                "127.0.0.1:9000:9000".into(),
                "3000".into(),
            ],
            ..ComposeService::default()
        };
        assert_eq!(unit.published_host_ports(), vec![8080, 9000]);
    }

    #[test]
    fn malformed_manifest_names_path() {
        let err = ComposeFile::from_yaml(Path::new("/tmp/bad.yaml"), "services: [1, 2").unwrap_err();
        assert!(err.to_string().contains("/tmp/bad.yaml"));
    }
}
