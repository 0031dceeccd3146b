//! Resolution of `${namespace.path}` placeholders in environment values.
//!
//! The first path segment selects where a value comes from:
//!
//! | Namespace | Properties |
//! |-----------|------------|
//! | `postgres`, `mongodb`, `redis` | `host`, `port`, `database`, `username`, `password` |
//! | `localstack` | `endpoint`, `host`, `port`, `region`, `account_id`, `access_key_id`, `secret_access_key` |
//! | `sqs.<queue>` | `url`, `arn`, `name`, `dlq` |
//! | `sns.<topic>` | `arn`, `name` |
//! | `s3.<bucket>` | `name`, `arn`, `url` |
//! | `self` | `host`, `port`, `url`, any dotted config key |
//! | `tunnel.<name>` | `url`, `name` |
//! | any other name | a sibling service: `host`, `port`, `url`, any dotted config key |
//!
//! Queues, topics, and buckets that no service registered still resolve:
//! their addresses are derived from the name and the cloud defaults.

pub mod context;
pub mod lexer;

use std::borrow::Cow;
use std::collections::BTreeMap;

use grund_common::constants::{DEFAULT_DB_PASSWORD, DEFAULT_DB_USERNAME};
use grund_common::error::{GrundError, Result};
use grund_common::types::{CloudService, InfraKind};

use self::context::{CloudEndpoint, InfraEndpoint, ResolutionContext, ServiceEndpoint};
use self::lexer::{Reference, Segment};

/// Resolves every value of `references` against `ctx`.
///
/// Fails on the first value that cannot be fully resolved; nothing is
/// returned for the other keys in that case.
///
/// # Errors
///
/// Returns [`GrundError::UnresolvedReference`] naming the key and the
/// placeholder, or [`GrundError::MalformedReference`] for invalid syntax.
pub fn resolve(
    references: &BTreeMap<String, String>,
    ctx: &ResolutionContext,
) -> Result<BTreeMap<String, String>> {
    references
        .iter()
        .map(|(key, template)| Ok((key.clone(), resolve_value(key, template, ctx)?)))
        .collect()
}

/// Resolves a single template value.
///
/// # Errors
///
/// See [`resolve`].
pub fn resolve_value(key: &str, template: &str, ctx: &ResolutionContext) -> Result<String> {
    let segments = lexer::parse_template(key, template)?;
    let mut out = String::with_capacity(template.len());
    for segment in segments {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Reference(reference) => {
                let value = lookup(ctx, &reference).ok_or_else(|| {
                    GrundError::UnresolvedReference {
                        key: key.to_owned(),
                        reference: reference.to_string(),
                    }
                })?;
                tracing::trace!(key, reference = %reference, "resolved placeholder");
                out.push_str(&value);
            }
        }
    }
    Ok(out)
}

fn lookup(ctx: &ResolutionContext, reference: &Reference) -> Option<String> {
    let (namespace, path) = reference.path.split_first()?;
    match namespace.as_str() {
        "self" => ctx
            .self_service
            .as_ref()
            .and_then(|svc| service_property(svc, path)),
        "tunnel" => tunnel_property(ctx, path),
        "localstack" => cloud_property(&ctx.cloud, path),
        other => {
            if let Some(kind) = InfraKind::from_name(other) {
                ctx.infrastructure
                    .get(&kind)
                    .and_then(|endpoint| infra_property(endpoint, path))
            } else if let Some(service) = CloudService::from_name(other) {
                resource_property(ctx, service, path)
            } else {
                ctx.services
                    .get(other)
                    .and_then(|svc| service_property(svc, path))
            }
        }
    }
}

fn infra_property(endpoint: &InfraEndpoint, path: &[String]) -> Option<String> {
    let [property] = path else {
        return None;
    };
    match property.as_str() {
        "host" => Some(endpoint.host.clone()),
        "port" => Some(endpoint.port.to_string()),
        "database" => endpoint.database.clone(),
        "username" => Some(
            endpoint
                .username
                .clone()
                .unwrap_or_else(|| DEFAULT_DB_USERNAME.to_owned()),
        ),
        "password" => Some(
            endpoint
                .password
                .clone()
                .unwrap_or_else(|| DEFAULT_DB_PASSWORD.to_owned()),
        ),
        _ => None,
    }
}

fn cloud_property(cloud: &CloudEndpoint, path: &[String]) -> Option<String> {
    let [property] = path else {
        return None;
    };
    match property.as_str() {
        "endpoint" => Some(cloud.endpoint.clone()),
        "host" => Some(cloud.host().to_owned()),
        "port" => Some(cloud.port().to_string()),
        "region" => Some(cloud.region.clone()),
        "account_id" => Some(cloud.account_id.clone()),
        "access_key_id" => Some(cloud.access_key_id.clone()),
        "secret_access_key" => Some(cloud.secret_access_key.clone()),
        _ => None,
    }
}

fn resource_property(
    ctx: &ResolutionContext,
    service: CloudService,
    path: &[String],
) -> Option<String> {
    let [name, property] = path else {
        return None;
    };
    let name = name.as_str();
    match service {
        CloudService::Sqs => {
            let queue = ctx.queues.get(name).map_or_else(
                || {
                    tracing::debug!(queue = name, "queue not registered, deriving by convention");
                    Cow::Owned(ctx.cloud.queue(name, true))
                },
                Cow::Borrowed,
            );
            match property.as_str() {
                "url" => Some(queue.url.clone()),
                "arn" => Some(queue.arn.clone()),
                "name" => Some(queue.name.clone()),
                "dlq" => queue.dlq_url.clone(),
                _ => None,
            }
        }
        CloudService::Sns => {
            let topic = ctx.topics.get(name).map_or_else(
                || {
                    tracing::debug!(topic = name, "topic not registered, deriving by convention");
                    Cow::Owned(ctx.cloud.topic(name))
                },
                Cow::Borrowed,
            );
            match property.as_str() {
                "arn" => Some(topic.arn.clone()),
                "name" => Some(topic.name.clone()),
                _ => None,
            }
        }
        CloudService::S3 => {
            let bucket = ctx.buckets.get(name).map_or_else(
                || {
                    tracing::debug!(bucket = name, "bucket not registered, deriving by convention");
                    Cow::Owned(ctx.cloud.bucket(name))
                },
                Cow::Borrowed,
            );
            match property.as_str() {
                "name" => Some(bucket.name.clone()),
                "arn" => Some(bucket.arn.clone()),
                "url" => Some(bucket.url.clone()),
                _ => None,
            }
        }
    }
}

fn service_property(service: &ServiceEndpoint, path: &[String]) -> Option<String> {
    match path {
        [] => None,
        [property] if property == "host" => Some(service.host.clone()),
        [property] if property == "port" => Some(service.port.to_string()),
        [property] if property == "url" => Some(format!("http://{}:{}", service.host, service.port)),
        _ => service.config.get(&path.join(".")).cloned(),
    }
}

fn tunnel_property(ctx: &ResolutionContext, path: &[String]) -> Option<String> {
    let [name, property] = path else {
        return None;
    };
    let tunnel = ctx.tunnels.get(name)?;
    match property.as_str() {
        "url" => Some(tunnel.url.clone()),
        "name" => Some(tunnel.name.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::context::{QueueDescriptor, TunnelDescriptor};
    use super::*;

    fn refs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn context() -> ResolutionContext {
        let mut ctx = ResolutionContext::default();
        let _ = ctx.infrastructure.insert(
            InfraKind::Postgres,
            InfraEndpoint {
                host: "postgres".into(),
                port: 5432,
                database: None,
                username: None,
                password: None,
            },
        );
        let mut self_config = BTreeMap::new();
        let _ = self_config.insert("postgres.database".into(), "svc_db".into());
        ctx.self_service = Some(ServiceEndpoint {
            host: "svc".into(),
            port: 8080,
            config: self_config,
        });
        let mut payments_config = BTreeMap::new();
        let _ = payments_config.insert("API_VERSION".into(), "v2".into());
        let _ = ctx.services.insert(
            "payments".into(),
            ServiceEndpoint {
                host: "payments".into(),
                port: 9000,
                config: payments_config,
            },
        );
        ctx
    }

    #[test]
    fn database_url_combines_infra_and_self() {
        let resolved = resolve(
            &refs(&[(
                "URL",
                "${postgres.host}:${postgres.port}/${self.postgres.database}",
            )]),
            &context(),
        )
        .expect("resolve");
        assert_eq!(resolved["URL"], "postgres:5432/svc_db");
    }

    #[test]
    fn literal_value_resolves_to_itself() {
        let resolved = resolve(&refs(&[("MODE", "production")]), &context()).expect("resolve");
        assert_eq!(resolved["MODE"], "production");
    }

    #[test]
    fn unknown_namespace_names_reference_and_key() {
        let err = resolve(&refs(&[("X", "${nowhere.y}")]), &context()).unwrap_err();
        assert!(
            matches!(
                &err,
                GrundError::UnresolvedReference { key, reference }
                    if key == "X" && reference == "nowhere.y"
            ),
            "got: {err}"
        );
        assert!(err.to_string().contains("nowhere.y"));
    }

    #[test]
    fn one_bad_key_fails_the_whole_map() {
        let result = resolve(
            &refs(&[("A", "${postgres.host}"), ("B", "${postgres.bogus}")]),
            &context(),
        );
        assert!(matches!(
            result,
            Err(GrundError::UnresolvedReference { ref key, .. }) if key == "B"
        ));
    }

    #[test]
    fn credentials_fall_back_to_defaults() {
        let resolved = resolve(
            &refs(&[("U", "${postgres.username}"), ("P", "${postgres.password}")]),
            &context(),
        )
        .expect("resolve");
        assert_eq!(resolved["U"], DEFAULT_DB_USERNAME);
        assert_eq!(resolved["P"], DEFAULT_DB_PASSWORD);
    }

    #[test]
    fn missing_database_is_unresolved() {
        assert!(resolve(&refs(&[("D", "${postgres.database}")]), &context()).is_err());
    }

    #[test]
    fn undeclared_infrastructure_is_unresolved() {
        assert!(resolve(&refs(&[("R", "${redis.host}")]), &context()).is_err());
    }

    #[test]
    fn unregistered_queue_uses_convention() {
        let resolved = resolve(
            &refs(&[
                ("URL", "${sqs.invoices.url}"),
                ("ARN", "${sqs.invoices.arn}"),
                ("DLQ", "${sqs.invoices.dlq}"),
            ]),
            &context(),
        )
        .expect("resolve");
        assert_eq!(resolved["URL"], "http://localstack:4566/000000000000/invoices");
        assert_eq!(resolved["ARN"], "arn:aws:sqs:us-east-1:000000000000:invoices");
        assert_eq!(
            resolved["DLQ"],
            "http://localstack:4566/000000000000/invoices-dlq"
        );
    }

    #[test]
    fn registered_queue_without_dlq_has_no_dlq() {
        let mut ctx = context();
        let queue: QueueDescriptor = ctx.cloud.queue("orders", false);
        let _ = ctx.queues.insert("orders".into(), queue);
        assert!(resolve(&refs(&[("DLQ", "${sqs.orders.dlq}")]), &ctx).is_err());
        let resolved = resolve(&refs(&[("N", "${sqs.orders.name}")]), &ctx).expect("resolve");
        assert_eq!(resolved["N"], "orders");
    }

    #[test]
    fn topic_and_bucket_by_convention() {
        let resolved = resolve(
            &refs(&[("T", "${sns.events.arn}"), ("B", "${s3.assets.url}")]),
            &context(),
        )
        .expect("resolve");
        assert_eq!(resolved["T"], "arn:aws:sns:us-east-1:000000000000:events");
        assert_eq!(resolved["B"], "http://localstack:4566/assets");
    }

    #[test]
    fn resource_reference_needs_name_and_property() {
        assert!(resolve(&refs(&[("Q", "${sqs.orders}")]), &context()).is_err());
        assert!(resolve(&refs(&[("Q", "${sqs.orders.url.extra}")]), &context()).is_err());
    }

    #[test]
    fn cloud_namespace_properties() {
        let resolved = resolve(
            &refs(&[
                ("E", "${localstack.endpoint}"),
                ("H", "${localstack.host}"),
                ("R", "${localstack.region}"),
                ("K", "${localstack.access_key_id}"),
            ]),
            &context(),
        )
        .expect("resolve");
        assert_eq!(resolved["E"], "http://localstack:4566");
        assert_eq!(resolved["H"], "localstack:4566");
        assert_eq!(resolved["R"], "us-east-1");
        assert_eq!(resolved["K"], "test");
    }

    #[test]
    fn sibling_service_properties_and_config() {
        let resolved = resolve(
            &refs(&[
                ("URL", "${payments.url}/api/${payments.API_VERSION}"),
                ("HOST", "${payments.host}"),
            ]),
            &context(),
        )
        .expect("resolve");
        assert_eq!(resolved["URL"], "http://payments:9000/api/v2");
        assert_eq!(resolved["HOST"], "payments");
    }

    #[test]
    fn unknown_sibling_property_is_unresolved() {
        let err = resolve(&refs(&[("X", "${payments.nope}")]), &context()).unwrap_err();
        assert!(err.to_string().contains("payments.nope"));
    }

    #[test]
    fn self_without_scope_is_unresolved() {
        let mut ctx = context();
        ctx.self_service = None;
        assert!(resolve(&refs(&[("P", "${self.port}")]), &ctx).is_err());
    }

    #[test]
    fn tunnel_urls_resolve_by_name() {
        let mut ctx = context();
        let _ = ctx.tunnels.insert(
            "webhooks".into(),
            TunnelDescriptor {
                name: "webhooks".into(),
                url: "https://abc.trycloudflare.com".into(),
            },
        );
        let resolved =
            resolve(&refs(&[("HOOK", "${tunnel.webhooks.url}/stripe")]), &ctx).expect("resolve");
        assert_eq!(resolved["HOOK"], "https://abc.trycloudflare.com/stripe");
        assert!(resolve(&refs(&[("X", "${tunnel.other.url}")]), &ctx).is_err());
    }
}
