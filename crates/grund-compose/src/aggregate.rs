//! Merging of per-service infrastructure requirements.
//!
//! Single-instance kinds keep the first declaration; named collections keep
//! the first entry for each name, in first-seen order. Later declarations
//! that differ from the kept one are reported as [`Conflict`]s but never
//! change the result.

use std::collections::HashMap;

use grund_common::types::InfrastructureRequirements;

/// A later declaration that was dropped although it differs from the kept one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Requirement kind, e.g. `postgres` or `queue`.
    pub kind: &'static str,
    /// Resource name for named collections; the kind itself otherwise.
    pub name: String,
    /// Index of the requirement set whose declaration was kept.
    pub kept_from: usize,
    /// Index of the requirement set whose declaration was dropped.
    pub dropped_from: usize,
}

/// Result of [`aggregate_with_diagnostics`].
#[derive(Debug, Clone, Default)]
pub struct Aggregation {
    /// The merged requirements.
    pub requirements: InfrastructureRequirements,
    /// Dropped declarations that differed from the kept ones.
    pub conflicts: Vec<Conflict>,
}

/// Merges requirement sets into one shared topology.
pub fn aggregate(requirements: &[InfrastructureRequirements]) -> InfrastructureRequirements {
    aggregate_with_diagnostics(requirements).requirements
}

/// Merges requirement sets and reports conflicting declarations.
///
/// Every conflict is also logged at `warn` level.
pub fn aggregate_with_diagnostics(requirements: &[InfrastructureRequirements]) -> Aggregation {
    let mut postgres = None;
    let mut mongodb = None;
    let mut redis = None;
    let mut tunnel = None;
    let mut merged = InfrastructureRequirements::default();
    let mut origins = NamedOrigins::default();
    let mut conflicts = Vec::new();

    for (index, req) in requirements.iter().enumerate() {
        merge_single(&mut postgres, req.postgres.as_ref(), "postgres", index, &mut conflicts);
        merge_single(&mut mongodb, req.mongodb.as_ref(), "mongodb", index, &mut conflicts);
        merge_single(&mut redis, req.redis.as_ref(), "redis", index, &mut conflicts);
        merge_single(&mut tunnel, req.tunnel.as_ref(), "tunnel", index, &mut conflicts);

        let mut named = NamedMerge {
            index,
            conflicts: &mut conflicts,
        };
        named.merge(&mut merged.queues, &mut origins.queues, &req.queues, "queue", |q| &q.name);
        named.merge(&mut merged.topics, &mut origins.topics, &req.topics, "topic", |t| &t.name);
        named.merge(&mut merged.buckets, &mut origins.buckets, &req.buckets, "bucket", |b| &b.name);
        named.merge(&mut merged.tunnels, &mut origins.tunnels, &req.tunnels, "tunnel target", |t| &t.name);
    }

    merged.postgres = postgres.map(|(value, _)| value);
    merged.mongodb = mongodb.map(|(value, _)| value);
    merged.redis = redis.map(|(value, _)| value);
    merged.tunnel = tunnel.map(|(value, _)| value);

    for conflict in &conflicts {
        tracing::warn!(
            kind = conflict.kind,
            name = %conflict.name,
            kept_from = conflict.kept_from,
            dropped_from = conflict.dropped_from,
            "conflicting declaration ignored, first declaration wins"
        );
    }

    Aggregation {
        requirements: merged,
        conflicts,
    }
}

#[derive(Default)]
struct NamedOrigins {
    queues: HashMap<String, usize>,
    topics: HashMap<String, usize>,
    buckets: HashMap<String, usize>,
    tunnels: HashMap<String, usize>,
}

fn merge_single<T: Clone + PartialEq>(
    slot: &mut Option<(T, usize)>,
    incoming: Option<&T>,
    kind: &'static str,
    index: usize,
    conflicts: &mut Vec<Conflict>,
) {
    let Some(incoming) = incoming else {
        return;
    };
    match slot {
        Some((kept, kept_from)) => {
            if kept != incoming {
                conflicts.push(Conflict {
                    kind,
                    name: kind.to_owned(),
                    kept_from: *kept_from,
                    dropped_from: index,
                });
            }
        }
        None => *slot = Some((incoming.clone(), index)),
    }
}

struct NamedMerge<'a> {
    index: usize,
    conflicts: &'a mut Vec<Conflict>,
}

impl NamedMerge<'_> {
    fn merge<T: Clone + PartialEq>(
        &mut self,
        merged: &mut Vec<T>,
        origins: &mut HashMap<String, usize>,
        incoming: &[T],
        kind: &'static str,
        name_of: fn(&T) -> &String,
    ) {
        for item in incoming {
            let name = name_of(item);
            if let Some(&kept_from) = origins.get(name) {
                let differs = merged
                    .iter()
                    .find(|kept| name_of(kept) == name)
                    .is_some_and(|kept| kept != item);
                if differs {
                    self.conflicts.push(Conflict {
                        kind,
                        name: name.clone(),
                        kept_from,
                        dropped_from: self.index,
                    });
                }
                continue;
            }
            let _ = origins.insert(name.clone(), self.index);
            merged.push(item.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use grund_common::types::{
        BucketConfig, PostgresConfig, QueueConfig, RedisConfig, RedisRequirement,
    };

    use super::*;

    fn postgres(db: &str) -> InfrastructureRequirements {
        InfrastructureRequirements {
            postgres: Some(PostgresConfig {
                database: db.into(),
                ..PostgresConfig::default()
            }),
            ..InfrastructureRequirements::default()
        }
    }

    fn queues(names: &[(&str, bool)]) -> InfrastructureRequirements {
        InfrastructureRequirements {
            queues: names
                .iter()
                .map(|(name, dlq)| QueueConfig {
                    name: (*name).into(),
                    dlq: *dlq,
                    visibility_timeout: None,
                })
                .collect(),
            ..InfrastructureRequirements::default()
        }
    }

    #[test]
    fn empty_input_yields_no_infrastructure() {
        let merged = aggregate(&[]);
        assert_eq!(merged, InfrastructureRequirements::default());
        assert!(merged.is_empty());
    }

    #[test]
    fn single_instance_kind_is_first_wins() {
        let a = postgres("a_db");
        let b = postgres("b_db");

        let ab = aggregate(&[a.clone(), b.clone()]);
        assert_eq!(ab.postgres.map(|p| p.database), Some("a_db".into()));

        let ba = aggregate(&[b, a]);
        assert_eq!(ba.postgres.map(|p| p.database), Some("b_db".into()));
    }

    #[test]
    fn empty_declaration_does_not_claim_kind() {
        let merged = aggregate(&[InfrastructureRequirements::default(), postgres("late_db")]);
        assert_eq!(merged.postgres.map(|p| p.database), Some("late_db".into()));
    }

    #[test]
    fn queues_are_distinct_in_first_seen_order_with_first_config() {
        let merged = aggregate(&[
            queues(&[("orders", true), ("emails", false)]),
            queues(&[("orders", false), ("audit", false)]),
            queues(&[("emails", true)]),
        ]);
        let names: Vec<&str> = merged.queues.iter().map(|q| q.name.as_str()).collect();
        assert_eq!(names, vec!["orders", "emails", "audit"]);
        assert!(merged.queues[0].dlq);
        assert!(!merged.queues[1].dlq);
    }

    #[test]
    fn differing_duplicates_are_reported() {
        let result = aggregate_with_diagnostics(&[
            queues(&[("orders", true)]),
            queues(&[("orders", false)]),
            queues(&[("orders", true)]),
            postgres("a_db"),
            postgres("b_db"),
        ]);
        assert_eq!(
            result.conflicts,
            vec![
                Conflict {
                    kind: "queue",
                    name: "orders".into(),
                    kept_from: 0,
                    dropped_from: 1,
                },
                Conflict {
                    kind: "postgres",
                    name: "postgres".into(),
                    kept_from: 3,
                    dropped_from: 4,
                },
            ]
        );
    }

    #[test]
    fn identical_duplicates_are_not_conflicts() {
        let result = aggregate_with_diagnostics(&[postgres("db"), postgres("db")]);
        assert!(result.conflicts.is_empty());
    }

    #[test]
    fn redis_variants_first_wins() {
        let detailed = InfrastructureRequirements {
            redis: Some(RedisRequirement::Detailed(RedisConfig {
                version: Some("6".into()),
                max_memory: None,
            })),
            ..InfrastructureRequirements::default()
        };
        let plain = InfrastructureRequirements {
            redis: Some(RedisRequirement::Enabled),
            ..InfrastructureRequirements::default()
        };
        let merged = aggregate(&[plain, detailed]);
        assert_eq!(merged.redis, Some(RedisRequirement::Enabled));
    }

    #[test]
    fn collections_merge_independently() {
        let with_bucket = InfrastructureRequirements {
            buckets: vec![BucketConfig {
                name: "orders".into(),
                seed: None,
            }],
            ..InfrastructureRequirements::default()
        };
        let merged = aggregate(&[queues(&[("orders", false)]), with_bucket]);
        assert_eq!(merged.queues.len(), 1);
        assert_eq!(merged.buckets.len(), 1);
    }
}
