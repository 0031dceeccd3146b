//! # grund-compose
//!
//! Turns the infrastructure declarations of several services into one shared
//! topology and a set of compose manifests.
//!
//! Handles:
//! - **Aggregate**: De-duplicating per-service infrastructure requirements.
//! - **Graph**: Selecting a service together with the services it depends on.
//! - **Ports**: Conflict-free host port assignment for one pass.
//! - **Reference**: Resolving `${namespace.path}` placeholders in environments.
//! - **Secrets**: Looking up declared secrets from a caller-supplied source.
//! - **Manifest**: The compose document model and its on-disk store.
//! - **Generator**: Planning and writing the manifests of one pass.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod aggregate;
pub mod generator;
pub mod graph;
pub mod manifest;
pub mod ports;
pub mod reference;
pub mod secrets;

pub use aggregate::{Aggregation, Conflict, aggregate, aggregate_with_diagnostics};
pub use generator::{GenerationPlan, ManifestGenerator, PlannedService};
pub use manifest::{ManifestLayout, ManifestSet};
pub use ports::{Allocation, PortAllocator};
pub use reference::context::ResolutionContext;
pub use secrets::{EnvSecrets, LayeredSecrets, SecretSource};
