//! Formatted output helpers for CLI commands.

use std::path::Path;

use grund_common::constants::INFRASTRUCTURE_UNIT;
use grund_common::types::Service;
use grund_compose::manifest::ComposeFile;
use grund_compose::{GenerationPlan, ManifestSet};
use serde::Serialize;

/// What `grund plan` prints.
#[derive(Debug, Serialize)]
pub struct PlanReport<'a> {
    /// Shared infrastructure kinds, in canonical order.
    pub infrastructure: Vec<&'static str>,
    /// Freshly generated shared manifest, before merging with the one on disk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub infrastructure_manifest: Option<&'a ComposeFile>,
    /// One entry per planned service.
    pub services: Vec<ServiceReport<'a>>,
}

/// A planned service in a [`PlanReport`].
#[derive(Debug, Serialize)]
pub struct ServiceReport<'a> {
    /// Service name.
    pub name: &'a str,
    /// Manifest destination.
    pub path: String,
    /// Port the service asked for.
    pub desired_port: u16,
    /// Host port it was given.
    pub host_port: u16,
    /// Whether the two differ.
    pub reassigned: bool,
    /// The manifest.
    pub manifest: &'a ComposeFile,
}

impl<'a> PlanReport<'a> {
    /// Builds the report of `plan`; `services` supplies the requested ports.
    #[must_use]
    pub fn from_plan(plan: &'a GenerationPlan, services: &[Service]) -> Self {
        let desired = |name: &str| {
            services
                .iter()
                .find(|s| s.name == name)
                .map_or(0, |s| s.port)
        };
        Self {
            infrastructure: plan
                .requirements
                .kinds()
                .into_iter()
                .map(|kind| kind.canonical_name())
                .collect(),
            infrastructure_manifest: plan.infrastructure.as_ref(),
            services: plan
                .services
                .iter()
                .map(|planned| ServiceReport {
                    name: &planned.name,
                    path: planned.path.display().to_string(),
                    desired_port: desired(&planned.name),
                    host_port: planned.port.port,
                    reassigned: planned.port.reassigned,
                    manifest: &planned.manifest,
                })
                .collect(),
        }
    }
}

/// Renders a serializable value as YAML, or as pretty JSON when `json` is set.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn render<T: Serialize>(value: &T, json: bool) -> anyhow::Result<String> {
    if json {
        let mut out = serde_json::to_string_pretty(value)?;
        out.push('\n');
        Ok(out)
    } else {
        Ok(serde_yaml::to_string(value)?)
    }
}

/// Unit name and path of every manifest, shared infrastructure first.
#[must_use]
pub fn manifest_rows(set: &ManifestSet) -> Vec<(&str, &Path)> {
    set.infrastructure
        .iter()
        .map(|path| (INFRASTRUCTURE_UNIT, path.as_path()))
        .chain(
            set.services
                .iter()
                .map(|(name, path)| (name.as_str(), path.as_path())),
        )
        .collect()
}
