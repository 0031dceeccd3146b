//! `grund plan` — Show the manifests a generation would write.

use clap::Args;
use grund_common::config::GrundConfig;

use super::input::ServiceInputs;
use crate::output::{self, PlanReport};

/// Arguments for the `plan` command.
#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Declarations and selection.
    #[command(flatten)]
    pub inputs: ServiceInputs,

    /// Print JSON instead of YAML.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `plan` command.
///
/// Resolves every service exactly as `generate` would, then prints the
/// port assignments and manifests without touching the manifest root.
///
/// # Errors
///
/// Returns an error if loading or resolution fails.
pub fn execute(args: PlanArgs, config: &GrundConfig) -> anyhow::Result<()> {
    let selection = args.inputs.select()?;
    let plan = args.inputs.with_generator(config, |generator| {
        generator.plan(&selection.services, &selection.requirements)
    })?;

    let report = PlanReport::from_plan(&plan, &selection.services);
    print!("{}", output::render(&report, args.json)?);
    Ok(())
}
