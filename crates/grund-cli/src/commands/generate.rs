//! `grund generate` — Write compose manifests for the selected services.

use clap::Args;
use grund_common::config::GrundConfig;

use super::input::ServiceInputs;

/// Arguments for the `generate` command.
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Declarations and selection.
    #[command(flatten)]
    pub inputs: ServiceInputs,
}

/// Executes the `generate` command.
///
/// Prints the path of every manifest in the project, including ones from
/// earlier runs, so the output can be passed to the compose tool as is.
///
/// # Errors
///
/// Returns an error if loading, resolution, or writing fails.
pub fn execute(args: GenerateArgs, config: &GrundConfig) -> anyhow::Result<()> {
    let selection = args.inputs.select()?;
    let set = args
        .inputs
        .with_generator(config, |generator| {
            generator.generate(&selection.services, &selection.requirements)
        })?;

    for path in set.files() {
        println!("{}", path.display());
    }
    Ok(())
}
