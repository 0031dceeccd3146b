//! `grund manifests` — List the manifests generated so far.

use clap::Args;
use grund_common::config::GrundConfig;
use grund_compose::ManifestSet;
use grund_compose::manifest::ManifestLayout;

/// Arguments for the `manifests` command.
#[derive(Args, Debug)]
pub struct ManifestsArgs {
    /// Print `name<TAB>path` instead of bare paths.
    #[arg(short, long)]
    pub long: bool,
}

/// Executes the `manifests` command.
///
/// # Errors
///
/// Returns an error if the manifest root cannot be listed.
pub fn execute(args: ManifestsArgs, config: &GrundConfig) -> anyhow::Result<()> {
    let layout = ManifestLayout::new(config.manifest_root());
    let set = ManifestSet::discover(&layout)?;
    if set.is_empty() {
        tracing::info!(root = %layout.root().display(), "no manifests generated yet");
        return Ok(());
    }

    for (name, path) in crate::output::manifest_rows(&set) {
        if args.long {
            println!("{name}\t{}", path.display());
        } else {
            println!("{}", path.display());
        }
    }
    Ok(())
}
