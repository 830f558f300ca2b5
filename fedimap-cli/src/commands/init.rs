use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use fedimap_core::config::FedimapConfig;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Where to write the config file
    #[arg(long, default_value = super::DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

#[allow(clippy::unused_async)]
pub async fn run(args: InitArgs) -> anyhow::Result<()> {
    if args.config.exists() && !args.force {
        anyhow::bail!(
            "Config already exists: {} (use --force to overwrite)",
            args.config.display()
        );
    }

    let text = FedimapConfig::default()
        .to_toml()
        .context("Cannot serialize default config")?;
    std::fs::write(&args.config, text)
        .with_context(|| format!("Cannot write config: {}", args.config.display()))?;

    println!("Wrote default config to {}", args.config.display());
    Ok(())
}
