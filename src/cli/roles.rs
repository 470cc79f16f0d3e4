use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tokio::fs;

use super::context::CliContext;

#[derive(Args, Clone, Debug)]
pub struct RolesArgs {
    /// Write the role map to this file instead of printing it
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

pub async fn cmd_roles(args: RolesArgs, ctx: &CliContext) -> Result<()> {
    let map = ctx.settings().role_map().context("loading role map")?;
    let yaml = map.to_yaml().context("serializing role map")?;
    match args.output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            fs::write(&path, yaml)
                .await
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Role map written to {}", path.display());
        }
        None => print!("{yaml}"),
    }
    Ok(())
}
