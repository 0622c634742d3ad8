use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use triage_core::bug::Bug;

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Bug id to export
    pub id: u64,

    /// Destination file
    #[arg(short, long)]
    pub output: PathBuf,

    /// Path to bugtriage.toml
    #[arg(long, env = "BUGTRIAGE_CONFIG")]
    pub config: Option<PathBuf>,
}

pub async fn run(args: ExportArgs) -> anyhow::Result<()> {
    let config = super::load_config(args.config.as_deref())?;
    let collab = super::collaborators(&config)?;

    let record = collab
        .tracker
        .fetch(args.id)
        .await
        .with_context(|| format!("Cannot fetch bug {}", args.id))?;
    let bug = Bug::new(record, &config.policy.command_marker)?;
    std::fs::write(&args.output, bug.to_json()?)
        .with_context(|| format!("Cannot write {}", args.output.display()))?;

    println!(
        "Exported bug {} ({} attachment(s), {} comment(s)) to {}",
        bug.id(),
        bug.attachments().len(),
        bug.comments().len(),
        args.output.display()
    );
    Ok(())
}
