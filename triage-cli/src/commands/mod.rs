pub mod export;
pub mod process;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use clap::Subcommand;

use triage_core::collab::Collaborators;
use triage_core::config::TriageConfig;
use triage_core::external::ExternalTools;
use triage_core::hg::HgClient;
use triage_core::trace::PernoscoSubmitter;
use triage_core::tracker::BugzillaClient;
use triage_core::transport::HttpTransport;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Triage bugs: confirm, bisect, verify and record traces as requested
    Process(process::ProcessArgs),
    /// Write a bug with its attachments and comments to a JSON file
    Export(export::ExportArgs),
}

pub async fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Process(args) => process::run(args).await,
        Command::Export(args) => export::run(args).await,
    }
}

pub(crate) fn load_config(path: Option<&Path>) -> anyhow::Result<TriageConfig> {
    TriageConfig::load(path).context("Cannot load config")
}

/// Wire the production collaborators from configuration and environment.
pub(crate) fn collaborators(config: &TriageConfig) -> anyhow::Result<Collaborators> {
    let transport = Arc::new(
        HttpTransport::new(&config.transport).context("Cannot build HTTP transport")?,
    );
    let tracker = BugzillaClient::from_env(Arc::clone(&transport), &config.tracker)
        .context("Invalid tracker config")?;
    let tools = Arc::new(ExternalTools::from_config(&config.tools, &config.transport));

    Ok(Collaborators {
        tracker: Arc::new(tracker),
        releases: Arc::new(HgClient::new(transport, &config.hg)),
        resolver: tools.clone(),
        builds: tools.clone(),
        evaluator: tools.clone(),
        bisector: tools,
        traces: Arc::new(PernoscoSubmitter::new(config.tools.trace_submit.clone())),
    })
}
