use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgGroup, Args};
use serde_json::{Map, Value};
use tracing::{error, info};

use triage_core::bug::{Bug, BugRecord};
use triage_core::collab::Collaborators;
use triage_core::config::TriageConfig;
use triage_core::progress::{IndicatifReporter, ProgressReporter};
use triage_core::trace::TraceCredentials;
use triage_core::workflow::{SessionOptions, SessionOutcome, TriageSession};

#[derive(Args, Debug)]
#[command(group(
    ArgGroup::new("source")
        .required(true)
        .args(["bugs", "search", "from_json"]),
))]
pub struct ProcessArgs {
    /// Bug ids to process
    #[arg(long, num_args = 1..)]
    pub bugs: Vec<u64>,

    /// JSON file holding tracker search parameters
    #[arg(long)]
    pub search: Option<PathBuf>,

    /// Offline bug record, as written by `bugtriage export`
    #[arg(long)]
    pub from_json: Option<PathBuf>,

    /// Compute and log changes without updating bugs or uploading traces
    #[arg(long)]
    pub dry_run: bool,

    /// Confirm open bugs even when already confirmed
    #[arg(long)]
    pub force_confirm: bool,

    /// Path to bugtriage.toml
    #[arg(long, env = "BUGTRIAGE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Where a bug record comes from.
enum BugSource {
    Remote(u64),
    Offline(Box<BugRecord>),
}

impl BugSource {
    fn id(&self) -> u64 {
        match self {
            Self::Remote(id) => *id,
            Self::Offline(record) => record.id,
        }
    }
}

pub async fn run(args: ProcessArgs) -> anyhow::Result<()> {
    let config = Arc::new(super::load_config(args.config.as_deref())?);
    let collab = super::collaborators(&config)?;

    let sources = select_bugs(&args, &collab).await?;
    if sources.is_empty() {
        info!("No bugs to process");
        return Ok(());
    }

    let options = SessionOptions {
        dry_run: args.dry_run,
        trace_creds: TraceCredentials::from_env(),
    };
    let progress = IndicatifReporter::new(std::io::stderr().is_terminal());
    progress.begin(sources.len() as u64);

    let total = sources.len();
    let mut failures = 0usize;
    for source in sources {
        let id = source.id();
        progress.bug_started(id);
        match process_one(source, &collab, &config, &options, args.force_confirm).await {
            Ok(outcome) => progress.bug_finished(id, &outcome.summary()),
            Err(e) => {
                error!(bug = id, error = %format!("{e:#}"), "Failed to process bug");
                failures += 1;
                progress.bug_finished(id, "failed");
            }
        }
    }
    progress.finish();

    if failures > 0 {
        anyhow::bail!("{failures} of {total} bugs failed to process");
    }
    Ok(())
}

async fn select_bugs(args: &ProcessArgs, collab: &Collaborators) -> anyhow::Result<Vec<BugSource>> {
    if let Some(path) = &args.from_json {
        let json = read(path)?;
        let record: BugRecord = serde_json::from_str(&json)
            .with_context(|| format!("Cannot parse bug record: {}", path.display()))?;
        return Ok(vec![BugSource::Offline(Box::new(record))]);
    }

    if let Some(path) = &args.search {
        let params: Map<String, Value> = serde_json::from_str(&read(path)?)
            .with_context(|| format!("Cannot parse search parameters: {}", path.display()))?;
        let found = collab
            .tracker
            .search(&params)
            .await
            .context("Bug search failed")?;
        info!(count = found.len(), "Search returned bugs");
        return Ok(found.into_iter().map(|r| BugSource::Remote(r.id)).collect());
    }

    Ok(args.bugs.iter().copied().map(BugSource::Remote).collect())
}

fn read(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))
}

async fn process_one(
    source: BugSource,
    collab: &Collaborators,
    config: &Arc<TriageConfig>,
    options: &SessionOptions,
    force_confirm: bool,
) -> anyhow::Result<SessionOutcome> {
    let record = match source {
        BugSource::Remote(id) => collab
            .tracker
            .fetch(id)
            .await
            .with_context(|| format!("Cannot fetch bug {id}"))?,
        BugSource::Offline(record) => *record,
    };
    let id = record.id;
    info!(bug = id, "Processing bug");

    let bug = Bug::new(record, &config.policy.command_marker)?;
    let working_dir = tempfile::Builder::new()
        .prefix(&format!("bugtriage-{id}-"))
        .tempdir()
        .context("Cannot create working directory")?;

    let mut session = TriageSession::new(
        bug,
        collab.clone(),
        Arc::clone(config),
        working_dir.path(),
        options.clone(),
    )?;
    let outcome = session.process(force_confirm).await?;
    Ok(outcome)
}
