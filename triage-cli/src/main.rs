use clap::Parser;

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "bugtriage",
    version,
    about = "Reproduce, bisect and verify crash reports filed in the issue tracker"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Classify an error into an exit code.
///
/// Exit codes:
///   0  : success
///   1  : general/unknown error
///   2  : configuration error
///   5  : issue tracker API error (auth, network, not found)
///   10 : partial success (some bugs failed)
fn classify_exit_code(err: &anyhow::Error) -> i32 {
    let lower = format!("{err:#}").to_lowercase();

    if lower.contains("bugs failed") {
        10 // partial
    } else if lower.contains("config") || lower.contains("must be set") {
        2 // config error
    } else if lower.contains("tracker error")
        || lower.contains("api error")
        || lower.contains("network error")
    {
        5 // tracker API error
    } else {
        1 // general error
    }
}

fn main() {
    let cli = Cli::parse();

    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, 0) => "warn",
        (_, 1) => "info",
        (_, 2) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: Failed to create runtime: {e}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(commands::run(cli.command)) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(classify_exit_code(&e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_partial() {
        let err = anyhow::anyhow!("2 of 5 bugs failed to process");
        assert_eq!(classify_exit_code(&err), 10);
    }

    #[test]
    fn exit_code_config() {
        let err = anyhow::anyhow!("BZ_API_KEY must be set").context("Invalid tracker settings");
        assert_eq!(classify_exit_code(&err), 2);

        let err = anyhow::anyhow!("Config file not found: /nope.toml");
        assert_eq!(classify_exit_code(&err), 2);
    }

    #[test]
    fn exit_code_tracker() {
        let err = anyhow::anyhow!("API error (HTTP 401): invalid api key")
            .context("Cannot fetch bug 1234");
        assert_eq!(classify_exit_code(&err), 5);
    }

    #[test]
    fn exit_code_general() {
        let err = anyhow::anyhow!("Something unexpected happened");
        assert_eq!(classify_exit_code(&err), 1);
    }
}
