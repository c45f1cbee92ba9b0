use anyhow::Context;
use clap::Parser;
use mutebot::config::{self, CycleSettings, FilterConfig};
use mutebot::cycle::{self, CycleState};
use mutebot::daemon::{self, DaemonOptions};
use mutebot::github::GithubClient;
use mutebot::{logger, report};
use std::process::ExitCode;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Mutes GitHub review requests that only reached you through a team.
#[derive(Parser, Debug)]
struct Opt {
    /// Mark team-only review requests read and ignore them. Without this,
    /// only shows what would happen.
    #[arg(long)]
    apply: bool,

    /// Detailed output.
    #[arg(long)]
    verbose: bool,

    /// Keep running, polling as often as GitHub allows.
    #[arg(long)]
    daemon: bool,

    /// Only process notifications from this org.
    #[arg(long, value_name = "ORG")]
    include_org: Option<String>,

    /// Skip notifications from this org.
    #[arg(long, value_name = "ORG")]
    exclude_org: Option<String>,

    /// Seconds between polls until GitHub sends its own interval.
    #[arg(
        long,
        value_name = "SECS",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    poll_interval: u64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let opt = Opt::parse();
    logger::init(opt.verbose);

    match run(opt).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(opt: Opt) -> anyhow::Result<ExitCode> {
    let mut gh = GithubClient::new_from_env(config::token_from_env()?)?;
    let login = gh.current_user().await?;
    tracing::debug!("authenticated as {login}");

    let settings = CycleSettings {
        login,
        filter: FilterConfig::new(opt.include_org, opt.exclude_org),
        apply: opt.apply,
    };

    if opt.daemon {
        let options = DaemonOptions {
            poll_interval: Duration::from_secs(opt.poll_interval),
            verbose: opt.verbose,
        };
        let shutdown = shutdown_signal();
        gh.set_cancellation(shutdown.clone());
        let stats = daemon::run_daemon(&gh, &settings, options, shutdown).await;
        tracing::info!(
            "daemon stopped after {} cycles ({} failed, {} mutation errors)",
            stats.cycles,
            stats.failed_cycles,
            stats.mutation_errors
        );
        return Ok(ExitCode::SUCCESS);
    }

    run_once(&gh, &settings).await
}

async fn run_once(gh: &GithubClient, settings: &CycleSettings) -> anyhow::Result<ExitCode> {
    let report = cycle::run_cycle(gh, &CycleState::default(), settings)
        .await
        .context("listing notifications")?;
    if report.outcomes.is_empty() {
        println!("No unread notifications.");
        return Ok(ExitCode::SUCCESS);
    }

    if !settings.apply {
        println!("DRY RUN: no changes will be made (use --apply to execute)");
        println!();
    }
    for line in report::outcome_rows(&report, settings.apply, gh.api_url()) {
        println!("{line}");
    }
    println!("{}", report::summary(&report));

    Ok(if report.mutation_errors > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Returns a token that is cancelled at the first SIGINT or SIGTERM.
fn shutdown_signal() -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        cancel.cancel();
    });
    token
}

/// Waits for Ctrl-C.
async fn ctrl_c() {
    until_signal(tokio::signal::ctrl_c(), "Ctrl-C").await;
}

/// Resolves when `signal` does. A listener that failed to install never
/// resolves, so it cannot be mistaken for a shutdown request.
async fn until_signal<F>(signal: F, name: &str)
where
    F: Future<Output = std::io::Result<()>>,
{
    if let Err(e) = signal.await {
        tracing::warn!("cannot listen for {name}: {e}");
        std::future::pending::<()>().await;
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            tracing::warn!("cannot listen for SIGTERM: {e}");
            ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await;
}
