//! Long-running mode: poll the inbox at the interval GitHub asks for.

use crate::config::CycleSettings;
use crate::cycle::{self, CycleState, NotificationSource};
use crate::report;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Shortest wait between cycles, whatever the caller or GitHub asks for.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
pub struct DaemonOptions {
    /// Interval to use until GitHub sends `X-Poll-Interval`.
    pub poll_interval: Duration,
    /// Also print a line for cycles where nothing changed.
    pub verbose: bool,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        DaemonOptions {
            poll_interval: cycle::DEFAULT_POLL_INTERVAL,
            verbose: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DaemonStats {
    pub cycles: usize,
    /// Cycles that could not list the inbox.
    pub failed_cycles: usize,
    pub mutation_errors: usize,
}

/// Runs cycles until `shutdown` is cancelled.
///
/// Shutdown is only noticed between cycles, so a thread is never left
/// marked read but not ignored. A client sharing the token may still cut a
/// throttle wait short, which fails the listing before anything is muted.
pub async fn run_daemon<S: NotificationSource + ?Sized>(
    source: &S,
    settings: &CycleSettings,
    options: DaemonOptions,
    shutdown: CancellationToken,
) -> DaemonStats {
    let mut state = CycleState::new(options.poll_interval);
    let mut stats = DaemonStats::default();

    tracing::info!(
        "daemon started (poll interval: {}s)",
        state.poll_interval.as_secs()
    );

    loop {
        let started = chrono::Utc::now();
        stats.cycles += 1;
        match cycle::run_cycle(source, &state, settings).await {
            Ok(report) => {
                state.update(&report);
                stats.mutation_errors += report.mutation_errors;
                if !report.not_modified {
                    let rows = report::outcome_rows(&report, settings.apply, source.api_root());
                    for line in rows {
                        println!("{line}");
                    }
                }
                if !report.not_modified || options.verbose {
                    print!("{}", report::daemon_cycle_summary(started, &report));
                }
            }
            Err(e) => {
                stats.failed_cycles += 1;
                tracing::error!("cycle error: {e:?}");
            }
        }

        let wait = state.poll_interval.max(MIN_POLL_INTERVAL);
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!("received shutdown signal, stopping");
                return stats;
            }
            _ = tokio::time::sleep(wait) => {}
        }
    }
}
