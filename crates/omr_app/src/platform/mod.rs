//! Headless host: runs the reducer and the engine for one session driven by
//! command-line paths.
mod app;
mod config;
mod effects;
mod logging;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use omr_core::{Msg, SubmissionState, SummaryState};
use omr_logging::{omr_error, omr_info, omr_warn};

use app::App;
use logging::LogDestination;

const COLLECT_TIMEOUT: Duration = Duration::from_secs(600);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(180);

/// Treats the command-line paths as one drop, submits what was collected and
/// prints the results overview.
pub fn run_app() -> anyhow::Result<()> {
    logging::initialize(LogDestination::Both);

    let config = config::engine_config_from_env();
    omr_info!(
        "service {} downloads to {}",
        config.service.base_url,
        config.download_dir.display()
    );
    let mut app = App::new(config).context("cannot start engine")?;

    let paths: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    if paths.is_empty() {
        omr_info!("no paths given; skipping submission");
    } else {
        submit_paths(&mut app, paths)?;
    }

    app.dispatch(Msg::SummaryRequested);
    if !app.run_until(RESPONSE_TIMEOUT, |s| !matches!(s.summary(), SummaryState::Loading)) {
        bail!("results overview did not arrive in time");
    }
    if let SummaryState::Failed(err) = app.state().summary() {
        omr_warn!("results overview unavailable: {}", err);
    }
    for row in app.state().view().results {
        omr_info!(
            "{} {} average {:.1} ({:?})",
            row.key,
            row.date.as_deref().unwrap_or("-"),
            row.avg_score,
            row.band
        );
    }
    Ok(())
}

fn submit_paths(app: &mut App, paths: Vec<PathBuf>) -> anyhow::Result<()> {
    app.dispatch(Msg::FilesDropped(paths));
    if !app.run_until(COLLECT_TIMEOUT, |s| s.pending_traversals() == 0) {
        bail!("file collection did not finish");
    }
    let view = app.state().view();
    if let Some(report) = view.last_collect.as_ref().filter(|r| r.is_partial()) {
        omr_warn!("skipped unreadable folders: {}", report.failed_subtrees.join(", "));
    }
    omr_info!("collected {} files", view.file_count);

    app.dispatch(Msg::SubmitClicked);
    if !app.run_until(RESPONSE_TIMEOUT, |s| {
        !matches!(s.submission(), SubmissionState::InFlight)
    }) {
        bail!("submission did not finish in time");
    }
    match app.state().submission() {
        SubmissionState::Succeeded(receipt) => omr_info!("batch accepted: {}", receipt.0),
        SubmissionState::Failed(err) => omr_error!("batch rejected: {}", err),
        SubmissionState::Rejected(reason) => omr_warn!("nothing submitted: {:?}", reason),
        SubmissionState::Idle | SubmissionState::InFlight => {}
    }
    Ok(())
}
