//! Batch orchestration: sources in, sequential downloads out.
//!
//! A run moves through [`BatchPhase`]s and reports everything the UI needs
//! as [`RunEvent`]s. [`spawn_run`] puts one run on a background task and
//! hands back the receiving end of its event channel.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tracing::{debug, error, info};

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::expand::expand;
use crate::job::{DownloadOptions, download_one};
use crate::model::{BatchPhase, Notice, RunEvent};
use crate::progress::{ProgressEvent, ProgressState};

/// Status line text between runs.
pub const READY_STATUS: &str = "Ready.";

/// Outcome of a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub failed: usize,
}

/// Splits the source text into trimmed, non-empty lines.
pub fn parse_sources(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Checks the output folder and creates it if needed.
///
/// Runs before the worker starts; a blank value is rejected before anything
/// touches the filesystem.
pub fn prepare_output_dir(raw: &str) -> Result<PathBuf> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::MissingOutputDir);
    }
    let dir = PathBuf::from(raw);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn finish_idle(emit: &mut (dyn FnMut(RunEvent) + Send)) {
    emit(RunEvent::Status(READY_STATUS.to_owned()));
    emit(RunEvent::Phase(BatchPhase::Idle));
    emit(RunEvent::Finished);
}

/// Runs one batch to completion.
///
/// Sources are expanded in input order and their items downloaded strictly
/// one after another. The overall counter advances after every item, failed
/// or not.
pub async fn run_batch(
    engine: &dyn Engine,
    raw_sources: &str,
    options: &DownloadOptions,
    emit: &mut (dyn FnMut(RunEvent) + Send),
) -> BatchSummary {
    emit(RunEvent::Phase(BatchPhase::CollectingSources));
    let sources = parse_sources(raw_sources);
    if sources.is_empty() {
        emit(RunEvent::Notice(Notice::error(Error::NoSources.to_string())));
        finish_idle(emit);
        return BatchSummary::default();
    }

    emit(RunEvent::Phase(BatchPhase::ExpandingAll));
    let mut items = Vec::new();
    for source in &sources {
        items.extend(expand(engine, source, emit).await);
    }

    if items.is_empty() {
        emit(RunEvent::Notice(Notice::info("Information", "No item found.")));
        finish_idle(emit);
        return BatchSummary::default();
    }

    let total = items.len();
    info!("Downloading {total} item(s) from {} source(s)", sources.len());
    emit(RunEvent::Phase(BatchPhase::DownloadingSequential));

    let mut state = ProgressState::default();
    state.start_items(total);
    emit(RunEvent::Progress(state));

    let mut failed = 0;
    for (i, url) in items.iter().enumerate() {
        state.reset_file();
        emit(RunEvent::Status(format!("Downloading {}/{total}...", i + 1)));
        emit(RunEvent::Progress(state));

        download_one(
            engine,
            url,
            options,
            &mut |event: ProgressEvent| {
                state.apply(&event);
                emit(RunEvent::Progress(state));
            },
            &mut |e: &Error, url: &str| {
                error!("Download failed for {url}: {e}");
                failed += 1;
            },
        )
        .await;

        state.items_done = i + 1;
        emit(RunEvent::Progress(state));
    }

    let mut message = format!("{total} item(s) processed.");
    if failed > 0 {
        message.push_str(&format!(" {failed} failed."));
    }
    info!("Batch finished: {total} item(s), {failed} failed");

    emit(RunEvent::Notice(Notice::info("Finished", message)));
    emit(RunEvent::Status(READY_STATUS.to_owned()));
    emit(RunEvent::Phase(BatchPhase::Done));
    emit(RunEvent::Finished);

    BatchSummary { total, failed }
}

/// Starts a run on a single background task.
///
/// If the task dies unexpectedly the user still gets an error notice and a
/// final [`RunEvent::Finished`].
pub fn spawn_run(
    handle: &Handle,
    engine: Arc<dyn Engine>,
    raw_sources: String,
    options: DownloadOptions,
) -> UnboundedReceiver<RunEvent> {
    let (tx, rx) = unbounded_channel();

    let worker_tx = tx.clone();
    let worker = handle.spawn(async move {
        let mut emit = move |event: RunEvent| {
            // the UI may be gone; nothing to do then
            let _ = worker_tx.send(event);
        };
        run_batch(engine.as_ref(), &raw_sources, &options, &mut emit).await
    });

    handle.spawn(async move {
        match worker.await {
            Ok(summary) => debug!("Run ended: {summary:?}"),
            Err(e) => {
                error!("Download run stopped unexpectedly: {e}");
                let _ = tx.send(RunEvent::Notice(Notice::error(
                    "The download run stopped unexpectedly.",
                )));
                let _ = tx.send(RunEvent::Status(READY_STATUS.to_owned()));
                let _ = tx.send(RunEvent::Phase(BatchPhase::Idle));
                let _ = tx.send(RunEvent::Finished);
            }
        }
    });

    rx
}
