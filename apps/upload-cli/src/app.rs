//! Wires the uploader to HTTP collaborators and a file-backed resume store.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use capyupload_http::{HttpControlPlane, HttpPartTransport};
use capyupload_transfer::FilePayload;
use capyupload_uploader::{EventBus, FileStore, Uploader};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;

/// Uploads `file` and waits for every part task to settle.
pub async fn run(config: Config, file: PathBuf, identity: Option<String>) -> anyhow::Result<()> {
    let control_plane = HttpControlPlane::new(&config.endpoint, &config.bucket)?;
    let transport = HttpPartTransport::new()?;
    let resume_dir = config.resume_dir()?;
    let backend = FileStore::new(&resume_dir);
    debug!(dir = %resume_dir.display(), "resume store");

    let mut payload = FilePayload::open(&file)
        .with_context(|| format!("cannot open {}", file.display()))?;
    if let Some(identity) = identity {
        payload = payload.with_identity(identity);
    }

    let events = EventBus::new();
    let watchers = watch_events(&events);

    let uploader = Uploader::new(
        Arc::new(control_plane),
        Arc::new(transport),
        Arc::new(backend),
        config.upload_options(),
        events,
    )?;

    let result = uploader.upload(Arc::new(payload)).await;
    drop(uploader);

    // Watchers end once every sender is gone, including part tasks still
    // running after a failure, so their progress is persisted before exit.
    for watcher in watchers {
        let _ = watcher.await;
    }

    match result {
        Ok(outcome) => {
            println!("{}", outcome.key);
            Ok(())
        }
        Err(e) => {
            warn!("finished parts were kept; rerun the same command to resume");
            Err(e.into())
        }
    }
}

fn watch_events(events: &EventBus) -> Vec<JoinHandle<()>> {
    vec![
        watch(events.upload_resumed.subscribe(), |e| {
            info!(
                upload_id = %e.record.upload_id,
                percent = e.starting_percentage,
                "resuming previous upload"
            );
        }),
        watch(events.upload_created.subscribe(), |e| {
            debug!(upload_id = %e.upload_id, key = %e.key, "upload created");
        }),
        watch(events.total_progress.subscribe(), |e| {
            info!(percent = e.percentage, "progress");
        }),
        watch(events.upload_completed.subscribe(), |e| {
            info!(key = %e.key, "upload completed");
        }),
        watch(events.upload_failed.subscribe(), |e| {
            let finished = e.record.map(|r| r.finished_parts.len()).unwrap_or(0);
            error!(error = %e.error, finished, "upload failed");
        }),
        watch(events.error.subscribe(), |e| {
            warn!(error = %e.error, "upload warning");
        }),
    ]
}

fn watch<T, F>(mut rx: broadcast::Receiver<T>, on_event: F) -> JoinHandle<()>
where
    T: Clone + Send + 'static,
    F: Fn(T) + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => on_event(event),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "event watcher lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}
