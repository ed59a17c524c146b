//! The upload state machine.
//!
//! One call to [`Uploader::upload`] drives a payload through
//! `ResumeCheck → Created | Resuming → PartsInFlight → Completing → Completed`,
//! or to `Failed` from any of the non-terminal states.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use capyupload_protocol::{
    CompleteUploadRequest, CreateUploadRequest, PartResult, SignPartRequest, UploadRecord,
    UploadState, strip_tag_quotes,
};
use capyupload_transfer::{PartPlan, PayloadSource, ProgressAggregator, Throttle, part_percentage};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::UploadOptions;
use crate::control_plane::ControlPlaneClient;
use crate::error::UploadError;
use crate::events::{
    ErrorEvent, EventBus, Initialized, PartSigned, PartStarted, PartSucceeded, TotalProgress,
    UploadCompleted, UploadCreated, UploadFailed, UploadResumed, UploadStarted,
};
use crate::store::{KeyValueStore, ResumeStore};
use crate::transport::PartTransport;
use crate::types::{PartPut, UploadOutcome};

/// Progress updates buffered per part before the transport waits.
const PROGRESS_BUFFER: usize = 16;

/// Drives resumable multipart uploads.
///
/// An `Uploader` can run many uploads one after another. Running two uploads
/// of the same identity at once (in one or several processes) races on the
/// resume record; callers must avoid it.
pub struct Uploader {
    control_plane: Arc<dyn ControlPlaneClient>,
    transport: Arc<dyn PartTransport>,
    store: ResumeStore,
    options: UploadOptions,
    throttle: Throttle,
    events: EventBus,
    state: RwLock<UploadState>,
    in_progress: AtomicBool,
}

impl Uploader {
    /// Validates `options` and wires the collaborators together.
    ///
    /// Emits `initialized` on `events`, so subscribe before calling this to
    /// observe it.
    pub fn new(
        control_plane: Arc<dyn ControlPlaneClient>,
        transport: Arc<dyn PartTransport>,
        backend: Arc<dyn KeyValueStore>,
        options: UploadOptions,
        events: EventBus,
    ) -> Result<Self, UploadError> {
        options.validate()?;
        let throttle = Throttle::new(options.concurrency)
            .map_err(|e| UploadError::Configuration(e.to_string()))?;
        let store = ResumeStore::new(backend, options.namespace.clone());

        debug!(
            namespace = %options.namespace,
            concurrency = options.concurrency,
            "uploader initialized"
        );
        events.initialized.emit(Initialized {
            namespace: options.namespace.clone(),
        });

        Ok(Self {
            control_plane,
            transport,
            store,
            options,
            throttle,
            events,
            state: RwLock::new(UploadState::Idle),
            in_progress: AtomicBool::new(false),
        })
    }

    /// Event channels of this uploader.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// State of the current or most recent upload.
    pub fn state(&self) -> UploadState {
        *self.state.read().unwrap()
    }

    /// Whether an upload is running. Informational only.
    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    /// Resume records used by this uploader.
    pub fn resume_store(&self) -> &ResumeStore {
        &self.store
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    /// Uploads `payload`, resuming a persisted attempt of the same identity.
    ///
    /// On failure the resume record keeps every part that finished, so
    /// calling `upload` again only transfers what is missing. Part transfers
    /// already running when a sibling fails are not cancelled; they still
    /// update the resume record after this returns.
    pub async fn upload(
        &self,
        payload: Arc<dyn PayloadSource>,
    ) -> Result<UploadOutcome, UploadError> {
        self.in_progress.store(true, Ordering::SeqCst);
        let result = self.run(payload).await;
        self.in_progress.store(false, Ordering::SeqCst);
        result
    }

    async fn run(&self, payload: Arc<dyn PayloadSource>) -> Result<UploadOutcome, UploadError> {
        let identity = payload.identity().to_string();
        let total_size = payload.size();

        info!(identity = %identity, total_size, "upload started");
        self.events.upload_started.emit(UploadStarted {
            identity: identity.clone(),
            total_size,
        });
        self.set_state(UploadState::ResumeCheck);

        let (record, plan, progress, resumed) = match self.resume_check(&identity, total_size) {
            Some(record) => {
                self.set_state(UploadState::Resuming);
                let plan = PartPlan {
                    part_size: record.part_size_bytes,
                    total_parts: record.total_parts,
                    total_size: record.total_size_bytes,
                };
                let mut progress = ProgressAggregator::new(record.total_parts);
                let starting_percentage = progress
                    .seed_finished(record.finished_parts.iter().map(|p| p.part_number));

                info!(
                    identity = %identity,
                    upload_id = %record.upload_id,
                    finished = record.finished_parts.len(),
                    total_parts = record.total_parts,
                    starting_percentage,
                    "resuming upload"
                );
                self.events.upload_resumed.emit(UploadResumed {
                    starting_percentage,
                    record: record.clone(),
                });
                (record, plan, progress, true)
            }
            None => {
                self.set_state(UploadState::Created);
                let (record, plan) = self.create(&identity, payload.as_ref()).await?;
                let progress = ProgressAggregator::new(plan.total_parts);
                (record, plan, progress, false)
            }
        };

        // PartsInFlight
        self.set_state(UploadState::PartsInFlight);
        let pending = record.pending_parts();
        let ctx = Arc::new(PartContext {
            identity: identity.clone(),
            upload_id: record.upload_id.clone(),
            key: record.target_key.clone(),
            plan,
            payload,
            control_plane: Arc::clone(&self.control_plane),
            transport: Arc::clone(&self.transport),
            store: self.store.clone(),
            events: self.events.clone(),
            record: Mutex::new(record),
            progress: Mutex::new(progress),
        });

        debug!(
            pending = pending.len(),
            concurrency = self.throttle.limit(),
            "launching part transfers"
        );
        let factories: Vec<_> = pending
            .into_iter()
            .map(|part_number| {
                let ctx = Arc::clone(&ctx);
                move || {
                    ctx.events.part_started.emit(PartStarted { part_number });
                    transfer_part(ctx, part_number)
                }
            })
            .collect();

        if let Err(e) = self.throttle.launch(factories).wait_all().await {
            let snapshot = ctx.record.lock().unwrap().clone();
            return Err(self.fail(e, Some(snapshot)));
        }

        // Completing
        self.set_state(UploadState::Completing);
        ctx.finish_progress();
        let request = CompleteUploadRequest {
            upload_id: ctx.upload_id.clone(),
            key: ctx.key.clone(),
            parts: ctx.record.lock().unwrap().completion_parts(),
        };
        let part_count = request.parts.len();

        let response = match self.control_plane.complete(&request).await {
            Ok(response) => response,
            Err(e) => {
                let snapshot = ctx.record.lock().unwrap().clone();
                return Err(self.fail(e, Some(snapshot)));
            }
        };

        self.remove_record(&identity);
        let key = if response.key.is_empty() {
            ctx.key.clone()
        } else {
            response.key
        };

        self.set_state(UploadState::Completed);
        info!(identity = %identity, key = %key, parts = part_count, "upload completed");
        self.events.upload_completed.emit(UploadCompleted {
            upload_id: ctx.upload_id.clone(),
            key: key.clone(),
        });

        Ok(UploadOutcome {
            key,
            upload_id: ctx.upload_id.clone(),
            parts: part_count,
            resumed,
        })
    }

    /// Returns a tag-filtered record worth resuming, discarding anything else.
    ///
    /// A record planned for a different payload size is discarded too.
    fn resume_check(&self, identity: &str, total_size: u64) -> Option<UploadRecord> {
        let record = self.store.get(identity)?.without_untagged_parts();
        if !record.is_resumable() {
            warn!(identity, "discarding invalid resume record");
            self.remove_record(identity);
            return None;
        }
        if record.total_size_bytes != total_size {
            warn!(
                identity,
                recorded = record.total_size_bytes,
                total_size,
                "payload size changed, discarding resume record"
            );
            self.remove_record(identity);
            return None;
        }
        persist_record(&self.store, &self.events, identity, &record);
        Some(record)
    }

    async fn create(
        &self,
        identity: &str,
        payload: &dyn PayloadSource,
    ) -> Result<(UploadRecord, PartPlan), UploadError> {
        let request = CreateUploadRequest {
            filename: identity.to_string(),
            content_type: self
                .options
                .content_type
                .clone()
                .or_else(|| payload.content_type().map(str::to_string)),
            metadata: self.options.metadata.clone(),
        };

        let response = match self.control_plane.create(&request).await {
            Ok(response) => response,
            Err(e) => {
                self.remove_record(identity);
                return Err(self.fail(e, None));
            }
        };

        let plan = self.options.part_limits().plan(payload.size());
        debug!(
            upload_id = %response.upload_id,
            key = %response.key,
            total_parts = plan.total_parts,
            part_size = plan.part_size,
            "upload created"
        );
        self.events.upload_created.emit(UploadCreated {
            upload_id: response.upload_id.clone(),
            key: response.key.clone(),
        });

        let record = UploadRecord::new(
            identity,
            plan.total_size,
            plan.total_parts,
            plan.part_size,
            response.upload_id,
            response.key,
        );
        persist_record(&self.store, &self.events, identity, &record);
        Ok((record, plan))
    }

    fn fail(&self, error: UploadError, record: Option<UploadRecord>) -> UploadError {
        self.set_state(UploadState::Failed);
        error!(error = %error, resumable = record.is_some(), "upload failed");
        self.events.upload_failed.emit(UploadFailed {
            error: error.to_string(),
            record,
        });
        error
    }

    fn remove_record(&self, identity: &str) {
        if let Err(e) = self.store.remove(identity) {
            warn!(identity, error = %e, "failed to remove resume record");
            self.events.error.emit(ErrorEvent {
                error: e.to_string(),
            });
        }
    }

    fn set_state(&self, state: UploadState) {
        debug!(?state, "upload state");
        *self.state.write().unwrap() = state;
    }
}

/// Saves `record`, reporting a failed write instead of propagating it.
///
/// A lost write only costs resumability.
fn persist_record(store: &ResumeStore, events: &EventBus, identity: &str, record: &UploadRecord) {
    if let Err(e) = store.set(identity, record) {
        warn!(identity, error = %e, "failed to persist resume record");
        events.error.emit(ErrorEvent {
            error: e.to_string(),
        });
    }
}

/// State shared by the part tasks of one upload.
struct PartContext {
    identity: String,
    upload_id: String,
    key: String,
    plan: PartPlan,
    payload: Arc<dyn PayloadSource>,
    control_plane: Arc<dyn ControlPlaneClient>,
    transport: Arc<dyn PartTransport>,
    store: ResumeStore,
    events: EventBus,
    record: Mutex<UploadRecord>,
    progress: Mutex<ProgressAggregator>,
}

impl PartContext {
    fn report_progress(&self, part_number: u32, percent: u8) {
        // Emit under the lock so reported values stay in order.
        let mut progress = self.progress.lock().unwrap();
        if let Some(percentage) = progress.update(part_number, percent) {
            self.events.total_progress.emit(TotalProgress { percentage });
        }
    }

    fn finish_progress(&self) {
        let mut progress = self.progress.lock().unwrap();
        if let Some(percentage) = progress.finish() {
            self.events.total_progress.emit(TotalProgress { percentage });
        }
    }

    fn record_part(&self, part: PartResult) {
        let mut record = self.record.lock().unwrap();
        record.insert_part(part);
        persist_record(&self.store, &self.events, &self.identity, &record);
    }
}

async fn transfer_part(ctx: Arc<PartContext>, part_number: u32) -> Result<PartResult, UploadError> {
    let signed = ctx
        .control_plane
        .sign_part(&SignPartRequest {
            upload_id: ctx.upload_id.clone(),
            key: ctx.key.clone(),
            part_number,
        })
        .await?;
    debug!(part_number, "part signed");
    ctx.events.part_signed.emit(PartSigned {
        part_number,
        signed_url: signed.url.clone(),
    });

    let (offset, len) = ctx
        .plan
        .range(part_number)
        .ok_or_else(|| UploadError::Transport {
            part_number,
            message: format!("part is outside of a {}-part plan", ctx.plan.total_parts),
        })?;
    let body = ctx.payload.read_range(offset, len).await?;

    let (tx, mut rx) = mpsc::channel(PROGRESS_BUFFER);
    let put = ctx.transport.put(
        PartPut {
            part_number,
            signed_url: signed.url,
            body,
        },
        tx,
    );
    let drain = async {
        while let Some(update) = rx.recv().await {
            ctx.report_progress(
                part_number,
                part_percentage(update.bytes_sent, update.bytes_total),
            );
        }
    };
    let (receipt, ()) = tokio::join!(put, drain);
    let receipt = receipt?;

    // Without a tag the part cannot be finalized; it stays pending.
    let Some(tag) = receipt
        .tag
        .as_deref()
        .map(strip_tag_quotes)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
    else {
        return Err(UploadError::Transport {
            part_number,
            message: "storage returned no tag for the part".into(),
        });
    };

    let part = PartResult::new(part_number, tag.clone());
    ctx.report_progress(part_number, 100);
    ctx.record_part(part.clone());
    debug!(part_number, offset, len, "part finished");
    ctx.events.part_succeeded.emit(PartSucceeded { part_number, tag });
    Ok(part)
}
