//! Resumable multipart uploads against an object-storage control plane.
//!
//! This crate implements the **client-side orchestration** of a multipart
//! upload. It has no network dependencies: the caller provides a
//! [`ControlPlaneClient`] and a [`PartTransport`] (see `capyupload-http` for
//! HTTP implementations) plus a [`KeyValueStore`] for resume records.
//!
//! # Pipeline
//!
//! 1. **Resume check** — look up a persisted [`UploadRecord`] for the payload identity
//! 2. **Create** — when nothing resumable exists, allocate an upload and plan its parts
//! 3. **Transfer** — sign and PUT every pending part, a bounded number at a time
//! 4. **Complete** — finalize with all tagged parts in ascending order
//!
//! Progress is persisted after every finished part, so a failed upload can be
//! retried by calling [`Uploader::upload`] again with the same identity.
//!
//! [`UploadRecord`]: capyupload_protocol::UploadRecord

pub mod config;
pub mod control_plane;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod store;
pub mod transport;
pub mod types;

// Re-export primary types for convenience.
pub use config::{UploadOptions, UploadOptionsOverrides};
pub use control_plane::{ControlPlaneClient, ControlPlaneFuture};
pub use error::UploadError;
pub use events::{
    Channel, ErrorEvent, EventBus, Initialized, PartSigned, PartStarted, PartSucceeded,
    TotalProgress, UploadCompleted, UploadCreated, UploadFailed, UploadResumed, UploadStarted,
};
pub use orchestrator::Uploader;
pub use store::{FileStore, KeyValueStore, MemoryStore, ResumeStore, StoreError};
pub use transport::{PartTransport, TransportFuture};
pub use types::{BytesProgress, PartPut, PartReceipt, UploadOutcome};
