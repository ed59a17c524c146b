//! Typed lifecycle notifications.
//!
//! [`EventBus`] exposes one broadcast [`Channel`] per notification kind.
//! Subscribers attach with [`Channel::subscribe`] at any time and detach by
//! dropping the receiver; the orchestrator never depends on who listens.
//!
//! Possible order for one upload: `initialized` (once per uploader),
//! `upload_started`, then `upload_resumed` or `upload_created`, then per part
//! `part_started` → `part_signed` → `part_succeeded` interleaved with
//! `total_progress`, and finally `upload_completed` or `upload_failed`.
//! `error` carries failures that do not end the upload.

use capyupload_protocol::UploadRecord;
use tokio::sync::broadcast;

/// Buffered events per channel before slow subscribers start lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// A single notification kind.
#[derive(Debug, Clone)]
pub struct Channel<T> {
    tx: broadcast::Sender<T>,
}

impl<T: Clone> Channel<T> {
    fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Attaches a new subscriber. It sees events emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<T> {
        self.tx.subscribe()
    }

    /// Number of attached subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publishes to every current subscriber. Without subscribers the event
    /// is dropped.
    pub(crate) fn emit(&self, event: T) {
        let _ = self.tx.send(event);
    }
}

/// The uploader was constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Initialized {
    pub namespace: String,
}

/// An upload began its resume check.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadStarted {
    pub identity: String,
    pub total_size: u64,
}

/// A persisted record is being resumed.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadResumed {
    pub starting_percentage: u8,
    pub record: UploadRecord,
}

/// The control plane allocated a fresh upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadCreated {
    pub upload_id: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartStarted {
    pub part_number: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartSigned {
    pub part_number: u32,
    pub signed_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartSucceeded {
    pub part_number: u32,
    /// Tag with surrounding quotes removed.
    pub tag: String,
}

/// Overall percentage; strictly increasing within one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TotalProgress {
    pub percentage: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UploadCompleted {
    pub upload_id: String,
    /// Final object identifier.
    pub key: String,
}

/// The upload ended in failure.
///
/// `record` is the best known persisted state, `None` if the upload never
/// got past create.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFailed {
    pub error: String,
    pub record: Option<UploadRecord>,
}

/// A non-fatal failure, such as a resume record that could not be saved.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEvent {
    pub error: String,
}

/// One channel per notification kind.
#[derive(Debug, Clone)]
pub struct EventBus {
    pub initialized: Channel<Initialized>,
    pub upload_started: Channel<UploadStarted>,
    pub upload_resumed: Channel<UploadResumed>,
    pub upload_created: Channel<UploadCreated>,
    pub part_started: Channel<PartStarted>,
    pub part_signed: Channel<PartSigned>,
    pub part_succeeded: Channel<PartSucceeded>,
    pub total_progress: Channel<TotalProgress>,
    pub upload_completed: Channel<UploadCompleted>,
    pub upload_failed: Channel<UploadFailed>,
    pub error: Channel<ErrorEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Creates a bus with [`DEFAULT_CHANNEL_CAPACITY`] per channel.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            initialized: Channel::new(capacity),
            upload_started: Channel::new(capacity),
            upload_resumed: Channel::new(capacity),
            upload_created: Channel::new(capacity),
            part_started: Channel::new(capacity),
            part_signed: Channel::new(capacity),
            part_succeeded: Channel::new(capacity),
            total_progress: Channel::new(capacity),
            upload_completed: Channel::new(capacity),
            upload_failed: Channel::new(capacity),
            error: Channel::new(capacity),
        }
    }
}
