//! Part transfer seam.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use crate::error::UploadError;
use crate::types::{BytesProgress, PartPut, PartReceipt};

/// Boxed future returned by [`PartTransport::put`].
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<PartReceipt, UploadError>> + Send + 'a>>;

/// Sends part bodies to pre-signed URLs.
pub trait PartTransport: Send + Sync {
    /// Transfers one part.
    ///
    /// Byte progress goes to `progress` while the body is sent. The sender
    /// must be dropped once the transfer settles, which is automatic when it
    /// is moved into the returned future. Failures are reported as
    /// [`UploadError::Transport`] naming the part.
    fn put(&self, part: PartPut, progress: mpsc::Sender<BytesProgress>) -> TransportFuture<'_>;
}
