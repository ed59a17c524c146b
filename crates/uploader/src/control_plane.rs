//! Control-plane seam.

use std::future::Future;
use std::pin::Pin;

use capyupload_protocol::{
    CompleteUploadRequest, CompleteUploadResponse, CreateUploadRequest, CreateUploadResponse,
    SignPartRequest, SignPartResponse,
};

use crate::error::UploadError;

/// Boxed future returned by [`ControlPlaneClient`] methods.
pub type ControlPlaneFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, UploadError>> + Send + 'a>>;

/// Remote service that allocates, signs and finalizes multipart uploads.
///
/// Implementations report failures as [`UploadError::ControlPlane`]. The
/// returned futures borrow only `self`, so requests may be dropped as soon as
/// the call returns.
pub trait ControlPlaneClient: Send + Sync {
    /// Allocates a new upload and returns its identifiers.
    fn create(&self, request: &CreateUploadRequest)
    -> ControlPlaneFuture<'_, CreateUploadResponse>;

    /// Returns a pre-signed URL for one part.
    fn sign_part(&self, request: &SignPartRequest) -> ControlPlaneFuture<'_, SignPartResponse>;

    /// Finalizes the upload. `request.parts` is sorted ascending.
    fn complete(
        &self,
        request: &CompleteUploadRequest,
    ) -> ControlPlaneFuture<'_, CompleteUploadResponse>;
}
