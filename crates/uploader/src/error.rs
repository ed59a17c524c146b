//! Upload error types.

/// Errors surfaced by an upload.
///
/// Invalid or corrupt resume records never appear here: they are discarded
/// during the resume check and the upload starts fresh.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("control plane error: {0}")]
    ControlPlane(String),

    #[error("transport error on part {part_number}: {message}")]
    Transport { part_number: u32, message: String },

    #[error("payload error: {0}")]
    Payload(#[from] capyupload_transfer::TransferError),
}

