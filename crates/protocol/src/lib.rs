pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use messages::{
    CompleteUploadRequest, CompleteUploadResponse, CreateUploadRequest, CreateUploadResponse,
    SignPartRequest, SignPartResponse,
};
pub use types::{PartResult, UploadRecord, UploadState, retain_tagged, strip_tag_quotes};
