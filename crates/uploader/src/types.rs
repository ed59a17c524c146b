//! Values exchanged between the orchestrator and its transport.

/// Byte-level progress of one part transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BytesProgress {
    pub bytes_sent: u64,
    pub bytes_total: u64,
}

/// One part ready to be sent to its pre-signed URL.
#[derive(Debug, Clone)]
pub struct PartPut {
    pub part_number: u32,
    pub signed_url: String,
    pub body: Vec<u8>,
}

/// What the storage service returned for a finished part.
///
/// `tag` is the raw entity tag, possibly still wrapped in quotes. `None`
/// means the response carried no tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartReceipt {
    pub part_number: u32,
    pub tag: Option<String>,
}

/// Summary of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    /// Final object identifier.
    pub key: String,
    pub upload_id: String,
    /// Number of parts sent to complete.
    pub parts: usize,
    /// Whether the upload continued a persisted record.
    pub resumed: bool,
}
