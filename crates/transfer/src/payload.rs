use std::fs::File;
use std::future::Future;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use crate::TransferError;

/// Boxed future returned by [`PayloadSource::read_range`].
pub type ReadFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>, TransferError>> + Send + 'a>>;

/// The bytes being uploaded.
///
/// Parts read their own byte range on demand, so a payload is never held in
/// memory as a whole unless the source itself is in memory.
pub trait PayloadSource: Send + Sync {
    /// Caller-chosen identity, used as the resume key (e.g. a file name).
    fn identity(&self) -> &str;

    /// Total size in bytes.
    fn size(&self) -> u64;

    /// MIME type sent to the control plane on create, if known.
    fn content_type(&self) -> Option<&str> {
        None
    }

    /// Reads exactly `len` bytes starting at `offset`.
    fn read_range(&self, offset: u64, len: u64) -> ReadFuture<'_>;
}

fn check_range(size: u64, offset: u64, len: u64) -> Result<(), TransferError> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(TransferError::InvalidRange { offset, len, size }),
    }
}

/// Guesses a MIME type from a file extension.
pub fn detect_content_type(path: &str) -> Option<&'static str> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("png") => Some("image/png"),
        Some("jpg" | "jpeg") => Some("image/jpeg"),
        Some("gif") => Some("image/gif"),
        Some("webp") => Some("image/webp"),
        Some("mp4") => Some("video/mp4"),
        Some("mov") => Some("video/quicktime"),
        Some("webm") => Some("video/webm"),
        Some("mp3") => Some("audio/mpeg"),
        Some("pdf") => Some("application/pdf"),
        Some("zip") => Some("application/zip"),
        Some("json") => Some("application/json"),
        Some("txt") => Some("text/plain"),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// MemoryPayload
// ---------------------------------------------------------------------------

/// A payload held in memory.
#[derive(Debug, Clone)]
pub struct MemoryPayload {
    identity: String,
    data: Arc<[u8]>,
    content_type: Option<String>,
}

impl MemoryPayload {
    pub fn new(identity: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            identity: identity.into(),
            data: data.into(),
            content_type: None,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

impl PayloadSource for MemoryPayload {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    fn read_range(&self, offset: u64, len: u64) -> ReadFuture<'_> {
        Box::pin(async move {
            check_range(self.size(), offset, len)?;
            let start = offset as usize;
            Ok(self.data[start..start + len as usize].to_vec())
        })
    }
}

// ---------------------------------------------------------------------------
// FilePayload
// ---------------------------------------------------------------------------

/// A payload backed by a file on disk.
///
/// Each range is read on a blocking thread with its own file handle, so
/// concurrent parts never share a cursor.
#[derive(Debug, Clone)]
pub struct FilePayload {
    path: PathBuf,
    identity: String,
    size: u64,
    content_type: Option<String>,
}

impl FilePayload {
    /// Opens `path`, using its file name as identity and guessing a MIME type.
    pub fn open(path: &Path) -> Result<Self, TransferError> {
        let size = std::fs::metadata(path)?.len();
        let identity = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        let content_type = detect_content_type(&identity).map(str::to_string);
        Ok(Self {
            path: path.to_path_buf(),
            identity,
            size,
            content_type,
        })
    }

    /// Overrides the resume identity.
    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into();
        self
    }

    /// Overrides the MIME type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_file_range(path: &Path, offset: u64, len: u64) -> Result<Vec<u8>, TransferError> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len as usize];
    file.read_exact(&mut buf)?;
    Ok(buf)
}

impl PayloadSource for FilePayload {
    fn identity(&self) -> &str {
        &self.identity
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    fn read_range(&self, offset: u64, len: u64) -> ReadFuture<'_> {
        Box::pin(async move {
            check_range(self.size, offset, len)?;
            let path = self.path.clone();
            tokio::task::spawn_blocking(move || read_file_range(&path, offset, len))
                .await
                .map_err(|e| TransferError::Join(e.to_string()))?
        })
    }
}
