//! Upload options.
//!
//! [`UploadOptions`] carries the effective settings with documented defaults.
//! [`UploadOptionsOverrides`] holds the same settings as optional fields (as
//! read from a config file or command line) and is applied field by field.

use std::collections::HashMap;

use capyupload_transfer::{
    DEFAULT_MAX_PARTS, DEFAULT_MIN_PART_SIZE, DEFAULT_SINGLE_PART_THRESHOLD, PartLimits,
};
use serde::{Deserialize, Serialize};

use crate::error::UploadError;

/// Default resume-store namespace.
pub const DEFAULT_NAMESPACE: &str = "capyupload";

/// Default number of concurrently transferred parts.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Effective upload settings.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOptions {
    /// Prefix of every resume-store key (`"<namespace>|<identity>"`).
    pub namespace: String,
    /// Lower bound for the part size (default 10 MiB).
    pub min_part_size: u64,
    /// Upper bound for the part count (default 96).
    pub max_parts: u32,
    /// Payloads at or below this size are sent as one part (default 32 MiB).
    pub single_part_threshold: u64,
    /// Parts transferred at the same time (default 4).
    pub concurrency: usize,
    /// MIME type sent on create; falls back to the payload's own guess.
    pub content_type: Option<String>,
    /// Metadata sent on create.
    pub metadata: HashMap<String, String>,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.into(),
            min_part_size: DEFAULT_MIN_PART_SIZE,
            max_parts: DEFAULT_MAX_PARTS,
            single_part_threshold: DEFAULT_SINGLE_PART_THRESHOLD,
            concurrency: DEFAULT_CONCURRENCY,
            content_type: None,
            metadata: HashMap::new(),
        }
    }
}

/// Optional settings layered over [`UploadOptions`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadOptionsOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_part_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_parts: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub single_part_threshold: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Entries are added to (and replace same-named) default metadata.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
}

impl UploadOptionsOverrides {
    /// Layers `other` over `self`: fields set in `other` win.
    pub fn merge(mut self, other: UploadOptionsOverrides) -> Self {
        if other.namespace.is_some() {
            self.namespace = other.namespace;
        }
        if other.min_part_size.is_some() {
            self.min_part_size = other.min_part_size;
        }
        if other.max_parts.is_some() {
            self.max_parts = other.max_parts;
        }
        if other.single_part_threshold.is_some() {
            self.single_part_threshold = other.single_part_threshold;
        }
        if other.concurrency.is_some() {
            self.concurrency = other.concurrency;
        }
        if other.content_type.is_some() {
            self.content_type = other.content_type;
        }
        if let Some(metadata) = other.metadata {
            self.metadata.get_or_insert_with(HashMap::new).extend(metadata);
        }
        self
    }
}

impl UploadOptions {
    /// Applies every field set in `overrides`.
    pub fn apply(mut self, overrides: UploadOptionsOverrides) -> Self {
        if let Some(namespace) = overrides.namespace {
            self.namespace = namespace;
        }
        if let Some(v) = overrides.min_part_size {
            self.min_part_size = v;
        }
        if let Some(v) = overrides.max_parts {
            self.max_parts = v;
        }
        if let Some(v) = overrides.single_part_threshold {
            self.single_part_threshold = v;
        }
        if let Some(v) = overrides.concurrency {
            self.concurrency = v;
        }
        if let Some(content_type) = overrides.content_type {
            self.content_type = Some(content_type);
        }
        if let Some(metadata) = overrides.metadata {
            self.metadata.extend(metadata);
        }
        self
    }

    /// Rejects settings the orchestrator cannot run with.
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.namespace.is_empty() {
            return Err(UploadError::Configuration("namespace must not be empty".into()));
        }
        if self.namespace.contains('|') {
            return Err(UploadError::Configuration(format!(
                "namespace must not contain '|': {}",
                self.namespace
            )));
        }
        if self.min_part_size == 0 {
            return Err(UploadError::Configuration(
                "min_part_size must be at least 1 byte".into(),
            ));
        }
        if self.max_parts == 0 {
            return Err(UploadError::Configuration("max_parts must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(UploadError::Configuration(
                "concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Part sizing limits derived from these options.
    pub fn part_limits(&self) -> PartLimits {
        PartLimits {
            min_part_size: self.min_part_size,
            max_parts: self.max_parts,
            single_part_threshold: self.single_part_threshold,
        }
    }
}
