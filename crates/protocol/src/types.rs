use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// A finished part of a multipart upload.
///
/// A part without a tag cannot be finalized by the control plane and is
/// treated as not yet finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartResult {
    /// 1-based part number.
    pub part_number: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl PartResult {
    /// Creates a tagged part result.
    pub fn new(part_number: u32, tag: impl Into<String>) -> Self {
        Self {
            part_number,
            tag: Some(tag.into()),
        }
    }

    /// Returns `true` if the part carries a non-empty tag.
    pub fn is_tagged(&self) -> bool {
        self.tag.as_deref().is_some_and(|t| !t.is_empty())
    }
}

/// Returns the tagged entries of `parts`, preserving their order.
pub fn retain_tagged(parts: &[PartResult]) -> Vec<PartResult> {
    parts.iter().filter(|p| p.is_tagged()).cloned().collect()
}

/// Strips a single leading and a single trailing `"` from a transport tag.
///
/// Storage services echo the ETag header verbatim, quotes included.
pub fn strip_tag_quotes(tag: &str) -> &str {
    let tag = tag.strip_prefix('"').unwrap_or(tag);
    tag.strip_suffix('"').unwrap_or(tag)
}

/// Persisted progress of one in-flight upload.
///
/// Stored as JSON under `"<namespace>|<identity>"`. Every field defaults so
/// that a partially written record still parses and is then rejected by
/// [`UploadRecord::is_resumable`] instead of failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UploadRecord {
    pub original_identity: String,
    pub total_size_bytes: u64,
    pub total_parts: u32,
    pub part_size_bytes: u64,
    pub finished_parts: Vec<PartResult>,
    pub upload_id: String,
    pub target_key: String,
}

impl UploadRecord {
    /// Creates a record for a freshly created upload with no finished parts.
    pub fn new(
        original_identity: impl Into<String>,
        total_size_bytes: u64,
        total_parts: u32,
        part_size_bytes: u64,
        upload_id: impl Into<String>,
        target_key: impl Into<String>,
    ) -> Self {
        Self {
            original_identity: original_identity.into(),
            total_size_bytes,
            total_parts,
            part_size_bytes,
            finished_parts: Vec::new(),
            upload_id: upload_id.into(),
            target_key: target_key.into(),
        }
    }

    /// Returns `true` if the record can seed a resumed upload.
    ///
    /// Requires the control-plane identifiers, a plan that covers
    /// `total_size_bytes` and at least one tagged finished part, all of them
    /// within the plan.
    pub fn is_resumable(&self) -> bool {
        !self.upload_id.is_empty()
            && !self.target_key.is_empty()
            && self.total_parts > 0
            && self.part_size_bytes > 0
            && self.plan_covers_size()
            && self.finished_parts.iter().any(PartResult::is_tagged)
            && self
                .finished_parts
                .iter()
                .all(|p| (1..=self.total_parts).contains(&p.part_number))
    }

    /// Every part but the last is full and the last one is not empty.
    ///
    /// An empty payload is planned as a single empty part.
    fn plan_covers_size(&self) -> bool {
        if self.total_size_bytes == 0 {
            return self.total_parts == 1;
        }
        let parts = u64::from(self.total_parts);
        let (Some(full), Some(capacity)) = (
            self.part_size_bytes.checked_mul(parts.saturating_sub(1)),
            self.part_size_bytes.checked_mul(parts),
        ) else {
            return false;
        };
        full < self.total_size_bytes && self.total_size_bytes <= capacity
    }

    /// Drops finished parts that carry no tag.
    pub fn without_untagged_parts(mut self) -> Self {
        self.finished_parts.retain(PartResult::is_tagged);
        self
    }

    /// Records a finished part, replacing any earlier result for the same number.
    pub fn insert_part(&mut self, part: PartResult) {
        match self
            .finished_parts
            .iter_mut()
            .find(|p| p.part_number == part.part_number)
        {
            Some(existing) => *existing = part,
            None => self.finished_parts.push(part),
        }
    }

    /// Part numbers (ascending) that still need a transfer.
    pub fn pending_parts(&self) -> Vec<u32> {
        let done: HashSet<u32> = self
            .finished_parts
            .iter()
            .filter(|p| p.is_tagged())
            .map(|p| p.part_number)
            .collect();
        (1..=self.total_parts).filter(|n| !done.contains(n)).collect()
    }

    /// Tagged finished parts sorted by ascending part number.
    ///
    /// This is the order the control plane requires when finalizing.
    pub fn completion_parts(&self) -> Vec<PartResult> {
        let mut parts = retain_tagged(&self.finished_parts);
        parts.sort_by_key(|p| p.part_number);
        parts
    }
}

/// Lifecycle state of an upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadState {
    #[default]
    Idle,
    ResumeCheck,
    Created,
    Resuming,
    PartsInFlight,
    Completing,
    Completed,
    Failed,
}

impl UploadState {
    /// Returns `true` for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(parts: Vec<PartResult>) -> UploadRecord {
        UploadRecord {
            finished_parts: parts,
            ..UploadRecord::new("video.mp4", 30, 3, 10, "u1", "uploads/video.mp4")
        }
    }

    #[test]
    fn record_field_names() {
        let mut rec = record(vec![]);
        rec.insert_part(PartResult::new(1, "abc"));
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("\"originalIdentity\":\"video.mp4\""));
        assert!(json.contains("\"totalSizeBytes\":30"));
        assert!(json.contains("\"partSizeBytes\":10"));
        assert!(json.contains("\"finishedParts\":[{\"partNumber\":1,\"tag\":\"abc\"}]"));
        assert!(json.contains("\"uploadId\":\"u1\""));
        assert!(json.contains("\"targetKey\""));
    }

    #[test]
    fn record_missing_fields_parse_as_defaults() {
        let json = r#"{"originalIdentity":"a.bin","totalParts":2,"partSizeBytes":5}"#;
        let rec: UploadRecord = serde_json::from_str(json).unwrap();
        assert!(rec.upload_id.is_empty());
        assert!(rec.finished_parts.is_empty());
        assert!(!rec.is_resumable());
    }

    #[test]
    fn untagged_part_is_filtered_preserving_order() {
        let parts = vec![
            PartResult::new(3, "c"),
            PartResult {
                part_number: 1,
                tag: None,
            },
            PartResult::new(2, "b"),
        ];
        let kept = retain_tagged(&parts);
        assert_eq!(kept, vec![PartResult::new(3, "c"), PartResult::new(2, "b")]);
    }

    #[test]
    fn empty_tag_counts_as_untagged() {
        let part = PartResult::new(1, "");
        assert!(!part.is_tagged());
    }

    #[test]
    fn strip_quotes() {
        assert_eq!(strip_tag_quotes("\"abc\""), "abc");
        assert_eq!(strip_tag_quotes("abc"), "abc");
        assert_eq!(strip_tag_quotes("\"abc"), "abc");
        assert_eq!(strip_tag_quotes("\"\"abc\"\""), "\"abc\"");
    }

    #[test]
    fn resumable_requires_identifiers_and_parts() {
        let mut rec = record(vec![PartResult::new(1, "a")]);
        assert!(rec.is_resumable());

        rec.upload_id.clear();
        assert!(!rec.is_resumable());

        let rec = record(vec![]);
        assert!(!rec.is_resumable());

        let rec = record(vec![PartResult {
            part_number: 1,
            tag: None,
        }]);
        assert!(!rec.is_resumable());
    }

    #[test]
    fn resumable_requires_plan_covering_size() {
        let tagged = vec![PartResult::new(1, "a")];

        // 3 x 10 bytes cannot hold 100 bytes.
        let short = UploadRecord {
            finished_parts: tagged.clone(),
            ..UploadRecord::new("video.mp4", 100, 3, 10, "u1", "k")
        };
        assert!(!short.is_resumable());

        // A fourth part would be empty.
        let spare = UploadRecord {
            finished_parts: tagged.clone(),
            ..UploadRecord::new("video.mp4", 30, 4, 10, "u1", "k")
        };
        assert!(!spare.is_resumable());

        let huge = UploadRecord {
            finished_parts: tagged.clone(),
            ..UploadRecord::new("video.mp4", 100, u32::MAX, u64::MAX, "u1", "k")
        };
        assert!(!huge.is_resumable());

        let last_short = UploadRecord {
            finished_parts: tagged.clone(),
            ..UploadRecord::new("video.mp4", 25, 3, 10, "u1", "k")
        };
        assert!(last_short.is_resumable());

        let empty = UploadRecord {
            finished_parts: tagged,
            ..UploadRecord::new("video.mp4", 0, 1, 1, "u1", "k")
        };
        assert!(empty.is_resumable());
    }

    #[test]
    fn resumable_rejects_parts_outside_plan() {
        let rec = record(vec![PartResult::new(1, "a"), PartResult::new(4, "d")]);
        assert!(!rec.is_resumable());

        let rec = record(vec![PartResult::new(0, "z")]);
        assert!(!rec.is_resumable());
    }

    #[test]
    fn insert_part_replaces_same_number() {
        let mut rec = record(vec![]);
        rec.insert_part(PartResult {
            part_number: 2,
            tag: None,
        });
        rec.insert_part(PartResult::new(2, "b"));
        assert_eq!(rec.finished_parts, vec![PartResult::new(2, "b")]);
    }

    #[test]
    fn pending_parts_skip_tagged_only() {
        let rec = record(vec![
            PartResult::new(1, "a"),
            PartResult {
                part_number: 3,
                tag: None,
            },
        ]);
        assert_eq!(rec.pending_parts(), vec![2, 3]);
    }

    #[test]
    fn completion_parts_sorted_ascending() {
        let rec = record(vec![
            PartResult::new(3, "c"),
            PartResult::new(1, "a"),
            PartResult::new(2, "b"),
        ]);
        let numbers: Vec<u32> = rec.completion_parts().iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn upload_state_serialization() {
        assert_eq!(
            serde_json::to_string(&UploadState::PartsInFlight).unwrap(),
            "\"parts_in_flight\""
        );
        assert!(UploadState::Failed.is_terminal());
        assert!(!UploadState::Completing.is_terminal());
    }
}
