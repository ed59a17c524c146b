use crate::{DEFAULT_MAX_PARTS, DEFAULT_MIN_PART_SIZE, DEFAULT_SINGLE_PART_THRESHOLD};

/// How a payload is split into parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartPlan {
    /// Size of every part except possibly the last.
    pub part_size: u64,
    /// Number of parts (always at least 1).
    pub total_parts: u32,
    /// Size of the whole payload.
    pub total_size: u64,
}

impl PartPlan {
    /// Returns `(offset, len)` of a 1-based part, or `None` if out of range.
    pub fn range(&self, part_number: u32) -> Option<(u64, u64)> {
        if part_number == 0 || part_number > self.total_parts {
            return None;
        }
        let offset = u64::from(part_number - 1) * self.part_size;
        let len = self.part_size.min(self.total_size.saturating_sub(offset));
        Some((offset, len))
    }

    /// Part numbers in launch order.
    pub fn part_numbers(&self) -> std::ops::RangeInclusive<u32> {
        1..=self.total_parts
    }
}

/// Computes part size and count from the payload size and configured bounds.
///
/// `part_size = min_part_size + total_size / max_parts`, which keeps the part
/// count at or below `max_parts` for any payload without searching. An empty
/// payload still yields one (empty) part.
pub fn plan_parts(total_size: u64, min_part_size: u64, max_parts: u32) -> PartPlan {
    let min_part_size = min_part_size.max(1);
    let max_parts = u64::from(max_parts.max(1));

    let part_size = min_part_size + total_size / max_parts;
    let total_parts = total_size.div_ceil(part_size).max(1);

    PartPlan {
        part_size,
        // Bounded by max_parts, see above.
        total_parts: total_parts as u32,
        total_size,
    }
}

/// Part sizing limits applied to every upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartLimits {
    pub min_part_size: u64,
    pub max_parts: u32,
    /// Payloads at or below this size go out as one part.
    pub single_part_threshold: u64,
}

impl Default for PartLimits {
    fn default() -> Self {
        Self {
            min_part_size: DEFAULT_MIN_PART_SIZE,
            max_parts: DEFAULT_MAX_PARTS,
            single_part_threshold: DEFAULT_SINGLE_PART_THRESHOLD,
        }
    }
}

impl PartLimits {
    /// Plans a payload, sending small payloads whole.
    pub fn plan(&self, total_size: u64) -> PartPlan {
        if total_size <= self.single_part_threshold {
            return PartPlan {
                part_size: total_size.max(1),
                total_parts: 1,
                total_size,
            };
        }
        plan_parts(total_size, self.min_part_size, self.max_parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn hundred_mib_plan() {
        let plan = plan_parts(100 * MIB, 10 * MIB, 96);
        let expected_size = 10 * MIB + 100 * MIB / 96;
        assert_eq!(plan.part_size, expected_size);
        assert_eq!(plan.total_parts as u64, (100 * MIB).div_ceil(expected_size));
        assert_eq!(plan.total_parts, 10);
    }

    #[test]
    fn part_count_never_exceeds_max() {
        let sizes = [
            0,
            1,
            10 * MIB - 1,
            10 * MIB,
            10 * MIB + 1,
            960 * MIB,
            961 * MIB + 7,
            50 * 1024 * MIB,
            5 * 1024 * 1024 * MIB,
        ];
        for size in sizes {
            let plan = plan_parts(size, 10 * MIB, 96);
            assert!(plan.total_parts >= 1, "size {size}");
            assert!(plan.total_parts <= 96, "size {size}: {}", plan.total_parts);
        }
    }

    #[test]
    fn plan_covers_payload_exactly() {
        for size in [1, 999, 10 * MIB + 3, 700 * MIB] {
            let plan = plan_parts(size, 10 * MIB, 96);
            let parts = u64::from(plan.total_parts);
            assert!(plan.part_size * (parts - 1) < size);
            assert!(size <= plan.part_size * parts);
        }
    }

    #[test]
    fn empty_payload_has_one_part() {
        let plan = plan_parts(0, 10 * MIB, 96);
        assert_eq!(plan.total_parts, 1);
        assert_eq!(plan.range(1), Some((0, 0)));
    }

    #[test]
    fn ranges_are_contiguous() {
        let plan = plan_parts(25, 10, 96);
        assert_eq!(plan.total_parts, 3);
        assert_eq!(plan.range(1), Some((0, 10)));
        assert_eq!(plan.range(2), Some((10, 10)));
        assert_eq!(plan.range(3), Some((20, 5)));
        assert_eq!(plan.range(0), None);
        assert_eq!(plan.range(4), None);
    }

    #[test]
    fn part_numbers_ascending() {
        let plan = plan_parts(25, 10, 96);
        assert_eq!(plan.part_numbers().collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn small_payload_goes_whole() {
        let limits = PartLimits::default();
        let plan = limits.plan(25 * 1000 * 1000);
        assert_eq!(plan.total_parts, 1);
        assert_eq!(plan.part_size, 25 * 1000 * 1000);
        assert_eq!(plan.range(1), Some((0, 25 * 1000 * 1000)));
    }

    #[test]
    fn large_payload_uses_formula() {
        let limits = PartLimits::default();
        assert_eq!(limits.plan(100 * MIB), plan_parts(100 * MIB, 10 * MIB, 96));
    }

    #[test]
    fn zero_threshold_always_splits() {
        let limits = PartLimits {
            single_part_threshold: 0,
            ..PartLimits::default()
        };
        assert_eq!(limits.plan(25 * MIB).total_parts, 3);
        assert_eq!(limits.plan(0).total_parts, 1);
    }
}
