use std::collections::HashMap;

/// Converts a `(bytes_sent, bytes_total)` pair into a whole percentage.
///
/// An empty transfer counts as complete.
pub fn part_percentage(bytes_sent: u64, bytes_total: u64) -> u8 {
    if bytes_total == 0 {
        return 100;
    }
    let pct = (u128::from(bytes_sent) * 100 / u128::from(bytes_total)).min(100);
    pct as u8
}

/// Folds per-part percentages into one overall percentage.
///
/// The overall value is `floor(sum / total_parts)`. [`update`](Self::update)
/// only reports a value when it is strictly greater than the last reported
/// one, so the reported sequence never decreases and never repeats.
#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    total_parts: u32,
    parts: HashMap<u32, u8>,
    last_reported: u8,
    hundred_reported: bool,
}

impl ProgressAggregator {
    /// Creates an aggregator for `total_parts` parts.
    pub fn new(total_parts: u32) -> Self {
        Self {
            total_parts: total_parts.max(1),
            parts: HashMap::new(),
            last_reported: 0,
            hundred_reported: false,
        }
    }

    /// Marks already finished parts as 100% without reporting.
    ///
    /// Returns the resulting overall percentage, which becomes the floor for
    /// later reports.
    pub fn seed_finished(&mut self, part_numbers: impl IntoIterator<Item = u32>) -> u8 {
        for n in part_numbers {
            self.parts.insert(n, 100);
        }
        self.last_reported = self.last_reported.max(self.overall());
        self.last_reported
    }

    /// Records the percentage of one part.
    ///
    /// Returns the new overall percentage if it advanced.
    pub fn update(&mut self, part_number: u32, percent: u8) -> Option<u8> {
        self.parts.insert(part_number, percent.min(100));
        let overall = self.overall();
        if overall > self.last_reported {
            self.last_reported = overall;
            self.hundred_reported = overall == 100;
            Some(overall)
        } else {
            None
        }
    }

    /// Reports 100 unless [`update`](Self::update) already did.
    ///
    /// Called once every part is finished, so a resumed upload that had
    /// nothing left to transfer still ends its sequence at 100. A seed of
    /// 100 sets the floor without reporting, so it does not count.
    pub fn finish(&mut self) -> Option<u8> {
        if self.hundred_reported {
            return None;
        }
        self.hundred_reported = true;
        self.last_reported = 100;
        Some(100)
    }

    /// Current overall percentage (may be below the last reported value).
    pub fn overall(&self) -> u8 {
        let sum: u64 = self.parts.values().map(|&p| u64::from(p)).sum();
        (sum / u64::from(self.total_parts)).min(100) as u8
    }

    /// Last value returned by [`update`](Self::update) or the seed.
    pub fn last_reported(&self) -> u8 {
        self.last_reported
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_of_bytes() {
        assert_eq!(part_percentage(0, 200), 0);
        assert_eq!(part_percentage(199, 200), 99);
        assert_eq!(part_percentage(200, 200), 100);
        assert_eq!(part_percentage(300, 200), 100);
        assert_eq!(part_percentage(0, 0), 100);
    }

    #[test]
    fn overall_is_floor_of_average() {
        let mut agg = ProgressAggregator::new(3);
        assert_eq!(agg.update(1, 50), Some(16));
        assert_eq!(agg.update(2, 50), Some(33));
        assert_eq!(agg.update(3, 50), Some(50));
    }

    #[test]
    fn reports_are_strictly_increasing() {
        let mut agg = ProgressAggregator::new(4);
        let updates = [(1, 10), (1, 11), (2, 40), (1, 5), (3, 100), (4, 100), (1, 100), (2, 100)];
        let mut reported = Vec::new();
        for (part, pct) in updates {
            if let Some(p) = agg.update(part, pct) {
                reported.push(p);
            }
        }
        assert!(reported.windows(2).all(|w| w[0] < w[1]), "{reported:?}");
        assert_eq!(reported.last(), Some(&100));
    }

    #[test]
    fn regression_is_not_reported() {
        let mut agg = ProgressAggregator::new(2);
        assert_eq!(agg.update(1, 80), Some(40));
        assert_eq!(agg.update(1, 20), None);
        assert_eq!(agg.overall(), 10);
        assert_eq!(agg.last_reported(), 40);
        // Catching up to the previous value is still not new progress.
        assert_eq!(agg.update(1, 80), None);
        assert_eq!(agg.update(2, 2), Some(41));
    }

    #[test]
    fn seeded_parts_set_the_floor() {
        let mut agg = ProgressAggregator::new(3);
        assert_eq!(agg.seed_finished([1]), 33);
        assert_eq!(agg.update(2, 1), None);
        assert_eq!(agg.update(2, 3), Some(34));
        agg.update(2, 100);
        assert_eq!(agg.update(3, 100), Some(100));
    }

    #[test]
    fn single_part_reaches_hundred() {
        let mut agg = ProgressAggregator::new(1);
        assert_eq!(agg.update(1, 100), Some(100));
        assert_eq!(agg.update(1, 100), None);
    }

    #[test]
    fn finish_reports_hundred_once() {
        let mut agg = ProgressAggregator::new(3);
        assert_eq!(agg.seed_finished([1, 2, 3]), 100);
        assert_eq!(agg.finish(), Some(100));
        assert_eq!(agg.finish(), None);

        let mut agg = ProgressAggregator::new(2);
        agg.update(1, 100);
        assert_eq!(agg.finish(), Some(100));
        assert_eq!(agg.finish(), None);
        assert_eq!(agg.update(2, 100), None);
    }
}
