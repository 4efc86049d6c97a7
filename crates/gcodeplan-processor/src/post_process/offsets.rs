//! Line id reconciliation after inserting lines

use super::usage::UNSET;

/// Cumulative count of lines inserted by one rewrite pass
///
/// Built once from `(line id, inserted count)` pairs in file order and then
/// applied to every recorded position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OffsetMap {
    line_ids: Vec<u32>,
    prefix_sums: Vec<u32>,
}

impl OffsetMap {
    pub fn new(offsets: &[(u32, u32)]) -> Self {
        let mut line_ids = Vec::with_capacity(offsets.len());
        let mut prefix_sums = Vec::with_capacity(offsets.len());
        let mut sum = 0;
        for (line_id, count) in offsets {
            debug_assert!(
                line_ids.last().map_or(true, |last| last <= line_id),
                "offsets out of order"
            );
            sum += count;
            line_ids.push(*line_id);
            prefix_sums.push(sum);
        }
        Self {
            line_ids,
            prefix_sums,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.line_ids.is_empty()
    }

    /// Total number of inserted lines
    pub fn total(&self) -> u32 {
        self.prefix_sums.last().copied().unwrap_or(0)
    }

    /// Lines inserted at or before `line_id`
    pub fn offset_at(&self, line_id: u32) -> u32 {
        self.sum_of_first(self.line_ids.partition_point(|id| *id <= line_id))
    }

    /// Lines inserted strictly before `line_id`
    pub fn offset_before(&self, line_id: u32) -> u32 {
        self.sum_of_first(self.line_ids.partition_point(|id| *id < line_id))
    }

    /// `line_id` moved past the lines inserted at or before it
    pub fn shift(&self, line_id: u32) -> u32 {
        if line_id == UNSET {
            return UNSET;
        }
        line_id + self.offset_at(line_id)
    }

    fn sum_of_first(&self, count: usize) -> u32 {
        match count {
            0 => 0,
            n => self.prefix_sums[n - 1],
        }
    }
}
