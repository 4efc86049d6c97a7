//! Filament and extruder usage ranges
//!
//! The first pass records which filament, and which physical extruder, is
//! in use over which half-open range of lines. The pre-cooling scheduler
//! turns those ranges into idle windows per extruder.

use super::offsets::OffsetMap;

/// Line id of a boundary that was never seen
pub const UNSET: u32 = u32::MAX;

/// Lines `[lower, upper)` printed with one filament
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilamentUsageBlock {
    pub filament_id: Option<usize>,
    pub lower: u32,
    pub upper: u32,
}

/// Lines printed with one physical extruder
///
/// `post_extrusion_*` delimit the tail of the block between the start of a
/// nozzle change and its end, where the extruder is no longer printing the
/// model but is not idle yet either.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtruderUsageBlock {
    pub extruder_id: Option<usize>,
    pub start_id: u32,
    pub end_id: u32,
    pub start_filament: Option<usize>,
    pub end_filament: Option<usize>,
    pub post_extrusion_start: u32,
    pub post_extrusion_end: u32,
}

impl Default for ExtruderUsageBlock {
    fn default() -> Self {
        Self {
            extruder_id: None,
            start_id: UNSET,
            end_id: UNSET,
            start_filament: None,
            end_filament: None,
            post_extrusion_start: UNSET,
            post_extrusion_end: UNSET,
        }
    }
}

impl ExtruderUsageBlock {
    pub fn open(&mut self, extruder_id: Option<usize>, start_id: u32, filament: Option<usize>) {
        self.extruder_id = extruder_id;
        self.start_id = start_id;
        self.start_filament = filament;
    }

    pub fn mark_post_extrusion(&mut self, line_id: u32) {
        self.post_extrusion_start = line_id;
    }

    pub fn close(&mut self, end_id: u32, filament: Option<usize>, post_extrusion_end: u32) {
        self.end_id = end_id;
        self.end_filament = filament;
        self.post_extrusion_end = post_extrusion_end;
    }

    pub(super) fn shift(&mut self, offsets: &OffsetMap) {
        self.start_id = offsets.shift(self.start_id);
        self.end_id = offsets.shift(self.end_id);
        self.post_extrusion_start = offsets.shift(self.post_extrusion_start);
        self.post_extrusion_end = offsets.shift(self.post_extrusion_end);
    }
}

/// Window in which an extruder sits idle between two usages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtruderFreeBlock {
    pub extruder_id: usize,
    pub free_lower: u32,
    pub free_upper: u32,
    /// Post-extrusion range before the window; equal to `free_lower`
    /// when there is none
    pub partial_free_lower: u32,
    pub partial_free_upper: u32,
    pub last_filament: Option<usize>,
    pub next_filament: Option<usize>,
}

/// Machine start / end G-code boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcodeBounds {
    /// Last line of the machine start G-code
    pub start_gcode_end: u32,
    /// First line of the machine end G-code
    pub end_gcode_start: u32,
}

impl Default for GcodeBounds {
    fn default() -> Self {
        Self {
            start_gcode_end: UNSET,
            end_gcode_start: UNSET,
        }
    }
}

/// Idle windows per physical extruder, sorted by position in the file
///
/// Extruder blocks are only meaningful when the file carries nozzle change
/// tags; without them the filament blocks are grouped by extruder instead.
pub fn build_free_blocks(
    filament_blocks: &[FilamentUsageBlock],
    extruder_blocks: &[ExtruderUsageBlock],
    filament_map: &[usize],
    bounds: GcodeBounds,
) -> Vec<ExtruderFreeBlock> {
    let mut blocks = if extruder_blocks.len() <= 1 {
        free_blocks_by_filament(filament_blocks, filament_map, bounds)
    } else {
        free_blocks_by_extruder(extruder_blocks, filament_map, bounds)
    };
    blocks.sort_by_key(|b| (b.free_lower, b.free_upper));
    blocks
}

fn extruder_count(filament_map: &[usize]) -> usize {
    filament_map.iter().max().map_or(1, |max| max + 1)
}

fn free_blocks_by_filament(
    filament_blocks: &[FilamentUsageBlock],
    filament_map: &[usize],
    bounds: GcodeBounds,
) -> Vec<ExtruderFreeBlock> {
    let start = FilamentUsageBlock {
        filament_id: None,
        lower: 0,
        upper: bounds.start_gcode_end,
    };
    let end = FilamentUsageBlock {
        filament_id: None,
        lower: bounds.end_gcode_start,
        upper: UNSET,
    };

    let mut per_extruder = vec![vec![start]; extruder_count(filament_map)];
    for block in filament_blocks {
        let Some(extruder) = block
            .filament_id
            .and_then(|id| filament_map.get(id))
            .copied()
        else {
            continue;
        };
        per_extruder[extruder].push(*block);
    }

    let mut free = Vec::new();
    for (extruder_id, mut usages) in per_extruder.into_iter().enumerate() {
        usages.push(end);
        for pair in usages.windows(2) {
            free.push(ExtruderFreeBlock {
                extruder_id,
                free_lower: pair[0].upper,
                free_upper: pair[1].lower,
                partial_free_lower: pair[0].upper,
                partial_free_upper: pair[0].upper,
                last_filament: pair[0].filament_id,
                next_filament: pair[1].filament_id,
            });
        }
    }
    free
}

fn free_blocks_by_extruder(
    extruder_blocks: &[ExtruderUsageBlock],
    filament_map: &[usize],
    bounds: GcodeBounds,
) -> Vec<ExtruderFreeBlock> {
    let count = extruder_blocks
        .iter()
        .filter_map(|b| b.extruder_id)
        .map(|id| id + 1)
        .max()
        .unwrap_or(0)
        .max(extruder_count(filament_map));

    let mut per_extruder: Vec<Vec<ExtruderUsageBlock>> = (0..count)
        .map(|extruder_id| {
            let mut start = ExtruderUsageBlock::default();
            start.open(Some(extruder_id), 0, None);
            start.mark_post_extrusion(bounds.start_gcode_end);
            start.close(bounds.start_gcode_end, None, bounds.start_gcode_end);
            vec![start]
        })
        .collect();
    for block in extruder_blocks {
        if let Some(extruder) = block.extruder_id {
            per_extruder[extruder].push(*block);
        }
    }

    let mut free = Vec::new();
    for (extruder_id, mut usages) in per_extruder.into_iter().enumerate() {
        let mut end = ExtruderUsageBlock::default();
        end.open(Some(extruder_id), bounds.end_gcode_start, None);
        usages.push(end);
        for pair in usages.windows(2) {
            free.push(ExtruderFreeBlock {
                extruder_id,
                free_lower: pair[0].end_id,
                free_upper: pair[1].start_id,
                partial_free_lower: pair[0].post_extrusion_start,
                partial_free_upper: pair[0].post_extrusion_end,
                last_filament: pair[0].end_filament,
                next_filament: pair[1].start_filament,
            });
        }
    }
    free
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filament_block(filament: usize, lower: u32, upper: u32) -> FilamentUsageBlock {
        FilamentUsageBlock {
            filament_id: Some(filament),
            lower,
            upper,
        }
    }

    const BOUNDS: GcodeBounds = GcodeBounds {
        start_gcode_end: 10,
        end_gcode_start: 500,
    };

    #[test]
    fn test_free_blocks_by_filament() {
        // filaments 0 and 1 on extruder 0, filament 2 on extruder 1
        let map = [0, 0, 1];
        let blocks = [
            filament_block(0, 20, 100),
            filament_block(2, 100, 200),
            filament_block(1, 200, 500),
        ];
        let free = build_free_blocks(&blocks, &[ExtruderUsageBlock::default()], &map, BOUNDS);
        assert_eq!(free.len(), 5);

        let extruder0: Vec<_> = free.iter().filter(|b| b.extruder_id == 0).collect();
        assert_eq!(extruder0.len(), 3);
        assert_eq!((extruder0[0].free_lower, extruder0[0].free_upper), (10, 20));
        assert_eq!(extruder0[0].last_filament, None);
        assert_eq!((extruder0[1].free_lower, extruder0[1].free_upper), (100, 200));
        assert_eq!(extruder0[1].last_filament, Some(0));
        assert_eq!(extruder0[1].next_filament, Some(1));
        assert_eq!(extruder0[1].partial_free_lower, 100);
        assert_eq!(extruder0[1].partial_free_upper, 100);

        let extruder1: Vec<_> = free.iter().filter(|b| b.extruder_id == 1).collect();
        assert_eq!((extruder1[1].free_lower, extruder1[1].free_upper), (200, 500));

        assert!(free.windows(2).all(|w| w[0].free_lower <= w[1].free_lower));
    }

    #[test]
    fn test_free_blocks_by_extruder() {
        let map = [0, 1];
        let mut first = ExtruderUsageBlock::default();
        first.open(Some(0), 10, Some(0));
        first.mark_post_extrusion(90);
        first.close(100, Some(0), 100);
        let mut second = ExtruderUsageBlock::default();
        second.open(Some(1), 100, Some(1));
        second.mark_post_extrusion(500);
        second.close(500, Some(1), 500);

        let free = build_free_blocks(&[], &[first, second], &map, BOUNDS);
        let after_first = free
            .iter()
            .find(|b| b.extruder_id == 0 && b.free_lower == 100)
            .unwrap();
        assert_eq!(after_first.free_upper, 500);
        assert_eq!(after_first.partial_free_lower, 90);
        assert_eq!(after_first.partial_free_upper, 100);
        assert_eq!(after_first.last_filament, Some(0));
        assert_eq!(after_first.next_filament, None);

        let before_second = free
            .iter()
            .find(|b| b.extruder_id == 1 && b.free_upper == 100)
            .unwrap();
        assert_eq!(before_second.free_lower, 10);
        assert_eq!(before_second.next_filament, Some(1));
    }
}
