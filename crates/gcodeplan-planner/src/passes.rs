//! Look-ahead passes over a block queue
//!
//! The reverse pass makes sure every block can decelerate to the entry
//! speed of its successor, the forward pass makes sure every block can
//! actually accelerate to its own entry speed. Trapezoids are rebuilt only
//! after both passes have settled the entry speeds.

use crate::block::TimeBlock;
use crate::kinematics::max_allowable_speed;

fn reverse_pass_kernel(curr: &mut TimeBlock, next: &TimeBlock) {
    if curr.feedrate_profile.entry != curr.max_entry_speed {
        curr.feedrate_profile.entry =
            if !curr.flags.nominal_length && curr.max_entry_speed > next.feedrate_profile.entry {
                curr.max_entry_speed.min(max_allowable_speed(
                    -curr.acceleration,
                    next.feedrate_profile.entry,
                    curr.distance,
                ))
            } else {
                curr.max_entry_speed
            };
        curr.flags.recalculate = true;
    }
}

fn forward_pass_kernel(prev: &TimeBlock, curr: &mut TimeBlock) {
    if !prev.flags.nominal_length && prev.feedrate_profile.entry < curr.feedrate_profile.entry {
        let entry = curr.feedrate_profile.entry.min(max_allowable_speed(
            -prev.acceleration,
            prev.feedrate_profile.entry,
            prev.distance,
        ));
        if curr.feedrate_profile.entry != entry {
            curr.feedrate_profile.entry = entry;
            curr.flags.recalculate = true;
        }
    }
}

/// Walk the queue from the tail, limiting entry speeds by what the block
/// can shed before the next one starts
pub fn reverse_pass(blocks: &mut [TimeBlock]) {
    for i in (1..blocks.len()).rev() {
        let (head, tail) = blocks.split_at_mut(i);
        reverse_pass_kernel(&mut head[i - 1], &tail[0]);
    }
}

/// Walk the queue from the head, limiting entry speeds by what the previous
/// block can gain over its length
pub fn forward_pass(blocks: &mut [TimeBlock]) {
    for i in 1..blocks.len() {
        let (head, tail) = blocks.split_at_mut(i);
        forward_pass_kernel(&head[i - 1], &mut tail[0]);
    }
}

/// Rebuild the trapezoid of every block touching a changed junction
///
/// The last block always exits at its own safe feed rate.
pub fn recalculate_trapezoids(blocks: &mut [TimeBlock]) {
    let n = blocks.len();
    if n == 0 {
        return;
    }
    for i in 0..n - 1 {
        let next_entry = blocks[i + 1].feedrate_profile.entry;
        let next_recalculate = blocks[i + 1].flags.recalculate;
        let curr = &mut blocks[i];
        if curr.flags.recalculate || next_recalculate {
            curr.feedrate_profile.exit = next_entry;
            curr.calculate_trapezoid();
            curr.flags.recalculate = false;
        }
    }
    let last = &mut blocks[n - 1];
    last.feedrate_profile.exit = last.safe_feedrate;
    last.calculate_trapezoid();
    last.flags.recalculate = false;
}

/// Settle entry speeds and trapezoids of the whole queue
pub fn plan(blocks: &mut [TimeBlock]) {
    reverse_pass(blocks);
    forward_pass(blocks);
    recalculate_trapezoids(blocks);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::FeedrateProfile;

    fn queued(distance: f32, cruise: f32, max_entry: f32, safe: f32) -> TimeBlock {
        TimeBlock {
            distance,
            acceleration: 100.0,
            max_entry_speed: max_entry,
            safe_feedrate: safe,
            feedrate_profile: FeedrateProfile {
                entry: max_entry,
                cruise,
                exit: safe,
            },
            flags: crate::block::BlockFlags {
                recalculate: true,
                ..Default::default()
            },
            ..TimeBlock::default()
        }
    }

    #[test]
    fn test_reverse_pass_limits_entry_before_stop() {
        // Short block followed by a block that must start from rest
        let mut blocks = vec![queued(0.5, 20.0, 20.0, 0.0), queued(10.0, 20.0, 0.0, 0.0)];
        blocks[0].feedrate_profile.entry = 0.0;
        plan(&mut blocks);
        // Must stop within 0.5 mm at 100 mm/s²: entry at most 10 mm/s
        assert!(blocks[0].feedrate_profile.entry <= 10.0 + 1e-4);
        assert_eq!(blocks[1].feedrate_profile.entry, 0.0);
        assert!(blocks.iter().all(|b| !b.flags.recalculate));
    }

    #[test]
    fn test_forward_pass_limits_reachable_entry() {
        let mut blocks = vec![queued(0.5, 20.0, 0.0, 0.0), queued(10.0, 20.0, 20.0, 0.0)];
        plan(&mut blocks);
        // From rest over 0.5 mm at 100 mm/s² only 10 mm/s is reachable
        assert!((blocks[1].feedrate_profile.entry - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_last_block_exits_at_safe_feedrate() {
        let mut blocks = vec![queued(10.0, 20.0, 5.0, 5.0)];
        plan(&mut blocks);
        assert_eq!(blocks[0].feedrate_profile.exit, 5.0);
    }
}
