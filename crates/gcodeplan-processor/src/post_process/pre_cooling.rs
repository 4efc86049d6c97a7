//! Pre-cooling and pre-heating of idle extruders
//!
//! While an extruder waits for its next filament it is cooled down, and
//! heated back up just in time for the filament that follows. Each idle
//! window is timed with the finalized per-move elapsed times; windows
//! shorter than the configured threshold are left alone.

use super::inserted::{InsertedKind, InsertedLines};
use super::usage::ExtruderFreeBlock;
use crate::result::MoveVertex;
use gcodeplan_core::TimeMode;
use gcodeplan_settings::Config;
use std::collections::BTreeMap;
use tracing::debug;

/// Temperature assumed for an extruder that has not printed yet (°C)
pub const IDLE_NOZZLE_TEMPERATURE: f32 = 140.0;

/// Cooling allowed in a post-extrusion range when no filament is known (°C)
pub const DEFAULT_PARTIAL_COOLING: f32 = 30.0;

const PRE_COOLING_COMMENT: &str = "Multi extruder pre cooling";
const POST_EXTRUSION_COOLING_COMMENT: &str = "Multi extruder pre cooling in post extrusion";
const PRE_HEATING_COMMENT: &str = "Multi extruder pre heating";

/// `M104 T<extruder> S<temp> N0 ;<comment>`; `N0` marks a generated line
pub fn format_m104(temperature: f32, extruder: usize, comment: &str) -> String {
    format!("M104 T{} S{} N0 ;{}\n", extruder, temperature as i32, comment)
}

/// Schedules temperature commands into the idle windows of every extruder
pub struct PreCoolingScheduler<'a> {
    moves: &'a [MoveVertex],
    config: &'a Config,
    mode: TimeMode,
    skippable_blocks: &'a [(u32, u32)],
}

impl<'a> PreCoolingScheduler<'a> {
    /// `moves` must be sorted by line id; times are read for `mode`
    pub fn new(
        moves: &'a [MoveVertex],
        config: &'a Config,
        mode: TimeMode,
        skippable_blocks: &'a [(u32, u32)],
    ) -> Self {
        Self {
            moves,
            config,
            mode,
            skippable_blocks,
        }
    }

    pub fn schedule(&self, free_blocks: &[ExtruderFreeBlock], inserted: &mut InsertedLines) {
        let mut per_extruder: BTreeMap<usize, Vec<&ExtruderFreeBlock>> = BTreeMap::new();
        for block in free_blocks {
            per_extruder.entry(block.extruder_id).or_default().push(block);
        }

        for blocks in per_extruder.values() {
            for (i, block) in blocks.iter().enumerate() {
                // nothing follows the last window to heat up for
                let pre_heating = i + 1 < blocks.len();
                let current = self.nozzle_temperature(block.last_filament, IDLE_NOZZLE_TEMPERATURE);
                let target = self.nozzle_temperature(block.next_filament, 0.0);
                self.inject(block, current, target, pre_heating, inserted);
            }
        }
    }

    fn nozzle_temperature(&self, filament: Option<usize>, default: f32) -> f32 {
        filament.map_or(default, |id| self.config.filament(id).nozzle_temperature as f32)
    }

    fn pre_cooling_valid(&self, filament: Option<usize>) -> bool {
        filament.is_some_and(|id| {
            let filament = self.config.filament(id);
            filament.pre_cooling_temperature > 0
                && filament.pre_cooling_temperature < filament.nozzle_temperature
        })
    }

    fn partial_cooling_limit(&self, filament: Option<usize>) -> f32 {
        filament.map_or(DEFAULT_PARTIAL_COOLING, |id| {
            let filament = self.config.filament(id);
            (filament.nozzle_temperature - filament.pre_cooling_temperature) as f32
        })
    }

    fn time(&self, index: usize) -> f32 {
        self.moves[index].time[self.mode.index()]
    }

    /// Index of the first move at or after `line_id`
    fn lower_bound(&self, line_id: u32) -> usize {
        self.moves.partition_point(|m| m.gcode_id < line_id)
    }

    fn skippable_start(&self, line_id: u32) -> Option<u32> {
        let index = self
            .skippable_blocks
            .partition_point(|(start, _)| *start <= line_id);
        let (start, end) = *self.skippable_blocks.get(index.checked_sub(1)?)?;
        (line_id >= start && line_id <= end).then_some(start)
    }

    /// Step back from `index` until the move is outside skippable regions,
    /// staying above `lower`
    fn leave_skippable(&self, mut index: usize, lower: usize) -> usize {
        while index != lower {
            let Some(start) = self.skippable_start(self.moves[index].gcode_id) else {
                break;
            };
            let before = lower + self.moves[lower..index].partition_point(|m| m.gcode_id < start);
            if before == lower {
                break;
            }
            index = before - 1;
        }
        index
    }

    fn inject(
        &self,
        block: &ExtruderFreeBlock,
        current: f32,
        target: f32,
        pre_heating: bool,
        inserted: &mut InsertedLines,
    ) {
        let len = self.moves.len();
        let lower = self.lower_bound(block.free_lower);
        let upper_end = self.lower_bound(block.free_upper);
        if lower == len || upper_end == 0 {
            return;
        }
        let upper = upper_end - 1;

        let partial_lower = self.lower_bound(block.partial_free_lower);
        let partial_upper_end = self.lower_bound(block.partial_free_upper);
        if partial_lower == len || partial_upper_end == 0 {
            return;
        }
        let partial_upper = partial_upper_end - 1;
        if lower >= upper {
            return;
        }

        let cool_partial = self.pre_cooling_valid(block.last_filament);
        let partial_gap = (self.time(partial_upper) - self.time(partial_lower)).max(0.0);
        let free_gap = self.time(upper) - self.time(lower);
        let threshold = self.config.estimator.inject_time_threshold;
        let usable_gap = if cool_partial {
            partial_gap + free_gap
        } else {
            free_gap
        };
        if usable_gap < threshold {
            return;
        }

        let extruder = self.config.extruder(block.extruder_id);
        let (cooling_rate, heating_rate) = (extruder.cooling_rate, extruder.heating_rate);
        let mut current = current;

        if cool_partial {
            let cooling = current.min(
                self.partial_cooling_limit(block.last_filament)
                    .min(partial_gap * cooling_rate),
            );
            current -= cooling;
            inserted.push(
                block.partial_free_lower,
                InsertedKind::PreCooling,
                format_m104(current, block.extruder_id, POST_EXTRUSION_COOLING_COMMENT),
            );
        }

        if !pre_heating {
            if target < current {
                inserted.push(
                    block.free_lower,
                    InsertedKind::PreCooling,
                    format_m104(target, block.extruder_id, PRE_COOLING_COMMENT),
                );
            }
            return;
        }

        // cool to a midpoint, then heat so the target is reached at `upper`
        let mid = ((current * heating_rate + target * cooling_rate
            - free_gap * cooling_rate * heating_rate)
            / (cooling_rate + heating_rate))
            .max(0.0);
        let heating_start = self.time(upper) - (target - mid) / heating_rate;
        let after = lower
            + self.moves[lower..=upper].partition_point(|m| m.time[self.mode.index()] <= heating_start);
        if after == lower {
            return;
        }
        let heating_index = self.leave_skippable(after - 1, lower);

        let cooling_time = self.time(heating_index) - self.time(lower);
        let cooled = ((cooling_time * cooling_rate) as i32).min(current as i32);
        if cooled == 0 {
            return;
        }
        debug!(
            "Extruder {} idle {:.1}s: cool to {}, heat to {} at line {}",
            block.extruder_id,
            free_gap,
            current as i32 - cooled,
            target as i32,
            self.moves[heating_index].gcode_id
        );
        inserted.push(
            block.free_lower,
            InsertedKind::PreCooling,
            format_m104(current - cooled as f32, block.extruder_id, PRE_COOLING_COMMENT),
        );
        inserted.push(
            self.moves[heating_index].gcode_id,
            InsertedKind::PreHeating,
            format_m104(target, block.extruder_id, PRE_HEATING_COMMENT),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcodeplan_core::{ExtrusionRole, MoveType, SkipType};
    use gcodeplan_settings::{ExtruderSettings, FilamentSettings};

    fn vertex(gcode_id: u32, time: f32) -> MoveVertex {
        MoveVertex {
            gcode_id,
            move_type: MoveType::Travel,
            role: ExtrusionRole::None,
            filament_id: 0,
            extruder_id: 0,
            position: [0.0; 3],
            delta_extruder: 0.0,
            feedrate: 0.0,
            width: 0.0,
            height: 0.0,
            mm3_per_mm: 0.0,
            fan_speed: 0.0,
            temperature: 0.0,
            layer_id: 1,
            layer_duration: 0.0,
            time: [time, time],
            print_z: 0.0,
            skip_type: SkipType::None,
            arc_center: None,
            interpolation_points: Vec::new(),
        }
    }

    fn config() -> Config {
        let mut config = Config::default();
        config.filaments = vec![
            FilamentSettings {
                nozzle_temperature: 220,
                pre_cooling_temperature: 0,
                extruder: 0,
                ..FilamentSettings::default()
            },
            FilamentSettings {
                nozzle_temperature: 200,
                pre_cooling_temperature: 0,
                extruder: 0,
                ..FilamentSettings::default()
            },
        ];
        config.extruders = vec![ExtruderSettings {
            cooling_rate: 2.0,
            heating_rate: 2.0,
        }];
        config.estimator.inject_time_threshold = 30.0;
        config
    }

    /// One move per line, one second apart
    fn moves(count: u32) -> Vec<MoveVertex> {
        (1..=count).map(|id| vertex(id, id as f32)).collect()
    }

    fn free_block(lower: u32, upper: u32) -> ExtruderFreeBlock {
        ExtruderFreeBlock {
            extruder_id: 0,
            free_lower: lower,
            free_upper: upper,
            partial_free_lower: lower,
            partial_free_upper: lower,
            last_filament: Some(0),
            next_filament: Some(1),
        }
    }

    #[test]
    fn test_format_m104() {
        assert_eq!(
            format_m104(180.7, 1, PRE_COOLING_COMMENT),
            "M104 T1 S180 N0 ;Multi extruder pre cooling\n"
        );
    }

    #[test]
    fn test_short_window_is_skipped() {
        let config = config();
        let moves = moves(200);
        let scheduler = PreCoolingScheduler::new(&moves, &config, TimeMode::Normal, &[]);
        let mut inserted = InsertedLines::new();
        scheduler.schedule(&[free_block(10, 20), free_block(150, 160)], &mut inserted);
        assert!(inserted.is_empty());
    }

    #[test]
    fn test_cool_then_heat() {
        let config = config();
        let moves = moves(200);
        let scheduler = PreCoolingScheduler::new(&moves, &config, TimeMode::Normal, &[]);
        let mut inserted = InsertedLines::new();
        // 100 s idle from 220 °C towards 200 °C: midpoint (440 + 400 - 400) / 4 = 110
        scheduler.schedule(&[free_block(50, 151), free_block(180, 200)], &mut inserted);

        let lines: Vec<_> = inserted.iter().collect();
        assert_eq!(lines.len(), 2);
        let (cool_id, cool) = lines[0];
        assert_eq!(cool_id, 50);
        assert_eq!(cool.kind, InsertedKind::PreCooling);
        assert_eq!(cool.text, "M104 T0 S110 N0 ;Multi extruder pre cooling\n");

        let (heat_id, heat) = lines[1];
        assert_eq!(heat.kind, InsertedKind::PreHeating);
        assert_eq!(heat.text, "M104 T0 S200 N0 ;Multi extruder pre heating\n");
        // heating 90 °C at 2 °C/s starts 45 s before the window ends
        assert_eq!(heat_id, 105);
    }

    #[test]
    fn test_last_window_only_cools() {
        let config = config();
        let moves = moves(200);
        let scheduler = PreCoolingScheduler::new(&moves, &config, TimeMode::Normal, &[]);
        let mut inserted = InsertedLines::new();
        let mut last = free_block(100, 190);
        last.next_filament = None;
        scheduler.schedule(&[last], &mut inserted);

        let lines: Vec<_> = inserted.iter().collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].0, 100);
        assert_eq!(lines[0].1.text, "M104 T0 S0 N0 ;Multi extruder pre cooling\n");
    }

    #[test]
    fn test_heating_point_leaves_skippable_region() {
        let config = config();
        let moves = moves(200);
        let skippable = [(100, 110)];
        let scheduler = PreCoolingScheduler::new(&moves, &config, TimeMode::Normal, &skippable);
        let mut inserted = InsertedLines::new();
        scheduler.schedule(&[free_block(50, 151), free_block(180, 200)], &mut inserted);
        let heat = inserted
            .iter()
            .find(|(_, line)| line.kind == InsertedKind::PreHeating)
            .unwrap();
        assert_eq!(heat.0, 99);
    }
}
