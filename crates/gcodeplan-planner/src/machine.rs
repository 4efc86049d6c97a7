//! Time machines
//!
//! A [`TimeMachine`] simulates the whole file under one set of machine
//! limits. Blocks are queued by the builder, planned together, and flushed
//! from the head of the queue once enough look-ahead is available. Every
//! flushed block is reported to the caller as a [`FinalizedMove`].

use crate::block::TimeBlock;
use crate::passes;
use gcodeplan_core::{AxisCoords, CustomGcodeType, ExtrusionRole, MoveType, TimeMode};
use gcodeplan_settings::ModeLimits;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Blocks kept unflushed so later moves can still change their exit speed
pub const PLANNER_QUEUE_SIZE: usize = 64;

/// Queue length at which the older blocks are flushed
pub const PLANNER_REFRESH_THRESHOLD: usize = 256;

/// Kinematic state at the end of the last built block
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct KinematicState {
    pub feedrate: f32,
    pub safe_feedrate: f32,
    pub axis_feedrate: AxisCoords,
    pub abs_axis_feedrate: AxisCoords,
    /// Unit XYZ direction at the start of the move
    pub enter_direction: [f32; 3],
    /// Unit XYZ direction at the end of the move
    pub exit_direction: [f32; 3],
}

impl KinematicState {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Timing of one flushed block
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinalizedMove {
    pub move_id: usize,
    /// Machine time at the end of the block (s)
    pub elapsed: f32,
    /// Duration of the block including folded-in delays (s)
    pub block_time: f32,
    pub skippable: bool,
}

/// Pending "time to next stop" entry
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopTime {
    pub g1_line_id: u32,
    pub elapsed: f32,
}

/// Machine time at the end of a G1 line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct G1LineTime {
    pub g1_line_id: u32,
    pub elapsed: f32,
}

/// Time spent between custom G-code events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomGcodeTime {
    /// Set once the file contains at least one event
    pub needed: bool,
    /// Time accumulated since the previous event
    pub cache: f32,
    pub times: Vec<(CustomGcodeType, f32)>,
}

impl CustomGcodeTime {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Fixed delay waiting to be folded into a block of a matching role
#[derive(Debug, Clone, Copy, PartialEq)]
struct AdditionalTime {
    role: ExtrusionRole,
    time: f32,
}

/// Simulation of the file under one machine profile
#[derive(Debug, Clone)]
pub struct TimeMachine {
    mode: TimeMode,
    enabled: bool,
    pub(crate) acceleration: f32,
    max_acceleration: f32,
    pub(crate) retract_acceleration: f32,
    max_retract_acceleration: f32,
    pub(crate) travel_acceleration: f32,
    max_travel_acceleration: f32,
    pub(crate) extrude_factor_override: f32,
    time: f32,
    prepare_time: f32,
    stop_times: Vec<StopTime>,
    pub(crate) curr: KinematicState,
    pub(crate) prev: KinematicState,
    custom_gcode_time: CustomGcodeTime,
    pub(crate) blocks: Vec<TimeBlock>,
    g1_times_cache: Vec<G1LineTime>,
    moves_time: [f32; MoveType::COUNT],
    roles_time: [f32; ExtrusionRole::COUNT],
    layers_time: Vec<f32>,
    additional_time: VecDeque<AdditionalTime>,
}

impl TimeMachine {
    pub fn new(mode: TimeMode, limits: &ModeLimits) -> Self {
        let mut machine = Self {
            mode,
            enabled: false,
            acceleration: 0.0,
            max_acceleration: 0.0,
            retract_acceleration: 0.0,
            max_retract_acceleration: 0.0,
            travel_acceleration: 0.0,
            max_travel_acceleration: 0.0,
            extrude_factor_override: 1.0,
            time: 0.0,
            prepare_time: 0.0,
            stop_times: Vec::new(),
            curr: KinematicState::default(),
            prev: KinematicState::default(),
            custom_gcode_time: CustomGcodeTime::default(),
            blocks: Vec::new(),
            g1_times_cache: Vec::new(),
            moves_time: [0.0; MoveType::COUNT],
            roles_time: [0.0; ExtrusionRole::COUNT],
            layers_time: Vec::new(),
            additional_time: VecDeque::new(),
        };
        machine.reset(limits);
        machine
    }

    /// Clear all state and reload the accelerations from `limits`
    pub fn reset(&mut self, limits: &ModeLimits) {
        self.enabled = false;
        self.max_acceleration = limits.max_print_acceleration;
        self.max_retract_acceleration = limits.max_retract_acceleration;
        self.max_travel_acceleration = limits.max_travel_acceleration;
        self.acceleration = clamp_to_max(limits.print_acceleration, self.max_acceleration);
        self.retract_acceleration =
            clamp_to_max(limits.retract_acceleration, self.max_retract_acceleration);
        self.travel_acceleration =
            clamp_to_max(limits.travel_acceleration, self.max_travel_acceleration);
        self.extrude_factor_override = 1.0;
        self.time = 0.0;
        self.prepare_time = 0.0;
        self.stop_times.clear();
        self.curr.reset();
        self.prev.reset();
        self.custom_gcode_time.reset();
        self.blocks.clear();
        self.g1_times_cache.clear();
        self.moves_time = [0.0; MoveType::COUNT];
        self.roles_time = [0.0; ExtrusionRole::COUNT];
        self.layers_time.clear();
        self.additional_time.clear();
    }

    pub fn mode(&self) -> TimeMode {
        self.mode
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn acceleration(&self) -> f32 {
        self.acceleration
    }

    pub fn retract_acceleration(&self) -> f32 {
        self.retract_acceleration
    }

    pub fn travel_acceleration(&self) -> f32 {
        self.travel_acceleration
    }

    /// Printing acceleration, capped by the configured maximum
    pub fn set_acceleration(&mut self, value: f32) {
        self.acceleration = clamp_to_max(value, self.max_acceleration);
    }

    pub fn set_retract_acceleration(&mut self, value: f32) {
        self.retract_acceleration = clamp_to_max(value, self.max_retract_acceleration);
    }

    pub fn set_travel_acceleration(&mut self, value: f32) {
        self.travel_acceleration = clamp_to_max(value, self.max_travel_acceleration);
    }

    pub fn extrude_factor_override(&self) -> f32 {
        self.extrude_factor_override
    }

    pub fn set_extrude_factor_override(&mut self, factor: f32) {
        self.extrude_factor_override = factor;
    }

    /// Total simulated time (s)
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Time spent in the start G-code (s)
    pub fn prepare_time(&self) -> f32 {
        self.prepare_time
    }

    pub fn moves_time(&self) -> &[f32; MoveType::COUNT] {
        &self.moves_time
    }

    pub fn roles_time(&self) -> &[f32; ExtrusionRole::COUNT] {
        &self.roles_time
    }

    /// Time per layer; index 0 is layer 1
    pub fn layers_time(&self) -> &[f32] {
        &self.layers_time
    }

    pub fn g1_times_cache(&self) -> &[G1LineTime] {
        &self.g1_times_cache
    }

    pub fn stop_times(&self) -> &[StopTime] {
        &self.stop_times
    }

    pub fn custom_gcode_times(&self) -> &[(CustomGcodeType, f32)] {
        &self.custom_gcode_time.times
    }

    /// Blocks not yet flushed
    pub fn blocks(&self) -> &[TimeBlock] {
        &self.blocks
    }

    /// Register a stop (colour change or pause) at a G1 line
    pub fn add_stop(&mut self, g1_line_id: u32) {
        if self.enabled {
            self.stop_times.push(StopTime {
                g1_line_id,
                elapsed: 0.0,
            });
        }
    }

    /// Queue a block built outside the builder (e.g. a tool change carrier)
    pub fn push_block(&mut self, block: TimeBlock) {
        if self.enabled {
            self.blocks.push(block);
        }
    }

    /// Plan the queue and flush all but the last `keep_last_n_blocks`
    ///
    /// `additional_time` is buffered tagged with `target_role` and folded
    /// into the first flushed block with a matching role.
    pub fn calculate_time(
        &mut self,
        keep_last_n_blocks: usize,
        additional_time: f32,
        target_role: ExtrusionRole,
    ) -> Vec<FinalizedMove> {
        self.calculate_time_with_min(keep_last_n_blocks, additional_time, target_role, 2)
    }

    /// Firmware "wait for moves to finish" barrier
    pub fn simulate_wait(&mut self, extra_time: f32, role: ExtrusionRole) -> Vec<FinalizedMove> {
        self.calculate_time(0, extra_time, role)
    }

    /// Close the segment of time since the previous custom G-code event
    pub fn process_custom_gcode_time(&mut self, code: CustomGcodeType) -> Vec<FinalizedMove> {
        if !self.enabled {
            return Vec::new();
        }
        self.custom_gcode_time.needed = true;
        let moves = self.simulate_wait(0.0, ExtrusionRole::None);
        if self.custom_gcode_time.cache != 0.0 {
            self.custom_gcode_time
                .times
                .push((code, self.custom_gcode_time.cache));
            self.custom_gcode_time.cache = 0.0;
        }
        moves
    }

    /// Flush everything that is left at the end of the file
    pub fn finalize(&mut self) -> Vec<FinalizedMove> {
        if !self.enabled {
            return Vec::new();
        }
        let moves = self.calculate_time_with_min(0, 0.0, ExtrusionRole::None, 1);

        // Delays that never met a block of their role still take time
        while let Some(extra) = self.additional_time.pop_front() {
            self.time += extra.time;
            self.roles_time[extra.role.index()] += extra.time;
            self.custom_gcode_time.cache += extra.time;
        }

        if self.custom_gcode_time.needed && self.custom_gcode_time.cache != 0.0 {
            self.custom_gcode_time
                .times
                .push((CustomGcodeType::ColorChange, self.custom_gcode_time.cache));
            self.custom_gcode_time.cache = 0.0;
        }
        moves
    }

    fn calculate_time_with_min(
        &mut self,
        keep_last_n_blocks: usize,
        additional_time: f32,
        target_role: ExtrusionRole,
        min_blocks: usize,
    ) -> Vec<FinalizedMove> {
        if !self.enabled {
            return Vec::new();
        }
        if additional_time > 0.0 {
            self.additional_time.push_back(AdditionalTime {
                role: target_role,
                time: additional_time,
            });
        }
        if self.blocks.len() < min_blocks || self.blocks.is_empty() {
            return Vec::new();
        }
        self.merge_additional_time();

        debug_assert!(keep_last_n_blocks <= self.blocks.len());
        let keep = keep_last_n_blocks.min(self.blocks.len());

        passes::plan(&mut self.blocks);

        let n_blocks_process = self.blocks.len() - keep;
        let mut finalized = Vec::with_capacity(n_blocks_process);
        for i in 0..n_blocks_process {
            let block = &self.blocks[i];
            let mut block_time = block.time();
            if let Some(front) = self.additional_time.front() {
                if front.role == ExtrusionRole::None || front.role == block.role {
                    block_time += front.time;
                    self.additional_time.pop_front();
                }
            }

            self.time += block_time;
            self.custom_gcode_time.cache += block_time;
            if block.flags.prepare_stage {
                self.prepare_time += block_time;
            }
            if !(block.flags.prepare_stage && block.move_type == MoveType::Travel) {
                self.moves_time[block.move_type.index()] += block_time;
            }
            self.roles_time[block.role.index()] += block_time;

            let layer_index = block.layer_id.max(1) as usize - 1;
            if layer_index >= self.layers_time.len() {
                self.layers_time.resize(layer_index + 1, 0.0);
            }
            self.layers_time[layer_index] += block_time;

            match self.g1_times_cache.last_mut() {
                Some(last) if last.g1_line_id == block.g1_line_id => last.elapsed = self.time,
                _ => self.g1_times_cache.push(G1LineTime {
                    g1_line_id: block.g1_line_id,
                    elapsed: self.time,
                }),
            }

            let stop = self
                .stop_times
                .partition_point(|s| s.g1_line_id < block.g1_line_id);
            if let Some(entry) = self.stop_times.get_mut(stop) {
                if entry.g1_line_id == block.g1_line_id {
                    entry.elapsed = self.time;
                }
            }

            finalized.push(FinalizedMove {
                move_id: block.move_id,
                elapsed: self.time,
                block_time,
                skippable: block.skippable,
            });
        }

        if keep == 0 {
            self.blocks.clear();
        } else {
            self.blocks.drain(..n_blocks_process);
        }

        finalized
    }

    fn merge_additional_time(&mut self) {
        let mut merged: VecDeque<AdditionalTime> = VecDeque::with_capacity(self.additional_time.len());
        for entry in self.additional_time.drain(..) {
            match merged.back_mut() {
                Some(last) if last.role == entry.role => last.time += entry.time,
                _ => merged.push_back(entry),
            }
        }
        self.additional_time = merged;
    }
}

fn clamp_to_max(value: f32, max: f32) -> f32 {
    if max > 0.0 {
        value.min(max)
    } else {
        value
    }
}
