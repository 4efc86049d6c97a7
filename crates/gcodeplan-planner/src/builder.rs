//! Planner block construction
//!
//! Turns one classified move into a [`TimeBlock`]: feed rate floor,
//! centripetal cap, per-axis feed rate and acceleration clamps, jerk-limited
//! exit speed and the junction speed negotiated with the previous block.

use crate::block::{BlockFlags, FeedrateProfile, TimeBlock};
use crate::kinematics::max_allowable_speed;
use crate::machine::{FinalizedMove, TimeMachine, PLANNER_QUEUE_SIZE, PLANNER_REFRESH_THRESHOLD};
use gcodeplan_core::{Axis, AxisCoords, ExtrusionRole, MoveType};
use gcodeplan_settings::ModeLimits;

/// Below this the previous block is considered stopped
pub const PREVIOUS_FEEDRATE_THRESHOLD: f32 = 0.0001;

/// XY direction changes smaller than this are treated as collinear
pub const COLLINEAR_DIRECTION_EPSILON: f32 = 0.00001;

/// XY direction changes at or above this (about 29°) are not speed capped
pub const WIDE_TURN_DIRECTION_DELTA: f32 = 0.5;

/// Fraction of the junction speed above which both safe speeds count as a stop
pub const FULL_STOP_RATIO: f32 = 0.99;

/// Geometry of a move as seen by the planner
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MovePath {
    Line,
    Arc {
        radius: f32,
        arc_length: f32,
        /// Unit tangent at the start point
        enter_direction: [f32; 3],
        /// Unit tangent at the end point
        exit_direction: [f32; 3],
    },
}

/// Everything the builder needs to know about one move
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveRequest {
    pub move_type: MoveType,
    pub role: ExtrusionRole,
    pub skippable: bool,
    pub move_id: usize,
    pub g1_line_id: u32,
    pub layer_id: u32,
    /// Move is part of the start G-code
    pub prepare_stage: bool,
    /// End minus start position (mm)
    pub delta: AxisCoords,
    /// Path length, or |ΔE| for extruder-only moves (mm)
    pub distance: f32,
    /// Requested feed rate (mm/s)
    pub feedrate: f32,
    pub path: MovePath,
    /// Physical extruder executing the move
    pub extruder_id: usize,
}

impl MoveRequest {
    fn is_extrusion_only(&self) -> bool {
        self.delta[Axis::X] == 0.0
            && self.delta[Axis::Y] == 0.0
            && self.delta[Axis::Z] == 0.0
            && self.delta[Axis::E] != 0.0
    }
}

impl TimeMachine {
    /// Build a block for `request` and queue it
    ///
    /// Returns the moves flushed when the queue grew past the refresh
    /// threshold.
    pub fn plan_move(&mut self, request: &MoveRequest, limits: &ModeLimits) -> Vec<FinalizedMove> {
        if !self.is_enabled() || request.distance <= 0.0 {
            return Vec::new();
        }

        let inv_distance = 1.0 / request.distance;
        let extruder = request.extruder_id;
        let delta = request.delta;

        let mut block = TimeBlock {
            move_type: request.move_type,
            role: if request.move_type != MoveType::Travel || request.role == ExtrusionRole::Custom {
                request.role
            } else {
                ExtrusionRole::None
            },
            skippable: request.skippable,
            move_id: request.move_id,
            g1_line_id: request.g1_line_id,
            layer_id: request.layer_id.max(1),
            distance: request.distance,
            flags: BlockFlags {
                prepare_stage: request.prepare_stage,
                ..BlockFlags::default()
            },
            ..TimeBlock::default()
        };

        let travel_floor = match request.path {
            MovePath::Line => delta[Axis::E] == 0.0,
            MovePath::Arc { .. } => request.move_type == MoveType::Travel,
        };
        let floor = if travel_floor {
            limits.min_travel_feedrate
        } else {
            limits.min_extruding_feedrate
        };
        self.curr.feedrate = request.feedrate.max(floor);

        match request.path {
            MovePath::Line => {
                let mut direction = delta.xyz();
                if !request.is_extrusion_only() {
                    let norm = delta.xyz_length();
                    if norm > 0.0 {
                        direction = direction.map(|c| c / norm);
                    }
                }
                self.curr.enter_direction = direction;
                self.curr.exit_direction = direction;
                self.limit_by_corner(delta);
            }
            MovePath::Arc {
                radius,
                arc_length,
                enter_direction,
                exit_direction,
            } => {
                self.curr.enter_direction = enter_direction;
                self.curr.exit_direction = exit_direction;
                let xy_share = arc_length * inv_distance;
                if xy_share > 0.0 {
                    let cap = (self.acceleration * radius).sqrt() / xy_share;
                    self.curr.feedrate = self.curr.feedrate.min(cap);
                }
            }
        }

        // Cruise feed rate: project on the axes, scale everything down by
        // the most restrictive axis
        let mut min_feedrate_factor: f32 = 1.0;
        for axis in Axis::ALL {
            let component = match (request.path, axis) {
                (MovePath::Arc { arc_length, .. }, Axis::X | Axis::Y) => {
                    self.curr.feedrate * arc_length * inv_distance
                }
                _ => self.curr.feedrate * delta[axis] * inv_distance,
            };
            self.curr.axis_feedrate[axis] = if axis == Axis::E {
                component * self.extrude_factor_override
            } else {
                component
            };
            self.curr.abs_axis_feedrate[axis] = self.curr.axis_feedrate[axis].abs();
            if self.curr.abs_axis_feedrate[axis] != 0.0 {
                let max = limits.axis_max_feedrate(axis, extruder);
                if max != 0.0 {
                    min_feedrate_factor =
                        min_feedrate_factor.min(max / self.curr.abs_axis_feedrate[axis]);
                }
            }
        }
        self.curr.feedrate *= min_feedrate_factor;
        let cruise = self.curr.feedrate;
        if min_feedrate_factor < 1.0 {
            for axis in Axis::ALL {
                self.curr.axis_feedrate[axis] *= min_feedrate_factor;
                self.curr.abs_axis_feedrate[axis] *= min_feedrate_factor;
            }
        }

        block.acceleration = self.block_acceleration(request, limits, inv_distance);

        // Exit speed that needs no deceleration under the jerk limits
        let mut safe_feedrate = cruise;
        for axis in Axis::ALL {
            let jerk = limits.axis_max_jerk(axis);
            if self.curr.abs_axis_feedrate[axis] > jerk {
                safe_feedrate = safe_feedrate.min(jerk);
            }
        }
        self.curr.safe_feedrate = safe_feedrate;

        let vmax_junction = self.junction_speed(cruise, limits);

        let v_allowable = max_allowable_speed(-block.acceleration, safe_feedrate, block.distance);
        block.feedrate_profile = FeedrateProfile {
            entry: vmax_junction.min(v_allowable),
            cruise,
            exit: safe_feedrate,
        };
        block.max_entry_speed = vmax_junction;
        block.flags.nominal_length = cruise <= v_allowable;
        block.flags.recalculate = true;
        block.safe_feedrate = safe_feedrate;
        block.calculate_trapezoid();

        self.prev = self.curr;
        self.blocks.push(block);

        if self.blocks.len() > PLANNER_REFRESH_THRESHOLD {
            self.calculate_time(PLANNER_QUEUE_SIZE, 0.0, ExtrusionRole::None)
        } else {
            Vec::new()
        }
    }

    /// Cap the feed rate of a straight move by the centripetal acceleration
    /// of the corner it makes with the previous move
    fn limit_by_corner(&mut self, delta: AxisCoords) {
        let prev_dir = self.prev.exit_direction;
        let curr_dir = self.curr.enter_direction;
        let prev_in_plane = prev_dir[0] != 0.0 || prev_dir[1] != 0.0;
        let curr_in_plane = curr_dir[0] != 0.0 || curr_dir[1] != 0.0;
        if !(prev_in_plane && curr_in_plane) {
            return;
        }

        let v1 = normalized_xy(prev_dir);
        let v2 = normalized_xy(curr_dir);
        let norm_diff = ((v2[0] - v1[0]).powi(2) + (v2[1] - v1[1]).powi(2)).sqrt();
        if norm_diff >= WIDE_TURN_DIRECTION_DELTA || norm_diff <= COLLINEAR_DIRECTION_EPSILON {
            return;
        }

        let dot = v1[0] * v2[0] + v1[1] * v2[1];
        let cross = v1[0] * v2[1] - v1[1] * v2[0];
        let angle = cross.atan2(dot);
        let sin_theta_2 = ((1.0 - angle.cos()) * 0.5).sqrt();
        if sin_theta_2 <= 0.0 {
            return;
        }
        let radius = delta.xy_length() * 0.5 / sin_theta_2;
        self.curr.feedrate = self.curr.feedrate.min((self.acceleration * radius).sqrt());
    }

    fn block_acceleration(&self, request: &MoveRequest, limits: &ModeLimits, inv_distance: f32) -> f32 {
        let extruder = request.extruder_id;
        match request.path {
            MovePath::Line => {
                let mut acceleration = if request.move_type == MoveType::Travel {
                    self.travel_acceleration
                } else if request.is_extrusion_only() {
                    self.retract_acceleration
                } else {
                    self.acceleration
                };
                for axis in Axis::ALL {
                    let max = limits.axis_max_acceleration(axis, extruder);
                    let share = request.delta[axis].abs() * inv_distance;
                    if max != 0.0 && acceleration * share > max {
                        acceleration = max / share;
                    }
                }
                acceleration
            }
            MovePath::Arc { arc_length, .. } => {
                let acceleration = if request.move_type == MoveType::Travel {
                    self.travel_acceleration
                } else {
                    self.acceleration
                };
                let mut min_acc_factor: f32 = 1.0;
                for axis in [Axis::X, Axis::Y, Axis::Z] {
                    let axis_acc = if axis == Axis::Z {
                        acceleration * request.delta[axis].abs() * inv_distance
                    } else {
                        acceleration * arc_length * inv_distance
                    };
                    if axis_acc != 0.0 {
                        let max = limits.axis_max_acceleration(axis, extruder);
                        if max != 0.0 && axis_acc > max {
                            min_acc_factor = min_acc_factor.min(max / axis_acc);
                        }
                    }
                }
                acceleration * min_acc_factor
            }
        }
    }

    /// Entry speed allowed at the junction with the previous block
    fn junction_speed(&self, cruise: f32, limits: &ModeLimits) -> f32 {
        let curr = &self.curr;
        let prev = &self.prev;
        let mut vmax_junction = curr.safe_feedrate;
        if self.blocks.is_empty() || prev.feedrate <= PREVIOUS_FEEDRATE_THRESHOLD {
            return vmax_junction;
        }

        let prev_speed_larger = prev.feedrate > cruise;
        let smaller_speed_factor = if prev_speed_larger {
            cruise / prev.feedrate
        } else {
            prev.feedrate / cruise
        };
        // Coasting never reaches a speed higher than the slower of the two blocks
        vmax_junction = if prev_speed_larger { cruise } else { prev.feedrate };

        let mut v_factor: f32 = 1.0;
        let mut limited = false;

        let exit_scale = if prev_speed_larger {
            prev.feedrate * smaller_speed_factor
        } else {
            prev.feedrate
        };
        let mut jerk_v = [0.0_f32; 3];
        for (i, jerk) in jerk_v.iter_mut().enumerate() {
            *jerk = (cruise * curr.enter_direction[i] - exit_scale * prev.exit_direction[i]).abs();
        }
        let max_xyz_jerk = [
            limits.axis_max_jerk(Axis::X),
            limits.axis_max_jerk(Axis::Y),
            limits.axis_max_jerk(Axis::Z),
        ];
        for i in 0..3 {
            if jerk_v[i] > max_xyz_jerk[i] {
                v_factor *= max_xyz_jerk[i] / jerk_v[i];
                for component in jerk_v.iter_mut() {
                    *component *= v_factor;
                }
                limited = true;
            }
        }

        // Extruder: coasting in one direction or reversing
        let mut v_exit = prev.axis_feedrate[Axis::E];
        let mut v_entry = curr.axis_feedrate[Axis::E];
        if prev_speed_larger {
            v_exit *= smaller_speed_factor;
        }
        if limited {
            v_exit *= v_factor;
            v_entry *= v_factor;
        }
        let jerk = if v_exit > v_entry {
            if v_entry > 0.0 || v_exit < 0.0 {
                v_exit - v_entry
            } else {
                v_exit.max(-v_entry)
            }
        } else if v_entry < 0.0 || v_exit > 0.0 {
            v_entry - v_exit
        } else {
            (-v_exit).max(v_entry)
        };
        let max_e_jerk = limits.axis_max_jerk(Axis::E);
        if jerk > max_e_jerk {
            v_factor *= max_e_jerk / jerk;
            limited = true;
        }

        if limited {
            vmax_junction *= v_factor;
        }

        // Both sides would stop anyway, start the block from its safe speed
        let threshold = vmax_junction * FULL_STOP_RATIO;
        if prev.safe_feedrate > threshold && curr.safe_feedrate > threshold {
            vmax_junction = curr.safe_feedrate;
        }
        vmax_junction
    }
}

fn normalized_xy(direction: [f32; 3]) -> [f32; 2] {
    let norm = (direction[0].powi(2) + direction[1].powi(2)).sqrt();
    if norm > 0.0 {
        [direction[0] / norm, direction[1] / norm]
    } else {
        [0.0, 0.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcodeplan_core::TimeMode;
    use gcodeplan_settings::AxisLimits;

    fn limits(jerk: f32) -> ModeLimits {
        ModeLimits {
            max_feedrate: AxisLimits::new(0.0, 0.0, 0.0, 0.0),
            max_acceleration: AxisLimits::new(0.0, 0.0, 0.0, 0.0),
            max_jerk: AxisLimits::new(jerk, jerk, jerk, jerk),
            print_acceleration: 1000.0,
            retract_acceleration: 1000.0,
            travel_acceleration: 1000.0,
            max_print_acceleration: 0.0,
            max_retract_acceleration: 0.0,
            max_travel_acceleration: 0.0,
            ..ModeLimits::default()
        }
    }

    fn travel(move_id: usize, dx: f32, dy: f32, feedrate: f32) -> MoveRequest {
        let delta = AxisCoords([dx, dy, 0.0, 0.0]);
        MoveRequest {
            move_type: MoveType::Travel,
            role: ExtrusionRole::None,
            skippable: false,
            move_id,
            g1_line_id: move_id as u32 + 1,
            layer_id: 1,
            prepare_stage: false,
            delta,
            distance: delta.xyz_length(),
            feedrate,
            path: MovePath::Line,
            extruder_id: 0,
        }
    }

    fn machine(limits: &ModeLimits) -> TimeMachine {
        let mut machine = TimeMachine::new(TimeMode::Normal, limits);
        machine.set_enabled(true);
        machine
    }

    #[test]
    fn test_collinear_junction_keeps_cruise() {
        let limits = limits(0.0);
        let mut m = machine(&limits);
        m.plan_move(&travel(0, 10.0, 0.0, 10.0), &limits);
        m.plan_move(&travel(1, 10.0, 0.0, 10.0), &limits);
        assert_eq!(m.blocks()[1].max_entry_speed, 10.0);
    }

    #[test]
    fn test_reversal_forces_full_stop() {
        let limits = limits(0.0);
        let mut m = machine(&limits);
        m.plan_move(&travel(0, 10.0, 0.0, 10.0), &limits);
        m.plan_move(&travel(1, -10.0, 0.0, 10.0), &limits);
        let block = &m.blocks()[1];
        assert_eq!(block.max_entry_speed, block.safe_feedrate);
        assert_eq!(block.max_entry_speed, 0.0);
    }

    #[test]
    fn test_axis_feedrate_clamp_scales_uniformly() {
        let mut limits = limits(1000.0);
        limits.max_feedrate = AxisLimits::new(5.0, 0.0, 0.0, 0.0);
        let mut m = machine(&limits);
        m.plan_move(&travel(0, 10.0, 10.0, 20.0), &limits);
        let cruise = m.blocks()[0].feedrate_profile.cruise;
        // X component of 20 mm/s along the diagonal is 14.14, clamp to 5
        let expected = 5.0 * 2.0_f32.sqrt();
        assert!((cruise - expected).abs() < 1e-4);
    }

    #[test]
    fn test_axis_acceleration_clamp() {
        let mut limits = limits(1000.0);
        limits.max_acceleration = AxisLimits::new(0.0, 0.0, 50.0, 0.0);
        let mut m = machine(&limits);
        let delta = AxisCoords([0.0, 0.0, 2.0, 0.0]);
        let request = MoveRequest {
            delta,
            distance: 2.0,
            ..travel(0, 0.0, 0.0, 5.0)
        };
        m.plan_move(&request, &limits);
        assert_eq!(m.blocks()[0].acceleration, 50.0);
    }

    #[test]
    fn test_travel_role_is_cleared() {
        let limits = limits(10.0);
        let mut m = machine(&limits);
        let mut request = travel(0, 10.0, 0.0, 10.0);
        request.role = ExtrusionRole::Perimeter;
        m.plan_move(&request, &limits);
        request.role = ExtrusionRole::Custom;
        request.move_id = 1;
        m.plan_move(&request, &limits);
        assert_eq!(m.blocks()[0].role, ExtrusionRole::None);
        assert_eq!(m.blocks()[1].role, ExtrusionRole::Custom);
    }

    #[test]
    fn test_refresh_threshold_flushes_head() {
        let limits = limits(10.0);
        let mut m = machine(&limits);
        let mut flushed = 0;
        for i in 0..=PLANNER_REFRESH_THRESHOLD {
            flushed += m.plan_move(&travel(i, 1.0, 0.0, 10.0), &limits).len();
        }
        assert_eq!(flushed, PLANNER_REFRESH_THRESHOLD + 1 - PLANNER_QUEUE_SIZE);
        assert_eq!(m.blocks().len(), PLANNER_QUEUE_SIZE);
    }

    #[test]
    fn test_arc_centripetal_cap() {
        let limits = limits(1000.0);
        let mut m = machine(&limits);
        let arc_length = std::f32::consts::PI;
        let request = MoveRequest {
            move_type: MoveType::Travel,
            delta: AxisCoords([2.0, 0.0, 0.0, 0.0]),
            distance: arc_length,
            feedrate: 1000.0,
            path: MovePath::Arc {
                radius: 1.0,
                arc_length,
                enter_direction: [0.0, 1.0, 0.0],
                exit_direction: [0.0, -1.0, 0.0],
            },
            ..travel(0, 0.0, 0.0, 0.0)
        };
        m.plan_move(&request, &limits);
        // sqrt(1000 mm/s² * 1 mm)
        let cruise = m.blocks()[0].feedrate_profile.cruise;
        assert!((cruise - 1000.0_f32.sqrt()).abs() < 1e-3);
    }
}
