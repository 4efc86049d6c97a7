//! Planner blocks and their velocity trapezoids

use crate::kinematics::{
    acceleration_time_from_distance, estimated_acceleration_distance, intersection_distance,
    speed_from_distance,
};
use gcodeplan_core::{ExtrusionRole, MoveType};
use serde::{Deserialize, Serialize};

/// Speeds at the start, middle and end of a block (mm/s)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FeedrateProfile {
    pub entry: f32,
    pub cruise: f32,
    pub exit: f32,
}

/// Accelerate / cruise / decelerate split of a block
///
/// `accelerate_until` and `decelerate_after` are distances from the block
/// start and satisfy `0 <= accelerate_until <= decelerate_after <= distance`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Trapezoid {
    pub accelerate_until: f32,
    pub decelerate_after: f32,
    pub cruise_feedrate: f32,
}

impl Trapezoid {
    pub fn acceleration_time(&self, entry_feedrate: f32, acceleration: f32) -> f32 {
        acceleration_time_from_distance(entry_feedrate, self.accelerate_until, acceleration)
    }

    pub fn cruise_time(&self) -> f32 {
        if self.cruise_feedrate != 0.0 {
            self.cruise_distance() / self.cruise_feedrate
        } else {
            0.0
        }
    }

    pub fn deceleration_time(&self, distance: f32, acceleration: f32) -> f32 {
        acceleration_time_from_distance(
            self.cruise_feedrate,
            distance - self.decelerate_after,
            -acceleration,
        )
    }

    pub fn cruise_distance(&self) -> f32 {
        self.decelerate_after - self.accelerate_until
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BlockFlags {
    /// Entry speed changed since the trapezoid was last built
    pub recalculate: bool,
    /// Cruise speed is reachable within the block from any entry speed
    pub nominal_length: bool,
    /// Block belongs to the start G-code
    pub prepare_stage: bool,
}

/// One kinematic unit queued in a time machine
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeBlock {
    pub move_type: MoveType,
    pub role: ExtrusionRole,
    /// Belongs to a skippable region
    pub skippable: bool,
    /// Index of the move in the processor's move list
    pub move_id: usize,
    /// Ordinal of the G1 line that produced the block
    pub g1_line_id: u32,
    /// 1-based layer
    pub layer_id: u32,
    /// mm
    pub distance: f32,
    /// mm/s²
    pub acceleration: f32,
    /// Largest entry speed the junction with the previous block allows
    pub max_entry_speed: f32,
    /// Speed the block can always exit at without exceeding jerk limits
    pub safe_feedrate: f32,
    pub flags: BlockFlags,
    pub feedrate_profile: FeedrateProfile,
    pub trapezoid: Trapezoid,
}

impl TimeBlock {
    /// Seconds needed to execute the block
    pub fn time(&self) -> f32 {
        self.trapezoid
            .acceleration_time(self.feedrate_profile.entry, self.acceleration)
            + self.trapezoid.cruise_time()
            + self
                .trapezoid
                .deceleration_time(self.distance, self.acceleration)
    }

    /// Rebuild the trapezoid from the current feed rate profile
    pub fn calculate_trapezoid(&mut self) {
        let profile = self.feedrate_profile;
        let mut accelerate_distance =
            estimated_acceleration_distance(profile.entry, profile.cruise, self.acceleration)
                .max(0.0);
        let decelerate_distance =
            estimated_acceleration_distance(profile.cruise, profile.exit, -self.acceleration)
                .max(0.0);
        let mut cruise_distance = self.distance - accelerate_distance - decelerate_distance;
        let mut cruise_feedrate = profile.cruise;

        // No cruise phase: the acceleration and deceleration ramps meet early
        if cruise_distance < 0.0 {
            accelerate_distance = intersection_distance(
                profile.entry,
                profile.exit,
                self.acceleration,
                self.distance,
            )
            .clamp(0.0, self.distance.max(0.0));
            cruise_distance = 0.0;
            cruise_feedrate =
                speed_from_distance(profile.entry, accelerate_distance, self.acceleration);
        }

        self.trapezoid = Trapezoid {
            accelerate_until: accelerate_distance,
            decelerate_after: accelerate_distance + cruise_distance,
            cruise_feedrate,
        };

        debug_assert!(
            self.trapezoid.accelerate_until <= self.trapezoid.decelerate_after + 1e-4
                && self.trapezoid.decelerate_after <= self.distance + 1e-3,
            "trapezoid out of block bounds: {:?} distance {}",
            self.trapezoid,
            self.distance
        );
    }
}
