//! Constant-acceleration kinematics
//!
//! Speeds in mm/s, distances in mm, accelerations in mm/s². A zero
//! acceleration yields zero distances and times instead of dividing by zero.

/// Distance needed to go from `initial` to `target` speed
pub fn estimated_acceleration_distance(initial: f32, target: f32, acceleration: f32) -> f32 {
    if acceleration == 0.0 {
        0.0
    } else {
        (target * target - initial * initial) / (2.0 * acceleration)
    }
}

/// Point where an acceleration ramp from `initial` meets a deceleration
/// ramp ending at `final_rate` within `distance`
pub fn intersection_distance(initial: f32, final_rate: f32, acceleration: f32, distance: f32) -> f32 {
    if acceleration == 0.0 {
        0.0
    } else {
        (2.0 * acceleration * distance - initial * initial + final_rate * final_rate)
            / (4.0 * acceleration)
    }
}

/// Speed reached after accelerating from `initial` over `distance`
pub fn speed_from_distance(initial: f32, distance: f32, acceleration: f32) -> f32 {
    (initial * initial + 2.0 * acceleration * distance).max(0.0).sqrt()
}

/// Highest speed from which `target` can still be reached over `distance`
///
/// Called with a negative acceleration when decelerating.
pub fn max_allowable_speed(acceleration: f32, target: f32, distance: f32) -> f32 {
    (target * target - 2.0 * acceleration * distance).max(0.0).sqrt()
}

/// Time to cover `distance` starting at `initial` speed
pub fn acceleration_time_from_distance(initial: f32, distance: f32, acceleration: f32) -> f32 {
    if acceleration == 0.0 {
        0.0
    } else {
        (speed_from_distance(initial, distance, acceleration) - initial) / acceleration
    }
}
