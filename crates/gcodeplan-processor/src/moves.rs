//! Move classification and extrusion geometry

use gcodeplan_core::{Axis, AxisCoords, ExtrusionRole, MoveType, EPSILON};
use std::f32::consts::PI;

/// Height used when none can be derived from Z
pub const DEFAULT_LAYER_HEIGHT: f32 = 0.2;

/// Width used when the formulas produce nothing
pub const DEFAULT_LINE_WIDTH: f32 = 0.4;

/// Width and height reported for wipe moves
pub const WIPE_WIDTH: f32 = 0.05;
pub const WIPE_HEIGHT: f32 = 0.05;

/// Lower bound of the width clamp
pub const MIN_WIDTH_CAP: f32 = 2.0;

/// Move type of a straight move from its axis deltas
pub fn classify(delta: AxisCoords, wiping: bool) -> MoveType {
    if wiping {
        return MoveType::Wipe;
    }
    let dx = delta[Axis::X];
    let dy = delta[Axis::Y];
    let dz = delta[Axis::Z];
    let de = delta[Axis::E];
    let any_xyz = dx != 0.0 || dy != 0.0 || dz != 0.0;

    if de < 0.0 {
        if any_xyz {
            MoveType::Travel
        } else {
            MoveType::Retract
        }
    } else if de > 0.0 {
        if dx == 0.0 && dy == 0.0 {
            if dz == 0.0 {
                MoveType::Unretract
            } else {
                MoveType::Travel
            }
        } else {
            MoveType::Extrude
        }
    } else if any_xyz {
        MoveType::Travel
    } else {
        MoveType::Noop
    }
}

/// Layer height of an extrusion ending at `end_z`
///
/// Returns the height and the Z to remember as the last extruded one.
pub fn layer_height(forced_height: f32, end_z: f32, extruded_last_z: f32, current: f32) -> (f32, f32) {
    let mut height = current;
    if forced_height > 0.0 {
        height = forced_height;
    } else if end_z > extruded_last_z + EPSILON {
        height = end_z - extruded_last_z;
    }
    if height == 0.0 {
        height = DEFAULT_LAYER_HEIGHT;
    }
    let end_z = if end_z == 0.0 { height } else { end_z };
    (height, end_z)
}

/// Extrusion width from the extruded length and the path geometry
///
/// `delta_e` and `delta_xyz` in mm, `diameter` is the filament diameter.
pub fn extrusion_width(
    role: ExtrusionRole,
    forced_width: f32,
    delta_e: f32,
    delta_xyz: f32,
    height: f32,
    diameter: f32,
) -> f32 {
    if forced_width > 0.0 {
        return forced_width;
    }
    let radius = 0.5 * diameter;
    let width = if delta_xyz <= 0.0 || height <= 0.0 {
        0.0
    } else {
        match role {
            // rectangle
            ExtrusionRole::ExternalPerimeter => {
                let area = PI * (1.05 * radius).powi(2);
                delta_e * area / (delta_xyz * height)
            }
            // circle
            ExtrusionRole::BridgeInfill | ExtrusionRole::None => diameter * (delta_e / delta_xyz).sqrt(),
            // rectangle with two semicircles at the ends
            _ => delta_e * PI * radius * radius / (delta_xyz * height) + (1.0 - 0.25 * PI) * height,
        }
    };
    let width = if width == 0.0 { DEFAULT_LINE_WIDTH } else { width };
    width.min(MIN_WIDTH_CAP.max(4.0 * height))
}
