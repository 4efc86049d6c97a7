//! Arc geometry for `G2`/`G3`
//!
//! Arcs are described by their start and end points and the centre offset
//! (`I`, `J`) from the start. Helical arcs move Z linearly with the angle.

use std::f32::consts::PI;

/// Maximum chordal deviation of the interpolated polyline (mm)
pub const ARC_TOLERANCE: f32 = 0.0125;

/// Geometry of one arc move
#[derive(Debug, Clone, PartialEq)]
pub struct ArcGeometry {
    pub center: [f32; 3],
    pub radius: f32,
    /// Swept angle in radians, always positive
    pub angle: f32,
    /// XY length of the arc
    pub arc_length: f32,
    /// Unit 3D tangent at the start
    pub enter_direction: [f32; 3],
    /// Unit 3D tangent at the end
    pub exit_direction: [f32; 3],
    /// Intermediate points; empty for degenerate arcs
    pub points: Vec<[f32; 3]>,
}

impl ArcGeometry {
    /// Build the arc from `start` to `end` around `start + (i, j)`
    ///
    /// `start == end` in XY sweeps a full circle.
    pub fn new(start: [f32; 3], end: [f32; 3], i: f32, j: f32, clockwise: bool) -> Self {
        let center = [start[0] + i, start[1] + j, start[2]];
        let sv = [start[0] - center[0], start[1] - center[1]];
        let ev = [end[0] - center[0], end[1] - center[1]];
        let radius = (sv[0] * sv[0] + sv[1] * sv[1]).sqrt();

        let full_circle = start[0] == end[0] && start[1] == end[1];
        let angle = if full_circle {
            2.0 * PI
        } else {
            let cross = sv[0] * ev[1] - sv[1] * ev[0];
            let dot = sv[0] * ev[0] + sv[1] * ev[1];
            let mut theta = cross.atan2(dot);
            if clockwise {
                theta = -theta;
            }
            if theta <= 0.0 {
                theta += 2.0 * PI;
            }
            theta
        };
        let arc_length = radius * angle;
        let dz = end[2] - start[2];

        let enter_direction = tangent(sv, radius, clockwise, arc_length, dz);
        let end_vector = rotate(sv, if clockwise { -angle } else { angle });
        let exit_direction = tangent(end_vector, radius, clockwise, arc_length, dz);

        let points = interpolate(center, sv, start[2], radius, angle, dz, clockwise);

        Self {
            center,
            radius,
            angle,
            arc_length,
            enter_direction,
            exit_direction,
            points,
        }
    }
}

fn rotate(v: [f32; 2], angle: f32) -> [f32; 2] {
    let (sin, cos) = angle.sin_cos();
    [v[0] * cos - v[1] * sin, v[0] * sin + v[1] * cos]
}

fn tangent(radial: [f32; 2], radius: f32, clockwise: bool, arc_length: f32, dz: f32) -> [f32; 3] {
    if radius <= 0.0 {
        return [0.0; 3];
    }
    let t = if clockwise {
        [radial[1] / radius, -radial[0] / radius]
    } else {
        [-radial[1] / radius, radial[0] / radius]
    };
    let length = (arc_length * arc_length + dz * dz).sqrt();
    if length <= 0.0 {
        return [t[0], t[1], 0.0];
    }
    [
        t[0] * arc_length / length,
        t[1] * arc_length / length,
        dz / length,
    ]
}

fn interpolate(
    center: [f32; 3],
    radial: [f32; 2],
    start_z: f32,
    radius: f32,
    angle: f32,
    dz: f32,
    clockwise: bool,
) -> Vec<[f32; 3]> {
    if radius <= ARC_TOLERANCE {
        return Vec::new();
    }
    let step = 2.0 * ((radius - ARC_TOLERANCE) / radius).acos();
    if step <= 0.0 {
        return Vec::new();
    }
    let count = angle / step;
    let z_step = if count < 1.0 { dz } else { dz / count };
    let signed_step = if clockwise { -step } else { step };

    (0..count.floor() as usize)
        .map(|i| {
            let k = (i + 1) as f32;
            let p = rotate(radial, k * signed_step);
            [center[0] + p[0], center[1] + p[1], start_z + k * z_step]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn test_half_circle_ccw() {
        // from (10, 0) to (-10, 0) around the origin
        let arc = ArcGeometry::new([10.0, 0.0, 0.0], [-10.0, 0.0, 0.0], -10.0, 0.0, false);
        assert!(close(arc.radius, 10.0));
        assert!(close(arc.arc_length, 10.0 * PI));
        assert!(close(arc.enter_direction[1], 1.0));
        assert!(close(arc.exit_direction[1], -1.0));
        for p in &arc.points {
            assert!(p[1] >= -1e-3);
            assert!(close((p[0] * p[0] + p[1] * p[1]).sqrt(), 10.0));
        }
        assert!(!arc.points.is_empty());
    }

    #[test]
    fn test_quarter_clockwise() {
        // from (0, 10) clockwise to (10, 0)
        let arc = ArcGeometry::new([0.0, 10.0, 0.0], [10.0, 0.0, 0.0], 0.0, -10.0, true);
        assert!(close(arc.angle, 0.5 * PI));
        assert!(close(arc.enter_direction[0], 1.0));
        assert!(close(arc.exit_direction[1], -1.0));
    }

    #[test]
    fn test_full_circle() {
        let arc = ArcGeometry::new([5.0, 0.0, 0.0], [5.0, 0.0, 0.0], -5.0, 0.0, false);
        assert!(close(arc.arc_length, 10.0 * PI));
    }

    #[test]
    fn test_degenerate_arc_has_no_points() {
        let arc = ArcGeometry::new([0.0, 0.0, 0.0], [0.02, 0.0, 0.0], 0.01, 0.0, false);
        assert!(arc.points.is_empty());
    }

    #[test]
    fn test_helix_z_progresses() {
        let arc = ArcGeometry::new([10.0, 0.0, 0.0], [-10.0, 0.0, 2.0], -10.0, 0.0, false);
        let last = arc.points.last().copied().unwrap_or([0.0; 3]);
        assert!(last[2] > 0.0 && last[2] <= 2.0 + 1e-3);
        assert!(arc.enter_direction[2] > 0.0);
    }
}
