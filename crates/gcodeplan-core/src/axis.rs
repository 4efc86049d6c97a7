//! Machine axes and four-component coordinates

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut, Sub};

/// One of the four planned axes: three cartesian axes plus the extruder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
    /// Extruder filament length
    E,
}

impl Axis {
    /// All axes in storage order
    pub const ALL: [Axis; 4] = [Axis::X, Axis::Y, Axis::Z, Axis::E];

    /// Storage index of the axis
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
            Axis::E => 3,
        }
    }

    /// Parameter letter used on a G-code line
    pub fn letter(self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
            Axis::E => 'E',
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Positions or per-axis quantities for X, Y, Z and E in millimeters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AxisCoords(pub [f32; 4]);

impl AxisCoords {
    /// All four components set to `value`
    pub fn splat(value: f32) -> Self {
        Self([value; 4])
    }

    /// Length of the XYZ part
    pub fn xyz_length(&self) -> f32 {
        (self[Axis::X].powi(2) + self[Axis::Y].powi(2) + self[Axis::Z].powi(2)).sqrt()
    }

    /// Length of the XY part
    pub fn xy_length(&self) -> f32 {
        (self[Axis::X].powi(2) + self[Axis::Y].powi(2)).sqrt()
    }

    /// Largest absolute component
    pub fn max_abs(&self) -> f32 {
        self.0.iter().fold(0.0_f32, |acc, v| acc.max(v.abs()))
    }

    /// XYZ components as an array
    pub fn xyz(&self) -> [f32; 3] {
        [self.0[0], self.0[1], self.0[2]]
    }
}

impl Index<Axis> for AxisCoords {
    type Output = f32;

    fn index(&self, axis: Axis) -> &f32 {
        &self.0[axis.index()]
    }
}

impl IndexMut<Axis> for AxisCoords {
    fn index_mut(&mut self, axis: Axis) -> &mut f32 {
        &mut self.0[axis.index()]
    }
}

impl Sub for AxisCoords {
    type Output = AxisCoords;

    fn sub(self, rhs: AxisCoords) -> AxisCoords {
        let mut out = self;
        for axis in Axis::ALL {
            out[axis] -= rhs[axis];
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_indexing() {
        let mut c = AxisCoords::default();
        c[Axis::Y] = 3.0;
        c[Axis::E] = -1.5;
        assert_eq!(c.0, [0.0, 3.0, 0.0, -1.5]);
        assert_eq!(c.max_abs(), 3.0);
    }

    #[test]
    fn test_lengths() {
        let c = AxisCoords([3.0, 4.0, 12.0, 7.0]);
        assert!((c.xy_length() - 5.0).abs() < 1e-6);
        assert!((c.xyz_length() - 13.0).abs() < 1e-6);
    }

    #[test]
    fn test_sub() {
        let a = AxisCoords([10.0, 5.0, 1.0, 2.0]);
        let b = AxisCoords([4.0, 5.0, 0.5, 3.0]);
        assert_eq!((a - b).0, [6.0, 0.0, 0.5, -1.0]);
    }
}
