//! # gcodeplan-core
//!
//! Shared vocabulary for the gcodeplan crates: axes and coordinates,
//! unit and positioning modes, extrusion roles and move types, simulation
//! modes, and the error types every layer returns.

pub mod axis;
pub mod error;
pub mod modes;
pub mod roles;
pub mod units;

pub use axis::{Axis, AxisCoords};
pub use error::{Error, GcodeError, PostProcessError, Result};
pub use modes::{CustomGcodeType, TimeMode};
pub use roles::{ExtrusionRole, MoveType, SkipType};
pub use units::{PositioningMode, Units, INCHES_TO_MM, MMMIN_TO_MMSEC};

/// Tolerance used when comparing positions and heights
pub const EPSILON: f32 = 1e-4;
