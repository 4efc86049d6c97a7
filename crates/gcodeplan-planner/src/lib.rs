//! # gcodeplan-planner
//!
//! Firmware-style trapezoidal motion planner used to estimate print time.
//!
//! A [`TimeMachine`] receives one [`MoveRequest`] per move, builds a
//! [`TimeBlock`] with jerk-limited junction speeds, runs reverse and forward
//! look-ahead passes over its queue and integrates the resulting velocity
//! trapezoids into time statistics.

pub mod block;
pub mod builder;
pub mod kinematics;
pub mod machine;
pub mod passes;

pub use block::{BlockFlags, FeedrateProfile, TimeBlock, Trapezoid};
pub use builder::{MovePath, MoveRequest};
pub use machine::{
    CustomGcodeTime, FinalizedMove, G1LineTime, KinematicState, StopTime, TimeMachine,
    PLANNER_QUEUE_SIZE, PLANNER_REFRESH_THRESHOLD,
};
