//! # gcodeplan-processor
//!
//! Reads slicer G-code line by line, tracks the modal machine state, feeds
//! the time planner and produces per-move records plus print statistics.
//! Optionally rewrites the processed file in place with progress, stop and
//! pre-cooling lines.

pub mod arc;
pub mod filaments;
pub mod gcode;
pub mod moves;
pub mod post_process;
pub mod processor;
pub mod result;
pub mod state;
pub mod tags;

pub use filaments::{RoleUsage, UsedFilaments};
pub use gcode::{Command, GcodeLine};
pub use post_process::PostProcessContext;
pub use processor::{process_file, CancelCallback, GcodeProcessor, CANCEL_CHECK_INTERVAL};
pub use result::{
    format_dhms, CustomGcodeItem, CustomGcodeSegment, GcodeResult, ModeStatistics, MoveVertex,
    PrintStatistics,
};
pub use state::ModalState;
pub use tags::{Placeholder, Tag};
