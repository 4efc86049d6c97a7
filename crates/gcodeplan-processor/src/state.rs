//! Modal machine state
//!
//! Everything a G-code line can change that later lines depend on: units,
//! positioning modes, origin offsets, positions, active role and tool,
//! thermal state and the counters the time machines key on.

use crate::gcode::GcodeLine;
use gcodeplan_core::{
    Axis, AxisCoords, ExtrusionRole, PositioningMode, SkipType, Units, MMMIN_TO_MMSEC,
};

/// Position saved by `M401`, restored by `M402`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CachedPosition {
    pub position: AxisCoords,
    pub feedrate: f32,
}

/// Per-line mutable state of the processor
#[derive(Debug, Clone, PartialEq)]
pub struct ModalState {
    pub units: Units,
    pub global_positioning: PositioningMode,
    pub e_local_positioning: PositioningMode,
    pub origin: AxisCoords,
    pub start: AxisCoords,
    pub end: AxisCoords,
    /// mm/s
    pub feedrate: f32,
    pub cached_position: Option<CachedPosition>,

    pub role: ExtrusionRole,
    /// Role active before a flush region started
    pub role_before_flush: ExtrusionRole,
    pub wiping: bool,
    pub flushing: bool,
    pub skippable: bool,
    pub skip_type: SkipType,
    /// Inside the start G-code, before any motion command
    pub prepare_stage: bool,

    pub layer_id: u32,
    pub print_z: f32,
    pub extruded_last_z: f32,
    pub forced_height: f32,
    pub forced_width: f32,
    pub width: f32,
    pub height: f32,
    pub mm3_per_mm: f32,

    /// Percent
    pub fan_speed: f32,
    pub extruder_temps: Vec<f32>,
    pub highest_bed_temp: f32,

    pub filament_id: usize,
    /// Physical extruder; `None` until a filament has been loaded
    pub extruder_id: Option<usize>,
    /// Last filament seen on each physical extruder
    pub last_filament_per_extruder: Vec<Option<usize>>,
    pub extruder_unloaded: bool,

    /// 1-based number of the line being processed
    pub line_id: u32,
    /// Number of motion lines processed so far
    pub g1_line_id: u32,
}

impl ModalState {
    pub fn new(filament_count: usize, extruder_count: usize) -> Self {
        Self {
            units: Units::Millimeters,
            global_positioning: PositioningMode::Absolute,
            e_local_positioning: PositioningMode::Absolute,
            origin: AxisCoords::default(),
            start: AxisCoords::default(),
            end: AxisCoords::default(),
            feedrate: 0.0,
            cached_position: None,
            role: ExtrusionRole::None,
            role_before_flush: ExtrusionRole::None,
            wiping: false,
            flushing: false,
            skippable: false,
            skip_type: SkipType::None,
            prepare_stage: false,
            layer_id: 0,
            print_z: 0.0,
            extruded_last_z: 0.0,
            forced_height: 0.0,
            forced_width: 0.0,
            width: 0.0,
            height: 0.0,
            mm3_per_mm: 0.0,
            fan_speed: 0.0,
            extruder_temps: vec![0.0; filament_count.max(1)],
            highest_bed_temp: 0.0,
            filament_id: 0,
            extruder_id: None,
            last_filament_per_extruder: vec![None; extruder_count.max(1)],
            extruder_unloaded: true,
            line_id: 0,
            g1_line_id: 0,
        }
    }

    /// Whether E values are relative, either globally or by `M83`
    pub fn extrusion_relative(&self) -> bool {
        self.global_positioning == PositioningMode::Relative
            || self.e_local_positioning == PositioningMode::Relative
    }

    fn axis_relative(&self, axis: Axis) -> bool {
        match axis {
            Axis::E => self.extrusion_relative(),
            _ => self.global_positioning == PositioningMode::Relative,
        }
    }

    /// Absolute machine coordinate of `axis` after `line`
    ///
    /// An axis missing from the line keeps its start position.
    pub fn absolute_position(&self, axis: Axis, line: &GcodeLine<'_>) -> f32 {
        match line.axis(axis) {
            Some(value) => {
                let value = value * self.units.scale_to_mm();
                if self.axis_relative(axis) {
                    self.start[axis] + value
                } else {
                    self.origin[axis] + value
                }
            }
            None => self.start[axis],
        }
    }

    /// Resolve all four axes of `line` into `end`
    pub fn update_end_position(&mut self, line: &GcodeLine<'_>) {
        for axis in Axis::ALL {
            self.end[axis] = self.absolute_position(axis, line);
        }
    }

    /// Apply an `F` word (mm/min) to the modal feed rate
    pub fn update_feedrate(&mut self, line: &GcodeLine<'_>) {
        if let Some(f) = line.feedrate() {
            self.feedrate = f * self.units.scale_to_mm() * MMMIN_TO_MMSEC;
        }
    }

    /// Temperature of the active filament
    pub fn temperature(&self) -> f32 {
        self.extruder_temps
            .get(self.filament_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn set_temperature(&mut self, filament_id: usize, value: f32) {
        if filament_id >= self.extruder_temps.len() {
            self.extruder_temps.resize(filament_id + 1, 0.0);
        }
        self.extruder_temps[filament_id] = value;
    }

    pub fn delta(&self) -> AxisCoords {
        self.end - self.start
    }
}
