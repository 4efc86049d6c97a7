//! Motion commands: G0/G1, G2/G3, G4, G28, G92, M132, M401/M402

use super::GcodeProcessor;
use crate::arc::ArcGeometry;
use crate::gcode::GcodeLine;
use crate::moves::{classify, extrusion_width, layer_height};
use crate::state::CachedPosition;
use gcodeplan_core::{Axis, ExtrusionRole, MoveType};
use gcodeplan_planner::{MovePath, MoveRequest};
use gcodeplan_settings::Flavor;
use tracing::warn;

impl GcodeProcessor {
    fn start_motion_line(&mut self) {
        self.state.g1_line_id += 1;
        self.envelope_processing = true;
    }

    /// Volumetric accounting, layer height and width of an extrusion
    fn update_extrusion(&mut self, delta_xyz: f32, delta_e: f32) {
        let filament = self.config.filament(self.state.filament_id);
        let volume = filament.area() * delta_e;
        self.state.mm3_per_mm = if delta_xyz > 0.0 { volume / delta_xyz } else { 0.0 };

        let role = self.state.role;
        if role.is_support() {
            self.used_filaments.increase_support(volume);
        } else if role == ExtrusionRole::WipeTower {
            self.used_filaments.increase_wipe_tower(volume);
        } else {
            self.used_filaments.increase_model(volume);
        }

        let (height, last_z) = layer_height(
            self.state.forced_height,
            self.state.end[Axis::Z],
            self.state.extruded_last_z,
            self.state.height,
        );
        self.state.height = height;
        self.state.extruded_last_z = last_z;
        self.state.width = extrusion_width(
            role,
            self.state.forced_width,
            delta_e,
            delta_xyz,
            height,
            filament.diameter,
        );
    }

    fn move_request(&self, move_type: MoveType, distance: f32, path: MovePath) -> MoveRequest {
        MoveRequest {
            move_type,
            role: self.state.role,
            skippable: self.state.skippable,
            move_id: self.moves.len(),
            g1_line_id: self.state.g1_line_id,
            layer_id: self.state.layer_id,
            prepare_stage: self.state.prepare_stage,
            delta: self.state.delta(),
            distance,
            feedrate: self.state.feedrate,
            path,
            extruder_id: self.active_extruder(),
        }
    }

    pub(super) fn process_linear_move(&mut self, line: &GcodeLine<'_>) {
        self.start_motion_line();
        self.state.update_end_position(line);
        self.state.update_feedrate(line);

        let delta = self.state.delta();
        if delta.max_abs() == 0.0 {
            return;
        }

        let move_type = classify(delta, self.state.wiping);
        let delta_xyz = delta.xyz_length();
        if move_type == MoveType::Extrude {
            self.update_extrusion(delta_xyz, delta[Axis::E]);
        }

        let distance = if delta_xyz > 0.0 {
            delta_xyz
        } else {
            delta[Axis::E].abs()
        };
        let request = self.move_request(move_type, distance, MovePath::Line);
        self.plan(&request);
        self.store_move(move_type, None);
    }

    pub(super) fn process_arc_move(&mut self, line: &GcodeLine<'_>, clockwise: bool) {
        self.start_motion_line();
        self.state.update_end_position(line);

        let (i, j) = (line.value('I'), line.value('J'));
        if i.is_none() && j.is_none() {
            warn!("Line {}: arc without I or J offset ignored", line.line_number());
            return;
        }
        let start = self.state.start;
        let end = self.state.end;
        if let Some(p) = line.value('P') {
            let closed = start[Axis::X] == end[Axis::X] && start[Axis::Y] == end[Axis::Y];
            if !closed || p != 1.0 {
                warn!(
                    "Line {}: only single full-circle arcs are supported with P",
                    line.line_number()
                );
                return;
            }
        }

        let scale = self.state.units.scale_to_mm();
        let arc = ArcGeometry::new(
            start.xyz(),
            end.xyz(),
            i.unwrap_or(0.0) * scale,
            j.unwrap_or(0.0) * scale,
            clockwise,
        );
        self.state.update_feedrate(line);

        let delta = self.state.delta();
        let dz = delta[Axis::Z];
        if arc.arc_length == 0.0 && dz == 0.0 {
            return;
        }

        let move_type = if delta[Axis::E] == 0.0 {
            MoveType::Travel
        } else {
            MoveType::Extrude
        };
        let delta_xyz = (arc.arc_length * arc.arc_length + dz * dz).sqrt();
        if move_type == MoveType::Extrude {
            self.update_extrusion(delta_xyz, delta[Axis::E]);
        }

        let path = MovePath::Arc {
            radius: arc.radius,
            arc_length: arc.arc_length,
            enter_direction: arc.enter_direction,
            exit_direction: arc.exit_direction,
        };
        let request = self.move_request(move_type, delta_xyz, path);
        self.plan(&request);
        self.store_move(move_type, Some(arc));
    }

    /// `G4 S<seconds> P<milliseconds>`
    pub(super) fn process_dwell(&mut self, line: &GcodeLine<'_>) {
        let seconds = line.value('S');
        let millis = line.value('P');
        if seconds.is_none() && millis.is_none() {
            return;
        }
        let time = seconds.unwrap_or(0.0) + millis.unwrap_or(0.0) * 0.001;
        self.simulate_wait(time, ExtrusionRole::None);
    }

    /// `G28` moves the named axes (or all of XYZ) to zero
    pub(super) fn process_home(&mut self, line: &GcodeLine<'_>) {
        let axes: Vec<Axis> = [Axis::X, Axis::Y, Axis::Z]
            .into_iter()
            .filter(|axis| line.has_axis(*axis))
            .collect();
        let axes = if axes.is_empty() {
            vec![Axis::X, Axis::Y, Axis::Z]
        } else {
            axes
        };
        let mut text = String::from("G1");
        for axis in axes {
            text.push_str(&format!(" {}0", axis.letter()));
        }
        let home = GcodeLine::parse(&text, line.line_number());
        self.process_linear_move(&home);
    }

    /// `G92` resets the origin of the named axes
    pub(super) fn process_set_position(&mut self, line: &GcodeLine<'_>) {
        let scale = self.state.units.scale_to_mm();
        let mut any_found = false;
        for axis in [Axis::X, Axis::Y, Axis::Z] {
            if let Some(value) = line.axis(axis) {
                self.state.origin[axis] = self.state.end[axis] - value * scale;
                any_found = true;
            }
        }
        if let Some(value) = line.axis(Axis::E) {
            self.state.end[Axis::E] = value * scale;
            any_found = true;
        } else {
            self.simulate_wait(0.0, ExtrusionRole::None);
        }

        if !any_found && !line.has_unknown_axis() {
            // firmware resets every axis when none is given
            self.state.origin = self.state.end;
        }
    }

    /// `M132` zeroes the origin of the named axes
    pub(super) fn process_reset_axes(&mut self, line: &GcodeLine<'_>) {
        for axis in Axis::ALL {
            if line.has_axis(axis) {
                self.state.origin[axis] = 0.0;
            }
        }
    }

    pub(super) fn process_save_position(&mut self) {
        if self.config.machine.flavor != Flavor::Repetier {
            return;
        }
        self.state.cached_position = Some(CachedPosition {
            position: self.state.start,
            feedrate: self.state.feedrate,
        });
    }

    pub(super) fn process_restore_position(&mut self) {
        if self.config.machine.flavor != Flavor::Repetier {
            return;
        }
        let Some(cached) = self.state.cached_position else {
            return;
        };
        for axis in [Axis::X, Axis::Y, Axis::Z] {
            self.state.start[axis] = cached.position[axis];
        }
        self.state.end = self.state.start;
        self.state.feedrate = cached.feedrate;
    }
}
