//! Filament and extruder changes
//!
//! A change costs the unload time of the outgoing filament, the switch time
//! when the physical extruder changes and the load time of the incoming
//! filament. The delay rides on a zero-length block with the `Flush` role so
//! it lands in the time tables like any other move.

use super::GcodeProcessor;
use crate::filaments::FilamentEvent;
use crate::gcode::GcodeLine;
use gcodeplan_core::{ExtrusionRole, MoveType, TimeMode};
use gcodeplan_planner::TimeBlock;
use gcodeplan_settings::Flavor;
use tracing::{debug, error};

/// Highest tool number accepted by `T<n>`
pub const MAX_TOOL_ID: i64 = 254;

impl GcodeProcessor {
    pub(super) fn filament_load_time(&self) -> f32 {
        if self.state.extruder_unloaded {
            0.0
        } else {
            self.config.toolchange.filament_load_time
        }
    }

    pub(super) fn filament_unload_time(&self) -> f32 {
        if self.state.extruder_unloaded {
            0.0
        } else {
            self.config.toolchange.filament_unload_time
        }
    }

    /// `T<n>`, or `VT<n>` from a comment
    pub(super) fn process_tool_command(&mut self, line: &GcodeLine<'_>) {
        let command = line.command();
        let token = command
            .strip_prefix(['V', 'v'])
            .unwrap_or(command);
        self.process_tool_token(token, line.line_number());
    }

    /// Handle a `T<n>` word
    pub(super) fn process_tool_token(&mut self, token: &str, line_number: u32) {
        if token.len() <= 1 {
            return;
        }
        let id_text = &token[1..];
        match id_text.parse::<i64>() {
            Ok(id) if (0..=MAX_TOOL_ID).contains(&id) => {
                let id = id as usize;
                if id >= self.config.filaments.len() {
                    error!(
                        "Line {}: T{} selects a filament beyond the {} configured",
                        line_number,
                        id,
                        self.config.filaments.len()
                    );
                }
                self.process_filament_change(id);
            }
            _ => {
                let ignored = match self.config.machine.flavor {
                    Flavor::MarlinLegacy | Flavor::Marlin2 => {
                        matches!(id_text, "x" | "c" | "?" | "255" | "1000" | "1100")
                    }
                    Flavor::RepRapFirmware | Flavor::Sprinter => id_text == "-1",
                    _ => false,
                };
                if !ignored {
                    error!("Line {}: invalid tool command {}", line_number, token);
                }
            }
        }
    }

    /// `M1020 S<n>`
    pub(super) fn process_filament_change_command(&mut self, line: &GcodeLine<'_>) {
        let Some(id) = line.value('S') else {
            return;
        };
        if id < 0.0 || id > MAX_TOOL_ID as f32 || id.fract() != 0.0 {
            error!("Line {}: invalid filament id {} in M1020", line.line_number(), id);
            return;
        }
        let id = id as usize;
        if id >= self.config.filaments.len() {
            error!(
                "Line {}: M1020 selects filament {} beyond the {} configured",
                line.line_number(),
                id,
                self.config.filaments.len()
            );
        }
        self.process_filament_change(id);
    }

    /// Switch to filament `next` and account for the time it takes
    pub(super) fn process_filament_change(&mut self, next: usize) {
        let prev = self.state.filament_id;
        if prev == next {
            return;
        }
        let next_extruder = self.config.physical_extruder(next);
        if next_extruder >= self.state.last_filament_per_extruder.len() {
            self.state
                .last_filament_per_extruder
                .resize(next_extruder + 1, None);
        }
        let prev_extruder = self.state.extruder_id;
        if let Some(prev_extruder) = prev_extruder {
            self.state.last_filament_per_extruder[prev_extruder] = Some(prev);
        }

        let mut extra_time = 0.0;
        match prev_extruder {
            Some(prev_extruder) if prev_extruder == next_extruder => {
                self.used_filaments.process_event(FilamentEvent::ToolChange, prev);
                self.filament_changes += 1;
                extra_time += self.filament_unload_time();
                self.state.extruder_unloaded = false;
                extra_time += self.filament_load_time();
            }
            None => {
                self.state.extruder_unloaded = false;
                extra_time += self.filament_load_time();
            }
            Some(_) => {
                self.used_filaments.process_event(FilamentEvent::ToolChange, prev);
                match self.state.last_filament_per_extruder[next_extruder] {
                    None => {
                        self.state.extruder_unloaded = false;
                        extra_time += self.filament_load_time();
                    }
                    Some(loaded) if loaded != next => {
                        self.filament_changes += 1;
                        extra_time += self.filament_unload_time();
                        self.state.extruder_unloaded = false;
                        extra_time += self.filament_load_time();
                    }
                    Some(_) => {}
                }
                self.extruder_changes += 1;
                extra_time += self.config.toolchange.extruder_change_time;
            }
        }

        // the role cache belongs to the outgoing filament
        self.process_role_cache();
        self.state.extruder_id = Some(next_extruder);
        self.state.filament_id = next;
        self.state.last_filament_per_extruder[next_extruder] = Some(next);
        debug!(
            "Filament change {} -> {} (extruder {}), {:.1}s",
            prev, next, next_extruder, extra_time
        );

        self.store_move(MoveType::ToolChange, None);

        let move_id = self.moves.len() - 1;
        for mode in TimeMode::ALL {
            let mut block = TimeBlock {
                move_type: MoveType::ToolChange,
                role: ExtrusionRole::Flush,
                skippable: self.state.skippable,
                move_id,
                g1_line_id: self.state.g1_line_id,
                layer_id: self.state.layer_id.max(1),
                distance: 0.0,
                ..TimeBlock::default()
            };
            block.flags.prepare_stage = self.state.prepare_stage;
            block.calculate_trapezoid();
            self.machines[mode.index()].push_block(block);
        }

        self.simulate_wait(extra_time, ExtrusionRole::Flush);
    }
}
