//! Comment tag handling

use super::GcodeProcessor;
use crate::filaments::FilamentEvent;
use crate::result::CustomGcodeItem;
use crate::tags::Tag;
use gcodeplan_core::{Axis, CustomGcodeType, ExtrusionRole, MoveType, SkipType};
use tracing::{error, warn};

/// Colours handed out to colour changes that do not name one
pub const DEFAULT_COLORS: [&str; 6] = [
    "#0B2C7A", "#1C8891", "#AAF200", "#F5CE0A", "#D16830", "#942616",
];

fn is_hex_color(text: &str) -> bool {
    text.len() == 7
        && text.starts_with('#')
        && text[1..].chars().all(|c| c.is_ascii_hexdigit())
}

impl GcodeProcessor {
    pub(super) fn process_tags(&mut self, comment: &str) {
        let Some(tag) = Tag::parse(comment) else {
            return;
        };
        match tag {
            Tag::Feature(name) => self.process_feature(name),
            Tag::ZHeight(value) => {
                self.state.print_z = value.trim().parse().unwrap_or(0.0);
            }
            Tag::WipeStart => self.state.wiping = true,
            Tag::WipeEnd => self.state.wiping = false,
            Tag::WipeTowerStart => {}
            Tag::WipeTowerEnd => {
                let filament_id = self.state.filament_id;
                self.used_filaments.process_wipe_tower_cache(filament_id);
            }
            Tag::FlushStart | Tag::VirtualFlushStart => {
                self.process_role_cache();
                self.state.role_before_flush = self.state.role;
                self.state.role = ExtrusionRole::Flush;
                self.state.flushing = true;
            }
            Tag::FlushEnd | Tag::VirtualFlushEnd => {
                self.process_role_cache();
                self.state.role = self.state.role_before_flush;
                self.state.flushing = false;
            }
            Tag::SkippableStart => self.state.skippable = true,
            Tag::SkippableEnd => {
                self.state.skippable = false;
                self.state.skip_type = SkipType::None;
            }
            Tag::SkipType(value) => {
                self.state.skip_type = if self.state.skippable {
                    SkipType::from_tag(value)
                } else {
                    SkipType::None
                };
            }
            Tag::LayerHeight(value) => match value.trim().parse::<f32>() {
                Ok(height) => self.state.forced_height = height,
                Err(_) => error!(
                    "Line {}: invalid layer height '{}'",
                    self.state.line_id,
                    value.trim()
                ),
            },
            Tag::LineWidth(value) => match value.trim().parse::<f32>() {
                Ok(width) => self.state.forced_width = width,
                Err(_) => error!(
                    "Line {}: invalid line width '{}'",
                    self.state.line_id,
                    value.trim()
                ),
            },
            Tag::ChangeLayer => self.state.layer_id += 1,
            Tag::ColorChange(rest) => self.process_color_change(rest),
            Tag::PausePrinting => {
                self.store_move(MoveType::PausePrint, None);
                self.push_custom_gcode(CustomGcodeType::PausePrint, String::new());
                self.process_custom_gcode_time(CustomGcodeType::PausePrint);
            }
            Tag::CustomGcode => {
                self.store_move(MoveType::CustomGcode, None);
                self.push_custom_gcode(CustomGcodeType::Custom, String::new());
            }
            // only meaningful to the rewriter
            Tag::MachineStartGcodeEnd
            | Tag::MachineEndGcodeStart
            | Tag::NozzleChangeStart(_)
            | Tag::NozzleChangeEnd(_) => {}
        }
    }

    fn process_feature(&mut self, name: &str) {
        self.process_role_cache();
        self.state.role = match name.parse::<ExtrusionRole>() {
            Ok(role) => role,
            Err(err) => {
                warn!("Line {}: {}", self.state.line_id, err);
                ExtrusionRole::None
            }
        };
        self.state.prepare_stage =
            self.state.role == ExtrusionRole::Custom && self.state.g1_line_id == 0;
    }

    fn push_custom_gcode(&mut self, kind: CustomGcodeType, color: String) {
        self.custom_gcodes.push(CustomGcodeItem {
            print_z: self.state.end[Axis::Z],
            kind,
            extruder: self.state.filament_id + 1,
            color,
        });
    }

    fn process_custom_gcode_time(&mut self, kind: CustomGcodeType) {
        self.run_machines(|machine, _| machine.process_custom_gcode_time(kind));
    }

    /// `;COLOR_CHANGE,T<n>,#RRGGBB`
    fn process_color_change(&mut self, rest: &str) {
        let tokens: Vec<&str> = rest
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect();

        let mut filament = 0;
        if let Some(id) = tokens.first().and_then(|t| t.strip_prefix('T')) {
            match id.parse::<i32>() {
                Ok(id) if (0..=255).contains(&id) => filament = id as usize,
                _ => {
                    error!(
                        "Line {}: invalid filament in colour change '{}'",
                        self.state.line_id, rest
                    );
                    return;
                }
            }
        }

        let color = match tokens.get(1) {
            Some(color) if is_hex_color(color) => color.to_string(),
            // a named colour that does not parse gets the first default
            Some(_) => DEFAULT_COLORS[0].to_string(),
            None => {
                let color = DEFAULT_COLORS[self.default_color_index % DEFAULT_COLORS.len()];
                self.default_color_index += 1;
                color.to_string()
            }
        };

        if self.state.filament_id != filament {
            return;
        }
        self.store_move(MoveType::ColorChange, None);
        self.push_custom_gcode(CustomGcodeType::ColorChange, color);
        self.process_custom_gcode_time(CustomGcodeType::ColorChange);
        self.used_filaments
            .process_event(FilamentEvent::ColorChange, filament);
    }
}
