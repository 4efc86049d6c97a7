//! Processing result
//!
//! The value produced by one run of the processor: every move with its
//! geometry and per-mode timing, and the aggregate statistics.

use crate::filaments::UsedFilaments;
use gcodeplan_core::{CustomGcodeType, ExtrusionRole, MoveType, SkipType, TimeMode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One processed move
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveVertex {
    /// Line of the move in the (rewritten) file
    pub gcode_id: u32,
    pub move_type: MoveType,
    pub role: ExtrusionRole,
    pub filament_id: usize,
    pub extruder_id: usize,
    /// End position (mm)
    pub position: [f32; 3],
    pub delta_extruder: f32,
    /// mm/s
    pub feedrate: f32,
    pub width: f32,
    pub height: f32,
    pub mm3_per_mm: f32,
    /// Percent
    pub fan_speed: f32,
    /// °C
    pub temperature: f32,
    pub layer_id: u32,
    /// Duration of the move's layer (s); filled in by finalize
    pub layer_duration: f32,
    /// Machine time at the end of the move, per [`TimeMode`] (s)
    pub time: [f32; TimeMode::COUNT],
    pub print_z: f32,
    pub skip_type: SkipType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arc_center: Option<[f32; 3]>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interpolation_points: Vec<[f32; 3]>,
}

impl MoveVertex {
    pub fn is_arc(&self) -> bool {
        self.arc_center.is_some()
    }
}

/// Colour change, pause or custom G-code event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomGcodeItem {
    pub print_z: f32,
    pub kind: CustomGcodeType,
    /// 1-based filament number for colour changes
    pub extruder: usize,
    pub color: String,
}

/// Time between two custom G-code events
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CustomGcodeSegment {
    pub kind: CustomGcodeType,
    pub time: f32,
    /// Print time left after the segment
    pub remaining: f32,
}

/// Statistics of one simulated mode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModeStatistics {
    pub time: f32,
    pub prepare_time: f32,
    pub custom_gcode_times: Vec<CustomGcodeSegment>,
    /// Non-zero entries only
    pub moves_times: Vec<(MoveType, f32)>,
    /// Non-zero entries only
    pub roles_times: Vec<(ExtrusionRole, f32)>,
    /// Index 0 is layer 1
    pub layers_times: Vec<f32>,
}

/// Aggregates of the whole file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrintStatistics {
    pub normal: ModeStatistics,
    /// Present when the stealth profile was simulated
    pub stealth: Option<ModeStatistics>,
    pub used_filaments: UsedFilaments,
    pub total_filament_changes: u32,
    pub total_extruder_changes: u32,
    pub highest_bed_temperature: f32,
    pub skippable_times: BTreeMap<SkipType, f32>,
    pub total_layers: u32,
}

impl PrintStatistics {
    pub fn mode(&self, mode: TimeMode) -> Option<&ModeStatistics> {
        match mode {
            TimeMode::Normal => Some(&self.normal),
            TimeMode::Stealth => self.stealth.as_ref(),
        }
    }
}

/// Everything produced by one processing run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GcodeResult {
    pub moves: Vec<MoveVertex>,
    pub custom_gcodes: Vec<CustomGcodeItem>,
    pub statistics: PrintStatistics,
    /// Number of lines of the processed file
    pub line_count: u32,
}

impl GcodeResult {
    /// Serialize the statistics as pretty JSON
    pub fn statistics_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.statistics)
    }

    /// Moves of one type
    pub fn moves_of_type(&self, move_type: MoveType) -> impl Iterator<Item = &MoveVertex> {
        self.moves.iter().filter(move |m| m.move_type == move_type)
    }
}

/// `Dd Hh Mm Ss`, leading zero units omitted
pub fn format_dhms(seconds: f32) -> String {
    let total = seconds.max(0.0).round() as u64;
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let secs = total % 60;
    if days > 0 {
        format!("{}d {}h {}m {}s", days, hours, minutes, secs)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_dhms() {
        assert_eq!(format_dhms(5.0), "5s");
        assert_eq!(format_dhms(65.0), "1m 5s");
        assert_eq!(format_dhms(3_725.0), "1h 2m 5s");
        assert_eq!(format_dhms(90_061.0), "1d 1h 1m 1s");
        assert_eq!(format_dhms(-3.0), "0s");
    }

    #[test]
    fn test_statistics_json() {
        let mut result = GcodeResult::default();
        result.statistics.normal.time = 12.5;
        result
            .statistics
            .skippable_times
            .insert(SkipType::HeadWipe, 3.0);
        let json = result.statistics_json().unwrap();
        assert!(json.contains("\"time\": 12.5"));
        assert!(json.contains("head_wipe"));
    }
}
