//! Non-motion commands: temperatures, fan, machine envelope, waits

use super::GcodeProcessor;
use crate::gcode::GcodeLine;
use gcodeplan_core::{Axis, ExtrusionRole, TimeMode, Units, INCHES_TO_MM, MMMIN_TO_MMSEC};
use gcodeplan_settings::{Flavor, ModeLimits};
use tracing::{debug, warn};

/// Time charged for `G29` bed levelling (s)
pub const BED_LEVELING_TIME: f32 = 260.0;

/// Time charged for heating the chamber with `M191` (s)
pub const CHAMBER_HEATING_TIME: f32 = 720.0;

/// `M191` targets at or below this do not wait
pub const CHAMBER_WAIT_THRESHOLD: f32 = 40.0;

impl GcodeProcessor {
    /// Modes an envelope command applies to
    fn envelope_modes(&self) -> impl Iterator<Item = TimeMode> {
        let stealth = self.envelope_processing;
        TimeMode::ALL
            .into_iter()
            .filter(move |mode| *mode == TimeMode::Normal || stealth)
    }

    fn update_envelope(&mut self, mut update: impl FnMut(&mut ModeLimits)) {
        let modes: Vec<TimeMode> = self.envelope_modes().collect();
        for mode in modes {
            update(self.limits.mode_mut(mode));
        }
    }

    /// `M104 S<temp> [T<filament>]`
    pub(super) fn process_set_temperature(&mut self, line: &GcodeLine<'_>) {
        let Some(temperature) = line.value('S') else {
            return;
        };
        let id = line
            .value('T')
            .map(|t| t as usize)
            .filter(|t| *t < self.state.extruder_temps.len())
            .unwrap_or(self.state.filament_id);
        self.state.set_temperature(id, temperature);
    }

    /// `M109 S<temp>` or `M109 R<temp>`, optionally for `T<filament>`
    pub(super) fn process_wait_temperature(&mut self, line: &GcodeLine<'_>) {
        let Some(temperature) = line.value('R').or_else(|| line.value('S')) else {
            return;
        };
        let id = line
            .value('T')
            .map(|t| t as usize)
            .filter(|t| *t < self.state.extruder_temps.len())
            .unwrap_or(self.state.filament_id);
        self.state.set_temperature(id, temperature);
    }

    /// `M106 [P<fan>] S<0-255>`; only the part cooling fan is tracked
    pub(super) fn process_fan_on(&mut self, line: &GcodeLine<'_>) {
        match line.value('P') {
            None => {}
            Some(p) if p == 0.0 || p == 1.0 => {}
            Some(_) => return,
        }
        self.state.fan_speed = match line.value('S') {
            Some(s) => 100.0 * s / 255.0,
            None => 100.0,
        };
    }

    /// `M140` / `M190`
    pub(super) fn process_bed_temperature(&mut self, line: &GcodeLine<'_>) {
        if let Some(s) = line.value('S') {
            self.state.highest_bed_temp = self.state.highest_bed_temp.max(s.trunc());
        }
    }

    /// `M191 S<temp>`
    pub(super) fn process_chamber_temperature(&mut self, line: &GcodeLine<'_>) {
        if line.value('S').is_some_and(|s| s > CHAMBER_WAIT_THRESHOLD) {
            self.simulate_wait(CHAMBER_HEATING_TIME, ExtrusionRole::None);
        }
    }

    /// `M201` maximum acceleration per axis
    pub(super) fn process_max_acceleration(&mut self, line: &GcodeLine<'_>) {
        let flavor = self.config.machine.flavor;
        let factor = if self.state.units == Units::Inches
            && !matches!(flavor, Flavor::RepRapFirmware | Flavor::Sprinter)
        {
            INCHES_TO_MM
        } else {
            1.0
        };
        self.update_envelope(|limits| {
            for axis in Axis::ALL {
                if let Some(value) = line.axis(axis) {
                    limits.set_max_acceleration(axis, value * factor);
                }
            }
        });
    }

    /// `M203` maximum feed rate per axis
    pub(super) fn process_max_feedrate(&mut self, line: &GcodeLine<'_>) {
        let flavor = self.config.machine.flavor;
        if flavor == Flavor::Repetier {
            // Repetier uses M203 for temperature monitoring
            return;
        }
        let factor = if flavor.m203_in_mm_per_min() {
            MMMIN_TO_MMSEC
        } else {
            1.0
        };
        self.update_envelope(|limits| {
            for axis in Axis::ALL {
                if let Some(value) = line.axis(axis) {
                    limits.set_max_feedrate(axis, value * factor);
                }
            }
        });
    }

    /// `M204` printing, retract and travel accelerations
    pub(super) fn process_acceleration(&mut self, line: &GcodeLine<'_>) {
        let modes: Vec<TimeMode> = self.envelope_modes().collect();
        for mode in modes {
            let machine = &mut self.machines[mode.index()];
            if let Some(s) = line.value('S') {
                // legacy form: S sets printing and travel
                machine.set_acceleration(s);
                machine.set_travel_acceleration(s);
                if let Some(t) = line.value('T') {
                    machine.set_retract_acceleration(t);
                }
                continue;
            }
            if let Some(p) = line.value('P') {
                machine.set_acceleration(p);
            }
            if let Some(r) = line.value('R') {
                machine.set_retract_acceleration(r);
            }
            if let Some(t) = line.value('T') {
                machine.set_travel_acceleration(t);
            }
        }
    }

    /// `M205` jerk and minimum feed rates
    pub(super) fn process_advanced_settings(&mut self, line: &GcodeLine<'_>) {
        self.update_envelope(|limits| {
            if let Some(x) = line.value('X') {
                limits.max_jerk.set(Axis::X, x);
                limits.max_jerk.set(Axis::Y, x);
            }
            if let Some(y) = line.value('Y') {
                limits.max_jerk.set(Axis::Y, y);
            }
            if let Some(z) = line.value('Z') {
                limits.max_jerk.set(Axis::Z, z);
            }
            if let Some(e) = line.value('E') {
                limits.max_jerk.set(Axis::E, e);
            }
            if let Some(s) = line.value('S') {
                limits.min_extruding_feedrate = s;
            }
            if let Some(t) = line.value('T') {
                limits.min_travel_feedrate = t;
            }
        });
    }

    /// `M566` jerk in mm/min, applied to every mode
    pub(super) fn process_jerk_per_minute(&mut self, line: &GcodeLine<'_>) {
        for mode in TimeMode::ALL {
            let limits = self.limits.mode_mut(mode);
            for axis in Axis::ALL {
                if let Some(value) = line.axis(axis) {
                    limits.max_jerk.set(axis, value * MMMIN_TO_MMSEC);
                }
            }
        }
    }

    /// Klipper `SET_VELOCITY_LIMIT`
    pub(super) fn process_set_velocity_limit(&mut self, line: &GcodeLine<'_>) {
        let corner = line.named("SQUARE_CORNER_VELOCITY");
        let accel = line.named("ACCEL");
        let velocity = line.named("VELOCITY");
        for mode in TimeMode::ALL {
            let limits = self.limits.mode_mut(mode);
            if let Some(v) = corner {
                limits.max_jerk.set(Axis::X, v);
                limits.max_jerk.set(Axis::Y, v);
            }
            if let Some(v) = velocity {
                limits.set_max_feedrate(Axis::X, v);
                limits.set_max_feedrate(Axis::Y, v);
            }
            if let Some(a) = accel {
                let machine = &mut self.machines[mode.index()];
                machine.set_acceleration(a);
                machine.set_travel_acceleration(a);
            }
        }
    }

    /// `M221 S<percent>` extrusion multiplier
    pub(super) fn process_extrude_factor(&mut self, line: &GcodeLine<'_>) {
        if line.has('T') {
            return;
        }
        if let Some(s) = line.value('S') {
            for machine in &mut self.machines {
                machine.set_extrude_factor_override(s * 0.01);
            }
        }
    }

    /// `M400 [S<seconds>] [P<milliseconds>]`
    pub(super) fn process_wait_moves(&mut self, line: &GcodeLine<'_>) {
        let time = line.value('S').unwrap_or(0.0) + line.value('P').unwrap_or(0.0) * 0.001;
        self.simulate_wait(time, ExtrusionRole::None);
    }

    /// `SYNC T<seconds>`
    pub(super) fn process_sync(&mut self, line: &GcodeLine<'_>) {
        if let Some(t) = line.value('T').filter(|t| *t > 0.0) {
            self.simulate_wait(t, ExtrusionRole::None);
        }
    }

    /// `M702 C` parks the active filament
    pub(super) fn process_unload(&mut self, line: &GcodeLine<'_>) {
        if !line.has('C') {
            return;
        }
        let unload = self.filament_unload_time();
        self.state.extruder_unloaded = true;
        debug!("Filament unloaded at line {}", line.line_number());
        self.simulate_wait(unload, ExtrusionRole::None);
    }

    /// `M108 T<n>` / `M135 T<n>`
    pub(super) fn process_select_tool(&mut self, line: &GcodeLine<'_>) {
        let raw = line.raw();
        let Some(pos) = raw.find('T') else {
            warn!("Line {}: tool selection without T", line.line_number());
            return;
        };
        let token = raw[pos..].split_whitespace().next().unwrap_or("T");
        self.process_tool_token(token, line.line_number());
    }
}
