//! G-code processor
//!
//! [`GcodeProcessor`] reads a file line by line, keeps the modal machine
//! state, classifies every move, feeds one [`TimeMachine`] per simulated
//! mode and collects the moves and statistics into a [`GcodeResult`].
//!
//! Malformed lines are logged and skipped; only file IO and cancellation
//! end processing early.

mod commands;
mod motion;
mod tags;
mod toolchange;

use crate::arc::ArcGeometry;
use crate::filaments::{FilamentProperties, UsedFilaments};
use crate::gcode::{Command, GcodeLine};
use crate::post_process::{self, PostProcessContext};
use crate::result::{
    CustomGcodeItem, CustomGcodeSegment, GcodeResult, ModeStatistics, MoveVertex, PrintStatistics,
};
use crate::state::ModalState;
use gcodeplan_core::{Axis, ExtrusionRole, MoveType, PositioningMode, Result, SkipType, TimeMode, Units};
use gcodeplan_planner::{FinalizedMove, MoveRequest, TimeMachine};
use gcodeplan_settings::{Config, Flavor, MachineLimits, ModeLimits};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Lines processed between two calls of the cancellation callback
pub const CANCEL_CHECK_INTERVAL: u32 = 10_000;

/// Callback polled while processing; an `Err` aborts the run
pub type CancelCallback<'a> = &'a dyn Fn() -> Result<()>;

/// Streaming G-code processor and time estimator
#[derive(Debug, Clone)]
pub struct GcodeProcessor {
    config: Config,
    /// Limits as modified by the file (`M201`, `M204`, ...)
    limits: MachineLimits,
    state: ModalState,
    machines: [TimeMachine; TimeMode::COUNT],
    /// Stealth limits follow envelope commands only after the first move
    envelope_processing: bool,
    moves: Vec<MoveVertex>,
    custom_gcodes: Vec<CustomGcodeItem>,
    used_filaments: UsedFilaments,
    filament_changes: u32,
    extruder_changes: u32,
    skippable_times: BTreeMap<SkipType, f32>,
    /// Next colour handed out to a colour change without one
    default_color_index: usize,
    path: Option<PathBuf>,
}

impl GcodeProcessor {
    pub fn new(config: Config) -> Self {
        let limits = config.machine.limits.clone();
        let machines = [
            TimeMachine::new(TimeMode::Normal, limits.mode(TimeMode::Normal)),
            TimeMachine::new(TimeMode::Stealth, limits.mode(TimeMode::Stealth)),
        ];
        let state = ModalState::new(config.filaments.len(), config.extruders.len());
        let mut processor = Self {
            config,
            limits,
            state,
            machines,
            envelope_processing: false,
            moves: Vec::new(),
            custom_gcodes: Vec::new(),
            used_filaments: UsedFilaments::new(),
            filament_changes: 0,
            extruder_changes: 0,
            skippable_times: BTreeMap::new(),
            default_color_index: 0,
            path: None,
        };
        processor.reset();
        processor
    }

    /// Forget everything learned from the previous file
    pub fn reset(&mut self) {
        self.limits = self.config.machine.limits.clone();
        for mode in TimeMode::ALL {
            let machine = &mut self.machines[mode.index()];
            machine.reset(self.limits.mode(mode));
            machine.set_enabled(match mode {
                TimeMode::Normal => true,
                TimeMode::Stealth => self.config.estimator.enable_stealth,
            });
        }

        self.state = ModalState::new(self.config.filaments.len(), self.config.extruders.len());
        // The first filament starts loaded in its extruder
        let extruder = self.config.physical_extruder(0);
        self.state.extruder_id = Some(extruder);
        if extruder >= self.state.last_filament_per_extruder.len() {
            self.state.last_filament_per_extruder.resize(extruder + 1, None);
        }
        self.state.last_filament_per_extruder[extruder] = Some(0);
        self.state.extruder_unloaded = false;
        for (id, filament) in self.config.filaments.iter().enumerate() {
            self.state.set_temperature(id, filament.nozzle_temperature as f32);
        }

        self.envelope_processing = false;
        self.moves.clear();
        self.custom_gcodes.clear();
        self.used_filaments = UsedFilaments::new();
        self.filament_changes = 0;
        self.extruder_changes = 0;
        self.skippable_times.clear();
        self.default_color_index = 0;
        self.path = None;
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> &ModalState {
        &self.state
    }

    pub fn machine(&self, mode: TimeMode) -> &TimeMachine {
        &self.machines[mode.index()]
    }

    /// Limits currently in effect for `mode`
    pub fn limits(&self, mode: TimeMode) -> &ModeLimits {
        self.limits.mode(mode)
    }

    pub fn moves(&self) -> &[MoveVertex] {
        &self.moves
    }

    /// Process the file at `path`
    ///
    /// `cancel` is polled every [`CANCEL_CHECK_INTERVAL`] lines.
    pub fn process_file(&mut self, path: &Path, cancel: Option<CancelCallback<'_>>) -> Result<()> {
        info!("Processing G-code file {}", path.display());
        self.reset();
        self.path = Some(path.to_path_buf());

        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            if reader.read_until(b'\n', &mut buffer)? == 0 {
                break;
            }
            let text = String::from_utf8_lossy(&buffer);
            // bare carriage returns end a line too
            for line in text.trim_end_matches(['\r', '\n']).split('\r') {
                self.process_line(line);
                if let Some(cancel) = cancel {
                    if self.state.line_id % CANCEL_CHECK_INTERVAL == 0 {
                        cancel()?;
                    }
                }
            }
        }

        info!(
            "Processed {} lines, {} moves",
            self.state.line_id,
            self.moves.len()
        );
        Ok(())
    }

    /// Process G-code held in memory
    pub fn process_buffer(&mut self, gcode: &str) {
        for line in gcode.lines() {
            self.process_line(line);
        }
    }

    /// Process a single line
    pub fn process_line(&mut self, raw: &str) {
        self.state.line_id += 1;
        self.state.start = self.state.end;

        let line = GcodeLine::parse(raw, self.state.line_id);
        let command = line.command();

        if self.config.machine.flavor == Flavor::Klipper && line.is_command("SET_VELOCITY_LIMIT") {
            self.process_set_velocity_limit(&line);
            return;
        }

        if command.len() > 1 {
            if let Some(decoded) = Command::decode(command) {
                self.execute(decoded, &line);
            }
            return;
        }
        if !command.is_empty() {
            return;
        }

        let trimmed = line.raw().trim_start();
        if trimmed.len() <= 2 {
            return;
        }
        let Some(comment) = line.comment() else {
            return;
        };
        if comment.starts_with(['V', 'v']) {
            // virtual command embedded in a comment
            let virtual_line = GcodeLine::parse(comment, self.state.line_id);
            if let Some(decoded) = Command::decode(virtual_line.command()) {
                self.execute(decoded, &virtual_line);
            }
        } else {
            self.process_tags(comment);
        }
    }

    fn execute(&mut self, command: Command, line: &GcodeLine<'_>) {
        match command {
            Command::LinearMove => self.process_linear_move(line),
            Command::ArcMove { clockwise } => self.process_arc_move(line, clockwise),
            Command::Dwell => self.process_dwell(line),
            Command::Retract => self.store_move(MoveType::Retract, None),
            Command::Unretract => self.store_move(MoveType::Unretract, None),
            Command::InchUnits => self.state.units = Units::Inches,
            Command::MillimeterUnits => self.state.units = Units::Millimeters,
            Command::Home => self.process_home(line),
            Command::BedLeveling => self.simulate_wait(commands::BED_LEVELING_TIME, ExtrusionRole::None),
            Command::AbsolutePositioning => {
                self.state.global_positioning = PositioningMode::Absolute
            }
            Command::RelativePositioning => {
                self.state.global_positioning = PositioningMode::Relative
            }
            Command::SetPosition => self.process_set_position(line),
            Command::Sleep => self.simulate_wait(0.0, ExtrusionRole::None),
            Command::AbsoluteExtrusion => {
                self.state.e_local_positioning = PositioningMode::Absolute
            }
            Command::RelativeExtrusion => {
                self.state.e_local_positioning = PositioningMode::Relative
            }
            Command::SetNozzleTemperature => self.process_set_temperature(line),
            Command::FanOn => self.process_fan_on(line),
            Command::FanOff => self.state.fan_speed = 0.0,
            Command::SelectTool => self.process_select_tool(line),
            Command::WaitNozzleTemperature => self.process_wait_temperature(line),
            Command::ResetAxes => self.process_reset_axes(line),
            Command::SetBedTemperature => self.process_bed_temperature(line),
            Command::WaitChamberTemperature => self.process_chamber_temperature(line),
            Command::MaxAcceleration => self.process_max_acceleration(line),
            Command::MaxFeedrate => self.process_max_feedrate(line),
            Command::Acceleration => self.process_acceleration(line),
            Command::AdvancedSettings => self.process_advanced_settings(line),
            Command::ExtrudeFactor => self.process_extrude_factor(line),
            Command::WaitMoves => self.process_wait_moves(line),
            Command::SavePosition => self.process_save_position(),
            Command::RestorePosition => self.process_restore_position(),
            Command::JerkPerMinute => self.process_jerk_per_minute(line),
            Command::UnloadFilament => self.process_unload(line),
            Command::FilamentChange => self.process_filament_change_command(line),
            Command::Sync => self.process_sync(line),
            Command::ToolChange | Command::VirtualToolChange => self.process_tool_command(line),
        }
    }

    /// Run `step` on every machine and record what it flushed
    fn run_machines(&mut self, mut step: impl FnMut(&mut TimeMachine, &ModeLimits) -> Vec<FinalizedMove>) {
        for mode in TimeMode::ALL {
            let flushed = step(&mut self.machines[mode.index()], self.limits.mode(mode));
            self.apply_flushed(mode, &flushed);
        }
    }

    fn apply_flushed(&mut self, mode: TimeMode, flushed: &[FinalizedMove]) {
        for finalized in flushed {
            let Some(vertex) = self.moves.get_mut(finalized.move_id) else {
                debug_assert!(false, "flushed block without a move: {}", finalized.move_id);
                continue;
            };
            vertex.time[mode.index()] = finalized.elapsed;
            if mode == TimeMode::Normal && finalized.skippable && vertex.skip_type != SkipType::None {
                *self.skippable_times.entry(vertex.skip_type).or_default() += finalized.block_time;
            }
        }
    }

    fn plan(&mut self, request: &MoveRequest) {
        self.run_machines(|machine, limits| machine.plan_move(request, limits));
    }

    fn simulate_wait(&mut self, extra_time: f32, role: ExtrusionRole) {
        self.run_machines(|machine, _| machine.simulate_wait(extra_time, role));
    }

    fn active_extruder(&self) -> usize {
        self.state
            .extruder_id
            .unwrap_or_else(|| self.config.physical_extruder(self.state.filament_id))
    }

    fn filament_properties(&self) -> FilamentProperties {
        let filament = self.config.filament(self.state.filament_id);
        FilamentProperties {
            diameter: filament.diameter,
            density: filament.density,
        }
    }

    fn process_role_cache(&mut self) {
        let properties = self.filament_properties();
        self.used_filaments.process_role_cache(self.state.role, properties);
    }

    /// Record a move with the current state
    fn store_move(&mut self, move_type: MoveType, arc: Option<ArcGeometry>) {
        let gcode_id = match move_type {
            MoveType::ColorChange | MoveType::PausePrint | MoveType::CustomGcode => {
                self.state.line_id + 1
            }
            _ => self.state.line_id,
        };
        let (arc_center, interpolation_points) = match arc {
            Some(arc) => (Some(arc.center), arc.points),
            None => (None, Vec::new()),
        };
        let end = self.state.end;
        self.moves.push(MoveVertex {
            gcode_id,
            move_type,
            role: self.state.role,
            filament_id: self.state.filament_id,
            extruder_id: self.active_extruder(),
            position: end.xyz(),
            delta_extruder: self.state.delta()[Axis::E],
            feedrate: self.state.feedrate,
            width: self.state.width,
            height: self.state.height,
            mm3_per_mm: self.state.mm3_per_mm,
            fan_speed: self.state.fan_speed,
            temperature: self.state.temperature(),
            layer_id: self.state.layer_id,
            layer_duration: 0.0,
            time: [0.0; TimeMode::COUNT],
            print_z: self.state.print_z,
            skip_type: self.state.skip_type,
            arc_center,
            interpolation_points,
        });

        if matches!(move_type, MoveType::ColorChange | MoveType::PausePrint) {
            let g1_line_id = self.state.g1_line_id;
            for machine in &mut self.machines {
                machine.add_stop(g1_line_id);
            }
        }
    }

    /// Flush all machines, build the statistics and optionally rewrite
    /// the processed file in place
    pub fn finalize(&mut self, post_process: bool) -> Result<GcodeResult> {
        for vertex in &mut self.moves {
            if vertex.move_type == MoveType::Wipe {
                vertex.width = crate::moves::WIPE_WIDTH;
                vertex.height = crate::moves::WIPE_HEIGHT;
            }
        }

        self.run_machines(|machine, _| machine.finalize());

        let properties = self.filament_properties();
        self.used_filaments
            .process_caches(self.state.filament_id, self.state.role, properties);

        // moves that never reached a flushed block inherit the previous time
        for i in 1..self.moves.len() {
            if self.moves[i].time.iter().all(|t| *t == 0.0) {
                self.moves[i].time = self.moves[i - 1].time;
            }
        }

        let statistics = self.build_statistics();
        self.fill_layer_durations();

        if post_process {
            if let Some(path) = self.path.clone() {
                let context = PostProcessContext {
                    config: &self.config,
                    machines: &self.machines,
                    statistics: &statistics,
                };
                post_process::run(&path, &context, &mut self.moves)?;
            } else {
                debug!("No file to post-process");
            }
        }

        Ok(GcodeResult {
            moves: std::mem::take(&mut self.moves),
            custom_gcodes: std::mem::take(&mut self.custom_gcodes),
            statistics,
            line_count: self.state.line_id,
        })
    }

    fn mode_statistics(machine: &TimeMachine) -> ModeStatistics {
        let time = machine.time();
        let mut elapsed = 0.0;
        let custom_gcode_times = machine
            .custom_gcode_times()
            .iter()
            .map(|(kind, segment)| {
                elapsed += segment;
                CustomGcodeSegment {
                    kind: *kind,
                    time: *segment,
                    remaining: time - elapsed,
                }
            })
            .collect();
        let moves_times = MoveType::ALL
            .iter()
            .map(|t| (*t, machine.moves_time()[t.index()]))
            .filter(|(_, time)| *time != 0.0)
            .collect();
        let roles_times = ExtrusionRole::ALL
            .iter()
            .map(|r| (*r, machine.roles_time()[r.index()]))
            .filter(|(_, time)| *time != 0.0)
            .collect();
        ModeStatistics {
            time,
            prepare_time: machine.prepare_time(),
            custom_gcode_times,
            moves_times,
            roles_times,
            layers_times: machine.layers_time().to_vec(),
        }
    }

    fn build_statistics(&self) -> PrintStatistics {
        let stealth = &self.machines[TimeMode::Stealth.index()];
        PrintStatistics {
            normal: Self::mode_statistics(&self.machines[TimeMode::Normal.index()]),
            stealth: stealth
                .is_enabled()
                .then(|| Self::mode_statistics(stealth)),
            used_filaments: self.used_filaments.clone(),
            total_filament_changes: self.filament_changes,
            total_extruder_changes: self.extruder_changes,
            highest_bed_temperature: self.state.highest_bed_temp,
            skippable_times: self.skippable_times.clone(),
            total_layers: self.state.layer_id,
        }
    }

    fn fill_layer_durations(&mut self) {
        let machine = &self.machines[TimeMode::Normal.index()];
        let layers = machine.layers_time();
        let custom_time = machine.roles_time()[ExtrusionRole::Custom.index()];
        for vertex in &mut self.moves {
            let layer = vertex.layer_id.max(1) as usize;
            vertex.layer_duration = match layers.get(layer - 1) {
                // the start G-code runs on the first layer
                Some(time) if layer == 1 => (time - custom_time).max(0.0),
                Some(time) => *time,
                None => 0.0,
            };
        }
    }
}

impl From<Config> for GcodeProcessor {
    fn from(config: Config) -> Self {
        Self::new(config)
    }
}

/// Process `path` with `config` and return the result
///
/// Convenience wrapper around [`GcodeProcessor`].
pub fn process_file(path: &Path, config: Config, post_process: bool) -> Result<GcodeResult> {
    let mut processor = GcodeProcessor::new(config);
    processor.process_file(path, None)?;
    processor.finalize(post_process)
}
