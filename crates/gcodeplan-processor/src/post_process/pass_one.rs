//! First rewrite pass: placeholders, progress lines and usage ranges

use super::offsets::OffsetMap;
use super::usage::{ExtruderUsageBlock, FilamentUsageBlock, GcodeBounds, UNSET};
use super::PostProcessContext;
use crate::gcode::Command;
use crate::result::format_dhms;
use crate::tags::{Placeholder, Tag};
use gcodeplan_core::TimeMode;
use gcodeplan_planner::TimeMachine;
use gcodeplan_settings::FilamentSettings;
use regex::Regex;
use std::sync::OnceLock;

/// Highest filament id a tool change line may select
const MAX_FILAMENT_ID: i64 = 254;

/// Whole minutes as printed in `M73`, rounded to the nearest minute
pub fn time_in_minutes(seconds: f32) -> i32 {
    ((seconds + 0.5) / 60.0) as i32
}

fn nozzle_change_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"OF(\d+)\s+NF(\d+)").expect("valid nozzle change pattern"))
}

/// `(previous filament, next filament)` of a nozzle change tag
fn parse_nozzle_change(text: &str) -> Option<(usize, usize)> {
    let captures = nozzle_change_regex().captures(text)?;
    let previous = captures[1].parse().ok()?;
    let next = captures[2].parse().ok()?;
    Some((previous, next))
}

/// Leading integer of `text`, ignoring what follows it
fn leading_int(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let end = text
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+'))))
        .map_or(text.len(), |(i, _)| i);
    text[..end].parse().ok()
}

fn filament_id(value: Option<i64>) -> Option<usize> {
    value
        .filter(|id| (0..=MAX_FILAMENT_ID).contains(id))
        .map(|id| id as usize)
}

/// What a line means to the first pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind<'a> {
    /// A line the processor counted as a motion line
    Motion,
    FilamentChange(usize),
    NozzleChangeStart,
    NozzleChangeEnd(&'a str),
    Tag(Tag<'a>),
    Other,
}

fn classify_line(raw: &str) -> LineKind<'_> {
    let (code, comment) = match raw.find(';') {
        Some(pos) => (&raw[..pos], Some(&raw[pos + 1..])),
        None => (raw, None),
    };
    let word = code.split_whitespace().next().unwrap_or("");
    if word.len() > 1 {
        return match Command::decode(word) {
            Some(Command::LinearMove | Command::ArcMove { .. } | Command::Home) => LineKind::Motion,
            Some(Command::ToolChange) => filament_id(leading_int(&word[1..]))
                .map_or(LineKind::Other, LineKind::FilamentChange),
            Some(Command::FilamentChange) => {
                let value = code.find(['S', 's']).and_then(|pos| leading_int(&code[pos + 1..]));
                filament_id(value).map_or(LineKind::Other, LineKind::FilamentChange)
            }
            _ => LineKind::Other,
        };
    }
    if !word.is_empty() {
        return LineKind::Other;
    }
    let Some(comment) = comment else {
        return LineKind::Other;
    };
    if comment.starts_with(['V', 'v']) {
        // virtual command embedded in a comment
        let word = comment.split_whitespace().next().unwrap_or("");
        return match Command::decode(word) {
            Some(Command::LinearMove) => LineKind::Motion,
            Some(Command::VirtualToolChange) => filament_id(leading_int(&word[2..]))
                .map_or(LineKind::Other, LineKind::FilamentChange),
            _ => LineKind::Other,
        };
    }
    match Tag::parse(comment) {
        Some(Tag::NozzleChangeStart(_)) => LineKind::NozzleChangeStart,
        Some(Tag::NozzleChangeEnd(rest)) => LineKind::NozzleChangeEnd(rest),
        Some(tag) => LineKind::Tag(tag),
        None => LineKind::Other,
    }
}

/// Everything the first pass learned about the file
#[derive(Debug, Clone, Default)]
pub struct PassOneReport {
    /// `(line id, lines inserted)` in file order
    pub offsets: Vec<(u32, u32)>,
    pub filament_blocks: Vec<FilamentUsageBlock>,
    pub extruder_blocks: Vec<ExtruderUsageBlock>,
    /// Inclusive `(start, end)` line ids
    pub skippable_blocks: Vec<(u32, u32)>,
    pub bounds: GcodeBounds,
}

impl PassOneReport {
    /// Move every recorded line id past the lines the pass inserted
    pub fn shift(&mut self, offsets: &OffsetMap) {
        for block in &mut self.filament_blocks {
            block.lower = offsets.shift(block.lower);
            block.upper = offsets.shift(block.upper);
        }
        for block in &mut self.extruder_blocks {
            block.shift(offsets);
        }
        for (start, end) in &mut self.skippable_blocks {
            *start = offsets.shift(*start);
            *end = offsets.shift(*end);
        }
        self.bounds.start_gcode_end = offsets.shift(self.bounds.start_gcode_end);
        self.bounds.end_gcode_start = offsets.shift(self.bounds.end_gcode_start);
    }

    /// Close the open ends of the usage ranges at the machine G-code bounds
    pub fn close_usage_blocks(&mut self, filament_map: &[usize]) {
        let end = self.bounds.end_gcode_start;
        if let Some(last) = self.filament_blocks.last_mut() {
            last.upper = end;
        }

        let first_filament = self
            .filament_blocks
            .first()
            .and_then(|b| b.filament_id)
            .unwrap_or(0);
        let last_filament = self
            .filament_blocks
            .last()
            .and_then(|b| b.filament_id)
            .unwrap_or(0);
        let start = self.bounds.start_gcode_end;
        if let Some(first) = self.extruder_blocks.first_mut() {
            first.open(
                filament_map.get(first_filament).copied(),
                start,
                Some(first_filament),
            );
        }
        if let Some(last) = self.extruder_blocks.last_mut() {
            last.mark_post_extrusion(end);
            last.close(end, Some(last_filament), end);
        }
    }
}

/// Per-line handler of the first pass
pub struct PassOne<'a> {
    ctx: &'a PostProcessContext<'a>,
    /// Last `(percent, minutes)` written per mode
    last_progress: [(i32, i32); TimeMode::COUNT],
    /// Last minutes-to-stop written per mode
    last_stop: [i32; TimeMode::COUNT],
    /// Position in each machine's G1 time cache
    g1_cursor: [usize; TimeMode::COUNT],
    g1_lines: u32,
    report: PassOneReport,
}

impl<'a> PassOne<'a> {
    pub fn new(ctx: &'a PostProcessContext<'a>) -> Self {
        let mut last_progress = [(0, 0); TimeMode::COUNT];
        let mut last_stop = [0; TimeMode::COUNT];
        for machine in ctx.machines {
            let minutes = time_in_minutes(machine.time());
            last_progress[machine.mode().index()] = (0, minutes);
            last_stop[machine.mode().index()] = minutes;
        }
        Self {
            ctx,
            last_progress,
            last_stop,
            g1_cursor: [0; TimeMode::COUNT],
            g1_lines: 0,
            report: PassOneReport {
                // the first extruder in use has no nozzle change tag
                extruder_blocks: vec![ExtruderUsageBlock::default()],
                ..PassOneReport::default()
            },
        }
    }

    fn enabled_machines(&self) -> impl Iterator<Item = &'a TimeMachine> {
        self.ctx.machines.iter().filter(|m| m.is_enabled())
    }

    /// Handle one line, appending what replaces it to `out`
    ///
    /// Lines are kept byte for byte; only their lossy text is inspected.
    pub fn handle_line(&mut self, line_id: u32, raw: &[u8], out: &mut Vec<u8>) {
        let line = String::from_utf8_lossy(raw);
        if let Some(text) = self.placeholder(&line) {
            let added = text.matches('\n').count() as u32;
            if added > 1 {
                self.report.offsets.push((line_id, added - 1));
            }
            out.extend_from_slice(text.as_bytes());
            return;
        }

        match classify_line(&line) {
            LineKind::Motion => {
                self.g1_lines += 1;
                let mut progress = String::new();
                let added = self.progress_lines(&mut progress);
                if added > 0 {
                    self.report.offsets.push((line_id, added));
                    out.extend_from_slice(progress.as_bytes());
                }
            }
            LineKind::FilamentChange(filament) => self.filament_change(filament, line_id),
            LineKind::NozzleChangeStart => {
                if let Some(last) = self.report.extruder_blocks.last_mut() {
                    last.mark_post_extrusion(line_id);
                }
            }
            LineKind::NozzleChangeEnd(rest) => self.nozzle_change_end(rest, line_id),
            LineKind::Tag(tag) => self.marker(tag, line_id),
            LineKind::Other => {}
        }
        out.extend_from_slice(raw);
        out.push(b'\n');
    }

    pub fn finish(self) -> PassOneReport {
        self.report
    }

    fn marker(&mut self, tag: Tag<'_>, line_id: u32) {
        match tag {
            Tag::MachineStartGcodeEnd => self.report.bounds.start_gcode_end = line_id,
            Tag::MachineEndGcodeStart => self.report.bounds.end_gcode_start = line_id,
            Tag::SkippableStart => self.report.skippable_blocks.push((line_id, UNSET)),
            Tag::SkippableEnd => {
                if let Some(block) = self.report.skippable_blocks.last_mut() {
                    block.1 = line_id;
                }
            }
            _ => {}
        }
    }

    /// Filament changes inside the machine start or end G-code are ignored
    fn filament_change(&mut self, filament: usize, line_id: u32) {
        let bounds = self.report.bounds;
        if bounds.start_gcode_end == UNSET
            || (bounds.end_gcode_start != UNSET && line_id > bounds.end_gcode_start)
        {
            return;
        }
        if let Some(last) = self.report.filament_blocks.last_mut() {
            last.upper = line_id;
        }
        self.report.filament_blocks.push(FilamentUsageBlock {
            filament_id: Some(filament),
            lower: line_id,
            upper: UNSET,
        });
    }

    fn nozzle_change_end(&mut self, text: &str, line_id: u32) {
        let change = parse_nozzle_change(text);
        let previous = change.map(|(previous, _)| previous);
        let next = change.map(|(_, next)| next);
        if let Some(last) = self.report.extruder_blocks.last_mut() {
            last.close(line_id, previous, line_id);
        }
        let mut block = ExtruderUsageBlock::default();
        block.open(
            next.map(|id| self.ctx.config.physical_extruder(id)),
            line_id,
            next,
        );
        self.report.extruder_blocks.push(block);
    }

    fn placeholder(&mut self, line: &str) -> Option<String> {
        let comment = line.trim_start().strip_prefix(';')?;
        let placeholder = Placeholder::parse(comment)?;
        let mut text = String::new();
        match placeholder {
            Placeholder::FirstLineProgress | Placeholder::LastLineProgress => {
                let first = placeholder == Placeholder::FirstLineProgress;
                for machine in self.enabled_machines() {
                    let (percent, remaining) = machine.mode().progress_mask();
                    let minutes = if first {
                        time_in_minutes(machine.time())
                    } else {
                        0
                    };
                    text.push_str(&format!(
                        "M73 {}{} {}{}\n",
                        percent,
                        if first { 0 } else { 100 },
                        remaining,
                        minutes
                    ));
                    if let Some(stop) = machine.stop_times().first().filter(|_| first) {
                        let minutes = time_in_minutes(stop.elapsed);
                        text.push_str(&format!("M73 {}{}\n", machine.mode().stop_mask(), minutes));
                        self.last_stop[machine.mode().index()] = minutes;
                    }
                }
            }
            Placeholder::EstimatedPrintingTime => {
                for machine in self.ctx.machines {
                    if machine.mode() == TimeMode::Normal || machine.is_enabled() {
                        text.push_str(&format!(
                            "; model printing time: {}; total estimated time: {}\n",
                            format_dhms(machine.time() - machine.prepare_time()),
                            format_dhms(machine.time())
                        ));
                    }
                }
            }
            Placeholder::TotalLayerNumber => {
                text.push_str(&format!(
                    "; total layer number: {}\n",
                    self.ctx.statistics.total_layers
                ));
            }
            Placeholder::FilamentWeight => {
                text = self.filament_summary("total filament weight [g]", |volume, filament| {
                    volume * filament.density * 0.001
                });
            }
            Placeholder::FilamentVolume => {
                text = self.filament_summary("total filament volume [cm^3]", |volume, _| {
                    volume * 0.001
                });
            }
            Placeholder::FilamentLength => {
                text = self.filament_summary("total filament length [mm]", |volume, filament| {
                    volume / filament.area()
                });
            }
        }
        Some(text)
    }

    /// `; <label> : v0,v1,...` over the filaments that were used
    fn filament_summary(
        &self,
        label: &str,
        value: impl Fn(f32, &FilamentSettings) -> f32,
    ) -> String {
        let filaments = &self.ctx.config.filaments;
        let values: Vec<String> = self
            .ctx
            .statistics
            .used_filaments
            .total_volumes_per_filament
            .iter()
            .filter_map(|(id, volume)| filaments.get(*id).map(|f| value(*volume, f)))
            .map(|v| format!("{:.2}", v))
            .collect();
        format!("; {} : {}\n", label, values.join(","))
    }

    /// Progress and time-to-stop lines for the current motion line
    fn progress_lines(&mut self, out: &mut String) -> u32 {
        let mut added = 0;
        for machine in self.ctx.machines.iter().filter(|m| m.is_enabled()) {
            let index = machine.mode().index();
            let cache = machine.g1_times_cache();
            let cursor = &mut self.g1_cursor[index];
            while *cursor < cache.len() && cache[*cursor].g1_line_id < self.g1_lines {
                *cursor += 1;
            }
            let Some(entry) = cache.get(*cursor).filter(|e| e.g1_line_id == self.g1_lines) else {
                continue;
            };
            let cursor = *cursor;

            let total = machine.time();
            let progress = (
                (100.0 * entry.elapsed / total) as i32,
                time_in_minutes(total - entry.elapsed),
            );
            if self.last_progress[index] != progress {
                let (percent, remaining) = machine.mode().progress_mask();
                out.push_str(&format!(
                    "M73 {}{} {}{}\n",
                    percent, progress.0, remaining, progress.1
                ));
                self.last_progress[index] = progress;
                added += 1;
            }

            let stops = machine.stop_times();
            let stop_index = stops.partition_point(|s| s.elapsed <= entry.elapsed);
            let Some(stop) = stops.get(stop_index) else {
                continue;
            };
            let to_stop = time_in_minutes(stop.elapsed - entry.elapsed);
            if self.last_stop[index] == to_stop {
                continue;
            }
            let mask = machine.mode().stop_mask();
            if to_stop > 0 {
                out.push_str(&format!("M73 {}{}\n", mask, to_stop));
                self.last_stop[index] = to_stop;
                added += 1;
                continue;
            }

            // under a minute to go: write the fraction on the last line before the stop
            let mut is_last = cursor + 1 == cache.len();
            if let Some(next) = cache.get(cursor + 1) {
                let next_stop = stops.partition_point(|s| s.elapsed <= next.elapsed);
                is_last |= next_stop != stop_index;
                let now = format!("{:.2}", (stop.elapsed - entry.elapsed) / 60.0);
                let then = format!("{:.2}", (stop.elapsed - next.elapsed) / 60.0);
                let now: f32 = now.parse().unwrap_or(0.0);
                let then: f32 = then.parse().unwrap_or(0.0);
                is_last |= now > 0.0 && then == 0.0;
            }
            if is_last {
                if stop_index + 1 == stops.len() {
                    out.push_str(&format!("M73 {}{}\n", mask, to_stop));
                } else {
                    out.push_str(&format!(
                        "M73 {}{:.2}\n",
                        mask,
                        (stop.elapsed - entry.elapsed) / 60.0
                    ));
                }
                self.last_stop[index] = to_stop;
                added += 1;
            }
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_in_minutes() {
        assert_eq!(time_in_minutes(0.0), 0);
        assert_eq!(time_in_minutes(59.4), 0);
        assert_eq!(time_in_minutes(59.5), 1);
        assert_eq!(time_in_minutes(150.0), 2);
    }

    #[test]
    fn test_leading_int() {
        assert_eq!(leading_int("12"), Some(12));
        assert_eq!(leading_int("3 ; comment"), Some(3));
        assert_eq!(leading_int("-1"), Some(-1));
        assert_eq!(leading_int("x"), None);
        assert_eq!(leading_int(""), None);
    }

    #[test]
    fn test_parse_nozzle_change() {
        assert_eq!(parse_nozzle_change(" OF0 NF3"), Some((0, 3)));
        assert_eq!(parse_nozzle_change(" OF12   NF1 ; x"), Some((12, 1)));
        assert_eq!(parse_nozzle_change(" garbage"), None);
    }

    #[test]
    fn test_classify_line() {
        assert_eq!(classify_line("G1 X10 F600"), LineKind::Motion);
        assert_eq!(classify_line("  G2 X1 Y1 I1"), LineKind::Motion);
        assert_eq!(classify_line("G28"), LineKind::Motion);
        assert_eq!(classify_line(";VG1 X2"), LineKind::Motion);
        assert_eq!(classify_line("T2"), LineKind::FilamentChange(2));
        assert_eq!(classify_line(";VT3"), LineKind::FilamentChange(3));
        assert_eq!(classify_line("M1020 S1"), LineKind::FilamentChange(1));
        assert_eq!(classify_line("T255"), LineKind::Other);
        assert_eq!(classify_line("M104 S200"), LineKind::Other);
        assert_eq!(classify_line(";NOZZLE_CHANGE_START"), LineKind::NozzleChangeStart);
        assert_eq!(
            classify_line(";NOZZLE_CHANGE_END OF0 NF1"),
            LineKind::NozzleChangeEnd(" OF0 NF1")
        );
        assert_eq!(
            classify_line(";MACHINE_START_GCODE_END"),
            LineKind::Tag(Tag::MachineStartGcodeEnd)
        );
    }

    #[test]
    fn test_close_usage_blocks() {
        let mut report = PassOneReport {
            filament_blocks: vec![
                FilamentUsageBlock {
                    filament_id: Some(1),
                    lower: 20,
                    upper: 50,
                },
                FilamentUsageBlock {
                    filament_id: Some(0),
                    lower: 50,
                    upper: UNSET,
                },
            ],
            extruder_blocks: vec![ExtruderUsageBlock::default()],
            bounds: GcodeBounds {
                start_gcode_end: 10,
                end_gcode_start: 90,
            },
            ..PassOneReport::default()
        };
        report.close_usage_blocks(&[0, 1]);
        assert_eq!(report.filament_blocks[1].upper, 90);
        let block = report.extruder_blocks[0];
        assert_eq!(block.extruder_id, Some(1));
        assert_eq!(block.start_id, 10);
        assert_eq!(block.start_filament, Some(1));
        assert_eq!(block.end_id, 90);
        assert_eq!(block.end_filament, Some(0));
    }
}
