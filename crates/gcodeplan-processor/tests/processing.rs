//! End-to-end estimation tests over in-memory and on-disk G-code

use gcodeplan_core::{Error, MoveType};
use gcodeplan_processor::{CancelCallback, GcodeProcessor, CANCEL_CHECK_INTERVAL};
use gcodeplan_settings::{Config, FilamentSettings, Flavor, MachineSettings, ToolChangeSettings};
use proptest::prelude::*;
use std::cell::Cell;
use std::io::Write;

fn estimate(gcode: &str, config: Config) -> gcodeplan_processor::GcodeResult {
    let mut processor = GcodeProcessor::new(config);
    processor.process_buffer(gcode);
    processor.finalize(false).unwrap()
}

fn two_filament_config() -> Config {
    Config {
        filaments: vec![FilamentSettings::default(), FilamentSettings::default()],
        toolchange: ToolChangeSettings {
            filament_load_time: 8.0,
            filament_unload_time: 5.0,
            extruder_change_time: 0.0,
        },
        ..Config::default()
    }
}

#[test]
fn test_two_collinear_travel_moves() {
    let result = estimate("G1 X10 F600\nG1 X20 F600\n", Config::default());

    let time = result.statistics.normal.time;
    assert!((time - 2.0).abs() < 0.05, "time = {}", time);

    assert_eq!(result.moves.len(), 2);
    assert!(result.moves.iter().all(|m| m.move_type == MoveType::Travel));
    let moves_times = &result.statistics.normal.moves_times;
    assert_eq!(moves_times.len(), 1);
    assert_eq!(moves_times[0].0, MoveType::Travel);
    assert!(result.statistics.stealth.is_none());
}

fn flavored(flavor: Flavor) -> Config {
    Config {
        machine: MachineSettings {
            flavor,
            ..MachineSettings::default()
        },
        ..Config::default()
    }
}

#[test]
fn test_m203_units_per_flavor() {
    let gcode = "M203 X100 Y100\nG1 X100 F6000\n";

    // 100 mm/s caps the 100 mm move at about one second
    for flavor in [
        Flavor::MarlinLegacy,
        Flavor::Marlin2,
        Flavor::Smoothie,
        Flavor::Klipper,
    ] {
        let time = estimate(gcode, flavored(flavor)).statistics.normal.time;
        assert!(time < 5.0, "{}: time = {}", flavor, time);
    }

    // 100 mm/min caps it at about a minute
    for flavor in [
        Flavor::RepRapFirmware,
        Flavor::Sprinter,
        Flavor::Sailfish,
        Flavor::MakerWare,
    ] {
        let time = estimate(gcode, flavored(flavor)).statistics.normal.time;
        assert!((time - 60.0).abs() < 1.0, "{}: time = {}", flavor, time);
    }

    // Repetier ignores M203 and keeps the 500 mm/s default
    let time = estimate(gcode, flavored(Flavor::Repetier)).statistics.normal.time;
    assert!(time < 5.0, "time = {}", time);
}

#[test]
fn test_move_times_are_monotonic() {
    let result = estimate(
        "G1 X10 F600\nG1 X10 Y10 F1200\nG1 X0 Y0 F3000\nG1 X50 F6000\n",
        Config::default(),
    );
    let times: Vec<f32> = result.moves.iter().map(|m| m.time[0]).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]), "{:?}", times);
    let last = times.last().copied().unwrap();
    assert!((last - result.statistics.normal.time).abs() < 1e-3);
}

#[test]
fn test_tool_change_on_same_extruder() {
    let without = estimate("G1 X10 F600\nG1 X20 F600\n", two_filament_config());
    let with = estimate("G1 X10 F600\nT1\nG1 X20 F600\n", two_filament_config());

    let added = with.statistics.normal.time - without.statistics.normal.time;
    assert!((added - 13.0).abs() < 0.1, "added = {}", added);
    assert_eq!(with.statistics.total_filament_changes, 1);
    assert_eq!(with.statistics.total_extruder_changes, 0);
    assert_eq!(with.moves_of_type(MoveType::ToolChange).count(), 1);
    assert_eq!(with.moves.last().unwrap().filament_id, 1);
}

#[test]
fn test_tool_change_to_loaded_filament_is_free() {
    let result = estimate("G1 X10 F600\nT0\nG1 X20 F600\n", two_filament_config());
    assert_eq!(result.statistics.total_filament_changes, 0);
    assert!((result.statistics.normal.time - 2.0).abs() < 0.05);
}

#[test]
fn test_stealth_mode_is_simulated_when_enabled() {
    let mut config = Config::default();
    config.estimator.enable_stealth = true;
    let result = estimate("G1 X10 F600\nG1 X20 F600\n", config);
    let stealth = result.statistics.stealth.expect("stealth statistics");
    assert!(stealth.time > 0.0);
    assert!(result.moves.iter().all(|m| m.time[1] > 0.0));
}

#[test]
fn test_malformed_lines_do_not_stop_processing() {
    let result = estimate(
        "G1 X10 F600\nG1 Xabc\nT999\n;FEATURE: Not a role\nG1 X20 F600\n",
        Config::default(),
    );
    assert_eq!(result.moves_of_type(MoveType::Travel).count(), 2);
    assert_eq!(result.line_count, 5);
}

#[test]
fn test_cancel_callback_cadence() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for i in 0..25_000 {
        writeln!(file, "G1 X{} F6000", i % 2).unwrap();
    }
    file.flush().unwrap();

    let calls = Cell::new(0u32);
    let cancel: CancelCallback = &|| {
        calls.set(calls.get() + 1);
        Ok(())
    };
    let mut processor = GcodeProcessor::new(Config::default());
    processor.process_file(file.path(), Some(cancel)).unwrap();
    assert_eq!(calls.get(), 25_000 / CANCEL_CHECK_INTERVAL);
}

#[test]
fn test_cancel_callback_aborts() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for i in 0..(CANCEL_CHECK_INTERVAL + 10) {
        writeln!(file, "G1 X{} F6000", i % 2).unwrap();
    }
    file.flush().unwrap();

    let cancel: CancelCallback = &|| Err(Error::Cancelled);
    let mut processor = GcodeProcessor::new(Config::default());
    let err = processor.process_file(file.path(), Some(cancel)).unwrap_err();
    assert!(err.is_cancelled());
    assert_eq!(processor.state().line_id, CANCEL_CHECK_INTERVAL);
}

proptest! {
    #[test]
    fn prop_mm3_per_mm_of_straight_extrusion(length in 1u32..200, e_hundredths in 1u32..500) {
        let x = length as f32;
        let e = e_hundredths as f32 / 100.0;
        let mut processor = GcodeProcessor::new(Config::default());
        processor.process_buffer(&format!("G1 X{} E{} F1200\n", x, e));

        let moves = processor.moves();
        prop_assert_eq!(moves.len(), 1);
        prop_assert_eq!(moves[0].move_type, MoveType::Extrude);

        let area = FilamentSettings::default().area();
        let expected = area * e / x;
        prop_assert!((moves[0].mm3_per_mm - expected).abs() <= expected * 1e-4);
    }
}
