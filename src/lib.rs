//! # gcodeplan
//!
//! Print time estimation and annotation for FFF slicer G-code.
//!
//! ## Architecture
//!
//! gcodeplan is organized as a workspace with multiple crates:
//!
//! 1. **gcodeplan-core** - Axes, modes, roles, move types and errors
//! 2. **gcodeplan-settings** - Estimator configuration and machine limits
//! 3. **gcodeplan-planner** - Trapezoidal look-ahead planner and time machines
//! 4. **gcodeplan-processor** - Line processor, statistics and file rewriter
//! 5. **gcodeplan** - Command line front end that ties them together
//!
//! ## Features
//!
//! - **Firmware-style planning**: jerk-limited junctions, reverse/forward passes
//! - **Normal and stealth profiles** simulated side by side
//! - **In-place rewrite**: `M73` progress and stop lines, placeholders,
//!   pre-cooling and pre-heating commands for idle extruders

use anyhow::Context;
use std::fmt::Write as _;
use std::path::Path;

pub use gcodeplan_core::{
    CustomGcodeType, Error, ExtrusionRole, MoveType, PostProcessError, Result, SkipType, TimeMode,
};
pub use gcodeplan_processor::{
    format_dhms, process_file, CancelCallback, GcodeProcessor, GcodeResult, ModeStatistics,
    MoveVertex, PrintStatistics,
};
pub use gcodeplan_settings::{Config, MachineLimits, ModeLimits};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Version string shown by `--version`
pub const LONG_VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (built ", env!("BUILD_DATE"), ")");

/// Initialize logging
///
/// Sets up structured logging with:
/// - Console output on stderr, keeping stdout for the summary
/// - RUST_LOG environment variable support
/// - JSON lines instead of text when `json` is set
pub fn init_logging(json: bool) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    if json {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_line_number(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .with_line_number(true);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}

/// Load the configuration
///
/// An explicit path must exist. Without one the platform default is used
/// when present, built-in defaults otherwise.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    if let Some(path) = path {
        return Config::load_from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()));
    }
    match Config::default_path() {
        Some(path) if path.exists() => Config::load_from_file(&path)
            .with_context(|| format!("failed to load config {}", path.display())),
        _ => {
            tracing::debug!("No config file, using defaults");
            Ok(Config::default())
        }
    }
}

fn mode_summary(out: &mut String, mode: TimeMode, stats: &ModeStatistics) {
    let _ = writeln!(
        out,
        "Estimated printing time ({} mode): {}",
        mode,
        format_dhms(stats.time)
    );
    if stats.prepare_time > 0.0 {
        let _ = writeln!(out, "  preparation: {}", format_dhms(stats.prepare_time));
    }
    for (role, time) in &stats.roles_times {
        let _ = writeln!(out, "  {}: {}", role, format_dhms(*time));
    }
}

/// Human readable statistics of a processing run
pub fn summary(result: &GcodeResult, config: &Config) -> String {
    let stats = &result.statistics;
    let mut out = String::new();

    mode_summary(&mut out, TimeMode::Normal, &stats.normal);
    if let Some(stealth) = &stats.stealth {
        mode_summary(&mut out, TimeMode::Stealth, stealth);
    }

    let _ = writeln!(out, "Lines: {}", result.line_count);
    let _ = writeln!(out, "Moves: {}", result.moves.len());
    let _ = writeln!(out, "Layers: {}", stats.total_layers);
    let _ = writeln!(out, "Filament changes: {}", stats.total_filament_changes);
    let _ = writeln!(out, "Extruder changes: {}", stats.total_extruder_changes);

    for (id, volume) in &stats.used_filaments.total_volumes_per_filament {
        let filament = config.filament(*id);
        let _ = writeln!(
            out,
            "Filament {}: {:.2} m, {:.2} g",
            id,
            volume / filament.area() * 0.001,
            volume * filament.density * 0.001
        );
    }
    for (skip_type, time) in &stats.skippable_times {
        let _ = writeln!(out, "Skippable {:?}: {}", skip_type, format_dhms(*time));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_lists_times_and_counts() {
        let mut processor = GcodeProcessor::new(Config::default());
        processor.process_buffer("G1 X10 F600\nG1 X20 E1 F600\n");
        let result = processor.finalize(false).unwrap();
        let text = summary(&result, &Config::default());
        assert!(text.starts_with("Estimated printing time (normal mode): "));
        assert!(text.contains("Filament changes: 0"));
        assert!(text.contains("Filament 0: "));
        assert!(!text.contains("stealth"));
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(Some(&dir.path().join("none.toml"))).unwrap_err();
        assert!(err.to_string().contains("failed to load config"));
    }
}
